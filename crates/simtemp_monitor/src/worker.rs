//! Thread do monitor que envia eventos para o consumidor via channel.

use crate::monitor::{
    CancelToken, ChannelSink, MonitorEvent, MonitorSession, SessionStats, StopReason,
};
use crossbeam_channel::{Receiver, TryRecvError, bounded};
use simtemp_core::device::{DeviceError, EventSource};
use std::io;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Resultado final da thread do monitor.
#[derive(Debug)]
pub struct WorkerExit {
    pub result: Result<StopReason, DeviceError>,
    pub stats: SessionStats,
    pub dropped: u64,
}

/// Thread em execução e o lado consumidor do channel.
pub struct MonitorWorker {
    pub rx: Receiver<MonitorEvent>,
    join: JoinHandle<WorkerExit>,
}

impl MonitorWorker {
    /// Espera a thread terminar.
    pub fn join(self) -> WorkerExit {
        match self.join.join() {
            Ok(exit) => exit,
            Err(_) => WorkerExit {
                result: Err(DeviceError::ReadFailed(io::Error::other(
                    "thread do monitor entrou em pânico",
                ))),
                stats: SessionStats::default(),
                dropped: 0,
            },
        }
    }
}

/// Inicia a sessão numa thread dedicada.
///
/// A fonte já vem aberta: falhas de abertura aparecem antes do spawn. A
/// fonte é movida para a thread e nunca compartilhada.
pub fn spawn_monitor_thread<S>(
    source: S,
    poll_timeout: Option<Duration>,
    capacity: usize,
    cancel: CancelToken,
) -> io::Result<MonitorWorker>
where
    S: EventSource + Send + 'static,
{
    let (tx, rx) = bounded::<MonitorEvent>(capacity);

    let join = std::thread::Builder::new()
        .name("simtemp-monitor".into())
        .spawn(move || {
            let mut session = MonitorSession::new(source, poll_timeout);
            let mut sink = ChannelSink::new(tx);
            let result = session.run(&mut sink, &cancel);
            if let Err(e) = &result {
                error!("Erro no loop de poll: {e}");
            }
            debug!(state = ?session.state(), reason = ?session.stop_reason(), "thread do monitor saindo");
            if sink.dropped() > 0 {
                info!(dropped = sink.dropped(), "Eventos descartados por consumidor lento");
            }
            WorkerExit {
                result,
                stats: session.stats(),
                dropped: sink.dropped(),
            }
        })?;

    Ok(MonitorWorker { rx, join })
}

/// Drena sem bloquear tudo o que está pendente no channel.
///
/// Retorna `false` quando o produtor já encerrou e não há mais nada.
pub fn drain_pending<F>(rx: &Receiver<MonitorEvent>, mut handle: F) -> bool
where
    F: FnMut(MonitorEvent),
{
    loop {
        match rx.try_recv() {
            Ok(event) => handle(event),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}
