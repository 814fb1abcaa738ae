//! Loop de monitoramento de telemetria.
//!
//! Máquina de estados `Running` → `Stopped`. A cada despertar do
//! multiplexador:
//!
//! - `PRIORITY`: notifica alerta (sinal consultivo, não prova de threshold)
//! - `READABLE`/`HANGUP`: exatamente uma leitura de 16 bytes
//!   - 0 bytes → fim de stream → `Stopped`
//!   - outro tamanho → aviso de leitura curta, segue sem decodificar
//!   - 16 bytes → decodifica e entrega a amostra
//!
//! O indicador autoritativo de alerta é o bit `THRESHOLD_CROSSED` dentro do
//! registro. Os dois eventos de um mesmo despertar são tratados antes do
//! próximo `wait`.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use simtemp_core::device::{DeviceError, DeviceEvents, EventSource};
use simtemp_core::protocol::{RECORD_SIZE, decode_record};
use simtemp_core::types::TelemetryRecord;
use std::cell::Cell;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Estado da sessão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

/// Motivo de parada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Leitura de 0 bytes: o produtor sumiu
    EndOfStream,
    /// Pedido externo de parada
    Cancelled,
    /// Erro de E/S irrecuperável
    IoError,
}

/// Notificação entregue ao consumidor.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Amostra decodificada
    Sample(TelemetryRecord),
    /// Despertar `PRIORITY` (consultivo)
    Alert,
    /// Leitura com tamanho diferente de um registro
    ShortRead { bytes: usize },
}

/// Destino das notificações da sessão.
///
/// Implementações nunca devem bloquear o produtor.
pub trait MonitorSink {
    fn deliver(&mut self, event: MonitorEvent);
}

impl MonitorSink for Vec<MonitorEvent> {
    fn deliver(&mut self, event: MonitorEvent) {
        self.push(event);
    }
}

/// Sink sobre um channel limitado: se o consumidor está lento, descarta.
pub struct ChannelSink {
    tx: Sender<MonitorEvent>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: Sender<MonitorEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl MonitorSink for ChannelSink {
    fn deliver(&mut self, event: MonitorEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped == 1 {
                    warn!("Consumidor lento: channel cheio, eventos serão descartados");
                } else {
                    debug!(dropped = self.dropped, "Channel cheio, descartando evento");
                }
            }
            // Consumidor foi embora; a sessão termina pelo cancelamento.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

// ──────────────────────────────────────────────
// Cancelamento
// ──────────────────────────────────────────────

/// Lado que pede a parada. Pode ser clonado entre threads.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Já cancelado se o slot estiver ocupado.
        let _ = self.tx.try_send(());
    }
}

/// Lado observado pela sessão. Uma vez cancelado, permanece cancelado.
#[derive(Debug)]
pub struct CancelToken {
    rx: Receiver<()>,
    fired: Cell<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        if self.fired.get() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(()) => {
                self.fired.set(true);
                true
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}

/// Cria um par handle/token ligado.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded(1);
    (
        CancelHandle { tx },
        CancelToken {
            rx,
            fired: Cell::new(false),
        },
    )
}

// ──────────────────────────────────────────────
// Sessão
// ──────────────────────────────────────────────

/// Contadores da sessão.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub wakeups: u64,
    pub timeouts: u64,
    pub reads: u64,
    pub records: u64,
    pub short_reads: u64,
    pub priority_events: u64,
    pub flagged_records: u64,
}

/// Uma sessão de monitoramento: dona exclusiva da fonte de eventos.
///
/// Ao ser dropada, a fonte (descritor + registro) é liberada.
pub struct MonitorSession<S: EventSource> {
    source: S,
    state: MonitorState,
    stop_reason: Option<StopReason>,
    poll_timeout: Option<Duration>,
    stats: SessionStats,
}

impl<S: EventSource> MonitorSession<S> {
    /// `poll_timeout = None` só é adequado para uso de CLI em que matar o
    /// processo é o mecanismo de cancelamento.
    pub fn new(source: S, poll_timeout: Option<Duration>) -> Self {
        Self {
            source,
            state: MonitorState::Running,
            stop_reason: None,
            poll_timeout,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Roda até fim de stream, erro irrecuperável ou cancelamento.
    pub fn run<K: MonitorSink>(
        &mut self,
        sink: &mut K,
        cancel: &CancelToken,
    ) -> Result<StopReason, DeviceError> {
        while self.state == MonitorState::Running {
            if cancel.is_cancelled() {
                self.stop(StopReason::Cancelled);
                break;
            }
            self.step(sink)?;
        }

        Ok(self.stop_reason.unwrap_or(StopReason::Cancelled))
    }

    /// Um `wait` e o tratamento de todos os eventos retornados.
    ///
    /// Depois de `Stopped`, não toca mais na fonte.
    pub fn step<K: MonitorSink>(&mut self, sink: &mut K) -> Result<MonitorState, DeviceError> {
        if self.state == MonitorState::Stopped {
            return Ok(MonitorState::Stopped);
        }

        let events = match self.source.wait(self.poll_timeout) {
            Ok(events) => events,
            // Sinal durante espera indefinida: volta para `run` checar o token.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(self.state),
            Err(e) => {
                self.stop(StopReason::IoError);
                return Err(DeviceError::PollFailed(e));
            }
        };

        if events.is_timeout() {
            self.stats.timeouts += 1;
            return Ok(self.state);
        }
        self.stats.wakeups += 1;

        if events.contains(DeviceEvents::PRIORITY) {
            self.stats.priority_events += 1;
            sink.deliver(MonitorEvent::Alert);
        }

        if events.wants_read() {
            self.read_one(sink)?;
        }

        Ok(self.state)
    }

    fn read_one<K: MonitorSink>(&mut self, sink: &mut K) -> Result<(), DeviceError> {
        let mut buf = [0u8; RECORD_SIZE];
        self.stats.reads += 1;

        let n = match self.source.read_record(&mut buf) {
            Ok(n) => n,
            // Despertar espúrio em descritor não-bloqueante.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("read() sem dados após despertar");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                self.stop(StopReason::IoError);
                return Err(DeviceError::ReadFailed(e));
            }
        };

        if n == 0 {
            info!("Fim de stream (módulo descarregado?)");
            self.stop(StopReason::EndOfStream);
            return Ok(());
        }

        match decode_record(&buf[..n]) {
            Ok(record) => {
                self.stats.records += 1;
                if record.threshold_crossed() {
                    self.stats.flagged_records += 1;
                }
                sink.deliver(MonitorEvent::Sample(record));
            }
            Err(e) => {
                self.stats.short_reads += 1;
                warn!(bytes = n, "Leitura curta: {e}");
                sink.deliver(MonitorEvent::ShortRead { bytes: n });
            }
        }
        Ok(())
    }

    fn stop(&mut self, reason: StopReason) {
        if self.state == MonitorState::Running {
            self.state = MonitorState::Stopped;
            self.stop_reason = Some(reason);
            info!(?reason, stats = ?self.stats, "Sessão de monitoramento encerrada");
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
