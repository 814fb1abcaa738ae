//! Eventos do dispositivo e a abstração da fonte de eventos.

use bitflags::bitflags;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

bitflags! {
    /// Conjunto de eventos de um despertar do multiplexador.
    ///
    /// Os flags são independentes e podem coexistir. Um conjunto vazio
    /// significa timeout (nenhum evento antes do prazo).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceEvents: u8 {
        /// Dados normais disponíveis (POLLIN | POLLRDNORM)
        const READABLE = 1 << 0;
        /// Condição fora de banda: alerta de threshold (POLLPRI)
        const PRIORITY = 1 << 1;
        /// Produtor sumiu ou erro no descritor (POLLHUP | POLLERR)
        const HANGUP = 1 << 2;
    }
}

impl DeviceEvents {
    /// Interesse do monitor contínuo.
    pub const MONITOR: DeviceEvents = DeviceEvents::READABLE.union(DeviceEvents::PRIORITY);

    pub fn is_timeout(&self) -> bool {
        self.is_empty()
    }

    /// Há algo a ler (dados ou fim de stream).
    pub fn wants_read(&self) -> bool {
        self.intersects(DeviceEvents::READABLE | DeviceEvents::HANGUP)
    }
}

/// Erros de E/S do dispositivo.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Falha ao abrir {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Falha no poll: {0}")]
    PollFailed(#[source] io::Error),

    #[error("Falha de leitura: {0}")]
    ReadFailed(#[source] io::Error),
}

/// Fonte de eventos sobre um único descritor.
///
/// Implementada por [`crate::poller::Poller`] para o dispositivo real e por
/// fontes roteirizadas nos testes.
pub trait EventSource {
    /// Bloqueia até algum interesse registrado ser satisfeito ou o prazo
    /// expirar. `None` espera indefinidamente. Vazio só em timeout.
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<DeviceEvents>;

    /// Uma única leitura no descritor. `Ok(0)` é fim de stream.
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<DeviceEvents> {
        (**self).wait(timeout)
    }

    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_record(buf)
    }
}
