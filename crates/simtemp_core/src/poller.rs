//! Adaptador de multiplexação sobre `poll(2)`.
//!
//! Um [`Poller`] é dono de exatamente um descritor e do seu interesse
//! registrado. Ao ser dropado, o descritor é fechado.

use crate::device::{DeviceError, DeviceEvents, EventSource};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Descritor + interesse registrado.
#[derive(Debug)]
pub struct Poller {
    file: File,
    interest: DeviceEvents,
}

impl Poller {
    /// Abre o dispositivo somente-leitura e não-bloqueante e registra o interesse.
    pub fn open(path: &Path, interest: DeviceEvents) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| DeviceError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), ?interest, "dispositivo aberto");
        Ok(Self::register(file, interest))
    }

    /// Registra interesse sobre um descritor já aberto.
    ///
    /// `HANGUP` é sempre reportado pelo kernel e não precisa ser pedido.
    pub fn register(file: File, interest: DeviceEvents) -> Self {
        Self { file, interest }
    }
}

impl EventSource for Poller {
    /// Com prazo, um `EINTR` refaz o `poll` com o tempo restante. Sem prazo,
    /// devolve `Interrupted` para o chamador reavaliar o cancelamento.
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<DeviceEvents> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: interest_to_poll(self.interest),
            revents: 0,
        };

        loop {
            pfd.revents = 0;
            let timeout_ms = match deadline {
                None => -1,
                Some(d) => millis_ceil(d.saturating_duration_since(Instant::now())),
            };

            // SAFETY: `pfd` é um único pollfd válido e vivo durante a chamada,
            // e o fd pertence a `self.file`.
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted && deadline.is_some() {
                    continue;
                }
                return Err(err);
            }
            if rc == 0 {
                return Ok(DeviceEvents::empty());
            }
            if pfd.revents & libc::POLLNVAL != 0 {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }
            return Ok(events_from_poll(pfd.revents));
        }
    }

    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

fn interest_to_poll(interest: DeviceEvents) -> libc::c_short {
    let mut events = 0;
    if interest.contains(DeviceEvents::READABLE) {
        events |= libc::POLLIN | libc::POLLRDNORM;
    }
    if interest.contains(DeviceEvents::PRIORITY) {
        events |= libc::POLLPRI;
    }
    events
}

fn events_from_poll(revents: libc::c_short) -> DeviceEvents {
    let mut events = DeviceEvents::empty();
    if revents & (libc::POLLIN | libc::POLLRDNORM) != 0 {
        events |= DeviceEvents::READABLE;
    }
    if revents & libc::POLLPRI != 0 {
        events |= DeviceEvents::PRIORITY;
    }
    if revents & (libc::POLLHUP | libc::POLLERR) != 0 {
        events |= DeviceEvents::HANGUP;
    }
    events
}

/// Milissegundos arredondados para cima, saturando em `c_int::MAX`.
fn millis_ceil(d: Duration) -> libc::c_int {
    let ms = d.as_nanos().div_ceil(1_000_000);
    libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::{FromRawFd, IntoRawFd};
    use std::os::unix::thread::JoinHandleExt;

    fn pipe() -> (File, File) {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` tem espaço para os dois descritores.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        // SAFETY: descritores recém-criados, cada um com um único dono.
        unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
    }

    extern "C" fn ignore_signal(_: libc::c_int) {}

    /// Handler vazio para SIGUSR1: o sinal só interrompe a syscall.
    fn install_sigusr1_handler() {
        // SAFETY: sigaction zerada + máscara vazia é uma configuração válida;
        // o handler não toca em estado nenhum.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore_signal as usize;
            libc::sigemptyset(&mut action.sa_mask);
            assert_eq!(libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()), 0);
        }
    }

    #[test]
    fn poll_bits_map_to_events() {
        assert_eq!(events_from_poll(libc::POLLIN), DeviceEvents::READABLE);
        assert_eq!(events_from_poll(libc::POLLPRI), DeviceEvents::PRIORITY);
        assert_eq!(
            events_from_poll(libc::POLLIN | libc::POLLPRI),
            DeviceEvents::READABLE | DeviceEvents::PRIORITY
        );
        assert_eq!(events_from_poll(libc::POLLHUP), DeviceEvents::HANGUP);
        assert_eq!(events_from_poll(libc::POLLERR), DeviceEvents::HANGUP);
        assert_eq!(events_from_poll(0), DeviceEvents::empty());
    }

    #[test]
    fn interest_maps_to_poll_bits() {
        assert_eq!(interest_to_poll(DeviceEvents::PRIORITY), libc::POLLPRI);
        let monitor = interest_to_poll(DeviceEvents::MONITOR);
        assert_ne!(monitor & libc::POLLIN, 0);
        assert_ne!(monitor & libc::POLLPRI, 0);
    }

    #[test]
    fn millis_round_up() {
        assert_eq!(millis_ceil(Duration::ZERO), 0);
        assert_eq!(millis_ceil(Duration::from_micros(1)), 1);
        assert_eq!(millis_ceil(Duration::from_millis(400)), 400);
        assert_eq!(millis_ceil(Duration::from_secs(u64::MAX)), libc::c_int::MAX);
    }

    #[test]
    fn open_missing_device_fails() {
        let err = Poller::open(Path::new("/nonexistent/simtemp"), DeviceEvents::MONITOR)
            .unwrap_err();
        assert!(matches!(err, DeviceError::OpenFailed { .. }));
    }

    #[test]
    fn regular_file_is_readable() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 16]).unwrap();
        let mut poller = Poller::open(tmp.path(), DeviceEvents::MONITOR).unwrap();
        let events = poller.wait(Some(Duration::from_millis(500))).unwrap();
        assert!(events.contains(DeviceEvents::READABLE));
        let mut buf = [0u8; 16];
        assert_eq!(poller.read_record(&mut buf).unwrap(), 16);
    }

    #[test]
    fn priority_only_interest_times_out_on_regular_file() {
        // Arquivos regulares nunca sinalizam POLLPRI.
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut poller = Poller::open(tmp.path(), DeviceEvents::PRIORITY).unwrap();
        let started = Instant::now();
        let events = poller.wait(Some(Duration::from_millis(50))).unwrap();
        assert!(events.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn indefinite_wait_returns_when_interrupted() {
        install_sigusr1_handler();
        let (reader, writer) = pipe();
        let waiter = std::thread::spawn(move || {
            let mut poller = Poller::register(reader, DeviceEvents::MONITOR);
            poller.wait(None)
        });

        // O sinal pode chegar antes do poll começar: repete até a thread sair.
        let started = Instant::now();
        while !waiter.is_finished() && started.elapsed() < Duration::from_secs(3) {
            // SAFETY: a thread ainda não foi unida, o pthread_t é válido.
            unsafe { libc::pthread_kill(waiter.as_pthread_t(), libc::SIGUSR1) };
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(waiter.is_finished(), "wait(None) ignorou o sinal");

        let err = waiter.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        drop(writer);
    }

    #[test]
    fn bounded_wait_survives_interruption() {
        install_sigusr1_handler();
        let (reader, writer) = pipe();
        let waiter = std::thread::spawn(move || {
            let mut poller = Poller::register(reader, DeviceEvents::MONITOR);
            let started = Instant::now();
            (poller.wait(Some(Duration::from_millis(200))), started.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        // SAFETY: a thread ainda não foi unida, o pthread_t é válido.
        unsafe { libc::pthread_kill(waiter.as_pthread_t(), libc::SIGUSR1) };

        let (result, elapsed) = waiter.join().unwrap();
        assert!(result.unwrap().is_timeout());
        assert!(elapsed >= Duration::from_millis(200));
        drop(writer);
    }

    #[test]
    fn closed_descriptor_is_ebadf() {
        let (reader, _writer) = pipe();
        // Número alto e longe dos que os outros testes recebem.
        const STALE_FD: libc::c_int = 900;
        let fd = reader.into_raw_fd();
        // SAFETY: `fd` é nosso; STALE_FD é fechado logo em seguida.
        unsafe {
            assert_eq!(libc::dup2(fd, STALE_FD), STALE_FD);
            libc::close(fd);
            libc::close(STALE_FD);
        }

        // SAFETY: o fd está fechado; o Poller é esquecido sem fechar de novo.
        let stale = unsafe { File::from_raw_fd(STALE_FD) };
        let mut poller = Poller::register(stale, DeviceEvents::MONITOR);
        let err = poller.wait(Some(Duration::from_millis(50))).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        std::mem::forget(poller);
    }
}
