//! Teste de aceitação do alerta por threshold.
//!
//! Protocolo único e determinístico:
//! 1. configura o produtor (`mode`, `sampling_ms`, `threshold_mC`)
//! 2. prazo = `periods × sampling_ms + margin`
//! 3. abre o dispositivo com interesse só em `PRIORITY` e espera uma vez
//! 4. classifica o despertar
//! 5. restaura a configuração base, sempre, inclusive após abortar

use simtemp_core::config::AcceptanceConfig;
use simtemp_core::device::{DeviceError, DeviceEvents, EventSource};
use simtemp_core::sysfs::{Sysfs, SysfsError};
use simtemp_core::types::SimMode;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Parâmetros do teste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptancePlan {
    pub mode: SimMode,
    pub sampling_ms: u32,
    pub threshold_mc: i32,
    pub periods: u32,
    pub margin: Duration,
    pub baseline_sampling_ms: u32,
    pub baseline_threshold_mc: i32,
}

impl Default for AcceptancePlan {
    fn default() -> Self {
        Self::from(&AcceptanceConfig::default())
    }
}

impl From<&AcceptanceConfig> for AcceptancePlan {
    fn from(cfg: &AcceptanceConfig) -> Self {
        Self {
            mode: cfg.mode,
            sampling_ms: cfg.sampling_ms,
            threshold_mc: cfg.threshold_mc,
            periods: cfg.periods,
            margin: Duration::from_millis(cfg.margin_ms),
            baseline_sampling_ms: cfg.baseline_sampling_ms,
            baseline_threshold_mc: cfg.baseline_threshold_mc,
        }
    }
}

impl AcceptancePlan {
    /// `periods × sampling_ms + margin` (100 ms → 400 ms no padrão).
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(u64::from(self.sampling_ms) * u64::from(self.periods)) + self.margin
    }
}

/// Motivo de falha.
#[derive(Debug)]
pub enum FailReason {
    /// Nenhum `PRIORITY` antes do prazo
    Timeout,
    /// Despertou sem `PRIORITY`
    UnexpectedEvent(DeviceEvents),
    /// Falha ao configurar o driver via sysfs
    ConfigurationError(SysfsError),
    /// Falha ao abrir ou esperar no dispositivo
    Io(DeviceError),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Timeout => write!(f, "timeout: o evento POLLPRI (alerta) não foi recebido"),
            FailReason::UnexpectedEvent(ev) => {
                write!(f, "poll() acordou mas o evento não foi POLLPRI ({ev:?})")
            }
            FailReason::ConfigurationError(e) => write!(f, "erro de configuração: {e}"),
            FailReason::Io(e) => write!(f, "erro de E/S: {e}"),
        }
    }
}

/// Resultado terminal.
#[derive(Debug)]
pub enum TestOutcome {
    Pass,
    Fail(FailReason),
}

impl TestOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, TestOutcome::Pass)
    }
}

/// Resultado + diagnóstico.
#[derive(Debug)]
pub struct AcceptanceReport {
    pub outcome: TestOutcome,
    pub deadline: Duration,
    /// `stats` lido do driver quando o teste expira
    pub stats: Option<String>,
    /// Escritas de restauração que falharam
    pub cleanup_errors: Vec<SysfsError>,
}

/// Executa o teste de aceitação.
///
/// `open` recebe o interesse desejado e devolve a fonte de eventos; a fonte
/// é dropada (descritor liberado) antes da restauração da configuração.
pub fn run_acceptance<S, F>(plan: &AcceptancePlan, sysfs: &Sysfs, open: F) -> AcceptanceReport
where
    S: EventSource,
    F: FnOnce(DeviceEvents) -> Result<S, DeviceError>,
{
    let deadline = plan.deadline();
    let mut stats = None;

    let outcome = match configure(plan, sysfs) {
        Err(e) => TestOutcome::Fail(FailReason::ConfigurationError(e)),
        Ok(()) => {
            let outcome = wait_for_alert(deadline, open);
            if matches!(outcome, TestOutcome::Fail(FailReason::Timeout)) {
                stats = sysfs.stats().ok();
            }
            outcome
        }
    };

    let mut cleanup_errors = restore_baseline(plan, sysfs);

    // Restauração falhou num teste que passou: o sistema não ficou no estado
    // seguro, então o teste falha. Se já havia falha, ela é preservada.
    let outcome = if outcome.is_pass() && !cleanup_errors.is_empty() {
        TestOutcome::Fail(FailReason::ConfigurationError(cleanup_errors.remove(0)))
    } else {
        outcome
    };

    AcceptanceReport {
        outcome,
        deadline,
        stats,
        cleanup_errors,
    }
}

fn configure(plan: &AcceptancePlan, sysfs: &Sysfs) -> Result<(), SysfsError> {
    info!(
        mode = %plan.mode,
        sampling_ms = plan.sampling_ms,
        threshold_mc = plan.threshold_mc,
        "Configurando driver para o teste"
    );
    sysfs.set_mode(plan.mode)?;
    sysfs.set_sampling_ms(plan.sampling_ms)?;
    sysfs.set_threshold_mc(plan.threshold_mc)?;
    Ok(())
}

fn wait_for_alert<S, F>(deadline: Duration, open: F) -> TestOutcome
where
    S: EventSource,
    F: FnOnce(DeviceEvents) -> Result<S, DeviceError>,
{
    let mut source = match open(DeviceEvents::PRIORITY) {
        Ok(source) => source,
        Err(e) => return TestOutcome::Fail(FailReason::Io(e)),
    };

    info!("Aguardando evento POLLPRI (timeout={:.3}s)", deadline.as_secs_f64());
    match source.wait(Some(deadline)) {
        Err(e) => TestOutcome::Fail(FailReason::Io(DeviceError::PollFailed(e))),
        Ok(events) if events.is_timeout() => TestOutcome::Fail(FailReason::Timeout),
        Ok(events) if events.contains(DeviceEvents::PRIORITY) => TestOutcome::Pass,
        Ok(events) => TestOutcome::Fail(FailReason::UnexpectedEvent(events)),
    }
}

/// Restauração best-effort: tenta todas as escritas e só registra falhas.
fn restore_baseline(plan: &AcceptancePlan, sysfs: &Sysfs) -> Vec<SysfsError> {
    let mut errors = Vec::new();
    let results = [
        sysfs.set_sampling_ms(plan.baseline_sampling_ms),
        sysfs.set_threshold_mc(plan.baseline_threshold_mc),
    ];
    for result in results {
        if let Err(e) = result {
            warn!(attr = e.attr_name().unwrap_or("?"), "Falha ao restaurar configuração: {e}");
            errors.push(e);
        }
    }
    if errors.is_empty() {
        info!(
            sampling_ms = plan.baseline_sampling_ms,
            threshold_mc = plan.baseline_threshold_mc,
            "Configuração base restaurada"
        );
    }
    errors
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::ScriptedSource;
    use std::cell::Cell;
    use std::fs;

    fn fake_sysfs() -> (tempfile::TempDir, Sysfs) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mode"), "ramp\n").unwrap();
        fs::write(dir.path().join("sampling_ms"), "500\n").unwrap();
        fs::write(dir.path().join("threshold_mC"), "45000\n").unwrap();
        fs::write(dir.path().join("stats"), "samples=3 alerts=0\n").unwrap();
        let sysfs = Sysfs::new(dir.path());
        (dir, sysfs)
    }

    fn read_attr(sysfs: &Sysfs, name: &str) -> String {
        fs::read_to_string(sysfs.root().join(name)).unwrap()
    }

    #[test]
    fn default_deadline_is_three_periods_plus_margin() {
        assert_eq!(AcceptancePlan::default().deadline(), Duration::from_millis(400));
        let plan = AcceptancePlan {
            sampling_ms: 250,
            ..AcceptancePlan::default()
        };
        assert_eq!(plan.deadline(), Duration::from_millis(850));
    }

    #[test]
    fn priority_event_passes_and_restores_baseline() {
        let (_dir, sysfs) = fake_sysfs();
        let requested = Cell::new(DeviceEvents::empty());
        let report = run_acceptance(&AcceptancePlan::default(), &sysfs, |interest| {
            requested.set(interest);
            // O driver está configurado para o teste no momento da abertura.
            assert_eq!(read_attr(&sysfs, "mode"), "normal");
            assert_eq!(read_attr(&sysfs, "sampling_ms"), "100");
            assert_eq!(read_attr(&sysfs, "threshold_mC"), "30000");
            Ok(ScriptedSource::default().wake(DeviceEvents::PRIORITY))
        });

        assert!(report.outcome.is_pass(), "{:?}", report.outcome);
        assert_eq!(requested.get(), DeviceEvents::PRIORITY);
        assert!(report.stats.is_none());
        assert_eq!(read_attr(&sysfs, "sampling_ms"), "1000");
        assert_eq!(read_attr(&sysfs, "threshold_mC"), "27000");
    }

    #[test]
    fn waits_once_with_computed_deadline() {
        let (_dir, sysfs) = fake_sysfs();
        let waits = Cell::new(0usize);
        let deadline = Cell::new(None);

        struct Recording<'a> {
            waits: &'a Cell<usize>,
            deadline: &'a Cell<Option<Duration>>,
        }
        impl EventSource for Recording<'_> {
            fn wait(&mut self, timeout: Option<Duration>) -> std::io::Result<DeviceEvents> {
                self.waits.set(self.waits.get() + 1);
                self.deadline.set(timeout);
                Ok(DeviceEvents::empty())
            }
            fn read_record(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                panic!("o teste de aceitação não lê dados");
            }
        }

        let report = run_acceptance(&AcceptancePlan::default(), &sysfs, |_| {
            Ok(Recording {
                waits: &waits,
                deadline: &deadline,
            })
        });

        assert_eq!(waits.get(), 1);
        assert_eq!(deadline.get(), Some(Duration::from_millis(400)));
        assert!(matches!(report.outcome, TestOutcome::Fail(FailReason::Timeout)));
        assert_eq!(report.stats.as_deref(), Some("samples=3 alerts=0"));
        assert_eq!(read_attr(&sysfs, "sampling_ms"), "1000");
    }

    #[test]
    fn non_priority_wakeup_is_unexpected() {
        let (_dir, sysfs) = fake_sysfs();
        let report = run_acceptance(&AcceptancePlan::default(), &sysfs, |_| {
            Ok(ScriptedSource::default().wake(DeviceEvents::HANGUP))
        });
        assert!(matches!(
            report.outcome,
            TestOutcome::Fail(FailReason::UnexpectedEvent(ev)) if ev == DeviceEvents::HANGUP
        ));
        assert_eq!(read_attr(&sysfs, "threshold_mC"), "27000");
    }

    #[test]
    fn partial_configuration_failure_still_restores() {
        let (_dir, sysfs) = fake_sysfs();
        // `sampling_ms` vira diretório: toda escrita nele falha.
        let sampling = sysfs.root().join("sampling_ms");
        fs::remove_file(&sampling).unwrap();
        fs::create_dir(&sampling).unwrap();

        let opened = Cell::new(false);
        let report = run_acceptance(&AcceptancePlan::default(), &sysfs, |_| {
            opened.set(true);
            Ok(ScriptedSource::default())
        });

        assert!(matches!(
            report.outcome,
            TestOutcome::Fail(FailReason::ConfigurationError(SysfsError::WriteFailed { .. }))
        ));
        assert!(!opened.get());
        // `mode` chegou a ser escrito; threshold nunca foi para 30000.
        assert_eq!(read_attr(&sysfs, "mode"), "normal");
        assert_eq!(read_attr(&sysfs, "threshold_mC"), "27000");
        // A restauração de sampling também falhou, registrada e não propagada.
        assert_eq!(report.cleanup_errors.len(), 1);
    }

    #[test]
    fn open_failure_is_io_and_still_restores() {
        let (_dir, sysfs) = fake_sysfs();
        let report = run_acceptance(
            &AcceptancePlan::default(),
            &sysfs,
            |_| -> Result<ScriptedSource, DeviceError> {
                Err(DeviceError::OpenFailed {
                    path: "/dev/simtemp".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            },
        );
        assert!(matches!(
            report.outcome,
            TestOutcome::Fail(FailReason::Io(DeviceError::OpenFailed { .. }))
        ));
        assert_eq!(read_attr(&sysfs, "sampling_ms"), "1000");
    }

    #[test]
    fn cleanup_failure_turns_pass_into_fail() {
        let (_dir, sysfs) = fake_sysfs();
        let report = run_acceptance(&AcceptancePlan::default(), &sysfs, |_| {
            // Driver some entre o teste e a restauração.
            fs::remove_file(sysfs.root().join("threshold_mC")).unwrap();
            Ok(ScriptedSource::default().wake(DeviceEvents::PRIORITY))
        });
        assert!(matches!(
            report.outcome,
            TestOutcome::Fail(FailReason::ConfigurationError(_))
        ));
        assert!(report.cleanup_errors.is_empty());
        assert_eq!(read_attr(&sysfs, "sampling_ms"), "1000");
    }

    #[test]
    fn timeout_on_a_real_descriptor() {
        use simtemp_core::poller::Poller;

        let (_dir, sysfs) = fake_sysfs();
        let device = tempfile::NamedTempFile::new().unwrap();
        let plan = AcceptancePlan {
            sampling_ms: 10,
            margin: Duration::from_millis(10),
            ..AcceptancePlan::default()
        };

        // Arquivo regular nunca sinaliza POLLPRI.
        let report = run_acceptance(&plan, &sysfs, |interest| {
            Poller::open(device.path(), interest)
        });
        assert_eq!(report.deadline, Duration::from_millis(40));
        assert!(matches!(report.outcome, TestOutcome::Fail(FailReason::Timeout)));
    }

    #[test]
    fn poll_error_on_a_real_descriptor_is_unexpected() {
        use simtemp_core::poller::Poller;
        use std::fs::File;
        use std::os::fd::FromRawFd;

        let (_dir, sysfs) = fake_sysfs();
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` tem espaço para os dois descritores.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        // SAFETY: descritores recém-criados, cada um com um único dono.
        let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
        // Sem leitores, o lado de escrita do pipe sinaliza POLLERR.
        drop(reader);

        let report = run_acceptance(&AcceptancePlan::default(), &sysfs, |interest| {
            Ok(Poller::register(writer, interest))
        });
        assert!(matches!(
            report.outcome,
            TestOutcome::Fail(FailReason::UnexpectedEvent(ev)) if ev.contains(DeviceEvents::HANGUP)
        ));
        assert_eq!(read_attr(&sysfs, "sampling_ms"), "1000");
    }
}
