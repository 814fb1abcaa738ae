//! # simtemp
//!
//! Monitor em espaço de usuário do sensor de temperatura simulado.
//! Lê registros binários de `/dev/simtemp` via `poll(2)` e configura o driver
//! pelos atributos sysfs.
//!
//! ## Uso
//! ```bash
//! simtemp                      # monitora até Ctrl+C ou fim de stream
//! simtemp --test               # teste de aceitação (exit 0 = PASS, 1 = FAIL)
//! simtemp -s 100 -t 30000      # configura e sai
//! simtemp -m ramp
//! simtemp --show               # configuração atual + stats
//! ```

mod acceptance;
mod console;
mod history;
mod monitor;
mod worker;

use acceptance::{AcceptancePlan, run_acceptance};
use anyhow::{Context, Result, bail};
use clap::Parser;
use history::SampleHistory;
use monitor::{CancelHandle, cancellation};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use simtemp_core::config::AppConfig;
use simtemp_core::device::DeviceEvents;
use simtemp_core::poller::Poller;
use simtemp_core::sysfs::Sysfs;
use simtemp_core::types::SimMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "simtemp", version, about = "CLI do driver simtemp (sensor de temperatura simulado)")]
struct Cli {
    /// Arquivo de configuração TOML (padrão: simtemp.toml ao lado do executável)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Dispositivo de caractere (sobrescreve a configuração)
    #[arg(long, value_name = "PATH")]
    device: Option<PathBuf>,

    /// Diretório sysfs (sobrescreve a configuração)
    #[arg(long, value_name = "DIR")]
    sysfs: Option<PathBuf>,

    /// Executa o teste de aceitação do alerta
    #[arg(long, conflicts_with_all = ["set_sampling_ms", "set_threshold_mc", "set_mode", "show"])]
    test: bool,

    /// Define o período de amostragem (ms) via sysfs
    #[arg(short = 's', long, value_name = "MS")]
    set_sampling_ms: Option<u32>,

    /// Define o threshold de alerta (mili-°C) via sysfs
    #[arg(short = 't', long = "set-threshold-mc", value_name = "MC", allow_negative_numbers = true)]
    set_threshold_mc: Option<i32>,

    /// Define o modo de simulação via sysfs (normal, noisy, ramp)
    #[arg(short = 'm', long, value_name = "MODE")]
    set_mode: Option<SimMode>,

    /// Mostra sampling_ms, threshold_mC e stats atuais
    #[arg(long)]
    show: bool,

    /// Grava a configuração efetiva em PATH e sai
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,
}

impl Cli {
    fn wants_config_write(&self) -> bool {
        self.set_sampling_ms.is_some() || self.set_threshold_mc.is_some() || self.set_mode.is_some()
    }
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);
    if let Some(device) = &cli.device {
        config.device.device_path = device.clone();
    }
    if let Some(dir) = &cli.sysfs {
        config.device.sysfs_dir = dir.clone();
    }

    let errors = config.validate();
    if !errors.is_empty() {
        bail!("Configuração inválida: {}", errors.join("; "));
    }

    if let Some(path) = &cli.save_config {
        config.save(path).context("gravar configuração")?;
        return Ok(ExitCode::SUCCESS);
    }

    let sysfs = Sysfs::new(&config.device.sysfs_dir);

    // ── Teste de aceitação ──
    if cli.test {
        return Ok(run_test(&config, &sysfs));
    }

    // ── Configuração ──
    if cli.wants_config_write() {
        apply_config(&cli, &sysfs)?;
        let stats = sysfs.stats().context("ler stats")?;
        println!("Configuração atualizada. Stats atuais:");
        println!("{stats}");
        return Ok(ExitCode::SUCCESS);
    }

    if cli.show {
        let snapshot = sysfs.snapshot().context("ler configuração atual")?;
        console::print_snapshot(&snapshot);
        return Ok(ExitCode::SUCCESS);
    }

    // ── Monitoramento (padrão) ──
    run_monitor(&config)
}

fn run_test(config: &AppConfig, sysfs: &Sysfs) -> ExitCode {
    let plan = AcceptancePlan::from(&config.acceptance);
    println!("--- Iniciando teste de aceitação ---");
    println!(
        "Configurando: mode={}, sampling_ms={}, threshold_mC={} (prazo {} ms)",
        plan.mode,
        plan.sampling_ms,
        plan.threshold_mc,
        plan.deadline().as_millis()
    );

    let device = config.device.device_path.clone();
    let report = run_acceptance(&plan, sysfs, |interest| Poller::open(&device, interest));
    console::print_report(&report);

    if report.outcome.is_pass() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Escreve na ordem sampling → threshold → mode. Qualquer falha aborta.
fn apply_config(cli: &Cli, sysfs: &Sysfs) -> Result<()> {
    if let Some(ms) = cli.set_sampling_ms {
        sysfs.set_sampling_ms(ms).context("definir sampling_ms")?;
        info!(sampling_ms = ms, "sampling_ms atualizado");
    }
    if let Some(mc) = cli.set_threshold_mc {
        sysfs.set_threshold_mc(mc).context("definir threshold_mC")?;
        info!(threshold_mc = mc, "threshold_mC atualizado");
    }
    if let Some(mode) = cli.set_mode {
        sysfs.set_mode(mode).context("definir mode")?;
        info!(%mode, "mode atualizado");
    }
    Ok(())
}

fn run_monitor(config: &AppConfig) -> Result<ExitCode> {
    let monitor_cfg = &config.monitor;
    let device = &config.device.device_path;

    let poller = Poller::open(device, DeviceEvents::MONITOR).context("abrir dispositivo")?;

    let (cancel, token) = cancellation();
    if monitor_cfg.cancels_on_signal() {
        install_signal_handler(cancel)?;
    } else {
        info!("poll_timeout_ms = 0: espera indefinida, Ctrl+C encerra o processo");
    }

    let worker = worker::spawn_monitor_thread(
        poller,
        monitor_cfg.poll_timeout(),
        monitor_cfg.channel_capacity,
        token,
    )
    .context("criar thread do monitor")?;

    console::print_monitor_header(device);

    let mut history = SampleHistory::new(monitor_cfg.history_size);
    let tick = monitor_cfg.drain_interval();

    // Consumidor: drena sem bloquear no seu próprio ritmo.
    while worker::drain_pending(&worker.rx, |event| console::print_event(event, &mut history)) {
        std::thread::sleep(tick);
    }

    let exit = worker.join();
    console::print_summary(&history, &exit.stats, exit.dropped);
    match exit.result {
        Ok(reason) => {
            console::print_stop(reason);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e).context("loop de monitoramento"),
    }
}

/// SIGINT/SIGTERM disparam o cancelamento do monitor.
fn install_signal_handler(cancel: CancelHandle) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("registrar sinais")?;
    std::thread::Builder::new()
        .name("simtemp-signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!(signal = sig, "Sinal recebido, encerrando monitor...");
                cancel.cancel();
            } else {
                warn!("Iterador de sinais encerrado");
            }
        })
        .context("criar thread de sinais")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_flags() {
        let cli = Cli::try_parse_from(["simtemp", "-s", "100", "-t", "-5000", "-m", "ramp"]).unwrap();
        assert_eq!(cli.set_sampling_ms, Some(100));
        assert_eq!(cli.set_threshold_mc, Some(-5000));
        assert_eq!(cli.set_mode, Some(SimMode::Ramp));
        assert!(cli.wants_config_write());
        assert!(!cli.test);
    }

    #[test]
    fn no_flags_means_monitor() {
        let cli = Cli::try_parse_from(["simtemp"]).unwrap();
        assert!(!cli.test && !cli.show && !cli.wants_config_write());
    }

    #[test]
    fn test_conflicts_with_config_writes() {
        assert!(Cli::try_parse_from(["simtemp", "--test", "-s", "100"]).is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["simtemp", "-m", "fast"]).is_err());
    }

    #[test]
    fn config_mode_writes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("mode", "normal"), ("sampling_ms", "1000"), ("threshold_mC", "27000")] {
            std::fs::write(dir.path().join(name), value).unwrap();
        }
        let sysfs = Sysfs::new(dir.path());
        let cli = Cli::try_parse_from(["simtemp", "-s", "250", "-m", "noisy"]).unwrap();
        apply_config(&cli, &sysfs).unwrap();
        assert_eq!(sysfs.sampling_ms().unwrap(), 250);
        assert_eq!(sysfs.threshold_mc().unwrap(), 27000);
        assert_eq!(std::fs::read_to_string(dir.path().join("mode")).unwrap(), "noisy");
    }

    #[test]
    fn config_write_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sysfs = Sysfs::new(dir.path());
        let cli = Cli::try_parse_from(["simtemp", "-t", "30000"]).unwrap();
        assert!(apply_config(&cli, &sysfs).is_err());
    }
}
