//! Saída de texto do monitor e do teste de aceitação.

use crate::acceptance::{AcceptanceReport, TestOutcome};
use crate::history::SampleHistory;
use crate::monitor::{MonitorEvent, SessionStats, StopReason};
use chrono::{Local, TimeZone};
use simtemp_core::protocol::RECORD_SIZE;
use simtemp_core::sysfs::SysfsSnapshot;
use simtemp_core::types::TelemetryRecord;

const RULE: &str = "──────────────────────────────────────────────────";

/// `timestamp_ns` como ISO-8601 local com milissegundos.
pub fn format_timestamp(timestamp_ns: u64) -> String {
    let nanos = i64::try_from(timestamp_ns).unwrap_or(i64::MAX);
    Local
        .timestamp_nanos(nanos)
        .format("%Y-%m-%dT%H:%M:%S%.3f")
        .to_string()
}

/// Uma linha da tabela: `timestamp | temp °C | alerta`.
pub fn format_sample(record: &TelemetryRecord) -> String {
    format!(
        "{} | {:8.3} | {}",
        format_timestamp(record.timestamp_ns),
        record.temp_celsius(),
        record.threshold_crossed()
    )
}

pub fn print_monitor_header(device: &std::path::Path) {
    println!("Monitorando {} (registro = {RECORD_SIZE} bytes)...", device.display());
    println!("Timestamp (ISO)         | Temp (C) | Alerta");
    println!("{RULE}");
}

/// Imprime um evento e alimenta o histórico.
pub fn print_event(event: MonitorEvent, history: &mut SampleHistory) {
    match event {
        MonitorEvent::Sample(record) => {
            println!("{}", format_sample(&record));
            history.push(record);
        }
        MonitorEvent::Alert => println!("!!! EVENTO DE THRESHOLD (POLLPRI) RECEBIDO !!!"),
        // Já registrado pelo monitor.
        MonitorEvent::ShortRead { .. } => {}
    }
}

pub fn print_stop(reason: StopReason) {
    match reason {
        StopReason::EndOfStream => println!("Fim de arquivo (módulo descarregado?). Encerrando."),
        StopReason::Cancelled => println!("\nMonitoramento interrompido pelo usuário."),
        StopReason::IoError => println!("Monitoramento encerrado por erro de E/S."),
    }
}

/// Linhas do resumo de fim de sessão.
pub fn summary_lines(history: &SampleHistory, stats: &SessionStats, dropped: u64) -> Vec<String> {
    let mut lines = Vec::new();
    match (history.summary(), history.latest()) {
        (Some(s), Some(last)) => {
            lines.push(format!(
                "Amostras: {} (janela {}) | min {:.3} °C | max {:.3} °C | média {:.3} °C | última {:.3} °C",
                history.total_seen(),
                s.count,
                s.min_c,
                s.max_c,
                s.mean_c,
                last.temp_celsius()
            ));
            lines.push(format!("Flag de alerta na janela: {}", s.flagged));
        }
        _ => lines.push("Nenhuma amostra recebida".into()),
    }
    lines.push(format!(
        "Despertares: {} | timeouts: {} | leituras: {} | registros: {} (com flag {}) | POLLPRI: {} | leituras curtas: {}",
        stats.wakeups,
        stats.timeouts,
        stats.reads,
        stats.records,
        stats.flagged_records,
        stats.priority_events,
        stats.short_reads
    ));
    if dropped > 0 {
        lines.push(format!("ATENÇÃO: {dropped} eventos descartados (consumidor lento)"));
    }
    lines
}

pub fn print_summary(history: &SampleHistory, stats: &SessionStats, dropped: u64) {
    println!("{RULE}");
    for line in summary_lines(history, stats, dropped) {
        println!("{line}");
    }
}

pub fn print_snapshot(snapshot: &SysfsSnapshot) {
    println!("sampling_ms  = {}", snapshot.sampling_ms);
    println!(
        "threshold_mC = {} ({:.3} °C)",
        snapshot.threshold_mc,
        simtemp_core::types::millis_to_celsius(snapshot.threshold_mc)
    );
    println!("stats:\n{}", snapshot.stats);
}

pub fn print_report(report: &AcceptanceReport) {
    match &report.outcome {
        TestOutcome::Pass => {
            println!("\n--- TESTE PASSOU (PASS) ---");
            println!("Evento POLLPRI (alerta de threshold) recebido corretamente.");
        }
        TestOutcome::Fail(reason) => {
            println!("\n--- TESTE FALHOU (FAIL) ---");
            println!("Motivo: {reason}");
            println!("Prazo: {} ms", report.deadline.as_millis());
            if let Some(stats) = &report.stats {
                println!("Stats atuais: {stats}");
            }
        }
    }
    for e in &report.cleanup_errors {
        println!("Aviso: restauração incompleta: {e}");
    }
}
