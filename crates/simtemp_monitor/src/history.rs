//! Histórico das últimas amostras para o resumo de fim de sessão.

use simtemp_core::types::TelemetryRecord;
use std::collections::VecDeque;

/// Resumo estatístico do histórico (°C).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySummary {
    pub count: usize,
    pub min_c: f64,
    pub max_c: f64,
    pub mean_c: f64,
    pub flagged: usize,
}

/// Buffer circular de amostras.
pub struct SampleHistory {
    samples: VecDeque<TelemetryRecord>,
    capacity: usize,
    total_seen: u64,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total_seen: 0,
        }
    }

    pub fn push(&mut self, record: TelemetryRecord) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(record);
        self.total_seen += 1;
    }

    /// Amostras vistas desde o início, inclusive as que já saíram do buffer.
    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }

    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.samples.back()
    }

    /// `None` se vazio.
    pub fn summary(&self) -> Option<HistorySummary> {
        if self.samples.is_empty() {
            return None;
        }

        let mut min_c = f64::INFINITY;
        let mut max_c = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut flagged = 0;
        for rec in &self.samples {
            let t = rec.temp_celsius();
            min_c = min_c.min(t);
            max_c = max_c.max(t);
            sum += t;
            if rec.threshold_crossed() {
                flagged += 1;
            }
        }

        Some(HistorySummary {
            count: self.samples.len(),
            min_c,
            max_c,
            mean_c: sum / self.samples.len() as f64,
            flagged,
        })
    }
}
