//! Cliente dos atributos sysfs do driver.
//!
//! Os caminhos só podem ser formados a partir de [`SysfsAttr`], um conjunto
//! fechado de nomes conhecidos. Não existe construção de caminho a partir de
//! texto arbitrário.

use crate::types::SimMode;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Atributos consumidos pelo monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysfsAttr {
    /// `normal` | `noisy` | `ramp` (escrita)
    Mode,
    /// Período de amostragem em ms, > 0 (leitura/escrita)
    SamplingMs,
    /// Threshold em mili-°C (leitura/escrita)
    ThresholdMc,
    /// Texto de diagnóstico (somente leitura)
    Stats,
}

impl SysfsAttr {
    pub const fn file_name(self) -> &'static str {
        match self {
            SysfsAttr::Mode => "mode",
            SysfsAttr::SamplingMs => "sampling_ms",
            SysfsAttr::ThresholdMc => "threshold_mC",
            SysfsAttr::Stats => "stats",
        }
    }
}

/// Erros de acesso ao sysfs.
#[derive(Debug, thiserror::Error)]
pub enum SysfsError {
    #[error("Erro ao ler {}: {source} (módulo carregado?)", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Erro ao escrever em {}: {source} (executou com sudo?)", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Valor inesperado em {attr}: '{value}'")]
    Parse { attr: &'static str, value: String },

    #[error("Valor inválido para {attr}: {reason}")]
    InvalidValue { attr: &'static str, reason: String },
}

impl SysfsError {
    /// O atributo envolvido, quando conhecido.
    pub fn attr_name(&self) -> Option<&str> {
        match self {
            SysfsError::ReadFailed { path, .. } | SysfsError::WriteFailed { path, .. } => {
                path.file_name().and_then(|n| n.to_str())
            }
            SysfsError::Parse { attr, .. } | SysfsError::InvalidValue { attr, .. } => Some(*attr),
        }
    }
}

/// Valores correntes lidos do driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsSnapshot {
    pub sampling_ms: u32,
    pub threshold_mc: i32,
    pub stats: String,
}

/// Diretório de atributos de um dispositivo.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Sysfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, attr: SysfsAttr) -> PathBuf {
        self.root.join(attr.file_name())
    }

    // ── Escrita ──

    pub fn set_mode(&self, mode: SimMode) -> Result<(), SysfsError> {
        self.write(SysfsAttr::Mode, mode.as_str())
    }

    /// Rejeita 0 sem tocar no arquivo.
    pub fn set_sampling_ms(&self, ms: u32) -> Result<(), SysfsError> {
        if ms == 0 {
            return Err(SysfsError::InvalidValue {
                attr: SysfsAttr::SamplingMs.file_name(),
                reason: "deve ser > 0".into(),
            });
        }
        self.write(SysfsAttr::SamplingMs, &ms.to_string())
    }

    pub fn set_threshold_mc(&self, threshold_mc: i32) -> Result<(), SysfsError> {
        self.write(SysfsAttr::ThresholdMc, &threshold_mc.to_string())
    }

    // ── Leitura ──

    pub fn sampling_ms(&self) -> Result<u32, SysfsError> {
        self.read_parsed(SysfsAttr::SamplingMs)
    }

    pub fn threshold_mc(&self) -> Result<i32, SysfsError> {
        self.read_parsed(SysfsAttr::ThresholdMc)
    }

    pub fn stats(&self) -> Result<String, SysfsError> {
        self.read(SysfsAttr::Stats)
    }

    pub fn snapshot(&self) -> Result<SysfsSnapshot, SysfsError> {
        Ok(SysfsSnapshot {
            sampling_ms: self.sampling_ms()?,
            threshold_mc: self.threshold_mc()?,
            stats: self.stats()?,
        })
    }

    // ── Acesso bruto ──

    /// Uma única escrita por atributo. O arquivo precisa existir: atributos
    /// sysfs nunca são criados pelo espaço de usuário.
    fn write(&self, attr: SysfsAttr, value: &str) -> Result<(), SysfsError> {
        let path = self.path_of(attr);
        let result = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .and_then(|mut f| f.write_all(value.as_bytes()));
        match result {
            Ok(()) => {
                debug!(attr = attr.file_name(), value, "sysfs escrito");
                Ok(())
            }
            Err(source) => Err(SysfsError::WriteFailed { path, source }),
        }
    }

    fn read(&self, attr: SysfsAttr) -> Result<String, SysfsError> {
        let path = self.path_of(attr);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content.trim().to_string()),
            Err(source) => Err(SysfsError::ReadFailed { path, source }),
        }
    }

    fn read_parsed<T: std::str::FromStr>(&self, attr: SysfsAttr) -> Result<T, SysfsError> {
        let value = self.read(attr)?;
        value.parse().map_err(|_| SysfsError::Parse {
            attr: attr.file_name(),
            value,
        })
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
