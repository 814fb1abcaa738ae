//! Configuração unificada via TOML.
//!
//! Todas as seções usam `#[serde(default)]`: um arquivo parcial só
//! sobrescreve o que declara.

use crate::types::SimMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Caminhos do dispositivo e do diretório sysfs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Dispositivo de caractere com o stream binário
    pub device_path: PathBuf,
    /// Diretório dos atributos sysfs
    pub sysfs_dir: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/simtemp"),
            sysfs_dir: PathBuf::from("/sys/class/simtemp/simtemp"),
        }
    }
}

/// Parâmetros do loop de monitoramento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Timeout de cada poll (ms). 0 = espera indefinida; Ctrl+C mata o processo
    pub poll_timeout_ms: u64,
    /// Capacidade do channel thread → consumidor
    pub channel_capacity: usize,
    /// Intervalo de drenagem do consumidor (ms)
    pub drain_interval_ms: u64,
    /// Amostras mantidas no histórico
    pub history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            channel_capacity: 64,
            drain_interval_ms: 100,
            history_size: 50,
        }
    }
}

impl MonitorConfig {
    pub fn poll_timeout(&self) -> Option<Duration> {
        (self.poll_timeout_ms > 0).then(|| Duration::from_millis(self.poll_timeout_ms))
    }

    /// Com espera indefinida o loop não reavalia o cancelamento sozinho:
    /// SIGINT/SIGTERM ficam com a ação padrão e encerram o processo.
    pub fn cancels_on_signal(&self) -> bool {
        self.poll_timeout().is_some()
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Parâmetros do teste de aceitação.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceConfig {
    pub mode: SimMode,
    pub sampling_ms: u32,
    pub threshold_mc: i32,
    /// Períodos de amostragem aguardados
    pub periods: u32,
    /// Margem fixa somada ao prazo (ms)
    pub margin_ms: u64,
    /// Configuração restaurada ao final
    pub baseline_sampling_ms: u32,
    pub baseline_threshold_mc: i32,
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            mode: SimMode::Normal,
            sampling_ms: 100,
            threshold_mc: 30_000,
            periods: 3,
            margin_ms: 100,
            baseline_sampling_ms: 1000,
            baseline_threshold_mc: 27_000,
        }
    }
}

/// Erros de persistência da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de E/S em {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub monitor: MonitorConfig,
    pub acceptance: AcceptanceConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ou inválido resulta na configuração padrão.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{} não encontrado, usando configuração padrão", path.display());
                return AppConfig::default();
            }
            Err(e) => {
                warn!("Erro ao ler {}: {e}, usando configuração padrão", path.display());
                return AppConfig::default();
            }
        };

        match toml::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Configuração carregada de {}", path.display());
                config
            }
            Err(e) => {
                warn!("Erro ao parsear {}: {e}, usando configuração padrão", path.display());
                AppConfig::default()
            }
        }
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do `simtemp.toml` (ao lado do executável).
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("simtemp.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.device.device_path.as_os_str().is_empty() {
            errors.push("Caminho do dispositivo não pode ser vazio".into());
        }
        if self.device.sysfs_dir.as_os_str().is_empty() {
            errors.push("Diretório sysfs não pode ser vazio".into());
        }
        if self.monitor.channel_capacity == 0 {
            errors.push("Capacidade do channel não pode ser 0".into());
        }
        if self.monitor.history_size == 0 {
            errors.push("Tamanho do histórico não pode ser 0".into());
        }
        if self.acceptance.sampling_ms == 0 {
            errors.push("sampling_ms do teste deve ser > 0".into());
        }
        if self.acceptance.baseline_sampling_ms == 0 {
            errors.push("baseline_sampling_ms deve ser > 0".into());
        }
        if self.acceptance.periods == 0 {
            errors.push("Número de períodos do teste deve ser > 0".into());
        }

        errors
    }
}
