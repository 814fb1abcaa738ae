//! # simtemp Core
//!
//! Crate compartilhada do monitor do sensor de temperatura simulado:
//! codec do registro binário, adaptador de `poll(2)`, cliente sysfs e
//! configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Registro de telemetria, flags e modo de simulação
//! - [`protocol`] – Encode/decode do registro de 16 bytes
//! - [`device`] – Conjunto de eventos e a trait [`EventSource`]
//! - [`poller`] – `EventSource` real sobre `poll(2)`
//! - [`sysfs`] – Atributos `mode`, `sampling_ms`, `threshold_mC`, `stats`
//! - [`config`] – Configuração unificada via TOML

pub mod config;
pub mod device;
pub mod poller;
pub mod protocol;
pub mod sysfs;
pub mod types;

// Re-exports convenientes
pub use config::AppConfig;
pub use device::{DeviceError, DeviceEvents, EventSource};
pub use poller::Poller;
pub use protocol::{CodecError, RECORD_SIZE, decode_record, encode_record};
pub use sysfs::{Sysfs, SysfsAttr, SysfsError};
pub use types::{RecordFlags, SimMode, TelemetryRecord};
