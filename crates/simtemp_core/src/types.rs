//! Tipos do registro de telemetria e do modo de simulação.
//!
//! O driver entrega um registro binário de 16 bytes por amostra. Aqui fica a
//! representação decodificada; a codificação em bytes vive em [`crate::protocol`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ──────────────────────────────────────────────
// Flags do registro
// ──────────────────────────────────────────────

bitflags! {
    /// Bits do campo `flags` do registro.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RecordFlags: u32 {
        /// bit 0 – amostra nova
        const NEW_SAMPLE = 1 << 0;
        /// bit 1 – threshold cruzado
        const THRESHOLD_CROSSED = 1 << 1;
    }
}

// ──────────────────────────────────────────────
// Registro
// ──────────────────────────────────────────────

/// Uma amostra decodificada do dispositivo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TelemetryRecord {
    /// Instante da captura (ns)
    pub timestamp_ns: u64,
    /// Temperatura em mili-graus Celsius (44123 = 44.123 °C)
    pub temp_mc: i32,
    /// Flags brutas; bits desconhecidos são preservados
    pub flags: u32,
}

impl TelemetryRecord {
    pub fn new(timestamp_ns: u64, temp_mc: i32, flags: RecordFlags) -> Self {
        Self {
            timestamp_ns,
            temp_mc,
            flags: flags.bits(),
        }
    }

    /// Flags conhecidas, mantendo bits extras.
    pub fn flags(&self) -> RecordFlags {
        RecordFlags::from_bits_retain(self.flags)
    }

    /// Indicador autoritativo de alerta: bit 1 do campo `flags`.
    ///
    /// Independe do bit 0 e de qualquer outro bit.
    pub fn threshold_crossed(&self) -> bool {
        self.flags().contains(RecordFlags::THRESHOLD_CROSSED)
    }

    /// Temperatura em °C: `value_C = temp_mC / 1000.0`.
    ///
    /// Conversão de apresentação, não faz parte do contrato do codec.
    pub fn temp_celsius(&self) -> f64 {
        millis_to_celsius(self.temp_mc)
    }
}

/// Converte mili-graus para graus Celsius.
pub fn millis_to_celsius(temp_mc: i32) -> f64 {
    f64::from(temp_mc) / 1000.0
}

// ──────────────────────────────────────────────
// Modo de simulação
// ──────────────────────────────────────────────

/// Modos aceitos pelo atributo `mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    #[default]
    Normal,
    Noisy,
    Ramp,
}

impl SimMode {
    pub const ALL: [SimMode; 3] = [SimMode::Normal, SimMode::Noisy, SimMode::Ramp];

    pub fn as_str(self) -> &'static str {
        match self {
            SimMode::Normal => "normal",
            SimMode::Noisy => "noisy",
            SimMode::Ramp => "ramp",
        }
    }
}

impl fmt::Display for SimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modo desconhecido.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Modo inválido: '{0}' (aceitos: normal, noisy, ramp)")]
pub struct UnknownMode(pub String);

impl FromStr for SimMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SimMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
