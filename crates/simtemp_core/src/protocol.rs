//! Codec do registro binário entregue pelo dispositivo.
//!
//! Formato (16 bytes, sem padding, ordem de bytes nativa do produtor):
//!
//! ```text
//! ┌──────────────────┬─────────────┬───────────┐
//! │ timestamp_ns (8) │ temp_mC (4) │ flags (4) │
//! └──────────────────┴─────────────┴───────────┘
//! ```
//!
//! O dispositivo é uma fonte de registros atômicos, não um stream de bytes:
//! cada `read` devolve um registro completo ou é tratado como erro pelo
//! chamador. Não há bufferização de registros parciais.

use crate::types::TelemetryRecord;

/// Tamanho fixo do registro no fio.
pub const RECORD_SIZE: usize = 16;

const TIMESTAMP_END: usize = 8;
const TEMP_END: usize = 12;

/// Erros do codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Tamanho de registro inválido: {actual} bytes (esperado {expected})")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Decodifica exatamente [`RECORD_SIZE`] bytes em [`TelemetryRecord`].
///
/// Função pura: qualquer outro tamanho falha com [`CodecError::SizeMismatch`]
/// sem interpretar nenhum campo.
pub fn decode_record(data: &[u8]) -> Result<TelemetryRecord, CodecError> {
    let raw: &[u8; RECORD_SIZE] = data.try_into().map_err(|_| CodecError::SizeMismatch {
        expected: RECORD_SIZE,
        actual: data.len(),
    })?;

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&raw[..TIMESTAMP_END]);
    let mut temp = [0u8; 4];
    temp.copy_from_slice(&raw[TIMESTAMP_END..TEMP_END]);
    let mut flags = [0u8; 4];
    flags.copy_from_slice(&raw[TEMP_END..]);

    Ok(TelemetryRecord {
        timestamp_ns: u64::from_ne_bytes(ts),
        temp_mc: i32::from_ne_bytes(temp),
        flags: u32::from_ne_bytes(flags),
    })
}

/// Codifica um registro no layout do driver.
///
/// Usado por ferramentas de teste e por fontes simuladas.
pub fn encode_record(record: &TelemetryRecord) -> [u8; RECORD_SIZE] {
    let mut frame = [0u8; RECORD_SIZE];
    frame[..TIMESTAMP_END].copy_from_slice(&record.timestamp_ns.to_ne_bytes());
    frame[TIMESTAMP_END..TEMP_END].copy_from_slice(&record.temp_mc.to_ne_bytes());
    frame[TEMP_END..].copy_from_slice(&record.flags.to_ne_bytes());
    frame
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
