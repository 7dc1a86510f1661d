//! Maps raw hardware diagnostics to [`ResultCode`]s.
//!
//! Both translators are total: every 32-bit input yields a result, falling back to
//! `InternalError` (error status) or `Error` (op status) when nothing more
//! specific applies.
use num_traits::FromPrimitive;

use crate::api::ResultCode;
use crate::regs::*;

/// Indexed by the 4-bit error source. The CHA and DMA entries are only used if
/// the second-level lookup is bypassed.
const ERROR_SOURCE_TABLE: [ResultCode; 16] = [
    ResultCode::InternalError, // no error reported
    ResultCode::BadDataLength, // header
    ResultCode::BadDataLength, // descriptor length
    ResultCode::BadDataLength, // descriptor pointer
    ResultCode::BadDataLength, // link length
    ResultCode::BadDataLength, // link pointer
    ResultCode::BadDataLength, // input buffer
    ResultCode::BadDataLength, // output buffer
    ResultCode::BadDataLength, // output buffer starvation
    ResultCode::InternalError, // internal state fault
    ResultCode::BadDataLength, // general descriptor problem
    ResultCode::BadDataLength, // reserved field nonzero
    ResultCode::BadDataLength, // descriptor address
    ResultCode::BadDataLength, // link address
    ResultCode::InternalError, // CHA
    ResultCode::InternalError, // DMA
];

const DMA_STATUS_TABLE: [ResultCode; 8] = [
    ResultCode::InternalError, // none
    ResultCode::InternalError, // AHB bus error
    ResultCode::InternalError, // reserved
    ResultCode::InternalError, // IP bus error
    ResultCode::InternalError, // reserved
    ResultCode::InternalError, // parity error
    ResultCode::InternalError, // reserved
    ResultCode::BadDataLength, // transfer crossed a 1k boundary
];

/// Indexed by the 1-based position of the highest CHA error bit.
const CHA_STATUS_TABLE: [ResultCode; 13] = [
    ResultCode::InternalError, // no bit set
    ResultCode::BadDataLength, // SKHA data size
    ResultCode::BadKeyLength,  // SKHA key size
    ResultCode::BadMode,       // SKHA mode
    ResultCode::InternalError, // context read/write
    ResultCode::BadKeyParity,  // key parity
    ResultCode::InternalError, // SKHA internal
    ResultCode::BadDataLength, // MDHA data size
    ResultCode::BadMode,       // MDHA mode
    ResultCode::BadKeyLength,  // MDHA key size
    ResultCode::InternalError, // MDHA internal
    ResultCode::InternalError, // RNG
    ResultCode::InternalError, // CHA internal
];

/// PKHA detail codes.
pub const PKHA_POINT_AT_INFINITY: u32 = 1;
pub const PKHA_POINT_NOT_AT_INFINITY: u32 = 2;
pub const PKHA_GCD_IS_ONE: u32 = 3;
pub const PKHA_GCD_IS_NOT_ONE: u32 = 4;
pub const PKHA_PRIME: u32 = 5;
pub const PKHA_NOT_PRIME: u32 = 6;
pub const PKHA_EVEN_MODULUS: u32 = 7;
pub const PKHA_DIVIDE_BY_ZERO: u32 = 8;
pub const PKHA_BAD_EXPONENT: u32 = 9;

pub const MDHA_AUTH_FAILED: u32 = 1;
pub const RNG_OSCILLATOR: u32 = 1;
pub const RNG_STATISTICS: u32 = 2;

/// Translates the error-status word captured for a chain that raised an error.
pub fn translate_error_status(raw: u32) -> ResultCode {
    match error_source(raw) {
        ERR_SOURCE_DMA => {
            // busy (9) and internal (13) also land here, past the end of the table
            DMA_STATUS_TABLE.get(dma_status(raw) as usize).copied().unwrap_or(ResultCode::InternalError)
        }
        ERR_SOURCE_CHA => CHA_STATUS_TABLE[cha_error_index(raw)],
        source => ERROR_SOURCE_TABLE[source as usize],
    }
}

/// Translates the op-status word of a chain the hardware reported as done.
pub fn translate_op_status(raw: u32) -> ResultCode {
    let detail = op_detail(raw);
    match (OpSource::from_u32(op_source(raw)), detail) {
        (Some(OpSource::None), 0) => ResultCode::Ok,
        (Some(OpSource::Mdha), MDHA_AUTH_FAILED) => ResultCode::AuthFailed,
        (Some(OpSource::Rng), RNG_OSCILLATOR) => ResultCode::OscillatorError,
        (Some(OpSource::Rng), RNG_STATISTICS) => ResultCode::StatisticsError,
        (Some(OpSource::Pkha), d) => match d {
            PKHA_POINT_AT_INFINITY => ResultCode::PointAtInfinity,
            PKHA_POINT_NOT_AT_INFINITY => ResultCode::PointNotAtInfinity,
            PKHA_GCD_IS_ONE => ResultCode::GcdIsOne,
            PKHA_GCD_IS_NOT_ONE => ResultCode::GcdIsNotOne,
            PKHA_PRIME => ResultCode::Prime,
            PKHA_NOT_PRIME => ResultCode::NotPrime,
            PKHA_EVEN_MODULUS => ResultCode::EvenModulusError,
            PKHA_DIVIDE_BY_ZERO => ResultCode::DivideByZeroError,
            PKHA_BAD_EXPONENT => ResultCode::BadExponentError,
            _ => ResultCode::Error,
        },
        _ => ResultCode::Error,
    }
}
