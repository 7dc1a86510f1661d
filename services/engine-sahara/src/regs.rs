//! Bit layouts of the accelerator's diagnostic registers.
//!
//! Only the fields the completion path needs are described here; everything else
//! in these registers is reserved.
use bitflags::*;

bitflags! {
    /// Status register. Bits [2:0] carry the execution state.
    pub struct Status: u32 {
        const STATE_MASK = 0b111;
        /// Set in every state where slot 1 has finished.
        const DONE1      = 0b100;
    }
}

bitflags! {
    /// Error-status register. Reading it clears it.
    pub struct ErrorStatus: u32 {
        const SOURCE_MASK     = 0x0000_000F;
        const DMA_STATUS_MASK = 0x0000_F000;
        /// One bit per sub-unit failure reason.
        const CHA_STATUS_MASK = 0x0FFF_0000;
    }
}

pub const ERR_SOURCE_POS: u32 = 0;
pub const ERR_DMA_STATUS_POS: u32 = 12;
pub const ERR_CHA_STATUS_POS: u32 = 16;

/// Error sources that need a second-level lookup.
pub const ERR_SOURCE_CHA: u32 = 14;
pub const ERR_SOURCE_DMA: u32 = 15;

bitflags! {
    /// Operation-status register: sub-unit detail after a chain that "completed".
    pub struct OpStatus: u32 {
        const DETAIL_MASK = 0b000_00_111111;
        const SOURCE_MASK = 0b111_00_000000;
    }
}

pub const OP_DETAIL_POS: u32 = 0;
pub const OP_SOURCE_POS: u32 = 8;

/// Which sub-unit produced the op-status detail.
#[derive(num_derive::FromPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpSource {
    None = 0,
    /// Symmetric cipher unit.
    Skha = 1,
    /// Hash unit.
    Mdha = 2,
    Rng = 3,
    /// Public-key unit.
    Pkha = 4,
}

#[inline]
fn field(raw: u32, mask: u32, pos: u32) -> u32 { (raw & mask) >> pos }

pub fn exec_state_bits(raw: u32) -> u32 { raw & Status::STATE_MASK.bits() }

pub fn error_source(raw: u32) -> u32 { field(raw, ErrorStatus::SOURCE_MASK.bits(), ERR_SOURCE_POS) }

pub fn dma_status(raw: u32) -> u32 { field(raw, ErrorStatus::DMA_STATUS_MASK.bits(), ERR_DMA_STATUS_POS) }

/// 1-based position of the highest set CHA error bit, or 0 when none is set.
pub fn cha_error_index(raw: u32) -> usize {
    let cha = field(raw, ErrorStatus::CHA_STATUS_MASK.bits(), ERR_CHA_STATUS_POS);
    (u32::BITS - cha.leading_zeros()) as usize
}

pub fn op_source(raw: u32) -> u32 { field(raw, OpStatus::SOURCE_MASK.bits(), OP_SOURCE_POS) }

pub fn op_detail(raw: u32) -> u32 { field(raw, OpStatus::DETAIL_MASK.bits(), OP_DETAIL_POS) }

/// Builds an error-status word. Used by the emulator and tests.
pub fn make_error_status(source: u32, dma: u32, cha_bits: u32) -> u32 {
    (source << ERR_SOURCE_POS) & ErrorStatus::SOURCE_MASK.bits()
        | (dma << ERR_DMA_STATUS_POS) & ErrorStatus::DMA_STATUS_MASK.bits()
        | (cha_bits << ERR_CHA_STATUS_POS) & ErrorStatus::CHA_STATUS_MASK.bits()
}

/// Builds an op-status word. Used by the emulator and tests.
pub fn make_op_status(source: OpSource, detail: u32) -> u32 {
    ((source as u32) << OP_SOURCE_POS) & OpStatus::SOURCE_MASK.bits()
        | (detail << OP_DETAIL_POS) & OpStatus::DETAIL_MASK.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cha_index_picks_highest_bit() {
        assert_eq!(cha_error_index(make_error_status(ERR_SOURCE_CHA, 0, 0)), 0);
        assert_eq!(cha_error_index(make_error_status(ERR_SOURCE_CHA, 0, 0b1)), 1);
        assert_eq!(cha_error_index(make_error_status(ERR_SOURCE_CHA, 0, 0b1010)), 4);
        assert_eq!(cha_error_index(make_error_status(ERR_SOURCE_CHA, 0, 0x800)), 12);
    }

    #[test]
    fn fields_do_not_overlap() {
        let raw = make_error_status(ERR_SOURCE_DMA, 7, 0xFFF);
        assert_eq!(error_source(raw), ERR_SOURCE_DMA);
        assert_eq!(dma_status(raw), 7);
        let op = make_op_status(OpSource::Pkha, 0x3F);
        assert_eq!(op_source(op), OpSource::Pkha as u32);
        assert_eq!(op_detail(op), 0x3F);
    }
}
