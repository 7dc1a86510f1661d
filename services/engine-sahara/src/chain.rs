use core::fmt;

use crate::api::{ChainState, DeliveryMode, ResultCode};

/// Identifies a registered result owner.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub(crate) u32);

/// Engine-assigned identity of a submitted chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub(crate) u64);

/// Runs after a chain's buffers have been invalidated, when its owner drains it.
pub type PostProcess = Box<dyn FnOnce() + Send>;

/// Head record of one descriptor chain.
///
/// The descriptors themselves were built and made device-visible by the caller;
/// the engine only tracks the chain's physical address and bookkeeping.
pub struct Chain {
    pub(crate) id: ChainId,
    pub(crate) hardware_address: u32,
    pub(crate) state: ChainState,
    pub(crate) result: ResultCode,
    pub(crate) error_status: u32,
    pub(crate) op_status: u32,
    pub(crate) fault_address: u32,
    pub(crate) delivery: DeliveryMode,
    pub(crate) owner: Option<OwnerId>,
    pub(crate) user_ref: u32,
    /// Times this chain went back onto the hardware after a reset.
    pub(crate) replays: u32,
    /// The submitter stopped waiting; the result is discarded at dispatch.
    pub(crate) abandoned: bool,
    pub(crate) post_process: Option<PostProcess>,
}

impl Chain {
    pub fn new(hardware_address: u32) -> Chain {
        Chain {
            id: ChainId(0),
            hardware_address,
            state: ChainState::Pending,
            result: ResultCode::Ok,
            error_status: 0,
            op_status: 0,
            fault_address: 0,
            delivery: DeliveryMode::Blocking,
            owner: None,
            user_ref: 0,
            replays: 0,
            abandoned: false,
            post_process: None,
        }
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Chain {
        self.delivery = delivery;
        self
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Chain {
        self.owner = Some(owner);
        self
    }

    /// Opaque value echoed back in the [`ChainResult`].
    pub fn with_user_ref(mut self, user_ref: u32) -> Chain {
        self.user_ref = user_ref;
        self
    }

    pub fn with_post_process<F: FnOnce() + Send + 'static>(mut self, f: F) -> Chain {
        self.post_process = Some(Box::new(f));
        self
    }

    pub fn id(&self) -> ChainId { self.id }

    pub fn hardware_address(&self) -> u32 { self.hardware_address }

    pub fn state(&self) -> ChainState { self.state }

    pub fn result(&self) -> ResultCode { self.result }

    pub fn error_status(&self) -> u32 { self.error_status }

    pub fn op_status(&self) -> u32 { self.op_status }

    pub fn fault_address(&self) -> u32 { self.fault_address }

    pub fn delivery(&self) -> DeliveryMode { self.delivery }

    pub fn owner(&self) -> Option<OwnerId> { self.owner }

    pub(crate) fn finish(&mut self, result: ResultCode, error_status: u32) {
        self.result = result;
        self.error_status = error_status;
        self.state = ChainState::OffHardware;
    }

    pub(crate) fn to_result(&self) -> ChainResult {
        ChainResult {
            user_ref: self.user_ref,
            hardware_address: self.hardware_address,
            code: self.result,
            detail1: self.fault_address,
            detail2: self.op_status,
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("hardware_address", &format_args!("{:08x}", self.hardware_address))
            .field("state", &self.state)
            .field("result", &self.result)
            .field("error_status", &format_args!("{:08x}", self.error_status))
            .field("delivery", &self.delivery)
            .field("owner", &self.owner)
            .finish()
    }
}

/// What an owner gets back when it drains its result pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChainResult {
    pub user_ref: u32,
    pub hardware_address: u32,
    pub code: ResultCode,
    /// Fault address captured with the error, or 0.
    pub detail1: u32,
    /// Raw op status captured at completion.
    pub detail2: u32,
}
