use core::fmt;

/// API-level result of running a descriptor chain.
///
/// The numeric values are part of the result record handed back to callers and
/// must not be reordered.
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// No error. For an asynchronous submit this only means the chain was accepted.
    Ok = 0,
    /// Failure for a non-specific reason.
    Error = 1,
    /// Some resource could not be allocated.
    NoResource = 2,
    /// Algorithm unrecognized or improper.
    BadAlgorithm = 3,
    /// Mode unrecognized or improper.
    BadMode = 4,
    /// Flag setting unrecognized or inconsistent.
    BadFlag = 5,
    /// Improper or unsupported key length.
    BadKeyLength = 6,
    /// Improper parity in a (T)DES key.
    BadKeyParity = 7,
    /// Improper data length, or a malformed descriptor.
    BadDataLength = 8,
    /// Authentication / integrity check failed.
    AuthFailed = 9,
    MemoryError = 10,
    /// An error internal to the hardware occurred.
    InternalError = 11,
    PointAtInfinity = 12,
    PointNotAtInfinity = 13,
    GcdIsOne = 14,
    GcdIsNotOne = 15,
    Prime = 16,
    NotPrime = 17,
    EvenModulusError = 18,
    DivideByZeroError = 19,
    BadExponentError = 20,
    /// RNG oscillator problem.
    OscillatorError = 21,
    /// RNG statistics problem.
    StatisticsError = 22,
}

impl ResultCode {
    pub fn is_success(self) -> bool { self == ResultCode::Ok }
}

/// Lifecycle of a descriptor chain while the engine owns it.
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Queued, waiting for the accept register.
    Pending = 1,
    /// Written to the accept register; the hardware owns it.
    OnHardware = 2,
    /// The hardware is done with it; waiting for completion dispatch.
    OffHardware = 3,
    Complete = 4,
    Failed = 5,
    /// Pulled back by a hardware reset; will be replayed.
    Reset = 6,
}

/// Execution state decoded from the status register.
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExecState {
    Idle = 0,
    Busy = 1,
    Error1 = 2,
    Fault = 3,
    Done1 = 4,
    Done1Busy2 = 5,
    Done1Error2 = 6,
    Done1Done2 = 7,
}

impl ExecState {
    /// The "slot 1 finished" bit is shared by every `Done1*` state.
    pub fn slot1_done(self) -> bool { (self as u32) & crate::regs::Status::DONE1.bits() != 0 }

    /// Any state in which the hardware has stopped working on slot 1.
    pub fn is_terminal(self) -> bool { !matches!(self, ExecState::Idle | ExecState::Busy) }
}

/// How the result of a chain reaches its submitter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// The submitting thread sleeps until the chain is processed.
    Blocking,
    /// Result goes to the owner's pool, then the owner's callback is invoked.
    Callback,
    /// Result goes to the owner's pool; the owner drains it when it likes.
    PoolOnly,
}

/// Number of chains the hardware may hold at once.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotMode {
    Single,
    /// Variant hardware that reports compound `Done1*` states.
    Dual,
}

impl SlotMode {
    pub fn slots(self) -> usize {
        match self {
            SlotMode::Single => 1,
            SlotMode::Dual => 2,
        }
    }
}

/// Whether completion is learned by interrupt or by busy-polling the status register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecMode {
    Interrupt,
    Poll,
}

/// Stored in a chain's `error_status` when it was in flight during a fault and
/// nothing the hardware reports about it can be trusted (-1 as an `i32`).
pub const ERROR_STATUS_NO_DIAGNOSTIC: u32 = 0xFFFF_FFFF;

/// Engine-level failures. Chain-level failures are reported as [`ResultCode`]s.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Queue or pool storage could not be reserved.
    NoMemory,
    /// A worker thread could not be started.
    NoResource,
    /// The chain names an owner that is not registered.
    UnknownOwner,
    /// A chain with this hardware address is already queued.
    DuplicateChain,
    /// A blocking wait was abandoned by its caller.
    Interrupted,
    /// In-flight work did not drain within the suspend budget.
    SuspendTimeout,
    /// The power gate is asserted and the submission path cannot queue.
    Suspended,
    /// The engine has been shut down.
    Shutdown,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NoMemory => write!(f, "could not allocate engine storage"),
            EngineError::NoResource => write!(f, "could not start the deferred worker"),
            EngineError::UnknownOwner => write!(f, "owner is not registered"),
            EngineError::DuplicateChain => write!(f, "descriptor chain is already queued"),
            EngineError::Interrupted => write!(f, "blocking wait was interrupted"),
            EngineError::SuspendTimeout => write!(f, "hardware did not go idle before suspend"),
            EngineError::Suspended => write!(f, "engine is suspended"),
            EngineError::Shutdown => write!(f, "engine is shut down"),
        }
    }
}

impl std::error::Error for EngineError {}
