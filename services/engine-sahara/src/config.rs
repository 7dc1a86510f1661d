use std::time::Duration;

use crate::api::{ExecMode, SlotMode};

/// Build-time knobs of the engine. `Default` matches the single-slot,
/// interrupt-driven part.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub slot_mode: SlotMode,
    pub exec_mode: ExecMode,
    /// Initial reservation for the chain queue.
    pub queue_capacity: usize,
    /// Poll mode: status reads before giving up on a chain.
    pub poll_retries: u32,
    pub poll_interval: Duration,
    /// Suspend: checks for in-flight work before giving up.
    pub suspend_retries: u32,
    pub suspend_interval: Duration,
    /// Deferred worker watchdog. A chain on the hardware longer than this with no
    /// interrupt is treated as a fault. `None` disables the watchdog.
    pub hw_timeout: Option<Duration>,
    /// How often a chain pulled back by a reset is put on the hardware again.
    pub max_replays: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            slot_mode: SlotMode::Single,
            exec_mode: ExecMode::Interrupt,
            queue_capacity: 64,
            poll_retries: 10_000,
            poll_interval: Duration::from_micros(10),
            suspend_retries: 1_000,
            suspend_interval: Duration::from_micros(100),
            hw_timeout: Some(Duration::from_secs(1)),
            max_replays: 3,
        }
    }
}

impl EngineConfig {
    pub fn dual_slot() -> Self { EngineConfig { slot_mode: SlotMode::Dual, ..Default::default() } }

    pub fn polled() -> Self { EngineConfig { exec_mode: ExecMode::Poll, ..Default::default() } }
}
