//! Command queue and completion engine for a symmetric/hash crypto accelerator
//! with a single accept register.
//!
//! Callers submit descriptor chains that were already built in device-visible
//! memory. The engine feeds them to the hardware in FIFO order, decodes the
//! status register when the hardware interrupts, recovers from faults with a
//! full reset, and hands each result back either to a blocked submitter or to
//! the owner's result pool.
//!
//! The interrupt path is split in two. [`Engine::handle_interrupt`] only moves
//! chains between states and returns a [`DeferredWork`]; [`Engine::run_deferred`]
//! does the reset, the delivery and the callbacks. [`Worker`] runs the second half
//! on its own thread.

pub mod api;
pub use api::*;
mod chain;
pub use chain::{Chain, ChainId, ChainResult, OwnerId, PostProcess};
mod config;
pub use config::EngineConfig;
mod dispatch;
mod engine;
pub use engine::{Callback, CancelToken, Engine};
mod hw;
pub use hw::Hardware;
mod manager;
mod poll;
mod power;
pub use power::PowerGate;
mod queue;
pub mod regs;
mod stats;
pub use stats::StatsSnapshot;
mod status;
pub use status::{DeferredWork, FaultOutcome};
pub mod translate;
mod worker;
pub use worker::Worker;

#[cfg(any(test, feature = "hosted"))]
pub mod hosted;
