//! Top half: decodes the status register and moves chains off the hardware.
use std::time::Instant;

use num_traits::FromPrimitive;

use crate::api::*;
use crate::chain::ChainId;
use crate::engine::{Engine, Inner};
use crate::hw::Hardware;
use crate::regs::exec_state_bits;
use crate::translate::{translate_error_status, translate_op_status};

/// How a fault was pinned on the chains that were in flight.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Nothing was on the hardware.
    NoChain,
    /// The oldest in-flight chain faulted; any chain behind it is replayed.
    First,
    /// The second chain was being fetched; the first completed, the second is
    /// replayed.
    Second,
    /// The in-progress address matched nothing. Every in-flight chain failed.
    Unresolved,
}

/// What the deferred half has to do after an interrupt.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DeferredWork {
    /// The interrupt came from this engine.
    pub handled: bool,
    pub reset_required: bool,
    /// Chains moved to `OffHardware` by this invocation.
    pub completed: usize,
    pub fault: Option<FaultOutcome>,
}

impl DeferredWork {
    pub fn needs_deferral(&self) -> bool { self.reset_required || self.completed > 0 }
}

impl<H: Hardware> Engine<H> {
    /// Interrupt-context entry point. Never sleeps; the lock is held only while
    /// chain states change.
    pub fn handle_interrupt(&self) -> DeferredWork {
        let mut work = DeferredWork::default();
        let mut inner = self.lock();
        self.stats.interrupts();
        loop {
            let raw = self.hw.read_status();
            let state = ExecState::from_u32(exec_state_bits(raw));
            log::trace!("status {:08x} -> {:?}", raw, state);
            let again = match state {
                Some(s) if s.slot1_done() || s == ExecState::Error1 => {
                    work.handled = true;
                    if !self.retire(&mut inner, s == ExecState::Error1, &mut work) {
                        log::warn!("{:?} with nothing on the hardware", s);
                        self.stats.spurious();
                        self.hw.clear_interrupt();
                        break;
                    }
                    match s {
                        ExecState::Error1 => self.stats.errors(),
                        ExecState::Done1Busy2 => self.stats.done1_busy2(),
                        ExecState::Done1Done2 => {
                            self.stats.done1_done2();
                            if !self.retire(&mut inner, false, &mut work) {
                                log::warn!("second completion with one chain on the hardware");
                            }
                        }
                        _ => self.stats.done1(),
                    }
                    s == ExecState::Done1Error2
                }
                Some(ExecState::Fault) => {
                    work.handled = true;
                    self.fault(&mut inner, &mut work);
                    false
                }
                other => {
                    log::error!("unexpected execution state {:?} (status {:08x})", other, raw);
                    false
                }
            };
            self.hw.clear_interrupt();
            if !again {
                break;
            }
        }
        // a shared line raising interrupts that are not ours must not feed the watchdog
        if work.handled {
            inner.last_progress = Instant::now();
        }
        self.prime_next(&mut inner);
        work
    }

    /// Watchdog entry point: nothing has been heard from the hardware for too
    /// long, so treat it as a fault.
    pub fn handle_timeout(&self) -> DeferredWork {
        let mut work = DeferredWork::default();
        let mut inner = self.lock();
        if inner.queue.find_with_state(ChainState::OnHardware).is_none() {
            return work;
        }
        log::error!("hardware stopped responding, forcing fault recovery");
        work.handled = true;
        self.fault(&mut inner, &mut work);
        work
    }

    /// Moves the oldest on-hardware chain off, capturing diagnostics. `false`
    /// when there was no such chain.
    fn retire(&self, inner: &mut Inner, error: bool, work: &mut DeferredWork) -> bool {
        let Some(chain) = inner.queue.find_with_state_mut(ChainState::OnHardware) else { return false };
        if error {
            chain.fault_address = self.hw.read_fault_address();
            // clears on read: exactly once per error
            let error_status = self.hw.read_error_status();
            chain.finish(translate_error_status(error_status), error_status);
            log::debug!(
                "{:?} error {:08x} at {:08x} -> {:?}",
                chain.id,
                error_status,
                chain.fault_address,
                chain.result
            );
        } else {
            chain.op_status = self.hw.read_op_status();
            chain.finish(translate_op_status(chain.op_status), 0);
            log::trace!("{:?} done -> {:?}", chain.id, chain.result);
        }
        work.completed += 1;
        true
    }

    fn fault(&self, inner: &mut Inner, work: &mut DeferredWork) {
        self.stats.faults();
        work.reset_required = true;
        inner.reset_pending = true;
        let in_progress = self.hw.read_in_progress_address();
        let on_hw: Vec<(ChainId, u32)> = inner
            .queue
            .iter()
            .filter(|c| c.state == ChainState::OnHardware)
            .map(|c| (c.id, c.hardware_address))
            .collect();
        let outcome = match on_hw.as_slice() {
            [] => FaultOutcome::NoChain,
            [(first, addr), rest @ ..] if *addr == in_progress => {
                self.fail_unknown(inner, *first, work);
                for (id, _) in rest {
                    self.mark_for_replay(inner, *id);
                }
                FaultOutcome::First
            }
            [(first, _), (second, addr)] if *addr == in_progress => {
                if let Some(chain) = inner.queue.get_mut(*first) {
                    chain.op_status = self.hw.read_op_status();
                    chain.finish(translate_op_status(chain.op_status), 0);
                    work.completed += 1;
                }
                self.mark_for_replay(inner, *second);
                FaultOutcome::Second
            }
            _ => {
                self.stats.unresolved();
                log::error!("fault at {:08x} matches no in-flight chain, failing {}", in_progress, on_hw.len());
                for (id, _) in on_hw.iter() {
                    self.fail_unknown(inner, *id, work);
                }
                FaultOutcome::Unresolved
            }
        };
        log::error!("hardware fault at {:08x}: {:?}", in_progress, outcome);
        work.fault = Some(outcome);
    }

    fn fail_unknown(&self, inner: &mut Inner, id: ChainId, work: &mut DeferredWork) {
        if let Some(chain) = inner.queue.get_mut(id) {
            chain.finish(ResultCode::Error, ERROR_STATUS_NO_DIAGNOSTIC);
            work.completed += 1;
        }
    }

    fn mark_for_replay(&self, inner: &mut Inner, id: ChainId) {
        if let Some(chain) = inner.queue.get_mut(id) {
            chain.state = ChainState::Reset;
        }
    }
}
