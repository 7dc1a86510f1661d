//! Software stand-in for the accelerator, used on hosted builds and in tests.
//!
//! Status values are scripted: each call to [`SimHw::raise`] queues one status
//! word, which `read_status` reports until `clear_interrupt` retires it along
//! with the chain(s) it describes.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::api::ExecState;
use crate::hw::Hardware;
use crate::regs::exec_state_bits;
use num_traits::FromPrimitive;

#[derive(Default)]
struct SimState {
    accept: u32,
    stall_accept: bool,
    in_flight: VecDeque<u32>,
    status: VecDeque<u32>,
    error_status: u32,
    op_status: u32,
    fault_address: u32,
    in_progress: Option<u32>,
    writes: Vec<u32>,
    invalidated: Vec<u32>,
    resets: u32,
    clock_on: bool,
    clock_enables: u32,
}

#[derive(Default)]
pub struct SimHw {
    state: Mutex<SimState>,
}

impl SimHw {
    pub fn new() -> SimHw { SimHw::default() }

    fn lock(&self) -> MutexGuard<'_, SimState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Queues a status word to be reported by `read_status`.
    pub fn raise(&self, state: ExecState) { self.raise_raw(state as u32) }

    pub fn raise_raw(&self, raw: u32) { self.lock().status.push_back(raw) }

    /// Diagnostics captured with the next error: error status and fault address.
    pub fn set_error(&self, error_status: u32, fault_address: u32) {
        let mut s = self.lock();
        s.error_status = error_status;
        s.fault_address = fault_address;
    }

    pub fn set_op_status(&self, op_status: u32) { self.lock().op_status = op_status }

    /// Overrides the in-progress address reported during a fault. `None` reports
    /// the oldest chain the emulator holds.
    pub fn set_in_progress(&self, address: Option<u32>) { self.lock().in_progress = address }

    /// When set, written addresses stay in the accept register instead of being
    /// taken by the emulated hardware.
    pub fn stall_accept(&self, stall: bool) {
        let mut s = self.lock();
        s.stall_accept = stall;
        if !stall {
            s.accept = 0;
        }
    }

    /// Every address written to the accept register, in order.
    pub fn writes(&self) -> Vec<u32> { self.lock().writes.clone() }

    pub fn in_flight(&self) -> Vec<u32> { self.lock().in_flight.iter().copied().collect() }

    pub fn invalidated(&self) -> Vec<u32> { self.lock().invalidated.clone() }

    pub fn resets(&self) -> u32 { self.lock().resets }

    pub fn clock_on(&self) -> bool { self.lock().clock_on }

    pub fn clock_enables(&self) -> u32 { self.lock().clock_enables }
}

impl Hardware for SimHw {
    fn read_status(&self) -> u32 {
        let s = self.lock();
        match s.status.front() {
            Some(raw) => *raw,
            None if s.in_flight.is_empty() => ExecState::Idle as u32,
            None => ExecState::Busy as u32,
        }
    }

    fn read_accept(&self) -> u32 { self.lock().accept }

    fn write_accept(&self, address: u32) {
        let mut s = self.lock();
        log::trace!("sim: accept <- {:08x}", address);
        s.writes.push(address);
        if s.stall_accept {
            s.accept = address;
        } else {
            s.in_flight.push_back(address);
        }
    }

    fn read_error_status(&self) -> u32 { std::mem::take(&mut self.lock().error_status) }

    fn read_op_status(&self) -> u32 { self.lock().op_status }

    fn read_fault_address(&self) -> u32 { self.lock().fault_address }

    fn read_in_progress_address(&self) -> u32 {
        let s = self.lock();
        s.in_progress.or_else(|| s.in_flight.front().copied()).unwrap_or(0)
    }

    fn clear_interrupt(&self) {
        let mut s = self.lock();
        let Some(raw) = s.status.pop_front() else { return };
        let retired = match ExecState::from_u32(exec_state_bits(raw)) {
            Some(ExecState::Done1Done2) => 2,
            Some(ExecState::Fault) => s.in_flight.len(),
            Some(state) if state.is_terminal() => 1,
            _ => 0,
        };
        for _ in 0..retired {
            s.in_flight.pop_front();
        }
    }

    fn reset_hardware(&self) {
        let mut s = self.lock();
        log::trace!("sim: reset");
        s.resets += 1;
        s.accept = 0;
        s.in_flight.clear();
        s.status.clear();
        s.error_status = 0;
        s.op_status = 0;
        s.in_progress = None;
    }

    fn enable_clock(&self) {
        let mut s = self.lock();
        if !s.clock_on {
            s.clock_enables += 1;
        }
        s.clock_on = true;
    }

    fn disable_clock(&self) { self.lock().clock_on = false }

    fn invalidate_after_dma(&self, address: u32) { self.lock().invalidated.push(address) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_script() {
        let hw = SimHw::new();
        assert_eq!(hw.read_status(), ExecState::Idle as u32);
        hw.write_accept(0x1000);
        assert_eq!(hw.read_status(), ExecState::Busy as u32);
        hw.raise(ExecState::Done1);
        assert_eq!(hw.read_status(), ExecState::Done1 as u32);
        hw.clear_interrupt();
        assert_eq!(hw.read_status(), ExecState::Idle as u32);
        assert!(hw.in_flight().is_empty());
    }

    #[test]
    fn error_status_clears_on_read() {
        let hw = SimHw::new();
        hw.set_error(0x1234, 0x8000);
        assert_eq!(hw.read_error_status(), 0x1234);
        assert_eq!(hw.read_error_status(), 0);
        assert_eq!(hw.read_fault_address(), 0x8000);
    }

    #[test]
    fn stalled_accept_holds_address() {
        let hw = SimHw::new();
        hw.stall_accept(true);
        hw.write_accept(0x40);
        assert_eq!(hw.read_accept(), 0x40);
        assert!(hw.in_flight().is_empty());
        hw.stall_accept(false);
        assert_eq!(hw.read_accept(), 0);
    }
}
