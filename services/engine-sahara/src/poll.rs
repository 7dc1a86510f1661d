//! Interrupt-free execution: one chain at a time, busy-waiting on status.
use std::thread;

use num_traits::FromPrimitive;

use crate::api::*;
use crate::chain::Chain;
use crate::dispatch::Delivered;
use crate::engine::Engine;
use crate::hw::Hardware;
use crate::regs::exec_state_bits;
use crate::translate::{translate_error_status, translate_op_status};

impl<H: Hardware> Engine<H> {
    /// Runs `chain` to completion with the engine lock held throughout. The queue
    /// is bypassed; the result goes straight to the caller or the owner's pool.
    pub(crate) fn submit_polled(&self, mut chain: Chain) -> Result<ResultCode, EngineError> {
        let mut inner = self.lock();
        if inner.shutdown {
            return Err(EngineError::Shutdown);
        }
        if chain.delivery != DeliveryMode::Blocking
            && !chain.owner.map(|o| inner.owners.contains_key(&o)).unwrap_or(false)
        {
            return Err(EngineError::UnknownOwner);
        }
        // nothing may reach the hardware while the gate is asserted, and there
        // is no queue here to park the chain in
        if self.gate.is_asserted() {
            log::debug!("polled submit of {:08x} refused while suspended", chain.hardware_address);
            return Err(EngineError::Suspended);
        }
        chain.id = inner.next_chain_id();

        self.hw.enable_clock();
        let current = self.hw.read_accept();
        if current != 0 {
            log::error!(
                "accept register still holds {:08x}, failing polled {:?} unsubmitted",
                current,
                chain.id
            );
            chain.finish(ResultCode::InternalError, ERROR_STATUS_NO_DIAGNOSTIC);
        } else {
            self.run_polled(&mut chain);
        }
        self.hw.disable_clock();

        let result = chain.result;
        let id = chain.id;
        let address = chain.hardware_address;
        let blocking = chain.delivery == DeliveryMode::Blocking;
        let post = if blocking { chain.post_process.take() } else { None };
        let delivered = self.deliver(&mut inner, chain);
        let blocking_result = if blocking { inner.finished.remove(&id).map(|c| c.result) } else { None };
        drop(inner);

        log::trace!("polled {:?} -> {:?}", id, result);
        match delivered {
            Delivered::Notify(callback, owner) => {
                callback(owner);
                Ok(ResultCode::Ok)
            }
            Delivered::Waiter => {
                self.hw.invalidate_after_dma(address);
                if let Some(post) = post {
                    post();
                }
                Ok(blocking_result.unwrap_or(result))
            }
            Delivered::Pooled | Delivered::Discarded => Ok(ResultCode::Ok),
        }
    }

    /// Writes `chain` to the accept register and spins, bounded, until the
    /// hardware reports on it. A fault or timeout leaves the hardware reset.
    fn run_polled(&self, chain: &mut Chain) {
        self.hw.write_accept(chain.hardware_address);
        chain.state = ChainState::OnHardware;
        self.stats.primed();

        let mut state = None;
        for _ in 0..self.config.poll_retries {
            let s = ExecState::from_u32(exec_state_bits(self.hw.read_status()));
            if s.map(|s| s.is_terminal()).unwrap_or(true) {
                state = s;
                break;
            }
            thread::sleep(self.config.poll_interval);
        }
        match state {
            Some(s) if s.slot1_done() => {
                self.stats.done1();
                chain.op_status = self.hw.read_op_status();
                chain.finish(translate_op_status(chain.op_status), 0);
                self.hw.clear_interrupt();
            }
            Some(ExecState::Error1) => {
                self.stats.errors();
                chain.fault_address = self.hw.read_fault_address();
                let error_status = self.hw.read_error_status();
                chain.finish(translate_error_status(error_status), error_status);
                self.hw.clear_interrupt();
            }
            other => {
                if other == Some(ExecState::Fault) {
                    self.stats.faults();
                    log::error!("hardware fault during polled {:?}", chain.id);
                } else {
                    log::error!("polled {:?} did not finish ({:?}), resetting", chain.id, other);
                }
                chain.finish(ResultCode::Error, ERROR_STATUS_NO_DIAGNOSTIC);
                self.hw.reset_hardware();
                self.stats.resets();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::hosted::SimHw;
    use crate::regs::*;
    use crate::*;

    fn polled() -> EngineConfig {
        EngineConfig { poll_retries: 20, poll_interval: Duration::from_micros(50), ..EngineConfig::polled() }
    }

    #[test]
    fn blocking_poll_returns_result() {
        let e = Engine::new(SimHw::new(), polled()).unwrap();
        e.hw().raise(ExecState::Done1);
        assert_eq!(e.submit(Chain::new(0x40)), Ok(ResultCode::Ok));
        assert_eq!(e.hw().writes(), vec![0x40]);
        assert_eq!(e.queued(), 0);
        assert!(!e.hw().clock_on());
        assert_eq!(e.hw().clock_enables(), 1);
    }

    #[test]
    fn suspended_poll_submit_never_touches_hardware() {
        let e = Engine::new(SimHw::new(), polled()).unwrap();
        e.suspend().unwrap();
        e.hw().raise(ExecState::Done1);
        assert_eq!(e.submit(Chain::new(0x40)), Err(EngineError::Suspended));
        assert!(e.hw().writes().is_empty());
        assert!(!e.hw().clock_on());
        e.resume();
        assert_eq!(e.submit(Chain::new(0x40)), Ok(ResultCode::Ok));
        assert_eq!(e.hw().writes(), vec![0x40]);
    }

    #[test]
    fn occupied_accept_register_is_not_overwritten() {
        let e = Engine::new(SimHw::new(), polled()).unwrap();
        e.hw().stall_accept(true);
        e.hw().write_accept(0x99);
        let resets = e.hw().resets();
        assert_eq!(e.submit(Chain::new(0x40)), Ok(ResultCode::InternalError));
        assert_eq!(e.hw().writes(), vec![0x99]);
        assert_eq!(e.hw().read_accept(), 0x99);
        assert_eq!(e.hw().resets(), resets);
        assert!(!e.hw().clock_on());
    }

    #[test]
    fn poll_error_is_translated() {
        let e = Engine::new(SimHw::new(), polled()).unwrap();
        e.hw().set_error(make_error_status(ERR_SOURCE_CHA, 0, 1 << 1), 0x44);
        e.hw().raise(ExecState::Error1);
        assert_eq!(e.submit(Chain::new(0x40)), Ok(ResultCode::BadKeyLength));
    }

    #[test]
    fn poll_timeout_resets() {
        let e = Engine::new(SimHw::new(), polled()).unwrap();
        let resets = e.hw().resets();
        assert_eq!(e.submit(Chain::new(0x40)), Ok(ResultCode::Error));
        assert_eq!(e.hw().resets(), resets + 1);
    }

    #[test]
    fn poll_pool_delivery_is_inline() {
        let e = Engine::new(SimHw::new(), polled()).unwrap();
        let owner = e.register_owner(None);
        e.hw().set_op_status(make_op_status(OpSource::Mdha, 1));
        e.hw().raise(ExecState::Done1);
        let chain = Chain::new(0x40).with_delivery(DeliveryMode::PoolOnly).with_owner(owner);
        assert_eq!(e.submit(chain), Ok(ResultCode::Ok));
        let results = e.drain_results(owner, 1).unwrap();
        assert_eq!(results[0].code, ResultCode::AuthFailed);
    }
}
