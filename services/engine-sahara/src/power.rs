use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::api::*;
use crate::engine::Engine;
use crate::hw::Hardware;

/// Admission flag for the hardware. While asserted nothing new is primed; work
/// already on the hardware runs to completion.
pub struct PowerGate(AtomicBool);

impl PowerGate {
    pub fn new() -> PowerGate { PowerGate(AtomicBool::new(false)) }

    pub fn is_asserted(&self) -> bool { self.0.load(Ordering::SeqCst) }

    pub(crate) fn assert(&self) { self.0.store(true, Ordering::SeqCst) }

    pub(crate) fn clear(&self) { self.0.store(false, Ordering::SeqCst) }
}

impl Default for PowerGate {
    fn default() -> Self { Self::new() }
}

impl<H: Hardware> Engine<H> {
    /// Stops feeding the hardware and waits, bounded, for in-flight chains to
    /// finish before gating the clock. On timeout the gate is dropped again and
    /// the engine keeps running.
    ///
    /// Completions must still be processed while this waits, so the interrupt
    /// handler and worker have to stay live.
    pub fn suspend(&self) -> Result<(), EngineError> {
        log::info!("suspend requested");
        self.gate.assert();
        let mut idle = false;
        for _ in 0..self.config.suspend_retries {
            if self.lock().queue.count_state(ChainState::OnHardware) == 0 {
                idle = true;
                break;
            }
            thread::sleep(self.config.suspend_interval);
        }
        if !idle {
            log::error!("in-flight work did not drain, aborting suspend");
            self.gate.clear();
            let mut inner = self.lock();
            self.prime_next(&mut inner);
            return Err(EngineError::SuspendTimeout);
        }
        self.hw.disable_clock();
        log::info!("suspended, {} chain(s) held", self.queued());
        Ok(())
    }

    pub fn resume(&self) {
        self.hw.enable_clock();
        self.gate.clear();
        let mut inner = self.lock();
        let primed = self.prime_next(&mut inner);
        if !primed && inner.queue.is_empty() {
            self.hw.disable_clock();
        }
        log::info!("resumed, primed: {}", primed);
    }

    pub fn is_suspended(&self) -> bool { self.gate.is_asserted() }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::hosted::SimHw;
    use crate::*;

    fn quick() -> EngineConfig {
        EngineConfig { suspend_retries: 5, suspend_interval: Duration::from_millis(1), ..Default::default() }
    }

    #[test]
    fn gate_holds_back_priming() {
        let e = Engine::new(SimHw::new(), quick()).unwrap();
        let owner = e.register_owner(None);
        e.suspend().unwrap();
        assert!(e.is_suspended());
        for addr in [0x10, 0x20, 0x30] {
            e.submit(Chain::new(addr).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        }
        assert!(e.hw().writes().is_empty());
        e.resume();
        assert!(!e.is_suspended());
        assert_eq!(e.hw().writes(), vec![0x10]);
        assert!(e.hw().clock_on());
    }

    #[test]
    fn suspend_times_out_on_busy_hardware() {
        let e = Engine::new(SimHw::new(), quick()).unwrap();
        let owner = e.register_owner(None);
        e.submit(Chain::new(0x10).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        assert_eq!(e.suspend(), Err(EngineError::SuspendTimeout));
        assert!(!e.is_suspended());
        assert!(e.hw().clock_on());
    }

    #[test]
    fn interrupt_under_gate_does_not_reprime() {
        let e = Engine::new(SimHw::new(), quick()).unwrap();
        let owner = e.register_owner(None);
        e.submit(Chain::new(0x10).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        e.submit(Chain::new(0x20).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        e.gate.assert();
        e.hw().raise(ExecState::Done1);
        e.interrupt();
        assert_eq!(e.hw().writes(), vec![0x10]);
        e.resume();
        assert_eq!(e.hw().writes(), vec![0x10, 0x20]);
    }
}
