//! Queue manager: the only way work gets onto the hardware.
use std::time::Instant;

use crate::api::*;
use crate::chain::{Chain, ChainId};
use crate::engine::{Engine, Inner};
use crate::hw::Hardware;

impl<H: Hardware> Engine<H> {
    /// Queues a chain at the tail and primes it if the hardware has room.
    pub(crate) fn append(&self, mut chain: Chain) -> Result<ChainId, EngineError> {
        let mut inner = self.lock();
        if inner.shutdown {
            return Err(EngineError::Shutdown);
        }
        let owner_known = chain.owner.map(|o| inner.owners.contains_key(&o));
        match (chain.delivery, owner_known) {
            (_, Some(false)) => return Err(EngineError::UnknownOwner),
            (DeliveryMode::Callback | DeliveryMode::PoolOnly, None) => return Err(EngineError::UnknownOwner),
            _ => {}
        }
        if inner.queue.contains_address(chain.hardware_address) {
            return Err(EngineError::DuplicateChain);
        }
        chain.id = inner.next_chain_id();
        chain.state = ChainState::Pending;
        chain.result = ResultCode::Ok;
        chain.replays = 0;
        chain.abandoned = false;
        let id = chain.id;
        log::debug!("append {:?} @ {:08x} ({:?})", id, chain.hardware_address, chain.delivery);
        inner.queue.push_back(chain)?;
        self.prime_next(&mut inner);
        Ok(id)
    }

    /// Feeds pending chains, oldest first, while the hardware has a free slot.
    /// Nothing is primed while the power gate is asserted or a reset is owed.
    pub(crate) fn prime_next(&self, inner: &mut Inner) -> bool {
        if self.gate.is_asserted() || inner.reset_pending || inner.shutdown {
            log::debug!(
                "priming held off (gate {}, reset pending {})",
                self.gate.is_asserted(),
                inner.reset_pending
            );
            return false;
        }
        let slots = self.config.slot_mode.slots();
        let mut primed = false;
        while inner.queue.count_state(ChainState::OnHardware) < slots {
            let Some(chain) = inner.queue.find_with_state_mut(ChainState::Pending) else { break };
            if !self.prime(chain) {
                break;
            }
            primed = true;
        }
        if primed {
            inner.last_progress = Instant::now();
        }
        primed
    }

    fn prime(&self, chain: &mut Chain) -> bool {
        self.hw.enable_clock();
        let current = self.hw.read_accept();
        if current != 0 {
            log::error!(
                "accept register still holds {:08x}, not priming {:08x}",
                current,
                chain.hardware_address
            );
            return false;
        }
        self.hw.write_accept(chain.hardware_address);
        chain.state = ChainState::OnHardware;
        self.stats.primed();
        log::trace!("primed {:?} @ {:08x}", chain.id, chain.hardware_address);
        true
    }

    /// Puts chains pulled back by a reset back in line, failing those that have
    /// already been replayed too often.
    pub(crate) fn replay_reset_chains(&self, inner: &mut Inner) {
        let max = self.config.max_replays;
        for chain in inner.queue.iter_mut().filter(|c| c.state == ChainState::Reset) {
            if chain.replays >= max {
                log::warn!("{:?} @ {:08x} out of replays", chain.id, chain.hardware_address);
                chain.finish(ResultCode::InternalError, ERROR_STATUS_NO_DIAGNOSTIC);
            } else {
                chain.replays += 1;
                chain.state = ChainState::Pending;
                log::debug!("replaying {:?} (attempt {})", chain.id, chain.replays);
            }
        }
    }
}

impl Inner {
    pub(crate) fn next_chain_id(&mut self) -> ChainId {
        self.next_chain += 1;
        ChainId(self.next_chain)
    }
}

#[cfg(test)]
mod tests {
    use crate::hosted::SimHw;
    use crate::*;

    #[test]
    fn single_slot_primes_one() {
        let e = Engine::new(SimHw::new(), EngineConfig::default()).unwrap();
        let owner = e.register_owner(None);
        for addr in [0x10, 0x20, 0x30] {
            e.submit(Chain::new(addr).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        }
        assert_eq!(e.hw().writes(), vec![0x10]);
        assert_eq!(e.count(|c| c.state() == ChainState::OnHardware), 1);
        assert_eq!(e.count(|c| c.state() == ChainState::Pending), 2);
    }

    #[test]
    fn dual_slot_primes_two() {
        let e = Engine::new(SimHw::new(), EngineConfig::dual_slot()).unwrap();
        let owner = e.register_owner(None);
        for addr in [0x10, 0x20, 0x30] {
            e.submit(Chain::new(addr).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        }
        assert_eq!(e.hw().writes(), vec![0x10, 0x20]);
    }

    #[test]
    fn busy_accept_register_blocks_priming() {
        let e = Engine::new(SimHw::new(), EngineConfig::default()).unwrap();
        let owner = e.register_owner(None);
        e.hw().stall_accept(true);
        e.hw().write_accept(0xdead);
        e.submit(Chain::new(0x10).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        assert_eq!(e.hw().writes(), vec![0xdead]);
        assert_eq!(e.count(|c| c.state() == ChainState::Pending), 1);
        assert!(e.hw().clock_on());
    }
}
