use std::collections::VecDeque;

use crate::api::{ChainState, EngineError};
use crate::chain::{Chain, ChainId};

/// FIFO of chains the engine currently owns, oldest at the head.
///
/// Not synchronized on its own; it lives inside the engine lock.
pub struct Queue {
    chains: VecDeque<Chain>,
}

impl Queue {
    pub fn with_capacity(capacity: usize) -> Result<Queue, EngineError> {
        let mut chains = VecDeque::new();
        chains.try_reserve(capacity).map_err(|_| EngineError::NoMemory)?;
        Ok(Queue { chains })
    }

    pub fn len(&self) -> usize { self.chains.len() }

    pub fn is_empty(&self) -> bool { self.chains.is_empty() }

    pub fn push_back(&mut self, chain: Chain) -> Result<(), EngineError> {
        self.chains.try_reserve(1).map_err(|_| EngineError::NoMemory)?;
        self.chains.push_back(chain);
        Ok(())
    }

    /// Unlinks a chain from anywhere in the queue.
    pub fn remove(&mut self, id: ChainId) -> Option<Chain> {
        let pos = self.chains.iter().position(|c| c.id == id)?;
        self.chains.remove(pos)
    }

    pub fn get(&self, id: ChainId) -> Option<&Chain> { self.chains.iter().find(|c| c.id == id) }

    pub fn get_mut(&mut self, id: ChainId) -> Option<&mut Chain> { self.chains.iter_mut().find(|c| c.id == id) }

    pub fn contains_address(&self, address: u32) -> bool {
        self.chains.iter().any(|c| c.hardware_address == address)
    }

    /// Oldest chain in `state`.
    pub fn find_with_state(&self, state: ChainState) -> Option<&Chain> {
        self.chains.iter().find(|c| c.state == state)
    }

    pub fn find_with_state_mut(&mut self, state: ChainState) -> Option<&mut Chain> {
        self.chains.iter_mut().find(|c| c.state == state)
    }

    pub fn count<P: Fn(&Chain) -> bool>(&self, predicate: P) -> usize {
        self.chains.iter().filter(|c| predicate(c)).count()
    }

    pub fn count_state(&self, state: ChainState) -> usize { self.count(|c| c.state == state) }

    /// Marks every chain the hardware still owed work on as `Reset`. Chains whose
    /// results are already known are left alone.
    pub fn reset_all(&mut self) -> usize {
        let mut n = 0;
        for chain in self.chains.iter_mut() {
            if matches!(chain.state, ChainState::Pending | ChainState::OnHardware) {
                chain.state = ChainState::Reset;
                n += 1;
            }
        }
        n
    }

    /// Removes every chain in `state`, preserving queue order.
    pub fn take_with_state(&mut self, state: ChainState) -> Vec<Chain> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.chains.len());
        for chain in self.chains.drain(..) {
            if chain.state == state {
                taken.push(chain);
            } else {
                kept.push_back(chain);
            }
        }
        self.chains = kept;
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chain> { self.chains.iter() }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Chain> { self.chains.iter_mut() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(id: u64, addr: u32, state: ChainState) -> Chain {
        let mut c = Chain::new(addr);
        c.id = ChainId(id);
        c.state = state;
        c
    }

    #[test]
    fn fifo_and_find() {
        let mut q = Queue::with_capacity(4).unwrap();
        q.push_back(chain(1, 0x100, ChainState::OnHardware)).unwrap();
        q.push_back(chain(2, 0x200, ChainState::Pending)).unwrap();
        q.push_back(chain(3, 0x300, ChainState::Pending)).unwrap();
        assert_eq!(q.find_with_state(ChainState::Pending).map(|c| c.id), Some(ChainId(2)));
        assert_eq!(q.count_state(ChainState::Pending), 2);
        assert!(q.contains_address(0x300));
        assert_eq!(q.find_with_state(ChainState::OnHardware).map(|c| c.id), Some(ChainId(1)));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn remove_from_middle() {
        let mut q = Queue::with_capacity(4).unwrap();
        for i in 1..=3 {
            q.push_back(chain(i, i as u32 * 0x10, ChainState::Pending)).unwrap();
        }
        assert!(q.remove(ChainId(2)).is_some());
        assert!(q.remove(ChainId(2)).is_none());
        let ids: Vec<ChainId> = q.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![ChainId(1), ChainId(3)]);
    }

    #[test]
    fn reset_spares_finished_chains() {
        let mut q = Queue::with_capacity(4).unwrap();
        q.push_back(chain(1, 0x10, ChainState::OffHardware)).unwrap();
        q.push_back(chain(2, 0x20, ChainState::OnHardware)).unwrap();
        q.push_back(chain(3, 0x30, ChainState::Pending)).unwrap();
        assert_eq!(q.reset_all(), 2);
        assert_eq!(q.get(ChainId(1)).map(|c| c.state), Some(ChainState::OffHardware));
        assert_eq!(q.count_state(ChainState::Reset), 2);
    }

    #[test]
    fn take_keeps_order() {
        let mut q = Queue::with_capacity(4).unwrap();
        q.push_back(chain(1, 0x10, ChainState::OffHardware)).unwrap();
        q.push_back(chain(2, 0x20, ChainState::Pending)).unwrap();
        q.push_back(chain(3, 0x30, ChainState::OffHardware)).unwrap();
        let taken: Vec<ChainId> = q.take_with_state(ChainState::OffHardware).iter().map(|c| c.id).collect();
        assert_eq!(taken, vec![ChainId(1), ChainId(3)]);
        assert_eq!(q.len(), 1);
    }
}
