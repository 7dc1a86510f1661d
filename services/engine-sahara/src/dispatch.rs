//! Bottom half: hardware recovery and completion delivery.
use crate::api::*;
use crate::chain::{Chain, OwnerId};
use crate::engine::{Callback, Engine, Inner};
use crate::hw::Hardware;
use crate::status::DeferredWork;

/// Where a finished chain went.
pub(crate) enum Delivered {
    /// Parked for its blocked submitter.
    Waiter,
    Pooled,
    /// Pooled; the owner's callback must run once the lock is dropped.
    Notify(Callback, OwnerId),
    Discarded,
}

impl<H: Hardware> Engine<H> {
    /// Task-context half of interrupt handling. Resets the hardware if the top
    /// half asked for it, then delivers every chain that came off the hardware.
    pub fn run_deferred(&self, work: DeferredWork) {
        if work.reset_required {
            self.recover();
        }
        self.dispatch_completions();
    }

    fn recover(&self) {
        let mut inner = self.lock();
        // an administrative reset since the fault already did the work; resetting
        // again would drop whatever has been primed since
        if !inner.reset_pending {
            log::debug!("fault already recovered, skipping reset");
            return;
        }
        log::info!("resetting accelerator after fault");
        self.hw.reset_hardware();
        self.stats.resets();
        inner.reset_pending = false;
        self.replay_reset_chains(&mut inner);
        self.prime_next(&mut inner);
    }

    /// Delivers every `OffHardware` chain in queue order.
    pub(crate) fn dispatch_completions(&self) {
        let mut wake = false;
        let mut callbacks = Vec::new();
        {
            let mut inner = self.lock();
            for chain in inner.queue.take_with_state(ChainState::OffHardware) {
                match self.deliver(&mut inner, chain) {
                    Delivered::Waiter => wake = true,
                    Delivered::Notify(callback, owner) => callbacks.push((callback, owner)),
                    Delivered::Pooled | Delivered::Discarded => {}
                }
            }
            if inner.queue.is_empty() && !inner.reset_pending {
                self.hw.disable_clock();
            }
        }
        if wake {
            self.done.notify_all();
        }
        // the callback may re-enter the engine, so no lock is held here
        for (callback, owner) in callbacks {
            callback(owner);
        }
    }

    /// Settles a chain's final state and hands it to whoever is waiting for it.
    /// Called with the engine lock held.
    pub(crate) fn deliver(&self, inner: &mut Inner, mut chain: Chain) -> Delivered {
        chain.state = if chain.result.is_success() { ChainState::Complete } else { ChainState::Failed };
        if chain.result.is_success() {
            self.stats.completed();
        } else {
            self.stats.failed();
        }
        if chain.abandoned {
            log::warn!("dropping result of abandoned {:?}: {:?}", chain.id, chain.result);
            self.stats.discarded();
            return Delivered::Discarded;
        }
        match chain.delivery {
            DeliveryMode::Blocking => {
                inner.finished.insert(chain.id, chain);
                Delivered::Waiter
            }
            DeliveryMode::Callback | DeliveryMode::PoolOnly => {
                let Some(owner_id) = chain.owner else {
                    log::warn!("dropping result of ownerless {:?}", chain.id);
                    self.stats.discarded();
                    return Delivered::Discarded;
                };
                let Some(owner) = inner.owners.get_mut(&owner_id) else {
                    log::warn!("dropping result of {:?}: owner {:?} is gone", chain.id, owner_id);
                    self.stats.discarded();
                    return Delivered::Discarded;
                };
                let notify = chain.delivery == DeliveryMode::Callback;
                log::trace!("{:?} -> pool of {:?}", chain.id, owner_id);
                owner.pool.push_back(chain);
                match (&owner.callback, notify) {
                    (Some(callback), true) => Delivered::Notify(callback.clone(), owner_id),
                    _ => Delivered::Pooled,
                }
            }
        }
    }
}
