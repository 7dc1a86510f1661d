use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::api::*;
use crate::chain::{Chain, ChainId, ChainResult, OwnerId};
use crate::config::EngineConfig;
use crate::hw::Hardware;
use crate::power::PowerGate;
use crate::queue::Queue;
use crate::stats::{Stats, StatsSnapshot};
use crate::worker::WorkerOp;

/// Invoked after a `Callback` chain lands in its owner's pool. Runs without any
/// engine lock held, so it may call back into the engine.
pub type Callback = Arc<dyn Fn(OwnerId) + Send + Sync>;

/// How often a cancellable blocking wait re-checks its token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

pub(crate) struct Owner {
    pub(crate) pool: VecDeque<Chain>,
    pub(crate) callback: Option<Callback>,
}

/// Everything guarded by the engine lock.
pub(crate) struct Inner {
    pub(crate) queue: Queue,
    pub(crate) owners: HashMap<OwnerId, Owner>,
    /// Dispatched `Blocking` chains waiting for their submitter to pick them up.
    pub(crate) finished: HashMap<ChainId, Chain>,
    pub(crate) next_chain: u64,
    pub(crate) next_owner: u32,
    /// Last prime or interrupt; the watchdog measures from here.
    pub(crate) last_progress: Instant,
    /// A fault was seen and the hardware has not been reset yet.
    pub(crate) reset_pending: bool,
    pub(crate) shutdown: bool,
}

/// Lets a blocked submitter give up on its chain.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken { CancelToken::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Descriptor-chain queue and completion engine for one accelerator instance.
///
/// Share it between threads with an `Arc`. Submitters call [`Engine::submit`];
/// the platform interrupt handler calls [`Engine::interrupt`] (or
/// [`Engine::handle_interrupt`] and posts the returned work itself); a
/// [`crate::Worker`] finishes the deferred half.
pub struct Engine<H: Hardware> {
    pub(crate) hw: H,
    pub(crate) config: EngineConfig,
    pub(crate) inner: Mutex<Inner>,
    /// Broadcast whenever a `Blocking` chain is dispatched.
    pub(crate) done: Condvar,
    pub(crate) gate: PowerGate,
    pub(crate) stats: Stats,
    pub(crate) worker: Mutex<Option<Sender<WorkerOp>>>,
}

impl<H: Hardware> Engine<H> {
    pub fn new(hw: H, config: EngineConfig) -> Result<Self, EngineError> {
        let queue = Queue::with_capacity(config.queue_capacity)?;
        log::info!("engine init: {:?} slot mode, {:?} execution", config.slot_mode, config.exec_mode);
        hw.reset_hardware();
        hw.disable_clock();
        Ok(Engine {
            hw,
            config,
            inner: Mutex::new(Inner {
                queue,
                owners: HashMap::new(),
                finished: HashMap::new(),
                next_chain: 0,
                next_owner: 0,
                last_progress: Instant::now(),
                reset_pending: false,
                shutdown: false,
            }),
            done: Condvar::new(),
            gate: PowerGate::new(),
            stats: Stats::default(),
            worker: Mutex::new(None),
        })
    }

    /// Takes the engine lock. A panicking callback must not wedge the engine, so
    /// poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn hw(&self) -> &H { &self.hw }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn register_owner(&self, callback: Option<Callback>) -> OwnerId {
        let mut inner = self.lock();
        inner.next_owner += 1;
        let id = OwnerId(inner.next_owner);
        inner.owners.insert(id, Owner { pool: VecDeque::new(), callback });
        log::debug!("registered owner {:?}", id);
        id
    }

    /// Detaches an owner. Its undelivered results and queued chains are discarded;
    /// chains already on the hardware finish there and their results are dropped.
    /// Returns the number of chains discarded immediately.
    pub fn deregister_owner(&self, owner: OwnerId) -> Result<usize, EngineError> {
        let mut inner = self.lock();
        let entry = inner.owners.remove(&owner).ok_or(EngineError::UnknownOwner)?;
        let mut discarded = entry.pool.len();
        let owned = |c: &Chain| c.owner == Some(owner) && c.delivery != DeliveryMode::Blocking;
        let queued: Vec<ChainId> = inner
            .queue
            .iter()
            .filter(|c| owned(c) && matches!(c.state, ChainState::Pending | ChainState::Reset))
            .map(|c| c.id)
            .collect();
        for id in queued {
            inner.queue.remove(id);
            discarded += 1;
        }
        for chain in inner.queue.iter_mut().filter(|c| owned(c)) {
            chain.abandoned = true;
        }
        for _ in 0..discarded {
            self.stats.discarded();
        }
        log::debug!("deregistered owner {:?}, {} chain(s) discarded", owner, discarded);
        Ok(discarded)
    }

    /// Runs a chain on the accelerator.
    ///
    /// `Blocking` chains return their final result. `Callback` and `PoolOnly`
    /// chains return `ResultCode::Ok` as soon as they are queued; the real
    /// result arrives in the owner's pool.
    pub fn submit(&self, chain: Chain) -> Result<ResultCode, EngineError> { self.submit_inner(chain, None) }

    /// As [`Engine::submit`], but a blocking wait ends early once `cancel` fires.
    pub fn submit_cancellable(&self, chain: Chain, cancel: &CancelToken) -> Result<ResultCode, EngineError> {
        self.submit_inner(chain, Some(cancel))
    }

    fn submit_inner(&self, chain: Chain, cancel: Option<&CancelToken>) -> Result<ResultCode, EngineError> {
        if self.config.exec_mode == ExecMode::Poll {
            return self.submit_polled(chain);
        }
        let delivery = chain.delivery;
        let id = self.append(chain)?;
        if delivery != DeliveryMode::Blocking {
            return Ok(ResultCode::Ok);
        }
        self.wait_for(id, cancel)
    }

    fn wait_for(&self, id: ChainId, cancel: Option<&CancelToken>) -> Result<ResultCode, EngineError> {
        let mut inner = self.lock();
        loop {
            if let Some(mut chain) = inner.finished.remove(&id) {
                drop(inner);
                self.hw.invalidate_after_dma(chain.hardware_address);
                if let Some(post) = chain.post_process.take() {
                    post();
                }
                return Ok(chain.result);
            }
            if inner.shutdown {
                return Err(EngineError::Shutdown);
            }
            match cancel {
                Some(token) => {
                    if token.is_cancelled() {
                        return self.abandon(&mut inner, id);
                    }
                    inner = self.done.wait_timeout(inner, CANCEL_POLL).unwrap_or_else(PoisonError::into_inner).0;
                }
                None => inner = self.done.wait(inner).unwrap_or_else(PoisonError::into_inner),
            }
        }
    }

    fn abandon(&self, inner: &mut Inner, id: ChainId) -> Result<ResultCode, EngineError> {
        match inner.queue.get(id).map(|c| c.state) {
            Some(ChainState::Pending) | Some(ChainState::Reset) => {
                inner.queue.remove(id);
                log::debug!("{:?} cancelled before reaching the hardware", id);
                Ok(ResultCode::InternalError)
            }
            Some(_) => {
                if let Some(chain) = inner.queue.get_mut(id) {
                    chain.abandoned = true;
                }
                log::debug!("{:?} abandoned while on the hardware", id);
                Err(EngineError::Interrupted)
            }
            None => Err(EngineError::Interrupted),
        }
    }

    /// Pops up to `max` results from `owner`'s pool, oldest first. Buffers are
    /// invalidated and post-processing hooks run before each entry is returned.
    pub fn drain_results(&self, owner: OwnerId, max: usize) -> Result<Vec<ChainResult>, EngineError> {
        let drained: Vec<Chain> = {
            let mut inner = self.lock();
            let entry = inner.owners.get_mut(&owner).ok_or(EngineError::UnknownOwner)?;
            let n = max.min(entry.pool.len());
            entry.pool.drain(..n).collect()
        };
        Ok(drained
            .into_iter()
            .map(|mut chain| {
                self.hw.invalidate_after_dma(chain.hardware_address);
                if let Some(post) = chain.post_process.take() {
                    post();
                }
                chain.to_result()
            })
            .collect())
    }

    /// Administrative reset: the hardware is reset and every chain it still owed
    /// work on is replayed.
    pub fn hw_reset(&self) {
        {
            let mut inner = self.lock();
            log::info!("administrative hardware reset, {} chain(s) queued", inner.queue.len());
            self.hw.reset_hardware();
            self.stats.resets();
            inner.queue.reset_all();
            inner.reset_pending = false;
            self.replay_reset_chains(&mut inner);
            self.prime_next(&mut inner);
        }
        // chains out of replays were failed above
        self.dispatch_completions();
        self.done.notify_all();
    }

    /// Fails everything still queued and refuses further work.
    pub fn shutdown(&self) {
        {
            let mut inner = self.lock();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
            self.hw.reset_hardware();
            for chain in inner.queue.iter_mut().filter(|c| c.state != ChainState::OffHardware) {
                chain.finish(ResultCode::InternalError, ERROR_STATUS_NO_DIAGNOSTIC);
            }
        }
        self.dispatch_completions();
        self.hw.disable_clock();
        self.done.notify_all();
        log::info!("engine shut down");
    }

    /// Number of queued chains matching `predicate`.
    pub fn count<P: Fn(&Chain) -> bool>(&self, predicate: P) -> usize { self.lock().queue.count(predicate) }

    pub fn queued(&self) -> usize { self.lock().queue.len() }

    pub fn stats(&self) -> StatsSnapshot { self.stats.snapshot() }

    pub fn clear_stats(&self) { self.stats.clear() }

    /// Top half plus hand-off: decodes the interrupt, then posts the deferred work
    /// to the worker, or runs it inline when no worker is attached. Returns whether
    /// the interrupt belonged to this engine.
    pub fn interrupt(&self) -> bool {
        let work = self.handle_interrupt();
        if work.needs_deferral() {
            let posted = match &*self.worker.lock().unwrap_or_else(PoisonError::into_inner) {
                Some(tx) => tx.send(WorkerOp::Deferred(work)).is_ok(),
                None => false,
            };
            if !posted {
                log::trace!("no worker attached, running deferred work inline");
                self.run_deferred(work);
            }
        }
        work.handled
    }

    /// True when a chain has sat on the hardware longer than the watchdog allows.
    pub(crate) fn hardware_stalled(&self) -> bool {
        let Some(timeout) = self.config.hw_timeout else { return false };
        let inner = self.lock();
        inner.queue.find_with_state(ChainState::OnHardware).is_some() && inner.last_progress.elapsed() >= timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosted::SimHw;

    fn engine() -> Engine<SimHw> { Engine::new(SimHw::new(), EngineConfig::default()).unwrap() }

    #[test]
    fn async_submit_needs_owner() {
        let e = engine();
        let chain = Chain::new(0x100).with_delivery(DeliveryMode::PoolOnly);
        assert_eq!(e.submit(chain), Err(EngineError::UnknownOwner));
        assert_eq!(e.queued(), 0);
    }

    #[test]
    fn duplicate_address_rejected() {
        let e = engine();
        let owner = e.register_owner(None);
        let first = Chain::new(0x100).with_delivery(DeliveryMode::PoolOnly).with_owner(owner);
        let again = Chain::new(0x100).with_delivery(DeliveryMode::PoolOnly).with_owner(owner);
        assert_eq!(e.submit(first), Ok(ResultCode::Ok));
        assert_eq!(e.submit(again), Err(EngineError::DuplicateChain));
    }

    #[test]
    fn deregister_discards_queued_work() {
        let e = engine();
        let owner = e.register_owner(None);
        for addr in [0x100, 0x200, 0x300] {
            e.submit(Chain::new(addr).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        }
        // 0x100 is on the hardware, the other two never got there
        assert_eq!(e.deregister_owner(owner), Ok(2));
        assert_eq!(e.queued(), 1);
        e.hw().raise(ExecState::Done1);
        e.interrupt();
        assert_eq!(e.queued(), 0);
        assert_eq!(e.stats().discarded, 3);
        assert_eq!(e.drain_results(owner, 8), Err(EngineError::UnknownOwner));
    }

    #[test]
    fn cancel_pending_chain() {
        let e = engine();
        let owner = e.register_owner(None);
        e.submit(Chain::new(0x100).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        let token = CancelToken::new();
        token.cancel();
        // 0x200 stays behind 0x100, so the cancel finds it pending
        assert_eq!(e.submit_cancellable(Chain::new(0x200), &token), Ok(ResultCode::InternalError));
        assert_eq!(e.queued(), 1);
    }

    #[test]
    fn cancel_in_flight_chain_discards_result() {
        let e = engine();
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(e.submit_cancellable(Chain::new(0x100), &token), Err(EngineError::Interrupted));
        assert_eq!(e.count(|c| c.state() == ChainState::OnHardware), 1);
        e.hw().raise(ExecState::Done1);
        e.interrupt();
        assert_eq!(e.queued(), 0);
        assert_eq!(e.stats().discarded, 1);
    }

    #[test]
    fn shutdown_refuses_work() {
        let e = engine();
        let owner = e.register_owner(None);
        e.submit(Chain::new(0x100).with_delivery(DeliveryMode::PoolOnly).with_owner(owner).with_user_ref(9)).unwrap();
        e.shutdown();
        let results = e.drain_results(owner, 8).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, ResultCode::InternalError);
        assert_eq!(results[0].user_ref, 9);
        assert_eq!(e.submit(Chain::new(0x200)), Err(EngineError::Shutdown));
    }

    #[test]
    fn clear_stats_zeroes_counters() {
        let e = engine();
        let owner = e.register_owner(None);
        e.submit(Chain::new(0x100).with_delivery(DeliveryMode::PoolOnly).with_owner(owner)).unwrap();
        e.hw().raise(ExecState::Done1);
        e.interrupt();
        assert_eq!(e.stats().completed, 1);
        e.clear_stats();
        assert_eq!(e.stats(), StatsSnapshot::default());
        // the queue itself is untouched
        assert_eq!(e.drain_results(owner, 4).unwrap().len(), 1);
    }
}
