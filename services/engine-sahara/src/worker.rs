use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};

use crate::api::EngineError;
use crate::engine::Engine;
use crate::hw::Hardware;
use crate::status::DeferredWork;

/// Messages to the deferred worker.
#[derive(Debug)]
pub(crate) enum WorkerOp {
    /// Posted by the interrupt handler.
    Deferred(DeferredWork),
    /// Exit the server loop.
    Quit,
}

/// Thread that runs the deferred half of interrupt handling and the hardware
/// watchdog.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    quit: Box<dyn Fn() + Send + Sync>,
}

impl Worker {
    /// Starts the worker and attaches it to `engine`; from then on
    /// [`Engine::interrupt`] posts to it instead of running work inline.
    pub fn spawn<H: Hardware + 'static>(engine: Arc<Engine<H>>) -> Result<Worker, EngineError> {
        let (tx, rx) = channel();
        let handle = {
            let engine = engine.clone();
            thread::Builder::new()
                .name("engine-sahara-worker".into())
                .spawn(move || worker_loop(engine, rx))
                .map_err(|e| {
                    log::error!("couldn't start worker: {:?}", e);
                    EngineError::NoResource
                })?
        };
        *engine.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        let quit = Box::new(move || {
            let sender = engine.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = sender {
                tx.send(WorkerOp::Quit).ok();
            }
        });
        Ok(Worker { handle: Some(handle), quit })
    }

    /// Detaches the worker from the engine and waits for it to exit. Work posted
    /// before this call is finished first.
    pub fn quit(mut self) { self.stop() }

    fn stop(&mut self) {
        (self.quit)();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) { self.stop() }
}

fn worker_loop<H: Hardware>(engine: Arc<Engine<H>>, rx: Receiver<WorkerOp>) {
    log::trace!("worker ready");
    loop {
        let msg = match engine.config.hw_timeout {
            Some(timeout) => rx.recv_timeout(timeout),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(WorkerOp::Deferred(work)) => {
                log::trace!("deferred: {:?}", work);
                engine.run_deferred(work);
            }
            Ok(WorkerOp::Quit) => {
                log::info!("worker quitting");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if engine.hardware_stalled() {
                    let work = engine.handle_timeout();
                    engine.run_deferred(work);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::hosted::SimHw;
    use crate::*;

    #[test]
    fn quit_detaches() {
        let e = Arc::new(Engine::new(SimHw::new(), EngineConfig::default()).unwrap());
        let worker = Worker::spawn(e.clone()).unwrap();
        assert!(e.worker.lock().unwrap().is_some());
        worker.quit();
        assert!(e.worker.lock().unwrap().is_none());
    }

    #[test]
    fn watchdog_recovers_stuck_chain() {
        let cfg = EngineConfig { hw_timeout: Some(Duration::from_millis(20)), ..Default::default() };
        let e = Arc::new(Engine::new(SimHw::new(), cfg).unwrap());
        let _worker = Worker::spawn(e.clone()).unwrap();
        // nothing is ever raised, so only the watchdog can finish this
        assert_eq!(e.submit(Chain::new(0x10)), Ok(ResultCode::Error));
        assert_eq!(e.stats().faults, 1);
        assert_eq!(e.stats().resets, 1);
    }
}
