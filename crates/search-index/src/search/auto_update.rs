//! Periodic background index updates.
//!
//! One dedicated thread sleeps on a condition variable between cycles, so a
//! stop request wakes it immediately instead of waiting out the interval.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cancel::CancellationToken;

/// Work driven by the auto-update loop.
pub trait UpdateTarget: Send + Sync + 'static {
    /// Token for the next cycle. Taken before the cycle is marked running so
    /// that `cancel_update_cycle` always reaches it.
    fn cycle_token(&self) -> CancellationToken;
    /// Runs one update cycle to completion or until `cancel` fires.
    fn run_update_cycle(&self, cancel: CancellationToken);
    /// Cancels every token handed out by `cycle_token` so far.
    fn cancel_update_cycle(&self);
}

#[derive(Debug, Default)]
struct LoopShared {
    stopped: Mutex<bool>,
    wake: Condvar,
    cycle_running: AtomicBool,
}

impl LoopShared {
    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps for `interval` or until stopped. Returns false once stopped.
    fn sleep(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        !*stopped
    }
}

/// Owned handle to the auto-update thread. Stopping cancels an in-flight
/// cycle and joins the thread; dropping the handle stops it.
pub struct AutoUpdateHandle {
    shared: Arc<LoopShared>,
    target: Arc<dyn UpdateTarget>,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AutoUpdateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoUpdateHandle")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl AutoUpdateHandle {
    /// Starts the loop. The first cycle runs after one full interval.
    pub fn spawn(target: Arc<dyn UpdateTarget>, interval: Duration) -> io::Result<Self> {
        let shared = Arc::new(LoopShared::default());
        let join_handle = {
            let shared = Arc::clone(&shared);
            let target = Arc::clone(&target);
            thread::Builder::new()
                .name("search-index-auto-update".into())
                .spawn(move || run_loop(&shared, target.as_ref(), interval))?
        };
        Ok(Self {
            shared,
            target,
            join_handle: Some(join_handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn stop(&mut self) {
        let Some(join_handle) = self.join_handle.take() else {
            return;
        };
        *self.shared.stopped.lock() = true;
        self.shared.wake.notify_all();
        if self.shared.cycle_running.load(Ordering::SeqCst) {
            self.target.cancel_update_cycle();
        }
        if join_handle.join().is_err() {
            log::warn!("auto-update thread panicked");
        }
    }
}

impl Drop for AutoUpdateHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(shared: &LoopShared, target: &dyn UpdateTarget, interval: Duration) {
    log::debug!("auto-update started (interval {interval:?})");
    while shared.sleep(interval) {
        let cancel = target.cycle_token();
        shared.cycle_running.store(true, Ordering::SeqCst);
        // Re-check after publishing the flag so a concurrent stop either sees
        // the flag or is seen here.
        if shared.is_stopped() {
            shared.cycle_running.store(false, Ordering::SeqCst);
            break;
        }
        target.run_update_cycle(cancel);
        shared.cycle_running.store(false, Ordering::SeqCst);
    }
    log::debug!("auto-update stopped");
}
