//! Recurring local poll task with an epoch guard.
//!
//! The task runs on the current thread's `LocalSet` (model state is `!Send`).
//! Each arm or cancel bumps the epoch; a tick body compares the epoch it was
//! started with against [`PollTask::epoch`] after every suspension point to
//! detect that it has been superseded.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct PollTask {
    handle: RefCell<Option<JoinHandle<()>>>,
    epoch: Cell<u64>,
}

impl PollTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// True while a loop is scheduled and has not stopped on its own.
    pub fn is_armed(&self) -> bool {
        self.handle
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Replace any running loop with a new one that calls `tick` every
    /// `period`, starting immediately. The loop ends when `tick` resolves to
    /// `false`. Missed ticks are delayed, never burst, and a tick only starts
    /// after the previous one finished. Must be called inside a `LocalSet`.
    pub fn arm<F, Fut>(&self, period: Duration, mut tick: F) -> u64
    where
        F: FnMut(u64) -> Fut + 'static,
        Fut: Future<Output = bool> + 'static,
    {
        self.abort_current();
        let epoch = self.bump();
        // `interval` rejects a zero period.
        let period = period.max(MIN_PERIOD);
        let handle = tokio::task::spawn_local(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick(epoch).await {
                    break;
                }
            }
        });
        *self.handle.borrow_mut() = Some(handle);
        info!(epoch, period_ms = period.as_millis() as u64, "poll task armed");
        epoch
    }

    /// Stop the loop, if any. Always bumps the epoch so in-flight results are
    /// recognized as stale.
    pub fn cancel(&self) -> u64 {
        let had_task = self.abort_current();
        let epoch = self.bump();
        if had_task {
            info!(epoch, "poll task cancelled");
        }
        epoch
    }

    fn bump(&self) -> u64 {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        epoch
    }

    fn abort_current(&self) -> bool {
        match self.handle.borrow_mut().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.abort_current();
    }
}
