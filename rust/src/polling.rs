//! Fixed-interval background timers that always call the most recently
//! installed callback.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub type PollCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct PollScheduler {
    name: &'static str,
    handle: Handle,
    callback: Arc<RwLock<PollCallback>>,
    interval: Duration,
    enabled: bool,
    task: Option<(JoinHandle<()>, Arc<Mutex<bool>>)>,
}

impl PollScheduler {
    pub fn new(name: &'static str, handle: Handle, callback: PollCallback, interval: Duration) -> Self {
        Self {
            name,
            handle,
            callback: Arc::new(RwLock::new(callback)),
            interval: interval.max(MIN_POLL_INTERVAL),
            enabled: false,
            task: None,
        }
    }

    /// Replace the callback, interval and enablement in one step. The timer
    /// only restarts when the interval changes or it was not running.
    pub fn schedule(&mut self, callback: PollCallback, interval: Duration, enabled: bool) {
        self.set_callback(callback);
        let interval = interval.max(MIN_POLL_INTERVAL);
        if interval != self.interval {
            self.interval = interval;
            if self.is_running() {
                self.stop();
            }
        }
        self.set_enabled(enabled);
    }

    /// The next tick invokes `callback`; the timer keeps its phase.
    pub fn set_callback(&mut self, callback: PollCallback) {
        match self.callback.write() {
            Ok(mut slot) => *slot = callback,
            Err(poison) => *poison.into_inner() = callback,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled && enabled == self.is_running() {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|(task, _)| !task.is_finished())
            .unwrap_or(false)
    }

    /// After this returns no further invocation starts.
    pub fn stop(&mut self) {
        if let Some((task, live)) = self.task.take() {
            match live.lock() {
                Ok(mut g) => *g = false,
                Err(poison) => *poison.into_inner() = false,
            }
            task.abort();
            tracing::debug!(poller = self.name, "poller stopped");
        }
    }

    fn start(&mut self) {
        self.stop();
        let live = Arc::new(Mutex::new(true));
        let callback = self.callback.clone();
        let interval = self.interval;
        let name = self.name;
        let live_for_task = live.clone();
        let task = self.handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cb = match callback.read() {
                    Ok(g) => g.clone(),
                    Err(poison) => poison.into_inner().clone(),
                };
                let still_live = {
                    // Held across the call so `stop` cannot interleave with a tick.
                    let guard = match live_for_task.lock() {
                        Ok(g) => g,
                        Err(poison) => poison.into_inner(),
                    };
                    if *guard {
                        match catch_unwind(AssertUnwindSafe(|| cb())) {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                tracing::warn!(poller = name, err = %format!("{e:#}"), "poll tick failed")
                            }
                            Err(_) => tracing::error!(poller = name, "poll tick panicked"),
                        }
                    }
                    *guard
                };
                if !still_live {
                    return;
                }
            }
        });
        tracing::debug!(poller = self.name, interval_ms = interval.as_millis() as u64, "poller started");
        self.task = Some((task, live));
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, PollCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let cb: PollCallback = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (hits, cb)
    }

    fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if f() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("{what}: condition not met within {timeout:?}");
    }

    #[test]
    fn disabled_scheduler_never_fires() {
        let rt = runtime();
        let (hits, cb) = counter();
        let mut poller = PollScheduler::new("test", rt.handle().clone(), cb, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!poller.is_running());
        poller.set_enabled(false);
        assert!(!poller.is_running());
    }

    #[test]
    fn fires_repeatedly_and_stops_cleanly() {
        let rt = runtime();
        let (hits, cb) = counter();
        let mut poller = PollScheduler::new("test", rt.handle().clone(), cb, Duration::from_millis(20));
        poller.set_enabled(true);
        wait_until("three ticks", Duration::from_secs(2), || {
            hits.load(Ordering::SeqCst) >= 3
        });

        poller.stop();
        let after_stop = hits.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(hits.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn latest_callback_wins() {
        let rt = runtime();
        let (old_hits, old_cb) = counter();
        let (new_hits, new_cb) = counter();
        let mut poller =
            PollScheduler::new("test", rt.handle().clone(), old_cb, Duration::from_millis(20));
        poller.schedule(new_cb, Duration::from_millis(20), true);
        wait_until("new callback", Duration::from_secs(2), || {
            new_hits.load(Ordering::SeqCst) >= 2
        });
        assert_eq!(old_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_callback_keeps_ticking() {
        let rt = runtime();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let cb: PollCallback = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("backend unavailable")
        });
        let mut poller = PollScheduler::new("test", rt.handle().clone(), cb, Duration::from_millis(15));
        poller.set_enabled(true);
        wait_until("ticks after errors", Duration::from_secs(2), || {
            hits.load(Ordering::SeqCst) >= 3
        });
        assert!(poller.is_running());
    }

    #[test]
    fn drop_stops_the_timer() {
        let rt = runtime();
        let (hits, cb) = counter();
        {
            let mut poller =
                PollScheduler::new("test", rt.handle().clone(), cb, Duration::from_millis(15));
            poller.set_enabled(true);
            wait_until("first tick", Duration::from_secs(2), || {
                hits.load(Ordering::SeqCst) >= 1
            });
        }
        let after_drop = hits.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(hits.load(Ordering::SeqCst), after_drop);
    }
}
