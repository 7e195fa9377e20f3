use serde::{Deserialize, Serialize};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Armed,
    Firing,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_fires: u64,
    pub total_rearms: u64,
}

#[derive(Debug)]
struct Control {
    state: SchedulerState,
    stop_requested: bool,
    rearm_requested: bool,
    stats: SchedulerStats,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock()
    }
}

/// Periodic timer driving sample generation on its own thread.
///
/// The delay before each fire is read from `interval` every time the timer
/// arms, so interval changes apply at the next tick at the latest, or
/// immediately after [`rearm`](Self::rearm).
#[derive(Debug)]
pub struct SampleScheduler {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SampleScheduler {
    pub fn start<I, F>(name: &str, interval: I, fire: F) -> std::io::Result<Self>
    where
        I: Fn() -> Duration + Send + 'static,
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: SchedulerState::Armed,
                stop_requested: false,
                rearm_requested: false,
                stats: SchedulerStats::default(),
            }),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || run(&thread_shared, interval, fire))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Asks the timer to recompute its pending deadline from the current
    /// interval.
    pub fn rearm(&self) {
        self.shared.lock().rearm_requested = true;
        self.shared.wake.notify_all();
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.lock().stats
    }

    /// Stops the timer and waits for the thread to exit, so no fire is in
    /// flight once this returns. Safe to call more than once.
    pub fn stop(&self) {
        {
            let mut control = self.shared.lock();
            control.stop_requested = true;
        }
        self.shared.wake.notify_all();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from inside a fire: the loop exits on its own once
                // the handler returns.
                return;
            }
            if handle.join().is_err() {
                error!("sample scheduler thread panicked");
            }
        }
    }
}

impl Drop for SampleScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<I, F>(shared: &Shared, interval: I, mut fire: F)
where
    I: Fn() -> Duration,
    F: FnMut(),
{
    let mut last_fire = Instant::now();
    let mut control = shared.lock();

    loop {
        if control.stop_requested {
            break;
        }

        let deadline = last_fire + interval();
        let now = Instant::now();
        if now < deadline {
            shared.wake.wait_for(&mut control, deadline - now);
            if control.rearm_requested {
                control.rearm_requested = false;
                control.stats.total_rearms += 1;
                debug!("sample timer re-armed");
            }
            continue;
        }

        control.state = SchedulerState::Firing;
        last_fire = Instant::now();
        // The handler runs with the control lock released.
        MutexGuard::unlocked(&mut control, &mut fire);

        control.stats.total_fires += 1;
        if control.stop_requested {
            break;
        }
        control.state = SchedulerState::Armed;
    }

    control.state = SchedulerState::Stopped;
    debug!(fires = control.stats.total_fires, "sample timer stopped");
}
