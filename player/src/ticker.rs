//! The position-reporting/underflow-check timer: a third dedicated thread,
//! alongside the worker and bus dispatcher, that periodically schedules
//! `ReportPosition` and `CheckAudioUnderflow` so the client gets position
//! updates and stall detection without every other task needing to poll for
//! them inline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::task::{Task, TaskScheduler};

pub struct PositionTicker {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PositionTicker {
    pub fn spawn(
        scheduler: impl TaskScheduler + 'static,
        interval: Duration,
        underflow_margin: Duration,
        thread_name: String,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let join = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(&scheduler, &stop_flag, interval, underflow_margin))
            .expect("failed to spawn position ticker thread");

        Self { stop, join: Some(join) }
    }

    /// Requests the ticker to exit after its current sleep and blocks until
    /// its thread has joined.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(scheduler: &dyn TaskScheduler, stop: &AtomicBool, interval: Duration, underflow_margin: Duration) {
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(interval);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        scheduler.schedule(Task::ReportPosition);
        scheduler.schedule(Task::CheckAudioUnderflow { underflow_margin });
    }
}
