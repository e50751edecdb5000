//! The framework bus dispatcher: a second dedicated thread that
//! polls the framework's message bus and turns every message into a task on
//! the session's worker queue. Expressed as polling rather than a
//! glib-mainloop callback so the dispatcher doesn't need a framework-specific
//! event loop, only the `Pipeline::poll_bus` seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::pipeline::{BusMessage, Pipeline};
use crate::task::{Task, TaskScheduler};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct BusDispatcher {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl BusDispatcher {
    pub fn spawn(
        pipeline: Arc<dyn Pipeline>,
        scheduler: impl TaskScheduler + 'static,
        thread_name: String,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let join = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(&pipeline, &scheduler, &stop_flag))
            .expect("failed to spawn bus dispatcher thread");

        Self { stop, join: Some(join) }
    }

    /// Requests the dispatcher to exit after its current poll and blocks
    /// until its thread has joined.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for BusDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(pipeline: &Arc<dyn Pipeline>, scheduler: &dyn TaskScheduler, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match pipeline.poll_bus(POLL_TIMEOUT) {
            Some(BusMessage::StateChanged(state)) => {
                scheduler.schedule(Task::HandleBusStateChanged { state });
            }
            Some(BusMessage::Error(message)) => {
                scheduler.schedule(Task::HandleBusError { message });
            }
            Some(BusMessage::Eos) => {
                scheduler.schedule(Task::HandleBusEos);
            }
            Some(BusMessage::Qos(source, qos)) => {
                scheduler.schedule(Task::HandleBusQos { source, qos });
            }
            Some(BusMessage::Warning(message)) => {
                scheduler.schedule(Task::HandleBusWarning { message });
            }
            None => {}
        }
    }
}
