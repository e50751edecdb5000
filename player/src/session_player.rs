//! The session player facade. Every mutating method builds a task via the
//! factory and enqueues it on the worker, returning immediately. The
//! direct-read queries (`get_position`, `get_volume`, `get_mute`) bypass the
//! queue and talk to the `Pipeline` directly on the caller's thread instead —
//! safe because the framework itself answers these queries in a thread-safe
//! way. That exception should not be extended to anything else: every other
//! operation must go through the worker so `PlayerContext` stays
//! single-writer.

use std::sync::Arc;
use std::time::Duration;

use rialto_common::media::{MediaSegment, MediaSource, SourceType};

use crate::data_reader::PartitionReader;
use crate::factory::TaskFactory;
use crate::pipeline::{ElementHandle, Pipeline, PipelineState, Rectangle};
use crate::worker::WorkerHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerStats {
    pub position: Option<Duration>,
    pub volume: f64,
    pub muted: bool,
}

pub struct SessionPlayer {
    worker: WorkerHandle,
    factory: TaskFactory,
    pipeline: Arc<dyn Pipeline>,
}

impl SessionPlayer {
    pub fn new(worker: WorkerHandle, factory: TaskFactory, pipeline: Arc<dyn Pipeline>) -> Self {
        Self { worker, factory, pipeline }
    }

    pub fn attach_source(&self, source: MediaSource) {
        self.worker.enqueue(self.factory.attach_source(source));
    }

    pub fn remove_source(&self, source: SourceType) {
        self.worker.enqueue(self.factory.remove_source(source));
    }

    pub fn all_sources_attached(&self) {
        self.worker.enqueue(self.factory.finish_setup_source());
    }

    pub fn play(&self) {
        self.worker.enqueue(self.factory.play());
    }

    pub fn pause(&self) {
        self.worker.enqueue(self.factory.pause());
    }

    pub fn stop(&self) {
        self.worker.enqueue(self.factory.stop());
    }

    pub fn set_position(&self, position: Duration) {
        self.worker.enqueue(self.factory.set_position(position));
    }

    pub fn set_source_position(&self, source: SourceType, position: Duration, reset_time: Duration) {
        self.worker
            .enqueue(self.factory.set_source_position(source, position, reset_time));
    }

    pub fn flush(&self, source: SourceType, reset_time: Duration) {
        self.worker.enqueue(self.factory.flush(source, reset_time));
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.worker.enqueue(self.factory.set_playback_rate(rate));
    }

    pub fn set_video_geometry(&self, rect: Rectangle) {
        self.worker.enqueue(self.factory.set_video_geometry(rect));
    }

    pub fn set_volume(&self, volume: f64) {
        self.worker.enqueue(self.factory.set_volume(volume));
    }

    pub fn set_mute(&self, mute: bool) {
        self.worker.enqueue(self.factory.set_mute(mute));
    }

    pub fn render_frame(&self) {
        self.worker.enqueue(self.factory.render_frame());
    }

    pub fn have_data(&self, source: SourceType, reader: Arc<dyn PartitionReader>) {
        self.worker
            .enqueue(self.factory.read_shm_data_and_attach_samples(source, reader));
    }

    pub fn add_segments(&self, segments: Vec<MediaSegment>) {
        self.worker.enqueue(self.factory.attach_samples(segments));
    }

    pub fn notify_source_element(&self, source: ElementHandle) {
        self.worker.enqueue(self.factory.setup_source(source));
    }

    pub fn notify_eos(&self, source: SourceType) {
        self.worker.enqueue(self.factory.eos(source));
    }

    pub fn shutdown(&self) {
        self.worker.enqueue(self.factory.stop());
        self.worker.enqueue(self.factory.shutdown());
    }

    /// Enqueues a heartbeat task; `on_complete` runs once the worker reaches
    /// it in turn, signalling liveness to the caller.
    pub fn ping(&self, on_complete: impl FnOnce() + Send + 'static) {
        self.worker.enqueue(self.factory.ping(on_complete));
    }

    /// `false` when the pipeline is not in PAUSED/PLAYING.
    pub fn get_position(&self) -> Option<Duration> {
        if !matches!(
            self.pipeline.current_state(),
            PipelineState::Paused | PipelineState::Playing
        ) {
            return None;
        }
        self.pipeline.position()
    }

    pub fn get_volume(&self) -> f64 {
        self.pipeline.volume()
    }

    pub fn get_mute(&self) -> bool {
        self.pipeline.mute()
    }

    pub fn get_stats(&self) -> PlayerStats {
        PlayerStats {
            position: self.pipeline.position(),
            volume: self.pipeline.volume(),
            muted: self.pipeline.mute(),
        }
    }
}
