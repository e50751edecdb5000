//! The narrow `Pipeline`/`Element` abstraction the task catalogue is written
//! against, keeping the framework (GStreamer or a fake) entirely out of the
//! task catalogue's own vocabulary.
//!
//! Framework element/buffer handles are reference-counted at the C level
//! (`GstElement*`, `GstBuffer*`); an explicit ref/unref contract keeps buffer
//! conservation mechanically checkable. Rust's ownership model gives this for
//! free: a `Buffer` is consumed exactly once, either by `Pipeline::push_buffer`
//! (ownership transferred to the framework) or by `Pipeline::unref_buffer`
//! (explicit drop on flush/stop/seek) — the compiler rejects any path that
//! could use it twice.

use std::sync::Arc;
use std::time::Duration;

use rialto_common::media::{MediaSegment, SourceType};
use rialto_common::{RialtoError, RialtoResult};

use crate::task::TaskScheduler;

/// Opaque handle to a framework element (an appsrc, a sink, a decoder, …).
/// Session-scoped; never dereferenced off the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// A buffer ready to push into an appsrc. Owns its payload; consumed exactly
/// once (see module docs).
#[derive(Debug)]
pub struct Buffer {
    pub segment: MediaSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Which named property-bearing element a property task targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementTarget {
    VideoSink,
    AudioSink,
    AudioDecoder,
    VideoDecoder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
}

/// The framework-facing seam. A real implementation wraps a `gstreamer`
/// pipeline behind this; tests use an in-memory fake (see `pipeline::fake`).
pub trait Pipeline: Send + Sync {
    /// Gives the pipeline a scheduler to post follow-up tasks onto (currently
    /// `NeedData`/`EnoughData` driven by appsrc backpressure). Called once,
    /// before any `create_app_src`; implementations that never originate
    /// their own tasks can leave this a no-op.
    fn attach_scheduler(&self, _scheduler: Arc<dyn TaskScheduler>) {}

    /// Create a new appsrc-type element, deriving its caps from `source`. The
    /// mime/codec-specific caps construction is media-framework plumbing and
    /// lives entirely inside the concrete `Pipeline` impl.
    fn create_app_src(&self, source: &rialto_common::media::MediaSource) -> RialtoResult<ElementHandle>;

    /// Whether `element`'s current caps match the ones implied by
    /// re-attaching `source` — used by the hot-swap branch of attaching a
    /// source whose caps changed.
    fn caps_match(&self, element: ElementHandle, source: &rialto_common::media::MediaSource) -> bool;

    /// Audio-codec-channel-switch on an existing appsrc whose caps changed
    /// (the non-identity hot-swap branch of attaching a source).
    fn switch_app_src_caps(&self, element: ElementHandle, source: &rialto_common::media::MediaSource) -> RialtoResult<()>;

    /// Push an owned buffer into `element`. Ownership moves to the framework.
    fn push_buffer(&self, element: ElementHandle, buffer: Buffer) -> RialtoResult<()>;

    /// Explicitly drop a buffer that will never be pushed (flush/stop/seek).
    fn unref_buffer(&self, buffer: Buffer);

    fn send_eos(&self, element: ElementHandle) -> RialtoResult<()>;
    fn send_flush_start(&self, element: ElementHandle) -> RialtoResult<()>;
    fn send_flush_stop(&self, element: ElementHandle, reset_time: Duration) -> RialtoResult<()>;
    /// Attach a segment event carrying `position` to the next buffer pushed
    /// on `element`.
    fn send_segment(&self, element: ElementHandle, position: Duration) -> RialtoResult<()>;

    /// Flushing seek at `rate`, `TIME` format, `start = position`.
    fn seek(&self, position: Duration, rate: f64) -> RialtoResult<()>;

    fn set_state(&self, state: PipelineState) -> RialtoResult<()>;
    fn current_state(&self) -> PipelineState;
    /// `None` when the framework cannot answer right now (no pipeline, or a
    /// query in flight); direct-read queries should report failure whenever
    /// the pipeline isn't in PAUSED or PLAYING.
    fn position(&self) -> Option<Duration>;

    /// Generic-path rate change: a `custom-instant-rate-change` structure sent
    /// as a downstream OOB event.
    fn send_instant_rate_change(&self, rate: f64) -> RialtoResult<()>;
    /// Amlhalasink-path rate change: a segment with `rate = newRate`,
    /// `start = position = NONE` sent on the sink's pad.
    fn send_amlhalasink_rate_change(&self, rate: f64) -> RialtoResult<()>;
    /// Detected by audio-sink name prefix "amlhalasink".
    fn audio_sink_is_amlhalasink(&self) -> bool;

    fn video_sink_known(&self) -> bool;
    fn set_video_geometry(&self, rect: Rectangle) -> RialtoResult<()>;

    /// Verify the property exists on the target element's class before
    /// setting it; silently no-op if absent.
    fn set_property_if_exists(&self, target: ElementTarget, name: &str, value: PropertyValue) -> bool;

    fn set_volume(&self, volume: f64);
    fn volume(&self) -> f64;
    fn set_mute(&self, mute: bool);
    fn mute(&self) -> bool;
    fn render_frame(&self);

    /// Poll the framework message bus with a short timeout, returning the
    /// next message if one arrived. `None` on timeout.
    fn poll_bus(&self, timeout: Duration) -> Option<BusMessage>;
}

/// Framework bus messages the dispatcher translates into tasks.
#[derive(Debug, Clone)]
pub enum BusMessage {
    StateChanged(PipelineState),
    Error(String),
    Eos,
    Qos(SourceType, crate::client::QosInfo),
    Warning(String),
}

impl From<&str> for RialtoError {
    fn from(value: &str) -> Self {
        RialtoError::Transient(value.to_owned())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{Buffer, ElementHandle, ElementTarget, Pipeline, PipelineState, PropertyValue, Rectangle};
    use parking_lot::Mutex;
    use rialto_common::media::{MediaSource, SourceType};
    use rialto_common::RialtoResult;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct State {
        state: PipelineState,
        position: Option<Duration>,
        volume: f64,
        mute: bool,
        elements: HashMap<ElementHandle, SourceType>,
        pushed: u64,
        unreffed: u64,
    }

    impl Default for PipelineState {
        fn default() -> Self {
            PipelineState::Null
        }
    }

    /// In-memory `Pipeline` used by task-catalogue tests. Counts pushes and
    /// unrefs so buffer conservation (every pushed buffer eventually unreffed)
    /// is assertable.
    pub struct FakePipeline {
        next_id: AtomicU64,
        amlhalasink: AtomicBool,
        state: Mutex<State>,
    }

    impl FakePipeline {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1),
                amlhalasink: AtomicBool::new(false),
                state: Mutex::new(State {
                    volume: 1.0,
                    ..State::default()
                }),
            }
        }

        pub fn set_amlhalasink(&self, on: bool) {
            self.amlhalasink.store(on, Ordering::SeqCst);
        }

        pub fn set_position(&self, position: Duration) {
            self.state.lock().position = Some(position);
        }

        pub fn pushed_count(&self) -> u64 {
            self.state.lock().pushed
        }

        pub fn unreffed_count(&self) -> u64 {
            self.state.lock().unreffed
        }
    }

    impl Pipeline for FakePipeline {
        fn create_app_src(&self, source: &MediaSource) -> RialtoResult<ElementHandle> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let handle = ElementHandle(id);
            self.state.lock().elements.insert(handle, source.source_type());
            Ok(handle)
        }

        fn caps_match(&self, _element: ElementHandle, _source: &MediaSource) -> bool {
            false
        }

        fn switch_app_src_caps(&self, _element: ElementHandle, _source: &MediaSource) -> RialtoResult<()> {
            Ok(())
        }

        fn push_buffer(&self, _element: ElementHandle, _buffer: Buffer) -> RialtoResult<()> {
            self.state.lock().pushed += 1;
            Ok(())
        }

        fn unref_buffer(&self, _buffer: Buffer) {
            self.state.lock().unreffed += 1;
        }

        fn send_eos(&self, _element: ElementHandle) -> RialtoResult<()> {
            Ok(())
        }

        fn send_flush_start(&self, _element: ElementHandle) -> RialtoResult<()> {
            Ok(())
        }

        fn send_flush_stop(&self, _element: ElementHandle, _reset_time: Duration) -> RialtoResult<()> {
            Ok(())
        }

        fn send_segment(&self, _element: ElementHandle, _position: Duration) -> RialtoResult<()> {
            Ok(())
        }

        fn seek(&self, position: Duration, _rate: f64) -> RialtoResult<()> {
            self.state.lock().position = Some(position);
            Ok(())
        }

        fn set_state(&self, state: PipelineState) -> RialtoResult<()> {
            self.state.lock().state = state;
            Ok(())
        }

        fn current_state(&self) -> PipelineState {
            self.state.lock().state
        }

        fn position(&self) -> Option<Duration> {
            self.state.lock().position
        }

        fn send_instant_rate_change(&self, _rate: f64) -> RialtoResult<()> {
            Ok(())
        }

        fn send_amlhalasink_rate_change(&self, _rate: f64) -> RialtoResult<()> {
            Ok(())
        }

        fn audio_sink_is_amlhalasink(&self) -> bool {
            self.amlhalasink.load(Ordering::SeqCst)
        }

        fn video_sink_known(&self) -> bool {
            true
        }

        fn set_video_geometry(&self, _rect: Rectangle) -> RialtoResult<()> {
            Ok(())
        }

        fn set_property_if_exists(&self, _target: ElementTarget, _name: &str, _value: PropertyValue) -> bool {
            true
        }

        fn set_volume(&self, volume: f64) {
            self.state.lock().volume = volume;
        }

        fn volume(&self) -> f64 {
            self.state.lock().volume
        }

        fn set_mute(&self, mute: bool) {
            self.state.lock().mute = mute;
        }

        fn mute(&self) -> bool {
            self.state.lock().mute
        }

        fn render_frame(&self) {}

        fn poll_bus(&self, _timeout: Duration) -> Option<super::BusMessage> {
            None
        }
    }
}
