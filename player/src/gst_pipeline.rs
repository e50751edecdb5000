//! A real `gstreamer`-backed `Pipeline` (only compiled with the `gst`
//! feature). Built from `appsrc` elements feeding `decodebin`, using the same
//! dynamic-pad-linking idiom a `playbin`-based pipeline relies on internally
//! — adapted here because the task catalogue pushes already-demuxed samples
//! per source rather than handing GStreamer a URI to demux itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use log::error;
use parking_lot::Mutex;
use rialto_common::media::{MediaSource, MediaSourceKind, SourceType};
use rialto_common::{RialtoError, RialtoResult};

use crate::client::QosInfo;
use crate::pipeline::{
    Buffer, BusMessage, ElementHandle, ElementTarget, Pipeline, PipelineState, PropertyValue, Rectangle,
};
use crate::task::{Task, TaskScheduler};

fn caps_for(source: &MediaSource) -> gst::Caps {
    match &source.kind {
        MediaSourceKind::Audio { sample_rate, number_of_channels, .. } => {
            let mut builder = gst::Caps::builder(&source.mime_type)
                .field("rate", *sample_rate as i32)
                .field("channels", *number_of_channels as i32);
            if source.mime_type == "audio/mpeg" {
                builder = builder.field("mpegversion", 4i32).field("stream-format", "raw");
            }
            builder.build()
        }
        MediaSourceKind::Video { width, height } | MediaSourceKind::VideoDolbyVision { width, height, .. } => {
            gst::Caps::builder(&source.mime_type)
                .field("width", *width as i32)
                .field("height", *height as i32)
                .build()
        }
        MediaSourceKind::Subtitle { .. } => gst::Caps::builder(&source.mime_type).build(),
    }
}

struct Element {
    appsrc: gst_app::AppSrc,
    source_type: SourceType,
}

struct State {
    elements: HashMap<u64, Element>,
    next_id: u64,
    volume_element: Option<gst::Element>,
    video_sink: Option<gst::Element>,
    audio_sink: Option<gst::Element>,
    position_override: Option<Duration>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
}

/// Owns one session's `gst::Pipeline` plus its `appsrc` elements. Each
/// `attachSource` call adds an `appsrc ! decodebin` branch; `decodebin`'s
/// `pad-added` signal links the decoded pad into an `audioconvert ! autoaudiosink`
/// or `videoconvert ! autovideosink` tail built on demand.
pub struct GstPipeline {
    pipeline: gst::Pipeline,
    bus: gst::Bus,
    state: Arc<Mutex<State>>,
    // `gst::Bus::timed_pop_filtered` requires `&self` but is not `Sync`-free
    // of internal locking on some versions; serialise polls defensively.
    poll_lock: StdMutex<()>,
}

impl GstPipeline {
    pub fn new() -> RialtoResult<Self> {
        gst::init().map_err(|err| RialtoError::Setup(format!("gst::init failed: {err}")))?;
        let pipeline = gst::Pipeline::new();
        let bus = pipeline.bus().ok_or_else(|| RialtoError::Setup("pipeline has no bus".into()))?;

        Ok(Self {
            pipeline,
            bus,
            state: Arc::new(Mutex::new(State {
                elements: HashMap::new(),
                next_id: 1,
                volume_element: None,
                video_sink: None,
                audio_sink: None,
                position_override: None,
                scheduler: None,
            })),
            poll_lock: StdMutex::new(()),
        })
    }

    /// Builds the `audioconvert`/`videoconvert` + auto-sink tail for a newly
    /// decoded pad and links it in. Records the sink so later volume/mute/
    /// geometry/property calls have something to act on.
    fn link_decoded_pad(
        pipeline: &gst::Pipeline,
        state: &Arc<Mutex<State>>,
        source_type: SourceType,
        pad: &gst::Pad,
    ) -> RialtoResult<()> {
        let (convert_name, sink_name) = match source_type {
            SourceType::Audio => ("audioconvert", "autoaudiosink"),
            SourceType::Video | SourceType::Subtitle => ("videoconvert", "autovideosink"),
        };
        let convert = gst::ElementFactory::make(convert_name)
            .build()
            .map_err(|err| RialtoError::Setup(format!("creating {convert_name}: {err}")))?;
        let sink = gst::ElementFactory::make(sink_name)
            .build()
            .map_err(|err| RialtoError::Setup(format!("creating {sink_name}: {err}")))?;

        pipeline
            .add_many([&convert, &sink])
            .map_err(|err| RialtoError::Setup(format!("adding decode tail: {err}")))?;
        gst::Element::link_many([&convert, &sink])
            .map_err(|err| RialtoError::Setup(format!("linking decode tail: {err}")))?;
        convert.sync_state_with_parent().ok();
        sink.sync_state_with_parent().ok();

        let sink_pad = convert
            .static_pad("sink")
            .ok_or_else(|| RialtoError::Setup("audioconvert/videoconvert has no sink pad".into()))?;
        pad.link(&sink_pad)
            .map_err(|err| RialtoError::Setup(format!("linking decodebin pad: {err:?}")))?;

        let mut guard = state.lock();
        match source_type {
            SourceType::Audio => {
                guard.audio_sink = Some(sink.clone());
                guard.volume_element = Some(sink);
            }
            SourceType::Video | SourceType::Subtitle => {
                guard.video_sink = Some(sink);
            }
        }
        Ok(())
    }
}

impl Pipeline for GstPipeline {
    fn attach_scheduler(&self, scheduler: Arc<dyn TaskScheduler>) {
        self.state.lock().scheduler = Some(scheduler);
    }

    fn create_app_src(&self, source: &MediaSource) -> RialtoResult<ElementHandle> {
        let appsrc = gst_app::AppSrc::builder()
            .caps(&caps_for(source))
            .format(gst::Format::Time)
            .is_live(true)
            .build();
        let decodebin = gst::ElementFactory::make("decodebin")
            .build()
            .map_err(|err| RialtoError::Setup(format!("creating decodebin: {err}")))?;

        self.pipeline
            .add_many([appsrc.upcast_ref::<gst::Element>(), &decodebin])
            .map_err(|err| RialtoError::Setup(format!("adding appsrc/decodebin: {err}")))?;
        appsrc
            .link(&decodebin)
            .map_err(|err| RialtoError::Setup(format!("linking appsrc to decodebin: {err}")))?;

        let pipeline = self.pipeline.clone();
        let state_for_closure = self.state.clone();
        let source_type = source.source_type();
        decodebin.connect_pad_added(move |_bin, pad| {
            if let Err(err) = Self::link_decoded_pad(&pipeline, &state_for_closure, source_type, pad) {
                error!("failed to link decoded pad: {err}");
            }
        });

        let state_for_need_data = self.state.clone();
        let state_for_enough_data = self.state.clone();
        appsrc.set_callbacks(
            gst_app::AppSrcCallbacks::builder()
                .need_data(move |_appsrc, _size| {
                    if let Some(scheduler) = &state_for_need_data.lock().scheduler {
                        scheduler.schedule(Task::NeedData { source: source_type });
                    }
                })
                .enough_data(move |_appsrc| {
                    if let Some(scheduler) = &state_for_enough_data.lock().scheduler {
                        scheduler.schedule(Task::EnoughData { source: source_type });
                    }
                })
                .build(),
        );

        appsrc.sync_state_with_parent().ok();
        decodebin.sync_state_with_parent().ok();

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.elements.insert(id, Element { appsrc, source_type });
        Ok(ElementHandle(id))
    }

    fn caps_match(&self, element: ElementHandle, source: &MediaSource) -> bool {
        let state = self.state.lock();
        let Some(entry) = state.elements.get(&element.0) else { return false };
        entry
            .appsrc
            .caps()
            .is_some_and(|current| current == caps_for(source))
    }

    fn switch_app_src_caps(&self, element: ElementHandle, source: &MediaSource) -> RialtoResult<()> {
        let state = self.state.lock();
        let entry = state
            .elements
            .get(&element.0)
            .ok_or_else(|| RialtoError::ClientProtocol("unknown element handle".into()))?;
        entry.appsrc.set_caps(Some(&caps_for(source)));
        Ok(())
    }

    fn push_buffer(&self, element: ElementHandle, buffer: Buffer) -> RialtoResult<()> {
        let state = self.state.lock();
        let entry = state
            .elements
            .get(&element.0)
            .ok_or_else(|| RialtoError::ClientProtocol("unknown element handle".into()))?;

        let mut gst_buffer = gst::Buffer::from_slice(buffer.segment.data);
        {
            let buf_mut = gst_buffer.get_mut().expect("sole owner of fresh buffer");
            buf_mut.set_pts(gst::ClockTime::from_nseconds(buffer.segment.timestamp.as_nanos() as u64));
            buf_mut.set_duration(gst::ClockTime::from_nseconds(buffer.segment.duration.as_nanos() as u64));
        }

        entry
            .appsrc
            .push_buffer(gst_buffer)
            .map(|_| ())
            .map_err(|err| RialtoError::Transient(format!("appsrc push_buffer failed: {err:?}")))
    }

    fn unref_buffer(&self, buffer: Buffer) {
        drop(buffer);
    }

    fn send_eos(&self, element: ElementHandle) -> RialtoResult<()> {
        let state = self.state.lock();
        let entry = state
            .elements
            .get(&element.0)
            .ok_or_else(|| RialtoError::ClientProtocol("unknown element handle".into()))?;
        entry
            .appsrc
            .end_of_stream()
            .map(|_| ())
            .map_err(|err| RialtoError::Transient(format!("appsrc end_of_stream failed: {err:?}")))
    }

    fn send_flush_start(&self, element: ElementHandle) -> RialtoResult<()> {
        let state = self.state.lock();
        let entry = state
            .elements
            .get(&element.0)
            .ok_or_else(|| RialtoError::ClientProtocol("unknown element handle".into()))?;
        entry
            .appsrc
            .send_event(gst::event::FlushStart::new())
            .then_some(())
            .ok_or_else(|| RialtoError::Transient("flush-start event rejected".into()))
    }

    fn send_flush_stop(&self, element: ElementHandle, reset_time: Duration) -> RialtoResult<()> {
        let state = self.state.lock();
        let entry = state
            .elements
            .get(&element.0)
            .ok_or_else(|| RialtoError::ClientProtocol("unknown element handle".into()))?;
        let reset = reset_time > Duration::ZERO;
        entry
            .appsrc
            .send_event(gst::event::FlushStop::new(reset))
            .then_some(())
            .ok_or_else(|| RialtoError::Transient("flush-stop event rejected".into()))
    }

    fn send_segment(&self, element: ElementHandle, position: Duration) -> RialtoResult<()> {
        let state = self.state.lock();
        let entry = state
            .elements
            .get(&element.0)
            .ok_or_else(|| RialtoError::ClientProtocol("unknown element handle".into()))?;
        let mut segment = gst::FormattedSegment::<gst::ClockTime>::new();
        segment.set_start(gst::ClockTime::from_nseconds(position.as_nanos() as u64));
        entry
            .appsrc
            .send_event(gst::event::Segment::new(&segment))
            .then_some(())
            .ok_or_else(|| RialtoError::Transient("segment event rejected".into()))
    }

    fn seek(&self, position: Duration, rate: f64) -> RialtoResult<()> {
        self.pipeline
            .seek(
                rate,
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::SeekType::Set,
                gst::ClockTime::from_nseconds(position.as_nanos() as u64),
                gst::SeekType::None,
                gst::ClockTime::NONE,
            )
            .map_err(|err| RialtoError::Transient(format!("seek failed: {err}")))
    }

    fn set_state(&self, state: PipelineState) -> RialtoResult<()> {
        let target = match state {
            PipelineState::Null => gst::State::Null,
            PipelineState::Ready => gst::State::Ready,
            PipelineState::Paused => gst::State::Paused,
            PipelineState::Playing => gst::State::Playing,
        };
        self.pipeline
            .set_state(target)
            .map(|_| ())
            .map_err(|err| RialtoError::Transient(format!("set_state failed: {err}")))
    }

    fn current_state(&self) -> PipelineState {
        let (_, current, _) = self.pipeline.state(gst::ClockTime::ZERO);
        match current {
            gst::State::Null | gst::State::VoidPending => PipelineState::Null,
            gst::State::Ready => PipelineState::Ready,
            gst::State::Paused => PipelineState::Paused,
            gst::State::Playing => PipelineState::Playing,
        }
    }

    fn position(&self) -> Option<Duration> {
        if let Some(position) = self.state.lock().position_override {
            return Some(position);
        }
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(|pos| Duration::from_nanos(pos.nseconds()))
    }

    fn send_instant_rate_change(&self, rate: f64) -> RialtoResult<()> {
        self.pipeline
            .send_event(gst::event::InstantRateChange::new(rate))
            .then_some(())
            .ok_or_else(|| RialtoError::Transient("instant-rate-change event rejected".into()))
    }

    fn send_amlhalasink_rate_change(&self, rate: f64) -> RialtoResult<()> {
        let state = self.state.lock();
        let Some(sink) = &state.audio_sink else {
            return Err(RialtoError::Setup("no audio sink registered".into()));
        };
        let mut segment = gst::FormattedSegment::<gst::ClockTime>::new();
        segment.set_rate(rate);
        sink.send_event(gst::event::Segment::new(&segment))
            .then_some(())
            .ok_or_else(|| RialtoError::Transient("amlhalasink rate-change segment rejected".into()))
    }

    fn audio_sink_is_amlhalasink(&self) -> bool {
        self.state
            .lock()
            .audio_sink
            .as_ref()
            .is_some_and(|sink| sink.factory().is_some_and(|f| f.name().starts_with("amlhalasink")))
    }

    fn video_sink_known(&self) -> bool {
        self.state.lock().video_sink.is_some()
    }

    fn set_video_geometry(&self, rect: Rectangle) -> RialtoResult<()> {
        let state = self.state.lock();
        let Some(sink) = &state.video_sink else {
            return Err(RialtoError::Setup("no video sink registered".into()));
        };
        if sink.has_property("rectangle") {
            let value = format!("{},{},{},{}", rect.x, rect.y, rect.width, rect.height);
            sink.set_property("rectangle", value);
        }
        Ok(())
    }

    fn set_property_if_exists(&self, target: ElementTarget, name: &str, value: PropertyValue) -> bool {
        let state = self.state.lock();
        let element = match target {
            ElementTarget::VideoSink => state.video_sink.as_ref(),
            ElementTarget::AudioSink => state.audio_sink.as_ref(),
            ElementTarget::AudioDecoder | ElementTarget::VideoDecoder => None,
        };
        let Some(element) = element else { return false };
        if !element.has_property(name) {
            return false;
        }
        match value {
            PropertyValue::Bool(v) => element.set_property(name, v),
            PropertyValue::Int(v) => element.set_property(name, v as i32),
            PropertyValue::UInt(v) => element.set_property(name, v as u32),
            PropertyValue::Double(v) => element.set_property(name, v),
            PropertyValue::String(v) => element.set_property(name, v),
        }
        true
    }

    fn set_volume(&self, volume: f64) {
        if let Some(element) = &self.state.lock().volume_element {
            if element.has_property("volume") {
                element.set_property("volume", volume);
            }
        }
    }

    fn volume(&self) -> f64 {
        self.state
            .lock()
            .volume_element
            .as_ref()
            .filter(|e| e.has_property("volume"))
            .map(|e| e.property::<f64>("volume"))
            .unwrap_or(1.0)
    }

    fn set_mute(&self, mute: bool) {
        if let Some(element) = &self.state.lock().volume_element {
            if element.has_property("mute") {
                element.set_property("mute", mute);
            }
        }
    }

    fn mute(&self) -> bool {
        self.state
            .lock()
            .volume_element
            .as_ref()
            .filter(|e| e.has_property("mute"))
            .map(|e| e.property::<bool>("mute"))
            .unwrap_or(false)
    }

    fn render_frame(&self) {
        if let Some(sink) = &self.state.lock().video_sink {
            if sink.has_property("render-now") {
                sink.emit_by_name::<()>("render-now", &[]);
            }
        }
    }

    fn poll_bus(&self, timeout: Duration) -> Option<BusMessage> {
        let _guard = self.poll_lock.lock().unwrap();
        let msg = self.bus.timed_pop_filtered(
            gst::ClockTime::from_nseconds(timeout.as_nanos() as u64),
            &[
                gst::MessageType::StateChanged,
                gst::MessageType::Error,
                gst::MessageType::Eos,
                gst::MessageType::Qos,
                gst::MessageType::Warning,
            ],
        )?;

        match msg.view() {
            gst::MessageView::StateChanged(sc) if msg.src().as_ref() == Some(self.pipeline.upcast_ref()) => {
                let mapped = match sc.current() {
                    gst::State::Null | gst::State::VoidPending => PipelineState::Null,
                    gst::State::Ready => PipelineState::Ready,
                    gst::State::Paused => PipelineState::Paused,
                    gst::State::Playing => PipelineState::Playing,
                };
                Some(BusMessage::StateChanged(mapped))
            }
            gst::MessageView::StateChanged(_) => None,
            gst::MessageView::Error(err) => Some(BusMessage::Error(err.error().to_string())),
            gst::MessageView::Warning(warn) => Some(BusMessage::Warning(warn.error().to_string())),
            gst::MessageView::Eos(_) => Some(BusMessage::Eos),
            gst::MessageView::Qos(qos) => {
                let (_format, processed, dropped) = qos.stats();
                Some(BusMessage::Qos(
                    SourceType::Video,
                    QosInfo { processed, dropped },
                ))
            }
            _ => None,
        }
    }
}

// SAFETY: every mutable field is behind `parking_lot::Mutex`/`StdMutex`; the
// `gst::Pipeline`/`gst::Bus` handles are themselves thread-safe reference
// counted handles per `gstreamer-rs`'s own `Send`/`Sync` impls.
unsafe impl Send for GstPipeline {}
unsafe impl Sync for GstPipeline {}
