//! The task catalogue. Each variant is an immutable record of its
//! inputs; `execute()` is the one method every task exposes, mutating the
//! context and driving the `Pipeline` as needed. Collapsed into a single enum
//! rather than ~35 task structs implementing a common trait, since Rust's
//! enum variants make that split free — the factory in `factory.rs` is kept
//! anyway so the worker stays testable by construction.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use rialto_common::media::{MediaSegment, MediaSource, SourceType};

use crate::client::{NetworkState, PlaybackState, PlayerClient, QosInfo};
use crate::context::{PendingPosition, PlayerContext};
use crate::data_reader::PartitionReader;
use crate::pipeline::{Buffer, ElementHandle, ElementTarget, PipelineState, PropertyValue, Rectangle};

/// Classification `SetupElement` needs in order to wire up callbacks — in the
/// real pipeline this is derived from the element's GStreamer factory name;
/// the bus dispatcher/element-added handler classifies before constructing
/// the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Decoder(SourceType),
    Sink(SourceType),
    AutoVideoSink,
    Other,
}

/// Runs once when a `Heartbeat`'s last reference is dropped, signalling
/// completion back to the `Playback Service` supervisor.
pub struct Heartbeat {
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl Heartbeat {
    pub fn new(on_complete: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_complete: Some(Box::new(on_complete)),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }
}

/// Lets a task schedule follow-up work without owning the worker.
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

pub enum Task {
    SetupElement {
        element: ElementHandle,
        kind: ElementKind,
        sink_name: Option<String>,
    },
    SetupSource {
        source: ElementHandle,
    },
    DeepElementAdded {
        element: ElementHandle,
        name: String,
    },
    UpdatePlaybackGroup {
        typefind: ElementHandle,
        decodebin: ElementHandle,
    },
    AttachSource {
        source: MediaSource,
    },
    FinishSetupSource,
    NeedData {
        source: SourceType,
    },
    EnoughData {
        source: SourceType,
    },
    AttachSamples {
        segments: Vec<MediaSegment>,
    },
    ReadShmDataAndAttachSamples {
        source: SourceType,
        reader: Arc<dyn PartitionReader>,
    },
    SetPosition {
        position: Duration,
    },
    SetSourcePosition {
        source: SourceType,
        position: Duration,
        reset_time: Duration,
    },
    Flush {
        source: SourceType,
        reset_time: Duration,
    },
    RemoveSource {
        source: SourceType,
    },
    Play,
    Pause,
    Stop,
    SetPlaybackRate {
        rate: f64,
    },
    SetVideoGeometry {
        rect: Rectangle,
    },
    SetImmediateOutput {
        enabled: bool,
    },
    SetLowLatency {
        enabled: bool,
    },
    SetSync {
        enabled: bool,
    },
    SetSyncOff,
    SetStreamSyncMode {
        mode: i32,
    },
    SetVolume {
        volume: f64,
    },
    SetMute {
        mute: bool,
    },
    RenderFrame,
    ReportPosition,
    CheckAudioUnderflow {
        underflow_margin: Duration,
    },
    Underflow {
        source: SourceType,
    },
    Eos {
        source: SourceType,
    },
    /// Bus-originated: the pipeline itself reached EOS.
    HandleBusEos,
    HandleBusStateChanged {
        state: PipelineState,
    },
    HandleBusError {
        message: String,
    },
    HandleBusQos {
        source: SourceType,
        qos: QosInfo,
    },
    HandleBusWarning {
        message: String,
    },
    Ping {
        heartbeat: Heartbeat,
    },
    Shutdown,
}

impl Task {
    pub fn execute(
        self,
        ctx: &mut PlayerContext,
        scheduler: &dyn TaskScheduler,
        client: &dyn PlayerClient,
    ) {
        match self {
            Task::SetupElement { element, kind, sink_name } => {
                setup_element(ctx, element, kind, sink_name.as_deref());
            }
            Task::SetupSource { source } => {
                ctx.source = Some(source);
                if ctx.were_all_sources_attached {
                    scheduler.schedule(Task::FinishSetupSource);
                }
            }
            Task::DeepElementAdded { element, name } => {
                deep_element_added(ctx, element, &name);
            }
            Task::UpdatePlaybackGroup { typefind, decodebin } => {
                ctx.playback_group.typefind = Some(typefind);
                ctx.playback_group.decodebin = Some(decodebin);
            }
            Task::AttachSource { source } => {
                attach_source(ctx, client, source);
            }
            Task::FinishSetupSource => {
                finish_setup_source(ctx, client);
            }
            Task::NeedData { source } => {
                need_data(ctx, client, source);
            }
            Task::EnoughData { source } => {
                ctx.set_need_data(source, false);
            }
            Task::AttachSamples { segments } => {
                attach_samples(ctx, client, segments);
            }
            Task::ReadShmDataAndAttachSamples { source, reader } => {
                match reader.read(source) {
                    Ok(segments) => attach_samples(ctx, client, segments),
                    Err(_) => {
                        client.notify_playback_state(PlaybackState::Failure);
                    }
                }
            }
            Task::SetPosition { position } => {
                set_position(ctx, scheduler, client, position);
            }
            Task::SetSourcePosition { source, position, reset_time } => {
                if let Some(info) = ctx.stream_info.get(&source) {
                    ctx.initial_positions
                        .entry(info.app_src)
                        .or_default()
                        .push_back(PendingPosition { position, reset_time });
                }
            }
            Task::Flush { source, reset_time } => {
                flush(ctx, scheduler, client, source, reset_time);
            }
            Task::RemoveSource { source } => {
                remove_source(ctx, client, source);
            }
            Task::Play => {
                if let Some(pipeline) = &ctx.pipeline {
                    if pipeline.set_state(PipelineState::Playing).is_ok() {
                        ctx.is_playing = true;
                    }
                }
            }
            Task::Pause => {
                if let Some(pipeline) = &ctx.pipeline {
                    let _ = pipeline.set_state(PipelineState::Paused);
                }
            }
            Task::Stop => {
                if let Some(pipeline) = &ctx.pipeline {
                    let _ = pipeline.set_state(PipelineState::Null);
                }
                ctx.is_playing = false;
                ctx.audio_need_data = false;
                ctx.video_need_data = false;
            }
            Task::SetPlaybackRate { rate } => {
                set_playback_rate(ctx, rate);
            }
            Task::SetVideoGeometry { rect } => {
                if let Some(pipeline) = &ctx.pipeline {
                    if pipeline.video_sink_known() {
                        let _ = pipeline.set_video_geometry(rect);
                    } else {
                        ctx.pending_geometry = Some(rect);
                    }
                } else {
                    ctx.pending_geometry = Some(rect);
                }
            }
            Task::SetImmediateOutput { enabled } => {
                try_set_property(ctx, ElementTarget::VideoSink, "immediate-output", PropertyValue::Bool(enabled));
            }
            Task::SetLowLatency { enabled } => {
                try_set_property(ctx, ElementTarget::AudioDecoder, "low-latency", PropertyValue::Bool(enabled));
            }
            Task::SetSync { enabled } => {
                try_set_property(ctx, ElementTarget::AudioSink, "sync", PropertyValue::Bool(enabled));
            }
            Task::SetSyncOff => {
                try_set_property(ctx, ElementTarget::AudioSink, "sync", PropertyValue::Bool(false));
            }
            Task::SetStreamSyncMode { mode } => {
                try_set_property(ctx, ElementTarget::AudioSink, "stream-sync-mode", PropertyValue::Int(i64::from(mode)));
            }
            Task::SetVolume { volume } => {
                if let Some(pipeline) = &ctx.pipeline {
                    pipeline.set_volume(volume);
                }
            }
            Task::SetMute { mute } => {
                if let Some(pipeline) = &ctx.pipeline {
                    pipeline.set_mute(mute);
                }
            }
            Task::RenderFrame => {
                if let Some(pipeline) = &ctx.pipeline {
                    pipeline.render_frame();
                }
            }
            Task::ReportPosition => {
                if let Some(pipeline) = &ctx.pipeline {
                    if let Some(position) = pipeline.position() {
                        client.notify_position(position.as_nanos() as u64);
                    }
                }
            }
            Task::CheckAudioUnderflow { underflow_margin } => {
                check_audio_underflow(ctx, scheduler, client, underflow_margin);
            }
            Task::Underflow { source } => {
                underflow(ctx, scheduler, client, source);
            }
            Task::Eos { source } => {
                eos(ctx, source);
            }
            Task::HandleBusEos => {
                handle_bus_eos(ctx, client);
            }
            Task::HandleBusStateChanged { state } => {
                handle_bus_state_changed(client, state);
            }
            Task::HandleBusError { message } => {
                error!("fatal framework error: {message}");
                client.notify_playback_state(PlaybackState::Failure);
                client.notify_network_state(NetworkState::DecodeError);
                scheduler.schedule(Task::Stop);
                scheduler.schedule(Task::Shutdown);
            }
            Task::HandleBusQos { source, qos } => {
                client.notify_qos(source, qos);
            }
            Task::HandleBusWarning { message } => {
                warn!("framework warning: {message}");
            }
            Task::Ping { heartbeat } => {
                drop(heartbeat);
            }
            Task::Shutdown => {}
        }
    }
}

fn setup_element(ctx: &mut PlayerContext, element: ElementHandle, kind: ElementKind, sink_name: Option<&str>) {
    if let ElementKind::Sink(SourceType::Video) = kind {
        ctx.playback_group.audio_sink.get_or_insert(element);
        if let Some(rect) = ctx.pending_geometry.take() {
            if let Some(pipeline) = &ctx.pipeline {
                let _ = pipeline.set_video_geometry(rect);
            }
        }
    }
    if let ElementKind::Sink(SourceType::Audio) = kind {
        ctx.playback_group.audio_sink = Some(element);
    }
    if let ElementKind::Decoder(_) = kind {
        // buffer-underflow-callback registration happens at the Pipeline
        // level when the element is created; nothing to record here beyond
        // classification, which the caller already did.
    }
    if let Some(name) = sink_name {
        for prefix in ["amlhalasink", "brcmaudiosink", "westerossink"] {
            if name.starts_with(prefix) {
                // Vendor-sink-specific properties are applied by the
                // concrete Pipeline at element-creation time; the task only
                // needs to have routed the element here.
                break;
            }
        }
    }
}

fn deep_element_added(ctx: &mut PlayerContext, element: ElementHandle, name: &str) {
    if name.contains("typefind") {
        ctx.playback_group.typefind = Some(element);
    } else if name.contains("parse") {
        ctx.playback_group.parse = Some(element);
    } else if name.contains("dec") {
        ctx.playback_group.decoder = Some(element);
    } else if name.contains("sink") {
        ctx.playback_group.audio_sink = Some(element);
    }
}

fn attach_source(ctx: &mut PlayerContext, client: &dyn PlayerClient, source: MediaSource) {
    let source_type = source.source_type();
    let pipeline = match &ctx.pipeline {
        Some(p) => p.clone(),
        None => return,
    };

    let is_hot_swap = source_type == SourceType::Audio && ctx.audio_source_removed;

    let app_src = if is_hot_swap {
        let existing = ctx.stream_info.get(&SourceType::Audio).map(|info| info.app_src);
        match existing {
            Some(handle) if pipeline.caps_match(handle, &source) => handle,
            Some(handle) => {
                let _ = pipeline.switch_app_src_caps(handle, &source);
                handle
            }
            None => match pipeline.create_app_src(&source) {
                Ok(handle) => handle,
                Err(_) => return,
            },
        }
    } else {
        match pipeline.create_app_src(&source) {
            Ok(handle) => handle,
            Err(_) => return,
        }
    };

    ctx.stream_info.insert(
        source_type,
        crate::context::StreamInfo {
            app_src,
            has_drm: source.has_drm,
        },
    );

    if is_hot_swap {
        if let Some(position) = pipeline.position() {
            ctx.last_audio_sample_timestamp = position;
        }
        ctx.audio_source_removed = false;
        ctx.audio_need_data = true;
        client.notify_need_media_data(SourceType::Audio);
    }
}

fn finish_setup_source(ctx: &mut PlayerContext, client: &dyn PlayerClient) {
    if ctx.setup_source_finished {
        return;
    }
    ctx.setup_source_finished = true;
    client.notify_playback_state(PlaybackState::Idle);
}

fn need_data(ctx: &mut PlayerContext, client: &dyn PlayerClient, source: SourceType) {
    if ctx.need_data_pending(source) {
        return;
    }
    let accepted = client.notify_need_media_data(source);
    ctx.set_need_data(source, true);
    ctx.set_need_data_pending(source, accepted);
}

fn attach_samples(ctx: &mut PlayerContext, client: &dyn PlayerClient, segments: Vec<MediaSegment>) {
    let pipeline = match &ctx.pipeline {
        Some(p) => p.clone(),
        None => return,
    };

    for segment in segments {
        let source_type = segment.source_type;
        let app_src = ctx.stream_info.get(&source_type).map(|info| info.app_src);
        let Some(app_src) = app_src else { continue };

        let payload = match &segment.encryption {
            Some(descriptor) => match ctx.decryption_service.decrypt(&segment.data, descriptor) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            },
            None => segment.data.clone(),
        };

        if let Some(pending) = ctx
            .initial_positions
            .get_mut(&app_src)
            .and_then(VecDeque::pop_front)
        {
            let _ = pipeline.send_segment(app_src, pending.position);
        }

        let mut buffered_segment = segment;
        buffered_segment.data = payload;
        ctx.buffers_mut(source_type)
            .push_back(Buffer { segment: buffered_segment });
        ctx.set_need_data_pending(source_type, false);
    }

    drain_and_push(ctx, SourceType::Audio);
    drain_and_push(ctx, SourceType::Video);
}

fn drain_and_push(ctx: &mut PlayerContext, source: SourceType) {
    let Some(pipeline) = ctx.pipeline.clone() else { return };
    let app_src = match ctx.stream_info.get(&source) {
        Some(info) => info.app_src,
        None => return,
    };
    while let Some(buffer) = ctx.buffers_mut(source).pop_front() {
        if pipeline.push_buffer(app_src, buffer).is_err() {
            break;
        }
    }
}

fn set_position(
    ctx: &mut PlayerContext,
    scheduler: &dyn TaskScheduler,
    client: &dyn PlayerClient,
    position: Duration,
) {
    client.notify_playback_state(PlaybackState::Seeking);

    ctx.audio_need_data = false;
    ctx.video_need_data = false;
    ctx.audio_need_data_pending = false;
    ctx.video_need_data_pending = false;
    ctx.drain_buffers(SourceType::Audio);
    ctx.drain_buffers(SourceType::Video);
    client.clear_active_requests_cache();
    ctx.last_audio_sample_timestamp = position;

    let Some(pipeline) = ctx.pipeline.clone() else {
        client.notify_playback_state(PlaybackState::Failure);
        return;
    };

    match pipeline.seek(position, ctx.playback_rate) {
        Ok(()) => {
            client.notify_playback_state(PlaybackState::SeekDone);
            let sources: Vec<_> = ctx.stream_info.keys().copied().collect();
            for source in sources {
                scheduler.schedule(Task::NeedData { source });
            }
        }
        Err(_) => {
            client.notify_playback_state(PlaybackState::Failure);
        }
    }
}

fn flush(
    ctx: &mut PlayerContext,
    scheduler: &dyn TaskScheduler,
    client: &dyn PlayerClient,
    source: SourceType,
    reset_time: Duration,
) {
    ctx.set_need_data(source, false);
    ctx.set_need_data_pending(source, false);
    ctx.drain_buffers(source);
    client.invalidate_active_requests(source);

    if let Some(info) = ctx.stream_info.get(&source).copied() {
        if let Some(pipeline) = ctx.pipeline.clone() {
            let _ = pipeline.send_flush_start(info.app_src);
            let _ = pipeline.send_flush_stop(info.app_src, reset_time);
        }
    }

    client.notify_source_flushed(source);
    scheduler.schedule(Task::NeedData { source });
}

fn remove_source(ctx: &mut PlayerContext, client: &dyn PlayerClient, source: SourceType) {
    if source != SourceType::Audio {
        // Video/subtitle source removal is unimplemented; fail the caller
        // rather than silently leaving stale buffers behind.
        client.notify_playback_state(PlaybackState::Failure);
        return;
    }
    ctx.set_need_data(SourceType::Audio, false);
    ctx.set_need_data_pending(SourceType::Audio, false);
    ctx.drain_buffers(SourceType::Audio);
    client.invalidate_active_requests(SourceType::Audio);
    ctx.audio_source_removed = true;
}

fn set_playback_rate(ctx: &mut PlayerContext, rate: f64) {
    let Some(pipeline) = ctx.pipeline.clone() else {
        ctx.pending_playback_rate = Some(rate);
        return;
    };

    if pipeline.current_state() != PipelineState::Playing {
        ctx.pending_playback_rate = Some(rate);
        return;
    }

    ctx.playback_rate = rate;
    let result = if pipeline.audio_sink_is_amlhalasink() {
        pipeline.send_amlhalasink_rate_change(rate)
    } else {
        pipeline.send_instant_rate_change(rate)
    };
    let _ = result;
}

fn try_set_property(ctx: &PlayerContext, target: ElementTarget, name: &str, value: PropertyValue) {
    if let Some(pipeline) = &ctx.pipeline {
        let _ = pipeline.set_property_if_exists(target, name, value);
    }
}

fn check_audio_underflow(
    ctx: &mut PlayerContext,
    scheduler: &dyn TaskScheduler,
    client: &dyn PlayerClient,
    underflow_margin: Duration,
) {
    let Some(pipeline) = ctx.pipeline.clone() else { return };
    if pipeline.current_state() != PipelineState::Playing {
        return;
    }
    let Some(position) = pipeline.position() else { return };
    if position > ctx.last_audio_sample_timestamp + underflow_margin {
        scheduler.schedule(Task::Underflow { source: SourceType::Audio });
    }
    let _ = client;
}

fn underflow(ctx: &mut PlayerContext, scheduler: &dyn TaskScheduler, client: &dyn PlayerClient, source: SourceType) {
    let already = match source {
        SourceType::Audio => ctx.audio_underflow_occurred,
        SourceType::Video | SourceType::Subtitle => ctx.video_underflow_occurred,
    };
    if already {
        return;
    }
    match source {
        SourceType::Audio => ctx.audio_underflow_occurred = true,
        SourceType::Video | SourceType::Subtitle => ctx.video_underflow_occurred = true,
    }
    scheduler.schedule(Task::Pause);
    client.notify_network_state(NetworkState::Stalled);
    client.notify_buffer_underflow(source);
}

fn eos(ctx: &mut PlayerContext, source: SourceType) {
    let Some(info) = ctx.stream_info.get(&source).copied() else { return };
    if let Some(pipeline) = &ctx.pipeline {
        if pipeline.send_eos(info.app_src).is_ok() {
            ctx.end_of_stream_info.insert(source);
        }
    }
}

fn handle_bus_eos(ctx: &mut PlayerContext, client: &dyn PlayerClient) {
    if ctx.eos_notified {
        return;
    }
    let all_attached_reached_eos = ctx
        .stream_info
        .keys()
        .all(|source| ctx.end_of_stream_info.contains(source));
    if all_attached_reached_eos && !ctx.stream_info.is_empty() {
        client.notify_playback_state(PlaybackState::EndOfStream);
        ctx.eos_notified = true;
    }
}

fn handle_bus_state_changed(client: &dyn PlayerClient, state: PipelineState) {
    let mapped = match state {
        PipelineState::Null | PipelineState::Ready => PlaybackState::Stopped,
        PipelineState::Paused => PlaybackState::Paused,
        PipelineState::Playing => PlaybackState::Playing,
    };
    client.notify_playback_state(mapped);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::client::fake::{ClientEvent, FakeClient};
    use crate::decryption::fake::NoopDecryptionService;
    use crate::pipeline::fake::FakePipeline;
    use std::sync::Mutex as StdMutex;

    struct RecordingScheduler {
        scheduled: StdMutex<Vec<&'static str>>,
    }

    impl RecordingScheduler {
        fn new() -> Self {
            Self { scheduled: StdMutex::new(Vec::new()) }
        }
    }

    impl TaskScheduler for RecordingScheduler {
        fn schedule(&self, task: Task) {
            let label = match task {
                Task::NeedData { .. } => "need_data",
                Task::Pause => "pause",
                Task::Stop => "stop",
                Task::Shutdown => "shutdown",
                Task::FinishSetupSource => "finish_setup_source",
                _ => "other",
            };
            self.scheduled.lock().unwrap().push(label);
        }
    }

    fn new_ctx() -> PlayerContext {
        let mut ctx = PlayerContext::new(Arc::new(NoopDecryptionService));
        ctx.pipeline = Some(Arc::new(FakePipeline::new()));
        ctx
    }

    #[test]
    fn need_data_is_idempotent_while_pending() {
        let mut ctx = new_ctx();
        let client = FakeClient::new();

        need_data(&mut ctx, &client, SourceType::Audio);
        need_data(&mut ctx, &client, SourceType::Audio);

        let events = client.events();
        let need_data_events = events
            .iter()
            .filter(|e| matches!(e, ClientEvent::NeedMediaData(SourceType::Audio)))
            .count();
        assert_eq!(need_data_events, 1);
    }

    #[test]
    fn seek_clears_queues_and_requests_need_data_per_source() {
        let mut ctx = new_ctx();
        let client = FakeClient::new();
        let scheduler = RecordingScheduler::new();

        ctx.stream_info.insert(
            SourceType::Audio,
            crate::context::StreamInfo { app_src: ElementHandle(1), has_drm: false },
        );
        ctx.audio_buffers.push_back(Buffer {
            segment: MediaSegment {
                source_id: 1,
                source_type: SourceType::Audio,
                timestamp: Duration::ZERO,
                duration: Duration::ZERO,
                data: vec![],
                codec_data: None,
                encryption: None,
                extra: rialto_common::media::SegmentExtra::None,
            },
        });

        set_position(&mut ctx, &scheduler, &client, Duration::from_secs(3));

        assert!(ctx.audio_buffers.is_empty());
        assert_eq!(ctx.last_audio_sample_timestamp, Duration::from_secs(3));
        assert_eq!(scheduler.scheduled.lock().unwrap().as_slice(), ["need_data"]);
        assert!(client
            .events()
            .contains(&ClientEvent::PlaybackState(PlaybackState::SeekDone)));
    }

    #[test]
    fn eos_notifies_exactly_once_when_all_sources_reach_it() {
        let mut ctx = new_ctx();
        let client = FakeClient::new();
        ctx.stream_info.insert(
            SourceType::Audio,
            crate::context::StreamInfo { app_src: ElementHandle(1), has_drm: false },
        );
        ctx.stream_info.insert(
            SourceType::Video,
            crate::context::StreamInfo { app_src: ElementHandle(2), has_drm: false },
        );

        eos(&mut ctx, SourceType::Audio);
        handle_bus_eos(&mut ctx, &client);
        assert!(!ctx.eos_notified);

        eos(&mut ctx, SourceType::Video);
        handle_bus_eos(&mut ctx, &client);
        assert!(ctx.eos_notified);

        let eos_count = client
            .events()
            .iter()
            .filter(|e| matches!(e, ClientEvent::PlaybackState(PlaybackState::EndOfStream)))
            .count();
        assert_eq!(eos_count, 1);
    }

    #[test]
    fn underflow_is_idempotent() {
        let mut ctx = new_ctx();
        let client = FakeClient::new();
        let scheduler = RecordingScheduler::new();

        underflow(&mut ctx, &scheduler, &client, SourceType::Audio);
        underflow(&mut ctx, &scheduler, &client, SourceType::Audio);

        assert!(ctx.audio_underflow_occurred);
        assert_eq!(scheduler.scheduled.lock().unwrap().as_slice(), ["pause"]);
    }
}
