//! `PlayerContext`: a passive record of per-session runtime state. The only
//! thing allowed to mutate it is a `Task::execute()` running on the
//! session's worker thread — enforced here by never handing out a
//! `&mut PlayerContext` to anything but `Task::execute`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rialto_common::media::SourceType;

use crate::decryption::DecryptionService;
use crate::pipeline::{Buffer, ElementHandle, Pipeline, Rectangle};

#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub app_src: ElementHandle,
    pub has_drm: bool,
}

/// One entry of the `initialPositions` FIFO: the position/reset
/// time a `SetSourcePosition` task wants carried as a segment event on the
/// next buffer pushed for that appsrc.
#[derive(Debug, Clone, Copy)]
pub struct PendingPosition {
    pub position: Duration,
    pub reset_time: Duration,
}

/// Opportunistically-collected element pointers for per-element tweaks,
/// populated as `DeepElementAdded`/`UpdatePlaybackGroup` tasks discover them.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackGroup {
    pub typefind: Option<ElementHandle>,
    pub decodebin: Option<ElementHandle>,
    pub parse: Option<ElementHandle>,
    pub decoder: Option<ElementHandle>,
    pub audio_sink: Option<ElementHandle>,
}

pub struct PlayerContext {
    pub pipeline: Option<Arc<dyn Pipeline>>,
    pub source: Option<ElementHandle>,
    pub stream_info: HashMap<SourceType, StreamInfo>,

    pub audio_buffers: VecDeque<Buffer>,
    pub video_buffers: VecDeque<Buffer>,

    pub audio_need_data: bool,
    pub video_need_data: bool,
    pub audio_need_data_pending: bool,
    pub video_need_data_pending: bool,

    pub end_of_stream_info: HashSet<SourceType>,
    pub eos_notified: bool,

    pub audio_underflow_occurred: bool,
    pub video_underflow_occurred: bool,

    pub is_playing: bool,
    pub playback_rate: f64,
    pub pending_playback_rate: Option<f64>,

    pub pending_geometry: Option<Rectangle>,

    pub last_audio_sample_timestamp: Duration,
    pub initial_positions: HashMap<ElementHandle, VecDeque<PendingPosition>>,

    pub audio_source_removed: bool,
    pub were_all_sources_attached: bool,
    pub setup_source_finished: bool,

    pub playback_group: PlaybackGroup,

    pub decryption_service: Arc<dyn DecryptionService>,
}

impl PlayerContext {
    pub fn new(decryption_service: Arc<dyn DecryptionService>) -> Self {
        Self {
            pipeline: None,
            source: None,
            stream_info: HashMap::new(),
            audio_buffers: VecDeque::new(),
            video_buffers: VecDeque::new(),
            audio_need_data: false,
            video_need_data: false,
            audio_need_data_pending: false,
            video_need_data_pending: false,
            end_of_stream_info: HashSet::new(),
            eos_notified: false,
            audio_underflow_occurred: false,
            video_underflow_occurred: false,
            is_playing: false,
            playback_rate: 1.0,
            pending_playback_rate: None,
            pending_geometry: None,
            last_audio_sample_timestamp: Duration::ZERO,
            initial_positions: HashMap::new(),
            audio_source_removed: false,
            were_all_sources_attached: false,
            setup_source_finished: false,
            playback_group: PlaybackGroup::default(),
            decryption_service,
        }
    }

    pub fn buffers_mut(&mut self, source: SourceType) -> &mut VecDeque<Buffer> {
        match source {
            SourceType::Audio => &mut self.audio_buffers,
            SourceType::Video | SourceType::Subtitle => &mut self.video_buffers,
        }
    }

    pub fn need_data(&self, source: SourceType) -> bool {
        match source {
            SourceType::Audio => self.audio_need_data,
            SourceType::Video | SourceType::Subtitle => self.video_need_data,
        }
    }

    pub fn set_need_data(&mut self, source: SourceType, value: bool) {
        match source {
            SourceType::Audio => self.audio_need_data = value,
            SourceType::Video | SourceType::Subtitle => self.video_need_data = value,
        }
    }

    pub fn need_data_pending(&self, source: SourceType) -> bool {
        match source {
            SourceType::Audio => self.audio_need_data_pending,
            SourceType::Video | SourceType::Subtitle => self.video_need_data_pending,
        }
    }

    pub fn set_need_data_pending(&mut self, source: SourceType, value: bool) {
        match source {
            SourceType::Audio => self.audio_need_data_pending = value,
            SourceType::Video | SourceType::Subtitle => self.video_need_data_pending = value,
        }
    }

    /// Drop and unref every buffer queued for `source` (flush/stop/seek path).
    pub fn drain_buffers(&mut self, source: SourceType) {
        let pipeline = self.pipeline.clone();
        let queue = self.buffers_mut(source);
        let drained: Vec<_> = queue.drain(..).collect();
        if let Some(pipeline) = pipeline {
            for buffer in drained {
                pipeline.unref_buffer(buffer);
            }
        }
    }
}
