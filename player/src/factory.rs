//! The task factory: a stateless builder, one `create_*` method
//! per task kind. Its only reason to exist is to let tests substitute a mock
//! factory and assert on what the `SessionPlayer`/bus dispatcher asked to be
//! built, without coupling those callers to `Task`'s variant list directly.

use std::sync::Arc;
use std::time::Duration;

use rialto_common::media::{MediaSegment, MediaSource, SourceType};

use crate::data_reader::PartitionReader;
use crate::pipeline::{ElementHandle, Rectangle};
use crate::task::{ElementKind, Heartbeat, Task};

#[derive(Clone, Copy)]
pub struct TaskFactory {
    pub underflow_margin: Duration,
}

impl TaskFactory {
    pub fn new(underflow_margin: Duration) -> Self {
        Self { underflow_margin }
    }

    pub fn setup_element(&self, element: ElementHandle, kind: ElementKind, sink_name: Option<String>) -> Task {
        Task::SetupElement { element, kind, sink_name }
    }

    pub fn setup_source(&self, source: ElementHandle) -> Task {
        Task::SetupSource { source }
    }

    pub fn attach_source(&self, source: MediaSource) -> Task {
        Task::AttachSource { source }
    }

    pub fn finish_setup_source(&self) -> Task {
        Task::FinishSetupSource
    }

    pub fn need_data(&self, source: SourceType) -> Task {
        Task::NeedData { source }
    }

    pub fn enough_data(&self, source: SourceType) -> Task {
        Task::EnoughData { source }
    }

    pub fn attach_samples(&self, segments: Vec<MediaSegment>) -> Task {
        Task::AttachSamples { segments }
    }

    pub fn read_shm_data_and_attach_samples(&self, source: SourceType, reader: Arc<dyn PartitionReader>) -> Task {
        Task::ReadShmDataAndAttachSamples { source, reader }
    }

    pub fn set_position(&self, position: Duration) -> Task {
        Task::SetPosition { position }
    }

    pub fn set_source_position(&self, source: SourceType, position: Duration, reset_time: Duration) -> Task {
        Task::SetSourcePosition { source, position, reset_time }
    }

    pub fn flush(&self, source: SourceType, reset_time: Duration) -> Task {
        Task::Flush { source, reset_time }
    }

    pub fn remove_source(&self, source: SourceType) -> Task {
        Task::RemoveSource { source }
    }

    pub fn play(&self) -> Task {
        Task::Play
    }

    pub fn pause(&self) -> Task {
        Task::Pause
    }

    pub fn stop(&self) -> Task {
        Task::Stop
    }

    pub fn set_playback_rate(&self, rate: f64) -> Task {
        Task::SetPlaybackRate { rate }
    }

    pub fn set_video_geometry(&self, rect: Rectangle) -> Task {
        Task::SetVideoGeometry { rect }
    }

    pub fn set_volume(&self, volume: f64) -> Task {
        Task::SetVolume { volume }
    }

    pub fn set_mute(&self, mute: bool) -> Task {
        Task::SetMute { mute }
    }

    pub fn render_frame(&self) -> Task {
        Task::RenderFrame
    }

    pub fn report_position(&self) -> Task {
        Task::ReportPosition
    }

    pub fn check_audio_underflow(&self) -> Task {
        Task::CheckAudioUnderflow { underflow_margin: self.underflow_margin }
    }

    pub fn eos(&self, source: SourceType) -> Task {
        Task::Eos { source }
    }

    pub fn ping(&self, on_complete: impl FnOnce() + Send + 'static) -> Task {
        Task::Ping { heartbeat: Heartbeat::new(on_complete) }
    }

    pub fn shutdown(&self) -> Task {
        Task::Shutdown
    }
}
