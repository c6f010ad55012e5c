use std::path::Path;

use crate::{ChannelIndex, EngineError};

/// Synchronous, index-addressed interface to a multi-channel playback engine.
///
/// Mutating calls take `&mut self`; queries take `&self`. Every call is cheap
/// from the caller's side: real-time work happens on the engine's own thread.
///
/// Triggering, stopping and seeking the reference channel keeps every loaded
/// channel phase-aligned. Callers never trigger channels one by one once the
/// ensemble is running.
pub trait EngineFacade {
    /// Prepare the output stream for `output_channels` device channels.
    fn setup(&mut self, output_channels: u16) -> Result<(), EngineError>;

    /// Start the output stream. Requires a successful `setup`.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stop the stream and release every engine resource.
    ///
    /// Safe to call at any point, including after a failed `setup` and more
    /// than once.
    fn teardown(&mut self);

    fn load(&mut self, path: &Path, channel: ChannelIndex, pan: f32) -> Result<(), EngineError>;

    /// Stop and drop every loaded stem.
    fn unload_all(&mut self) -> Result<(), EngineError>;

    fn trigger(&mut self, channel: ChannelIndex) -> Result<(), EngineError>;

    fn stop_trigger(&mut self, channel: ChannelIndex) -> Result<(), EngineError>;

    /// Native gain, `0.0..=2.0`.
    fn set_gain(&mut self, channel: ChannelIndex, gain: f32) -> Result<(), EngineError>;

    /// Stereo position, `-1.0` (hard left) to `1.0` (hard right).
    fn set_pan(&mut self, channel: ChannelIndex, pan: f32) -> Result<(), EngineError>;

    fn is_playing(&self, channel: ChannelIndex) -> Result<bool, EngineError>;

    fn current_position_seconds(&self, channel: ChannelIndex) -> Result<f64, EngineError>;

    fn total_length_seconds(&self, channel: ChannelIndex) -> Result<f64, EngineError>;

    /// Move every channel to `seconds`.
    fn seek_all_to(&mut self, seconds: f64) -> Result<(), EngineError>;

    fn set_tempo_ratio(&mut self, ratio: f32) -> Result<(), EngineError>;

    fn set_pitch_semitones(&mut self, semitones: f32) -> Result<(), EngineError>;
}
