use std::path::PathBuf;

use multitrack_assets::StemSet;
use multitrack_engine::{CHANNEL_COUNT, ChannelIndex, EngineError, EngineFacade};

use crate::channel::{ChannelStrip, clamp_or};
use crate::loop_region::{LoopPhase, LoopRegion};
use crate::transport::{Direction, TransportState};

const REFERENCE: ChannelIndex = ChannelIndex::REFERENCE;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeekSession {
    pub is_dragging: bool,
    pub pending_time: f64,
}

/// Reference channel position as last published by a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionSnapshot {
    pub current_time_seconds: f64,
    pub total_length_seconds: f64,
}

/// What a single poll tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Reference channel not playing; nothing read or published.
    Idle,
    Position(f64),
    /// Position read while a seek drag holds the displayed time.
    Suppressed(f64),
    Wrapped { at: f64, to: f64 },
}

/// Turns transport intents into engine calls and reconciles the engine's
/// polled clock with UI-observable state.
pub struct Session<E> {
    engine: E,
    channels: [ChannelStrip; CHANNEL_COUNT],
    transport: TransportState,
    loop_region: LoopRegion,
    seek: SeekSession,
    position: PositionSnapshot,
    loaded: bool,
}

impl<E: EngineFacade> Session<E> {
    pub fn new(engine: E, stems: &StemSet) -> Self {
        let channels = std::array::from_fn(|i| match ChannelIndex::new(i) {
            Ok(index) => ChannelStrip::new(stems.get(index).name.clone()),
            Err(_) => ChannelStrip::new(format!("channel {i}")),
        });
        Self {
            engine,
            channels,
            transport: TransportState::default(),
            loop_region: LoopRegion::default(),
            seek: SeekSession::default(),
            position: PositionSnapshot::default(),
            loaded: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn channel(&self, index: ChannelIndex) -> &ChannelStrip {
        &self.channels[index.get()]
    }

    pub fn channels(&self) -> &[ChannelStrip] {
        &self.channels
    }

    pub fn transport(&self) -> &TransportState {
        &self.transport
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn seek_session(&self) -> SeekSession {
        self.seek
    }

    pub fn is_dragging(&self) -> bool {
        self.seek.is_dragging
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Drag position while a seek gesture is in progress, otherwise the last
    /// published engine position.
    pub fn current_time_seconds(&self) -> f64 {
        if self.seek.is_dragging {
            self.seek.pending_time
        } else {
            self.position.current_time_seconds
        }
    }

    pub fn total_length_seconds(&self) -> f64 {
        self.position.total_length_seconds
    }

    /// Load local stem files into the engine at their fixed channel indices,
    /// replacing anything loaded before.
    pub fn load_stems(&mut self, paths: &[(ChannelIndex, PathBuf)]) -> Result<(), EngineError> {
        if self.loaded {
            self.unload()?;
        }

        for (index, path) in paths {
            let strip = &self.channels[index.get()];
            self.engine.load(path, *index, strip.pan())?;
            self.engine.set_gain(*index, strip.gain())?;
            log::info!("Loaded {} on channel {}", path.display(), index);
        }
        self.loaded = true;

        self.position.total_length_seconds = match self.engine.total_length_seconds(REFERENCE) {
            Ok(total) => total,
            Err(EngineError::NoChannelLoaded(_)) => 0.0,
            Err(e) => return Err(e),
        };
        self.position.current_time_seconds = 0.0;
        let playing = self.engine.is_playing(REFERENCE)?;
        self.observe_playing(playing);
        Ok(())
    }

    pub fn unload(&mut self) -> Result<(), EngineError> {
        self.engine.unload_all()?;
        self.loaded = false;
        self.position = PositionSnapshot::default();
        self.loop_region = LoopRegion::Inactive;
        self.seek = SeekSession::default();
        self.observe_playing(false);
        Ok(())
    }

    /// Toggle the ensemble via the reference channel.
    ///
    /// The playing flag is read from the engine on every call, so a stem
    /// that stopped on its own is started again rather than "stopped".
    pub fn play_pause(&mut self) -> Result<(), EngineError> {
        let playing = self.engine.is_playing(REFERENCE)?;
        if playing {
            self.engine.stop_trigger(REFERENCE)?;
        } else {
            self.engine.trigger(REFERENCE)?;
        }
        self.observe_playing(!playing);
        Ok(())
    }

    /// Out-of-range values are clamped into `0.0..=1.0`.
    pub fn set_channel_volume(&mut self, index: ChannelIndex, value: f32) -> Result<(), EngineError> {
        let volume = clamp_or(value, 0.0, 1.0, 0.0);
        let strip = &mut self.channels[index.get()];
        strip.set_volume(volume);
        let gain = strip.gain();
        self.engine.set_gain(index, gain)
    }

    pub fn channel_volume(&self, index: ChannelIndex) -> f32 {
        self.channels[index.get()].volume()
    }

    /// Out-of-range values are clamped into `-1.0..=1.0`.
    pub fn set_channel_pan(&mut self, index: ChannelIndex, pan: f32) -> Result<(), EngineError> {
        let pan = clamp_or(pan, -1.0, 1.0, 0.0);
        self.channels[index.get()].set_pan(pan);
        self.engine.set_pan(index, pan)
    }

    pub fn tempo_delta(&mut self, direction: Direction) -> Result<(), EngineError> {
        let (steps, ratio) = self.transport.next_tempo(direction);
        self.engine.set_tempo_ratio(ratio)?;
        self.transport.commit_tempo(steps);
        log::info!("Tempo ratio {ratio:.2}");
        Ok(())
    }

    pub fn pitch_delta(&mut self, direction: Direction) -> Result<(), EngineError> {
        let (steps, semitones) = self.transport.next_pitch(direction);
        self.engine.set_pitch_semitones(semitones)?;
        self.transport.commit_pitch(steps);
        log::info!("Pitch {semitones:+.0} semitones");
        Ok(())
    }

    pub fn on_seek_start(&mut self) {
        self.seek = SeekSession {
            is_dragging: true,
            pending_time: self.position.current_time_seconds,
        };
    }

    /// While dragging only the pending time moves; otherwise the seek is
    /// committed straight away.
    pub fn seek(&mut self, time: f64) -> Result<(), EngineError> {
        if self.seek.is_dragging {
            self.seek.pending_time = time;
            Ok(())
        } else {
            self.commit_seek(time)
        }
    }

    /// Ends the drag and commits the pending time before returning, so the
    /// next tick already reads the new position. No-op without a drag.
    pub fn on_seek_end(&mut self) -> Result<(), EngineError> {
        if !self.seek.is_dragging {
            return Ok(());
        }
        let time = self.seek.pending_time;
        self.seek.is_dragging = false;
        self.commit_seek(time)
    }

    pub fn rewind(&mut self) -> Result<(), EngineError> {
        self.seek = SeekSession::default();
        self.commit_seek(0.0)
    }

    /// Advance the loop phase, marking the reference channel's current time.
    pub fn toggle_loop(&mut self) -> LoopPhase {
        let now = self
            .engine
            .current_position_seconds(REFERENCE)
            .unwrap_or(self.position.current_time_seconds);
        let phase = self.loop_region.toggle(now);
        log::info!("Loop {:?} at {:.2}s", phase, now);
        phase
    }

    /// One poll of the engine clock.
    ///
    /// Reads the reference position only while it plays, publishes it unless
    /// a drag is in progress, then issues at most one wrap seek.
    pub fn tick(&mut self) -> Result<Tick, EngineError> {
        let playing = self.engine.is_playing(REFERENCE)?;
        self.observe_playing(playing);
        if !playing {
            return Ok(Tick::Idle);
        }

        let current = self.engine.current_position_seconds(REFERENCE)?;
        if let Some(target) = self.loop_region.wrap_target(current) {
            if !self.seek.is_dragging {
                self.position.current_time_seconds = current;
            }
            self.engine.seek_all_to(target)?;
            log::debug!("Loop wrap {current:.3}s -> {target:.3}s");
            return Ok(Tick::Wrapped {
                at: current,
                to: target,
            });
        }

        if self.seek.is_dragging {
            Ok(Tick::Suppressed(current))
        } else {
            self.position.current_time_seconds = current;
            Ok(Tick::Position(current))
        }
    }

    pub fn teardown(&mut self) {
        self.engine.teardown();
        self.loaded = false;
        self.observe_playing(false);
    }

    /// Clamped to the song when its length is known.
    fn commit_seek(&mut self, time: f64) -> Result<(), EngineError> {
        let total = self.position.total_length_seconds;
        let time = if total > 0.0 {
            time.clamp(0.0, total)
        } else {
            time.max(0.0)
        };
        self.engine.seek_all_to(time)?;
        self.position.current_time_seconds = time;
        Ok(())
    }

    fn observe_playing(&mut self, playing: bool) {
        self.transport.is_playing = playing;
        self.channels[REFERENCE.get()].set_last_known_playing(playing);
    }
}
