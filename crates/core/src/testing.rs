use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use multitrack_engine::{CHANNEL_COUNT, ChannelIndex, EngineError, EngineFacade};

pub(crate) const FAKE_LENGTH: f64 = 180.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Setup(u16),
    Start,
    Teardown,
    Load(PathBuf, ChannelIndex, f32),
    UnloadAll,
    Trigger(ChannelIndex),
    Stop(ChannelIndex),
    SetGain(ChannelIndex, f32),
    SetPan(ChannelIndex, f32),
    SeekAll(f64),
    Tempo(f32),
    Pitch(f32),
}

pub(crate) type CallLog = Arc<Mutex<Vec<Call>>>;

/// Records every mutating call and keeps a settable reference clock.
#[derive(Debug, Default)]
pub(crate) struct FakeEngine {
    log: CallLog,
    pub playing: bool,
    pub position: f64,
    pub fail_setup: bool,
    /// Every `load` fails as if the file did not decode.
    pub load_fails: bool,
    loaded: [bool; CHANNEL_COUNT],
    /// `is_playing` reads, the poller's per-tick footprint.
    pub polls: Cell<usize>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn seeks(&self) -> Vec<f64> {
        seeks(&self.log)
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

pub(crate) fn seeks(log: &CallLog) -> Vec<f64> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Call::SeekAll(t) => Some(*t),
            _ => None,
        })
        .collect()
}

impl EngineFacade for FakeEngine {
    fn setup(&mut self, output_channels: u16) -> Result<(), EngineError> {
        self.record(Call::Setup(output_channels));
        if self.fail_setup {
            return Err(EngineError::Device("no output device".into()));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.record(Call::Start);
        Ok(())
    }

    fn teardown(&mut self) {
        self.record(Call::Teardown);
        self.playing = false;
    }

    fn load(&mut self, path: &Path, channel: ChannelIndex, pan: f32) -> Result<(), EngineError> {
        self.record(Call::Load(path.to_path_buf(), channel, pan));
        if self.load_fails {
            return Err(EngineError::Decode {
                path: path.to_path_buf(),
                source: anyhow::anyhow!("no audio track"),
            });
        }
        self.loaded[channel.get()] = true;
        Ok(())
    }

    fn unload_all(&mut self) -> Result<(), EngineError> {
        self.record(Call::UnloadAll);
        self.loaded = [false; CHANNEL_COUNT];
        self.playing = false;
        Ok(())
    }

    fn trigger(&mut self, channel: ChannelIndex) -> Result<(), EngineError> {
        self.record(Call::Trigger(channel));
        if channel.is_reference() {
            self.playing = true;
        }
        Ok(())
    }

    fn stop_trigger(&mut self, channel: ChannelIndex) -> Result<(), EngineError> {
        self.record(Call::Stop(channel));
        if channel.is_reference() {
            self.playing = false;
        }
        Ok(())
    }

    fn set_gain(&mut self, channel: ChannelIndex, gain: f32) -> Result<(), EngineError> {
        self.record(Call::SetGain(channel, gain));
        Ok(())
    }

    fn set_pan(&mut self, channel: ChannelIndex, pan: f32) -> Result<(), EngineError> {
        self.record(Call::SetPan(channel, pan));
        Ok(())
    }

    fn is_playing(&self, _channel: ChannelIndex) -> Result<bool, EngineError> {
        self.polls.set(self.polls.get() + 1);
        Ok(self.playing)
    }

    fn current_position_seconds(&self, _channel: ChannelIndex) -> Result<f64, EngineError> {
        Ok(self.position)
    }

    fn total_length_seconds(&self, channel: ChannelIndex) -> Result<f64, EngineError> {
        if self.loaded[channel.get()] {
            Ok(FAKE_LENGTH)
        } else {
            Err(EngineError::NoChannelLoaded(channel))
        }
    }

    fn seek_all_to(&mut self, seconds: f64) -> Result<(), EngineError> {
        self.record(Call::SeekAll(seconds));
        self.position = seconds;
        Ok(())
    }

    fn set_tempo_ratio(&mut self, ratio: f32) -> Result<(), EngineError> {
        self.record(Call::Tempo(ratio));
        Ok(())
    }

    fn set_pitch_semitones(&mut self, semitones: f32) -> Result<(), EngineError> {
        self.record(Call::Pitch(semitones));
        Ok(())
    }
}

pub(crate) fn channel(index: usize) -> ChannelIndex {
    ChannelIndex::new(index).unwrap()
}
