//! Audio-thread side of the native engine.
//!
//! The [`Mixer`] owns every voice and only ever hears about the outside world
//! through [`Command`]s popped from a ring buffer. What it reports back goes
//! through the [`PositionBoard`], which the control thread polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use basedrop::Shared;
use multitrack_decode::StemAudio;

use crate::{CHANNEL_COUNT, ChannelIndex};

/// Duration of the start/stop gain ramp.
const FADE_SECS: f32 = 0.18;

pub(crate) enum Command {
    Load {
        channel: ChannelIndex,
        audio: Shared<StemAudio>,
        gain: f32,
        pan: f32,
    },
    UnloadAll,
    Trigger(ChannelIndex),
    Stop(ChannelIndex),
    SetGain(ChannelIndex, f32),
    SetPan(ChannelIndex, f32),
    SeekAll { seconds: f64 },
    SetTempo(f32),
}

/// Lock-free per-channel position and playing flags.
///
/// `applied` counts the commands whose effect the published values include.
pub(crate) struct PositionBoard {
    frames: [AtomicU64; CHANNEL_COUNT],
    playing: [AtomicBool; CHANNEL_COUNT],
    applied: AtomicU64,
}

impl PositionBoard {
    pub fn new() -> Self {
        Self {
            frames: std::array::from_fn(|_| AtomicU64::new(0f64.to_bits())),
            playing: std::array::from_fn(|_| AtomicBool::new(false)),
            applied: AtomicU64::new(0),
        }
    }

    pub fn frames(&self, channel: ChannelIndex) -> f64 {
        f64::from_bits(self.frames[channel.get()].load(Ordering::Acquire))
    }

    pub fn is_playing(&self, channel: ChannelIndex) -> bool {
        self.playing[channel.get()].load(Ordering::Acquire)
    }

    pub fn publish(&self, channel: ChannelIndex, frames: f64, playing: bool) {
        self.frames[channel.get()].store(frames.to_bits(), Ordering::Release);
        self.playing[channel.get()].store(playing, Ordering::Release);
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }

    /// Stored after the values it covers.
    pub fn publish_applied(&self, applied: u64) {
        self.applied.store(applied, Ordering::Release);
    }
}

struct Voice {
    audio: Shared<StemAudio>,
    /// Fractional frame position.
    position: f64,
    gain: f32,
    pan: f32,
    playing: bool,
    envelope: f32,
}

impl Voice {
    fn audible(&self) -> bool {
        self.playing || self.envelope > 0.0
    }

    fn last_frame(&self) -> f64 {
        self.audio.frames().saturating_sub(1) as f64
    }

    /// Left/right gains for the current pan and gain.
    fn pan_gains(&self) -> (f32, f32) {
        let right = self.pan * 0.5 + 0.5;
        ((1.0 - right) * self.gain, right * self.gain)
    }
}

pub(crate) struct Mixer {
    voices: [Option<Voice>; CHANNEL_COUNT],
    tempo: f32,
    fade_step: f32,
    sample_rate: u32,
    /// Commands applied so far.
    applied: u64,
    board: Arc<PositionBoard>,
}

impl Mixer {
    pub fn new(sample_rate: u32, board: Arc<PositionBoard>) -> Self {
        Self {
            voices: std::array::from_fn(|_| None),
            tempo: 1.0,
            fade_step: 1.0 / (sample_rate as f32 * FADE_SECS).max(1.0),
            sample_rate,
            applied: 0,
            board,
        }
    }

    pub fn apply(&mut self, command: Command) {
        self.applied += 1;
        match command {
            Command::Load {
                channel,
                audio,
                gain,
                pan,
            } => {
                self.voices[channel.get()] = Some(Voice {
                    audio,
                    position: 0.0,
                    gain,
                    pan,
                    playing: false,
                    envelope: 0.0,
                });
            }
            Command::UnloadAll => {
                self.voices = std::array::from_fn(|_| None);
            }
            Command::Trigger(channel) => self.set_playing(channel, true),
            Command::Stop(channel) => self.set_playing(channel, false),
            Command::SetGain(channel, gain) => {
                if let Some(voice) = &mut self.voices[channel.get()] {
                    voice.gain = gain;
                }
            }
            Command::SetPan(channel, pan) => {
                if let Some(voice) = &mut self.voices[channel.get()] {
                    voice.pan = pan;
                }
            }
            Command::SeekAll { seconds } => {
                let target = seconds.max(0.0) * self.sample_rate as f64;
                for voice in self.voices.iter_mut().flatten() {
                    voice.position = target.min(voice.last_frame());
                }
            }
            Command::SetTempo(tempo) => self.tempo = tempo.max(0.0),
        }
    }

    /// The reference channel fans out to every loaded voice.
    fn set_playing(&mut self, channel: ChannelIndex, playing: bool) {
        if channel.is_reference() {
            for voice in self.voices.iter_mut().flatten() {
                voice.playing = playing;
            }
        } else if let Some(voice) = &mut self.voices[channel.get()] {
            voice.playing = playing;
        }
    }

    /// Mix every audible voice into `out` (interleaved) and publish positions.
    pub fn render(&mut self, out: &mut [f32], output_channels: usize) {
        out.fill(0.0);
        let output_channels = output_channels.max(1);

        for voice in self.voices.iter_mut().flatten() {
            if !voice.audible() {
                continue;
            }

            let frames = voice.audio.frames();
            let (left_gain, right_gain) = voice.pan_gains();

            for frame in out.chunks_mut(output_channels) {
                let idx = voice.position as usize;
                if idx >= frames {
                    // end of stem
                    voice.playing = false;
                    voice.envelope = 0.0;
                    voice.position = frames as f64;
                    break;
                }

                if voice.playing {
                    voice.envelope = (voice.envelope + self.fade_step).min(1.0);
                } else {
                    voice.envelope = (voice.envelope - self.fade_step).max(0.0);
                }

                let left = voice.audio.sample(idx, 0) * voice.envelope;
                let right = voice.audio.sample(idx, 1) * voice.envelope;
                if output_channels == 1 {
                    frame[0] += left * left_gain + right * right_gain;
                } else {
                    frame[0] += left * left_gain;
                    frame[1] += right * right_gain;
                }

                voice.position += self.tempo as f64;

                if voice.envelope == 0.0 && !voice.playing {
                    break;
                }
            }
        }

        self.publish();
    }

    fn publish(&self) {
        for channel in ChannelIndex::all() {
            match &self.voices[channel.get()] {
                Some(voice) => self.board.publish(channel, voice.position, voice.playing),
                None => self.board.publish(channel, 0.0, false),
            }
        }
        self.board.publish_applied(self.applied);
    }
}
