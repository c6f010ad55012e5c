//! cpal-backed implementation of [`EngineFacade`].
//!
//! The output stream lives on a dedicated audio thread because `cpal::Stream`
//! cannot leave the thread that built it. The control side talks to the mixer
//! through an rtrb ring, hands it stems wrapped in basedrop `Shared` so the
//! audio thread never frees memory, and reads positions from a lock-free
//! [`PositionBoard`].

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use basedrop::{Collector, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use crate::mixer::{Command, Mixer, PositionBoard};
use crate::{CHANNEL_COUNT, ChannelIndex, EngineError, EngineFacade, NATIVE_GAIN_MAX};

const COMMAND_CAPACITY: usize = 256;

enum StreamControl {
    Play(mpsc::Sender<Result<(), EngineError>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct LoadedStem {
    frames: usize,
}

struct AudioThread {
    control: mpsc::Sender<StreamControl>,
    handle: JoinHandle<()>,
}

/// Playing flags and positions the control side has asked for, reported in
/// place of the board's until the mixer has applied the commands behind them.
#[derive(Debug, Default)]
struct Expected {
    /// Commands pushed so far.
    sent: u64,
    /// Value of `sent` when the overrides were last recorded.
    generation: u64,
    playing: [Option<bool>; CHANNEL_COUNT],
    frames: [Option<f64>; CHANNEL_COUNT],
}

impl Expected {
    fn settled(&self, board: &PositionBoard) -> bool {
        board.applied() >= self.generation
    }

    /// Cover every command sent so far. Overrides of a settled generation
    /// are dropped first.
    fn begin(&mut self, board: &PositionBoard) {
        if self.settled(board) {
            self.playing = [None; CHANNEL_COUNT];
            self.frames = [None; CHANNEL_COUNT];
        }
        self.generation = self.sent;
    }

    fn is_playing(&self, board: &PositionBoard, channel: ChannelIndex) -> bool {
        match self.playing[channel.get()] {
            Some(playing) if !self.settled(board) => playing,
            _ => board.is_playing(channel),
        }
    }

    fn frames(&self, board: &PositionBoard, channel: ChannelIndex) -> f64 {
        match self.frames[channel.get()] {
            Some(frames) if !self.settled(board) => frames,
            _ => board.frames(channel),
        }
    }
}

struct Prepared {
    commands: rtrb::Producer<Command>,
    board: Arc<PositionBoard>,
    expected: Expected,
    collector: Collector,
    sample_rate: u32,
    stems: [Option<LoadedStem>; CHANNEL_COUNT],
    gains: [f32; CHANNEL_COUNT],
    started: bool,
    audio_thread: AudioThread,
}

impl Prepared {
    fn send(&mut self, command: Command) -> Result<(), EngineError> {
        self.commands
            .push(command)
            .map_err(|_| EngineError::QueueFull)?;
        self.expected.sent += 1;
        Ok(())
    }

    /// Send `command` and report `playing` for the channels it reaches until
    /// the mixer catches up.
    fn send_playing(
        &mut self,
        command: Command,
        channel: ChannelIndex,
        playing: bool,
    ) -> Result<(), EngineError> {
        self.send(command)?;
        self.expected.begin(&self.board);
        for reached in self.fan_out(channel) {
            self.expected.playing[reached.get()] = Some(playing);
        }
        Ok(())
    }

    fn loaded(&self, channel: ChannelIndex) -> Result<LoadedStem, EngineError> {
        self.stems[channel.get()].ok_or(EngineError::NoChannelLoaded(channel))
    }

    /// Channels a trigger/stop on `channel` reaches.
    fn fan_out(&self, channel: ChannelIndex) -> Vec<ChannelIndex> {
        if channel.is_reference() {
            ChannelIndex::all()
                .filter(|c| self.stems[c.get()].is_some())
                .collect()
        } else {
            vec![channel]
        }
    }
}

/// Multi-channel stem player on the default output device.
#[derive(Default)]
pub struct NativeEngine {
    prepared: Option<Prepared>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device sample rate, once set up.
    pub fn sample_rate(&self) -> Option<u32> {
        self.prepared.as_ref().map(|p| p.sample_rate)
    }

    fn prepared(&self) -> Result<&Prepared, EngineError> {
        self.prepared.as_ref().ok_or(EngineError::NotSetUp)
    }

    fn prepared_mut(&mut self) -> Result<&mut Prepared, EngineError> {
        self.prepared.as_mut().ok_or(EngineError::NotSetUp)
    }
}

impl EngineFacade for NativeEngine {
    fn setup(&mut self, output_channels: u16) -> Result<(), EngineError> {
        if self.prepared.is_some() {
            log::debug!("engine already set up");
            return Ok(());
        }

        let board = Arc::new(PositionBoard::new());
        let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(COMMAND_CAPACITY);
        let (ready_tx, ready_rx) = mpsc::channel();
        let (control_tx, control_rx) = mpsc::channel();

        let thread_board = board.clone();
        let handle = thread::Builder::new()
            .name("multitrack-audio".to_string())
            .spawn(move || {
                run_audio_thread(output_channels, command_rx, thread_board, ready_tx, control_rx)
            })
            .map_err(|e| EngineError::Device(e.to_string()))?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(EngineError::Device(
                    "audio thread exited during setup".to_string(),
                ));
            }
        };

        log::info!("engine set up: {output_channels} output channels at {sample_rate} Hz");

        self.prepared = Some(Prepared {
            commands: command_tx,
            board,
            expected: Expected::default(),
            collector: Collector::new(),
            sample_rate,
            stems: [None; CHANNEL_COUNT],
            gains: [1.0; CHANNEL_COUNT],
            started: false,
            audio_thread: AudioThread {
                control: control_tx,
                handle,
            },
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        if prepared.started {
            return Err(EngineError::AlreadyStarted);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        prepared
            .audio_thread
            .control
            .send(StreamControl::Play(reply_tx))
            .map_err(|_| EngineError::Stream("audio thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::Stream("audio thread is gone".to_string()))??;

        prepared.started = true;
        log::info!("engine stream started");
        Ok(())
    }

    fn teardown(&mut self) {
        let Some(mut prepared) = self.prepared.take() else {
            return;
        };

        let _ = prepared.audio_thread.control.send(StreamControl::Shutdown);
        if prepared.audio_thread.handle.join().is_err() {
            log::error!("audio thread panicked");
        }
        // the mixer's stems were dropped with the stream; free them here
        prepared.collector.collect();
        log::info!("engine torn down");
    }

    fn load(&mut self, path: &Path, channel: ChannelIndex, pan: f32) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;

        let audio = multitrack_decode::decode_file(path)
            .and_then(|audio| audio.resample(prepared.sample_rate))
            .map_err(|source| EngineError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let frames = audio.frames();
        let pan = pan.clamp(-1.0, 1.0);
        let shared = Shared::new(&prepared.collector.handle(), audio);
        prepared.send(Command::Load {
            channel,
            audio: shared,
            gain: prepared.gains[channel.get()],
            pan,
        })?;

        prepared.stems[channel.get()] = Some(LoadedStem { frames });
        prepared.expected.begin(&prepared.board);
        prepared.expected.playing[channel.get()] = Some(false);
        prepared.expected.frames[channel.get()] = Some(0.0);
        prepared.collector.collect();

        log::info!(
            "loaded {} on channel {channel} ({:.1}s)",
            path.display(),
            frames as f64 / prepared.sample_rate as f64
        );
        Ok(())
    }

    fn unload_all(&mut self) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        prepared.send(Command::UnloadAll)?;
        prepared.stems = [None; CHANNEL_COUNT];
        prepared.expected.begin(&prepared.board);
        prepared.expected.playing = [Some(false); CHANNEL_COUNT];
        prepared.expected.frames = [Some(0.0); CHANNEL_COUNT];
        prepared.collector.collect();
        Ok(())
    }

    fn trigger(&mut self, channel: ChannelIndex) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        if !prepared.started {
            return Err(EngineError::NotStarted);
        }
        prepared.loaded(channel)?;
        prepared.send_playing(Command::Trigger(channel), channel, true)
    }

    fn stop_trigger(&mut self, channel: ChannelIndex) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        prepared.loaded(channel)?;
        prepared.send_playing(Command::Stop(channel), channel, false)
    }

    fn set_gain(&mut self, channel: ChannelIndex, gain: f32) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        let gain = gain.clamp(0.0, NATIVE_GAIN_MAX);
        prepared.gains[channel.get()] = gain;
        prepared.send(Command::SetGain(channel, gain))
    }

    fn set_pan(&mut self, channel: ChannelIndex, pan: f32) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        prepared.send(Command::SetPan(channel, pan.clamp(-1.0, 1.0)))
    }

    fn is_playing(&self, channel: ChannelIndex) -> Result<bool, EngineError> {
        let prepared = self.prepared()?;
        Ok(prepared.expected.is_playing(&prepared.board, channel))
    }

    fn current_position_seconds(&self, channel: ChannelIndex) -> Result<f64, EngineError> {
        let prepared = self.prepared()?;
        let frames = prepared.expected.frames(&prepared.board, channel);
        Ok(frames / prepared.sample_rate as f64)
    }

    fn total_length_seconds(&self, channel: ChannelIndex) -> Result<f64, EngineError> {
        let prepared = self.prepared()?;
        let stem = prepared.loaded(channel)?;
        Ok(stem.frames as f64 / prepared.sample_rate as f64)
    }

    fn seek_all_to(&mut self, seconds: f64) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        prepared.send(Command::SeekAll { seconds })?;

        // a poll before the next callback sees the new position
        prepared.expected.begin(&prepared.board);
        let target = seconds.max(0.0) * prepared.sample_rate as f64;
        for channel in ChannelIndex::all() {
            if let Some(stem) = prepared.stems[channel.get()] {
                let last = stem.frames.saturating_sub(1) as f64;
                prepared.expected.frames[channel.get()] = Some(target.min(last));
            }
        }
        Ok(())
    }

    fn set_tempo_ratio(&mut self, ratio: f32) -> Result<(), EngineError> {
        let prepared = self.prepared_mut()?;
        prepared.send(Command::SetTempo(ratio))?;
        log::info!("tempo set to {ratio:.2}");
        Ok(())
    }

    fn set_pitch_semitones(&mut self, semitones: f32) -> Result<(), EngineError> {
        self.prepared()?;
        log::info!("pitch set to {semitones:+.1} semitones (not rendered by this backend)");
        Ok(())
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn run_audio_thread(
    output_channels: u16,
    command_rx: rtrb::Consumer<Command>,
    board: Arc<PositionBoard>,
    ready: mpsc::Sender<Result<u32, EngineError>>,
    control: mpsc::Receiver<StreamControl>,
) {
    let stream = match open_stream(output_channels, command_rx, board) {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(message) = control.recv() {
        match message {
            StreamControl::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| EngineError::Stream(e.to_string()));
                let _ = reply.send(result);
            }
            StreamControl::Shutdown => break,
        }
    }

    drop(stream);
}

fn open_stream(
    output_channels: u16,
    command_rx: rtrb::Consumer<Command>,
    board: Arc<PositionBoard>,
) -> Result<(cpal::Stream, u32), EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::Device("no output device found".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::Device(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;

    let config = cpal::StreamConfig {
        channels: output_channels.max(1),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let mixer = Mixer::new(sample_rate, board);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, command_rx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, command_rx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, command_rx)?,
        sample_format => {
            return Err(EngineError::Device(format!(
                "unsupported sample format '{sample_format}'"
            )));
        }
    };

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
    mut command_rx: rtrb::Consumer<Command>,
) -> Result<cpal::Stream, EngineError>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;
    let mut scratch = vec![0.0f32; 8192 * output_channels];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                while let Ok(command) = command_rx.pop() {
                    mixer.apply(command);
                }

                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let mixed = &mut scratch[..data.len()];
                mixer.render(mixed, output_channels);

                for (out, sample) in data.iter_mut().zip(mixed.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            |err| log::error!("stream error: {err}"),
            None,
        )
        .map_err(|e| EngineError::Stream(e.to_string()))?;

    Ok(stream)
}
