pub const DEFAULT_VOLUME: f32 = 1.0;
pub const DEFAULT_PAN: f32 = 0.0;

/// UI-facing state of one stem channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStrip {
    name: String,
    volume: f32,
    pan: f32,
    last_known_playing: bool,
}

impl ChannelStrip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume: DEFAULT_VOLUME,
            pan: DEFAULT_PAN,
            last_known_playing: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `0.0..=1.0`
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// `-1.0..=1.0`
    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Playing flag as of the last engine read. Advisory only.
    pub fn last_known_playing(&self) -> bool {
        self.last_known_playing
    }

    /// Native engine gain for the current volume.
    ///
    /// The UI range sits at the bottom of the native `0.0..=2.0` range and
    /// maps onto it 1:1.
    pub fn gain(&self) -> f32 {
        self.volume
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub(crate) fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
    }

    pub(crate) fn set_last_known_playing(&mut self, playing: bool) {
        self.last_known_playing = playing;
    }
}

/// Clamp into `min..=max`, treating NaN as `fallback`.
pub(crate) fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}
