mod channel;
mod error;
mod facade;
mod mixer;
mod native;

pub use channel::{CHANNEL_COUNT, ChannelIndex};
pub use error::EngineError;
pub use facade::EngineFacade;
pub use native::NativeEngine;

/// Upper bound of the engine's native gain range.
pub const NATIVE_GAIN_MAX: f32 = 2.0;

const GAIN_FACTOR: f32 = 100.0;

/// Map an integer gain position (0..=200) to a native gain value (0.0..=2.0).
pub fn gain_pos_to_gain_val(pos: u16) -> f32 {
    pos as f32 / GAIN_FACTOR
}
