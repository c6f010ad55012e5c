mod channel;
mod config;
mod error;
mod loop_region;
mod player;
mod poll;
mod session;
mod transport;

#[cfg(test)]
mod testing;

pub use channel::{ChannelStrip, DEFAULT_PAN, DEFAULT_VOLUME};
pub use config::Config;
pub use error::{ConfigError, PlayerError};
pub use loop_region::{LoopPhase, LoopRegion};
pub use player::{ChannelSnapshot, Player, PlayerSnapshot};
pub use poll::{DEFAULT_POLL_INTERVAL, PositionPoller};
pub use session::{PositionSnapshot, SeekSession, Session, Tick};
pub use transport::{Direction, PITCH_STEP, TEMPO_STEP, TransportState};
