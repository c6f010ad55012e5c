/// Tempo ratio change per delta.
pub const TEMPO_STEP: f32 = 0.05;
/// Pitch change per delta, in semitones.
pub const PITCH_STEP: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn sign(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransportState {
    /// Reference channel playing flag as last observed from the engine.
    pub is_playing: bool,
    tempo_steps: i32,
    pitch_steps: i32,
}

impl TransportState {
    /// Starts at 1.0. Not bounded here; the engine clamps what it cannot play.
    pub fn tempo_ratio(&self) -> f32 {
        1.0 + self.tempo_steps as f32 * TEMPO_STEP
    }

    pub fn pitch_semitones(&self) -> f32 {
        self.pitch_steps as f32 * PITCH_STEP
    }

    /// Ratio one step away, without applying it.
    pub(crate) fn next_tempo(&self, direction: Direction) -> (i32, f32) {
        let steps = self.tempo_steps + direction.sign();
        (steps, 1.0 + steps as f32 * TEMPO_STEP)
    }

    pub(crate) fn next_pitch(&self, direction: Direction) -> (i32, f32) {
        let steps = self.pitch_steps + direction.sign();
        (steps, steps as f32 * PITCH_STEP)
    }

    pub(crate) fn commit_tempo(&mut self, steps: i32) {
        self.tempo_steps = steps;
    }

    pub(crate) fn commit_pitch(&mut self, steps: i32) {
        self.pitch_steps = steps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = TransportState::default();
        assert!(!state.is_playing);
        assert_eq!(state.tempo_ratio(), 1.0);
        assert_eq!(state.pitch_semitones(), 0.0);
    }

    #[test]
    fn test_steps_do_not_drift() {
        let mut state = TransportState::default();
        for _ in 0..7 {
            let (steps, _) = state.next_tempo(Direction::Up);
            state.commit_tempo(steps);
        }
        for _ in 0..7 {
            let (steps, _) = state.next_tempo(Direction::Down);
            state.commit_tempo(steps);
        }
        assert_eq!(state.tempo_ratio(), 1.0);
    }

    #[test]
    fn test_deltas_are_unbounded() {
        let mut state = TransportState::default();
        for _ in 0..30 {
            let (steps, _) = state.next_pitch(Direction::Down);
            state.commit_pitch(steps);
        }
        assert_eq!(state.pitch_semitones(), -30.0);

        let (_, ratio) = state.next_tempo(Direction::Up);
        assert!((ratio - 1.05).abs() < 1e-6);
    }
}
