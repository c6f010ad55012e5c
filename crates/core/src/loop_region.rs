#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Inactive,
    /// Loop-in marked, waiting for loop-out.
    Pending,
    Active,
}

/// Loop marks in seconds. The marks only exist in the phases that set them.
///
/// No ordering between `loop_in` and `loop_out` is enforced. With
/// `loop_out <= loop_in` every check while active asks for a wrap.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoopRegion {
    #[default]
    Inactive,
    Pending {
        loop_in: f64,
    },
    Active {
        loop_in: f64,
        loop_out: f64,
    },
}

impl LoopRegion {
    pub fn phase(&self) -> LoopPhase {
        match self {
            LoopRegion::Inactive => LoopPhase::Inactive,
            LoopRegion::Pending { .. } => LoopPhase::Pending,
            LoopRegion::Active { .. } => LoopPhase::Active,
        }
    }

    pub fn loop_in(&self) -> Option<f64> {
        match *self {
            LoopRegion::Inactive => None,
            LoopRegion::Pending { loop_in } | LoopRegion::Active { loop_in, .. } => Some(loop_in),
        }
    }

    pub fn loop_out(&self) -> Option<f64> {
        match *self {
            LoopRegion::Active { loop_out, .. } => Some(loop_out),
            _ => None,
        }
    }

    /// Advance `Inactive -> Pending -> Active -> Inactive`, marking `current`
    /// as loop-in or loop-out on the way.
    pub fn toggle(&mut self, current: f64) -> LoopPhase {
        *self = match *self {
            LoopRegion::Inactive => LoopRegion::Pending { loop_in: current },
            LoopRegion::Pending { loop_in } => LoopRegion::Active {
                loop_in,
                loop_out: current,
            },
            LoopRegion::Active { .. } => LoopRegion::Inactive,
        };
        self.phase()
    }

    /// Where playback must jump to, if `current` has reached loop-out.
    pub fn wrap_target(&self, current: f64) -> Option<f64> {
        match *self {
            LoopRegion::Active { loop_in, loop_out } if current >= loop_out => Some(loop_in),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_cycle_closes() {
        let mut region = LoopRegion::default();

        assert_eq!(region.toggle(4.0), LoopPhase::Pending);
        assert_eq!(region.loop_in(), Some(4.0));
        assert_eq!(region.loop_out(), None);

        assert_eq!(region.toggle(9.5), LoopPhase::Active);
        assert_eq!(region, LoopRegion::Active { loop_in: 4.0, loop_out: 9.5 });

        assert_eq!(region.toggle(12.0), LoopPhase::Inactive);
        assert_eq!(region, LoopRegion::Inactive);
        assert_eq!(region.loop_in(), None);
    }

    #[test]
    fn test_wrap_only_when_active() {
        let pending = LoopRegion::Pending { loop_in: 10.0 };
        assert_eq!(pending.wrap_target(100.0), None);
        assert_eq!(LoopRegion::Inactive.wrap_target(100.0), None);
    }

    #[test]
    fn test_wrap_at_and_past_loop_out() {
        let region = LoopRegion::Active { loop_in: 10.0, loop_out: 20.0 };
        assert_eq!(region.wrap_target(19.99), None);
        assert_eq!(region.wrap_target(20.0), Some(10.0));
        assert_eq!(region.wrap_target(20.5), Some(10.0));
    }

    #[test]
    fn test_inverted_marks_always_wrap() {
        let region = LoopRegion::Active { loop_in: 15.0, loop_out: 12.0 };
        assert_eq!(region.wrap_target(15.0), Some(15.0));
        assert_eq!(region.wrap_target(15.05), Some(15.0));
        assert_eq!(region.wrap_target(11.0), None);
    }
}
