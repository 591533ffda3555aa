use std::fmt;

/// Playback speed; only the six user-selectable steps exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackRate {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndQuarter,
    OneAndHalf,
    Double,
}

impl PlaybackRate {
    /// Cycle order used by the rate button.
    pub const STEPS: [PlaybackRate; 6] = [
        PlaybackRate::Half,
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndQuarter,
        PlaybackRate::OneAndHalf,
        PlaybackRate::Double,
    ];

    pub fn as_f64(self) -> f64 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndQuarter => 1.25,
            PlaybackRate::OneAndHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }

    /// Next step, wrapping from 2x back to 0.5x.
    pub fn next(self) -> PlaybackRate {
        let idx = Self::STEPS.iter().position(|r| *r == self).unwrap_or(0);
        Self::STEPS[(idx + 1) % Self::STEPS.len()]
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_walks_table_in_order() {
        assert_eq!(PlaybackRate::Normal.next(), PlaybackRate::OneAndQuarter);
        assert_eq!(PlaybackRate::OneAndQuarter.next(), PlaybackRate::OneAndHalf);
        assert_eq!(PlaybackRate::Double.next(), PlaybackRate::Half);
    }

    #[test]
    fn six_steps_return_to_start() {
        let mut rate = PlaybackRate::Normal;
        for _ in 0..6 {
            rate = rate.next();
        }
        assert_eq!(rate, PlaybackRate::Normal);
    }

    #[test]
    fn display_matches_button_label() {
        assert_eq!(PlaybackRate::OneAndHalf.to_string(), "1.5x");
        assert_eq!(PlaybackRate::Normal.to_string(), "1x");
        assert_eq!(PlaybackRate::Half.to_string(), "0.5x");
    }
}
