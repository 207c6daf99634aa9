use std::ops::BitOr;

use serde::{Deserialize, Serialize};

pub use cell::*;
pub use error::*;
pub use score::*;
pub use session::*;
pub use types::*;

mod cell;
mod error;
mod placement;
mod score;
mod session;
mod types;

pub const MIN_WIDTH: Ix = 5;
pub const MAX_WIDTH: Ix = 60;
pub const MIN_HEIGHT: Ix = 5;
pub const MAX_HEIGHT: Ix = 40;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub size: Ix2,
    pub mines: Ax,
}

impl GameConfig {
    /// Builds a config, clamping out-of-range values instead of rejecting
    /// them. At least one safe cell always remains.
    pub fn new((w, h): Ix2, mines: Ax) -> Self {
        let w = w.clamp(MIN_WIDTH, MAX_WIDTH);
        let h = h.clamp(MIN_HEIGHT, MAX_HEIGHT);
        let mines = mines.clamp(1, mult(w, h) - 1);
        Self {
            size: (w, h),
            mines,
        }
    }

    pub const fn easy() -> Self {
        Self {
            size: (9, 9),
            mines: 10,
        }
    }

    pub const fn medium() -> Self {
        Self {
            size: (16, 16),
            mines: 40,
        }
    }

    pub const fn hard() -> Self {
        Self {
            size: (30, 16),
            mines: 99,
        }
    }

    pub const fn total_cells(&self) -> Ax {
        mult(self.size.0, self.size.1)
    }

    pub const fn safe_cells(&self) -> Ax {
        self.total_cells() - self.mines
    }

    /// Persistence key for this board shape, e.g. `"9x9_10"`.
    pub fn board_key(&self) -> String {
        format!("{}x{}_{}", self.size.0, self.size.1, self.mines)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::easy()
    }
}

/// Outcome of a mark-cycling action.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlagOutcome {
    NoChange,
    MarkChanged,
}

impl FlagOutcome {
    /// Whether this outcome could have caused an update to the board
    pub const fn has_update(self) -> bool {
        match self {
            Self::NoChange => false,
            Self::MarkChanged => true,
        }
    }
}

/// Outcome of opening one or more cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    NoChange,
    Opened,
    Exploded,
    Won,
}

impl OpenOutcome {
    /// Whether this outcome could have caused an update to the board
    pub const fn has_update(self) -> bool {
        use OpenOutcome::*;
        match self {
            NoChange => false,
            Opened => true,
            Exploded => true,
            Won => true,
        }
    }

    /// Coarse per-call signal surfaced to the embedding shell.
    pub const fn signal(self) -> Signal {
        use OpenOutcome::*;
        match self {
            Exploded => Signal::Lost,
            Won => Signal::Won,
            NoChange | Opened => Signal::Continue,
        }
    }
}

/// Used to merge outcomes when a chord opens several neighbors
impl BitOr for OpenOutcome {
    type Output = OpenOutcome;

    fn bitor(self, rhs: Self) -> Self::Output {
        use OpenOutcome::*;
        match (self, rhs) {
            // exploding has priority
            (Exploded, _) => Exploded,
            (_, Exploded) => Exploded,
            // then winning
            (Won, _) => Won,
            (_, Won) => Won,
            // then plain opening
            (Opened, _) => Opened,
            (_, Opened) => Opened,
            // and no-change only with both
            (NoChange, NoChange) => NoChange,
        }
    }
}

/// What the caller learns from a command: keep playing, or the session just
/// reached one of its two terminal phases.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Won,
    Lost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_clamps_size_and_mines() {
        let config = GameConfig::new((0, 0), 0);
        assert_eq!(config.size, (5, 5));
        assert_eq!(config.mines, 1);

        let config = GameConfig::new((200, 200), 9999);
        assert_eq!(config.size, (60, 40));
        assert_eq!(config.mines, 60 * 40 - 1);
    }

    #[test]
    fn presets_survive_clamping_unchanged() {
        for preset in [GameConfig::easy(), GameConfig::medium(), GameConfig::hard()] {
            assert_eq!(GameConfig::new(preset.size, preset.mines), preset);
        }
    }

    #[test]
    fn board_key_encodes_the_configuration() {
        assert_eq!(GameConfig::easy().board_key(), "9x9_10");
        assert_eq!(GameConfig::hard().board_key(), "30x16_99");
    }

    #[test]
    fn open_outcome_merge_prefers_the_most_severe() {
        use OpenOutcome::*;
        assert_eq!(Opened | Exploded, Exploded);
        assert_eq!(Won | Opened, Won);
        assert_eq!(NoChange | Opened, Opened);
        assert_eq!(NoChange | NoChange, NoChange);
    }

    #[test]
    fn signals_map_terminal_outcomes() {
        assert_eq!(OpenOutcome::Exploded.signal(), Signal::Lost);
        assert_eq!(OpenOutcome::Won.signal(), Signal::Won);
        assert_eq!(OpenOutcome::Opened.signal(), Signal::Continue);
    }
}
