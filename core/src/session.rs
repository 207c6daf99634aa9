use std::collections::{BTreeSet, VecDeque};

use chrono::prelude::*;
use ndarray::Array2;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, Mark};
use crate::error::{GameError, Result};
use crate::placement;
use crate::types::*;
use crate::{FlagOutcome, GameConfig, OpenOutcome, Signal};

pub const DEFAULT_HINT_MAX: u8 = 3;

/// Valid transitions:
/// - Pending -> Active (first open, mines placed)
/// - Active -> Won
/// - Active -> Lost
///
/// Won and Lost are terminal; a new game is a new session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// No mines exist yet
    Pending,
    /// First cell opened, mines placed, timer running
    Active,
    /// Every safe cell is open
    Won,
    /// A mine was opened
    Lost,
}

impl GamePhase {
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Pending
    }
}

/// Input-device-independent command surface over a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Open(Ix2),
    FlagCycle(Ix2),
    Chord(Ix2),
    Hint,
}

/// Represents one game from the first click to its terminal phase.
#[derive(Clone, Debug)]
pub struct GameSession {
    config: GameConfig,
    grid: Array2<Cell>,
    phase: GamePhase,
    opened_safe: Ax,
    flagged: Ax,
    hints_used: u8,
    hint_max: u8,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    rng: SmallRng,
}

impl GameSession {
    /// Fresh session: all cells closed and unmined, mines arrive lazily on
    /// the first open. The embedding shell provides the seed.
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            grid: Array2::default(config.size.convert()),
            phase: GamePhase::default(),
            opened_safe: 0,
            flagged: 0,
            hints_used: 0,
            hint_max: DEFAULT_HINT_MAX,
            started_at: None,
            ended_at: None,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn with_hint_max(config: GameConfig, seed: u64, hint_max: u8) -> Self {
        Self {
            hint_max,
            ..Self::new(config, seed)
        }
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn cell_at(&self, pos: Ix2) -> Cell {
        self.grid[pos.convert()]
    }

    /// How many mines have not been flagged yet
    pub fn mines_left(&self) -> isize {
        (self.config.mines as isize) - (self.flagged as isize)
    }

    pub fn flagged_count(&self) -> Ax {
        self.flagged
    }

    pub fn hints_left(&self) -> u8 {
        self.hint_max - self.hints_used
    }

    /// Whole seconds since the first open; 0 before the session starts.
    pub fn elapsed_secs(&self) -> u32 {
        match self.started_at {
            Some(started_at) => (self.ended_at.unwrap_or_else(Utc::now) - started_at)
                .num_seconds()
                .max(0) as u32,
            None => 0,
        }
    }

    /// Routes a command to the matching operation and reduces its outcome to
    /// the coarse per-call signal.
    pub fn apply(&mut self, command: Command) -> Result<Signal> {
        Ok(match command {
            Command::Open(pos) => self.open(pos)?.signal(),
            Command::FlagCycle(pos) => {
                self.flag_cycle(pos)?;
                Signal::Continue
            }
            Command::Chord(pos) => self.chord(pos)?.signal(),
            Command::Hint => self.hint()?.signal(),
        })
    }

    /// Opens a closed, unflagged cell. The first open of a session places the
    /// mines (the opened cell is never one) and starts the clock.
    pub fn open(&mut self, pos: Ix2) -> Result<OpenOutcome> {
        let pos = self.validate(pos)?;

        if self.phase.is_terminal() {
            return Ok(OpenOutcome::NoChange);
        }
        let cell = self.grid[pos.convert()];
        if cell.open || cell.mark.is_flagged() {
            return Ok(OpenOutcome::NoChange);
        }

        if self.phase.is_pending() {
            self.start(pos);
        }

        Ok(match self.open_cell(pos) {
            OpenOutcome::Exploded => OpenOutcome::Exploded,
            outcome => outcome | self.check_win(),
        })
    }

    /// Cycles a closed cell's mark: None -> Flagged -> Questioned -> None.
    /// Allowed before the first open, refused once the session ended.
    pub fn flag_cycle(&mut self, pos: Ix2) -> Result<FlagOutcome> {
        let pos = self.validate(pos)?;

        if self.phase.is_terminal() {
            return Ok(FlagOutcome::NoChange);
        }
        let cell = &mut self.grid[pos.convert()];
        if cell.open {
            return Ok(FlagOutcome::NoChange);
        }

        let was_flagged = cell.mark.is_flagged();
        cell.mark = cell.mark.cycled();
        if cell.mark.is_flagged() {
            self.flagged += 1;
        } else if was_flagged {
            self.flagged -= 1;
        }
        Ok(FlagOutcome::MarkChanged)
    }

    /// Opens every unflagged closed neighbor of an open numbered cell whose
    /// flagged-neighbor count matches its number exactly. An ambiguous chord
    /// is refused outright rather than partially executed.
    pub fn chord(&mut self, pos: Ix2) -> Result<OpenOutcome> {
        use OpenOutcome::*;

        let pos = self.validate(pos)?;

        if !matches!(self.phase, GamePhase::Active) {
            return Ok(NoChange);
        }
        let cell = self.grid[pos.convert()];
        if !cell.open || cell.mine || cell.adjacent == 0 {
            return Ok(NoChange);
        }
        if self.count_flagged_neighbors(pos) != cell.adjacent {
            return Ok(NoChange);
        }

        let mut merged = NoChange;
        let neighbors: Vec<Ix2> = self.grid.iter_adjacent(pos).collect();
        for neighbor in neighbors {
            let outcome = self.open_cell(neighbor);
            if outcome == Exploded {
                // neighbors after the mine stay untouched
                return Ok(Exploded);
            }
            merged = merged | outcome;
        }

        Ok(merged | self.check_win())
    }

    /// Opens one random safe cell, preferring question-marked ones. Before
    /// the first click it opens a random coordinate instead, which is safe by
    /// the lazy-placement rule. Refused without consuming a hint when none
    /// are left or no candidate exists.
    pub fn hint(&mut self) -> Result<OpenOutcome> {
        use OpenOutcome::*;

        if self.phase.is_terminal() || self.hints_used >= self.hint_max {
            return Ok(NoChange);
        }

        if self.phase.is_pending() {
            let (w, h) = self.config.size;
            let pos = (self.rng.random_range(0..w), self.rng.random_range(0..h));
            self.hints_used += 1;
            log::debug!("hint used as a random first open at {:?}", pos);
            return self.open(pos);
        }

        let mut questioned = Vec::new();
        let mut unmarked = Vec::new();
        let (w, h) = self.config.size;
        for y in 0..h {
            for x in 0..w {
                let cell = self.grid[(x, y).convert()];
                if cell.open || cell.mine || cell.mark.is_flagged() {
                    continue;
                }
                if cell.mark == Mark::Questioned {
                    questioned.push((x, y));
                } else {
                    unmarked.push((x, y));
                }
            }
        }

        let candidates = if questioned.is_empty() {
            unmarked
        } else {
            questioned
        };
        let Some(&pos) = candidates.choose(&mut self.rng) else {
            return Ok(NoChange);
        };

        self.hints_used += 1;
        log::debug!("hint opened {:?}, {} hints left", pos, self.hints_left());
        self.open(pos)
    }

    fn validate(&self, pos: Ix2) -> Result<Ix2> {
        let (w, h) = self.config.size;
        if pos.0 < w && pos.1 < h {
            Ok(pos)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    /// First-open transition: place mines around the safe cell, record the
    /// start time, Pending -> Active.
    fn start(&mut self, safe: Ix2) {
        placement::place_mines(&mut self.grid, self.config.mines, safe, &mut self.rng);
        let now = Utc::now();
        log::debug!("session started at {}", now);
        self.started_at = Some(now);
        self.phase = GamePhase::Active;
    }

    /// Opens a single cell, flooding from blanks and ending the session on a
    /// mine. Win checking is left to the caller so a chord evaluates it once.
    fn open_cell(&mut self, pos: Ix2) -> OpenOutcome {
        let cell = &mut self.grid[pos.convert()];
        if cell.open || cell.mark.is_flagged() {
            return OpenOutcome::NoChange;
        }
        if cell.mark == Mark::Questioned {
            cell.mark = Mark::None;
        }
        cell.open = true;

        if cell.mine {
            log::debug!("mine hit at {:?}", pos);
            self.end(false);
            self.reveal_mines();
            return OpenOutcome::Exploded;
        }

        let adjacent = cell.adjacent;
        self.opened_safe += 1;
        log::debug!("opened {:?}, adjacent mines: {}", pos, adjacent);

        if adjacent == 0 {
            self.flood_from(pos);
        }
        OpenOutcome::Opened
    }

    /// Breadth-first expansion from a blank cell over its zero region and the
    /// numbered border. Each coordinate is processed at most once; flagged
    /// cells are never opened.
    fn flood_from(&mut self, origin: Ix2) {
        let mut visited = BTreeSet::from([origin]);
        let mut to_visit: VecDeque<Ix2> = self.grid.iter_adjacent(origin).collect();

        while let Some(pos) = to_visit.pop_front() {
            if !visited.insert(pos) {
                continue;
            }

            let cell = &mut self.grid[pos.convert()];
            if cell.open || cell.mark.is_flagged() {
                continue;
            }
            if cell.mark == Mark::Questioned {
                cell.mark = Mark::None;
            }
            cell.open = true;
            let blank = cell.is_blank();
            let adjacent = cell.adjacent;
            self.opened_safe += 1;
            log::trace!("flood opened {:?}, adjacent mines: {}", pos, adjacent);

            if blank {
                let unvisited: Vec<Ix2> = self
                    .grid
                    .iter_adjacent(pos)
                    .filter(|next| !visited.contains(next))
                    .collect();
                to_visit.extend(unvisited);
            }
        }
    }

    /// Ends the session as won once every safe cell is open. Fires at most
    /// once; calls in a terminal phase are no-ops.
    fn check_win(&mut self) -> OpenOutcome {
        if !self.phase.is_terminal() && self.opened_safe >= self.config.safe_cells() {
            self.end(true);
            OpenOutcome::Won
        } else {
            OpenOutcome::NoChange
        }
    }

    fn end(&mut self, won: bool) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = if won { GamePhase::Won } else { GamePhase::Lost };
        let now = Utc::now();
        self.ended_at = Some(now);
        log::debug!("session ended at {}, won: {}", now, won);
    }

    /// Loss reveal: every mine becomes visible, marks stay as they are.
    fn reveal_mines(&mut self) {
        for cell in self.grid.iter_mut() {
            if cell.mine {
                cell.open = true;
            }
        }
    }

    fn count_flagged_neighbors(&self, pos: Ix2) -> u8 {
        self.grid
            .iter_adjacent(pos)
            .filter(|&p| self.grid[p.convert()].mark.is_flagged())
            .count()
            .try_into()
            .unwrap()
    }
}
