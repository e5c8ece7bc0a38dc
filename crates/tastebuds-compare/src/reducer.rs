//! King-of-the-hill reduction state machine.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing to compare.
    Empty,
    /// A single candidate won without any comparison.
    Decided,
    /// Two candidates are on display.
    Active,
    /// A winner emerged after at least one comparison.
    Terminal,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn index(&self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }
}

/// Keyboard binding for the selection channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
}

impl Key {
    /// Parse a DOM-style key name. Unbound keys yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ArrowLeft" => Some(Self::ArrowLeft),
            "ArrowRight" => Some(Self::ArrowRight),
            _ => None,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Self::ArrowLeft => Side::Left,
            Self::ArrowRight => Side::Right,
        }
    }
}

/// Reduction of a frozen pool to one winner.
///
/// The leader always carries forward against the next unseen challenger, so
/// the result depends on the shuffle order when preferences are not
/// transitive.
#[derive(Debug)]
pub struct Reduction<T> {
    state: SessionState,
    active: Vec<T>,
    queue: VecDeque<T>,
    total: usize,
    comparisons: usize,
}

impl<T> Reduction<T> {
    /// Shuffle `pool` with the thread RNG and start the reduction.
    pub fn initialize(pool: Vec<T>) -> Self {
        Self::initialize_with(pool, &mut rand::thread_rng())
    }

    /// Shuffle `pool` with `rng` (uniform Fisher–Yates) and start the reduction.
    pub fn initialize_with<R: Rng + ?Sized>(mut pool: Vec<T>, rng: &mut R) -> Self {
        pool.shuffle(rng);
        Self::in_order(pool)
    }

    /// Start the reduction over `pool` exactly as given.
    pub fn in_order(pool: Vec<T>) -> Self {
        let total = pool.len();
        let mut queue: VecDeque<T> = pool.into();
        let (state, active) = match total {
            0 => (SessionState::Empty, Vec::new()),
            1 => (SessionState::Decided, queue.drain(..).collect()),
            _ => (SessionState::Active, queue.drain(..2).collect()),
        };
        Self {
            state,
            active,
            queue,
            total,
            comparisons: 0,
        }
    }

    /// Keep the item on `side`, eliminate the other, bring in the next one.
    ///
    /// Ignored unless the reduction is `Active`. Returns the resulting state.
    pub fn select(&mut self, side: Side) -> SessionState {
        if self.state != SessionState::Active {
            return self.state;
        }

        let eliminated = 1 - side.index();
        self.comparisons += 1;
        match self.queue.pop_front() {
            Some(next) => {
                self.active[eliminated] = next;
            }
            None => {
                self.active.remove(eliminated);
                self.state = SessionState::Terminal;
            }
        }
        self.state
    }

    /// Keyboard channel; identical to `select` for bound keys.
    pub fn handle_key(&mut self, key: Key) -> SessionState {
        self.select(key.side())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Items on display: two while active, the winner once finished.
    pub fn active(&self) -> &[T] {
        &self.active
    }

    pub fn active_at(&self, side: Side) -> Option<&T> {
        if self.state == SessionState::Active {
            self.active.get(side.index())
        } else {
            None
        }
    }

    pub fn winner(&self) -> Option<&T> {
        match self.state {
            SessionState::Decided | SessionState::Terminal => self.active.first(),
            _ => None,
        }
    }

    /// Choices still needed before a winner is known.
    pub fn remaining(&self) -> usize {
        if self.state.is_finished() {
            0
        } else {
            self.active.len() + self.queue.len() - 1
        }
    }

    /// Choices accepted so far.
    pub fn comparisons(&self) -> usize {
        self.comparisons
    }

    /// Size of the pool the reduction started with.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Items that can still win.
    pub fn contenders(&self) -> impl Iterator<Item = &T> {
        self.active.iter().chain(self.queue.iter())
    }
}
