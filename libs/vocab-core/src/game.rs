//! Game and word state machines.
//!
//! Transitions are pure functions returning the next state or an
//! `InvalidTransition` error; the session runtime owns the current values.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a game stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    Stopped,
    NoMoreWords,
    ReachedAmount,
    ReachedMinutes,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::NoMoreWords => "no-more-words",
            Self::ReachedAmount => "reached-amount",
            Self::ReachedMinutes => "reached-minutes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GameState {
    #[default]
    Undefined,
    Started,
    Paused,
    Stopped { reason: StopReason },
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Started => write!(f, "started"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped { reason } => write!(f, "stopped ({})", reason.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    Start,
    Pause,
    Resume,
    Stop(StopReason),
}

impl GameAction {
    fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop(_) => "stop",
        }
    }
}

impl GameState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Paused)
    }

    /// State after `action`, or `InvalidTransition`.
    pub fn apply(self, action: GameAction) -> Result<GameState> {
        match (self, action) {
            (Self::Undefined | Self::Stopped { .. }, GameAction::Start) => Ok(Self::Started),
            (Self::Started, GameAction::Pause) => Ok(Self::Paused),
            (Self::Paused, GameAction::Resume) => Ok(Self::Started),
            (Self::Started | Self::Paused, GameAction::Stop(reason)) => {
                Ok(Self::Stopped { reason })
            }
            (state, action) => Err(CoreError::transition(action.name(), state)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WordState {
    #[default]
    Undefined,
    Covered,
    Uncovered,
    Solved,
}

impl fmt::Display for WordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::Covered => "covered",
            Self::Uncovered => "uncovered",
            Self::Solved => "solved",
        };
        write!(f, "word {}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordAction {
    /// Present a new unit.
    Present,
    Cover,
    Uncover,
    Solve,
    /// Drop the current unit.
    Clear,
}

impl WordAction {
    fn name(self) -> &'static str {
        match self {
            Self::Present => "present a word",
            Self::Cover => "cover",
            Self::Uncover => "uncover",
            Self::Solve => "solve",
            Self::Clear => "clear",
        }
    }
}

impl WordState {
    /// State after `action` while the game is in `game`.
    ///
    /// Everything except `Clear` requires a started game.
    pub fn apply(self, action: WordAction, game: GameState) -> Result<WordState> {
        if action == WordAction::Clear {
            return Ok(Self::Undefined);
        }
        if game != GameState::Started {
            return Err(CoreError::transition(action.name(), game));
        }
        match (self, action) {
            (_, WordAction::Present) => Ok(Self::Covered),
            (Self::Uncovered, WordAction::Cover) => Ok(Self::Covered),
            (Self::Covered, WordAction::Uncover) => Ok(Self::Uncovered),
            (Self::Uncovered, WordAction::Solve) => Ok(Self::Solved),
            (state, action) => Err(CoreError::transition(action.name(), state)),
        }
    }
}

/// Pair of states published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange<T> {
    pub previous: T,
    pub current: T,
}

/// When a session ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "goal", rename_all = "kebab-case")]
pub enum SessionGoal {
    #[default]
    Unlimited,
    ByTime { minutes: u32 },
    ByAmount { count: u32 },
}

impl SessionGoal {
    /// Stop reason once the goal is met.
    pub fn reached(self, elapsed: Duration, answered: u32) -> Option<StopReason> {
        match self {
            Self::Unlimited => None,
            Self::ByTime { minutes } => (elapsed >= Duration::from_secs(u64::from(minutes) * 60))
                .then_some(StopReason::ReachedMinutes),
            Self::ByAmount { count } => (answered >= count).then_some(StopReason::ReachedAmount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_lifecycle() {
        let state = GameState::Undefined.apply(GameAction::Start).unwrap();
        assert_eq!(state, GameState::Started);
        let state = state.apply(GameAction::Pause).unwrap();
        assert_eq!(state, GameState::Paused);
        let state = state.apply(GameAction::Resume).unwrap();
        let state = state.apply(GameAction::Stop(StopReason::Stopped)).unwrap();
        assert_eq!(state, GameState::Stopped { reason: StopReason::Stopped });
        assert_eq!(state.apply(GameAction::Start).unwrap(), GameState::Started);
    }

    #[test]
    fn illegal_game_transitions_fail() {
        assert!(GameState::Undefined.apply(GameAction::Pause).is_err());
        assert!(GameState::Paused.apply(GameAction::Pause).is_err());
        assert!(GameState::Started.apply(GameAction::Start).is_err());
        assert!(GameState::Undefined.apply(GameAction::Stop(StopReason::Stopped)).is_err());
        let err = GameState::Started.apply(GameAction::Resume).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn word_flow() {
        let game = GameState::Started;
        let word = WordState::Undefined.apply(WordAction::Present, game).unwrap();
        assert_eq!(word, WordState::Covered);
        let word = word.apply(WordAction::Uncover, game).unwrap();
        let word = word.apply(WordAction::Cover, game).unwrap();
        let word = word.apply(WordAction::Uncover, game).unwrap();
        assert_eq!(word.apply(WordAction::Solve, game).unwrap(), WordState::Solved);
    }

    #[test]
    fn solving_a_covered_word_fails() {
        let err = WordState::Covered
            .apply(WordAction::Solve, GameState::Started)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn word_actions_need_a_started_game() {
        assert!(WordState::Covered.apply(WordAction::Uncover, GameState::Paused).is_err());
        assert_eq!(
            WordState::Covered.apply(WordAction::Clear, GameState::Paused).unwrap(),
            WordState::Undefined
        );
    }

    #[test]
    fn goals() {
        assert_eq!(SessionGoal::Unlimited.reached(Duration::from_secs(9999), 999), None);
        assert_eq!(
            SessionGoal::ByTime { minutes: 1 }.reached(Duration::from_secs(60), 0),
            Some(StopReason::ReachedMinutes)
        );
        assert_eq!(SessionGoal::ByTime { minutes: 1 }.reached(Duration::from_secs(59), 0), None);
        assert_eq!(
            SessionGoal::ByAmount { count: 3 }.reached(Duration::ZERO, 3),
            Some(StopReason::ReachedAmount)
        );
    }

    #[test]
    fn stop_reason_serializes_kebab_case() {
        let json = serde_json::to_value(GameState::Stopped { reason: StopReason::NoMoreWords }).unwrap();
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["reason"], "no-more-words");
    }
}
