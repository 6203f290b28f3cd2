use thiserror::Error;

use crate::cards::{Card, Suit};
use crate::player::{Chips, UserId};
use crate::rules::ActionKind;

/// Failures shared by both games. These are internal invariant breaks, never
/// rule violations a player can trigger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Deck exhausted: requested {requested}, remaining {remaining}")]
    DeckExhausted { requested: usize, remaining: usize },
    #[error("Hand evaluation needs 5 to 7 cards, got {0}")]
    InvalidHandSize(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PokerError {
    #[error("It's not player {actual}'s turn (expected {expected:?})")]
    NotYourTurn {
        expected: Option<UserId>,
        actual: UserId,
    },
    #[error("Player {0} is not in this hand")]
    PlayerNotInGame(UserId),
    #[error("Action not available: {0}")]
    ActionNotAvailable(ActionKind),
    #[error("Raise to {amount} is below the minimum of {minimum}")]
    RaiseBelowMinimum { amount: Chips, minimum: Chips },
    #[error("Raise to {amount} exceeds the maximum of {maximum}")]
    RaiseExceedsStack { amount: Chips, maximum: Chips },
    #[error("No hand in progress")]
    HandNotFound,
    #[error("A hand is already in progress")]
    HandAlreadyRunning,
    #[error("Need at least 2 players with chips, found {0}")]
    NotEnoughPlayers(usize),
    #[error(transparent)]
    Game(#[from] GameError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlotError {
    #[error("No Blot hand in progress")]
    GameStateNotFound,
    #[error("It's not player {actual}'s turn (expected {expected:?})")]
    NotYourTurn {
        expected: Option<UserId>,
        actual: UserId,
    },
    #[error("Player {0} is not in this hand")]
    PlayerNotInGame(UserId),
    #[error("Card {0} is not in hand")]
    CardNotInHand(Card),
    #[error("Must follow the led suit {0:?}")]
    MustFollowSuit(Suit),
    #[error("Trump {0:?} was led and must be answered with trump")]
    MustPlayTrumpWhenLed(Suit),
    #[error("Rejecting the proposed trump requires a new trump suit")]
    MissingNewTrumpSuit,
    #[error("Action not allowed while {0}")]
    WrongPhase(&'static str),
    #[error("Blot needs exactly 2 players, found {0}")]
    NotEnoughPlayers(usize),
    #[error(transparent)]
    Game(#[from] GameError),
}
