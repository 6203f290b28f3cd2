//! Error taxonomy for the table runtime.
//!
//! Every failure a table operation can return is a [`TableError`]. Callers
//! decide what to do from its [`ErrorCategory`] and send clients the
//! [`ErrorResponse`] payload.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use cardroom_engine::errors::{BlotError, PokerError};
use cardroom_engine::history::GameKind;
use cardroom_engine::player::Chips;
use cardroom_engine::RoomId;

use crate::ledger::LedgerError;
use crate::participants::ParticipantError;
use crate::settings::SettingsError;
use crate::store::StoreError;

/// Standard error payload sent to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "not_your_turn")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Out of turn, wrong phase, missing hand or room.
    Sequencing,
    /// The move breaks a game rule.
    RuleViolation,
    /// Not enough chips or an unknown wallet.
    Resource,
    /// Storage or ledger failure; the same request may succeed later.
    Infrastructure,
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected during normal play
    Client,
    /// Needs investigation
    Server,
}

/// Turns an error into a client payload with logging.
pub trait IntoErrorResponse {
    fn category(&self) -> ErrorCategory;

    /// Machine-readable error code
    fn error_code(&self) -> &'static str;

    fn error_message(&self) -> String;

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }

    fn severity(&self) -> ErrorSeverity {
        if self.category() == ErrorCategory::Infrastructure {
            ErrorSeverity::Server
        } else {
            ErrorSeverity::Client
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    /// Logs at a level matching the severity and returns the payload.
    fn log_and_respond(&self) -> ErrorResponse {
        let response = self.to_error_response();
        match self.severity() {
            ErrorSeverity::Client => tracing::info!(
                error = %response.error,
                message = %response.message,
                "request rejected"
            ),
            ErrorSeverity::Server => tracing::error!(
                error = %response.error,
                message = %response.message,
                retryable = self.is_retryable(),
                "table operation failed"
            ),
        }
        response
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Poker(#[from] PokerError),
    #[error(transparent)]
    Blot(#[from] BlotError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Participants(#[from] ParticipantError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Room {room_id} does not host {expected:?}")]
    WrongGame { room_id: RoomId, expected: GameKind },
    #[error("Buy-in of {amount} is outside {min}..={max}")]
    BuyInOutOfRange { amount: Chips, min: Chips, max: Chips },
    #[error("A hand is in progress in room {0}")]
    HandInProgress(RoomId),
    #[error("Hand history unavailable: {0}")]
    History(String),
}

impl IntoErrorResponse for TableError {
    fn category(&self) -> ErrorCategory {
        use ErrorCategory::*;
        match self {
            TableError::Poker(e) => match e {
                PokerError::NotYourTurn { .. }
                | PokerError::PlayerNotInGame(_)
                | PokerError::HandNotFound
                | PokerError::HandAlreadyRunning
                | PokerError::NotEnoughPlayers(_) => Sequencing,
                PokerError::ActionNotAvailable(_)
                | PokerError::RaiseBelowMinimum { .. }
                | PokerError::RaiseExceedsStack { .. } => RuleViolation,
                PokerError::Game(_) => Infrastructure,
            },
            TableError::Blot(e) => match e {
                BlotError::GameStateNotFound
                | BlotError::NotYourTurn { .. }
                | BlotError::PlayerNotInGame(_)
                | BlotError::WrongPhase(_)
                | BlotError::NotEnoughPlayers(_) => Sequencing,
                BlotError::CardNotInHand(_)
                | BlotError::MustFollowSuit(_)
                | BlotError::MustPlayTrumpWhenLed(_)
                | BlotError::MissingNewTrumpSuit => RuleViolation,
                BlotError::Game(_) => Infrastructure,
            },
            TableError::Store(_) => Infrastructure,
            TableError::Ledger(e) => match e {
                LedgerError::Unavailable => Infrastructure,
                LedgerError::InsufficientFunds { .. }
                | LedgerError::WalletNotFound(_)
                | LedgerError::WalletExists(_)
                | LedgerError::InvalidAmount => Resource,
            },
            TableError::Participants(e) => match e {
                ParticipantError::RoomNotFound(_) | ParticipantError::NotSeated(_) => Sequencing,
                ParticipantError::RoomExists(_)
                | ParticipantError::SeatTaken(_)
                | ParticipantError::SeatOutOfRange { .. }
                | ParticipantError::RoomFull(_)
                | ParticipantError::AlreadySeated(_) => RuleViolation,
                ParticipantError::StoragePoisoned => Infrastructure,
            },
            TableError::Settings(e) => match e {
                SettingsError::StoragePoisoned => Infrastructure,
                SettingsError::InvalidValue(_) | SettingsError::Parse(_) => RuleViolation,
            },
            TableError::WrongGame { .. } | TableError::HandInProgress(_) => Sequencing,
            TableError::BuyInOutOfRange { .. } => RuleViolation,
            TableError::History(_) => Infrastructure,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            TableError::Poker(e) => match e {
                PokerError::NotYourTurn { .. } => "not_your_turn",
                PokerError::PlayerNotInGame(_) => "player_not_in_game",
                PokerError::ActionNotAvailable(_) => "action_not_available",
                PokerError::RaiseBelowMinimum { .. } => "raise_below_minimum",
                PokerError::RaiseExceedsStack { .. } => "raise_exceeds_stack",
                PokerError::HandNotFound => "hand_not_found",
                PokerError::HandAlreadyRunning => "hand_already_running",
                PokerError::NotEnoughPlayers(_) => "not_enough_players",
                PokerError::Game(_) => "game_error",
            },
            TableError::Blot(e) => match e {
                BlotError::GameStateNotFound => "game_state_not_found",
                BlotError::NotYourTurn { .. } => "not_your_turn",
                BlotError::PlayerNotInGame(_) => "player_not_in_game",
                BlotError::CardNotInHand(_) => "card_not_in_hand",
                BlotError::MustFollowSuit(_) => "must_follow_suit",
                BlotError::MustPlayTrumpWhenLed(_) => "must_play_trump_when_led",
                BlotError::MissingNewTrumpSuit => "missing_new_trump_suit",
                BlotError::WrongPhase(_) => "wrong_phase",
                BlotError::NotEnoughPlayers(_) => "not_enough_players",
                BlotError::Game(_) => "game_error",
            },
            TableError::Store(_) => "state_store_error",
            TableError::Ledger(e) => match e {
                LedgerError::InsufficientFunds { .. } => "insufficient_funds",
                LedgerError::WalletNotFound(_) => "wallet_not_found",
                LedgerError::WalletExists(_) => "wallet_exists",
                LedgerError::InvalidAmount => "invalid_amount",
                LedgerError::Unavailable => "ledger_unavailable",
            },
            TableError::Participants(e) => match e {
                ParticipantError::RoomNotFound(_) => "room_not_found",
                ParticipantError::RoomExists(_) => "room_exists",
                ParticipantError::SeatTaken(_) => "seat_taken",
                ParticipantError::SeatOutOfRange { .. } => "seat_out_of_range",
                ParticipantError::RoomFull(_) => "room_full",
                ParticipantError::AlreadySeated(_) => "already_seated",
                ParticipantError::NotSeated(_) => "not_seated",
                ParticipantError::StoragePoisoned => "participants_unavailable",
            },
            TableError::Settings(_) => "invalid_settings",
            TableError::WrongGame { .. } => "wrong_game",
            TableError::BuyInOutOfRange { .. } => "buy_in_out_of_range",
            TableError::HandInProgress(_) => "hand_in_progress",
            TableError::History(_) => "history_unavailable",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            TableError::Poker(PokerError::RaiseBelowMinimum { amount, minimum }) => Some(
                serde_json::json!({ "amount": amount, "minimum": minimum }),
            ),
            TableError::Poker(PokerError::RaiseExceedsStack { amount, maximum }) => Some(
                serde_json::json!({ "amount": amount, "maximum": maximum }),
            ),
            TableError::Ledger(LedgerError::InsufficientFunds {
                wallet,
                balance,
                requested,
            }) => Some(serde_json::json!({
                "wallet_id": wallet,
                "balance": balance,
                "requested": requested,
            })),
            TableError::BuyInOutOfRange { amount, min, max } => Some(
                serde_json::json!({ "amount": amount, "min": min, "max": max }),
            ),
            _ => None,
        }
    }
}

impl TableError {
    pub fn category(&self) -> ErrorCategory {
        IntoErrorResponse::category(self)
    }

    pub fn is_retryable(&self) -> bool {
        IntoErrorResponse::is_retryable(self)
    }
}
