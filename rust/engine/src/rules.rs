use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::PokerError;
use crate::player::{Chips, PokerPlayer};

/// A betting decision submitted by a player.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum PokerAction {
    /// Fold and forfeit the hand
    Fold,
    /// Check (only valid if nothing is owed)
    Check,
    /// Match the current bet, all-in if the stack is short
    Call,
    /// Raise the total bet for this round to the given amount
    Raise(Chips),
}

impl PokerAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            PokerAction::Fold => ActionKind::Fold,
            PokerAction::Check => ActionKind::Check,
            PokerAction::Call => ActionKind::Call,
            PokerAction::Raise(_) => ActionKind::Raise,
        }
    }
}

/// Action names without amounts, as offered in turn prompts.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Fold => "fold",
            ActionKind::Check => "check",
            ActionKind::Call => "call",
            ActionKind::Raise => "raise",
        };
        f.write_str(name)
    }
}

/// An action that passed validation, with the chips it moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedAction {
    Fold,
    Check,
    /// Chips paid to call; less than owed when the caller goes all-in.
    Call(Chips),
    Raise { to: Chips, paid: Chips },
}

/// Smallest legal "raise to" amount.
///
/// A raise must at least double the table bet and at least repeat the last
/// full raise; an opening bet must be at least the big blind.
///
/// On a fresh street `current_bet` is 0, so doubling it allows any bet and
/// the big blind floor is the only lower bound.
pub fn min_raise_to(current_bet: Chips, last_raise: Chips, big_blind: Chips) -> Chips {
    (current_bet * 2)
        .max(current_bet + last_raise)
        .max(big_blind)
}

/// Validates a player action according to betting rules and stack size.
///
/// # Errors
///
/// - [`PokerError::ActionNotAvailable`] - check while facing a bet, or call
///   with nothing to call
/// - [`PokerError::RaiseExceedsStack`] - raise beyond the player's chips
/// - [`PokerError::RaiseBelowMinimum`] - raise under the minimum that does
///   not put the player all-in
///
/// # Examples
///
/// ```
/// use cardroom_engine::player::{PokerPlayer, SeatSnapshot};
/// use cardroom_engine::rules::{validate_action, PokerAction, ValidatedAction};
///
/// let player = PokerPlayer::new(&SeatSnapshot { user_id: 7, seat: 0, stack: 60 });
///
/// // Calling 100 with 60 behind is an all-in call
/// let result = validate_action(&player, 100, 200, PokerAction::Call);
/// assert_eq!(result, Ok(ValidatedAction::Call(60)));
/// ```
pub fn validate_action(
    player: &PokerPlayer,
    current_bet: Chips,
    min_raise_to: Chips,
    action: PokerAction,
) -> Result<ValidatedAction, PokerError> {
    let to_call = current_bet.saturating_sub(player.current_bet);
    match action {
        PokerAction::Fold => Ok(ValidatedAction::Fold),
        PokerAction::Check => {
            if to_call == 0 {
                Ok(ValidatedAction::Check)
            } else {
                Err(PokerError::ActionNotAvailable(ActionKind::Check))
            }
        }
        PokerAction::Call => {
            if to_call == 0 {
                Err(PokerError::ActionNotAvailable(ActionKind::Call))
            } else {
                Ok(ValidatedAction::Call(to_call.min(player.stack)))
            }
        }
        PokerAction::Raise(to) => {
            let maximum = player.max_bet();
            if maximum <= current_bet {
                // cannot put in more than a call
                return Err(PokerError::ActionNotAvailable(ActionKind::Raise));
            }
            if to > maximum {
                return Err(PokerError::RaiseExceedsStack {
                    amount: to,
                    maximum,
                });
            }
            let all_in = to == maximum;
            if to <= current_bet || (to < min_raise_to && !all_in) {
                return Err(PokerError::RaiseBelowMinimum {
                    amount: to,
                    minimum: min_raise_to.min(maximum),
                });
            }
            Ok(ValidatedAction::Raise {
                to,
                paid: to - player.current_bet,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::SeatSnapshot;

    fn player(stack: Chips, current_bet: Chips) -> PokerPlayer {
        let mut p = PokerPlayer::new(&SeatSnapshot {
            user_id: 1,
            seat: 0,
            stack,
        });
        p.current_bet = current_bet;
        p
    }

    #[test]
    fn minimum_raise_doubles_the_bet() {
        assert_eq!(min_raise_to(10, 10, 10), 20);
        assert_eq!(min_raise_to(0, 10, 10), 10);
        // a large previous raise sets the bar higher than doubling
        assert_eq!(min_raise_to(60, 50, 10), 120);
        assert_eq!(min_raise_to(100, 70, 10), 200);
    }

    #[test]
    fn check_facing_bet_is_not_available() {
        let err = validate_action(&player(100, 0), 10, 20, PokerAction::Check).unwrap_err();
        assert_eq!(err, PokerError::ActionNotAvailable(ActionKind::Check));
    }

    #[test]
    fn call_without_bet_is_not_available() {
        let err = validate_action(&player(100, 10), 10, 20, PokerAction::Call).unwrap_err();
        assert_eq!(err, PokerError::ActionNotAvailable(ActionKind::Call));
    }

    #[test]
    fn raise_below_minimum_is_rejected() {
        let err = validate_action(&player(100, 0), 10, 20, PokerAction::Raise(15)).unwrap_err();
        assert_eq!(
            err,
            PokerError::RaiseBelowMinimum {
                amount: 15,
                minimum: 20
            }
        );
    }

    #[test]
    fn opening_bet_is_floored_at_the_big_blind() {
        let minimum = min_raise_to(0, 0, 10);
        assert_eq!(minimum, 10);
        let err = validate_action(&player(100, 0), 0, minimum, PokerAction::Raise(5)).unwrap_err();
        assert_eq!(
            err,
            PokerError::RaiseBelowMinimum {
                amount: 5,
                minimum: 10
            }
        );
        assert_eq!(
            validate_action(&player(100, 0), 0, minimum, PokerAction::Raise(10)),
            Ok(ValidatedAction::Raise { to: 10, paid: 10 })
        );
        // short stacks may still open all-in below it
        assert_eq!(
            validate_action(&player(6, 0), 0, minimum, PokerAction::Raise(6)),
            Ok(ValidatedAction::Raise { to: 6, paid: 6 })
        );
    }

    #[test]
    fn raise_beyond_stack_is_rejected() {
        let err = validate_action(&player(100, 10), 10, 20, PokerAction::Raise(200)).unwrap_err();
        assert_eq!(
            err,
            PokerError::RaiseExceedsStack {
                amount: 200,
                maximum: 110
            }
        );
    }

    #[test]
    fn short_all_in_raise_is_accepted() {
        // 15 behind plus 10 already in: raising to 25 is all-in below the minimum of 40
        let va = validate_action(&player(15, 10), 20, 40, PokerAction::Raise(25)).unwrap();
        assert_eq!(va, ValidatedAction::Raise { to: 25, paid: 15 });
    }

    #[test]
    fn raise_without_chips_beyond_call_is_not_available() {
        let err = validate_action(&player(10, 0), 20, 40, PokerAction::Raise(10)).unwrap_err();
        assert_eq!(err, PokerError::ActionNotAvailable(ActionKind::Raise));
    }
}
