use crate::cards::Card;
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type Chips = u64;
pub type SeatIndex = u8;

/// What a table knows about an occupied seat when a hand starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    pub user_id: UserId,
    pub seat: SeatIndex,
    pub stack: Chips,
}

/// A player's state within one poker hand.
///
/// `current_bet` is what the player has put in during the current betting
/// round; `total_committed` is everything they have put in this hand, which
/// is what side pots are layered on. `posted_to_ledger` tracks how much of
/// that commitment has already moved through the ledger (the blinds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokerPlayer {
    pub user_id: UserId,
    pub seat: SeatIndex,
    pub stack: Chips,
    pub current_bet: Chips,
    pub total_committed: Chips,
    pub posted_to_ledger: Chips,
    pub has_folded: bool,
    pub has_acted: bool,
    pub is_all_in: bool,
    pub hole_cards: Vec<Card>,
}

impl PokerPlayer {
    pub fn new(seat: &SeatSnapshot) -> Self {
        Self {
            user_id: seat.user_id,
            seat: seat.seat,
            stack: seat.stack,
            current_bet: 0,
            total_committed: 0,
            posted_to_ledger: 0,
            has_folded: false,
            has_acted: false,
            is_all_in: false,
            hole_cards: Vec::with_capacity(2),
        }
    }

    /// Still contesting the pot.
    pub fn is_active(&self) -> bool {
        !self.has_folded
    }

    /// Still able to make betting decisions.
    pub fn can_act(&self) -> bool {
        !self.has_folded && !self.is_all_in
    }

    /// Moves up to `amount` from the stack into the current bet and returns
    /// what was actually moved. Emptying the stack puts the player all-in.
    pub fn commit(&mut self, amount: Chips) -> Chips {
        let paid = amount.min(self.stack);
        self.stack -= paid;
        self.current_bet += paid;
        self.total_committed += paid;
        if self.stack == 0 {
            self.is_all_in = true;
        }
        paid
    }

    /// Largest total bet this player can reach this round.
    pub fn max_bet(&self) -> Chips {
        self.current_bet + self.stack
    }

    /// Committed chips that have not yet been moved through the ledger.
    pub fn unposted(&self) -> Chips {
        self.total_committed.saturating_sub(self.posted_to_ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(stack: Chips) -> PokerPlayer {
        PokerPlayer::new(&SeatSnapshot {
            user_id: 1,
            seat: 0,
            stack,
        })
    }

    #[test]
    fn commit_caps_at_stack_and_marks_all_in() {
        let mut p = player(30);
        assert_eq!(p.commit(50), 30);
        assert_eq!(p.stack, 0);
        assert_eq!(p.current_bet, 30);
        assert!(p.is_all_in);
        assert!(!p.can_act());
        assert!(p.is_active());
    }

    #[test]
    fn partial_commit_keeps_player_live() {
        let mut p = player(100);
        p.commit(10);
        p.posted_to_ledger = 10;
        p.commit(20);
        assert_eq!(p.total_committed, 30);
        assert_eq!(p.unposted(), 20);
        assert_eq!(p.max_bet(), 100);
        assert!(p.can_act());
    }
}
