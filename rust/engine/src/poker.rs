//! Texas Hold'em hand state machine.
//!
//! Every operation takes the current [`PokerHandState`] by reference and
//! returns a new value, so a rejected action can never leave a half-applied
//! state behind. Chip movement inside the hand is tracked here; moving money
//! between wallets is left to the caller, driven by [`StartedHand::blind_posts`]
//! and [`Settlement`].

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::deck::Deck;
use crate::errors::{GameError, PokerError};
use crate::hand::{evaluate, HandStrength};
use crate::history::ActionRecord;
use crate::player::{Chips, PokerPlayer, SeatIndex, SeatSnapshot, UserId};
use crate::rules::{self, validate_action, ActionKind, PokerAction, ValidatedAction};
use crate::RoomId;

/// Betting streets, ending in the terminal showdown.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blinds {
    pub small: Chips,
    pub big: Chips,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokerHandState {
    pub hand_id: String,
    pub room_id: RoomId,
    pub phase: Phase,
    pub dealer_seat: SeatIndex,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub current_actor: Option<UserId>,
    /// Chips swept in from finished betting rounds.
    pub pot: Chips,
    /// Bet level every live player must match this round.
    pub current_bet: Chips,
    /// Size of the last full raise this round.
    pub last_raise: Chips,
    pub community_cards: Vec<Card>,
    pub deck: Deck,
    /// Ordered by seat.
    pub players: Vec<PokerPlayer>,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

/// Where the hand stands after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    AwaitingAction(UserId),
    /// Betting is closed for this street; the next stage should be dealt.
    RoundComplete,
    /// One player left, or the board is complete and betting closed.
    HandComplete,
}

impl PokerHandState {
    pub fn player(&self, user_id: UserId) -> Option<&PokerPlayer> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    fn index_of(&self, user_id: UserId) -> Option<usize> {
        self.players.iter().position(|p| p.user_id == user_id)
    }

    fn dealer_index(&self) -> usize {
        self.players
            .iter()
            .position(|p| p.seat == self.dealer_seat)
            .unwrap_or(0)
    }

    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_active()).count()
    }

    /// `pot + Σ stack + Σ current_bet`, constant for the whole hand.
    pub fn chips_in_play(&self) -> Chips {
        self.pot
            + self
                .players
                .iter()
                .map(|p| p.stack + p.current_bet)
                .sum::<Chips>()
    }

    /// Pot including bets of the round in progress.
    pub fn total_pot(&self) -> Chips {
        self.pot + self.players.iter().map(|p| p.current_bet).sum::<Chips>()
    }

    pub fn min_raise_to(&self) -> Chips {
        rules::min_raise_to(self.current_bet, self.last_raise, self.big_blind)
    }

    /// True when only one player is left, or every remaining player is
    /// all-in or has acted and matched the bet. A single player with chips
    /// left and nothing to call has no decision either.
    pub fn is_round_complete(&self) -> bool {
        if self.active_count() <= 1 {
            return true;
        }
        let live: Vec<&PokerPlayer> = self.players.iter().filter(|p| p.can_act()).collect();
        if live
            .iter()
            .all(|p| p.has_acted && p.current_bet >= self.current_bet)
        {
            return true;
        }
        live.len() == 1 && live[0].current_bet >= self.current_bet
    }

    pub fn progress(&self) -> Progress {
        if self.phase == Phase::Showdown || self.active_count() <= 1 {
            return Progress::HandComplete;
        }
        if self.is_round_complete() {
            return Progress::RoundComplete;
        }
        match self.current_actor {
            Some(user_id) => Progress::AwaitingAction(user_id),
            None => Progress::RoundComplete,
        }
    }

    /// Sweeps round bets into the pot and reopens betting.
    fn collect_bets(&mut self) {
        for p in &mut self.players {
            self.pot += p.current_bet;
            p.current_bet = 0;
            if p.is_active() {
                p.has_acted = false;
            }
        }
        self.current_bet = 0;
        self.last_raise = self.big_blind;
    }

    /// Points `current_actor` at the next player clockwise from `after` who
    /// still owes a decision, or clears it when betting is closed.
    fn refresh_actor(&mut self, after: usize) {
        if self.is_round_complete() {
            self.current_actor = None;
            return;
        }
        let n = self.players.len();
        self.current_actor = (1..=n)
            .map(|k| &self.players[(after + k) % n])
            .find(|p| p.can_act() && (!p.has_acted || p.current_bet < self.current_bet))
            .map(|p| p.user_id);
    }
}

#[derive(Debug, Clone)]
pub struct HandSetup {
    pub hand_id: String,
    pub room_id: RoomId,
    pub blinds: Blinds,
    /// Dealer seat of the previous hand; the button moves one occupied seat on.
    pub previous_dealer: Option<SeatIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlindKind {
    Small,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindPost {
    pub user_id: UserId,
    pub amount: Chips,
    pub kind: BlindKind,
}

#[derive(Debug, Clone)]
pub struct StartedHand {
    pub state: PokerHandState,
    /// Blinds as actually posted; short stacks post less and are all-in.
    pub blind_posts: Vec<BlindPost>,
}

/// Deals a new hand: rotates the button, posts blinds and deals hole cards.
///
/// Seats without chips sit the hand out.
pub fn start_hand(
    setup: HandSetup,
    seats: &[SeatSnapshot],
    mut deck: Deck,
) -> Result<StartedHand, PokerError> {
    let mut players: Vec<PokerPlayer> = seats
        .iter()
        .filter(|s| s.stack > 0)
        .map(PokerPlayer::new)
        .collect();
    if players.len() < 2 {
        return Err(PokerError::NotEnoughPlayers(players.len()));
    }
    players.sort_by_key(|p| p.seat);
    let n = players.len();

    let dealer = match setup.previous_dealer {
        Some(prev) => players.iter().position(|p| p.seat > prev).unwrap_or(0),
        None => 0,
    };
    // heads-up the dealer posts the small blind
    let (sb, bb) = if n == 2 {
        (dealer, (dealer + 1) % n)
    } else {
        ((dealer + 1) % n, (dealer + 2) % n)
    };

    let mut blind_posts = Vec::with_capacity(2);
    for (idx, amount, kind) in [
        (sb, setup.blinds.small, BlindKind::Small),
        (bb, setup.blinds.big, BlindKind::Big),
    ] {
        let p = &mut players[idx];
        let paid = p.commit(amount);
        p.posted_to_ledger += paid;
        if paid > 0 {
            blind_posts.push(BlindPost {
                user_id: p.user_id,
                amount: paid,
                kind,
            });
        }
    }

    for _ in 0..2 {
        for k in 0..n {
            let card = deck.draw().ok_or(GameError::DeckExhausted {
                requested: 1,
                remaining: 0,
            })?;
            players[(sb + k) % n].hole_cards.push(card);
        }
    }

    let mut state = PokerHandState {
        hand_id: setup.hand_id,
        room_id: setup.room_id,
        phase: Phase::Preflop,
        dealer_seat: players[dealer].seat,
        small_blind: setup.blinds.small,
        big_blind: setup.blinds.big,
        current_actor: None,
        pot: 0,
        current_bet: setup.blinds.big,
        last_raise: setup.blinds.big,
        community_cards: Vec::with_capacity(5),
        deck,
        players,
        actions: Vec::new(),
    };
    state.refresh_actor(bb);

    Ok(StartedHand { state, blind_posts })
}

/// Applies one betting decision and returns the resulting state.
pub fn apply_action(
    state: &PokerHandState,
    user_id: UserId,
    action: PokerAction,
) -> Result<PokerHandState, PokerError> {
    let idx = state
        .index_of(user_id)
        .ok_or(PokerError::PlayerNotInGame(user_id))?;
    if state.phase == Phase::Showdown || state.current_actor != Some(user_id) {
        return Err(PokerError::NotYourTurn {
            expected: state.current_actor,
            actual: user_id,
        });
    }

    let validated = validate_action(
        &state.players[idx],
        state.current_bet,
        state.min_raise_to(),
        action,
    )?;

    let mut next = state.clone();
    match validated {
        ValidatedAction::Fold => {
            let p = &mut next.players[idx];
            p.has_folded = true;
            p.has_acted = true;
        }
        ValidatedAction::Check => next.players[idx].has_acted = true,
        ValidatedAction::Call(paid) => {
            let p = &mut next.players[idx];
            p.commit(paid);
            p.has_acted = true;
        }
        ValidatedAction::Raise { to, paid } => {
            let p = &mut next.players[idx];
            p.commit(paid);
            p.has_acted = true;
            let raise = to - next.current_bet;
            if raise >= next.last_raise {
                next.last_raise = raise;
            }
            next.current_bet = to;
            for (j, other) in next.players.iter_mut().enumerate() {
                if j != idx && other.can_act() {
                    other.has_acted = false;
                }
            }
        }
    }

    next.actions.push(ActionRecord {
        user_id,
        phase: state.phase,
        action,
    });
    next.refresh_actor(idx);
    Ok(next)
}

/// Closes the betting round and deals the next street: burn one, then three
/// cards for the flop or one for the turn and river. After the river the hand
/// moves to showdown.
pub fn advance_stage(state: &PokerHandState) -> Result<PokerHandState, PokerError> {
    let mut next = state.clone();
    next.collect_bets();
    match next.phase {
        Phase::Preflop => {
            next.deck.burn()?;
            let flop = next.deck.draw_many(3)?;
            next.community_cards.extend(flop);
            next.phase = Phase::Flop;
        }
        Phase::Flop | Phase::Turn => {
            next.deck.burn()?;
            let card = next.deck.draw_many(1)?;
            next.community_cards.extend(card);
            next.phase = if next.phase == Phase::Flop {
                Phase::Turn
            } else {
                Phase::River
            };
        }
        Phase::River => next.phase = Phase::Showdown,
        Phase::Showdown => {}
    }
    if next.phase == Phase::Showdown {
        next.current_actor = None;
    } else {
        let dealer = next.dealer_index();
        next.refresh_actor(dealer);
    }
    Ok(next)
}

/// Deals every remaining street without further betting.
pub fn run_out(state: &PokerHandState) -> Result<PokerHandState, PokerError> {
    let mut next = state.clone();
    while next.phase != Phase::Showdown {
        next = advance_stage(&next)?;
    }
    Ok(next)
}

/// A layer of the pot and who may win it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotAward {
    pub amount: Chips,
    pub eligible: Vec<UserId>,
    pub winners: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub user_id: UserId,
    pub amount: Chips,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowdownHand {
    pub user_id: UserId,
    pub hole_cards: Vec<Card>,
    pub strength: HandStrength,
}

#[derive(Debug, Clone)]
pub struct Settlement {
    /// Final state: board complete when contested, pot distributed to stacks.
    pub state: PokerHandState,
    pub pots: Vec<PotAward>,
    /// One entry per winning player, in seat order.
    pub payouts: Vec<Payout>,
    /// Committed chips that still have to move from seat to pot.
    pub unposted: Vec<Payout>,
    /// Empty when the hand was won uncontested.
    pub showdown: Vec<ShowdownHand>,
    pub uncontested: bool,
}

impl Settlement {
    pub fn winners(&self) -> Vec<UserId> {
        self.payouts.iter().map(|p| p.user_id).collect()
    }

    /// Stack change over the whole hand for each player, in seat order.
    pub fn net_results(&self) -> Vec<(UserId, i64)> {
        self.state
            .players
            .iter()
            .map(|p| {
                let won = self
                    .payouts
                    .iter()
                    .find(|w| w.user_id == p.user_id)
                    .map_or(0, |w| w.amount);
                (p.user_id, won as i64 - p.total_committed as i64)
            })
            .collect()
    }
}

/// Resolves the hand: runs out the board if needed, evaluates the remaining
/// hands and distributes every layer of the pot.
///
/// Ties split a layer evenly; leftover chips go one each to the tied winners
/// in ascending seat order.
pub fn settle(state: &PokerHandState) -> Result<Settlement, PokerError> {
    let uncontested = state.active_count() <= 1;
    let mut fin = if uncontested {
        state.clone()
    } else {
        run_out(state)?
    };
    fin.collect_bets();
    fin.current_actor = None;

    let unposted: Vec<Payout> = fin
        .players
        .iter()
        .filter(|p| p.unposted() > 0)
        .map(|p| Payout {
            user_id: p.user_id,
            amount: p.unposted(),
        })
        .collect();

    let mut showdown = Vec::new();
    let mut strengths: Vec<Option<HandStrength>> = vec![None; fin.players.len()];
    if !uncontested {
        for (i, p) in fin.players.iter().enumerate().filter(|(_, p)| p.is_active()) {
            let mut cards = p.hole_cards.clone();
            cards.extend_from_slice(&fin.community_cards);
            let strength = evaluate(&cards)?;
            showdown.push(ShowdownHand {
                user_id: p.user_id,
                hole_cards: p.hole_cards.clone(),
                strength: strength.clone(),
            });
            strengths[i] = Some(strength);
        }
    }

    let mut won = vec![0 as Chips; fin.players.len()];
    let mut pots = Vec::new();
    for (amount, eligible) in layer_pots(&fin.players) {
        let best = eligible.iter().filter_map(|&i| strengths[i].as_ref()).max();
        let winners: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|&i| strengths[i].as_ref() == best)
            .collect();
        let share = amount / winners.len() as Chips;
        let leftover = (amount % winners.len() as Chips) as usize;
        for (k, &i) in winners.iter().enumerate() {
            won[i] += share + Chips::from(k < leftover);
        }
        pots.push(PotAward {
            amount,
            eligible: eligible.iter().map(|&i| fin.players[i].user_id).collect(),
            winners: winners.iter().map(|&i| fin.players[i].user_id).collect(),
        });
    }

    let mut payouts = Vec::new();
    for (p, &amount) in fin.players.iter_mut().zip(&won) {
        if amount > 0 {
            p.stack += amount;
            payouts.push(Payout {
                user_id: p.user_id,
                amount,
            });
        }
    }
    fin.pot = 0;
    fin.phase = Phase::Showdown;

    Ok(Settlement {
        state: fin,
        pots,
        payouts,
        unposted,
        showdown,
        uncontested,
    })
}

/// Splits total commitments into a main pot and side pots. Each layer is
/// capped at the next distinct commitment of a player still in the hand; the
/// top layer also absorbs anything folded players put in above it.
fn layer_pots(players: &[PokerPlayer]) -> Vec<(Chips, Vec<usize>)> {
    let active: Vec<usize> = (0..players.len())
        .filter(|&i| players[i].is_active())
        .collect();
    let mut levels: Vec<Chips> = active
        .iter()
        .map(|&i| players[i].total_committed)
        .filter(|&c| c > 0)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    if levels.is_empty() {
        let total = players.iter().map(|p| p.total_committed).sum();
        return vec![(total, active)];
    }

    let mut layers = Vec::with_capacity(levels.len());
    let mut prev: Chips = 0;
    for (k, &level) in levels.iter().enumerate() {
        let cap = if k + 1 == levels.len() {
            Chips::MAX
        } else {
            level
        };
        let amount: Chips = players
            .iter()
            .map(|p| p.total_committed.min(cap) - p.total_committed.min(prev))
            .sum();
        let eligible: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&i| players[i].total_committed >= level)
            .collect();
        if amount > 0 {
            layers.push((amount, eligible));
        }
        prev = level;
    }
    layers
}

/// Payload sent to the player whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPrompt {
    pub user_id: UserId,
    pub available_actions: Vec<ActionKind>,
    pub call_amount: Chips,
    /// Smallest legal raise-to amount, zero when raising is not possible.
    pub min_raise: Chips,
    pub max_raise: Chips,
}

pub fn turn_prompt(state: &PokerHandState) -> Option<TurnPrompt> {
    let Progress::AwaitingAction(user_id) = state.progress() else {
        return None;
    };
    let p = state.player(user_id)?;
    let to_call = state.current_bet.saturating_sub(p.current_bet);

    let mut available_actions = vec![ActionKind::Fold];
    available_actions.push(if to_call == 0 {
        ActionKind::Check
    } else {
        ActionKind::Call
    });
    let (min_raise, max_raise) = if p.max_bet() > state.current_bet {
        available_actions.push(ActionKind::Raise);
        (state.min_raise_to().min(p.max_bet()), p.max_bet())
    } else {
        (0, 0)
    };

    Some(TurnPrompt {
        user_id,
        available_actions,
        call_amount: to_call.min(p.stack),
        min_raise,
        max_raise,
    })
}
