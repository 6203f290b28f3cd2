//! Two-player Blot: trump negotiation, trick play and hand scoring.
//!
//! Like the poker engine, every transition borrows the current
//! [`BlotHandState`] and returns a fresh one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Rank, Suit};
use crate::deck::Deck;
use crate::errors::{BlotError, GameError};
use crate::player::UserId;
use crate::RoomId;

pub const INITIAL_HAND_SIZE: usize = 6;
pub const FULL_HAND_SIZE: usize = 8;
pub const LAST_TRICK_BONUS: u32 = 10;
pub const CAPOT_POINTS: u32 = 3;
pub const CHOOSER_WIN_POINTS: u32 = 1;
pub const DEFENDER_WIN_POINTS: u32 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlotPhase {
    AwaitingTrumpDecision,
    PlayingTricks,
    HandComplete,
}

impl BlotPhase {
    fn describe(self) -> &'static str {
        match self {
            BlotPhase::AwaitingTrumpDecision => "awaiting trump decision",
            BlotPhase::PlayingTricks => "playing tricks",
            BlotPhase::HandComplete => "hand complete",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrickPlay {
    pub player_id: UserId,
    pub card: Card,
}

/// The dealer's answer to the turned-up card.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "suit", rename_all = "snake_case")]
pub enum TrumpDecision {
    Accept,
    Reject(Option<Suit>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlotHandState {
    pub hand_id: String,
    pub room_id: RoomId,
    /// Seat order.
    pub players: Vec<UserId>,
    pub dealer_id: UserId,
    pub current_player: Option<UserId>,
    pub phase: BlotPhase,
    pub proposed_trump: Card,
    pub trump_suit: Option<Suit>,
    pub trump_chooser: UserId,
    pub hands: BTreeMap<UserId, Vec<Card>>,
    pub trick: Vec<TrickPlay>,
    pub played: Vec<Card>,
    pub tricks_taken: BTreeMap<UserId, u32>,
    pub round_scores: BTreeMap<UserId, u32>,
    pub match_scores: BTreeMap<UserId, u32>,
    pub round: u32,
    pub target_score: u32,
    pub deck: Deck,
}

impl BlotHandState {
    pub fn opponent_of(&self, user_id: UserId) -> Option<UserId> {
        if !self.players.contains(&user_id) {
            return None;
        }
        self.players.iter().copied().find(|&p| p != user_id)
    }

    pub fn hand_of(&self, user_id: UserId) -> Option<&[Card]> {
        self.hands.get(&user_id).map(Vec::as_slice)
    }

    fn check_turn(&self, user_id: UserId, phase: BlotPhase) -> Result<(), BlotError> {
        if !self.players.contains(&user_id) {
            return Err(BlotError::PlayerNotInGame(user_id));
        }
        if self.phase != phase {
            return Err(BlotError::WrongPhase(self.phase.describe()));
        }
        if self.current_player != Some(user_id) {
            return Err(BlotError::NotYourTurn {
                expected: self.current_player,
                actual: user_id,
            });
        }
        Ok(())
    }
}

/// Dealer rotation and running scores, kept between hands of one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlotMatchMeta {
    pub last_dealer: Option<UserId>,
    pub match_scores: BTreeMap<UserId, u32>,
    pub round: u32,
}

impl BlotMatchMeta {
    pub fn after_hand(state: &BlotHandState) -> Self {
        Self {
            last_dealer: Some(state.dealer_id),
            match_scores: state.match_scores.clone(),
            round: state.round,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlotSetup {
    pub hand_id: String,
    pub room_id: RoomId,
    pub players: Vec<UserId>,
    pub target_score: u32,
}

/// Deals a new hand: six cards each and one card turned up as proposed trump.
/// The deal alternates from the previous hand's dealer.
pub fn start_hand(
    setup: BlotSetup,
    meta: &BlotMatchMeta,
    mut deck: Deck,
) -> Result<BlotHandState, BlotError> {
    if setup.players.len() != 2 {
        return Err(BlotError::NotEnoughPlayers(setup.players.len()));
    }
    let players = setup.players;
    let dealer_id = match meta.last_dealer {
        Some(prev) if players.contains(&prev) => players.iter().copied().find(|&p| p != prev),
        _ => None,
    }
    .unwrap_or(players[0]);
    let opponent = if players[0] == dealer_id {
        players[1]
    } else {
        players[0]
    };

    let mut hands: BTreeMap<UserId, Vec<Card>> = BTreeMap::new();
    for _ in 0..INITIAL_HAND_SIZE {
        for id in [opponent, dealer_id] {
            let card = deck.draw().ok_or(GameError::DeckExhausted {
                requested: 1,
                remaining: 0,
            })?;
            hands.entry(id).or_default().push(card);
        }
    }
    let proposed_trump = deck.draw().ok_or(GameError::DeckExhausted {
        requested: 1,
        remaining: 0,
    })?;

    // a different pairing starts a fresh match
    let continuing = players.iter().all(|p| meta.match_scores.contains_key(p));
    let match_scores = players
        .iter()
        .map(|&p| {
            let score = if continuing { meta.match_scores[&p] } else { 0 };
            (p, score)
        })
        .collect();
    let zeroes: BTreeMap<UserId, u32> = players.iter().map(|&p| (p, 0)).collect();

    Ok(BlotHandState {
        hand_id: setup.hand_id,
        room_id: setup.room_id,
        dealer_id,
        current_player: Some(dealer_id),
        phase: BlotPhase::AwaitingTrumpDecision,
        proposed_trump,
        trump_suit: None,
        trump_chooser: dealer_id,
        hands,
        trick: Vec::with_capacity(2),
        played: Vec::new(),
        tricks_taken: zeroes.clone(),
        round_scores: zeroes,
        match_scores,
        round: if continuing { meta.round + 1 } else { 1 },
        target_score: setup.target_score,
        deck,
        players,
    })
}

/// Fixes the trump suit and completes both hands to eight cards, dealer
/// first. The turned-up card stays out of play. The dealer leads.
pub fn decide_trump(
    state: &BlotHandState,
    user_id: UserId,
    decision: TrumpDecision,
) -> Result<BlotHandState, BlotError> {
    state.check_turn(user_id, BlotPhase::AwaitingTrumpDecision)?;
    let suit = match decision {
        TrumpDecision::Accept => state.proposed_trump.suit,
        TrumpDecision::Reject(Some(suit)) => suit,
        TrumpDecision::Reject(None) => return Err(BlotError::MissingNewTrumpSuit),
    };

    let mut next = state.clone();
    let order = [Some(next.dealer_id), next.opponent_of(next.dealer_id)];
    for id in order.into_iter().flatten() {
        let held = next.hands.get(&id).map_or(0, Vec::len);
        let extra = next.deck.draw_many(FULL_HAND_SIZE.saturating_sub(held))?;
        next.hands.entry(id).or_default().extend(extra);
    }
    next.trump_suit = Some(suit);
    next.phase = BlotPhase::PlayingTricks;
    next.current_player = Some(next.dealer_id);
    Ok(next)
}

/// Cards `user_id` may play right now; empty when it is not their turn.
pub fn legal_cards(state: &BlotHandState, user_id: UserId) -> Vec<Card> {
    if state.phase != BlotPhase::PlayingTricks || state.current_player != Some(user_id) {
        return Vec::new();
    }
    let hand = state.hand_of(user_id).unwrap_or_default();
    let Some(lead) = state.trick.first() else {
        return hand.to_vec();
    };
    let led = lead.card.suit;
    let following: Vec<Card> = hand.iter().copied().filter(|c| c.suit == led).collect();
    if following.is_empty() {
        hand.to_vec()
    } else {
        following
    }
}

/// Rank order inside a suit: A > 10 > K > Q > J > 9.
pub fn trick_order(rank: Rank) -> u8 {
    match rank {
        Rank::Ace => 5,
        Rank::Ten => 4,
        Rank::King => 3,
        Rank::Queen => 2,
        Rank::Jack => 1,
        _ => 0,
    }
}

pub fn card_points(card: Card) -> u32 {
    match card.rank {
        Rank::Ace => 11,
        Rank::Ten => 10,
        Rank::King => 4,
        Rank::Queen => 3,
        Rank::Jack => 2,
        _ => 0,
    }
}

/// Index into `[lead, reply]` of the card that takes the trick.
pub fn trick_winner(lead: Card, reply: Card, trump: Suit) -> usize {
    match (lead.suit == trump, reply.suit == trump) {
        (false, true) => 1,
        (true, false) => 0,
        _ if lead.suit == reply.suit && trick_order(reply.rank) > trick_order(lead.rank) => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrickResult {
    pub plays: Vec<TrickPlay>,
    pub winner: UserId,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandResult {
    pub round_scores: BTreeMap<UserId, u32>,
    /// None on a tied round.
    pub winner: Option<UserId>,
    pub match_points: u32,
    pub capot: bool,
    pub match_scores: BTreeMap<UserId, u32>,
    pub match_winner: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub state: BlotHandState,
    pub trick: Option<TrickResult>,
    pub hand: Option<HandResult>,
}

/// Plays one card, resolving the trick and the hand when they complete.
///
/// # Errors
///
/// Sequencing errors come first (phase, membership, turn), then
/// [`BlotError::CardNotInHand`], then the follow rules: answering a trump
/// lead while holding trump fails with [`BlotError::MustPlayTrumpWhenLed`],
/// any other unfollowed lead with [`BlotError::MustFollowSuit`].
pub fn play_card(
    state: &BlotHandState,
    user_id: UserId,
    card: Card,
) -> Result<PlayOutcome, BlotError> {
    state.check_turn(user_id, BlotPhase::PlayingTricks)?;
    let hand = state.hand_of(user_id).unwrap_or_default();
    if !hand.contains(&card) {
        return Err(BlotError::CardNotInHand(card));
    }
    let trump = state.trump_suit.unwrap_or(state.proposed_trump.suit);
    if let Some(lead) = state.trick.first() {
        let led = lead.card.suit;
        if card.suit != led && hand.iter().any(|c| c.suit == led) {
            return Err(if led == trump {
                BlotError::MustPlayTrumpWhenLed(trump)
            } else {
                BlotError::MustFollowSuit(led)
            });
        }
    }

    let mut next = state.clone();
    if let Some(cards) = next.hands.get_mut(&user_id) {
        cards.retain(|&c| c != card);
    }
    next.trick.push(TrickPlay {
        player_id: user_id,
        card,
    });

    if next.trick.len() < 2 {
        next.current_player = next.opponent_of(user_id);
        return Ok(PlayOutcome {
            state: next,
            trick: None,
            hand: None,
        });
    }

    let plays = std::mem::take(&mut next.trick);
    let winner = plays[trick_winner(plays[0].card, plays[1].card, trump)].player_id;
    let mut points: u32 = plays.iter().map(|p| card_points(p.card)).sum();
    let hand_over = next.hands.values().all(Vec::is_empty);
    if hand_over {
        points += LAST_TRICK_BONUS;
    }
    next.played.extend(plays.iter().map(|p| p.card));
    *next.tricks_taken.entry(winner).or_default() += 1;
    *next.round_scores.entry(winner).or_default() += points;
    next.current_player = Some(winner);
    let trick = TrickResult {
        plays,
        winner,
        points,
    };

    if !hand_over {
        return Ok(PlayOutcome {
            state: next,
            trick: Some(trick),
            hand: None,
        });
    }

    let result = score_hand(&mut next);
    Ok(PlayOutcome {
        state: next,
        trick: Some(trick),
        hand: Some(result),
    })
}

/// Awards match points for a finished hand and closes it.
fn score_hand(state: &mut BlotHandState) -> HandResult {
    let chooser = state.trump_chooser;
    let defender = state.opponent_of(chooser).unwrap_or(chooser);
    let chooser_pts = state.round_scores.get(&chooser).copied().unwrap_or(0);
    let defender_pts = state.round_scores.get(&defender).copied().unwrap_or(0);

    let (winner, match_points, capot) = if defender_pts == 0 && chooser_pts > 0 {
        (Some(chooser), CAPOT_POINTS, true)
    } else if chooser_pts == 0 && defender_pts > 0 {
        (Some(defender), CAPOT_POINTS, true)
    } else if chooser_pts > defender_pts {
        (Some(chooser), CHOOSER_WIN_POINTS, false)
    } else if defender_pts > chooser_pts {
        (Some(defender), DEFENDER_WIN_POINTS, false)
    } else {
        (None, 0, false)
    };

    if let Some(w) = winner {
        *state.match_scores.entry(w).or_default() += match_points;
    }
    let match_winner =
        winner.filter(|w| state.match_scores.get(w).copied().unwrap_or(0) >= state.target_score);

    state.phase = BlotPhase::HandComplete;
    state.current_player = None;

    HandResult {
        round_scores: state.round_scores.clone(),
        winner,
        match_points,
        capot,
        match_scores: state.match_scores.clone(),
        match_winner,
    }
}
