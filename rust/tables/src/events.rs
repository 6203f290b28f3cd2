use cardroom_engine::blot::{HandResult, TrickPlay, TrickResult};
use cardroom_engine::cards::{Card, Suit};
use cardroom_engine::poker::{BlindPost, Payout, Phase, ShowdownHand, TurnPrompt};
use cardroom_engine::player::{Chips, SeatIndex, UserId};
use cardroom_engine::rules::PokerAction;
use cardroom_engine::RoomId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

use crate::participants::RoomStatus;

// Slow subscribers lose events instead of growing memory
const EVENT_CHANNEL_BUFFER: usize = 1000;

pub type EventSender = mpsc::Sender<TableEvent>;
pub type EventReceiver = mpsc::Receiver<TableEvent>;

/// Outbound side of the real-time transport.
pub trait EventNotifier: Send + Sync {
    /// Delivers `event` to the room's subscribers without waiting on them.
    fn publish(&self, room_id: RoomId, event: TableEvent);
}

pub struct EventSubscription {
    bus: EventBus,
    room_id: RoomId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<TableEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.room_id, self.subscriber_id);
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<RoomId, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, room_id: RoomId) -> EventSubscription {
        let (subscriber_id, receiver) = self.subscribe_raw(room_id);
        EventSubscription {
            bus: self.clone(),
            room_id,
            subscriber_id,
            receiver,
        }
    }

    fn subscribe_raw(&self, room_id: RoomId) -> (usize, EventReceiver) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.entry(room_id).or_default().push((id, tx));

        tracing::info!(room_id, subscriber_id = id, "client subscribed to room events");

        (id, rx)
    }

    pub fn broadcast(&self, room_id: RoomId, event: TableEvent) {
        tracing::debug!(room_id, event_type = event.name(), "broadcasting table event");

        let subscribers = {
            let guard = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            guard.get(&room_id).cloned()
        };

        let Some(list) = subscribers else {
            tracing::trace!(room_id, "no subscribers for room");
            return;
        };

        let mut failed = Vec::new();
        for (id, sender) in list {
            if let Err(e) = sender.try_send(event.clone()) {
                tracing::warn!(
                    room_id,
                    subscriber_id = id,
                    error = %e,
                    "dropping subscriber that cannot keep up"
                );
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            self.remove_subscribers(room_id, &failed);
        }
    }

    pub fn unsubscribe(&self, room_id: RoomId, subscriber_id: usize) {
        self.remove_subscribers(room_id, &[subscriber_id]);
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.values().map(|list| list.len()).sum()
    }

    fn remove_subscribers(&self, room_id: RoomId, ids: &[usize]) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = guard.get_mut(&room_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(&room_id);
            }
        }
    }
}

impl EventNotifier for EventBus {
    fn publish(&self, room_id: RoomId, event: TableEvent) {
        self.broadcast(room_id, event);
    }
}

/// Everything a room tells its clients.
///
/// Hole cards travel in events addressed to one player; the transport is
/// expected to deliver those to that player only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableEvent {
    SeatTaken {
        user_id: UserId,
        seat: SeatIndex,
        stack: Chips,
    },
    SeatVacated {
        user_id: UserId,
        seat: SeatIndex,
        cashed_out: Chips,
    },
    RoomStatusChanged {
        status: RoomStatus,
    },
    PokerHandStarted {
        hand_id: String,
        dealer_seat: SeatIndex,
        blinds: Vec<BlindPost>,
    },
    PokerCardsDealt {
        hand_id: String,
        user_id: UserId,
        cards: Vec<Card>,
    },
    PokerActionTaken {
        hand_id: String,
        user_id: UserId,
        action: PokerAction,
        pot: Chips,
    },
    PokerStageAdvanced {
        hand_id: String,
        phase: Phase,
        community_cards: Vec<Card>,
    },
    PokerTurn {
        hand_id: String,
        prompt: TurnPrompt,
    },
    PokerHandSettled {
        hand_id: String,
        payouts: Vec<Payout>,
        showdown: Vec<ShowdownHand>,
        uncontested: bool,
    },
    BlotHandStarted {
        hand_id: String,
        dealer_id: UserId,
        proposed_trump: Card,
        round: u32,
    },
    BlotCardsDealt {
        hand_id: String,
        user_id: UserId,
        cards: Vec<Card>,
    },
    BlotTrumpChosen {
        hand_id: String,
        chooser: UserId,
        trump: Suit,
    },
    BlotTurn {
        hand_id: String,
        user_id: UserId,
        legal_cards: Vec<Card>,
    },
    BlotCardPlayed {
        hand_id: String,
        play: TrickPlay,
    },
    BlotTrickWon {
        hand_id: String,
        trick: TrickResult,
    },
    BlotHandScored {
        hand_id: String,
        result: HandResult,
    },
    BlotMatchFinished {
        winner: UserId,
        match_scores: BTreeMap<UserId, u32>,
    },
}

impl TableEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TableEvent::SeatTaken { .. } => "seat_taken",
            TableEvent::SeatVacated { .. } => "seat_vacated",
            TableEvent::RoomStatusChanged { .. } => "room_status_changed",
            TableEvent::PokerHandStarted { .. } => "poker_hand_started",
            TableEvent::PokerCardsDealt { .. } => "poker_cards_dealt",
            TableEvent::PokerActionTaken { .. } => "poker_action_taken",
            TableEvent::PokerStageAdvanced { .. } => "poker_stage_advanced",
            TableEvent::PokerTurn { .. } => "poker_turn",
            TableEvent::PokerHandSettled { .. } => "poker_hand_settled",
            TableEvent::BlotHandStarted { .. } => "blot_hand_started",
            TableEvent::BlotCardsDealt { .. } => "blot_cards_dealt",
            TableEvent::BlotTrumpChosen { .. } => "blot_trump_chosen",
            TableEvent::BlotTurn { .. } => "blot_turn",
            TableEvent::BlotCardPlayed { .. } => "blot_card_played",
            TableEvent::BlotTrickWon { .. } => "blot_trick_won",
            TableEvent::BlotHandScored { .. } => "blot_hand_scored",
            TableEvent::BlotMatchFinished { .. } => "blot_match_finished",
        }
    }
}
