use uuid::Uuid;

use cardroom_engine::blot::{
    self, BlotHandState, BlotMatchMeta, BlotPhase, BlotSetup, HandResult, TrickPlay,
    TrumpDecision,
};
use cardroom_engine::cards::{Card, Variant};
use cardroom_engine::errors::BlotError;
use cardroom_engine::history::{GameKind, HandRecord, ShowdownInfo};
use cardroom_engine::player::UserId;
use cardroom_engine::RoomId;

use crate::context::CardRoom;
use crate::errors::TableError;
use crate::events::TableEvent;
use crate::participants::RoomStatus;
use crate::scheduler::ScheduledJob;
use crate::store::StateKey;

impl CardRoom {
    pub fn start_blot_hand(&self, room_id: RoomId) -> Result<(), TableError> {
        self.store.with_room_lock(room_id, || {
            let room = self.room_for(room_id, GameKind::Blot)?;
            if room.status != RoomStatus::Playing {
                tracing::debug!(room_id, "room not playing, start skipped");
                return Ok(());
            }
            if self
                .store
                .get::<BlotHandState>(StateKey::BlotHand(room_id))?
                .is_some()
            {
                tracing::debug!(room_id, "hand already running, start skipped");
                return Ok(());
            }
            let seated = self.participants.get_seated_players(room_id)?;
            if seated.len() != 2 {
                tracing::info!(room_id, seated = seated.len(), "blot needs two players");
                self.set_room_status(room_id, RoomStatus::Waiting)?;
                return Ok(());
            }

            let settings = self.current_settings()?;
            let meta: BlotMatchMeta = self
                .store
                .get(StateKey::BlotMeta(room_id))?
                .unwrap_or_default();
            let setup = BlotSetup {
                hand_id: Uuid::new_v4().to_string(),
                room_id,
                players: seated.iter().map(|p| p.user_id).collect(),
                target_score: settings.blot_target_score,
            };
            let state = blot::start_hand(setup, &meta, self.shuffler.deck(Variant::Blot))?;
            self.store.put(StateKey::BlotHand(room_id), &state)?;

            tracing::info!(
                room_id,
                hand_id = %state.hand_id,
                dealer_id = state.dealer_id,
                round = state.round,
                "blot hand started"
            );
            self.publish(
                room_id,
                TableEvent::BlotHandStarted {
                    hand_id: state.hand_id.clone(),
                    dealer_id: state.dealer_id,
                    proposed_trump: state.proposed_trump,
                    round: state.round,
                },
            );
            self.publish_hands(room_id, &state);
            self.publish_turn(room_id, &state);
            Ok(())
        })
    }

    /// The dealer keeps the turned-up suit or names another one.
    pub fn blot_decide_trump(
        &self,
        room_id: RoomId,
        user_id: UserId,
        decision: TrumpDecision,
    ) -> Result<(), TableError> {
        self.store.with_room_lock(room_id, || {
            self.room_for(room_id, GameKind::Blot)?;
            let state: BlotHandState = self
                .store
                .get(StateKey::BlotHand(room_id))?
                .ok_or(BlotError::GameStateNotFound)?;
            let next = blot::decide_trump(&state, user_id, decision)?;
            self.store.put(StateKey::BlotHand(room_id), &next)?;

            let trump = next.trump_suit.unwrap_or(next.proposed_trump.suit);
            tracing::debug!(room_id, hand_id = %next.hand_id, user_id, trump = ?trump, "trump chosen");
            self.publish(
                room_id,
                TableEvent::BlotTrumpChosen {
                    hand_id: next.hand_id.clone(),
                    chooser: user_id,
                    trump,
                },
            );
            self.publish_hands(room_id, &next);
            self.publish_turn(room_id, &next);
            Ok(())
        })
    }

    /// Plays a card. Returns the hand result when this card finished the
    /// hand.
    pub fn blot_play_card(
        &self,
        room_id: RoomId,
        user_id: UserId,
        card: Card,
    ) -> Result<Option<HandResult>, TableError> {
        self.store.with_room_lock(room_id, || {
            self.room_for(room_id, GameKind::Blot)?;
            let state: BlotHandState = self
                .store
                .get(StateKey::BlotHand(room_id))?
                .ok_or(BlotError::GameStateNotFound)?;
            let outcome = blot::play_card(&state, user_id, card)?;
            let next = &outcome.state;
            match &outcome.hand {
                None => self.store.put(StateKey::BlotHand(room_id), next)?,
                Some(result) => {
                    if result.match_winner.is_some() {
                        self.store.delete(StateKey::BlotMeta(room_id))?;
                    } else {
                        self.store
                            .put(StateKey::BlotMeta(room_id), &BlotMatchMeta::after_hand(next))?;
                    }
                    self.store.delete(StateKey::BlotHand(room_id))?;
                    self.record_hand(&blot_record(next, result));
                }
            }

            let hand_id = next.hand_id.clone();
            self.publish(
                room_id,
                TableEvent::BlotCardPlayed {
                    hand_id: hand_id.clone(),
                    play: TrickPlay {
                        player_id: user_id,
                        card,
                    },
                },
            );
            if let Some(trick) = &outcome.trick {
                self.publish(
                    room_id,
                    TableEvent::BlotTrickWon {
                        hand_id: hand_id.clone(),
                        trick: trick.clone(),
                    },
                );
            }
            let Some(result) = outcome.hand else {
                self.publish_turn(room_id, next);
                return Ok(None);
            };

            tracing::info!(
                room_id,
                hand_id = %hand_id,
                winner = ?result.winner,
                match_points = result.match_points,
                capot = result.capot,
                "blot hand scored"
            );
            self.publish(
                room_id,
                TableEvent::BlotHandScored {
                    hand_id,
                    result: result.clone(),
                },
            );

            match result.match_winner {
                Some(winner) => {
                    tracing::info!(room_id, winner, "blot match finished");
                    self.publish(
                        room_id,
                        TableEvent::BlotMatchFinished {
                            winner,
                            match_scores: result.match_scores.clone(),
                        },
                    );
                    self.set_room_status(room_id, RoomStatus::Waiting)?;
                }
                None => {
                    let settings = self.current_settings()?;
                    self.schedule(
                        ScheduledJob::StartBlotHand { room_id },
                        settings.blot_next_hand_delay(),
                    );
                }
            }
            Ok(Some(result))
        })
    }

    fn publish_hands(&self, room_id: RoomId, state: &BlotHandState) {
        for (&user_id, cards) in &state.hands {
            self.publish(
                room_id,
                TableEvent::BlotCardsDealt {
                    hand_id: state.hand_id.clone(),
                    user_id,
                    cards: cards.clone(),
                },
            );
        }
    }

    fn publish_turn(&self, room_id: RoomId, state: &BlotHandState) {
        let Some(user_id) = state.current_player else {
            return;
        };
        let legal_cards = match state.phase {
            BlotPhase::PlayingTricks => blot::legal_cards(state, user_id),
            _ => Vec::new(),
        };
        self.publish(
            room_id,
            TableEvent::BlotTurn {
                hand_id: state.hand_id.clone(),
                user_id,
                legal_cards,
            },
        );
    }
}

fn blot_record(state: &BlotHandState, result: &HandResult) -> HandRecord {
    let summary = match result.winner {
        Some(w) if result.capot => format!("player {w} wins by capot, +{}", result.match_points),
        Some(w) => format!("player {w} wins the round, +{}", result.match_points),
        None => "round tied".to_string(),
    };
    HandRecord {
        hand_id: state.hand_id.clone(),
        room_id: state.room_id,
        game: GameKind::Blot,
        actions: Vec::new(),
        board: state.played.clone(),
        result: Some(summary),
        ts: None,
        meta: serde_json::to_value(result).ok(),
        showdown: result.winner.map(|w| ShowdownInfo {
            winners: vec![w],
            notes: result.capot.then(|| "capot".to_string()),
        }),
    }
}
