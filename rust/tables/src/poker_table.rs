//! Runs poker hands against the ledger and the state store.
//!
//! Chips committed to a hand only reach the pot wallet twice: the blinds as
//! the hand starts, and everything else in one batch at settlement, together
//! with the payouts. Calls and raises in between only change the stored hand.

use std::collections::HashMap;

use uuid::Uuid;

use cardroom_engine::cards::Variant;
use cardroom_engine::errors::PokerError;
use cardroom_engine::history::{GameKind, HandRecord};
use cardroom_engine::player::UserId;
use cardroom_engine::poker::{
    self, BlindKind, HandSetup, Phase, PokerHandState, Progress,
};
use cardroom_engine::rules::PokerAction;
use cardroom_engine::RoomId;

use crate::context::{CardRoom, PokerRoomMeta, SettlementKey};
use crate::errors::TableError;
use crate::events::TableEvent;
use crate::ledger::{EntryKind, TransferRequest, WalletId};
use crate::participants::{ParticipantError, RoomInfo, RoomStatus};
use crate::scheduler::ScheduledJob;
use crate::settings::TableSettings;
use crate::store::StateKey;

impl CardRoom {
    /// Deals a new hand if the room is playing and idle. Rooms left with
    /// fewer than two stacks go back to waiting.
    pub fn start_poker_hand(&self, room_id: RoomId) -> Result<(), TableError> {
        self.store.with_room_lock(room_id, || {
            let room = self.room_for(room_id, GameKind::Poker)?;
            if room.status != RoomStatus::Playing {
                tracing::debug!(room_id, "room not playing, start skipped");
                return Ok(());
            }
            if self
                .store
                .get::<PokerHandState>(StateKey::PokerHand(room_id))?
                .is_some()
            {
                tracing::debug!(room_id, "hand already running, start skipped");
                return Ok(());
            }

            let settings = self.current_settings()?;
            let seated = self.refresh_stacks(room_id)?;
            let with_chips = seated.iter().filter(|p| p.stack > 0).count();
            if with_chips < 2 {
                tracing::info!(room_id, with_chips, "not enough stacks to deal");
                self.set_room_status(room_id, RoomStatus::Waiting)?;
                return Ok(());
            }
            let wallets: HashMap<UserId, WalletId> =
                seated.iter().map(|p| (p.user_id, p.wallet)).collect();
            let snapshots: Vec<_> = seated.iter().map(|p| p.snapshot()).collect();

            let meta: PokerRoomMeta = self
                .store
                .get(StateKey::PokerMeta(room_id))?
                .unwrap_or_default();
            let setup = HandSetup {
                hand_id: Uuid::new_v4().to_string(),
                room_id,
                blinds: settings.blinds(),
                previous_dealer: meta.last_dealer_seat,
            };
            let started =
                poker::start_hand(setup, &snapshots, self.shuffler.deck(Variant::Holdem))?;
            let state = started.state;

            let blinds = started
                .blind_posts
                .iter()
                .map(|b| {
                    let kind = match b.kind {
                        BlindKind::Small => "small blind",
                        BlindKind::Big => "big blind",
                    };
                    Ok(TransferRequest::new(
                        wallet_of(&wallets, b.user_id)?,
                        room.pot_wallet,
                        b.amount,
                        EntryKind::Blind,
                        format!("{}, hand {}", kind, state.hand_id),
                    ))
                })
                .collect::<Result<Vec<_>, TableError>>()?;

            self.store.put(StateKey::PokerHand(room_id), &state)?;
            if let Err(e) = self.ledger.transfer_batch(&blinds) {
                self.store.delete(StateKey::PokerHand(room_id))?;
                return Err(e.into());
            }
            for p in &state.players {
                self.participants
                    .update_player_stack(room_id, p.user_id, p.stack)?;
            }
            self.store.put(
                StateKey::PokerMeta(room_id),
                &PokerRoomMeta {
                    last_dealer_seat: Some(state.dealer_seat),
                    hands_played: meta.hands_played + 1,
                    settlement: None,
                },
            )?;

            tracing::info!(
                room_id,
                hand_id = %state.hand_id,
                players = state.players.len(),
                dealer_seat = state.dealer_seat,
                "poker hand started"
            );
            self.publish(
                room_id,
                TableEvent::PokerHandStarted {
                    hand_id: state.hand_id.clone(),
                    dealer_seat: state.dealer_seat,
                    blinds: started.blind_posts.clone(),
                },
            );
            for p in &state.players {
                self.publish(
                    room_id,
                    TableEvent::PokerCardsDealt {
                        hand_id: state.hand_id.clone(),
                        user_id: p.user_id,
                        cards: p.hole_cards.clone(),
                    },
                );
            }

            self.continue_poker(&room, state, &settings)
        })
    }

    /// Applies a player's decision. A rejected action leaves the stored hand
    /// untouched.
    pub fn poker_action(
        &self,
        room_id: RoomId,
        user_id: UserId,
        action: PokerAction,
    ) -> Result<(), TableError> {
        self.store.with_room_lock(room_id, || {
            let room = self.room_for(room_id, GameKind::Poker)?;
            let settings = self.current_settings()?;
            let state: PokerHandState = self
                .store
                .get(StateKey::PokerHand(room_id))?
                .ok_or(PokerError::HandNotFound)?;

            let next = poker::apply_action(&state, user_id, action)?;
            self.store.put(StateKey::PokerHand(room_id), &next)?;
            tracing::debug!(
                room_id,
                hand_id = %next.hand_id,
                user_id,
                action = ?action,
                "poker action applied"
            );
            self.publish(
                room_id,
                TableEvent::PokerActionTaken {
                    hand_id: next.hand_id.clone(),
                    user_id,
                    action,
                    pot: next.total_pot(),
                },
            );
            self.continue_poker(&room, next, &settings)
        })
    }

    /// Deals the next street for a hand whose betting round closed. Jobs
    /// for another hand or street are ignored.
    pub fn advance_poker_stage(
        &self,
        room_id: RoomId,
        hand_id: &str,
        phase: Phase,
    ) -> Result<(), TableError> {
        self.store.with_room_lock(room_id, || {
            let room = self.room_for(room_id, GameKind::Poker)?;
            let Some(state) = self
                .store
                .get::<PokerHandState>(StateKey::PokerHand(room_id))?
            else {
                tracing::debug!(room_id, hand_id, "no hand, stage job dropped");
                return Ok(());
            };
            if state.hand_id != hand_id
                || state.phase != phase
                || state.progress() != Progress::RoundComplete
            {
                tracing::debug!(
                    room_id,
                    hand_id,
                    phase = ?phase,
                    "stale stage job dropped"
                );
                return Ok(());
            }
            let settings = self.current_settings()?;
            let next = poker::advance_stage(&state)?;
            self.publish_stage(room_id, &next);
            self.continue_poker(&room, next, &settings)
        })
    }

    /// Picks up a stored hand where it stopped, e.g. after a failed
    /// settlement.
    pub fn resume_poker_hand(&self, room_id: RoomId) -> Result<(), TableError> {
        self.store.with_room_lock(room_id, || {
            let room = self.room_for(room_id, GameKind::Poker)?;
            let settings = self.current_settings()?;
            let state: PokerHandState = self
                .store
                .get(StateKey::PokerHand(room_id))?
                .ok_or(PokerError::HandNotFound)?;
            self.continue_poker(&room, state, &settings)
        })
    }

    fn continue_poker(
        &self,
        room: &RoomInfo,
        mut state: PokerHandState,
        settings: &TableSettings,
    ) -> Result<(), TableError> {
        let room_id = room.room_id;
        loop {
            match state.progress() {
                Progress::AwaitingAction(user_id) => {
                    self.store.put(StateKey::PokerHand(room_id), &state)?;
                    if let Some(prompt) = poker::turn_prompt(&state) {
                        tracing::trace!(room_id, user_id, "waiting for action");
                        self.publish(
                            room_id,
                            TableEvent::PokerTurn {
                                hand_id: state.hand_id.clone(),
                                prompt,
                            },
                        );
                    }
                    return Ok(());
                }
                Progress::RoundComplete => {
                    let delay = settings.stage_advance_delay();
                    if delay.is_zero() {
                        state = poker::advance_stage(&state)?;
                        self.publish_stage(room_id, &state);
                        continue;
                    }
                    self.store.put(StateKey::PokerHand(room_id), &state)?;
                    self.schedule(
                        ScheduledJob::AdvancePokerStage {
                            room_id,
                            hand_id: state.hand_id.clone(),
                            phase: state.phase,
                        },
                        delay,
                    );
                    return Ok(());
                }
                Progress::HandComplete => return self.settle_poker(room, &state, settings),
            }
        }
    }

    fn publish_stage(&self, room_id: RoomId, state: &PokerHandState) {
        tracing::debug!(
            room_id,
            hand_id = %state.hand_id,
            phase = ?state.phase,
            "stage advanced"
        );
        self.publish(
            room_id,
            TableEvent::PokerStageAdvanced {
                hand_id: state.hand_id.clone(),
                phase: state.phase,
                community_cards: state.community_cards.clone(),
            },
        );
    }

    /// Moves the money and tears the hand down. If the ledger refuses, the
    /// hand stays stored and can be resumed.
    ///
    /// The batch is journaled under an id saved in the room meta before it
    /// runs, so a resumed settlement whose batch already committed only
    /// finishes the teardown.
    fn settle_poker(
        &self,
        room: &RoomInfo,
        state: &PokerHandState,
        settings: &TableSettings,
    ) -> Result<(), TableError> {
        let room_id = room.room_id;
        let settlement = poker::settle(state)?;
        let wallets: HashMap<UserId, WalletId> = self
            .participants
            .get_seated_players(room_id)?
            .into_iter()
            .map(|p| (p.user_id, p.wallet))
            .collect();

        let mut requests = Vec::with_capacity(settlement.unposted.len() + settlement.payouts.len());
        for bet in &settlement.unposted {
            requests.push(TransferRequest::new(
                wallet_of(&wallets, bet.user_id)?,
                room.pot_wallet,
                bet.amount,
                EntryKind::Bet,
                format!("bets, hand {}", state.hand_id),
            ));
        }
        for payout in &settlement.payouts {
            requests.push(TransferRequest::new(
                room.pot_wallet,
                wallet_of(&wallets, payout.user_id)?,
                payout.amount,
                EntryKind::Payout,
                format!("payout, hand {}", state.hand_id),
            ));
        }

        let key = self.settlement_key(room_id, &state.hand_id)?;
        if self.ledger.has_transfer(room.pot_wallet, key.transfer_id)? {
            tracing::info!(
                room_id,
                hand_id = %state.hand_id,
                transfer_id = %key.transfer_id,
                "settlement already journaled"
            );
        } else if !requests.is_empty() {
            self.ledger.transfer_batch_as(key.transfer_id, &requests)?;
        }

        for p in &settlement.state.players {
            self.participants
                .update_player_stack(room_id, p.user_id, p.stack)?;
        }
        self.store.delete(StateKey::PokerHand(room_id))?;
        self.record_hand(&HandRecord::from_settlement(&settlement));

        tracing::info!(
            room_id,
            hand_id = %state.hand_id,
            winners = ?settlement.winners(),
            uncontested = settlement.uncontested,
            "poker hand settled"
        );
        self.publish(
            room_id,
            TableEvent::PokerHandSettled {
                hand_id: state.hand_id.clone(),
                payouts: settlement.payouts.clone(),
                showdown: settlement.showdown.clone(),
                uncontested: settlement.uncontested,
            },
        );

        if self.reconcile_locked(room_id)? == RoomStatus::Playing {
            self.schedule(
                ScheduledJob::StartPokerHand { room_id },
                settings.next_hand_delay(),
            );
        }
        Ok(())
    }

    /// The id this hand's settlement batch is journaled under, reserved in
    /// the room meta on first use.
    fn settlement_key(&self, room_id: RoomId, hand_id: &str) -> Result<SettlementKey, TableError> {
        let meta: PokerRoomMeta = self
            .store
            .get(StateKey::PokerMeta(room_id))?
            .unwrap_or_default();
        if let Some(key) = meta.settlement.as_ref().filter(|k| k.hand_id == hand_id) {
            return Ok(key.clone());
        }
        let key = SettlementKey {
            hand_id: hand_id.to_string(),
            transfer_id: Uuid::new_v4(),
        };
        self.store.put(
            StateKey::PokerMeta(room_id),
            &PokerRoomMeta {
                settlement: Some(key.clone()),
                ..meta
            },
        )?;
        Ok(key)
    }
}

fn wallet_of(wallets: &HashMap<UserId, WalletId>, user_id: UserId) -> Result<WalletId, TableError> {
    wallets
        .get(&user_id)
        .copied()
        .ok_or_else(|| ParticipantError::NotSeated(user_id).into())
}
