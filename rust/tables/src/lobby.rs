//! Rooms and seats: buy-in, cash-out and the waiting/playing switch.

use cardroom_engine::blot::BlotHandState;
use cardroom_engine::history::GameKind;
use cardroom_engine::player::{Chips, SeatIndex, UserId};
use cardroom_engine::poker::PokerHandState;
use cardroom_engine::RoomId;

use crate::context::CardRoom;
use crate::errors::TableError;
use crate::events::TableEvent;
use crate::ledger::{EntryKind, TransferRequest, WalletId};
use crate::participants::{ParticipantError, RoomInfo, RoomStatus, SeatedPlayer};
use crate::scheduler::ScheduledJob;
use crate::store::StateKey;

/// Blot is always heads-up.
pub const BLOT_SEATS: u8 = 2;

impl CardRoom {
    /// Opens a room and its pot wallet. Rooms start out waiting.
    pub fn create_room(&self, room_id: RoomId, game: GameKind) -> Result<RoomInfo, TableError> {
        let settings = self.current_settings()?;
        let max_seats = match game {
            GameKind::Poker => settings.max_seats,
            GameKind::Blot => BLOT_SEATS,
        };
        let pot_wallet = self.ledger.create_wallet()?;
        let info = RoomInfo {
            room_id,
            game,
            status: RoomStatus::Waiting,
            max_seats,
            pot_wallet,
        };
        self.participants.create_room(info.clone())?;
        tracing::info!(room_id, game = ?game, max_seats, pot_wallet, "room created");
        Ok(info)
    }

    /// Seats `user_id` and moves the buy-in from `account` into a fresh seat
    /// wallet. Blot rooms play for points and take no buy-in.
    pub fn take_seat(
        &self,
        room_id: RoomId,
        user_id: UserId,
        account: WalletId,
        seat: SeatIndex,
        buy_in: Chips,
    ) -> Result<SeatedPlayer, TableError> {
        self.store.with_room_lock(room_id, || {
            let settings = self.current_settings()?;
            let room = self.participants.room(room_id)?;
            let (min, max) = match room.game {
                GameKind::Poker => (settings.min_buy_in, settings.max_buy_in),
                GameKind::Blot => (0, 0),
            };
            if !(min..=max).contains(&buy_in) {
                return Err(TableError::BuyInOutOfRange {
                    amount: buy_in,
                    min,
                    max,
                });
            }

            let wallet = self.ledger.create_wallet()?;
            let mut player = SeatedPlayer {
                user_id,
                seat,
                stack: 0,
                wallet,
                account,
            };
            self.participants.seat_player(room_id, player.clone())?;

            if buy_in > 0 {
                let request = TransferRequest::new(
                    account,
                    wallet,
                    buy_in,
                    EntryKind::BuyIn,
                    format!("buy-in, room {}", room_id),
                );
                if let Err(e) = self.ledger.transfer(request) {
                    self.participants.remove_player(room_id, user_id)?;
                    return Err(e.into());
                }
                self.participants
                    .update_player_stack(room_id, user_id, buy_in)?;
                player.stack = buy_in;
            }

            tracing::info!(room_id, user_id, seat, buy_in, "seat taken");
            self.publish(
                room_id,
                TableEvent::SeatTaken {
                    user_id,
                    seat,
                    stack: player.stack,
                },
            );
            self.reconcile_locked(room_id)?;
            Ok(player)
        })
    }

    /// Frees the player's seat and returns their chips to their account.
    /// Returns the amount cashed out.
    pub fn vacate_seat(&self, room_id: RoomId, user_id: UserId) -> Result<Chips, TableError> {
        self.store.with_room_lock(room_id, || {
            let room = self.participants.room(room_id)?;
            let player = self
                .participants
                .get_seated_players(room_id)?
                .into_iter()
                .find(|p| p.user_id == user_id)
                .ok_or(ParticipantError::NotSeated(user_id))?;

            match room.game {
                GameKind::Poker => {
                    let hand: Option<PokerHandState> =
                        self.store.get(StateKey::PokerHand(room_id))?;
                    if hand.is_some_and(|h| h.player(user_id).is_some()) {
                        return Err(TableError::HandInProgress(room_id));
                    }
                }
                GameKind::Blot => {
                    let hand: Option<BlotHandState> =
                        self.store.get(StateKey::BlotHand(room_id))?;
                    if hand.is_some_and(|h| h.players.contains(&user_id)) {
                        return Err(TableError::HandInProgress(room_id));
                    }
                    // the match ends with the pairing
                    self.store.delete(StateKey::BlotMeta(room_id))?;
                }
            }

            let balance = self.ledger.balance(player.wallet)?;
            if balance > 0 {
                self.ledger.transfer(TransferRequest::new(
                    player.wallet,
                    player.account,
                    balance,
                    EntryKind::CashOut,
                    format!("cash-out, room {}", room_id),
                ))?;
            }
            self.participants.remove_player(room_id, user_id)?;

            tracing::info!(room_id, user_id, cashed_out = balance, "seat vacated");
            self.publish(
                room_id,
                TableEvent::SeatVacated {
                    user_id,
                    seat: player.seat,
                    cashed_out: balance,
                },
            );
            self.reconcile_locked(room_id)?;
            Ok(balance)
        })
    }

    /// Switches the room between waiting and playing from its seat count,
    /// scheduling a first hand when a waiting room becomes playable.
    pub fn reconcile_room_status(&self, room_id: RoomId) -> Result<RoomStatus, TableError> {
        self.store
            .with_room_lock(room_id, || self.reconcile_locked(room_id))
    }

    pub(crate) fn reconcile_locked(&self, room_id: RoomId) -> Result<RoomStatus, TableError> {
        let room = self.participants.room(room_id)?;
        let seated = self.participants.get_seated_players(room_id)?.len();
        match room.status {
            RoomStatus::Waiting if seated >= 2 => {
                self.set_room_status(room_id, RoomStatus::Playing)?;
                let settings = self.current_settings()?;
                let (job, delay) = match room.game {
                    GameKind::Poker => (
                        ScheduledJob::StartPokerHand { room_id },
                        settings.next_hand_delay(),
                    ),
                    GameKind::Blot => (
                        ScheduledJob::StartBlotHand { room_id },
                        settings.blot_next_hand_delay(),
                    ),
                };
                self.schedule(job, delay);
                Ok(RoomStatus::Playing)
            }
            RoomStatus::Playing if seated < 2 && !self.hand_running(&room)? => {
                self.set_room_status(room_id, RoomStatus::Waiting)?;
                Ok(RoomStatus::Waiting)
            }
            status => Ok(status),
        }
    }

    fn hand_running(&self, room: &RoomInfo) -> Result<bool, TableError> {
        let running = match room.game {
            GameKind::Poker => self
                .store
                .get::<PokerHandState>(StateKey::PokerHand(room.room_id))?
                .is_some(),
            GameKind::Blot => self
                .store
                .get::<BlotHandState>(StateKey::BlotHand(room.room_id))?
                .is_some(),
        };
        Ok(running)
    }
}
