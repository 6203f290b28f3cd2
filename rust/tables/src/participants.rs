use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

use cardroom_engine::history::GameKind;
use cardroom_engine::player::{Chips, SeatIndex, SeatSnapshot, UserId};
use cardroom_engine::RoomId;

use crate::ledger::WalletId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub game: GameKind,
    pub status: RoomStatus,
    pub max_seats: u8,
    /// Wallet holding the chips committed to the current hand.
    pub pot_wallet: WalletId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatedPlayer {
    pub user_id: UserId,
    pub seat: SeatIndex,
    /// Mirror of the seat wallet balance, refreshed after ledger moves.
    pub stack: Chips,
    /// Table wallet the buy-in was moved into.
    pub wallet: WalletId,
    /// The player's own account, credited on cash-out.
    pub account: WalletId,
}

impl SeatedPlayer {
    pub fn snapshot(&self) -> SeatSnapshot {
        SeatSnapshot {
            user_id: self.user_id,
            seat: self.seat,
            stack: self.stack,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParticipantError {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("Room already exists: {0}")]
    RoomExists(RoomId),
    #[error("Seat {0} is taken")]
    SeatTaken(SeatIndex),
    #[error("Seat {seat} is outside the table of {max_seats}")]
    SeatOutOfRange { seat: SeatIndex, max_seats: u8 },
    #[error("Room {0} is full")]
    RoomFull(RoomId),
    #[error("Player {0} is already seated")]
    AlreadySeated(UserId),
    #[error("Player {0} is not seated")]
    NotSeated(UserId),
    #[error("Participant storage poisoned")]
    StoragePoisoned,
}

/// Rooms and who sits where.
pub trait ParticipantRepository: Send + Sync {
    fn create_room(&self, room: RoomInfo) -> Result<(), ParticipantError>;
    fn room(&self, room_id: RoomId) -> Result<RoomInfo, ParticipantError>;
    fn set_status(&self, room_id: RoomId, status: RoomStatus) -> Result<(), ParticipantError>;
    /// Seated players in seat order.
    fn get_seated_players(&self, room_id: RoomId) -> Result<Vec<SeatedPlayer>, ParticipantError>;
    fn get_available_seats(&self, room_id: RoomId) -> Result<Vec<SeatIndex>, ParticipantError>;
    fn seat_player(&self, room_id: RoomId, player: SeatedPlayer) -> Result<(), ParticipantError>;
    fn remove_player(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<SeatedPlayer, ParticipantError>;
    fn update_player_stack(
        &self,
        room_id: RoomId,
        user_id: UserId,
        stack: Chips,
    ) -> Result<(), ParticipantError>;
}

#[derive(Debug)]
struct RoomEntry {
    info: RoomInfo,
    seats: BTreeMap<SeatIndex, SeatedPlayer>,
}

impl RoomEntry {
    fn seat_of(&self, user_id: UserId) -> Option<SeatIndex> {
        self.seats
            .values()
            .find(|p| p.user_id == user_id)
            .map(|p| p.seat)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryParticipants {
    rooms: RwLock<BTreeMap<RoomId, RoomEntry>>,
}

impl InMemoryParticipants {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(
        &self,
        room_id: RoomId,
        f: impl FnOnce(&RoomEntry) -> T,
    ) -> Result<T, ParticipantError> {
        let guard = self
            .rooms
            .read()
            .map_err(|_| ParticipantError::StoragePoisoned)?;
        guard
            .get(&room_id)
            .map(f)
            .ok_or(ParticipantError::RoomNotFound(room_id))
    }

    fn write<T>(
        &self,
        room_id: RoomId,
        f: impl FnOnce(&mut RoomEntry) -> Result<T, ParticipantError>,
    ) -> Result<T, ParticipantError> {
        let mut guard = self
            .rooms
            .write()
            .map_err(|_| ParticipantError::StoragePoisoned)?;
        let entry = guard
            .get_mut(&room_id)
            .ok_or(ParticipantError::RoomNotFound(room_id))?;
        f(entry)
    }
}

impl ParticipantRepository for InMemoryParticipants {
    fn create_room(&self, room: RoomInfo) -> Result<(), ParticipantError> {
        let mut guard = self
            .rooms
            .write()
            .map_err(|_| ParticipantError::StoragePoisoned)?;
        if guard.contains_key(&room.room_id) {
            return Err(ParticipantError::RoomExists(room.room_id));
        }
        guard.insert(
            room.room_id,
            RoomEntry {
                info: room,
                seats: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn room(&self, room_id: RoomId) -> Result<RoomInfo, ParticipantError> {
        self.read(room_id, |r| r.info.clone())
    }

    fn set_status(&self, room_id: RoomId, status: RoomStatus) -> Result<(), ParticipantError> {
        self.write(room_id, |r| {
            r.info.status = status;
            Ok(())
        })
    }

    fn get_seated_players(&self, room_id: RoomId) -> Result<Vec<SeatedPlayer>, ParticipantError> {
        self.read(room_id, |r| r.seats.values().cloned().collect())
    }

    fn get_available_seats(&self, room_id: RoomId) -> Result<Vec<SeatIndex>, ParticipantError> {
        self.read(room_id, |r| {
            (0..r.info.max_seats)
                .filter(|s| !r.seats.contains_key(s))
                .collect()
        })
    }

    fn seat_player(&self, room_id: RoomId, player: SeatedPlayer) -> Result<(), ParticipantError> {
        self.write(room_id, |r| {
            if r.seat_of(player.user_id).is_some() {
                return Err(ParticipantError::AlreadySeated(player.user_id));
            }
            if r.seats.len() >= r.info.max_seats as usize {
                return Err(ParticipantError::RoomFull(room_id));
            }
            if player.seat >= r.info.max_seats {
                return Err(ParticipantError::SeatOutOfRange {
                    seat: player.seat,
                    max_seats: r.info.max_seats,
                });
            }
            if r.seats.contains_key(&player.seat) {
                return Err(ParticipantError::SeatTaken(player.seat));
            }
            r.seats.insert(player.seat, player);
            Ok(())
        })
    }

    fn remove_player(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<SeatedPlayer, ParticipantError> {
        self.write(room_id, |r| {
            let seat = r
                .seat_of(user_id)
                .ok_or(ParticipantError::NotSeated(user_id))?;
            r.seats
                .remove(&seat)
                .ok_or(ParticipantError::NotSeated(user_id))
        })
    }

    fn update_player_stack(
        &self,
        room_id: RoomId,
        user_id: UserId,
        stack: Chips,
    ) -> Result<(), ParticipantError> {
        self.write(room_id, |r| {
            let seat = r
                .seat_of(user_id)
                .ok_or(ParticipantError::NotSeated(user_id))?;
            if let Some(p) = r.seats.get_mut(&seat) {
                p.stack = stack;
            }
            Ok(())
        })
    }
}
