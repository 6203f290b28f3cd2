use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use cardroom_engine::blot::{BlotHandState, BlotMatchMeta};
use cardroom_engine::cards::Variant;
use cardroom_engine::deck::Deck;
use cardroom_engine::history::{GameKind, HandLogger, HandRecord};
use cardroom_engine::player::SeatIndex;
use cardroom_engine::poker::PokerHandState;
use cardroom_engine::RoomId;

use crate::errors::{IntoErrorResponse, TableError};
use crate::events::{EventBus, EventNotifier, TableEvent};
use crate::ledger::LedgerGateway;
use crate::participants::{
    InMemoryParticipants, ParticipantRepository, RoomInfo, RoomStatus, SeatedPlayer,
};
use crate::scheduler::{JobReceiver, ScheduledJob, Scheduler, TokioScheduler};
use crate::settings::{SettingsStore, TableSettings};
use crate::store::{GameStateStore, StateKey};

/// Source of fresh decks for new hands.
pub trait Shuffler: Send + Sync {
    fn deck(&self, variant: Variant) -> Deck;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsShuffler;

impl Shuffler for OsShuffler {
    fn deck(&self, variant: Variant) -> Deck {
        Deck::new_shuffled(variant)
    }
}

/// Reproducible decks: each deck uses the next seed in sequence.
#[derive(Debug)]
pub struct SeededShuffler {
    next_seed: AtomicU64,
}

impl SeededShuffler {
    pub fn new(seed: u64) -> Self {
        Self {
            next_seed: AtomicU64::new(seed),
        }
    }
}

impl Shuffler for SeededShuffler {
    fn deck(&self, variant: Variant) -> Deck {
        Deck::new_with_seed(variant, self.next_seed.fetch_add(1, Ordering::Relaxed))
    }
}

/// Dealer rotation for a poker room, kept between hands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokerRoomMeta {
    pub last_dealer_seat: Option<SeatIndex>,
    pub hands_played: u64,
    /// Ledger batch reserved for the current hand's settlement.
    #[serde(default)]
    pub settlement: Option<SettlementKey>,
}

/// Ties a hand to the id its settlement batch is journaled under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementKey {
    pub hand_id: String,
    pub transfer_id: Uuid,
}

/// Everything the tables share: configuration, state storage, money,
/// seating, outbound events and deferred jobs.
///
/// Table operations live in `lobby`, `poker_table` and `blot_table`. Every
/// public operation runs inside the room's exclusive section.
pub struct CardRoom {
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) store: Arc<GameStateStore>,
    pub(crate) ledger: Arc<LedgerGateway>,
    pub(crate) participants: Arc<dyn ParticipantRepository>,
    pub(crate) notifier: Arc<dyn EventNotifier>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) shuffler: Arc<dyn Shuffler>,
    history: Mutex<HandLogger>,
}

impl std::fmt::Debug for CardRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardRoom")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CardRoom {
    /// In-memory store, ledger and seating with OS-seeded decks.
    pub fn new(
        settings: TableSettings,
        notifier: Arc<dyn EventNotifier>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, TableError> {
        let history = match &settings.history_path {
            Some(path) => HandLogger::create(path)
                .map_err(|e| TableError::History(format!("{}: {}", path.display(), e)))?,
            None => HandLogger::in_memory(),
        };
        let store = Arc::new(GameStateStore::in_memory(settings.state_ttl()));
        let settings = Arc::new(SettingsStore::with_settings(settings)?);

        Ok(Self::with_dependencies(
            settings,
            store,
            Arc::new(LedgerGateway::in_memory()),
            Arc::new(InMemoryParticipants::new()),
            notifier,
            scheduler,
            Arc::new(OsShuffler),
        )
        .with_history(history))
    }

    pub fn with_dependencies(
        settings: Arc<SettingsStore>,
        store: Arc<GameStateStore>,
        ledger: Arc<LedgerGateway>,
        participants: Arc<dyn ParticipantRepository>,
        notifier: Arc<dyn EventNotifier>,
        scheduler: Arc<dyn Scheduler>,
        shuffler: Arc<dyn Shuffler>,
    ) -> Self {
        Self {
            settings,
            store,
            ledger,
            participants,
            notifier,
            scheduler,
            shuffler,
            history: Mutex::new(HandLogger::in_memory()),
        }
    }

    pub fn with_history(self, logger: HandLogger) -> Self {
        Self {
            history: Mutex::new(logger),
            ..self
        }
    }

    pub fn settings_store(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.settings)
    }

    /// Validates and installs new settings. Hands already running keep
    /// their blinds; the TTL applies from the next write.
    pub fn update_settings(&self, settings: TableSettings) -> Result<TableSettings, TableError> {
        let updated = self.settings.update(settings)?;
        self.store.set_ttl(updated.state_ttl());
        tracing::info!(
            small_blind = updated.small_blind,
            big_blind = updated.big_blind,
            state_ttl_secs = updated.state_ttl_secs,
            "table settings updated"
        );
        Ok(updated)
    }

    pub fn ledger(&self) -> Arc<LedgerGateway> {
        Arc::clone(&self.ledger)
    }

    pub fn participants(&self) -> Arc<dyn ParticipantRepository> {
        Arc::clone(&self.participants)
    }

    pub fn store(&self) -> Arc<GameStateStore> {
        Arc::clone(&self.store)
    }

    pub fn poker_state(&self, room_id: RoomId) -> Result<Option<PokerHandState>, TableError> {
        Ok(self.store.get(StateKey::PokerHand(room_id))?)
    }

    pub fn poker_meta(&self, room_id: RoomId) -> Result<Option<PokerRoomMeta>, TableError> {
        Ok(self.store.get(StateKey::PokerMeta(room_id))?)
    }

    pub fn blot_state(&self, room_id: RoomId) -> Result<Option<BlotHandState>, TableError> {
        Ok(self.store.get(StateKey::BlotHand(room_id))?)
    }

    pub fn blot_meta(&self, room_id: RoomId) -> Result<Option<BlotMatchMeta>, TableError> {
        Ok(self.store.get(StateKey::BlotMeta(room_id))?)
    }

    /// Hands recorded since this room was created.
    pub fn hand_history(&self) -> Vec<HandRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records()
            .to_vec()
    }

    /// Runs one scheduled job. Jobs that no longer match the room's state
    /// do nothing.
    pub fn run_job(&self, job: &ScheduledJob) -> Result<(), TableError> {
        match job {
            ScheduledJob::StartPokerHand { room_id } => self.start_poker_hand(*room_id),
            ScheduledJob::AdvancePokerStage {
                room_id,
                hand_id,
                phase,
            } => self.advance_poker_stage(*room_id, hand_id, *phase),
            ScheduledJob::StartBlotHand { room_id } => self.start_blot_hand(*room_id),
        }
    }

    pub(crate) fn current_settings(&self) -> Result<TableSettings, TableError> {
        Ok(self.settings.get()?)
    }

    pub(crate) fn room_for(&self, room_id: RoomId, game: GameKind) -> Result<RoomInfo, TableError> {
        let room = self.participants.room(room_id)?;
        if room.game != game {
            return Err(TableError::WrongGame {
                room_id,
                expected: game,
            });
        }
        Ok(room)
    }

    pub(crate) fn publish(&self, room_id: RoomId, event: TableEvent) {
        self.notifier.publish(room_id, event);
    }

    pub(crate) fn schedule(&self, job: ScheduledJob, delay: Duration) {
        self.scheduler.schedule(job, delay);
    }

    pub(crate) fn set_room_status(
        &self,
        room_id: RoomId,
        status: RoomStatus,
    ) -> Result<(), TableError> {
        let room = self.participants.room(room_id)?;
        if room.status == status {
            return Ok(());
        }
        self.participants.set_status(room_id, status)?;
        tracing::info!(room_id, status = ?status, "room status changed");
        self.publish(room_id, TableEvent::RoomStatusChanged { status });
        Ok(())
    }

    /// Seated players with stacks re-read from their seat wallets.
    pub(crate) fn refresh_stacks(&self, room_id: RoomId) -> Result<Vec<SeatedPlayer>, TableError> {
        let mut seated = self.participants.get_seated_players(room_id)?;
        for p in &mut seated {
            let balance = self.ledger.balance(p.wallet)?;
            if balance != p.stack {
                self.participants
                    .update_player_stack(room_id, p.user_id, balance)?;
                p.stack = balance;
            }
        }
        Ok(seated)
    }

    pub(crate) fn record_hand(&self, record: &HandRecord) {
        let mut logger = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = logger.write(record) {
            tracing::error!(
                room_id = record.room_id,
                hand_id = %record.hand_id,
                error = %e,
                "failed to write hand history"
            );
        }
    }
}

/// A running card room: the room, its event bus, the job dispatcher and
/// the state sweeper.
pub struct CardRoomHandle {
    pub room: Arc<CardRoom>,
    pub events: EventBus,
    dispatcher: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl CardRoomHandle {
    pub fn shutdown(self) {
        self.dispatcher.abort();
        self.sweeper.abort();
    }
}

/// Builds an in-memory card room wired to tokio timers and spawns the job
/// dispatcher and the state sweeper.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn start(settings: TableSettings) -> Result<CardRoomHandle, TableError> {
    let runtime = Handle::current();
    let events = EventBus::new();
    let sweep_every = settings.state_sweep_interval();
    let (scheduler, jobs) = TokioScheduler::new(runtime.clone());
    let room = Arc::new(CardRoom::new(
        settings,
        Arc::new(events.clone()),
        Arc::new(scheduler),
    )?);
    let dispatcher = runtime.spawn(run_jobs(Arc::clone(&room), jobs));
    let sweeper = runtime.spawn(sweep_state(room.store(), sweep_every));
    tracing::info!(sweep_secs = sweep_every.as_secs(), "card room started");
    Ok(CardRoomHandle {
        room,
        events,
        dispatcher,
        sweeper,
    })
}

/// Frees expired hands and idle room locks every `every`.
pub async fn sweep_state(store: Arc<GameStateStore>, every: Duration) {
    let mut ticks = tokio::time::interval(every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes at once
    ticks.tick().await;
    loop {
        ticks.tick().await;
        if let Err(e) = store.sweep() {
            tracing::warn!(error = %e, "state sweep failed");
        }
    }
}

/// Runs jobs as they arrive until every scheduler handle is dropped.
///
/// Room locks are blocking, so each job runs on the blocking pool. Jobs for
/// the same room serialize on its lock.
pub async fn run_jobs(room: Arc<CardRoom>, mut jobs: JobReceiver) {
    while let Some(job) = jobs.recv().await {
        let room = Arc::clone(&room);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = room.run_job(&job) {
                tracing::warn!(
                    room_id = job.room_id(),
                    code = e.error_code(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "scheduled job failed"
                );
            }
        });
    }
    tracing::debug!("job dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    #[test]
    fn seeded_shuffler_advances_its_seed() {
        let shuffler = SeededShuffler::new(7);
        let a = shuffler.deck(Variant::Blot);
        let b = shuffler.deck(Variant::Blot);
        assert_ne!(a, b);
        assert_eq!(a, Deck::new_with_seed(Variant::Blot, 7));
        assert_eq!(b, Deck::new_with_seed(Variant::Blot, 8));
    }

    #[test]
    fn rejects_invalid_settings() {
        let settings = TableSettings {
            max_seats: 1,
            ..Default::default()
        };
        let result = CardRoom::new(
            settings,
            Arc::new(EventBus::new()),
            Arc::new(ManualScheduler::new()),
        );
        assert!(matches!(result, Err(TableError::Settings(_))));
    }

    #[test]
    fn history_file_is_opened_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history").join("hands.jsonl");
        let settings = TableSettings {
            history_path: Some(path.clone()),
            ..Default::default()
        };
        let room = CardRoom::new(
            settings,
            Arc::new(EventBus::new()),
            Arc::new(ManualScheduler::new()),
        )
        .unwrap();
        assert!(path.exists());
        assert!(room.hand_history().is_empty());
    }

    #[test]
    fn updated_ttl_applies_to_later_writes() {
        let room = CardRoom::new(
            TableSettings::default(),
            Arc::new(EventBus::new()),
            Arc::new(ManualScheduler::new()),
        )
        .unwrap();
        let updated = room
            .update_settings(TableSettings {
                state_ttl_secs: 5,
                big_blind: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.big_blind, 20);
        assert_eq!(room.store().ttl(), Duration::from_secs(5));

        let invalid = TableSettings {
            state_ttl_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            room.update_settings(invalid),
            Err(TableError::Settings(_))
        ));
        assert_eq!(room.store().ttl(), Duration::from_secs(5));
        assert_eq!(room.settings_store().get().unwrap().big_blind, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_frees_abandoned_state() {
        let store = Arc::new(GameStateStore::in_memory(Duration::from_secs(60)));
        store
            .put_with_ttl(StateKey::BlotHand(5), &1u32, Duration::ZERO)
            .unwrap();
        store.with_room_lock(5, || ());
        assert_eq!(store.room_lock_count(), 1);

        let sweeper = tokio::spawn(sweep_state(Arc::clone(&store), Duration::from_secs(30)));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.room_lock_count(), 0);
        assert_eq!(store.sweep().unwrap().purged, 0);
        sweeper.abort();
    }

    #[tokio::test]
    async fn start_wires_dispatcher() {
        let handle = start(TableSettings::default()).unwrap();
        handle.room.create_room(1, GameKind::Poker).unwrap();
        handle.room.run_job(&ScheduledJob::StartPokerHand { room_id: 1 }).unwrap();
        assert!(handle.room.poker_state(1).unwrap().is_none());
        handle.shutdown();
    }
}
