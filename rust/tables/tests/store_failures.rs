use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cardroom_engine::history::GameKind;
use cardroom_engine::rules::PokerAction;
use cardroom_tables::ledger::AtomicWork;
use cardroom_tables::{
    CardRoom, EntryKind, ErrorCategory, ErrorSeverity, EventBus, GameStateStore, InMemoryKeyValueStore,
    InMemoryParticipants, InMemoryWalletStore, IntoErrorResponse, KeyValueStore, LedgerEntry,
    LedgerError, LedgerGateway, ManualScheduler, ScheduledJob, SeededShuffler, SettingsStore,
    StoreError, TableError, TableSettings, TestLogSubscriber, WalletId, WalletStore,
};
use cardroom_tables::{init_test_logging, run_jobs};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

const ROOM: u64 = 3;

/// Reads always work; writes fail while `failing` is on, deletes also
/// while `deletes_failing` is.
#[derive(Default)]
struct FlakyKeyValueStore {
    inner: InMemoryKeyValueStore,
    failing: AtomicBool,
    deletes_failing: AtomicBool,
}

impl KeyValueStore for FlakyKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if self.failing.load(Ordering::SeqCst) || self.deletes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.delete(key)
    }
}

/// Refuses every transfer while the switch is on.
#[derive(Default)]
struct FlakyWallets {
    inner: InMemoryWalletStore,
    failing: AtomicBool,
}

impl WalletStore for FlakyWallets {
    fn atomically(
        &self,
        wallets: &[WalletId],
        work: &mut AtomicWork<'_>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable);
        }
        self.inner.atomically(wallets, work)
    }

    fn balance(&self, wallet: WalletId) -> Result<u64, LedgerError> {
        self.inner.balance(wallet)
    }

    fn open_wallet(&self, wallet: WalletId, initial: u64) -> Result<(), LedgerError> {
        self.inner.open_wallet(wallet, initial)
    }

    fn create_wallet(&self) -> Result<WalletId, LedgerError> {
        self.inner.create_wallet()
    }

    fn entries_for(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.entries_for(wallet)
    }
}

struct Harness {
    room: CardRoom,
    scheduler: Arc<ManualScheduler>,
    kv: Arc<FlakyKeyValueStore>,
    wallets: Arc<FlakyWallets>,
}

fn heads_up() -> Harness {
    let settings = TableSettings {
        stage_advance_delay_ms: 0,
        ..Default::default()
    };
    let kv = Arc::new(FlakyKeyValueStore::default());
    let wallets = Arc::new(FlakyWallets::default());
    let scheduler = Arc::new(ManualScheduler::new());
    let room = CardRoom::with_dependencies(
        Arc::new(SettingsStore::with_settings(settings.clone()).unwrap()),
        Arc::new(GameStateStore::new(kv.clone(), settings.state_ttl())),
        Arc::new(LedgerGateway::new(wallets.clone())),
        Arc::new(InMemoryParticipants::new()),
        Arc::new(EventBus::new()),
        scheduler.clone(),
        Arc::new(SeededShuffler::new(5)),
    );
    for user in 1..=2 {
        room.ledger().open_wallet(user, 1_000).unwrap();
    }
    room.create_room(ROOM, GameKind::Poker).unwrap();
    room.take_seat(ROOM, 1, 1, 0, 200).unwrap();
    room.take_seat(ROOM, 2, 2, 1, 200).unwrap();
    Harness {
        room,
        scheduler,
        kv,
        wallets,
    }
}

impl Harness {
    fn seat_balance(&self, user: u64) -> u64 {
        let wallet = self
            .room
            .participants()
            .get_seated_players(ROOM)
            .unwrap()
            .into_iter()
            .find(|p| p.user_id == user)
            .unwrap()
            .wallet;
        self.room.ledger().balance(wallet).unwrap()
    }
}

#[test]
fn failed_write_keeps_previous_state_and_is_retryable() {
    let h = heads_up();
    for job in h.scheduler.take_jobs() {
        h.room.run_job(&job).unwrap();
    }
    let before = h.room.poker_state(ROOM).unwrap().unwrap();
    let actor = before.current_actor.unwrap();

    h.kv.failing.store(true, Ordering::SeqCst);
    let err = h
        .room
        .poker_action(ROOM, actor, PokerAction::Call)
        .unwrap_err();
    assert!(matches!(err, TableError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.category(), ErrorCategory::Infrastructure);
    assert!(err.is_retryable());
    assert_eq!(err.severity(), ErrorSeverity::Server);
    assert_eq!(err.to_error_response().error, "state_store_error");
    assert_eq!(h.room.poker_state(ROOM).unwrap().unwrap(), before);

    // the same action goes through once the store is back
    h.kv.failing.store(false, Ordering::SeqCst);
    h.room.poker_action(ROOM, actor, PokerAction::Call).unwrap();
    assert_ne!(h.room.poker_state(ROOM).unwrap().unwrap(), before);
}

#[test]
fn refused_blinds_leave_no_hand() {
    let h = heads_up();
    let jobs = h.scheduler.take_jobs();
    assert_eq!(jobs, vec![ScheduledJob::StartPokerHand { room_id: ROOM }]);

    h.wallets.failing.store(true, Ordering::SeqCst);
    let err = h.room.run_job(&jobs[0]).unwrap_err();
    assert!(matches!(err, TableError::Ledger(LedgerError::Unavailable)));
    assert!(h.room.poker_state(ROOM).unwrap().is_none());
    assert!(h.room.poker_meta(ROOM).unwrap().is_none());
    assert_eq!(h.seat_balance(1), 200);
    assert_eq!(h.seat_balance(2), 200);

    h.wallets.failing.store(false, Ordering::SeqCst);
    h.room.start_poker_hand(ROOM).unwrap();
    assert!(h.room.poker_state(ROOM).unwrap().is_some());
    assert_eq!(h.seat_balance(1) + h.seat_balance(2), 385);
}

#[test]
fn failed_settlement_is_resumed() {
    let h = heads_up();
    for job in h.scheduler.take_jobs() {
        h.room.run_job(&job).unwrap();
    }
    // heads-up the dealer (user 1) posts 5 and acts first
    h.wallets.failing.store(true, Ordering::SeqCst);
    let err = h
        .room
        .poker_action(ROOM, 1, PokerAction::Fold)
        .unwrap_err();
    assert!(err.is_retryable());

    let stuck = h.room.poker_state(ROOM).unwrap().expect("hand kept");
    assert!(stuck.player(1).unwrap().has_folded);
    assert_eq!(h.seat_balance(1), 195);
    assert_eq!(h.seat_balance(2), 190);
    assert!(h.room.hand_history().is_empty());
    assert!(matches!(
        h.room.vacate_seat(ROOM, 2).unwrap_err(),
        TableError::HandInProgress(ROOM)
    ));

    h.wallets.failing.store(false, Ordering::SeqCst);
    h.room.resume_poker_hand(ROOM).unwrap();
    assert!(h.room.poker_state(ROOM).unwrap().is_none());
    assert_eq!(h.seat_balance(1), 195);
    assert_eq!(h.seat_balance(2), 205);
    assert_eq!(h.room.hand_history().len(), 1);
    assert_eq!(
        h.scheduler.take_jobs(),
        vec![ScheduledJob::StartPokerHand { room_id: ROOM }]
    );
}

#[test]
fn committed_settlement_is_not_paid_again_on_resume() {
    let h = heads_up();
    for job in h.scheduler.take_jobs() {
        h.room.run_job(&job).unwrap();
    }
    h.kv.deletes_failing.store(true, Ordering::SeqCst);
    let err = h
        .room
        .poker_action(ROOM, 1, PokerAction::Fold)
        .unwrap_err();
    assert!(matches!(err, TableError::Store(StoreError::Unavailable(_))));
    assert!(err.is_retryable());

    // paid, but the hand could not be torn down
    assert_eq!(h.seat_balance(1), 195);
    assert_eq!(h.seat_balance(2), 205);
    assert!(h.room.poker_state(ROOM).unwrap().is_some());
    assert!(h.room.hand_history().is_empty());
    assert!(matches!(
        h.room.vacate_seat(ROOM, 2).unwrap_err(),
        TableError::HandInProgress(ROOM)
    ));

    h.kv.deletes_failing.store(false, Ordering::SeqCst);
    h.room.resume_poker_hand(ROOM).unwrap();
    assert!(h.room.poker_state(ROOM).unwrap().is_none());
    assert_eq!(h.seat_balance(1), 195);
    assert_eq!(h.seat_balance(2), 205);
    assert_eq!(h.room.hand_history().len(), 1);

    let pot = h.room.participants().room(ROOM).unwrap().pot_wallet;
    assert_eq!(h.room.ledger().balance(pot).unwrap(), 0);
    let payouts = h
        .room
        .ledger()
        .entries_for(pot)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EntryKind::Payout)
        .count();
    assert_eq!(payouts, 1);
    assert_eq!(
        h.scheduler.take_jobs(),
        vec![ScheduledJob::StartPokerHand { room_id: ROOM }]
    );
    assert_eq!(h.room.vacate_seat(ROOM, 2).unwrap(), 205);
}

#[test]
fn error_responses_are_logged_by_severity() {
    let subscriber = TestLogSubscriber::new();
    let registry = Registry::default().with(subscriber.clone().into_layer());
    let h = heads_up();

    tracing::subscriber::with_default(registry, || {
        let missing = h
            .room
            .poker_action(99, 1, PokerAction::Fold)
            .unwrap_err();
        let response = missing.log_and_respond();
        assert_eq!(response.error, "room_not_found");
        assert_eq!(missing.category(), ErrorCategory::Sequencing);

        h.wallets.failing.store(true, Ordering::SeqCst);
        let down = h.room.start_poker_hand(ROOM).unwrap_err();
        let response = down.log_and_respond();
        assert_eq!(response.error, "ledger_unavailable");
    });

    let entries = subscriber.entries();
    assert!(entries
        .iter()
        .any(|e| e.level == Level::INFO && e.message.contains("request rejected")));
    assert!(entries
        .iter()
        .any(|e| e.level == Level::ERROR && e.message.contains("table operation failed")));
    assert!(!subscriber
        .entries_with_field("error", "ledger_unavailable")
        .is_empty());
    // the ledger line has no room of its own; it inherits the room span
    assert!(subscriber
        .entries_for_room(ROOM)
        .iter()
        .any(|e| e.level == Level::WARN && e.message.contains("ledger transfer rejected")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_logs_failed_jobs_and_keeps_running() {
    let logs = init_test_logging();
    let h = heads_up();
    let jobs = h.scheduler.take_jobs();
    h.wallets.failing.store(true, Ordering::SeqCst);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    for job in jobs {
        tx.send(job).unwrap();
    }
    drop(tx);
    let room = Arc::new(h.room);
    run_jobs(Arc::clone(&room), rx).await;

    let mut logged = Vec::new();
    for _ in 0..100 {
        logged = logs
            .entries()
            .into_iter()
            .filter(|e| e.level == Level::WARN && e.message.contains("scheduled job failed"))
            .collect();
        if !logged.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(logged.len(), 1);
    assert!(logged[0]
        .fields
        .iter()
        .any(|(k, v)| k == "retryable" && v == "true"));
    assert!(room.poker_state(ROOM).unwrap().is_none());
}
