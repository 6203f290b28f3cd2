//! Table runtime for the cardroom engine.
//!
//! [`CardRoom`] owns everything a live table needs beyond the game rules:
//! the state store with its per-room lock, the ledger, seating, scheduled
//! jobs and outbound events. Use [`start`] inside a tokio runtime for a
//! fully wired in-memory room, or [`CardRoom::with_dependencies`] to plug in
//! other backends.

pub mod blot_table;
pub mod context;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lobby;
pub mod logging;
pub mod participants;
pub mod poker_table;
pub mod scheduler;
pub mod settings;
pub mod store;

pub use context::{
    run_jobs, start, sweep_state, CardRoom, CardRoomHandle, OsShuffler, PokerRoomMeta,
    SeededShuffler, SettlementKey, Shuffler,
};
pub use errors::{ErrorCategory, ErrorResponse, ErrorSeverity, IntoErrorResponse, TableError};
pub use events::{EventBus, EventNotifier, EventSubscription, TableEvent};
pub use ledger::{
    EntryKind, InMemoryWalletStore, LedgerEntry, LedgerError, LedgerGateway, Receipt,
    TransferRequest, WalletId, WalletSession, WalletStore,
};
pub use logging::{init_logging, init_test_logging, CaptureLayer, LogEntry, TestLogSubscriber};
pub use participants::{
    InMemoryParticipants, ParticipantError, ParticipantRepository, RoomInfo, RoomStatus,
    SeatedPlayer,
};
pub use scheduler::{ManualScheduler, ScheduledJob, Scheduler, TokioScheduler};
pub use settings::{SettingsError, SettingsStore, TableSettings};
pub use store::{
    GameStateStore, InMemoryKeyValueStore, KeyValueStore, StateKey, StoreError, SweepStats,
};
