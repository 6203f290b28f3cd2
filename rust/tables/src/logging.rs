//! Log setup for table processes and log capture for tests.
//!
//! Table operations run inside a `room` span (see
//! [`GameStateStore::with_room_lock`](crate::store::GameStateStore::with_room_lock)),
//! so ledger and store lines logged during an operation carry the room id.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use cardroom_engine::RoomId;

use crate::settings::TableSettings;

/// Installs the global subscriber for a table process. `RUST_LOG` wins over
/// [`TableSettings::log_filter`]; `log_json` switches to one JSON object
/// per line.
pub fn init_logging(settings: &TableSettings) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if settings.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// One captured event, with the fields of its enclosing spans appended
/// after its own.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The room the event was logged for, directly or through its span.
    pub fn room_id(&self) -> Option<RoomId> {
        self.field("room_id")?.parse().ok()
    }
}

/// Collects events so tests can assert on what the tables logged.
#[derive(Debug, Clone, Default)]
pub struct TestLogSubscriber {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries carrying `field` with a value containing `needle`.
    pub fn entries_with_field(&self, field: &str, needle: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.fields.iter().any(|(k, v)| k == field && v.contains(needle)))
            .collect()
    }

    pub fn entries_for_room(&self, room_id: RoomId) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.room_id() == Some(room_id))
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn into_layer(self) -> CaptureLayer {
        CaptureLayer { sink: self }
    }
}

/// The [`Layer`] side of a [`TestLogSubscriber`].
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    sink: TestLogSubscriber,
}

struct SpanFields(Vec<(String, String)>);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(SpanFields(fields.values));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(SpanFields(inherited)) = span.extensions().get::<SpanFields>() {
                    fields.values.extend(inherited.iter().cloned());
                }
            }
        }

        let metadata = event.metadata();
        let entry = LogEntry {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: fields.message.unwrap_or_default(),
            fields: fields.values,
        };
        self.sink
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[derive(Default)]
struct Fields {
    message: Option<String>,
    values: Vec<(String, String)>,
}

impl Fields {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.values.push((field.name().to_string(), value));
        }
    }
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}

/// Installs a process-wide capturing subscriber once and returns it cleared.
pub fn init_test_logging() -> TestLogSubscriber {
    static SUBSCRIBER: OnceLock<TestLogSubscriber> = OnceLock::new();

    let mut fresh = false;
    let subscriber = SUBSCRIBER.get_or_init(|| {
        fresh = true;
        TestLogSubscriber::new()
    });
    if fresh {
        let registry = Registry::default().with(subscriber.clone().into_layer());
        if let Err(e) = tracing::subscriber::set_global_default(registry) {
            tracing::debug!(error = %e, "another global subscriber is installed, logs not captured");
        }
    }

    subscriber.clear();
    subscriber.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, info_span, warn};

    fn capture(f: impl FnOnce()) -> TestLogSubscriber {
        let logs = TestLogSubscriber::new();
        let registry = Registry::default().with(logs.clone().into_layer());
        tracing::subscriber::with_default(registry, f);
        logs
    }

    #[test]
    fn captures_levels_messages_and_fields() {
        let logs = capture(|| {
            debug!(wallet_id = 3u64, "wallet opened");
            warn!(room_id = 42u64, code = "ledger_unavailable", "scheduled job failed");
        });

        let entries = logs.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::DEBUG);
        assert_eq!(entries[0].message, "wallet opened");
        assert_eq!(entries[0].room_id(), None);
        assert_eq!(entries[1].level, Level::WARN);
        assert_eq!(entries[1].room_id(), Some(42));
        assert_eq!(entries[1].field("code"), Some("ledger_unavailable"));
        assert_eq!(logs.entries_with_field("code", "ledger").len(), 1);
    }

    #[test]
    fn events_inherit_the_room_span() {
        let logs = capture(|| {
            info_span!("room", room_id = 7u64).in_scope(|| {
                info!(transfer_id = "t-1", "ledger transfer committed");
            });
            info!("outside any room");
        });

        let in_room = logs.entries_for_room(7);
        assert_eq!(in_room.len(), 1);
        assert_eq!(in_room[0].message, "ledger transfer committed");
        assert_eq!(in_room[0].field("transfer_id"), Some("t-1"));
        assert_eq!(logs.entries().len(), 2);
    }

    #[test]
    fn clear_forgets_entries() {
        let logs = capture(|| info!("first"));
        assert_eq!(logs.entries().len(), 1);
        logs.clear();
        assert!(logs.entries().is_empty());
    }
}
