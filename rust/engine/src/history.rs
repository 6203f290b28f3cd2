use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::cards::Card;
use crate::player::UserId;
use crate::poker::{Phase, Settlement};
use crate::rules::PokerAction;
use crate::RoomId;

/// A single betting decision and the street it was made on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub user_id: UserId,
    pub phase: Phase,
    pub action: PokerAction,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Poker,
    Blot,
}

/// Summary of a finished hand, one JSON object per line in the history file.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct HandRecord {
    pub hand_id: String,
    pub room_id: RoomId,
    pub game: GameKind,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub board: Vec<Card>,
    pub result: Option<String>,
    /// RFC3339, filled in on write when missing
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    #[serde(default)]
    pub showdown: Option<ShowdownInfo>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ShowdownInfo {
    pub winners: Vec<UserId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HandRecord {
    pub fn from_settlement(settlement: &Settlement) -> Self {
        let state = &settlement.state;
        let total: u64 = settlement.payouts.iter().map(|p| p.amount).sum();
        let winners = settlement.winners();
        let result = match winners.as_slice() {
            [single] => format!("player {single} wins {total}"),
            many => format!("split pot of {total} between {many:?}"),
        };
        let showdown = (!settlement.uncontested).then(|| ShowdownInfo {
            winners: winners.clone(),
            notes: settlement
                .showdown
                .iter()
                .filter(|h| winners.contains(&h.user_id))
                .map(|h| h.strength.category.name())
                .next()
                .map(str::to_string),
        });
        Self {
            hand_id: state.hand_id.clone(),
            room_id: state.room_id,
            game: GameKind::Poker,
            actions: state.actions.clone(),
            board: state.community_cards.clone(),
            result: Some(result),
            ts: None,
            meta: None,
            showdown,
        }
    }
}

/// Appends [`HandRecord`]s as JSON lines.
pub struct HandLogger {
    writer: Option<BufWriter<File>>,
    written: Vec<HandRecord>,
}

impl HandLogger {
    /// Opens `path` for appending, creating parent directories as needed.
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(f)),
            written: Vec::new(),
        })
    }

    /// Keeps records in memory only.
    pub fn in_memory() -> Self {
        Self {
            writer: None,
            written: Vec::new(),
        }
    }

    pub fn write(&mut self, record: &HandRecord) -> std::io::Result<()> {
        let mut rec = record.clone();
        if rec.ts.is_none() {
            rec.ts = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        let line = serde_json::to_string(&rec).map_err(std::io::Error::other)?;
        if let Some(w) = &mut self.writer {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        self.written.push(rec);
        Ok(())
    }

    /// Records written through this logger since it was opened.
    pub fn records(&self) -> &[HandRecord] {
        &self.written
    }
}
