//! Money movement between wallets.
//!
//! Every transfer or batch runs inside one [`WalletStore::atomically`] call:
//! the involved wallets are locked in ascending id order, changes are staged
//! and either all balance updates and journal entries commit or none do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use thiserror::Error;
use uuid::Uuid;

use cardroom_engine::player::Chips;

pub type WalletId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    BuyIn,
    CashOut,
    Blind,
    Bet,
    Payout,
}

/// One side of a transfer. Never mutated once journaled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: u64,
    pub transfer_id: Uuid,
    pub wallet_id: WalletId,
    pub amount: i64,
    pub kind: EntryKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An entry staged inside an atomic section, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub transfer_id: Uuid,
    pub wallet_id: WalletId,
    pub amount: i64,
    pub kind: EntryKind,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// None when chips enter from outside the ledger.
    pub from: Option<WalletId>,
    /// None when chips leave the ledger.
    pub to: Option<WalletId>,
    pub amount: Chips,
    pub kind: EntryKind,
    pub description: String,
}

impl TransferRequest {
    pub fn new(
        from: WalletId,
        to: WalletId,
        amount: Chips,
        kind: EntryKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            amount,
            kind,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transfer_id: Uuid,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Wallet {wallet} holds {balance}, cannot debit {requested}")]
    InsufficientFunds {
        wallet: WalletId,
        balance: Chips,
        requested: Chips,
    },
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),
    #[error("Wallet already exists: {0}")]
    WalletExists(WalletId),
    #[error("Transfer amount must be positive and move between two distinct endpoints")]
    InvalidAmount,
    #[error("Ledger unavailable")]
    Unavailable,
}

/// Balance access inside an atomic section. Only wallets named when the
/// section was opened are reachable.
pub trait WalletSession {
    fn locked_find(&mut self, wallet: WalletId) -> Result<Chips, LedgerError>;
    fn decrement(&mut self, wallet: WalletId, amount: Chips) -> Result<(), LedgerError>;
    fn increment(&mut self, wallet: WalletId, amount: Chips) -> Result<(), LedgerError>;
    fn record_transaction(&mut self, entry: NewEntry) -> Result<(), LedgerError>;
}

pub type AtomicWork<'a> = dyn FnMut(&mut dyn WalletSession) -> Result<(), LedgerError> + 'a;

pub trait WalletStore: Send + Sync {
    /// Locks `wallets` in ascending id order, runs `work` and commits its
    /// staged changes only when it returns `Ok`.
    fn atomically(
        &self,
        wallets: &[WalletId],
        work: &mut AtomicWork<'_>,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;
    fn balance(&self, wallet: WalletId) -> Result<Chips, LedgerError>;
    fn open_wallet(&self, wallet: WalletId, initial: Chips) -> Result<(), LedgerError>;
    /// Opens an empty wallet under a fresh id.
    fn create_wallet(&self) -> Result<WalletId, LedgerError>;
    fn entries_for(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>, LedgerError>;
}

#[derive(Debug, Default)]
pub struct InMemoryWalletStore {
    wallets: RwLock<BTreeMap<WalletId, Arc<Mutex<Chips>>>>,
    journal: Mutex<Vec<LedgerEntry>>,
    next_entry: AtomicU64,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every wallet balance.
    pub fn total_balance(&self) -> Result<Chips, LedgerError> {
        let ids: Vec<WalletId> = {
            let guard = self.wallets.read().map_err(|_| LedgerError::Unavailable)?;
            guard.keys().copied().collect()
        };
        ids.into_iter().map(|id| self.balance(id)).sum()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.lock().map(|j| j.len()).unwrap_or(0)
    }
}

struct StagedSession<'a> {
    balances: BTreeMap<WalletId, Chips>,
    entries: Vec<NewEntry>,
    _locks: &'a [MutexGuard<'a, Chips>],
}

impl WalletSession for StagedSession<'_> {
    fn locked_find(&mut self, wallet: WalletId) -> Result<Chips, LedgerError> {
        self.balances
            .get(&wallet)
            .copied()
            .ok_or(LedgerError::WalletNotFound(wallet))
    }

    fn decrement(&mut self, wallet: WalletId, amount: Chips) -> Result<(), LedgerError> {
        let balance = self
            .balances
            .get_mut(&wallet)
            .ok_or(LedgerError::WalletNotFound(wallet))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                wallet,
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    fn increment(&mut self, wallet: WalletId, amount: Chips) -> Result<(), LedgerError> {
        let balance = self
            .balances
            .get_mut(&wallet)
            .ok_or(LedgerError::WalletNotFound(wallet))?;
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;
        Ok(())
    }

    fn record_transaction(&mut self, entry: NewEntry) -> Result<(), LedgerError> {
        if !self.balances.contains_key(&entry.wallet_id) {
            return Err(LedgerError::WalletNotFound(entry.wallet_id));
        }
        self.entries.push(entry);
        Ok(())
    }
}

impl WalletStore for InMemoryWalletStore {
    fn atomically(
        &self,
        wallets: &[WalletId],
        work: &mut AtomicWork<'_>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut ids = wallets.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let cells: Vec<Arc<Mutex<Chips>>> = {
            let guard = self.wallets.read().map_err(|_| LedgerError::Unavailable)?;
            ids.iter()
                .map(|id| {
                    guard
                        .get(id)
                        .cloned()
                        .ok_or(LedgerError::WalletNotFound(*id))
                })
                .collect::<Result<_, _>>()?
        };

        // ascending id order, so two sections can never wait on each other
        let mut guards = Vec::with_capacity(cells.len());
        for cell in &cells {
            guards.push(cell.lock().map_err(|_| LedgerError::Unavailable)?);
        }

        let (balances, staged) = {
            let mut session = StagedSession {
                balances: ids.iter().copied().zip(guards.iter().map(|g| **g)).collect(),
                entries: Vec::new(),
                _locks: &guards,
            };
            work(&mut session)?;
            (session.balances, session.entries)
        };

        let mut journal = self.journal.lock().map_err(|_| LedgerError::Unavailable)?;
        for (guard, id) in guards.iter_mut().zip(&ids) {
            if let Some(&balance) = balances.get(id) {
                **guard = balance;
            }
        }
        let now = Utc::now();
        let written: Vec<LedgerEntry> = staged
            .into_iter()
            .map(|e| LedgerEntry {
                entry_id: self.next_entry.fetch_add(1, Ordering::Relaxed) + 1,
                transfer_id: e.transfer_id,
                wallet_id: e.wallet_id,
                amount: e.amount,
                kind: e.kind,
                description: e.description,
                created_at: now,
            })
            .collect();
        journal.extend(written.iter().cloned());
        Ok(written)
    }

    fn balance(&self, wallet: WalletId) -> Result<Chips, LedgerError> {
        let cell = {
            let guard = self.wallets.read().map_err(|_| LedgerError::Unavailable)?;
            guard
                .get(&wallet)
                .cloned()
                .ok_or(LedgerError::WalletNotFound(wallet))?
        };
        let balance = cell.lock().map_err(|_| LedgerError::Unavailable)?;
        Ok(*balance)
    }

    fn open_wallet(&self, wallet: WalletId, initial: Chips) -> Result<(), LedgerError> {
        let mut guard = self.wallets.write().map_err(|_| LedgerError::Unavailable)?;
        if guard.contains_key(&wallet) {
            return Err(LedgerError::WalletExists(wallet));
        }
        guard.insert(wallet, Arc::new(Mutex::new(initial)));
        Ok(())
    }

    fn create_wallet(&self) -> Result<WalletId, LedgerError> {
        let mut guard = self.wallets.write().map_err(|_| LedgerError::Unavailable)?;
        let id = guard.keys().next_back().map_or(1, |last| last + 1);
        guard.insert(id, Arc::new(Mutex::new(0)));
        Ok(id)
    }

    fn entries_for(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let journal = self.journal.lock().map_err(|_| LedgerError::Unavailable)?;
        Ok(journal
            .iter()
            .filter(|e| e.wallet_id == wallet)
            .cloned()
            .collect())
    }
}

/// Validates transfers and runs them through a [`WalletStore`].
#[derive(Clone)]
pub struct LedgerGateway {
    store: Arc<dyn WalletStore>,
}

impl fmt::Debug for LedgerGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerGateway").finish_non_exhaustive()
    }
}

impl LedgerGateway {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWalletStore::new()))
    }

    pub fn transfer(&self, request: TransferRequest) -> Result<Receipt, LedgerError> {
        self.transfer_batch(std::slice::from_ref(&request))
    }

    /// Applies every request or none of them.
    pub fn transfer_batch(&self, requests: &[TransferRequest]) -> Result<Receipt, LedgerError> {
        self.transfer_batch_as(Uuid::new_v4(), requests)
    }

    /// Like [`transfer_batch`](Self::transfer_batch), journaled under a
    /// caller-chosen id so a retry can check [`has_transfer`](Self::has_transfer)
    /// first.
    pub fn transfer_batch_as(
        &self,
        transfer_id: Uuid,
        requests: &[TransferRequest],
    ) -> Result<Receipt, LedgerError> {
        for r in requests {
            let no_endpoint = r.from.is_none() && r.to.is_none();
            if r.amount == 0 || r.amount > i64::MAX as Chips || no_endpoint || r.from == r.to {
                return Err(LedgerError::InvalidAmount);
            }
        }
        let wallets: Vec<WalletId> = requests
            .iter()
            .flat_map(|r| r.from.into_iter().chain(r.to))
            .collect();

        let result = self.store.atomically(&wallets, &mut |session| {
            for r in requests {
                let signed = r.amount as i64;
                if let Some(from) = r.from {
                    session.decrement(from, r.amount)?;
                    session.record_transaction(NewEntry {
                        transfer_id,
                        wallet_id: from,
                        amount: -signed,
                        kind: r.kind,
                        description: r.description.clone(),
                    })?;
                }
                if let Some(to) = r.to {
                    session.increment(to, r.amount)?;
                    session.record_transaction(NewEntry {
                        transfer_id,
                        wallet_id: to,
                        amount: signed,
                        kind: r.kind,
                        description: r.description.clone(),
                    })?;
                }
            }
            Ok(())
        });

        match result {
            Ok(entries) => {
                tracing::debug!(
                    transfer_id = %transfer_id,
                    requests = requests.len(),
                    entries = entries.len(),
                    "ledger transfer committed"
                );
                Ok(Receipt {
                    transfer_id,
                    entries,
                })
            }
            Err(e) => {
                tracing::warn!(transfer_id = %transfer_id, error = %e, "ledger transfer rejected");
                Err(e)
            }
        }
    }

    pub fn balance(&self, wallet: WalletId) -> Result<Chips, LedgerError> {
        self.store.balance(wallet)
    }

    pub fn open_wallet(&self, wallet: WalletId, initial: Chips) -> Result<(), LedgerError> {
        self.store.open_wallet(wallet, initial)?;
        tracing::info!(wallet_id = wallet, amount = initial, "wallet opened");
        Ok(())
    }

    pub fn create_wallet(&self) -> Result<WalletId, LedgerError> {
        self.store.create_wallet()
    }

    pub fn entries_for(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.entries_for(wallet)
    }

    /// Whether `wallet`'s journal holds an entry of `transfer_id`.
    pub fn has_transfer(&self, wallet: WalletId, transfer_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .entries_for(wallet)?
            .iter()
            .any(|e| e.transfer_id == transfer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_with(wallets: &[(WalletId, Chips)]) -> LedgerGateway {
        let ledger = LedgerGateway::in_memory();
        for &(id, initial) in wallets {
            ledger.open_wallet(id, initial).unwrap();
        }
        ledger
    }

    #[test]
    fn transfer_moves_funds_and_journals_both_sides() {
        let ledger = gateway_with(&[(1, 100), (2, 0)]);
        let receipt = ledger
            .transfer(TransferRequest::new(1, 2, 40, EntryKind::BuyIn, "buy-in"))
            .unwrap();
        assert_eq!(ledger.balance(1).unwrap(), 60);
        assert_eq!(ledger.balance(2).unwrap(), 40);
        assert_eq!(receipt.entries.len(), 2);
        assert_eq!(receipt.entries[0].amount, -40);
        assert_eq!(receipt.entries[1].amount, 40);
        assert!(receipt
            .entries
            .iter()
            .all(|e| e.transfer_id == receipt.transfer_id));
        assert_eq!(ledger.entries_for(2).unwrap().len(), 1);
    }

    #[test]
    fn insufficient_funds_rejects_before_any_change() {
        let ledger = gateway_with(&[(1, 10), (2, 0)]);
        let err = ledger
            .transfer(TransferRequest::new(1, 2, 11, EntryKind::Bet, "bet"))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                wallet: 1,
                balance: 10,
                requested: 11
            }
        );
        assert_eq!(ledger.balance(1).unwrap(), 10);
        assert!(ledger.entries_for(1).unwrap().is_empty());
    }

    #[test]
    fn failing_batch_commits_nothing() {
        let ledger = gateway_with(&[(1, 50), (2, 50), (3, 0)]);
        let err = ledger
            .transfer_batch(&[
                TransferRequest::new(1, 3, 50, EntryKind::Blind, "sb"),
                TransferRequest::new(2, 3, 60, EntryKind::Blind, "bb"),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { wallet: 2, .. }));
        assert_eq!(ledger.balance(1).unwrap(), 50);
        assert_eq!(ledger.balance(3).unwrap(), 0);
        assert!(ledger.entries_for(1).unwrap().is_empty());
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let ledger = gateway_with(&[(1, 50)]);
        for req in [
            TransferRequest::new(1, 1, 5, EntryKind::Bet, "self"),
            TransferRequest::new(1, 2, 0, EntryKind::Bet, "zero"),
            TransferRequest {
                from: None,
                to: None,
                amount: 5,
                kind: EntryKind::Bet,
                description: "nowhere".into(),
            },
        ] {
            assert_eq!(ledger.transfer(req), Err(LedgerError::InvalidAmount));
        }
        assert_eq!(
            ledger.transfer(TransferRequest::new(1, 9, 5, EntryKind::Bet, "missing")),
            Err(LedgerError::WalletNotFound(9))
        );
    }

    #[test]
    fn keyed_batch_is_found_in_the_journal() {
        let ledger = gateway_with(&[(1, 100), (2, 0)]);
        let id = Uuid::new_v4();
        assert!(!ledger.has_transfer(2, id).unwrap());

        let receipt = ledger
            .transfer_batch_as(id, &[TransferRequest::new(1, 2, 30, EntryKind::Payout, "p")])
            .unwrap();
        assert_eq!(receipt.transfer_id, id);
        assert!(ledger.has_transfer(1, id).unwrap());
        assert!(ledger.has_transfer(2, id).unwrap());
        assert!(!ledger.has_transfer(2, Uuid::new_v4()).unwrap());
    }

    #[test]
    fn journal_entries_serialize_with_ids_and_timestamps() {
        let ledger = gateway_with(&[(1, 50), (2, 0)]);
        let receipt = ledger
            .transfer(TransferRequest::new(1, 2, 20, EntryKind::Blind, "big blind"))
            .unwrap();
        let entry = receipt.entries[0].clone();

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["transfer_id"], receipt.transfer_id.to_string());
        assert_eq!(json["kind"], "blind");
        assert!(json["created_at"].is_string());
        let back: LedgerEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn created_wallets_get_fresh_ids() {
        let ledger = gateway_with(&[(10, 0)]);
        assert_eq!(ledger.create_wallet().unwrap(), 11);
        assert_eq!(ledger.create_wallet().unwrap(), 12);
        assert_eq!(
            ledger.open_wallet(10, 5),
            Err(LedgerError::WalletExists(10))
        );
    }
}
