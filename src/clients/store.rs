//! Session-local client roster.
//!
//! Every record lives in exactly one of two lists, chosen by `is_dropped`.
//! All transitions preserve that; the roster never holds an id twice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::clients::{ClientPartition, ClientRecord, ClientRepository};

/// Lowercased alphanumerics separated by single spaces.
pub fn normalize_search_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = true;

    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push(' ');
            prev_sep = true;
        }
    }

    out.trim_end().to_string()
}

fn matches_search(record: &ClientRecord, needle: &str) -> bool {
    let haystacks = [
        record.full_name.as_str(),
        record.email.as_str(),
        record.company_name.as_str(),
        record.account_number.as_str(),
    ];
    haystacks
        .into_iter()
        .chain(record.tags.iter().map(String::as_str))
        .any(|field| normalize_search_text(field).contains(needle))
}

/// Replace the entry with the same id in place, or insert at the head.
fn upsert(list: &mut Vec<ClientRecord>, record: ClientRecord) {
    match list.iter_mut().find(|r| r.id == record.id) {
        Some(slot) => *slot = record,
        None => list.insert(0, record),
    }
}

/// Pure active/dropped state, most recent first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRoster {
    active: Vec<ClientRecord>,
    dropped: Vec<ClientRecord>,
}

impl ClientRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a fresh partition. Records are re-filed by `is_dropped` and
    /// later duplicates of an id are discarded.
    pub fn replace(&mut self, partition: ClientPartition) {
        self.active.clear();
        self.dropped.clear();
        for record in partition.active.into_iter().chain(partition.dropped) {
            if self.get(&record.id).is_some() {
                continue;
            }
            if record.is_dropped {
                self.dropped.push(record);
            } else {
                self.active.push(record);
            }
        }
    }

    /// Insert a record at the head of its partition, replacing any copy.
    pub fn add(&mut self, record: ClientRecord) {
        self.remove(&record.id);
        if record.is_dropped {
            self.dropped.insert(0, record);
        } else {
            self.active.insert(0, record);
        }
    }

    /// Reconcile a record returned by a successful remote update.
    pub fn apply_update(&mut self, record: ClientRecord) {
        let (target, other) = if record.is_dropped {
            (&mut self.dropped, &mut self.active)
        } else {
            (&mut self.active, &mut self.dropped)
        };
        other.retain(|r| r.id != record.id);
        upsert(target, record);
    }

    /// Remove an id from both partitions. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.len();
        self.active.retain(|r| r.id != id);
        self.dropped.retain(|r| r.id != id);
        self.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&ClientRecord> {
        self.active
            .iter()
            .chain(self.dropped.iter())
            .find(|r| r.id == id)
    }

    pub fn active(&self) -> &[ClientRecord] {
        &self.active
    }

    pub fn dropped(&self) -> &[ClientRecord] {
        &self.dropped
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.dropped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records whose name, email, company, account number or a tag contain
    /// `query` after normalization. Active records come first.
    pub fn search(&self, query: &str) -> Vec<&ClientRecord> {
        let needle = normalize_search_text(query);
        self.active
            .iter()
            .chain(self.dropped.iter())
            .filter(|r| needle.is_empty() || matches_search(r, &needle))
            .collect()
    }

    pub fn to_partition(&self) -> ClientPartition {
        ClientPartition {
            active: self.active.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

/// Shared roster plus the repository it is loaded from.
pub struct ClientStore {
    roster: RwLock<ClientRoster>,
    repository: Arc<ClientRepository>,
    loaded: AtomicBool,
}

impl ClientStore {
    pub fn new(repository: Arc<ClientRepository>) -> Self {
        Self {
            roster: RwLock::new(ClientRoster::new()),
            repository,
            loaded: AtomicBool::new(false),
        }
    }

    /// Reload everything from the remote store.
    ///
    /// On failure the error is logged, the previous contents stay, and
    /// `false` is returned.
    pub async fn load(&self) -> bool {
        match self.repository.get_all().await {
            Ok(partition) => {
                let (active, dropped) = (partition.active.len(), partition.dropped.len());
                self.roster.write().await.replace(partition);
                self.loaded.store(true, Ordering::Release);
                tracing::info!(active, dropped, "Client roster loaded");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load clients");
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub async fn add(&self, record: ClientRecord) {
        self.roster.write().await.add(record);
    }

    pub async fn apply_update(&self, record: ClientRecord) {
        self.roster.write().await.apply_update(record);
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.roster.write().await.remove(id)
    }

    pub async fn snapshot(&self) -> ClientPartition {
        self.roster.read().await.to_partition()
    }

    pub async fn get(&self, id: &str) -> Option<ClientRecord> {
        self.roster.read().await.get(id).cloned()
    }

    pub async fn search(&self, query: &str) -> Vec<ClientRecord> {
        self.roster
            .read()
            .await
            .search(query)
            .into_iter()
            .cloned()
            .collect()
    }
}
