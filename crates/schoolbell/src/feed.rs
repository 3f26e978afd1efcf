//! In-memory notification feed.
//!
//! Holds the merged view of the REST snapshot and the push stream. Entries
//! are unique by id and the unread count is always derived from them.
//!
//! Ordering is newest-arrival-first: pushed records are prepended as they
//! arrive, independent of `created_at`, so after out-of-order delivery the
//! feed is not guaranteed to be sorted by timestamp.
//!
//! Every mutation bumps a sequence number. A fetch remembers the sequence at
//! which it was issued so that, when its snapshot lands, local changes made
//! while the request was in flight can be told apart from older state.
//!
//! Local reads and deletes are tracked as [`Write`]s until the server answers.
//! A snapshot cannot undo a write that was still unanswered when the fetch
//! went out, nor one the server confirmed after that point. Only a failed
//! write is dropped, which lets the next snapshot restore the server's copy.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::Credentials;
use crate::model::Notification;

/// Identity a feed is bound to. Records addressed elsewhere are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedScope {
    pub tenant_id: String,
    pub user_id: String,
}

impl FeedScope {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn admits(&self, notification: &Notification) -> bool {
        notification.is_addressed_to(&self.tenant_id, &self.user_id)
    }
}

impl From<&Credentials> for FeedScope {
    fn from(credentials: &Credentials) -> Self {
        Self::new(&credentials.tenant_id, &credentials.user_id)
    }
}

/// Point-in-time copy of the feed handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

/// Outcome of inserting a pushed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// New entry, prepended.
    Inserted,
    /// Already held; collapsed into the existing entry.
    Merged,
    /// Addressed to a different tenant or user.
    Rejected,
}

/// A local write as far as the server is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    /// Sent, not answered yet.
    Pending,
    /// Confirmed by the server at this sequence.
    Acked(u64),
}

impl Write {
    /// Whether a snapshot issued at `issued_at` may predate the write.
    fn outranks(self, issued_at: u64) -> bool {
        match self {
            Self::Pending => true,
            Self::Acked(seq) => seq > issued_at,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    notification: Notification,
    /// Sequence at which this entry entered the feed.
    received_seq: u64,
    /// Local mark-read, if any.
    read_write: Option<Write>,
}

#[derive(Debug)]
pub(crate) struct Feed {
    scope: FeedScope,
    entries: Vec<Entry>,
    /// Locally deleted ids.
    tombstones: HashMap<String, Write>,
    seq: u64,
    /// Issue sequence of the newest snapshot applied so far.
    applied_fetch: Option<u64>,
}

impl Feed {
    pub(crate) fn new(scope: FeedScope) -> Self {
        Self {
            scope,
            entries: Vec::new(),
            tombstones: HashMap::new(),
            seq: 0,
            applied_fetch: None,
        }
    }

    pub(crate) fn scope(&self) -> &FeedScope {
        &self.scope
    }

    fn bump(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.notification.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn unread(&self) -> usize {
        self.entries.iter().filter(|e| !e.notification.read).count()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Notification> {
        self.position(id).map(|idx| &self.entries[idx].notification)
    }

    pub(crate) fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            notifications: self.entries.iter().map(|e| e.notification.clone()).collect(),
            unread: self.unread(),
        }
    }

    /// Mark the start of a fetch; pass the returned marker to [`Feed::apply_snapshot`].
    pub(crate) fn begin_fetch(&mut self) -> u64 {
        self.bump()
    }

    /// Merge a REST snapshot issued at `issued_at`.
    ///
    /// The snapshot replaces the held list except where local state may be
    /// newer than the response: reads and deletes the server had not
    /// confirmed before the request was issued, and pushed entries that
    /// arrived after it was issued.
    /// Returns false when a newer snapshot was already applied.
    pub(crate) fn apply_snapshot(&mut self, records: Vec<Notification>, issued_at: u64) -> bool {
        if self.applied_fetch.is_some_and(|applied| applied > issued_at) {
            debug!(issued_at, "Ignoring snapshot older than the applied one");
            return false;
        }

        let snapshot_ids: HashSet<String> = records.iter().map(|n| n.id.clone()).collect();

        // Pushed after the request went out and unknown to the snapshot.
        let mut merged: Vec<Entry> = self
            .entries
            .iter()
            .filter(|e| e.received_seq > issued_at && !snapshot_ids.contains(&e.notification.id))
            .cloned()
            .collect();

        let mut seen = HashSet::with_capacity(records.len());
        for mut record in records {
            if !self.scope.admits(&record) {
                warn!(
                    notification_id = %record.id,
                    tenant_id = %record.tenant_id,
                    "Dropping snapshot record outside the session scope"
                );
                continue;
            }
            if !seen.insert(record.id.clone()) {
                continue;
            }
            if self
                .tombstones
                .get(&record.id)
                .is_some_and(|delete| delete.outranks(issued_at))
            {
                continue;
            }

            let held = self.position(&record.id).map(|idx| &self.entries[idx]);
            let mut read_write = None;
            if let Some(write) = held.and_then(|h| h.read_write)
                && write.outranks(issued_at)
            {
                // This copy may predate the mark-read.
                record.read = true;
                read_write = Some(write);
            }

            merged.push(Entry {
                notification: record,
                received_seq: held.map_or(issued_at, |h| h.received_seq.min(issued_at)),
                read_write,
            });
        }

        self.entries = merged;
        self.tombstones.retain(|_, delete| delete.outranks(issued_at));
        self.applied_fetch = Some(issued_at);
        true
    }

    /// Insert a pushed record at the front, collapsing duplicates by id.
    pub(crate) fn receive(&mut self, notification: Notification) -> Received {
        if !self.scope.admits(&notification) {
            return Received::Rejected;
        }

        let seq = self.bump();
        if let Some(idx) = self.position(&notification.id) {
            let entry = &mut self.entries[idx];
            if notification.read && !entry.notification.read {
                entry.notification.read = true;
            }
            return Received::Merged;
        }

        // A push for a record deleted locally resurrects it; the server sent it again.
        self.tombstones.remove(&notification.id);
        self.entries.insert(
            0,
            Entry {
                notification,
                received_seq: seq,
                read_write: None,
            },
        );
        Received::Inserted
    }

    /// Mark one entry read. Returns true only if it was held and unread.
    pub(crate) fn mark_read(&mut self, id: &str) -> bool {
        let Some(idx) = self.position(id) else {
            return false;
        };
        if self.entries[idx].notification.read {
            return false;
        }
        self.bump();
        let entry = &mut self.entries[idx];
        entry.notification.read = true;
        entry.read_write = Some(Write::Pending);
        true
    }

    /// Mark every entry read. Returns the ids that flipped.
    pub(crate) fn mark_all_read(&mut self) -> Vec<String> {
        self.bump();
        self.entries
            .iter_mut()
            .filter(|e| !e.notification.read)
            .map(|entry| {
                entry.notification.read = true;
                entry.read_write = Some(Write::Pending);
                entry.notification.id.clone()
            })
            .collect()
    }

    /// Record the server's answer to a mark-read of `ids`.
    ///
    /// A rejected read loses its protection against the next snapshot.
    pub(crate) fn settle_read<S: AsRef<str>>(&mut self, ids: &[S], confirmed: bool) {
        let seq = self.bump();
        for id in ids {
            let Some(idx) = self.position(id.as_ref()) else {
                continue;
            };
            let entry = &mut self.entries[idx];
            if entry.read_write == Some(Write::Pending) {
                entry.read_write = confirmed.then_some(Write::Acked(seq));
            }
        }
    }

    /// Record the server's answer to a delete of `id`.
    pub(crate) fn settle_delete(&mut self, id: &str, confirmed: bool) {
        let seq = self.bump();
        if self.tombstones.get(id) != Some(&Write::Pending) {
            return;
        }
        if confirmed {
            self.tombstones.insert(id.to_string(), Write::Acked(seq));
        } else {
            self.tombstones.remove(id);
        }
    }

    /// Remove an entry, returning it as it was just before removal.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Notification> {
        let idx = self.position(id)?;
        self.bump();
        let entry = self.entries.remove(idx);
        self.tombstones
            .insert(entry.notification.id.clone(), Write::Pending);
        Some(entry.notification)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.tombstones.clear();
        self.applied_fetch = None;
    }
}
