//! Inbox state
//!
//! This module contains the reconciliation logic merging the durable
//! notification history with the live push stream into one ordered,
//! deduplicated collection, and the unread bookkeeping on top of it.

use super::notification::{Notification, NotificationStatus};
use super::NotificationId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One page of the durable history, as returned by the list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows of this page.
    pub content: Vec<T>,
    /// Total rows across all pages.
    #[serde(rename = "totalElements")]
    pub total_elements: u64,
    /// Total number of pages.
    #[serde(rename = "totalPages")]
    pub total_pages: u32,
    /// Zero-based index of this page.
    pub number: u32,
    /// Requested page size.
    pub size: u32,
}

impl<T> Page<T> {
    /// Maps the page content, keeping the pagination envelope.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            number: self.number,
            size: self.size,
        }
    }
}

/// Receipt of an optimistic mark-read patch.
///
/// Returned by [`Inbox::begin_mark_read`] and handed back to
/// [`Inbox::rollback_mark_read`] when the server rejects the mutation, so
/// the apply/revert pair is explicit at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a receipt must be kept to roll the patch back on failure"]
pub struct ReadReceipt {
    id: NotificationId,
}

/// The reconciled in-memory collection of notifications.
///
/// Two asynchronous sources feed it: REST page loads and live push events.
/// Mutual exclusion is the caller's concern; the inbox itself is plain
/// synchronous state. The one invariant it maintains is that the
/// collection never holds two entries with the same `id`.
#[derive(Debug)]
pub struct Inbox {
    entries: Vec<Notification>,
    live_ids: HashSet<NotificationId>,
    unread: u64,
    page_index: u32,
    page_size: u32,
    total_pages: u32,
}

impl Inbox {
    pub fn new(page_size: u32) -> Self {
        Self {
            entries: Vec::new(),
            live_ids: HashSet::new(),
            unread: 0,
            page_index: 0,
            page_size,
            total_pages: 1,
        }
    }

    /// Entries in visible order: live events most-recently-arrived first,
    /// merged ahead of the fetched pages.
    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.entries.iter().find(|n| n.id == id)
    }

    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    /// Overwrites the counter from an authoritative server value.
    pub fn set_unread_count(&mut self, count: u64) {
        self.unread = count;
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Index of the next page to fetch, `None` once the last page was
    /// reached. Further load-more calls are no-ops.
    pub fn next_page(&self) -> Option<u32> {
        let next = self.page_index + 1;
        (next < self.total_pages).then_some(next)
    }

    /// Replaces the fetched rows with a fresh first page. Used on
    /// bootstrap and on filter changes.
    ///
    /// Entries merged from the live stream survive the reload: a filter
    /// constrains history fetches only, so live rows absent from the new
    /// page stay ahead of it.
    pub fn replace_with_page(&mut self, page: Page<Notification>) {
        self.page_index = page.number;
        self.total_pages = page.total_pages;
        let fetched: HashSet<NotificationId> = page.content.iter().map(|n| n.id).collect();
        let mut entries: Vec<Notification> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|n| self.live_ids.contains(&n.id) && !fetched.contains(&n.id))
            .collect();
        entries.extend(page.content);
        self.entries = entries;
    }

    /// Appends a load-more page, skipping rows already present.
    ///
    /// Rows can already be present when a live event raced the page load;
    /// the id-based dedup is the only ordering mitigation.
    pub fn append_page(&mut self, page: Page<Notification>) {
        self.page_index = page.number;
        self.total_pages = page.total_pages;
        for notification in page.content {
            if !self.contains(notification.id) {
                self.entries.push(notification);
            }
        }
    }

    /// Merges a live event: prepend when unseen, ignore otherwise.
    ///
    /// Returns boolean indicating if the event was new. The unread counter
    /// only moves for new unread entries.
    pub fn push_live(&mut self, notification: Notification) -> bool {
        if self.contains(notification.id) {
            return false;
        }
        if notification.statut.is_unread() {
            self.unread += 1;
        }
        self.live_ids.insert(notification.id);
        self.entries.insert(0, notification);
        true
    }

    /// Optimistically flips an entry to read and decrements the counter.
    ///
    /// Returns `None` when the entry is absent or already read, so a
    /// concurrent second call on the same id cannot double-decrement: it
    /// observes the flipped status and does not patch.
    pub fn begin_mark_read(&mut self, id: NotificationId) -> Option<ReadReceipt> {
        let entry = self.entries.iter_mut().find(|n| n.id == id)?;
        if !entry.statut.is_unread() {
            return None;
        }
        entry.statut = NotificationStatus::Lu;
        self.unread = self.unread.saturating_sub(1);
        Some(ReadReceipt { id })
    }

    /// Reverts a mark-read patch after a server rejection.
    pub fn rollback_mark_read(&mut self, receipt: ReadReceipt) {
        if let Some(entry) = self.entries.iter_mut().find(|n| n.id == receipt.id) {
            entry.statut = NotificationStatus::NonLu;
            self.unread += 1;
        }
    }

    /// Applies a confirmed mark-all-read: every visible row flips to read,
    /// the counter decrements by the server-reported affected count,
    /// clamped at zero.
    pub fn apply_mark_all_read(&mut self, updated: u64) {
        for entry in &mut self.entries {
            entry.statut = NotificationStatus::Lu;
        }
        self.unread = self.unread.saturating_sub(updated);
    }

    /// Removes a single entry after a confirmed delete.
    pub fn remove(&mut self, id: NotificationId) -> bool {
        let Some(position) = self.entries.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = self.entries.remove(position);
        self.live_ids.remove(&id);
        if removed.statut.is_unread() {
            self.unread = self.unread.saturating_sub(1);
        }
        true
    }

    /// Clears the collection after a confirmed delete-all.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.live_ids.clear();
        self.unread = 0;
        self.page_index = 0;
        self.total_pages = 1;
    }

    fn contains(&self, id: NotificationId) -> bool {
        self.entries.iter().any(|n| n.id == id)
    }
}
