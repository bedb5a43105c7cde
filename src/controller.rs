//! Presentation controller.
//!
//! This module contains the orchestration between the durable history
//! (REST) and the live push stream: one-shot bootstrap, page loading,
//! optimistic mutations with rollback, and role-aware behavior such as
//! the DRH filtered feed and per-role deep links.

use crate::rest::{NotificationApi, NotificationFilter, NotificationStats, RestError};
use crate::state::inbox::{Inbox, Page};
use crate::state::notification::{Notification, NotificationStatus};
use crate::state::role::{DeepLink, Role};
use crate::state::NotificationId;
use crate::transport::PushClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};

/// History operations the controller needs. [`NotificationApi`] is the
/// production implementation; tests substitute an in-memory one.
#[allow(async_fn_in_trait)]
pub trait NotificationGateway {
    async fn list(
        &self,
        page: u32,
        size: u32,
        statut: Option<NotificationStatus>,
    ) -> Result<Page<Notification>, RestError>;

    async fn list_with_filters(
        &self,
        page: u32,
        size: u32,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, RestError>;

    async fn unread_count(&self, filter: Option<&NotificationFilter>) -> Result<u64, RestError>;

    async fn stats(&self) -> Result<NotificationStats, RestError>;

    async fn mark_read(&self, id: NotificationId) -> Result<Notification, RestError>;

    async fn mark_all_read(&self, filter: Option<&NotificationFilter>) -> Result<u64, RestError>;

    async fn delete_one(&self, id: NotificationId) -> Result<(), RestError>;

    async fn delete_all(&self, filter: Option<&NotificationFilter>) -> Result<u64, RestError>;

    async fn drh_attention(&self, page: u32, size: u32) -> Result<Page<Notification>, RestError>;
}

impl NotificationGateway for NotificationApi {
    async fn list(
        &self,
        page: u32,
        size: u32,
        statut: Option<NotificationStatus>,
    ) -> Result<Page<Notification>, RestError> {
        NotificationApi::list(self, page, size, statut).await
    }

    async fn list_with_filters(
        &self,
        page: u32,
        size: u32,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, RestError> {
        NotificationApi::list_with_filters(self, page, size, filter).await
    }

    async fn unread_count(&self, filter: Option<&NotificationFilter>) -> Result<u64, RestError> {
        NotificationApi::unread_count(self, filter).await
    }

    async fn stats(&self) -> Result<NotificationStats, RestError> {
        NotificationApi::stats(self).await
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Notification, RestError> {
        NotificationApi::mark_read(self, id).await
    }

    async fn mark_all_read(&self, filter: Option<&NotificationFilter>) -> Result<u64, RestError> {
        NotificationApi::mark_all_read(self, filter).await
    }

    async fn delete_one(&self, id: NotificationId) -> Result<(), RestError> {
        NotificationApi::delete_one(self, id).await
    }

    async fn delete_all(&self, filter: Option<&NotificationFilter>) -> Result<u64, RestError> {
        NotificationApi::delete_all(self, filter).await
    }

    async fn drh_attention(&self, page: u32, size: u32) -> Result<Page<Notification>, RestError> {
        NotificationApi::drh_attention(self, page, size).await
    }
}

/// Orchestrates one user's notification inbox.
pub struct InboxController<G> {
    gateway: G,
    push: Arc<PushClient>,
    role: Role,
    page_size: u32,
    inbox: RwLock<Inbox>,
    filter: RwLock<NotificationFilter>,
    stats: RwLock<NotificationStats>,
    bootstrapped: AtomicBool,
}

impl<G: NotificationGateway> InboxController<G> {
    pub fn new(gateway: G, push: Arc<PushClient>, role: Role, page_size: u32) -> Self {
        Self {
            gateway,
            push,
            role,
            page_size,
            inbox: RwLock::new(Inbox::new(page_size)),
            filter: RwLock::new(NotificationFilter::default()),
            stats: RwLock::new(NotificationStats::default()),
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// One-shot bootstrap: connects the push channel and loads the first
    /// page plus the unread counter. Subsequent calls are no-ops; a failed
    /// bootstrap may be retried.
    pub async fn bootstrap(&self, token: Option<&str>) -> Result<(), RestError> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.push.ensure_connected(token);
        if let Err(err) = self.refresh().await {
            self.bootstrapped.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Reloads the first page and the unread counter under the current
    /// filter, replacing the collection.
    pub async fn refresh(&self) -> Result<(), RestError> {
        let filter = self.filter.read().await.clone();
        let page = self.load_page(0, &filter).await?;
        let unread = self.gateway.unread_count(active(&filter)).await?;

        let mut inbox = self.inbox.write().await;
        inbox.replace_with_page(page);
        inbox.set_unread_count(unread);
        Ok(())
    }

    /// Consumes the live stream until it closes. Lagging behind the stream
    /// loses events, so a lag triggers a full refresh from the history.
    pub async fn run(&self, mut events: broadcast::Receiver<Notification>) {
        loop {
            match events.recv().await {
                Ok(notification) => self.handle_incoming(notification).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Live stream lagged, refreshing from the history");
                    if let Err(err) = self.refresh().await {
                        tracing::warn!(error = ?err, "Backfill after lag failed");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Merges one live event into the inbox.
    pub async fn handle_incoming(&self, notification: Notification) {
        let unread = notification.statut.is_unread();
        let merged = self.inbox.write().await.push_live(notification);
        if !merged {
            return;
        }
        let mut stats = self.stats.write().await;
        stats.total += 1;
        if unread {
            stats.unread += 1;
        } else {
            stats.read += 1;
        }
    }

    /// Fetches and appends the next page. Returns `false` when the last
    /// page was already reached.
    pub async fn load_more(&self) -> Result<bool, RestError> {
        let Some(number) = self.inbox.read().await.next_page() else {
            return Ok(false);
        };
        let filter = self.filter.read().await.clone();
        let page = self.load_page(number, &filter).await?;
        self.inbox.write().await.append_page(page);
        Ok(true)
    }

    /// Restricts the DRH feed to one request category. A no-op for other
    /// roles.
    pub async fn set_category_filter(&self, categorie: Option<String>) -> Result<(), RestError> {
        if !self.role.uses_filtered_feed() {
            return Ok(());
        }
        self.filter.write().await.categorie = categorie;
        self.refresh().await
    }

    /// Restricts the DRH feed to one request type. A no-op for other
    /// roles.
    pub async fn set_type_filter(&self, type_demande: Option<String>) -> Result<(), RestError> {
        if !self.role.uses_filtered_feed() {
            return Ok(());
        }
        self.filter.write().await.type_demande = type_demande;
        self.refresh().await
    }

    /// Drops every filter constraint and reloads.
    pub async fn clear_filters(&self) -> Result<(), RestError> {
        if !self.role.uses_filtered_feed() {
            return Ok(());
        }
        *self.filter.write().await = NotificationFilter::default();
        self.refresh().await
    }

    /// Marks one notification as read, optimistically: the row flips and
    /// the counter drops before the request, and both revert when the
    /// server rejects it. Already-read and unknown ids are no-ops.
    pub async fn mark_read(&self, id: NotificationId) -> Result<(), RestError> {
        let receipt = self.inbox.write().await.begin_mark_read(id);
        let Some(receipt) = receipt else {
            return Ok(());
        };
        match self.gateway.mark_read(id).await {
            Ok(_) => {
                let mut stats = self.stats.write().await;
                stats.unread = stats.unread.saturating_sub(1);
                stats.read += 1;
                Ok(())
            }
            Err(err) => {
                self.inbox.write().await.rollback_mark_read(receipt);
                Err(err)
            }
        }
    }

    /// Marks everything under the current filter as read, server first.
    /// The counter drops by the count the server reports, never below
    /// zero.
    pub async fn mark_all_read(&self) -> Result<u64, RestError> {
        let filter = self.filter.read().await.clone();
        let updated = self.gateway.mark_all_read(active(&filter)).await?;
        self.inbox.write().await.apply_mark_all_read(updated);

        let mut stats = self.stats.write().await;
        stats.unread = stats.unread.saturating_sub(updated);
        stats.read += updated;
        Ok(updated)
    }

    /// Deletes one notification, server first.
    pub async fn delete_one(&self, id: NotificationId) -> Result<(), RestError> {
        let was_unread = self
            .inbox
            .read()
            .await
            .get(id)
            .map(|n| n.statut.is_unread());
        self.gateway.delete_one(id).await?;
        self.inbox.write().await.remove(id);

        let mut stats = self.stats.write().await;
        stats.total = stats.total.saturating_sub(1);
        match was_unread {
            Some(true) => stats.unread = stats.unread.saturating_sub(1),
            Some(false) => stats.read = stats.read.saturating_sub(1),
            None => {}
        }
        Ok(())
    }

    /// Deletes everything under the current filter, server first.
    pub async fn delete_all(&self) -> Result<u64, RestError> {
        let filter = self.filter.read().await.clone();
        let deleted = self.gateway.delete_all(active(&filter)).await?;
        self.inbox.write().await.clear();
        *self.stats.write().await = NotificationStats::default();
        Ok(deleted)
    }

    /// Rows needing DRH review. Empty for every other role.
    pub async fn attention_queue(&self, page: u32) -> Result<Page<Notification>, RestError> {
        if !self.role.uses_filtered_feed() {
            return Ok(Page {
                content: Vec::new(),
                total_elements: 0,
                total_pages: 0,
                number: page,
                size: self.page_size,
            });
        }
        self.gateway.drh_attention(page, self.page_size).await
    }

    /// Resolves a click on a notification: marks it read when unread, then
    /// yields the per-role deep link. `None` when the role has no request
    /// list or the notification carries no request id.
    ///
    /// A failed mark-read does not block the navigation.
    pub async fn open(&self, id: NotificationId) -> Option<DeepLink> {
        let demande_id = self.inbox.read().await.get(id)?.demande_id;
        if let Err(err) = self.mark_read(id).await {
            tracing::warn!(id, error = ?err, "Mark-read on open failed");
        }
        Some(DeepLink {
            path: self.role.demandes_route()?,
            demande_id: demande_id?,
            notification_id: id,
        })
    }

    /// Re-fetches the unread counter from the server and overwrites the
    /// local one.
    pub async fn refresh_unread_count(&self) -> Result<u64, RestError> {
        let filter = self.filter.read().await.clone();
        let unread = self.gateway.unread_count(active(&filter)).await?;
        self.inbox.write().await.set_unread_count(unread);
        Ok(unread)
    }

    /// Re-fetches the aggregate counts from the server.
    pub async fn refresh_stats(&self) -> Result<NotificationStats, RestError> {
        let stats = self.gateway.stats().await?;
        *self.stats.write().await = stats;
        Ok(stats)
    }

    pub async fn unread_count(&self) -> u64 {
        self.inbox.read().await.unread_count()
    }

    pub async fn stats(&self) -> NotificationStats {
        *self.stats.read().await
    }

    /// Clone of the visible collection, in display order.
    pub async fn snapshot(&self) -> Vec<Notification> {
        self.inbox.read().await.entries().to_vec()
    }

    /// Loads a page, preferring the filtered DRH feed and falling back to
    /// the basic list when that endpoint fails.
    async fn load_page(
        &self,
        number: u32,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, RestError> {
        if self.role.uses_filtered_feed() && !filter.is_empty() {
            match self
                .gateway
                .list_with_filters(number, self.page_size, filter)
                .await
            {
                Ok(page) => return Ok(page),
                Err(err) => {
                    tracing::warn!(
                        error = ?err,
                        "Filtered feed unavailable, falling back to the basic list"
                    );
                }
            }
        }
        self.gateway.list(number, self.page_size, filter.statut).await
    }
}

fn active(filter: &NotificationFilter) -> Option<&NotificationFilter> {
    (!filter.is_empty()).then_some(filter)
}
