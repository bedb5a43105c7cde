//! REST client for the durable notification history.
//!
//! Every operation is a single HTTP round trip against the notifications
//! resource root; failures are surfaced to the caller unchanged. Fallback
//! behavior, if any, belongs to the presentation controller.

use crate::state::inbox::Page;
use crate::state::notification::{Notification, NotificationStatus, WireNotification};
use crate::state::{DemandeId, NotificationId};
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Error type for REST operations.
#[derive(Debug, Error)]
pub enum RestError {
    /// The request never completed or the body could not be decoded.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The server replied with a non-success status.
    #[error("server replied `{0}`")]
    Status(StatusCode),
}

/// Optional constraints of a filtered query. Omitted fields are
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    /// Restrict to unread or read rows.
    pub statut: Option<NotificationStatus>,
    /// Request category, e.g. `ORDRE_MISSION`.
    pub categorie: Option<String>,
    /// Request type, e.g. `CONGE_ANNUEL`.
    pub type_demande: Option<String>,
    /// Lower bound of the creation date.
    pub start_date: Option<NaiveDate>,
    /// Upper bound of the creation date.
    pub end_date: Option<NaiveDate>,
    /// Free-text search term.
    pub search: Option<String>,
}

impl NotificationFilter {
    /// Query parameters for the populated fields, using the wire names.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(statut) = self.statut {
            pairs.push(("statut", statut.to_string()));
        }
        if let Some(categorie) = &self.categorie {
            pairs.push(("categorie", categorie.clone()));
        }
        if let Some(type_demande) = &self.type_demande {
            pairs.push(("type", type_demande.clone()));
        }
        if let Some(start_date) = self.start_date {
            pairs.push(("startDate", start_date.format("%Y-%m-%d").to_string()));
        }
        if let Some(end_date) = self.end_date {
            pairs.push(("endDate", end_date.format("%Y-%m-%d").to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }
}

/// Aggregate counts from the stats endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NotificationStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
}

/// Actions understood by the bulk endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
pub enum BulkAction {
    #[serde(rename = "read")]
    #[strum(serialize = "read")]
    MarkRead,
    #[serde(rename = "delete")]
    #[strum(serialize = "delete")]
    Delete,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct UpdatedResponse {
    updated: u64,
}

#[derive(Deserialize)]
struct DeletedResponse {
    deleted: u64,
}

#[derive(Deserialize)]
struct AffectedResponse {
    affected: u64,
}

#[derive(Serialize)]
struct IdsBody<'a> {
    ids: &'a [NotificationId],
}

#[derive(Serialize)]
struct BulkActionBody<'a> {
    action: BulkAction,
    ids: &'a [NotificationId],
}

/// Client of the notifications resource root.
pub struct NotificationApi {
    http: Client,
    base: String,
    token: Option<String>,
}

impl NotificationApi {
    /// Creates a client rooted at `<api_base>/notifications`.
    pub fn new(api_base: &str, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base: format!("{}/notifications", api_base.trim_end_matches('/')),
            token,
        }
    }

    /// Paged list of the history, optionally restricted by read state.
    pub async fn list(
        &self,
        page: u32,
        size: u32,
        statut: Option<NotificationStatus>,
    ) -> Result<Page<Notification>, RestError> {
        let mut query = paging(page, size);
        if let Some(statut) = statut {
            query.push(("statut", statut.to_string()));
        }
        self.fetch_page(self.base.clone(), &query).await
    }

    /// Paged list under the extended filter predicate.
    pub async fn list_with_filters(
        &self,
        page: u32,
        size: u32,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, RestError> {
        let mut query = paging(page, size);
        query.extend(filter.query_pairs());
        self.fetch_page(format!("{}/filter", self.base), &query).await
    }

    /// Number of unread rows, optionally scoped by the filter.
    pub async fn unread_count(
        &self,
        filter: Option<&NotificationFilter>,
    ) -> Result<u64, RestError> {
        let query = filter.map(NotificationFilter::query_pairs).unwrap_or_default();
        let response = self
            .get(format!("{}/unread-count", self.base))
            .query(&query)
            .send()
            .await?;
        let body: CountResponse = expect_ok(response).await?.json().await?;
        Ok(body.count)
    }

    /// Aggregate total/unread/read counts.
    pub async fn stats(&self) -> Result<NotificationStats, RestError> {
        let response = self.get(format!("{}/stats", self.base)).send().await?;
        Ok(expect_ok(response).await?.json().await?)
    }

    /// Marks one row as read, returning the updated payload.
    pub async fn mark_read(&self, id: NotificationId) -> Result<Notification, RestError> {
        let response = self.post(format!("{}/{id}/read", self.base)).send().await?;
        let wire: WireNotification = expect_ok(response).await?.json().await?;
        Ok(Notification::from_wire(wire))
    }

    /// Marks every row matching the filter as read; returns the number of
    /// rows the server actually updated.
    pub async fn mark_all_read(
        &self,
        filter: Option<&NotificationFilter>,
    ) -> Result<u64, RestError> {
        let query = filter.map(NotificationFilter::query_pairs).unwrap_or_default();
        let response = self
            .post(format!("{}/read-all", self.base))
            .query(&query)
            .send()
            .await?;
        let body: UpdatedResponse = expect_ok(response).await?.json().await?;
        Ok(body.updated)
    }

    /// Deletes one row.
    pub async fn delete_one(&self, id: NotificationId) -> Result<(), RestError> {
        let response = self.delete(format!("{}/{id}", self.base)).send().await?;
        expect_ok(response).await?;
        Ok(())
    }

    /// Deletes every row matching the filter; returns the number of rows
    /// the server actually deleted.
    pub async fn delete_all(
        &self,
        filter: Option<&NotificationFilter>,
    ) -> Result<u64, RestError> {
        let query = filter.map(NotificationFilter::query_pairs).unwrap_or_default();
        let response = self.delete(self.base.clone()).query(&query).send().await?;
        let body: DeletedResponse = expect_ok(response).await?.json().await?;
        Ok(body.deleted)
    }

    /// Paged list restricted to one notification kind.
    pub async fn by_type(
        &self,
        page: u32,
        size: u32,
        type_demande: &str,
    ) -> Result<Page<Notification>, RestError> {
        let mut query = paging(page, size);
        query.push(("type", type_demande.to_string()));
        self.fetch_page(format!("{}/by-type", self.base), &query).await
    }

    /// Paged list restricted to one request category.
    pub async fn by_category(
        &self,
        page: u32,
        size: u32,
        categorie: &str,
    ) -> Result<Page<Notification>, RestError> {
        let mut query = paging(page, size);
        query.push(("categorie", categorie.to_string()));
        self.fetch_page(format!("{}/by-category", self.base), &query).await
    }

    /// Paged list restricted to one service.
    pub async fn by_service(
        &self,
        page: u32,
        size: u32,
        service: &str,
    ) -> Result<Page<Notification>, RestError> {
        let mut query = paging(page, size);
        query.push(("service", service.to_string()));
        self.fetch_page(format!("{}/by-service", self.base), &query).await
    }

    /// Full-text search over the history.
    pub async fn search(
        &self,
        page: u32,
        size: u32,
        term: &str,
    ) -> Result<Page<Notification>, RestError> {
        let mut query = paging(page, size);
        query.push(("search", term.to_string()));
        self.fetch_page(format!("{}/search", self.base), &query).await
    }

    /// Attention queue of the reviewing DRH role.
    pub async fn drh_attention(
        &self,
        page: u32,
        size: u32,
    ) -> Result<Page<Notification>, RestError> {
        self.fetch_page(format!("{}/drh/attention", self.base), &paging(page, size))
            .await
    }

    /// Every notification attached to one request.
    pub async fn by_demande(
        &self,
        demande_id: DemandeId,
    ) -> Result<Vec<Notification>, RestError> {
        let response = self
            .get(format!("{}/demand/{demande_id}", self.base))
            .send()
            .await?;
        let rows: Vec<WireNotification> = expect_ok(response).await?.json().await?;
        Ok(rows.into_iter().map(Notification::from_wire).collect())
    }

    /// Marks the given rows as read; returns the updated-row count.
    pub async fn read_multiple(&self, ids: &[NotificationId]) -> Result<u64, RestError> {
        let response = self
            .post(format!("{}/read-multiple", self.base))
            .json(&IdsBody { ids })
            .send()
            .await?;
        let body: UpdatedResponse = expect_ok(response).await?.json().await?;
        Ok(body.updated)
    }

    /// Deletes the given rows; returns the deleted-row count.
    pub async fn delete_multiple(&self, ids: &[NotificationId]) -> Result<u64, RestError> {
        let response = self
            .post(format!("{}/delete-multiple", self.base))
            .json(&IdsBody { ids })
            .send()
            .await?;
        let body: DeletedResponse = expect_ok(response).await?.json().await?;
        Ok(body.deleted)
    }

    /// Applies one bulk action to the given rows; returns the affected-row
    /// count.
    pub async fn bulk_action(
        &self,
        action: BulkAction,
        ids: &[NotificationId],
    ) -> Result<u64, RestError> {
        let response = self
            .post(format!("{}/bulk-action", self.base))
            .json(&BulkActionBody { action, ids })
            .send()
            .await?;
        let body: AffectedResponse = expect_ok(response).await?.json().await?;
        Ok(body.affected)
    }

    async fn fetch_page(
        &self,
        url: String,
        query: &[(&'static str, String)],
    ) -> Result<Page<Notification>, RestError> {
        let response = self.get(url).query(query).send().await?;
        let page: Page<WireNotification> = expect_ok(response).await?.json().await?;
        Ok(page.map(Notification::from_wire))
    }

    fn get(&self, url: String) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    fn post(&self, url: String) -> RequestBuilder {
        self.authorize(self.http.post(url))
    }

    fn delete(&self, url: String) -> RequestBuilder {
        self.authorize(self.http.delete(url))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn paging(page: u32, size: u32) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string()), ("size", size.to_string())]
}

async fn expect_ok(response: Response) -> Result<Response, RestError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RestError::Status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_query_pairs_skip_unset_fields() {
        let filter = NotificationFilter {
            categorie: Some("ORDRE_MISSION".to_string()),
            search: Some("mission".to_string()),
            ..Default::default()
        };
        assert_eq!(
            filter.query_pairs(),
            vec![
                ("categorie", "ORDRE_MISSION".to_string()),
                ("search", "mission".to_string())
            ]
        );
    }

    #[test]
    fn filter_query_pairs_use_wire_names() {
        let filter = NotificationFilter {
            statut: Some(NotificationStatus::NonLu),
            type_demande: Some("CONGE_ANNUEL".to_string()),
            start_date: NaiveDate::from_ymd_opt(2025, 8, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 8, 31),
            ..Default::default()
        };
        assert_eq!(
            filter.query_pairs(),
            vec![
                ("statut", "NON_LU".to_string()),
                ("type", "CONGE_ANNUEL".to_string()),
                ("startDate", "2025-08-01".to_string()),
                ("endDate", "2025-08-31".to_string())
            ]
        );
    }

    #[test]
    fn empty_filter_is_empty() {
        assert!(NotificationFilter::default().is_empty());
    }

    #[test]
    fn page_envelope_deserializes_from_wire_names() {
        let page: Page<WireNotification> = serde_json::from_str(
            r#"{
                "content": [{"id": 1}, {"id": 2}],
                "totalElements": 12,
                "totalPages": 6,
                "number": 0,
                "size": 2
            }"#,
        )
        .unwrap();
        assert_eq!(page.total_elements, 12);
        assert_eq!(page.total_pages, 6);

        let mapped = page.map(Notification::from_wire);
        assert_eq!(mapped.content.len(), 2);
        assert_eq!(mapped.total_pages, 6);
    }

    #[test]
    fn count_envelopes_deserialize() {
        let count: CountResponse = serde_json::from_str(r#"{"count": 4}"#).unwrap();
        assert_eq!(count.count, 4);
        let updated: UpdatedResponse = serde_json::from_str(r#"{"updated": 2}"#).unwrap();
        assert_eq!(updated.updated, 2);
        let deleted: DeletedResponse = serde_json::from_str(r#"{"deleted": 9}"#).unwrap();
        assert_eq!(deleted.deleted, 9);
    }

    #[test]
    fn bulk_action_serializes_to_wire_spelling() {
        assert_eq!(BulkAction::MarkRead.to_string(), "read");
        assert_eq!(BulkAction::Delete.to_string(), "delete");
        let body = serde_json::to_value(BulkActionBody {
            action: BulkAction::Delete,
            ids: &[1, 2],
        })
        .unwrap();
        assert_eq!(body["action"], "delete");
        assert_eq!(body["ids"][1], 2);
    }
}
