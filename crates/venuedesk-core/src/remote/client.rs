//! HTTP client for the hosted CRM's contact, opportunity, calendar and task
//! resources.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RemoteCrm, RemoteError, RemotePage, RemoteResult};
use crate::config::RemoteConfig;
use crate::mapper::{
    AppointmentPayload, ContactPayload, OpportunityPayload, RemoteAppointment, RemoteContact,
    RemoteOpportunity, RemotePayload, RemoteRecord, RemoteTask, StatusPayload, TaskPayload,
};
use crate::models::{EntityKind, RemoteId};

const DEFAULT_PAGE_LIMIT: usize = 100;

/// Authenticated CRM client.
///
/// Every call is bounded by the configured timeout and returns a typed
/// [`RemoteError`]. Nothing is retried here.
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
    location_id: String,
    calendar_id: Option<String>,
    page_limit: usize,
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CrmClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("location_id", &self.location_id)
            .field("page_limit", &self.page_limit)
            .finish_non_exhaustive()
    }
}

impl CrmClient {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(RemoteError::Transport)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            location_id: config.location_id.clone(),
            calendar_id: config.calendar_id.clone(),
            page_limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// Records requested per list call.
    #[must_use]
    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub async fn create_contact(&self, payload: &ContactPayload) -> RemoteResult<RemoteId> {
        self.post_create("/contacts/", "contact", payload).await
    }

    pub async fn update_contact(
        &self,
        remote_id: &RemoteId,
        payload: &ContactPayload,
    ) -> RemoteResult<()> {
        self.send_json(Method::PUT, &item_path("/contacts", remote_id), payload)
            .await
    }

    pub async fn delete_contact(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        self.send_delete(&item_path("/contacts", remote_id)).await
    }

    pub async fn list_contacts(&self, cursor: Option<&str>) -> RemoteResult<RemotePage> {
        let query = self.list_query("locationId", cursor);
        self.fetch_page::<RemoteContact>("/contacts/", &query, "contacts", RemoteRecord::Contact)
            .await
    }

    pub async fn create_opportunity(&self, payload: &OpportunityPayload) -> RemoteResult<RemoteId> {
        self.post_create("/opportunities/", "opportunity", payload).await
    }

    pub async fn update_opportunity(
        &self,
        remote_id: &RemoteId,
        payload: &OpportunityPayload,
    ) -> RemoteResult<()> {
        self.send_json(Method::PUT, &item_path("/opportunities", remote_id), payload)
            .await
    }

    pub async fn update_opportunity_status(
        &self,
        remote_id: &RemoteId,
        payload: &StatusPayload,
    ) -> RemoteResult<()> {
        let path = format!("{}/status", item_path("/opportunities", remote_id));
        self.send_json(Method::PUT, &path, payload).await
    }

    pub async fn delete_opportunity(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        self.send_delete(&item_path("/opportunities", remote_id)).await
    }

    pub async fn list_opportunities(&self, cursor: Option<&str>) -> RemoteResult<RemotePage> {
        let query = self.list_query("location_id", cursor);
        self.fetch_page::<RemoteOpportunity>(
            "/opportunities/search",
            &query,
            "opportunities",
            RemoteRecord::Opportunity,
        )
        .await
    }

    pub async fn create_appointment(&self, payload: &AppointmentPayload) -> RemoteResult<RemoteId> {
        self.post_create("/calendars/events/appointments", "appointment", payload)
            .await
    }

    pub async fn update_appointment(
        &self,
        remote_id: &RemoteId,
        payload: &AppointmentPayload,
    ) -> RemoteResult<()> {
        self.send_json(
            Method::PUT,
            &item_path("/calendars/events/appointments", remote_id),
            payload,
        )
        .await
    }

    pub async fn delete_appointment(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        self.send_delete(&item_path("/calendars/events", remote_id)).await
    }

    pub async fn list_appointments(&self, cursor: Option<&str>) -> RemoteResult<RemotePage> {
        let mut query = self.list_query("locationId", cursor);
        if let Some(calendar_id) = &self.calendar_id {
            query.push(("calendarId", calendar_id.clone()));
        }
        self.fetch_page::<RemoteAppointment>(
            "/calendars/events",
            &query,
            "events",
            RemoteRecord::CalendarEvent,
        )
        .await
    }

    pub async fn create_task(&self, payload: &TaskPayload) -> RemoteResult<RemoteId> {
        self.post_create("/tasks/", "task", payload).await
    }

    pub async fn update_task(&self, remote_id: &RemoteId, payload: &TaskPayload) -> RemoteResult<()> {
        self.send_json(Method::PUT, &item_path("/tasks", remote_id), payload)
            .await
    }

    pub async fn delete_task(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        self.send_delete(&item_path("/tasks", remote_id)).await
    }

    pub async fn list_tasks(&self, cursor: Option<&str>) -> RemoteResult<RemotePage> {
        let query = self.list_query("locationId", cursor);
        self.fetch_page::<RemoteTask>("/tasks/", &query, "tasks", RemoteRecord::Task)
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Version", &self.api_version)
            .header("Accept", "application/json")
    }

    fn list_query(
        &self,
        location_key: &'static str,
        cursor: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            (location_key, self.location_id.clone()),
            ("limit", self.page_limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("startAfterId", cursor.to_string()));
        }
        query
    }

    async fn execute(&self, builder: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = builder.send().await.map_err(RemoteError::from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "CRM request rejected");
        Err(RemoteError::rejected(
            status.as_u16(),
            parse_api_error(status, &body),
        ))
    }

    async fn post_create<B: Serialize + Sync>(
        &self,
        path: &str,
        resource_key: &str,
        payload: &B,
    ) -> RemoteResult<RemoteId> {
        let response = self
            .execute(self.request(Method::POST, path).json(payload))
            .await?;
        let body: Value = response.json().await.map_err(RemoteError::from_reqwest)?;

        created_id(&body, resource_key).ok_or_else(|| {
            RemoteError::decode(format!("create response for {path} did not include an id"))
        })
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        payload: &B,
    ) -> RemoteResult<()> {
        self.execute(self.request(method, path).json(payload))
            .await?;
        Ok(())
    }

    async fn send_delete(&self, path: &str) -> RemoteResult<()> {
        match self.execute(self.request(Method::DELETE, path)).await {
            Ok(_) => Ok(()),
            Err(RemoteError::Rejected { status: 404, .. }) => {
                tracing::debug!(path, "Remote resource already absent");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
        collection_key: &str,
        wrap: fn(T) -> RemoteRecord,
    ) -> RemoteResult<RemotePage> {
        let response = self
            .execute(self.request(Method::GET, path).query(query))
            .await?;
        let body: Value = response.json().await.map_err(RemoteError::from_reqwest)?;
        parse_page(body, collection_key, self.page_limit, wrap)
    }
}

#[async_trait]
impl RemoteCrm for CrmClient {
    async fn create(&self, payload: &RemotePayload) -> RemoteResult<RemoteId> {
        match payload {
            RemotePayload::Contact(body) => self.create_contact(body).await,
            RemotePayload::Opportunity(body) => self.create_opportunity(body).await,
            RemotePayload::CalendarEvent(body) => self.create_appointment(body).await,
            RemotePayload::Task(body) => self.create_task(body).await,
        }
    }

    async fn update(&self, remote_id: &RemoteId, payload: &RemotePayload) -> RemoteResult<()> {
        match payload {
            RemotePayload::Contact(body) => self.update_contact(remote_id, body).await,
            RemotePayload::Opportunity(body) => self.update_opportunity(remote_id, body).await,
            RemotePayload::CalendarEvent(body) => self.update_appointment(remote_id, body).await,
            RemotePayload::Task(body) => self.update_task(remote_id, body).await,
        }
    }

    async fn update_status(&self, remote_id: &RemoteId, payload: &StatusPayload) -> RemoteResult<()> {
        self.update_opportunity_status(remote_id, payload).await
    }

    async fn delete(&self, kind: EntityKind, remote_id: &RemoteId) -> RemoteResult<()> {
        match kind {
            EntityKind::Contact => self.delete_contact(remote_id).await,
            EntityKind::Opportunity => self.delete_opportunity(remote_id).await,
            EntityKind::CalendarEvent => self.delete_appointment(remote_id).await,
            EntityKind::Task => self.delete_task(remote_id).await,
        }
    }

    async fn list(&self, kind: EntityKind, cursor: Option<&str>) -> RemoteResult<RemotePage> {
        match kind {
            EntityKind::Contact => self.list_contacts(cursor).await,
            EntityKind::Opportunity => self.list_opportunities(cursor).await,
            EntityKind::CalendarEvent => self.list_appointments(cursor).await,
            EntityKind::Task => self.list_tasks(cursor).await,
        }
    }
}

fn item_path(collection: &str, remote_id: &RemoteId) -> String {
    format!("{collection}/{}", urlencoding::encode(remote_id.as_str()))
}

/// Created resources come back either wrapped (`{"contact": {"id": ..}}`) or
/// bare (`{"id": ..}`).
fn created_id(body: &Value, resource_key: &str) -> Option<RemoteId> {
    body.get(resource_key)
        .and_then(|resource| resource.get("id"))
        .or_else(|| body.get("id"))
        .and_then(Value::as_str)
        .and_then(RemoteId::new)
}

fn parse_page<T: DeserializeOwned>(
    mut body: Value,
    collection_key: &str,
    page_limit: usize,
    wrap: fn(T) -> RemoteRecord,
) -> RemoteResult<RemotePage> {
    let items = match body.get_mut(collection_key).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(RemoteError::decode(format!(
                "'{collection_key}' is not a list: {other}"
            )))
        }
    };

    let item_count = items.len();
    let last_raw_id = items
        .last()
        .and_then(|item| item.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string);

    let mut records = Vec::with_capacity(item_count);
    let mut undecodable = 0;
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(wrap(record)),
            Err(error) => {
                undecodable += 1;
                tracing::warn!(
                    collection = collection_key,
                    "Skipping undecodable record: {error}"
                );
            }
        }
    }

    let next_cursor = if item_count < page_limit {
        None
    } else {
        body.get("meta")
            .and_then(|meta| meta.get("startAfterId"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|cursor| !cursor.is_empty())
            .map(ToString::to_string)
            .or(last_raw_id)
    };

    Ok(RemotePage {
        records,
        next_cursor,
        undecodable,
    })
}

#[derive(Debug, Deserialize)]
struct CrmErrorBody {
    message: Option<Value>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<CrmErrorBody>(body) {
        let message = match payload.message {
            Some(Value::String(message)) => Some(message),
            Some(Value::Array(messages)) => Some(
                messages
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        };
        if let Some(message) = message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}
