//! Client for the external WhatsApp automation service.
//!
//! Every provider endpoint answers `{success, data | error}`. Calls are made
//! on behalf of an explicit [`WhatsappSession`] handle.

use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::config::WhatsappSettings;
use crate::metrics::{status_label, WHATSAPP_REQUESTS_TOTAL};
use crate::models::classroom::Classroom;
use crate::models::collections::{CLASSROOMS, USERS};
use crate::models::user::User;
use crate::models::whatsapp::{
    ApiEnvelope, ClassroomGroupSync, CreateGroupRequest, GroupInfo, MessageContent,
    SendMessageRequest, SentMessage, SessionInfo, SyncParticipantsRequest, SyncParticipantsResult,
};
use crate::services::require;
use crate::store::{SharedStore, Update};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("WhatsApp request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WhatsApp provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WhatsApp provider error: {0}")]
    Provider(String),

    #[error("WhatsApp provider returned no data")]
    EmptyResponse,

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

impl MessagingError {
    /// Transport failures and 5xx answers may succeed on a later attempt
    fn is_transient(&self) -> bool {
        match self {
            MessagingError::Http(err) => err.is_timeout() || err.is_connect(),
            MessagingError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Handle of a provider session, passed into every messaging call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsappSession {
    id: String,
}

impl WhatsappSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug)]
pub struct WhatsappClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    default_session: WhatsappSession,
    retry: RetryConfig,
}

impl WhatsappClient {
    pub fn from_settings(settings: &WhatsappSettings) -> anyhow::Result<Self> {
        let base_url = Url::parse(&settings.api_url).context("Invalid WhatsApp API URL")?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            bail!(
                "Invalid WhatsApp API scheme: {}. Must be http or https.",
                base_url.scheme()
            );
        }
        if base_url.cannot_be_a_base() {
            bail!("WhatsApp API URL cannot be used as a base URL");
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build WhatsApp HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.api_key.clone(),
            default_session: WhatsappSession::new(settings.session_id.clone()),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Session used for messages the service sends on its own
    pub fn default_session(&self) -> &WhatsappSession {
        &self.default_session
    }

    pub async fn start_session(
        &self,
        session_id: &str,
    ) -> Result<(WhatsappSession, SessionInfo), MessagingError> {
        let info: SessionInfo = self
            .call(
                "start_session",
                Method::POST,
                &["sessions"],
                Some(json!({ "sessionId": session_id })),
            )
            .await?
            .ok_or(MessagingError::EmptyResponse)?;

        tracing::info!(session_id = %info.session_id, state = ?info.state, "WhatsApp session started");
        Ok((WhatsappSession::new(info.session_id.clone()), info))
    }

    /// Session status; retried on transient failures.
    pub async fn session_status(&self, session: &WhatsappSession) -> Result<SessionInfo, MessagingError> {
        retry_async_with_config(&self.retry, MessagingError::is_transient, || async {
            self.call::<SessionInfo>("session_status", Method::GET, &["sessions", session.id()], None)
                .await?
                .ok_or(MessagingError::EmptyResponse)
        })
        .await
    }

    pub async fn restart_session(&self, session: &WhatsappSession) -> Result<SessionInfo, MessagingError> {
        self.call(
            "restart_session",
            Method::POST,
            &["sessions", session.id(), "restart"],
            None,
        )
        .await?
        .ok_or(MessagingError::EmptyResponse)
    }

    pub async fn close_session(&self, session: &WhatsappSession) -> Result<(), MessagingError> {
        self.call::<serde_json::Value>(
            "close_session",
            Method::DELETE,
            &["sessions", session.id()],
            None,
        )
        .await?;
        tracing::info!(session_id = session.id(), "WhatsApp session closed");
        Ok(())
    }

    pub async fn create_group(
        &self,
        session: &WhatsappSession,
        req: &CreateGroupRequest,
    ) -> Result<GroupInfo, MessagingError> {
        let participants = req
            .participants
            .iter()
            .map(|p| normalize_phone(p).ok_or_else(|| MessagingError::InvalidPhone(p.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let body = json!({
            "title": req.title,
            "description": req.description,
            "participants": participants,
        });

        self.call(
            "create_group",
            Method::POST,
            &["sessions", session.id(), "groups"],
            Some(body),
        )
        .await?
        .ok_or(MessagingError::EmptyResponse)
    }

    pub async fn sync_participants(
        &self,
        session: &WhatsappSession,
        group_id: &str,
        req: &SyncParticipantsRequest,
    ) -> Result<SyncParticipantsResult, MessagingError> {
        let normalize_all = |phones: &[String]| {
            phones
                .iter()
                .map(|p| normalize_phone(p).ok_or_else(|| MessagingError::InvalidPhone(p.clone())))
                .collect::<Result<Vec<_>, _>>()
        };
        let body = json!({
            "add": normalize_all(&req.add)?,
            "remove": normalize_all(&req.remove)?,
        });

        self.call(
            "sync_participants",
            Method::POST,
            &["sessions", session.id(), "groups", group_id, "participants"],
            Some(body),
        )
        .await?
        .ok_or(MessagingError::EmptyResponse)
    }

    pub async fn send_message(
        &self,
        session: &WhatsappSession,
        req: &SendMessageRequest,
    ) -> Result<SentMessage, MessagingError> {
        let recipients = req
            .recipients
            .iter()
            .map(|r| normalize_recipient(r).ok_or_else(|| MessagingError::InvalidPhone(r.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let body = json!({
            "recipients": recipients,
            "content": req.content,
            "delayMs": req.delay_ms,
            "groupTitle": req.group_title,
        });

        self.call(
            "send_message",
            Method::POST,
            &["sessions", session.id(), "messages"],
            Some(body),
        )
        .await?
        .ok_or(MessagingError::EmptyResponse)
    }

    /// Posts the end-of-course message to a classroom's group.
    pub async fn notify_classroom_completion(
        &self,
        session: &WhatsappSession,
        classroom: &Classroom,
        group_id: &str,
    ) -> Result<SentMessage, MessagingError> {
        let req = SendMessageRequest {
            recipients: vec![group_id.to_string()],
            content: MessageContent::Text {
                text: format!(
                    "La clase \"{}\" ha finalizado. ¡Gracias por participar!",
                    classroom.name
                ),
            },
            delay_ms: 0,
            group_title: Some(classroom.name.clone()),
        };
        self.send_message(session, &req).await
    }

    /// Creates the classroom's group from enrolled students' phones, or adds
    /// them to the existing one.
    pub async fn sync_classroom_group(
        &self,
        store: &SharedStore,
        session: &WhatsappSession,
        classroom_id: &str,
    ) -> anyhow::Result<ClassroomGroupSync> {
        let classroom: Classroom = require(&**store, CLASSROOMS, classroom_id, "Classroom").await?;

        let mut phones = Vec::new();
        let mut skipped_students = Vec::new();
        for student_id in &classroom.student_ids {
            let student = store
                .get_as::<User>(USERS, student_id)
                .await
                .context("Failed to load student")?;
            match student
                .as_ref()
                .and_then(|s| s.phone.as_deref())
                .and_then(normalize_phone)
            {
                Some(phone) => phones.push(phone),
                None => skipped_students.push(student_id.clone()),
            }
        }

        match classroom.whatsapp_group_id.as_deref() {
            Some(group_id) => {
                let participants = self
                    .sync_participants(
                        session,
                        group_id,
                        &SyncParticipantsRequest {
                            add: phones,
                            remove: Vec::new(),
                        },
                    )
                    .await?;

                Ok(ClassroomGroupSync {
                    group_id: group_id.to_string(),
                    created: false,
                    participants,
                    skipped_students,
                })
            }
            None => {
                if phones.is_empty() {
                    bail!("No students with a phone number to create the group");
                }

                let group = self
                    .create_group(
                        session,
                        &CreateGroupRequest {
                            title: classroom.name.clone(),
                            description: Some(classroom.subject.clone()).filter(|s| !s.is_empty()),
                            participants: phones.clone(),
                        },
                    )
                    .await?;

                store
                    .update(
                        CLASSROOMS,
                        classroom_id,
                        Update::new().set("whatsappGroupId", group.group_id.as_str()),
                    )
                    .await
                    .context("Failed to store WhatsApp group id")?;

                tracing::info!(classroom_id, group_id = %group.group_id, "WhatsApp group created");
                Ok(ClassroomGroupSync {
                    group_id: group.group_id,
                    created: true,
                    participants: SyncParticipantsResult {
                        added: phones,
                        removed: Vec::new(),
                        failed: Vec::new(),
                    },
                    skipped_students,
                })
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<Option<T>, MessagingError> {
        let result = self.send(method, segments, body).await;

        WHATSAPP_REQUESTS_TOTAL
            .with_label_values(&[operation, status_label(result.is_ok())])
            .inc();
        if let Err(err) = &result {
            tracing::warn!(operation, "WhatsApp call failed: {}", err);
        }

        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<Option<T>, MessagingError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MessagingError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);

        let mut request = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.success {
            return Err(MessagingError::Provider(
                envelope
                    .error
                    .unwrap_or_else(|| "unknown provider error".to_string()),
            ));
        }
        Ok(envelope.data)
    }
}

/// Keeps digits only; `None` when too few remain to be a phone number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= MIN_PHONE_DIGITS).then_some(digits)
}

/// Provider ids (`...@g.us`, `...@c.us`) pass through, phones are normalized.
fn normalize_recipient(raw: &str) -> Option<String> {
    if raw.contains('@') {
        Some(raw.trim().to_string())
    } else {
        normalize_phone(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phones_are_reduced_to_digits() {
        assert_eq!(normalize_phone("+52 (55) 1234-5678"), Some("525512345678".to_string()));
        assert_eq!(normalize_phone("12-34"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn group_ids_are_not_normalized() {
        assert_eq!(
            normalize_recipient("120363025@g.us"),
            Some("120363025@g.us".to_string())
        );
        assert_eq!(normalize_recipient("55 1234 5678"), Some("5512345678".to_string()));
    }

    #[test]
    fn only_transport_and_server_errors_are_transient() {
        assert!(MessagingError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!MessagingError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!MessagingError::Provider("session closed".to_string()).is_transient());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let settings = WhatsappSettings {
            api_url: "ftp://provider.local".to_string(),
            api_key: None,
            timeout_secs: 5,
            session_id: "classroom".to_string(),
        };
        assert!(WhatsappClient::from_settings(&settings).is_err());
    }
}
