//! REST boundary to the conversation/message store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ordering::parse_ts_millis;
use crate::state::{
    null_as_empty, ChatMessage, ConversationSummary, MediaAttachment, MessageDirection,
    MessageIdentity,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("API {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("malformed payload: {0}")]
    Decode(String),
}

impl TransportError {
    /// Text suitable for a toast.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::RateLimited {
                retry_after_ms: Some(ms),
            } => format!("Too many requests. Try again in ~{}s.", ms.div_ceil(1000)),
            TransportError::RateLimited { retry_after_ms: None } => {
                "Too many requests. Try again shortly.".to_string()
            }
            TransportError::Unauthorized => "Session expired. Please sign in again.".to_string(),
            other => other.to_string(),
        }
    }
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// An empty cursor means the same as no cursor: end of collection.
    pub fn cursor(&self) -> Option<String> {
        self.next_cursor.clone().filter(|c| !c.is_empty())
    }
}

impl Page<WireMessage> {
    pub fn into_messages(self) -> Page<ChatMessage> {
        Page {
            items: self.items.into_iter().map(ChatMessage::from).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Message as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WireMessage {
    pub message_id: Option<String>,
    pub client_request_id: Option<String>,
    pub text: Option<String>,
    pub direction: Option<MessageDirection>,
    pub ts: Option<String>,
    pub display_name: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub media: Vec<MediaAttachment>,
    // Legacy single-attachment fields.
    pub media_url: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub media_urls: Vec<String>,
    pub media_type: Option<String>,
    pub mime: Option<String>,
    pub content_type: Option<String>,
}

impl From<WireMessage> for ChatMessage {
    fn from(w: WireMessage) -> Self {
        let identity = match w.message_id.filter(|id| !id.is_empty()) {
            Some(message_id) => MessageIdentity::Confirmed { message_id },
            None => MessageIdentity::Unidentified,
        };

        let mut media = w.media;
        if media.is_empty() {
            let content_type = w.media_type.or(w.content_type).or(w.mime);
            let urls = w.media_url.into_iter().chain(w.media_urls);
            for url in urls.filter(|u| !u.is_empty()) {
                media.push(MediaAttachment {
                    signed_url: None,
                    gcs_url: None,
                    url: Some(url),
                    content_type: content_type.clone(),
                    mime: None,
                });
            }
        }

        let ts = w.ts.unwrap_or_default();
        Self {
            identity,
            client_request_id: w.client_request_id.filter(|r| !r.is_empty()),
            text: w.text.unwrap_or_default(),
            direction: w.direction.unwrap_or_default(),
            ts_ms: parse_ts_millis(&ts),
            ts,
            display_name: w.display_name,
            media,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    pub text: String,
    pub client_request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub message: Option<WireMessage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct WindowStatus {
    #[serde(default)]
    pub outside_24h_window: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub status: String,
    pub limit: u32,
    pub cursor: Option<String>,
    pub mine: bool,
}

#[async_trait]
pub trait DeskTransport: Send + Sync + 'static {
    async fn list_conversations(
        &self,
        query: ListQuery,
    ) -> Result<Page<ConversationSummary>, TransportError>;

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationSummary, TransportError>;

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<WireMessage>, TransportError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        request: SendRequest,
    ) -> Result<SendResponse, TransportError>;

    async fn window_status(&self, conversation_id: &str) -> Result<WindowStatus, TransportError>;

    async fn search_conversations(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Page<ConversationSummary>, TransportError>;
}

pub type SharedTransport = Arc<dyn DeskTransport>;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    session_cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        api_prefix: &str,
        session_cookie: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url.trim())
            .map_err(|e| TransportError::Network(format!("invalid base url {base_url}: {e}")))?;
        {
            let mut segments = base.path_segments_mut().map_err(|_| {
                TransportError::Network(format!("base url cannot carry a path: {base_url}"))
            })?;
            segments
                .pop_if_empty()
                .extend(api_prefix.split('/').filter(|s| !s.is_empty()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base,
            session_cookie: session_cookie.filter(|c| !c.is_empty()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn with_session(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => req.header(COOKIE, cookie),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let req = self.with_session(self.client.get(url).query(query));
        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        decode_response(resp).await
    }
}

async fn decode_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
    let status = resp.status();
    if status.is_success() {
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        // 204 and empty bodies decode as an empty object so optional fields default.
        let body: &[u8] = if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            b"{}"
        } else {
            &bytes
        };
        return serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()));
    }

    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let body = resp.text().await.unwrap_or_default();
    Err(error_from_response(
        status.as_u16(),
        retry_after.as_deref(),
        is_json,
        &body,
    ))
}

/// Map a non-2xx response to the error taxonomy.
pub(crate) fn error_from_response(
    status: u16,
    retry_after: Option<&str>,
    is_json: bool,
    body: &str,
) -> TransportError {
    let json: Option<serde_json::Value> = if is_json {
        serde_json::from_str(body).ok()
    } else {
        None
    };

    match status {
        401 => TransportError::Unauthorized,
        429 => {
            let from_header = retry_after
                .and_then(|h| h.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite())
                .map(|secs| (secs.max(0.0) * 1000.0).floor() as u64);
            let from_body = json
                .as_ref()
                .and_then(|v| v.pointer("/error/retry_after_ms"))
                .and_then(|v| v.as_u64())
                .filter(|ms| *ms > 0);
            TransportError::RateLimited {
                retry_after_ms: from_header.or(from_body),
            }
        }
        _ => {
            let reason = StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed");
            let (message, code) = match &json {
                Some(v) => {
                    let message = v
                        .pointer("/error/message")
                        .or_else(|| v.get("message"))
                        .and_then(|m| m.as_str())
                        .filter(|m| !m.is_empty())
                        .unwrap_or(reason)
                        .to_string();
                    let code = v
                        .pointer("/error/code")
                        .and_then(|c| c.as_str())
                        .map(str::to_owned);
                    (message, code)
                }
                None if !body.trim().is_empty() && !is_json => (body.trim().to_string(), None),
                None => (reason.to_string(), None),
            };
            TransportError::Status {
                status,
                code,
                message,
            }
        }
    }
}

#[async_trait]
impl DeskTransport for HttpTransport {
    async fn list_conversations(
        &self,
        query: ListQuery,
    ) -> Result<Page<ConversationSummary>, TransportError> {
        let mut params = vec![
            ("status", query.status),
            ("limit", query.limit.to_string()),
        ];
        if let Some(cursor) = query.cursor.filter(|c| !c.is_empty()) {
            params.push(("cursor", cursor));
        }
        if query.mine {
            params.push(("mine", "true".to_string()));
        }
        self.get_json(self.endpoint(&["conversations"]), &params)
            .await
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationSummary, TransportError> {
        self.get_json(self.endpoint(&["conversations", conversation_id]), &[])
            .await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<WireMessage>, TransportError> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("cursor", cursor.to_string()));
        }
        self.get_json(
            self.endpoint(&["conversations", conversation_id, "messages"]),
            &params,
        )
        .await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        request: SendRequest,
    ) -> Result<SendResponse, TransportError> {
        let url = self.endpoint(&["conversations", conversation_id, "send"]);
        let req = self.with_session(self.client.post(url).json(&request));
        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        decode_response(resp).await
    }

    async fn window_status(&self, conversation_id: &str) -> Result<WindowStatus, TransportError> {
        self.get_json(
            self.endpoint(&["conversations", conversation_id, "window-status"]),
            &[],
        )
        .await
    }

    async fn search_conversations(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Page<ConversationSummary>, TransportError> {
        let params = [("q", query.to_string()), ("limit", limit.to_string())];
        self.get_json(self.endpoint(&["conversations", "search"]), &params)
            .await
    }
}

/// Used when networking is disabled by config: every call fails as a
/// network error, so the core behaves as if permanently offline.
#[derive(Debug, Clone, Default)]
pub struct OfflineTransport;

fn offline<T>() -> Result<T, TransportError> {
    Err(TransportError::Network("network disabled".to_string()))
}

#[async_trait]
impl DeskTransport for OfflineTransport {
    async fn list_conversations(
        &self,
        _query: ListQuery,
    ) -> Result<Page<ConversationSummary>, TransportError> {
        offline()
    }

    async fn get_conversation(
        &self,
        _conversation_id: &str,
    ) -> Result<ConversationSummary, TransportError> {
        offline()
    }

    async fn fetch_messages(
        &self,
        _conversation_id: &str,
        _limit: u32,
        _cursor: Option<&str>,
    ) -> Result<Page<WireMessage>, TransportError> {
        offline()
    }

    async fn send_message(
        &self,
        _conversation_id: &str,
        _request: SendRequest,
    ) -> Result<SendResponse, TransportError> {
        offline()
    }

    async fn window_status(&self, _conversation_id: &str) -> Result<WindowStatus, TransportError> {
        offline()
    }

    async fn search_conversations(
        &self,
        _query: &str,
        _limit: u32,
    ) -> Result<Page<ConversationSummary>, TransportError> {
        offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_prefers_header_then_body() {
        assert_eq!(
            error_from_response(429, Some("2.5"), false, ""),
            TransportError::RateLimited {
                retry_after_ms: Some(2500)
            }
        );
        assert_eq!(
            error_from_response(
                429,
                None,
                true,
                r#"{"error":{"retry_after_ms":1200}}"#
            ),
            TransportError::RateLimited {
                retry_after_ms: Some(1200)
            }
        );
        let err = error_from_response(429, Some("soon"), false, "");
        assert_eq!(err, TransportError::RateLimited { retry_after_ms: None });
        assert_eq!(err.user_message(), "Too many requests. Try again shortly.");
    }

    #[test]
    fn status_message_falls_back_through_body_shapes() {
        let nested = error_from_response(
            409,
            None,
            true,
            r#"{"error":{"message":"already claimed","code":"CONFLICT"}}"#,
        );
        assert_eq!(
            nested,
            TransportError::Status {
                status: 409,
                code: Some("CONFLICT".into()),
                message: "already claimed".into(),
            }
        );

        let flat = error_from_response(400, None, true, r#"{"message":"bad cursor"}"#);
        assert_eq!(flat.to_string(), "API 400: bad cursor");

        let text = error_from_response(502, None, false, "upstream down\n");
        assert_eq!(text.to_string(), "API 502: upstream down");

        let empty = error_from_response(503, None, false, "");
        assert_eq!(empty.to_string(), "API 503: Service Unavailable");
    }

    #[test]
    fn unauthorized_ignores_body() {
        assert_eq!(
            error_from_response(401, None, true, r#"{"message":"x"}"#),
            TransportError::Unauthorized
        );
    }

    #[test]
    fn wire_message_maps_identity_and_legacy_media() {
        let wire: WireMessage = serde_json::from_value(serde_json::json!({
            "message_id": "",
            "client_request_id": "r1",
            "direction": "in",
            "ts": "2024-05-01T10:00:00Z",
            "media_url": "https://cdn.example/a.jpg",
            "media_type": "image/jpeg",
            "media": null,
        }))
        .unwrap();
        let msg = ChatMessage::from(wire);
        assert_eq!(msg.identity, MessageIdentity::Unidentified);
        assert_eq!(msg.client_request_id.as_deref(), Some("r1"));
        assert_eq!(msg.direction, MessageDirection::In);
        assert_eq!(msg.text, "");
        assert_eq!(msg.media.len(), 1);
        assert_eq!(msg.media[0].content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn empty_cursor_means_end_of_collection() {
        let page: Page<WireMessage> =
            serde_json::from_value(serde_json::json!({ "items": null, "next_cursor": "" }))
                .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.cursor(), None);
    }
}
