//! Message identity and canonical timeline order.
//!
//! Two messages are the same message iff they share a server id. Optimistic
//! messages are keyed by their client request id until promoted. Anything
//! else falls back to `(ts in ms, direction, text)`, which can coalesce two
//! genuinely distinct messages sent in the same millisecond with identical
//! text. That approximation is accepted.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime};

use crate::state::{ChatMessage, MessageIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Server(String),
    Pending(String),
    Fallback {
        ts_ms: i64,
        direction: &'static str,
        text: String,
    },
}

pub fn message_key(message: &ChatMessage) -> MessageKey {
    match &message.identity {
        MessageIdentity::Confirmed { message_id } => MessageKey::Server(message_id.clone()),
        MessageIdentity::Pending { client_request_id } => {
            MessageKey::Pending(client_request_id.clone())
        }
        MessageIdentity::Unidentified => MessageKey::Fallback {
            ts_ms: message.ts_ms,
            direction: message.direction.as_str(),
            text: message.text.clone(),
        },
    }
}

/// Parse an ISO-8601 timestamp to epoch milliseconds (sub-ms precision is
/// truncated). Timestamps without an offset are read as UTC. Missing or
/// unparsable input maps to 0 so such messages sort first.
pub fn parse_ts_millis(ts: &str) -> i64 {
    let ts = ts.trim();
    if ts.is_empty() {
        return 0;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.timestamp_millis();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, fmt) {
            return naive.and_utc().timestamp_millis();
        }
    }
    0
}

/// Canonical order: ascending timestamp, then ascending server id with "no
/// id" first. The remaining tie-breakers only matter between messages that
/// have no server id, and make the order total.
pub fn cmp_messages(a: &ChatMessage, b: &ChatMessage) -> Ordering {
    a.ts_ms
        .cmp(&b.ts_ms)
        .then_with(|| {
            let ia = a.identity.message_id().unwrap_or("");
            let ib = b.identity.message_id().unwrap_or("");
            ia.cmp(ib)
        })
        .then_with(|| pending_id(a).cmp(&pending_id(b)))
        .then_with(|| a.direction.as_str().cmp(b.direction.as_str()))
        .then_with(|| a.text.cmp(&b.text))
}

fn pending_id(message: &ChatMessage) -> Option<&str> {
    match &message.identity {
        MessageIdentity::Pending { client_request_id } => Some(client_request_id),
        _ => None,
    }
}

pub fn sort_messages(messages: &mut [ChatMessage]) {
    messages.sort_by(cmp_messages);
}

/// Union `existing` and `incoming` by identity key, keeping the first
/// occurrence (existing entries win), then sort canonically.
///
/// `merge(merge(a, b), b) == merge(a, b)`.
pub fn merge_messages(existing: Vec<ChatMessage>, incoming: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut seen: HashSet<MessageKey> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut out: Vec<ChatMessage> = Vec::with_capacity(existing.len() + incoming.len());
    for message in existing.into_iter().chain(incoming.iter().cloned()) {
        if seen.insert(message_key(&message)) {
            out.push(message);
        }
    }
    sort_messages(&mut out);
    out
}

/// Promote optimistic entries whose client request id is echoed back by a
/// server message carrying a real id. Must run before merging `incoming`,
/// or the optimistic and server copies would survive as two messages.
///
/// Returns how many entries were promoted.
pub fn resolve_pending(existing: &mut [ChatMessage], incoming: &[ChatMessage]) -> usize {
    let server_ids: HashMap<&str, &str> = incoming
        .iter()
        .filter_map(|m| match (&m.client_request_id, m.identity.message_id()) {
            (Some(rid), Some(id)) => Some((rid.as_str(), id)),
            _ => None,
        })
        .collect();
    if server_ids.is_empty() {
        return 0;
    }

    let mut resolved = 0;
    for message in existing.iter_mut() {
        let MessageIdentity::Pending { client_request_id } = &message.identity else {
            continue;
        };
        if let Some(id) = server_ids.get(client_request_id.as_str()) {
            message.identity = MessageIdentity::Confirmed {
                message_id: (*id).to_string(),
            };
            resolved += 1;
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MessageDirection;

    fn msg(id: Option<&str>, ts: &str, dir: MessageDirection, text: &str) -> ChatMessage {
        ChatMessage {
            identity: match id {
                Some(id) => MessageIdentity::Confirmed {
                    message_id: id.to_string(),
                },
                None => MessageIdentity::Unidentified,
            },
            client_request_id: None,
            text: text.to_string(),
            direction: dir,
            ts: ts.to_string(),
            ts_ms: parse_ts_millis(ts),
            display_name: None,
            media: vec![],
        }
    }

    fn ids(messages: &[ChatMessage]) -> Vec<String> {
        messages
            .iter()
            .map(|m| match &m.identity {
                MessageIdentity::Confirmed { message_id } => message_id.clone(),
                MessageIdentity::Pending { client_request_id } => format!("pending:{client_request_id}"),
                MessageIdentity::Unidentified => format!("anon:{}", m.text),
            })
            .collect()
    }

    #[test]
    fn parses_offsets_naive_and_garbage() {
        assert_eq!(parse_ts_millis("1970-01-01T00:00:01Z"), 1000);
        assert_eq!(parse_ts_millis("1970-01-01T01:00:01+01:00"), 1000);
        assert_eq!(parse_ts_millis("1970-01-01T00:00:01.2349"), 1234);
        assert_eq!(parse_ts_millis("1970-01-01 00:00:02"), 2000);
        assert_eq!(parse_ts_millis(""), 0);
        assert_eq!(parse_ts_millis("yesterday"), 0);
    }

    #[test]
    fn order_is_total_and_independent_of_arrival() {
        let t = "2024-05-01T10:00:00Z";
        let a = msg(Some("b"), t, MessageDirection::In, "x");
        let b = msg(Some("a"), t, MessageDirection::In, "x");
        let c = msg(None, t, MessageDirection::Out, "y");
        let d = msg(Some("z"), "2024-05-01T09:00:00Z", MessageDirection::In, "early");

        let mut one = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let mut two = vec![c, d, b, a];
        sort_messages(&mut one);
        sort_messages(&mut two);
        assert_eq!(one, two);
        assert_eq!(ids(&one), vec!["z", "anon:y", "a", "b"]);

        let again = {
            let mut v = one.clone();
            sort_messages(&mut v);
            v
        };
        assert_eq!(again, one);
    }

    #[test]
    fn fallback_identity_truncates_to_millis() {
        let a = msg(None, "2024-05-01T10:00:00.1231Z", MessageDirection::In, "oi");
        let b = msg(None, "2024-05-01T10:00:00.1239Z", MessageDirection::In, "oi");
        assert_eq!(message_key(&a), message_key(&b));
        let c = msg(None, "2024-05-01T10:00:00.1239Z", MessageDirection::Out, "oi");
        assert_ne!(message_key(&a), message_key(&c));
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let mut resolved = msg(Some("srv1"), "2024-05-01T10:00:00Z", MessageDirection::Out, "olá");
        resolved.display_name = Some("Ana".into());
        let duplicate = msg(Some("srv1"), "2024-05-01T10:00:00Z", MessageDirection::Out, "olá");

        let merged = merge_messages(vec![resolved.clone()], &[duplicate]);
        assert_eq!(merged, vec![resolved]);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = vec![
            msg(Some("1"), "2024-05-01T10:00:00Z", MessageDirection::In, "oi"),
            msg(None, "2024-05-01T10:01:00Z", MessageDirection::Out, "tudo bem?"),
        ];
        let b = vec![
            msg(Some("2"), "2024-05-01T09:59:00Z", MessageDirection::In, "antes"),
            msg(Some("1"), "2024-05-01T10:00:00Z", MessageDirection::In, "oi"),
            msg(None, "2024-05-01T10:01:00Z", MessageDirection::Out, "tudo bem?"),
        ];
        let once = merge_messages(a, &b);
        let twice = merge_messages(once.clone(), &b);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);

        let self_merge = merge_messages(once.clone(), &once);
        assert_eq!(self_merge, once);
    }

    #[test]
    fn resolve_pending_rewrites_matching_optimistic_entries() {
        let mut existing = vec![ChatMessage::optimistic(
            "r1".into(),
            "olá".into(),
            None,
            "2024-05-01T10:00:00Z".into(),
        )];
        let mut server = msg(Some("srv9"), "2024-05-01T10:00:01Z", MessageDirection::Out, "olá");
        server.client_request_id = Some("r1".into());
        let unrelated = ChatMessage {
            client_request_id: Some("r2".into()),
            ..msg(Some("srv10"), "2024-05-01T10:00:02Z", MessageDirection::Out, "x")
        };

        assert_eq!(resolve_pending(&mut existing, &[server.clone(), unrelated]), 1);
        assert_eq!(existing[0].identity.message_id(), Some("srv9"));

        let merged = merge_messages(existing, &[server]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn resolve_pending_ignores_server_messages_without_id() {
        let mut existing = vec![ChatMessage::optimistic(
            "r1".into(),
            "olá".into(),
            None,
            "2024-05-01T10:00:00Z".into(),
        )];
        let echo = ChatMessage {
            client_request_id: Some("r1".into()),
            ..msg(None, "2024-05-01T10:00:00Z", MessageDirection::Out, "olá")
        };
        assert_eq!(resolve_pending(&mut existing, &[echo]), 0);
        assert!(existing[0].is_pending());
    }
}
