//! Message timeline for the selected conversation.
//!
//! The engine never performs IO. `begin_*` hands out a [`PageRequest`] and
//! latches the matching in-flight flag; the actor runs the fetch and feeds
//! the result back through [`Timeline::apply_page`]. Every request carries
//! the conversation id and generation it was issued for, so results that
//! arrive after a switch or reset are dropped as stale.

use std::collections::HashSet;

use crate::ordering::{merge_messages, message_key, resolve_pending, MessageKey};
use crate::state::{ChatMessage, ChatViewState, MessageDirection, MessageIdentity};
use crate::transport::{Page, TransportError};

use super::config::PageSizes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageKind {
    Initial,
    Older,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub(crate) conversation_id: String,
    pub(crate) generation: u64,
    pub(crate) kind: PageKind,
    pub(crate) limit: u32,
    pub(crate) cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MergeReport {
    /// Entries whose identity was not in the timeline before.
    pub(crate) added: usize,
    /// Optimistic entries promoted to a server identity.
    pub(crate) resolved: usize,
    /// The newest entry changed, i.e. something landed at the bottom.
    pub(crate) appended_tail: bool,
    /// Newly seen inbound messages newer than the previous tail.
    pub(crate) new_inbound: usize,
    pub(crate) first_inbound_text: Option<String>,
}

#[derive(Debug)]
pub(crate) enum PageOutcome {
    Stale,
    Failed(TransportError),
    Applied(MergeReport),
}

#[derive(Debug)]
pub(crate) struct Timeline {
    conversation_id: Option<String>,
    generation: u64,
    messages: Vec<ChatMessage>,
    cursor: Option<String>,
    has_more: bool,
    loading_older: bool,
    refreshing: bool,
    // Whether a newest page has been applied since the last reset.
    loaded: bool,
    sizes: PageSizes,
}

impl Timeline {
    pub(crate) fn new(sizes: PageSizes) -> Self {
        Self {
            conversation_id: None,
            generation: 0,
            messages: vec![],
            cursor: None,
            has_more: true,
            loading_older: false,
            refreshing: false,
            loaded: false,
            sizes,
        }
    }

    pub(crate) fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[cfg(test)]
    pub(crate) fn has_more(&self) -> bool {
        self.has_more
    }

    #[cfg(test)]
    pub(crate) fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    /// Clear everything and start a fresh generation, optionally bound to a
    /// new conversation. Results of any request issued before this are stale.
    pub(crate) fn reset(&mut self, conversation_id: Option<String>) {
        self.generation += 1;
        self.conversation_id = conversation_id;
        self.messages.clear();
        self.cursor = None;
        self.has_more = true;
        self.loading_older = false;
        self.refreshing = false;
        self.loaded = false;
    }

    fn request(&self, kind: PageKind, limit: u32, cursor: Option<String>) -> Option<PageRequest> {
        Some(PageRequest {
            conversation_id: self.conversation_id.clone()?,
            generation: self.generation,
            kind,
            limit,
            cursor,
        })
    }

    pub(crate) fn begin_initial(&mut self) -> Option<PageRequest> {
        let req = self.request(PageKind::Initial, self.sizes.initial, None)?;
        self.refreshing = true;
        Some(req)
    }

    /// `None` when exhausted, when any load is in flight, or when no cursor
    /// is held yet.
    pub(crate) fn begin_older(&mut self) -> Option<PageRequest> {
        if !self.has_more || self.loading_older || self.refreshing {
            return None;
        }
        let cursor = self.cursor.clone()?;
        let req = self.request(PageKind::Older, self.sizes.older, Some(cursor))?;
        self.loading_older = true;
        Some(req)
    }

    /// `None` while an older page or another newest-page fetch is in flight.
    pub(crate) fn begin_refresh(&mut self) -> Option<PageRequest> {
        if self.loading_older || self.refreshing {
            return None;
        }
        let req = self.request(PageKind::Refresh, self.sizes.initial, None)?;
        self.refreshing = true;
        Some(req)
    }

    pub(crate) fn is_current(&self, conversation_id: &str, generation: u64) -> bool {
        self.generation == generation && self.conversation_id.as_deref() == Some(conversation_id)
    }

    pub(crate) fn apply_page(
        &mut self,
        req: &PageRequest,
        result: Result<Page<ChatMessage>, TransportError>,
    ) -> PageOutcome {
        if !self.is_current(&req.conversation_id, req.generation) {
            return PageOutcome::Stale;
        }
        match req.kind {
            PageKind::Initial | PageKind::Refresh => self.refreshing = false,
            PageKind::Older => self.loading_older = false,
        }
        let page = match result {
            Ok(page) => page,
            Err(e) => return PageOutcome::Failed(e),
        };
        let cursor = page.cursor();
        let incoming = page.items;

        let report = match req.kind {
            PageKind::Initial => {
                // Full replace; optimistic entries do not survive a reload.
                self.messages = merge_messages(Vec::new(), &incoming);
                self.set_cursor(cursor);
                self.loaded = true;
                MergeReport {
                    added: self.messages.len(),
                    resolved: 0,
                    appended_tail: false,
                    new_inbound: 0,
                    first_inbound_text: None,
                }
            }
            PageKind::Older => {
                let report = self.merge(&incoming, 0);
                self.set_cursor(cursor);
                report
            }
            PageKind::Refresh => {
                let resolved = resolve_pending(&mut self.messages, &incoming);
                let report = self.merge(&incoming, resolved);
                if !self.loaded {
                    // The initial load failed; the first good refresh seeds paging.
                    self.set_cursor(cursor);
                    self.loaded = true;
                }
                report
            }
        };
        PageOutcome::Applied(report)
    }

    fn set_cursor(&mut self, cursor: Option<String>) {
        self.has_more = cursor.is_some();
        self.cursor = cursor;
    }

    fn merge(&mut self, incoming: &[ChatMessage], resolved: usize) -> MergeReport {
        let before: HashSet<MessageKey> = self.messages.iter().map(message_key).collect();
        let old_tail = self.messages.last().map(message_key);

        let existing = std::mem::take(&mut self.messages);
        self.messages = merge_messages(existing, incoming);

        let new_tail = self.messages.last().map(message_key);
        let appended_tail = new_tail.is_some() && new_tail != old_tail;

        let tail_pos = old_tail
            .as_ref()
            .and_then(|k| self.messages.iter().position(|m| &message_key(m) == k));
        let mut added = 0;
        let mut new_inbound = 0;
        let mut first_inbound_text = None;
        for (i, m) in self.messages.iter().enumerate() {
            if before.contains(&message_key(m)) {
                continue;
            }
            added += 1;
            let after_tail = tail_pos.map(|p| i > p).unwrap_or(true);
            if after_tail && m.direction == MessageDirection::In {
                new_inbound += 1;
                if first_inbound_text.is_none() {
                    first_inbound_text = Some(m.text.clone());
                }
            }
        }

        MergeReport {
            added,
            resolved,
            appended_tail: appended_tail && added > 0,
            new_inbound,
            first_inbound_text,
        }
    }

    /// Insert a locally-originated message. Returns false when no
    /// conversation is open.
    pub(crate) fn append_optimistic(&mut self, message: ChatMessage) -> bool {
        if self.conversation_id.is_none() {
            return false;
        }
        let existing = std::mem::take(&mut self.messages);
        self.messages = merge_messages(existing, std::slice::from_ref(&message));
        true
    }

    /// Fold a send response into the timeline: promote the optimistic entry
    /// it confirms, then merge it. `None` when the timeline has moved on.
    ///
    /// An echo without a server id cannot promote anything; when a pending
    /// entry already carries its `client_request_id` the echo is dropped and
    /// the next refresh does the promotion.
    pub(crate) fn confirm_sent(
        &mut self,
        conversation_id: &str,
        generation: u64,
        message: ChatMessage,
    ) -> Option<MergeReport> {
        if !self.is_current(conversation_id, generation) {
            return None;
        }
        if message.identity.message_id().is_none()
            && self.has_pending(message.client_request_id.as_deref())
        {
            return Some(MergeReport::default());
        }
        let incoming = [message];
        let resolved = resolve_pending(&mut self.messages, &incoming);
        Some(self.merge(&incoming, resolved))
    }

    fn has_pending(&self, client_request_id: Option<&str>) -> bool {
        let Some(rid) = client_request_id else {
            return false;
        };
        self.messages.iter().any(|m| match &m.identity {
            MessageIdentity::Pending { client_request_id } => client_request_id == rid,
            _ => false,
        })
    }

    pub(crate) fn view(&self, outside_24h_window: bool) -> Option<ChatViewState> {
        Some(ChatViewState {
            conversation_id: self.conversation_id.clone()?,
            messages: self.messages.clone(),
            has_more: self.has_more,
            is_loading_older: self.loading_older,
            is_refreshing: self.refreshing,
            outside_24h_window,
        })
    }
}
