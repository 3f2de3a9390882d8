//! Conversation search: local matching over loaded tab rows merged with a
//! remote lookup.

use std::collections::HashSet;

use crate::state::{ConversationSummary, SearchState, SearchStatus};
use crate::transport::{Page, TransportError};

pub(crate) const REMOTE_SEARCH_LIMIT: u32 = 50;

/// Tag ids an operator can type bare, without `tag:` or `#`.
pub(crate) const KNOWN_TAGS: &[&str] = &[
    "marcacao",
    "remarcacao",
    "duvida",
    "exames",
    "convenio",
    "retorno",
    "reclamacao",
    "urgente",
];

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Lowercase, strip accents, keep `[a-z0-9_-]`.
pub(crate) fn normalize_tag(value: &str) -> String {
    value
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_diacritic)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// `tag:x` and `#x` are always tag queries; a bare word only when it names
/// a known tag.
pub(crate) fn tag_query(query: &str) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    let lower = query.to_lowercase();
    let (candidate, explicit) = if lower.starts_with("tag:") {
        (&query[4..], true)
    } else if let Some(rest) = query.strip_prefix('#') {
        (rest, true)
    } else {
        (query, false)
    };
    let normalized = normalize_tag(candidate);
    if normalized.is_empty() {
        return None;
    }
    if explicit || KNOWN_TAGS.contains(&normalized.as_str()) {
        Some(normalized)
    } else {
        None
    }
}

pub(crate) fn local_matches<'a>(
    query: &str,
    rows: impl Iterator<Item = &'a ConversationSummary>,
) -> Vec<ConversationSummary> {
    let query = query.trim();
    if query.is_empty() {
        return vec![];
    }
    let tag = tag_query(query);
    let mut seen = HashSet::new();
    rows.filter(|c| match &tag {
        Some(tag) => c.tags.iter().any(|t| normalize_tag(t) == *tag),
        None => {
            c.conversation_id.contains(query)
                || c.last_message_text
                    .as_deref()
                    .is_some_and(|text| text.contains(query))
        }
    })
    .filter(|c| seen.insert(c.conversation_id.clone()))
    .cloned()
    .collect()
}

/// Local rows first; remote rows only when their id was not matched locally.
pub(crate) fn merge_results(
    local: &[ConversationSummary],
    remote: &[ConversationSummary],
) -> Vec<ConversationSummary> {
    let mut seen: HashSet<&str> = local.iter().map(|c| c.conversation_id.as_str()).collect();
    let mut out = local.to_vec();
    for conv in remote {
        if seen.insert(conv.conversation_id.as_str()) {
            out.push(conv.clone());
        }
    }
    out
}

#[derive(Debug, Default)]
pub(crate) struct Search {
    token: u64,
    query: Option<String>,
    local: Vec<ConversationSummary>,
    remote: Vec<ConversationSummary>,
    status: Option<SearchStatus>,
}

impl Search {
    /// Start a search. Returns the token and trimmed query the remote lookup
    /// must be issued with, or `None` when the query is empty (search cleared).
    pub(crate) fn begin<'a>(
        &mut self,
        query: &str,
        rows: impl Iterator<Item = &'a ConversationSummary>,
    ) -> Option<(u64, String)> {
        let query = query.trim();
        if query.is_empty() {
            self.clear();
            return None;
        }
        self.token += 1;
        self.query = Some(query.to_string());
        self.local = local_matches(query, rows);
        self.remote.clear();
        self.status = Some(if self.local.is_empty() {
            SearchStatus::Searching
        } else {
            SearchStatus::Idle
        });
        Some((self.token, query.to_string()))
    }

    pub(crate) fn clear(&mut self) {
        self.token += 1;
        self.query = None;
        self.local.clear();
        self.remote.clear();
        self.status = None;
    }

    /// Recompute the local side after the tab lists changed.
    pub(crate) fn refresh_local<'a>(&mut self, rows: impl Iterator<Item = &'a ConversationSummary>) {
        if let Some(query) = &self.query {
            self.local = local_matches(query, rows);
            if !self.local.is_empty() && self.status == Some(SearchStatus::NotFound) {
                self.status = Some(SearchStatus::Idle);
            }
        }
    }

    /// Returns false when the result belongs to a superseded query.
    pub(crate) fn apply_remote(
        &mut self,
        token: u64,
        result: Result<Page<ConversationSummary>, TransportError>,
    ) -> bool {
        if token != self.token || self.query.is_none() {
            return false;
        }
        match result {
            Ok(page) => self.remote = page.items,
            Err(e) => {
                tracing::warn!(err = %e, "remote search failed");
                self.remote.clear();
            }
        }
        self.status = Some(if self.local.is_empty() && self.remote.is_empty() {
            SearchStatus::NotFound
        } else {
            SearchStatus::Idle
        });
        true
    }

    pub(crate) fn state(&self) -> Option<SearchState> {
        Some(SearchState {
            query: self.query.clone()?,
            results: merge_results(&self.local, &self.remote),
            status: self.status.clone().unwrap_or(SearchStatus::Idle),
        })
    }
}
