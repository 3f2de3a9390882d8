use serde::{Deserialize, Deserializer};

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub current_tab: ConversationTab,
    pub tabs: Vec<TabState>,
    pub selected_conversation: Option<ConversationSummary>,
    pub selected_user_name: String,
    pub current_chat: Option<ChatViewState>,
    pub busy: BusyState,
    pub connected: bool,
    pub page_visible: bool,
    pub search: Option<SearchState>,
    pub notification: Option<DeskNotification>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            current_tab: ConversationTab::Bot,
            tabs: ConversationTab::ALL
                .iter()
                .map(|tab| TabState::empty(*tab))
                .collect(),
            selected_conversation: None,
            selected_user_name: String::new(),
            current_chat: None,
            busy: BusyState::idle(),
            connected: true,
            page_visible: true,
            search: None,
            notification: None,
            toast: None,
        }
    }

    pub fn tab(&self, tab: ConversationTab) -> Option<&TabState> {
        self.tabs.iter().find(|t| t.tab == tab)
    }
}

/// The four status partitions of the conversation list. Each is fetched and
/// paginated independently.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversationTab {
    Bot,
    Pending,
    Claimed,
    Resolved,
}

impl ConversationTab {
    pub const ALL: [ConversationTab; 4] = [
        ConversationTab::Bot,
        ConversationTab::Pending,
        ConversationTab::Claimed,
        ConversationTab::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationTab::Bot => "bot",
            ConversationTab::Pending => "pending",
            ConversationTab::Claimed => "claimed",
            ConversationTab::Resolved => "resolved",
        }
    }

    /// Server-side status predicate for this tab.
    pub fn status_filter(&self) -> &'static str {
        match self {
            ConversationTab::Bot => "bot",
            ConversationTab::Pending => "pending_handoff",
            ConversationTab::Claimed => "claimed,active",
            ConversationTab::Resolved => "resolved",
        }
    }

    /// The claimed tab only lists conversations owned by the current operator.
    pub fn mine_only(&self) -> bool {
        matches!(self, ConversationTab::Claimed)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ConversationTab::Bot => 0,
            ConversationTab::Pending => 1,
            ConversationTab::Claimed => 2,
            ConversationTab::Resolved => 3,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct TabState {
    pub tab: ConversationTab,
    pub items: Vec<ConversationSummary>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl TabState {
    pub fn empty(tab: ConversationTab) -> Self {
        Self {
            tab,
            items: vec![],
            cursor: None,
            has_more: true,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Bot,
    PendingHandoff,
    Claimed,
    Active,
    Resolved,
    #[default]
    #[serde(other)]
    Unknown,
}

/// List-row projection of a conversation. `conversation_id` is the customer's
/// phone-number-shaped key.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub assignee_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub wa_profile_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ConversationSummary {
    pub fn apply_patch(&mut self, patch: &ConversationPatch) {
        if let Some(name) = &patch.user_name {
            let name = name.trim();
            self.user_name = (!name.is_empty()).then(|| name.to_string());
        }
        if let Some(tags) = &patch.tags {
            let mut next: Vec<String> = Vec::with_capacity(tags.len());
            for tag in tags {
                if !next.contains(tag) {
                    next.push(tag.clone());
                }
            }
            self.tags = next;
        }
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        if let Some(assignee) = &patch.assignee {
            self.assignee = (!assignee.is_empty()).then(|| assignee.clone());
        }
        if let Some(assignee_name) = &patch.assignee_name {
            self.assignee_name = (!assignee_name.is_empty()).then(|| assignee_name.clone());
        }
        if let Some(text) = &patch.last_message_text {
            self.last_message_text = Some(text.clone());
        }
    }
}

/// Partial update applied to every list row (and the selection) sharing a
/// conversation id. `None` leaves a field untouched; an empty string clears
/// an optional text field.
#[derive(uniffi::Record, Clone, Debug, Default, PartialEq)]
pub struct ConversationPatch {
    pub user_name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ConversationStatus>,
    pub assignee: Option<String>,
    pub assignee_name: Option<String>,
    pub last_message_text: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatViewState {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub is_loading_older: bool,
    pub is_refreshing: bool,
    pub outside_24h_window: bool,
}

/// "In flight" flags the UI should reflect.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_conversations: bool,
    pub selecting_conversation: bool,
    pub sending: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_conversations: false,
            selecting_conversation: false,
            sending: false,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum SearchStatus {
    Idle,
    Searching,
    NotFound,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<ConversationSummary>,
    pub status: SearchStatus,
}

/// Something the platform should surface as a desktop notification.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct DeskNotification {
    pub title: String,
    pub body: String,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    In,
    Out,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::In => "in",
            MessageDirection::Out => "out",
            MessageDirection::Unknown => "",
        }
    }
}

/// Where a message stands relative to the server.
///
/// `Pending` entries exist only on the client that created them and are
/// promoted to `Confirmed` once the server echoes the same
/// `client_request_id` back with a real id.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageIdentity {
    Confirmed { message_id: String },
    Pending { client_request_id: String },
    Unidentified,
}

impl MessageIdentity {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            MessageIdentity::Confirmed { message_id } => Some(message_id),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MessageIdentity::Pending { .. })
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MediaAttachment {
    #[serde(default)]
    pub signed_url: Option<String>,
    #[serde(default)]
    pub gcs_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub identity: MessageIdentity,
    pub client_request_id: Option<String>,
    pub text: String,
    pub direction: MessageDirection,
    /// Origination timestamp as sent by the server (ISO-8601).
    pub ts: String,
    /// `ts` parsed and truncated to milliseconds; 0 when absent or unparsable.
    pub ts_ms: i64,
    pub display_name: Option<String>,
    pub media: Vec<MediaAttachment>,
}

impl ChatMessage {
    /// A locally-originated outgoing message awaiting server confirmation.
    pub fn optimistic(
        client_request_id: String,
        text: String,
        display_name: Option<String>,
        ts: String,
    ) -> Self {
        let ts_ms = crate::ordering::parse_ts_millis(&ts);
        Self {
            identity: MessageIdentity::Pending {
                client_request_id: client_request_id.clone(),
            },
            client_request_id: Some(client_request_id),
            text,
            direction: MessageDirection::Out,
            ts,
            ts_ms,
            display_name,
            media: vec![],
        }
    }

    pub fn is_pending(&self) -> bool {
        self.identity.is_pending()
    }
}

pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
