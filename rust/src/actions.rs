use crate::state::{ConversationPatch, ConversationTab};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Conversation lists
    SelectTab {
        tab: ConversationTab,
    },
    LoadMoreConversations,
    RefreshAll,
    UpdateConversationInLists {
        conversation_id: String,
        patch: ConversationPatch,
    },
    SearchConversations {
        query: String,
    },

    // Selection
    SelectConversation {
        conversation_id: String,
    },
    ClearSelection,

    // Timeline
    LoadOlderMessages,
    RefreshMessages,
    SendMessage {
        text: String,
    },

    // Environment
    SetPageVisible {
        visible: bool,
    },
    SetOnline {
        online: bool,
    },

    // UI
    ClearToast,
    ClearNotification,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or customer data).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::SelectTab { .. } => "SelectTab",
            AppAction::LoadMoreConversations => "LoadMoreConversations",
            AppAction::RefreshAll => "RefreshAll",
            AppAction::UpdateConversationInLists { .. } => "UpdateConversationInLists",
            AppAction::SearchConversations { .. } => "SearchConversations",
            AppAction::SelectConversation { .. } => "SelectConversation",
            AppAction::ClearSelection => "ClearSelection",
            AppAction::LoadOlderMessages => "LoadOlderMessages",
            AppAction::RefreshMessages => "RefreshMessages",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::SetPageVisible { .. } => "SetPageVisible",
            AppAction::SetOnline { .. } => "SetOnline",
            AppAction::ClearToast => "ClearToast",
            AppAction::ClearNotification => "ClearNotification",
        }
    }
}
