use crate::core::conversations::TabRequest;
use crate::core::timeline::PageRequest;
use crate::state::{AppState, ChatMessage, ConversationSummary};
use crate::transport::{Page, SendResponse, TransportError, WindowStatus};
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub(crate) enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollKind {
    Chat,
    Lists,
    PendingQueue,
}

#[derive(Debug)]
pub(crate) enum InternalEvent {
    // Timers
    PollTick(PollKind),

    // Async results
    TabFetched {
        request: TabRequest,
        result: Result<Page<ConversationSummary>, TransportError>,
    },
    MessagePageFetched {
        request: PageRequest,
        result: Result<Page<ChatMessage>, TransportError>,
    },
    ConversationFetched {
        token: u64,
        conversation_id: String,
        result: Result<ConversationSummary, TransportError>,
    },
    WindowStatusFetched {
        conversation_id: String,
        generation: u64,
        result: Result<WindowStatus, TransportError>,
    },
    SendFinished {
        conversation_id: String,
        generation: u64,
        client_request_id: String,
        result: Result<SendResponse, TransportError>,
    },
    SearchFinished {
        token: u64,
        result: Result<Page<ConversationSummary>, TransportError>,
    },
}
