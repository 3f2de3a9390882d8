use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use desk_core::transport::{
    DeskTransport, ListQuery, Page, SendRequest, SendResponse, WindowStatus, WireMessage,
};
use desk_core::{ConversationSummary, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List {
        status: String,
        cursor: Option<String>,
        mine: bool,
    },
    Get(String),
    Messages {
        conversation_id: String,
        cursor: Option<String>,
    },
    Send {
        conversation_id: String,
        text: String,
        client_request_id: String,
    },
    Window(String),
    Search(String),
}

type Paged<T> = Result<Page<T>, TransportError>;

#[derive(Default)]
struct Script {
    lists: HashMap<(String, Option<String>), Paged<ConversationSummary>>,
    conversations: HashMap<String, Result<ConversationSummary, TransportError>>,
    get_delays: HashMap<String, Duration>,
    messages: HashMap<(String, Option<String>), Paged<WireMessage>>,
    send: Option<Result<SendResponse, TransportError>>,
    windows: HashMap<String, bool>,
    search: HashMap<String, Paged<ConversationSummary>>,
    calls: Vec<Call>,
    sent: usize,
}

/// In-memory backend. Unscripted lists and message pages are empty;
/// unscripted conversations are 404; unscripted sends echo the request
/// back with a fresh server id.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_list(&self, status: &str, cursor: Option<&str>, result: Paged<ConversationSummary>) {
        self.script
            .lock()
            .unwrap()
            .lists
            .insert((status.to_string(), cursor.map(str::to_owned)), result);
    }

    pub fn set_conversation(&self, conversation: ConversationSummary) {
        self.script
            .lock()
            .unwrap()
            .conversations
            .insert(conversation.conversation_id.clone(), Ok(conversation));
    }

    pub fn fail_conversation(&self, conversation_id: &str, err: TransportError) {
        self.script
            .lock()
            .unwrap()
            .conversations
            .insert(conversation_id.to_string(), Err(err));
    }

    pub fn delay_conversation(&self, conversation_id: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .get_delays
            .insert(conversation_id.to_string(), delay);
    }

    pub fn set_messages(&self, conversation_id: &str, cursor: Option<&str>, result: Paged<WireMessage>) {
        self.script.lock().unwrap().messages.insert(
            (conversation_id.to_string(), cursor.map(str::to_owned)),
            result,
        );
    }

    pub fn set_send(&self, result: Result<SendResponse, TransportError>) {
        self.script.lock().unwrap().send = Some(result);
    }

    pub fn set_window(&self, conversation_id: &str, outside: bool) {
        self.script
            .lock()
            .unwrap()
            .windows
            .insert(conversation_id.to_string(), outside);
    }

    pub fn set_search(&self, query: &str, result: Paged<ConversationSummary>) {
        self.script
            .lock()
            .unwrap()
            .search
            .insert(query.to_string(), result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn calls_since(&self, mark: usize) -> Vec<Call> {
        self.script.lock().unwrap().calls[mark..].to_vec()
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

fn empty<T>() -> Paged<T> {
    Ok(Page {
        items: vec![],
        next_cursor: None,
    })
}

#[async_trait]
impl DeskTransport for ScriptedTransport {
    async fn list_conversations(&self, query: ListQuery) -> Paged<ConversationSummary> {
        self.record(Call::List {
            status: query.status.clone(),
            cursor: query.cursor.clone(),
            mine: query.mine,
        });
        let script = self.script.lock().unwrap();
        script
            .lists
            .get(&(query.status, query.cursor))
            .cloned()
            .unwrap_or_else(empty)
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationSummary, TransportError> {
        self.record(Call::Get(conversation_id.to_string()));
        let delay = self
            .script
            .lock()
            .unwrap()
            .get_delays
            .get(conversation_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.script.lock().unwrap();
        script
            .conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(TransportError::Status {
                    status: 404,
                    code: None,
                    message: "Not Found".into(),
                })
            })
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        _limit: u32,
        cursor: Option<&str>,
    ) -> Paged<WireMessage> {
        self.record(Call::Messages {
            conversation_id: conversation_id.to_string(),
            cursor: cursor.map(str::to_owned),
        });
        let script = self.script.lock().unwrap();
        script
            .messages
            .get(&(conversation_id.to_string(), cursor.map(str::to_owned)))
            .cloned()
            .unwrap_or_else(empty)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        request: SendRequest,
    ) -> Result<SendResponse, TransportError> {
        self.record(Call::Send {
            conversation_id: conversation_id.to_string(),
            text: request.text.clone(),
            client_request_id: request.client_request_id.clone(),
        });
        let mut script = self.script.lock().unwrap();
        if let Some(result) = script.send.clone() {
            return result;
        }
        script.sent += 1;
        Ok(SendResponse {
            message: Some(WireMessage {
                message_id: Some(format!("srv-{}", script.sent)),
                client_request_id: Some(request.client_request_id),
                text: Some(request.text),
                direction: Some(desk_core::MessageDirection::Out),
                ts: Some("2030-01-01T00:00:00Z".into()),
                ..Default::default()
            }),
        })
    }

    async fn window_status(&self, conversation_id: &str) -> Result<WindowStatus, TransportError> {
        self.record(Call::Window(conversation_id.to_string()));
        let outside = self
            .script
            .lock()
            .unwrap()
            .windows
            .get(conversation_id)
            .copied()
            .unwrap_or(false);
        Ok(WindowStatus {
            outside_24h_window: outside,
        })
    }

    async fn search_conversations(&self, query: &str, _limit: u32) -> Paged<ConversationSummary> {
        self.record(Call::Search(query.to_string()));
        let script = self.script.lock().unwrap();
        script.search.get(query).cloned().unwrap_or_else(empty)
    }
}
