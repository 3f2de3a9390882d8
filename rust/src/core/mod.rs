mod config;
pub(crate) mod conversations;
mod search;
pub(crate) mod timeline;

use std::sync::{Arc, Mutex, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::polling::{PollCallback, PollScheduler};
use crate::scroll::ScrollAnchor;
use crate::state::{
    now_iso8601, AppState, BusyState, ChatMessage, ConversationPatch, ConversationSummary,
    ConversationTab, DeskNotification,
};
use crate::transport::{
    HttpTransport, OfflineTransport, Page, SendRequest, SharedTransport, TransportError,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent, PollKind};

use conversations::{ConversationLists, FetchOrigin, TabOutcome, TabRequest};
use search::{Search, REMOTE_SEARCH_LIMIT};
use timeline::{PageKind, PageOutcome, PageRequest, Timeline};

pub(crate) use config::default_app_config_json;

const NOTIFICATION_PREVIEW_CHARS: usize = 50;

pub(crate) struct AppCore {
    pub(crate) state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,
    scroll: Arc<Mutex<ScrollAnchor>>,

    config: config::AppConfig,
    transport: SharedTransport,

    lists: ConversationLists,
    timeline: Timeline,
    search: Search,

    // Bumped on every selection request; results carrying an older token
    // lost a race with a newer click.
    selection_token: u64,
    outside_window: bool,
    // Pending-tab size last seen, for the "new pending conversation" alert.
    pending_seen: usize,
    online: bool,

    chat_poll: PollScheduler,
    lists_poll: PollScheduler,
    pending_poll: PollScheduler,

    // Declared last: pollers must stop before the runtime goes away.
    runtime: tokio::runtime::Runtime,
}

impl AppCore {
    pub(crate) fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        scroll: Arc<Mutex<ScrollAnchor>>,
        transport: Option<SharedTransport>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let transport = transport.unwrap_or_else(|| build_transport(&config));
        let sizes = config.page_sizes();
        let intervals = config.poll_intervals();

        let handle = runtime.handle().clone();
        let chat_poll = PollScheduler::new(
            "chat",
            handle.clone(),
            poll_callback(&core_sender, PollKind::Chat),
            intervals.chat,
        );
        let lists_poll = PollScheduler::new(
            "lists",
            handle.clone(),
            poll_callback(&core_sender, PollKind::Lists),
            intervals.lists,
        );
        let pending_poll = PollScheduler::new(
            "pending_queue",
            handle,
            poll_callback(&core_sender, PollKind::PendingQueue),
            intervals.background,
        );

        let mut this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            scroll,
            config,
            transport,
            lists: ConversationLists::new(sizes),
            timeline: Timeline::new(sizes),
            search: Search::default(),
            selection_token: 0,
            outside_window: false,
            pending_seen: 0,
            online: true,
            chat_poll,
            lists_poll,
            pending_poll,
            runtime,
        };

        tracing::info!(network = this.config.network_enabled(), "desk core starting");
        this.refresh_all(FetchOrigin::Background);
        this.sync_pollers();
        this.emit_state();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    /// Rev that the next emitted snapshot will carry. Scroll intents are
    /// stamped with it so the UI applies them only once that rev renders.
    fn pending_rev(&self) -> u64 {
        self.rev + 1
    }

    fn project_state(&mut self) {
        self.state.current_tab = self.lists.current_tab();
        self.state.tabs = self.lists.tab_states();
        self.state.current_chat = self.timeline.view(self.outside_window);
        self.state.search = self.search.state();
        self.state.busy.loading_conversations = self.lists.is_loading_more();
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.project_state();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn with_scroll<R>(&self, f: impl FnOnce(&mut ScrollAnchor) -> R) -> R {
        match self.scroll.lock() {
            Ok(mut g) => f(&mut g),
            Err(poison) => f(&mut poison.into_inner()),
        }
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Stays in state until the UI clears it, so a rev-gap resync still shows it.
        self.state.toast = Some(msg.into());
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        f(&mut self.state.busy);
    }

    /// User-triggered failures toast; background failures only dim the
    /// connectivity indicator and wait for the next tick.
    fn report_failure(&mut self, origin: FetchOrigin, what: &str, err: &TransportError) {
        match origin {
            FetchOrigin::User => {
                tracing::warn!(err = %err, "{what} failed");
                self.toast(format!("{what} failed: {}", err.user_message()));
            }
            FetchOrigin::Background => {
                tracing::warn!(err = %err, "background {what} failed");
                self.state.connected = false;
            }
        }
    }

    fn mark_connected(&mut self) {
        if self.online {
            self.state.connected = true;
        }
    }

    pub(crate) fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it carries message text and customer data.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            CoreMsg::Shutdown => self.shutdown(),
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.chat_poll.stop();
        self.lists_poll.stop();
        self.pending_poll.stop();
        tracing::info!("desk core stopped");
    }

    // Pollers

    /// Chat refresh runs while a conversation is open. Exactly one of the
    /// list cadences runs, chosen by visibility; the outgoing one is
    /// disabled before the incoming one starts.
    fn sync_pollers(&mut self) {
        let online = self.online;
        if self.state.page_visible {
            self.pending_poll.set_enabled(false);
            self.lists_poll.set_enabled(online);
        } else {
            self.lists_poll.set_enabled(false);
            self.pending_poll.set_enabled(online);
        }
        let chat = online && self.timeline.conversation_id().is_some();
        self.chat_poll.set_enabled(chat);
    }

    fn handle_poll(&mut self, kind: PollKind) {
        if !self.online {
            return;
        }
        // A tick queued before its poller was disabled must not run.
        let live = match kind {
            PollKind::Chat => self.chat_poll.is_enabled(),
            PollKind::Lists => self.lists_poll.is_enabled(),
            PollKind::PendingQueue => self.pending_poll.is_enabled(),
        };
        if !live {
            tracing::debug!(?kind, "dropping tick from a disabled poller");
            return;
        }
        match kind {
            PollKind::Chat => self.refresh_messages(),
            PollKind::Lists => self.refresh_all(FetchOrigin::Background),
            PollKind::PendingQueue => {
                if let Some(req) =
                    self.lists
                        .begin_load(ConversationTab::Pending, false, FetchOrigin::Background)
                {
                    self.spawn_tab_fetch(req);
                }
            }
        }
    }

    // Async plumbing

    fn post(tx: &Sender<CoreMsg>, event: InternalEvent) {
        let _ = tx.send(CoreMsg::Internal(Box::new(event)));
    }

    fn spawn_tab_fetch(&self, request: TabRequest) {
        tracing::debug!(tab = request.tab.as_str(), append = request.append, "fetch tab");
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = transport.list_conversations(request.query.clone()).await;
            Self::post(&tx, InternalEvent::TabFetched { request, result });
        });
    }

    fn spawn_page_fetch(&self, request: PageRequest) {
        tracing::debug!(
            conversation_id = %request.conversation_id,
            kind = ?request.kind,
            "fetch messages"
        );
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = transport
                .fetch_messages(&request.conversation_id, request.limit, request.cursor.as_deref())
                .await
                .map(Page::into_messages);
            Self::post(&tx, InternalEvent::MessagePageFetched { request, result });
        });
    }

    fn spawn_window_check(&self, conversation_id: String) {
        let generation = self.timeline.generation();
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = transport.window_status(&conversation_id).await;
            Self::post(
                &tx,
                InternalEvent::WindowStatusFetched {
                    conversation_id,
                    generation,
                    result,
                },
            );
        });
    }

    // Operations

    fn refresh_all(&mut self, origin: FetchOrigin) {
        for req in self.lists.begin_refresh_all(origin) {
            self.spawn_tab_fetch(req);
        }
    }

    fn refresh_messages(&mut self) {
        if let Some(req) = self.timeline.begin_refresh() {
            self.spawn_page_fetch(req);
            self.emit_state();
        }
    }

    fn open_conversation(&mut self, conversation: ConversationSummary) {
        let id = conversation.conversation_id.clone();
        self.state.selected_user_name = conversation.user_name.clone().unwrap_or_default();
        self.state.selected_conversation = Some(conversation);
        if self.timeline.conversation_id() == Some(id.as_str()) {
            // Re-selecting the open conversation only refreshes its projection.
            return;
        }
        self.timeline.reset(Some(id.clone()));
        self.outside_window = false;
        self.with_scroll(|s| s.reset());
        if let Some(req) = self.timeline.begin_initial() {
            self.spawn_page_fetch(req);
        }
        self.spawn_window_check(id);
        self.sync_pollers();
    }

    fn close_conversation(&mut self) {
        self.selection_token += 1;
        self.state.selected_conversation = None;
        self.state.selected_user_name.clear();
        self.state.busy.selecting_conversation = false;
        self.timeline.reset(None);
        self.outside_window = false;
        self.with_scroll(|s| s.reset());
        self.sync_pollers();
    }

    fn patch_conversation(&mut self, conversation_id: &str, patch: &ConversationPatch) {
        let rows = self.lists.patch(conversation_id, patch);
        tracing::debug!(conversation_id, rows, "patched conversation rows");
        if let Some(selected) = self
            .state
            .selected_conversation
            .as_mut()
            .filter(|c| c.conversation_id == conversation_id)
        {
            selected.apply_patch(patch);
            self.state.selected_user_name = selected.user_name.clone().unwrap_or_default();
        }
        self.search.refresh_local(self.lists.rows());
    }

    fn send_message(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.toast("Type a message first");
            return;
        }
        let Some(conversation_id) = self.timeline.conversation_id().map(str::to_owned) else {
            self.toast("Select a conversation first");
            return;
        };
        if self.state.busy.sending {
            return;
        }

        let client_request_id = uuid::Uuid::new_v4().to_string();
        let optimistic =
            ChatMessage::optimistic(client_request_id.clone(), text.clone(), None, now_iso8601());
        self.timeline.append_optimistic(optimistic);
        let rev = self.pending_rev();
        self.with_scroll(|s| s.request_bottom(rev));
        self.set_busy(|b| b.sending = true);

        let generation = self.timeline.generation();
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let request = SendRequest {
                text,
                client_request_id: client_request_id.clone(),
            };
            let result = transport.send_message(&conversation_id, request).await;
            Self::post(
                &tx,
                InternalEvent::SendFinished {
                    conversation_id,
                    generation,
                    client_request_id,
                    result,
                },
            );
        });
    }

    fn notify(&mut self, title: &str, body: String) {
        tracing::debug!(title, "notification");
        self.state.notification = Some(DeskNotification {
            title: title.to_string(),
            body,
        });
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::SelectTab { tab } => {
                if !self.lists.select_tab(tab) {
                    return;
                }
                // Resolved is not kept warm by the periodic refresh.
                if tab == ConversationTab::Resolved {
                    if let Some(req) = self.lists.begin_load(tab, false, FetchOrigin::User) {
                        self.spawn_tab_fetch(req);
                    }
                }
            }
            AppAction::LoadMoreConversations => {
                let Some(req) = self.lists.begin_load_more_current() else {
                    return;
                };
                self.spawn_tab_fetch(req);
            }
            AppAction::RefreshAll => self.refresh_all(FetchOrigin::User),
            AppAction::UpdateConversationInLists {
                conversation_id,
                patch,
            } => self.patch_conversation(&conversation_id, &patch),
            AppAction::SearchConversations { query } => {
                if let Some((token, query)) = self.search.begin(&query, self.lists.rows()) {
                    let transport = self.transport.clone();
                    let tx = self.core_sender.clone();
                    self.runtime.spawn(async move {
                        let result = transport
                            .search_conversations(&query, REMOTE_SEARCH_LIMIT)
                            .await;
                        Self::post(&tx, InternalEvent::SearchFinished { token, result });
                    });
                }
            }
            AppAction::SelectConversation { conversation_id } => {
                let conversation_id = conversation_id.trim().to_string();
                if conversation_id.is_empty() {
                    return;
                }
                self.selection_token += 1;
                let token = self.selection_token;
                self.set_busy(|b| b.selecting_conversation = true);
                let transport = self.transport.clone();
                let tx = self.core_sender.clone();
                self.runtime.spawn(async move {
                    let result = transport.get_conversation(&conversation_id).await;
                    Self::post(
                        &tx,
                        InternalEvent::ConversationFetched {
                            token,
                            conversation_id,
                            result,
                        },
                    );
                });
            }
            AppAction::ClearSelection => self.close_conversation(),
            AppAction::LoadOlderMessages => {
                let Some(req) = self.timeline.begin_older() else {
                    return;
                };
                self.spawn_page_fetch(req);
            }
            AppAction::RefreshMessages => {
                // `refresh_messages` emits on its own when it starts a fetch.
                self.refresh_messages();
                return;
            }
            AppAction::SendMessage { text } => self.send_message(text),
            AppAction::SetPageVisible { visible } => {
                if self.state.page_visible == visible {
                    return;
                }
                self.state.page_visible = visible;
                self.sync_pollers();
                if visible && self.online {
                    self.refresh_all(FetchOrigin::Background);
                }
            }
            AppAction::SetOnline { online } => {
                if self.online == online {
                    return;
                }
                self.online = online;
                self.state.connected = online;
                self.sync_pollers();
                if online {
                    self.refresh_all(FetchOrigin::Background);
                    if let Some(req) = self.timeline.begin_refresh() {
                        self.spawn_page_fetch(req);
                    }
                }
            }
            AppAction::ClearToast => {
                if self.state.toast.is_none() {
                    return;
                }
                self.state.toast = None;
            }
            AppAction::ClearNotification => {
                if self.state.notification.is_none() {
                    return;
                }
                self.state.notification = None;
            }
        }
        self.emit_state();
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PollTick(kind) => {
                self.handle_poll(kind);
                return;
            }
            InternalEvent::TabFetched { request, result } => {
                self.on_tab_fetched(request, result)
            }
            InternalEvent::MessagePageFetched { request, result } => {
                if !self.on_page_fetched(request, result) {
                    return;
                }
            }
            InternalEvent::ConversationFetched {
                token,
                conversation_id,
                result,
            } => {
                // Ignore stale results (a newer selection or a clear happened).
                if token != self.selection_token {
                    tracing::debug!(conversation_id = %conversation_id, "dropping stale selection");
                    return;
                }
                self.set_busy(|b| b.selecting_conversation = false);
                match result {
                    Ok(conversation) => self.open_conversation(conversation),
                    Err(e) => {
                        self.report_failure(FetchOrigin::User, "Open conversation", &e);
                    }
                }
            }
            InternalEvent::WindowStatusFetched {
                conversation_id,
                generation,
                result,
            } => {
                if !self.timeline.is_current(&conversation_id, generation) {
                    return;
                }
                self.outside_window = match result {
                    Ok(status) => status.outside_24h_window,
                    Err(e) => {
                        tracing::warn!(conversation_id = %conversation_id, err = %e, "window status check failed");
                        false
                    }
                };
            }
            InternalEvent::SendFinished {
                conversation_id,
                generation,
                client_request_id,
                result,
            } => {
                self.set_busy(|b| b.sending = false);
                match result {
                    Ok(resp) => {
                        if let Some(wire) = resp.message {
                            let mut message = ChatMessage::from(wire);
                            if message.client_request_id.is_none() {
                                message.client_request_id = Some(client_request_id);
                            }
                            if self
                                .timeline
                                .confirm_sent(&conversation_id, generation, message)
                                .is_none()
                            {
                                tracing::debug!(conversation_id = %conversation_id, "send confirmed after switch");
                            }
                        }
                        // The row preview changed.
                        self.refresh_all(FetchOrigin::Background);
                    }
                    Err(e) => {
                        tracing::warn!(conversation_id = %conversation_id, err = %e, "send failed");
                        self.toast(format!("Send failed: {}", e.user_message()));
                    }
                }
            }
            InternalEvent::SearchFinished { token, result } => {
                if !self.search.apply_remote(token, result) {
                    return;
                }
            }
        }
        self.emit_state();
    }

    fn on_tab_fetched(
        &mut self,
        request: TabRequest,
        result: Result<Page<ConversationSummary>, TransportError>,
    ) {
        match self.lists.apply(&request, result) {
            TabOutcome::Stale => {
                tracing::debug!(tab = request.tab.as_str(), "dropping stale tab page");
            }
            TabOutcome::Failed(e) => {
                self.report_failure(request.origin, "Load conversations", &e);
            }
            TabOutcome::Applied { count } => {
                tracing::debug!(tab = request.tab.as_str(), count, "tab page applied");
                if request.origin == FetchOrigin::Background {
                    self.mark_connected();
                }
                if request.tab == ConversationTab::Pending {
                    let pending = self.lists.items(ConversationTab::Pending).len();
                    if pending > 0 && pending > self.pending_seen && !self.state.page_visible {
                        self.notify(
                            "New pending conversation",
                            format!("{pending} conversation(s) waiting for an agent"),
                        );
                    }
                    self.pending_seen = pending;
                }
                self.search.refresh_local(self.lists.rows());
            }
        }
    }

    /// Returns false when nothing changed and no snapshot is needed.
    fn on_page_fetched(
        &mut self,
        request: PageRequest,
        result: Result<Page<ChatMessage>, TransportError>,
    ) -> bool {
        let rev = self.pending_rev();
        let older = request.kind == PageKind::Older;
        if older {
            // Anchor against the metrics from before the merge renders.
            if !self.with_scroll(|s| s.capture(rev)) {
                tracing::debug!("older page without viewport metrics; prepend is unanchored");
            }
        }

        let outcome = self.timeline.apply_page(&request, result);
        let report = match outcome {
            PageOutcome::Stale => {
                if older {
                    self.with_scroll(|s| s.discard_capture());
                }
                tracing::debug!(conversation_id = %request.conversation_id, "dropping stale message page");
                return false;
            }
            PageOutcome::Failed(e) => {
                if older {
                    self.with_scroll(|s| s.discard_capture());
                }
                match request.kind {
                    PageKind::Initial => {
                        self.report_failure(FetchOrigin::User, "Load messages", &e)
                    }
                    PageKind::Older => {
                        self.report_failure(FetchOrigin::User, "Load older messages", &e)
                    }
                    PageKind::Refresh => {
                        self.report_failure(FetchOrigin::Background, "message refresh", &e)
                    }
                }
                return true;
            }
            PageOutcome::Applied(report) => report,
        };

        match request.kind {
            PageKind::Initial => self.with_scroll(|s| s.request_bottom(rev)),
            PageKind::Older => {}
            PageKind::Refresh => {
                self.mark_connected();
                if report.appended_tail {
                    self.with_scroll(|s| s.note_appended(rev));
                }
            }
        }
        if request.kind == PageKind::Refresh && report.new_inbound > 0 {
            if !self.state.page_visible {
                let preview: String = report
                    .first_inbound_text
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(NOTIFICATION_PREVIEW_CHARS)
                    .collect();
                let preview = if preview.is_empty() {
                    "...".to_string()
                } else {
                    preview
                };
                self.notify(
                    "New message",
                    format!("From {}: {preview}", request.conversation_id),
                );
            }
            if self.outside_window {
                self.spawn_window_check(request.conversation_id.clone());
            }
        }
        true
    }
}

fn poll_callback(tx: &Sender<CoreMsg>, kind: PollKind) -> PollCallback {
    let tx = tx.clone();
    Arc::new(move || {
        tx.send(CoreMsg::Internal(Box::new(InternalEvent::PollTick(kind))))
            .map_err(|_| anyhow::anyhow!("core actor is gone"))
    })
}

fn build_transport(config: &config::AppConfig) -> SharedTransport {
    if !config.network_enabled() {
        tracing::info!("network disabled; using offline transport");
        return Arc::new(OfflineTransport);
    }
    let base_url = config.base_url();
    match HttpTransport::new(
        &base_url,
        &config.api_prefix(),
        config.session_cookie(),
        config.request_timeout(),
    ) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            tracing::error!(base_url = %base_url, err = %e, "cannot build http transport; running offline");
            Arc::new(OfflineTransport)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    use crate::transport::{DeskTransport, ListQuery, SendResponse, WindowStatus, WireMessage};

    /// Records list fetches; everything else is unreachable.
    #[derive(Default)]
    struct ListRecorder {
        statuses: Mutex<Vec<String>>,
    }

    impl ListRecorder {
        fn statuses(&self) -> Vec<String> {
            self.statuses.lock().unwrap().clone()
        }

        fn wait_for(&self, n: usize) {
            let start = Instant::now();
            while self.statuses().len() < n {
                assert!(start.elapsed() < Duration::from_secs(2), "expected {n} list calls");
                std::thread::sleep(Duration::from_millis(10));
            }
            // Give any extra fetch a chance to show up.
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn unreachable<T>() -> Result<T, TransportError> {
        Err(TransportError::Network("not scripted".into()))
    }

    #[async_trait]
    impl DeskTransport for ListRecorder {
        async fn list_conversations(
            &self,
            query: ListQuery,
        ) -> Result<Page<ConversationSummary>, TransportError> {
            self.statuses.lock().unwrap().push(query.status);
            Ok(Page {
                items: vec![],
                next_cursor: None,
            })
        }

        async fn get_conversation(&self, _: &str) -> Result<ConversationSummary, TransportError> {
            unreachable()
        }

        async fn fetch_messages(
            &self,
            _: &str,
            _: u32,
            _: Option<&str>,
        ) -> Result<Page<WireMessage>, TransportError> {
            unreachable()
        }

        async fn send_message(
            &self,
            _: &str,
            _: SendRequest,
        ) -> Result<SendResponse, TransportError> {
            unreachable()
        }

        async fn window_status(&self, _: &str) -> Result<WindowStatus, TransportError> {
            unreachable()
        }

        async fn search_conversations(
            &self,
            _: &str,
            _: u32,
        ) -> Result<Page<ConversationSummary>, TransportError> {
            unreachable()
        }
    }

    fn core_with(transport: Arc<ListRecorder>) -> (tempfile::TempDir, AppCore) {
        let dir = tempfile::tempdir().unwrap();
        let (update_tx, _update_rx) = flume::unbounded();
        let (core_tx, _core_rx) = flume::unbounded();
        let core = AppCore::new(
            update_tx,
            core_tx,
            dir.path().to_string_lossy().to_string(),
            Arc::new(RwLock::new(AppState::empty())),
            Arc::new(Mutex::new(ScrollAnchor::new())),
            Some(transport as SharedTransport),
        );
        (dir, core)
    }

    fn tick(core: &mut AppCore, kind: PollKind) {
        core.handle_message(CoreMsg::Internal(Box::new(InternalEvent::PollTick(kind))));
    }

    #[test]
    fn ticks_from_the_swapped_out_cadence_are_dropped() {
        let transport = Arc::new(ListRecorder::default());
        let (_dir, mut core) = core_with(transport.clone());
        transport.wait_for(3);

        core.handle_message(CoreMsg::Action(AppAction::SetPageVisible { visible: false }));
        // A full-list tick that was already queued when the page went hidden.
        tick(&mut core, PollKind::Lists);
        tick(&mut core, PollKind::PendingQueue);
        transport.wait_for(4);
        assert_eq!(transport.statuses()[3..], ["pending_handoff"]);

        core.handle_message(CoreMsg::Action(AppAction::SetPageVisible { visible: true }));
        transport.wait_for(7);
        tick(&mut core, PollKind::PendingQueue);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(transport.statuses().len(), 7);

        tick(&mut core, PollKind::Lists);
        transport.wait_for(10);
        assert_eq!(transport.statuses().len(), 10);
        core.shutdown();
    }
}
