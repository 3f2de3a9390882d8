mod actions;
mod core;
mod logging;
pub mod ordering;
pub mod polling;
pub mod scroll;
mod state;
pub mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use logging::init_logging;
pub use scroll::{ScrollAnchor, ScrollMetrics, ScrollOutcome};
pub use state::*;
pub use transport::{DeskTransport, SharedTransport, TransportError};
pub use updates::AppUpdate;

use crate::updates::CoreMsg;

/// Return the default `desk_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiDesk {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    scroll: Arc<Mutex<ScrollAnchor>>,
}

#[uniffi::export]
impl FfiDesk {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        Self::start(data_dir, None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Record the timeline viewport as the user scrolls.
    pub fn report_scroll(&self, metrics: ScrollMetrics) {
        self.with_scroll(|s| s.observe(metrics));
    }

    /// Request older history, handing over the viewport it is requested
    /// from so the prepend stays anchored even if no scroll was reported yet.
    pub fn load_older_messages(&self, metrics: ScrollMetrics) {
        self.with_scroll(|s| s.observe(metrics));
        self.dispatch(AppAction::LoadOlderMessages);
    }

    /// Call after rendering the snapshot with `rendered_rev`; returns the
    /// offset correction to apply, if any.
    pub fn settle_scroll(&self, rendered_rev: u64, metrics: ScrollMetrics) -> ScrollOutcome {
        self.with_scroll(|s| s.settle(rendered_rev, metrics))
    }

    /// The "new messages" indicator was clicked.
    pub fn jump_to_bottom(&self, metrics: ScrollMetrics) -> f64 {
        self.with_scroll(|s| s.jump_to_bottom(metrics))
    }
}

impl FfiDesk {
    /// Like `new`, with the REST client replaced. Used by tests and tools
    /// that script the backend.
    pub fn new_with_transport(data_dir: String, transport: SharedTransport) -> Arc<Self> {
        Self::start(data_dir, Some(transport))
    }

    fn start(data_dir: String, transport: Option<SharedTransport>) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiDesk::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let scroll = Arc::new(Mutex::new(ScrollAnchor::new()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let scroll_for_core = scroll.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                scroll_for_core,
                transport,
            );
            while let Ok(msg) = core_rx.recv() {
                let stop = matches!(msg, CoreMsg::Shutdown);
                core.handle_message(msg);
                if stop {
                    break;
                }
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            scroll,
        })
    }

    fn with_scroll<R>(&self, f: impl FnOnce(&mut ScrollAnchor) -> R) -> R {
        match self.scroll.lock() {
            Ok(mut g) => f(&mut g),
            Err(poison) => f(&mut poison.into_inner()),
        }
    }
}

impl Drop for FfiDesk {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}
