use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use desk_core::{AppReconciler, AppUpdate, ConversationSummary};
use desk_core::transport::{Page, WireMessage};

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(20), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Poll intervals are long by default so timers never interfere unless a
/// test opts in.
pub fn write_config(data_dir: &str, overrides: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("desk_config.json");
    let mut v = serde_json::json!({
        "disable_network": true,
        "chat_poll_ms": 600000,
        "lists_poll_ms": 600000,
        "background_poll_ms": 600000,
    });
    if let (Some(base), Some(extra)) = (v.as_object_mut(), overrides.as_object()) {
        for (k, val) in extra {
            base.insert(k.clone(), val.clone());
        }
    }
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn conversation(id: &str) -> ConversationSummary {
    serde_json::from_value(serde_json::json!({ "conversation_id": id })).unwrap()
}

pub fn conversation_json(v: serde_json::Value) -> ConversationSummary {
    serde_json::from_value(v).unwrap()
}

pub fn wire(v: serde_json::Value) -> WireMessage {
    serde_json::from_value(v).unwrap()
}

pub fn page<T>(items: Vec<T>, next_cursor: Option<&str>) -> Page<T> {
    Page {
        items,
        next_cursor: next_cursor.map(str::to_owned),
    }
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn revs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(|u| u.rev()).collect()
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => s.toast.clone(),
        })
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}
