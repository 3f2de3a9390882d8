use std::env;
use std::time::Duration;

use anyhow::Context;
use desk_core::{AppAction, AppReconciler, AppUpdate, ConversationTab, FfiDesk};

#[derive(Debug, Clone)]
struct Opts {
    data_dir: String,
    conversation: Option<String>,
    send: Option<String>,
    seconds: u64,
}

fn usage() {
    eprintln!(
        "usage: cargo run -p desk_core --bin desk_tail -- \
  --data-dir <dir> \
  [--conversation <id>] \
  [--send <text>] \
  [--seconds 30]"
    );
}

fn parse_opts() -> anyhow::Result<Opts> {
    let mut data_dir: Option<String> = None;
    let mut conversation: Option<String> = None;
    let mut send: Option<String> = None;
    let mut seconds: u64 = 30;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => {
                let v = args
                    .next()
                    .context("missing value after --data-dir")?
                    .trim()
                    .to_string();
                if v.is_empty() {
                    anyhow::bail!("--data-dir cannot be empty");
                }
                data_dir = Some(v);
            }
            "--conversation" => {
                let v = args.next().context("missing value after --conversation")?;
                conversation = Some(v.trim().to_string()).filter(|v| !v.is_empty());
            }
            "--send" => {
                send = Some(args.next().context("missing value after --send")?);
            }
            "--seconds" => {
                let raw = args.next().context("missing value after --seconds")?;
                seconds = raw
                    .parse::<u64>()
                    .with_context(|| format!("invalid --seconds value: {raw}"))?;
            }
            "-h" | "--help" => {
                usage();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown arg: {other}");
            }
        }
    }

    let data_dir = data_dir.context("missing --data-dir")?;
    if send.is_some() && conversation.is_none() {
        anyhow::bail!("--send requires --conversation");
    }
    Ok(Opts {
        data_dir,
        conversation,
        send,
        seconds,
    })
}

struct LogReconciler;

impl AppReconciler for LogReconciler {
    fn reconcile(&self, update: AppUpdate) {
        let AppUpdate::FullState(state) = update;
        let count = |tab: ConversationTab| state.tab(tab).map(|t| t.items.len()).unwrap_or(0);
        tracing::info!(
            rev = state.rev,
            connected = state.connected,
            bot = count(ConversationTab::Bot),
            pending = count(ConversationTab::Pending),
            claimed = count(ConversationTab::Claimed),
            resolved = count(ConversationTab::Resolved),
            messages = state.current_chat.as_ref().map(|c| c.messages.len()).unwrap_or(0),
            "state"
        );
        if let Some(toast) = &state.toast {
            tracing::warn!(toast = %toast, "toast");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opts = match parse_opts() {
        Ok(o) => o,
        Err(e) => {
            usage();
            return Err(e);
        }
    };
    std::fs::create_dir_all(&opts.data_dir)
        .with_context(|| format!("create data dir {}", opts.data_dir))?;

    let desk = FfiDesk::new(opts.data_dir.clone());
    desk.listen_for_updates(Box::new(LogReconciler));

    if let Some(id) = &opts.conversation {
        desk.dispatch(AppAction::SelectConversation {
            conversation_id: id.clone(),
        });
    }
    if let Some(text) = opts.send.clone() {
        // Give the selection a moment to land before sending into it.
        std::thread::sleep(Duration::from_secs(2));
        desk.dispatch(AppAction::SendMessage { text });
    }

    std::thread::sleep(Duration::from_secs(opts.seconds));
    let state = desk.state();
    println!(
        "rev={} connected={} open={}",
        state.rev,
        state.connected,
        state
            .selected_conversation
            .as_ref()
            .map(|c| c.conversation_id.as_str())
            .unwrap_or("-")
    );
    Ok(())
}
