use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;

use sentinel_core::{
    domain::ChatId,
    formatting::escape_html,
    poller::{CycleOutcome, CycleReport},
    watchlist::{Watchlist, WatchlistFile},
    Result,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

fn format_report(report: &CycleReport) -> String {
    let at = report.started_at.format("%d.%m.%Y %H:%M:%S");
    match &report.outcome {
        CycleOutcome::Completed => format!(
            "✅ Cycle at {at}\nExtracted: {}\nDelivered: {}\nAlready delivered: {}\nFiltered: {}\nFailed: {}{}",
            report.extracted,
            report.delivered,
            report.already_delivered,
            report.filtered,
            report.failed,
            if report.unrecorded > 0 {
                format!("\n⚠️ Not recorded: {}", report.unrecorded)
            } else {
                String::new()
            }
        ),
        CycleOutcome::NotAuthenticated => {
            format!("🔒 Cycle at {at}: not authenticated. Refresh the session file.")
        }
        CycleOutcome::ChannelUnavailable(e) => {
            format!("📵 Cycle at {at}: channel unavailable ({})", escape_html(e))
        }
        CycleOutcome::FetchFailed(e) => {
            format!("⚠️ Cycle at {at}: feed fetch failed ({})", escape_html(e))
        }
    }
}

fn format_watchlist(watchlist: &Watchlist) -> String {
    if watchlist.is_empty() {
        return "👀 Watchlist is empty: every unclassified notification is delivered.".to_string();
    }
    let mut out = format!("👀 <b>Watchlist</b> ({} terms)\n", watchlist.terms().len());
    for term in watchlist.terms() {
        out.push_str(&format!("\n• <code>{}</code>", escape_html(term)));
    }
    out
}

fn edit_watchlist(file: &WatchlistFile, term: &str, add: bool) -> Result<String> {
    let term = term.trim();
    if term.is_empty() {
        let usage = if add { "/watch &lt;term&gt;" } else { "/unwatch &lt;term&gt;" };
        return Ok(format!("Usage: {usage}"));
    }

    let mut watchlist = file.load();
    let changed = if add {
        watchlist.add(term)
    } else {
        watchlist.remove(term)
    };
    if changed {
        file.save(&watchlist)?;
        tracing::info!(term, add, terms = watchlist.terms().len(), "watchlist updated");
    }

    let term = escape_html(term);
    Ok(match (add, changed) {
        (true, true) => format!("➕ Watching <code>{term}</code>"),
        (true, false) => format!("<code>{term}</code> is already on the watchlist"),
        (false, true) => format!("➖ Stopped watching <code>{term}</code>"),
        (false, false) => format!("<code>{term}</code> is not on the watchlist"),
    })
}

const HELP: &str = "🛰️ <b>MangaBuff Sentinel</b>\n\n\
/status - last cycle and counters\n\
/check - run a poll cycle now\n\
/watchlist - show watchlist terms\n\
/watch &lt;term&gt; - add a term\n\
/unwatch &lt;term&gt; - remove a term\n\
/help - this message";

async fn reply(state: &AppState, chat_id: ChatId, html: &str) {
    if let Err(e) = state.messenger.send_html(chat_id, html).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send command reply");
    }
}

async fn status_text(state: &AppState) -> String {
    let mut out = String::from("📊 <b>Sentinel status</b>\n");
    out.push_str(&format!(
        "\nInterval: {}",
        format_duration(state.controller.settings().interval)
    ));
    out.push_str(&format!("\nCycles run: {}", state.controller.cycles_run()));
    if state.controller.is_running() {
        out.push_str("\n⏳ A cycle is running now");
    }

    let session = match state.credentials.load() {
        Ok(Some(_)) => "present",
        Ok(None) => "missing",
        Err(_) => "unreadable",
    };
    out.push_str(&format!("\nSession: {session}"));

    match state.dedup.delivered_count().await {
        Ok(n) => out.push_str(&format!("\nDelivered (recorded): {n}")),
        Err(e) => out.push_str(&format!("\nDelivered (recorded): error ({})", escape_html(&e.to_string()))),
    }
    out.push_str(&format!(
        "\nWatchlist terms: {}",
        state.watchlist.load().terms().len()
    ));

    match state.controller.last_report().await {
        Some(report) => {
            out.push_str("\n\n");
            out.push_str(&format_report(&report));
        }
        None => out.push_str("\n\nNo cycle has finished yet."),
    }
    out
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" | "help" => reply(&state, chat_id, HELP).await,
        "status" => {
            let text = status_text(&state).await;
            reply(&state, chat_id, &text).await;
        }
        "check" => {
            if state.controller.is_running() {
                reply(&state, chat_id, "⏳ A cycle is already running.").await;
                return Ok(());
            }
            reply(&state, chat_id, "🔄 Checking notifications...").await;
            match state.controller.try_run_cycle().await {
                Some(report) => reply(&state, chat_id, &format_report(&report)).await,
                None => reply(&state, chat_id, "⏳ A cycle is already running.").await,
            }
        }
        "watchlist" => {
            let text = format_watchlist(&state.watchlist.load());
            reply(&state, chat_id, &text).await;
        }
        "watch" | "unwatch" => {
            let text = match edit_watchlist(&state.watchlist, &args, cmd == "watch") {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to save watchlist");
                    format!("❌ Failed to save watchlist: {}", escape_html(&e.to_string()))
                }
            };
            reply(&state, chat_id, &text).await;
        }
        _ => reply(&state, chat_id, "Unknown command. Try /help").await,
    }

    Ok(())
}
