//! Terminal rendering of engine state and events.

use chrono::Local;
use parley_core::{
    Conversation, EngineEvent, EngineSnapshot, Message, MessageStatus, ParticipantId,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

const PREVIEW_CHARS: usize = 40;

/// One line per message: time, author, text and, for own messages, status.
pub fn message_line(message: &Message, me: &ParticipantId) -> String {
    let time = message.created_at.with_timezone(&Local).format("%H:%M");
    if &message.sender == me {
        let marker = match message.status {
            MessageStatus::Sending => " (sending)",
            MessageStatus::Queued => " (queued)",
            MessageStatus::Failed => " (failed)",
            MessageStatus::Sent => " ✓",
            MessageStatus::Delivered => " ✓✓",
            MessageStatus::Read => " ✓✓ read",
        };
        format!("[{time}] you: {}{marker}", message.content)
    } else {
        format!("[{time}] {}: {}", message.sender, message.content)
    }
}

/// Summary line for the conversation list.
pub fn conversation_line(conversation: &Conversation, online: bool) -> String {
    let dot = if online { "●" } else { "○" };
    let unread = match conversation.unread_count {
        0 => String::new(),
        n => format!(" [{n}]"),
    };
    let preview = conversation
        .last_message
        .as_ref()
        .map(|m| format!(": {}", m.preview(PREVIEW_CHARS)))
        .unwrap_or_default();
    format!(
        "{dot} {} ({}){unread}{preview}",
        conversation.participant.name,
        conversation.id()
    )
}

/// Connectivity, queue and unread summary.
pub fn status_line(snapshot: &EngineSnapshot) -> String {
    let channel = if snapshot.connection.is_connected {
        "connected"
    } else {
        "disconnected"
    };
    let network = if snapshot.connection.is_online {
        "online"
    } else {
        "offline"
    };
    let mut line = format!(
        "{network}, channel {channel}, {} queued, {} unread",
        snapshot.queued,
        snapshot.server_unread.unwrap_or(snapshot.unread_total)
    );
    if let Some(active) = &snapshot.active {
        line.push_str(&format!(", talking to {active}"));
    }
    if let Some(notice) = &snapshot.notice {
        line.push_str(&format!(" ({notice})"));
    }
    line
}

/// Prints engine events until the engine stops.
pub async fn run(
    mut events: broadcast::Receiver<EngineEvent>,
    me: ParticipantId,
    desktop_notifications: bool,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Renderer lagged behind engine events");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match event {
            EngineEvent::MessageUpdated {
                participant,
                message,
            } => println!("<{participant}> {}", message_line(&message, &me)),
            EngineEvent::ThreadUpdated { participant } => {
                println!("-- {participant}: history updated, /history to view --");
            }
            EngineEvent::ConnectionChanged(state) => {
                let channel = if state.is_connected {
                    "connected"
                } else {
                    "disconnected"
                };
                println!("-- channel {channel} --");
            }
            EngineEvent::Notice(kind) => println!("!! {kind}"),
            EngineEvent::Notification {
                sender,
                sender_name,
                preview,
            } => {
                println!("** {sender_name} ({sender}): {preview}");
                if desktop_notifications {
                    notify(sender_name, preview);
                }
            }
            EngineEvent::SendRejected { temp_id, reason } => {
                println!("!! message {temp_id} was rejected: {reason}");
            }
            EngineEvent::UnreadTotal(total) if total > 0 => println!("-- {total} unread --"),
            EngineEvent::ConversationsUpdated
            | EngineEvent::NoticeCleared
            | EngineEvent::PresenceChanged(_)
            | EngineEvent::UnreadTotal(_) => {}
        }
    }
}

fn notify(summary: String, body: String) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = notify_rust::Notification::new()
            .appname("Parley")
            .summary(&summary)
            .body(&body)
            .show()
        {
            warn!(?e, "Failed to show desktop notification");
        }
    });
}
