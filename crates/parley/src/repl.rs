//! Line-oriented chat commands read from stdin.

use anyhow::Result;
use parley_core::{EngineHandle, Error, Participant, ParticipantId};
use parley_net::channel::AppState;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text for the open conversation.
    Say(String),
    /// Text for a named participant.
    Send {
        /// Recipient.
        to: ParticipantId,
        /// Text.
        text: String,
    },
    /// Open a conversation.
    Open(ParticipantId),
    /// Leave the open conversation.
    Close,
    /// List conversations.
    List,
    /// Print the open conversation.
    History,
    /// Add a participant to the directory.
    Add {
        /// Participant id.
        id: ParticipantId,
        /// Display name.
        name: String,
    },
    /// Toggle the network-available signal.
    Online(bool),
    /// Report an app lifecycle change.
    AppState(AppState),
    /// Print connectivity and queue state.
    Status,
    /// Print the command list.
    Help,
    /// Exit.
    Quit,
    /// Blank line.
    Empty,
}

const HELP: &str = "\
Commands:
  /open <id>            open a conversation
  /close                leave the open conversation
  /send <id> <text>     send to a participant
  /list                 list conversations
  /history              show the open conversation
  /add <id> <name>      add a participant
  /online | /offline    toggle network availability
  /background | /foreground
  /status               connection and queue state
  /help                 this text
  /quit                 exit
Anything else is sent to the open conversation.";

/// Parses one input line.
pub fn parse(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Say(line.to_string()));
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));

    let input = match name {
        "open" => Input::Open(participant_arg(rest, "/open <id>")?),
        "close" => Input::Close,
        "send" => {
            let (to, text) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "Usage: /send <id> <text>".to_string())?;
            Input::Send {
                to: ParticipantId::from(to),
                text: text.trim().to_string(),
            }
        }
        "list" => Input::List,
        "history" => Input::History,
        "add" => {
            let (id, name) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "Usage: /add <id> <name>".to_string())?;
            Input::Add {
                id: ParticipantId::from(id),
                name: name.trim().to_string(),
            }
        }
        "online" => Input::Online(true),
        "offline" => Input::Online(false),
        "background" => Input::AppState(AppState::Background),
        "foreground" => Input::AppState(AppState::Active),
        "status" => Input::Status,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("Unknown command /{other}; try /help")),
    };
    Ok(input)
}

fn participant_arg(rest: &str, usage: &str) -> Result<ParticipantId, String> {
    match rest.split_whitespace().next() {
        Some(id) => Ok(ParticipantId::from(id)),
        None => Err(format!("Usage: {usage}")),
    }
}

/// Reads commands for `me` until `/quit` or end of input.
pub async fn run(handle: &EngineHandle, me: &ParticipantId) -> Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let input = match parse(&line) {
            Ok(Input::Quit) => break,
            Ok(input) => input,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match execute(handle, me, input).await {
            Ok(()) => {}
            Err(Error::EngineStopped) => return Err(Error::EngineStopped.into()),
            Err(e) => println!("{e}"),
        }
    }
    Ok(())
}

async fn execute(
    handle: &EngineHandle,
    me: &ParticipantId,
    input: Input,
) -> parley_core::Result<()> {
    match input {
        Input::Say(text) => {
            let Some(active) = handle.snapshot().await?.active else {
                println!("No conversation open; use /open <id>");
                return Ok(());
            };
            handle.send_text(active.0, text).await?;
        }
        Input::Send { to, text } => {
            handle.send_text(to.0, text).await?;
        }
        Input::Open(participant) => {
            handle.open(participant.clone()).await?;
            print_thread(handle, me, participant).await?;
        }
        Input::Close => handle.close().await?,
        Input::List => {
            let snapshot = handle.snapshot().await?;
            if snapshot.conversations.is_empty() {
                println!("No conversations");
            }
            for conversation in &snapshot.conversations {
                let online = snapshot.online_users.contains(conversation.id());
                println!("{}", render::conversation_line(conversation, online));
            }
        }
        Input::History => {
            if let Some(active) = handle.snapshot().await?.active {
                print_thread(handle, me, active).await?;
            } else {
                println!("No conversation open");
            }
        }
        Input::Add { id, name } => {
            handle
                .add_participant(Participant::new(id.as_str(), name))
                .await?;
        }
        Input::Online(online) => handle.set_online(online).await?,
        Input::AppState(state) => handle.set_app_state(state).await?,
        Input::Status => println!("{}", render::status_line(&handle.snapshot().await?)),
        Input::Help => println!("{HELP}"),
        Input::Quit | Input::Empty => {}
    }
    Ok(())
}

async fn print_thread(
    handle: &EngineHandle,
    me: &ParticipantId,
    participant: ParticipantId,
) -> parley_core::Result<()> {
    let messages = handle.messages(participant.clone()).await?;
    println!("-- {participant} ({} messages) --", messages.len());
    for message in &messages {
        println!("{}", render::message_line(message, me));
    }
    Ok(())
}
