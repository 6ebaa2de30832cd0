//! Line-based terminal front end
//!
//! Reads questions and slash commands from stdin and renders store updates
//! to stdout. Logs go to stderr so they never interleave with an answer.

use crate::api::{Conversation, Message, Role};
use crate::store::{ChatHandle, DiscardReason, StoreClosed, StoreUpdate};
use crate::stream::Source;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const HELP: &str = "\
Type a question to ask it in the open conversation.
  /new [title]     start a conversation
  /list            list conversations
  /open <n|id>     open a conversation by list number or id
  /rename <title>  rename the open conversation
  /delete          delete the open conversation
  /more            load older messages
  /cancel          stop the answer being streamed
  /help            show this help
  /quit            exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    New(Option<String>),
    List,
    Open(String),
    Rename(String),
    Delete,
    More,
    Cancel,
    Help,
    Quit,
    /// Blank line
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command {0} (try /help)")]
    Unknown(String),
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(if line.is_empty() {
            Command::Nothing
        } else {
            Command::Ask(line.to_string())
        });
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg = (!arg.is_empty()).then(|| arg.to_string());

    match name {
        "new" => Ok(Command::New(arg)),
        "list" | "ls" => Ok(Command::List),
        "open" => arg.map(Command::Open).ok_or(CommandError::Usage("/open <n|id>")),
        "rename" => arg.map(Command::Rename).ok_or(CommandError::Usage("/rename <title>")),
        "delete" => Ok(Command::Delete),
        "more" => Ok(Command::More),
        "cancel" => Ok(Command::Cancel),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(format!("/{other}"))),
    }
}

/// Run until `/quit`, end of input, or the store stops
pub async fn run(handle: ChatHandle) -> Result<(), StoreClosed> {
    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::new(io::stdout());

    handle.refresh_conversations()?;
    report(renderer.notice("Type /help for commands."));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read input");
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(&handle, command, &mut renderer).await?,
                    Err(e) => report(renderer.notice(&e.to_string())),
                }
            }
            update = updates.recv() => match update {
                Ok(update) => report(renderer.render(&update)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Terminal fell behind store updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn execute<W: Write>(
    handle: &ChatHandle,
    command: Command,
    renderer: &mut Renderer<W>,
) -> Result<(), StoreClosed> {
    match command {
        Command::Ask(text) => {
            handle.set_draft(text)?;
            handle.submit()?;
        }
        Command::New(title) => handle.create_conversation(title)?,
        Command::List => handle.refresh_conversations()?,
        Command::Open(target) => {
            let state = handle.snapshot().await?;
            match resolve_conversation(&state.conversations, &target) {
                Some(id) => handle.select(id)?,
                None => report(renderer.notice(&format!("no conversation {target}"))),
            }
        }
        Command::Rename(title) => handle.rename(None, title)?,
        Command::Delete => handle.delete(None)?,
        Command::More => handle.load_older()?,
        Command::Cancel => handle.cancel()?,
        Command::Help => report(renderer.notice(HELP)),
        Command::Quit | Command::Nothing => {}
    }
    Ok(())
}

/// 1-based list number, or a literal id
fn resolve_conversation(conversations: &[Conversation], target: &str) -> Option<String> {
    if let Ok(n) = target.parse::<usize>() {
        if let Some(conv) = n.checked_sub(1).and_then(|i| conversations.get(i)) {
            return Some(conv.id.clone());
        }
    }
    conversations
        .iter()
        .find(|c| c.id == target)
        .map(|c| c.id.clone())
}

fn report(result: io::Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to write to terminal");
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Turns store updates into terminal text
pub struct Renderer<W: Write> {
    out: W,
    conversations: Vec<Conversation>,
    /// An answer line is open and needs a newline before other output
    mid_answer: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            conversations: Vec::new(),
            mid_answer: false,
        }
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        self.end_answer_line()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn render(&mut self, update: &StoreUpdate) -> io::Result<()> {
        match update {
            StoreUpdate::ConversationsChanged(list) => {
                self.conversations.clone_from(list);
                self.end_answer_line()?;
                if list.is_empty() {
                    writeln!(self.out, "(no conversations, /new to start one)")?;
                }
                for (i, conv) in list.iter().enumerate() {
                    writeln!(self.out, "{:>3}. {}", i + 1, conv.display_title())?;
                }
            }
            StoreUpdate::Selected {
                conversation_id: Some(id),
            } => {
                let title = self
                    .conversations
                    .iter()
                    .find(|c| &c.id == id)
                    .map_or("(untitled)", Conversation::display_title)
                    .to_string();
                self.end_answer_line()?;
                writeln!(self.out, "== {title} ==")?;
            }
            StoreUpdate::Selected {
                conversation_id: None,
            } => {
                self.end_answer_line()?;
                writeln!(self.out, "(no conversation open)")?;
            }
            StoreUpdate::HistoryLoaded {
                messages, older, ..
            } => {
                self.end_answer_line()?;
                if *older {
                    if messages.is_empty() {
                        writeln!(self.out, "(no older messages)")?;
                    } else {
                        writeln!(self.out, "-- older messages --")?;
                    }
                }
                for message in messages {
                    self.write_message(message)?;
                }
            }
            StoreUpdate::Prep(text) => {
                self.end_answer_line()?;
                writeln!(self.out, "... {text}")?;
            }
            StoreUpdate::Delta(delta) => {
                if !self.mid_answer {
                    write!(self.out, "bot> ")?;
                    self.mid_answer = true;
                }
                write!(self.out, "{delta}")?;
            }
            StoreUpdate::AnswerFinalized { sources, .. } => {
                self.end_answer_line()?;
                self.write_sources(sources)?;
            }
            StoreUpdate::AnswerDiscarded { reason } => {
                self.end_answer_line()?;
                // Incomplete answers are dropped quietly; the error, if any,
                // was already shown
                if *reason == DiscardReason::Cancelled {
                    writeln!(self.out, "(cancelled)")?;
                }
            }
            StoreUpdate::Error(message) | StoreUpdate::Rejected(message) => {
                self.end_answer_line()?;
                writeln!(self.out, "! {message}")?;
            }
            StoreUpdate::MessageAppended(_)
            | StoreUpdate::Sources(_)
            | StoreUpdate::Loading(_) => {}
        }
        self.out.flush()
    }

    fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let prefix = match message.role {
            Role::User => "you",
            Role::Assistant => "bot",
        };
        writeln!(self.out, "{prefix}> {}", message.content)
    }

    fn write_sources(&mut self, sources: &[Source]) -> io::Result<()> {
        for source in sources {
            let label = source.label();
            if !label.is_empty() {
                writeln!(self.out, "  [source] {label}")?;
            }
        }
        Ok(())
    }

    fn end_answer_line(&mut self) -> io::Result<()> {
        if self.mid_answer {
            self.mid_answer = false;
            writeln!(self.out)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
