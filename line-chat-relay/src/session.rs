//! Per-connection lifecycle: negotiate a nickname, join, relay lines, leave.

use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast::Broadcaster,
    line::read_line,
    registry::{Member, SessionId},
};

pub const NICKNAME_PROMPT: &str = "Enter your nickname: ";

pub fn chat_line(nickname: &str, text: &str) -> String {
    format!("{nickname}: {text}")
}

pub fn joined_line(nickname: &str) -> String {
    format!("{nickname} has joined the chat")
}

pub fn left_line(nickname: &str) -> String {
    format!("{nickname} has left the chat")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Negotiating,
    Active,
    Closed,
}

impl SessionState {
    fn can_enter(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Negotiating, SessionState::Active)
                | (SessionState::Negotiating, SessionState::Closed)
                | (SessionState::Active, SessionState::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away before naming itself. Nothing was announced.
    Abandoned,
    /// The client was active and has now left.
    Left {
        id: SessionId,
        nickname: String,
        lines_relayed: u64,
    },
}

/// Everything a session task needs from the relay.
pub struct SessionContext<W> {
    pub broadcaster: Arc<Broadcaster<W>>,
    pub max_line_bytes: usize,
}

impl<W> Clone for SessionContext<W> {
    fn clone(&self) -> Self {
        Self {
            broadcaster: Arc::clone(&self.broadcaster),
            max_line_bytes: self.max_line_bytes,
        }
    }
}

struct Session {
    id: SessionId,
    nickname: String,
    state: SessionState,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_enter(next),
            "invalid session transition {} -> {}",
            self.state,
            next
        );
        debug!(session = %self.id, nickname = %self.nickname, from = %self.state, to = %next, "session state change");
        self.state = next;
    }
}

/// Runs one client from prompt to departure.
///
/// `reader` stays with this task. `writer` moves into the registry once the
/// nickname is known, which is where broadcasts write to it from.
pub async fn run_session<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: SessionContext<W>,
) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let Some(nickname) = negotiate_nickname(&mut reader, &mut writer, ctx.max_line_bytes).await
    else {
        // Dropping `writer` here releases the stream.
        return Ok(SessionEnd::Abandoned);
    };

    let registry = ctx.broadcaster.registry();
    let mut session = Session {
        id: registry.allocate_id(),
        nickname,
        state: SessionState::Negotiating,
    };

    let added = registry
        .add(Member::new(session.id, session.nickname.clone(), writer))
        .await;
    anyhow::ensure!(added, "session {} registered twice", session.id);
    session.transition(SessionState::Active);
    info!(session = %session.id, nickname = %session.nickname, "client joined");

    let join_announcement = announce_join(&ctx.broadcaster, joined_line(&session.nickname));

    let lines_relayed = relay_lines(&mut reader, &ctx, &session).await;

    session.transition(SessionState::Closed);
    if let Some(member) = registry.remove(session.id).await {
        let mut writer = member.into_writer();
        if let Err(error) = writer.shutdown().await {
            debug!(session = %session.id, %error, "failed to shut down client stream");
        }
    }
    drop(reader);
    info!(session = %session.id, nickname = %session.nickname, lines_relayed, "client left");

    if let Err(error) = join_announcement.await {
        warn!(session = %session.id, %error, "join announcement task failed");
    }
    ctx.broadcaster.broadcast(&left_line(&session.nickname)).await;

    Ok(SessionEnd::Left {
        id: session.id,
        nickname: session.nickname,
        lines_relayed,
    })
}

/// Sends the prompt once and reads exactly one line as the nickname. `None`
/// means no usable nickname arrived (EOF, read error or an empty line), in
/// which case the connection is simply dropped.
async fn negotiate_nickname<R, W>(
    reader: &mut R,
    writer: &mut W,
    max_line_bytes: usize,
) -> Option<String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(error) = send_prompt(writer).await {
        warn!(?error, "failed to send nickname prompt");
        return None;
    }

    match read_line(reader, max_line_bytes).await {
        Ok(Some(nickname)) if !nickname.is_empty() => Some(nickname),
        Ok(Some(_)) => {
            debug!("empty nickname line, dropping connection");
            None
        }
        Ok(None) => {
            debug!("connection closed before a nickname was sent");
            None
        }
        Err(error) => {
            debug!(?error, "failed to read nickname");
            None
        }
    }
}

async fn send_prompt<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(NICKNAME_PROMPT.as_bytes())
        .await
        .context("write prompt")?;
    writer.flush().await.context("flush prompt")?;
    Ok(())
}

fn announce_join<W>(broadcaster: &Arc<Broadcaster<W>>, line: String) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    // Runs beside the read loop, so the join may land after the newcomer's
    // first chat line. It must land before the leave line.
    let broadcaster = Arc::clone(broadcaster);
    tokio::spawn(async move {
        broadcaster.broadcast(&line).await;
    })
}

async fn relay_lines<R, W>(reader: &mut R, ctx: &SessionContext<W>, session: &Session) -> u64
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut relayed = 0;
    loop {
        match read_line(reader, ctx.max_line_bytes).await {
            Ok(Some(text)) => {
                ctx.broadcaster
                    .broadcast(&chat_line(&session.nickname, &text))
                    .await;
                relayed += 1;
            }
            Ok(None) => break,
            Err(error) => {
                debug!(session = %session.id, ?error, "read failed, closing session");
                break;
            }
        }
    }
    relayed
}
