//! Manages the lifecycle of one client connection.
//!
//! A connection moves through three phases. It starts without an identity;
//! the first message either asks for one or brings its own. The first chat
//! message then binds a character, and from there on every message is a turn
//! against that same character.

use crate::{
    protocol::{ClientRequest, FrameError, ServerResponse, read_frame, write_frame},
    state::AppState,
};
use anyhow::{Context, Result};
use companion_core::character::{CharacterSession, SessionError};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Where a connection is in the session lifecycle.
enum Phase {
    /// No message received yet.
    AwaitingIdentity,
    /// The connection has an identity but no character yet.
    AwaitingFirstCharacterMessage { session_id: String },
    /// A character is bound for the rest of the connection.
    Active(CharacterSession),
}

struct Connection<S> {
    stream: S,
    state: Arc<AppState>,
    phase: Phase,
}

/// Drives one connection until the peer disconnects, a protocol or
/// generation error occurs, or `shutdown` is cancelled.
///
/// Errors are logged and end only this connection. Replies are written whole:
/// shutdown is observed while waiting for a request or a turn, never while a
/// frame is being written.
#[instrument(name = "connection", skip_all, fields(peer = %peer, session_id = tracing::field::Empty))]
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    info!("New connection");
    let mut connection = Connection {
        stream,
        state,
        phase: Phase::AwaitingIdentity,
    };

    match connection.run(&shutdown).await {
        Ok(()) => info!("Connection closed"),
        Err(e) if e.is::<SessionError>() => error!(error = %e, "Turn failed, closing connection"),
        Err(e) => warn!(error = ?e, "Connection terminated"),
    }
    connection.park_memory().await;
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn run(&mut self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            let payload = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested while idle");
                    return Ok(());
                }
                frame = read_frame(&mut self.stream) => match frame {
                    Ok(payload) => payload,
                    Err(FrameError::Closed) => {
                        debug!("Peer closed the stream");
                        return Ok(());
                    }
                    Err(e) => return Err(e).context("Failed to read frame"),
                },
            };
            let request =
                ClientRequest::from_payload(&payload).context("Malformed request payload")?;

            let response = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested mid-turn, abandoning reply");
                    return Ok(());
                }
                response = self.step(request) => response?,
            };

            let payload = response.to_payload()?;
            write_frame(&mut self.stream, &payload)
                .await
                .context("Failed to write frame")?;
        }
    }

    /// Applies one request to the phase machine and produces its reply.
    async fn step(&mut self, request: ClientRequest) -> Result<ServerResponse> {
        if let Phase::AwaitingIdentity = self.phase {
            let Some(session_id) = request.conversation_id.identity() else {
                let uid = self.state.registry.issue_session_id().await;
                tracing::Span::current().record("session_id", uid.as_str());
                self.phase = Phase::AwaitingFirstCharacterMessage {
                    session_id: uid.clone(),
                };
                return Ok(ServerResponse::Identity { uid });
            };
            self.state.registry.claim(&session_id).await;
            tracing::Span::current().record("session_id", session_id.as_str());
            debug!("Client supplied its own session id");
            self.phase = Phase::AwaitingFirstCharacterMessage { session_id };
        }

        let input = request.chat_input().ok_or(SessionError::EmptyInput)?;

        if let Phase::AwaitingFirstCharacterMessage { session_id } = &self.phase {
            let session_id = session_id.clone();
            let session = self
                .state
                .bind_character(session_id, request.character())
                .await;
            self.phase = Phase::Active(session);
        }

        let Phase::Active(session) = &mut self.phase else {
            anyhow::bail!("No character bound after the first chat message");
        };
        if let Some(requested) = request.conversation_id.identity() {
            if requested != session.session_id() {
                warn!(%requested, "Ignoring a different session id on a bound connection");
            }
        }
        if let Some(character) = request.character() {
            if character != session.profile().name {
                debug!(%character, "Ignoring character change on a bound connection");
            }
        }

        let reply = session
            .respond(input, self.state.config.generation_timeout)
            .await?;
        Ok(ServerResponse::Reply(reply))
    }

    /// Hands an active conversation's memory to the registry so a later
    /// connection with the same uid can resume it.
    async fn park_memory(self) {
        if let Phase::Active(session) = self.phase {
            let session_id = session.session_id().to_string();
            let character = session.profile().name.clone();
            self.state
                .registry
                .park(&session_id, &character, session.into_memory())
                .await;
        }
    }
}
