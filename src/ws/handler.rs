//! WebSocket upgrade handler and viewer session lifecycle

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::broadcast::Subscription;
use crate::control::CommandForwarder;
use crate::util::rate_limit::ViewerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    // A reconnecting viewer may have missed a map change
    if state.config.refetch_map_on_connect {
        if let Err(e) = state.topology.refresh(&state.upstream).await {
            warn!(error = %e, "Map refresh on viewer connect failed");
        }
    }

    if let Some(map) = state.topology.get() {
        if let Err(e) = send_msg(&mut ws_sink, &ServerMsg::Map(&map)).await {
            debug!(error = %e, "Viewer left before map was sent");
            return;
        }
    }

    let subscription = state.broadcaster.subscribe();
    let session_id = subscription.session_id();
    info!(
        session_id = %session_id,
        viewers = state.broadcaster.session_count(),
        "Viewer connected"
    );

    let limiter = ViewerRateLimiter::new(state.config.broadcast_rate_hz);
    run_session(
        session_id,
        subscription,
        limiter,
        ws_sink,
        ws_stream,
        state.commands.clone(),
    )
    .await;

    // Cleanup on disconnect
    state.broadcaster.unsubscribe(session_id);

    info!(session_id = %session_id, "Viewer disconnected");
}

/// Run the session until either direction ends
async fn run_session(
    session_id: Uuid,
    subscription: Subscription,
    limiter: ViewerRateLimiter,
    ws_sink: SplitSink<WebSocket, Message>,
    ws_stream: SplitStream<WebSocket>,
    commands: CommandForwarder,
) {
    // Spawn writer task: broadcast states -> WebSocket
    let mut writer_handle = tokio::spawn(write_states(session_id, subscription, limiter, ws_sink));

    tokio::select! {
        _ = &mut writer_handle => {
            debug!(session_id = %session_id, "Writer finished, closing session");
        }
        _ = read_commands(session_id, ws_stream, &commands) => {
            writer_handle.abort();
        }
    }
}

/// Writer loop: subscription -> WebSocket, paced to the broadcast rate
async fn write_states(
    session_id: Uuid,
    mut subscription: Subscription,
    limiter: ViewerRateLimiter,
    mut ws_sink: SplitSink<WebSocket, Message>,
) {
    loop {
        limiter.ready().await;

        let Some(state) = subscription.recv_latest().await else {
            debug!(session_id = %session_id, "Session subscription ended");
            let _ = ws_sink.send(Message::Close(None)).await;
            break;
        };

        if let Err(e) = send_msg(&mut ws_sink, &ServerMsg::StateUpdate(&state)).await {
            debug!(session_id = %session_id, error = %e, "WebSocket send failed");
            break;
        }
    }

    debug!(
        session_id = %session_id,
        skipped = subscription.dropped(),
        "Writer finished"
    );
}

/// Reader loop: WebSocket -> command forwarder
async fn read_commands(
    session_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    commands: &CommandForwarder,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(command) => {
                    info!(session_id = %session_id, command = %command.kind(), "Control command");
                    commands.submit(command);
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg<'_>,
) -> Result<(), SendError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket error: {0}")]
    Socket(#[from] axum::Error),
}
