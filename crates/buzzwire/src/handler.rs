//! Per-connection request loop: decode, dispatch to the manager, reply.

use std::sync::Arc;

use buzzwire_protocol::{ClientRequest, Codec, PlayerId, ServerEvent};
use buzzwire_transport::{Connection, ConnectionHandle, WebSocketConnection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BuzzwireError;
use crate::manager::GameManager;
use crate::store::GameStore;

/// Shared server state handed to every connection task.
pub(crate) struct ServerState<S: GameStore, C: Codec> {
    pub(crate) manager: Mutex<GameManager<S>>,
    pub(crate) codec: C,
}

/// Actions the decoder knows about. Payloads that name one of these but
/// fail validation get a structured error; anything else is an unknown
/// action.
const KNOWN_ACTIONS: [&str; 9] = [
    "start_game",
    "host_reconnect",
    "register",
    "signal",
    "host_decision",
    "start_timer",
    "finalize",
    "set_round_names",
    "offset_check",
];

/// Drives one connection until the peer closes or the transport fails.
///
/// Outbound traffic goes through a [`ConnectionHandle`] writer task, so
/// broadcasts from other sessions' handlers and from the sweeps can be
/// delivered while this loop is parked in `recv`.
pub(crate) async fn handle_connection<S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, C>>,
) where
    S: GameStore,
    C: Codec + Send + Sync + 'static,
{
    let conn_id = conn.id();
    let handle = ConnectionHandle::spawn_writer(conn.clone());
    let mut bound_player: Option<PlayerId> = None;

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(%conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                debug!(%conn_id, error = %e, "connection error");
                break;
            }
        };

        let request: ClientRequest = match state.codec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                debug!(%conn_id, error = %e, "undecodable request");
                send_event(&handle, &state.codec, &decode_failure_reply(&data));
                continue;
            }
        };

        if let Some(reply) =
            dispatch_request(&state, &handle, &mut bound_player, request).await
        {
            send_event(&handle, &state.codec, &reply);
        }
    }

    if let Some(player_id) = bound_player {
        state.manager.lock().await.detach_connection(player_id);
    }
}

/// Routes a decoded request. Returns the direct reply for the caller, if
/// any; broadcasts are dispatched by the manager itself.
async fn dispatch_request<S, C>(
    state: &Arc<ServerState<S, C>>,
    handle: &ConnectionHandle,
    bound_player: &mut Option<PlayerId>,
    request: ClientRequest,
) -> Option<ServerEvent>
where
    S: GameStore,
    C: Codec + Send + Sync + 'static,
{
    let mut manager = state.manager.lock().await;
    match request {
        ClientRequest::StartGame {
            host_name,
            host_id,
            number_of_rounds,
            round_names,
        } => {
            if host_name.trim().is_empty() {
                return Some(error_event(&BuzzwireError::MissingField("host_name")));
            }
            let result = manager.create_game(
                handle.clone(),
                &host_name,
                host_id,
                number_of_rounds,
                round_names,
                &state.codec,
            );
            match result {
                Ok(reply) => {
                    if let ServerEvent::GameCreated { ref host, .. } = reply {
                        *bound_player = Some(host.player_id);
                    }
                    Some(reply)
                }
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientRequest::HostReconnect { game_id } => {
            match manager.host_reconnect(game_id, handle.clone(), &state.codec) {
                Ok(reply) => {
                    if let ServerEvent::GameCreated { ref host, .. } = reply {
                        *bound_player = Some(host.player_id);
                    }
                    Some(reply)
                }
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientRequest::Register {
            name,
            game_id,
            game_token,
            player_id,
        } => {
            if name.trim().is_empty() {
                return Some(error_event(&BuzzwireError::MissingField("name")));
            }
            let result = manager.register_player(
                &name,
                game_id,
                game_token.as_deref(),
                player_id,
                handle.clone(),
                &state.codec,
            );
            match result {
                Ok(view) => {
                    // The `registered` reply already went out through the
                    // session's effects.
                    *bound_player = Some(view.player_id);
                    None
                }
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientRequest::Signal { player_id, local_ts } => {
            match manager.process_signal(player_id, local_ts, &state.codec) {
                Ok(()) => Some(ServerEvent::ok()),
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientRequest::HostDecision {
            game_id,
            host_decision,
        } => match manager.host_decision(game_id, host_decision, &state.codec) {
            Ok(()) => Some(ServerEvent::ok()),
            Err(e) => Some(error_event(&e)),
        },
        ClientRequest::StartTimer { game_id } => {
            match manager.start_timer(game_id, &state.codec) {
                Ok(()) => Some(ServerEvent::ok()),
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientRequest::Finalize { game_id } => {
            match manager.finalize(game_id, &state.codec) {
                Ok(()) => Some(ServerEvent::ok()),
                Err(e) => Some(error_event(&e)),
            }
        }
        ClientRequest::SetRoundNames {
            game_id,
            round_names,
        } => match manager.set_round_names(game_id, round_names, &state.codec) {
            Ok(()) => Some(ServerEvent::ok()),
            Err(e) => Some(error_event(&e)),
        },
        ClientRequest::OffsetCheck {
            player_id,
            server_out_ts,
            client_ts,
        } => Some(manager.record_offset_sample(player_id, server_out_ts, client_ts)),
    }
}

/// Classifies an undecodable payload: a recognizable action with bad
/// fields earns a validation error, everything else the fixed
/// unknown-action reply.
fn decode_failure_reply(data: &[u8]) -> ServerEvent {
    let action = serde_json::from_slice::<serde_json::Value>(data)
        .ok()
        .and_then(|v| v.get("action").and_then(|a| a.as_str()).map(String::from));
    match action {
        Some(action) if KNOWN_ACTIONS.contains(&action.as_str()) => ServerEvent::Error {
            code: 400,
            desc: format!("invalid {action} request"),
        },
        _ => ServerEvent::unknown_action(),
    }
}

fn error_event(e: &BuzzwireError) -> ServerEvent {
    ServerEvent::Error {
        code: e.code(),
        desc: e.to_string(),
    }
}

fn send_event<C: Codec>(handle: &ConnectionHandle, codec: &C, event: &ServerEvent) {
    match codec.encode(event) {
        Ok(bytes) => handle.send(bytes),
        Err(e) => warn!(error = %e, "failed to encode reply"),
    }
}
