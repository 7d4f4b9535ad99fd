//! Manager-level integration tests.
//!
//! These drive [`GameManager`] directly with capture-channel connection
//! handles, so every outbound event can be asserted without a socket.

use std::sync::Arc;
use std::time::Duration;

use buzzwire::{BuzzwireError, EngineConfig, GameManager, GameStore, MemoryStore};
use buzzwire_clock::now_ms;
use buzzwire_game::GameConfig;
use buzzwire_protocol::{
    GameId, HostDecision, JsonCodec, PlayerId, QuestionState, ServerEvent,
};
use buzzwire_transport::{ConnectionHandle, ConnectionId};
use tokio::sync::mpsc;

type Wire = mpsc::UnboundedReceiver<Vec<u8>>;

fn capture(id: u64) -> (ConnectionHandle, Wire) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::from_sender(ConnectionId::new(id), tx), rx)
}

fn drain(rx: &mut Wire) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        events.push(serde_json::from_slice(&bytes).expect("valid event json"));
    }
    events
}

fn manager() -> GameManager<Arc<MemoryStore>> {
    GameManager::new(Arc::new(MemoryStore::new()), EngineConfig::default())
}

/// A manager whose accumulation window freezes almost immediately, so
/// tests can sweep without waiting a full second.
fn fast_manager() -> GameManager<Arc<MemoryStore>> {
    let config = EngineConfig {
        game: GameConfig {
            accumulation_window: Duration::from_millis(1),
            ..GameConfig::default()
        },
        ..EngineConfig::default()
    };
    GameManager::new(Arc::new(MemoryStore::new()), config)
}

fn create_game(
    mgr: &mut GameManager<Arc<MemoryStore>>,
    rounds: Option<u32>,
) -> (GameId, String, PlayerId, Wire) {
    let (handle, rx) = capture(1);
    let reply = mgr
        .create_game(handle, "Alice", None, rounds, None, &JsonCodec)
        .expect("game created");
    match reply {
        ServerEvent::GameCreated {
            game_id,
            token,
            host,
        } => (game_id, token, host.player_id, rx),
        other => panic!("unexpected reply: {other:?}"),
    }
}

fn join(
    mgr: &mut GameManager<Arc<MemoryStore>>,
    name: &str,
    token: &str,
    conn: u64,
) -> (PlayerId, Wire) {
    let (handle, rx) = capture(conn);
    let view = mgr
        .register_player(name, None, Some(token), None, handle, &JsonCodec)
        .expect("player registered");
    (view.player_id, rx)
}

// =========================================================================
// Session lifecycle
// =========================================================================

#[test]
fn test_create_game_replies_and_persists() {
    let mut mgr = manager();
    let (game_id, token, host_id, mut host_rx) = create_game(&mut mgr, Some(2));

    assert_eq!(token.len(), 5);
    assert!(token.chars().all(|c| c.is_ascii_uppercase()));
    assert_eq!(mgr.game_of(host_id), Some(game_id));

    let events = drain(&mut host_rx);
    let status = events
        .iter()
        .find_map(|e| match e {
            ServerEvent::Status { status } => Some(status),
            _ => None,
        })
        .expect("status broadcast to host");
    assert_eq!(status.number_of_rounds, 2);
    assert!(status.players.is_empty());

    let snapshot = mgr.store().load(game_id).expect("persisted at creation");
    assert_eq!(snapshot.token, token);
}

#[test]
fn test_register_player_by_token_notifies_everyone() {
    let mut mgr = manager();
    let (game_id, token, _, mut host_rx) = create_game(&mut mgr, None);
    drain(&mut host_rx);

    let (bob, mut bob_rx) = join(&mut mgr, "Bob", &token, 2);
    assert_eq!(mgr.game_of(bob), Some(game_id));

    let bob_events = drain(&mut bob_rx);
    assert!(bob_events.iter().any(|e| matches!(
        e,
        ServerEvent::Registered { player } if player.player_id == bob && player.name == "Bob"
    )));
    assert!(
        bob_events
            .iter()
            .any(|e| matches!(e, ServerEvent::Status { .. }))
    );

    let host_events = drain(&mut host_rx);
    assert!(host_events.iter().any(|e| matches!(
        e,
        ServerEvent::Status { status } if status.players.len() == 1
    )));
}

#[test]
fn test_rejoining_another_game_leaves_the_first() {
    let mut mgr = manager();
    let (game_a, token_a, _, mut host_a_rx) = create_game(&mut mgr, None);
    let (game_b, token_b, _, _host_b_rx) = create_game(&mut mgr, None);

    let (bob, _old_rx) = join(&mut mgr, "Bob", &token_a, 3);
    drain(&mut host_a_rx);

    let (handle, _rx) = capture(4);
    mgr.register_player("Bob", None, Some(&token_b), Some(bob), handle, &JsonCodec)
        .expect("player switched sessions");

    assert_eq!(mgr.game_of(bob), Some(game_b));
    let status_a = mgr.game_status(game_a).expect("first game still live");
    assert!(
        status_a.players.iter().all(|p| p.player_id != bob),
        "player must not remain a member of the session they left"
    );
    let status_b = mgr.game_status(game_b).expect("second game live");
    assert!(status_b.players.iter().any(|p| p.player_id == bob));

    // The first game's host hears the departure.
    let host_a_events = drain(&mut host_a_rx);
    assert!(host_a_events.iter().any(|e| matches!(
        e,
        ServerEvent::Status { status } if status.players.is_empty()
    )));
}

#[test]
fn test_register_with_unknown_token_is_not_found() {
    let mut mgr = manager();
    let (handle, _rx) = capture(2);
    let err = mgr
        .register_player("Bob", None, Some("ZZZZZ"), None, handle, &JsonCodec)
        .unwrap_err();
    assert!(matches!(err, BuzzwireError::GameNotFound(_)));
    assert_eq!(err.code(), 404);
}

#[test]
fn test_register_without_game_reference_is_rejected() {
    let mut mgr = manager();
    let (handle, _rx) = capture(2);
    let err = mgr
        .register_player("Bob", None, None, None, handle, &JsonCodec)
        .unwrap_err();
    assert!(matches!(err, BuzzwireError::MissingField(_)));
    assert_eq!(err.code(), 400);
}

// =========================================================================
// Signals and decisions
// =========================================================================

#[test]
fn test_signal_reaches_host_then_window_freezes_queue() {
    let mut mgr = fast_manager();
    let (_game_id, token, _, mut host_rx) = create_game(&mut mgr, None);
    let (bob, mut bob_rx) = join(&mut mgr, "Bob", &token, 2);
    drain(&mut host_rx);
    drain(&mut bob_rx);

    mgr.process_signal(bob, now_ms(), &JsonCodec)
        .expect("member signal accepted");
    let host_events = drain(&mut host_rx);
    assert!(host_events.iter().any(|e| matches!(
        e,
        ServerEvent::SignalsUpdate { signals } if signals.len() == 1
    )));

    // Signal views never reach non-host players.
    assert!(
        !drain(&mut bob_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::SignalsUpdate { .. }))
    );

    std::thread::sleep(Duration::from_millis(5));
    mgr.check_signal_windows(&JsonCodec);

    let bob_events = drain(&mut bob_rx);
    assert!(bob_events.iter().any(|e| matches!(
        e,
        ServerEvent::PlayerAnswering { players_queue }
            if players_queue.len() == 1 && players_queue[0].player_id == bob
    )));
    assert!(bob_events.iter().any(|e| matches!(
        e,
        ServerEvent::Status { status } if status.question_state == QuestionState::Answering
    )));
}

#[test]
fn test_accept_decision_scores_and_persists() {
    let mut mgr = fast_manager();
    let (game_id, token, _, _host_rx) = create_game(&mut mgr, None);
    let (bob, _bob_rx) = join(&mut mgr, "Bob", &token, 2);

    mgr.process_signal(bob, now_ms(), &JsonCodec)
        .expect("member signal accepted");
    std::thread::sleep(Duration::from_millis(5));
    mgr.check_signal_windows(&JsonCodec);
    mgr.host_decision(game_id, HostDecision::Accept, &JsonCodec)
        .expect("decision applied");

    let snapshot = mgr.store().load(game_id).expect("persisted after accept");
    let player = &snapshot.status.players[0];
    assert_eq!(player.score, 10);
    assert_eq!(snapshot.status.nominal, 20);
    assert_eq!(snapshot.status.question_number, 2);
}

#[test]
fn test_signal_from_unknown_player_is_not_found() {
    let mut mgr = manager();
    let err = mgr
        .process_signal(PlayerId(99_999), now_ms(), &JsonCodec)
        .unwrap_err();
    assert_eq!(err.code(), 404);
}

#[test]
fn test_host_decision_for_unknown_game_is_not_found() {
    let mut mgr = manager();
    let err = mgr
        .host_decision(GameId(424_242), HostDecision::Accept, &JsonCodec)
        .unwrap_err();
    assert!(matches!(err, BuzzwireError::GameNotFound(_)));
}

// =========================================================================
// Clock synchronization
// =========================================================================

#[test]
fn test_offset_sample_reports_half_round_trip() {
    let mut mgr = manager();
    let (_, token, _, _host_rx) = create_game(&mut mgr, None);
    let (bob, _bob_rx) = join(&mut mgr, "Bob", &token, 2);

    let server_out_ts = now_ms() - 100;
    let reply = mgr.record_offset_sample(bob, server_out_ts, server_out_ts + 40);
    match reply {
        ServerEvent::OffsetReport { player_id, lag_ms } => {
            assert_eq!(player_id, bob);
            // Half of a ~100 ms round trip, with slack for test runtime.
            assert!((45.0..80.0).contains(&lag_ms), "lag_ms = {lag_ms}");
            assert_eq!(mgr.player_lag(bob), lag_ms);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn test_probe_clocks_targets_connected_players_only() {
    let mut mgr = manager();
    let (_, token, host_id, mut host_rx) = create_game(&mut mgr, None);
    let (bob, mut bob_rx) = join(&mut mgr, "Bob", &token, 2);
    drain(&mut host_rx);
    drain(&mut bob_rx);

    mgr.probe_clocks(&JsonCodec);
    assert!(drain(&mut host_rx).iter().any(|e| matches!(
        e,
        ServerEvent::OffsetCheck { player_id, .. } if *player_id == host_id
    )));
    assert!(drain(&mut bob_rx).iter().any(|e| matches!(
        e,
        ServerEvent::OffsetCheck { player_id, .. } if *player_id == bob
    )));

    // A detached player is no longer probed, but keeps their membership.
    mgr.detach_connection(bob);
    mgr.probe_clocks(&JsonCodec);
    assert!(drain(&mut bob_rx).is_empty());
    assert!(mgr.game_of(bob).is_some());
    assert_eq!(mgr.player_lag(bob), 0.0);
}

// =========================================================================
// Failure handling and rehydration
// =========================================================================

#[test]
fn test_dead_connection_is_reaped_on_broadcast() {
    let mut mgr = manager();
    let (game_id, token, _, mut host_rx) = create_game(&mut mgr, None);
    let (bob, bob_rx) = join(&mut mgr, "Bob", &token, 2);
    drop(bob_rx);
    drain(&mut host_rx);

    // The next broadcast discovers Bob's dead writer and unregisters him.
    let (carol, _carol_rx) = join(&mut mgr, "Carol", &token, 3);

    assert_eq!(mgr.game_of(bob), None);
    assert_eq!(mgr.game_of(carol), Some(game_id));
    let status = mgr.game_status(game_id).expect("live game");
    assert_eq!(status.players.len(), 1);
    assert_eq!(status.players[0].name, "Carol");

    let host_events = drain(&mut host_rx);
    assert!(host_events.iter().any(|e| matches!(
        e,
        ServerEvent::Status { status } if status.players.len() == 1
    )));
}

#[test]
fn test_host_reconnect_rehydrates_from_store() {
    let store = Arc::new(MemoryStore::new());
    let mut first = GameManager::new(Arc::clone(&store), EngineConfig::default());
    let (game_id, token, host_id, _host_rx) = create_game(&mut first, Some(3));
    let (_bob, _bob_rx) = join(&mut first, "Bob", &token, 2);
    drop(first);

    // A fresh manager over the same store, as after a process restart.
    let mut second = GameManager::new(store, EngineConfig::default());
    assert_eq!(second.live_games(), 0);

    let (handle, mut host_rx) = capture(9);
    let reply = second
        .host_reconnect(game_id, handle, &JsonCodec)
        .expect("rehydrated");
    match reply {
        ServerEvent::GameCreated {
            game_id: gid,
            token: t,
            host,
        } => {
            assert_eq!(gid, game_id);
            assert_eq!(t, token);
            assert_eq!(host.player_id, host_id);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let status = second.game_status(game_id).expect("resident again");
    assert_eq!(status.number_of_rounds, 3);
    assert_eq!(status.players.len(), 1);
    assert!(
        drain(&mut host_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::Status { .. }))
    );

    // Rehydration repopulates the token index, so token joins work again.
    let (carol, _carol_rx) = join(&mut second, "Carol", &token, 10);
    assert_eq!(second.game_of(carol), Some(game_id));
}

#[test]
fn test_game_by_key_accepts_token_or_id() {
    let mut mgr = manager();
    let (game_id, token, _, _host_rx) = create_game(&mut mgr, None);

    assert_eq!(mgr.game_by_key(&token), Some(game_id));
    assert_eq!(mgr.game_by_key(&game_id.0.to_string()), Some(game_id));
    assert_eq!(mgr.game_by_key("nonsense"), None);
    assert_eq!(mgr.game_by_key("123456789"), None);
}

#[test]
fn test_host_reconnect_unknown_game_is_not_found() {
    let mut mgr = manager();
    let (handle, _rx) = capture(1);
    let err = mgr
        .host_reconnect(GameId(5_555_555), handle, &JsonCodec)
        .unwrap_err();
    assert!(matches!(err, BuzzwireError::GameNotFound(_)));
}
