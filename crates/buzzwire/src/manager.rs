//! The session manager: single source of truth mapping game ids, join
//! tokens, player ids, and connection handles to live objects.
//!
//! All methods are synchronous; the server wraps the manager in one
//! `tokio::sync::Mutex`, and connection handlers, periodic sweeps, and
//! timer callbacks serialize through it. That is safe only because sends
//! never block: each connection owns a writer task fed through a
//! non-blocking [`ConnectionHandle`], so a slow peer cannot stall
//! arbitration for everyone else.

use std::collections::HashMap;

use buzzwire_clock::{ClockRegistry, now_ms};
use buzzwire_game::{Effects, GameError, Player, QuizGame, Signal};
use buzzwire_protocol::{
    Codec, GameId, GameStatus, HostDecision, PlayerId, PlayerView, Recipient, ServerEvent,
};
use buzzwire_transport::ConnectionHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::BuzzwireError;
use crate::store::GameStore;

/// Top-level registry of sessions, players, transports, and clocks.
pub struct GameManager<S: GameStore> {
    games: HashMap<GameId, QuizGame>,
    token_to_id: HashMap<String, GameId>,
    player_to_game: HashMap<PlayerId, GameId>,
    connections: HashMap<PlayerId, ConnectionHandle>,
    clocks: ClockRegistry,
    store: S,
    config: EngineConfig,
}

impl<S: GameStore> GameManager<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            games: HashMap::new(),
            token_to_id: HashMap::new(),
            player_to_game: HashMap::new(),
            connections: HashMap::new(),
            clocks: ClockRegistry::new(),
            store,
            config,
        }
    }

    // -----------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------

    /// Creates a session, registers the caller as its host, and returns
    /// the `game_created` reply.
    pub fn create_game<C: Codec>(
        &mut self,
        handle: ConnectionHandle,
        host_name: &str,
        host_id: Option<PlayerId>,
        number_of_rounds: Option<u32>,
        round_names: Option<Vec<String>>,
        codec: &C,
    ) -> Result<ServerEvent, BuzzwireError> {
        let mut game_config = self.config.game.clone();
        if let Some(rounds) = number_of_rounds {
            game_config.number_of_rounds = rounds;
        }
        let mut game = QuizGame::new(game_config);
        let game_id = game.id();
        let token = game.token().to_string();

        let host = match host_id {
            Some(id) => Player::with_id(id, host_name, game_id),
            None => Player::new(host_name, game_id),
        };
        let host_view = host.view();
        let hid = host.id;

        let mut fx = game.register_host(host);
        if let Some(names) = round_names {
            let more = game.set_round_names(names);
            fx.out.extend(more.out);
            fx.persist |= more.persist;
        }
        info!(%game_id, token = %token, host_id = %hid, "game created");

        self.games.insert(game_id, game);
        self.token_to_id.insert(token.clone(), game_id);
        self.player_to_game.insert(hid, game_id);
        self.connections.insert(hid, handle);
        self.clocks.register(hid);
        self.dispatch(game_id, fx, codec);

        Ok(ServerEvent::GameCreated {
            game_id,
            token,
            host: host_view,
        })
    }

    /// Reattaches the host's transport to an existing (possibly
    /// rehydrated) session.
    pub fn host_reconnect<C: Codec>(
        &mut self,
        game_id: GameId,
        handle: ConnectionHandle,
        codec: &C,
    ) -> Result<ServerEvent, BuzzwireError> {
        let game_id = self.resolve(Some(game_id), None)?;
        let game = self
            .games
            .get(&game_id)
            .ok_or_else(|| BuzzwireError::GameNotFound(game_id.to_string()))?;
        let host = game
            .host()
            .cloned()
            .ok_or_else(|| BuzzwireError::GameNotFound(game_id.to_string()))?;
        let token = game.token().to_string();
        let host_view = host.view();
        info!(%game_id, host_id = %host.id, "host reconnected");

        self.player_to_game.insert(host.id, game_id);
        self.connections.insert(host.id, handle);
        self.clocks.register(host.id);

        // Rebroadcast so the returning host immediately sees the state.
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.register_host(host),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);

        Ok(ServerEvent::GameCreated {
            game_id,
            token,
            host: host_view,
        })
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Joins a player to a session resolved by id or token. The
    /// `registered` reply and the status broadcast go out through the
    /// session's effects; the returned view is for the caller's
    /// bookkeeping.
    pub fn register_player<C: Codec>(
        &mut self,
        name: &str,
        game_id: Option<GameId>,
        token: Option<&str>,
        player_id: Option<PlayerId>,
        handle: ConnectionHandle,
        codec: &C,
    ) -> Result<PlayerView, BuzzwireError> {
        let game_id = self.resolve(game_id, token)?;
        let mut player = match player_id {
            Some(id) => Player::with_id(id, name, game_id),
            None => Player::new(name, game_id),
        };
        let pid = player.id;

        // A rejoin into a different session first leaves the old one, so
        // an identity never sits in two membership maps at once.
        if let Some(&previous) = self.player_to_game.get(&pid) {
            if previous != game_id {
                info!(%pid, %previous, %game_id, "player switching sessions");
                self.unregister_player(pid, codec);
            }
        }

        player.last_lag_ms = self.clocks.lag(pid);

        let game = self
            .games
            .get_mut(&game_id)
            .ok_or_else(|| BuzzwireError::GameNotFound(game_id.to_string()))?;
        let fx = game.register_player(player)?;
        let view = game
            .player(pid)
            .map(Player::view)
            .ok_or(GameError::UnknownPlayer(pid))?;

        self.player_to_game.insert(pid, game_id);
        self.connections.insert(pid, handle);
        self.clocks.register(pid);
        self.dispatch(game_id, fx, codec);

        Ok(view)
    }

    /// Fully detaches a player: membership, clock entry, and transport.
    /// Tolerates identities that are already gone.
    pub fn unregister_player<C: Codec>(&mut self, player_id: PlayerId, codec: &C) {
        self.connections.remove(&player_id);
        self.clocks.unregister(player_id);
        let Some(game_id) = self.player_to_game.remove(&player_id) else {
            debug!(%player_id, "unregister for unknown player");
            return;
        };
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.unregister_player(player_id),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);
    }

    /// Drops only the transport and clock entry when a connection closes.
    /// Membership stays, so the player can reconnect with their score.
    pub fn detach_connection(&mut self, player_id: PlayerId) {
        debug!(%player_id, "connection detached");
        self.connections.remove(&player_id);
        self.clocks.unregister(player_id);
    }

    // -----------------------------------------------------------------
    // Gameplay
    // -----------------------------------------------------------------

    /// Handles a buzz: stamps the server receipt time, corrects the
    /// client timestamp by the player's offset estimate, and forwards the
    /// signal to the player's session.
    pub fn process_signal<C: Codec>(
        &mut self,
        player_id: PlayerId,
        local_ts: u64,
        codec: &C,
    ) -> Result<(), BuzzwireError> {
        let game_id = *self
            .player_to_game
            .get(&player_id)
            .ok_or(GameError::UnknownPlayer(player_id))?;
        let signal = Signal {
            player_id,
            server_ts: now_ms(),
            client_ts: local_ts,
            adjusted_ts: self.clocks.adjust(player_id, local_ts),
        };
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.process_signal(signal),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);
        Ok(())
    }

    /// Applies a host ruling to the session's current responder.
    pub fn host_decision<C: Codec>(
        &mut self,
        game_id: GameId,
        decision: HostDecision,
        codec: &C,
    ) -> Result<(), BuzzwireError> {
        let game_id = self.resolve(Some(game_id), None)?;
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.process_host_decision(decision),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);
        Ok(())
    }

    pub fn start_timer<C: Codec>(
        &mut self,
        game_id: GameId,
        codec: &C,
    ) -> Result<(), BuzzwireError> {
        let game_id = self.resolve(Some(game_id), None)?;
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.start_timer(),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);
        Ok(())
    }

    pub fn finalize<C: Codec>(&mut self, game_id: GameId, codec: &C) -> Result<(), BuzzwireError> {
        let game_id = self.resolve(Some(game_id), None)?;
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.finalize(),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);
        Ok(())
    }

    pub fn set_round_names<C: Codec>(
        &mut self,
        game_id: GameId,
        names: Vec<String>,
        codec: &C,
    ) -> Result<(), BuzzwireError> {
        let game_id = self.resolve(Some(game_id), None)?;
        let fx = match self.games.get_mut(&game_id) {
            Some(game) => game.set_round_names(names),
            None => Effects::none(),
        };
        self.dispatch(game_id, fx, codec);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Clock synchronization
    // -----------------------------------------------------------------

    /// Feeds a reflected clock probe into the player's sample ring and
    /// builds the `offset_report` reply.
    pub fn record_offset_sample(
        &mut self,
        player_id: PlayerId,
        server_out_ts: u64,
        client_ts: u64,
    ) -> ServerEvent {
        let server_in_ts = now_ms();
        let lag_ms = self
            .clocks
            .record_sample(player_id, server_out_ts, server_in_ts, client_ts);
        if let Some(game_id) = self.player_to_game.get(&player_id) {
            if let Some(game) = self.games.get_mut(game_id) {
                game.note_player_lag(player_id, lag_ms);
            }
        }
        ServerEvent::OffsetReport { player_id, lag_ms }
    }

    // -----------------------------------------------------------------
    // Periodic sweeps
    // -----------------------------------------------------------------

    /// Polls every live session's accumulation window. The scheduling
    /// backbone that turns each session's timing policy into a wall-clock
    /// deadline without a dedicated timer per signal.
    pub fn check_signal_windows<C: Codec>(&mut self, codec: &C) {
        let now = now_ms();
        let ids: Vec<GameId> = self.games.keys().copied().collect();
        for game_id in ids {
            let fx = match self.games.get_mut(&game_id) {
                Some(game) => game.check_signal_window(now),
                None => Effects::none(),
            };
            if !fx.out.is_empty() || fx.persist {
                self.dispatch(game_id, fx, codec);
            }
        }
    }

    /// Decrements every live session's countdown by one step.
    pub fn tick_countdowns<C: Codec>(&mut self, codec: &C) {
        let ids: Vec<GameId> = self.games.keys().copied().collect();
        for game_id in ids {
            let fx = match self.games.get_mut(&game_id) {
                Some(game) => game.tick(),
                None => Effects::none(),
            };
            if !fx.out.is_empty() || fx.persist {
                self.dispatch(game_id, fx, codec);
            }
        }
    }

    /// Sends a timestamped clock probe to every registered player with a
    /// live connection. A player whose transport is gone is skipped with
    /// a log line, never removed — removal is a membership decision, not
    /// the prober's.
    pub fn probe_clocks<C: Codec>(&mut self, codec: &C) {
        let now = now_ms();
        for player_id in self.clocks.player_ids() {
            let Some(handle) = self.connections.get(&player_id) else {
                continue;
            };
            if !handle.is_open() {
                debug!(%player_id, "clock probe skipped, connection gone");
                continue;
            }
            let probe = ServerEvent::OffsetCheck {
                player_id,
                server_out_ts: now,
            };
            match codec.encode(&probe) {
                Ok(bytes) => handle.send(bytes),
                Err(e) => warn!(%player_id, error = %e, "failed to encode clock probe"),
            }
        }
    }

    // -----------------------------------------------------------------
    // Lookups and accessors
    // -----------------------------------------------------------------

    /// Resolves a session by id or token. A session that is not resident
    /// is lazily rehydrated from the store; a miss in both places returns
    /// `GameNotFound`.
    fn resolve(
        &mut self,
        game_id: Option<GameId>,
        token: Option<&str>,
    ) -> Result<GameId, BuzzwireError> {
        let game_id = match (game_id, token) {
            (Some(id), _) => id,
            (None, Some(token)) => *self
                .token_to_id
                .get(token)
                .ok_or_else(|| BuzzwireError::GameNotFound(token.to_string()))?,
            (None, None) => return Err(BuzzwireError::MissingField("game_id or game_token")),
        };

        if !self.games.contains_key(&game_id) {
            let snapshot = self
                .store
                .load(game_id)
                .ok_or_else(|| BuzzwireError::GameNotFound(game_id.to_string()))?;
            let game = QuizGame::restore(snapshot, self.config.game.clone());
            self.token_to_id.insert(game.token().to_string(), game_id);
            self.games.insert(game_id, game);
        }
        Ok(game_id)
    }

    /// Looks up a session by join token or decimal id, lazily
    /// rehydrating from the store. Absence is a lookup miss, not an
    /// error.
    pub fn game_by_key(&mut self, key: &str) -> Option<GameId> {
        let game_id = match self.token_to_id.get(key) {
            Some(id) => *id,
            None => GameId(key.parse::<u64>().ok()?),
        };
        self.resolve(Some(game_id), None).ok()
    }

    /// The current status of a resident session.
    pub fn game_status(&self, game_id: GameId) -> Option<GameStatus> {
        self.games.get(&game_id).map(QuizGame::generate_status)
    }

    /// The session a player currently belongs to.
    pub fn game_of(&self, player_id: PlayerId) -> Option<GameId> {
        self.player_to_game.get(&player_id).copied()
    }

    /// Current one-way lag estimate for a player, in ms.
    pub fn player_lag(&self, player_id: PlayerId) -> f64 {
        self.clocks.lag(player_id)
    }

    /// Number of resident sessions.
    pub fn live_games(&self) -> usize {
        self.games.len()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------

    /// Resolves recipients against the session's membership and performs
    /// best-effort fan-out. Participants whose writer has died are
    /// unregistered afterwards; one bad peer never fails the operation.
    fn dispatch<C: Codec>(&mut self, game_id: GameId, fx: Effects, codec: &C) {
        if fx.persist {
            if let Some(game) = self.games.get(&game_id) {
                self.store.save(&game.snapshot());
            }
        }

        let mut dead: Vec<PlayerId> = Vec::new();
        {
            let Some(game) = self.games.get(&game_id) else {
                return;
            };
            let host_id = game.host_id();
            for (recipient, event) in &fx.out {
                let targets: Vec<PlayerId> = match recipient {
                    Recipient::All => game.participants(),
                    Recipient::Host => host_id.into_iter().collect(),
                    Recipient::Player(id) => vec![*id],
                };
                let bytes = match codec.encode(event) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(%game_id, error = %e, "failed to encode outbound event");
                        continue;
                    }
                };
                for player_id in targets {
                    match self.connections.get(&player_id) {
                        Some(handle) if handle.is_open() => handle.send(bytes.clone()),
                        Some(_) => dead.push(player_id),
                        // A member without a live transport is normal
                        // after a disconnect; skip silently.
                        None => {}
                    }
                }
            }
        }

        dead.sort_unstable();
        dead.dedup();
        for player_id in dead {
            warn!(%game_id, %player_id, "send failed, dropping participant");
            self.unregister_player(player_id, codec);
        }
    }
}
