//! Value records: players and buzz signals.

use std::sync::atomic::{AtomicU64, Ordering};

use buzzwire_protocol::{GameId, PlayerId, PlayerView, SignalView};
use rand::Rng;

/// Counter for allocating player ids when the client does not supply one.
static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Length of the human-shareable join token.
const TOKEN_LEN: usize = 5;

/// Generates a join token: uppercase ASCII letters, short enough to read
/// out loud.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| char::from(b'A' + rng.random_range(0..26)))
        .collect()
}

/// A session participant: identity, display name, membership, score, and
/// the most recent observed lag (diagnostic only).
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub game_id: GameId,
    pub score: i64,
    pub last_lag_ms: f64,
}

impl Player {
    /// Creates a player with a freshly allocated id and zero score.
    pub fn new(name: impl Into<String>, game_id: GameId) -> Self {
        let id = PlayerId(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, name, game_id)
    }

    /// Creates a player with a caller-supplied id, as happens when a
    /// client rejoins under its previous identity.
    pub fn with_id(id: PlayerId, name: impl Into<String>, game_id: GameId) -> Self {
        Self {
            id,
            name: name.into(),
            game_id,
            score: 0,
            last_lag_ms: 0.0,
        }
    }

    /// The wire representation of this player.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            player_id: self.id,
            name: self.name.clone(),
            game_id: self.game_id,
            score: self.score,
            lag_ms: self.last_lag_ms,
        }
    }

    /// Rebuilds a player from its wire representation.
    pub fn from_view(view: &PlayerView) -> Self {
        Self {
            id: view.player_id,
            name: view.name.clone(),
            game_id: view.game_id,
            score: view.score,
            last_lag_ms: view.lag_ms,
        }
    }
}

/// One accepted buzz attempt. Immutable after creation; at most one per
/// player per question; discarded wholesale on question reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub player_id: PlayerId,
    /// Server receipt time, ms since epoch.
    pub server_ts: u64,
    /// Client-reported emission time, ms on the client's clock.
    pub client_ts: u64,
    /// `client_ts` corrected by the player's offset estimate. Responders
    /// are ordered by this value.
    pub adjusted_ts: f64,
}

impl Signal {
    pub fn view(&self) -> SignalView {
        SignalView {
            player_id: self.player_id,
            server_ts: self.server_ts,
            client_ts: self.client_ts,
            adjusted_ts: self.adjusted_ts,
        }
    }
}
