//! Broadcast-safe snapshots of a game session.
//!
//! [`GameStatus`] is the one structure that serves two masters: it is the
//! payload of every `status` broadcast AND the body of the persisted
//! [`GameSnapshot`]. Keeping those identical means a session rehydrated
//! from storage reproduces the last status its players saw.

use serde::{Deserialize, Serialize};

use crate::types::{GameId, GameState, PlayerId, QuestionState};

/// A player as seen on the wire: identity, display name, membership,
/// current score, and the most recent observed lag estimate (diagnostic
/// only — never used for arbitration after the buzz was adjusted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub game_id: GameId,
    pub score: i64,
    #[serde(default)]
    pub lag_ms: f64,
}

/// One accepted buzz attempt, as shown to the host while a window is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalView {
    pub player_id: PlayerId,
    /// Server receipt time, ms since epoch.
    pub server_ts: u64,
    /// Client-reported emission time, ms on the client's clock.
    pub client_ts: u64,
    /// `client_ts` corrected by the player's offset estimate; the value
    /// responders are ordered by.
    pub adjusted_ts: f64,
}

/// A single score mutation caused by a host decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub player_id: PlayerId,
    /// Signed delta applied to the player's score (`+nominal` on accept,
    /// `-nominal` on decline).
    pub delta: i64,
    pub accepted: bool,
}

/// The aggregate record of one completed question.
///
/// The full log of these is enough to rebuild a round-by-round scoreboard,
/// which is how restoration replays history instead of persisting derived
/// tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub round: u32,
    pub question_number: u32,
    pub nominal: i64,
    pub events: Vec<ScoreEvent>,
}

/// Full, broadcast-safe snapshot of a session.
///
/// Live-only state (the open signal list of a question still accepting
/// buzzes) is deliberately absent: a snapshot taken mid-window and
/// restored later starts the question cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatus {
    /// Members sorted by display name.
    pub players: Vec<PlayerView>,
    /// Point value of the current question.
    pub nominal: i64,
    pub current_round: u32,
    pub number_of_rounds: u32,
    #[serde(default)]
    pub round_names: Vec<String>,
    pub question_number: u32,
    pub game_state: GameState,
    pub question_state: QuestionState,
    /// Frozen responder order for the current question (empty unless
    /// `question_state` is `answering`).
    #[serde(default)]
    pub responder_queue: Vec<PlayerId>,
    pub remaining_seconds: u32,
    pub timer_running: bool,
    /// No new joins once set. Distinct from `game_state: finished`.
    pub finalized: bool,
    /// Cumulative per-question score-event log.
    #[serde(default)]
    pub question_log: Vec<QuestionRecord>,
}

impl GameStatus {
    /// Sums a player's score deltas within one round of the log.
    ///
    /// Derived view used by scoreboard displays; the authoritative score
    /// lives on the player entry.
    pub fn round_score(&self, round: u32, player_id: PlayerId) -> i64 {
        self.question_log
            .iter()
            .filter(|q| q.round == round)
            .flat_map(|q| q.events.iter())
            .filter(|e| e.player_id == player_id)
            .map(|e| e.delta)
            .sum()
    }
}

/// The persisted form of a session: the status payload plus the identity
/// and scoping metadata the store needs to key and shard on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub token: String,
    #[serde(default)]
    pub host: Option<PlayerView>,
    /// Owning tournament, when the session belongs to one.
    #[serde(default)]
    pub tournament_id: Option<String>,
    pub status: GameStatus,
}
