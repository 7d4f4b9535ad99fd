//! Core protocol types for Buzzwire's wire format.
//!
//! Every inbound message is a [`ClientRequest`] and every outbound message
//! is a [`ServerEvent`], both tagged by an `"action"` field so a browser
//! client can switch on a single key. Identity types are newtype wrappers
//! so a `GameId` can never be passed where a `PlayerId` is expected.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::status::{GameStatus, PlayerView, SignalView};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player (host included).
///
/// `#[serde(transparent)]` makes `PlayerId(42)` serialize as plain `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a game session.
///
/// Distinct from the short join token: the token is what a host reads out
/// loud, the id is what the server and store key on. Both resolve to at
/// most one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game-facing enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a whole game. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Running,
    Finished,
}

/// Lifecycle state of the current question.
///
/// Transitions only along:
///
/// ```text
/// Running → AwaitingMoreSignals → Answering → (reset to) Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    Running,
    AwaitingMoreSignals,
    Answering,
}

/// The host's ruling on the head-of-queue responder.
///
/// This is an input to the state machine, never a state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostDecision {
    Accept,
    Decline,
    Cancel,
}

impl fmt::Display for HostDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Decline => write!(f, "decline"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient — who should receive an event?
// ---------------------------------------------------------------------------

/// Specifies who should receive a server event.
///
/// Game logic returns `(Recipient, ServerEvent)` pairs; the session manager
/// resolves them against the game's membership and performs the actual
/// fan-out. Fan-out is always scoped to one game's participant set — this
/// is not a general pub/sub address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every player in the game, plus the host.
    All,
    /// The host only (e.g. raw signal contention while a window is open).
    Host,
    /// One specific player.
    Player(PlayerId),
}

// ---------------------------------------------------------------------------
// ClientRequest — inbound messages
// ---------------------------------------------------------------------------

/// One inbound protocol message per logical action.
///
/// `#[serde(tag = "action")]` produces internally tagged JSON, e.g.:
/// `{ "action": "signal", "player_id": 7, "local_ts": 171234 }`.
/// An unrecognized `action` fails to decode; the server answers with a
/// fixed "unknown action" error and keeps the connection open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Create a new game session; the sender becomes its host.
    StartGame {
        host_name: String,
        #[serde(default)]
        host_id: Option<PlayerId>,
        #[serde(default)]
        number_of_rounds: Option<u32>,
        #[serde(default)]
        round_names: Option<Vec<String>>,
    },

    /// Reattach the host's transport to an existing session.
    HostReconnect { game_id: GameId },

    /// Join a player to a session, by id or by the short join token.
    /// A `player_id` from a prior join restores that player's score.
    Register {
        name: String,
        #[serde(default)]
        game_id: Option<GameId>,
        #[serde(default)]
        game_token: Option<String>,
        #[serde(default)]
        player_id: Option<PlayerId>,
    },

    /// A buzz attempt. `local_ts` is the client's own clock in ms; the
    /// server corrects it by the player's current offset estimate before
    /// the session sees it.
    Signal { player_id: PlayerId, local_ts: u64 },

    /// Resolve the current head-of-queue responder.
    HostDecision {
        game_id: GameId,
        host_decision: HostDecision,
    },

    /// Start (or restart) the question countdown.
    StartTimer { game_id: GameId },

    /// Block any further joins. Distinct from the game finishing.
    Finalize { game_id: GameId },

    /// Update the display names for rounds.
    SetRoundNames {
        game_id: GameId,
        round_names: Vec<String>,
    },

    /// A client reflecting a clock probe back to the server.
    /// `server_out_ts` is echoed from the probe; `client_ts` is the
    /// client's clock at reflection time.
    OffsetCheck {
        player_id: PlayerId,
        server_out_ts: u64,
        client_ts: u64,
    },
}

// ---------------------------------------------------------------------------
// ServerEvent — outbound messages
// ---------------------------------------------------------------------------

/// One outbound protocol message per logical event, tagged like
/// [`ClientRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `start_game` / `host_reconnect`.
    GameCreated {
        game_id: GameId,
        token: String,
        host: PlayerView,
    },

    /// Reply to `register`.
    Registered { player: PlayerView },

    /// Full broadcast-safe snapshot of the session. Also the persistence
    /// payload (see [`GameStatus`]).
    Status { status: GameStatus },

    /// Raw signal contention for the current question, host only,
    /// re-sent as signals accumulate.
    SignalsUpdate { signals: Vec<SignalView> },

    /// First buzz of a question landed — the host should stop reading.
    GamePaused,

    /// The accumulation window closed; the responder queue is frozen.
    PlayerAnswering { players_queue: Vec<PlayerView> },

    /// Clock probe: the client must reflect this back via an
    /// `offset_check` request.
    OffsetCheck {
        player_id: PlayerId,
        server_out_ts: u64,
    },

    /// Reply to a reflected probe: the server's current one-way lag
    /// estimate for this player, in milliseconds.
    OffsetReport { player_id: PlayerId, lag_ms: f64 },

    /// Generic acknowledgement for actions with no richer reply.
    Ack { status: String },

    /// Something went wrong. `code` follows HTTP conventions
    /// (400 bad request, 404 not found, 409 conflict).
    Error { code: u16, desc: String },
}

impl ServerEvent {
    /// The fixed answer to an unrecognized or undecodable action.
    pub fn unknown_action() -> Self {
        Self::Error {
            code: 400,
            desc: "unknown action".to_string(),
        }
    }

    /// A plain OK acknowledgement.
    pub fn ok() -> Self {
        Self::Ack {
            status: "OK".to_string(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
