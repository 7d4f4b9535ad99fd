//! Wire protocol for Buzzwire.
//!
//! This crate defines the "language" that quiz clients and the server speak:
//!
//! - **Types** ([`ClientRequest`], [`ServerEvent`], [`GameStatus`], id
//!   newtypes) — the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the game
//! engine (sessions, scoring, clock sync). It doesn't know about
//! connections or games — it only knows how to describe and serialize
//! messages.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientRequest / ServerEvent) → Engine
//! ```
//!
//! [`GameStatus`] doubles as the persistence payload: the structure a
//! session broadcasts to clients is byte-for-byte the structure handed to
//! the storage collaborator.

mod codec;
mod error;
mod status;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use status::{
    GameSnapshot, GameStatus, PlayerView, QuestionRecord, ScoreEvent,
    SignalView,
};
pub use types::{
    ClientRequest, GameId, GameState, HostDecision, PlayerId, QuestionState,
    Recipient, ServerEvent,
};
