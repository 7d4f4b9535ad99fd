//! # Buzzwire
//!
//! A real-time multiplayer quiz/buzzer engine. A host starts a timed
//! trivia session, players join over WebSockets, and the server arbitrates
//! who buzzed first despite each player having a different, unknown
//! network latency.
//!
//! Three subsystems carry the weight:
//! - clock synchronization (`buzzwire-clock`) estimates each player's
//!   offset so raw client timestamps become comparable;
//! - the session state machine (`buzzwire-game`) governs question
//!   lifecycle, buzz arbitration, scoring, and round progression;
//! - the [`GameManager`] here routes inbound protocol messages to the
//!   right live (or lazily rehydrated) session and fans out broadcasts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use buzzwire::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BuzzwireError> {
//!     let server = QuizServerBuilder::new()
//!         .bind("0.0.0.0:8080")
//!         .build(MemoryStore::new())
//!         .await?;
//!     server.run().await
//! }
//! ```

mod config;
mod error;
mod handler;
mod manager;
mod server;
mod store;

pub use config::EngineConfig;
pub use error::BuzzwireError;
pub use manager::GameManager;
pub use server::{QuizServer, QuizServerBuilder};
pub use store::{GameStore, MemoryStore};

/// Everything a server binary typically needs.
pub mod prelude {
    pub use crate::{
        BuzzwireError, EngineConfig, GameManager, GameStore, MemoryStore, QuizServer,
        QuizServerBuilder,
    };
    pub use buzzwire_game::GameConfig;
    pub use buzzwire_protocol::{
        ClientRequest, GameId, GameSnapshot, GameStatus, HostDecision, PlayerId, ServerEvent,
    };
}
