//! Quiz session state machine for Buzzwire.
//!
//! One [`QuizGame`] per active session. It owns question and round
//! progression, buzz arbitration, scoring, and the countdown, and it is
//! deliberately free of I/O: every operation returns [`Effects`] — a list
//! of `(Recipient, ServerEvent)` pairs plus a persistence hint — which the
//! session manager turns into actual fan-out and store writes. That keeps
//! the whole machine synchronously testable.
//!
//! Timing is externally driven: the manager's periodic sweeps call
//! [`QuizGame::check_signal_window`] and [`QuizGame::tick`], so a session
//! never owns a timer of its own.

mod config;
mod entity;
mod error;
mod quiz;

pub use config::GameConfig;
pub use entity::{Player, Signal, generate_token};
pub use error::GameError;
pub use quiz::{Effects, QuizGame};
