//! Per-session configuration.

use std::time::Duration;

/// Settings for one quiz session.
///
/// Constructed once at session creation and passed by value; there is no
/// ambient global configuration.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Ordered point-value ladder for questions within a round.
    pub nominals: Vec<i64>,

    /// Rounds played before the game finishes.
    pub number_of_rounds: u32,

    /// How long after the first buzz further buzzes are still collected
    /// before the responder order freezes.
    pub accumulation_window: Duration,

    /// Countdown length for one question, in seconds.
    pub question_seconds: u32,

    /// Whether a player who was declined may buzz again on the same
    /// question.
    pub allow_multiple_answers: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            nominals: vec![10, 20, 30, 40, 50],
            number_of_rounds: 8,
            accumulation_window: Duration::from_secs(1),
            question_seconds: 60,
            allow_multiple_answers: false,
        }
    }
}

impl GameConfig {
    /// The accumulation window in milliseconds, the unit timestamps use.
    pub fn accumulation_window_ms(&self) -> u64 {
        self.accumulation_window.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_config_default() {
        let config = GameConfig::default();
        assert_eq!(config.nominals, vec![10, 20, 30, 40, 50]);
        assert_eq!(config.number_of_rounds, 8);
        assert_eq!(config.accumulation_window_ms(), 1000);
        assert_eq!(config.question_seconds, 60);
        assert!(!config.allow_multiple_answers);
    }
}
