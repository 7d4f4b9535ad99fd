//! Engine-wide configuration.

use std::time::Duration;

use buzzwire_game::GameConfig;

/// Process-level settings, constructed once at startup and handed to the
/// [`GameManager`](crate::GameManager) — there is no ambient global state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Defaults applied to every new game session.
    pub game: GameConfig,

    /// How often the signal-window sweep polls every live session.
    pub signal_sweep_interval: Duration,

    /// How often each session's countdown is decremented.
    pub tick_interval: Duration,

    /// How often every connected player is sent a clock probe.
    pub clock_probe_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            signal_sweep_interval: Duration::from_secs(1),
            tick_interval: Duration::from_secs(1),
            clock_probe_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_intervals() {
        let config = EngineConfig::default();
        assert_eq!(config.signal_sweep_interval, Duration::from_secs(1));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.clock_probe_interval, Duration::from_secs(1));
    }
}
