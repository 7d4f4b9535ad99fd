//! Registry of per-player samplers.

use std::collections::HashMap;

use buzzwire_protocol::PlayerId;

use crate::sampler::ClockSampler;

/// Holds one [`ClockSampler`] per registered player and applies the
/// offset correction to buzz timestamps.
///
/// Not internally locked: the registry is owned by the session manager
/// and serialized behind its lock, the same way every other engine map is.
#[derive(Debug, Default)]
pub struct ClockRegistry {
    samplers: HashMap<PlayerId, ClockSampler>,
}

impl ClockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh, empty sample ring for the player.
    ///
    /// Re-registering an already-known player resets their ring; a
    /// reconnecting client's route may have changed, so stale samples
    /// are worth less than an honest "no estimate yet".
    pub fn register(&mut self, player_id: PlayerId) {
        self.samplers.insert(player_id, ClockSampler::new());
        tracing::debug!(%player_id, "clock sampler registered");
    }

    /// Discards the player's ring. Safe to call for an unknown id, and
    /// safe while a probe for that player is in flight — the late
    /// reflection is simply dropped by [`ClockRegistry::record_sample`].
    pub fn unregister(&mut self, player_id: PlayerId) {
        if self.samplers.remove(&player_id).is_some() {
            tracing::debug!(%player_id, "clock sampler unregistered");
        }
    }

    /// Feeds one reflected probe into the player's ring and returns the
    /// freshly recomputed aggregate lag. An unknown player yields 0.0.
    pub fn record_sample(
        &mut self,
        player_id: PlayerId,
        server_out_ts: u64,
        server_in_ts: u64,
        client_ts: u64,
    ) -> f64 {
        match self.samplers.get_mut(&player_id) {
            Some(sampler) => sampler.record(server_out_ts, server_in_ts, client_ts),
            None => {
                tracing::debug!(%player_id, "sample for unregistered player dropped");
                0.0
            }
        }
    }

    /// Current one-way lag estimate in ms; 0.0 before any sample or for
    /// an unknown player.
    pub fn lag(&self, player_id: PlayerId) -> f64 {
        self.samplers
            .get(&player_id)
            .map(ClockSampler::lag)
            .unwrap_or(0.0)
    }

    /// Corrects a client-reported timestamp onto the server time axis.
    ///
    /// Convention (fixed here, on purpose, in exactly one place): the
    /// estimated one-way lag is SUBTRACTED from the client timestamp.
    /// Both sign conventions appear in the wild; this one was chosen so
    /// two players pressing at the same wall-clock instant compare equal
    /// regardless of link latency, and it is what every responder-order
    /// test in the workspace pins down.
    pub fn adjust(&self, player_id: PlayerId, client_ts: u64) -> f64 {
        client_ts as f64 - self.lag(player_id)
    }

    /// Ids of all registered players, for the periodic prober.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.samplers.keys().copied().collect()
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    /// Returns `true` if no player is registered.
    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }
}
