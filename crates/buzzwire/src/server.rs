//! WebSocket server wiring: accept loop, shared state, and the three
//! one-second sweeps that drive session timing.

use std::net::SocketAddr;
use std::sync::Arc;

use buzzwire_protocol::{Codec, JsonCodec};
use buzzwire_tick::RecurringTask;
use buzzwire_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::BuzzwireError;
use crate::handler::{self, ServerState};
use crate::manager::GameManager;
use crate::store::GameStore;

/// Builder for [`QuizServer`].
pub struct QuizServerBuilder {
    bind_addr: String,
    config: EngineConfig,
}

impl QuizServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:9002".to_string(),
            config: EngineConfig::default(),
        }
    }

    /// Address the WebSocket listener binds to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener, starts the sweeps, and returns the server
    /// ready to [`run`](QuizServer::run).
    pub async fn build<S: GameStore>(
        self,
        store: S,
    ) -> Result<QuizServer<S, JsonCodec>, BuzzwireError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let state = Arc::new(ServerState {
            manager: Mutex::new(GameManager::new(store, self.config.clone())),
            codec: JsonCodec,
        });

        let sweeps = vec![
            spawn_sweep(
                "signal-windows",
                self.config.signal_sweep_interval,
                Arc::clone(&state),
                |manager, codec| manager.check_signal_windows(codec),
            ),
            spawn_sweep(
                "countdown-tick",
                self.config.tick_interval,
                Arc::clone(&state),
                |manager, codec| manager.tick_countdowns(codec),
            ),
            spawn_sweep(
                "clock-probe",
                self.config.clock_probe_interval,
                Arc::clone(&state),
                |manager, codec| manager.probe_clocks(codec),
            ),
        ];

        Ok(QuizServer {
            transport,
            state,
            sweeps,
        })
    }
}

impl Default for QuizServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_sweep<S, C, F>(
    name: &str,
    interval: std::time::Duration,
    state: Arc<ServerState<S, C>>,
    work: F,
) -> RecurringTask
where
    S: GameStore,
    C: Codec + Send + Sync + 'static,
    F: Fn(&mut GameManager<S>, &C) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    RecurringTask::spawn(name, interval, move || {
        let state = Arc::clone(&state);
        let work = Arc::clone(&work);
        async move {
            let mut manager = state.manager.lock().await;
            work(&mut manager, &state.codec);
        }
    })
}

/// The quiz engine's WebSocket front door.
pub struct QuizServer<S: GameStore, C: Codec + Send + Sync + 'static> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, C>>,
    sweeps: Vec<RecurringTask>,
}

impl<S: GameStore, C: Codec + Send + Sync + 'static> QuizServer<S, C> {
    pub fn builder() -> QuizServerBuilder {
        QuizServerBuilder::new()
    }

    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, BuzzwireError> {
        Ok(self.transport.local_addr()?)
    }

    /// Accepts connections until the listener fails, spawning one task
    /// per connection.
    pub async fn run(mut self) -> Result<(), BuzzwireError> {
        info!(addr = ?self.transport.local_addr(), "server listening");
        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handler::handle_connection(conn, state).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Stops the sweeps and closes the listener.
    pub async fn shutdown(mut self) -> Result<(), BuzzwireError> {
        for sweep in self.sweeps.drain(..) {
            sweep.stop().await;
        }
        self.transport.shutdown().await?;
        Ok(())
    }
}
