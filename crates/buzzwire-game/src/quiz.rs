//! The quiz session state machine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use buzzwire_protocol::{
    GameId, GameSnapshot, GameState, GameStatus, HostDecision, PlayerId, PlayerView,
    QuestionRecord, QuestionState, Recipient, ScoreEvent, ServerEvent,
};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::entity::{Player, Signal, generate_token};
use crate::error::GameError;

/// Counter for allocating game ids.
static NEXT_GAME_ID: AtomicU64 = AtomicU64::new(1);

/// What an operation wants the session manager to do afterwards: events
/// to fan out, and whether the session's snapshot changed enough to be
/// persisted.
#[derive(Debug, Default)]
pub struct Effects {
    pub out: Vec<(Recipient, ServerEvent)>,
    pub persist: bool,
}

impl Effects {
    /// No fan-out, no persistence. The return value of every rejected or
    /// out-of-state operation.
    pub fn none() -> Self {
        Self::default()
    }

    fn push(&mut self, recipient: Recipient, event: ServerEvent) {
        self.out.push((recipient, event));
    }
}

/// One quiz session.
///
/// All operations are synchronous and I/O-free; callers must serialize
/// access (the manager holds each game behind its registry lock) so a
/// buzz arriving and the window-check sweep never race.
pub struct QuizGame {
    id: GameId,
    token: String,
    config: GameConfig,
    host: Option<Player>,
    players: HashMap<PlayerId, Player>,
    round_names: Vec<String>,
    tournament_id: Option<String>,

    nominal_index: usize,
    current_round: u32,
    question_number: u32,
    game_state: GameState,
    finalized: bool,

    // Per-question transient state, cleared on every reset.
    question_state: QuestionState,
    signals: Vec<Signal>,
    first_signal_ts: Option<u64>,
    host_notified_on_first_signal: bool,
    responder_queue: Vec<PlayerId>,
    excluded: HashSet<PlayerId>,
    current_events: Vec<ScoreEvent>,

    remaining_seconds: u32,
    timer_running: bool,

    question_log: Vec<QuestionRecord>,
}

impl QuizGame {
    /// Creates a fresh session with a generated id and join token.
    /// An empty nominal ladder falls back to the default one.
    pub fn new(mut config: GameConfig) -> Self {
        if config.nominals.is_empty() {
            config.nominals = GameConfig::default().nominals;
        }
        let id = GameId(NEXT_GAME_ID.fetch_add(1, Ordering::Relaxed));
        let remaining_seconds = config.question_seconds;
        Self {
            id,
            token: generate_token(),
            config,
            host: None,
            players: HashMap::new(),
            round_names: Vec::new(),
            tournament_id: None,
            nominal_index: 0,
            current_round: 1,
            question_number: 1,
            game_state: GameState::Running,
            finalized: false,
            question_state: QuestionState::Running,
            signals: Vec::new(),
            first_signal_ts: None,
            host_notified_on_first_signal: false,
            responder_queue: Vec::new(),
            excluded: HashSet::new(),
            current_events: Vec::new(),
            remaining_seconds,
            timer_running: false,
            question_log: Vec::new(),
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn host(&self) -> Option<&Player> {
        self.host.as_ref()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn question_state(&self) -> QuestionState {
        self.question_state
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Point value of the current question.
    pub fn current_nominal(&self) -> i64 {
        self.config.nominals[self.nominal_index]
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn question_number(&self) -> u32 {
        self.question_number
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn responder_queue(&self) -> &[PlayerId] {
        &self.responder_queue
    }

    /// Every identity fan-out may address: all members plus the host.
    pub fn participants(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        if let Some(host) = &self.host {
            ids.push(host.id);
        }
        ids
    }

    /// Id of the host, when one is attached.
    pub fn host_id(&self) -> Option<PlayerId> {
        self.host.as_ref().map(|h| h.id)
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Attaches the host. The reply to `start_game` itself is built by
    /// the manager; this only broadcasts the resulting state.
    pub fn register_host(&mut self, host: Player) -> Effects {
        info!(game_id = %self.id, host_id = %host.id, "host registered");
        self.host = Some(host);
        let mut fx = self.status_effects();
        fx.persist = true;
        fx
    }

    /// Inserts or updates a member. A rejoining identity keeps its prior
    /// score; if the entry was dropped meanwhile, the score is rebuilt
    /// from the question log.
    pub fn register_player(&mut self, mut player: Player) -> Result<Effects, GameError> {
        if self.finalized {
            debug!(game_id = %self.id, player_id = %player.id, "join rejected, game finalized");
            return Err(GameError::Finalized(self.id));
        }

        player.score = match self.players.get(&player.id) {
            Some(existing) => existing.score,
            None => self.logged_score(player.id),
        };
        info!(game_id = %self.id, player_id = %player.id, name = %player.name, score = player.score, "player registered");

        let view = player.view();
        self.players.insert(player.id, player);

        let mut fx = Effects::none();
        fx.push(
            Recipient::Player(view.player_id),
            ServerEvent::Registered { player: view },
        );
        fx.push(Recipient::All, self.status_event());
        fx.persist = true;
        Ok(fx)
    }

    /// Detaches a member. Tolerates identities that are already gone.
    pub fn unregister_player(&mut self, player_id: PlayerId) -> Effects {
        if self.players.remove(&player_id).is_none() {
            debug!(game_id = %self.id, %player_id, "unregister for non-member");
            return Effects::none();
        }
        info!(game_id = %self.id, %player_id, "player unregistered");
        self.excluded.remove(&player_id);
        self.signals.retain(|s| s.player_id != player_id);
        self.responder_queue.retain(|id| *id != player_id);
        if self.signals.is_empty() && self.question_state == QuestionState::AwaitingMoreSignals {
            self.question_state = QuestionState::Running;
            self.first_signal_ts = None;
        }
        let mut fx = self.status_effects();
        fx.persist = true;
        fx
    }

    /// Records a player's latest observed lag estimate (diagnostic only).
    pub fn note_player_lag(&mut self, player_id: PlayerId, lag_ms: f64) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.last_lag_ms = lag_ms;
        }
    }

    // -----------------------------------------------------------------
    // Signals and arbitration
    // -----------------------------------------------------------------

    /// Handles one buzz attempt. Rejections (duplicate, excluded, question
    /// not accepting) are logged and swallowed, never surfaced.
    ///
    /// Accepted signals go to the host only, so the host can watch the raw
    /// contention while the window is open.
    pub fn process_signal(&mut self, signal: Signal) -> Effects {
        if self.game_state == GameState::Finished {
            debug!(game_id = %self.id, player_id = %signal.player_id, "signal after game finished");
            return Effects::none();
        }
        if self.question_state == QuestionState::Answering {
            debug!(game_id = %self.id, player_id = %signal.player_id, "signal while answering, ignored");
            return Effects::none();
        }
        if self.signals.iter().any(|s| s.player_id == signal.player_id) {
            debug!(game_id = %self.id, player_id = %signal.player_id, "duplicate signal ignored");
            return Effects::none();
        }
        if self.excluded.contains(&signal.player_id) && !self.config.allow_multiple_answers {
            debug!(game_id = %self.id, player_id = %signal.player_id, "signal from excluded player ignored");
            return Effects::none();
        }
        if !self.players.contains_key(&signal.player_id) {
            debug!(game_id = %self.id, player_id = %signal.player_id, "signal from non-member ignored");
            return Effects::none();
        }

        if self.signals.is_empty() {
            self.question_state = QuestionState::AwaitingMoreSignals;
            self.first_signal_ts = Some(signal.server_ts);
        }
        info!(
            game_id = %self.id,
            player_id = %signal.player_id,
            adjusted_ts = signal.adjusted_ts,
            "signal accepted"
        );
        self.signals.push(signal);

        let mut fx = Effects::none();
        fx.push(
            Recipient::Host,
            ServerEvent::SignalsUpdate {
                signals: self.signals.iter().map(Signal::view).collect(),
            },
        );
        fx
    }

    /// Idempotent poll from the manager's sweep: closes the accumulation
    /// window once it has elapsed, freezing the responder queue.
    ///
    /// Ordering: stable sort ascending by adjusted timestamp, ties broken
    /// by signal-arrival order.
    pub fn check_signal_window(&mut self, now_ms: u64) -> Effects {
        if self.game_state == GameState::Finished
            || self.question_state == QuestionState::Answering
            || self.signals.is_empty()
        {
            return Effects::none();
        }

        let mut fx = Effects::none();
        if !self.host_notified_on_first_signal {
            fx.push(Recipient::Host, ServerEvent::GamePaused);
            self.host_notified_on_first_signal = true;
        }

        let Some(first_ts) = self.first_signal_ts else {
            return fx;
        };
        let elapsed = now_ms.saturating_sub(first_ts);
        if elapsed <= self.config.accumulation_window_ms() {
            debug!(game_id = %self.id, elapsed, "keeping signal accumulation open");
            return fx;
        }

        self.signals
            .sort_by(|a, b| a.adjusted_ts.total_cmp(&b.adjusted_ts));
        self.responder_queue = self.signals.iter().map(|s| s.player_id).collect();
        self.question_state = QuestionState::Answering;
        info!(
            game_id = %self.id,
            responders = self.responder_queue.len(),
            "accumulation window closed, responder queue frozen"
        );

        let queue_views: Vec<PlayerView> = self
            .responder_queue
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(Player::view)
            .collect();
        fx.push(
            Recipient::All,
            ServerEvent::PlayerAnswering {
                players_queue: queue_views,
            },
        );
        fx.push(Recipient::All, self.status_event());
        fx
    }

    /// Applies the host's ruling on the head-of-queue responder. A no-op
    /// (logged) unless the question is in `answering`.
    pub fn process_host_decision(&mut self, decision: HostDecision) -> Effects {
        if self.question_state != QuestionState::Answering {
            info!(
                game_id = %self.id,
                state = ?self.question_state,
                %decision,
                "host decision outside answering state, ignored"
            );
            return Effects::none();
        }
        info!(game_id = %self.id, %decision, "host decision");

        match decision {
            HostDecision::Cancel => {
                // Discard the question's transient results; scores already
                // applied by earlier declines stand.
                self.reset_question();
                let mut fx = self.status_effects();
                fx.persist = true;
                fx
            }
            HostDecision::Accept => {
                let Some(&head) = self.responder_queue.first() else {
                    return self.advance_question();
                };
                let nominal = self.current_nominal();
                if let Some(player) = self.players.get_mut(&head) {
                    player.score += nominal;
                }
                self.current_events.push(ScoreEvent {
                    player_id: head,
                    delta: nominal,
                    accepted: true,
                });
                info!(game_id = %self.id, player_id = %head, nominal, "answer accepted");
                self.advance_question()
            }
            HostDecision::Decline => {
                let Some(&head) = self.responder_queue.first() else {
                    return self.advance_question();
                };
                let nominal = self.current_nominal();
                if let Some(player) = self.players.get_mut(&head) {
                    player.score -= nominal;
                }
                self.current_events.push(ScoreEvent {
                    player_id: head,
                    delta: -nominal,
                    accepted: false,
                });
                self.excluded.insert(head);
                self.signals.retain(|s| s.player_id != head);
                self.responder_queue.clear();
                info!(game_id = %self.id, player_id = %head, nominal, "answer declined");

                let everyone_failed = !self.config.allow_multiple_answers
                    && !self.players.is_empty()
                    && self.players.keys().all(|id| self.excluded.contains(id));
                if everyone_failed {
                    info!(game_id = %self.id, "every member failed the question");
                    return self.advance_question();
                }

                // Reopen acceptance. Remaining signals and the original
                // window start stay, so the next sweep refreezes with the
                // surviving responders.
                self.question_state = QuestionState::Running;
                if self.signals.is_empty() {
                    self.first_signal_ts = None;
                }
                let mut fx = self.status_effects();
                fx.persist = true;
                fx
            }
        }
    }

    // -----------------------------------------------------------------
    // Progression
    // -----------------------------------------------------------------

    /// Closes out the current question and moves the ladder forward.
    /// Wrapping past the ladder's end advances the round; completing the
    /// final round finishes the game.
    pub fn advance_question(&mut self) -> Effects {
        let record = QuestionRecord {
            round: self.current_round,
            question_number: self.question_number,
            nominal: self.current_nominal(),
            events: std::mem::take(&mut self.current_events),
        };
        info!(
            game_id = %self.id,
            round = record.round,
            question = record.question_number,
            nominal = record.nominal,
            answers = record.events.len(),
            "question complete"
        );
        self.question_log.push(record);

        self.question_number += 1;
        self.nominal_index = (self.nominal_index + 1) % self.config.nominals.len();
        if self.nominal_index == 0 {
            if self.current_round >= self.config.number_of_rounds {
                info!(game_id = %self.id, "final round complete, game finished");
                self.game_state = GameState::Finished;
                self.finalized = true;
            } else {
                self.current_round += 1;
            }
        }

        self.reset_question();
        self.remaining_seconds = self.config.question_seconds;
        self.timer_running = false;

        let mut fx = self.status_effects();
        fx.persist = true;
        fx
    }

    /// One countdown step, driven by the manager's sweep. Decrements only
    /// while the question itself is running and the timer was started; an
    /// open signal window implicitly supersedes the countdown.
    pub fn tick(&mut self) -> Effects {
        if self.game_state == GameState::Finished
            || !self.timer_running
            || self.question_state != QuestionState::Running
        {
            return Effects::none();
        }

        if self.remaining_seconds > 1 {
            self.remaining_seconds -= 1;
            self.status_effects()
        } else {
            self.remaining_seconds = 0;
            info!(game_id = %self.id, "question time expired, nobody buzzed");
            self.advance_question()
        }
    }

    // -----------------------------------------------------------------
    // Host controls
    // -----------------------------------------------------------------

    /// Starts (or restarts) the question countdown.
    pub fn start_timer(&mut self) -> Effects {
        if self.game_state == GameState::Finished {
            return Effects::none();
        }
        self.timer_running = true;
        if self.remaining_seconds == 0 {
            self.remaining_seconds = self.config.question_seconds;
        }
        info!(game_id = %self.id, remaining = self.remaining_seconds, "countdown started");
        self.status_effects()
    }

    /// Blocks further joins without ending play.
    pub fn finalize(&mut self) -> Effects {
        info!(game_id = %self.id, "game finalized");
        self.finalized = true;
        let mut fx = self.status_effects();
        fx.persist = true;
        fx
    }

    /// Replaces the display names for rounds.
    pub fn set_round_names(&mut self, names: Vec<String>) -> Effects {
        self.round_names = names;
        let mut fx = self.status_effects();
        fx.persist = true;
        fx
    }

    // -----------------------------------------------------------------
    // Status and persistence
    // -----------------------------------------------------------------

    /// The full broadcast-safe snapshot: what every client sees and what
    /// the store persists.
    pub fn generate_status(&self) -> GameStatus {
        let mut players: Vec<PlayerView> = self.players.values().map(Player::view).collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));

        GameStatus {
            players,
            nominal: self.current_nominal(),
            current_round: self.current_round,
            number_of_rounds: self.config.number_of_rounds,
            round_names: self.round_names.clone(),
            question_number: self.question_number,
            game_state: self.game_state,
            question_state: self.question_state,
            responder_queue: self.responder_queue.clone(),
            remaining_seconds: self.remaining_seconds,
            timer_running: self.timer_running,
            finalized: self.finalized,
            question_log: self.question_log.clone(),
        }
    }

    /// The persisted form: status plus identity and scoping metadata.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.id,
            token: self.token.clone(),
            host: self.host.as_ref().map(Player::view),
            tournament_id: self.tournament_id.clone(),
            status: self.generate_status(),
        }
    }

    /// Rebuilds a session from a persisted snapshot.
    ///
    /// Live-only state is not restored: the question restarts cleanly
    /// (`running`, no open signals, timer stopped). The nominal index is
    /// derived from the recorded nominal's position in the ladder.
    pub fn restore(snapshot: GameSnapshot, mut config: GameConfig) -> Self {
        if config.nominals.is_empty() {
            config.nominals = GameConfig::default().nominals;
        }
        let status = snapshot.status;
        config.number_of_rounds = status.number_of_rounds;
        let nominal_index = config
            .nominals
            .iter()
            .position(|n| *n == status.nominal)
            .unwrap_or(0);

        let players: HashMap<PlayerId, Player> = status
            .players
            .iter()
            .map(|v| (v.player_id, Player::from_view(v)))
            .collect();

        info!(
            game_id = %snapshot.game_id,
            token = %snapshot.token,
            players = players.len(),
            "session restored from snapshot"
        );

        Self {
            id: snapshot.game_id,
            token: snapshot.token,
            host: snapshot.host.as_ref().map(Player::from_view),
            players,
            round_names: status.round_names,
            tournament_id: snapshot.tournament_id,
            nominal_index,
            current_round: status.current_round,
            question_number: status.question_number,
            game_state: status.game_state,
            finalized: status.finalized,
            question_state: QuestionState::Running,
            signals: Vec::new(),
            first_signal_ts: None,
            host_notified_on_first_signal: false,
            responder_queue: Vec::new(),
            excluded: HashSet::new(),
            current_events: Vec::new(),
            remaining_seconds: status.remaining_seconds,
            timer_running: false,
            question_log: status.question_log,
            config,
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// A rejoining player's score, replayed from the question log.
    fn logged_score(&self, player_id: PlayerId) -> i64 {
        self.question_log
            .iter()
            .flat_map(|q| q.events.iter())
            .filter(|e| e.player_id == player_id)
            .map(|e| e.delta)
            .sum()
    }

    /// Clears all per-question transient state.
    fn reset_question(&mut self) {
        self.signals.clear();
        self.first_signal_ts = None;
        self.host_notified_on_first_signal = false;
        self.responder_queue.clear();
        self.excluded.clear();
        self.question_state = QuestionState::Running;
    }

    fn status_event(&self) -> ServerEvent {
        ServerEvent::Status {
            status: self.generate_status(),
        }
    }

    fn status_effects(&self) -> Effects {
        let mut fx = Effects::none();
        fx.push(Recipient::All, self.status_event());
        fx
    }
}
