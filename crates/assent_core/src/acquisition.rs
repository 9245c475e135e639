//! Gesture acquisition state machine
//!
//! Per question the machine walks
//! `Announcing → Settling → Listening → Resolved | TimedOut → Advancing`
//! and then either starts the next question or completes.
//!
//! Everything runs on one task. Timers and samples are awaited inside
//! `select!` alongside the command channel, and every result is checked
//! against the epoch that was current when the cycle began. A handle bumps
//! the epoch before sending its command, so a sample or tick that resolves
//! after a restart is discarded even if it wins the race with the command.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result, SignalSourceError};
use crate::gesture::{Gesture, GestureReading, GestureSource, SourceMode};
use crate::id::QuestionId;
use crate::session::{SessionSummary, SessionSupervisor};

/// Timing for one acquisition cycle. Stored as milliseconds so it reads
/// naturally in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Orientation delay before detection is allowed
    pub settle_ms: u64,
    /// Display refresh for the countdown; has no effect on timing
    pub countdown_tick_ms: u64,
    /// Sampling interval for poll sources, and retry delay after errors
    pub poll_interval_ms: u64,
    /// Pause after an answer before moving on
    pub advance_delay_ms: u64,
    /// Give up listening after this long; `None` waits forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_timeout_ms: Option<u64>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            settle_ms: 5000,
            countdown_tick_ms: 200,
            poll_interval_ms: 400,
            advance_delay_ms: 1000,
            listen_timeout_ms: None,
        }
    }
}

impl AcquisitionConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    pub fn listen_timeout(&self) -> ListenTimeout {
        match self.listen_timeout_ms {
            Some(ms) => ListenTimeout::After(Duration::from_millis(ms)),
            None => ListenTimeout::Indefinite,
        }
    }
}

/// How long `Listening` may last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenTimeout {
    Indefinite,
    /// Mark the question unanswered and advance
    After(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionPhase {
    Idle,
    Announcing {
        index: usize,
        total: Option<usize>,
        question: String,
    },
    Settling {
        duration: Duration,
    },
    Listening,
    Resolved(Gesture),
    TimedOut,
    Advancing,
    Completed,
}

impl AcquisitionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Announcing { .. } => "announcing",
            Self::Settling { .. } => "settling",
            Self::Listening => "listening",
            Self::Resolved(_) => "resolved",
            Self::TimedOut => "timed_out",
            Self::Advancing => "advancing",
            Self::Completed => "completed",
        }
    }
}

/// Countdown text shown while settling
pub fn countdown_label(remaining: Duration) -> String {
    let seconds = remaining.as_millis().div_ceil(1000);
    format!("Listening starts in {seconds}s…")
}

/// Receives display updates from the machine. Vocalizing the question is an
/// observer concern too.
pub trait AcquisitionObserver: Send + Sync {
    fn on_phase(&self, _phase: &AcquisitionPhase) {}

    fn on_countdown(&self, _text: &str) {}

    fn on_status(&self, _status: &str) {}

    fn on_answer(&self, _index: usize, _answer: Gesture) {}
}

/// Observer that writes everything to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AcquisitionObserver for TracingObserver {
    fn on_phase(&self, phase: &AcquisitionPhase) {
        match phase {
            AcquisitionPhase::Announcing {
                index,
                total,
                question,
            } => match total {
                Some(total) => info!("Question {} of {}: {}", index + 1, total, question),
                None => info!("Question {}: {}", index + 1, question),
            },
            other => debug!("Acquisition phase: {}", other.name()),
        }
    }

    fn on_countdown(&self, text: &str) {
        debug!("{}", text);
    }

    fn on_status(&self, status: &str) {
        info!("{}", status);
    }

    fn on_answer(&self, index: usize, answer: Gesture) {
        info!("Answer for question {}: {}", index + 1, answer.label());
    }
}

/// A question handed to the machine from outside (relay mode)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedQuestion {
    pub question_id: Option<QuestionId>,
    pub text: String,
}

impl PresentedQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            question_id: None,
            text: text.into(),
        }
    }
}

/// Where relay-mode answers go (normally the relay connection)
#[async_trait::async_trait]
pub trait AnswerReporter: Send + Sync {
    async fn report(&self, question: &PresentedQuestion, answer: Gesture);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcquisitionCommand {
    Restart,
    Stop,
    Present(PresentedQuestion),
}

/// Why a cycle ended early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    Restart,
    Stop,
    Superseded(PresentedQuestion),
}

fn interrupt_for(command: Option<AcquisitionCommand>) -> Interrupt {
    match command {
        Some(AcquisitionCommand::Restart) => Interrupt::Restart,
        Some(AcquisitionCommand::Present(question)) => Interrupt::Superseded(question),
        Some(AcquisitionCommand::Stop) | None => Interrupt::Stop,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Answered(Gesture),
    TimedOut,
    Interrupted(Interrupt),
}

/// Controls a running machine from another task
#[derive(Debug, Clone)]
pub struct AcquisitionHandle {
    tx: mpsc::UnboundedSender<AcquisitionCommand>,
    epoch: Arc<AtomicU64>,
}

impl AcquisitionHandle {
    /// Abandon everything and start over from the first question
    pub fn restart(&self) {
        self.send(AcquisitionCommand::Restart);
    }

    pub fn stop(&self) {
        self.send(AcquisitionCommand::Stop);
    }

    /// Ask a new question, superseding any cycle in flight
    pub fn present(&self, question: PresentedQuestion) {
        self.send(AcquisitionCommand::Present(question));
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn send(&self, command: AcquisitionCommand) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // The machine holds its own sender, so this only fails once it is gone
        let _ = self.tx.send(command);
    }
}

pub struct GestureAcquisition<S> {
    config: AcquisitionConfig,
    source: S,
    observer: Arc<dyn AcquisitionObserver>,
    commands: mpsc::UnboundedReceiver<AcquisitionCommand>,
    handle: AcquisitionHandle,
    phase: AcquisitionPhase,
}

impl<S: GestureSource> GestureAcquisition<S> {
    pub fn new(config: AcquisitionConfig, source: S) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self {
            config,
            source,
            observer: Arc::new(TracingObserver),
            commands,
            handle: AcquisitionHandle {
                tx,
                epoch: Arc::new(AtomicU64::new(0)),
            },
            phase: AcquisitionPhase::Idle,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AcquisitionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn handle(&self) -> AcquisitionHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> &AcquisitionPhase {
        &self.phase
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn epoch(&self) -> u64 {
        self.handle.epoch()
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.epoch() != epoch
    }

    fn set_phase(&mut self, phase: AcquisitionPhase) {
        self.observer.on_phase(&phase);
        self.phase = phase;
    }

    /// The epoch moved, so a command is already queued (or about to be)
    async fn await_interrupt(&mut self) -> Interrupt {
        interrupt_for(self.commands.recv().await)
    }

    /// Run one question through announce, settle and listen
    pub async fn run_cycle(
        &mut self,
        question: &str,
        index: usize,
        total: Option<usize>,
    ) -> CycleOutcome {
        let epoch = self.epoch();
        let settle = self.config.settle();

        self.set_phase(AcquisitionPhase::Announcing {
            index,
            total,
            question: question.to_string(),
        });
        self.observer.on_status("Preparing to listen for gesture…");
        self.observer.on_countdown(&format!(
            "Hold on: starting in {} seconds",
            settle.as_millis().div_ceil(1000)
        ));

        if let Some(interrupt) = self.settle(epoch, settle).await {
            return CycleOutcome::Interrupted(interrupt);
        }

        let outcome = self.listen(epoch).await;
        if let CycleOutcome::Answered(answer) = outcome {
            self.observer.on_answer(index, answer);
            self.observer
                .on_status(&format!("Detected {}.", answer.label()));
        }
        outcome
    }

    async fn settle(&mut self, epoch: u64, settle: Duration) -> Option<Interrupt> {
        self.set_phase(AcquisitionPhase::Settling { duration: settle });

        let deadline = Instant::now() + settle;
        let elapsed = sleep_until(deadline);
        tokio::pin!(elapsed);
        // Display only; the deadline alone ends settling
        let mut ticker = interval(self.config.countdown_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => SettleStep::Command(command),
                _ = &mut elapsed => SettleStep::Elapsed,
                _ = ticker.tick() => SettleStep::Tick,
            };
            match step {
                SettleStep::Command(command) => return Some(interrupt_for(command)),
                _ if self.is_stale(epoch) => return Some(self.await_interrupt().await),
                SettleStep::Elapsed => return None,
                SettleStep::Tick => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                self.observer.on_countdown(&countdown_label(remaining));
            }
        }
    }

    async fn listen(&mut self, epoch: u64) -> CycleOutcome {
        // Anything buffered while settling doesn't count
        self.source.discard_pending().await;
        self.set_phase(AcquisitionPhase::Listening);
        self.observer.on_countdown("Listening for gesture…");
        self.observer
            .on_status("Listening… Please perform YES or NO gesture");

        let period = self.config.poll_interval();
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let timeout = match self.config.listen_timeout() {
            ListenTimeout::Indefinite => None,
            ListenTimeout::After(limit) => Some(Instant::now() + limit),
        };
        let expiry = async move {
            match timeout {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mode = self.source.mode();
        let mut throttle = false;

        loop {
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => ListenStep::Command(command),
                _ = &mut expiry => ListenStep::Expired,
                reading = next_reading(&mut self.source, &mut poll, mode == SourceMode::Poll || throttle) => ListenStep::Reading(reading),
            };

            match step {
                ListenStep::Command(command) => {
                    return CycleOutcome::Interrupted(interrupt_for(command));
                }
                ListenStep::Expired => {
                    if self.is_stale(epoch) {
                        return CycleOutcome::Interrupted(self.await_interrupt().await);
                    }
                    self.set_phase(AcquisitionPhase::TimedOut);
                    self.observer.on_countdown("");
                    self.observer.on_status("No gesture detected. Moving on.");
                    return CycleOutcome::TimedOut;
                }
                ListenStep::Reading(reading) => {
                    if self.is_stale(epoch) {
                        debug!("Discarding sample from a cancelled cycle");
                        return CycleOutcome::Interrupted(self.await_interrupt().await);
                    }
                    match reading {
                        Ok(reading) => {
                            throttle = false;
                            if let Some(answer) = reading.accepted() {
                                // Listening ends here; later samples are never read
                                self.set_phase(AcquisitionPhase::Resolved(answer));
                                self.observer.on_countdown("");
                                return CycleOutcome::Answered(answer);
                            }
                        }
                        Err(e) => {
                            warn!("Gesture source {} failed: {}", self.source.source_type(), e);
                            self.observer.on_status("Connection issue. Retrying…");
                            throttle = true;
                        }
                    }
                }
            }
        }
    }

    /// UX pause after a question. Returns the interrupt if one arrived.
    async fn advance_pause(&mut self) -> Option<Interrupt> {
        let epoch = self.epoch();
        self.set_phase(AcquisitionPhase::Advancing);

        let delay = sleep(self.config.advance_delay());
        tokio::pin!(delay);
        let command = tokio::select! {
            biased;
            command = self.commands.recv() => Some(command),
            _ = &mut delay => None,
        };
        match command {
            Some(command) => Some(interrupt_for(command)),
            None if self.is_stale(epoch) => Some(self.await_interrupt().await),
            None => None,
        }
    }

    /// Walk an ordered question set to completion and return the summary.
    ///
    /// `restart` resets the session to question 0; `stop` ends with
    /// `AcquisitionStopped`. Questions presented from outside are ignored and
    /// the current question is asked again.
    pub async fn run_session(&mut self, session: &mut SessionSupervisor) -> Result<SessionSummary> {
        let total = session.len();

        while let Some((index, question)) = session.current() {
            let question = question.to_string();

            let interrupt = match self.run_cycle(&question, index, Some(total)).await {
                CycleOutcome::Answered(answer) => {
                    session.record_answer(index, answer)?;
                    self.advance_pause().await
                }
                CycleOutcome::TimedOut => self.advance_pause().await,
                CycleOutcome::Interrupted(interrupt) => {
                    self.handle_session_interrupt(session, interrupt)?;
                    continue;
                }
            };

            match interrupt {
                None => {
                    session.advance();
                }
                Some(interrupt) => self.handle_session_interrupt(session, interrupt)?,
            }
        }

        self.set_phase(AcquisitionPhase::Completed);
        self.observer.on_countdown("");
        self.observer.on_status("All questions completed.");
        session.summary()
    }

    fn handle_session_interrupt(
        &mut self,
        session: &mut SessionSupervisor,
        interrupt: Interrupt,
    ) -> Result<()> {
        match interrupt {
            Interrupt::Restart => {
                info!("Restarting session from the first question");
                session.reset();
                self.set_phase(AcquisitionPhase::Idle);
                Ok(())
            }
            Interrupt::Stop => {
                self.set_phase(AcquisitionPhase::Idle);
                Err(CoreError::AcquisitionStopped)
            }
            Interrupt::Superseded(question) => {
                debug!("Ignoring presented question during a session: {}", question.text);
                Ok(())
            }
        }
    }

    /// Answer questions as they are presented through the handle until
    /// stopped. A newer question replaces the one in flight.
    pub async fn run_relay(&mut self, reporter: &dyn AnswerReporter) -> Result<()> {
        let mut asked = 0usize;
        let mut next: Option<PresentedQuestion> = None;

        loop {
            let question = match next.take() {
                Some(question) => question,
                None => {
                    self.set_phase(AcquisitionPhase::Idle);
                    match self.await_interrupt().await {
                        Interrupt::Superseded(question) => question,
                        Interrupt::Restart => {
                            asked = 0;
                            continue;
                        }
                        Interrupt::Stop => return Ok(()),
                    }
                }
            };

            let interrupt = match self.run_cycle(&question.text, asked, None).await {
                CycleOutcome::Answered(answer) => {
                    reporter.report(&question, answer).await;
                    asked += 1;
                    self.advance_pause().await
                }
                CycleOutcome::TimedOut => {
                    asked += 1;
                    self.advance_pause().await
                }
                CycleOutcome::Interrupted(interrupt) => {
                    asked += 1;
                    Some(interrupt)
                }
            };

            match interrupt {
                None => {}
                Some(Interrupt::Superseded(question)) => next = Some(question),
                Some(Interrupt::Restart) => {
                    info!("Relay acquisition reset");
                    asked = 0;
                }
                Some(Interrupt::Stop) => {
                    self.set_phase(AcquisitionPhase::Idle);
                    return Ok(());
                }
            }
        }
    }
}

enum SettleStep {
    Command(Option<AcquisitionCommand>),
    Elapsed,
    Tick,
}

enum ListenStep {
    Command(Option<AcquisitionCommand>),
    Expired,
    Reading(std::result::Result<GestureReading, SignalSourceError>),
}

async fn next_reading<S: GestureSource>(
    source: &mut S,
    poll: &mut tokio::time::Interval,
    wait_for_tick: bool,
) -> std::result::Result<GestureReading, SignalSourceError> {
    if wait_for_tick {
        poll.tick().await;
    }
    source.sample().await
}
