//! AssessmentEngine - drives the lifecycle of one monitored target
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → list processes → lifecycle transition → effects
//!     ↑                                                   │
//!     └─── Commands (Pause, Resume, GetState, Shutdown)   ├─► EventLog
//!                                                         ├─► ChannelAssessors
//!                                                         └─► AssessmentReport
//! ```
//!
//! The engine stays in `Idle` until the target process shows up. When the target
//! disappears, every channel assessor is drained, aggregate metrics are computed and
//! a report is emitted. In continuous mode the engine then waits for the next
//! appearance; otherwise it exits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::config::AssessmentConfig;
use crate::error::{EngineError, TransportError};
use crate::event_log::{EventLog, LifecycleEvent, LifecycleEventKind};
use crate::lifecycle::{Effect, Input, Phase, transition};
use crate::metrics::{MetricAssessor, Metrics};
use crate::report::{AssessmentReport, ChannelResult};
use crate::transport::Transport;

use super::channel_assessor::ChannelAssessorHandle;
use super::messages::{AssessmentState, EngineCommand};

/// Lower bound for the presence poll period
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Actor that watches the target and coordinates channel assessors
pub struct AssessmentEngine {
    config: Arc<AssessmentConfig>,
    transport: Arc<dyn Transport>,

    command_rx: mpsc::Receiver<EngineCommand>,
    commands_open: bool,

    events: Arc<EventLog>,
    phase_tx: watch::Sender<Phase>,
    report_tx: mpsc::UnboundedSender<AssessmentReport>,

    state: AssessmentState,
    assessors: Vec<ChannelAssessorHandle>,
    results: Vec<ChannelResult>,
    pending_report: Option<AssessmentReport>,
    shutdown_requested: bool,
}

impl AssessmentEngine {
    pub fn new(
        config: AssessmentConfig,
        transport: Arc<dyn Transport>,
        command_rx: mpsc::Receiver<EngineCommand>,
        events: Arc<EventLog>,
        phase_tx: watch::Sender<Phase>,
        report_tx: mpsc::UnboundedSender<AssessmentReport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            command_rx,
            commands_open: true,
            events,
            phase_tx,
            report_tx,
            state: AssessmentState::default(),
            assessors: vec![],
            results: vec![],
            pending_report: None,
            shutdown_requested: false,
        }
    }

    /// Run the engine until shutdown, the end of a single cycle, or a fatal transport error
    #[instrument(skip(self), fields(target = %self.config.target_name))]
    pub async fn run(mut self) -> Result<(), EngineError> {
        info!(
            "waiting for target '{}' ({} channels, {} metrics)",
            self.config.target_name,
            self.config.channels.len(),
            self.config.metrics.len()
        );

        loop {
            let Some(report) = self.run_cycle().await? else {
                break;
            };

            if self.report_tx.send(report).is_err() {
                debug!("no receiver for the assessment report");
            }

            if !self.config.continuous || self.shutdown_requested {
                break;
            }

            self.apply(Input::Reset).await?;
        }

        debug!("assessment engine stopped");
        Ok(())
    }

    /// Monitor until the current cycle produces a report or the engine is shut down
    async fn run_cycle(&mut self) -> Result<Option<AssessmentReport>, EngineError> {
        let mut ticker = interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_target().await?;
                }

                command = self.command_rx.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command).await?,
                    None => {
                        warn!("command channel closed, monitoring continues");
                        self.commands_open = false;
                    }
                },
            }

            if let Some(report) = self.pending_report.take() {
                return Ok(Some(report));
            }
            if self.state.phase == Phase::Ended {
                return Ok(None);
            }
        }
    }

    async fn poll_target(&mut self) -> Result<(), EngineError> {
        if self.assessors.iter().any(ChannelAssessorHandle::is_disconnected) {
            return self.abort_disconnected().await;
        }

        match self.transport.list_process_names().await {
            Ok(names) => {
                let target_present = names.contains(&self.config.target_name);
                self.apply(Input::Poll { target_present }).await
            }
            Err(TransportError::Disconnected) => self.abort_disconnected().await,
            Err(e) => {
                warn!("presence poll failed, skipping tick: {e}");
                Ok(())
            }
        }
    }

    /// Drop every assessor and end the engine with a fatal transport error
    async fn abort_disconnected(&mut self) -> Result<(), EngineError> {
        error!("transport disconnected, stopping assessment");
        // results of a lost transport are not reported
        let _ = self.drain_assessors().await;
        Err(EngineError::Transport(TransportError::Disconnected))
    }

    async fn handle_command(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        match command {
            EngineCommand::Pause => {
                debug!("received Pause command");
                self.apply(Input::Pause).await
            }

            EngineCommand::Resume => {
                debug!("received Resume command");
                self.apply(Input::Resume).await
            }

            EngineCommand::GetState { respond_to } => {
                let _ = respond_to.send(self.state);
                Ok(())
            }

            EngineCommand::Shutdown => {
                debug!("received Shutdown command");
                self.shutdown_requested = true;
                self.apply(Input::Shutdown).await
            }
        }
    }

    /// Feed one input to the lifecycle and perform the resulting effects in order
    async fn apply(&mut self, input: Input) -> Result<(), EngineError> {
        let transition = transition(self.state.phase, input);

        if transition.next == self.state.phase && transition.effects.is_empty() {
            if matches!(input, Input::Pause | Input::Resume) {
                debug!("{input:?} ignored while {:?}", self.state.phase);
            }
            return Ok(());
        }

        for effect in transition.effects {
            self.execute(effect).await?;
        }

        if input == Input::Reset {
            self.state = AssessmentState::default();
            self.results.clear();
            info!("waiting for target '{}' to appear again", self.config.target_name);
        }

        debug!("{:?} -> {:?}", self.state.phase, transition.next);
        self.state.phase = transition.next;
        self.phase_tx.send_replace(transition.next);
        Ok(())
    }

    async fn execute(&mut self, effect: Effect) -> Result<(), EngineError> {
        match effect {
            Effect::RecordStartTime => {
                self.state.start_time = Some(self.transport.current_time());
                self.state.metrics = Metrics::default();
            }

            Effect::Publish(kind) => {
                self.events
                    .append(LifecycleEvent::new(kind, self.transport.current_time()));
                match kind {
                    LifecycleEventKind::NodeAdded => info!(
                        "target '{}' started, initializing assessment",
                        self.config.target_name
                    ),
                    LifecycleEventKind::NodeRemoved => info!(
                        "target '{}' stopped, finishing assessment",
                        self.config.target_name
                    ),
                    LifecycleEventKind::AssessmentPaused => info!("assessment paused"),
                    LifecycleEventKind::AssessmentResumed => info!("assessment resumed"),
                }
            }

            Effect::SpawnAssessors => {
                let cycle_start = self
                    .state
                    .start_time
                    .unwrap_or_else(|| self.transport.current_time());

                self.assessors = self
                    .config
                    .channels
                    .iter()
                    .cloned()
                    .map(|spec| {
                        ChannelAssessorHandle::spawn(
                            spec,
                            Arc::clone(&self.transport),
                            cycle_start,
                            self.config.subscribe_timeout,
                        )
                    })
                    .collect();

                debug!("spawned {} channel assessors", self.assessors.len());
            }

            Effect::DrainAssessors => {
                self.results = self.drain_assessors().await?;
            }

            Effect::Report => {
                let report = self.build_report();
                self.pending_report = Some(report);
            }
        }

        Ok(())
    }

    /// Cancel every assessor and wait for their results, in configuration order
    ///
    /// Fails if any assessor lost the transport.
    async fn drain_assessors(&mut self) -> Result<Vec<ChannelResult>, EngineError> {
        let assessors = std::mem::take(&mut self.assessors);
        let results = join_all(assessors.into_iter().map(ChannelAssessorHandle::drain)).await;

        results
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!("channel assessor lost the transport: {e}");
                EngineError::from(e)
            })
    }

    fn build_report(&mut self) -> AssessmentReport {
        let ended_at = self.transport.current_time();
        let started_at = self.state.start_time.unwrap_or(ended_at);

        let execution_time = (ended_at - started_at)
            .to_std()
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0);

        let number_of_messages = self
            .results
            .iter()
            .filter(|result| result.is_completed())
            .map(|result| result.message_count)
            .sum();

        let metrics = Metrics::compute(execution_time, number_of_messages);
        info!(
            "execution time: {:.3}s, messages: {}, frequency: {}",
            metrics.execution_time,
            metrics.number_of_messages,
            metrics
                .frequency
                .map(|f| format!("{f:.3}Hz"))
                .unwrap_or_else(|| "undefined".to_string())
        );

        let metric_outcomes = MetricAssessor::assess(&metrics, &self.config.metrics);
        self.state.metrics = metrics;

        let report = AssessmentReport {
            target_name: self.config.target_name.clone(),
            started_at,
            ended_at,
            metrics,
            channels: std::mem::take(&mut self.results),
            metric_outcomes,
            events: self.events.snapshot(),
        };

        if report.passed() {
            info!("assessment of '{}' PASSED", report.target_name);
        } else {
            warn!("assessment of '{}' FAILED", report.target_name);
        }
        info!("----- END OF ASSESSMENT -----");

        report
    }
}

/// Handle for controlling an AssessmentEngine
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    phase_rx: watch::Receiver<Phase>,
    events: Arc<EventLog>,
    report_rx: mpsc::UnboundedReceiver<AssessmentReport>,
    task: JoinHandle<Result<(), EngineError>>,
}

impl EngineHandle {
    /// Spawn an engine for `config` on top of `transport`
    pub fn start(config: AssessmentConfig, transport: Arc<dyn Transport>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let events = Arc::new(EventLog::new());

        let engine = AssessmentEngine::new(
            config,
            transport,
            cmd_rx,
            Arc::clone(&events),
            phase_tx,
            report_tx,
        );

        let task = tokio::spawn(engine.run());

        Self {
            sender: cmd_tx,
            phase_rx,
            events,
            report_rx,
            task,
        }
    }

    pub async fn pause(&self) -> Result<()> {
        self.sender
            .send(EngineCommand::Pause)
            .await
            .context("failed to send Pause command")?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.sender
            .send(EngineCommand::Resume)
            .await
            .context("failed to send Resume command")?;
        Ok(())
    }

    /// Current state of the engine, as seen by the actor
    pub async fn state(&self) -> Result<AssessmentState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineCommand::GetState { respond_to: tx })
            .await
            .context("failed to send GetState command")?;

        rx.await.context("failed to receive state")
    }

    /// Stop monitoring, reporting the running cycle if there is one
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    pub async fn wait_for_phase(&self, phase: Phase) -> Result<()> {
        let mut phase_rx = self.phase_rx.clone();
        phase_rx
            .wait_for(|current| *current == phase)
            .await
            .with_context(|| format!("engine stopped before reaching {phase:?}"))?;
        Ok(())
    }

    /// Lifecycle events retained so far, oldest first
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.snapshot()
    }

    /// Next report, or `None` once the engine has stopped
    pub async fn next_report(&mut self) -> Option<AssessmentReport> {
        self.report_rx.recv().await
    }

    /// Wait for the engine task to exit
    pub async fn join(self) -> Result<()> {
        self.task.await.context("engine task panicked")??;
        Ok(())
    }
}
