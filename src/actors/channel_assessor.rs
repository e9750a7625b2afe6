//! ChannelAssessor - evaluates the values of one channel during a cycle
//!
//! ## Lifecycle
//!
//! ```text
//! Subscribing ──► Active ──► Draining ──► Closed
//!      │                                    ▲
//!      └──── timeout / error / cancel ──────┘  (FailedToStart)
//!      │
//!      └──── transport disconnected ──► Disconnected
//! ```
//!
//! The assessor keeps evaluating while the engine is paused. Cancellation moves it to
//! `Draining`, where values already delivered are still counted before the
//! subscription is dropped.
//!
//! A disconnected transport is not a channel failure: the assessor stops in
//! `Disconnected` and hands the error to the engine, which ends the assessment.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ChannelSpec;
use crate::error::TransportError;
use crate::report::{ChannelResult, ChannelStatus, NO_VALUES_OBSERVED, RequirementOutcome};
use crate::requirement::{Mode, Verdict, evaluate, evaluate_numeric};
use crate::transport::{Observation, Subscription, Transport};

const LAST_VALUE_FAILED: &str = "last evaluated value failed";
const FAILED_ONCE: &str = "failed under temporal consistency";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessorState {
    Subscribing,
    Active,
    Draining,
    Closed,
    /// The transport was lost while subscribing
    Disconnected,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    /// Verdict currently held for the requirement
    verdict: Option<Verdict>,
    evaluations: u64,
    failures: u64,
}

impl Slot {
    fn record(&mut self, verdict: Verdict, temporal_consistency: bool) {
        self.evaluations += 1;
        if !verdict.is_passed() {
            self.failures += 1;
        }

        // a failure under temporal consistency is final
        if temporal_consistency && self.verdict.as_ref().is_some_and(|v| !v.is_passed()) {
            return;
        }
        self.verdict = Some(verdict);
    }
}

/// Requirement bookkeeping for one channel, independent of any transport
#[derive(Debug, Clone)]
pub struct ChannelEvaluation {
    spec: ChannelSpec,
    cycle_start: DateTime<Utc>,
    message_count: u64,
    slots: Vec<Slot>,
}

impl ChannelEvaluation {
    pub fn new(spec: ChannelSpec, cycle_start: DateTime<Utc>) -> Self {
        let slots = vec![Slot::default(); spec.requirements.len()];
        Self {
            spec,
            cycle_start,
            message_count: 0,
            slots,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.spec.channel_name
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Count one value and evaluate every per-value requirement whose window contains it
    pub fn observe(&mut self, observation: &Observation) {
        self.message_count += 1;

        let elapsed = (observation.received_at - self.cycle_start)
            .to_std()
            .unwrap_or(Duration::ZERO);

        for (index, (requirement, slot)) in self
            .spec
            .requirements
            .iter()
            .zip(self.slots.iter_mut())
            .enumerate()
        {
            if requirement.mode == Mode::Total || !requirement.in_window(elapsed) {
                continue;
            }

            let verdict = evaluate(&observation.value, requirement);
            match &verdict {
                Verdict::Invalid(reason) => error!(
                    "requirement {} of channel '{}': {reason} ({})",
                    index + 1,
                    self.spec.channel_name,
                    observation.value
                ),
                verdict => trace!(
                    "requirement {} of channel '{}': {:?} for {}",
                    index + 1,
                    self.spec.channel_name,
                    verdict,
                    observation.value
                ),
            }

            slot.record(verdict, requirement.temporal_consistency);
        }
    }

    /// Close the books: evaluate count-based requirements and log every outcome
    pub fn finish(self) -> ChannelResult {
        let total = self.spec.requirements.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, (requirement, slot)) in self
            .spec
            .requirements
            .iter()
            .zip(self.slots)
            .enumerate()
        {
            let position = index + 1;

            let (verdict, evaluations, failures) = if requirement.mode == Mode::Total {
                let verdict = evaluate_numeric(self.message_count as f64, requirement);
                let failures = u64::from(!verdict.is_passed());
                (Some(verdict), 1, failures)
            } else {
                (slot.verdict, slot.evaluations, slot.failures)
            };

            let outcome = match verdict {
                None => {
                    warn!(
                        "requirement {position} of {total} of channel '{}' FAILED - {NO_VALUES_OBSERVED}",
                        self.spec.channel_name
                    );
                    RequirementOutcome::pending(index)
                }
                Some(verdict) => {
                    let reason = match verdict {
                        Verdict::Passed => {
                            info!(
                                "requirement {position} of {total} of channel '{}' PASSED",
                                self.spec.channel_name
                            );
                            None
                        }
                        Verdict::Failed => {
                            let reason = if requirement.mode == Mode::Total {
                                format!("{} messages received", self.message_count)
                            } else if requirement.temporal_consistency {
                                FAILED_ONCE.to_string()
                            } else {
                                LAST_VALUE_FAILED.to_string()
                            };
                            warn!(
                                "requirement {position} of {total} of channel '{}' FAILED - {reason}",
                                self.spec.channel_name
                            );
                            Some(reason)
                        }
                        Verdict::Invalid(reason) => {
                            error!(
                                "requirement {position} of {total} of channel '{}' FAILED - {reason}",
                                self.spec.channel_name
                            );
                            Some(reason)
                        }
                    };

                    RequirementOutcome {
                        requirement_index: index,
                        passed: reason.is_none(),
                        reason,
                        evaluations,
                        failures,
                    }
                }
            };

            outcomes.push(outcome);
        }

        ChannelResult {
            channel_name: self.spec.channel_name,
            status: ChannelStatus::Completed,
            message_count: self.message_count,
            requirement_outcomes: outcomes,
        }
    }
}

/// Actor that assesses a single channel for the duration of one cycle
pub struct ChannelAssessorActor {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    subscribe_timeout: Duration,
    evaluation: ChannelEvaluation,
    state_tx: watch::Sender<AssessorState>,
}

enum Subscribed {
    Ready(Subscription),
    Failed(String),
    Disconnected,
}

impl ChannelAssessorActor {
    fn set_state(&self, state: AssessorState) {
        trace!("assessor state: {state:?}");
        self.state_tx.send_replace(state);
    }

    fn fail_to_start(self, reason: String) -> ChannelResult {
        error!(
            "channel '{}' failed to start: {reason}",
            self.evaluation.channel_name()
        );
        self.set_state(AssessorState::Closed);
        ChannelResult::failed_to_start(
            self.evaluation.channel_name(),
            self.evaluation.spec.requirements.len(),
            reason,
        )
    }

    /// Run the assessor until it is cancelled or its subscription ends
    #[instrument(skip(self), fields(channel = %self.evaluation.channel_name()))]
    pub async fn run(mut self) -> Result<ChannelResult, TransportError> {
        debug!("subscribing");

        let subscribed = {
            let channel = self.evaluation.channel_name().to_string();
            let subscribe = tokio::time::timeout(
                self.subscribe_timeout,
                self.transport.subscribe(&channel),
            );

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    Subscribed::Failed("cancelled before subscription completed".to_string())
                }

                result = subscribe => match result {
                    Ok(Ok(subscription)) => Subscribed::Ready(subscription),
                    Ok(Err(TransportError::Disconnected)) => Subscribed::Disconnected,
                    Ok(Err(e)) => Subscribed::Failed(format!("subscription failed: {e}")),
                    Err(_) => Subscribed::Failed(format!(
                        "subscription timed out after {:?}",
                        self.subscribe_timeout
                    )),
                },
            }
        };

        let mut subscription = match subscribed {
            Subscribed::Ready(subscription) => subscription,
            Subscribed::Failed(reason) => return Ok(self.fail_to_start(reason)),
            Subscribed::Disconnected => {
                error!(
                    "transport disconnected while subscribing to '{}'",
                    self.evaluation.channel_name()
                );
                self.set_state(AssessorState::Disconnected);
                return Err(TransportError::Disconnected);
            }
        };

        self.set_state(AssessorState::Active);
        debug!("subscribed");

        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                next = subscription.next() => match next {
                    Some(observation) => self.evaluation.observe(&observation),
                    None => {
                        warn!("subscription closed by the transport");
                        break;
                    }
                },
            }
        }

        self.set_state(AssessorState::Draining);
        while let Some(Some(observation)) = subscription.next().now_or_never() {
            self.evaluation.observe(&observation);
        }
        drop(subscription);

        self.set_state(AssessorState::Closed);
        debug!(
            "assessor closed after {} messages",
            self.evaluation.message_count()
        );

        Ok(self.evaluation.finish())
    }
}

/// Handle for a running ChannelAssessorActor
pub struct ChannelAssessorHandle {
    channel_name: String,
    requirement_count: usize,
    cancel: CancellationToken,
    state_rx: watch::Receiver<AssessorState>,
    task: JoinHandle<Result<ChannelResult, TransportError>>,
}

impl ChannelAssessorHandle {
    /// Spawn an assessor for `spec`, measuring windows from `cycle_start`
    pub fn spawn(
        spec: ChannelSpec,
        transport: Arc<dyn Transport>,
        cycle_start: DateTime<Utc>,
        subscribe_timeout: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(AssessorState::Subscribing);
        let cancel = CancellationToken::new();

        let channel_name = spec.channel_name.clone();
        let requirement_count = spec.requirements.len();

        let actor = ChannelAssessorActor {
            transport,
            cancel: cancel.clone(),
            subscribe_timeout,
            evaluation: ChannelEvaluation::new(spec, cycle_start),
            state_tx,
        };

        let task = tokio::spawn(actor.run());

        Self {
            channel_name,
            requirement_count,
            cancel,
            state_rx,
            task,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn state(&self) -> AssessorState {
        *self.state_rx.borrow()
    }

    pub fn is_disconnected(&self) -> bool {
        self.state() == AssessorState::Disconnected
    }

    /// Stop the assessor and collect its result
    ///
    /// A task that died before handing over its result is reported as aborted.
    pub async fn drain(self) -> Result<ChannelResult, TransportError> {
        self.cancel.cancel();

        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("assessor of channel '{}' was lost: {e}", self.channel_name);
                Ok(ChannelResult::aborted(
                    self.channel_name,
                    self.requirement_count,
                    format!("assessor task failed: {e}"),
                ))
            }
        }
    }
}
