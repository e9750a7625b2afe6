//! Assessment lifecycle state machine
//!
//! Transitions are a pure function of the current phase and one input. The engine
//! executes the returned effects in order, which keeps the machine testable without
//! a live transport.
//!
//! ```text
//!            target present                 target absent
//!   Idle ──────────────────────► Running ──────────────────────► Ended
//!                                 │   ▲                            ▲
//!                           pause │   │ resume                     │
//!                                 ▼   │          target absent     │
//!                                 Paused ──────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::event_log::LifecycleEventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Paused,
    Ended,
}

/// Something the engine observed or was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Result of one presence poll
    Poll { target_present: bool },
    Pause,
    Resume,
    /// Stop monitoring; a running cycle is still drained and reported
    Shutdown,
    /// Begin a new cycle after `Ended`
    Reset,
}

/// Side effects the engine must perform, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RecordStartTime,
    Publish(LifecycleEventKind),
    SpawnAssessors,
    DrainAssessors,
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(phase: Phase) -> Self {
        Self {
            next: phase,
            effects: vec![],
        }
    }

    fn to(next: Phase, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

pub fn transition(phase: Phase, input: Input) -> Transition {
    use Effect::*;
    use LifecycleEventKind::*;

    match (phase, input) {
        (Phase::Idle, Input::Poll { target_present: true }) => Transition::to(
            Phase::Running,
            vec![RecordStartTime, Publish(NodeAdded), SpawnAssessors],
        ),
        (Phase::Idle, Input::Shutdown) => Transition::to(Phase::Ended, vec![]),

        (Phase::Running | Phase::Paused, Input::Poll { target_present: false }) => {
            Transition::to(
                Phase::Ended,
                vec![Publish(NodeRemoved), DrainAssessors, Report],
            )
        }
        (Phase::Running | Phase::Paused, Input::Shutdown) => {
            Transition::to(Phase::Ended, vec![DrainAssessors, Report])
        }
        (Phase::Running, Input::Pause) => {
            Transition::to(Phase::Paused, vec![Publish(AssessmentPaused)])
        }
        (Phase::Paused, Input::Resume) => {
            Transition::to(Phase::Running, vec![Publish(AssessmentResumed)])
        }

        (Phase::Ended, Input::Reset) => Transition::to(Phase::Idle, vec![]),

        (phase, _) => Transition::stay(phase),
    }
}
