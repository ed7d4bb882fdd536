//! Pure state machine for the session lifecycle.
//!
//! `(State, Event) -> (NewState, Vec<SideEffect>)`, with `Idle -> Active ->
//! Finalizing -> Idle` as the only path through a session. Invalid transitions
//! return the current state with empty effects; the state machine itself never
//! performs I/O.

use std::time::Instant;

use serde::Serialize;

/// How compressed frames are kept while a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionMode {
    /// Every frame goes straight into one output file.
    Continuous,
    /// Only the newest frames are kept in memory until a snapshot is taken.
    Rolling,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecorderState {
    /// No session, ready to start.
    #[default]
    Idle,

    /// Capturing frames.
    Active {
        mode: SessionMode,
        started_at: Instant,
    },

    /// Stop requested; the worker is being joined and the output closed.
    Finalizing {
        mode: SessionMode,
        started_at: Instant,
        stop_requested_at: Instant,
    },
}

impl RecorderState {
    /// Returns true between a successful start and the end of finalization.
    pub fn is_active(&self) -> bool {
        !matches!(self, RecorderState::Idle)
    }

    pub fn mode(&self) -> Option<SessionMode> {
        match self {
            RecorderState::Idle => None,
            RecorderState::Active { mode, .. } | RecorderState::Finalizing { mode, .. } => {
                Some(*mode)
            }
        }
    }

    pub fn elapsed(&self) -> Option<std::time::Duration> {
        match self {
            RecorderState::Idle => None,
            RecorderState::Active { started_at, .. }
            | RecorderState::Finalizing { started_at, .. } => Some(started_at.elapsed()),
        }
    }

    /// Short lowercase name, used in logs and status reports.
    pub fn name(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Active { .. } => "active",
            RecorderState::Finalizing { .. } => "finalizing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    StartRequested { mode: SessionMode },

    /// Opening the output or spawning the worker failed.
    StartFailed,

    StopRequested,

    /// The output has been closed, successfully or not.
    Finalized,
}

/// Side effects triggered by state transitions, executed by the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Open the output (file or ring) and spawn the encoding worker.
    OpenSession { mode: SessionMode },

    /// Raise the worker's stop flag and join it.
    SignalStop,

    /// Write out frames already encoded and close the output.
    FinalizeOutput,

    /// Drop pooled, in-flight and queued buffers.
    ReleaseResources,
}

pub fn transition(state: RecorderState, event: RecorderEvent) -> (RecorderState, Vec<SideEffect>) {
    match (&state, event) {
        // Idle + StartRequested -> Active
        (RecorderState::Idle, RecorderEvent::StartRequested { mode }) => {
            let new_state = RecorderState::Active {
                mode,
                started_at: Instant::now(),
            };
            (new_state, vec![SideEffect::OpenSession { mode }])
        }

        // Active + StartFailed -> Idle
        (RecorderState::Active { .. }, RecorderEvent::StartFailed) => {
            (RecorderState::Idle, vec![SideEffect::ReleaseResources])
        }

        // Active + StopRequested -> Finalizing
        (RecorderState::Active { mode, started_at }, RecorderEvent::StopRequested) => {
            let new_state = RecorderState::Finalizing {
                mode: *mode,
                started_at: *started_at,
                stop_requested_at: Instant::now(),
            };
            (new_state, vec![SideEffect::SignalStop, SideEffect::FinalizeOutput])
        }

        // Finalizing + Finalized -> Idle
        (RecorderState::Finalizing { .. }, RecorderEvent::Finalized) => {
            (RecorderState::Idle, vec![SideEffect::ReleaseResources])
        }

        // Invalid transition: return current state with no effects
        _ => (state, vec![]),
    }
}
