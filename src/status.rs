use std::fmt::Display;

use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Queued,
    Resolving,
    Fetching,
    Saving,
    Ok,
    Error,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Queued => "queued",
            Phase::Resolving => "resolving",
            Phase::Fetching => "fetching",
            Phase::Saving => "saving",
            Phase::Ok => "ok",
            Phase::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub key: String,
    pub phase: Phase,
    pub detail: String,
}

impl StatusEvent {
    pub fn new(key: impl Into<String>, phase: Phase, detail: impl Into<String>) -> Self {
        StatusEvent {
            key: key.into(),
            phase,
            detail: detail.into(),
        }
    }
}

/// Receives progress of every dependency being synchronized.
///
/// Reporters only render; nothing they do feeds back into synchronization.
pub trait StatusReporter: Send + Sync {
    fn report(&self, event: StatusEvent);
}

/// Renders status events as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, event: StatusEvent) {
        let StatusEvent { key, phase, detail } = event;
        match phase {
            Phase::Queued | Phase::Resolving => debug!("[{phase}] {key} {detail}"),
            Phase::Fetching | Phase::Saving | Phase::Ok => info!("[{phase}] {key} {detail}"),
            Phase::Error => warn!("[{phase}] {key} {detail}"),
        }
    }
}
