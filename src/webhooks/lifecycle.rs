//! Listener lifecycle as an explicit transition table.
//!
//! `Created → Listening → ShuttingDown → Stopped`, with a transport failure
//! while listening going straight to `Stopped`. No state is re-enterable.

use std::fmt;

/// Lifecycle phase of a webhook server
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerPhase {
    /// Configured, not yet bound
    Created,
    /// Accepting connections
    Listening,
    /// No longer accepting; in-flight requests draining
    ShuttingDown,
    /// Terminal
    Stopped,
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerPhase::Created => write!(f, "Created"),
            ServerPhase::Listening => write!(f, "Listening"),
            ServerPhase::ShuttingDown => write!(f, "ShuttingDown"),
            ServerPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Events that move the server between phases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    /// The listener is bound
    Bound,
    /// Shutdown was requested by a signal or the caller
    ShutdownRequested,
    /// All in-flight requests finished
    Drained,
    /// The listener failed while serving
    TransportFailed,
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEvent::Bound => write!(f, "Bound"),
            ServerEvent::ShutdownRequested => write!(f, "ShutdownRequested"),
            ServerEvent::Drained => write!(f, "Drained"),
            ServerEvent::TransportFailed => write!(f, "TransportFailed"),
        }
    }
}

#[derive(Debug)]
struct Transition {
    from: ServerPhase,
    to: ServerPhase,
    event: ServerEvent,
    description: &'static str,
}

impl Transition {
    const fn new(
        from: ServerPhase,
        to: ServerPhase,
        event: ServerEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

const TRANSITIONS: [Transition; 5] = [
    Transition::new(
        ServerPhase::Created,
        ServerPhase::Listening,
        ServerEvent::Bound,
        "Listener bound, accepting admission requests",
    ),
    Transition::new(
        ServerPhase::Listening,
        ServerPhase::ShuttingDown,
        ServerEvent::ShutdownRequested,
        "Stopped accepting, draining in-flight requests",
    ),
    Transition::new(
        ServerPhase::Listening,
        ServerPhase::Stopped,
        ServerEvent::TransportFailed,
        "Listener failed",
    ),
    Transition::new(
        ServerPhase::ShuttingDown,
        ServerPhase::Stopped,
        ServerEvent::Drained,
        "All in-flight requests completed",
    ),
    Transition::new(
        ServerPhase::ShuttingDown,
        ServerPhase::Stopped,
        ServerEvent::TransportFailed,
        "Listener failed while draining",
    ),
];

/// Outcome of applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: ServerPhase,
        to: ServerPhase,
        description: &'static str,
    },
    InvalidTransition {
        current: ServerPhase,
        event: ServerEvent,
    },
}

/// Look up the phase that `event` leads to from `current`.
pub fn transition(current: ServerPhase, event: ServerEvent) -> TransitionResult {
    match TRANSITIONS
        .iter()
        .find(|t| t.from == current && t.event == event)
    {
        Some(t) => TransitionResult::Success {
            from: t.from,
            to: t.to,
            description: t.description,
        },
        None => TransitionResult::InvalidTransition { current, event },
    }
}

/// Events accepted in `phase`
pub fn valid_events(phase: ServerPhase) -> Vec<ServerEvent> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == phase)
        .map(|t| t.event)
        .collect()
}
