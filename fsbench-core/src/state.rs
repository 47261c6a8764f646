// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Server lifecycle state machine with typed state transitions.
//!
//! Implements: NotStarted → Starting → Ready → ShuttingDown → Terminated,
//! with Starting → Failed and ShuttingDown → ForceKilled as the escape edges.
//! Invalid transitions result in StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// Controller created, nothing spawned yet.
    NotStarted,

    /// Process spawned, waiting for the readiness sentinel.
    Starting,

    /// Readiness sentinel observed.
    Ready,

    /// Exit sentinel written, waiting out the grace period.
    ShuttingDown,

    /// Process exited on its own after the exit request.
    Terminated,

    /// Grace period elapsed and the process was killed.
    ForceKilled,

    /// Process died (or timed out) before it became ready.
    Failed,
}

impl ServerState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Starting => "Starting",
            Self::Ready => "Ready",
            Self::ShuttingDown => "ShuttingDown",
            Self::Terminated => "Terminated",
            Self::ForceKilled => "ForceKilled",
            Self::Failed => "Failed",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: ServerState) -> bool {
        matches!(
            (self, target),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Ready)
                | (Self::Starting, Self::Failed)
                | (Self::Ready, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Terminated)
                | (Self::ShuttingDown, Self::ForceKilled)
        )
    }

    /// No transitions leave a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::ForceKilled | Self::Failed)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one server process.
/// Enforces valid state transitions and tracks timing.
#[derive(Debug)]
pub struct ServerStateMachine {
    current_state: ServerState,
    last_transition: Instant,
    transition_count: u64,
}

impl ServerStateMachine {
    /// Create a new state machine in `NotStarted`.
    pub fn new() -> Self {
        Self {
            current_state: ServerState::NotStarted,
            last_transition: Instant::now(),
            transition_count: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ServerState {
        self.current_state
    }

    /// Get total number of transitions.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Check a transition without performing it.
    pub fn check(&self, target: ServerState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        Ok(())
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: ServerState) -> Result<(), StateTransitionError> {
        self.check(target)?;

        tracing::debug!(
            from = self.current_state.name(),
            to = target.name(),
            elapsed_ms = self.last_transition.elapsed().as_millis() as u64,
            "Server state transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }
}

impl Default for ServerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = ServerStateMachine::new();
        assert_eq!(sm.state(), ServerState::NotStarted);
        assert_eq!(sm.transition_count(), 0);
    }

    #[test]
    fn test_clean_lifecycle() {
        let mut sm = ServerStateMachine::new();
        sm.transition_to(ServerState::Starting).unwrap();
        sm.transition_to(ServerState::Ready).unwrap();
        sm.transition_to(ServerState::ShuttingDown).unwrap();
        sm.transition_to(ServerState::Terminated).unwrap();
        assert_eq!(sm.state(), ServerState::Terminated);
        assert_eq!(sm.transition_count(), 4);
    }

    #[test]
    fn test_force_killed_lifecycle() {
        let mut sm = ServerStateMachine::new();
        sm.transition_to(ServerState::Starting).unwrap();
        sm.transition_to(ServerState::Ready).unwrap();
        sm.transition_to(ServerState::ShuttingDown).unwrap();
        sm.transition_to(ServerState::ForceKilled).unwrap();
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_shutdown_requires_ready() {
        let mut sm = ServerStateMachine::new();
        sm.transition_to(ServerState::Starting).unwrap();
        let err = sm.transition_to(ServerState::ShuttingDown).unwrap_err();
        assert!(matches!(err, StateTransitionError::InvalidTransition { .. }));
        assert_eq!(sm.state(), ServerState::Starting);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut sm = ServerStateMachine::new();
        sm.transition_to(ServerState::Starting).unwrap();
        sm.transition_to(ServerState::Failed).unwrap();
        let err = sm.transition_to(ServerState::Ready).unwrap_err();
        assert!(matches!(err, StateTransitionError::TerminalState { .. }));
    }
}
