use serde::Serialize;
use thiserror::Error;

/// Lifecycle of the process occupying one role slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "exit_code", rename_all = "lowercase")]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Terminating,
    /// Exit code, `None` when the process was ended by a signal.
    Exited(Option<i32>),
}

impl ProcessState {
    /// A new process may be started from this state.
    pub fn accepts_start(&self) -> bool {
        matches!(self, ProcessState::Idle | ProcessState::Exited(_))
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Terminating)
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ProcessState, ProcessState),
}

#[derive(Debug)]
pub struct StateMachine {
    pub state: ProcessState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: ProcessState::Idle }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (&self.state, to),
            (Idle, Starting)
                | (Exited(_), Starting)
                | (Starting, Running)
                | (Starting, Idle)
                | (Running, Terminating)
                | (Running, Exited(_))
                | (Terminating, Exited(_))
                | (Exited(_), Idle)
        )
    }

    pub fn transition(&mut self, to: ProcessState) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::info!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state, ProcessState::Idle);
        assert!(sm.transition(ProcessState::Starting).is_ok());
        assert!(sm.transition(ProcessState::Running).is_ok());
        assert!(sm.transition(ProcessState::Terminating).is_ok());
        assert!(sm.transition(ProcessState::Exited(Some(0))).is_ok());
        assert!(sm.transition(ProcessState::Starting).is_ok());
        assert!(sm.transition(ProcessState::Running).is_ok());
        assert!(sm.transition(ProcessState::Exited(None)).is_ok());
        assert!(sm.transition(ProcessState::Idle).is_ok());
    }

    #[test]
    fn cannot_start_while_alive() {
        let mut sm = StateMachine::new();
        sm.transition(ProcessState::Starting).unwrap();
        sm.transition(ProcessState::Running).unwrap();
        assert!(!sm.state.accepts_start());
        assert!(sm.transition(ProcessState::Starting).is_err());
        sm.transition(ProcessState::Terminating).unwrap();
        assert!(sm.transition(ProcessState::Starting).is_err());
        assert_eq!(sm.state, ProcessState::Terminating);
    }

    #[test]
    fn invalid_transition() {
        let mut sm = StateMachine::new();
        // Idle cannot jump straight to Running
        assert!(sm.transition(ProcessState::Running).is_err());
        assert!(sm.transition(ProcessState::Exited(Some(1))).is_err());
    }
}
