use thiserror::Error;

/// Phase of a single scheduling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Describes a single valid phase transition for a tick.
#[derive(Debug, Clone)]
pub struct PhaseTransition {
    pub from: TickPhase,
    pub to: TickPhase,
    pub trigger: &'static str,
}

#[derive(Error, Debug)]
#[error("invalid tick transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: TickPhase,
    pub to: TickPhase,
}

/// Guards the tick lifecycle by enforcing a finite set of valid
/// transitions. One machine per tick, starting in `Idle`; `Completed` and
/// `Aborted` are terminal.
#[derive(Debug, Clone)]
pub struct TickStateMachine {
    state: TickPhase,
    transitions: Vec<PhaseTransition>,
}

impl TickStateMachine {
    pub fn new() -> Self {
        let transitions = vec![
            PhaseTransition {
                from: TickPhase::Idle,
                to: TickPhase::Running,
                trigger: "trigger_fired",
            },
            PhaseTransition {
                from: TickPhase::Running,
                to: TickPhase::Completed,
                trigger: "batch_drained",
            },
            PhaseTransition {
                from: TickPhase::Running,
                to: TickPhase::Aborted,
                trigger: "registry_unreachable",
            },
        ];

        Self {
            state: TickPhase::Idle,
            transitions,
        }
    }

    pub fn state(&self) -> TickPhase {
        self.state
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: TickPhase, to: TickPhase) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to)
    }

    /// Attempts to move the tick to `to`. Returns an error if the
    /// transition is not permitted.
    pub fn transition(&mut self, to: TickPhase) -> Result<(), InvalidTransition> {
        if self.can_transition(self.state, to) {
            self.state = to;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}

impl Default for TickStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
