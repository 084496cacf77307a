use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// High-level lifecycle of a live quiz event. Transitions only move forward;
/// [`EventPhase::Completed`] is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    /// The event exists but its start time has not arrived yet.
    Scheduled,
    /// The event is live and cycling through its questions.
    Active(ActivePhase),
    /// The event has ended; winner and scores are frozen.
    Completed,
}

/// Question sub-phase while an event is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePhase {
    /// The event just started or sits in the delay window between questions.
    Idle,
    /// A question is on screen and accepting answers.
    QuestionShowing {
        /// Position of the question inside the quiz.
        index: usize,
    },
    /// The question was closed and its answer revealed.
    QuestionEnded {
        /// Position of the question that just ended.
        index: usize,
    },
}

/// Why an event moved to [`EventPhase::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The scheduled end time arrived while questions remained.
    WindowElapsed,
    /// Every question was played before the end time.
    QuestionsExhausted,
    /// Startup reconciliation closed an event whose window elapsed offline.
    Reconciled,
}

/// Transitions that can be applied to an event's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTransition {
    /// The start timer fired; the event goes live.
    Activate,
    /// Show the question at `index` and open the answer window.
    BeginQuestion {
        /// Question position to show next.
        index: usize,
    },
    /// Close the question at `index`, either on timeout or early termination.
    EndQuestion {
        /// Question position being closed. Must match the showing index.
        index: usize,
    },
    /// Terminate the event.
    Complete(CompletionReason),
}

/// Error returned when a transition is not legal from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {transition:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the machine was in when the transition was requested.
    pub from: EventPhase,
    /// The rejected transition.
    pub transition: EventTransition,
}

/// Errors raised while planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Another transition is pending and must be applied or aborted first.
    AlreadyPending,
    /// The transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors raised while applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently planned.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Plan ID the machine is waiting for.
        expected: PlanId,
        /// Plan ID that was provided.
        got: PlanId,
    },
    /// The phase changed between plan and apply.
    PhaseMismatch {
        /// Phase recorded when the plan was created.
        expected: EventPhase,
        /// Phase the machine is actually in.
        actual: EventPhase,
    },
    /// The version advanced between plan and apply.
    VersionMismatch {
        /// Version the plan expected to install.
        expected: usize,
        /// Version the machine would install instead.
        actual: usize,
    },
}

/// Errors raised while aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently planned.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Plan ID the machine is waiting for.
        expected: PlanId,
        /// Plan ID that was provided.
        got: PlanId,
    },
}

/// Unique identifier of a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet. The driver performs
/// its write-through persistence between `plan` and `apply`, so a failed
/// write leaves the machine untouched.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Identifier to present when applying or aborting.
    pub id: PlanId,
    /// Phase before the transition.
    pub from: EventPhase,
    /// Phase after the transition.
    pub to: EventPhase,
    /// The transition being performed.
    pub transition: EventTransition,
    /// Version the machine will carry once the plan is applied.
    pub version_next: usize,
    /// When the plan was created.
    pub pending_since: Instant,
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: EventPhase,
    /// Transition counter; increments on every applied transition.
    pub version: usize,
    /// Target phase of the pending plan, if any.
    pub pending: Option<EventPhase>,
}

/// Per-event state machine enforcing the forward-only quiz lifecycle.
///
/// Callers plan a transition, perform the matching database write, then apply
/// it; the version check means a transition computed against stale state can
/// never be installed, which is the concurrency discipline the whole session
/// driver relies on.
#[derive(Debug, Clone)]
pub struct EventStateMachine {
    phase: EventPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for EventStateMachine {
    fn default() -> Self {
        Self {
            phase: EventPhase::Scheduled,
            version: 0,
            pending: None,
        }
    }
}

impl EventStateMachine {
    /// Create a machine for a freshly scheduled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a machine already in the given phase, used when resuming a
    /// persisted event after a restart.
    pub fn resumed(phase: EventPhase) -> Self {
        Self {
            phase,
            version: 0,
            pending: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    /// Index of the question currently showing, if any.
    pub fn showing_index(&self) -> Option<usize> {
        match self.phase {
            EventPhase::Active(ActivePhase::QuestionShowing { index }) => Some(index),
            _ => None,
        }
    }

    /// Snapshot of phase, version, and pending target.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate the transition against the current phase and stash it as the
    /// pending plan.
    pub fn plan(&mut self, transition: EventTransition) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(transition)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            transition,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Install the pending plan, returning the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<EventPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;

        Ok(self.phase)
    }

    /// Discard the pending plan without changing phase.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(
        &self,
        transition: EventTransition,
    ) -> Result<EventPhase, InvalidTransition> {
        use ActivePhase::*;
        use EventPhase::*;

        let next = match (self.phase, transition) {
            (Scheduled, EventTransition::Activate) => Active(Idle),
            (Active(Idle), EventTransition::BeginQuestion { index }) => {
                Active(QuestionShowing { index })
            }
            (Active(QuestionEnded { index: prev }), EventTransition::BeginQuestion { index })
                if index == prev + 1 =>
            {
                Active(QuestionShowing { index })
            }
            (Active(QuestionShowing { index: showing }), EventTransition::EndQuestion { index })
                if index == showing =>
            {
                Active(QuestionEnded { index })
            }
            (Active(_), EventTransition::Complete(_)) => Completed,
            // Reconciliation may close an event that never went live.
            (Scheduled, EventTransition::Complete(_)) => Completed,
            (from, transition) => return Err(InvalidTransition { from, transition }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut EventStateMachine, transition: EventTransition) -> EventPhase {
        let plan = sm.plan(transition).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_phase_is_scheduled() {
        let sm = EventStateMachine::new();
        assert_eq!(sm.phase(), EventPhase::Scheduled);
    }

    #[test]
    fn full_happy_path_through_event() {
        let mut sm = EventStateMachine::new();

        assert_eq!(
            apply(&mut sm, EventTransition::Activate),
            EventPhase::Active(ActivePhase::Idle)
        );
        assert_eq!(
            apply(&mut sm, EventTransition::BeginQuestion { index: 0 }),
            EventPhase::Active(ActivePhase::QuestionShowing { index: 0 })
        );
        assert_eq!(
            apply(&mut sm, EventTransition::EndQuestion { index: 0 }),
            EventPhase::Active(ActivePhase::QuestionEnded { index: 0 })
        );
        assert_eq!(
            apply(&mut sm, EventTransition::BeginQuestion { index: 1 }),
            EventPhase::Active(ActivePhase::QuestionShowing { index: 1 })
        );
        assert_eq!(
            apply(&mut sm, EventTransition::EndQuestion { index: 1 }),
            EventPhase::Active(ActivePhase::QuestionEnded { index: 1 })
        );
        assert_eq!(
            apply(
                &mut sm,
                EventTransition::Complete(CompletionReason::QuestionsExhausted)
            ),
            EventPhase::Completed
        );
    }

    #[test]
    fn completed_is_terminal() {
        let mut sm = EventStateMachine::new();
        apply(&mut sm, EventTransition::Activate);
        apply(
            &mut sm,
            EventTransition::Complete(CompletionReason::WindowElapsed),
        );

        for transition in [
            EventTransition::Activate,
            EventTransition::BeginQuestion { index: 0 },
            EventTransition::EndQuestion { index: 0 },
            EventTransition::Complete(CompletionReason::WindowElapsed),
        ] {
            assert!(matches!(
                sm.plan(transition),
                Err(PlanError::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn end_question_requires_matching_index() {
        let mut sm = EventStateMachine::new();
        apply(&mut sm, EventTransition::Activate);
        apply(&mut sm, EventTransition::BeginQuestion { index: 0 });

        // A stale timer for another question must not close the current one.
        let err = sm
            .plan(EventTransition::EndQuestion { index: 3 })
            .unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(
                    invalid.from,
                    EventPhase::Active(ActivePhase::QuestionShowing { index: 0 })
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn questions_advance_strictly_sequentially() {
        let mut sm = EventStateMachine::new();
        apply(&mut sm, EventTransition::Activate);
        apply(&mut sm, EventTransition::BeginQuestion { index: 0 });
        apply(&mut sm, EventTransition::EndQuestion { index: 0 });

        // Skipping ahead is rejected.
        assert!(matches!(
            sm.plan(EventTransition::BeginQuestion { index: 2 }),
            Err(PlanError::InvalidTransition(_))
        ));
        // Re-showing the same question without an intervening end is rejected.
        assert!(matches!(
            sm.plan(EventTransition::BeginQuestion { index: 0 }),
            Err(PlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn reconciliation_may_complete_a_scheduled_event() {
        let mut sm = EventStateMachine::new();
        assert_eq!(
            apply(
                &mut sm,
                EventTransition::Complete(CompletionReason::Reconciled)
            ),
            EventPhase::Completed
        );
    }

    #[test]
    fn plan_then_abort_leaves_phase_unchanged() {
        let mut sm = EventStateMachine::new();
        let plan = sm.plan(EventTransition::Activate).unwrap();
        sm.abort(plan.id).unwrap();
        assert_eq!(sm.phase(), EventPhase::Scheduled);
        assert_eq!(sm.snapshot().pending, None);
    }

    #[test]
    fn second_plan_rejected_while_pending() {
        let mut sm = EventStateMachine::new();
        let _plan = sm.plan(EventTransition::Activate).unwrap();
        assert!(matches!(
            sm.plan(EventTransition::Activate),
            Err(PlanError::AlreadyPending)
        ));
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan_pending() {
        let mut sm = EventStateMachine::new();
        let plan = sm.plan(EventTransition::Activate).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        // The original plan still applies cleanly afterwards.
        assert_eq!(
            sm.apply(plan.id).unwrap(),
            EventPhase::Active(ActivePhase::Idle)
        );
    }
}
