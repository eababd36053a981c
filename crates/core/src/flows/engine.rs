use thiserror::Error;

use crate::errors::IntentError;
use crate::flows::states::{FlowState, TransitionOutcome};
use crate::progress::{Operation, ProgressEvent, ProgressOutcome, ProgressSink};

/// A linear flow: each state may only advance to its successor on the path,
/// or drop to `Failed`. `Done` and `Failed` accept nothing.
pub trait FlowDefinition {
    fn operation(&self) -> Operation;
    fn path(&self) -> &'static [FlowState];

    fn transition(
        &self,
        current: FlowState,
        next: FlowState,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        if current.is_terminal() {
            return Err(FlowTransitionError::Terminal { state: current, attempted: next });
        }
        if next == FlowState::Failed {
            return Ok(TransitionOutcome { from: current, to: next });
        }

        let path = self.path();
        let successor = path
            .iter()
            .position(|state| *state == current)
            .and_then(|index| path.get(index + 1))
            .copied();
        match successor {
            Some(expected) if expected == next => Ok(TransitionOutcome { from: current, to: next }),
            _ => Err(FlowTransitionError::OutOfOrder { from: current, to: next }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SwapFlow;

impl FlowDefinition for SwapFlow {
    fn operation(&self) -> Operation {
        Operation::Swap
    }

    fn path(&self) -> &'static [FlowState] {
        use FlowState::*;
        &[
            Idle,
            PreconditionsChecked,
            RequestBuilt,
            OptionsFetched,
            OptionSelected,
            QuoteSigned,
            Published,
            Done,
        ]
    }
}

/// Native deposits wrap before transferring; fungible tokens transfer directly.
#[derive(Clone, Copy, Debug)]
pub struct DepositFlow {
    pub native: bool,
}

impl FlowDefinition for DepositFlow {
    fn operation(&self) -> Operation {
        Operation::Deposit
    }

    fn path(&self) -> &'static [FlowState] {
        use FlowState::*;
        if self.native {
            &[Idle, PreconditionsChecked, StorageRegistered, Wrapped, Transferred, Done]
        } else {
            &[Idle, PreconditionsChecked, StorageRegistered, Transferred, Done]
        }
    }
}

/// No negotiation: the withdrawal intent is signed directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct WithdrawFlow;

impl FlowDefinition for WithdrawFlow {
    fn operation(&self) -> Operation {
        Operation::Withdraw
    }

    fn path(&self) -> &'static [FlowState] {
        use FlowState::*;
        &[Idle, PreconditionsChecked, QuoteSigned, Published, Done]
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("flow already finished in {state:?}; cannot move to {attempted:?}")]
    Terminal { state: FlowState, attempted: FlowState },
    #[error("invalid transition from {from:?} to {to:?}")]
    OutOfOrder { from: FlowState, to: FlowState },
}

/// Holds the current state of one invocation and reports every transition.
pub struct FlowTracker<'s, F> {
    flow: F,
    state: FlowState,
    correlation_id: String,
    sink: &'s dyn ProgressSink,
}

impl<'s, F> FlowTracker<'s, F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F, correlation_id: impl Into<String>, sink: &'s dyn ProgressSink) -> Self {
        Self { flow, state: FlowState::Idle, correlation_id: correlation_id.into(), sink }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn advance(&mut self, next: FlowState) -> Result<TransitionOutcome, IntentError> {
        self.advance_with(next, |event| event)
    }

    /// Applies the transition and emits one event, decorated by `decorate`.
    pub fn advance_with(
        &mut self,
        next: FlowState,
        decorate: impl FnOnce(ProgressEvent) -> ProgressEvent,
    ) -> Result<TransitionOutcome, IntentError> {
        let outcome = self.flow.transition(self.state, next)?;
        self.state = outcome.to;
        self.sink.emit(decorate(self.event(outcome, ProgressOutcome::Success)));
        Ok(outcome)
    }

    /// Moves to `Failed` and hands the error back for propagation.
    pub fn fail(&mut self, error: IntentError) -> IntentError {
        self.terminate(&error, ProgressOutcome::Failed);
        error
    }

    /// Like [`Self::fail`] but reported as an expected "no market" outcome.
    pub fn unavailable(&mut self, error: &IntentError) {
        self.terminate(error, ProgressOutcome::Unavailable);
    }

    fn terminate(&mut self, error: &IntentError, outcome: ProgressOutcome) {
        let failed_at = self.state;
        match self.flow.transition(self.state, FlowState::Failed) {
            Ok(transition) => {
                self.state = transition.to;
                self.sink.emit(
                    self.event(transition, outcome)
                        .with_metadata("failed_at", failed_at.as_str())
                        .with_metadata("error_kind", error.kind())
                        .with_metadata("error", error.to_string()),
                );
            }
            Err(rejected) => {
                tracing::warn!(
                    event_name = "flow.transition_rejected",
                    correlation_id = %self.correlation_id,
                    error = %rejected,
                    "failure reported after the flow had finished"
                );
            }
        }
    }

    fn event(&self, transition: TransitionOutcome, outcome: ProgressOutcome) -> ProgressEvent {
        let operation = self.flow.operation();
        ProgressEvent::new(
            self.correlation_id.clone(),
            operation,
            format!("{}.{}", operation.as_str(), transition.to.event_suffix()),
            transition.to.as_str(),
            outcome,
        )
        .with_metadata("from", transition.from.as_str())
    }
}
