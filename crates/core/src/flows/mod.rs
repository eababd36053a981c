pub mod engine;
pub mod states;

pub use engine::{
    DepositFlow, FlowDefinition, FlowTracker, FlowTransitionError, SwapFlow, WithdrawFlow,
};
pub use states::{FlowState, TransitionOutcome};
