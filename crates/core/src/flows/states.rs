use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    Idle,
    PreconditionsChecked,
    RequestBuilt,
    OptionsFetched,
    OptionSelected,
    StorageRegistered,
    Wrapped,
    Transferred,
    QuoteSigned,
    Published,
    Done,
    Failed,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PreconditionsChecked => "PreconditionsChecked",
            Self::RequestBuilt => "RequestBuilt",
            Self::OptionsFetched => "OptionsFetched",
            Self::OptionSelected => "OptionSelected",
            Self::StorageRegistered => "StorageRegistered",
            Self::Wrapped => "Wrapped",
            Self::Transferred => "Transferred",
            Self::QuoteSigned => "QuoteSigned",
            Self::Published => "Published",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Suffix of the progress event emitted on entering this state.
    pub fn event_suffix(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PreconditionsChecked => "preconditions_checked",
            Self::RequestBuilt => "request_built",
            Self::OptionsFetched => "options_fetched",
            Self::OptionSelected => "option_selected",
            Self::StorageRegistered => "storage_registered",
            Self::Wrapped => "wrapped",
            Self::Transferred => "transferred",
            Self::QuoteSigned => "quote_signed",
            Self::Published => "published",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
}
