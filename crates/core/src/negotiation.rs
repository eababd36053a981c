use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::amount::MinorUnits;
use crate::domain::intent::{PublishIntent, QuoteOption};
use crate::domain::request::{IntentRequest, QuoteRequest};
use crate::errors::IntentError;

/// Remote quoting and publishing service.
#[async_trait]
pub trait SolverBus: Send + Sync {
    /// An absent or empty result is a legitimate "no market" answer, not an error.
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<QuoteOption>, IntentError>;

    /// Returns the service response uninterpreted.
    async fn publish_intent(&self, intent: &PublishIntent) -> Result<Value, IntentError>;
}

#[async_trait]
impl<T> SolverBus for Arc<T>
where
    T: SolverBus + ?Sized,
{
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<QuoteOption>, IntentError> {
        (**self).quote(request).await
    }

    async fn publish_intent(&self, intent: &PublishIntent) -> Result<Value, IntentError> {
        (**self).publish_intent(intent).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Largest `amount_out`; first seen wins ties.
    MaxAmountOut,
    /// Smallest quoted `amount_in`; used when the output amount is pinned and
    /// every qualifying option delivers the same output.
    MinAmountIn,
}

impl SelectionPolicy {
    pub fn for_request(request: &IntentRequest) -> Self {
        if request.is_fixed_output() {
            Self::MinAmountIn
        } else {
            Self::MaxAmountOut
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxAmountOut => "max_amount_out",
            Self::MinAmountIn => "min_amount_in",
        }
    }

    pub fn select<'a>(self, options: &'a [QuoteOption]) -> Option<&'a QuoteOption> {
        match self {
            Self::MaxAmountOut => select_best(options),
            Self::MinAmountIn => select_cheapest(options),
        }
    }
}

/// Linear scan keeping the option with strictly greater `amount_out`.
/// Unparseable amounts rank as zero.
pub fn select_best(options: &[QuoteOption]) -> Option<&QuoteOption> {
    let rank = |option: &QuoteOption| option.amount_out_units().unwrap_or(MinorUnits::ZERO);

    let mut best: Option<&QuoteOption> = None;
    for option in options {
        match best {
            Some(current) if rank(option) <= rank(current) => {}
            _ => best = Some(option),
        }
    }
    best
}

fn select_cheapest<'a>(
    options: impl IntoIterator<Item = &'a QuoteOption>,
) -> Option<&'a QuoteOption> {
    let rank = |option: &QuoteOption| option.amount_in_units().unwrap_or(MinorUnits(u128::MAX));

    let mut best: Option<&QuoteOption> = None;
    for option in options {
        match best {
            Some(current) if rank(option) >= rank(current) => {}
            _ => best = Some(option),
        }
    }
    best
}

/// Whether `option` can honour `request`. A pinned output must be quoted
/// exactly, and a quoted input must be positive and within the offered input.
pub fn is_viable(request: &IntentRequest, option: &QuoteOption) -> bool {
    let Some(pinned) = &request.amount_out else {
        return true;
    };
    if option.amount_out_units() != Some(pinned.units) {
        return false;
    }
    match (&option.amount_in, option.amount_in_units()) {
        (None, _) => true,
        (Some(_), Some(amount_in)) => !amount_in.is_zero() && amount_in <= request.asset_in.units,
        (Some(_), None) => false,
    }
}

/// Input committed for `option`: the solver's quoted input on a pinned-output
/// request, the requested input otherwise.
pub fn committed_amount_in(request: &IntentRequest, option: &QuoteOption) -> MinorUnits {
    match (&request.amount_out, option.amount_in_units()) {
        (Some(_), Some(amount_in)) => amount_in,
        _ => request.asset_in.units,
    }
}

pub struct QuoteNegotiator<B> {
    bus: B,
}

impl<B> QuoteNegotiator<B>
where
    B: SolverBus,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub async fn fetch_options(
        &self,
        request: &IntentRequest,
    ) -> Result<Vec<QuoteOption>, IntentError> {
        let wire = request.to_wire();
        let options = self.bus.quote(&wire).await?;
        debug!(
            event_name = "negotiation.options_fetched",
            asset_in = %wire.defuse_asset_identifier_in,
            asset_out = %wire.defuse_asset_identifier_out,
            option_count = options.len(),
            "solver bus answered quote request"
        );
        Ok(options)
    }

    pub fn select<'a>(
        &self,
        request: &IntentRequest,
        options: &'a [QuoteOption],
    ) -> Option<&'a QuoteOption> {
        match SelectionPolicy::for_request(request) {
            SelectionPolicy::MaxAmountOut => select_best(options),
            SelectionPolicy::MinAmountIn => {
                select_cheapest(options.iter().filter(|option| is_viable(request, option)))
            }
        }
    }

    pub async fn publish(&self, intent: &PublishIntent) -> Result<Value, IntentError> {
        self.bus.publish_intent(intent).await
    }
}

/// Scripted solver bus for tests: answers every quote request with the same
/// options and records what gets published.
#[derive(Clone, Default)]
pub struct InMemorySolverBus {
    state: Arc<Mutex<InMemorySolverBusState>>,
}

#[derive(Default)]
struct InMemorySolverBusState {
    options: Vec<QuoteOption>,
    failure: Option<IntentError>,
    quote_requests: Vec<QuoteRequest>,
    published: Vec<PublishIntent>,
}

impl InMemorySolverBus {
    pub fn with_options(options: Vec<QuoteOption>) -> Self {
        let bus = Self::default();
        bus.with_state(|state| state.options = options);
        bus
    }

    /// Quote and publish calls both fail with `error`.
    pub fn failing(error: IntentError) -> Self {
        let bus = Self::default();
        bus.with_state(|state| state.failure = Some(error));
        bus
    }

    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.with_state(|state| state.quote_requests.clone())
    }

    pub fn published(&self) -> Vec<PublishIntent> {
        self.with_state(|state| state.published.clone())
    }

    fn with_state<R>(&self, apply: impl FnOnce(&mut InMemorySolverBusState) -> R) -> R {
        match self.state.lock() {
            Ok(mut state) => apply(&mut state),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl SolverBus for InMemorySolverBus {
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<QuoteOption>, IntentError> {
        self.with_state(|state| {
            state.quote_requests.push(request.clone());
            match &state.failure {
                Some(error) => Err(error.clone()),
                None => Ok(state.options.clone()),
            }
        })
    }

    async fn publish_intent(&self, intent: &PublishIntent) -> Result<Value, IntentError> {
        self.with_state(|state| {
            if let Some(error) = &state.failure {
                return Err(error.clone());
            }
            state.published.push(intent.clone());
            Ok(json!({
                "status": "OK",
                "intent_hash": format!("intent-{}", state.published.len()),
            }))
        })
    }
}
