pub mod intent;
pub mod request;

pub use intent::{
    Commitment, Deadline, Intent, Nonce, PublishIntent, Quote, QuoteOption, SignedIntents,
};
pub use request::{IntentRequest, IntentRequestBuilder, QuoteRequest};
