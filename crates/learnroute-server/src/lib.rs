//! HTTP surface for the learnroute decision engine.
//!
//! Every learner-facing endpoint turns its body into an
//! [`InteractionEvent`](learnroute_core::types::InteractionEvent), runs one
//! routing cycle and answers with the cycle's single response envelope.

pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, start_server};
pub use state::AppState;
