// crates/thunder-rpc/src/middleware/mod.rs
//
// Admission stages installed in front of every handler: logging, per-client
// rate limiting and bearer-credential authentication.

pub mod auth;
pub mod logging;
pub mod rate_limit;

use std::sync::Arc;

pub use auth::AuthStage;
pub use logging::LoggingStage;
pub use rate_limit::RateLimitStage;

use crate::chain::{Interceptor, InterceptorChain};

/// Build the standard chain: logging, then rate limiting (if enabled), then
/// authentication.
pub fn admission_chain(rate_limit: Option<RateLimitStage>, auth: AuthStage) -> InterceptorChain {
    let mut stages: Vec<Arc<dyn Interceptor>> = vec![Arc::new(LoggingStage)];
    if let Some(rate_limit) = rate_limit {
        stages.push(Arc::new(rate_limit));
    }
    stages.push(Arc::new(auth));
    InterceptorChain::new(stages)
}
