//! Operator-facing HTTP surface: health, diagnostics and the
//! out-of-band node report and feed refresh entry points.

mod handlers;
mod middleware;
mod responses;
mod server;

pub use middleware::{
    ApiAuthenticator, ApiContext, ApiRateLimiter, AuthResult, RateLimitResult, RequestHeaders,
};
pub use responses::*;
pub use server::ApiServer;

#[cfg(test)]
mod tests;
