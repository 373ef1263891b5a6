pub mod rate_limit;

pub use rate_limit::{create_token_rate_limiter, token_rate_limit_middleware, KeyedRateLimiter};
