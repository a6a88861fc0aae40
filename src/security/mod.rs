pub mod allowdeny;
pub mod filter;
pub mod rate_limiter;

pub use allowdeny::AllowDenyConfig;
pub use filter::ClientFilter;
pub use rate_limiter::RateLimiter;
