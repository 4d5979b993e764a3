mod api;
mod bets;
mod cache;

pub use api::ApiClient;
pub use bets::BetsClient;
pub use cache::{GroupCache, PoolCache};
