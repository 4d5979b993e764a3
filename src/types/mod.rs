mod auth;
mod group;
mod notification;
mod pool;
mod primitives;
mod stats;

// Re-export all types
pub use auth::*;
pub use group::*;
pub use notification::*;
pub use pool::*;
pub use primitives::*;
pub use stats::*;
