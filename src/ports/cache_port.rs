//! Read-through cache port trait.

use std::time::Duration;

use crate::domain::error::BalancerError;

/// Named blobs with a modification age. Write failures are the caller's to
/// ignore.
pub trait CachePort {
    fn load(&self, key: &str) -> Option<String>;
    fn age(&self, key: &str) -> Option<Duration>;
    fn store(&self, key: &str, content: &str) -> Result<(), BalancerError>;
}
