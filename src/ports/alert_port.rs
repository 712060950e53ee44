//! Alert log port trait.

use crate::domain::alert::AlertEntry;
use crate::domain::error::BalancerError;

pub trait AlertPort {
    fn append(&self, entry: &AlertEntry) -> Result<(), BalancerError>;

    /// The last `limit` parseable entries, oldest first. Unparseable lines are
    /// skipped; a missing log yields an empty list.
    fn recent(&self, limit: usize) -> Result<Vec<serde_json::Value>, BalancerError>;
}
