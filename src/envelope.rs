//! Expiration tracking attached to every entity an indirection returns.

use chrono::{DateTime, Utc};

/// Expiration state carried by model instances.
///
/// Termini never need to know about it: the indirection stamps an expiration
/// on anything it hands back that does not already have one.
pub trait Envelope {
    fn expiration(&self) -> Option<DateTime<Utc>>;

    fn set_expiration(&mut self, expiration: Option<DateTime<Utc>>);

    /// True iff an expiration is set and lies strictly in the past.
    fn is_expired(&self) -> bool {
        expired_at(self.expiration(), Utc::now())
    }
}

/// Expiration check against an explicit clock; exactly-now is not expired.
pub fn expired_at(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expiration, Some(at) if at < now)
}
