//! Ancestor and identity path matching.
//!
//! Two disciplines, both driven one element event at a time with no shared
//! state between documents:
//! - [`ProximityMatcher`] decides when a harvest capture starts and ends
//! - [`IdentityMatcher`] decides when a rewrite scope is reached

pub mod identity;
pub mod proximity;

pub use identity::{IdentityMatcher, NULL_ID};
pub use proximity::{MatchState, PathPattern, ProximityMatcher, Transition};
