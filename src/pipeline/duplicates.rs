//! Near-duplicate broadcast detection
//!
//! Two broadcasts are compared in tiers of increasing cost: the title, then
//! the short description, then the extended description. A deeper tier only
//! runs when the shallower one already matched, and a tier with an empty side
//! passes vacuously.

use tracing::trace;

use crate::models::Rule;
use crate::utils::similarity::ratio;

/// Ratio above which two texts are considered the same
pub const SIMILARITY_THRESHOLD: f64 = 0.9;

/// The texts identifying one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Broadcast<'a> {
    pub name: &'a str,
    pub short: &'a str,
    pub extended: &'a str,
}

impl<'a> Broadcast<'a> {
    pub fn new(name: &'a str, short: &'a str, extended: &'a str) -> Self {
        Self {
            name,
            short,
            extended,
        }
    }
}

fn contains_or_similar(a: &str, b: &str) -> bool {
    b.contains(a) || ratio(a, b) > SIMILARITY_THRESHOLD
}

/// Whether `a` and `b` are the same broadcast for `rule`.
///
/// `force` engages both description tiers regardless of the rule's
/// `search_for_duplicate_description` level.
pub fn is_duplicate(rule: &Rule, a: Broadcast<'_>, b: Broadcast<'_>, force: bool) -> bool {
    if a.name.is_empty() || b.name.is_empty() {
        return false;
    }

    if !contains_or_similar(a.name, b.name) {
        return false;
    }

    let level = rule.search_for_duplicate_description;

    if (force || level >= 1) && !a.short.is_empty() && !b.short.is_empty() {
        if !contains_or_similar(a.short, b.short) {
            trace!(name = a.name, "Short descriptions differ");
            return false;
        }
    }

    if (force || level >= 2) && !a.extended.is_empty() && !b.extended.is_empty() {
        let r = ratio(a.extended, b.extended);
        trace!(name = a.name, ratio = r, "Compared extended descriptions");
        if r <= SIMILARITY_THRESHOLD {
            return false;
        }
    }

    true
}
