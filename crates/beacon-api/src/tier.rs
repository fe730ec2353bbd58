//! Signup tier classification.

use rand::Rng;

/// The fixed category set a signup lands in.
pub const TIERS: [&str; 3] = ["free", "premium", "enterprise"];

/// Strategy for classifying a signup. Pluggable so tests can substitute a
/// deterministic selector for the production random one.
pub trait TierSelector: Send + Sync {
    fn select(&self) -> &'static str;
}

/// Uniform-random choice over [`TIERS`].
pub struct UniformTierSelector;

impl TierSelector for UniformTierSelector {
    fn select(&self) -> &'static str {
        TIERS[rand::rng().random_range(0..TIERS.len())]
    }
}

/// Always returns the same tier. Intended for tests.
pub struct FixedTierSelector(pub &'static str);

impl TierSelector for FixedTierSelector {
    fn select(&self) -> &'static str {
        self.0
    }
}
