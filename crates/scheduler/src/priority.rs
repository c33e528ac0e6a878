use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{Rating, Tier};

/// Tier bitmask plus a sequence number for FIFO tie-breaking.
///
/// `Ord` is dispatch order: the smaller value runs first, so a higher
/// rating sorts before a lower one and, among equal ratings, the older
/// sequence sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priority {
    rating: Rating,
    sequence: u64,
}

impl Priority {
    /// A priority with no tiers set. `sequence` comes from the owning
    /// scheduler's counter.
    pub fn new(sequence: u64) -> Self {
        Self {
            rating: Rating::EMPTY,
            sequence,
        }
    }

    pub fn with_level(sequence: u64, tier: Tier) -> Self {
        let mut priority = Self::new(sequence);
        priority.add_level(tier);
        priority
    }

    pub fn add_level(&mut self, tier: Tier) {
        self.rating = Rating::from_bits(self.rating.bits() | tier.bit());
    }

    pub fn remove_level(&mut self, tier: Tier) {
        self.rating = Rating::from_bits(self.rating.bits() & !tier.bit());
    }

    pub fn has_level(&self, tier: Tier) -> bool {
        self.rating.bits() & tier.bit() != 0
    }

    /// Merge every tier of `other` into this priority. The sequence is kept.
    pub fn absorb(&mut self, other: Rating) {
        self.rating = Rating::from_bits(self.rating.bits() | other.bits());
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_at_least(&self, tier: Tier) -> bool {
        self.rating.is_at_least(tier)
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rating
            .cmp(&self.rating)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
