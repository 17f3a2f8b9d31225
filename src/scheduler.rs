//! Nested periodic cadences driven from one tick
//!
//! Four tiers (1 s, 10 s, 30 s, 60 s) are checked strictly nested: a tier is
//! only considered while its parent fires in the same tick. A firing tier
//! records its parent's fresh timestamp, so every cadence stays anchored to
//! the 1 s heartbeat instead of drifting independently.

use crate::clock::elapsed_more_than;
use std::time::Duration;

/// One of the nested cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CadenceTier {
    OneSecond,
    TenSeconds,
    ThirtySeconds,
    SixtySeconds,
}

impl CadenceTier {
    /// Outermost first
    pub const ALL: [CadenceTier; 4] = [
        CadenceTier::OneSecond,
        CadenceTier::TenSeconds,
        CadenceTier::ThirtySeconds,
        CadenceTier::SixtySeconds,
    ];

    pub fn interval(&self) -> Duration {
        match self {
            CadenceTier::OneSecond => Duration::from_secs(1),
            CadenceTier::TenSeconds => Duration::from_secs(10),
            CadenceTier::ThirtySeconds => Duration::from_secs(30),
            CadenceTier::SixtySeconds => Duration::from_secs(60),
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Tiers that fired during one tick, outermost first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fired(Vec<CadenceTier>);

impl Fired {
    pub fn contains(&self, tier: CadenceTier) -> bool {
        self.0.contains(&tier)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = CadenceTier> + '_ {
        self.0.iter().copied()
    }
}

/// Last-fired bookkeeping for all tiers
#[derive(Debug, Clone)]
pub struct Scheduler {
    last_fired: [Duration; 4],
}

impl Scheduler {
    /// All tiers start counting at `now`
    pub fn new(now: Duration) -> Self {
        Self {
            last_fired: [now; 4],
        }
    }

    pub fn last_fired(&self, tier: CadenceTier) -> Duration {
        self.last_fired[tier.index()]
    }

    /// Advance to `now` and report which tiers are due
    pub fn tick(&mut self, now: Duration) -> Fired {
        let mut fired = Vec::new();
        let mut parent_stamp = now;

        for tier in CadenceTier::ALL {
            let slot = tier.index();
            if !elapsed_more_than(now, self.last_fired[slot], tier.interval()) {
                break;
            }
            self.last_fired[slot] = parent_stamp;
            parent_stamp = self.last_fired[slot];
            fired.push(tier);
        }

        Fired(fired)
    }
}
