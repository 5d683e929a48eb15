//! Randomized collection TTL
//!
//! Every materialization draws its own TTL from a window so collections
//! written together do not expire together.

use rand::Rng;
use std::time::Duration;

use crate::{CacheError, CacheResult};

/// Default lower bound (6 hours)
pub const DEFAULT_TTL_MIN_MINUTES: u64 = 360;
/// Default upper bound (12 hours)
pub const DEFAULT_TTL_MAX_MINUTES: u64 = 720;

/// Inclusive TTL range, sampled uniformly per materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlWindow {
    min: Duration,
    max: Duration,
}

impl TtlWindow {
    pub fn from_minutes(min_minutes: u64, max_minutes: u64) -> CacheResult<Self> {
        if min_minutes == 0 {
            return Err(CacheError::InvalidTtlWindow(
                "lower bound must be at least one minute".to_string(),
            ));
        }
        if min_minutes > max_minutes {
            return Err(CacheError::InvalidTtlWindow(format!(
                "lower bound {}m exceeds upper bound {}m",
                min_minutes, max_minutes
            )));
        }

        let to_secs = |minutes: u64| {
            minutes.checked_mul(60).ok_or_else(|| {
                CacheError::InvalidTtlWindow(format!("{}m does not fit in seconds", minutes))
            })
        };

        Ok(Self {
            min: Duration::from_secs(to_secs(min_minutes)?),
            max: Duration::from_secs(to_secs(max_minutes)?),
        })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a TTL in `[min, max]` with one-second resolution.
    pub fn sample(&self) -> Duration {
        let secs = rand::thread_rng().gen_range(self.min.as_secs()..=self.max.as_secs());
        Duration::from_secs(secs)
    }

    pub fn contains(&self, ttl: Duration) -> bool {
        ttl >= self.min && ttl <= self.max
    }
}

impl Default for TtlWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(DEFAULT_TTL_MIN_MINUTES * 60),
            max: Duration::from_secs(DEFAULT_TTL_MAX_MINUTES * 60),
        }
    }
}
