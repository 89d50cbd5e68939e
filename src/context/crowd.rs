use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{CrowdInfo, CrowdSource};
use crate::criteria::CrowdLevel;

/// Lunch and dinner rush.
pub const PEAK_HOURS: [u32; 6] = [11, 12, 13, 17, 18, 19];
const SHOULDER_HOURS: [u32; 7] = [7, 8, 9, 10, 14, 15, 16];

/// Recorded traffic for one hour of one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrowdStats {
    pub level: CrowdLevel,
    pub avg_wait_minutes: u32,
}

#[async_trait]
pub trait CrowdProvider: Send + Sync {
    async fn traffic_stats(&self, date: NaiveDate, hour: u32) -> Result<Option<CrowdStats>>;
}

/// Hour-of-day guess used when nothing was recorded.
pub fn estimate(hour: u32) -> CrowdStats {
    let (level, avg_wait_minutes) = if PEAK_HOURS.contains(&hour) {
        (CrowdLevel::High, 20)
    } else if SHOULDER_HOURS.contains(&hour) {
        (CrowdLevel::Medium, 15)
    } else {
        (CrowdLevel::Low, 10)
    };
    CrowdStats {
        level,
        avg_wait_minutes,
    }
}

impl CrowdInfo {
    pub(crate) fn from_stats(stats: CrowdStats, source: CrowdSource) -> Self {
        CrowdInfo {
            level: stats.level,
            avg_wait_minutes: stats.avg_wait_minutes,
            peak_hours: PEAK_HOURS.to_vec(),
            source,
        }
    }
}
