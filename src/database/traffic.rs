use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::Database;
use crate::{
    context::crowd::{CrowdProvider, CrowdStats},
    criteria::CrowdLevel,
};

/// A `[[traffic]]` entry of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedTraffic {
    pub date: NaiveDate,
    pub hour: u32,
    pub level: CrowdLevel,
    pub avg_wait_minutes: u32,
}

impl SeedTraffic {
    pub(crate) fn stats(&self) -> CrowdStats {
        CrowdStats {
            level: self.level,
            avg_wait_minutes: self.avg_wait_minutes,
        }
    }
}

fn traffic_key(date: NaiveDate, hour: u32) -> String {
    format!("{}/{hour:02}", date.format("%Y-%m-%d"))
}

impl Database {
    pub(crate) fn insert_traffic(&self, date: NaiveDate, hour: u32, stats: &CrowdStats) -> Result<()> {
        Database::insert(traffic_key(date, hour), stats, &self.traffic_partition)
    }
}

#[async_trait]
impl CrowdProvider for Database {
    async fn traffic_stats(&self, date: NaiveDate, hour: u32) -> Result<Option<CrowdStats>> {
        Database::select(traffic_key(date, hour), &self.traffic_partition)
    }
}
