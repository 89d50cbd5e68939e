use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::Database;
use crate::preference::{PreferenceStore, StoredPreference};

/// A `[[preferences]]` entry of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedPreference {
    pub user_id: u64,
    #[serde(flatten)]
    pub preference: StoredPreference,
}

impl Database {
    pub(crate) fn insert_preference(&self, user_id: u64, preference: &StoredPreference) -> Result<()> {
        Database::insert(user_id.to_be_bytes(), preference, &self.preference_partition)
    }
}

#[async_trait]
impl PreferenceStore for Database {
    async fn get_preference(&self, user_id: u64) -> Result<Option<StoredPreference>> {
        Database::select(user_id.to_be_bytes(), &self.preference_partition)
    }
}
