mod dish;
mod preference;
mod traffic;

use std::{marker::PhantomData, path::Path};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::info;

use crate::catalog::Dish;

pub use self::{preference::SeedPreference, traffic::SeedTraffic};

const DISH_TREE: &str = "dishes";
const PREFERENCE_TREE: &str = "preferences";
const TRAFFIC_TREE: &str = "traffic";

/// Canteen data kept in sled: dishes, stored preferences and hourly traffic.
#[derive(Clone)]
pub struct Database {
    db: Db,
    dish_partition: Tree,
    preference_partition: Tree,
    traffic_partition: Tree,
}

impl Database {
    fn connect_db(path: &Path) -> Result<Db> {
        sled::open(path).with_context(|| format!("cannot open database at {}", path.display()))
    }

    fn connect_tree(db: &Db, t_name: &str) -> Result<Tree> {
        Ok(db.open_tree(t_name)?)
    }

    pub fn connect(path: &Path) -> Result<Database> {
        let db = Database::connect_db(path)?;
        let dish_partition = Database::connect_tree(&db, DISH_TREE)?;
        let preference_partition = Database::connect_tree(&db, PREFERENCE_TREE)?;
        let traffic_partition = Database::connect_tree(&db, TRAFFIC_TREE)?;
        Ok(Database {
            db,
            dish_partition,
            preference_partition,
            traffic_partition,
        })
    }

    fn insert<K: AsRef<[u8]>, T: Serialize>(key: K, val: &T, tree: &Tree) -> Result<()> {
        tree.insert(key, bincode::serialize(val)?)?;
        Ok(())
    }

    fn select<K: AsRef<[u8]>, T: DeserializeOwned>(key: K, tree: &Tree) -> Result<Option<T>> {
        tree.get(key)?
            .map(|val| bincode::deserialize(&val).map_err(Into::into))
            .transpose()
    }

    /// Loads every record of `seed`, replacing records with the same key.
    pub fn apply_seed(&self, seed: &Seed) -> Result<()> {
        for dish in &seed.dishes {
            self.insert_dish(dish)?;
        }
        for entry in &seed.preferences {
            self.insert_preference(entry.user_id, &entry.preference)?;
        }
        for entry in &seed.traffic {
            self.insert_traffic(entry.date, entry.hour, &entry.stats())?;
        }
        self.db.flush()?;
        info!(
            dishes = seed.dishes.len(),
            preferences = seed.preferences.len(),
            traffic = seed.traffic.len(),
            "Seed applied"
        );
        Ok(())
    }
}

/// Iterator over one partition, decoding each value.
pub struct Iter<T> {
    inner: sled::Iter,
    phantom: PhantomData<T>,
}

impl<T> Iter<T> {
    fn new(inner: sled::Iter) -> Self {
        Self {
            inner,
            phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(
            item.map_err(anyhow::Error::from)
                .and_then(|(_, val)| bincode::deserialize(&val).map_err(Into::into)),
        )
    }
}

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub dishes: Vec<Dish>,
    #[serde(default)]
    pub preferences: Vec<SeedPreference>,
    #[serde(default)]
    pub traffic: Vec<SeedTraffic>,
}

impl Seed {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid seed file")
    }
}

#[cfg(test)]
pub(crate) struct TestDatabase {
    pub(crate) db: Database,
    _dir: tempfile::TempDir,
}

#[cfg(test)]
impl TestDatabase {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(&dir.path().join("db")).unwrap();
        Self { db, _dir: dir }
    }
}
