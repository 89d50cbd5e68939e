use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{Database, Iter};
use crate::{
    catalog::{admits, by_rating, Catalog, Dish},
    criteria::FilterCriteria,
};

impl Database {
    pub(crate) fn insert_dish(&self, dish: &Dish) -> Result<()> {
        Database::insert(dish.id.to_be_bytes(), dish, &self.dish_partition)
    }

    #[allow(unused)]
    pub(crate) fn dish(&self, id: u64) -> Result<Option<Dish>> {
        Database::select(id.to_be_bytes(), &self.dish_partition)
    }

    pub(crate) fn dishes(&self) -> Iter<Dish> {
        Iter::new(self.dish_partition.iter())
    }
}

#[async_trait]
impl Catalog for Database {
    async fn query_dishes(&self, criteria: &FilterCriteria) -> Result<Vec<Dish>> {
        let mut matched = Vec::new();
        for dish in self.dishes() {
            let dish = dish?;
            if admits(criteria, &dish) {
                matched.push(dish);
            }
        }
        matched.sort_by(by_rating);
        debug!(matched = matched.len(), "Catalog query");
        Ok(matched)
    }
}
