use super::{ServiceInstance, WeightedTable};
use arc_swap::ArcSwap;
use rand::Rng;
use std::sync::Arc;

/// Weighted random: uniform draw over the prefix-sum slots.
pub struct RandomBalancer {
    table: ArcSwap<WeightedTable>,
}

impl Default for RandomBalancer {
    fn default() -> Self {
        Self {
            table: ArcSwap::from_pointee(WeightedTable::empty()),
        }
    }
}

impl RandomBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_instances(&self, instances: Vec<ServiceInstance>) {
        self.table.store(Arc::new(WeightedTable::new(instances)));
    }

    pub fn do_select(&self) -> Option<ServiceInstance> {
        let table = self.table.load();
        if table.total_weight == 0 {
            return None;
        }
        let target = rand::thread_rng().gen_range(0..table.total_weight);
        Some(table.slot(target).clone())
    }

    pub fn get_instances(&self) -> Vec<ServiceInstance> {
        self.table.load().instances.clone()
    }
}
