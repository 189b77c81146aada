use super::{ServiceInstance, WeightedTable};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Weighted round-robin: a modular counter walks the prefix-sum slots.
pub struct RoundRobinBalancer {
    table: ArcSwap<WeightedTable>,
    counter: AtomicU64,
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self {
            table: ArcSwap::from_pointee(WeightedTable::empty()),
            counter: AtomicU64::new(0),
        }
    }
}

impl RoundRobinBalancer {
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
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(table.slot(count % table.total_weight).clone())
    }

    pub fn get_instances(&self) -> Vec<ServiceInstance> {
        self.table.load().instances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn inst(host: &str, weight: u32) -> ServiceInstance {
        let mut inst = ServiceInstance::new("svc", host, 80);
        inst.weight = weight;
        inst
    }

    #[test]
    fn test_weighted_cycle() {
        let lb = RoundRobinBalancer::new();
        lb.update_instances(vec![inst("A", 2), inst("B", 3)]);
        let mut counts = HashMap::new();
        for _ in 0..5000 {
            let i = lb.do_select().unwrap();
            *counts.entry(i.host.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts["A"], 2000);
        assert_eq!(counts["B"], 3000);
    }

    #[test]
    fn test_zero_weight_counts_as_one() {
        let lb = RoundRobinBalancer::new();
        lb.update_instances(vec![inst("A", 0), inst("B", 0)]);
        let first = lb.do_select().unwrap().host;
        let second = lb.do_select().unwrap().host;
        assert_ne!(first, second);
    }

    #[test]
    fn test_empty() {
        let lb = RoundRobinBalancer::new();
        assert!(lb.do_select().is_none());
        assert!(lb.get_instances().is_empty());
    }
}
