use super::{Predicate, RoutePredicateFactory};
use crate::routing::binding::{parse_value, require, unknown_field, BindConfig, BindError};
use crate::routing::Route;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct WeightConfig {
    pub group: String,
    pub weight: u32,
}

impl BindConfig for WeightConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "group" => self.group = value.trim().to_string(),
            "weight" => self.weight = parse_value(value)?,
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("group", !self.group.is_empty())
    }
}

/// True iff the per-request draw for `group` picked the route under test.
pub struct WeightRoutePredicateFactory;

impl RoutePredicateFactory for WeightRoutePredicateFactory {
    type Config = WeightConfig;

    const NAME: &'static str = "Weight";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["group", "weight"]
    }

    fn apply(&self, config: WeightConfig) -> Result<Predicate, BindError> {
        Ok(Predicate::Weight {
            group: config.group,
            weight: config.weight,
        })
    }
}

#[derive(Debug)]
struct GroupRanges {
    group: String,
    route_ids: Vec<String>,
    /// Cumulative normalized upper bounds, last one is 1.0.
    upper_bounds: Vec<f64>,
}

/// Precomputed weight ranges for every `Weight` group in a route table.
#[derive(Debug, Default)]
pub struct WeightCalculator {
    groups: Vec<GroupRanges>,
}

impl WeightCalculator {
    pub fn new<'a>(routes: impl IntoIterator<Item = &'a Route>) -> Self {
        let mut weights: Vec<(String, Vec<(String, u32)>)> = Vec::new();
        for route in routes {
            for (group, weight) in route.predicate().weights() {
                let idx = match weights.iter().position(|(g, _)| g == group) {
                    Some(idx) => idx,
                    None => {
                        weights.push((group.to_string(), Vec::new()));
                        weights.len() - 1
                    }
                };
                let entries = &mut weights[idx].1;
                match entries.iter_mut().find(|(id, _)| id == route.id()) {
                    Some(entry) => entry.1 = weight,
                    None => entries.push((route.id().to_string(), weight)),
                }
            }
        }

        let groups = weights
            .into_iter()
            .filter_map(|(group, entries)| {
                let total: u64 = entries.iter().map(|(_, w)| u64::from(*w)).sum();
                if total == 0 {
                    return None;
                }
                let mut acc = 0u64;
                let mut route_ids = Vec::with_capacity(entries.len());
                let mut upper_bounds = Vec::with_capacity(entries.len());
                for (id, w) in entries {
                    acc += u64::from(w);
                    route_ids.push(id);
                    upper_bounds.push(acc as f64 / total as f64);
                }
                Some(GroupRanges {
                    group,
                    route_ids,
                    upper_bounds,
                })
            })
            .collect();

        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One random draw per group: `group → chosen route id`.
    pub fn choose(&self) -> HashMap<String, String> {
        if self.groups.is_empty() {
            return HashMap::new();
        }
        let mut rng = rand::thread_rng();
        self.choose_with(|| rng.gen::<f64>())
    }

    /// Like `choose`, drawing from `draw` (values in `[0, 1)`).
    pub fn choose_with(&self, mut draw: impl FnMut() -> f64) -> HashMap<String, String> {
        let mut chosen = HashMap::with_capacity(self.groups.len());
        for ranges in &self.groups {
            let r = draw();
            let idx = ranges
                .upper_bounds
                .iter()
                .position(|upper| r < *upper)
                .unwrap_or(ranges.upper_bounds.len() - 1);
            chosen.insert(ranges.group.clone(), ranges.route_ids[idx].clone());
        }
        chosen
    }
}
