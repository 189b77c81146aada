pub mod random;
pub mod round_robin;

use crate::config::{ServiceConfig, ServiceNode};
use crate::error::GatewayError;
use dashmap::DashMap;
use http::Uri;
use random::RandomBalancer;
use round_robin::RoundRobinBalancer;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A concrete network endpoint for a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service_id: String,
    pub host: String,
    pub port: u16,
    pub weight: u32,
    pub secure: bool,
    /// Explicit scheme; when absent, derived from `secure`.
    pub scheme: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(service_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service_id: service_id.into(),
            host: host.into(),
            port,
            weight: 1,
            secure: false,
            scheme: None,
            metadata: HashMap::new(),
        }
    }

    pub fn from_node(service_id: &str, node: &ServiceNode) -> Self {
        Self {
            service_id: service_id.to_string(),
            host: node.host.clone(),
            port: node.port,
            weight: node.weight,
            secure: node.secure,
            scheme: node.scheme.clone(),
            metadata: node.metadata.clone(),
        }
    }

    /// Same instance, falling back to `scheme` when it reports none of its own.
    pub fn with_override_scheme(mut self, scheme: Option<&str>) -> Self {
        if self.scheme.is_none() {
            self.scheme = scheme.map(str::to_string);
        }
        self
    }

    pub fn scheme(&self) -> &str {
        match &self.scheme {
            Some(s) => s,
            None if self.secure => "https",
            None => "http",
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Rebuilds `original` against `instance`: its scheme and authority, the
/// original path and query.
pub fn reconstruct_uri(instance: &ServiceInstance, original: &Uri) -> Result<Uri, GatewayError> {
    let pq = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = format!("{}://{}{}", instance.scheme(), instance.authority(), pq);
    uri.parse()
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid instance uri '{}': {}", uri, e)))
}

/// Chooses a service instance and rebuilds request URIs against it.
pub trait LoadBalancerClient: Send + Sync {
    fn choose(&self, service_id: &str) -> Option<ServiceInstance>;

    fn reconstruct_uri(
        &self,
        instance: &ServiceInstance,
        original: &Uri,
    ) -> Result<Uri, GatewayError> {
        reconstruct_uri(instance, original)
    }
}

/// Prefix-sum table shared by the weighted balancers.
struct WeightedTable {
    instances: Vec<ServiceInstance>,
    prefix_sum: Vec<u64>,
    total_weight: u64,
}

impl WeightedTable {
    fn new(instances: Vec<ServiceInstance>) -> Self {
        let mut prefix_sum = Vec::with_capacity(instances.len());
        let mut sum: u64 = 0;
        for inst in &instances {
            sum += inst.weight.max(1) as u64;
            prefix_sum.push(sum);
        }
        Self {
            instances,
            prefix_sum,
            total_weight: sum,
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Instance owning slot `target` in `0..total_weight`.
    fn slot(&self, target: u64) -> &ServiceInstance {
        let idx = self.prefix_sum.partition_point(|&s| s <= target);
        &self.instances[idx]
    }
}

pub enum LoadBalancer {
    RoundRobin(RoundRobinBalancer),
    Random(RandomBalancer),
}

impl LoadBalancer {
    pub fn new(lb_type: &str) -> Arc<Self> {
        match lb_type {
            "random" | "weighted_random" => Arc::new(Self::Random(RandomBalancer::new())),
            _ => Arc::new(Self::RoundRobin(RoundRobinBalancer::new())),
        }
    }

    pub fn update_instances(&self, instances: Vec<ServiceInstance>) {
        match self {
            Self::RoundRobin(lb) => lb.update_instances(instances),
            Self::Random(lb) => lb.update_instances(instances),
        }
    }

    pub fn select(&self) -> Option<ServiceInstance> {
        match self {
            Self::RoundRobin(lb) => lb.do_select(),
            Self::Random(lb) => lb.do_select(),
        }
    }

    pub fn get_instances(&self) -> Vec<ServiceInstance> {
        match self {
            Self::RoundRobin(lb) => lb.get_instances(),
            Self::Random(lb) => lb.get_instances(),
        }
    }
}

/// Load balancer client over a statically configured service registry.
#[derive(Default)]
pub struct StaticLoadBalancerClient {
    services: DashMap<String, Arc<LoadBalancer>>,
}

impl StaticLoadBalancerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let client = Self::new();
        for service in services {
            client.update_service(service);
        }
        client
    }

    /// Installs or replaces the balancer for one service.
    pub fn update_service(&self, service: &ServiceConfig) {
        let lb = LoadBalancer::new(&service.lb_type);
        lb.update_instances(
            service
                .nodes
                .iter()
                .map(|node| ServiceInstance::from_node(&service.name, node))
                .collect(),
        );
        info!(
            "lb: service updated, name={}, nodes={}, lb_type={}",
            service.name,
            service.nodes.len(),
            service.lb_type
        );
        self.services.insert(service.name.clone(), lb);
    }

    pub fn remove_service(&self, name: &str) -> bool {
        self.services.remove(name).is_some()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl LoadBalancerClient for StaticLoadBalancerClient {
    fn choose(&self, service_id: &str) -> Option<ServiceInstance> {
        let lb = self.services.get(service_id)?.value().clone();
        lb.select()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, lb_type: &str, hosts: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            lb_type: lb_type.to_string(),
            nodes: hosts
                .iter()
                .map(|h| ServiceNode {
                    host: h.to_string(),
                    port: 8080,
                    weight: 1,
                    secure: false,
                    scheme: None,
                    metadata: HashMap::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn scheme_defaults_follow_secure_flag() {
        let mut inst = ServiceInstance::new("svc", "10.0.0.1", 80);
        assert_eq!(inst.scheme(), "http");
        inst.secure = true;
        assert_eq!(inst.scheme(), "https");
        let inst = inst.with_override_scheme(Some("http"));
        assert_eq!(inst.scheme(), "http");
    }

    #[test]
    fn override_never_replaces_explicit_scheme() {
        let mut inst = ServiceInstance::new("svc", "h", 1);
        inst.scheme = Some("https".into());
        assert_eq!(inst.clone().with_override_scheme(None).scheme(), "https");
        assert_eq!(inst.with_override_scheme(Some("http")).scheme(), "https");
    }

    #[test]
    fn reconstruct_keeps_path_and_query() {
        let inst = ServiceInstance::new("users", "10.0.0.7", 9000);
        let original: Uri = "http://gw/api/users?page=2".parse().unwrap();
        let uri = reconstruct_uri(&inst, &original).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.7:9000/api/users?page=2");
    }

    #[test]
    fn reconstruct_brackets_ipv6() {
        let inst = ServiceInstance::new("users", "::1", 9000);
        let original: Uri = "http://gw/".parse().unwrap();
        let uri = reconstruct_uri(&inst, &original).unwrap();
        assert_eq!(uri.authority().unwrap().as_str(), "[::1]:9000");
    }

    #[test]
    fn static_client_chooses_from_registered_services() {
        let client = StaticLoadBalancerClient::from_config(&[
            service("users", "round_robin", &["10.0.0.1", "10.0.0.2"]),
            service("orders", "random", &["10.0.1.1"]),
        ]);
        let a = client.choose("users").unwrap();
        let b = client.choose("users").unwrap();
        assert_ne!(a.host, b.host);
        assert_eq!(a.service_id, "users");
        assert_eq!(client.choose("orders").unwrap().host, "10.0.1.1");
        assert!(client.choose("missing").is_none());
        assert_eq!(client.service_names(), vec!["orders", "users"]);
    }

    #[test]
    fn empty_service_has_no_instance() {
        let client = StaticLoadBalancerClient::from_config(&[service("users", "round_robin", &[])]);
        assert!(client.choose("users").is_none());
    }

    #[test]
    fn remove_service() {
        let client = StaticLoadBalancerClient::from_config(&[service("users", "random", &["h"])]);
        assert!(client.remove_service("users"));
        assert!(client.choose("users").is_none());
    }

    #[test]
    fn lb_type_selects_balancer() {
        assert!(matches!(*LoadBalancer::new("random"), LoadBalancer::Random(_)));
        assert!(matches!(*LoadBalancer::new("weighted_random"), LoadBalancer::Random(_)));
        assert!(matches!(*LoadBalancer::new("round_robin"), LoadBalancer::RoundRobin(_)));
        assert!(matches!(*LoadBalancer::new("anything"), LoadBalancer::RoundRobin(_)));
    }
}
