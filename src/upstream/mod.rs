pub mod loadbalance;
pub mod transport;

pub use loadbalance::{
    reconstruct_uri, LoadBalancer, LoadBalancerClient, ServiceInstance, StaticLoadBalancerClient,
};
pub use transport::{HttpTransport, HyperTransport, ProxyRequest};
