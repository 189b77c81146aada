use crate::routing::{FilterDefinition, RouteDefinition};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Deserialize a `T` that implements `Default`, treating JSON `null` the same
/// as a missing field.
fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Durations in humantime form (`"5s"`, `"250ms"`).
mod humantime_duration {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| humantime::parse_duration(&text).map_err(de::Error::custom))
                .transpose()
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Statically configured routes, in registration order.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub routes: Vec<RouteDefinition>,

    /// Filters prepended to every route's own filters.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub default_filters: Vec<FilterDefinition>,

    /// Static service registry consulted by `lb://` routes.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub services: Vec<ServiceConfig>,

    #[serde(default)]
    pub http_client: HttpClientConfig,

    /// Response content types written through without buffering.
    #[serde(default = "default_streaming_media_types")]
    pub streaming_media_types: Vec<String>,

    /// In-process targets for `forward:` routes.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub local_endpoints: Vec<LocalEndpointConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            default_filters: Vec::new(),
            services: Vec::new(),
            http_client: HttpClientConfig::default(),
            streaming_media_types: default_streaming_media_types(),
            local_endpoints: Vec::new(),
        }
    }
}

pub fn default_streaming_media_types() -> Vec<String> {
    vec![
        "text/event-stream".to_string(),
        "application/stream+json".to_string(),
    ]
}

/// A logical service and its nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    /// "round_robin" (default) or "random".
    #[serde(default = "default_lb_type")]
    pub lb_type: String,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub nodes: Vec<ServiceNode>,
}

fn default_lb_type() -> String {
    "round_robin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNode {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub secure: bool,
    /// Overrides the scheme derived from `secure`.
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

/// Outbound client settings for the proxy call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_connect_timeout", with = "humantime_duration")]
    pub connect_timeout: Duration,

    /// No limit when absent.
    #[serde(default, with = "humantime_duration::option")]
    pub response_timeout: Option<Duration>,

    #[serde(default = "default_pool_idle_timeout", with = "humantime_duration")]
    pub pool_idle_timeout: Duration,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            response_timeout: None,
            pool_idle_timeout: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            tls_verify: true,
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_pool_idle_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_pool_max_idle_per_host() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// A fixed response served for `forward:` routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEndpointConfig {
    pub path: String,

    #[serde(default = "default_local_status")]
    pub status: u16,

    #[serde(default)]
    pub body: String,

    #[serde(default = "default_local_content_type")]
    pub content_type: String,
}

fn default_local_status() -> u16 {
    200
}

fn default_local_content_type() -> String {
    "text/plain".to_string()
}
