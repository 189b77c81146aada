pub mod types;


pub use types::*;

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides for infrastructure settings. A missing file yields
    /// the built-in defaults: no routes, every request answers 404.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            GatewayConfig::default()
        };

        config.apply_env_overrides();

        config.validate()?;
        tracing::info!(
            routes = config.routes.len(),
            default_filters = config.default_filters.len(),
            services = config.services.len(),
            "loaded gateway configuration"
        );
        Ok(config)
    }

    /// Environment overrides cover the outbound client and streaming knobs.
    /// Routes and services come from the file or the admin API only.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `HERMES_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(d) = lookup_duration(&lookup, "HERMES_HTTP_CONNECT_TIMEOUT") {
            self.http_client.connect_timeout = d;
        }
        if let Some(d) = lookup_duration(&lookup, "HERMES_HTTP_RESPONSE_TIMEOUT") {
            self.http_client.response_timeout = Some(d);
        }
        if let Some(v) = lookup("HERMES_HTTP_TLS_VERIFY") {
            self.http_client.tls_verify = v == "true" || v == "1";
        }
        if let Some(v) = lookup("HERMES_STREAMING_MEDIA_TYPES") {
            self.streaming_media_types = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut route_ids = HashSet::new();
        for route in &self.routes {
            if !route_ids.insert(route.id.as_str()) {
                anyhow::bail!("duplicate route id '{}'", route.id);
            }
            if route.predicates.is_empty() {
                anyhow::bail!("route '{}' must declare at least one predicate", route.id);
            }
        }

        let mut service_names = HashSet::new();
        for service in &self.services {
            if !service_names.insert(service.name.as_str()) {
                anyhow::bail!("duplicate service name '{}'", service.name);
            }
            if service.nodes.is_empty() {
                anyhow::bail!("service '{}' has no nodes defined", service.name);
            }
        }

        for endpoint in &self.local_endpoints {
            if !endpoint.path.starts_with('/') {
                anyhow::bail!("local endpoint path '{}' must start with '/'", endpoint.path);
            }
            if !(100..=599).contains(&endpoint.status) {
                anyhow::bail!(
                    "local endpoint '{}' has invalid status {}",
                    endpoint.path,
                    endpoint.status
                );
            }
        }
        Ok(())
    }
}

fn lookup_duration(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<std::time::Duration> {
    let value = lookup(key)?;
    match humantime::parse_duration(&value) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!("config: ignoring {}, value={}, error={}", key, value, e);
            None
        }
    }
}
