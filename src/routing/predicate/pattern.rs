use super::{Predicate, RoutePredicateFactory};
use crate::routing::binding::{unknown_field, BindConfig, BindError, ShortcutType};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::sync::Arc;

/// A compiled set of glob patterns plus their source text.
#[derive(Debug)]
pub struct PatternSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl PatternSet {
    /// Host patterns: case-insensitive, `*` spans dots.
    pub fn hosts(patterns: &[String]) -> Result<Self, String> {
        Self::build(patterns, true, false)
    }

    /// Path patterns: `*` stays within a segment, `**` spans segments.
    pub fn paths(patterns: &[String]) -> Result<Self, String> {
        Self::build(patterns, false, true)
    }

    fn build(patterns: &[String], case_insensitive: bool, literal_separator: bool) -> Result<Self, String> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            // `*` already spans dots when separators are not literal.
            let source = if literal_separator {
                pattern.clone()
            } else {
                pattern.replace("**", "*")
            };
            let glob = GlobBuilder::new(&source)
                .case_insensitive(case_insensitive)
                .literal_separator(literal_separator)
                .build()
                .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| e.to_string())?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.set.is_match(candidate)
    }
}

#[derive(Debug, Default)]
pub struct PatternConfig {
    pub patterns: Vec<String>,
}

impl PatternConfig {
    fn non_empty(&self) -> Result<(), BindError> {
        if self.patterns.is_empty() {
            return Err(BindError::new("patterns", "must not be empty"));
        }
        Ok(())
    }
}

impl BindConfig for PatternConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "patterns" => {
                self.patterns.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string),
                );
            }
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        self.non_empty()
    }
}

/// Matches the `Host` header (port stripped) against glob patterns.
pub struct HostRoutePredicateFactory;

impl RoutePredicateFactory for HostRoutePredicateFactory {
    type Config = PatternConfig;

    const NAME: &'static str = "Host";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["patterns"]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn apply(&self, config: PatternConfig) -> Result<Predicate, BindError> {
        config.non_empty()?;
        let set = PatternSet::hosts(&config.patterns)
            .map_err(|reason| BindError::new("patterns", reason))?;
        Ok(Predicate::Host(Arc::new(set)))
    }
}

/// Matches the request path against glob patterns.
pub struct PathRoutePredicateFactory;

impl RoutePredicateFactory for PathRoutePredicateFactory {
    type Config = PatternConfig;

    const NAME: &'static str = "Path";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["patterns"]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn apply(&self, config: PatternConfig) -> Result<Predicate, BindError> {
        config.non_empty()?;
        let set = PatternSet::paths(&config.patterns)
            .map_err(|reason| BindError::new("patterns", reason))?;
        Ok(Predicate::Path(Arc::new(set)))
    }
}
