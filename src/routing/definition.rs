use crate::error::GatewayError;
use crate::support::RouteUri;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Key prefix given to positional arguments parsed from shortcut text.
pub const GENERATED_NAME_PREFIX: &str = "_genkey_";

pub fn generate_name(index: usize) -> String {
    format!("{}{}", GENERATED_NAME_PREFIX, index)
}

/// Ordered name → value arguments of a predicate or filter definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<(String, String)>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts or replaces `key`, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds positional args from shortcut tokens.
    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (generate_name(i), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Args::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

impl Serialize for Args {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Scalar argument value; numbers and booleans are kept as their text form.
struct ArgValue(String);

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgValueVisitor;

        impl Visitor<'_> for ArgValueVisitor {
            type Value = ArgValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ArgValue, E> {
                Ok(ArgValue(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<ArgValue, E> {
                Ok(ArgValue(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ArgValue, E> {
                Ok(ArgValue(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ArgValue, E> {
                Ok(ArgValue(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ArgValue, E> {
                Ok(ArgValue(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<ArgValue, E> {
                Ok(ArgValue(v.to_string()))
            }
        }

        deserializer.deserialize_any(ArgValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Args {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgsVisitor;

        impl<'de> Visitor<'de> for ArgsVisitor {
            type Value = Args;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of argument names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Args, A::Error> {
                let mut args = Args::new();
                while let Some((k, v)) = map.next_entry::<String, ArgValue>()? {
                    args.insert(k, v.0);
                }
                Ok(args)
            }
        }

        deserializer.deserialize_map(ArgsVisitor)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `Name=a,b,c` into a name and positional args. A bare `Name`
/// yields no args.
fn parse_factory_text(kind: &str, text: &str) -> Result<(String, Args), GatewayError> {
    let text = text.trim();
    let (name, rest) = match text.find('=') {
        Some(0) => {
            return Err(GatewayError::InvalidDefinition(format!(
                "unable to parse {} text '{}', must be of the form name=value",
                kind, text
            )))
        }
        Some(idx) => (&text[..idx], &text[idx + 1..]),
        None => (text, ""),
    };
    if name.is_empty() {
        return Err(GatewayError::InvalidDefinition(format!(
            "{} text is empty",
            kind
        )));
    }
    Ok((name.trim().to_string(), Args::positional(tokenize(rest))))
}

macro_rules! factory_definition {
    ($(#[$meta:meta])* $ty:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
        pub struct $ty {
            pub name: String,
            #[serde(skip_serializing_if = "Args::is_empty")]
            pub args: Args,
        }

        impl $ty {
            pub fn new(name: impl Into<String>, args: Args) -> Self {
                Self {
                    name: name.into(),
                    args,
                }
            }
        }

        impl FromStr for $ty {
            type Err = GatewayError;

            fn from_str(text: &str) -> Result<Self, Self::Err> {
                let (name, args) = parse_factory_text($kind, text)?;
                Ok(Self { name, args })
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Repr {
                    Text(String),
                    Full {
                        name: String,
                        #[serde(default)]
                        args: Args,
                    },
                }

                match Repr::deserialize(deserializer)? {
                    Repr::Text(text) => text.parse().map_err(de::Error::custom),
                    Repr::Full { name, args } => Ok(Self { name, args }),
                }
            }
        }
    };
}

factory_definition!(
    /// Names a predicate factory plus the raw args it is bound from.
    PredicateDefinition,
    "PredicateDefinition"
);

factory_definition!(
    /// Names a filter factory plus the raw args it is bound from.
    FilterDefinition,
    "FilterDefinition"
);

fn generate_route_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Declarative route description, turned into an executable `Route` by the
/// route locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    #[serde(default = "generate_route_id")]
    pub id: String,
    pub uri: RouteUri,
    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub order: i32,
}

impl RouteDefinition {
    pub fn new(id: impl Into<String>, uri: RouteUri) -> Self {
        Self {
            id: id.into(),
            uri,
            predicates: Vec::new(),
            filters: Vec::new(),
            order: 0,
        }
    }

    pub fn with_predicate(mut self, predicate: PredicateDefinition) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// Shorthand form `id=uri,Pred1=a,Pred2=b`.
impl FromStr for RouteDefinition {
    type Err = GatewayError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let idx = match text.find('=') {
            Some(idx) if idx > 0 => idx,
            _ => {
                return Err(GatewayError::InvalidDefinition(format!(
                    "unable to parse RouteDefinition text '{}', must be of the form name=value",
                    text
                )))
            }
        };
        let id = text[..idx].trim().to_string();
        let mut tokens = tokenize(&text[idx + 1..]).into_iter();
        let uri = tokens
            .next()
            .ok_or_else(|| {
                GatewayError::InvalidDefinition(format!("route '{}' has no uri", id))
            })?
            .parse()?;
        let predicates = tokens
            .map(|t| t.parse())
            .collect::<Result<Vec<PredicateDefinition>, _>>()?;
        Ok(RouteDefinition {
            id,
            uri,
            predicates,
            filters: Vec::new(),
            order: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_predicate_shortcut_text() {
        let def: PredicateDefinition = "Cookie=chocolate, ch.p".parse().unwrap();
        assert_eq!(def.name, "Cookie");
        assert_eq!(def.args.get("_genkey_0"), Some("chocolate"));
        assert_eq!(def.args.get("_genkey_1"), Some("ch.p"));
    }

    #[test]
    fn bare_name_has_no_args() {
        let def: FilterDefinition = "PreserveHostHeader".parse().unwrap();
        assert_eq!(def.name, "PreserveHostHeader");
        assert!(def.args.is_empty());
    }

    #[test]
    fn leading_equals_is_rejected() {
        assert!("=x".parse::<PredicateDefinition>().is_err());
    }

    #[test]
    fn parses_route_shorthand() {
        let def: RouteDefinition = "r1=http://backend,Method=GET".parse().unwrap();
        assert_eq!(def.id, "r1");
        assert_eq!(def.uri.host(), Some("backend"));
        assert_eq!(def.predicates.len(), 1);
        assert_eq!(def.predicates[0].name, "Method");
        assert_eq!(def.predicates[0].args.get("_genkey_0"), Some("GET"));
    }

    #[test]
    fn route_shorthand_without_uri_fails() {
        assert!("r1=".parse::<RouteDefinition>().is_err());
        assert!("no-equals".parse::<RouteDefinition>().is_err());
    }

    #[test]
    fn args_insert_replaces_in_place() {
        let mut args = Args::new();
        args.insert("a", "1");
        args.insert("b", "2");
        args.insert("a", "3");
        let collected: Vec<_> = args.iter().collect();
        assert_eq!(collected, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn deserializes_both_definition_forms() {
        let json = r#"{
            "id": "users",
            "uri": "lb://users",
            "order": 3,
            "predicates": ["Path=/users/**", {"name": "Method", "args": {"method": "GET"}}],
            "filters": [{"name": "SetStatus", "args": {"status": 418}}]
        }"#;
        let def: RouteDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.order, 3);
        assert_eq!(def.predicates[0].name, "Path");
        assert_eq!(def.predicates[0].args.get("_genkey_0"), Some("/users/**"));
        assert_eq!(def.predicates[1].args.get("method"), Some("GET"));
        assert_eq!(def.filters[0].args.get("status"), Some("418"));
    }

    #[test]
    fn missing_id_is_generated() {
        let def: RouteDefinition = serde_json::from_str(r#"{"uri": "http://a"}"#).unwrap();
        assert_eq!(def.id.len(), 36);
        assert!(def.predicates.is_empty());
    }
}
