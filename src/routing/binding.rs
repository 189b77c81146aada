use crate::routing::definition::{Args, GENERATED_NAME_PREFIX};
use std::fmt;
use std::str::FromStr;

/// How positional shortcut arguments map onto config fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortcutType {
    /// The i-th positional value binds to the i-th declared field.
    #[default]
    Default,
    /// Every positional value is gathered into the single declared field.
    GatherList,
}

/// A binding failure for one config field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindError {
    pub field: String,
    pub reason: String,
}

impl BindError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Named properties after shortcut normalization. Keys may repeat for
/// list-valued fields.
pub type Properties = Vec<(String, String)>;

/// Rewrites generated positional keys into declared field names.
pub fn normalize(
    args: &Args,
    shortcut_type: ShortcutType,
    field_order: &[&str],
) -> Result<Properties, BindError> {
    let mut positional: Vec<&str> = Vec::new();
    let mut properties = Properties::new();
    for (key, value) in args.iter() {
        if key.starts_with(GENERATED_NAME_PREFIX) {
            positional.push(value);
        } else {
            properties.push((key.to_string(), value.to_string()));
        }
    }

    if positional.is_empty() {
        return Ok(properties);
    }

    match shortcut_type {
        ShortcutType::Default => {
            // A single token for a multi-field factory is itself a comma list.
            let values: Vec<&str> = if positional.len() == 1 && field_order.len() > 1 {
                positional[0].split(',').map(str::trim).collect()
            } else {
                positional
            };
            for (i, value) in values.into_iter().enumerate() {
                let field = field_order.get(i).ok_or_else(|| {
                    BindError::new(
                        format!("{}{}", GENERATED_NAME_PREFIX, i),
                        format!(
                            "too many shortcut arguments, expected at most {}",
                            field_order.len()
                        ),
                    )
                })?;
                properties.push((field.to_string(), value.to_string()));
            }
        }
        ShortcutType::GatherList => {
            let field = field_order.first().ok_or_else(|| {
                BindError::new(GENERATED_NAME_PREFIX, "factory declares no shortcut field")
            })?;
            for value in positional {
                properties.push((field.to_string(), value.to_string()));
            }
        }
    }

    Ok(properties)
}

/// A factory config that can be populated field by field from text.
pub trait BindConfig: Default + Send + 'static {
    /// Coerces `value` into `field`. Returns the failure reason on error.
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String>;

    /// Cross-field validation after every property is bound.
    fn validate(&self) -> Result<(), BindError> {
        Ok(())
    }
}

/// Config for factories that take no arguments.
#[derive(Debug, Default)]
pub struct NoConfig;

impl BindConfig for NoConfig {
    fn bind_field(&mut self, field: &str, _value: &str) -> Result<(), String> {
        unknown_field(field)
    }
}

/// Binds every property onto `config`, then validates it.
pub fn bind<C: BindConfig>(mut config: C, properties: &Properties) -> Result<C, BindError> {
    for (field, value) in properties {
        config
            .bind_field(field, value)
            .map_err(|reason| BindError::new(field.as_str(), reason))?;
    }
    config.validate()?;
    Ok(config)
}

pub fn parse_value<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| format!("cannot convert '{}': {}", value, e))
}

pub fn unknown_field(field: &str) -> Result<(), String> {
    Err(format!("unknown property '{}'", field))
}

pub fn require(field: &str, present: bool) -> Result<(), BindError> {
    if present {
        Ok(())
    } else {
        Err(BindError::new(field, "must not be empty"))
    }
}
