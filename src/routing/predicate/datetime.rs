use super::{Predicate, RoutePredicateFactory};
use crate::routing::binding::{require, BindConfig, BindError};
use chrono::{DateTime, Utc};

/// Parses RFC 3339 with an offset (optionally followed by a bracketed zone
/// id, which is ignored) or epoch milliseconds.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| format!("epoch millis out of range: {}", millis));
    }
    let value = match value.find('[') {
        Some(idx) if value.ends_with(']') => &value[..idx],
        _ => value,
    };
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("cannot parse datetime '{}': {}", value, e))
}

#[derive(Debug, Default)]
pub struct DateTimeConfig {
    pub datetime: Option<DateTime<Utc>>,
}

impl DateTimeConfig {
    fn datetime(&self) -> Result<DateTime<Utc>, BindError> {
        self.datetime
            .ok_or_else(|| BindError::new("datetime", "must not be empty"))
    }
}

impl BindConfig for DateTimeConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "datetime" => self.datetime = Some(parse_datetime(value)?),
            _ => return crate::routing::binding::unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("datetime", self.datetime.is_some())
    }
}

pub struct BeforeRoutePredicateFactory;

impl RoutePredicateFactory for BeforeRoutePredicateFactory {
    type Config = DateTimeConfig;

    const NAME: &'static str = "Before";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["datetime"]
    }

    fn apply(&self, config: DateTimeConfig) -> Result<Predicate, BindError> {
        Ok(Predicate::Before(config.datetime()?))
    }
}

pub struct AfterRoutePredicateFactory;

impl RoutePredicateFactory for AfterRoutePredicateFactory {
    type Config = DateTimeConfig;

    const NAME: &'static str = "After";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["datetime"]
    }

    fn apply(&self, config: DateTimeConfig) -> Result<Predicate, BindError> {
        Ok(Predicate::After(config.datetime()?))
    }
}

#[derive(Debug, Default)]
pub struct BetweenConfig {
    pub datetime1: Option<DateTime<Utc>>,
    pub datetime2: Option<DateTime<Utc>>,
}

impl BindConfig for BetweenConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "datetime1" => self.datetime1 = Some(parse_datetime(value)?),
            "datetime2" => self.datetime2 = Some(parse_datetime(value)?),
            _ => return crate::routing::binding::unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("datetime1", self.datetime1.is_some())?;
        require("datetime2", self.datetime2.is_some())?;
        if self.datetime1 >= self.datetime2 {
            return Err(BindError::new(
                "datetime2",
                "must be after datetime1",
            ));
        }
        Ok(())
    }
}

pub struct BetweenRoutePredicateFactory;

impl RoutePredicateFactory for BetweenRoutePredicateFactory {
    type Config = BetweenConfig;

    const NAME: &'static str = "Between";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["datetime1", "datetime2"]
    }

    fn apply(&self, config: BetweenConfig) -> Result<Predicate, BindError> {
        match (config.datetime1, config.datetime2) {
            (Some(start), Some(end)) => Ok(Predicate::Between(start, end)),
            (None, _) => Err(BindError::new("datetime1", "must not be empty")),
            (_, None) => Err(BindError::new("datetime2", "must not be empty")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::definition::Args;
    use crate::routing::predicate::test_support::get;
    use crate::routing::predicate::PredicateFactory;
    use chrono::Duration;

    fn build<F: RoutePredicateFactory>(factory: F, args: &[&str]) -> Result<Predicate, BindError> {
        factory.build(&Args::positional(args.iter().copied()))
    }

    #[test]
    fn parses_offset_and_zone_suffix() {
        let a = parse_datetime("2017-01-20T17:42:47.789-07:00").unwrap();
        let b = parse_datetime("2017-01-20T17:42:47.789-07:00[America/Denver]").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.timestamp_millis(), 1_484_959_367_789);
    }

    #[test]
    fn parses_epoch_millis() {
        let dt = parse_datetime("1484959367789").unwrap();
        assert_eq!(dt, parse_datetime("2017-01-21T00:42:47.789Z").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn before_and_after_compare_with_now() {
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let ex = get("/");

        assert!(build(BeforeRoutePredicateFactory, &[future.as_str()]).unwrap().test(&ex));
        assert!(!build(BeforeRoutePredicateFactory, &[past.as_str()]).unwrap().test(&ex));
        assert!(build(AfterRoutePredicateFactory, &[past.as_str()]).unwrap().test(&ex));
        assert!(!build(AfterRoutePredicateFactory, &[future.as_str()]).unwrap().test(&ex));
    }

    #[test]
    fn between_requires_ordered_bounds() {
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let ex = get("/");

        assert!(build(BetweenRoutePredicateFactory, &[past.as_str(), future.as_str()])
            .unwrap()
            .test(&ex));
        let err = build(BetweenRoutePredicateFactory, &[future.as_str(), past.as_str()]).unwrap_err();
        assert_eq!(err.field, "datetime2");
    }

    #[test]
    fn missing_datetime_fails_binding() {
        let err = BeforeRoutePredicateFactory.build(&Args::new()).unwrap_err();
        assert_eq!(err.field, "datetime");
    }
}
