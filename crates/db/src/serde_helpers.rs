use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Deserializes a field that can be:
/// - Not present in JSON → None (outer Option)
/// - Present as null → Some(None)
/// - Present with value → Some(Some(T))
///
/// PATCH-style updates use this to tell "field not provided" (keep existing)
/// apart from "field explicitly set to null" (clear value). Pair it with
/// `#[serde(default)]` so a missing field lands on the outer None.
pub fn deserialize_optional_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parse a timestamp given as RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (UTC
/// assumed) or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_flexible_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn datetime_from_raw<E: serde::de::Error>(raw: Option<String>) -> Result<Option<DateTime<Utc>>, E> {
    match raw {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_flexible_datetime(&raw).map(Some).ok_or_else(|| {
            E::custom(format!(
                "invalid date '{raw}': expected RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD"
            ))
        }),
    }
}

/// Optional timestamp in any of the formats accepted by [`parse_flexible_datetime`].
/// Missing, `null` and `""` all come out as `None`.
pub fn deserialize_flexible_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    datetime_from_raw::<D::Error>(Option::<String>::deserialize(deserializer)?)
}

/// PATCH variant of [`deserialize_flexible_datetime`]: `null` and `""` clear the value.
pub fn deserialize_optional_nullable_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    datetime_from_raw::<D::Error>(Option::<String>::deserialize(deserializer)?).map(Some)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "deserialize_optional_nullable")]
        due_date: Option<Option<String>>,
    }

    #[test]
    fn distinguishes_missing_null_and_value() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.due_date, None);

        let null: Patch = serde_json::from_str(r#"{"due_date": null}"#).unwrap();
        assert_eq!(null.due_date, Some(None));

        let value: Patch = serde_json::from_str(r#"{"due_date": "2025-01-01"}"#).unwrap();
        assert_eq!(value.due_date, Some(Some("2025-01-01".to_string())));
    }

    #[derive(Debug, Deserialize)]
    struct Dates {
        #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
        deadline: Option<DateTime<Utc>>,
        #[serde(default, deserialize_with = "deserialize_optional_nullable_datetime")]
        due_date: Option<Option<DateTime<Utc>>>,
    }

    #[test]
    fn parses_every_accepted_date_format() {
        let midnight = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_flexible_datetime("2025-03-01"), Some(midnight));
        assert_eq!(parse_flexible_datetime("2025-03-01T00:00:00"), Some(midnight));
        assert_eq!(parse_flexible_datetime("2025-03-01T00:00:00Z"), Some(midnight));
        assert_eq!(
            parse_flexible_datetime("2025-03-01T02:00:00+02:00"),
            Some(midnight)
        );
        assert_eq!(parse_flexible_datetime("next tuesday"), None);
    }

    #[test]
    fn empty_string_clears_and_garbage_is_rejected() {
        let cleared: Dates = serde_json::from_str(r#"{"deadline": "", "due_date": ""}"#).unwrap();
        assert_eq!(cleared.deadline, None);
        assert_eq!(cleared.due_date, Some(None));

        let untouched: Dates = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.due_date, None);

        let err = serde_json::from_str::<Dates>(r#"{"deadline": "soon"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid date 'soon'"));
    }
}
