//! Wall-clock times exchanged as `HH:mm` strings.
//!
//! Postgres `time` columns come back as `HH:mm:ss`, so both forms are accepted on input;
//! output is always `HH:mm`.

use chrono::NaiveTime;
use serde::{de, Deserialize, Deserializer, Serializer};

pub const HHMM: &str = "%H:%M";

pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, HHMM)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format(HHMM).to_string()
}

pub mod hhmm {
    use super::*;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hhmm(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_hhmm(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid time {:?}, expected HH:mm", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Window {
        #[serde(with = "hhmm")]
        start: NaiveTime,
    }

    #[test]
    fn accepts_minutes_and_seconds_forms() {
        assert_eq!(parse_hhmm("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_hhmm("09:30:00"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_hhmm("9h30"), None);
        assert_eq!(parse_hhmm("25:00"), None);
    }

    #[test]
    fn serializes_without_seconds() {
        let window: Window = serde_json::from_str(r#"{"start":"14:00:00"}"#).unwrap();
        assert_eq!(serde_json::to_string(&window).unwrap(), r#"{"start":"14:00"}"#);
    }

    #[test]
    fn rejects_garbage() {
        let err = serde_json::from_str::<Window>(r#"{"start":"noon"}"#).unwrap_err();
        assert!(err.to_string().contains("expected HH:mm"));
    }
}
