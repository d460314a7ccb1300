//! Serde helpers for the backend's wall-clock timestamp strings.
//!
//! The backend writes task and note timestamps as `YYYY-MM-DD HH:MM:SS` and
//! alarm times as `YYYY-MM-DD HH:MM`, both in its own local time with no
//! offset. They are kept as [`NaiveDateTime`] on the client.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serializer};

/// Format of task/note timestamps.
pub const SECONDS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of alarm times.
pub const MINUTES_FORMAT: &str = "%Y-%m-%d %H:%M";

fn parse<E: serde::de::Error>(raw: &str, format: &str) -> Result<NaiveDateTime, E> {
  NaiveDateTime::parse_from_str(raw.trim(), format).map_err(|e| {
    E::custom(format!("invalid timestamp {raw:?} (expected {format}): {e}"))
  })
}

/// `Option<NaiveDateTime>` as `YYYY-MM-DD HH:MM:SS` or `null`.
pub mod local_seconds_opt {
  use super::*;

  pub fn serialize<S: Serializer>(
    value: &Option<NaiveDateTime>,
    s: S,
  ) -> Result<S::Ok, S::Error> {
    match value {
      Some(dt) => s.collect_str(&dt.format(SECONDS_FORMAT)),
      None => s.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    d: D,
  ) -> Result<Option<NaiveDateTime>, D::Error> {
    Option::<String>::deserialize(d)?
      .filter(|raw| !raw.trim().is_empty())
      .map(|raw| parse(&raw, SECONDS_FORMAT))
      .transpose()
  }
}

/// `NaiveDateTime` as `YYYY-MM-DD HH:MM`.
pub mod local_minutes {
  use super::*;

  pub fn serialize<S: Serializer>(
    value: &NaiveDateTime,
    s: S,
  ) -> Result<S::Ok, S::Error> {
    s.collect_str(&value.format(MINUTES_FORMAT))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    d: D,
  ) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw, MINUTES_FORMAT)
  }
}
