use anyhow::anyhow;
use chrono::format::{
  Item,
  StrftimeItems
};
use chrono::{
  DateTime,
  Local,
  SubsecRound,
  Utc
};

pub const DEFAULT_DISPLAY_FORMAT: &str =
  "%Y-%m-%d %H:%M:%S";

/// Clock readings are kept at
/// millisecond precision, the
/// resolution of the persisted
/// `createdAt` field.
pub fn truncate_to_millis(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  dt.trunc_subsecs(3)
}

pub fn validate_display_format(
  fmt: &str
) -> anyhow::Result<()> {
  if StrftimeItems::new(fmt)
    .any(|item| {
      matches!(item, Item::Error)
    })
  {
    return Err(anyhow!(
      "invalid date format: {fmt}"
    ));
  }
  Ok(())
}

pub fn format_local(
  dt: DateTime<Utc>,
  fmt: &str
) -> String {
  dt.with_timezone(&Local)
    .format(fmt)
    .to_string()
}

pub mod iso_millis_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::Millis,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    DateTime::parse_from_rfc3339(&raw)
      .map(|dt| {
        dt.with_timezone(&Utc)
      })
      .map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Timelike,
    Utc
  };

  use super::{
    truncate_to_millis,
    validate_display_format
  };

  #[test]
  fn truncates_below_milliseconds() {
    let dt = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid dt")
      .with_nanosecond(123_456_789)
      .expect("valid nanos");
    assert_eq!(
      truncate_to_millis(dt)
        .nanosecond(),
      123_000_000
    );
  }

  #[test]
  fn rejects_broken_format() {
    assert!(
      validate_display_format(
        "%Y-%m-%d"
      )
      .is_ok()
    );
    assert!(
      validate_display_format("%Q")
        .is_err()
    );
  }
}
