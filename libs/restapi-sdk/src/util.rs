use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

/// Version reported by the service client.
pub const SDK_VERSION: &str = "0.2.0";

const ALPHABET: &[u8; 62] = b"QWERTYUIOPASDFGHJKLZXCVBNM1234567890qwertyuiopasdfghjklzxcvbnm";

/// UTC timestamp with millisecond precision, e.g. `2024-03-01T08:00:00.000Z`.
#[must_use]
pub fn format_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    date.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Random alphanumeric string.
///
/// The alphabet is shuffled and `len` characters are taken after the first
/// one, so the result never repeats a character and is at most 61 long.
#[must_use]
pub fn random_string(len: usize) -> String {
    let mut alphabet = *ALPHABET;
    alphabet.shuffle(&mut rand::rng());
    alphabet
        .iter()
        .skip(1)
        .take(len)
        .map(|&b| char::from(b))
        .collect()
}

/// Uniform value in `[min, max)`; returns `min` when the range is empty.
#[must_use]
pub fn random_float(min: f64, max: f64) -> f64 {
    if min < max {
        rand::rng().random_range(min..max)
    } else {
        min
    }
}

/// `User-Agent` for the given client version.
#[must_use]
pub fn user_agent(version: &str) -> String {
    format!("RESTAPI-SDK/{version}")
}

/// `User-Agent` of the service client.
#[must_use]
pub fn version_string() -> String {
    user_agent(SDK_VERSION)
}

/// Correlation id attached to dispatcher log lines.
pub(crate) fn correlation_id() -> u16 {
    rand::rng().random_range(100..1000)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::collections::HashSet;

    #[test]
    fn format_date_converts_to_utc_millis() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let date = tz.with_ymd_and_hms(2024, 3, 1, 16, 30, 5).unwrap();
        assert_eq!(format_date(&date), "2024-03-01T08:30:05.000Z");

        let precise = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(format_date(&precise), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn random_string_is_alphanumeric_without_repeats() {
        let s = random_string(10);
        assert_eq!(s.len(), 10);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        let unique: HashSet<char> = s.chars().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn random_string_is_capped() {
        assert_eq!(random_string(100).len(), 61);
        assert!(random_string(0).is_empty());
    }

    #[test]
    fn random_float_range() {
        for _ in 0..100 {
            let v = random_float(1.5, 2.5);
            assert!((1.5..2.5).contains(&v));
        }
        assert!((random_float(3.0, 3.0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn version_strings() {
        assert_eq!(version_string(), "RESTAPI-SDK/0.2.0");
        assert_eq!(user_agent("1.0.5"), "RESTAPI-SDK/1.0.5");
    }

    #[test]
    fn correlation_id_has_three_digits() {
        for _ in 0..50 {
            let id = correlation_id();
            assert!((100..1000).contains(&id));
        }
    }
}
