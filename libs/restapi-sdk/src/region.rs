use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::SdkError;

/// Deployment region of the backend services.
///
/// `Dev`, `Testing` and `Uat` are pre-production stages; the others are
/// geographic production regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    Dev,
    Testing,
    Uat,
    #[default]
    Cn,
    Hk,
    Us,
    Gb,
}

impl Region {
    pub const ALL: [Self; 7] = [
        Self::Dev,
        Self::Testing,
        Self::Uat,
        Self::Cn,
        Self::Hk,
        Self::Us,
        Self::Gb,
    ];

    /// Numeric region code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Dev => 0,
            Self::Testing => 1,
            Self::Uat => 2,
            Self::Cn => 11,
            Self::Hk => 12,
            Self::Us => 13,
            Self::Gb => 14,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Testing => "TESTING",
            Self::Uat => "UAT",
            Self::Cn => "CN",
            Self::Hk => "HK",
            Self::Us => "US",
            Self::Gb => "GB",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = SdkError;

    /// Accepts the numeric code (`"11"`) or the name in any case (`"cn"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let found = match s.parse::<u8>() {
            Ok(code) => Self::from_code(code),
            Err(_) => Self::ALL
                .into_iter()
                .find(|r| r.name().eq_ignore_ascii_case(s)),
        };
        found.ok_or_else(|| SdkError::InvalidRegion(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u8),
            Name(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Self::from_code(code).ok_or_else(|| code.to_string()),
            Raw::Name(name) => name.parse().map_err(|_| name),
        };
        parsed.map_err(|raw| serde::de::Error::custom(format!("unknown region: {raw}")))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        let codes: Vec<u8> = Region::ALL.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 11, 12, 13, 14]);
    }

    #[test]
    fn parse_by_name_or_code() {
        assert_eq!("cn".parse::<Region>().unwrap(), Region::Cn);
        assert_eq!("HK".parse::<Region>().unwrap(), Region::Hk);
        assert_eq!("Testing".parse::<Region>().unwrap(), Region::Testing);
        assert_eq!("13".parse::<Region>().unwrap(), Region::Us);
        assert_eq!(" 0 ".parse::<Region>().unwrap(), Region::Dev);
    }

    #[test]
    fn parse_unknown() {
        assert!(matches!("mars".parse::<Region>(), Err(SdkError::InvalidRegion(r)) if r == "mars"));
        assert!("99".parse::<Region>().is_err());
        assert!("".parse::<Region>().is_err());
    }

    #[test]
    fn deserialize_code_or_name() {
        let r: Region = serde_json::from_str("12").unwrap();
        assert_eq!(r, Region::Hk);
        let r: Region = serde_json::from_str("\"us\"").unwrap();
        assert_eq!(r, Region::Us);
        assert!(serde_json::from_str::<Region>("\"nowhere\"").is_err());
    }
}
