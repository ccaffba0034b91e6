use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default admission quota: 100 requests per second
pub const DEFAULT_QUOTA: &str = "100-S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("quota '{0}' must look like <count>-<S|M|H|D>")]
    Format(String),

    #[error("quota count must be greater than 0")]
    ZeroLimit,
}

/// Request quota per time window, written as `<count>-<unit>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub period: Duration,
}

impl Quota {
    pub fn new(limit: u64, period: Duration) -> Self {
        Self { limit, period }
    }

    pub fn per_second(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    fn unit(&self) -> String {
        match self.period.as_secs() {
            1 => "S".to_string(),
            60 => "M".to_string(),
            3600 => "H".to_string(),
            86400 => "D".to_string(),
            secs => format!("{}s", secs),
        }
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::per_second(100)
    }
}

impl FromStr for Quota {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^(?i)\s*(\d+)\s*-\s*([smhd])\s*$").expect("quota pattern is valid")
        });

        let captures = pattern
            .captures(s)
            .ok_or_else(|| QuotaError::Format(s.to_string()))?;
        let limit: u64 = captures[1]
            .parse()
            .map_err(|_| QuotaError::Format(s.to_string()))?;
        if limit == 0 {
            return Err(QuotaError::ZeroLimit);
        }

        let secs = match captures[2].to_ascii_uppercase().as_str() {
            "S" => 1,
            "M" => 60,
            "H" => 3600,
            "D" => 86400,
            _ => return Err(QuotaError::Format(s.to_string())),
        };

        Ok(Quota::new(limit, Duration::from_secs(secs)))
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.limit, self.unit())
    }
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reads the `<count>-<unit>` form; a blank string selects the default quota
impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Ok(Quota::default());
        }
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("100-S".parse::<Quota>().unwrap(), Quota::per_second(100));
        assert_eq!(
            "10-m".parse::<Quota>().unwrap(),
            Quota::new(10, Duration::from_secs(60))
        );
        assert_eq!(
            "1000-H".parse::<Quota>().unwrap(),
            Quota::new(1000, Duration::from_secs(3600))
        );
        assert_eq!(
            "5-D".parse::<Quota>().unwrap(),
            Quota::new(5, Duration::from_secs(86400))
        );
    }

    #[test]
    fn test_default_quota_string() {
        assert_eq!(DEFAULT_QUOTA.parse::<Quota>().unwrap(), Quota::default());
        assert_eq!(Quota::default().to_string(), DEFAULT_QUOTA);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!("100".parse::<Quota>(), Err(QuotaError::Format(_))));
        assert!(matches!("100-W".parse::<Quota>(), Err(QuotaError::Format(_))));
        assert!(matches!("abc-S".parse::<Quota>(), Err(QuotaError::Format(_))));
        assert!(matches!("".parse::<Quota>(), Err(QuotaError::Format(_))));
        assert_eq!("0-S".parse::<Quota>(), Err(QuotaError::ZeroLimit));
    }

    #[test]
    fn test_serde_string_form() {
        let quota: Quota = serde_json::from_str(r#""3-M""#).unwrap();
        assert_eq!(quota, Quota::new(3, Duration::from_secs(60)));
        assert_eq!(serde_json::to_string(&quota).unwrap(), r#""3-M""#);

        let blank: Quota = serde_json::from_str(r#""  ""#).unwrap();
        assert_eq!(blank, Quota::default());

        let err = serde_json::from_str::<Quota>(r#""0-S""#).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }
}
