use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static ROLLING_BATCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^rolling[-_]batch\s*\[\s*(\d+)\s*\]$").expect("valid regex")
});

/// How many ready steps may run at once and how ties are broken.
///
/// Ties are always broken by declaration order; the variants only differ in
/// their concurrency limit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Sequential,
    Parallel,
    RollingBatch { size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyParseError {
    Unknown(String),
    Invalid { name: String, reason: String },
}

impl Strategy {
    /// `None` means unbounded.
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self {
            Strategy::Sequential => Some(1),
            Strategy::Parallel => None,
            Strategy::RollingBatch { size } => Some(*size),
        }
    }

    pub fn parse(name: &str, size: Option<usize>) -> Result<Self, StrategyParseError> {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "sequential" | "serial" => Ok(Strategy::Sequential),
            "parallel" => Ok(Strategy::Parallel),
            "rolling-batch" | "rolling_batch" => match size {
                Some(0) => Err(StrategyParseError::Invalid {
                    name: normalized,
                    reason: "batch size must be at least 1".to_string(),
                }),
                Some(size) => Ok(Strategy::RollingBatch { size }),
                None => Err(StrategyParseError::Invalid {
                    name: normalized,
                    reason: "batch size is required".to_string(),
                }),
            },
            other => {
                let Some(caps) = ROLLING_BATCH_RE.captures(other) else {
                    return Err(StrategyParseError::Unknown(name.trim().to_string()));
                };
                let size = caps[1].parse::<usize>().map_err(|e| StrategyParseError::Invalid {
                    name: other.to_string(),
                    reason: e.to_string(),
                })?;
                Strategy::parse("rolling-batch", Some(size))
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sequential => f.write_str("sequential"),
            Strategy::Parallel => f.write_str("parallel"),
            Strategy::RollingBatch { size } => write!(f, "rolling-batch[{size}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_rolling_batch() {
        assert_eq!(
            Strategy::parse("rolling-batch[3]", None),
            Ok(Strategy::RollingBatch { size: 3 })
        );
        assert_eq!(
            Strategy::parse("Rolling-Batch [ 2 ]", None),
            Ok(Strategy::RollingBatch { size: 2 })
        );
    }

    #[test]
    fn rejects_zero_batch_and_unknown_names() {
        assert!(matches!(
            Strategy::parse("rolling-batch[0]", None),
            Err(StrategyParseError::Invalid { .. })
        ));
        assert_eq!(
            Strategy::parse("random", None),
            Err(StrategyParseError::Unknown("random".to_string()))
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        for s in [
            Strategy::Sequential,
            Strategy::Parallel,
            Strategy::RollingBatch { size: 4 },
        ] {
            assert_eq!(Strategy::parse(&s.to_string(), None), Ok(s));
        }
    }
}
