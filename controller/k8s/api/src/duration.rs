use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

/// A non-negative duration written the way Go's `time.ParseDuration` reads
/// it, e.g. `"1m30s"`, `"250ms"` or `"1.5h"`.
///
/// Route timeouts can't be negative, so a leading `-` is rejected rather
/// than carried around as a sign.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoDuration(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ParseDurationError {
    #[error("empty duration")]
    Empty,

    #[error("negative durations are not supported")]
    Negative,

    #[error("expected a number at {0:?}")]
    NotANumber(String),

    #[error("missing a unit after {0:?}: {UNITS}")]
    NoUnit(String),

    #[error("unknown unit {0:?}: {UNITS}")]
    UnknownUnit(String),

    #[error("duration overflows")]
    Overflow,
}

const UNITS: &str = "expected one of ns, us, \u{00b5}s, ms, s, m, or h";

// === impl GoDuration ===

impl GoDuration {
    pub const fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for GoDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<GoDuration> for Duration {
    fn from(GoDuration(d): GoDuration) -> Self {
        d
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    const MICRO: u128 = 1_000;
    const MILLI: u128 = 1_000 * MICRO;
    const SECOND: u128 = 1_000 * MILLI;
    let n = match unit {
        "ns" => 1,
        // Both the micro sign (U+00B5) and the Greek mu (U+03BC) are accepted.
        "us" | "\u{00b5}s" | "\u{03bc}s" => MICRO,
        "ms" => MILLI,
        "s" => SECOND,
        "m" => 60 * SECOND,
        "h" => 60 * 60 * SECOND,
        _ => return None,
    };
    Some(n)
}

impl FromStr for GoDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, mut rest) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if rest.is_empty() {
            return Err(ParseDurationError::Empty);
        }
        if rest == "0" {
            return Ok(Self::default());
        }

        let mut total: u128 = 0;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            let (number, tail) = rest.split_at(number_len);
            let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
            if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
                return Err(ParseDurationError::NotANumber(rest.to_string()));
            }

            let unit_len = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_len);
            if unit.is_empty() {
                return Err(ParseDurationError::NoUnit(number.to_string()));
            }
            let scale = unit_nanos(unit)
                .ok_or_else(|| ParseDurationError::UnknownUnit(unit.to_string()))?;

            let whole: u128 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|_| ParseDurationError::Overflow)?
            };
            let mut nanos = whole
                .checked_mul(scale)
                .ok_or(ParseDurationError::Overflow)?;
            // Fractional digits beyond nanosecond precision are truncated.
            let mut place = scale;
            for digit in frac.bytes() {
                place /= 10;
                if place == 0 {
                    break;
                }
                nanos += u128::from(digit - b'0') * place;
            }

            total = total
                .checked_add(nanos)
                .ok_or(ParseDurationError::Overflow)?;
            rest = tail;
        }

        if negative && total > 0 {
            return Err(ParseDurationError::Negative);
        }
        let secs =
            u64::try_from(total / 1_000_000_000).map_err(|_| ParseDurationError::Overflow)?;
        let nanos = (total % 1_000_000_000) as u32;
        Ok(Self(Duration::new(secs, nanos)))
    }
}

/// Formats in Go's canonical form (`1h2m3.5s`, `250ms`, `0s`).
impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let nanos = self.0.subsec_nanos();
        if secs == 0 {
            return match nanos {
                0 => f.write_str("0s"),
                n if n % 1_000_000 == 0 => write!(f, "{}ms", n / 1_000_000),
                n if n % 1_000 == 0 => write!(f, "{}\u{00b5}s", n / 1_000),
                n => write!(f, "{n}ns"),
            };
        }

        let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
        if h > 0 {
            write!(f, "{h}h")?;
        }
        if h > 0 || m > 0 {
            write!(f, "{m}m")?;
        }
        write!(f, "{s}")?;
        if nanos > 0 {
            let frac = format!("{nanos:09}");
            write!(f, ".{}", frac.trim_end_matches('0'))?;
        }
        f.write_str("s")
    }
}

impl Serialize for GoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl schemars::JsonSchema for GoDuration {
    fn schema_name() -> String {
        "GoDuration".to_owned()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            ..Default::default()
        }
        .into()
    }
}
