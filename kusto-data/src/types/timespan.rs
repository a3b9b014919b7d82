use crate::error::{Error, ParseError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::num::TryFromIntError;
use std::str::FromStr;
use time::Duration;

fn parse_regex_segment(captures: &Captures, name: &str) -> i64 {
    captures
        .name(name)
        .map_or(0, |m| m.as_str().parse::<i64>().expect("regex segment is all digits"))
}

static KUSTO_TIMESPAN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<neg>-)?((?P<days>\d+)\.)?(?P<hours>\d+):(?P<minutes>\d+):(?P<seconds>\d+)(\.(?P<ticks>\d+))?$")
        .expect("static timespan regex is valid")
});

/// Timespan for kusto, serializing to `[-][d.]hh:mm:ss[.fffffff]`.
///
/// The fractional part is emitted in ticks (100ns units) and trimmed to its
/// non-zero significance; parsing accepts both the trimmed and the full
/// seven-digit forms.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KustoTimespan(pub Option<Duration>);

impl KustoTimespan {
    /// Creates a new `KustoTimespan` from a `time::Duration`.
    pub fn new(duration: Duration) -> Self {
        Self(Some(duration))
    }

    /// Creates a null `KustoTimespan`.
    pub fn null() -> Self {
        Self(None)
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn format(f: &mut Formatter, d: Duration) -> std::fmt::Result {
        let neg = if d.is_negative() {
            write!(f, "-")?;
            -1
        } else {
            1
        };
        if d.whole_days().abs() > 0 {
            write!(f, "{}.", d.whole_days().abs())?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}",
            neg * (d.whole_hours() - d.whole_days() * 24),
            neg * (d.whole_minutes() - d.whole_hours() * 60),
            neg * (d.whole_seconds() - d.whole_minutes() * 60),
        )?;
        let ticks = i128::from(neg)
            * (d.whole_nanoseconds() - i128::from(d.whole_seconds()) * 1_000_000_000)
            / 100;
        if ticks != 0 {
            let fraction = format!("{:07}", ticks);
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl FromStr for KustoTimespan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = KUSTO_TIMESPAN_REGEX
            .captures(s)
            .ok_or_else(|| ParseError::Timespan(s.to_string()))?;

        let neg = match captures.name("neg") {
            None => 1,
            Some(_) => -1,
        };

        let days = parse_regex_segment(&captures, "days");
        let hours = parse_regex_segment(&captures, "hours");
        let minutes = parse_regex_segment(&captures, "minutes");
        let seconds = parse_regex_segment(&captures, "seconds");
        // Fraction digits are ticks; a trimmed fraction is right-padded back
        // to seven digits before scaling.
        let ticks = captures.name("ticks").map_or(0, |m| {
            let padded = format!("{:0<7}", m.as_str());
            padded.parse::<i64>().expect("regex segment is all digits")
        });
        let duration = neg
            * (Duration::days(days)
                + Duration::hours(hours)
                + Duration::minutes(minutes)
                + Duration::seconds(seconds)
                + Duration::nanoseconds(ticks * 100));

        Ok(Self(Some(duration)))
    }
}

impl Display for KustoTimespan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(d) = self.0 {
            Self::format(f, d)
        } else {
            write!(f, "null")
        }
    }
}

impl Debug for KustoTimespan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(d) = self.0 {
            write!(f, "KustoTimespan(")?;
            Self::format(f, d)?;
            write!(f, ")")
        } else {
            write!(f, "KustoTimespan(null)")
        }
    }
}

impl Serialize for KustoTimespan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_some() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de> Deserialize<'de> for KustoTimespan {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let opt = Option::<String>::deserialize(deserializer)?;
        match opt {
            Some(s) => s
                .parse::<KustoTimespan>()
                .map_err(|e| serde::de::Error::custom(e.to_string())),
            None => Ok(Self::null()),
        }
    }
}

impl TryFrom<std::time::Duration> for KustoTimespan {
    type Error = TryFromIntError;

    fn try_from(d: std::time::Duration) -> Result<Self, Self::Error> {
        Ok(Self(Some(Duration::new(
            d.as_secs().try_into()?,
            d.subsec_nanos().try_into()?,
        ))))
    }
}

impl From<Duration> for KustoTimespan {
    fn from(d: Duration) -> Self {
        Self(Some(d))
    }
}

impl From<Option<Duration>> for KustoTimespan {
    fn from(d: Option<Duration>) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversion() {
        let refs: Vec<(&str, i64)> = vec![
            ("1.00:00:00.0000000", 86_400_000_000_000),
            ("01:00:00.0000000", 3_600_000_000_000),
            ("01:00:00", 3_600_000_000_000),
            ("00:05:00.0000000", 300_000_000_000),
            ("00:00:00.0000001", 100),
            ("-01:00:00", -3_600_000_000_000),
            ("-1.00:00:00.0000000", -86_400_000_000_000),
            ("00:00:00.1234567", 123_456_700),
            ("00:00:00.123", 123_000_000),
        ];

        for (from, to) in refs {
            assert_eq!(
                KustoTimespan::from_str(from)
                    .unwrap_or_else(|_| panic!("Failed to parse timespan {}", from))
                    .0
                    .unwrap()
                    .whole_nanoseconds(),
                i128::from(to)
            );
        }
    }

    #[test]
    fn format_trims_fraction() {
        let refs: Vec<(&str, &str)> = vec![
            ("1.00:00:00.0000001", "1.00:00:00.0000001"),
            ("01:00:00.0000000", "01:00:00"),
            ("00:05:00.0000000", "00:05:00"),
            ("00:00:00.0000001", "00:00:00.0000001"),
            ("-1.00:00:00.0000000", "-1.00:00:00"),
            ("00:00:00.1234567", "00:00:00.1234567"),
            ("00:00:00.1230000", "00:00:00.123"),
        ];

        for (input, expected) in refs {
            let parsed = KustoTimespan::from_str(input)
                .unwrap_or_else(|_| panic!("Failed to parse timespan {}", input));
            assert_eq!(parsed.to_string(), expected);
        }
    }
}
