use crate::error::{Result, SearchError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl WindowUnit {
    const fn hours(self) -> u64 {
        match self {
            Self::Hour => 1,
            Self::Day => 24,
            Self::Week => 24 * 7,
            Self::Month => 24 * 30,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// Relative look-back window, rendered the way the query filter language expects it
/// (`"7 days"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    amount: u32,
    unit: WindowUnit,
}

fn window_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d{1,5})\s*(hour|day|week|month)s?\s*$")
            .unwrap_or_else(|err| unreachable!("time window regex is valid: {err}"))
    })
}

impl TimeWindow {
    pub const fn new(amount: u32, unit: WindowUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn days(amount: u32) -> Self {
        Self::new(amount, WindowUnit::Day)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let caps = window_regex()
            .captures(raw)
            .ok_or_else(|| SearchError::InvalidTimeWindow(raw.to_string()))?;
        let amount: u32 = caps[1]
            .parse()
            .map_err(|_| SearchError::InvalidTimeWindow(raw.to_string()))?;
        if amount == 0 {
            return Err(SearchError::InvalidTimeWindow(raw.to_string()));
        }
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "hour" => WindowUnit::Hour,
            "day" => WindowUnit::Day,
            "week" => WindowUnit::Week,
            _ => WindowUnit::Month,
        };
        Ok(Self { amount, unit })
    }

    pub fn span_hours(&self) -> u64 {
        u64::from(self.amount) * self.unit.hours()
    }
}

impl PartialOrd for TimeWindow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeWindow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.span_hours()
            .cmp(&other.span_hours())
            .then_with(|| self.amount.cmp(&other.amount))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.amount == 1 { "" } else { "s" };
        write!(f, "{} {}{plural}", self.amount, self.unit.as_str())
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
