// Data structures shared by the ingestion pipeline, the API and the board

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Line Letter
// ============================================================================

/// Single-character display grouping of a route ("B" for route "B15N").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineLetter(char);

impl LineLetter {
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_alphanumeric() {
            Some(LineLetter(c.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// First character of a route identifier, uppercased.
    pub fn from_route_id(route_id: &str) -> Option<Self> {
        route_id.chars().next().and_then(Self::new)
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for LineLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LineLetter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Self::new(c).ok_or_else(|| format!("'{}' is not a valid line letter", s))
            }
            _ => Err(format!("line letter must be exactly one character, got '{}'", s)),
        }
    }
}

impl Serialize for LineLetter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineLetter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Arrival Events & Snapshot
// ============================================================================

/// One predicted arrival at the target stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalEvent {
    pub route_id: String,
    pub line: LineLetter,
    pub stop_id: String,
    pub predicted_epoch_seconds: i64,
}

/// Per-line arrivals from one poll. Always rebuilt wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrivalSnapshot {
    pub stop_id: String,
    pub built_at: i64,
    pub lines: BTreeMap<LineLetter, Vec<ArrivalEvent>>,
}

impl ArrivalSnapshot {
    pub fn arrivals(&self, line: LineLetter) -> &[ArrivalEvent] {
        self.lines.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        now.saturating_sub(self.built_at).max(0)
    }

    pub fn total_arrivals(&self) -> usize {
        self.lines.values().map(Vec::len).sum()
    }
}

// ============================================================================
// API Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalEntry {
    pub minutes: i64,
    pub timestamp: i64,
}

/// Body of `GET /api/arrivals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalsResponse {
    pub station: String,
    pub stop_id: String,
    pub timestamp: i64,
    pub arrivals: BTreeMap<LineLetter, Vec<ArrivalEntry>>,
}

impl ArrivalsResponse {
    /// Minutes are floored against `now` with no safety buffer; events that
    /// are no longer in the future are dropped.
    pub fn from_snapshot(station: &str, snapshot: &ArrivalSnapshot, now: i64) -> Self {
        let arrivals = snapshot
            .lines
            .iter()
            .map(|(line, events)| {
                let entries = events
                    .iter()
                    .filter(|e| e.predicted_epoch_seconds > now)
                    .map(|e| ArrivalEntry {
                        minutes: (e.predicted_epoch_seconds - now).div_euclid(60),
                        timestamp: e.predicted_epoch_seconds,
                    })
                    .collect();
                (*line, entries)
            })
            .collect();

        ArrivalsResponse {
            station: station.to_string(),
            stop_id: snapshot.stop_id.clone(),
            timestamp: now,
            arrivals,
        }
    }

    pub fn into_snapshot(self) -> ArrivalSnapshot {
        let stop_id = self.stop_id;
        let lines = self
            .arrivals
            .into_iter()
            .map(|(line, entries)| {
                let events = entries
                    .into_iter()
                    .map(|entry| ArrivalEvent {
                        route_id: line.to_string(),
                        line,
                        stop_id: stop_id.clone(),
                        predicted_epoch_seconds: entry.timestamp,
                    })
                    .collect();
                (line, events)
            })
            .collect();

        ArrivalSnapshot {
            stop_id,
            built_at: self.timestamp,
            lines,
        }
    }
}

/// Error body of `GET /api/arrivals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub error: String,
    pub message: String,
}
