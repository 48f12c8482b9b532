// GTFS-RT trip update ingestion for a single stop
//
// Decodes a FeedMessage, keeps the stop-time updates for the target stop on
// the target lines, and turns them into future ArrivalEvents.

use chrono::DateTime;
use gtfs_rt::FeedMessage;
use gtfs_rt::trip_update::StopTimeUpdate;
use prost::Message;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::{FeedError, Result};
use crate::models::{ArrivalEvent, LineLetter};

/// Which stop and which lines an ingestion pass keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTarget {
    pub stop_id: String,
    pub lines: BTreeSet<LineLetter>,
}

impl FeedTarget {
    pub fn new(stop_id: impl Into<String>, lines: impl IntoIterator<Item = LineLetter>) -> Self {
        FeedTarget {
            stop_id: stop_id.into(),
            lines: lines.into_iter().collect(),
        }
    }

    /// A map holding an empty list for every target line.
    pub fn empty_lines(&self) -> BTreeMap<LineLetter, Vec<ArrivalEvent>> {
        self.lines.iter().map(|l| (*l, Vec::new())).collect()
    }
}

pub fn decode_feed(raw: &[u8]) -> Result<FeedMessage> {
    FeedMessage::decode(raw)
        .map_err(|e| FeedError::Decode(format!("Failed to decode trip updates feed: {}", e)))
}

/// Decodes `raw` and extracts the arrivals for `target`. Every target line is
/// present in the result; an empty list is a valid outcome.
pub fn ingest(
    raw: &[u8],
    now: i64,
    target: &FeedTarget,
) -> Result<BTreeMap<LineLetter, Vec<ArrivalEvent>>> {
    let feed = decode_feed(raw)?;
    Ok(extract_arrivals(&feed, now, target))
}

pub fn extract_arrivals(
    feed: &FeedMessage,
    now: i64,
    target: &FeedTarget,
) -> BTreeMap<LineLetter, Vec<ArrivalEvent>> {
    let mut arrivals = target.empty_lines();
    let mut rejected = 0usize;

    for entity in &feed.entity {
        let Some(trip_update) = entity.trip_update.as_ref() else {
            continue;
        };
        let Some(route_id) = trip_update.trip.route_id.as_deref() else {
            continue;
        };
        let Some(line) = LineLetter::from_route_id(route_id) else {
            continue;
        };
        let Some(events) = arrivals.get_mut(&line) else {
            continue;
        };

        for stu in &trip_update.stop_time_update {
            if stu.stop_id.as_deref() != Some(target.stop_id.as_str()) {
                continue;
            }
            let Some(raw_time) = preferred_time(stu) else {
                continue;
            };
            let predicted = match normalize_event_time(raw_time) {
                Ok(t) => t,
                Err(e) => {
                    warn!(entity = %entity.id, route_id, error = %e, "Rejecting stop-time update");
                    rejected += 1;
                    continue;
                }
            };
            if predicted <= now {
                continue;
            }

            events.push(ArrivalEvent {
                route_id: route_id.to_string(),
                line,
                stop_id: target.stop_id.clone(),
                predicted_epoch_seconds: predicted,
            });
        }
    }

    debug!(
        entities = feed.entity.len(),
        kept = arrivals.values().map(Vec::len).sum::<usize>(),
        rejected,
        "Extracted arrivals"
    );
    arrivals
}

/// Arrival time when present, otherwise departure time.
fn preferred_time(stu: &StopTimeUpdate) -> Option<i64> {
    stu.arrival
        .as_ref()
        .and_then(|a| a.time)
        .or_else(|| stu.departure.as_ref().and_then(|d| d.time))
}

/// The wire field is a 64-bit varint; anything that is not a positive,
/// representable POSIX time is refused instead of being coerced.
pub fn normalize_event_time(raw: i64) -> Result<i64> {
    if raw <= 0 {
        return Err(FeedError::Decode(format!("non-positive event time {}", raw)));
    }
    if DateTime::from_timestamp(raw, 0).is_none() {
        return Err(FeedError::Decode(format!("event time {} out of range", raw)));
    }
    Ok(raw)
}
