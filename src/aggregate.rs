// Per-line ordering and capping of extracted arrivals

use std::collections::BTreeMap;

use crate::models::{ArrivalEvent, LineLetter};

/// Earliest `per_line_cap` events in ascending predicted time. The sort is
/// stable, so equal times keep their feed order.
pub fn aggregate(mut events: Vec<ArrivalEvent>, per_line_cap: usize) -> Vec<ArrivalEvent> {
    events.sort_by_key(|e| e.predicted_epoch_seconds);
    events.truncate(per_line_cap);
    events
}

pub fn aggregate_lines(
    lines: BTreeMap<LineLetter, Vec<ArrivalEvent>>,
    per_line_cap: usize,
) -> BTreeMap<LineLetter, Vec<ArrivalEvent>> {
    lines
        .into_iter()
        .map(|(line, events)| (line, aggregate(events, per_line_cap)))
        .collect()
}
