// Render-time projection of the current snapshot into a board frame
//
// Everything here is a pure function of the store view and the current
// time, so it can run every tick without touching the network.

use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::io::Write;

use crate::config::BoardSettings;
use crate::countdown::{countdown_label, format_clock, format_clock_seconds, format_date, project};
use crate::models::{ArrivalEvent, LineLetter};
use crate::store::StoreView;
use crate::track::{ProximityBucket, TrackTick, is_on_track, map_position, tooltip_label, track_ticks};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArrival {
    pub minutes_remaining: i64,
    pub label: String,
    /// Clock time of the buffered arrival, so it always agrees with `label`.
    pub clock: String,
    pub arriving: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMarker {
    pub percent: f64,
    pub bucket: ProximityBucket,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackView {
    pub markers: Vec<TrackMarker>,
    /// Set when any marker is in the arriving bucket.
    pub imminent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineStatus {
    Loading,
    Unavailable,
    NoTrains,
    Arrivals(Vec<RenderedArrival>),
}

impl LineStatus {
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            LineStatus::Loading => Some("Loading..."),
            LineStatus::Unavailable => Some("Service unavailable"),
            LineStatus::NoTrains => Some("No trains scheduled"),
            LineStatus::Arrivals(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineBoard {
    pub line: LineLetter,
    pub status: LineStatus,
    pub track: TrackView,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardFrame {
    pub station: String,
    pub direction: String,
    pub header_time: String,
    pub header_date: String,
    pub lines: Vec<LineBoard>,
    /// Minute scale shared by every line's track.
    pub ticks: Vec<TrackTick>,
    pub footer: String,
}

pub struct BoardRenderer {
    station: String,
    direction: String,
    lines: BTreeSet<LineLetter>,
    buffer_secs: i64,
    track_max_minutes: i64,
    stale_after_secs: i64,
    timezone: Tz,
    ticks: Vec<TrackTick>,
}

impl BoardRenderer {
    pub fn new(settings: &BoardSettings, lines: &BTreeSet<LineLetter>) -> Self {
        BoardRenderer {
            station: settings.station.clone(),
            direction: settings.direction.clone(),
            lines: lines.clone(),
            buffer_secs: settings.safety_buffer_secs,
            track_max_minutes: settings.track_max_minutes,
            stale_after_secs: settings.stale_after_secs,
            timezone: settings.timezone,
            ticks: track_ticks(settings.track_max_minutes),
        }
    }

    pub fn render(&self, view: &StoreView, now: i64) -> BoardFrame {
        let unavailable = self.is_unavailable(view, now);

        let lines = self
            .lines
            .iter()
            .map(|&line| {
                let events = view.snapshot.as_ref().map(|s| s.arrivals(line));
                match (unavailable, events) {
                    (true, _) => LineBoard { line, status: LineStatus::Unavailable, track: TrackView::default() },
                    (false, None) => LineBoard { line, status: LineStatus::Loading, track: TrackView::default() },
                    (false, Some(events)) => self.render_line(line, events, now),
                }
            })
            .collect();

        BoardFrame {
            station: self.station.clone(),
            direction: self.direction.clone(),
            header_time: format_clock_seconds(now, self.timezone),
            header_date: format_date(now, self.timezone),
            lines,
            ticks: self.ticks.clone(),
            footer: self.footer(view),
        }
    }

    /// A failed poll only hides data once nothing usable is left.
    fn is_unavailable(&self, view: &StoreView, now: i64) -> bool {
        if view.last_failure.is_none() {
            return false;
        }
        match view.snapshot_age(now) {
            Some(age) => age > self.stale_after_secs,
            None => true,
        }
    }

    fn render_line(&self, line: LineLetter, events: &[ArrivalEvent], now: i64) -> LineBoard {
        let active: Vec<_> = events
            .iter()
            .map(|e| project(e.predicted_epoch_seconds, now, self.buffer_secs))
            .filter(|c| !c.is_passed)
            .collect();

        if active.is_empty() {
            return LineBoard { line, status: LineStatus::NoTrains, track: TrackView::default() };
        }

        let arrivals = active
            .iter()
            .map(|c| RenderedArrival {
                minutes_remaining: c.minutes_remaining,
                label: countdown_label(c.minutes_remaining),
                clock: format_clock(c.arrival.buffered_epoch_seconds, self.timezone),
                arriving: c.minutes_remaining <= 1,
            })
            .collect();

        let markers: Vec<TrackMarker> = active
            .iter()
            .filter(|c| is_on_track(c.minutes_remaining, self.track_max_minutes))
            .map(|c| {
                let position = map_position(c.minutes_remaining, self.track_max_minutes);
                TrackMarker {
                    percent: position.percent,
                    bucket: position.bucket,
                    tooltip: tooltip_label(c.minutes_remaining),
                }
            })
            .collect();
        let imminent = markers.iter().any(|m| m.bucket == ProximityBucket::Arriving);

        LineBoard {
            line,
            status: LineStatus::Arrivals(arrivals),
            track: TrackView { markers, imminent },
        }
    }

    fn footer(&self, view: &StoreView) -> String {
        match (&view.last_failure, &view.snapshot) {
            (Some(failure), _) => format!("Update failed at {}", format_clock_seconds(failure.at, self.timezone)),
            (None, Some(snapshot)) => format!("Updated {}", format_clock_seconds(snapshot.built_at, self.timezone)),
            (None, None) => String::new(),
        }
    }
}

// ============================================================================
// Render Targets
// ============================================================================

/// Whatever draws the board. Owned by the render task and dropped when the
/// task stops.
pub trait RenderSink: Send {
    fn render(&mut self, frame: &BoardFrame);
}

/// Plain-text board written to any `Write`.
pub struct TextSink<W: Write + Send> {
    out: W,
    track_width: usize,
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(out: W) -> Self {
        TextSink { out, track_width: 50 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn cell(&self, percent: f64) -> usize {
        let index = ((percent / 100.0) * (self.track_width - 1) as f64).round() as usize;
        index.min(self.track_width - 1)
    }

    fn draw_track(&self, track: &TrackView, ticks: &[TrackTick]) -> String {
        let mut cells = vec!['-'; self.track_width];
        for tick in ticks.iter().filter(|t| t.major) {
            cells[self.cell(tick.percent)] = '+';
        }
        cells[0] = '|';
        for marker in &track.markers {
            cells[self.cell(marker.percent)] = match marker.bucket {
                ProximityBucket::Arriving => '#',
                _ => '>',
            };
        }
        let mut line: String = cells.into_iter().collect();
        if track.imminent {
            line.push_str("  ARRIVING");
        }
        line
    }

    fn write_frame(&mut self, frame: &BoardFrame) -> std::io::Result<()> {
        writeln!(self.out, "{}  {}", frame.station, frame.header_time)?;
        writeln!(self.out, "{}  {}", frame.direction, frame.header_date)?;
        for line in &frame.lines {
            let text = match &line.status {
                LineStatus::Arrivals(arrivals) => arrivals
                    .iter()
                    .map(|a| format!("{} ({})", a.label, a.clock))
                    .collect::<Vec<_>>()
                    .join("   "),
                other => other.placeholder().unwrap_or_default().to_string(),
            };
            writeln!(self.out, "[{}] {}", line.line, text)?;
            writeln!(self.out, "    {}", self.draw_track(&line.track, &frame.ticks))?;
        }
        writeln!(self.out, "{}", frame.footer)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<W: Write + Send> RenderSink for TextSink<W> {
    fn render(&mut self, frame: &BoardFrame) {
        if let Err(e) = self.write_frame(frame) {
            tracing::error!(error = %e, "Failed to write board frame");
        }
    }
}
