// Minutes-remaining countdown against the wall clock, with safety buffer

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A raw prediction and the buffered time everything on screen derives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedArrival {
    pub predicted_epoch_seconds: i64,
    pub buffered_epoch_seconds: i64,
}

impl BufferedArrival {
    pub fn new(predicted_epoch_seconds: i64, buffer_secs: i64) -> Self {
        BufferedArrival {
            predicted_epoch_seconds,
            buffered_epoch_seconds: predicted_epoch_seconds.saturating_sub(buffer_secs),
        }
    }

    /// Strictly before `now`; an arrival buffered to exactly `now` is still shown.
    pub fn is_passed(&self, now: i64) -> bool {
        self.buffered_epoch_seconds < now
    }

    /// Whole minutes left, floored and never negative.
    pub fn minutes_remaining(&self, now: i64) -> i64 {
        self.buffered_epoch_seconds.saturating_sub(now).div_euclid(60).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub arrival: BufferedArrival,
    pub minutes_remaining: i64,
    pub is_passed: bool,
}

pub fn project(predicted_epoch_seconds: i64, now: i64, buffer_secs: i64) -> Countdown {
    let arrival = BufferedArrival::new(predicted_epoch_seconds, buffer_secs);
    Countdown {
        arrival,
        minutes_remaining: arrival.minutes_remaining(now),
        is_passed: arrival.is_passed(now),
    }
}

/// "NOW", "1 min", or "<n> min".
pub fn countdown_label(minutes_remaining: i64) -> String {
    match minutes_remaining {
        m if m <= 0 => "NOW".to_string(),
        1 => "1 min".to_string(),
        m => format!("{} min", m),
    }
}

pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

fn local_time(epoch: i64, tz: Tz) -> Option<DateTime<Tz>> {
    Utc.timestamp_opt(epoch, 0).single().map(|dt| dt.with_timezone(&tz))
}

/// "3:07 PM" in `tz`.
pub fn format_clock(epoch: i64, tz: Tz) -> String {
    match local_time(epoch, tz) {
        Some(dt) => dt.format("%-I:%M %p").to_string(),
        None => format!("Invalid timestamp: {}", epoch),
    }
}

/// "3:07:09 PM" in `tz`.
pub fn format_clock_seconds(epoch: i64, tz: Tz) -> String {
    match local_time(epoch, tz) {
        Some(dt) => dt.format("%-I:%M:%S %p").to_string(),
        None => format!("Invalid timestamp: {}", epoch),
    }
}

/// "Mon, Oct 19" in `tz`.
pub fn format_date(epoch: i64, tz: Tz) -> String {
    match local_time(epoch, tz) {
        Some(dt) => dt.format("%a, %b %-d").to_string(),
        None => format!("Invalid timestamp: {}", epoch),
    }
}
