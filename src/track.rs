// Placement of upcoming trains on a bounded horizontal track
//
// 0 minutes sits at the station end (5%), the horizon at the far end (95%).

const TRACK_START_PERCENT: f64 = 5.0;
const TRACK_END_PERCENT: f64 = 95.0;
const TRACK_SPAN_PERCENT: f64 = TRACK_END_PERCENT - TRACK_START_PERCENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityBucket {
    Arriving,
    Close,
    MidDistance,
    Distant,
}

impl ProximityBucket {
    pub fn for_minutes(minutes_remaining: i64) -> Self {
        match minutes_remaining {
            m if m <= 1 => ProximityBucket::Arriving,
            m if m <= 5 => ProximityBucket::Close,
            m if m <= 10 => ProximityBucket::MidDistance,
            _ => ProximityBucket::Distant,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProximityBucket::Arriving => "arriving",
            ProximityBucket::Close => "close",
            ProximityBucket::MidDistance => "mid-distance",
            ProximityBucket::Distant => "distant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition {
    pub percent: f64,
    pub bucket: ProximityBucket,
}

pub fn map_position(minutes_remaining: i64, max_minutes: i64) -> TrackPosition {
    let percent = if minutes_remaining <= 0 {
        TRACK_START_PERCENT
    } else {
        (TRACK_START_PERCENT + (minutes_remaining as f64 / max_minutes as f64) * TRACK_SPAN_PERCENT)
            .clamp(TRACK_START_PERCENT, TRACK_END_PERCENT)
    };

    TrackPosition {
        percent,
        bucket: ProximityBucket::for_minutes(minutes_remaining),
    }
}

/// Beyond the horizon a train is listed but not drawn.
pub fn is_on_track(minutes_remaining: i64, max_minutes: i64) -> bool {
    minutes_remaining <= max_minutes
}

/// "NOW", "1 min", or the bare number.
pub fn tooltip_label(minutes_remaining: i64) -> String {
    match minutes_remaining {
        m if m <= 0 => "NOW".to_string(),
        1 => "1 min".to_string(),
        m => m.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackTick {
    pub minute: i64,
    pub percent: f64,
    pub major: bool,
    pub label: Option<String>,
}

/// One tick per minute up to the horizon, major every five.
pub fn track_ticks(max_minutes: i64) -> Vec<TrackTick> {
    (0..=max_minutes)
        .map(|minute| {
            let major = minute % 5 == 0;
            TrackTick {
                minute,
                percent: TRACK_START_PERCENT + (minute as f64 / max_minutes as f64) * TRACK_SPAN_PERCENT,
                major,
                label: (major && minute != 0).then(|| minute.to_string()),
            }
        })
        .collect()
}
