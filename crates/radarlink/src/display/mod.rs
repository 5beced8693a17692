//! Display engine: the state behind the radar view.
//!
//! All updates go through [`DisplayState::apply`] (or the pure [`reduce`]),
//! one [`Event`] at a time. The view itself is derived: [`render`] draws the
//! sweep, [`DisplayState::history_rows`] feeds the table, and
//! [`DisplayState::statistics`] feeds the stats panel.

mod canvas;
mod svg;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::sample::{Sample, Status};

pub use canvas::{render, ConicGradient, GradientStop, Point, RadarGeometry, Rgba, Surface};
pub use svg::SvgSurface;

/// Number of detections kept for display.
pub const HISTORY_CAPACITY: usize = 5;

/// Which source currently drives the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The synthetic generator.
    #[default]
    Simulating,
    /// Opening the hardware link.
    Connecting,
    /// The hardware link.
    Live,
}

impl Mode {
    /// Link state implied by this mode.
    #[must_use]
    pub fn link_state(self) -> LinkState {
        match self {
            Self::Simulating => LinkState::Disconnected,
            Self::Connecting => LinkState::Connecting,
            Self::Live => LinkState::Connected,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulating => write!(f, "simulating"),
            Self::Connecting => write!(f, "connecting"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// State of the hardware link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No link open.
    Disconnected,
    /// Open in progress.
    Connecting,
    /// Link open and decoding.
    Connected,
}

/// Something that changes the display.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A sample was logged: moves the sweep, enters the history, counts.
    SampleArrived(Sample),
    /// The sweep moved without logging a detection.
    SweepMoved {
        /// New sweep angle in degrees.
        angle: i32,
        /// Distance reading at that angle.
        distance: u32,
        /// When the reading was taken.
        at: DateTime<Utc>,
    },
    /// The controller switched source.
    ModeChanged(Mode),
    /// The user asked to open the link.
    ConnectRequested,
    /// The user asked to close the link.
    DisconnectRequested,
}

/// One entry of the bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    /// Arrival sequence number.
    pub id: u64,
    /// The logged sample.
    pub sample: Sample,
}

impl Detection {
    /// Short display id: `#` plus the last two digits of the id.
    #[must_use]
    pub fn short_id(&self) -> String {
        format!("#{:02}", self.id % 100)
    }

    /// Detection status of the sample.
    #[must_use]
    pub fn status(&self) -> Status {
        self.sample.status()
    }
}

/// One row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    /// Short id.
    pub short_id: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    /// Distance in centimeters.
    pub distance: u32,
    /// Angle in degrees.
    pub angle: i32,
    /// In or out of range.
    pub status: Status,
}

/// Contents of the statistics panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// In-range samples seen.
    pub detected_count: u64,
    /// Current sweep angle.
    pub current_angle: i32,
    /// Current distance reading.
    pub current_distance: u32,
    /// All samples seen.
    pub total_count: u64,
    /// Whole seconds since the last reading, if any.
    pub seconds_since_last: Option<i64>,
}

impl Statistics {
    /// "Time since last sample" label.
    #[must_use]
    pub fn since_last_label(&self) -> String {
        match self.seconds_since_last {
            Some(secs) => format!("{secs} s ago"),
            None => "no samples yet".to_string(),
        }
    }
}

/// Everything the radar view shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayState {
    current_angle: i32,
    current_distance: u32,
    history: VecDeque<Detection>,
    detected_count: u64,
    total_count: u64,
    last_sample_at: Option<DateTime<Utc>>,
    mode: Mode,
    next_id: u64,
}

/// Apply `event` to `state` and return the new state.
#[must_use]
pub fn reduce(mut state: DisplayState, event: Event) -> DisplayState {
    state.apply(event);
    state
}

impl DisplayState {
    /// Fresh state in simulation mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event in place.
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::SampleArrived(sample) => self.log_sample(sample),
            Event::SweepMoved {
                angle,
                distance,
                at,
            } => {
                self.current_angle = angle;
                self.current_distance = distance;
                self.last_sample_at = Some(at);
            }
            Event::ModeChanged(mode) => self.mode = mode,
            Event::ConnectRequested => {
                if self.mode == Mode::Simulating {
                    self.mode = Mode::Connecting;
                }
            }
            Event::DisconnectRequested => self.mode = Mode::Simulating,
        }
    }

    fn log_sample(&mut self, sample: Sample) {
        self.current_angle = sample.angle;
        self.current_distance = sample.distance;
        self.last_sample_at = Some(sample.timestamp);
        self.total_count += 1;
        if sample.is_in_range() {
            self.detected_count += 1;
        }

        self.next_id += 1;
        self.history.push_front(Detection {
            id: self.next_id,
            sample,
        });
        self.history.truncate(HISTORY_CAPACITY);
    }

    /// Current sweep angle in degrees.
    #[must_use]
    pub fn current_angle(&self) -> i32 {
        self.current_angle
    }

    /// Current distance in centimeters.
    #[must_use]
    pub fn current_distance(&self) -> u32 {
        self.current_distance
    }

    /// Recent detections, newest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Detection> {
        self.history.iter()
    }

    /// In-range samples seen.
    #[must_use]
    pub fn detected_count(&self) -> u64 {
        self.detected_count
    }

    /// All samples seen.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Current source mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Derived link state.
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        self.mode.link_state()
    }

    /// Statistics as of `now`. The age is clamped at zero when the clock
    /// moved backwards.
    #[must_use]
    pub fn statistics(&self, now: DateTime<Utc>) -> Statistics {
        Statistics {
            detected_count: self.detected_count,
            current_angle: self.current_angle,
            current_distance: self.current_distance,
            total_count: self.total_count,
            seconds_since_last: self
                .last_sample_at
                .map(|at| (now - at).num_seconds().max(0)),
        }
    }

    /// Table rows for the history, newest first.
    #[must_use]
    pub fn history_rows(&self) -> Vec<HistoryRow> {
        self.history
            .iter()
            .map(|d| HistoryRow {
                short_id: d.short_id(),
                timestamp: d
                    .sample
                    .timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                distance: d.sample.distance,
                angle: d.sample.angle,
                status: d.status(),
            })
            .collect()
    }
}

/// Display state shared between the controller and readers.
#[derive(Debug, Clone, Default)]
pub struct SharedDisplay {
    inner: Arc<Mutex<DisplayState>>,
}

impl SharedDisplay {
    /// Wrap a state.
    #[must_use]
    pub fn new(state: DisplayState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Apply an event.
    pub fn apply(&self, event: Event) {
        self.lock().apply(event);
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DisplayState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::RANGE_MAX_CM;
    use chrono::{Duration, TimeZone};

    fn t(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 16, 14, 32, second).unwrap()
    }

    fn arrived(angle: i32, distance: u32, second: u32) -> Event {
        Event::SampleArrived(Sample::at(angle, distance, t(second)))
    }

    #[test]
    fn test_sample_updates_current_and_counters() {
        let state = reduce(DisplayState::new(), arrived(127, 83, 1));
        assert_eq!(state.current_angle(), 127);
        assert_eq!(state.current_distance(), 83);
        assert_eq!(state.total_count(), 1);
        assert_eq!(state.detected_count(), 1);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_out_of_range_counts_total_only() {
        let state = reduce(DisplayState::new(), arrived(10, RANGE_MAX_CM + 1, 1));
        assert_eq!(state.total_count(), 1);
        assert_eq!(state.detected_count(), 0);

        let state = reduce(state, arrived(10, RANGE_MAX_CM, 2));
        assert_eq!(state.total_count(), 2);
        assert_eq!(state.detected_count(), 1);
    }

    #[test]
    fn test_history_bounded_newest_first() {
        let mut state = DisplayState::new();
        for i in 0..12u32 {
            state.apply(arrived(i as i32, 100, i));
            assert!(state.history().len() <= HISTORY_CAPACITY);

            let stamps: Vec<_> = state.history().map(|d| d.sample.timestamp).collect();
            assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
        }

        let angles: Vec<_> = state.history().map(|d| d.sample.angle).collect();
        assert_eq!(angles, vec![11, 10, 9, 8, 7]);
        assert_eq!(state.total_count(), 12);
    }

    #[test]
    fn test_sweep_moves_without_logging() {
        let state = reduce(
            DisplayState::new(),
            Event::SweepMoved {
                angle: 45,
                distance: 60,
                at: t(3),
            },
        );
        assert_eq!(state.current_angle(), 45);
        assert_eq!(state.current_distance(), 60);
        assert_eq!(state.total_count(), 0);
        assert_eq!(state.history().len(), 0);
        assert_eq!(state.statistics(t(5)).seconds_since_last, Some(2));
    }

    #[test]
    fn test_mode_transitions() {
        let mut state = DisplayState::new();
        assert_eq!(state.mode(), Mode::Simulating);
        assert_eq!(state.link_state(), LinkState::Disconnected);

        state.apply(Event::ConnectRequested);
        assert_eq!(state.mode(), Mode::Connecting);
        assert_eq!(state.link_state(), LinkState::Connecting);

        state.apply(Event::ModeChanged(Mode::Live));
        assert_eq!(state.link_state(), LinkState::Connected);

        // Already live: a second connect request changes nothing.
        state.apply(Event::ConnectRequested);
        assert_eq!(state.mode(), Mode::Live);

        state.apply(Event::DisconnectRequested);
        assert_eq!(state.mode(), Mode::Simulating);
    }

    #[test]
    fn test_statistics() {
        let mut state = DisplayState::new();
        assert_eq!(state.statistics(t(0)).since_last_label(), "no samples yet");

        state.apply(arrived(30, 120, 10));
        state.apply(arrived(60, 900, 12));

        let stats = state.statistics(t(20));
        assert_eq!(stats.detected_count, 1);
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.current_angle, 60);
        assert_eq!(stats.current_distance, 900);
        assert_eq!(stats.seconds_since_last, Some(8));
        assert_eq!(stats.since_last_label(), "8 s ago");
    }

    #[test]
    fn test_statistics_clamps_clock_skew() {
        let state = reduce(DisplayState::new(), arrived(1, 1, 30));
        let stats = state.statistics(t(30) - Duration::seconds(10));
        assert_eq!(stats.seconds_since_last, Some(0));
    }

    #[test]
    fn test_history_rows() {
        let mut state = DisplayState::new();
        state.apply(arrived(86, 95, 1));
        state.apply(arrived(20, 401, 2));

        let rows = state.history_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].short_id, "#02");
        assert_eq!(rows[0].angle, 20);
        assert_eq!(rows[0].status, Status::OutOfRange);
        assert_eq!(rows[1].short_id, "#01");
        assert_eq!(rows[1].distance, 95);
        assert_eq!(rows[1].status, Status::InRange);
        assert_eq!(rows[1].timestamp.len(), "2025-01-16 14:32:01".len());
    }

    #[test]
    fn test_short_id_wraps() {
        let d = Detection {
            id: 1247,
            sample: Sample::at(0, 0, t(0)),
        };
        assert_eq!(d.short_id(), "#47");
    }

    #[test]
    fn test_shared_display() {
        let shared = SharedDisplay::default();
        let other = shared.clone();
        shared.apply(arrived(5, 5, 5));
        assert_eq!(other.snapshot().total_count(), 1);
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Mode::Live).unwrap(), "\"live\"");
        assert_eq!(
            serde_json::to_string(&LinkState::Disconnected).unwrap(),
            "\"disconnected\""
        );
    }
}
