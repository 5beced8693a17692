//! Synthetic sample generator used when no hardware link is open.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::display::Event;
use crate::sample::Sample;

/// Produces the events of one simulation tick.
///
/// Every tick moves the sweep to a random position. Independently, with
/// probability `detection_probability`, the same reading is also logged as
/// a detection.
#[derive(Debug)]
pub struct Simulator {
    rng: StdRng,
    config: SimulationConfig,
}

impl Simulator {
    /// Create a generator, seeded from `config.seed` or from entropy.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, config }
    }

    /// Generate the events for one tick at wall-clock time `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let angle = self.rng.gen_range(0..self.config.angle_max.max(1));
        let distance = if self.config.distance_min < self.config.distance_max {
            self.rng
                .gen_range(self.config.distance_min..self.config.distance_max)
        } else {
            self.config.distance_min
        };

        let mut events = vec![Event::SweepMoved {
            angle,
            distance,
            at: now,
        }];
        if self
            .rng
            .gen_bool(self.config.detection_probability.clamp(0.0, 1.0))
        {
            events.push(Event::SampleArrived(Sample::at(angle, distance, now)));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayState, HISTORY_CAPACITY};

    fn config(seed: u64, probability: f64) -> SimulationConfig {
        SimulationConfig {
            seed: Some(seed),
            detection_probability: probability,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_tick_stays_within_bounds() {
        let mut sim = Simulator::new(config(1, 0.5));
        for _ in 0..500 {
            for event in sim.tick(Utc::now()) {
                if let Event::SweepMoved { angle, distance, .. } = event {
                    assert!((0..180).contains(&angle));
                    assert!((20..220).contains(&distance));
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let now = Utc::now();
        let mut a = Simulator::new(config(42, 0.3));
        let mut b = Simulator::new(config(42, 0.3));
        for _ in 0..50 {
            assert_eq!(a.tick(now), b.tick(now));
        }
    }

    #[test]
    fn test_probability_one_always_logs() {
        let mut sim = Simulator::new(config(3, 1.0));
        for _ in 0..20 {
            let events = sim.tick(Utc::now());
            assert_eq!(events.len(), 2);
            match (&events[0], &events[1]) {
                (Event::SweepMoved { angle, distance, .. }, Event::SampleArrived(s)) => {
                    assert_eq!((*angle, *distance), (s.angle, s.distance));
                }
                other => panic!("unexpected events {other:?}"),
            }
        }
    }

    #[test]
    fn test_probability_zero_never_logs() {
        let mut sim = Simulator::new(config(3, 0.0));
        for _ in 0..20 {
            assert_eq!(sim.tick(Utc::now()).len(), 1);
        }
    }

    #[test]
    fn test_ten_logged_ticks_update_display() {
        let mut sim = Simulator::new(SimulationConfig {
            seed: Some(2025),
            detection_probability: 1.0,
            distance_min: 300,
            distance_max: 500,
            ..SimulationConfig::default()
        });
        let mut state = DisplayState::new();
        let mut in_range = 0;

        for _ in 0..10 {
            for event in sim.tick(Utc::now()) {
                if let Event::SampleArrived(sample) = &event {
                    if sample.is_in_range() {
                        in_range += 1;
                    }
                }
                state.apply(event);
            }
            assert!(state.history().len() <= HISTORY_CAPACITY);
        }

        assert_eq!(state.total_count(), 10);
        assert_eq!(state.history().len(), HISTORY_CAPACITY);
        assert_eq!(state.detected_count(), in_range);
    }
}
