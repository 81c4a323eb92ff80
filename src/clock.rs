use crate::error::{ModelError, ModelResult};
use chrono::{Duration, NaiveDateTime, Timelike, Utc};

/// A time step, given either as a duration or as a raw count of seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep(f64);

impl TimeStep {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl From<Duration> for TimeStep {
    fn from(d: Duration) -> Self {
        TimeStep(duration_seconds(d))
    }
}

impl From<std::time::Duration> for TimeStep {
    fn from(d: std::time::Duration) -> Self {
        TimeStep(d.as_secs_f64())
    }
}

impl From<u32> for TimeStep {
    fn from(secs: u32) -> Self {
        TimeStep(secs as f64)
    }
}

impl From<i64> for TimeStep {
    fn from(secs: i64) -> Self {
        TimeStep(secs as f64)
    }
}

impl From<f64> for TimeStep {
    fn from(secs: f64) -> Self {
        TimeStep(secs)
    }
}

/// Where a run currently is.
///
/// A run yields exactly `num_time_steps` steps, indexed `0..num_time_steps`.
/// The clock reports `Finished` as soon as the last of them (index
/// `num_time_steps - 1`) has been taken, so the final model time is
/// `start_time + (num_time_steps - 1) * time_step`, one step short of
/// `start_time + duration` when the duration divides evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Finished,
}

/// Smallest accepted time step, in seconds. Model time has nanosecond resolution.
pub const MIN_TIME_STEP: f64 = 1e-6;

/// Owns simulation time. `model_time` is always derived from `current_step`.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start_time: NaiveDateTime,
    time_step: f64, // seconds
    duration: Duration,
    current_step: i64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        SimulationClock {
            start_time: round_time(Utc::now().naive_utc(), 3600),
            time_step: 15.0 * 60.0,
            duration: Duration::days(1),
            current_step: -1,
        }
    }
}

impl SimulationClock {
    pub fn new(start_time: NaiveDateTime, time_step: impl Into<TimeStep>, duration: Duration) -> ModelResult<Self> {
        let time_step = time_step.into().seconds();
        check_timing(time_step, duration)?;
        Ok(SimulationClock {
            start_time,
            time_step,
            duration,
            current_step: -1,
        })
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    /// Time step in seconds.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// -1 before the run has started.
    pub fn current_step(&self) -> i64 {
        self.current_step
    }

    pub fn num_time_steps(&self) -> i64 {
        (duration_seconds(self.duration) / self.time_step).floor() as i64
    }

    pub fn model_time(&self) -> NaiveDateTime {
        let nanos = (self.time_step * self.current_step.max(0) as f64 * 1e9).round() as i64;
        self.start_time + Duration::nanoseconds(nanos)
    }

    /// A run produces `num_time_steps` steps, indexed `0..num_time_steps`.
    pub fn state(&self) -> RunState {
        if self.current_step + 1 >= self.num_time_steps() {
            RunState::Finished
        } else if self.current_step < 0 {
            RunState::NotStarted
        } else {
            RunState::Running
        }
    }

    pub(crate) fn set_start_time(&mut self, start_time: NaiveDateTime) {
        self.start_time = start_time;
    }

    /// Normalizes to seconds; the clock is left unchanged on error.
    pub(crate) fn set_time_step(&mut self, time_step: impl Into<TimeStep>) -> ModelResult<()> {
        let secs = time_step.into().seconds();
        check_timing(secs, self.duration)?;
        self.time_step = secs;
        Ok(())
    }

    /// Returns whether the new duration is shorter than the old one.
    pub(crate) fn set_duration(&mut self, duration: Duration) -> ModelResult<bool> {
        check_timing(self.time_step, duration)?;
        let shorter = duration < self.duration;
        self.duration = duration;
        Ok(shorter)
    }

    pub(crate) fn reset(&mut self) {
        self.current_step = -1;
    }

    pub(crate) fn advance(&mut self) {
        self.current_step += 1;
    }
}

/// A time step of at least `MIN_TIME_STEP` and a duration covering at least one step.
fn check_timing(time_step: f64, duration: Duration) -> ModelResult<()> {
    if !(time_step.is_finite() && time_step >= MIN_TIME_STEP) {
        return Err(ModelError::Configuration(format!(
            "time step must be at least {} s, got {} s",
            MIN_TIME_STEP, time_step
        )));
    }
    if duration < Duration::zero() {
        return Err(ModelError::Configuration(format!(
            "duration must not be negative, got {}",
            duration
        )));
    }
    let secs = duration_seconds(duration);
    let steps = (secs / time_step).floor();
    if steps < 1.0 {
        return Err(ModelError::Configuration(format!(
            "duration of {} s is shorter than one time step of {} s",
            secs, time_step
        )));
    }
    // Step indices are stored as u32.
    if steps > u32::MAX as f64 {
        return Err(ModelError::Configuration(format!(
            "{} s at {} s per step exceeds {} steps",
            secs,
            time_step,
            u32::MAX
        )));
    }
    Ok(())
}

/// Duration as fractional seconds.
pub fn duration_seconds(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => d.num_milliseconds() as f64 / 1e3,
    }
}

/// Rounds `time` to the nearest multiple of `round_to` seconds.
pub fn round_time(time: NaiveDateTime, round_to: i64) -> NaiveDateTime {
    let seconds = time.num_seconds_from_midnight() as i64;
    let floor = time - Duration::seconds(seconds % round_to) - Duration::nanoseconds(time.nanosecond() as i64);
    if seconds % round_to * 2 >= round_to {
        floor + Duration::seconds(round_to)
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 2, 13).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn fifteen_minute_steps_over_an_hour() {
        let clock = SimulationClock::new(t0(), Duration::minutes(15), Duration::hours(1)).unwrap();
        assert_eq!(clock.time_step(), 900.0);
        assert_eq!(clock.num_time_steps(), 4);
        assert_eq!(clock.state(), RunState::NotStarted);
        assert_eq!(clock.model_time(), t0());
    }

    #[test]
    fn time_step_accepts_seconds_and_durations() {
        let mut clock = SimulationClock::new(t0(), 600u32, Duration::hours(1)).unwrap();
        assert_eq!(clock.time_step(), 600.0);
        clock.set_time_step(std::time::Duration::from_secs(1200)).unwrap();
        assert_eq!(clock.time_step(), 1200.0);
        clock.set_time_step(450.5).unwrap();
        assert_eq!(clock.time_step(), 450.5);
        clock.set_time_step(Duration::seconds(300)).unwrap();
        assert_eq!(clock.num_time_steps(), 12);
    }

    #[test]
    fn rejects_non_positive_time_step_and_keeps_old_value() {
        let mut clock = SimulationClock::new(t0(), 900u32, Duration::hours(1)).unwrap();
        assert!(matches!(clock.set_time_step(0u32), Err(ModelError::Configuration(_))));
        assert!(clock.set_time_step(-5.0).is_err());
        assert!(clock.set_time_step(f64::NAN).is_err());
        assert_eq!(clock.time_step(), 900.0);
    }

    #[test]
    fn model_time_follows_the_step_index() {
        let mut clock = SimulationClock::new(t0(), 900u32, Duration::hours(1)).unwrap();
        clock.advance();
        assert_eq!(clock.model_time(), t0());
        assert_eq!(clock.state(), RunState::Running);
        clock.advance();
        clock.advance();
        assert_eq!(clock.model_time(), t0() + Duration::minutes(30));
        assert_eq!(clock.state(), RunState::Running);
        clock.advance();
        assert_eq!(clock.current_step(), 3);
        assert_eq!(clock.model_time(), t0() + Duration::minutes(45));
        assert_eq!(clock.state(), RunState::Finished);
        clock.reset();
        assert_eq!(clock.current_step(), -1);
        assert_eq!(clock.model_time(), t0());
    }

    #[test]
    fn duration_shorter_than_one_step_is_rejected() {
        assert!(matches!(
            SimulationClock::new(t0(), 900u32, Duration::minutes(10)),
            Err(ModelError::Configuration(_))
        ));
        let mut clock = SimulationClock::new(t0(), 900u32, Duration::hours(1)).unwrap();
        assert!(matches!(clock.set_duration(Duration::minutes(10)), Err(ModelError::Configuration(_))));
        assert!(clock.set_time_step(Duration::hours(2)).is_err());
        assert_eq!(clock.duration(), Duration::hours(1));
        assert_eq!(clock.time_step(), 900.0);
        let single = SimulationClock::new(t0(), 900u32, Duration::minutes(15)).unwrap();
        assert_eq!(single.num_time_steps(), 1);
        assert_eq!(single.state(), RunState::NotStarted);
    }

    #[test]
    fn step_count_must_fit_the_step_index() {
        let longest = Duration::seconds(u32::MAX as i64);
        let clock = SimulationClock::new(t0(), 1u32, longest).unwrap();
        assert_eq!(clock.num_time_steps(), u32::MAX as i64);
        assert!(matches!(
            SimulationClock::new(t0(), 1u32, longest + Duration::seconds(1)),
            Err(ModelError::Configuration(_))
        ));
        assert!(SimulationClock::new(t0(), 1e-6, Duration::days(365)).is_err());
    }

    #[test]
    fn tiny_time_steps_still_move_model_time() {
        let mut clock = SimulationClock::new(t0(), 1e-6, Duration::seconds(1)).unwrap();
        for _ in 0..3 {
            clock.advance();
        }
        assert_eq!(clock.current_step(), 2);
        assert_eq!(clock.model_time(), t0() + Duration::microseconds(2));
        clock.set_time_step(2.5e-6).unwrap();
        assert_eq!(clock.model_time(), t0() + Duration::nanoseconds(5_000));
        assert!(matches!(clock.set_time_step(1e-7), Err(ModelError::Configuration(_))));
        assert_eq!(clock.time_step(), 2.5e-6);
    }

    #[test]
    fn set_duration_reports_shortening() {
        let mut clock = SimulationClock::new(t0(), 900u32, Duration::hours(2)).unwrap();
        assert!(!clock.set_duration(Duration::hours(3)).unwrap());
        assert!(clock.set_duration(Duration::hours(1)).unwrap());
        assert!(clock.set_duration(Duration::seconds(-1)).is_err());
        assert_eq!(clock.num_time_steps(), 4);
    }

    #[test]
    fn round_time_to_nearest_hour() {
        let early = t0() + Duration::minutes(29);
        let late = t0() + Duration::minutes(31);
        assert_eq!(round_time(early, 3600), t0());
        assert_eq!(round_time(late, 3600), t0() + Duration::hours(1));
    }

    proptest! {
        #[test]
        fn num_time_steps_is_floor_of_ratio(dt in 1u32..86_400, duration in 86_400i64..30 * 86_400) {
            let mut clock = SimulationClock::new(t0(), dt, Duration::seconds(duration)).unwrap();
            prop_assert_eq!(clock.num_time_steps(), duration / dt as i64);
            clock.set_duration(Duration::seconds(duration + 3600)).unwrap();
            prop_assert_eq!(clock.num_time_steps(), (duration + 3600) / dt as i64);
        }

        #[test]
        fn model_time_is_derived_from_index(dt in 1u32..7200, steps in 0i64..500) {
            let mut clock = SimulationClock::new(t0(), dt, Duration::days(365)).unwrap();
            for _ in 0..=steps {
                clock.advance();
            }
            prop_assert_eq!(clock.current_step(), steps);
            prop_assert_eq!(clock.model_time(), t0() + Duration::seconds(steps * dt as i64));
        }
    }
}
