//! Time references the dispatcher can follow.
//!
//! A [`ClockSource`] is polled, never pushed: every call returns a fresh
//! [`ClockReading`] snapshot of the media position. Readings may jump
//! backwards near start/stop boundaries, and a clock that has not started
//! yet reports `advancing == false`.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Snapshot of the external time reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    /// Media offset in milliseconds. Negative values are invalid readings.
    pub position_ms: i64,
    /// Whether the reference is currently producing positions.
    pub advancing: bool,
}

impl ClockReading {
    pub fn advancing(position_ms: i64) -> Self {
        Self {
            position_ms,
            advancing: true,
        }
    }

    pub fn stopped(position_ms: i64) -> Self {
        Self {
            position_ms,
            advancing: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.position_ms >= 0
    }
}

/// Poll-style time reference. Must be cheap enough to call every few ms.
pub trait ClockSource {
    fn poll(&mut self) -> ClockReading;
}

impl<C: ClockSource + ?Sized> ClockSource for &mut C {
    fn poll(&mut self) -> ClockReading {
        (**self).poll()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Box<C> {
    fn poll(&mut self) -> ClockReading {
        (**self).poll()
    }
}

/// Blocking wait between polls and during pulse holds.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Returns immediately, only tallying how long it was asked to wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPause {
    pub total: Duration,
    pub calls: usize,
}

impl Pause for NoPause {
    fn pause(&mut self, duration: Duration) {
        self.total += duration;
        self.calls += 1;
    }
}

impl<P: Pause + ?Sized> Pause for &mut P {
    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// Cloneable flag that makes a [`WallClock`] report `advancing == false`.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Monotonic clock measured from [`WallClock::start`], or from the first
/// poll when built with [`WallClock::on_first_poll`].
#[derive(Debug, Default)]
pub struct WallClock {
    started: Option<Instant>,
    length: Option<Duration>,
    start_on_poll: bool,
    stop: StopHandle,
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops advancing once `length` has elapsed since the start.
    pub fn with_length(length: Duration) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    /// Starts counting the first time the clock is polled.
    pub fn on_first_poll(mut self) -> Self {
        self.start_on_poll = true;
        self
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl ClockSource for WallClock {
    fn poll(&mut self) -> ClockReading {
        if self.started.is_none() && self.start_on_poll {
            self.start();
        }
        let Some(started) = self.started else {
            return ClockReading::stopped(0);
        };

        let elapsed = started.elapsed();
        let position_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let finished = self.length.map(|length| elapsed >= length).unwrap_or(false);

        if finished || self.stop.is_stopped() {
            ClockReading::stopped(position_ms)
        } else {
            ClockReading::advancing(position_ms)
        }
    }
}

/// Clock driven explicitly by its owner, e.g. from a playback callback.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    position_ms: i64,
    advancing: bool,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.position_ms = 0;
        self.advancing = false;
    }

    pub fn play(&mut self) {
        self.advancing = true;
    }

    pub fn stop(&mut self) {
        self.advancing = false;
    }

    pub fn set(&mut self, position_ms: i64) {
        self.position_ms = position_ms;
    }

    pub fn advance(&mut self, delta_ms: i64) {
        self.position_ms = (self.position_ms + delta_ms).max(0);
    }
}

impl ClockSource for ManualClock {
    fn poll(&mut self) -> ClockReading {
        ClockReading {
            position_ms: self.position_ms,
            advancing: self.advancing,
        }
    }
}

/// Replays a fixed sequence of readings; once exhausted it reports the last
/// position as stopped.
#[derive(Debug, Clone)]
pub struct ScriptedClock {
    readings: VecDeque<ClockReading>,
    last_position_ms: i64,
    polls: usize,
}

impl ScriptedClock {
    pub fn new(readings: impl IntoIterator<Item = ClockReading>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last_position_ms: 0,
            polls: 0,
        }
    }

    /// Shorthand for a script where every position is an advancing reading.
    pub fn from_positions(positions: impl IntoIterator<Item = i64>) -> Self {
        Self::new(positions.into_iter().map(ClockReading::advancing))
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl ClockSource for ScriptedClock {
    fn poll(&mut self) -> ClockReading {
        self.polls += 1;
        match self.readings.pop_front() {
            Some(reading) => {
                self.last_position_ms = reading.position_ms;
                reading
            }
            None => ClockReading::stopped(self.last_position_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_not_advancing_before_start() {
        let mut clock = WallClock::new();
        assert!(!clock.poll().advancing);

        clock.start();
        let reading = clock.poll();
        assert!(reading.advancing);
        assert!(reading.position_ms >= 0);
    }

    #[test]
    fn lazy_wall_clock_starts_when_polled() {
        let mut clock = WallClock::new().on_first_poll();
        assert!(clock.poll().advancing);
    }

    #[test]
    fn stop_handle_ends_wall_clock() {
        let mut clock = WallClock::new();
        let handle = clock.stop_handle();
        clock.start();
        handle.stop();

        assert!(!clock.poll().advancing);
    }

    #[test]
    fn wall_clock_with_zero_length_is_finished() {
        let mut clock = WallClock::with_length(Duration::ZERO);
        clock.start();
        assert!(!clock.poll().advancing);
    }

    #[test]
    fn manual_clock_never_goes_negative() {
        let mut clock = ManualClock::new();
        clock.play();
        clock.advance(40);
        clock.advance(-100);

        assert_eq!(clock.poll(), ClockReading::advancing(0));
        clock.stop();
        assert!(!clock.poll().advancing);
    }

    #[test]
    fn scripted_clock_stops_after_script() {
        let mut clock = ScriptedClock::from_positions([5, 10]);
        assert_eq!(clock.poll(), ClockReading::advancing(5));
        assert_eq!(clock.poll(), ClockReading::advancing(10));
        assert_eq!(clock.poll(), ClockReading::stopped(10));
        assert_eq!(clock.polls(), 3);
    }

    #[test]
    fn no_pause_tallies_requests() {
        let mut pause = NoPause::default();
        pause.pause(Duration::from_millis(3));
        pause.pause(Duration::from_millis(50));
        assert_eq!(pause.total, Duration::from_millis(53));
        assert_eq!(pause.calls, 2);
    }
}
