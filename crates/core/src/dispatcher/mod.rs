//! The synchronisation loop.
//!
//! The dispatcher polls a [`ClockSource`], compares the reading with the
//! earliest pending event, and fires every event whose deadline minus the
//! tolerance has been reached. Events are consumed strictly in timeline
//! order and each `(deadline, action)` pair is actuated at most once per run.
//! An event that is already overdue fires immediately instead of being
//! dropped.

use std::{
    collections::{HashSet, VecDeque},
    time::{Duration, Instant},
};

use crate::{
    actuator::{pulse, Actuator, Session},
    clock::{ClockSource, Pause, ThreadPause},
    config::RunConfig,
    ActionId, PatternLibrary, Result, ScheduledEvent, Timeline,
};

/// Minimum time credited per not-ready poll when measuring the start timeout.
const MIN_WAIT_STEP: Duration = Duration::from_millis(1);

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// Every event was considered.
    #[default]
    Completed,
    /// Nothing was scheduled; the bus was never opened.
    EmptyTimeline,
    /// The clock stopped advancing after playback had started.
    ClockStopped,
    /// The clock never started within the configured start timeout.
    ClockNeverStarted,
}

/// One considered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub deadline_ms: u64,
    pub action: ActionId,
    /// Clock position at which the event was handled.
    pub position_ms: i64,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Fired,
    /// The actuation was attempted but did not complete.
    Failed,
    /// Same `(deadline, action)` already handled in this run.
    Duplicate,
}

/// Summary of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub termination: Termination,
    pub fired: usize,
    pub failed: usize,
    /// Events handled more than `tolerance` after their deadline.
    pub late: usize,
    pub duplicates: usize,
    /// Events still pending when the run ended.
    pub unfired: usize,
    pub polls: usize,
    pub records: Vec<DispatchRecord>,
}

impl RunReport {
    /// Actions in the order they were actuated, duplicates excluded.
    pub fn actuated(&self) -> Vec<(u64, &str)> {
        self.records
            .iter()
            .filter(|record| record.outcome != DispatchOutcome::Duplicate)
            .map(|record| (record.deadline_ms, record.action.as_str()))
            .collect()
    }
}

/// Drives one timeline against a clock and an actuator.
#[derive(Debug)]
pub struct Dispatcher<P = ThreadPause> {
    timeline: Timeline,
    patterns: PatternLibrary,
    config: RunConfig,
    pause: P,
}

impl Dispatcher<ThreadPause> {
    pub fn new(timeline: Timeline, patterns: PatternLibrary, config: RunConfig) -> Self {
        Self::with_pause(timeline, patterns, config, ThreadPause)
    }
}

impl<P: Pause> Dispatcher<P> {
    pub fn with_pause(
        timeline: Timeline,
        patterns: PatternLibrary,
        config: RunConfig,
        pause: P,
    ) -> Self {
        Self {
            timeline,
            patterns,
            config,
            pause,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn pause(&self) -> &P {
        &self.pause
    }

    /// Plays the whole timeline.
    ///
    /// The actuator is opened before the loop and closed after it on every
    /// path. Only a failure to open is returned as an error; failed writes
    /// are counted in the report.
    pub fn run<C, A>(&mut self, clock: &mut C, actuator: &mut A) -> Result<RunReport>
    where
        C: ClockSource + ?Sized,
        A: Actuator + ?Sized,
    {
        if self.timeline.is_empty() {
            tracing::info!("timeline is empty, nothing to play");
            return Ok(RunReport {
                termination: Termination::EmptyTimeline,
                ..RunReport::default()
            });
        }

        let mut session = Session::open(actuator)?;
        let started_at = Instant::now();
        tracing::info!(
            events = self.timeline.len(),
            tolerance_ms = self.config.tolerance_ms,
            poll_interval_ms = self.config.poll_interval_ms,
            "run started"
        );

        let Self {
            timeline,
            patterns,
            config,
            pause,
        } = self;
        let mut run = Run {
            patterns,
            pause,
            tolerance_ms: i64::try_from(config.tolerance_ms).unwrap_or(i64::MAX),
            fired: HashSet::new(),
            report: RunReport::default(),
        };

        let mut pending: VecDeque<&ScheduledEvent> = timeline.iter().collect();
        let poll_interval = config.poll_interval();
        let start_timeout = Duration::from_millis(config.start_timeout_ms);
        let mut playing = false;
        let mut waited = Duration::ZERO;

        while !pending.is_empty() {
            let reading = clock.poll();
            run.report.polls += 1;
            tracing::trace!(position_ms = reading.position_ms, advancing = reading.advancing, "clock poll");

            if !reading.advancing {
                if playing {
                    run.report.termination = Termination::ClockStopped;
                    break;
                }
                if !start_timeout.is_zero() && waited >= start_timeout {
                    run.report.termination = Termination::ClockNeverStarted;
                    break;
                }
                run.pause.pause(poll_interval);
                waited += poll_interval.max(MIN_WAIT_STEP);
                continue;
            }
            playing = true;

            if reading.is_valid() {
                while let Some(event) = pending.front() {
                    if reading.position_ms < run.threshold(event) {
                        break;
                    }
                    run.dispatch(event, reading.position_ms, session.actuator());
                    pending.pop_front();
                }
            }

            if !pending.is_empty() {
                run.pause.pause(poll_interval);
            }
        }

        let mut report = run.report;
        report.unfired = pending.len();
        drop(session);

        if report.unfired > 0 {
            tracing::warn!(
                unfired = report.unfired,
                termination = ?report.termination,
                "run ended with events still pending"
            );
        }
        tracing::info!(
            fired = report.fired,
            failed = report.failed,
            late = report.late,
            duplicates = report.duplicates,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }
}

/// Per-run state; discarded when the run ends.
struct Run<'a, P> {
    patterns: &'a PatternLibrary,
    pause: &'a mut P,
    tolerance_ms: i64,
    fired: HashSet<(u64, ActionId)>,
    report: RunReport,
}

impl<P: Pause> Run<'_, P> {
    /// Earliest position at which `event` counts as due.
    fn threshold(&self, event: &ScheduledEvent) -> i64 {
        deadline(event).saturating_sub(self.tolerance_ms)
    }

    fn dispatch<A: Actuator + ?Sized>(
        &mut self,
        event: &ScheduledEvent,
        position_ms: i64,
        actuator: &mut A,
    ) {
        let key = event.key();
        let outcome = if self.fired.contains(&key) {
            tracing::debug!(deadline_ms = event.deadline_ms, action = %event.action, "already fired, skipping");
            self.report.duplicates += 1;
            DispatchOutcome::Duplicate
        } else {
            let late_by = position_ms.saturating_sub(deadline(event));
            if late_by > self.tolerance_ms {
                self.report.late += 1;
                tracing::warn!(deadline_ms = event.deadline_ms, action = %event.action, late_by, "firing late");
            }

            let ok = match self.patterns.resolve(&event.action) {
                Some(commands) => pulse(actuator, commands, &mut *self.pause),
                None => {
                    tracing::warn!(action = %event.action, "no pattern for action");
                    false
                }
            };
            // recorded either way so a failing write is never retried
            self.fired.insert(key);

            if ok {
                self.report.fired += 1;
                tracing::debug!(deadline_ms = event.deadline_ms, action = %event.action, position_ms, "fired");
                DispatchOutcome::Fired
            } else {
                self.report.failed += 1;
                tracing::warn!(deadline_ms = event.deadline_ms, action = %event.action, "actuation failed, moving on");
                DispatchOutcome::Failed
            }
        };

        self.report.records.push(DispatchRecord {
            deadline_ms: event.deadline_ms,
            action: event.action.clone(),
            position_ms,
            outcome,
        });
    }
}

fn deadline(event: &ScheduledEvent) -> i64 {
    i64::try_from(event.deadline_ms).unwrap_or(i64::MAX)
}
