/*
Copyright 2020 Anish Jewalikar

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Drives the interpreter at a configured virtual instruction rate.
//!
//! A virtual-time cursor is advanced by `period_ms` per executed step,
//! timers divide the step rate by 9, and a backward host clock resets the
//! cursor instead of triggering unbounded catch-up.

#[cfg(feature = "savestates")]
use serde::{Deserialize, Serialize};

/// How many steps to execute before the delay/sound timers decrement once.
const TIMER_DIVISOR: u32 = 9;

/// Run mode for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestates", derive(Serialize, Deserialize))]
enum Mode {
    Paused,
    StepOnce,
    Running,
}

/// The outcome of one [`Scheduler::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Caught up with virtual time; execute one more step. `tick_timers`
    /// says whether this is also the 9th step since the last timer tick.
    Run {
        /// Whether the delay/sound timers should decrement after this step.
        tick_timers: bool,
    },
    /// Either caught up with wall time, or not currently running; the
    /// caller should stop looping.
    Idle,
}

/// The virtual-clock scheduler.
///
/// Exposes one step of policy per call ([`Scheduler::poll`]) rather than
/// driving a caller-supplied closure, so an owner holding both a
/// `Scheduler` and the state it steps (as [`crate::Interpreter`] does) can
/// drive the catch-up loop itself without the two fighting over a mutable
/// borrow of `self`.
#[derive(Clone)]
#[cfg_attr(feature = "savestates", derive(Serialize, Deserialize))]
pub struct Scheduler {
    period_ms: f64,
    vtime_ms: f64,
    mode: Mode,
    counter: u32,
}

impl Scheduler {
    /// A scheduler at the given `period_ms` (clamped to a minimum of
    /// `0.1`ms), starting paused with its virtual clock at 0.
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms: period_ms.max(0.1),
            vtime_ms: 0.0,
            mode: Mode::Paused,
            counter: 0,
        }
    }

    /// Current instruction period, in milliseconds.
    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// Change the instruction period (clamped to a minimum of `0.1`ms).
    /// Takes effect on the next step; does not snap `vtime` to `now`, so
    /// small period changes produce smooth tempo changes rather than a
    /// catch-up burst.
    pub fn set_period_ms(&mut self, period_ms: f64) {
        self.period_ms = period_ms.max(0.1);
    }

    /// Stop executing steps until [`Scheduler::resume`] or
    /// [`Scheduler::step_once`].
    pub fn pause(&mut self) {
        self.mode = Mode::Paused;
    }

    /// Resume free-running execution.
    pub fn resume(&mut self) {
        self.mode = Mode::Running;
    }

    /// Execute exactly one step on the next [`Scheduler::poll`], then
    /// return to paused.
    pub fn step_once(&mut self) {
        self.mode = Mode::StepOnce;
    }

    /// Is the scheduler currently paused (and not single-stepping)?
    pub fn is_paused(&self) -> bool {
        self.mode == Mode::Paused
    }

    /// Advance the virtual-time cursor by one potential step and report
    /// whether the caller should execute it.
    ///
    /// `halted` lets the caller fold in a reason to stop that lives outside
    /// the scheduler itself (`00FD`, which halts the
    /// interpreter — distinct from the host-driven pause/resume/step-once
    /// controls modeled here, but required to suppress stepping the same
    /// way). If `now_ms` is behind the virtual clock (the host clock went
    /// backward), returns [`Poll::Idle`] without advancing anything.
    pub fn poll(&mut self, now_ms: f64, halted: bool) -> Poll {
        if now_ms - self.vtime_ms < 0.0 {
            return Poll::Idle;
        }

        self.vtime_ms += self.period_ms;

        let should_run = !halted
            && match self.mode {
                Mode::Running => self.period_ms > 0.009,
                Mode::StepOnce => true,
                Mode::Paused => false,
            };

        if should_run {
            if self.mode == Mode::StepOnce {
                self.mode = Mode::Paused;
            }
            self.counter += 1;
            let tick_timers = if self.counter >= TIMER_DIVISOR {
                self.counter = 0;
                true
            } else {
                false
            };
            Poll::Run { tick_timers }
        } else {
            self.vtime_ms = now_ms;
            Poll::Idle
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(1000.0 / 540.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive `poll` to exhaustion the way [`crate::Interpreter::tick`]
    /// does, counting steps and timer ticks instead of executing them.
    fn run_to_idle(sched: &mut Scheduler, now_ms: f64, halted: bool) -> (u32, u32) {
        let (mut steps, mut timer_ticks) = (0, 0);
        loop {
            match sched.poll(now_ms, halted) {
                Poll::Run { tick_timers } => {
                    steps += 1;
                    if tick_timers {
                        timer_ticks += 1;
                    }
                }
                Poll::Idle => return (steps, timer_ticks),
            }
        }
    }

    #[test]
    fn period_is_clamped_to_minimum() {
        let sched = Scheduler::new(0.0);
        assert!((sched.period_ms() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn paused_scheduler_runs_nothing() {
        let mut sched = Scheduler::new(1.0);
        let (steps, _) = run_to_idle(&mut sched, 100.0, false);
        assert_eq!(steps, 0);
    }

    #[test]
    fn step_once_runs_exactly_one_step_and_clears() {
        let mut sched = Scheduler::new(1.0);
        sched.step_once();
        let (steps, _) = run_to_idle(&mut sched, 100.0, false);
        assert_eq!(steps, 1);
        assert!(sched.is_paused());

        // A second poll without calling step_once again must not execute.
        let (steps, _) = run_to_idle(&mut sched, 200.0, false);
        assert_eq!(steps, 0);
    }

    #[test]
    fn running_scheduler_catches_up_and_ticks_timers() {
        // vtime starts at 0 and the catch-up condition is inclusive
        // (`now - vtime < 0` returns, so `now == vtime` still runs one more
        // step), so ticking to 20.0ms at a 1.0ms period runs 21 steps, and
        // timers divide that by 9: two full groups of 9.
        let mut sched = Scheduler::new(1.0);
        sched.resume();
        let (steps, timer_ticks) = run_to_idle(&mut sched, 20.0, false);
        assert_eq!(steps, 21);
        assert_eq!(timer_ticks, 2);
    }

    #[test]
    fn backward_clock_does_not_advance() {
        let mut sched = Scheduler::new(1.0);
        sched.resume();
        run_to_idle(&mut sched, 10.0, false);
        let (steps, _) = run_to_idle(&mut sched, 5.0, false);
        assert_eq!(steps, 0);
    }

    #[test]
    fn halted_suppresses_running_mode() {
        let mut sched = Scheduler::new(1.0);
        sched.resume();
        let (steps, _) = run_to_idle(&mut sched, 20.0, true);
        assert_eq!(steps, 0);
    }
}
