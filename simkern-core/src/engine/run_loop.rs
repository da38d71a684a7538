//! The time advancement loop.
//!
//! Each iteration runs every runnable actor, then settles what became due at
//! the current date (action completions in model order, profile events,
//! timers). Only when nothing is left to do at this date does the clock jump
//! to the earliest next event reported by the models, the timers and the
//! availability profiles.

use std::task::{Context, Poll};

use serde::Serialize;

use super::EngineError;
use super::kernel::Kernel;
use crate::actor::ActorId;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No actor left
    Completed,
    /// Actors remain, but nothing can ever wake them
    Deadlock { blocked: Vec<String> },
    /// The date given to `run_until` was reached
    TimeLimit,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Seed of the deterministic generator, for reproduction
    pub seed: u64,
    /// Simulated date when the run stopped
    pub end_clock: f64,
    pub outcome: RunOutcome,
    /// Clock advances since the engine was created
    pub iterations: u64,
    pub activities_finished: u64,
    pub activities_failed: u64,
    pub activities_canceled: u64,
    pub actors_created: u64,
    /// Actors whose body returned an error
    pub actors_failed: u64,
}

impl SimulationReport {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Simulation Report (seed: {})\n", self.seed));
        summary.push_str(&format!("End clock: {}\n", self.end_clock));
        summary.push_str(&format!("Iterations: {}\n", self.iterations));
        match &self.outcome {
            RunOutcome::Completed => summary.push_str("Outcome: completed\n"),
            RunOutcome::TimeLimit => summary.push_str("Outcome: time limit reached\n"),
            RunOutcome::Deadlock { blocked } => {
                summary.push_str(&format!("Outcome: deadlock ({} blocked)\n", blocked.len()));
                for name in blocked {
                    summary.push_str(&format!("  - {name}\n"));
                }
            }
        }
        summary.push_str(&format!(
            "\nActivities:\n  Finished: {}\n  Failed: {}\n  Canceled: {}\n",
            self.activities_finished, self.activities_failed, self.activities_canceled
        ));
        summary.push_str(&format!(
            "\nActors:\n  Created: {}\n  Failed: {}\n",
            self.actors_created, self.actors_failed
        ));
        summary
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self.outcome, RunOutcome::Deadlock { .. })
    }
}

fn earliest(current: Option<f64>, candidate: f64) -> Option<f64> {
    Some(current.map_or(candidate, |delay| delay.min(candidate)))
}

impl Kernel {
    /// Runs until no actor is left, a deadlock, or the clock would pass `limit`.
    ///
    /// # Errors
    ///
    /// - `EngineError::NoPlatform` - Nothing to simulate on
    /// - `EngineError::AlreadyRunning` - Called from an actor or a callback of this run
    pub(crate) fn run(&self, limit: Option<f64>) -> Result<SimulationReport, EngineError> {
        if !self.is_platform_loaded() {
            return Err(EngineError::NoPlatform);
        }
        if self.running.replace(true) {
            return Err(EngineError::AlreadyRunning);
        }
        tracing::info!(
            "Simulation starting at {} with {} actors",
            self.now(),
            self.scheduler.borrow().count()
        );

        let outcome = loop {
            self.run_ready_actors();
            if self.settle() {
                continue;
            }

            let (live, non_daemons) = {
                let scheduler = self.scheduler.borrow();
                (scheduler.count(), scheduler.non_daemon_count())
            };
            if live == 0 {
                break RunOutcome::Completed;
            }
            if non_daemons == 0 {
                self.kill_daemons();
                continue;
            }

            let Some(delay) = self.next_event_delay() else {
                break self.report_deadlock();
            };
            let now = self.now();
            if let Some(limit) = limit
                && now + delay > limit
            {
                self.advance((limit - now).max(0.0));
                break RunOutcome::TimeLimit;
            }
            self.advance(delay);
        };

        self.running.set(false);
        tracing::info!("Simulation ended at {}: {:?}", self.now(), outcome);
        self.signals.simulation_end.emit(&());
        Ok(self.report(outcome))
    }

    fn run_ready_actors(&self) {
        loop {
            let next = self.scheduler.borrow_mut().pop_ready();
            let Some(actor) = next else {
                break;
            };
            self.step_actor(actor);
        }
    }

    /// Polls one actor until its next suspension point.
    fn step_actor(&self, actor: ActorId) {
        let future = self.scheduler.borrow_mut().take_future(actor);
        let Some(mut future) = future else {
            return;
        };

        self.set_current_actor(Some(actor));
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        let poll = future.as_mut().poll(&mut cx);
        self.set_current_actor(None);

        match poll {
            Poll::Pending => {
                let killed = self.scheduler.borrow_mut().restore(actor, future);
                drop(killed);
            }
            Poll::Ready(result) => {
                drop(future);
                let info = self.scheduler.borrow_mut().finish(actor);
                let name = info.map_or_else(|| actor.to_string(), |info| info.name);
                match result {
                    Ok(()) => tracing::debug!("Actor '{}' terminated at {}", name, self.now()),
                    Err(error) => {
                        self.update_stats(|stats| stats.actors_failed += 1);
                        tracing::error!("Actor '{}' failed at {}: {:#}", name, self.now(), error);
                    }
                }
            }
        }
    }

    /// Handles everything due at the current date; returns whether anything was.
    fn settle(&self) -> bool {
        let completed = self.process_completions();
        let replayed = self.replay_profiles();
        let fired = self.fire_timers();
        completed || replayed || fired
    }

    fn kill_daemons(&self) {
        let daemons = self.scheduler.borrow().daemon_ids();
        tracing::debug!("Only daemons left, killing {} of them", daemons.len());
        for daemon in daemons {
            self.kill_actor(daemon);
        }
    }

    /// Delay until the earliest model completion, timer or profile event.
    ///
    /// Profiles replay forever, so their events only count while some
    /// action or timer can still wake an actor.
    fn next_event_delay(&self) -> Option<f64> {
        let now = self.now();
        let mut delay = None;
        let mut busy = false;

        for model in self.models.borrow_mut().iter_mut() {
            busy |= model.action_count() > 0;
            if let Some(next) = model.next_occurring_event() {
                delay = earliest(delay, next);
            }
        }

        let next_timer = self.timers.borrow_mut().next_date();
        if let Some(date) = next_timer {
            delay = earliest(delay, (date - now).max(0.0));
        }

        if busy || next_timer.is_some() {
            for cursor in self.profiles.borrow().iter() {
                if let Some(date) = cursor.next_date() {
                    delay = earliest(delay, (date - now).max(0.0));
                }
            }
        }
        delay
    }

    fn advance(&self, delay: f64) {
        for model in self.models.borrow_mut().iter_mut() {
            model.update_actions_state(delay);
        }
        self.clock.borrow_mut().advance(delay);
        self.update_stats(|stats| stats.iterations += 1);

        if delay > 0.0 {
            let now = self.now();
            tracing::debug!("Clock advanced to {}", now);
            self.signals.time_advance.emit(&now);
        }
    }

    fn report_deadlock(&self) -> RunOutcome {
        let blocked: Vec<String> = self
            .scheduler
            .borrow()
            .infos()
            .into_iter()
            .map(|info| info.name)
            .collect();
        tracing::warn!(
            "Deadlock at {}: {} actors blocked forever: {}",
            self.now(),
            blocked.len(),
            blocked.join(", ")
        );
        self.signals.deadlock.emit(&());
        RunOutcome::Deadlock { blocked }
    }

    fn report(&self, outcome: RunOutcome) -> SimulationReport {
        let stats = self.stats.get();
        SimulationReport {
            seed: self.rng.borrow().seed(),
            end_clock: self.now(),
            outcome,
            iterations: stats.iterations,
            activities_finished: stats.activities_finished,
            activities_failed: stats.activities_failed,
            activities_canceled: stats.activities_canceled,
            actors_created: stats.actors_created,
            actors_failed: stats.actors_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_blocked_actors() {
        let report = SimulationReport {
            seed: 42,
            end_clock: 3.5,
            outcome: RunOutcome::Deadlock {
                blocked: vec!["ping".to_string(), "pong".to_string()],
            },
            iterations: 2,
            activities_finished: 1,
            activities_failed: 0,
            activities_canceled: 0,
            actors_created: 2,
            actors_failed: 0,
        };
        let summary = report.summary();
        assert!(summary.contains("deadlock (2 blocked)"));
        assert!(summary.contains("  - pong"));
        assert!(report.is_deadlock());
    }

    #[test]
    fn test_outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(RunOutcome::Deadlock {
            blocked: vec!["a".to_string()],
        })
        .unwrap();
        assert_eq!(json["kind"], "deadlock");
        assert_eq!(json["blocked"][0], "a");
        assert_eq!(
            serde_json::to_value(RunOutcome::TimeLimit).unwrap()["kind"],
            "time_limit"
        );
    }

    #[test]
    fn test_earliest() {
        assert_eq!(earliest(None, 2.0), Some(2.0));
        assert_eq!(earliest(Some(1.0), 2.0), Some(1.0));
    }
}
