//! Tick-paced real-time simulation.
//!
//! A [`RealTimeDriver`] owns the [`System`] and its [`StateBuffer`]. Each tick
//! integrates `[0, t_step]` from the buffer's most recent samples, appends the
//! result, writes the final values back and trims the buffer to its window.
//!
//! [`RealTimeDriver::spawn`] moves the driver onto one worker thread. The
//! returned [`RealTimeHandle`] queues perturbations (applied between ticks),
//! cancels the loop and joins it to get the system and buffer back.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use mf_core::timing::{AccumulatingTimer, Timer};
use mf_model::System;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::StateBuffer;
use crate::driver::{ensure_finite_record, integrate_from};
use crate::error::{SimError, SimResult};
use crate::sim::SimOptions;

/// Real-time loop configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealTimeConfig {
    /// Wall-clock tick period in milliseconds
    pub refresh_rate_ms: u64,
    /// Simulated time per wall-clock second
    pub t_scale: f64,
    /// Retained trajectory window, in simulated time
    pub buffer_size: f64,
    /// Integrator options for each tick
    pub sim: SimOptions,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 100,
            t_scale: 1.0,
            buffer_size: 10.0,
            sim: SimOptions::default(),
        }
    }
}

impl RealTimeConfig {
    /// Simulated time covered by one tick.
    pub fn t_step(&self) -> f64 {
        self.refresh_rate_ms as f64 / 1000.0 * self.t_scale
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.refresh_rate_ms == 0 {
            return Err(SimError::InvalidArg {
                what: "refresh_rate_ms must be positive",
            });
        }
        if !(self.t_scale.is_finite() && self.t_scale > 0.0) {
            return Err(SimError::InvalidArg {
                what: "t_scale must be positive",
            });
        }
        if !(self.buffer_size.is_finite() && self.buffer_size > 0.0) {
            return Err(SimError::InvalidArg {
                what: "buffer_size must be positive",
            });
        }
        self.sim.validate()
    }
}

/// An impulse added to one species' most recent sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Perturbation {
    pub species: String,
    pub offset: f64,
    /// Apply once this many ticks have completed; `None` means "next gap".
    pub after_tick: Option<u64>,
}

/// Summary of one completed tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    /// Zero-based tick number
    pub tick: u64,
    /// Buffer time before the tick
    pub t_start: f64,
    /// Buffer time after the tick
    pub t_end: f64,
    pub appended: usize,
    pub trimmed: usize,
    pub elapsed_s: f64,
}

/// What the worker hands back on join.
#[derive(Debug)]
pub struct RealTimeOutcome {
    pub system: System,
    pub buffer: StateBuffer,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub skipped_slots: u64,
    pub rejected_perturbations: u64,
    /// Mean wall time of a successful tick, in seconds
    pub mean_tick_s: f64,
    pub max_tick_s: f64,
}

/// Clears the tick flag when dropped, including on early error return.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> SimResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SimError::TickInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RealTimeDriver {
    system: System,
    buffer: StateBuffer,
    config: RealTimeConfig,
    scheduled: Vec<Perturbation>,
    in_tick: Arc<AtomicBool>,
    ticks: u64,
    failed_ticks: u64,
    skipped_slots: u64,
    rejected_perturbations: u64,
    tick_times: AccumulatingTimer,
}

impl RealTimeDriver {
    /// Take ownership of a compiled system. The buffer starts empty.
    pub fn new(system: System, config: RealTimeConfig) -> SimResult<Self> {
        config.validate()?;
        system.current_model()?;
        Ok(Self {
            system,
            buffer: StateBuffer::new(),
            config,
            scheduled: Vec::new(),
            in_tick: Arc::new(AtomicBool::new(false)),
            ticks: 0,
            failed_ticks: 0,
            skipped_slots: 0,
            rejected_perturbations: 0,
            tick_times: AccumulatingTimer::new(),
        })
    }

    /// Build a driver and start it on its own worker thread.
    pub fn start<F>(system: System, config: RealTimeConfig, sink: F) -> SimResult<RealTimeHandle>
    where
        F: FnMut(&SimResult<TickReport>, &StateBuffer) -> ControlFlow<()> + Send + 'static,
    {
        Self::new(system, config)?.spawn(sink)
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn buffer(&self) -> &StateBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &RealTimeConfig {
        &self.config
    }

    /// Completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Queue a perturbation to apply between ticks.
    pub fn schedule(&mut self, perturbation: Perturbation) {
        self.scheduled.push(perturbation);
    }

    /// Apply an impulse to the latest sample right away.
    pub fn perturb(&mut self, species: &str, offset: f64) -> SimResult<f64> {
        let value = self.buffer.perturb(species, offset)?;
        debug!(species, offset, value, "applied perturbation");
        Ok(value)
    }

    fn apply_due(&mut self) {
        let ticks = self.ticks;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|p| p.after_tick.is_none_or(|n| n <= ticks));
        self.scheduled = pending;
        for p in due {
            if let Err(err) = self.perturb(&p.species, p.offset) {
                self.rejected_perturbations += 1;
                warn!(species = %p.species, error = %err, "rejected perturbation");
            }
        }
    }

    /// Run one tick to completion.
    ///
    /// A failed tick leaves the buffer and the species values untouched;
    /// perturbations due before it stay applied.
    pub fn tick(&mut self) -> SimResult<TickReport> {
        let in_tick = Arc::clone(&self.in_tick);
        let _guard = TickGuard::acquire(&in_tick)?;
        self.run_tick()
    }

    /// Tick body; the caller holds the tick guard.
    fn run_tick(&mut self) -> SimResult<TickReport> {
        self.apply_due();

        let timer = Timer::start("tick");
        let t_step = self.config.t_step();
        let x0: Vec<f64> = self
            .system
            .species()
            .iter()
            .map(|s| self.buffer.last_sample(&s.id).unwrap_or(s.value))
            .collect();

        let t_start = self.buffer.last_time().unwrap_or(0.0);
        let record = integrate_from(&self.system, x0, t_step, &self.config.sim)?;
        ensure_finite_record(&self.system, &record, t_start)?;
        let step = StateBuffer::from_record(self.system.species().ids(), &record)?;

        // Nothing below can fail once the species values are written.
        if let Some(last) = record.last() {
            self.system.write_back(last.as_slice())?;
        }
        let appended = self.buffer.concat(&step);
        let trimmed = self.buffer.trim(self.config.buffer_size);

        let report = TickReport {
            tick: self.ticks,
            t_start,
            t_end: self.buffer.last_time().unwrap_or(t_start),
            appended,
            trimmed,
            elapsed_s: timer.stop(),
        };
        self.ticks += 1;
        self.tick_times.record(report.elapsed_s);
        debug!(
            tick = report.tick,
            t_end = report.t_end,
            appended,
            trimmed,
            elapsed_s = report.elapsed_s,
            "tick complete"
        );
        Ok(report)
    }

    /// Move the driver onto a worker thread.
    pub fn spawn<F>(self, sink: F) -> SimResult<RealTimeHandle>
    where
        F: FnMut(&SimResult<TickReport>, &StateBuffer) -> ControlFlow<()> + Send + 'static,
    {
        let (commands, rx) = mpsc::channel();
        let stop = Arc::new(Mutex::new(false));
        let in_tick = Arc::clone(&self.in_tick);
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::Builder::new()
            .name("mf-realtime".into())
            .spawn(move || self.run_loop(rx, worker_stop, sink))
            .map_err(|e| SimError::Spawn {
                message: e.to_string(),
            })?;

        Ok(RealTimeHandle {
            commands,
            stop,
            in_tick,
            worker: Some(worker),
        })
    }

    fn run_loop<F>(mut self, rx: Receiver<Command>, stop: Arc<Mutex<bool>>, mut sink: F) -> RealTimeOutcome
    where
        F: FnMut(&SimResult<TickReport>, &StateBuffer) -> ControlFlow<()>,
    {
        let period = self.config.period();
        let in_tick = Arc::clone(&self.in_tick);
        info!(
            refresh_rate_ms = self.config.refresh_rate_ms,
            t_step = self.config.t_step(),
            buffer_size = self.config.buffer_size,
            "real-time loop started"
        );

        let mut next = Instant::now() + period;
        'ticks: loop {
            // Service commands until the next slot is due.
            loop {
                if *lock_flag(&stop) {
                    break 'ticks;
                }
                let now = Instant::now();
                if now >= next {
                    break;
                }
                match rx.recv_timeout(next - now) {
                    Ok(Command::Perturb { species, offset }) => {
                        self.schedule(Perturbation {
                            species,
                            offset,
                            after_tick: None,
                        });
                        self.apply_due();
                    }
                    Ok(Command::Wake) => {}
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => break 'ticks,
                }
            }

            // Start the tick under the stop lock so cancel() either sees it
            // running or prevents it.
            let guard = {
                let stopped = lock_flag(&stop);
                if *stopped {
                    break 'ticks;
                }
                TickGuard::acquire(&in_tick)
            };
            let result = guard.and_then(|_guard| self.run_tick());
            if let Err(err) = &result {
                self.failed_ticks += 1;
                warn!(tick = self.ticks, error = %err, "tick failed");
            }
            if sink(&result, &self.buffer).is_break() {
                info!(ticks = self.ticks, "sink requested stop");
                break;
            }

            let now = Instant::now();
            next += period;
            if next <= now {
                let missed = ((now - next).as_nanos() / period.as_nanos()) as u64 + 1;
                next += period * u32::try_from(missed).unwrap_or(u32::MAX);
                self.skipped_slots += missed;
                warn!(missed, "tick overran its period, skipping missed slots");
            }
        }

        info!(
            ticks = self.ticks,
            failed = self.failed_ticks,
            skipped = self.skipped_slots,
            mean_tick_s = self.tick_times.average_seconds(),
            "real-time loop stopped"
        );
        RealTimeOutcome {
            system: self.system,
            buffer: self.buffer,
            ticks: self.ticks,
            failed_ticks: self.failed_ticks,
            skipped_slots: self.skipped_slots,
            rejected_perturbations: self.rejected_perturbations,
            mean_tick_s: self.tick_times.average_seconds(),
            max_tick_s: self.tick_times.max_seconds(),
        }
    }
}

fn lock_flag(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Command {
    Perturb { species: String, offset: f64 },
    Wake,
}

/// Control handle for a running real-time loop.
///
/// Dropping the handle without joining cancels the loop.
pub struct RealTimeHandle {
    commands: Sender<Command>,
    stop: Arc<Mutex<bool>>,
    in_tick: Arc<AtomicBool>,
    worker: Option<JoinHandle<RealTimeOutcome>>,
}

impl RealTimeHandle {
    /// Stop the loop. A tick already running finishes; once this returns no
    /// further tick starts. Calling this more than once, or after the loop
    /// ended, does nothing.
    pub fn cancel(&self) {
        {
            let mut stopped = lock_flag(&self.stop);
            if !*stopped {
                *stopped = true;
                debug!("real-time loop cancelled");
            }
        }
        let _ = self.commands.send(Command::Wake);
    }

    /// Queue an impulse for the next gap between ticks.
    ///
    /// Errors applying it (untracked species, missing sample) are logged and
    /// counted in [`RealTimeOutcome::rejected_perturbations`].
    pub fn perturb(&self, species: impl Into<String>, offset: f64) -> SimResult<()> {
        if !offset.is_finite() {
            return Err(SimError::InvalidArg {
                what: "perturbation offset must be finite",
            });
        }
        if *lock_flag(&self.stop) {
            return Err(SimError::Stopped);
        }
        self.commands
            .send(Command::Perturb {
                species: species.into(),
                offset,
            })
            .map_err(|_| SimError::Stopped)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn tick_in_progress(&self) -> bool {
        self.in_tick.load(Ordering::Acquire)
    }

    /// Wait for the loop to end and take back the system and buffer.
    ///
    /// Blocks until the sink breaks or [`RealTimeHandle::cancel`] is called.
    pub fn join(mut self) -> SimResult<RealTimeOutcome> {
        let worker = self.worker.take().ok_or(SimError::Stopped)?;
        worker.join().map_err(|_| SimError::WorkerPanicked)
    }
}

impl Drop for RealTimeHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::IntegratorType;

    fn decay_system() -> System {
        let mut system = System::new();
        system.add_species("A", 10.0, "a").unwrap();
        system.add_parameter("k", 0.5, "rate").unwrap();
        system.define_interaction("decay", ["x"]).unwrap();
        system.set_rule("decay", "x", "-kd * x", "").unwrap();
        system.add_interaction("decay", &["A"], &["k"]).unwrap();
        system.compile().unwrap();
        system
    }

    fn config() -> RealTimeConfig {
        RealTimeConfig {
            refresh_rate_ms: 100,
            t_scale: 1.0,
            buffer_size: 10.0,
            sim: SimOptions::fixed(0.025, IntegratorType::Rk4),
        }
    }

    #[test]
    fn t_step_scales_period() {
        let cfg = RealTimeConfig {
            refresh_rate_ms: 250,
            t_scale: 4.0,
            ..RealTimeConfig::default()
        };
        assert_eq!(cfg.t_step(), 1.0);
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = RealTimeConfig {
            refresh_rate_ms: 0,
            ..RealTimeConfig::default()
        };
        assert!(matches!(
            RealTimeDriver::new(decay_system(), cfg),
            Err(SimError::InvalidArg { .. })
        ));
    }

    #[test]
    fn ticks_append_without_duplicating_boundaries() {
        let mut driver = RealTimeDriver::new(decay_system(), config()).unwrap();
        let first = driver.tick().unwrap();
        assert_eq!(first.appended, 5);
        assert_eq!(driver.buffer().time().first(), Some(&0.0));

        let second = driver.tick().unwrap();
        assert_eq!(second.appended, 4);
        assert_eq!(second.tick, 1);
        let time = driver.buffer().time();
        assert!(time.windows(2).all(|w| w[0] < w[1]));
        assert!((time[time.len() - 1] - 0.2).abs() < 1e-12);

        let value = driver.system().species().get("A").unwrap().value;
        assert_eq!(driver.buffer().last_sample("A"), Some(value));
        assert!((value - 10.0 * (-0.1_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn next_tick_starts_from_perturbed_value() {
        let mut driver = RealTimeDriver::new(decay_system(), config()).unwrap();
        driver.tick().unwrap();
        let before = driver.buffer().last_sample("A").unwrap();
        assert_eq!(driver.perturb("A", 5.0).unwrap(), before + 5.0);
        driver.tick().unwrap();
        let expected = (before + 5.0) * (-0.05_f64).exp();
        assert!((driver.buffer().last_sample("A").unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn scheduled_perturbation_waits_for_its_tick() {
        let mut driver = RealTimeDriver::new(decay_system(), config()).unwrap();
        driver.schedule(Perturbation {
            species: "A".into(),
            offset: 100.0,
            after_tick: Some(2),
        });
        driver.tick().unwrap();
        driver.tick().unwrap();
        assert!(driver.buffer().last_sample("A").unwrap() < 10.0);
        driver.tick().unwrap();
        assert!(driver.buffer().last_sample("A").unwrap() > 90.0);
    }

    #[test]
    fn perturbing_empty_buffer_is_unknown_species() {
        let mut driver = RealTimeDriver::new(decay_system(), config()).unwrap();
        assert_eq!(
            driver.perturb("A", 1.0),
            Err(SimError::UnknownSpecies { id: "A".into() })
        );
    }

    #[test]
    fn reentrant_tick_is_rejected() {
        let mut driver = RealTimeDriver::new(decay_system(), config()).unwrap();
        let flag = Arc::clone(&driver.in_tick);
        let held = TickGuard::acquire(&flag).unwrap();
        assert_eq!(driver.tick(), Err(SimError::TickInProgress));
        drop(held);
        assert!(driver.tick().is_ok());
    }

    #[test]
    fn trimming_keeps_window() {
        let cfg = RealTimeConfig {
            buffer_size: 0.25,
            ..config()
        };
        let mut driver = RealTimeDriver::new(decay_system(), cfg).unwrap();
        for _ in 0..10 {
            driver.tick().unwrap();
        }
        let time = driver.buffer().time();
        let latest = time[time.len() - 1];
        assert!(time.iter().all(|t| *t >= latest - 0.25));
        assert!((latest - 1.0).abs() < 1e-9);
    }

    /// Constant feed of 1e308 per unit time: one Euler step from near
    /// `f64::MAX` overflows while the derivative stays finite.
    fn overflow_system(initial: f64) -> System {
        let mut system = System::new();
        system.add_species("A", initial, "a").unwrap();
        system.add_parameter("k", 1e308, "feed").unwrap();
        system.define_interaction("feed", ["x"]).unwrap();
        system.set_rule("feed", "x", "q", "").unwrap();
        system.add_interaction("feed", &["A"], &["k"]).unwrap();
        system.compile().unwrap();
        system
    }

    #[test]
    fn failed_tick_keeps_committed_state() {
        let cfg = RealTimeConfig {
            sim: SimOptions::fixed(0.1, IntegratorType::ForwardEuler),
            ..config()
        };
        let mut driver = RealTimeDriver::new(overflow_system(1.0), cfg).unwrap();
        driver.tick().unwrap();
        driver.perturb("A", 1.6e308).unwrap();

        let buffer_before = driver.buffer().clone();
        let value_before = driver.system().species().get("A").unwrap().value;
        let err = driver.tick().unwrap_err();
        assert!(
            matches!(&err, SimError::NonFinite { species, t } if species == "A" && *t > 0.1),
            "{err:?}"
        );
        assert_eq!(driver.buffer(), &buffer_before);
        assert_eq!(
            driver.system().species().get("A").unwrap().value,
            value_before
        );
        assert_eq!(driver.ticks(), 1);
        assert!(!driver.in_tick.load(Ordering::Acquire));
    }

    #[test]
    fn overflowing_perturbation_is_rejected() {
        let mut driver = RealTimeDriver::new(overflow_system(1.0), config()).unwrap();
        driver.tick().unwrap();
        driver.perturb("A", 1.7e308).unwrap();
        let before = driver.buffer().clone();
        assert!(matches!(
            driver.perturb("A", 1e308),
            Err(SimError::InvalidArg { .. })
        ));
        assert_eq!(driver.buffer(), &before);
    }
}
