//! Batch and live run execution.

use std::ops::ControlFlow;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use mf_core::timing::Timer;
use mf_model::System;
use mf_project::ModelFile;
use mf_sim::{
    Perturbation, RealTimeConfig, RealTimeDriver, SimOptions, StateBuffer, Trajectory, simulate,
};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::progress::{RunMode, RunProgressEvent, RunStage};
use crate::project_service;

/// Concise timing summary for a run.
#[derive(Debug, Clone, Default)]
pub struct RunTimingSummary {
    pub load_time_s: f64,
    pub build_time_s: f64,
    pub compile_time_s: f64,
    pub solve_time_s: f64,
    pub total_time_s: f64,
}

/// Request for a batch run. Unset fields fall back to the model file's
/// `simulation` section.
#[derive(Debug, Clone)]
pub struct BatchRequest<'a> {
    pub model_path: &'a Path,
    pub t0: Option<f64>,
    pub tf: Option<f64>,
    pub options: Option<SimOptions>,
}

#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub trajectory: Trajectory,
    /// Species values after the run, in declaration order
    pub final_values: Vec<(String, f64)>,
    pub timing: RunTimingSummary,
}

/// An impulse for a live run, written `SPECIES=AMOUNT@TICK`.
///
/// `@TICK` is optional and defaults to 1: the dose lands once that many
/// ticks have completed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dose {
    pub species: String,
    pub amount: f64,
    pub after_tick: u64,
}

impl FromStr for Dose {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidInput(format!("expected SPECIES=AMOUNT[@TICK], got '{s}'"));
        let (species, rest) = s.split_once('=').ok_or_else(invalid)?;
        let (amount, tick) = match rest.split_once('@') {
            Some((amount, tick)) => (amount, Some(tick)),
            None => (rest, None),
        };
        let species = species.trim();
        if species.is_empty() {
            return Err(invalid());
        }
        let amount: f64 = amount.trim().parse().map_err(|_| invalid())?;
        if !amount.is_finite() {
            return Err(invalid());
        }
        let after_tick = match tick {
            Some(t) => t.trim().parse().map_err(|_| invalid())?,
            None => 1,
        };
        Ok(Self {
            species: species.to_string(),
            amount,
            after_tick,
        })
    }
}

/// Request for a live run of a fixed number of ticks.
#[derive(Debug, Clone)]
pub struct LiveRequest<'a> {
    pub model_path: &'a Path,
    /// Wall-clock budget; the run performs `ceil(duration_ms / refresh_rate_ms)` ticks.
    pub duration_ms: u64,
    pub doses: Vec<Dose>,
    /// Overrides the model file's `realtime` section.
    pub config: Option<RealTimeConfig>,
}

#[derive(Debug)]
pub struct LiveResponse {
    pub buffer: StateBuffer,
    pub final_values: Vec<(String, f64)>,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub skipped_slots: u64,
    pub rejected_doses: u64,
    pub mean_tick_s: f64,
    pub max_tick_s: f64,
    pub timing: RunTimingSummary,
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    mode: &RunMode,
    stage: RunStage,
    started: Instant,
    message: &str,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(RunProgressEvent::stage(
            mode.clone(),
            stage,
            started.elapsed().as_secs_f64(),
            Some(message.to_string()),
        ));
    }
}

fn final_values(system: &System) -> Vec<(String, f64)> {
    system
        .species()
        .iter()
        .map(|s| (s.id.clone(), s.value))
        .collect()
}

fn load_and_compile(
    path: &Path,
    timing: &mut RunTimingSummary,
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    mode: &RunMode,
    started: Instant,
) -> AppResult<(ModelFile, System)> {
    emit_progress(progress_cb, mode, RunStage::LoadingModel, started, "Loading model file");
    let timer = Timer::start("load");
    let model = project_service::load_model(path)?;
    timing.load_time_s = timer.stop();

    emit_progress(progress_cb, mode, RunStage::BuildingSystem, started, "Building system");
    let timer = Timer::start("build");
    let mut system = mf_project::build_system(&model)?;
    timing.build_time_s = timer.stop();

    emit_progress(progress_cb, mode, RunStage::Compiling, started, "Compiling rate laws");
    let timer = Timer::start("compile");
    system.compile()?;
    timing.compile_time_s = timer.stop();
    Ok((model, system))
}

/// Execute a batch run.
pub fn run_batch(request: &BatchRequest) -> AppResult<BatchResponse> {
    run_batch_with_progress(request, None)
}

/// Execute a batch run and stream stage events.
pub fn run_batch_with_progress(
    request: &BatchRequest,
    mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<BatchResponse> {
    let started = Instant::now();
    let total = Timer::start("total");
    let mut timing = RunTimingSummary::default();

    let pending_mode = RunMode::Batch {
        t0: request.t0.unwrap_or(0.0),
        tf: request.tf.unwrap_or(f64::NAN),
    };
    let (model, mut system) = load_and_compile(
        request.model_path,
        &mut timing,
        &mut progress_cb,
        &pending_mode,
        started,
    )?;

    let section = model.simulation.as_ref();
    let t0 = request.t0.or(section.map(|s| s.t0)).unwrap_or(0.0);
    let tf = request.tf.or(section.map(|s| s.tf)).ok_or_else(|| {
        AppError::InvalidInput("no end time given and model has no simulation section".into())
    })?;
    let options = request
        .options
        .clone()
        .or_else(|| section.map(|s| s.options.clone()))
        .unwrap_or_default();
    let mode = RunMode::Batch { t0, tf };

    emit_progress(
        &mut progress_cb,
        &mode,
        RunStage::Simulating,
        started,
        "Integrating",
    );
    let timer = Timer::start("solve");
    let trajectory = simulate(&mut system, t0, tf, &options)?;
    timing.solve_time_s = timer.stop();
    timing.total_time_s = total.stop();

    emit_progress(&mut progress_cb, &mode, RunStage::Completed, started, "Done");
    info!(
        model = %model.name,
        t0,
        tf,
        samples = trajectory.len(),
        solve_time_s = timing.solve_time_s,
        "batch run complete"
    );

    Ok(BatchResponse {
        trajectory,
        final_values: final_values(&system),
        timing,
    })
}

/// Execute a live run for a bounded number of ticks and return the buffer.
pub fn run_live(request: &LiveRequest) -> AppResult<LiveResponse> {
    let started = Instant::now();
    let total = Timer::start("total");
    let mut timing = RunTimingSummary::default();
    let (model, system) = load_and_compile(
        request.model_path,
        &mut timing,
        &mut None,
        &RunMode::Live {
            duration_ms: request.duration_ms,
        },
        started,
    )?;

    let config = request
        .config
        .clone()
        .or_else(|| model.realtime.clone())
        .unwrap_or_default();
    if config.refresh_rate_ms == 0 {
        return Err(AppError::InvalidInput("refresh_rate_ms must be positive".into()));
    }
    let max_ticks = request.duration_ms.div_ceil(config.refresh_rate_ms).max(1);

    let mut driver = RealTimeDriver::new(system, config)?;
    for dose in &request.doses {
        driver.schedule(Perturbation {
            species: dose.species.clone(),
            offset: dose.amount,
            after_tick: Some(dose.after_tick),
        });
    }

    let timer = Timer::start("live");
    let mut seen = 0;
    let handle = driver.spawn(move |result, _buffer| {
        seen += 1;
        if let Err(err) = result {
            warn!(error = %err, "live tick failed");
        }
        if seen >= max_ticks {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    let outcome = handle.join()?;
    timing.solve_time_s = timer.stop();
    timing.total_time_s = total.stop();

    info!(
        model = %model.name,
        ticks = outcome.ticks,
        failed = outcome.failed_ticks,
        skipped = outcome.skipped_slots,
        "live run complete"
    );

    Ok(LiveResponse {
        final_values: final_values(&outcome.system),
        buffer: outcome.buffer,
        ticks: outcome.ticks,
        failed_ticks: outcome.failed_ticks,
        skipped_slots: outcome.skipped_slots,
        rejected_doses: outcome.rejected_perturbations,
        mean_tick_s: outcome.mean_tick_s,
        max_tick_s: outcome.max_tick_s,
        timing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dose_parses_with_and_without_tick() {
        assert_eq!(
            "Glucose=2.5@4".parse::<Dose>().unwrap(),
            Dose {
                species: "Glucose".into(),
                amount: 2.5,
                after_tick: 4
            }
        );
        assert_eq!("Insulin=-1".parse::<Dose>().unwrap().after_tick, 1);
    }

    #[test]
    fn dose_rejects_garbage() {
        for bad in ["Glucose", "=1", "Glucose=abc", "Glucose=1@x", "Glucose=inf"] {
            assert!(matches!(bad.parse::<Dose>(), Err(AppError::InvalidInput(_))), "{bad}");
        }
    }
}
