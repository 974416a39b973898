use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use mf_app::{
    AppResult, BatchRequest, Dose, LiveRequest, RunProgressEvent, RunStage, RunTimingSummary,
    describe_species, export_csv, load_model, run_batch_with_progress, run_live,
    trajectory_to_csv, validate_model,
};
use mf_sim::{IntegratorType, SimOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mf-cli")]
#[command(about = "Motif CLI - interaction-template kinetics simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate model file syntax and references
    Validate {
        /// Path to the model file (.yaml, .yml or .json)
        model_path: PathBuf,
    },
    /// List species with their compiled rate laws
    Species {
        /// Path to the model file
        model_path: PathBuf,
    },
    /// Integrate the model over a time span
    Simulate {
        /// Path to the model file
        model_path: PathBuf,
        /// Start time (defaults to the model's simulation section, else 0)
        #[arg(long)]
        t0: Option<f64>,
        /// End time (defaults to the model's simulation section)
        #[arg(long)]
        tf: Option<f64>,
        /// Use fixed steps of this size instead of the configured stepping
        #[arg(long)]
        dt: Option<f64>,
        /// Integrator for fixed stepping
        #[arg(long, value_enum, default_value_t = CliIntegrator::Rk4)]
        integrator: CliIntegrator,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the real-time loop for a bounded duration
    Live {
        /// Path to the model file
        model_path: PathBuf,
        /// Wall-clock duration in milliseconds
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
        /// Impulse to apply, as SPECIES=AMOUNT[@TICK]; may be repeated
        #[arg(long = "dose")]
        doses: Vec<Dose>,
        /// Output CSV file for the retained buffer
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliIntegrator {
    Rk4,
    Euler,
}

impl From<CliIntegrator> for IntegratorType {
    fn from(value: CliIntegrator) -> Self {
        match value {
            CliIntegrator::Rk4 => IntegratorType::Rk4,
            CliIntegrator::Euler => IntegratorType::ForwardEuler,
        }
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Species { model_path } => cmd_species(&model_path),
        Commands::Simulate {
            model_path,
            t0,
            tf,
            dt,
            integrator,
            output,
        } => cmd_simulate(
            &model_path,
            t0,
            tf,
            dt.map(|dt| SimOptions::fixed(dt, integrator.into())),
            output.as_deref(),
        ),
        Commands::Live {
            model_path,
            duration_ms,
            doses,
            output,
        } => cmd_live(&model_path, duration_ms, doses, output.as_deref()),
    }
}

fn cmd_validate(model_path: &Path) -> AppResult<()> {
    println!("Validating model: {}", model_path.display());
    let model = load_model(model_path)?;
    validate_model(&model)?;
    println!("✓ Model is valid");
    Ok(())
}

fn cmd_species(model_path: &Path) -> AppResult<()> {
    let model = load_model(model_path)?;
    let species = describe_species(&model)?;

    if species.is_empty() {
        println!("No species found in model");
    } else {
        println!("Species in '{}':", model.name);
        for s in species {
            println!(
                "  {} - {} (initial {}, {} terms)",
                s.id, s.name, s.initial_value, s.terms
            );
            println!("    d{}/dt = {}", s.id, s.rate_law);
        }
    }
    Ok(())
}

fn cmd_simulate(
    model_path: &Path,
    t0: Option<f64>,
    tf: Option<f64>,
    options: Option<SimOptions>,
    output: Option<&Path>,
) -> AppResult<()> {
    let request = BatchRequest {
        model_path,
        t0,
        tf,
        options,
    };

    let mut last_stage = None;
    let response = run_batch_with_progress(
        &request,
        Some(&mut |event| {
            if last_stage != Some(event.stage) {
                render_cli_progress(&event);
                last_stage = Some(event.stage);
            }
        }),
    )?;
    clear_progress_line();

    let trajectory = &response.trajectory;
    match output {
        Some(path) => {
            export_csv(path, trajectory)?;
            println!(
                "✓ Exported {} samples to {}",
                trajectory.len(),
                path.display()
            );
            println!("\nFinal values:");
            for (id, value) in &response.final_values {
                println!("  {} = {:.6}", id, value);
            }
            print_timing_summary(&response.timing);
        }
        None => print!("{}", trajectory_to_csv(trajectory)),
    }
    Ok(())
}

fn cmd_live(
    model_path: &Path,
    duration_ms: u64,
    doses: Vec<Dose>,
    output: Option<&Path>,
) -> AppResult<()> {
    println!(
        "Running live simulation of {} for {} ms",
        model_path.display(),
        duration_ms
    );
    for dose in &doses {
        println!(
            "  dose {} {:+} after tick {}",
            dose.species, dose.amount, dose.after_tick
        );
    }

    let started = Instant::now();
    let response = run_live(&LiveRequest {
        model_path,
        duration_ms,
        doses,
        config: None,
    })?;

    println!(
        "✓ {} ticks in {:.2}s ({} failed, {} skipped slots, {} rejected doses)",
        response.ticks,
        started.elapsed().as_secs_f64(),
        response.failed_ticks,
        response.skipped_slots,
        response.rejected_doses
    );
    println!(
        "  Tick time: mean {:.3} ms, max {:.3} ms",
        response.mean_tick_s * 1e3,
        response.max_tick_s * 1e3
    );
    if let (Some(first), Some(last)) = (
        response.buffer.time().first(),
        response.buffer.last_time(),
    ) {
        println!("  Buffer window: {:.3} - {:.3}", first, last);
    }
    println!("\nFinal values:");
    for (id, value) in &response.final_values {
        println!("  {} = {:.6}", id, value);
    }
    if let Some(path) = output {
        export_csv(path, &response.buffer)?;
        println!(
            "✓ Exported {} samples to {}",
            response.buffer.len(),
            path.display()
        );
    }
    print_timing_summary(&response.timing);
    Ok(())
}

fn clear_progress_line() {
    eprint!("\r{}\r", " ".repeat(80));
    let _ = io::stderr().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    let spinner = ['|', '/', '-', '\\'];
    let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
    let mut line = format!(
        "\r{} {}  elapsed={:.2}s",
        spinner[spin_idx],
        event.stage.label(),
        event.elapsed_wall_s
    );
    if let Some(msg) = &event.message
        && event.stage != RunStage::Completed
    {
        line.push_str(&format!("  {}", msg));
    }
    eprint!("{}", line);
    let _ = io::stderr().flush();
}

fn print_timing_summary(timing: &RunTimingSummary) {
    let total = timing.total_time_s.max(1.0e-12);
    let pct = |part: f64| 100.0 * part / total;

    println!("\nTiming summary:");
    println!(
        "  Load:    {:.3}s ({:.1}%)",
        timing.load_time_s,
        pct(timing.load_time_s)
    );
    println!(
        "  Build:   {:.3}s ({:.1}%)",
        timing.build_time_s,
        pct(timing.build_time_s)
    );
    println!(
        "  Compile: {:.3}s ({:.1}%)",
        timing.compile_time_s,
        pct(timing.compile_time_s)
    );
    println!(
        "  Solve:   {:.3}s ({:.1}%)",
        timing.solve_time_s,
        pct(timing.solve_time_s)
    );
    println!("  Total:   {:.3}s", timing.total_time_s);
}
