use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;

use dose_gamma::grid_io::{load_dose_grid, write_gamma_grid};
use dose_gamma::report::{BenchmarkRecord, TimingStats};
use dose_gamma::{GammaConfig, Normalization, SearchStrategy, compute_gamma, compute_stats};

/// Gamma-index comparison of two dose distributions
#[derive(Parser, Debug)]
#[command(name = "dose-gamma", version, about)]
struct Cli {
    /// Reference dose grid (.dcm for DICOM RT Dose, otherwise raw binary)
    reference: PathBuf,

    /// Evaluated dose grid
    evaluated: PathBuf,

    /// Write the gamma grid to this file (raw binary, excluded voxels as -1)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Dose difference criterion in percent
    #[arg(long, default_value_t = 3.0)]
    dd: f64,

    /// Distance-to-agreement criterion in mm
    #[arg(long, default_value_t = 3.0)]
    dta: f64,

    /// Dose difference normalization
    #[arg(long, value_enum, default_value_t = Normalization::Global)]
    norm: Normalization,

    /// Global normalization dose; defaults to the maximum reference dose
    #[arg(long)]
    norm_dose: Option<f64>,

    /// Dose cutoff as a fraction of the maximum reference dose
    #[arg(long, default_value_t = 0.0)]
    cutoff: f64,

    /// Maximum search distance in mm
    #[arg(long, default_value_t = 10.0)]
    max_search: f64,

    /// Search lattice step in mm; defaults to DTA/10
    #[arg(long)]
    step: Option<f64>,

    /// Dimensionality of the comparison; defaults to the grid rank
    #[arg(long)]
    dims: Option<u8>,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Candidate search strategy
    #[arg(long, value_enum, default_value_t = SearchStrategy::FullLattice)]
    strategy: SearchStrategy,

    /// Run the computation N times and report timing statistics
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: usize,

    /// Append a benchmark record to this CSV file
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let reference = load_dose_grid(&cli.reference)?;
    let evaluated = load_dose_grid(&cli.evaluated)?;
    info!(
        "loaded reference {:?} and evaluated {:?} grids",
        reference.size(),
        evaluated.size()
    );

    let config = GammaConfig {
        dd: cli.dd,
        dta: cli.dta,
        normalization: cli.norm,
        global_norm_dose: cli.norm_dose,
        dose_cutoff: cli.cutoff,
        max_search_distance: cli.max_search,
        step_size: cli.step.unwrap_or(cli.dta / 10.0),
        dims: cli
            .dims
            .unwrap_or_else(|| reference.dims().max(evaluated.dims())),
        threads: cli.threads,
        search_strategy: cli.strategy,
    };

    let repeats = cli.repeat.max(1);
    let mut times: Vec<Duration> = Vec::with_capacity(repeats);
    let mut gamma = None;
    for i in 0..repeats {
        let start = Instant::now();
        gamma = Some(compute_gamma(&reference, &evaluated, &config)?);
        let elapsed = start.elapsed();
        times.push(elapsed);
        info!("run {}/{}: {:.3} ms", i + 1, repeats, elapsed.as_secs_f64() * 1e3);
    }
    let gamma = gamma.expect("at least one run was performed");

    let stats = compute_stats(&gamma);
    match stats.pass_rate {
        Some(rate) => println!("pass rate: {:.2}%", rate * 100.0),
        None => println!("pass rate: n/a (no included voxels)"),
    }
    if let (Some(mean), Some(min), Some(max)) = (stats.mean, stats.min, stats.max) {
        println!("gamma mean/min/max: {mean:.4} / {min:.4} / {max:.4}");
    }
    println!(
        "voxels: {} total, {} excluded, {} search-exhausted",
        stats.total_voxels, stats.excluded_voxels, stats.exhausted_voxels
    );

    if let Some(output) = &cli.output {
        write_gamma_grid(&gamma, output)?;
        info!("wrote gamma grid to {}", output.display());
    }

    if let Some(csv) = &cli.csv {
        let timing = TimingStats::from_durations(&times);
        BenchmarkRecord::new(&config, repeats, timing, stats).append_to(csv)?;
        info!("appended benchmark record to {}", csv.display());
    }

    Ok(())
}
