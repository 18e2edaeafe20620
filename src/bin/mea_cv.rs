/// mea-cv: load a recording and its detected peaks, fit a conduction surface
/// to every beat and write the per-beat results to a safetensors file.
///
/// Output keys are documented on `mea::io::write_report`.
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use mea::{
    conduction_velocity,
    io::{load_peaks, load_recording, write_report},
    ConductionConfig, FitFailurePolicy, QuorumPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "mea-cv", about = "Conduction-velocity maps for 8×8 MEA recordings")]
struct Args {
    /// Recording safetensors (`array` [65, T], `sampling_rate`, `gain`).
    #[arg(long)]
    recording: PathBuf,

    /// Peak safetensors (`peaks_1` … `peaks_64`).
    #[arg(long)]
    peaks: PathBuf,

    /// Report output path.
    #[arg(long)]
    output: PathBuf,

    /// Electrode spacing (μm).
    #[arg(long, default_value_t = 450.0)]
    ele_dis: f64,

    /// Output mesh resolution per axis.
    #[arg(long, default_value_t = 100)]
    mesh_num: usize,

    /// Surplus peaks a channel may have over the mode and still be kept.
    #[arg(long, default_value_t = 0)]
    tolerance: usize,

    /// Fail on the first beat that cannot be fitted instead of skipping it.
    #[arg(long)]
    abort_on_fit_failure: bool,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    workers: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let rec = load_recording(&args.recording)?;
    println!(
        "Loaded 64 ch × {} samples @ {} Hz ({:.3} s)",
        rec.n_samples(),
        rec.sampling_rate(),
        rec.duration()
    );
    let peaks = load_peaks(&args.peaks)?;

    let cfg = ConductionConfig {
        ele_dis: args.ele_dis,
        mesh_num: args.mesh_num,
        quorum: if args.tolerance == 0 {
            QuorumPolicy::ExactMode
        } else {
            QuorumPolicy::Tolerance(args.tolerance)
        },
        on_fit_failure: if args.abort_on_fit_failure {
            FitFailurePolicy::Abort
        } else {
            FitFailurePolicy::Skip
        },
        workers: args.workers,
    };

    let report = conduction_velocity(&rec, &peaks, &cfg)?;
    println!(
        "Fitted {} beat(s), skipped {}, dropped channels {:?}",
        report.len(),
        report.skipped().len(),
        report.removed_channels().iter().map(|c| c.get()).collect::<Vec<_>>()
    );
    for (b, cv) in report.beats().iter().zip(report.mean_speeds()) {
        println!(
            "  beat {:>3}  R² = {:.4}{}  mean CV = {:.4} m/s",
            b.beat,
            b.surface.r2(),
            if b.surface.is_degenerate() { " (flat)" } else { "" },
            cv
        );
    }

    write_report(&report, &args.output)?;
    println!("Written → {}", args.output.display());
    Ok(())
}
