//! Whole-recording conduction analysis.
//!
//! Runs the quorum filter once, then fits a surface and derives a velocity
//! field for every beat.  Beats are independent, so they are fitted on a
//! bounded rayon pool; the indexed parallel iterator keeps results in beat
//! order no matter which worker finishes first.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;

use crate::config::{ConductionConfig, FitFailurePolicy};
use crate::electrode::{ChannelId, ElectrodeGrid};
use crate::error::{MeaError, Result};
use crate::peaks::PeakTimes;
use crate::quorum::{quorum_filter, Quorum};
use crate::surface::FittedSurface;
use crate::velocity::VelocityField;

/// Cooperative cancellation flag shared between a caller and a running
/// analysis.  Checked before each beat is fitted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One analysed beat.
#[derive(Debug, Clone)]
pub struct BeatResult {
    /// Position of the beat in the quorum's beat table.
    pub beat: usize,
    pub surface: FittedSurface,
    pub velocity: VelocityField,
}

/// A beat the aggregator left out and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBeat {
    pub beat: usize,
    pub reason: String,
}

/// Per-beat results of one recording, in beat order.
#[derive(Debug, Clone)]
pub struct ConductionReport {
    beats: Vec<BeatResult>,
    skipped: Vec<SkippedBeat>,
    channels: Vec<ChannelId>,
    removed: Vec<ChannelId>,
}

impl ConductionReport {
    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&BeatResult> {
        self.beats.get(i)
    }

    pub fn beats(&self) -> &[BeatResult] {
        &self.beats
    }

    /// `(surface, velocity)` pairs in beat order.
    pub fn iter(&self) -> impl Iterator<Item = (&FittedSurface, &VelocityField)> {
        self.beats.iter().map(|b| (&b.surface, &b.velocity))
    }

    /// R² of every reported beat.
    pub fn r2_scores(&self) -> Vec<f64> {
        self.beats.iter().map(|b| b.surface.r2()).collect()
    }

    /// Flattened speed field (m/s) of every reported beat.
    pub fn velocity_fields(&self) -> Vec<Vec<f64>> {
        self.beats.iter().map(|b| b.velocity.speed_flat()).collect()
    }

    /// Finite-mean speed (m/s) of every reported beat.
    pub fn mean_speeds(&self) -> Vec<f64> {
        self.beats.iter().map(|b| b.velocity.mean_speed()).collect()
    }

    pub fn skipped(&self) -> &[SkippedBeat] {
        &self.skipped
    }

    /// Channels that took part in the fits.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Channels dropped by the quorum filter.
    pub fn removed_channels(&self) -> &[ChannelId] {
        &self.removed
    }
}

/// Runs the conduction pipeline with a fixed configuration.
///
/// The worker pool is built once here and reused by every run; clones share
/// it.
#[derive(Debug, Clone)]
pub struct ConductionAnalyzer {
    cfg: ConductionConfig,
    grid: ElectrodeGrid,
    pool: Arc<rayon::ThreadPool>,
}

impl ConductionAnalyzer {
    pub fn new(cfg: ConductionConfig) -> Result<Self> {
        cfg.validate()?;
        let grid = ElectrodeGrid::new(cfg.ele_dis)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.workers)
            .build()
            .map_err(|e| MeaError::InvalidParameter(format!("worker pool: {e}")))?;
        Ok(Self { cfg, grid, pool: Arc::new(pool) })
    }

    /// Threads in the worker pool.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn config(&self) -> &ConductionConfig {
        &self.cfg
    }

    pub fn grid(&self) -> &ElectrodeGrid {
        &self.grid
    }

    pub fn run(&self, times: &PeakTimes) -> Result<ConductionReport> {
        self.run_with_cancel(times, &CancelToken::new())
    }

    pub fn run_with_cancel(&self, times: &PeakTimes, cancel: &CancelToken) -> Result<ConductionReport> {
        let quorum = quorum_filter(times, self.cfg.quorum);
        self.analyse(&quorum, cancel)
    }

    /// Fit every beat of an already filtered quorum.
    pub fn analyse(&self, quorum: &Quorum, cancel: &CancelToken) -> Result<ConductionReport> {

        let channels = quorum.channels();
        let fitted: Vec<Result<BeatResult>> = self.pool.install(|| {
            (0..quorum.n_beats())
                .into_par_iter()
                .map(|j| {
                    if cancel.is_cancelled() {
                        return Err(MeaError::Cancelled);
                    }
                    let surface =
                        FittedSurface::fit(&self.grid, channels, quorum.beat(j), self.cfg.mesh_num)?;
                    let velocity = VelocityField::from_surface(&surface);
                    Ok(BeatResult { beat: j, surface, velocity })
                })
                .collect()
        });

        let mut beats = Vec::with_capacity(fitted.len());
        let mut skipped = Vec::new();
        for (j, res) in fitted.into_iter().enumerate() {
            match res {
                Ok(b) => beats.push(b),
                Err(e) if e.is_recoverable() && self.cfg.on_fit_failure == FitFailurePolicy::Skip => {
                    warn!("beat {j} skipped: {e}");
                    skipped.push(SkippedBeat { beat: j, reason: e.to_string() });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "conduction analysis: {} beat(s) fitted, {} skipped, {} of 64 channels used",
            beats.len(),
            skipped.len(),
            channels.len()
        );

        Ok(ConductionReport {
            beats,
            skipped,
            channels: channels.to_vec(),
            removed: quorum.removed_channels(),
        })
    }
}
