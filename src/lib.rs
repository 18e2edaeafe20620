//! # mea: conduction-velocity analysis for 8×8 multi-electrode arrays
//!
//! `mea` turns detected beat peaks on a 64-channel MEA recording into
//! per-beat activation maps and conduction-velocity fields.
//!
//! ## Pipeline overview
//!
//! ```text
//! Recording [65, T]  +  PeakIndex (64 channels)
//!   │
//!   ├─ PeakIndex::to_times()   sample indices → seconds
//!   ├─ quorum::quorum_filter() keep channels whose peak count is the mode,
//!   │                          transpose to one arrival row per beat
//!   ├─ FittedSurface::fit()    least-squares bivariate cubic t(x, y) per beat,
//!   │                          R², dense activation map (ms, origin = 0)
//!   └─ VelocityField           closed-form ∇t → direction, speed (m/s)
//!        │
//!        └─→ ConductionReport  (surface, velocity) per beat, in beat order
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use mea::{conduction_velocity, ConductionConfig};
//! use mea::io::{load_peaks, load_recording};
//! use std::path::Path;
//!
//! let rec   = load_recording(Path::new("data/rec.safetensors")).unwrap();
//! let peaks = load_peaks(Path::new("data/peaks.safetensors")).unwrap();
//!
//! let report = conduction_velocity(&rec, &peaks, &ConductionConfig::default()).unwrap();
//! for (i, (surface, velocity)) in report.iter().enumerate() {
//!     println!("beat {i}: R² = {:.3}, mean CV = {:.3} m/s",
//!              surface.r2(), velocity.mean_speed());
//! }
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use mea::{ChannelId, ElectrodeGrid, FittedSurface, VelocityField};
//!
//! let grid = ElectrodeGrid::new(450.0).unwrap();
//! let channels: Vec<ChannelId> = ChannelId::all().collect();
//! let times: Vec<f64> = channels.iter()
//!     .map(|&ch| grid.position(ch).0 * 5e-6)
//!     .collect();
//!
//! let surface  = FittedSurface::fit(&grid, &channels, &times, 100).unwrap();
//! let velocity = VelocityField::from_surface(&surface);
//! assert_eq!(velocity.speed().dim(), (100, 100));
//! ```

pub mod conduction;
pub mod config;
pub mod electrode;
pub mod error;
pub mod io;
pub mod metrics;
pub mod peaks;
pub mod quorum;
pub mod recording;
pub mod surface;
pub mod velocity;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use conduction::{BeatResult, CancelToken, ConductionAnalyzer, ConductionReport, SkippedBeat};
pub use config::{ConductionConfig, FitFailurePolicy, QuorumPolicy};
pub use electrode::{ChannelId, ElectrodeGrid, GRID_SIDE, N_CHANNELS};
pub use error::{MeaError, Result};
pub use metrics::{
    burst_detection, burst_detection_single, fpd, isi, nan_mean, two_point_velocity, Burst, BurstConfig, Values,
    DEFAULT_FPD_RANGE,
};
pub use peaks::{PeakIndex, PeakTimes, Polarity};
pub use quorum::{count_mode, quorum_filter, Quorum};
pub use recording::Recording;
pub use surface::{Cubic, FittedSurface, N_COEF};
pub use velocity::{VelocityField, UM_PER_S_TO_M_PER_S};

/// Run the **full conduction-velocity pipeline** on one recording.
///
/// This is the main entry point of the library.
///
/// # Pipeline steps
///
/// 1. Look every detected peak up on the recording's time axis.
/// 2. Quorum-filter the channels per [`ConductionConfig::quorum`] and build
///    one arrival-time row per beat.
/// 3. Fit a cubic activation surface to every beat (in parallel on
///    [`ConductionConfig::workers`] threads).
/// 4. Differentiate each surface on the `mesh_num × mesh_num` mesh and derive
///    the velocity field.
///
/// Beats that cannot be fitted are skipped or abort the run according to
/// [`ConductionConfig::on_fit_failure`].
///
/// # Errors
///
/// * [`MeaError::InvalidParameter`] for an invalid configuration.
/// * [`MeaError::PeakOutOfRange`] if a peak index lies past the recording.
/// * Any fit error when the failure policy is [`FitFailurePolicy::Abort`].
pub fn conduction_velocity(
    rec: &Recording,
    peaks: &PeakIndex,
    cfg: &ConductionConfig,
) -> Result<ConductionReport> {
    let analyzer = ConductionAnalyzer::new(cfg.clone())?;
    let times = peaks.to_times(rec)?;
    analyzer.run(&times)
}

/// Conduction velocity per base-channel beat window.
///
/// The recording is cut into `±margin_time` windows around each peak of
/// `base_ch`; peaks falling inside each window are analysed on their own,
/// so a channel that misses one beat only loses that window.  Returns one
/// report per window.
pub fn conduction_velocity_by_beat(
    rec: &Recording,
    peaks: &PeakIndex,
    base_ch: ChannelId,
    margin_time: f64,
    cfg: &ConductionConfig,
) -> Result<Vec<ConductionReport>> {
    let analyzer = ConductionAnalyzer::new(cfg.clone())?;
    let all_times = peaks.to_times(rec)?;
    let windows = rec.beat_cycles(peaks, base_ch, margin_time)?;

    windows
        .iter()
        .map(|w| {
            let (lo, hi) = (w.start(), w.end());
            let series = all_times
                .iter()
                .map(|(_, t)| t.iter().copied().filter(|&v| v >= lo && v < hi).collect())
                .collect();
            analyzer.run(&PeakTimes::new(series)?)
        })
        .collect()
}
