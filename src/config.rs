//! Conduction-analysis configuration.
//!
//! [`ConductionConfig`] holds every tunable parameter of the
//! conduction-velocity pipeline.  The defaults match the standard 8×8 MEA
//! dish (450 μm pitch) and a 100×100 output mesh.

use crate::error::{MeaError, Result};

/// How channels are admitted to the beat quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuorumPolicy {
    /// Keep exactly the channels whose peak count equals the mode.
    #[default]
    ExactMode,
    /// Also keep channels with up to `k` surplus peaks over the mode.
    ///
    /// For each beat such a channel contributes the peak closest to the
    /// median arrival of the exact-mode channels.  Channels with *fewer*
    /// peaks than the mode are always dropped.
    Tolerance(usize),
}

impl QuorumPolicy {
    pub fn tolerance(self) -> usize {
        match self {
            QuorumPolicy::ExactMode => 0,
            QuorumPolicy::Tolerance(k) => k,
        }
    }
}

/// What the aggregator does when one beat cannot be fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitFailurePolicy {
    /// Log the beat and leave it out of the report.
    #[default]
    Skip,
    /// Return the first fit error and discard the whole run.
    Abort,
}

/// Configuration for the conduction-velocity pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use mea::ConductionConfig;
///
/// let cfg = ConductionConfig {
///     mesh_num: 50,        // coarser output surface
///     ..ConductionConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ConductionConfig {
    /// Inter-electrode distance in micrometres.
    ///
    /// Default: `450.0` μm.
    pub ele_dis: f64,

    /// Samples per axis of the dense output mesh.
    ///
    /// The fitted surface and the velocity field are evaluated on a
    /// `mesh_num × mesh_num` grid spanning `[0, 7 · ele_dis]` on both axes.
    ///
    /// Default: `100`.
    pub mesh_num: usize,

    /// Channel admission rule for the quorum filter.
    ///
    /// Default: [`QuorumPolicy::ExactMode`].
    pub quorum: QuorumPolicy,

    /// Behaviour when a single beat fails to fit.
    ///
    /// Default: [`FitFailurePolicy::Skip`].
    pub on_fit_failure: FitFailurePolicy,

    /// Worker threads for the per-beat fits.  `0` lets rayon decide.
    ///
    /// Default: `0`.
    pub workers: usize,
}

impl Default for ConductionConfig {
    /// 450 μm pitch · 100×100 mesh · exact-mode quorum · skip failed beats.
    fn default() -> Self {
        Self {
            ele_dis: 450.0,
            mesh_num: 100,
            quorum: QuorumPolicy::ExactMode,
            on_fit_failure: FitFailurePolicy::Skip,
            workers: 0,
        }
    }
}

impl ConductionConfig {
    /// Reject settings the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.ele_dis.is_finite() && self.ele_dis > 0.0) {
            return Err(MeaError::InvalidParameter(format!(
                "electrode spacing must be positive and finite, got {}",
                self.ele_dis
            )));
        }
        if self.mesh_num < 2 {
            return Err(MeaError::InvalidParameter(format!(
                "mesh_num must be at least 2, got {}",
                self.mesh_num
            )));
        }
        Ok(())
    }
}
