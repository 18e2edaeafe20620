//! 8×8 electrode geometry.
//!
//! Channels are numbered 1..=64 row-major from the top-left of the dish:
//! channel 1 sits at mesh position (row 0, col 0) and channel 64 at
//! (row 7, col 7).  Physical `x` grows to the right with the column, `y`
//! grows *upward*, so row 0 carries the largest `y`:
//!
//! ```text
//!   y
//!   ▲  ch 1  ch 2  …  ch 8      (y = 7·d)
//!   │  ch 9  …                  (y = 6·d)
//!   │  …
//!   │  ch 57 …        ch 64     (y = 0)
//!   └──────────────────────▶ x
//! ```
use std::fmt;

use ndarray::Array2;

use crate::error::{MeaError, Result};

/// Electrodes per grid side.
pub const GRID_SIDE: usize = 8;
/// Total recording channels.
pub const N_CHANNELS: usize = GRID_SIDE * GRID_SIDE;

/// A channel number that is guaranteed to lie in `1..=64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

impl ChannelId {
    pub fn new(channel: i64) -> Result<Self> {
        if (1..=N_CHANNELS as i64).contains(&channel) {
            Ok(ChannelId(channel as u8))
        } else {
            Err(MeaError::InvalidChannel { channel })
        }
    }

    /// Channel number, `1..=64`.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based position in a 64-entry channel table.
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Channel for a zero-based table position.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::new(index as i64 + 1)
    }

    pub fn row(self) -> usize {
        self.index() / GRID_SIDE
    }

    pub fn col(self) -> usize {
        self.index() % GRID_SIDE
    }

    /// Every channel, in ascending order.
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (1..=N_CHANNELS as u8).map(ChannelId)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

impl TryFrom<i64> for ChannelId {
    type Error = MeaError;

    fn try_from(channel: i64) -> Result<Self> {
        ChannelId::new(channel)
    }
}

/// Physical layout of the 8×8 electrode array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectrodeGrid {
    ele_dis: f64,
}

impl ElectrodeGrid {
    /// `ele_dis` is the inter-electrode spacing (μm by convention).
    pub fn new(ele_dis: f64) -> Result<Self> {
        if !(ele_dis.is_finite() && ele_dis > 0.0) {
            return Err(MeaError::InvalidParameter(format!(
                "electrode spacing must be positive and finite, got {ele_dis}"
            )));
        }
        Ok(Self { ele_dis })
    }

    pub fn spacing(&self) -> f64 {
        self.ele_dis
    }

    /// Edge length of the grid: `7 · spacing`.
    pub fn extent(&self) -> f64 {
        self.ele_dis * (GRID_SIDE - 1) as f64
    }

    /// `(x, y)` of a channel given as a raw number.
    ///
    /// Returns [`MeaError::InvalidChannel`] outside `1..=64`.
    pub fn coordinate(&self, channel: i64) -> Result<(f64, f64)> {
        Ok(self.position(ChannelId::new(channel)?))
    }

    /// `(x, y)` of an already-validated channel.
    pub fn position(&self, ch: ChannelId) -> (f64, f64) {
        let x = ch.col() as f64 * self.ele_dis;
        let y = (GRID_SIDE - 1 - ch.row()) as f64 * self.ele_dis;
        (x, y)
    }

    /// Euclidean distance between two electrodes.
    pub fn distance(&self, a: ChannelId, b: ChannelId) -> f64 {
        let (xa, ya) = self.position(a);
        let (xb, yb) = self.position(b);
        (xa - xb).hypot(ya - yb)
    }

    /// Dense `n × n` coordinate grids `(XX, YY)` spanning `[0, extent]`.
    ///
    /// `XX[[r, c]]` grows with `c`; `YY[[r, c]]` shrinks with `r`, so that
    /// `mesh(8)[r][c]` is exactly the position of channel `8·r + c + 1`.
    pub fn mesh(&self, n: usize) -> (Array2<f64>, Array2<f64>) {
        let extent = self.extent();
        let step = if n > 1 { extent / (n - 1) as f64 } else { 0.0 };
        let xx = Array2::from_shape_fn((n, n), |(_, c)| c as f64 * step);
        let yy = Array2::from_shape_fn((n, n), |(r, _)| {
            if n > 1 { (n - 1 - r) as f64 * step } else { 0.0 }
        });
        (xx, yy)
    }

    /// The 8×8 mesh of electrode positions.
    pub fn electrode_mesh(&self) -> (Array2<f64>, Array2<f64>) {
        self.mesh(GRID_SIDE)
    }
}
