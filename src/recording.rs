//! Immutable MEA recordings.
//!
//! A [`Recording`] is a `[65, T]` matrix: row 0 is the time axis in seconds,
//! rows 1..=64 are per-channel voltages in μV.  The backing storage is an
//! `ArcArray2`, so slices and beat windows share memory with the recording
//! they came from.  Nothing here mutates in place; every transform returns a
//! new `Recording`.
use ndarray::{s, Array2, ArcArray2, ArrayView1, ArrayView2};

use crate::electrode::{ChannelId, N_CHANNELS};
use crate::error::{MeaError, Result};
use crate::peaks::PeakIndex;

/// Rows in a recording matrix: one time row + 64 channels.
pub const N_ROWS: usize = N_CHANNELS + 1;

#[derive(Debug, Clone)]
pub struct Recording {
    array: ArcArray2<f64>,
    sampling_rate: f64,
    gain: f64,
    start: f64,
    end: f64,
}

impl Recording {
    /// Wrap a `[65, T]` matrix.  `start`/`end` are taken from the time row.
    pub fn new(array: Array2<f64>, sampling_rate: f64, gain: f64) -> Result<Self> {
        Self::from_shared(array.into_shared(), sampling_rate, gain)
    }

    pub fn from_shared(array: ArcArray2<f64>, sampling_rate: f64, gain: f64) -> Result<Self> {
        if array.nrows() != N_ROWS {
            return Err(MeaError::ShapeMismatch {
                what: "recording rows",
                expected: N_ROWS,
                actual: array.nrows(),
            });
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(MeaError::InvalidParameter(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        let n = array.ncols();
        let start = if n > 0 { array[[0, 0]] } else { 0.0 };
        let end = start + n as f64 / sampling_rate;
        Ok(Self { array, sampling_rate, gain, start, end })
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// First timestamp (s).
    pub fn start(&self) -> f64 {
        self.start
    }

    /// End of the covered interval (s), exclusive.
    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn n_samples(&self) -> usize {
        self.array.ncols()
    }

    /// The whole `[65, T]` matrix.
    pub fn array(&self) -> ArrayView2<'_, f64> {
        self.array.view()
    }

    /// Time axis in seconds.
    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.array.row(0)
    }

    /// Voltage trace of one channel (μV).
    pub fn channel(&self, ch: ChannelId) -> ArrayView1<'_, f64> {
        self.array.row(ch.get() as usize)
    }

    /// Frames `start_frame..end_frame` as a new recording sharing storage.
    pub fn slice(&self, start_frame: usize, end_frame: usize) -> Result<Recording> {
        let len = self.n_samples();
        if start_frame >= end_frame || end_frame > len {
            return Err(MeaError::InvalidTimeRange { start: start_frame, end: end_frame, len });
        }
        let array = self.array.clone().slice_move(s![.., start_frame..end_frame]);
        Ok(Recording {
            start: array[[0, 0]],
            end: array[[0, 0]] + (end_frame - start_frame) as f64 / self.sampling_rate,
            array,
            sampling_rate: self.sampling_rate,
            gain: self.gain,
        })
    }

    /// One window of `±margin_time` seconds around every peak of `base_ch`.
    ///
    /// Windows are clamped to the recording bounds; a peak whose window
    /// would be empty is skipped.
    pub fn beat_cycles(
        &self,
        peaks: &PeakIndex,
        base_ch: ChannelId,
        margin_time: f64,
    ) -> Result<Vec<Recording>> {
        if !(margin_time.is_finite() && margin_time > 0.0) {
            return Err(MeaError::InvalidParameter(format!(
                "beat margin must be positive, got {margin_time}"
            )));
        }
        let half = (margin_time * self.sampling_rate) as usize;
        let total = self.n_samples();
        let mut out = Vec::with_capacity(peaks.get(base_ch).len());
        for &p in peaks.get(base_ch) {
            let start = p.saturating_sub(half);
            let end = p.saturating_add(half).min(total);
            if start < end {
                out.push(self.slice(start, end)?);
            }
        }
        Ok(out)
    }

    /// Copy whose time axis starts at 0 s.
    pub fn init_time(&self) -> Recording {
        let mut array = self.array.to_owned();
        let t0 = self.start;
        array.row_mut(0).mapv_inplace(|t| t - t0);
        Recording {
            array: array.into_shared(),
            sampling_rate: self.sampling_rate,
            gain: self.gain,
            start: 0.0,
            end: self.duration(),
        }
    }

    /// Max/min decimation by `factor`.
    ///
    /// Each voltage row is cut into blocks of `2 · factor` samples (the last
    /// block is edge-padded) and every block contributes its minimum then
    /// its maximum, which keeps spikes visible at the lower rate.
    pub fn downsample(&self, factor: usize) -> Result<Recording> {
        if factor == 0 {
            return Err(MeaError::InvalidParameter("downsample factor must be ≥ 1".into()));
        }
        let block = factor * 2;
        let n = self.n_samples();
        let n_blocks = n.div_ceil(block);
        let new_len = n_blocks * 2;
        let new_rate = self.sampling_rate / factor as f64;

        let mut out = Array2::<f64>::zeros((N_ROWS, new_len));
        for (i, t) in out.row_mut(0).iter_mut().enumerate() {
            *t = self.start + i as f64 / new_rate;
        }
        for ch in 1..N_ROWS {
            let row = self.array.row(ch);
            let mut dst = out.row_mut(ch);
            for b in 0..n_blocks {
                let lo = b * block;
                let hi = (lo + block).min(n);
                let chunk = row.slice(s![lo..hi]);
                // Edge padding repeats the last sample, which cannot change
                // a block's min or max.
                let (mn, mx) = chunk
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(mn, mx), &v| (mn.min(v), mx.max(v)));
                dst[2 * b] = mn;
                dst[2 * b + 1] = mx;
            }
        }
        Recording::new(out, new_rate, self.gain)
    }

    /// Voltage rows only, `[64, T]`.
    pub fn voltages(&self) -> ArrayView2<'_, f64> {
        self.array.slice(s![1.., ..])
    }
}
