//! Detected peaks, one sequence per channel.
//!
//! Peak *detection* happens upstream; this module only holds its output.
//! A [`PeakIndex`] stores sample indices for all 64 channels plus a
//! [`Polarity`] tag, and [`PeakTimes`] is the same data converted to seconds,
//! ready for the quorum filter.
use crate::electrode::{ChannelId, N_CHANNELS};
use crate::error::{MeaError, Result};
use crate::recording::Recording;

/// Which extrema a [`PeakIndex`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Negative,
    Positive,
    Both,
}

/// Sorted sample indices of detected peaks for each of the 64 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakIndex {
    series: Vec<Vec<usize>>,
    polarity: Polarity,
}

impl PeakIndex {
    /// `series[i]` holds the peaks of channel `i + 1`.
    ///
    /// Exactly 64 series are required.  Each series is sorted and
    /// de-duplicated on the way in.
    pub fn new(mut series: Vec<Vec<usize>>, polarity: Polarity) -> Result<Self> {
        if series.len() != N_CHANNELS {
            return Err(MeaError::ShapeMismatch {
                what: "peak series",
                expected: N_CHANNELS,
                actual: series.len(),
            });
        }
        for s in &mut series {
            s.sort_unstable();
            s.dedup();
        }
        Ok(Self { series, polarity })
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn get(&self, ch: ChannelId) -> &[usize] {
        &self.series[ch.index()]
    }

    /// Peak count per channel, channel 1 first.
    pub fn counts(&self) -> Vec<usize> {
        self.series.iter().map(Vec::len).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &[usize])> {
        ChannelId::all().zip(self.series.iter().map(Vec::as_slice))
    }

    /// Sorted union with another index, tagged [`Polarity::Both`].
    pub fn merge(&self, other: &PeakIndex) -> PeakIndex {
        let series = self
            .series
            .iter()
            .zip(&other.series)
            .map(|(a, b)| {
                let mut v: Vec<usize> = a.iter().chain(b).copied().collect();
                v.sort_unstable();
                v.dedup();
                v
            })
            .collect();
        PeakIndex { series, polarity: Polarity::Both }
    }

    /// Look every peak up on the recording's time row.
    pub fn to_times(&self, rec: &Recording) -> Result<PeakTimes> {
        let time = rec.time();
        let len = time.len();
        let mut out = Vec::with_capacity(N_CHANNELS);
        for (ch, peaks) in self.iter() {
            let mut t = Vec::with_capacity(peaks.len());
            for &p in peaks {
                if p >= len {
                    return Err(MeaError::PeakOutOfRange { channel: ch.get(), index: p, len });
                }
                t.push(time[p]);
            }
            out.push(t);
        }
        PeakTimes::new(out)
    }

    /// Convert indices to seconds assuming sample 0 is at `t = 0`.
    pub fn to_times_at(&self, sampling_rate: f64) -> Result<PeakTimes> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(MeaError::InvalidParameter(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        PeakTimes::new(
            self.series
                .iter()
                .map(|s| s.iter().map(|&p| p as f64 / sampling_rate).collect())
                .collect(),
        )
    }
}

/// Peak timestamps in seconds for each of the 64 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakTimes {
    series: Vec<Vec<f64>>,
}

impl PeakTimes {
    /// `series[i]` holds the timestamps of channel `i + 1`.  Empty series are
    /// allowed; the channel count must be exactly 64.
    pub fn new(series: Vec<Vec<f64>>) -> Result<Self> {
        if series.len() != N_CHANNELS {
            return Err(MeaError::ShapeMismatch {
                what: "peak time series",
                expected: N_CHANNELS,
                actual: series.len(),
            });
        }
        Ok(Self { series })
    }

    pub fn get(&self, ch: ChannelId) -> &[f64] {
        &self.series[ch.index()]
    }

    pub fn counts(&self) -> Vec<usize> {
        self.series.iter().map(Vec::len).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &[f64])> {
        ChannelId::all().zip(self.series.iter().map(Vec::as_slice))
    }
}
