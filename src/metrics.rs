//! Scalar electrophysiology metrics.
//!
//! [`Values`] is a plain sample vector with named summary statistics.  The
//! helpers compute inter-spike intervals, field-potential duration, the
//! two-electrode conduction velocity and synchronized bursts from detected
//! peaks.
use log::debug;

use crate::electrode::{ChannelId, ElectrodeGrid};
use crate::error::{MeaError, Result};
use crate::peaks::{PeakIndex, PeakTimes};

/// Mean of the finite entries, `NaN` when there are none.
pub fn nan_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// A sample of one metric.  Statistics of an empty sample are `NaN`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Values {
    values: Vec<f64>,
}

impl Values {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Mean over finite entries only.
    pub fn nan_mean(&self) -> f64 {
        nan_mean(self.values.iter().copied())
    }

    /// Population standard deviation (`ddof = 0`).
    pub fn std(&self) -> f64 {
        let m = self.mean();
        let n = self.values.len() as f64;
        (self.values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt()
    }

    /// `std / n`.
    pub fn se(&self) -> f64 {
        self.std() / self.values.len() as f64
    }

    /// Short-term variability: `Σ|xᵢ₊₁ − xᵢ| / (N·√2)` with `N` successive
    /// differences.
    pub fn stv(&self) -> f64 {
        let diffs: Vec<f64> = self.values.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        if diffs.is_empty() {
            return f64::NAN;
        }
        diffs.iter().sum::<f64>() / (diffs.len() as f64 * std::f64::consts::SQRT_2)
    }

    /// `std / mean · 100` (%).
    pub fn coefficient_of_variation(&self) -> f64 {
        self.std() / self.mean() * 100.0
    }

    /// Element-wise `v + x` as a new sample.
    pub fn add(&self, x: f64) -> Values {
        Values::new(self.values.iter().map(|v| v + x).collect())
    }

    /// Element-wise `v · x` as a new sample.
    pub fn scale(&self, x: f64) -> Values {
        Values::new(self.values.iter().map(|v| v * x).collect())
    }
}

/// Inter-spike intervals (s) of one channel.
pub fn isi(peaks: &PeakIndex, ch: ChannelId, sampling_rate: f64) -> Values {
    Values::new(
        peaks
            .get(ch)
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / sampling_rate)
            .collect(),
    )
}

/// Per-beat conduction velocity (m/s) between two electrodes.
///
/// Distance over arrival-time difference, beat by beat.  Both channels must
/// report the same number of peaks; coincident peaks give `inf`.
pub fn two_point_velocity(
    peaks: &PeakIndex,
    grid: &ElectrodeGrid,
    ch1: ChannelId,
    ch2: ChannelId,
    sampling_rate: f64,
) -> Result<Values> {
    let (a, b) = (peaks.get(ch1), peaks.get(ch2));
    if a.len() != b.len() {
        return Err(MeaError::ShapeMismatch {
            what: "peak counts of the two electrodes",
            expected: a.len(),
            actual: b.len(),
        });
    }
    let distance_m = grid.distance(ch1, ch2) * 1e-6; // μm → m
    Ok(Values::new(
        a.iter()
            .zip(b)
            .map(|(&p, &q)| {
                let dt = p.abs_diff(q) as f64 / sampling_rate;
                distance_m / dt
            })
            .collect(),
    ))
}

/// Accepted field-potential durations (s), exclusive on both ends.
pub const DEFAULT_FPD_RANGE: (f64, f64) = (0.1, 0.4);

/// Field-potential duration (s) of one channel, one value per beat.
///
/// Each negative (depolarisation) peak is paired with the first positive
/// (repolarisation) peak after it.  Durations outside the open interval
/// `fpd_range` are dropped, which also discards beats whose repolarisation
/// peak was missed.
pub fn fpd(
    neg: &PeakIndex,
    pos: &PeakIndex,
    ch: ChannelId,
    sampling_rate: f64,
    fpd_range: (f64, f64),
) -> Values {
    let (lo, hi) = fpd_range;
    let pos = pos.get(ch);
    let values: Vec<f64> = neg
        .get(ch)
        .iter()
        .filter_map(|&p| {
            let q = pos.get(pos.partition_point(|&q| q <= p))?;
            let d = (q - p) as f64 / sampling_rate;
            (lo < d && d < hi).then_some(d)
        })
        .collect();
    debug!("{ch}: {} of {} beats within FPD range", values.len(), neg.get(ch).len());
    Values::new(values)
}

/// Thresholds of the four-step synchronized burst detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstConfig {
    /// Largest gap (s) between spikes of one burst.
    pub max_isi: f64,
    /// Spikes a run needs to count as a burst candidate.
    pub min_spikes: usize,
    /// Candidates closer than this (s) are merged.
    pub min_ibi: f64,
    /// Spikes a merged burst needs to be reported.
    pub spikes_threshold: usize,
}

impl Default for BurstConfig {
    /// Array-wide detection over all 64 channels.
    fn default() -> Self {
        Self { max_isi: 0.004, min_spikes: 20, min_ibi: 0.06, spikes_threshold: 3000 }
    }
}

impl BurstConfig {
    /// Thresholds for bursts on a single electrode.
    pub fn single_channel() -> Self {
        Self { max_isi: 0.175, min_spikes: 5, min_ibi: 0.8, spikes_threshold: 9 }
    }
}

/// One detected burst: its spike times in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    spikes: Vec<f64>,
}

impl Burst {
    pub fn spikes(&self) -> &[f64] {
        &self.spikes
    }

    pub fn len(&self) -> usize {
        self.spikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spikes.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.spikes.first().copied().unwrap_or(f64::NAN)
    }

    pub fn end(&self) -> f64 {
        self.spikes.last().copied().unwrap_or(f64::NAN)
    }

    pub fn duration(&self) -> f64 {
        self.end() - self.start()
    }
}

/// Synchronized bursts across the whole array.
///
/// Spikes of all channels are pooled in time order, then:
/// 1. split into runs whose successive gaps are at most `max_isi`,
/// 2. runs shorter than `min_spikes` are discarded,
/// 3. runs separated by less than `min_ibi` are merged,
/// 4. merged bursts with fewer than `spikes_threshold` spikes are discarded.
pub fn burst_detection(times: &PeakTimes, cfg: &BurstConfig) -> Vec<Burst> {
    let mut spikes: Vec<f64> = times.iter().flat_map(|(_, t)| t.iter().copied()).collect();
    spikes.sort_by(f64::total_cmp);
    let bursts = detect_bursts(&spikes, cfg);
    debug!("burst detection: {} burst(s) in {} spikes", bursts.len(), spikes.len());
    bursts
}

/// Bursts on one electrode, see [`burst_detection`].
pub fn burst_detection_single(times: &PeakTimes, ch: ChannelId, cfg: &BurstConfig) -> Vec<Burst> {
    detect_bursts(times.get(ch), cfg)
}

fn detect_bursts(spikes: &[f64], cfg: &BurstConfig) -> Vec<Burst> {
    let mut runs: Vec<Vec<f64>> = Vec::new();
    let mut run: Vec<f64> = Vec::new();
    for &t in spikes {
        if let Some(&last) = run.last() {
            if t - last > cfg.max_isi {
                if run.len() >= cfg.min_spikes {
                    runs.push(std::mem::take(&mut run));
                } else {
                    run.clear();
                }
            }
        }
        run.push(t);
    }
    if run.len() >= cfg.min_spikes {
        runs.push(run);
    }

    let mut merged: Vec<Vec<f64>> = Vec::new();
    for r in runs {
        match merged.last_mut() {
            Some(prev) if r[0] - prev[prev.len() - 1] < cfg.min_ibi => prev.extend(r),
            _ => merged.push(r),
        }
    }

    merged
        .into_iter()
        .filter(|b| b.len() >= cfg.spikes_threshold)
        .map(|spikes| Burst { spikes })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electrode::N_CHANNELS;
    use crate::peaks::Polarity;

    #[test]
    fn summary_statistics() {
        let v = Values::new(vec![1.0, 2.0, 3.0, 4.0]);
        approx::assert_abs_diff_eq!(v.mean(), 2.5);
        approx::assert_abs_diff_eq!(v.std(), 1.25f64.sqrt(), epsilon = 1e-12);
        approx::assert_abs_diff_eq!(v.se(), 1.25f64.sqrt() / 4.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(v.stv(), 3.0 / (3.0 * 2f64.sqrt()), epsilon = 1e-12);
        approx::assert_abs_diff_eq!(v.coefficient_of_variation(), 1.25f64.sqrt() / 2.5 * 100.0, epsilon = 1e-9);
        assert_eq!(v.add(1.0).values(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn empty_sample_is_nan_not_panic() {
        let v = Values::default();
        assert!(v.mean().is_nan());
        assert!(v.std().is_nan());
        assert!(v.stv().is_nan());
    }

    #[test]
    fn nan_mean_skips_non_finite() {
        approx::assert_abs_diff_eq!(nan_mean([1.0, f64::NAN, 3.0, f64::INFINITY]), 2.0);
        assert!(nan_mean([f64::NAN]).is_nan());
    }

    #[test]
    fn isi_in_seconds() {
        let mut series = vec![vec![]; N_CHANNELS];
        series[0] = vec![0, 1000, 2500];
        let peaks = PeakIndex::new(series, Polarity::Negative).unwrap();
        let v = isi(&peaks, ChannelId::new(1).unwrap(), 1000.0);
        assert_eq!(v.values(), &[1.0, 1.5]);
    }

    #[test]
    fn two_point_velocity_between_neighbours() {
        let mut series = vec![vec![]; N_CHANNELS];
        series[0] = vec![1000, 5000];
        series[1] = vec![1009, 5018];
        let peaks = PeakIndex::new(series, Polarity::Negative).unwrap();
        let grid = ElectrodeGrid::new(450.0).unwrap();
        let c = |n| ChannelId::new(n).unwrap();
        // 450 μm over 0.45 ms / 0.9 ms at 20 kHz.
        let v = two_point_velocity(&peaks, &grid, c(1), c(2), 20_000.0).unwrap();
        approx::assert_relative_eq!(v.values()[0], 1.0, max_relative = 1e-12);
        approx::assert_relative_eq!(v.values()[1], 0.5, max_relative = 1e-12);

        assert!(two_point_velocity(&peaks, &grid, c(1), c(3), 20_000.0).is_err());
    }

    fn single_channel(peaks: Vec<usize>) -> PeakIndex {
        let mut series = vec![vec![]; N_CHANNELS];
        series[0] = peaks;
        PeakIndex::new(series, Polarity::Negative).unwrap()
    }

    #[test]
    fn fpd_pairs_each_beat_with_next_positive_peak() {
        let ch = ChannelId::new(1).unwrap();
        let neg = single_channel(vec![1_000, 21_000, 41_000, 61_000]);
        // Beat 2 has no repolarisation peak; beat 3's is too late.
        let pos = single_channel(vec![7_000, 26_000, 70_000]);
        let v = fpd(&neg, &pos, ch, 20_000.0, DEFAULT_FPD_RANGE);
        assert_eq!(v.len(), 2);
        approx::assert_abs_diff_eq!(v.values()[0], 0.3, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(v.values()[1], 0.25, epsilon = 1e-12);

        let none = fpd(&neg, &single_channel(vec![]), ch, 20_000.0, DEFAULT_FPD_RANGE);
        assert!(none.is_empty());
    }

    fn train(start: f64, n: usize, gap: f64) -> Vec<f64> {
        (0..n).map(|i| start + i as f64 * gap).collect()
    }

    #[test]
    fn bursts_on_one_electrode() {
        let ch = ChannelId::new(1).unwrap();
        let mut t = train(0.0, 6, 0.1); // 0.0..0.5
        t.extend(train(0.9, 5, 0.1)); // merged with the first: gap 0.4 s
        t.extend(train(5.0, 3, 0.1)); // too short
        t.extend(train(10.0, 9, 0.1));
        let mut series = vec![vec![]; N_CHANNELS];
        series[0] = t;
        let times = PeakTimes::new(series).unwrap();

        let bursts = burst_detection_single(&times, ch, &BurstConfig::single_channel());
        assert_eq!(bursts.len(), 2);
        assert_eq!(bursts[0].len(), 11);
        approx::assert_abs_diff_eq!(bursts[0].start(), 0.0);
        approx::assert_abs_diff_eq!(bursts[0].end(), 1.3, epsilon = 1e-12);
        assert_eq!(bursts[1].len(), 9);
        approx::assert_abs_diff_eq!(bursts[1].duration(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn array_bursts_pool_all_channels() {
        // Each channel fires once per 1 ms inside two network bursts.
        let series: Vec<Vec<f64>> = (0..N_CHANNELS)
            .map(|c| {
                let off = c as f64 * 1e-5;
                let mut t = train(1.0 + off, 50, 1e-3);
                t.extend(train(3.0 + off, 50, 1e-3));
                t
            })
            .collect();
        let times = PeakTimes::new(series).unwrap();
        let bursts = burst_detection(&times, &BurstConfig::default());
        assert_eq!(bursts.len(), 2);
        assert!(bursts.iter().all(|b| b.len() == 50 * N_CHANNELS));
        assert!(bursts[0].spikes().windows(2).all(|w| w[0] <= w[1]));

        let strict = BurstConfig { spikes_threshold: 10_000, ..Default::default() };
        assert!(burst_detection(&times, &strict).is_empty());
    }
}
