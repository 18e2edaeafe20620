//! Channel quorum filter.
//!
//! A channel takes part in the spatial fit only if it detected the same
//! number of beats as most of the array.  The majority count is the
//! statistical mode of the per-channel peak counts; ties go to the smallest
//! count.  Surviving channels are then transposed from "per channel, all
//! beats" into "per beat, all channels".
//!
//! The filter never fails.  A recording where nothing agrees simply yields
//! few (or zero) beats, and the solver rejects what it cannot fit.
use log::{info, warn};

use crate::config::QuorumPolicy;
use crate::electrode::ChannelId;
use crate::peaks::PeakTimes;

/// Channels admitted to the fit and the per-beat arrival table.
#[derive(Debug, Clone, PartialEq)]
pub struct Quorum {
    mode: usize,
    channels: Vec<ChannelId>,
    removed: Vec<(ChannelId, usize)>,
    surplus: Vec<(ChannelId, usize)>,
    beats: Vec<Vec<f64>>,
}

impl Quorum {
    /// The majority peak count.
    pub fn mode(&self) -> usize {
        self.mode
    }

    /// Surviving channels in ascending order.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Dropped channels with their peak counts.
    pub fn removed(&self) -> &[(ChannelId, usize)] {
        &self.removed
    }

    /// Channels kept under a tolerance despite extra peaks, with their
    /// peak counts.  Only one peak per beat of each is used.
    pub fn surplus(&self) -> &[(ChannelId, usize)] {
        &self.surplus
    }

    pub fn removed_channels(&self) -> Vec<ChannelId> {
        self.removed.iter().map(|&(ch, _)| ch).collect()
    }

    pub fn n_beats(&self) -> usize {
        self.beats.len()
    }

    /// Arrival times of beat `j`, aligned with [`Quorum::channels`].
    pub fn beat(&self, j: usize) -> &[f64] {
        &self.beats[j]
    }

    pub fn beats(&self) -> &[Vec<f64>] {
        &self.beats
    }
}

/// Mode of `counts`; the smallest value wins a tie.  `0` for no input.
pub fn count_mode(counts: &[usize]) -> usize {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();
    let mut best = (0usize, 0usize); // (value, frequency)
    let mut i = 0;
    while i < sorted.len() {
        let v = sorted[i];
        let run = sorted[i..].iter().take_while(|&&x| x == v).count();
        if run > best.1 {
            best = (v, run);
        }
        i += run;
    }
    best.0
}

/// Run the quorum filter over the peak times of one recording.
pub fn quorum_filter(times: &PeakTimes, policy: QuorumPolicy) -> Quorum {
    let counts = times.counts();
    let mode = count_mode(&counts);
    let tol = policy.tolerance();

    let exact: Vec<ChannelId> = times
        .iter()
        .filter(|(_, t)| t.len() == mode)
        .map(|(ch, _)| ch)
        .collect();

    let mut removed = Vec::new();
    let mut surplus = Vec::new();
    for (ch, t) in times.iter() {
        let n = t.len();
        if n == mode {
            continue;
        }
        if n > mode && n - mode <= tol {
            surplus.push((ch, n));
        } else {
            removed.push((ch, n));
        }
    }

    if !removed.is_empty() {
        let listing: Vec<String> = removed.iter().map(|(ch, n)| format!("{ch}({n})")).collect();
        warn!(
            "quorum filter dropped {} channel(s) whose peak count differs from the mode {mode}: {}",
            removed.len(),
            listing.join(", ")
        );
    }

    if !surplus.is_empty() {
        let listing: Vec<String> = surplus.iter().map(|(ch, n)| format!("{ch}({n})")).collect();
        info!(
            "quorum filter kept {} channel(s) above the mode {mode}, discarding {} extra peak(s): {}",
            surplus.len(),
            surplus.iter().map(|&(_, n)| n - mode).sum::<usize>(),
            listing.join(", ")
        );
    }

    // Reference arrival per beat, used to pick surplus-channel peaks.
    let reference: Vec<f64> = if surplus.is_empty() {
        Vec::new()
    } else {
        (0..mode)
            .map(|j| median(exact.iter().map(|&ch| times.get(ch)[j]).collect()))
            .collect()
    };

    let mut channels: Vec<ChannelId> = exact.iter().copied().chain(surplus.iter().map(|&(ch, _)| ch)).collect();
    channels.sort_unstable();

    let beats = (0..mode)
        .map(|j| {
            channels
                .iter()
                .map(|&ch| {
                    let t = times.get(ch);
                    if t.len() == mode {
                        t[j]
                    } else {
                        nearest(t, reference[j])
                    }
                })
                .collect()
        })
        .collect();

    Quorum { mode, channels, removed, surplus, beats }
}

fn median(mut v: Vec<f64>) -> f64 {
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        v[n / 2]
    } else {
        0.5 * (v[n / 2 - 1] + v[n / 2])
    }
}

fn nearest(t: &[f64], target: f64) -> f64 {
    t.iter()
        .copied()
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electrode::N_CHANNELS;

    fn times_with(counts: &[(usize, usize)], default: usize) -> PeakTimes {
        let mut series: Vec<Vec<f64>> = (0..N_CHANNELS)
            .map(|c| (0..default).map(|j| j as f64 + c as f64 * 1e-4).collect())
            .collect();
        for &(idx, n) in counts {
            series[idx] = (0..n).map(|j| j as f64 + idx as f64 * 1e-4).collect();
        }
        PeakTimes::new(series).unwrap()
    }

    #[test]
    fn mode_ties_pick_smallest() {
        assert_eq!(count_mode(&[3, 3, 2, 2, 5]), 2);
        assert_eq!(count_mode(&[4, 4, 4, 1]), 4);
        assert_eq!(count_mode(&[]), 0);
    }

    #[test]
    fn all_agree_keeps_everything() {
        let q = quorum_filter(&times_with(&[], 8), QuorumPolicy::ExactMode);
        assert_eq!(q.mode(), 8);
        assert_eq!(q.channels().len(), 64);
        assert!(q.removed().is_empty());
        assert_eq!(q.n_beats(), 8);
        assert_eq!(q.beat(3).len(), 64);
        approx::assert_abs_diff_eq!(q.beat(3)[10], 3.0 + 10.0 * 1e-4);
    }

    #[test]
    fn deviating_channels_are_removed() {
        let q = quorum_filter(&times_with(&[(0, 7), (20, 9), (63, 0)], 8), QuorumPolicy::ExactMode);
        let removed: Vec<u8> = q.removed_channels().iter().map(|c| c.get()).collect();
        assert_eq!(removed, vec![1, 21, 64]);
        assert_eq!(q.channels().len(), 61);
        assert!(q.beats().iter().all(|b| b.len() == 61));
    }

    #[test]
    fn tolerance_admits_surplus_channels_only() {
        let q = quorum_filter(&times_with(&[(0, 7), (20, 9)], 8), QuorumPolicy::Tolerance(1));
        let removed: Vec<u8> = q.removed_channels().iter().map(|c| c.get()).collect();
        assert_eq!(removed, vec![1]);
        assert_eq!(q.channels().len(), 63);
        let pos = q.channels().iter().position(|c| c.get() == 21).unwrap();
        approx::assert_abs_diff_eq!(q.beat(5)[pos], 5.0 + 20.0 * 1e-4);
    }

    #[test]
    fn surplus_channels_are_reported() {
        let t = times_with(&[(20, 9), (33, 10)], 8);
        let q = quorum_filter(&t, QuorumPolicy::Tolerance(2));
        let surplus: Vec<(u8, usize)> = q.surplus().iter().map(|&(c, n)| (c.get(), n)).collect();
        assert_eq!(surplus, vec![(21, 9), (34, 10)]);
        assert!(q.removed().is_empty());

        let strict = quorum_filter(&t, QuorumPolicy::ExactMode);
        assert!(strict.surplus().is_empty());
    }

    #[test]
    fn empty_recording_yields_no_beats() {
        let q = quorum_filter(&times_with(&[], 0), QuorumPolicy::ExactMode);
        assert_eq!(q.mode(), 0);
        assert_eq!(q.n_beats(), 0);
    }
}
