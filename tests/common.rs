/// Shared helpers: synthetic recordings and a tensor reader for written files.
use mea::{ChannelId, ElectrodeGrid, PeakIndex, PeakTimes, Polarity, Recording};
use ndarray::{Array, Array2, IxDyn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ELE_DIS: f64 = 450.0;
pub const EXTENT: f64 = ELE_DIS * 7.0;

#[allow(unused)]
pub fn grid() -> ElectrodeGrid {
    ElectrodeGrid::new(ELE_DIS).unwrap()
}

#[allow(unused)]
/// Smooth activation pattern spanning roughly 0–5 ms whose x-slope never
/// vanishes on the grid.
pub fn wavefront(x: f64, y: f64) -> f64 {
    let (u, v) = (x / EXTENT, y / EXTENT);
    5e-3 / 1.05 * (0.6 * u + 0.4 * v + 0.05 * u * u)
}

#[allow(unused)]
/// `n_beats` beats one second apart, every channel following `pattern`.
pub fn beat_times(n_beats: usize, pattern: impl Fn(f64, f64) -> f64) -> PeakTimes {
    let g = grid();
    let series = ChannelId::all()
        .map(|ch| {
            let (x, y) = g.position(ch);
            (0..n_beats).map(|j| 0.5 + j as f64 + pattern(x, y)).collect()
        })
        .collect();
    PeakTimes::new(series).unwrap()
}

#[allow(unused)]
/// Flat recording with a proper time row at `fs` Hz.
pub fn flat_recording(n_samples: usize, fs: f64) -> Recording {
    let array = Array2::from_shape_fn((65, n_samples), |(r, t)| if r == 0 { t as f64 / fs } else { 0.0 });
    Recording::new(array, fs, 1.0).unwrap()
}

#[allow(unused)]
/// Peak indices for a planar wave at `speed` m/s crossing the dish every
/// `period` samples, first beat at `first`.
pub fn planar_peaks(n_beats: usize, first: usize, period: usize, fs: f64, speed: f64) -> PeakIndex {
    let g = grid();
    let series = ChannelId::all()
        .map(|ch| {
            let (x, y) = g.position(ch);
            let delay = ((x + y) * 1e-6 / speed * fs).round() as usize;
            (0..n_beats).map(|j| first + j * period + delay).collect()
        })
        .collect();
    PeakIndex::new(series, Polarity::Negative).unwrap()
}

#[allow(unused)]
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mea-test-{}-{name}", std::process::id()))
}

#[allow(unused)]
/// Load all numeric tensors converted to f64.
/// Handles F32, F64, I32, I64.
pub fn load_tensors_f64(path: &Path) -> HashMap<String, Array<f64, IxDyn>> {
    let bytes = std::fs::read(path)
        .unwrap_or_else(|_| panic!("tensor file not found: {}", path.display()));

    let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
    let header: serde_json::Value = serde_json::from_slice(&bytes[8..8 + n]).unwrap();
    let data_start = 8 + n;

    let mut out = HashMap::new();
    for (key, val) in header.as_object().unwrap() {
        if key == "__metadata__" { continue; }
        let dtype = val["dtype"].as_str().unwrap();
        let offsets = val["data_offsets"].as_array().unwrap();
        let s = offsets[0].as_u64().unwrap() as usize;
        let e = offsets[1].as_u64().unwrap() as usize;
        let raw = &bytes[data_start + s..data_start + e];
        let shape: Vec<usize> = val["shape"].as_array().unwrap()
            .iter().map(|v| v.as_u64().unwrap() as usize).collect();

        let vals: Vec<f64> = match dtype {
            "F32" => raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes(b.try_into().unwrap()) as f64)
                .collect(),
            "F64" => raw.chunks_exact(8)
                .map(|b| f64::from_le_bytes(b.try_into().unwrap()))
                .collect(),
            "I32" => raw.chunks_exact(4)
                .map(|b| i32::from_le_bytes(b.try_into().unwrap()) as f64)
                .collect(),
            "I64" => raw.chunks_exact(8)
                .map(|b| i64::from_le_bytes(b.try_into().unwrap()) as f64)
                .collect(),
            _ => continue,
        };

        let arr = Array::from_shape_vec(IxDyn(&shape), vals).unwrap();
        out.insert(key.clone(), arr);
    }
    out
}
