//! Safetensors I/O for recordings, peaks and conduction reports.
//!
//! Readers accept `raw.safetensors`-style files:
//!   recording: `array` [65, T] (F32 or F64), `sampling_rate` [1], `gain` [1]
//!   peaks:     `peaks_1` … `peaks_64` (I64 or I32), optional `polarity` [1]
//!              (0 = negative, 1 = positive, 2 = both)
//!
//! [`write_report`] stores one group of tensors per analysed beat.
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;

use crate::conduction::ConductionReport;
use crate::electrode::{ChannelId, N_CHANNELS};
use crate::peaks::{PeakIndex, Polarity};
use crate::recording::Recording;
use crate::surface::N_COEF;

// ── Low-level safetensors parser ─────────────────────────────────────────────

type Header = HashMap<String, serde_json::Value>;

fn parse_header(bytes: &[u8]) -> Result<(Header, usize)> {
    if bytes.len() < 8 {
        bail!("safetensors file too small");
    }
    let n = u64::from_le_bytes(bytes[..8].try_into()?) as usize;
    if bytes.len() < 8 + n {
        bail!("safetensors header length {n} exceeds file size {}", bytes.len());
    }
    let header: Header = serde_json::from_slice(&bytes[8..8 + n])
        .context("failed to parse safetensors header")?;
    Ok((header, 8 + n))
}

fn shape_of(entry: &serde_json::Value) -> Result<Vec<usize>> {
    entry["shape"]
        .as_array()
        .context("tensor entry has no shape")?
        .iter()
        .map(|v| v.as_u64().map(|d| d as usize).context("non-integer dimension"))
        .collect()
}

/// Decode any supported numeric tensor to `f64`.
fn read_tensor_f64(bytes: &[u8], data_start: usize, entry: &serde_json::Value) -> Result<Vec<f64>> {
    let offsets = entry["data_offsets"].as_array().context("tensor entry has no data_offsets")?;
    let s = offsets.first().and_then(|v| v.as_u64()).context("bad data offset")? as usize;
    let e = offsets.get(1).and_then(|v| v.as_u64()).context("bad data offset")? as usize;
    let raw = bytes
        .get(data_start + s..data_start + e)
        .context("tensor data past end of file")?;
    let dtype = entry["dtype"].as_str().context("tensor entry has no dtype")?;
    let vals = match dtype {
        "F32" => raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
        "F64" => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "I32" => raw.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
        "I64" => raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
            .collect(),
        other => bail!("unsupported dtype {other}"),
    };
    Ok(vals)
}

fn scalar(header: &Header, bytes: &[u8], data_start: usize, key: &str) -> Result<f64> {
    let entry = header.get(key).with_context(|| format!("missing '{key}' key"))?;
    read_tensor_f64(bytes, data_start, entry)?
        .first()
        .copied()
        .with_context(|| format!("'{key}' is empty"))
}

// ── Readers ──────────────────────────────────────────────────────────────────

/// Load a `[65, T]` recording.
pub fn load_recording(path: &Path) -> Result<Recording> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (header, data_start) = parse_header(&bytes)?;

    let entry = header.get("array").context("missing 'array' key")?;
    let shape = shape_of(entry)?;
    if shape.len() != 2 {
        bail!("'array' must be 2-D, got shape {shape:?}");
    }
    let data = read_tensor_f64(&bytes, data_start, entry)?;
    let array = Array2::from_shape_vec((shape[0], shape[1]), data)?;

    let sampling_rate = scalar(&header, &bytes, data_start, "sampling_rate")?;
    // Gain is informational; older exports omit it.
    let gain = scalar(&header, &bytes, data_start, "gain").unwrap_or(1.0);

    Ok(Recording::new(array, sampling_rate, gain)?)
}

/// Load 64 per-channel peak index series.
pub fn load_peaks(path: &Path) -> Result<PeakIndex> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (header, data_start) = parse_header(&bytes)?;

    let mut series = Vec::with_capacity(N_CHANNELS);
    for ch in ChannelId::all() {
        let key = format!("peaks_{}", ch.get());
        let peaks = match header.get(&key) {
            Some(entry) => read_tensor_f64(&bytes, data_start, entry)?
                .into_iter()
                .map(|v| {
                    if !v.is_finite() || v < 0.0 || v.fract() != 0.0 {
                        bail!("peak index {v} in '{key}' is not a sample number");
                    }
                    Ok(v as usize)
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        series.push(peaks);
    }

    let polarity = match header.get("polarity") {
        Some(_) => match scalar(&header, &bytes, data_start, "polarity")? as i64 {
            0 => Polarity::Negative,
            1 => Polarity::Positive,
            2 => Polarity::Both,
            other => bail!("unknown polarity code {other}"),
        },
        None => Polarity::Negative,
    };

    Ok(PeakIndex::new(series, polarity)?)
}

// ── Generic safetensors builder ──────────────────────────────────────────────

/// Simple safetensors file writer for F64, I32 and I64 tensors.
///
/// Usage:
/// ```rust,no_run
/// use mea::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("r2", &[0.98, 0.97], &[2]);
/// w.add_i64("beat_index", &[0, 1], &[2]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

// ── Writers ──────────────────────────────────────────────────────────────────

/// Write a recording in the format [`load_recording`] reads.
pub fn write_recording(rec: &Recording, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_arr2("array", &rec.array().to_owned());
    w.add_f64("sampling_rate", &[rec.sampling_rate()], &[1]);
    w.add_f64("gain", &[rec.gain()], &[1]);
    w.write(path)
}

/// Write peaks in the format [`load_peaks`] reads.
pub fn write_peaks(peaks: &PeakIndex, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    for (ch, p) in peaks.iter() {
        let data: Vec<i64> = p.iter().map(|&v| v as i64).collect();
        w.add_i64(&format!("peaks_{}", ch.get()), &data, &[data.len()]);
    }
    let code = match peaks.polarity() {
        Polarity::Negative => 0,
        Polarity::Positive => 1,
        Polarity::Both => 2,
    };
    w.add_i32("polarity", &[code], &[1]);
    w.write(path)
}

/// Write a conduction report.
///
/// Keys, for each reported beat `i`:
///   `coef_i` [10]   `surface_i` [n, n] (ms)   `speed_i` [n, n] (m/s)
///   `grad_x_i` / `grad_y_i` [n, n] (s/μm)
/// plus `r2` [B], `beat_index` [B], `degenerate` [B] (0/1),
/// `channels` and `removed_channels`.
pub fn write_report(report: &ConductionReport, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    let n_beats = report.len();

    for (i, b) in report.beats().iter().enumerate() {
        w.add_f64(&format!("coef_{i}"), b.surface.coefficients(), &[N_COEF]);
        w.add_f64_arr2(&format!("surface_{i}"), b.surface.surface());
        w.add_f64_arr2(&format!("speed_{i}"), b.velocity.speed());
        let (gx, gy) = b.velocity.gradient();
        w.add_f64_arr2(&format!("grad_x_{i}"), gx);
        w.add_f64_arr2(&format!("grad_y_{i}"), gy);
    }

    w.add_f64("r2", &report.r2_scores(), &[n_beats]);
    let beat_index: Vec<i64> = report.beats().iter().map(|b| b.beat as i64).collect();
    w.add_i64("beat_index", &beat_index, &[n_beats]);
    let degenerate: Vec<i32> = report.beats().iter().map(|b| b.surface.is_degenerate() as i32).collect();
    w.add_i32("degenerate", &degenerate, &[n_beats]);

    let channels: Vec<i32> = report.channels().iter().map(|c| c.get() as i32).collect();
    w.add_i32("channels", &channels, &[channels.len()]);
    let removed: Vec<i32> = report.removed_channels().iter().map(|c| c.get() as i32).collect();
    w.add_i32("removed_channels", &removed, &[removed.len()]);

    w.write(path)
}
