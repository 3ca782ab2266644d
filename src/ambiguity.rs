//! Delay/Doppler ambiguity surface
//!
//! For every candidate delay the research segment under the reference is
//! optionally Doppler-rotated, multiplied by the conjugated reference and
//! transformed; the magnitude of that spectrum is one column of the surface.
//! Columns are independent and are filled in parallel.

use std::f64::consts::PI;

use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use tracing::debug;

use crate::correlate::{argmax, criterion};
use crate::error::{EngineError, Result};
use crate::waveform::Waveform;

/// Normalized magnitudes over (delay, Doppler).
///
/// Rows follow the delay axis; within a row the Doppler bins keep FFT order
/// (`0, 1, .., N/2 - 1, -N/2, .., -1` times the bin width).
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguitySurface {
    tau: Vec<f64>,
    doppler: Vec<f64>,
    magnitude: Vec<f64>,
}

impl AmbiguitySurface {
    /// Candidate delays [s].
    pub fn tau_axis(&self) -> &[f64] {
        &self.tau
    }

    /// Doppler bins [Hz] in FFT order.
    pub fn doppler_axis(&self) -> &[f64] {
        &self.doppler
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.tau.len(), self.doppler.len())
    }

    /// Flat row-major magnitudes, `tau_len * doppler_len` values.
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitude
    }

    pub fn at(&self, tau_idx: usize, doppler_idx: usize) -> Option<f64> {
        if tau_idx >= self.tau.len() || doppler_idx >= self.doppler.len() {
            return None;
        }
        self.magnitude
            .get(tau_idx * self.doppler.len() + doppler_idx)
            .copied()
    }

    pub fn column(&self, tau_idx: usize) -> Option<&[f64]> {
        let width = self.doppler.len();
        let start = tau_idx.checked_mul(width)?;
        self.magnitude.get(start..start + width)
    }

    /// Maximum over Doppler for every delay.
    pub fn tau_cut(&self) -> Vec<f64> {
        self.magnitude
            .chunks_exact(self.doppler.len())
            .map(|row| row.iter().copied().fold(0.0, f64::max))
            .collect()
    }

    /// Maximum over delay for every Doppler bin, as `(doppler_axis, cut)`
    /// sorted ascending by frequency.
    pub fn doppler_cut(&self) -> (Vec<f64>, Vec<f64>) {
        let width = self.doppler.len();
        let mut cut = vec![0.0_f64; width];
        for row in self.magnitude.chunks_exact(width) {
            for (best, &m) in cut.iter_mut().zip(row) {
                *best = best.max(m);
            }
        }

        let mut pairs: Vec<(f64, f64)> = self.doppler.iter().copied().zip(cut).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        pairs.into_iter().unzip()
    }

    pub fn estimated_delay_ms(&self) -> f64 {
        self.tau[argmax(&self.tau_cut())] * 1000.0
    }

    pub fn estimated_doppler_hz(&self) -> f64 {
        let (axis, cut) = self.doppler_cut();
        axis[argmax(&cut)]
    }

    /// Peak-expressiveness of the delay profile (`tau_cut`), comparable with
    /// the correlator's criterion.
    pub fn criterion(&self) -> Result<f64> {
        criterion(&self.tau_cut())
    }
}

/// Sample frequencies of an `n`-point FFT over samples spaced `step` apart.
pub fn fft_frequencies(n: usize, step: f64) -> Vec<f64> {
    let width = 1.0 / (n as f64 * step);
    let positive = (n.saturating_sub(1)) / 2 + 1;
    (0..n)
        .map(|k| {
            if k < positive {
                k as f64 * width
            } else {
                (k as f64 - n as f64) * width
            }
        })
        .collect()
}

/// Ambiguity surface of `research` against `reference`.
///
/// With `doppler_hz`, every research segment is rotated by `exp(j 2π f t)`
/// over the segment's own time axis before it meets the reference, so a
/// shift of `-f` already present in the research window lands on bin 0.
pub fn compute_surface(
    reference: &Waveform,
    research: &Waveform,
    doppler_hz: Option<f64>,
) -> Result<AmbiguitySurface> {
    let n = reference.len();
    if n == 0 {
        return Err(EngineError::invalid("reference waveform is empty"));
    }
    if research.len() <= n {
        return Err(EngineError::invalid(format!(
            "research ({} samples) must be longer than reference ({} samples)",
            research.len(),
            n
        )));
    }
    let step = reference
        .step()
        .ok_or_else(|| EngineError::invalid("reference needs at least two samples"))?;

    if doppler_hz.is_some_and(|f| !f.is_finite()) {
        return Err(EngineError::invalid("doppler_hz must be finite"));
    }

    let candidates = research.len() - n;
    // The segment rotation is the same for every delay, so fold it into the
    // conjugated reference once.
    let conj_ref: Vec<Complex64> = match doppler_hz {
        Some(f) => reference
            .samples()
            .iter()
            .zip(reference.times())
            .map(|(s, &t)| s.conj() * Complex64::from_polar(1.0, 2.0 * PI * f * t))
            .collect(),
        None => reference.samples().iter().map(|s| s.conj()).collect(),
    };
    let fft = FftPlanner::<f64>::new().plan_fft_forward(n);
    let samples = research.samples();

    let mut magnitude = vec![0.0_f64; candidates * n];
    magnitude
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(k, column)| {
            let mut buffer: Vec<Complex64> = samples[k..k + n]
                .iter()
                .zip(&conj_ref)
                .map(|(s, r)| s * r)
                .collect();
            fft.process(&mut buffer);
            for (out, c) in column.iter_mut().zip(&buffer) {
                *out = c.norm();
            }
        });

    let peak = magnitude.iter().copied().fold(0.0, f64::max);
    if !(peak > 0.0 && peak.is_finite()) {
        return Err(EngineError::degenerate(
            "ambiguity surface is identically zero",
        ));
    }
    magnitude.par_iter_mut().for_each(|m| *m /= peak);

    debug!(candidates, bins = n, ?doppler_hz, "computed ambiguity surface");
    Ok(AmbiguitySurface {
        tau: research.times()[..candidates].to_vec(),
        doppler: fft_frequencies(n, step),
        magnitude,
    })
}
