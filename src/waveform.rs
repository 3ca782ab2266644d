//! Sampled complex waveforms
//!
//! A waveform keeps its time axis and its samples together and guarantees
//! that both have the same length. The splice and Doppler helpers used to
//! build research signals live here as well.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::error::{ensure_len, EngineError, Result};

/// Selects one scalar channel of a complex envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexPart {
    Real,
    Imag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    t: Vec<f64>,
    samples: Vec<Complex64>,
}

impl Waveform {
    /// Build a waveform, checking that the axes line up and that time starts
    /// at 0 and strictly increases.
    pub fn new(t: Vec<f64>, samples: Vec<Complex64>) -> Result<Self> {
        ensure_len("waveform samples", t.len(), samples.len())?;
        check_time_axis(&t)?;
        Ok(Self { t, samples })
    }

    /// Recombine real and imaginary channels over a shared time axis.
    pub fn from_parts(t: Vec<f64>, re: &[f64], im: &[f64]) -> Result<Self> {
        ensure_len("real channel", t.len(), re.len())?;
        ensure_len("imaginary channel", re.len(), im.len())?;
        let samples = re
            .iter()
            .zip(im)
            .map(|(&r, &i)| Complex64::new(r, i))
            .collect();
        Self::new(t, samples)
    }

    pub fn times(&self) -> &[f64] {
        &self.t
    }

    pub fn samples(&self) -> &[Complex64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the last sample; 0 for an empty waveform.
    pub fn duration(&self) -> f64 {
        self.t.last().copied().unwrap_or(0.0)
    }

    /// Sample spacing, taken from the first interval.
    pub fn step(&self) -> Option<f64> {
        match self.t.as_slice() {
            [t0, t1, ..] => Some(t1 - t0),
            _ => None,
        }
    }

    pub fn part(&self, part: ComplexPart) -> Vec<f64> {
        match part {
            ComplexPart::Real => self.samples.iter().map(|s| s.re).collect(),
            ComplexPart::Imag => self.samples.iter().map(|s| s.im).collect(),
        }
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<Complex64>) {
        (self.t, self.samples)
    }

    /// Replace the samples, keeping the time axis.
    pub fn with_samples(&self, samples: Vec<Complex64>) -> Result<Self> {
        ensure_len("replacement samples", self.t.len(), samples.len())?;
        Ok(Self {
            t: self.t.clone(),
            samples,
        })
    }
}

fn check_time_axis(t: &[f64]) -> Result<()> {
    if let Some(&t0) = t.first() {
        if t0 != 0.0 {
            return Err(EngineError::invalid(format!(
                "time axis must start at 0, starts at {t0}"
            )));
        }
    }
    if let Some(pos) = t.windows(2).position(|w| !(w[1] > w[0])) {
        return Err(EngineError::invalid(format!(
            "time axis is not strictly increasing at index {}",
            pos + 1
        )));
    }
    Ok(())
}

/// Rotate every sample by `exp(j 2π f_d t)`.
pub fn apply_doppler(waveform: &Waveform, doppler_hz: f64) -> Waveform {
    let w = 2.0 * PI * doppler_hz;
    let samples = waveform
        .t
        .iter()
        .zip(&waveform.samples)
        .map(|(&t, &s)| s * Complex64::from_polar(1.0, w * t))
        .collect();

    Waveform {
        t: waveform.t.clone(),
        samples,
    }
}

/// Index of the first sample at or after `time_s`, tolerating round-off of
/// the sample grid.
pub(crate) fn first_index_at(t: &[f64], time_s: f64, step: f64) -> Option<usize> {
    let tolerance = step.abs() * 1e-6;
    t.iter().position(|&ti| ti >= time_s - tolerance)
}

/// Splice `insert` into `host` starting at the first host sample with
/// `t >= delay_ms / 1000`. The host time axis is left untouched.
pub fn embed(host: &Waveform, insert: &Waveform, delay_ms: f64) -> Result<Waveform> {
    if !(delay_ms.is_finite() && delay_ms >= 0.0) {
        return Err(EngineError::invalid("delay must be finite and >= 0"));
    }
    if host.is_empty() || insert.is_empty() {
        return Err(EngineError::invalid("cannot embed into or from an empty waveform"));
    }

    let delay_s = delay_ms / 1000.0;
    let slack = host.duration() - insert.duration();
    if delay_s > slack + 1e-12 {
        return Err(EngineError::invalid(format!(
            "insert of {} s does not fit into host of {} s at delay {} s",
            insert.duration(),
            host.duration(),
            delay_s
        )));
    }

    let step = host.step().unwrap_or(0.0);
    let idx = first_index_at(&host.t, delay_s, step)
        .ok_or_else(|| EngineError::invalid("delay lies beyond the host time axis"))?;
    let end = idx + insert.len();
    if end > host.len() {
        return Err(EngineError::invalid(format!(
            "insert would end at sample {end}, host has {}",
            host.len()
        )));
    }

    let mut samples = host.samples.clone();
    samples[idx..end].copy_from_slice(&insert.samples);
    Ok(Waveform {
        t: host.t.clone(),
        samples,
    })
}
