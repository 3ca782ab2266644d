//! SNR-calibrated noise injection
//!
//! Noise samples are the mean of [`NOISE_AVERAGING`] uniform draws on
//! `[-1, 1]`, then scaled so that the total injected energy equals
//! `signal_energy / 10^(snr/10)` exactly.

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{EngineError, Result};
use crate::waveform::{ComplexPart, Waveform};

pub const NOISE_AVERAGING: usize = 20;

pub fn signal_energy(samples: &[f64]) -> f64 {
    samples.iter().map(|x| x * x).sum()
}

pub fn target_noise_energy(signal_energy: f64, snr_db: f64) -> f64 {
    signal_energy / 10f64.powf(snr_db / 10.0)
}

fn averaged_uniform<R: Rng + ?Sized>(dist: &Uniform<f64>, rng: &mut R) -> f64 {
    let sum: f64 = (0..NOISE_AVERAGING).map(|_| dist.sample(rng)).sum();
    sum / NOISE_AVERAGING as f64
}

/// Add calibrated noise to one real channel.
pub fn add_channel_noise<R: Rng + ?Sized>(
    samples: &[f64],
    snr_db: f64,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if !snr_db.is_finite() {
        return Err(EngineError::invalid("snr_db must be finite"));
    }

    let noise_energy = target_noise_energy(signal_energy(samples), snr_db);

    let dist = Uniform::new_inclusive(-1.0, 1.0);
    let noise: Vec<f64> = (0..samples.len())
        .map(|_| averaged_uniform(&dist, rng))
        .collect();
    let random_energy = signal_energy(&noise);
    if random_energy == 0.0 {
        return Err(EngineError::degenerate(format!(
            "noise draw over {} samples has zero energy",
            samples.len()
        )));
    }

    let alpha = (noise_energy / random_energy).sqrt();
    Ok(samples
        .iter()
        .zip(&noise)
        .map(|(&x, &n)| x + alpha * n)
        .collect())
}

/// Add calibrated noise to the real and imaginary channels independently.
pub fn add_noise<R: Rng + ?Sized>(waveform: &Waveform, snr_db: f64, rng: &mut R) -> Result<Waveform> {
    let re = add_channel_noise(&waveform.part(ComplexPart::Real), snr_db, rng)?;
    let im = add_channel_noise(&waveform.part(ComplexPart::Imag), snr_db, rng)?;
    Waveform::from_parts(waveform.times().to_vec(), &re, &im)
}
