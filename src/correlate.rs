//! Matched-filter correlation
//!
//! Valid-mode cross-correlation of a reference against a longer research
//! waveform, its normalization, delay read-out and the peak-expressiveness
//! criterion.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::error::{EngineError, Result};
use crate::waveform::Waveform;

/// Normalized correlation magnitude over the research time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationResult {
    t: Vec<f64>,
    magnitude: Vec<f64>,
}

impl CorrelationResult {
    pub fn times(&self) -> &[f64] {
        &self.t
    }

    /// Magnitudes in `[0, 1]`; the peak is exactly 1.
    pub fn magnitude(&self) -> &[f64] {
        &self.magnitude
    }

    pub fn len(&self) -> usize {
        self.magnitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitude.is_empty()
    }

    pub fn peak_index(&self) -> usize {
        argmax(&self.magnitude)
    }

    pub fn criterion(&self) -> Result<f64> {
        criterion(&self.magnitude)
    }
}

/// Index of the first maximum; 0 for an empty slice.
pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_idx, best), (idx, &v)| {
            if v > best {
                (idx, v)
            } else {
                (best_idx, best)
            }
        })
        .0
}

/// `c[k] = Σ_n research[n + k] · conj(reference[n])` for every lag where the
/// reference fully overlaps the research signal.
///
/// Evaluated as a circular correlation of length `research.len()`; valid lags
/// never reach the wrapped region.
pub fn valid_correlation(reference: &[Complex64], research: &[Complex64]) -> Result<Vec<Complex64>> {
    if reference.is_empty() || research.is_empty() {
        return Err(EngineError::invalid("cannot correlate an empty signal"));
    }
    if reference.len() > research.len() {
        return Err(EngineError::invalid(format!(
            "reference ({} samples) is longer than research ({} samples)",
            reference.len(),
            research.len()
        )));
    }

    let n = research.len();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut research_spectrum = research.to_vec();
    forward.process(&mut research_spectrum);

    let mut reference_spectrum = vec![Complex64::new(0.0, 0.0); n];
    reference_spectrum[..reference.len()].copy_from_slice(reference);
    forward.process(&mut reference_spectrum);

    let mut product: Vec<Complex64> = research_spectrum
        .iter()
        .zip(&reference_spectrum)
        .map(|(a, v)| a * v.conj())
        .collect();
    inverse.process(&mut product);

    let scale = 1.0 / n as f64;
    let valid = n - reference.len() + 1;
    Ok(product.into_iter().take(valid).map(|c| c * scale).collect())
}

/// Relative level below which a correlation peak is FFT round-off, not signal.
const ROUNDOFF_FLOOR: f64 = 1e-12;

fn l2_norm(samples: &[Complex64]) -> f64 {
    samples.iter().map(|s| s.norm_sqr()).sum::<f64>().sqrt()
}

pub fn correlate(reference: &Waveform, research: &Waveform) -> Result<CorrelationResult> {
    let raw = valid_correlation(reference.samples(), research.samples())?;
    let magnitude: Vec<f64> = raw.iter().map(|c| c.norm()).collect();

    // Every lag is bounded by |reference| * |research|.
    let floor = ROUNDOFF_FLOOR * l2_norm(reference.samples()) * l2_norm(research.samples());
    let peak = magnitude.iter().copied().fold(0.0, f64::max);
    if !(peak > floor && peak.is_finite()) {
        return Err(EngineError::degenerate(
            "correlation is identically zero, cannot normalize",
        ));
    }

    let magnitude: Vec<f64> = magnitude.into_iter().map(|m| m / peak).collect();
    let t = research.times()[..magnitude.len()].to_vec();
    Ok(CorrelationResult { t, magnitude })
}

/// Time of the correlation peak in milliseconds.
pub fn find_peak_delay(result: &CorrelationResult) -> f64 {
    result.t[result.peak_index()] * 1000.0
}

/// Peak magnitude over the population standard deviation of the sequence.
pub fn criterion(magnitudes: &[f64]) -> Result<f64> {
    if magnitudes.is_empty() {
        return Err(EngineError::invalid("criterion of an empty sequence"));
    }

    let n = magnitudes.len() as f64;
    let mean = magnitudes.iter().sum::<f64>() / n;
    let variance = magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 {
        return Err(EngineError::degenerate(
            "flat correlation sequence has zero spread",
        ));
    }

    let peak = magnitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(peak / std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::generate_bits;
    use crate::params::{Modulation, Params, SignalRole};
    use crate::synth::synthesize;
    use crate::waveform::embed;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn pair(modulation: Modulation, delay_ms: f64, seed: u64) -> (Waveform, Waveform) {
        let params = Params {
            time_delay_ms: delay_ms,
            ..Params::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ref_bits = generate_bits(params.bits_count, &mut rng);
        let res_bits = generate_bits(params.research_bits_count(), &mut rng);
        let reference = synthesize(SignalRole::Reference, modulation, &params, &ref_bits).unwrap();
        let host = synthesize(SignalRole::Research, modulation, &params, &res_bits).unwrap();
        let research = embed(&host, &reference, delay_ms).unwrap();
        (reference, research)
    }

    fn direct(reference: &[Complex64], research: &[Complex64]) -> Vec<Complex64> {
        (0..=research.len() - reference.len())
            .map(|k| {
                reference
                    .iter()
                    .enumerate()
                    .map(|(n, v)| research[n + k] * v.conj())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn fft_correlation_matches_direct_sum() {
        let reference: Vec<Complex64> = (0..7)
            .map(|i| Complex64::new((i as f64).sin(), (0.5 * i as f64).cos()))
            .collect();
        let research: Vec<Complex64> = (0..23)
            .map(|i| Complex64::new((0.7 * i as f64).cos(), (1.3 * i as f64).sin()))
            .collect();
        let fast = valid_correlation(&reference, &research).unwrap();
        let slow = direct(&reference, &research);
        assert_eq!(fast.len(), 17);
        for (a, b) in fast.iter().zip(&slow) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_delay_self_match_peaks_at_origin() {
        let (reference, research) = pair(Modulation::Phase, 0.0, 21);
        let result = correlate(&reference, &research).unwrap();
        assert_eq!(result.len(), research.len() - reference.len() + 1);
        assert_eq!(result.peak_index(), 0);
        assert_eq!(result.magnitude()[0], 1.0);
        assert!(result.magnitude().iter().all(|&m| (0.0..=1.0).contains(&m)));
    }

    #[test]
    fn noise_free_delay_is_recovered_within_one_step() {
        for modulation in [Modulation::Frequency, Modulation::Phase] {
            let (reference, research) = pair(modulation, 37.0, 8);
            let result = correlate(&reference, &research).unwrap();
            let estimate = find_peak_delay(&result);
            assert!(
                (estimate - 37.0).abs() <= 0.1 + 1e-9,
                "{modulation}: estimated {estimate} ms"
            );
        }
    }

    #[test]
    fn amplitude_keyed_delay_is_recovered_over_quiet_host() {
        // A louder host could outscore the true alignment, so keep it at the
        // low amplitude level.
        let params = Params::default();
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let ref_bits = generate_bits(params.bits_count, &mut rng);
        let quiet = crate::bits::BitSequence::from_values(vec![0; params.research_bits_count()])
            .unwrap();
        let reference =
            synthesize(SignalRole::Reference, Modulation::Amplitude, &params, &ref_bits).unwrap();
        let host = synthesize(SignalRole::Research, Modulation::Amplitude, &params, &quiet).unwrap();
        let research = embed(&host, &reference, 12.0).unwrap();
        let estimate = find_peak_delay(&correlate(&reference, &research).unwrap());
        assert!((estimate - 12.0).abs() <= 0.1 + 1e-9, "estimated {estimate} ms");
    }

    #[test]
    fn zero_signal_is_degenerate() {
        let t: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let zeros = Waveform::new(t.clone(), vec![Complex64::new(0.0, 0.0); 8]).unwrap();
        let reference = Waveform::new(t[..3].to_vec(), vec![Complex64::new(1.0, 0.0); 3]).unwrap();
        assert!(correlate(&reference, &zeros).unwrap_err().is_degenerate());
    }

    #[test]
    fn cancelling_lags_are_degenerate_at_any_length() {
        // [1, -1] against a constant sums to exactly zero at every lag.
        for n in [4, 6, 33, 250] {
            let t: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let research = Waveform::new(t.clone(), vec![Complex64::new(1.0, 0.0); n]).unwrap();
            let reference = Waveform::new(
                t[..2].to_vec(),
                vec![Complex64::new(1.0, 0.0), Complex64::new(-1.0, 0.0)],
            )
            .unwrap();
            let err = correlate(&reference, &research).unwrap_err();
            assert!(err.is_degenerate(), "length {n}: {err}");
        }
    }

    #[test]
    fn oversized_reference_is_invalid() {
        let (reference, research) = pair(Modulation::Amplitude, 0.0, 2);
        assert!(matches!(
            correlate(&research, &reference),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn criterion_is_peak_over_spread() {
        let values = [0.0, 0.0, 0.0, 1.0];
        // mean 0.25, population std sqrt(3)/4
        assert_relative_eq!(criterion(&values).unwrap(), 4.0 / 3f64.sqrt(), epsilon = 1e-12);
        assert!(criterion(&[0.5, 0.5]).unwrap_err().is_degenerate());
    }
}
