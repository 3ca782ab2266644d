//! Waveform synthesis
//!
//! Turns bits into a sampled complex carrier under amplitude, frequency or
//! four-phase I/Q keying. Formulas per scheme:
//!
//! - amplitude: `A(bit) * cos(ωt)` with `A ∈ {1, 10}`, imaginary part 0
//! - frequency: `exp(j (f(bit) t + φ))` with `f ∈ {2πf_c, 4πf_c}` and a running
//!   phase `φ` that is set to `f t` after every sample
//! - phase: `cos(ωt + φ_I) + j cos(ωt + φ_Q)` with `φ ∈ {3π/4, 7π/4}`

use std::f64::consts::PI;

use rand::Rng;
use rustfft::num_complex::Complex64;
use tracing::debug;

use crate::bits::{generate_bits, map_to_iq, BitSequence, IqStreams};
use crate::error::{ensure_len, EngineError, Result};
use crate::params::{Modulation, Params, SignalRole, SignalTiming};
use crate::waveform::{first_index_at, Waveform};

pub const LOW_AMPLITUDE: f64 = 1.0;
pub const HIGH_AMPLITUDE: f64 = 10.0;

/// Phase offset of an I/Q component carrying bit 0.
pub const PHASE_BIT_ZERO: f64 = 3.0 * PI / 4.0;
/// Phase offset of an I/Q component carrying bit 1.
pub const PHASE_BIT_ONE: f64 = 7.0 * PI / 4.0;

fn phase_offset(bit: u8) -> f64 {
    if bit == 0 {
        PHASE_BIT_ZERO
    } else {
        PHASE_BIT_ONE
    }
}

fn phase_sample(omega_t: f64, iq: &IqStreams, index: usize) -> Complex64 {
    Complex64::new(
        (omega_t + phase_offset(iq.i[index])).cos(),
        (omega_t + phase_offset(iq.q[index])).cos(),
    )
}

/// Keyed waveform carrying exactly `bits`, which must hold as many bits as
/// `role` prescribes for `params`.
pub fn synthesize(
    role: SignalRole,
    modulation: Modulation,
    params: &Params,
    bits: &BitSequence,
) -> Result<Waveform> {
    ensure_len("signal bits", role.bits_count(params), bits.len())?;
    let timing = SignalTiming::new(params, bits.len())?;
    let t = timing.times();
    let values = bits.as_slice();

    let samples: Vec<Complex64> = match modulation {
        Modulation::Amplitude => t
            .iter()
            .map(|&t| {
                let amplitude = if values[timing.bit_index(t)] == 0 {
                    LOW_AMPLITUDE
                } else {
                    HIGH_AMPLITUDE
                };
                Complex64::new(amplitude * (timing.omega * t).cos(), 0.0)
            })
            .collect(),
        Modulation::Frequency => {
            let low = 2.0 * PI * params.carrier_freq;
            let high = 4.0 * PI * params.carrier_freq;
            t.iter()
                .scan(0.0_f64, |phase, &t| {
                    let freq = if values[timing.bit_index(t)] == 0 {
                        low
                    } else {
                        high
                    };
                    let value = Complex64::from_polar(1.0, freq * t + *phase);
                    *phase = freq * t;
                    Some(value)
                })
                .collect()
        }
        Modulation::Phase => {
            let iq = map_to_iq(bits);
            t.iter()
                .map(|&t| phase_sample(timing.omega * t, &iq, timing.bit_index(t)))
                .collect()
        }
    };

    Waveform::new(t, samples)
}

/// Phase-keyed research signal with the reference symbols spliced in at the
/// configured delay and the whole window rotated by the Doppler shift.
pub fn synthesize_spliced_research(
    params: &Params,
    research_bits: &BitSequence,
    reference_bits: &BitSequence,
) -> Result<Waveform> {
    ensure_len(
        "research bits",
        params.research_bits_count(),
        research_bits.len(),
    )?;
    ensure_len("reference bits", params.bits_count, reference_bits.len())?;
    if !(params.time_delay_ms.is_finite() && params.time_delay_ms >= 0.0) {
        return Err(EngineError::invalid("time_delay_ms must be finite and >= 0"));
    }

    let timing = SignalTiming::new(params, research_bits.len())?;
    let reference_timing = SignalTiming::new(params, reference_bits.len())?;
    let t = timing.times();

    let delay_idx = first_index_at(&t, params.time_delay_ms / 1000.0, timing.step)
        .ok_or_else(|| EngineError::invalid("delay lies beyond the research window"))?;
    let splice_end = delay_idx + reference_timing.sample_count;
    if splice_end > t.len() {
        return Err(EngineError::invalid(format!(
            "spliced reference would end at sample {splice_end}, research has {}",
            t.len()
        )));
    }

    let own = map_to_iq(research_bits);
    let reference = map_to_iq(reference_bits);
    let doppler_w = 2.0 * PI * params.doppler_hz;

    let samples = t
        .iter()
        .enumerate()
        .map(|(idx, &t)| {
            let omega_t = timing.omega * t;
            let value = if (delay_idx..splice_end).contains(&idx) {
                let shifted_t = reference_timing.time_at(idx - delay_idx);
                phase_sample(omega_t, &reference, reference_timing.bit_index(shifted_t))
            } else {
                phase_sample(omega_t, &own, timing.bit_index(t))
            };
            value * Complex64::from_polar(1.0, doppler_w * t)
        })
        .collect();

    debug!(
        delay_idx,
        splice_len = reference_timing.sample_count,
        doppler_hz = params.doppler_hz,
        "spliced reference into research signal"
    );
    Waveform::new(t, samples)
}

/// Draw fresh bits for `role` and synthesize them.
pub fn synthesize_random<R: Rng + ?Sized>(
    role: SignalRole,
    modulation: Modulation,
    params: &Params,
    rng: &mut R,
) -> Result<(BitSequence, Waveform)> {
    let bits = generate_bits(role.bits_count(params), rng);
    let waveform = synthesize(role, modulation, params, &bits)?;
    Ok((bits, waveform))
}
