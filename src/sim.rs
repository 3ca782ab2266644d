//! Single-run pipeline
//!
//! Draws the bits, synthesizes the reference and research windows, adds
//! channel noise to both and reads the delay off the matched filter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ambiguity::{compute_surface, AmbiguitySurface};
use crate::bits::{generate_bits, BitSequence};
use crate::correlate::{correlate, find_peak_delay, CorrelationResult};
use crate::error::Result;
use crate::noise::add_noise;
use crate::params::{Modulation, Params, SignalRole};
use crate::synth::{synthesize, synthesize_spliced_research};
use crate::waveform::{apply_doppler, embed, Waveform};

/// Everything produced by one run
#[derive(Debug, Clone)]
pub struct Simulation {
    pub params: Params,
    pub modulation: Modulation,
    pub reference_bits: BitSequence,
    pub research_bits: BitSequence,
    /// Noise-free reference
    pub reference: Waveform,
    /// Noise-free research window with the embedded copy
    pub research: Waveform,
    pub noisy_reference: Waveform,
    pub noisy_research: Waveform,
    pub correlation: CorrelationResult,
    pub estimated_delay_ms: f64,
    pub criterion: f64,
}

/// Scalar outcome of a run, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub modulation: Modulation,
    pub snr_db: f64,
    pub doppler_hz: f64,
    pub time_delay_ms: f64,
    pub estimated_delay_ms: f64,
    pub delay_error_ms: f64,
    pub hit: bool,
    pub criterion: f64,
}

impl Simulation {
    pub fn delay_error_ms(&self) -> f64 {
        (self.estimated_delay_ms - self.params.time_delay_ms).abs()
    }

    pub fn is_hit(&self) -> bool {
        is_hit(&self.params, self.estimated_delay_ms)
    }

    /// Ambiguity surface of the noisy pair, optionally rotating each
    /// research segment by `doppler_hz`.
    pub fn ambiguity(&self, doppler_hz: Option<f64>) -> Result<AmbiguitySurface> {
        compute_surface(&self.noisy_reference, &self.noisy_research, doppler_hz)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            modulation: self.modulation,
            snr_db: self.params.snr_db,
            doppler_hz: self.params.doppler_hz,
            time_delay_ms: self.params.time_delay_ms,
            estimated_delay_ms: self.estimated_delay_ms,
            delay_error_ms: self.delay_error_ms(),
            hit: self.is_hit(),
            criterion: self.criterion,
        }
    }
}

/// A delay estimate scores a hit within half a bit time of the truth.
pub fn is_hit(params: &Params, estimated_delay_ms: f64) -> bool {
    (estimated_delay_ms - params.time_delay_ms).abs() <= params.hit_tolerance_ms()
}

/// Noise-free research window for `modulation`, carrying the reference at
/// the configured delay and Doppler.
pub fn research_waveform(
    params: &Params,
    modulation: Modulation,
    research_bits: &BitSequence,
    reference_bits: &BitSequence,
    reference: &Waveform,
) -> Result<Waveform> {
    if modulation == Modulation::Phase {
        return synthesize_spliced_research(params, research_bits, reference_bits);
    }

    let host = synthesize(SignalRole::Research, modulation, params, research_bits)?;
    let research = embed(&host, reference, params.time_delay_ms)?;
    if params.doppler_hz == 0.0 {
        Ok(research)
    } else {
        Ok(apply_doppler(&research, params.doppler_hz))
    }
}

pub fn simulate<R: Rng + ?Sized>(
    params: &Params,
    modulation: Modulation,
    rng: &mut R,
) -> Result<Simulation> {
    params.validate()?;

    let reference_bits = generate_bits(SignalRole::Reference.bits_count(params), rng);
    let research_bits = generate_bits(SignalRole::Research.bits_count(params), rng);
    let reference = synthesize(SignalRole::Reference, modulation, params, &reference_bits)?;
    let research = research_waveform(
        params,
        modulation,
        &research_bits,
        &reference_bits,
        &reference,
    )?;

    let noisy_reference = add_noise(&reference, SignalRole::Reference.snr_db(params), rng)?;
    let noisy_research = add_noise(&research, SignalRole::Research.snr_db(params), rng)?;

    let correlation = correlate(&noisy_reference, &noisy_research)?;
    let estimated_delay_ms = find_peak_delay(&correlation);
    let criterion = correlation.criterion()?;

    debug!(
        %modulation,
        snr_db = params.snr_db,
        doppler_hz = params.doppler_hz,
        estimated_delay_ms,
        criterion,
        "simulation run finished"
    );

    Ok(Simulation {
        params: *params,
        modulation,
        reference_bits,
        research_bits,
        reference,
        research,
        noisy_reference,
        noisy_research,
        correlation,
        estimated_delay_ms,
        criterion,
    })
}
