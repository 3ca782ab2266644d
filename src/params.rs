//! Simulation parameters
//!
//! Physical parameters shared by every stage of a run, plus the closed
//! selectors for signal role and modulation scheme.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The research window holds this many reference-lengths of bits.
pub const RESEARCH_BITS_FACTOR: usize = 3;

/// Parameter set for one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Sampling rate [Hz]
    pub sampling_rate: f64,
    /// Carrier frequency [Hz]
    pub carrier_freq: f64,
    /// Information rate [bit/s]
    pub bits_per_second: f64,
    /// Number of information bits in the reference signal
    pub bits_count: usize,
    /// Delay of the embedded copy inside the research signal [ms]
    pub time_delay_ms: f64,
    /// Target SNR of the research signal [dB]
    pub snr_db: f64,
    /// Doppler shift applied to the research signal [Hz]
    pub doppler_hz: f64,
    /// Target SNR of the reference signal [dB]
    pub reference_snr_db: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            sampling_rate: 10_000.0,
            carrier_freq: 1_000.0,
            bits_per_second: 100.0,
            bits_count: 16,
            time_delay_ms: 5.0,
            snr_db: 10.0,
            doppler_hz: 0.0,
            reference_snr_db: 10.0,
        }
    }
}

impl Params {
    pub fn with_snr_db(self, snr_db: f64) -> Self {
        Self { snr_db, ..self }
    }

    pub fn with_doppler_hz(self, doppler_hz: f64) -> Self {
        Self { doppler_hz, ..self }
    }

    pub fn with_time_delay_ms(self, time_delay_ms: f64) -> Self {
        Self {
            time_delay_ms,
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(EngineError::invalid("sampling_rate must be finite and > 0"));
        }
        if !(self.carrier_freq.is_finite() && self.carrier_freq > 0.0) {
            return Err(EngineError::invalid("carrier_freq must be finite and > 0"));
        }
        if !(self.bits_per_second.is_finite() && self.bits_per_second > 0.0) {
            return Err(EngineError::invalid(
                "bits_per_second must be finite and > 0",
            ));
        }
        if self.bits_count == 0 {
            return Err(EngineError::invalid("bits_count must be > 0"));
        }
        if !(self.time_delay_ms.is_finite() && self.time_delay_ms >= 0.0) {
            return Err(EngineError::invalid("time_delay_ms must be finite and >= 0"));
        }
        if !self.snr_db.is_finite() || !self.reference_snr_db.is_finite() {
            return Err(EngineError::invalid("snr values must be finite"));
        }
        if !self.doppler_hz.is_finite() {
            return Err(EngineError::invalid("doppler_hz must be finite"));
        }

        let available_s = self.bit_time() * (self.research_bits_count() - self.bits_count) as f64;
        if self.time_delay_ms / 1000.0 > available_s {
            return Err(EngineError::invalid(format!(
                "time delay {} ms exceeds the {} ms available in the research signal",
                self.time_delay_ms,
                available_s * 1000.0
            )));
        }

        Ok(())
    }

    pub fn bit_time(&self) -> f64 {
        1.0 / self.bits_per_second
    }

    pub fn research_bits_count(&self) -> usize {
        self.bits_count * RESEARCH_BITS_FACTOR
    }

    /// Half a bit time in milliseconds: the tolerance of a delay "hit".
    pub fn hit_tolerance_ms(&self) -> f64 {
        0.5 * self.bit_time() * 1000.0
    }
}

/// Derived time base of a waveform carrying `n_bits` bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalTiming {
    pub bit_time: f64,
    pub duration: f64,
    pub omega: f64,
    pub step: f64,
    pub sample_count: usize,
    pub n_bits: usize,
}

impl SignalTiming {
    pub fn new(params: &Params, n_bits: usize) -> Result<Self> {
        if !(params.bits_per_second.is_finite() && params.bits_per_second > 0.0) {
            return Err(EngineError::invalid("bits_per_second must be finite and > 0"));
        }
        if !(params.sampling_rate.is_finite() && params.sampling_rate > 0.0) {
            return Err(EngineError::invalid("sampling_rate must be finite and > 0"));
        }
        if n_bits == 0 {
            return Err(EngineError::invalid("cannot build a signal from zero bits"));
        }

        let bit_time = 1.0 / params.bits_per_second;
        let duration = bit_time * n_bits as f64;
        let n = params.sampling_rate * duration;
        let step = duration / n;
        // Same count as stepping t through [0, duration) by `step`.
        let sample_count = ((n - 1e-9).ceil() as usize).max(1);

        Ok(Self {
            bit_time,
            duration,
            omega: 2.0 * PI * params.carrier_freq,
            step,
            sample_count,
            n_bits,
        })
    }

    pub fn time_at(&self, index: usize) -> f64 {
        index as f64 * self.step
    }

    /// Index of the bit active at time `t`.
    pub fn bit_index(&self, t: f64) -> usize {
        let raw = (t / self.bit_time + 1e-9).floor();
        (raw.max(0.0) as usize).min(self.n_bits - 1)
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.sample_count).map(|i| self.time_at(i)).collect()
    }
}

/// Which window a synthesized signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalRole {
    Reference,
    Research,
}

impl SignalRole {
    pub fn bits_count(self, params: &Params) -> usize {
        match self {
            SignalRole::Reference => params.bits_count,
            SignalRole::Research => params.research_bits_count(),
        }
    }

    pub fn snr_db(self, params: &Params) -> f64 {
        match self {
            SignalRole::Reference => params.reference_snr_db,
            SignalRole::Research => params.snr_db,
        }
    }
}

/// Keying scheme of the synthesized carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modulation {
    Amplitude,
    Frequency,
    Phase,
}

impl Modulation {
    pub const ALL: [Modulation; 3] = [
        Modulation::Amplitude,
        Modulation::Frequency,
        Modulation::Phase,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Modulation::Amplitude => "am",
            Modulation::Frequency => "fm",
            Modulation::Phase => "pm",
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for Modulation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "am" | "ask" | "amplitude" => Ok(Modulation::Amplitude),
            "fm" | "fsk" | "frequency" => Ok(Modulation::Frequency),
            "pm" | "psk" | "qpsk" | "phase" => Ok(Modulation::Phase),
            other => Err(EngineError::invalid(format!(
                "unknown modulation kind '{other}'"
            ))),
        }
    }
}
