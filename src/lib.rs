//! Delay-Doppler - keyed-signal simulation and delay/Doppler estimation
//!
//! Synthesizes amplitude, frequency and four-phase keyed carriers, hides a
//! copy of a reference signal inside a longer research window at a known
//! delay and Doppler shift, buries both in calibrated noise and recovers the
//! delay with a matched filter or a delay-Doppler ambiguity surface.
//! Monte-Carlo sweeps measure how the estimators hold up as SNR drops or
//! Doppler grows.
//!
//! The engine is synchronous and keeps no state between calls; every random
//! operation takes the caller's RNG.

pub mod ambiguity;
pub mod bits;
pub mod correlate;
pub mod error;
pub mod monte_carlo;
pub mod noise;
pub mod params;
pub mod sim;
pub mod synth;
pub mod waveform;

// Re-export main types
pub use ambiguity::{compute_surface, AmbiguitySurface};
pub use bits::{generate_bits, map_to_iq, BitSequence, IqStreams};
pub use correlate::{correlate, criterion, find_peak_delay, CorrelationResult};
pub use error::{EngineError, Result};
pub use monte_carlo::{
    run_doppler_sweep, run_snr_sweep, CancelToken, CriterionRow, DegeneratePolicy, DetectionRow,
    DopplerSweep, DopplerSweepConfig, SnrSweep, SnrSweepConfig,
};
pub use noise::add_noise;
pub use params::{Modulation, Params, SignalRole};
pub use sim::{simulate, RunSummary, Simulation};
pub use synth::{synthesize, synthesize_spliced_research};
pub use waveform::{apply_doppler, embed, ComplexPart, Waveform};

/// Complex sample type used throughout the crate.
pub use rustfft::num_complex::Complex64;
