use delay_doppler::monte_carlo::trial_rng;
use delay_doppler::{
    add_noise, compute_surface, correlate, embed, find_peak_delay, generate_bits, map_to_iq,
    simulate, synthesize, synthesize_spliced_research, BitSequence, ComplexPart, EngineError,
    Modulation, Params, SignalRole, Waveform,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[test]
fn phase_keyed_scenario_estimates_five_ms() {
    let params = Params {
        sampling_rate: 10_000.0,
        carrier_freq: 1_000.0,
        bits_count: 16,
        bits_per_second: 100.0,
        time_delay_ms: 5.0,
        snr_db: 20.0,
        ..Params::default()
    };

    for seed in 0..5 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let run = simulate(&params, Modulation::Phase, &mut rng).unwrap();
        assert!(
            (4.5..=5.5).contains(&run.estimated_delay_ms),
            "seed {seed}: {} ms",
            run.estimated_delay_ms
        );
    }
}

#[test]
fn iq_mapping_scenario() {
    let iq = map_to_iq(&BitSequence::from_values(vec![0, 1, 1, 0]).unwrap());
    assert_eq!(iq.i, vec![0, 0, 1, 1]);
    assert_eq!(iq.q, vec![1, 1, 0, 0]);
}

#[test]
fn correlator_and_surface_agree_on_delay() {
    let params = Params {
        snr_db: 20.0,
        doppler_hz: 0.0,
        time_delay_ms: 42.0,
        ..Params::default()
    };
    let mut rng = trial_rng(11, 0, 0);
    let ref_bits = generate_bits(params.bits_count, &mut rng);
    let res_bits = generate_bits(params.research_bits_count(), &mut rng);
    let reference = synthesize(SignalRole::Reference, Modulation::Phase, &params, &ref_bits).unwrap();
    let research = synthesize_spliced_research(&params, &res_bits, &ref_bits).unwrap();
    let research = add_noise(&research, params.snr_db, &mut rng).unwrap();

    let from_correlation = find_peak_delay(&correlate(&reference, &research).unwrap());
    let surface = compute_surface(&reference, &research, None).unwrap();
    assert!((from_correlation - 42.0).abs() <= 0.1 + 1e-9);
    assert!((surface.estimated_delay_ms() - 42.0).abs() <= 0.1 + 1e-9);
    assert_eq!(surface.estimated_doppler_hz(), 0.0);
}

#[test]
fn split_and_recombine_keeps_noisy_waveform() {
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let run = simulate(&Params::default(), Modulation::Frequency, &mut rng).unwrap();
    let w = &run.noisy_reference;
    let back = Waveform::from_parts(
        w.times().to_vec(),
        &w.part(ComplexPart::Real),
        &w.part(ComplexPart::Imag),
    )
    .unwrap();
    assert_eq!(&back, w);
}

#[test]
fn embedding_past_the_window_is_rejected() {
    let params = Params::default();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let ref_bits = generate_bits(params.bits_count, &mut rng);
    let res_bits = generate_bits(params.research_bits_count(), &mut rng);
    let reference = synthesize(SignalRole::Reference, Modulation::Amplitude, &params, &ref_bits).unwrap();
    let host = synthesize(SignalRole::Research, Modulation::Amplitude, &params, &res_bits).unwrap();
    assert!(matches!(
        embed(&host, &reference, 400.0),
        Err(EngineError::InvalidArgument(_))
    ));
}
