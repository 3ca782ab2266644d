//! Detection-probability sweep over SNR
//!
//! Usage: `cargo run --release --example snr_sweep -- [--config sweep.json] [--doppler]`
//!
//! The JSON file holds any subset of `SnrSweepConfig` (or `DopplerSweepConfig`
//! with `--doppler`); missing fields keep their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use delay_doppler::{
    run_doppler_sweep, run_snr_sweep, CancelToken, DopplerSweepConfig, Modulation, SnrSweepConfig,
};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = try_main() {
        eprintln!("sweep failed: {error}");
        std::process::exit(1);
    }
}

struct Args {
    config_path: Option<PathBuf>,
    doppler: bool,
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let cancel = CancelToken::new();

    if args.doppler {
        let config: DopplerSweepConfig = load_config(args.config_path.as_deref())?;
        let sweep = run_doppler_sweep(&config, &cancel)?;
        println!("{:>10}  {:>14}  {:>6}", "doppler_hz", "mean_criterion", "failed");
        for row in &sweep.rows {
            let mean = row
                .mean_criterion
                .map_or_else(|| "-".to_string(), |c| format!("{c:.3}"));
            println!("{:>10.1}  {:>14}  {:>6}", row.doppler_hz, mean, row.failed_trials);
        }
        return Ok(());
    }

    let config: SnrSweepConfig = load_config(args.config_path.as_deref())?;
    let sweep = run_snr_sweep(&config, &cancel)?;
    for modulation in Modulation::ALL {
        let rows: Vec<_> = sweep.rows_for(modulation).collect();
        if rows.is_empty() {
            continue;
        }
        println!("{modulation}:");
        for row in rows {
            println!(
                "  {:>6.1} dB  p = {:.3}  ({}/{} hits, {} failed, +/-{} ms)",
                row.snr_db, row.hit_rate, row.hits, row.trials, row.failed_trials, row.error_bar_ms
            );
        }
    }
    if sweep.cancelled {
        println!("sweep was cancelled before completion");
    }

    Ok(())
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut iter = args.into_iter();
    let mut parsed = Args {
        config_path: None,
        doppler: false,
    };

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--doppler" => parsed.doppler = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(parsed)
}

fn load_config<T>(path: Option<&Path>) -> Result<T, Box<dyn std::error::Error>>
where
    T: DeserializeOwned + Default,
{
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(T::default()),
    }
}
