//! lzss-sim: drive a stimulus list through the reference and streaming LZSS
//! codecs and report whether they agree.
//!
//! Each stimulus produces `<code-out-dir>/<name>.bin` (codes packed at the
//! code width) and `<data-out-dir>/<name>` (decoded symbols packed at the data
//! width). The process exits non-zero if any stimulus fails to load, write,
//! round-trip or conform.

mod config;
mod input_gen;

use anyhow::{anyhow, Context};
use config::{Config, Mode};
use lzss_sim_core::{
    bitio::{pack, unpack},
    metrics::Metrics,
    run_batch, Error, Pipeline, PipelineReport,
};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// One named input stream.
struct Stimulus {
    name: String,
    symbols: Vec<u32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every stimulus loaded, round-tripped and conformed.
fn run(args: &[String]) -> anyhow::Result<bool> {
    let config = Config::from_args(args)
        .map_err(|e| anyhow!(e))
        .context("invalid arguments")?;
    if config.print_config {
        config.print();
    }
    info!(window = %config.window, mode = ?config.mode, "starting");

    let mut metrics = Metrics::new();
    let stimuli = load_stimuli(&config, &mut metrics);
    let streams: Vec<Vec<u32>> = stimuli.iter().map(|s| s.symbols.clone()).collect();

    let report: PipelineReport = match config.mode {
        Mode::Batch => run_batch(config.window, config.pipeline.max_divergences, &streams)
            .context("batch run failed")?,
        Mode::Pipeline => Pipeline::new(config.pipeline)?
            .run(&streams)
            .context("pipeline run failed")?,
    };

    for ((stimulus, codes), decoded) in stimuli.iter().zip(&report.codes).zip(&report.decoded) {
        if stimulus.symbols.is_empty() {
            warn!(stimulus = %stimulus.name, "empty stimulus, nothing written");
            continue;
        }
        if let Err(e) = write_outputs(&config, &stimulus.name, codes, decoded) {
            error!(stimulus = %stimulus.name, error = %e, "could not write outputs");
            metrics.record_failure();
            continue;
        }

        metrics.record_stream(&config.window, &stimulus.symbols, codes, decoded);
        if *decoded != stimulus.symbols {
            error!(
                stimulus = %stimulus.name,
                expected = stimulus.symbols.len(),
                got = decoded.len(),
                "decoded output differs from input"
            );
        }
    }
    metrics.record_comparison(&report.comparison);
    metrics.complete();

    if config.print_metrics {
        metrics.print_summary();
    }
    metrics.print_result();
    if let Some(path) = &config.metrics_out {
        write_metrics(path, &metrics).context("could not export metrics")?;
        info!(path = %path.display(), "metrics exported");
    }
    Ok(metrics.passed())
}

/// Read every `--in` file, or generate one sample when none are given.
///
/// An unreadable file only fails that stimulus.
fn load_stimuli(config: &Config, metrics: &mut Metrics) -> Vec<Stimulus> {
    if config.inputs.is_empty() {
        let symbols = input_gen::generate_sample_symbols(
            config.seed,
            config.sample_symbols,
            config.window.data_width(),
        );
        info!(symbols = symbols.len(), seed = config.seed, "generated sample stimulus");
        return vec![Stimulus {
            name: "sample".to_string(),
            symbols,
        }];
    }

    let mut stimuli = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        match read_stimulus(path, config.window.data_width()) {
            Ok(symbols) => {
                info!(path = %path.display(), symbols = symbols.len(), "loaded stimulus");
                stimuli.push(Stimulus {
                    name: stimulus_name(path),
                    symbols,
                });
            }
            Err(e) => {
                error!(error = %e, "skipping stimulus");
                metrics.record_failure();
            }
        }
    }
    stimuli
}

fn read_stimulus(path: &Path, data_width: u32) -> lzss_sim_core::Result<Vec<u32>> {
    let bytes = fs::read(path).map_err(|source| Error::IoUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    unpack(&bytes, data_width)
}

fn stimulus_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stimulus".to_string())
}

fn write_outputs(
    config: &Config,
    name: &str,
    codes: &[u32],
    decoded: &[u32],
) -> lzss_sim_core::Result<()> {
    let code_path = config.code_out_dir.join(format!("{name}.bin"));
    write_packed(&code_path, codes, config.window.code_width())?;

    let data_path = config.data_out_dir.join(name);
    write_packed(&data_path, decoded, config.window.data_width())
}

fn write_metrics(path: &Path, metrics: &Metrics) -> lzss_sim_core::Result<()> {
    let unavailable = |source: std::io::Error| Error::IoUnavailable {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(unavailable)?;
    }
    fs::write(path, metrics.export_text()).map_err(unavailable)
}

fn write_packed(path: &Path, values: &[u32], width: u32) -> lzss_sim_core::Result<()> {
    let bytes = pack(values, width)?;
    let unavailable = |source: std::io::Error| Error::IoUnavailable {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(unavailable)?;
    }
    fs::write(path, bytes).map_err(unavailable)
}
