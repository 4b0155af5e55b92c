//! Configuration for the lzss-sim application.
//!
//! Handles parsing command-line arguments and generating sensible defaults
//! (including a randomized sample stimulus that is reproducible with a seed).
//!
//! The tool works with zero arguments: it generates a sample stream, runs it
//! through both codec forms in batch mode and reports conformance.

use lzss_sim_core::{PipelineConfig, WindowConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How stimuli are driven through the codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Sequential calls on the main thread
    Batch,
    /// Concurrent stages joined by bounded queues
    Pipeline,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(Mode::Batch),
            "pipeline" => Ok(Mode::Pipeline),
            other => Err(format!("invalid mode '{other}' (expected batch or pipeline)")),
        }
    }
}

/// Complete configuration for a conformance run.
#[derive(Debug, Clone)]
pub struct Config {
    // === Files ===
    /// Stimulus files (empty = generate sample)
    pub inputs: Vec<PathBuf>,

    /// Directory for packed code streams (`<name>.bin`)
    pub code_out_dir: PathBuf,

    /// Directory for decoded symbol streams
    pub data_out_dir: PathBuf,

    // === Codec ===
    pub window: WindowConfig,

    // === Execution ===
    pub mode: Mode,

    /// Queue capacity, watchdog and pacing for pipeline mode
    pub pipeline: PipelineConfig,

    // === Sample generation ===
    pub seed: u64,

    /// Length of the generated sample when no inputs are given
    pub sample_symbols: usize,

    // === Behavior ===
    /// Whether to print detailed config
    pub print_config: bool,

    /// Whether to print detailed metrics summary
    pub print_metrics: bool,

    /// Where to write the `key=value` metrics export, if anywhere
    pub metrics_out: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from command-line arguments.
    ///
    /// Without `--seed` a time-based seed is used; it is printed with
    /// `--print-config` so any run can be repeated.
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let mut inputs = Vec::new();
        let mut code_out_dir: Option<PathBuf> = None;
        let mut data_out_dir: Option<PathBuf> = None;
        let mut mode = Mode::Batch;
        let mut reference_size: usize = 32;
        let mut coding_size: usize = 9;
        let mut data_width: u32 = 8;
        let mut channel_capacity: Option<usize> = None;
        let mut timeout_ms: Option<u64> = None;
        let mut max_divergences: Option<u64> = None;
        let mut cycle_us: Option<u64> = None;
        let mut seed: Option<u64> = None;
        let mut sample_symbols: Option<usize> = None;
        let mut print_config = false;
        let mut print_metrics = true;
        let mut metrics_out: Option<PathBuf> = None;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--in" => inputs.push(PathBuf::from(next_value(args, &mut i, flag)?)),
                "--code-out-dir" => {
                    code_out_dir = Some(PathBuf::from(next_value(args, &mut i, flag)?))
                }
                "--data-out-dir" => {
                    data_out_dir = Some(PathBuf::from(next_value(args, &mut i, flag)?))
                }
                "--mode" => mode = parse_next(args, &mut i, flag)?,
                "--reference-size" => reference_size = parse_next(args, &mut i, flag)?,
                "--coding-size" => coding_size = parse_next(args, &mut i, flag)?,
                "--data-width" => data_width = parse_next(args, &mut i, flag)?,
                "--channel-capacity" => channel_capacity = Some(parse_next(args, &mut i, flag)?),
                "--timeout-ms" => timeout_ms = Some(parse_next(args, &mut i, flag)?),
                "--max-divergences" => max_divergences = Some(parse_next(args, &mut i, flag)?),
                "--cycle-us" => cycle_us = Some(parse_next(args, &mut i, flag)?),
                "--seed" => seed = Some(parse_next(args, &mut i, flag)?),
                "--sample-symbols" => sample_symbols = Some(parse_next(args, &mut i, flag)?),
                "--print-config" => print_config = true,
                "--no-metrics" => print_metrics = false,
                "--metrics-out" => metrics_out = Some(PathBuf::from(next_value(args, &mut i, flag)?)),
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => return Err(format!("unknown argument: {flag}")),
            }
            i += 1;
        }

        let window = WindowConfig::new(reference_size, coding_size, data_width)
            .map_err(|e| e.to_string())?;

        // Determine seed (explicit or time-based)
        let seed = seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let pipeline = PipelineConfig {
            window,
            channel_capacity: channel_capacity.unwrap_or(16),
            stall_timeout: Duration::from_millis(timeout_ms.unwrap_or(2000)),
            max_divergences: max_divergences.unwrap_or(100),
            cycle_time: cycle_us.filter(|&us| us > 0).map(Duration::from_micros),
        };
        pipeline.validate().map_err(|e| e.to_string())?;

        Ok(Config {
            inputs,
            code_out_dir: code_out_dir.unwrap_or_else(|| PathBuf::from("./out/codes")),
            data_out_dir: data_out_dir.unwrap_or_else(|| PathBuf::from("./out/data")),
            window,
            mode,
            pipeline,
            seed,
            sample_symbols: sample_symbols.unwrap_or_else(|| rng.gen_range(4096..=65536)),
            print_config,
            print_metrics,
            metrics_out,
        })
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        println!("=== Configuration ===");
        if self.inputs.is_empty() {
            println!("Inputs: (generate {} sample symbols)", self.sample_symbols);
        } else {
            for input in &self.inputs {
                println!("Input: {}", input.display());
            }
        }
        println!("Code output dir: {}", self.code_out_dir.display());
        println!("Data output dir: {}", self.data_out_dir.display());
        println!("Seed: {}", self.seed);
        println!();
        println!("=== Window ===");
        println!("Reference size (R): {}", self.window.reference_size());
        println!("Coding size (C): {}", self.window.coding_size());
        println!("Data width: {} bits", self.window.data_width());
        println!("Code width: {} bits", self.window.code_width());
        println!();
        println!("=== Execution ===");
        println!("Mode: {:?}", self.mode);
        println!("Channel capacity: {}", self.pipeline.channel_capacity);
        println!("Watchdog timeout: {} ms", self.pipeline.stall_timeout.as_millis());
        println!("Max divergences: {}", self.pipeline.max_divergences);
        match self.pipeline.cycle_time {
            Some(cycle) => println!("Cycle time: {} us", cycle.as_micros()),
            None => println!("Cycle time: unpaced"),
        }
        println!();
    }
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_next<T: FromStr>(args: &[String], i: &mut usize, flag: &str) -> Result<T, String> {
    let raw = next_value(args, i, flag)?;
    raw.parse()
        .map_err(|_| format!("invalid value for {flag}: {raw}"))
}

fn print_help() {
    println!("lzss-sim: LZSS reference vs streaming codec conformance");
    println!();
    println!("USAGE:");
    println!("    lzss-sim [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --in <PATH>               Stimulus file, repeatable (default: generate sample)");
    println!("    --code-out-dir <DIR>      Packed code output (default: ./out/codes)");
    println!("    --data-out-dir <DIR>      Decoded output (default: ./out/data)");
    println!("    --mode <batch|pipeline>   Execution mode (default: batch)");
    println!();
    println!("    --reference-size <N>      History length R (default: 32)");
    println!("    --coding-size <N>         Lookahead length C (default: 9)");
    println!("    --data-width <BITS>       Symbol width (default: 8)");
    println!();
    println!("    --channel-capacity <N>    Pipeline queue capacity (default: 16)");
    println!("    --timeout-ms <MS>         Watchdog stall timeout (default: 2000)");
    println!("    --max-divergences <N>     Mismatches tolerated (default: 100)");
    println!("    --cycle-us <US>           Pace the pipeline per symbol (default: unpaced)");
    println!();
    println!("    --seed <N>                Seed for the generated sample");
    println!("    --sample-symbols <N>      Generated sample length (default: random 4096-65536)");
    println!("    --print-config            Print resolved configuration");
    println!("    --no-metrics              Don't print metrics summary");
    println!("    --metrics-out <PATH>      Write metrics as key=value lines");
    println!("    --help, -h                Print this help");
    println!();
    println!("EXAMPLES:");
    println!("    lzss-sim --seed 42                             # Deterministic sample run");
    println!("    lzss-sim --in a.txt --in b.bin --mode pipeline # Stimulus list, concurrent");
    println!("    lzss-sim --reference-size 4 --coding-size 3 --data-width 2");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(&args(&["--seed", "1"])).unwrap();
        assert!(config.inputs.is_empty());
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.mode, Mode::Batch);
        assert_eq!(config.pipeline.channel_capacity, 16);
        assert!(config.pipeline.cycle_time.is_none());
        assert!((4096..=65536).contains(&config.sample_symbols));
        assert!(config.metrics_out.is_none());
    }

    #[test]
    fn test_seed_reproducible() {
        let a = Config::from_args(&args(&["--seed", "9"])).unwrap();
        let b = Config::from_args(&args(&["--seed", "9"])).unwrap();
        assert_eq!(a.sample_symbols, b.sample_symbols);
    }

    #[test]
    fn test_repeatable_inputs_and_window() {
        let config = Config::from_args(&args(&[
            "--in", "a.bin", "--in", "b.bin", "--mode", "pipeline",
            "--reference-size", "4", "--coding-size", "3", "--data-width", "2",
            "--cycle-us", "10",
        ]))
        .unwrap();
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.mode, Mode::Pipeline);
        assert_eq!(config.window.code_width(), 4);
        assert_eq!(config.pipeline.window, config.window);
        assert_eq!(config.pipeline.cycle_time, Some(Duration::from_micros(10)));
    }

    #[test]
    fn test_metrics_out() {
        let config = Config::from_args(&args(&["--seed", "3", "--metrics-out", "run.txt"])).unwrap();
        assert_eq!(config.metrics_out, Some(PathBuf::from("run.txt")));
        assert!(Config::from_args(&args(&["--metrics-out"])).is_err());
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(Config::from_args(&args(&["--bogus"])).is_err());
        assert!(Config::from_args(&args(&["--in"])).is_err());
        assert!(Config::from_args(&args(&["--mode", "turbo"])).is_err());
        assert!(Config::from_args(&args(&["--channel-capacity", "0"])).is_err());
        // 5 + 2 + 1 = 8 bit codes cannot carry 8 bit literals
        assert!(Config::from_args(&args(&["--coding-size", "5"])).is_err());
    }
}
