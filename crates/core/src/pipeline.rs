//! Conformance runs: batch and pipelined.
//!
//! Both modes push every stream through the reference and streaming encoders,
//! compare the codes, then decode each form's codes with the *other* form's
//! decoder and compare the symbols. Cross-feeding means a code both encoders
//! agree on but only one decoder understands still shows up as a divergence.
//!
//! # Pipelined Stages
//!
//! ```text
//!           +--> reference encoder --+                +--> reference decoder --+
//!  source --+                        +--> code cmp ---+   (streaming codes)    +--> symbol cmp --> sink
//!           +--> streaming encoder --+                +--> streaming decoder --+
//!                                                         (reference codes)
//! ```
//!
//! Every arrow is a bounded crossbeam channel. Stages block on full and empty
//! queues and never drop or reorder packets. End of stream travels as the
//! marker on the final packet. A watchdog aborts the run with
//! [`Error::Timeout`] if no stage moves a packet within `stall_timeout`.

use crate::codec::{Decoder, Encoder};
use crate::compare::{Channel, Comparator, ComparisonReport, Verdict};
use crate::error::{Error, Result};
use crate::reference::{ReferenceDecoder, ReferenceEncoder};
use crate::streaming::{StreamingDecoder, StreamingEncoder};
use crate::window::{Packet, WindowConfig};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pipelined run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    /// Capacity of every inter-stage queue (minimum 1)
    pub channel_capacity: usize,
    /// Longest time without any stage making progress
    pub stall_timeout: Duration,
    /// Mismatches tolerated per comparator stage
    pub max_divergences: u64,
    /// Fixed per-symbol pacing for the source and streaming decoder
    pub cycle_time: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            channel_capacity: 16,
            stall_timeout: Duration::from_secs(2),
            max_divergences: 100,
            cycle_time: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "channel capacity must be at least 1".into(),
            ));
        }
        if self.stall_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "stall timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

/// Outcome of a conformance run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub comparison: ComparisonReport,
    /// Reference encoder output per input stream
    pub codes: Vec<Vec<u32>>,
    /// Reference decoder output per input stream
    pub decoded: Vec<Vec<u32>>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.comparison.is_clean()
    }
}

/// Run every stream through both forms sequentially on the calling thread.
///
/// Empty streams are skipped and report no codes and no symbols.
///
/// # Errors
/// Any encoder or decoder error, or `Error::DivergenceLimit`.
pub fn run_batch(
    window: WindowConfig,
    max_divergences: u64,
    streams: &[Vec<u32>],
) -> Result<PipelineReport> {
    let started = Instant::now();
    let mut comparator = Comparator::new(max_divergences);
    let mut reference_encoder = ReferenceEncoder::new(window);
    let mut streaming_encoder = StreamingEncoder::new(window);
    let mut reference_decoder = ReferenceDecoder::new(window);
    let mut streaming_decoder = StreamingDecoder::new(window);

    let mut report = PipelineReport::default();
    for (index, stream) in streams.iter().enumerate() {
        if stream.is_empty() {
            warn!(stream = index, "skipping empty stream");
            report.codes.push(Vec::new());
            report.decoded.push(Vec::new());
            continue;
        }

        let reference_codes = Packet::stream(&reference_encoder.encode(stream)?);
        let streaming_codes = Packet::stream(&streaming_encoder.encode(stream)?);
        compare_all(&mut comparator, Channel::Code, &reference_codes, &streaming_codes)?;

        let reference_symbols = Packet::stream(&reference_decoder.decode_stream(&streaming_codes)?);
        let streaming_symbols = Packet::stream(&streaming_decoder.decode_stream(&reference_codes)?);
        compare_all(&mut comparator, Channel::Symbol, &reference_symbols, &streaming_symbols)?;

        debug!(
            stream = index,
            symbols = stream.len(),
            codes = reference_codes.len(),
            "batch stream done"
        );
        report.codes.push(Packet::values(&reference_codes));
        report.decoded.push(Packet::values(&reference_symbols));
    }

    report.comparison = comparator.report();
    report.elapsed = started.elapsed();
    Ok(report)
}

fn compare_all(
    comparator: &mut Comparator,
    channel: Channel,
    reference: &[Packet],
    streaming: &[Packet],
) -> Result<()> {
    for (&r, &s) in reference.iter().zip(streaming) {
        match channel {
            Channel::Code => comparator.compare_code(r, s)?,
            Channel::Symbol => comparator.compare_symbol(r, s)?,
        };
    }
    let paired = reference.len().min(streaming.len());
    for &r in &reference[paired..] {
        comparator.record_unpaired(channel, Some(r), None)?;
    }
    for &s in &streaming[paired..] {
        comparator.record_unpaired(channel, None, Some(s))?;
    }
    Ok(())
}

/// Liveness monitor shared by all stages of one pipelined run.
#[derive(Debug)]
pub struct Watchdog {
    stall_timeout: Duration,
    progress: AtomicU64,
}

impl Watchdog {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            stall_timeout,
            progress: AtomicU64::new(0),
        }
    }

    /// Record forward progress.
    pub fn tick(&self) {
        self.progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Block until `done` or `abort` disconnects.
    ///
    /// # Errors
    /// `Error::Timeout` if the progress counter stays unchanged for
    /// `stall_timeout`.
    pub fn watch(&self, done: &Receiver<()>, abort: &Receiver<()>) -> Result<()> {
        let poll = (self.stall_timeout / 4).max(Duration::from_millis(1));
        let mut seen = self.progress();
        let mut since = Instant::now();

        loop {
            select! {
                recv(done) -> _ => return Ok(()),
                recv(abort) -> _ => return Ok(()),
                default(poll) => {}
            }

            let now = self.progress();
            if now != seen {
                seen = now;
                since = Instant::now();
                continue;
            }

            let stalled = since.elapsed();
            if stalled >= self.stall_timeout {
                let stalled_ms = u64::try_from(stalled.as_millis()).unwrap_or(u64::MAX);
                error!(stalled_ms, progress = now, "pipeline stalled");
                return Err(Error::Timeout { stalled_ms });
            }
        }
    }
}

/// Disconnects once to tell every stage to stop.
struct AbortSignal {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl AbortSignal {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Mutex::new(Some(tx)),
            signal: rx,
        }
    }

    fn trigger(&self) {
        self.trigger.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Per-stage view of the shared abort signal and watchdog.
#[derive(Clone, Copy)]
struct Stage<'a> {
    name: &'static str,
    abort: &'a AbortSignal,
    watchdog: &'a Watchdog,
}

impl Stage<'_> {
    /// `Ok(None)` once the upstream stage has finished.
    fn recv<T>(&self, rx: &Receiver<T>) -> Result<Option<T>> {
        let abort = &self.abort.signal;
        select! {
            recv(rx) -> msg => match msg {
                Ok(value) => {
                    self.watchdog.tick();
                    Ok(Some(value))
                }
                Err(_) => Ok(None),
            },
            recv(abort) -> _ => Err(Error::Aborted),
        }
    }

    fn send<T>(&self, tx: &Sender<T>, value: T) -> Result<()> {
        let abort = &self.abort.signal;
        select! {
            send(tx, value) -> res => match res {
                Ok(()) => {
                    self.watchdog.tick();
                    Ok(())
                }
                Err(_) => Err(Error::Channel(format!(
                    "{}: downstream stage disconnected",
                    self.name
                ))),
            },
            recv(abort) -> _ => Err(Error::Aborted),
        }
    }

    /// Wait one cycle, waking early on abort.
    fn pace(&self, cycle: Option<Duration>) -> Result<()> {
        let Some(cycle) = cycle else {
            return Ok(());
        };
        let abort = &self.abort.signal;
        select! {
            recv(abort) -> _ => Err(Error::Aborted),
            default(cycle) => Ok(()),
        }
    }
}

enum StageOutput {
    Done,
    Codes(Vec<Vec<u32>>, ComparisonReport),
    Symbols(ComparisonReport),
    Decoded(Vec<Vec<u32>>),
}

type StageHandle<'scope> = ScopedJoinHandle<'scope, Result<StageOutput>>;

/// Pipelined conformance run over concurrent stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// # Errors
    /// `Error::InvalidConfiguration` for a zero queue capacity or timeout.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all streams back to back through one set of stages.
    ///
    /// Empty streams are skipped and report no codes and no symbols.
    ///
    /// # Errors
    /// The root cause when any stage fails: a codec error,
    /// `Error::DivergenceLimit`, or `Error::Timeout` from the watchdog.
    pub fn run(&self, streams: &[Vec<u32>]) -> Result<PipelineReport> {
        let started = Instant::now();
        let active: Vec<&[u32]> = streams
            .iter()
            .enumerate()
            .filter_map(|(index, stream)| {
                if stream.is_empty() {
                    warn!(stream = index, "skipping empty stream");
                    None
                } else {
                    Some(stream.as_slice())
                }
            })
            .collect();

        let PipelineConfig {
            window,
            channel_capacity: cap,
            max_divergences,
            cycle_time,
            ..
        } = self.config;
        info!(
            streams = active.len(),
            capacity = cap,
            %window,
            "starting pipeline"
        );

        let abort = AbortSignal::new();
        let watchdog = Watchdog::new(self.config.stall_timeout);
        let (done_tx, done_rx) = bounded::<()>(0);

        let (source_ref_tx, source_ref_rx) = bounded(cap);
        let (source_str_tx, source_str_rx) = bounded(cap);
        let (ref_codes_tx, ref_codes_rx) = bounded(cap);
        let (str_codes_tx, str_codes_rx) = bounded(cap);
        let (to_ref_dec_tx, to_ref_dec_rx) = bounded(cap);
        let (to_str_dec_tx, to_str_dec_rx) = bounded(cap);
        let (ref_syms_tx, ref_syms_rx) = bounded(cap);
        let (str_syms_tx, str_syms_rx) = bounded(cap);
        let (sink_tx, sink_rx) = bounded(cap);

        let stage = |name| Stage {
            name,
            abort: &abort,
            watchdog: &watchdog,
        };

        let results = thread::scope(|scope| {
            let handles = vec![
                spawn(scope, stage("source"), move |st| {
                    source(st, &active, cycle_time, source_ref_tx, source_str_tx)
                }),
                spawn(scope, stage("reference-encoder"), move |st| {
                    encode(st, ReferenceEncoder::new(window), source_ref_rx, ref_codes_tx)
                }),
                spawn(scope, stage("streaming-encoder"), move |st| {
                    encode(st, StreamingEncoder::new(window), source_str_rx, str_codes_tx)
                }),
                spawn(scope, stage("code-comparator"), move |st| {
                    compare_codes(
                        st,
                        Comparator::new(max_divergences),
                        ref_codes_rx,
                        str_codes_rx,
                        to_ref_dec_tx,
                        to_str_dec_tx,
                    )
                }),
                spawn(scope, stage("reference-decoder"), move |st| {
                    decode(st, ReferenceDecoder::new(window), to_ref_dec_rx, ref_syms_tx, None)
                }),
                spawn(scope, stage("streaming-decoder"), move |st| {
                    decode(
                        st,
                        StreamingDecoder::new(window),
                        to_str_dec_rx,
                        str_syms_tx,
                        cycle_time,
                    )
                }),
                spawn(scope, stage("symbol-comparator"), move |st| {
                    compare_symbols(
                        st,
                        Comparator::new(max_divergences),
                        ref_syms_rx,
                        str_syms_rx,
                        sink_tx,
                    )
                }),
                spawn(scope, stage("sink"), move |st| sink(st, sink_rx)),
            ];
            let monitor = spawn(scope, stage("watchdog"), |st| {
                st.watchdog
                    .watch(&done_rx, &st.abort.signal)
                    .map(|()| StageOutput::Done)
            });

            if handles.iter().any(Result::is_err) || monitor.is_err() {
                abort.trigger();
            }

            let mut results: Vec<Result<StageOutput>> =
                handles.into_iter().map(|h| h.and_then(join)).collect();
            drop(done_tx);
            results.push(monitor.and_then(join));
            results
        });

        let mut report = PipelineReport::default();
        let mut per_stream_codes = Vec::new();
        let mut per_stream_decoded = Vec::new();
        let mut failure: Option<Error> = None;
        for result in results {
            match result {
                Ok(StageOutput::Done) => {}
                Ok(StageOutput::Codes(codes, comparison)) => {
                    per_stream_codes = codes;
                    report.comparison.merge(&comparison);
                }
                Ok(StageOutput::Symbols(comparison)) => report.comparison.merge(&comparison),
                Ok(StageOutput::Decoded(decoded)) => per_stream_decoded = decoded,
                Err(e) => {
                    failure = Some(match failure {
                        Some(prev) if severity(&prev) <= severity(&e) => prev,
                        _ => e,
                    })
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        report.codes = spread(streams, per_stream_codes);
        report.decoded = spread(streams, per_stream_decoded);
        report.elapsed = started.elapsed();
        info!(
            streams = report.comparison.streams_completed(),
            divergences = report.comparison.divergences(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        Ok(report)
    }
}

/// Errors ranked for reporting: a real fault beats the disconnects and
/// aborts it caused downstream.
fn severity(err: &Error) -> u8 {
    match err {
        Error::Aborted => 2,
        Error::Channel(_) => 1,
        _ => 0,
    }
}

/// Re-expand per-active-stream results so empty inputs get empty entries.
fn spread(streams: &[Vec<u32>], results: Vec<Vec<u32>>) -> Vec<Vec<u32>> {
    let mut results = results.into_iter();
    streams
        .iter()
        .map(|s| {
            if s.is_empty() {
                Vec::new()
            } else {
                results.next().unwrap_or_default()
            }
        })
        .collect()
}

fn spawn<'scope, 'env, F>(
    scope: &'scope Scope<'scope, 'env>,
    stage: Stage<'env>,
    job: F,
) -> Result<StageHandle<'scope>>
where
    F: FnOnce(Stage<'env>) -> Result<StageOutput> + Send + 'scope,
{
    thread::Builder::new()
        .name(format!("lzss-{}", stage.name))
        .spawn_scoped(scope, move || {
            debug!(stage = stage.name, "stage started");
            let result = job(stage);
            match &result {
                Ok(_) => debug!(stage = stage.name, "stage finished"),
                Err(Error::Aborted) => debug!(stage = stage.name, "stage aborted"),
                Err(e) => {
                    error!(stage = stage.name, error = %e, "stage failed");
                    stage.abort.trigger();
                }
            }
            result
        })
        .map_err(|source| Error::Spawn {
            stage: stage.name,
            source,
        })
}

fn join(handle: StageHandle<'_>) -> Result<StageOutput> {
    let name = handle.thread().name().unwrap_or("stage").to_string();
    handle
        .join()
        .unwrap_or_else(|_| Err(Error::Channel(format!("{name} panicked"))))
}

fn source(
    st: Stage<'_>,
    streams: &[&[u32]],
    cycle_time: Option<Duration>,
    to_reference: Sender<Packet>,
    to_streaming: Sender<Packet>,
) -> Result<StageOutput> {
    for stream in streams {
        for packet in Packet::stream(stream) {
            st.pace(cycle_time)?;
            st.send(&to_reference, packet)?;
            st.send(&to_streaming, packet)?;
        }
    }
    Ok(StageOutput::Done)
}

fn encode<E: Encoder>(
    st: Stage<'_>,
    mut encoder: E,
    input: Receiver<Packet>,
    output: Sender<Packet>,
) -> Result<StageOutput> {
    let mut codes = Vec::new();
    while let Some(packet) = st.recv(&input)? {
        encoder.accept(packet, &mut codes)?;
        for code in codes.drain(..) {
            st.send(&output, code)?;
        }
    }
    Ok(StageOutput::Done)
}

fn decode<D: Decoder>(
    st: Stage<'_>,
    mut decoder: D,
    input: Receiver<Packet>,
    output: Sender<Packet>,
    cycle_time: Option<Duration>,
) -> Result<StageOutput> {
    let mut symbols = Vec::new();
    while let Some(code) = st.recv(&input)? {
        decoder.decode_code(code, &mut symbols)?;
        for symbol in symbols.drain(..) {
            st.pace(cycle_time)?;
            st.send(&output, symbol)?;
        }
    }
    Ok(StageOutput::Done)
}

/// Compare codes pairwise, then cross-feed: streaming codes go to the
/// reference decoder and reference codes to the streaming decoder.
fn compare_codes(
    st: Stage<'_>,
    mut comparator: Comparator,
    reference_rx: Receiver<Packet>,
    streaming_rx: Receiver<Packet>,
    to_reference_decoder: Sender<Packet>,
    to_streaming_decoder: Sender<Packet>,
) -> Result<StageOutput> {
    let mut streams = Vec::new();
    let mut current = Vec::new();

    loop {
        let reference = st.recv(&reference_rx)?;
        let streaming = st.recv(&streaming_rx)?;
        match (reference, streaming) {
            (None, None) => break,
            (Some(r), Some(s)) => {
                comparator.compare_code(r, s)?;
            }
            (r, s) => comparator.record_unpaired(Channel::Code, r, s)?,
        }

        if let Some(s) = streaming {
            st.send(&to_reference_decoder, s)?;
        }
        if let Some(r) = reference {
            current.push(r.value);
            if r.last {
                streams.push(std::mem::take(&mut current));
            }
            st.send(&to_streaming_decoder, r)?;
        }
    }

    if !current.is_empty() {
        streams.push(current);
    }
    Ok(StageOutput::Codes(streams, comparator.report()))
}

/// Compare decoded symbols pairwise and pass the reference decoder's output
/// on to the sink.
fn compare_symbols(
    st: Stage<'_>,
    mut comparator: Comparator,
    reference_rx: Receiver<Packet>,
    streaming_rx: Receiver<Packet>,
    sink: Sender<Packet>,
) -> Result<StageOutput> {
    loop {
        let reference = st.recv(&reference_rx)?;
        let streaming = st.recv(&streaming_rx)?;
        match (reference, streaming) {
            (None, None) => break,
            (Some(r), Some(s)) => {
                if comparator.compare_symbol(r, s)? == Verdict::StreamComplete {
                    info!(
                        stream = comparator.report().symbol_streams,
                        "stream verified"
                    );
                }
            }
            (r, s) => comparator.record_unpaired(Channel::Symbol, r, s)?,
        }

        if let Some(r) = reference {
            st.send(&sink, r)?;
        }
    }
    Ok(StageOutput::Symbols(comparator.report()))
}

fn sink(st: Stage<'_>, input: Receiver<Packet>) -> Result<StageOutput> {
    let mut streams = Vec::new();
    let mut current = Vec::new();
    while let Some(packet) = st.recv(&input)? {
        current.push(packet.value);
        if packet.last {
            streams.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        streams.push(current);
    }
    Ok(StageOutput::Decoded(streams))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> WindowConfig {
        WindowConfig::new(4, 3, 2).unwrap()
    }

    fn corpus() -> Vec<Vec<u32>> {
        let text: Vec<u32> = b"the rain in spain stays mainly in the plain"
            .iter()
            .map(|&b| b.into())
            .collect();
        vec![
            text,
            vec![7; 40],
            (0..200).map(|i| (i * 37 % 251) as u32).collect(),
            vec![42],
        ]
    }

    #[test]
    fn test_batch_concrete_scenario() {
        let report = run_batch(small(), 0, &[vec![0, 1, 0, 1, 0, 1, 0]]).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.codes, vec![vec![0, 1, 13, 12]]);
        assert_eq!(report.decoded, vec![vec![0, 1, 0, 1, 0, 1, 0]]);
        assert_eq!(report.comparison.streams_completed(), 1);
    }

    #[test]
    fn test_pipeline_matches_batch() {
        let streams = corpus();
        let window = WindowConfig::default();
        let batch = run_batch(window, 0, &streams).unwrap();

        for capacity in [1, 4] {
            let config = PipelineConfig {
                channel_capacity: capacity,
                max_divergences: 0,
                ..PipelineConfig::new(window)
            };
            let report = Pipeline::new(config).unwrap().run(&streams).unwrap();
            assert!(report.is_clean());
            assert_eq!(report.codes, batch.codes);
            assert_eq!(report.decoded, streams);
            assert_eq!(report.comparison.streams_completed(), streams.len() as u64);
        }
    }

    #[test]
    fn test_empty_streams_skipped() {
        let streams = vec![vec![], vec![1, 2, 1, 2], vec![]];
        let report = Pipeline::new(PipelineConfig::new(small()))
            .unwrap()
            .run(&streams)
            .unwrap();
        assert_eq!(report.decoded, streams);
        assert!(report.codes[0].is_empty());
        assert_eq!(report.comparison.streams_completed(), 1);

        let batch = run_batch(small(), 0, &streams).unwrap();
        assert_eq!(batch.codes, report.codes);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PipelineConfig {
            channel_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_watchdog_aborts_stalled_pipeline() {
        let config = PipelineConfig {
            stall_timeout: Duration::from_millis(50),
            cycle_time: Some(Duration::from_secs(30)),
            ..PipelineConfig::new(small())
        };
        let started = Instant::now();
        let err = Pipeline::new(config)
            .unwrap()
            .run(&[vec![1, 2, 3]])
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_watchdog_returns_when_done() {
        let watchdog = Watchdog::new(Duration::from_secs(5));
        let (done_tx, done_rx) = bounded::<()>(0);
        let (_abort_tx, abort_rx) = bounded::<()>(0);
        drop(done_tx);
        assert!(watchdog.watch(&done_rx, &abort_rx).is_ok());
    }

    #[test]
    fn test_watchdog_tracks_progress() {
        let watchdog = Watchdog::new(Duration::from_millis(20));
        watchdog.tick();
        watchdog.tick();
        assert_eq!(watchdog.progress(), 2);

        let (_done_tx, done_rx) = bounded::<()>(0);
        let (_abort_tx, abort_rx) = bounded::<()>(0);
        assert!(matches!(
            watchdog.watch(&done_rx, &abort_rx),
            Err(Error::Timeout { .. })
        ));
    }
}
