//! Integration tests for the reference and streaming codecs.
//!
//! These tests drive both forms through the public API and check the
//! conformance contract end to end: identical codes, cross-decodable output,
//! bounded code fields, and identical results from batch and pipelined runs.

use lzss_sim_core::{
    bitio::{pack, unpack},
    run_batch,
    window::ceil_log2,
    Code, Decoder, Encoder, Error, Pipeline, PipelineConfig, ReferenceDecoder, ReferenceEncoder,
    StreamingDecoder, StreamingEncoder, WindowConfig,
};
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Window parameters plus an input stream drawn from the matching alphabet.
fn config_and_input() -> impl Strategy<Value = (WindowConfig, Vec<u32>)> {
    (2usize..=48, 2usize..=12)
        .prop_flat_map(|(r, c)| {
            let code_width = ceil_log2(r) + ceil_log2(c - 1) + 1;
            (Just(r), Just(c), 1u32..code_width.min(9))
        })
        .prop_flat_map(|(r, c, w)| {
            let config = WindowConfig::new(r, c, w).unwrap();
            // narrow alphabets so matches are common
            let alphabet = config.max_symbol().min(5);
            (
                Just(config),
                prop::collection::vec(0..=alphabet, 0..300),
            )
        })
}

/// Runs, repeats and noise, masked to `data_width`.
fn mixed_stream(rng: &mut ChaCha8Rng, config: &WindowConfig, len: usize) -> Vec<u32> {
    let mask = config.max_symbol();
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        match rng.gen_range(0..3) {
            0 => {
                let v = rng.gen::<u32>() & mask;
                let run = rng.gen_range(1..20);
                out.extend(std::iter::repeat(v).take(run));
            }
            1 if out.len() > 4 => {
                let start = rng.gen_range(0..out.len() - 2);
                let take = rng.gen_range(2..=(out.len() - start).min(12));
                let copy: Vec<u32> = out[start..start + take].to_vec();
                out.extend(copy);
            }
            _ => out.push(rng.gen::<u32>() & mask),
        }
    }
    out.truncate(len);
    out
}

proptest! {
    #[test]
    fn reference_round_trip((config, input) in config_and_input()) {
        let codes = ReferenceEncoder::new(config).encode(&input)?;
        let decoded = ReferenceDecoder::new(config).decode(&codes)?;
        prop_assert_eq!(decoded, input);
    }

    #[test]
    fn encoders_bit_exact((config, input) in config_and_input()) {
        let reference = ReferenceEncoder::new(config).encode(&input)?;
        let streaming = StreamingEncoder::new(config).encode(&input)?;
        prop_assert_eq!(reference, streaming);
    }

    #[test]
    fn decoders_cross_compatible((config, input) in config_and_input()) {
        let reference = ReferenceEncoder::new(config).encode(&input)?;
        let streaming = StreamingEncoder::new(config).encode(&input)?;

        prop_assert_eq!(StreamingDecoder::new(config).decode(&reference)?, input.clone());
        prop_assert_eq!(ReferenceDecoder::new(config).decode(&streaming)?, input);
    }

    #[test]
    fn code_fields_in_bounds((config, input) in config_and_input()) {
        let codes = StreamingEncoder::new(config).encode(&input)?;
        for word in codes {
            prop_assert!(word >> config.code_width() == 0);
            match config.parse_word(word) {
                Ok(Code::Match { offset, length }) => {
                    prop_assert!(offset < config.reference_size());
                    prop_assert!((2..=config.coding_size()).contains(&length));
                }
                Ok(Code::Literal(value)) => prop_assert!(value <= config.max_symbol()),
                Err(e) => prop_assert!(false, "unparseable code {word:#x}: {e}"),
            }
        }
    }

    #[test]
    fn packed_round_trip((config, input) in config_and_input()) {
        let bytes = StreamingEncoder::new(config).encode_packed(&input)?;
        let decoded = ReferenceDecoder::new(config).decode_packed(&bytes, input.len())?;
        prop_assert_eq!(decoded, input);
    }

    #[test]
    fn pack_unpack_preserves_values(
        width in 1u32..=32,
        raw in prop::collection::vec(any::<u32>(), 0..64),
    ) {
        let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
        let values: Vec<u32> = raw.iter().map(|v| v & mask).collect();

        let bytes = pack(&values, width)?;
        prop_assert_eq!(bytes.len(), (values.len() * width as usize).div_ceil(8));

        let pad = bytes.len() * 8 - values.len() * width as usize;
        if pad > 0 {
            let last = bytes[bytes.len() - 1];
            prop_assert_eq!(last & ((1u8 << pad) - 1), 0);
        }

        let unpacked = unpack(&bytes, width)?;
        prop_assert_eq!(&unpacked[..values.len()], &values[..]);
    }
}

#[test]
fn test_concrete_scenario_both_forms() {
    let config = WindowConfig::new(4, 3, 2).unwrap();
    let input = [0, 1, 0, 1, 0, 1, 0];

    for codes in [
        ReferenceEncoder::new(config).encode(&input).unwrap(),
        StreamingEncoder::new(config).encode(&input).unwrap(),
    ] {
        assert_eq!(codes, vec![0, 1, 13, 12]);
        assert_eq!(ReferenceDecoder::new(config).decode(&codes).unwrap(), input);
        assert_eq!(StreamingDecoder::new(config).decode(&codes).unwrap(), input);
    }
}

#[test]
fn test_narrow_code_width_rejected() {
    let err = WindowConfig::new(32, 5, 8).unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
}

#[test]
fn test_unique_symbols_emit_only_literals() {
    let config = WindowConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for _ in 0..8 {
        let mut input: Vec<u32> = (0..=config.max_symbol()).collect();
        input.shuffle(&mut rng);
        let len = rng.gen_range(1..=input.len());
        input.truncate(len);

        let codes = StreamingEncoder::new(config).encode(&input).unwrap();
        assert_eq!(codes, input, "distinct symbols must all be literals");
        assert_eq!(codes, ReferenceEncoder::new(config).encode(&input).unwrap());
    }
}

#[test]
fn test_reset_idempotence_across_streams() {
    let config = WindowConfig::new(16, 6, 4).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let streams: Vec<Vec<u32>> = (0..6)
        .map(|i| mixed_stream(&mut rng, &config, 50 + i * 40))
        .collect();

    let mut shared_ref = ReferenceEncoder::new(config);
    let mut shared_str = StreamingEncoder::new(config);
    let mut shared_dec = StreamingDecoder::new(config);
    for stream in &streams {
        let fresh = ReferenceEncoder::new(config).encode(stream).unwrap();
        assert_eq!(shared_ref.encode(stream).unwrap(), fresh);
        assert_eq!(shared_str.encode(stream).unwrap(), fresh);
        assert_eq!(shared_dec.decode(&fresh).unwrap(), *stream);
    }
}

#[test]
fn test_default_window_on_seeded_corpus() {
    let config = WindowConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for len in [1, 2, 9, 10, 33, 41, 500, 4096] {
        let input = mixed_stream(&mut rng, &config, len);
        let reference = ReferenceEncoder::new(config).encode(&input).unwrap();
        let streaming = StreamingEncoder::new(config).encode(&input).unwrap();
        assert_eq!(reference, streaming, "codes diverge for length {len}");
        assert_eq!(
            StreamingDecoder::new(config).decode(&reference).unwrap(),
            input
        );
    }
}

#[test]
fn test_pipeline_agrees_with_batch() {
    let config = WindowConfig::new(32, 9, 8).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(1234);
    let mut streams: Vec<Vec<u32>> = (0..5)
        .map(|_| {
            let len = rng.gen_range(1..600);
            mixed_stream(&mut rng, &config, len)
        })
        .collect();
    streams.insert(2, Vec::new());

    let batch = run_batch(config, 0, &streams).unwrap();
    assert!(batch.is_clean());
    assert_eq!(batch.decoded, streams);

    let pipeline = Pipeline::new(PipelineConfig {
        channel_capacity: 2,
        max_divergences: 0,
        ..PipelineConfig::new(config)
    })
    .unwrap();
    let report = pipeline.run(&streams).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.codes, batch.codes);
    assert_eq!(report.decoded, streams);
    assert_eq!(report.comparison.streams_completed(), 5);
}

#[test]
fn test_truncated_code_stream_reports_partial_output() {
    let config = WindowConfig::default();
    let input: Vec<u32> = b"abcabcabcabcabcabc".iter().map(|&b| b.into()).collect();
    let bytes = ReferenceEncoder::new(config).encode_packed(&input).unwrap();

    let cut = &bytes[..bytes.len() - 2];
    match StreamingDecoder::new(config).decode_packed(cut, input.len()) {
        Err(Error::Format { recovered, .. }) => {
            assert!(!recovered.is_empty());
            assert_eq!(recovered[..], input[..recovered.len()]);
        }
        other => panic!("expected format error, got {other:?}"),
    }
}
