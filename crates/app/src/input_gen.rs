//! Sample stimulus generation.
//!
//! When no input file is specified, we generate a stream with a mix of
//! compressibility so both literal and match paths are exercised:
//! - runs of one symbol (long overlapping matches)
//! - text-like data over a small alphabet
//! - short repeating patterns
//! - random symbols (mostly literals)
//!
//! Every symbol is masked to the configured data width.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generate `count` symbols of `data_width` bits.
pub fn generate_sample_symbols(seed: u64, count: usize, data_width: u32) -> Vec<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mask = ((1u64 << data_width) - 1) as u32;
    let mut data = Vec::with_capacity(count);

    while data.len() < count {
        let section = (count - data.len()).min(rng.gen_range(16..=512));

        match rng.gen_range(0..10) {
            // 30% runs of one symbol
            0..=2 => {
                let value = rng.gen::<u32>() & mask;
                data.extend(std::iter::repeat(value).take(section));
            }

            // 30% text-like
            3..=5 => {
                let alphabet = b"abcdefghijklmnopqrstuvwxyz .!,\n";
                for _ in 0..section {
                    let idx = rng.gen_range(0..alphabet.len());
                    data.push(u32::from(alphabet[idx]) & mask);
                }
            }

            // 20% repeating patterns
            6..=7 => {
                let pattern = generate_pattern(&mut rng, mask);
                data.extend(pattern.iter().cycle().take(section));
            }

            // 20% random
            _ => {
                for _ in 0..section {
                    data.push(rng.gen::<u32>() & mask);
                }
            }
        }
    }

    data
}

/// Generate a short pattern, longer than most lookaheads.
fn generate_pattern(rng: &mut ChaCha8Rng, mask: u32) -> Vec<u32> {
    let pattern_len = rng.gen_range(2..=24);
    (0..pattern_len).map(|_| rng.gen::<u32>() & mask).collect()
}
