//! Streaming audio fingerprint extraction and alignment matching.
//!
//! Three pieces, composed by callers:
//!
//! - [`framer::Framer`] slides a 4096-sample window over raw PCM.
//! - [`spectrum::Spectrum`] turns a sample frame into 33 band energies.
//! - [`fingerprint::FingerprintCoder`] turns a sequence of band-energy
//!   frames into four parallel 32-bit sub-fingerprint streams.
//!
//! Those streams are handed to an [`index::Index`] for storage, and to
//! [`matcher::query`] (or [`matcher::Matcher`]) to find aligned matches
//! inside an index.
//!
//! PCM decoding, resampling, and the storage backend's physical layout are
//! caller concerns; this crate only assumes little-endian signed 16-bit
//! mono PCM at 11025 Hz (see [`framer::SAMPLE_RATE`]).

pub mod ber;
pub mod error;
pub mod fingerprint;
pub mod framer;
pub mod index;
pub mod matcher;
pub mod spectrum;
pub mod store;

use std::io::Read;

use error::FramerError;
use fingerprint::{FingerprintCoder, CHANNELS};
use framer::Framer;
use spectrum::Spectrum;

/// Runs the whole extraction pipeline (`Framer` -> `Spectrum` ->
/// `FingerprintCoder`) over a PCM byte stream, returning four equal-length
/// hash streams `H[k][0..N)`.
pub fn extract<R: Read>(reader: R) -> Result<[Vec<u32>; CHANNELS], FramerError> {
    let mut framer = Framer::new(reader);
    let mut spectrum = Spectrum::new();
    let mut coder = FingerprintCoder::new();
    let mut out: [Vec<u32>; CHANNELS] = Default::default();

    while let Some(frame) = framer.next_frame()? {
        let energies = spectrum.process(&frame);
        if let Some(sub) = coder.push(energies) {
            for k in 0..CHANNELS {
                out[k].push(sub[k]);
            }
        }
    }
    Ok(out)
}

/// Like [`extract`], but stops once `max_samples` PCM samples have been
/// consumed (used by the `query -t` CLI knob to bound query length; see
/// §5's note on caller-imposed timeouts).
pub fn extract_bounded<R: Read>(
    reader: R,
    max_samples: Option<usize>,
) -> Result<[Vec<u32>; CHANNELS], FramerError> {
    match max_samples {
        None => extract(reader),
        Some(max) => extract(reader.take((max * framer::DEPTH) as u64)),
    }
}
