//! Hamming window + real-to-complex FFT + 33-band Bark-like aggregation.
//!
//! Grounded on Sivana's `spectrogram.rs` (Hann window + `rustfft`), adapted
//! to the Hamming coefficients and fixed 33-bin table from `sndprint.go`.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::framer::WINDOW_SIZE;

pub const NUM_BANDS: usize = 33;

/// Per-band summed FFT magnitude for one frame.
pub type BandEnergies = [f32; NUM_BANDS];

/// Inclusive `[lo, hi]` FFT bin ranges, 0-indexed against a 4096-point DFT.
/// Targets ~300-3000 Hz on an 11025 Hz stream with logarithmic (Bark-like)
/// spacing. Part of the on-wire contract: changing this invalidates all
/// stored fingerprints.
pub const FFT_BINS: [(usize, usize); NUM_BANDS] = [
    (112, 119),
    (120, 128),
    (129, 137),
    (138, 147),
    (148, 158),
    (159, 169),
    (170, 181),
    (182, 195),
    (196, 209),
    (210, 224),
    (225, 240),
    (241, 257),
    (258, 276),
    (277, 296),
    (297, 317),
    (318, 340),
    (341, 365),
    (366, 391),
    (392, 419),
    (420, 450),
    (451, 482),
    (483, 517),
    (518, 555),
    (556, 595),
    (596, 637),
    (638, 683),
    (684, 733),
    (734, 786),
    (787, 843),
    (844, 904),
    (905, 969),
    (970, 1039),
    (1040, 1115),
];

fn hamming_window(size: usize) -> Vec<f32> {
    let m = size as f32;
    (0..size)
        .map(|n| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * n as f32 / (m - 1.0)).cos())
        .collect()
}

/// Computes band energies for each incoming sample frame. Holds the FFT plan
/// and scratch buffers for the lifetime of one extraction run.
pub struct Spectrum {
    fft: Arc<dyn Fft<f32>>,
    hamming: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl Spectrum {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(WINDOW_SIZE);
        Spectrum {
            fft,
            hamming: hamming_window(WINDOW_SIZE),
            scratch: vec![Complex::new(0.0, 0.0); WINDOW_SIZE],
        }
    }

    /// Applies the Hamming window, runs the FFT, and aggregates magnitudes
    /// into the 33-band table. `frame` must have length `WINDOW_SIZE`.
    pub fn process(&mut self, frame: &[i16]) -> BandEnergies {
        debug_assert_eq!(frame.len(), WINDOW_SIZE);
        for (i, sample) in frame.iter().enumerate() {
            self.scratch[i] = Complex::new(*sample as f32 * self.hamming[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let mut energies = [0f32; NUM_BANDS];
        for (band, &(lo, hi)) in FFT_BINS.iter().enumerate() {
            let mut sum = 0.0;
            for bin in lo..=hi {
                sum += self.scratch[bin].norm();
            }
            energies[band] = sum;
        }
        energies
    }
}

impl Default for Spectrum {
    fn default() -> Self {
        Self::new()
    }
}
