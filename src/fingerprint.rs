//! Computes four parallel 32-bit sub-fingerprint streams from a sequence of
//! band-energy frames via a temporal DCT-II and a second-order differential
//! sign rule.
//!
//! Grounded on `sndprint.go`'s single-channel `energies[bit]-energies[bit+1]`
//! differential, generalized to four DCT coefficient channels per §4.3, and
//! on Sivana's `hashing.rs` for the "one coder struct, one `push`-like call
//! per frame" shape.

use std::collections::VecDeque;
use std::sync::Arc;

use rustdct::{Dct2, DctPlanner};

use crate::spectrum::{BandEnergies, NUM_BANDS};

/// Length of the temporal window compared across two consecutive halves.
pub const L: usize = 16;
/// Number of parallel DCT-coefficient channels.
pub const CHANNELS: usize = 4;

/// A single emitted sub-fingerprint frame: four 32-bit words `(h0, h1, h2, h3)`.
pub type SubFingerprint = [u32; CHANNELS];

/// Streaming temporal-DCT fingerprint coder. Holds a ring buffer of the last
/// `2*L` band-energy frames (per §3 Lifecycles) and a DCT-II plan scoped to
/// one extraction run.
pub struct FingerprintCoder {
    dct: Arc<dyn Dct2<f32>>,
    ring: VecDeque<BandEnergies>,
}

impl FingerprintCoder {
    pub fn new() -> Self {
        let mut planner = DctPlanner::new();
        FingerprintCoder {
            dct: planner.plan_dct2(L),
            ring: VecDeque::with_capacity(2 * L),
        }
    }

    /// Feeds one band-energy frame. Returns the next sub-fingerprint once
    /// more than `2*L` frames have been seen in total; `None` otherwise
    /// (the buffer reaching `2*L` for the first time is the initial fill,
    /// not yet a slide, and emits nothing).
    pub fn push(&mut self, energies: BandEnergies) -> Option<SubFingerprint> {
        let was_full = self.ring.len() == 2 * L;
        if was_full {
            self.ring.pop_front();
        }
        self.ring.push_back(energies);
        if !was_full {
            return None;
        }

        let mut dct_old = [[0f32; L]; NUM_BANDS];
        let mut dct_new = [[0f32; L]; NUM_BANDS];
        for band in 0..NUM_BANDS {
            let mut old_vec: Vec<f32> = (0..L).map(|t| self.ring[t][band]).collect();
            let mut new_vec: Vec<f32> = (0..L).map(|t| self.ring[L + t][band]).collect();
            self.dct.process_dct2(&mut old_vec);
            self.dct.process_dct2(&mut new_vec);
            dct_old[band].copy_from_slice(&old_vec);
            dct_new[band].copy_from_slice(&new_vec);
        }

        let mut out = [0u32; CHANNELS];
        for (k, word) in out.iter_mut().enumerate() {
            let mut h: u32 = 0;
            for b in 0..NUM_BANDS - 1 {
                let ed = (dct_new[b][k] - dct_new[b + 1][k]) - (dct_old[b][k] - dct_old[b + 1][k]);
                if ed > 0.0 {
                    h |= 1 << b;
                }
            }
            *word = h;
        }
        Some(out)
    }
}

impl Default for FingerprintCoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs an entire band-energy sequence through a fresh coder, producing four
/// equal-length hash streams `H[k][0..T-2L)`. Convenience used by the
/// extractor glue and by tests.
pub fn encode_all(frames: &[BandEnergies]) -> [Vec<u32>; CHANNELS] {
    let mut coder = FingerprintCoder::new();
    let mut out: [Vec<u32>; CHANNELS] = Default::default();
    for &frame in frames {
        if let Some(sub) = coder.push(frame) {
            for k in 0..CHANNELS {
                out[k].push(sub[k]);
            }
        }
    }
    out
}
