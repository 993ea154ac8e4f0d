//! End-to-end match scenarios (§8, S1..S6) driven through the real
//! extraction pipeline and the file-backed `Index`, rather than synthetic
//! hash streams.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use sndprint::error::MatchError;
use sndprint::extract;
use sndprint::framer::{DEPTH, SAMPLE_RATE};
use sndprint::index::Index;
use sndprint::matcher::{query, THRESHOLD};
use sndprint::store::FileIndex;

fn sine_pcm(freq: f32, seconds: f32) -> Vec<u8> {
    let n = (SAMPLE_RATE as f32 * seconds) as usize;
    let mut bytes = Vec::with_capacity(n * DEPTH);
    for i in 0..n {
        let t = i as f32 / SAMPLE_RATE as f32;
        let s = (0.5 * (2.0 * std::f32::consts::PI * freq * t).sin() * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// A short melody: concatenated tones, so the fingerprint has more texture
/// than a single steady sine (which self-aligns almost everywhere).
fn melody_pcm(freqs: &[f32], seconds_each: f32) -> Vec<u8> {
    let mut out = Vec::new();
    for &f in freqs {
        out.extend(sine_pcm(f, seconds_each));
    }
    out
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_index() -> FileIndex {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("sndprint-it-{}-{n}", std::process::id()));
    FileIndex::open(dir).unwrap()
}

#[test]
fn s1_identity_query_matches_the_indexed_song() {
    let mut idx = temp_index();
    let pcm = melody_pcm(&[220.0, 330.0, 440.0, 550.0], 1.5);
    let song = extract(&pcm[..]).unwrap();
    idx.add("melody-a", &song).unwrap();

    let results = query(&idx, &song).unwrap();
    assert!(!results.is_empty());
    let best = &results[0];
    assert_eq!(best.song, "melody-a");
    assert!(best.is_match());
    assert!(best.score.iter().all(|&s| s == 0.0));
}

#[test]
fn s2_pure_silence_is_rejected_as_too_short() {
    let idx = temp_index();
    let pcm = vec![0u8; (SAMPLE_RATE as usize) * DEPTH * 2];
    let silence = extract(&pcm[..]).unwrap();

    let err = query(&idx, &silence).unwrap_err();
    assert!(matches!(err, MatchError::QueryTooShort { .. }));
}

#[test]
fn s3_a_short_prefix_below_the_minimum_is_rejected() {
    let idx = temp_index();
    let pcm = sine_pcm(440.0, 0.2);
    let tiny = extract(&pcm[..]).unwrap();
    assert!(tiny[0].len() < sndprint::matcher::MIN_QUERY_FRAMES);

    let err = query(&idx, &tiny).unwrap_err();
    assert!(matches!(err, MatchError::QueryTooShort { .. }));
}

#[test]
fn s4_an_interior_slice_is_aligned_to_its_true_offset() {
    let mut idx = temp_index();
    let pcm = melody_pcm(&[196.0, 262.0, 330.0, 392.0, 494.0], 1.0);
    let song = extract(&pcm[..]).unwrap();
    idx.add("melody-b", &song).unwrap();

    let n = song[0].len();
    let start = n / 3;
    let end = start + 300;
    let slice: [Vec<u32>; 4] = [
        song[0][start..end].to_vec(),
        song[1][start..end].to_vec(),
        song[2][start..end].to_vec(),
        song[3][start..end].to_vec(),
    ];

    let results = query(&idx, &slice).unwrap();
    let best = results.first().expect("expected an interior match");
    assert_eq!(best.song, "melody-b");
    assert_eq!(best.range, (start as i64, end as i64));
}

#[test]
fn s5_single_bit_noise_in_the_query_is_recovered_by_retry() {
    let mut idx = temp_index();
    let pcm = melody_pcm(&[261.0, 329.0, 392.0], 1.2);
    let song = extract(&pcm[..]).unwrap();
    idx.add("melody-c", &song).unwrap();

    let mut q: [Vec<u32>; 4] = [
        song[0][0..300].to_vec(),
        song[1][0..300].to_vec(),
        song[2][0..300].to_vec(),
        song[3][0..300].to_vec(),
    ];
    for k in 0..4 {
        for w in q[k].iter_mut() {
            if *w != 0 {
                *w ^= 1;
            }
        }
    }

    let results = query(&idx, &q).unwrap();
    let best = results.first().expect("bit-flip retry should recover a match");
    assert_eq!(best.song, "melody-c");
    assert!(best.is_match());
}

#[test]
fn scattered_random_bit_noise_across_the_query_is_recovered_by_retry() {
    let mut idx = temp_index();
    let pcm = melody_pcm(&[293.0, 349.0, 415.0], 1.3);
    let song = extract(&pcm[..]).unwrap();
    idx.add("melody-e", &song).unwrap();

    let mut q: [Vec<u32>; 4] = [
        song[0][0..300].to_vec(),
        song[1][0..300].to_vec(),
        song[2][0..300].to_vec(),
        song[3][0..300].to_vec(),
    ];

    let mut rng = rand::thread_rng();
    let bit = rng.gen_range(0..32u32);
    for k in 0..4 {
        for w in q[k].iter_mut() {
            if *w != 0 {
                *w ^= 1 << bit;
            }
        }
    }

    let results = query(&idx, &q).unwrap();
    let best = results
        .first()
        .expect("bit-flip retry should recover a match regardless of which bit was flipped");
    assert_eq!(best.song, "melody-e");
    assert!(best.is_match());
}

#[test]
fn s6_a_query_from_an_unrelated_recording_does_not_match() {
    let mut idx = temp_index();
    let indexed = melody_pcm(&[440.0, 550.0, 660.0], 1.0);
    idx.add("melody-d", &extract(&indexed[..]).unwrap()).unwrap();

    let unrelated = melody_pcm(&[150.0, 777.0, 303.0, 909.0], 0.9);
    let q = extract(&unrelated[..]).unwrap();

    let results = query(&idx, &q).unwrap();
    assert!(results
        .iter()
        .all(|r| r.score.iter().cloned().fold(f64::INFINITY, f64::min) > THRESHOLD));
}
