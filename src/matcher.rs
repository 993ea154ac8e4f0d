//! Candidate discovery, alignment merging, BER scoring, and the bit-flip
//! retry loop.
//!
//! Grounded directly on `sndprintdb.go`'s `candidates`, `match`, and `Match`
//! functions: the same reverse map (`hash2off`), the same sort-then-merge
//! pass over candidates, the same per-call song-fingerprint cache, and the
//! same "score first, retry with bit-flipped lookup keys if empty" control
//! flow.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::ber::ber;
use crate::error::MatchError;
use crate::index::{Index, Row, SongId};

pub const THRESHOLD: f64 = 0.35;
pub const IDENTICAL_THRESHOLD: f64 = 0.25;
pub const MIN_QUERY_FRAMES: usize = 256;
const BITS_PER_WORD: u32 = 32;

/// A predicted alignment: the query is believed to start somewhere in
/// `[start, start+span]` inside `song`, each covering `end - start` frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub song: SongId,
    pub start: i64,
    pub end: i64,
    pub span: i64,
}

/// One accepted alignment and its per-channel bit error rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub song: SongId,
    pub range: (i64, i64),
    pub score: [f64; 4],
}

impl MatchResult {
    /// `min(score) <= threshold` — the §4.5 acceptance rule.
    pub fn is_match(&self) -> bool {
        self.score.iter().cloned().fold(f64::INFINITY, f64::min) <= THRESHOLD
    }

    /// The stricter "identical" rule some callers apply: mean BER <= 0.25.
    pub fn is_identical(&self) -> bool {
        (self.score.iter().sum::<f64>() / 4.0) <= IDENTICAL_THRESHOLD
    }
}

/// Trims leading and trailing frames where all four hash words are zero.
/// Idempotent: trimming an already-trimmed query is a no-op.
pub fn trim_zero_frames(q: &[Vec<u32>; 4]) -> [Vec<u32>; 4] {
    let n = q[0].len();
    let is_zero = |i: usize| (0..4).all(|k| q[k][i] == 0);

    let mut start = 0;
    while start < n && is_zero(start) {
        start += 1;
    }
    let mut end = n;
    while end > start && is_zero(end - 1) {
        end -= 1;
    }

    [
        q[0][start..end].to_vec(),
        q[1][start..end].to_vec(),
        q[2][start..end].to_vec(),
        q[3][start..end].to_vec(),
    ]
}

/// Builds the 32 single-bit-flipped variants of `q`, flipping bit `a` in
/// every *non-zero* word for attempt `a`. Zero words (carrying no
/// information, per §3) are left untouched. This is the "concatenated
/// queries" retry form §4.5-C adopts over the per-attempt cumulative-XOR
/// variant found in the reference source.
fn flipped_variants(q: &[Vec<u32>; 4]) -> Vec<[Vec<u32>; 4]> {
    (0..BITS_PER_WORD)
        .map(|a| {
            let mask = 1u32 << a;
            let flip = |stream: &[u32]| -> Vec<u32> {
                stream
                    .iter()
                    .map(|&w| if w == 0 { 0 } else { w ^ mask })
                    .collect()
            };
            [flip(&q[0]), flip(&q[1]), flip(&q[2]), flip(&q[3])]
        })
        .collect()
}

type HashPositions = HashMap<u32, [Vec<usize>; 4]>;

/// Builds the reverse map from hash value to query positions, and the
/// deduplicated per-channel lookup arguments, across one or more query
/// variants (a single variant for the first attempt, 32 for the bit-flip
/// retry). `m` is the *original* (unflipped) query length, used to size
/// every candidate regardless of how many variants contributed to it.
fn build_lookup(variants: &[[Vec<u32>; 4]]) -> ([Vec<u32>; 4], HashPositions) {
    let mut wanted: [Vec<u32>; 4] = Default::default();
    let mut seen: [HashSet<u32>; 4] = [
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
    ];
    let mut hash2off: HashPositions = HashMap::new();

    for variant in variants {
        for (k, stream) in variant.iter().enumerate() {
            for (i, &v) in stream.iter().enumerate() {
                if v == 0 {
                    continue;
                }
                if seen[k].insert(v) {
                    wanted[k].push(v);
                }
                hash2off
                    .entry(v)
                    .or_insert_with(|| [Vec::new(), Vec::new(), Vec::new(), Vec::new()])[k]
                    .push(i);
            }
        }
    }

    (wanted, hash2off)
}

fn discover_candidates(
    variants: &[[Vec<u32>; 4]],
    m: i64,
    index: &(impl Index + ?Sized),
) -> Result<Vec<Candidate>, MatchError> {
    let (wanted, hash2off) = build_lookup(variants);
    if wanted.iter().all(|w| w.is_empty()) {
        return Ok(Vec::new());
    }

    let rows: Vec<Row> = index.lookup(&wanted)?;

    let mut candidate_set: BTreeSet<(SongId, i64, i64)> = BTreeSet::new();
    for row in rows {
        for k in 0..4 {
            let v = row.hashes[k];
            if v == 0 {
                continue;
            }
            if let Some(offsets) = hash2off.get(&v) {
                for &i in &offsets[k] {
                    let start = row.off as i64 - i as i64;
                    if start < 0 {
                        continue;
                    }
                    candidate_set.insert((row.song.clone(), start, start + m));
                }
            }
        }
    }

    Ok(merge_candidates(candidate_set.into_iter().collect()))
}

/// Merges adjacent candidates (same song, contiguous ranges) into spans,
/// per §4.5 step 6. Input must be sorted by `(song, start, end)`.
fn merge_candidates(sorted: Vec<(SongId, i64, i64)>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::new();
    for (song, start, end) in sorted {
        if let Some(last) = merged.last_mut() {
            if song == last.song && start == last.start + 1 + last.span && end == last.end + 1 {
                last.end += 1;
                last.span += 1;
                continue;
            }
        }
        merged.push(Candidate {
            song,
            start,
            end,
            span: 0,
        });
    }
    merged
}

/// Scores each candidate against the (unflipped) query, emitting a `Result`
/// for every sliding offset that meets the acceptance threshold.
fn score_candidates(
    q: &[Vec<u32>; 4],
    candidates: &[Candidate],
    index: &(impl Index + ?Sized),
    cache: &mut HashMap<SongId, [Vec<u32>; 4]>,
    checked: &mut HashSet<(SongId, i64, i64, i64)>,
) -> Result<Vec<MatchResult>, MatchError> {
    let m = q[0].len() as i64;
    let mut out = Vec::new();

    for c in candidates {
        let key = (c.song.clone(), c.start, c.end, c.span);
        if !checked.insert(key) {
            continue;
        }

        if !cache.contains_key(&c.song) {
            let fetched = index.fetch(&c.song)?;
            cache.insert(c.song.clone(), fetched);
        }
        let hh = &cache[&c.song];

        if c.end > hh[0].len() as i64 || c.start < 0 {
            continue;
        }
        let window: [&[u32]; 4] = [
            &hh[0][c.start as usize..c.end as usize],
            &hh[1][c.start as usize..c.end as usize],
            &hh[2][c.start as usize..c.end as usize],
            &hh[3][c.start as usize..c.end as usize],
        ];

        for off in 0..=c.span {
            let off = off as usize;
            if (window[0].len() as i64 - off as i64) < m {
                continue;
            }
            let mut score = [0f64; 4];
            for k in 0..4 {
                score[k] = ber(&q[k], &window[k][off..off + m as usize]);
            }
            if score.iter().any(|&s| s <= THRESHOLD) {
                out.push(MatchResult {
                    song: c.song.clone(),
                    range: (c.start + off as i64, c.start + off as i64 + m),
                    score,
                });
            }
        }
    }

    Ok(out)
}

/// Runs the full §4.5 match pipeline: trim, candidate discovery, scoring,
/// and (if empty) the bit-flip retry.
pub fn query(index: &(impl Index + ?Sized), raw_query: &[Vec<u32>; 4]) -> Result<Vec<MatchResult>, MatchError> {
    let trimmed = trim_zero_frames(raw_query);
    let m = trimmed[0].len();
    if m < MIN_QUERY_FRAMES {
        return Err(MatchError::QueryTooShort {
            got: m,
            min: MIN_QUERY_FRAMES,
        });
    }

    let mut cache: HashMap<SongId, [Vec<u32>; 4]> = HashMap::new();
    let mut checked: HashSet<(SongId, i64, i64, i64)> = HashSet::new();

    let candidates = discover_candidates(&[trimmed.clone()], m as i64, index)?;
    let mut results = score_candidates(&trimmed, &candidates, index, &mut cache, &mut checked)?;

    if results.is_empty() {
        debug!("no Phase B match, retrying with bit-flip variants");
        let variants = flipped_variants(&trimmed);
        let candidates = discover_candidates(&variants, m as i64, index)?;
        results = score_candidates(&trimmed, &candidates, index, &mut cache, &mut checked)?;
    }

    results.sort_by(|a, b| {
        let sa: f64 = a.score.iter().sum();
        let sb: f64 = b.score.iter().sum();
        sa.partial_cmp(&sb)
            .unwrap()
            .then_with(|| a.song.cmp(&b.song))
            .then_with(|| a.range.0.cmp(&b.range.0))
    });
    Ok(results)
}

/// Thin handle binding a match run to one `Index`.
pub struct Matcher<'a, I: Index + ?Sized> {
    index: &'a I,
}

impl<'a, I: Index + ?Sized> Matcher<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Matcher { index }
    }

    pub fn query(&self, raw_query: &[Vec<u32>; 4]) -> Result<Vec<MatchResult>, MatchError> {
        query(self.index, raw_query)
    }
}
