//! `sndprint` — thin CLI wrapper over the extractor and matcher.
//!
//! One binary, four subcommands, mirroring the original `sndprint-fp`,
//! `sndprint-index`, `sndprint-query`, and `sndprint-cmp` programs and their
//! exit codes (§6).

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use sndprint::index::Index;
use sndprint::matcher::Matcher;
use sndprint::store::FileIndex;
use sndprint::{extract, extract_bounded};

#[derive(Parser)]
#[command(name = "sndprint", about = "Audio fingerprint extraction and matching")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write fingerprint frames for a PCM file (or stdin) to stdout.
    Fingerprint { file: Option<PathBuf> },
    /// Index a PCM file under a song id.
    Index {
        #[arg(short = 'u')]
        id: String,
        #[arg(short = 'f')]
        file: PathBuf,
    },
    /// Query a PCM file (or stdin) against the index.
    Query {
        #[arg(short = 't')]
        seconds: Option<u32>,
        file: Option<PathBuf>,
    },
    /// Compare two PCM files and report whether they are perceptually identical.
    Compare {
        #[arg(short = 'v')]
        verbose: bool,
        file1: PathBuf,
        file2: PathBuf,
    },
}

fn open_input(path: &Option<PathBuf>) -> Result<Box<dyn Read>> {
    match path {
        Some(p) => Ok(Box::new(
            File::open(p).with_context(|| format!("could not open file: {}", p.display()))?,
        )),
        None => Ok(Box::new(io::stdin())),
    }
}

fn sndprint_db() -> Result<FileIndex> {
    let path = std::env::var("SNDPRINT_DB").context("SNDPRINT_DB not set")?;
    FileIndex::open(path).context("could not open fingerprint database")
}

fn run_fingerprint(file: Option<PathBuf>) -> Result<ExitCode> {
    // I/O and extraction failures here exit 1, not 2: §6 reserves 2 for
    // usage errors and gives `fingerprint` its own code for I/O failure,
    // mirroring `cmd/sndprint-fp/main.go`'s distinct exit paths.
    let reader = match open_input(&file) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("{err:?}");
            return Ok(ExitCode::from(1));
        }
    };
    let hashes = match extract(reader) {
        Ok(h) => h,
        Err(err) => {
            eprintln!("fingerprint extraction failed: {err}");
            return Ok(ExitCode::from(1));
        }
    };
    for i in 0..hashes[0].len() {
        println!(
            "{:#010x} {:#010x} {:#010x} {:#010x}",
            hashes[0][i], hashes[1][i], hashes[2][i], hashes[3][i]
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_index(id: String, file: PathBuf) -> Result<ExitCode> {
    let reader = File::open(&file).with_context(|| format!("could not open file: {}", file.display()))?;
    let hashes = extract(reader).context("fingerprint extraction failed")?;
    let mut db = sndprint_db()?;
    db.add(&id, &hashes).context("could not index file")?;
    info!("indexed {id} from {}", file.display());
    Ok(ExitCode::SUCCESS)
}

fn run_query(seconds: Option<u32>, file: Option<PathBuf>) -> Result<ExitCode> {
    const MIN_SAMPLE_LENGTH: usize = 256;

    let reader = open_input(&file)?;
    let max_samples = seconds.map(|s| s as usize * sndprint::framer::SAMPLE_RATE as usize);
    let hashes = extract_bounded(reader, max_samples).context("fingerprint extraction failed")?;
    if hashes[0].len() < MIN_SAMPLE_LENGTH {
        eprintln!("Sample too short");
        return Ok(ExitCode::from(2));
    }

    let db = sndprint_db()?;
    let matcher = Matcher::new(&db);
    let results = matcher.query(&hashes).context("match failed")?;

    let mut prev_song: Option<String> = None;
    for r in &results {
        if prev_song.as_deref() == Some(r.song.as_str()) {
            println!(
                "{:>37}[{:>6} - {:>6}]: {:.2?}",
                "", r.range.0, r.range.1, r.score
            );
        } else {
            println!("{} [{:>6} - {:>6}]: {:.2?}", r.song, r.range.0, r.range.1, r.score);
            prev_song = Some(r.song.clone());
        }
    }

    if results.is_empty() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_compare(verbose: bool, file1: PathBuf, file2: PathBuf) -> Result<ExitCode> {
    let f1 = File::open(&file1).with_context(|| format!("could not open file: {}", file1.display()))?;
    let f2 = File::open(&file2).with_context(|| format!("could not open file: {}", file2.display()))?;

    info!("hashing {}", file1.display());
    let h1 = extract(f1).context("fingerprint extraction failed")?;
    info!("hashing {}", file2.display());
    let h2 = extract(f2).context("fingerprint extraction failed")?;

    let mean_ber: f64 = (0..4).map(|k| channel_ber(&h1[k], &h2[k])).sum::<f64>() / 4.0;

    if mean_ber > 0.25 {
        if verbose {
            println!("BER = {mean_ber:.2} - not identical");
        }
        Ok(ExitCode::from(1))
    } else {
        if verbose {
            println!("BER = {mean_ber:.2} - identical");
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// Whole-stream BER between two possibly differently-sized hash streams,
/// counting every extra word in the longer stream as a full 32-bit error
/// (mirrors the reference `sndprint-cmp`'s length-mismatch handling).
fn channel_ber(a: &[u32], b: &[u32]) -> f64 {
    let n = a.len().min(b.len());
    let mut errors: u64 = 0;
    for i in 0..n {
        errors += (a[i] ^ b[i]).count_ones() as u64;
    }
    errors += (a.len().abs_diff(b.len()) * 32) as u64;
    let total = a.len().max(b.len()) * 32;
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Fingerprint { file } => run_fingerprint(file),
        Command::Index { id, file } => run_index(id, file),
        Command::Query { seconds, file } => run_query(seconds, file),
        Command::Compare { verbose, file1, file2 } => run_compare(verbose, file1, file2),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::from(2)
        }
    }
}
