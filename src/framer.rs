//! Slides a fixed-size window over a little-endian signed 16-bit mono PCM
//! stream, emitting one sample frame every `STEP` samples.
//!
//! Grounded on `sndprint.go`'s `Hash` read loop: an initial full-window fill,
//! then repeated `step`-sized reads that slide the window left and append
//! fresh samples, zero-padding and terminating on a short final read.

use std::io::Read;

use log::{debug, warn};

use crate::error::FramerError;

pub const WINDOW_SIZE: usize = 4096;
pub const STEP: usize = 128;
pub const SAMPLE_RATE: u32 = 11025;
pub const DEPTH: usize = 2;

/// One sample frame: `WINDOW_SIZE` signed 16-bit PCM samples.
pub type Frame = Vec<i16>;

/// Streaming, single-producer single-consumer window over a PCM byte stream.
pub struct Framer<R> {
    reader: R,
    window: Vec<i16>,
    started: bool,
    finished: bool,
}

impl<R: Read> Framer<R> {
    pub fn new(reader: R) -> Self {
        Framer {
            reader,
            window: vec![0i16; WINDOW_SIZE],
            started: false,
            finished: false,
        }
    }

    /// Returns the next frame, or `Ok(None)` once the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramerError> {
        if self.finished {
            return Ok(None);
        }

        if !self.started {
            let mut buf = vec![0u8; WINDOW_SIZE * DEPTH];
            if let Err(err) = self.reader.read_exact(&mut buf) {
                if err.kind() == std::io::ErrorKind::UnexpectedEof {
                    return Err(FramerError::InputTooShort {
                        needed: WINDOW_SIZE,
                    });
                }
                return Err(FramerError::Io(err));
            }
            decode_into(&buf, &mut self.window);
            self.started = true;
            debug!("framer: initial window filled ({WINDOW_SIZE} samples)");
            return Ok(Some(self.window.clone()));
        }

        let mut buf = vec![0u8; STEP * DEPTH];
        let n = read_as_much_as_possible(&mut self.reader, &mut buf)?;
        if n == 0 {
            self.finished = true;
            return Ok(None);
        }
        if n < buf.len() {
            warn!("framer: short read at end of stream ({n} of {} bytes), zero-padding", buf.len());
            for b in &mut buf[n..] {
                *b = 0;
            }
            self.finished = true;
        }

        self.window.copy_within(STEP.., 0);
        decode_into(&buf, &mut self.window[WINDOW_SIZE - STEP..]);
        Ok(Some(self.window.clone()))
    }
}

/// Reads until `buf` is full or the stream is exhausted, returning the
/// number of bytes actually read (short of a hard I/O error).
fn read_as_much_as_possible(r: &mut impl Read, buf: &mut [u8]) -> Result<usize, FramerError> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FramerError::Io(e)),
        }
    }
    Ok(total)
}

fn decode_into(bytes: &[u8], samples: &mut [i16]) {
    for (chunk, sample) in bytes.chunks_exact(DEPTH).zip(samples.iter_mut()) {
        *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
}
