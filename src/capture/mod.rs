//! Frame Input Layer
//!
//! Frames arrive from an external capture + detection pipeline. This module
//! only defines the data contract and a replay source that reads recorded
//! frames from a JSON-lines file.

pub mod frame;

pub use frame::{now_ms, CapturedFrame, DetectedElement};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::warn;

/// Anything that yields detected frames in capture order
pub trait FrameSource {
    /// Next frame, or `None` when the source is exhausted
    fn next_frame(&mut self) -> Option<CapturedFrame>;
}

/// Replays frames recorded as one JSON object per line
pub struct ReplaySource<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
    skipped: usize,
}

impl ReplaySource<BufReader<File>> {
    /// Open a JSON-lines recording
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open frame recording: {:?}", path))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    /// Replay from any buffered reader
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Number of lines that could not be parsed
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Option<CapturedFrame> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!("Stopping replay after read error: {}", e);
                    return None;
                }
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<CapturedFrame>(&line) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping malformed frame on line {}: {}", self.line_no, e);
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for ReplaySource<R> {
    type Item = CapturedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}
