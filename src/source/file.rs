//! File-based event source.
//!
//! Tails a newline-delimited JSON file of raw events.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use floorwatch_types::RawEvent;

use super::{parse_line, EventSource};

/// An event source that reads raw events from an NDJSON file.
///
/// Each poll reads whatever was appended since the previous one. A trailing
/// line without its newline is held back until the writer finishes it. If
/// the file shrinks (rotated or truncated) reading restarts from the top.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
    last_error: Option<String>,
    offset: u64,
    partial: String,
    lines_read: u64,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            last_error: None,
            offset: 0,
            partial: String::new(),
            lines_read: 0,
        }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines consumed so far, including ones that failed to parse.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Read everything appended since the last call.
    fn read_new(&mut self) -> std::io::Result<String> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len < self.offset {
            self.offset = 0;
            self.partial.clear();
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl EventSource for FileSource {
    fn poll(&mut self) -> Vec<RawEvent> {
        let chunk = match self.read_new() {
            Ok(chunk) => chunk,
            Err(e) => {
                self.last_error = Some(format!("Read error: {}", e));
                return Vec::new();
            }
        };
        self.partial.push_str(&chunk);

        let Some(end) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let complete: String = self.partial.drain(..=end).collect();

        let mut events = Vec::new();
        for line in complete.lines() {
            self.lines_read += 1;
            match parse_line(line) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => self.last_error = Some(format!("line {}: {}", self.lines_read, e)),
            }
        }
        events
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
