// Incremental reader for training log files
//
// Tracks a byte offset into a growing log and hands back only the lines
// appended since the last read. A partial trailing line (no newline yet) is
// held back until the writer finishes it.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogTailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LogTailResult<T> = Result<T, LogTailError>;

pub struct LogTail {
    path: PathBuf,
    offset: u64,
    max_lines: Option<usize>,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            max_lines: None,
        }
    }

    /// Keep at most the last `max_lines` lines of each read.
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = Some(max_lines);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has grown (or shrunk) since the last read. A
    /// missing file reads as "nothing to do" rather than an error, since
    /// a run may not have started logging yet.
    pub fn should_read(&self) -> bool {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() != self.offset,
            Err(_) => false,
        }
    }

    /// Read complete lines appended since the last call. Resets to the top
    /// of the file if it was truncated underneath us.
    pub fn read_new_lines(&mut self) -> LogTailResult<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            // Truncated (log rotation or a fresh run); start over
            log::debug!("{} shrank, restarting from offset 0", self.path.display());
            self.offset = 0;
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        // Only consume through the final newline; the tail of an
        // in-progress line stays for the next read.
        let consumed = match buf.iter().rposition(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => return Ok(Vec::new()),
        };
        self.offset += consumed as u64;

        let mut lines: Vec<String> = String::from_utf8_lossy(&buf[..consumed])
            .lines()
            .map(|l| l.to_string())
            .collect();

        if let Some(max) = self.max_lines {
            if lines.len() > max {
                lines.drain(..lines.len() - max);
            }
        }
        Ok(lines)
    }
}
