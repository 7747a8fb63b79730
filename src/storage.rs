//! Dataset storage.
//!
//! Mounting the filesystem is the board's business; the agent only needs to
//! open one file read-only and walk it line by line.

use embedded_io_async::Read;
use heapless::Vec;

/// Size of the line buffer. Longer lines are delivered in chunks.
pub const MAX_LINE_LEN: usize = 128;

const READ_CHUNK: usize = 64;

/// A mounted filesystem.
#[allow(async_fn_in_trait)]
pub trait Storage {
    /// An open, read-only file. Dropping it closes the file.
    type File: Read;
    type Error: core::fmt::Debug;

    async fn open(&mut self, path: &str) -> Result<Self::File, Self::Error>;
}

/// Splits a byte stream into newline-terminated records.
///
/// The newline is not part of the returned line; any other byte, including a
/// carriage return, is kept as read. A line longer than `N` bytes comes back
/// as several consecutive chunks of at most `N` bytes.
pub struct LineReader<R, const N: usize = MAX_LINE_LEN> {
    inner: R,
    buf: [u8; READ_CHUNK],
    pos: usize,
    len: usize,
    eof: bool,
    line: Vec<u8, N>,
}

impl<R: Read, const N: usize> LineReader<R, N> {
    /// Wraps an open file.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: [0; READ_CHUNK],
            pos: 0,
            len: 0,
            eof: false,
            line: Vec::new(),
        }
    }

    /// Returns the next line, or `None` at end of file.
    pub async fn next_line(&mut self) -> Result<Option<&[u8]>, R::Error> {
        self.line.clear();
        loop {
            if self.pos == self.len && (self.eof || !self.fill().await?) {
                break;
            }

            let byte = self.buf[self.pos];
            if byte == b'\n' {
                self.pos += 1;
                return Ok(Some(self.line.as_slice()));
            }
            if self.line.is_full() {
                // Leave the byte for the next chunk.
                return Ok(Some(self.line.as_slice()));
            }
            self.pos += 1;
            let _ = self.line.push(byte);
        }

        if self.line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.line.as_slice()))
        }
    }

    async fn fill(&mut self) -> Result<bool, R::Error> {
        let n = self.inner.read(&mut self.buf).await?;
        self.pos = 0;
        self.len = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }
}

/// Logs the first line of the dataset at boot.
///
/// Purely diagnostic: returns whether a first line could be read.
pub async fn probe<S: Storage>(storage: &mut S, path: &str) -> bool {
    let file = match storage.open(path).await {
        Ok(file) => file,
        Err(err) => {
            error!("Failed to open {}: {:?}", path, err);
            return false;
        }
    };

    let mut reader: LineReader<_> = LineReader::new(file);
    match reader.next_line().await {
        Ok(Some(line)) => {
            let text = core::str::from_utf8(line).unwrap_or("<non-utf8 line>");
            info!("Read from file: '{}'", text);
            true
        }
        Ok(None) | Err(_) => {
            warn!("File is empty or read error");
            false
        }
    }
}
