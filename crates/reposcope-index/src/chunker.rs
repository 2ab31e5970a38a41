//! Line-oriented text chunking.
//!
//! Lines are accumulated until their combined length reaches the chunk size,
//! then emitted as one chunk. Lines keep their terminators, so concatenating
//! every chunk of a file reproduces its (lossily decoded) content.

use std::path::Path;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::error::Result;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// A piece of a source file plus the metadata stored alongside its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub filename: String,
    pub chunk_number: usize,
    /// Extension including the leading dot, or empty.
    pub file_extension: String,
}

impl Chunk {
    #[must_use]
    pub fn new(text: String, path: &Path, chunk_number: usize) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            text,
            filename,
            chunk_number,
            file_extension,
        }
    }

    /// `filename#chunk_number`, used when quoting a chunk as context.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}#{}", self.filename, self.chunk_number)
    }
}

/// Synchronous core of the chunker, fed one line at a time.
#[derive(Debug)]
pub struct LineAccumulator {
    chunk_size: usize,
    buffer: String,
    buffered_chars: usize,
}

impl LineAccumulator {
    /// A `chunk_size` of 0 behaves like 1.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            buffer: String::new(),
            buffered_chars: 0,
        }
    }

    /// Append a line; returns a chunk once the threshold is reached.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        self.buffer.push_str(line);
        self.buffered_chars += line.chars().count();
        if self.buffered_chars >= self.chunk_size {
            self.buffered_chars = 0;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// The non-empty remainder, if any.
    #[must_use]
    pub fn finish(self) -> Option<String> {
        (!self.buffer.is_empty()).then_some(self.buffer)
    }
}

struct ReadState<R> {
    reader: R,
    acc: Option<LineAccumulator>,
    line: Vec<u8>,
}

/// Chunk an already-open reader.
///
/// Invalid UTF-8 is replaced with U+FFFD rather than failing.
pub fn chunk_reader<R>(reader: R, chunk_size: usize) -> impl Stream<Item = Result<String>>
where
    R: AsyncBufRead + Unpin,
{
    let state = ReadState {
        reader,
        acc: Some(LineAccumulator::new(chunk_size)),
        line: Vec::new(),
    };

    futures::stream::try_unfold(state, next_chunk)
}

async fn next_chunk<R>(mut st: ReadState<R>) -> Result<Option<(String, ReadState<R>)>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(acc) = st.acc.as_mut() else {
            return Ok(None);
        };
        st.line.clear();
        let n = st.reader.read_until(b'\n', &mut st.line).await?;
        if n == 0 {
            let rest = st.acc.take().and_then(LineAccumulator::finish);
            return Ok(rest.map(|chunk| (chunk, st)));
        }
        let emitted = {
            let line = String::from_utf8_lossy(&st.line);
            acc.push_line(&line)
        };
        if let Some(chunk) = emitted {
            return Ok(Some((chunk, st)));
        }
    }
}

/// Open `path` and return a lazy stream of its chunks.
///
/// Each call reopens the file, so the stream can be restarted.
///
/// # Errors
///
/// Returns an error if the file cannot be opened. Read errors surface as
/// `Err` items of the stream.
pub async fn chunk_file(
    path: &Path,
    chunk_size: usize,
) -> Result<impl Stream<Item = Result<String>> + use<>> {
    let file = tokio::fs::File::open(path).await?;
    Ok(chunk_reader(BufReader::new(file), chunk_size))
}
