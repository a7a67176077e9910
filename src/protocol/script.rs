//! Packaging of Lua scripts into file-write commands.
//!
//! A script is uploaded by opening a file on the device and appending the
//! source to it piece by piece. Each piece travels inside a single-quoted Lua
//! string literal, so the source is escaped first and then split on
//! boundaries that never separate a two-character escape sequence.
//!
//! ```text
//! f=frame.file.open('app.lua', 'w');print('\x02')
//! f:write('<escaped chunk 1>');print('\x02')
//! f:write('<escaped chunk 2>');print('\x02')
//! ...
//! ```
//!
//! The device prints the `0x02` sentinel once a command has executed.

use std::fmt;
use std::iter::FusedIterator;
use std::ops::Range;
use std::path::Path;

use crate::error::{Error, Result};

/// Default destination file on the device.
pub const DEFAULT_REMOTE_PATH: &str = "app.lua";

/// Default number of escaped characters per write command.
pub const DEFAULT_CHUNK_SIZE: usize = 170;

/// Text the device prints after each upload command completes.
pub const UPLOAD_SENTINEL: &str = "\u{2}";

/// Substitutions applied in order; backslash must come first.
const ESCAPES: [(&str, &str); 4] = [("\\", "\\\\"), ("\n", "\\n"), ("'", "\\'"), ("\"", "\\\"")];

/// Script source to upload, with its destination and chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    source_text: String,
    remote_path: String,
    chunk_size: usize,
}

impl ScriptSource {
    /// Creates a script with the default remote path and chunk size.
    #[must_use]
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            remote_path: DEFAULT_REMOTE_PATH.to_owned(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Reads a script from the host filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source_text = std::fs::read_to_string(path)?;
        Ok(Self::new(source_text))
    }

    /// Sets the destination file on the device.
    #[must_use]
    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = remote_path.into();
        self
    }

    /// Sets the number of escaped characters per write command.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Returns the unescaped source text.
    #[must_use]
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Returns the destination file on the device.
    #[must_use]
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Returns the chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Generates the ordered upload commands for this script.
    pub fn commands(&self) -> Result<Vec<UploadCommand>> {
        commands(self)
    }
}

/// A single Lua statement in an upload sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadCommand {
    /// Open (and truncate) the destination file for writing.
    Open { path: String },
    /// Append an escaped chunk to the open file.
    Write { chunk: String },
}

impl UploadCommand {
    /// Returns the escaped chunk carried by a write command.
    #[must_use]
    pub fn chunk(&self) -> Option<&str> {
        match self {
            Self::Open { .. } => None,
            Self::Write { chunk } => Some(chunk),
        }
    }
}

impl fmt::Display for UploadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path } => write!(
                f,
                "f=frame.file.open('{}', 'w');print('{UPLOAD_SENTINEL}')",
                escape(path)
            ),
            Self::Write { chunk } => write!(f, "f:write('{chunk}');print('{UPLOAD_SENTINEL}')"),
        }
    }
}

/// Escapes text for embedding in a quoted Lua string literal.
#[must_use]
pub fn escape(text: &str) -> String {
    ESCAPES
        .iter()
        .fold(text.to_owned(), |acc, (from, to)| acc.replace(from, to))
}

/// Builds the command that opens `remote_path` for writing.
#[must_use]
pub fn open_command(remote_path: &str) -> UploadCommand {
    UploadCommand::Open {
        path: remote_path.to_owned(),
    }
}

/// Returns the byte ranges splitting `escaped` into chunks of at most
/// `chunk_size` characters.
///
/// A window whose last character introduces an escape is pulled back by one
/// so the escape travels with its partner in the next chunk.
pub fn chunk_boundaries(escaped: &str, chunk_size: usize) -> Result<ChunkBoundaries<'_>> {
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize { size: chunk_size });
    }
    Ok(ChunkBoundaries {
        text: escaped,
        chunk_size,
        start: 0,
    })
}

/// Generates `[open, write...]` for a script.
pub fn commands(script: &ScriptSource) -> Result<Vec<UploadCommand>> {
    if script.chunk_size == 0 {
        return Err(Error::InvalidChunkSize {
            size: script.chunk_size,
        });
    }

    let escaped = escape(&script.source_text);
    let mut commands = vec![open_command(&script.remote_path)];
    commands.extend(
        chunk_boundaries(&escaped, script.chunk_size)?.map(|range| UploadCommand::Write {
            chunk: escaped[range].to_owned(),
        }),
    );

    tracing::debug!(
        "packaged {} bytes of script into {} commands",
        script.source_text.len(),
        commands.len()
    );
    Ok(commands)
}

/// Iterator over chunk byte ranges of an escaped string.
///
/// Cloning restarts nothing; call [`chunk_boundaries`] again for a fresh pass.
#[derive(Debug, Clone)]
pub struct ChunkBoundaries<'a> {
    text: &'a str,
    chunk_size: usize,
    start: usize,
}

impl Iterator for ChunkBoundaries<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.start..];
        if rest.is_empty() {
            return None;
        }

        // Final window: whatever remains fits.
        let Some((window, _)) = rest.char_indices().nth(self.chunk_size) else {
            let range = self.start..self.text.len();
            self.start = self.text.len();
            return Some(range);
        };

        let mut end = window;
        if ends_with_escape_prefix(&rest[..end]) {
            // Backslash is a single byte.
            end -= 1;
            if end == 0 {
                // A one-character window cannot hold the pair; take both.
                end = 1 + rest[1..].chars().next().map_or(0, char::len_utf8);
            }
        }

        let range = self.start..self.start + end;
        self.start += end;
        Some(range)
    }
}

impl FusedIterator for ChunkBoundaries<'_> {}

/// Returns true if `chunk` ends with a backslash that opens an escape.
///
/// Chunks always start on an escape boundary, so an odd trailing run of
/// backslashes means the last one is unpaired.
fn ends_with_escape_prefix(chunk: &str) -> bool {
    let run = chunk.bytes().rev().take_while(|&b| b == b'\\').count();
    run % 2 == 1
}
