use hashbrown::HashMap;
use serde::Serialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source ID for identifying source files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceId(pub(crate) NonZeroU32);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl SourceId {
    /// create a new SourceId from a u32. panics if id is zero.
    pub(crate) fn new(id: u32) -> Self {
        SourceId(NonZeroU32::new(id).expect("SourceId must be non-zero"))
    }

    fn to_u32(self) -> u32 {
        self.0.get()
    }
}

/// Source ID and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLoc {
    pub source_id: SourceId,
    pub offset: u32,
}

impl Default for SourceLoc {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SourceLoc {
    pub(crate) fn new(source_id: SourceId, offset: u32) -> Self {
        SourceLoc { source_id, offset }
    }

    /// built-in source location (SourceId = 1, offset = 0)
    pub(crate) fn builtin() -> Self {
        SourceLoc::new(SourceId::new(1), 0)
    }

    pub(crate) fn offset(&self) -> u32 {
        self.offset
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceLoc(source_id={}, offset={})", self.source_id, self.offset)
    }
}

/// Represents a range in the source file.
/// Packed representation (64 bits total):
/// - Bits 0-23: Offset (24 bits) - Max 16 MiB
/// - Bits 24-39: Length (16 bits) - Max 64 KiB
/// - Bits 40-63: SourceId (24 bits) - Max ~16M files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceSpan(u64);

impl Default for SourceSpan {
    fn default() -> Self {
        Self::empty()
    }
}

impl SourceSpan {
    const OFFSET_BITS: u64 = 24;
    const LENGTH_BITS: u64 = 16;
    const SOURCE_ID_BITS: u64 = 24;

    const OFFSET_MASK: u64 = (1 << Self::OFFSET_BITS) - 1;
    const LENGTH_MASK: u64 = (1 << Self::LENGTH_BITS) - 1;
    const SOURCE_ID_MASK: u64 = (1 << Self::SOURCE_ID_BITS) - 1;

    const LENGTH_SHIFT: u64 = Self::OFFSET_BITS;
    const SOURCE_ID_SHIFT: u64 = Self::OFFSET_BITS + Self::LENGTH_BITS;

    const MAX_OFFSET: u32 = Self::OFFSET_MASK as u32;
    const MAX_LENGTH: u32 = Self::LENGTH_MASK as u32;
    const MAX_SOURCE_ID: u32 = Self::SOURCE_ID_MASK as u32;

    pub(crate) fn new(start: SourceLoc, end: SourceLoc) -> Self {
        if start.source_id != end.source_id {
            // Cannot represent a span across two files in the packed format.
            // Degrade to a zero-length span at the start location.
            return Self::new_with_length(start.source_id, start.offset, 0);
        }

        let length = end.offset.saturating_sub(start.offset);
        Self::new_with_length(start.source_id, start.offset, length)
    }

    pub(crate) fn new_with_length(source_id: SourceId, offset: u32, length: u32) -> Self {
        let id = source_id.to_u32();
        assert!(id <= Self::MAX_SOURCE_ID, "SourceId exceeds 24-bit limit: {}", id);
        assert!(
            offset <= Self::MAX_OFFSET,
            "SourceSpan offset exceeds 16 MiB limit: {}",
            offset
        );

        let len = length.min(Self::MAX_LENGTH);

        Self((offset as u64) | ((len as u64) << Self::LENGTH_SHIFT) | ((id as u64) << Self::SOURCE_ID_SHIFT))
    }

    pub(crate) fn empty() -> Self {
        Self::new(SourceLoc::builtin(), SourceLoc::builtin())
    }

    pub(crate) fn start(&self) -> SourceLoc {
        let offset = (self.0 & Self::OFFSET_MASK) as u32;
        SourceLoc {
            source_id: self.source_id(),
            offset,
        }
    }

    pub(crate) fn end(&self) -> SourceLoc {
        let offset = (self.0 & Self::OFFSET_MASK) as u32;
        let length = ((self.0 >> Self::LENGTH_SHIFT) & Self::LENGTH_MASK) as u32;
        SourceLoc {
            source_id: self.source_id(),
            offset: offset + length,
        }
    }

    pub(crate) fn source_id(&self) -> SourceId {
        let id = ((self.0 >> Self::SOURCE_ID_SHIFT) & Self::SOURCE_ID_MASK) as u32;
        SourceId::new(id)
    }

    /// Merge two source spans into a single span covering both
    pub(crate) fn merge(self, other: SourceSpan) -> SourceSpan {
        let id1 = self.source_id();
        let id2 = other.source_id();

        if id1 != id2 {
            return self;
        }

        let start1 = self.start().offset;
        let end1 = self.end().offset;
        let start2 = other.start().offset;
        let end2 = other.end().offset;

        let min_start = start1.min(start2);
        let max_end = end1.max(end2);

        let start_loc = SourceLoc::new(id1, min_start);
        let end_loc = SourceLoc::new(id1, max_end);

        Self::new(start_loc, end_loc)
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SourceSpan(source_id={}, start={}, end={})",
            self.source_id(),
            self.start().offset,
            self.end().offset
        )
    }
}

/// File information for tracking source files
#[derive(Debug)]
pub struct FileInfo {
    pub file_id: SourceId,
    pub path: PathBuf,
    pub size: u32,
    pub(crate) buffer: Arc<[u8]>,
    pub line_starts: Vec<u32>, // Line start offsets for efficient line lookup
}

/// Manages source files and locations
pub struct SourceManager {
    file_infos: Vec<FileInfo>,
    path_to_id: HashMap<PathBuf, SourceId>,
    next_file_id: u32,
}

impl Default for SourceManager {
    fn default() -> Self {
        Self {
            file_infos: Vec::new(),
            path_to_id: HashMap::new(),
            next_file_id: 2, // Start from 2, reserve 1 for built-ins
        }
    }
}

impl SourceManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a file to the source manager from a file path
    /// Since we only support UTF-8, we can read directly as bytes and assume validity
    pub(crate) fn add_file_from_path(&mut self, path: &std::path::Path) -> Result<SourceId, std::io::Error> {
        let buffer = std::fs::read(path)?;
        let path_str = path.to_str().unwrap_or("<invalid-utf8>");
        Ok(self.add_buffer(buffer, path_str))
    }

    /// Add a buffer to the source manager with raw bytes (UTF-8 assumed).
    /// Line starts are computed up front so diagnostics can be rendered at any time.
    pub(crate) fn add_buffer(&mut self, buffer: Vec<u8>, path: &str) -> SourceId {
        let mut line_starts = vec![0]; // First line starts at offset 0
        for (i, &byte) in buffer.iter().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }

        let file_id = SourceId::new(self.next_file_id);
        self.next_file_id += 1;

        let size = buffer.len() as u32;
        let path_buf = PathBuf::from(path);
        self.path_to_id.insert(path_buf.clone(), file_id);

        self.file_infos.push(FileInfo {
            file_id,
            path: path_buf,
            size,
            buffer: Arc::from(buffer),
            line_starts,
        });

        file_id
    }

    /// Get the buffer for a given source ID
    /// Since SourceId is always valid (we panic if not found), we can use indexing
    /// use get_source_text to get &str from SourceSpan instead if you need text
    pub(crate) fn get_buffer(&self, source_id: SourceId) -> &[u8] {
        let id = source_id.to_u32();
        if id < 2 {
            panic!("invalid source_id {source_id}");
        }
        let info = match self.file_infos.get(id as usize - 2) {
            Some(info) => info,
            None => panic!("invalid source_id {source_id}"),
        };
        &info.buffer[..]
    }

    /// Get file info for a given source ID
    pub(crate) fn get_file_info(&self, source_id: SourceId) -> Option<&FileInfo> {
        let id = source_id.to_u32();
        if id < 2 {
            return None;
        }
        self.file_infos.get(id as usize - 2)
    }

    /// Get source ID for a given file path
    #[allow(dead_code)]
    pub(crate) fn get_file_id(&self, path: &str) -> Option<SourceId> {
        self.path_to_id.get(Path::new(path)).copied()
    }

    /// Get the source text for a given span
    /// Since we only support UTF-8, we can assume the bytes are valid UTF-8
    pub(crate) fn get_source_text(&self, span: SourceSpan) -> &str {
        let buffer = self.get_buffer(span.source_id());
        let start = span.start().offset() as usize;
        let end = span.end().offset() as usize;

        if start <= end && end <= buffer.len() {
            unsafe { std::str::from_utf8_unchecked(&buffer[start..end]) }
        } else {
            panic!("Invalid span range");
        }
    }

    /// Get the file name for a given source ID, for diagnostics
    pub(crate) fn get_file_name(&self, source_id: SourceId) -> &str {
        self.get_file_info(source_id)
            .and_then(|fi| fi.path.to_str())
            .unwrap_or("<unknown>")
    }

    /// Get line and column for a source location
    pub(crate) fn get_line_column(&self, loc: SourceLoc) -> Option<(u32, u32)> {
        let file_info = self.get_file_info(loc.source_id)?;
        let offset = loc.offset();

        let line_starts = &file_info.line_starts;
        if line_starts.is_empty() {
            // If line_starts not calculated yet, assume single line starting at 0
            return Some((1, offset + 1));
        }

        // Use partition_point which performs a binary search
        let idx = line_starts.partition_point(|&start| start <= offset);

        if idx == 0 {
            return Some((0, 1));
        }

        // idx is the index of the first element GREATER than offset.
        // The line index corresponds to the element immediately preceding usage.
        let line_idx = idx - 1;
        let line_start = line_starts[line_idx];
        let column = offset - line_start;

        Some((line_idx as u32 + 1, column + 1)) // 1-based indexing
    }
}
