use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::ops::Range;

/// Outcome of one diff-write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Bytes of the new serialization written to the sink.
    pub bytes_written: usize,
    /// Number of contiguous spans written.
    pub spans: usize,
    /// Whether the sink was shortened to the new length.
    pub truncated: bool,
}

/// Destination of a diff-write: something addressable by byte offset.
pub trait SpanSink {
    fn write_span(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;

    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl SpanSink for File {
    fn write_span(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(bytes)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl SpanSink for Vec<u8> {
    fn write_span(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        if start > self.len() {
            self.resize(start, 0);
        }
        let overlap = bytes.len().min(self.len() - start);
        self[start..start + overlap].copy_from_slice(&bytes[..overlap]);
        self.extend_from_slice(&bytes[overlap..]);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length out of range"))?;
        Vec::truncate(self, len);
        Ok(())
    }
}

/// Spans of `new` that differ positionally from `old`.
///
/// Both buffers are walked in lockstep. A mismatch opens a span that closes
/// at the next offset where the bytes agree again. Everything of `new` past
/// the end of `old` forms the last span.
#[must_use]
pub fn diff_spans(old: &[u8], new: &[u8]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let shared = old.len().min(new.len());
    let mut index = 0usize;

    while index < shared {
        if old[index] == new[index] {
            index += 1;
            continue;
        }
        let start = index;
        while index < shared && old[index] != new[index] {
            index += 1;
        }
        spans.push(start..index);
    }

    if new.len() > shared {
        match spans.last_mut() {
            // A mismatch running into the tail is one contiguous write.
            Some(last) if last.end == shared => last.end = new.len(),
            _ => spans.push(shared..new.len()),
        }
    }

    spans
}

/// Brings `sink` from `old` to `new` by writing only the differing spans and
/// truncating when `new` is shorter.
pub fn write_diff(old: &[u8], new: &[u8], sink: &mut dyn SpanSink) -> io::Result<CommitStats> {
    let mut stats = CommitStats::default();

    for span in diff_spans(old, new) {
        sink.write_span(span.start as u64, &new[span.clone()])?;
        stats.bytes_written += span.len();
        stats.spans += 1;
    }

    if new.len() < old.len() {
        sink.truncate(new.len() as u64)?;
        stats.truncated = true;
    }

    Ok(stats)
}
