use std::io::{self, Write};

/// Carriage return.
pub const CR: u8 = b'\r';

/// Line feed.
pub const LF: u8 = b'\n';

/// An expandable byte buffer backed by fixed-size chunks. The buffer grows
/// one chunk at a time and previously written data is never moved or
/// reallocated. It is intended for reuse: `clear()` resets the length to
/// zero but keeps every chunk already allocated, so a long-lived connection
/// pays the allocation cost only once.
pub struct SegmentedBuffer {
    chunk_size: usize,
    len: usize,
    chunks: Vec<Box<[u8]>>,
}

impl SegmentedBuffer {
    /// Constructs a buffer with the given chunk size, which is also the
    /// growth increment.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            len: 0,
            chunks: Vec::new(),
        }
    }

    /// The logical number of bytes written.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resets the buffer to empty without releasing any chunk memory.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends a slice, filling the active chunk and allocating (or reusing)
    /// further chunks as needed. Appending an empty slice is a no-op.
    pub fn append(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let chunk = self.len / self.chunk_size;
            let offset = self.len % self.chunk_size;
            if chunk == self.chunks.len() {
                self.chunks.push(vec![0u8; self.chunk_size].into_boxed_slice());
            }
            let take = (self.chunk_size - offset).min(data.len());
            self.chunks[chunk][offset..offset + take].copy_from_slice(&data[..take]);
            self.len += take;
            data = &data[take..];
        }
    }

    /// Appends a single byte.
    pub fn append_byte(&mut self, b: u8) {
        self.append(&[b]);
    }

    /// The byte at `pos`. Panics if `pos` is past the end, like slice
    /// indexing does.
    pub fn byte_at(&self, pos: usize) -> u8 {
        assert!(pos < self.len, "position {} out of bounds for length {}", pos, self.len);
        self.chunks[pos / self.chunk_size][pos % self.chunk_size]
    }

    /// Copies bytes starting at `pos` into `dest`. If `dest` reaches past the
    /// end of the buffer only the available bytes are copied, and the count
    /// actually copied is returned.
    pub fn copy_to_slice(&self, pos: usize, dest: &mut [u8]) -> usize {
        assert!(pos <= self.len, "position {} out of bounds for length {}", pos, self.len);
        let count = dest.len().min(self.len - pos);
        let mut copied = 0;
        while copied < count {
            let from = pos + copied;
            let chunk = from / self.chunk_size;
            let offset = from % self.chunk_size;
            let take = (self.chunk_size - offset).min(count - copied);
            dest[copied..copied + take]
                .copy_from_slice(&self.chunks[chunk][offset..offset + take]);
            copied += take;
        }
        count
    }

    /// A copy of `length` bytes starting at `pos`. Panics if the range runs
    /// past the end of the buffer. A zero-length range at exactly `len()` is
    /// allowed and yields an empty vector.
    pub fn get_bytes(&self, pos: usize, length: usize) -> Vec<u8> {
        assert!(
            pos + length <= self.len,
            "range {}..{} out of bounds for length {}",
            pos,
            pos + length,
            self.len
        );
        let mut result = vec![0u8; length];
        self.copy_to_slice(pos, &mut result);
        result
    }

    /// A contiguous copy of the whole buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.get_bytes(0, self.len)
    }

    /// A lossy UTF-8 view of part of the buffer.
    pub fn get_string(&self, pos: usize, length: usize) -> String {
        String::from_utf8_lossy(&self.get_bytes(pos, length)).into_owned()
    }

    /// Streams the whole buffer into a writer chunk by chunk, avoiding a
    /// joined intermediate copy. Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let full_chunks = self.len / self.chunk_size;
        let remainder = self.len % self.chunk_size;
        for chunk in &self.chunks[..full_chunks] {
            writer.write_all(chunk)?;
        }
        if remainder > 0 {
            writer.write_all(&self.chunks[full_chunks][..remainder])?;
        }
        Ok(self.len)
    }

    /// Finds the first occurrence of `pattern` at or after `from`, scanning
    /// across chunk boundaries without materializing a contiguous copy.
    pub fn index_of(&self, pattern: &[u8], from: usize) -> Option<usize> {
        if from > self.len {
            return None;
        }
        if pattern.is_empty() {
            return Some(from);
        }
        if pattern.len() > self.len - from {
            return None;
        }
        let last = self.len - pattern.len();
        for start in from..=last {
            if self.matches_at(start, pattern) {
                return Some(start);
            }
        }
        None
    }

    /// True when the buffer's final bytes equal `pattern`. Cost depends only
    /// on the pattern length, not the buffer size.
    pub fn ends_with(&self, pattern: &[u8]) -> bool {
        if pattern.len() > self.len {
            return false;
        }
        self.matches_at(self.len - pattern.len(), pattern)
    }

    /// Finds the next line terminator (CR, LF, or the CR of a CRLF pair) at
    /// or after `from`.
    pub fn index_of_eol(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut chunk = from / self.chunk_size;
        let mut offset = from % self.chunk_size;
        for pos in from..self.len {
            let b = self.chunks[chunk][offset];
            if b == CR || b == LF {
                return Some(pos);
            }
            offset += 1;
            if offset == self.chunk_size {
                chunk += 1;
                offset = 0;
            }
        }
        None
    }

    /// Given the position of a line terminator, the position where the next
    /// line begins. Steps over a CRLF pair even when it straddles a chunk
    /// boundary. Returns `None` if `eol` is past the end; a terminator that
    /// is the very last byte yields `len()`.
    pub fn index_of_bol(&self, eol: usize) -> Option<usize> {
        if eol + 1 == self.len {
            return Some(self.len);
        }
        if eol >= self.len {
            return None;
        }
        if self.byte_at(eol) == CR && self.byte_at(eol + 1) == LF {
            Some(eol + 2)
        } else {
            Some(eol + 1)
        }
    }

    /// Obtains a tokenizing cursor positioned at the start of the buffer.
    pub fn tokenizer(&mut self) -> Tokenizer<'_> {
        Tokenizer {
            buffer: self,
            position: 0,
        }
    }

    fn matches_at(&self, pos: usize, pattern: &[u8]) -> bool {
        let mut chunk = pos / self.chunk_size;
        let mut offset = pos % self.chunk_size;
        for &expected in pattern {
            if self.chunks[chunk][offset] != expected {
                return false;
            }
            offset += 1;
            if offset == self.chunk_size {
                chunk += 1;
                offset = 0;
            }
        }
        true
    }

    /// Discards everything before `from` and shifts the remainder to the
    /// front, in place, reusing the existing chunks.
    fn compact(&mut self, from: usize) {
        if from == 0 {
            return;
        }
        if from >= self.len {
            self.clear();
            return;
        }
        let remaining = self.len - from;
        let mut copied = 0;
        while copied < remaining {
            let src = from + copied;
            let src_chunk = src / self.chunk_size;
            let src_offset = src % self.chunk_size;
            let dst_chunk = copied / self.chunk_size;
            let dst_offset = copied % self.chunk_size;
            let take = (self.chunk_size - src_offset)
                .min(self.chunk_size - dst_offset)
                .min(remaining - copied);
            if src_chunk == dst_chunk {
                // Destination never trails the source, so a forward
                // overlapping copy within one chunk is safe.
                self.chunks[src_chunk].copy_within(src_offset..src_offset + take, dst_offset);
            } else {
                let (front, back) = self.chunks.split_at_mut(src_chunk);
                front[dst_chunk][dst_offset..dst_offset + take]
                    .copy_from_slice(&back[0][src_offset..src_offset + take]);
            }
            copied += take;
        }
        self.len = remaining;
    }
}

/// A stateful cursor over one `SegmentedBuffer`, consuming lines and tokens
/// from front to back.
pub struct Tokenizer<'a> {
    buffer: &'a mut SegmentedBuffer,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// The current cursor position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// True once the cursor has consumed the whole buffer.
    pub fn end_of_data(&self) -> bool {
        self.position == self.buffer.len()
    }

    /// The next line, without its terminator. The cursor advances past the
    /// terminator, CRLF included. Returns `None` when no terminator remains.
    pub fn get_line(&mut self) -> Option<Vec<u8>> {
        let eol = self.buffer.index_of_eol(self.position)?;
        let line = self.buffer.get_bytes(self.position, eol - self.position);
        self.position = self.buffer.index_of_bol(eol).unwrap_or(self.buffer.len());
        Some(line)
    }

    /// The rest of the current line with surrounding whitespace removed, or
    /// everything up to the end of data when no terminator remains.
    pub fn get_trimmed_remainder(&mut self) -> Option<String> {
        if self.end_of_data() {
            return None;
        }
        let start = self.position;
        let end = match self.buffer.index_of_eol(start) {
            Some(eol) => {
                self.position = self.buffer.index_of_bol(eol).unwrap_or(self.buffer.len());
                eol
            }
            None => {
                self.position = self.buffer.len();
                self.buffer.len()
            }
        };
        if start == self.position {
            return None;
        }
        Some(self.buffer.get_string(start, end - start).trim().to_owned())
    }

    /// The bytes up to the next delimiter, as a string. The cursor then
    /// skips the run of delimiters that follows, so consecutive calls walk
    /// token by token. When no delimiter remains the rest of the buffer is
    /// returned and the cursor moves to the end of data.
    pub fn next_token(&mut self, delimiters: &[u8]) -> Option<String> {
        if self.end_of_data() {
            return None;
        }
        let start = self.position;
        let mut end = self.buffer.len();
        for pos in start..self.buffer.len() {
            if delimiters.contains(&self.buffer.byte_at(pos)) {
                end = pos;
                break;
            }
        }
        self.position = self.buffer.len();
        for pos in end..self.buffer.len() {
            if !delimiters.contains(&self.buffer.byte_at(pos)) {
                self.position = pos;
                break;
            }
        }
        Some(self.buffer.get_string(start, end - start))
    }

    /// Compacts the buffer by discarding everything before the cursor and
    /// shifting the remainder to the front. At end of data this is
    /// equivalent to `clear()`.
    pub fn flip(&mut self) {
        let from = self.position;
        self.buffer.compact(from);
        self.position = 0;
    }
}
