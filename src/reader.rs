use std::io::{self, Read};

/// Adapts a [`Read`] into a byte iterator for the tokenizer.
///
/// The iterator ends at EOF and also at the first read error. The error is kept so that a
/// truncated read can be told apart from a truncated document.
pub struct IoReadIterator<R> {
    reader: R,
    buf: Vec<u8>,
    valid_slice_start: usize,
    valid_slice_end: usize,
    bytes_read: u64,
    error: Option<io::Error>,
}

impl<R> IoReadIterator<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(64 * 1024, reader)
    }

    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; capacity.max(1)],
            valid_slice_start: 0,
            valid_slice_end: 0,
            bytes_read: 0,
            error: None,
        }
    }

    /// Total number of bytes pulled from the underlying reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The read error that ended iteration early, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: Read> Iterator for IoReadIterator<R> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.valid_slice_start != self.valid_slice_end {
            let b = self.buf[self.valid_slice_start];
            self.valid_slice_start += 1;
            return Some(b);
        }
        if self.error.is_some() {
            return None;
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => return None,
                Ok(read_len) => {
                    self.bytes_read += read_len as u64;
                    self.valid_slice_start = 1;
                    self.valid_slice_end = read_len;
                    return Some(self.buf[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.error = Some(e);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct FailingReader {
        remaining: &'static [u8],
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining.is_empty() {
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            let n = buf.len().min(self.remaining.len());
            buf[..n].copy_from_slice(&self.remaining[..n]);
            self.remaining = &self.remaining[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_small_buffer() {
        let mut it = IoReadIterator::with_capacity(3, &b"hello world"[..]);
        let collected: Vec<u8> = it.by_ref().collect();
        assert_eq!(collected, b"hello world");
        assert_eq!(it.bytes_read(), 11);
        assert!(it.take_error().is_none());
    }

    #[test]
    fn test_error_is_kept() {
        let mut it = IoReadIterator::with_capacity(4, FailingReader { remaining: b"[1," });
        assert_eq!(it.by_ref().count(), 3);
        let err = it.take_error().unwrap();
        assert_eq!(err.to_string(), "disk on fire");
    }
}
