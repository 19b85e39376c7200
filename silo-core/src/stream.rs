use crate::{DbError, ErrorKind, Result};
use std::sync::{Arc, Mutex};

/// Forward-only byte reader.
///
/// `read` distinguishes end of stream (`Ok(None)`) from a legitimate short
/// read (`Ok(Some(0))`). Streams are scoped resources: dropping one without
/// calling [`InputStream::close`] is legal and counts as a close.
pub trait InputStream: Send {
    /// Read up to `buf.len()` bytes. `None` signals end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Advance the cursor by at most `n` bytes, returning how far it moved.
    fn skip(&mut self, n: usize) -> Result<usize>;

    /// Idempotent. Reads after close fail with a closed-resource error.
    fn close(&mut self) -> Result<()>;

    /// Drain the remainder of the stream into `out`, returning the byte count.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0u8; 4096];
        let mut total = 0;
        while let Some(n) = self.read(&mut chunk)? {
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
        Ok(total)
    }
}

/// Append-only byte writer.
pub trait OutputStream: Send {
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Idempotent. Writes after close fail with a closed-resource error.
    fn close(&mut self) -> Result<()>;
}

/// [`InputStream`] over an owned byte buffer.
///
/// Drivers that materialize binary columns client side hand the bytes to one
/// of these, so stream reads never touch the native handle again.
pub struct MemoryInputStream {
    data: Vec<u8>,
    position: usize,
    closed: bool,
}

impl MemoryInputStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            closed: false,
        }
    }
}

impl InputStream for MemoryInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.closed {
            return Err(DbError::new(
                "VN3RKQ81MDWP",
                ErrorKind::ResultClosed,
                "read on a closed input stream",
            ));
        }
        if self.position >= self.data.len() {
            return Ok(None);
        }
        let n = buf.len().min(self.data.len() - self.position);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(Some(n))
    }

    fn skip(&mut self, n: usize) -> Result<usize> {
        if self.closed {
            return Err(DbError::new(
                "H2TYJ6FBXC0S",
                ErrorKind::ResultClosed,
                "skip on a closed input stream",
            ));
        }
        let step = n.min(self.data.len() - self.position);
        self.position += step;
        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// [`OutputStream`] appending into a shared byte buffer.
///
/// Writes land in the `Arc<Mutex<Vec<u8>>>` handed in at construction,
/// starting at `pos`; the buffer grows as needed.
pub struct MemoryOutputStream {
    sink: Arc<Mutex<Vec<u8>>>,
    position: usize,
    closed: bool,
}

impl MemoryOutputStream {
    pub fn new(sink: Arc<Mutex<Vec<u8>>>, pos: usize) -> Self {
        Self {
            sink,
            position: pos,
            closed: false,
        }
    }
}

impl OutputStream for MemoryOutputStream {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(DbError::new(
                "R8LZ5QAGKV1E",
                ErrorKind::ResultClosed,
                "write on a closed output stream",
            ));
        }
        let mut sink = self.sink.lock().expect("output sink poisoned");
        let end = self.position + buf.len();
        if sink.len() < end {
            sink.resize(end, 0);
        }
        sink[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(DbError::new(
                "W4CXM9HD2UTQ",
                ErrorKind::ResultClosed,
                "flush on a closed output stream",
            ));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_reports_eof_as_none() {
        let mut stream = MemoryInputStream::new(vec![1, 2, 3]);
        let mut buf = [0u8; 2];
        assert_eq!(stream.read(&mut buf).unwrap(), Some(2));
        assert_eq!(buf, [1, 2]);
        assert_eq!(stream.read(&mut buf).unwrap(), Some(1));
        assert_eq!(stream.read(&mut buf).unwrap(), None);
    }

    #[test]
    fn skip_clamps_at_end() {
        let mut stream = MemoryInputStream::new(vec![0; 10]);
        assert_eq!(stream.skip(4).unwrap(), 4);
        assert_eq!(stream.skip(100).unwrap(), 6);
        assert_eq!(stream.read(&mut [0u8; 1]).unwrap(), None);
    }

    #[test]
    fn closed_stream_rejects_reads() {
        let mut stream = MemoryInputStream::new(vec![1]);
        stream.close().unwrap();
        stream.close().unwrap();
        let err = stream.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err, crate::ErrorKind::ResultClosed);
    }

    #[test]
    fn output_stream_grows_shared_buffer() {
        let sink = Arc::new(Mutex::new(vec![9u8; 2]));
        let mut out = MemoryOutputStream::new(sink.clone(), 1);
        out.write(&[7, 7, 7]).unwrap();
        out.flush().unwrap();
        out.close().unwrap();
        assert_eq!(*sink.lock().unwrap(), vec![9, 7, 7, 7]);
    }
}
