use crate::{DbError, ErrorKind, InputStream, OutputStream, Result};
use std::sync::{Arc, Mutex};

/// Random-access, growable binary object.
///
/// Positions are byte offsets from 0. Reads past the end return a short (or
/// empty) result rather than failing. `free` releases the store; any later
/// access fails with a closed-resource error. Dropping a blob without
/// calling `free` is legal and equivalent to it.
pub trait Blob: Send {
    fn length(&self) -> Result<u64>;

    /// Up to `len` bytes starting at `pos`; short when the range passes the end.
    fn get_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>>;

    /// Overwrite/extend starting at `pos`; the blob grows as needed.
    fn set_bytes(&mut self, pos: u64, bytes: &[u8]) -> Result<()>;

    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Reader over the blob's current content, starting at 0.
    fn binary_stream(&self) -> Result<Box<dyn InputStream>>;

    /// Writer into the blob starting at `pos`.
    fn binary_writer(&mut self, pos: u64) -> Result<Box<dyn OutputStream>>;

    fn free(&mut self) -> Result<()>;

    /// Full materialization, a convenience over `get_bytes(0, length)`.
    fn bytes(&self) -> Result<Vec<u8>> {
        let len = self.length()?;
        self.get_bytes(0, len as usize)
    }
}

struct BlobState {
    data: Vec<u8>,
    freed: bool,
}

impl BlobState {
    fn live(&self, mark: &'static str) -> Result<()> {
        if self.freed {
            Err(DbError::new(
                mark,
                ErrorKind::ResultClosed,
                "blob has been freed",
            ))
        } else {
            Ok(())
        }
    }
}

/// Heap-backed [`Blob`].
///
/// This is the blob type drivers hand out when a binary column has been
/// materialized client side, and the one callers build to feed a
/// prepared-statement bind. Cloning shares the underlying store, which is
/// what lets reader and writer streams observe each other.
#[derive(Clone)]
pub struct MemoryBlob {
    state: Arc<Mutex<BlobState>>,
}

impl MemoryBlob {
    pub fn new() -> Self {
        Self::from_bytes(Vec::new())
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BlobState { data, freed: false })),
        }
    }
}

impl Default for MemoryBlob {
    fn default() -> Self {
        Self::new()
    }
}

impl Blob for MemoryBlob {
    fn length(&self) -> Result<u64> {
        let state = self.state.lock().expect("blob store poisoned");
        state.live("J5QN8WRYT3BZ")?;
        Ok(state.data.len() as u64)
    }

    fn get_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let state = self.state.lock().expect("blob store poisoned");
        state.live("D1PUK4SVHX7G")?;
        let start = (pos as usize).min(state.data.len());
        let end = start.saturating_add(len).min(state.data.len());
        Ok(state.data[start..end].to_vec())
    }

    fn set_bytes(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().expect("blob store poisoned");
        state.live("Y6EM2LCA9FJD")?;
        let end = pos as usize + bytes.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[pos as usize..end].copy_from_slice(bytes);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        let mut state = self.state.lock().expect("blob store poisoned");
        state.live("B8GT0ZQKNP5R")?;
        state.data.truncate(len as usize);
        Ok(())
    }

    fn binary_stream(&self) -> Result<Box<dyn InputStream>> {
        let state = self.state.lock().expect("blob store poisoned");
        state.live("S3VH7XDJWM1C")?;
        Ok(Box::new(BlobReader {
            state: self.state.clone(),
            position: 0,
            closed: false,
        }))
    }

    fn binary_writer(&mut self, pos: u64) -> Result<Box<dyn OutputStream>> {
        let state = self.state.lock().expect("blob store poisoned");
        state.live("F9KA1RUEQ6YN")?;
        Ok(Box::new(BlobWriter {
            state: self.state.clone(),
            position: pos as usize,
            closed: false,
        }))
    }

    fn free(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("blob store poisoned");
        state.freed = true;
        state.data = Vec::new();
        Ok(())
    }
}

struct BlobReader {
    state: Arc<Mutex<BlobState>>,
    position: usize,
    closed: bool,
}

impl InputStream for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.closed {
            return Err(DbError::new(
                "L0WC6NFZR2HV",
                ErrorKind::ResultClosed,
                "read on a closed blob stream",
            ));
        }
        let state = self.state.lock().expect("blob store poisoned");
        state.live("X7JB3EYGD8UM")?;
        if self.position >= state.data.len() {
            return Ok(None);
        }
        let n = buf.len().min(state.data.len() - self.position);
        buf[..n].copy_from_slice(&state.data[self.position..self.position + n]);
        self.position += n;
        Ok(Some(n))
    }

    fn skip(&mut self, n: usize) -> Result<usize> {
        if self.closed {
            return Err(DbError::new(
                "P4RD9TAKQ1XW",
                ErrorKind::ResultClosed,
                "skip on a closed blob stream",
            ));
        }
        let state = self.state.lock().expect("blob store poisoned");
        state.live("G5ZF8MHJC0EL")?;
        let step = n.min(state.data.len().saturating_sub(self.position));
        self.position += step;
        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

struct BlobWriter {
    state: Arc<Mutex<BlobState>>,
    position: usize,
    closed: bool,
}

impl OutputStream for BlobWriter {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(DbError::new(
                "T2UY5BQVN8KD",
                ErrorKind::ResultClosed,
                "write on a closed blob stream",
            ));
        }
        let mut state = self.state.lock().expect("blob store poisoned");
        state.live("E6NC4WSLJ9PA")?;
        let end = self.position + buf.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
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
    fn set_bytes_grows_the_store() {
        let mut blob = MemoryBlob::new();
        blob.set_bytes(4, &[1, 2, 3]).unwrap();
        assert_eq!(blob.length().unwrap(), 7);
        assert_eq!(blob.get_bytes(0, 7).unwrap(), vec![0, 0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn get_bytes_past_end_is_short() {
        let blob = MemoryBlob::from_bytes(vec![5, 6]);
        assert_eq!(blob.get_bytes(1, 100).unwrap(), vec![6]);
        assert!(blob.get_bytes(10, 5).unwrap().is_empty());
    }

    #[test]
    fn writer_is_visible_to_reader() {
        let mut blob = MemoryBlob::from_bytes(vec![0; 4]);
        let mut writer = blob.binary_writer(2).unwrap();
        writer.write(&[8, 8, 8]).unwrap();
        writer.close().unwrap();

        let mut reader = blob.binary_stream().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![0, 0, 8, 8, 8]);
    }

    #[test]
    fn freed_blob_rejects_every_access() {
        let mut blob = MemoryBlob::from_bytes(vec![1, 2, 3]);
        let mut reader = blob.binary_stream().unwrap();
        blob.free().unwrap();
        assert_eq!(blob.length().unwrap_err(), ErrorKind::ResultClosed);
        assert_eq!(
            reader.read(&mut [0u8; 1]).unwrap_err(),
            ErrorKind::ResultClosed
        );
    }

    #[test]
    fn truncate_shortens() {
        let mut blob = MemoryBlob::from_bytes((0..10).collect());
        blob.truncate(3).unwrap();
        assert_eq!(blob.bytes().unwrap(), vec![0, 1, 2]);
    }
}
