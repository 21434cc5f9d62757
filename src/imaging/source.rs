//! Where the pixels of an upload come from.
//!
//! An upload is either already materialized on disk (a temp file written by
//! the multipart parser) or only available as a stream. Streams are modelled
//! as a factory so every consumer (metadata read, each conversion job) can
//! open its own independent reader, the way an upload's `getStream()` can be
//! called repeatedly.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opens a fresh reader over the upload's bytes.
pub type OpenStream = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

#[derive(Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Stream(OpenStream),
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ImageSource::Path(path.into())
    }

    /// Serve an in-memory buffer as a stream.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        ImageSource::Stream(Arc::new(move || {
            let cursor = io::Cursor::new(Arc::clone(&bytes));
            Ok(Box::new(cursor) as Box<dyn Read + Send>)
        }))
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ImageSource::Path(p) => Some(p),
            ImageSource::Stream(_) => None,
        }
    }

    /// Open a reader over the encoded bytes.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            ImageSource::Path(p) => Ok(Box::new(io::BufReader::new(std::fs::File::open(p)?))),
            ImageSource::Stream(open) => open(),
        }
    }

    /// Read up to `limit` leading bytes, enough to sniff a file signature.
    pub fn read_prefix(&self, limit: usize) -> io::Result<Vec<u8>> {
        let mut prefix = Vec::with_capacity(limit);
        self.open()?.take(limit as u64).read_to_end(&mut prefix)?;
        Ok(prefix)
    }

    /// Read the whole encoded payload.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            ImageSource::Path(p) => std::fs::read(p),
            ImageSource::Stream(_) => {
                let mut bytes = Vec::new();
                self.open()?.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Encoded size in bytes.
    pub fn byte_size(&self) -> io::Result<u64> {
        match self {
            ImageSource::Path(p) => Ok(std::fs::metadata(p)?.len()),
            ImageSource::Stream(_) => io::copy(&mut self.open()?, &mut io::sink()),
        }
    }

    /// Copy the encoded bytes verbatim to `dest`. Returns bytes written.
    pub fn copy_to(&self, dest: &Path) -> io::Result<u64> {
        match self {
            ImageSource::Path(p) => std::fs::copy(p, dest),
            ImageSource::Stream(_) => {
                let mut out = io::BufWriter::new(std::fs::File::create(dest)?);
                io::copy(&mut self.open()?, &mut out)
            }
        }
    }

    /// SHA-256 of the encoded bytes, as a hex string.
    pub fn content_hash(&self) -> io::Result<String> {
        let mut hasher = Sha256::new();
        io::copy(&mut self.open()?, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            ImageSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
