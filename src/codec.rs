//! Versioned encoding for everything that goes on the wire or to disk.
//!
//! An encoded value is a 2-byte big-endian codec version followed by the bincode encoding of
//! the value. Keeping the version first means a reader can always tell which layout follows,
//! so a future format can be added next to the current one without breaking old data.

use std::collections::HashSet;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const VERSION_LEN: usize = 2;

/// Default upper bound on an encoded value (2 MiB).
pub const DEFAULT_MAX_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug)]
pub enum Error {
    Bincode(bincode::Error),
    UnknownVersion(u16),
    TooLarge(usize),
    Truncated,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Bincode(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A set of accepted codec versions and a size limit.
///
/// A `Manager` is constructed once and handed to whatever needs it; there is no process-wide
/// registry.
#[derive(Debug, Clone)]
pub struct Manager {
    max_size: usize,
    versions: HashSet<u16>,
}

impl Default for Manager {
    fn default() -> Self {
        Manager::new(DEFAULT_MAX_SIZE).with_version(0)
    }
}

impl Manager {
    pub fn new(max_size: usize) -> Self {
        Manager { max_size, versions: HashSet::new() }
    }

    pub fn with_version(mut self, version: u16) -> Self {
        self.versions.insert(version);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn marshal<T: Serialize>(&self, version: u16, value: &T) -> Result<Vec<u8>> {
        if !self.versions.contains(&version) {
            return Err(Error::UnknownVersion(version));
        }
        let body_len = bincode::serialized_size(value)? as usize;
        let total = VERSION_LEN + body_len;
        if total > self.max_size {
            return Err(Error::TooLarge(total));
        }
        let mut bytes = Vec::with_capacity(total);
        // Writing into a Vec cannot fail
        let _ = bytes.write_u16::<BigEndian>(version);
        bincode::serialize_into(&mut bytes, value)?;
        Ok(bytes)
    }

    pub fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<(u16, T)> {
        if bytes.len() > self.max_size {
            return Err(Error::TooLarge(bytes.len()));
        }
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        if !self.versions.contains(&version) {
            return Err(Error::UnknownVersion(version));
        }
        let value = bincode::deserialize(&bytes[VERSION_LEN..])?;
        Ok((version, value))
    }
}
