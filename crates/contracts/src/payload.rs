//! Payload - bytes handed to a transport
//!
//! A payload either lives in process memory or behind an external handle
//! (a file the transport streams from). Transports never look at the
//! variant: they pull bytes through [`PayloadReader::read_into`].

use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::ContractError;

/// Export payload
#[derive(Debug, Clone)]
pub enum Payload {
    /// Buffer owned by the process (zero-copy clones)
    InProcessBuffer(Bytes),
    /// File on local storage, streamed on demand
    ExternalHandle { path: PathBuf, len: u64 },
}

impl Payload {
    /// Wrap an in-memory buffer
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::InProcessBuffer(data.into())
    }

    /// Reference a file, recording its current length
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        Ok(Self::ExternalHandle { path, len })
    }

    /// Length in bytes
    pub fn len(&self) -> u64 {
        match self {
            Self::InProcessBuffer(data) => data.len() as u64,
            Self::ExternalHandle { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh reader positioned at offset 0
    pub fn reader(&self) -> PayloadReader {
        PayloadReader {
            payload: self.clone(),
            offset: 0,
            file: None,
        }
    }
}

/// Sequential reader over a [`Payload`]
#[derive(Debug)]
pub struct PayloadReader {
    payload: Payload,
    offset: u64,
    file: Option<File>,
}

impl PayloadReader {
    /// Total length of the underlying payload
    pub fn len(&self) -> u64 {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes already consumed
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes left to read
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.offset)
    }

    /// Copy the next chunk into `dst`
    ///
    /// Returns the number of bytes written; `0` means the payload is
    /// exhausted.
    ///
    /// # Errors
    /// - The recorded offset is past the end (state corruption)
    /// - The external handle can no longer be read or is shorter than declared
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<usize, ContractError> {
        let len = self.len();
        if self.offset > len {
            return Err(ContractError::payload_read(format!(
                "offset {} past payload length {}",
                self.offset, len
            )));
        }

        let want = dst.len().min(self.remaining() as usize);
        if want == 0 {
            return Ok(0);
        }

        match &self.payload {
            Payload::InProcessBuffer(data) => {
                let start = self.offset as usize;
                dst[..want].copy_from_slice(&data[start..start + want]);
            }
            Payload::ExternalHandle { path, .. } => {
                if self.file.is_none() {
                    let mut file = File::open(path)?;
                    file.seek(SeekFrom::Start(self.offset))?;
                    self.file = Some(file);
                }
                if let Some(file) = self.file.as_mut() {
                    file.read_exact(&mut dst[..want]).map_err(|e| {
                        ContractError::payload_read(format!(
                            "external handle '{}' truncated at offset {}: {}",
                            path.display(),
                            self.offset,
                            e
                        ))
                    })?;
                }
            }
        }

        self.offset += want as u64;
        Ok(want)
    }

    /// Drain the remaining bytes into a vector
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, ContractError> {
        let mut out = vec![0u8; self.remaining() as usize];
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read_into(&mut out[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }
}
