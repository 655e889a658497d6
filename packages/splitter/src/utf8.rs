//! Strict UTF-8 validation of source files.
//!
//! Validation streams the file in fixed-size chunks, carrying an incomplete
//! multi-byte sequence over to the next chunk, so memory use does not grow
//! with the file.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::{Result, SplitterError};

/// Chunk size for validation reads.
const CHUNK_SIZE: usize = 64 * 1024;

/// Check whether the whole file decodes as UTF-8.
///
/// Read-only. IO errors are returned as errors; a decode failure is `Ok(false)`.
pub fn is_valid_utf8(path: &Path) -> Result<bool> {
    let file = File::open(path)?;
    is_valid_utf8_reader(file)
}

/// Like [`is_valid_utf8`], but fails with [`SplitterError::NotUtf8`].
pub fn ensure_utf8(path: &Path) -> Result<()> {
    if is_valid_utf8(path)? {
        Ok(())
    } else {
        Err(SplitterError::NotUtf8 {
            path: path.to_path_buf(),
        })
    }
}

/// Validate any reader as UTF-8.
pub fn is_valid_utf8_reader<R: Read>(mut reader: R) -> Result<bool> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    // Bytes of an incomplete sequence kept at the front of `buf`.
    let mut carry = 0usize;

    loop {
        let read = match reader.read(&mut buf[carry..]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            return Ok(carry == 0);
        }

        let filled = carry + read;
        match std::str::from_utf8(&buf[..filled]) {
            Ok(_) => carry = 0,
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                buf.copy_within(valid..filled, 0);
                carry = filled - valid;
            }
            Err(_) => return Ok(false),
        }
    }
}
