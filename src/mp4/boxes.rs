//! ISO base-media box scanning primitives.
//!
//! Boxes carry a 32-bit big-endian size and a four-byte type code; a size of
//! 1 escapes to a 64-bit size, a size of 0 means "extends to the end of the
//! file". [`read_box_header`] tolerates partial data so the parser can scan
//! incrementally as byte ranges arrive.

use crate::error::FramesiftError;

/// Four-byte box type code.
pub(crate) type FourCc = [u8; 4];

/// A parsed box header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoxHeader {
    /// Box type code.
    pub kind: FourCc,
    /// Total box size including the header, or `None` when the box extends
    /// to the end of the file (size field of 0).
    pub size: Option<u64>,
    /// Number of header bytes consumed (8, or 16 for a 64-bit size).
    pub header_len: u64,
}

impl BoxHeader {
    /// Payload size for a bounded box.
    pub(crate) fn payload_len(&self) -> Option<u64> {
        self.size.map(|size| size - self.header_len)
    }
}

/// Try to read a box header from the start of `data`.
///
/// Returns `Ok(None)` when `data` does not yet hold enough bytes for the
/// header — the caller should retry after appending more.
///
/// # Errors
///
/// Returns [`FramesiftError::Parse`] for a size smaller than the header or a
/// type code containing non-printable bytes.
pub(crate) fn read_box_header(data: &[u8]) -> Result<Option<BoxHeader>, FramesiftError> {
    if data.len() < 8 {
        return Ok(None);
    }

    let size32 = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let kind: FourCc = [data[4], data[5], data[6], data[7]];

    if !kind.iter().all(|byte| (0x20..=0x7e).contains(byte)) {
        return Err(FramesiftError::Parse(format!(
            "invalid box type code {kind:02x?}"
        )));
    }

    let (size, header_len) = match size32 {
        0 => (None, 8),
        1 => {
            if data.len() < 16 {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[8..16]);
            (Some(u64::from_be_bytes(bytes)), 16)
        }
        size => (Some(size as u64), 8),
    };

    if let Some(size) = size {
        if size < header_len {
            return Err(FramesiftError::Parse(format!(
                "box '{}' declares size {size}, smaller than its header",
                fourcc_str(&kind)
            )));
        }
    }

    Ok(Some(BoxHeader {
        kind,
        size,
        header_len,
    }))
}

/// Render a type code for diagnostics.
pub(crate) fn fourcc_str(kind: &FourCc) -> String {
    String::from_utf8_lossy(kind).into_owned()
}

/// Iterator over the child boxes of a fully-buffered payload.
///
/// Yields `(kind, payload)` pairs; errors on truncated children. Unknown
/// children are yielded like any other so callers can skip them.
pub(crate) struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<(FourCc, &'a [u8]), FramesiftError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.pos..];
        let header = match read_box_header(rest) {
            Ok(Some(header)) => header,
            Ok(None) => {
                return Some(Err(FramesiftError::Parse(
                    "truncated box header inside container metadata".to_string(),
                )));
            }
            Err(error) => return Some(Err(error)),
        };

        // Inside fully-buffered metadata an open-ended box runs to the end
        // of the enclosing payload.
        let total = header.size.unwrap_or(rest.len() as u64);
        if total > rest.len() as u64 {
            return Some(Err(FramesiftError::Parse(format!(
                "box '{}' overruns its parent ({} bytes declared, {} available)",
                fourcc_str(&header.kind),
                total,
                rest.len()
            ))));
        }

        let payload = &rest[header.header_len as usize..total as usize];
        self.pos += total as usize;
        Some(Ok((header.kind, payload)))
    }
}

/// Big-endian reader over a fully-buffered box payload.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, count: usize) -> Result<&'a [u8], FramesiftError> {
        if self.remaining() < count {
            return Err(FramesiftError::Parse(format!(
                "truncated box payload: wanted {count} bytes, {} left",
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, count: usize) -> Result<(), FramesiftError> {
        self.take(count).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, FramesiftError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, FramesiftError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, FramesiftError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, FramesiftError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    /// Read a version/flags prefix, returning the version byte.
    pub(crate) fn version_flags(&mut self) -> Result<u8, FramesiftError> {
        let version = self.u8()?;
        self.skip(3)?;
        Ok(version)
    }
}
