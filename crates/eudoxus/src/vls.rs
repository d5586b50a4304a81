// Variable-length structures: optional fields packed back to back.
//
// A record is a fixed prefix followed by fields whose presence is decided by
// flag bits. Present fields appear in declaration order with no padding, so
// a field's offset is the sum of the sizes of the present fields before it.
// Reader and writer must declare fields in the same order.

use crate::EudoxusError;
use crate::image::Automaton;

/// Cursor over a variable-length record inside an image.
///
/// Every read checks bounds against the image; a field whose presence flag
/// is false is neither read nor skipped.
#[derive(Debug, Clone, Copy)]
pub struct VlsReader<'a> {
    image: &'a Automaton,
    offset: u64,
}

impl<'a> VlsReader<'a> {
    /// Start reading at `offset` (typically just past a record's fixed prefix).
    pub fn new(image: &'a Automaton, offset: u64) -> Self {
        Self { image, offset }
    }

    /// Absolute offset of the next field.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Skip a field of `size` bytes if it is present.
    pub fn advance_if(&mut self, size: usize, present: bool) {
        if present {
            self.offset += size as u64;
        }
    }

    /// Read a mandatory id field.
    pub fn id(&mut self) -> Result<u64, EudoxusError> {
        let id = self.image.id(self.offset)?;
        self.offset += self.image.layout().id_width() as u64;
        Ok(id)
    }

    /// Read an id field if present.
    pub fn id_if(&mut self, present: bool) -> Result<Option<u64>, EudoxusError> {
        present.then(|| self.id()).transpose()
    }

    /// Read a mandatory u32 field.
    pub fn u32(&mut self) -> Result<u32, EudoxusError> {
        let value = self.image.u32(self.offset)?;
        self.offset += 4;
        Ok(value)
    }

    /// Read a u32 field if present.
    pub fn u32_if(&mut self, present: bool) -> Result<Option<u32>, EudoxusError> {
        present.then(|| self.u32()).transpose()
    }

    /// Borrow a mandatory byte array of `len` bytes.
    pub fn array(&mut self, len: usize) -> Result<&'a [u8], EudoxusError> {
        let bytes = self.image.bytes(self.offset, len)?;
        self.offset += len as u64;
        Ok(bytes)
    }

    /// Borrow a byte array of `len` bytes if present.
    pub fn array_if(&mut self, len: usize, present: bool) -> Result<Option<&'a [u8]>, EudoxusError> {
        present.then(|| self.array(len)).transpose()
    }

    /// Borrow the trailing array of `count` elements of `element_size` bytes.
    ///
    /// The element count is not stored in the array itself; it is supplied by
    /// the caller from a field of the fixed prefix.
    pub fn finish(self, count: usize, element_size: usize) -> Result<&'a [u8], EudoxusError> {
        let len = count
            .checked_mul(element_size)
            .ok_or(EudoxusError::OutOfBounds {
                offset: self.offset,
                len: usize::MAX,
                size: self.image.len(),
            })?;
        self.image.bytes(self.offset, len)
    }
}

/// Builder for variable-length records, the write side of [`VlsReader`].
#[derive(Debug, Default, Clone)]
pub struct VlsWriter {
    buf: Vec<u8>,
}

impl VlsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes if the field is present.
    pub fn bytes_if(&mut self, bytes: &[u8], present: bool) -> &mut Self {
        if present {
            self.buf.extend_from_slice(bytes);
        }
        self
    }

    /// Append an id in `layout` if the field is present.
    pub fn id_if(
        &mut self,
        layout: crate::format::Layout,
        id: u64,
        present: bool,
    ) -> Result<&mut Self, EudoxusError> {
        if present {
            layout.encode_id(id, &mut self.buf)?;
        }
        Ok(self)
    }

    /// Append a u32 in `layout`'s byte order if the field is present.
    pub fn u32_if(&mut self, layout: crate::format::Layout, value: u32, present: bool) -> &mut Self {
        if present {
            layout.encode_into(u64::from(value), 4, &mut self.buf);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
