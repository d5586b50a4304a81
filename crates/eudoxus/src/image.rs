// Automaton image: the owned byte arena and bounds-checked offset access.

use std::path::Path;

use tracing::debug;

use crate::EudoxusError;
use crate::format::{self, Header, Layout};

/// Handle to a node: its byte offset from the start of the image.
///
/// Id 0 is the header and never names a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// Handle to an output record: its byte offset from the start of the image.
///
/// Id 0 terminates an output chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId(pub u64);

/// A loaded, validated automaton image.
///
/// The image is immutable once loaded; any number of
/// [`ExecutionState`](crate::ExecutionState)s may borrow it concurrently.
pub struct Automaton {
    data: Box<[u8]>,
    header: Header,
}

impl std::fmt::Debug for Automaton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Automaton")
            .field("len", &self.data.len())
            .field("id_width", &self.header.layout.id_width())
            .field("big_endian", &self.header.layout.is_big_endian())
            .field("no_advance_no_output", &self.header.no_advance_no_output)
            .field("num_nodes", &self.header.num_nodes)
            .field("num_outputs", &self.header.num_outputs)
            .field("start", &self.header.start_index)
            .finish()
    }
}

impl Automaton {
    /// Load an automaton from raw image bytes.
    ///
    /// The bytes are copied so the automaton owns its image; the header is
    /// validated, but nodes and outputs are only checked as execution reaches
    /// them.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EudoxusError> {
        let header = format::parse_header(data)?;
        debug!(
            len = data.len(),
            id_width = header.layout.id_width(),
            big_endian = header.layout.is_big_endian(),
            num_nodes = header.num_nodes,
            num_outputs = header.num_outputs,
            "loaded eudoxus image"
        );
        Ok(Self {
            data: data.into(),
            header,
        })
    }

    /// Read and load an image file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EudoxusError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| EudoxusError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_bytes(&data)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn layout(&self) -> Layout {
        self.header.layout
    }

    /// Node execution begins at.
    pub fn start(&self) -> NodeId {
        NodeId(self.header.start_index)
    }

    pub fn no_advance_no_output(&self) -> bool {
        self.header.no_advance_no_output
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Borrow `len` bytes starting at `offset`.
    #[inline]
    pub fn bytes(&self, offset: u64, len: usize) -> Result<&[u8], EudoxusError> {
        let out_of_bounds = || EudoxusError::OutOfBounds {
            offset,
            len,
            size: self.data.len(),
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        self.data.get(start..end).ok_or_else(out_of_bounds)
    }

    #[inline]
    pub fn byte(&self, offset: u64) -> Result<u8, EudoxusError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    /// Read an id of the image's id width at `offset`.
    #[inline]
    pub fn id(&self, offset: u64) -> Result<u64, EudoxusError> {
        let layout = self.header.layout;
        Ok(layout.decode(self.bytes(offset, layout.id_width())?))
    }

    /// Read a u32 in the image's byte order at `offset`.
    #[inline]
    pub fn u32(&self, offset: u64) -> Result<u32, EudoxusError> {
        let value = self.header.layout.decode(self.bytes(offset, 4)?);
        // Four bytes always fit.
        Ok(value as u32)
    }
}
