// Image binary format: header parsing and validation, id width and byte order.

use bytemuck::{Pod, Zeroable};

use crate::EudoxusError;

/// Image format version understood by this engine.
pub const VERSION: u8 = 1;

/// Size of the image header in bytes.
pub const HEADER_SIZE: usize = 40;

/// Bit of the global flag word: skip outputs for steps that did not consume input.
pub const FLAG_NO_ADVANCE_NO_OUTPUT: u8 = 0x01;

/// Raw image header as stored in the first 40 bytes of an image.
///
/// - byte 0: version
/// - byte 1: id width in bytes (1, 2, 4 or 8)
/// - byte 2: byte order (0 = little endian, 1 = big endian)
/// - byte 3: global flag word (bit 0 = `no_advance_no_output`)
/// - bytes 4..8: reserved
/// - bytes 8..40: `num_nodes`, `num_outputs`, `data_length`, `start_index`,
///   each a u64 in the declared byte order
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawHeader {
    pub version: u8,
    pub id_width: u8,
    pub is_big_endian: u8,
    pub flags: u8,
    pub _reserved: [u8; 4],
    pub num_nodes: [u8; 8],
    pub num_outputs: [u8; 8],
    pub data_length: [u8; 8],
    pub start_index: [u8; 8],
}

const _: () = assert!(size_of::<RawHeader>() == HEADER_SIZE);

/// Id width and byte order of an image.
///
/// Every id, length and header integer in an image is decoded through the
/// layout, so one engine handles all four id widths in either byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    id_width: u8,
    big_endian: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            id_width: 4,
            big_endian: false,
        }
    }
}

impl Layout {
    pub fn new(id_width: u8, big_endian: bool) -> Result<Self, EudoxusError> {
        match id_width {
            1 | 2 | 4 | 8 => Ok(Self {
                id_width,
                big_endian,
            }),
            other => Err(EudoxusError::InvalidIdWidth(other)),
        }
    }

    /// Width of an id in bytes.
    #[inline]
    pub fn id_width(&self) -> usize {
        self.id_width as usize
    }

    #[inline]
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Largest id representable in this layout.
    pub fn max_id(&self) -> u64 {
        match self.id_width {
            8 => u64::MAX,
            w => (1u64 << (u32::from(w) * 8)) - 1,
        }
    }

    /// Decode an unsigned integer from `bytes` (1 to 8 bytes) in this layout's byte order.
    #[inline]
    pub fn decode(&self, bytes: &[u8]) -> u64 {
        if self.big_endian {
            bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
        } else {
            bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
        }
    }

    /// Append the low `width` bytes of `value` in this layout's byte order.
    pub fn encode_into(&self, value: u64, width: usize, out: &mut Vec<u8>) {
        let le = value.to_le_bytes();
        if self.big_endian {
            out.extend(le[..width].iter().rev());
        } else {
            out.extend_from_slice(&le[..width]);
        }
    }

    /// Append an id, rejecting values that do not fit the id width.
    pub fn encode_id(&self, id: u64, out: &mut Vec<u8>) -> Result<(), EudoxusError> {
        if id > self.max_id() {
            return Err(EudoxusError::IdOverflow {
                id,
                width: self.id_width,
            });
        }
        self.encode_into(id, self.id_width(), out);
        Ok(())
    }
}

/// Parsed and validated image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub layout: Layout,
    pub no_advance_no_output: bool,
    pub num_nodes: u64,
    pub num_outputs: u64,
    pub data_length: u64,
    pub start_index: u64,
}

impl Header {
    /// Serialize the header into its 40-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut ints = Vec::with_capacity(32);
        for value in [
            self.num_nodes,
            self.num_outputs,
            self.data_length,
            self.start_index,
        ] {
            self.layout.encode_into(value, 8, &mut ints);
        }
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.version;
        out[1] = self.layout.id_width;
        out[2] = u8::from(self.layout.big_endian);
        out[3] = if self.no_advance_no_output {
            FLAG_NO_ADVANCE_NO_OUTPUT
        } else {
            0
        };
        out[8..].copy_from_slice(&ints);
        out
    }
}

/// Parses and validates the image header at the start of `data`.
///
/// The header must describe exactly `data`: its `data_length` has to equal the
/// buffer length and its start node has to lie past the header and inside the
/// buffer.
pub fn parse_header(data: &[u8]) -> Result<Header, EudoxusError> {
    if data.len() < HEADER_SIZE {
        return Err(EudoxusError::TooShort {
            expected: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let raw: RawHeader = bytemuck::pod_read_unaligned(&data[..HEADER_SIZE]);

    if raw.version != VERSION {
        return Err(EudoxusError::UnsupportedVersion(raw.version));
    }
    let big_endian = match raw.is_big_endian {
        0 => false,
        1 => true,
        other => return Err(EudoxusError::InvalidByteOrder(other)),
    };
    let layout = Layout::new(raw.id_width, big_endian)?;

    let header = Header {
        version: raw.version,
        layout,
        no_advance_no_output: raw.flags & FLAG_NO_ADVANCE_NO_OUTPUT != 0,
        num_nodes: layout.decode(&raw.num_nodes),
        num_outputs: layout.decode(&raw.num_outputs),
        data_length: layout.decode(&raw.data_length),
        start_index: layout.decode(&raw.start_index),
    };

    if header.data_length != data.len() as u64 {
        return Err(EudoxusError::LengthMismatch {
            declared: header.data_length,
            actual: data.len(),
        });
    }
    if header.start_index < HEADER_SIZE as u64 || header.start_index >= header.data_length {
        return Err(EudoxusError::InvalidStart(header.start_index));
    }

    Ok(header)
}
