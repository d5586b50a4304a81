// Low out-degree nodes: a short, unsorted edge list scanned linearly.

use crate::execution::Cursor;
use crate::image::{Automaton, NodeId, OutputId};
use crate::output;
use crate::vls::VlsReader;
use crate::{Command, EudoxusError, NodeDecoder, Status};

/// Flag bits of a low-degree node (bit positions within the node's flag field).
pub const HAS_OUTPUT: u8 = 0;
pub const HAS_NONADVANCING: u8 = 1;
pub const HAS_DEFAULT: u8 = 2;
pub const ADVANCE_ON_DEFAULT: u8 = 3;

/// Decoded flag field of a low-degree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LowFlags {
    pub has_output: bool,
    pub has_nonadvancing: bool,
    pub has_default: bool,
    pub advance_on_default: bool,
}

impl LowFlags {
    pub fn from_bits(flags: u8) -> Self {
        let bit = |n: u8| flags & (1 << n) != 0;
        Self {
            has_output: bit(HAS_OUTPUT),
            has_nonadvancing: bit(HAS_NONADVANCING),
            has_default: bit(HAS_DEFAULT),
            advance_on_default: bit(ADVANCE_ON_DEFAULT),
        }
    }

    pub fn to_bits(self) -> u8 {
        u8::from(self.has_output) << HAS_OUTPUT
            | u8::from(self.has_nonadvancing) << HAS_NONADVANCING
            | u8::from(self.has_default) << HAS_DEFAULT
            | u8::from(self.advance_on_default) << ADVANCE_ON_DEFAULT
    }
}

/// Number of bytes in the advance bitmap of a node with `out_degree` edges.
#[inline]
pub fn bitmap_len(out_degree: usize) -> usize {
    out_degree.div_ceil(8)
}

/// A low-degree node decoded from an image.
///
/// Layout after the one-byte node header:
///
/// ```text
/// out_degree: u8
/// [first_output: id]                      if has_output
/// [default_node: id]                      if has_default
/// [advance bitmap: ceil(out_degree/8)]    if has_nonadvancing
/// edges: out_degree x (c: u8, next_node: id)
/// ```
///
/// Bit `i` of the advance bitmap (bit `i % 8` of byte `i / 8`) is set if
/// taking edge `i` consumes the input byte. Without a bitmap every edge
/// advances.
#[derive(Debug, Clone, Copy)]
pub struct LowNode<'a> {
    image: &'a Automaton,
    id: NodeId,
    flags: LowFlags,
    out_degree: usize,
    first_output: Option<u64>,
    default_node: Option<u64>,
    advance: Option<&'a [u8]>,
    edges: &'a [u8],
}

impl<'a> LowNode<'a> {
    /// Decode the node at `id`, whose header byte carried `flags`.
    pub fn decode(image: &'a Automaton, id: NodeId, flags: u8) -> Result<Self, EudoxusError> {
        let flags = LowFlags::from_bits(flags);
        let out_degree = image.byte(id.0 + 1)? as usize;

        let mut vls = VlsReader::new(image, id.0 + 2);
        let first_output = vls.id_if(flags.has_output)?;
        let default_node = vls.id_if(flags.has_default)?;
        let advance = vls.array_if(bitmap_len(out_degree), flags.has_nonadvancing)?;
        let edges = vls.finish(out_degree, 1 + image.layout().id_width())?;

        Ok(Self {
            image,
            id,
            flags,
            out_degree,
            first_output,
            default_node,
            advance,
            edges,
        })
    }

    pub fn flags(&self) -> LowFlags {
        self.flags
    }

    pub fn out_degree(&self) -> usize {
        self.out_degree
    }

    /// Edges in stored order as `(byte, next_node)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (u8, NodeId)> + '_ {
        let layout = self.image.layout();
        self.edges
            .chunks_exact(1 + layout.id_width())
            .map(move |edge| (edge[0], NodeId(layout.decode(&edge[1..]))))
    }

    /// Whether taking edge `index` consumes the input byte.
    pub fn edge_advances(&self, index: usize) -> bool {
        match self.advance {
            Some(bitmap) => bitmap[index / 8] & (1 << (index % 8)) != 0,
            None => true,
        }
    }

    /// Resolve the transition for byte `c`: the target id (0 if none) and
    /// whether the transition advances.
    pub fn transition(&self, c: u8) -> (u64, bool) {
        match self.edges().enumerate().find(|(_, (byte, _))| *byte == c) {
            Some((i, (_, target))) => (target.0, self.edge_advances(i)),
            None => match self.default_node {
                Some(default) => (default, self.flags.advance_on_default),
                None => (0, true),
            },
        }
    }
}

impl NodeDecoder for LowNode<'_> {
    fn next(&self, input: &[u8], cursor: &mut Cursor) -> Result<Status, EudoxusError> {
        let Some(&c) = input.get(cursor.position) else {
            return Err(EudoxusError::Insane(format!(
                "cursor at {} is past the end of a {} byte chunk.",
                cursor.position,
                input.len()
            )));
        };

        let (next, advance) = self.transition(c);
        if next == 0 {
            return Ok(Status::End);
        }

        if advance {
            cursor.position += 1;
            cursor.remaining -= 1;
        }
        cursor.node = NodeId(next);

        Ok(Status::Ok)
    }

    fn output(&self, emit: &mut dyn FnMut(&[u8]) -> Command) -> Result<Status, EudoxusError> {
        if !self.flags.has_output {
            return Ok(Status::Ok);
        }
        match self.first_output {
            Some(first) if first != 0 => output::walk_chain(self.image, OutputId(first), emit),
            _ => Err(EudoxusError::MissingOutput(self.id.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Edge, ImageBuilder, LowNodeSpec};
    use crate::node::NodeHeader;

    #[test]
    fn flag_bits_round_trip() {
        let flags = LowFlags {
            has_output: true,
            has_nonadvancing: false,
            has_default: true,
            advance_on_default: true,
        };
        assert_eq!(flags.to_bits(), 0b1101);
        assert_eq!(LowFlags::from_bits(0b1101), flags);
    }

    #[test]
    fn bitmap_length_rounds_up() {
        assert_eq!(bitmap_len(0), 0);
        assert_eq!(bitmap_len(1), 1);
        assert_eq!(bitmap_len(8), 1);
        assert_eq!(bitmap_len(9), 2);
        assert_eq!(bitmap_len(255), 32);
    }

    fn decode_start(a: &Automaton) -> LowNode<'_> {
        let header = NodeHeader::from_byte(a.byte(a.start().0).unwrap());
        LowNode::decode(a, a.start(), header.flags).unwrap()
    }

    #[test]
    fn decodes_fields_in_order() {
        let mut b = ImageBuilder::new();
        let out = b.add_output(b"o", None);
        let root = b.reserve_node();
        let leaf = b.add_node(LowNodeSpec::new());
        b.define_node(
            root,
            LowNodeSpec::new()
                .with_output(out)
                .with_default(leaf, false)
                .with_edge(Edge::new(b'a', leaf))
                .with_edge(Edge::new(b'b', root).non_advancing()),
        );
        let built = b.build().unwrap();
        let a = Automaton::from_bytes(built.as_bytes()).unwrap();
        let node = decode_start(&a);

        assert_eq!(node.out_degree(), 2);
        assert!(node.flags().has_output);
        assert!(node.flags().has_nonadvancing);
        assert!(node.flags().has_default);
        assert!(!node.flags().advance_on_default);
        assert_eq!(node.first_output, Some(built.output_id(out).0));
        assert_eq!(node.default_node, Some(built.node_id(leaf).0));

        let edges: Vec<_> = node.edges().collect();
        assert_eq!(
            edges,
            vec![(b'a', built.node_id(leaf)), (b'b', built.node_id(root))]
        );
        assert!(node.edge_advances(0));
        assert!(!node.edge_advances(1));

        assert_eq!(node.transition(b'a'), (built.node_id(leaf).0, true));
        assert_eq!(node.transition(b'b'), (built.node_id(root).0, false));
        assert_eq!(node.transition(b'z'), (built.node_id(leaf).0, false));
    }

    #[test]
    fn ninth_edge_reads_second_bitmap_byte() {
        let mut b = ImageBuilder::new();
        let root = b.reserve_node();
        let leaf = b.add_node(LowNodeSpec::new());
        let mut spec = LowNodeSpec::new();
        for c in b'a'..=b'h' {
            spec = spec.with_edge(Edge::new(c, leaf));
        }
        b.define_node(root, spec.with_edge(Edge::new(b'i', leaf).non_advancing()));
        let built = b.build().unwrap();
        let a = Automaton::from_bytes(built.as_bytes()).unwrap();
        let node = decode_start(&a);

        assert_eq!(node.out_degree(), 9);
        assert!((0..8).all(|i| node.edge_advances(i)));
        assert!(!node.edge_advances(8));
        assert_eq!(node.transition(b'h'), (built.node_id(leaf).0, true));
        assert_eq!(node.transition(b'i'), (built.node_id(leaf).0, false));

        let mut cursor = Cursor {
            node: a.start(),
            position: 0,
            remaining: 1,
        };
        assert_eq!(node.next(b"i", &mut cursor).unwrap(), Status::Ok);
        assert_eq!(cursor.node, built.node_id(leaf));
        assert_eq!((cursor.position, cursor.remaining), (0, 1));
    }

    #[test]
    fn first_matching_edge_wins() {
        let mut b = ImageBuilder::new();
        let root = b.reserve_node();
        let first = b.add_node(LowNodeSpec::new());
        let second = b.add_node(LowNodeSpec::new());
        b.define_node(
            root,
            LowNodeSpec::new()
                .with_edge(Edge::new(b'x', first))
                .with_edge(Edge::new(b'x', second)),
        );
        let built = b.build().unwrap();
        let a = Automaton::from_bytes(built.as_bytes()).unwrap();
        assert_eq!(decode_start(&a).transition(b'x').0, built.node_id(first).0);
    }

    #[test]
    fn next_without_match_or_default_ends() {
        let mut b = ImageBuilder::new();
        let root = b.reserve_node();
        let other = b.add_node(LowNodeSpec::new());
        b.define_node(root, LowNodeSpec::new().with_edge(Edge::new(b'q', other)));
        let a = Automaton::from_bytes(b.build().unwrap().as_bytes()).unwrap();
        let node = decode_start(&a);

        let mut cursor = Cursor {
            node: a.start(),
            position: 0,
            remaining: 1,
        };
        assert_eq!(node.next(b"A", &mut cursor).unwrap(), Status::End);
        assert_eq!(cursor.node, a.start());
        assert_eq!(cursor.position, 0);
        assert_eq!(cursor.remaining, 1);
    }

    #[test]
    fn next_moves_cursor_only_when_advancing() {
        let mut b = ImageBuilder::new();
        let root = b.reserve_node();
        let hop = b.add_node(LowNodeSpec::new());
        let step = b.add_node(LowNodeSpec::new());
        b.define_node(
            root,
            LowNodeSpec::new()
                .with_edge(Edge::new(b'x', hop).non_advancing())
                .with_edge(Edge::new(b'y', step)),
        );
        let built = b.build().unwrap();
        let a = Automaton::from_bytes(built.as_bytes()).unwrap();
        let node = decode_start(&a);

        let mut cursor = Cursor {
            node: a.start(),
            position: 0,
            remaining: 2,
        };
        assert_eq!(node.next(b"xy", &mut cursor).unwrap(), Status::Ok);
        assert_eq!(cursor.node, built.node_id(hop));
        assert_eq!((cursor.position, cursor.remaining), (0, 2));

        let mut cursor = Cursor {
            node: a.start(),
            position: 1,
            remaining: 1,
        };
        assert_eq!(node.next(b"xy", &mut cursor).unwrap(), Status::Ok);
        assert_eq!(cursor.node, built.node_id(step));
        assert_eq!((cursor.position, cursor.remaining), (2, 0));
    }

    #[test]
    fn output_without_flag_is_noop() {
        let mut b = ImageBuilder::new();
        b.add_node(LowNodeSpec::new());
        let a = Automaton::from_bytes(b.build().unwrap().as_bytes()).unwrap();
        let mut calls = 0;
        let status = decode_start(&a)
            .output(&mut |_: &[u8]| {
                calls += 1;
                Command::Continue
            })
            .unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(calls, 0);
    }

    #[test]
    fn zero_first_output_is_invalid() {
        let mut b = ImageBuilder::new();
        let out = b.add_output(b"o", None);
        b.add_node(LowNodeSpec::new().with_output(out));
        let built = b.build().unwrap();
        let mut bytes = built.into_bytes();
        // first_output immediately follows the header and out_degree bytes.
        let at = 40 + 2;
        bytes[at..at + 4].fill(0);

        let a = Automaton::from_bytes(&bytes).unwrap();
        let err = decode_start(&a)
            .output(&mut |_: &[u8]| Command::Continue)
            .unwrap_err();
        assert_eq!(err, EudoxusError::MissingOutput(40));
    }
}
