// Image serializer for explicitly described automata.
//
// This lays out nodes and output chains exactly as the engine reads them. It
// does not compile patterns: callers describe every node and edge.

use crate::format::{HEADER_SIZE, Header, Layout, VERSION};
use crate::image::{NodeId, OutputId};
use crate::low::{LowFlags, bitmap_len};
use crate::node::{NodeHeader, NodeType};
use crate::vls::VlsWriter;
use crate::EudoxusError;

/// Builder-local handle to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

/// Builder-local handle to an output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRef(usize);

/// One edge of a low-degree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub byte: u8,
    pub target: NodeRef,
    pub advance: bool,
}

impl Edge {
    /// An advancing edge on `byte` to `target`.
    pub fn new(byte: u8, target: NodeRef) -> Self {
        Self {
            byte,
            target,
            advance: true,
        }
    }

    /// Make the edge leave the input byte unconsumed.
    pub fn non_advancing(mut self) -> Self {
        self.advance = false;
        self
    }
}

/// Description of a low-degree node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LowNodeSpec {
    pub output: Option<OutputRef>,
    pub default: Option<(NodeRef, bool)>,
    pub edges: Vec<Edge>,
}

impl LowNodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: OutputRef) -> Self {
        self.output = Some(output);
        self
    }

    /// Default transition to `target`, consuming the byte if `advance`.
    pub fn with_default(mut self, target: NodeRef, advance: bool) -> Self {
        self.default = Some((target, advance));
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    fn flags(&self) -> LowFlags {
        LowFlags {
            has_output: self.output.is_some(),
            has_nonadvancing: self.edges.iter().any(|e| !e.advance),
            has_default: self.default.is_some(),
            advance_on_default: self.default.is_some_and(|(_, advance)| advance),
        }
    }

    fn encoded_len(&self, layout: Layout) -> usize {
        let flags = self.flags();
        let id = layout.id_width();
        2 + usize::from(flags.has_output) * id
            + usize::from(flags.has_default) * id
            + if flags.has_nonadvancing {
                bitmap_len(self.edges.len())
            } else {
                0
            }
            + self.edges.len() * (1 + id)
    }
}

#[derive(Debug, Clone)]
struct OutputSpec {
    payload: Vec<u8>,
    next: Option<OutputRef>,
}

impl OutputSpec {
    fn encoded_len(&self, layout: Layout) -> usize {
        4 + self.payload.len() + layout.id_width()
    }
}

/// Serializer for automaton images.
///
/// Nodes are laid out right after the header in the order they were
/// reserved, followed by outputs in the order they were added. The start node
/// is the first node reserved unless [`set_start`](Self::set_start) says
/// otherwise. A reserved node that is never defined is written as a node with
/// no edges, outputs or default.
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    layout: Layout,
    no_advance_no_output: bool,
    nodes: Vec<LowNodeSpec>,
    outputs: Vec<OutputSpec>,
    start: Option<NodeRef>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn no_advance_no_output(mut self, enabled: bool) -> Self {
        self.no_advance_no_output = enabled;
        self
    }

    /// Reserve a node slot so it can be referenced before it is defined.
    pub fn reserve_node(&mut self) -> NodeRef {
        self.nodes.push(LowNodeSpec::default());
        NodeRef(self.nodes.len() - 1)
    }

    pub fn define_node(&mut self, node: NodeRef, spec: LowNodeSpec) {
        self.nodes[node.0] = spec;
    }

    pub fn add_node(&mut self, spec: LowNodeSpec) -> NodeRef {
        let node = self.reserve_node();
        self.define_node(node, spec);
        node
    }

    pub fn set_start(&mut self, node: NodeRef) {
        self.start = Some(node);
    }

    pub fn add_output(&mut self, payload: impl AsRef<[u8]>, next: Option<OutputRef>) -> OutputRef {
        self.outputs.push(OutputSpec {
            payload: payload.as_ref().to_vec(),
            next,
        });
        OutputRef(self.outputs.len() - 1)
    }

    /// Add a chain of outputs delivered in the given order; returns its head.
    pub fn add_output_chain<P: AsRef<[u8]>>(&mut self, payloads: &[P]) -> Option<OutputRef> {
        payloads
            .iter()
            .rev()
            .fold(None, |next, payload| Some(self.add_output(payload, next)))
    }

    /// Serialize the image.
    pub fn build(&self) -> Result<BuiltImage, EudoxusError> {
        let layout = self.layout;

        let mut offset = HEADER_SIZE as u64;
        let mut node_ids = Vec::with_capacity(self.nodes.len());
        for spec in &self.nodes {
            if spec.edges.len() > usize::from(u8::MAX) {
                return Err(EudoxusError::TooManyEdges(spec.edges.len()));
            }
            node_ids.push(NodeId(offset));
            offset += spec.encoded_len(layout) as u64;
        }
        let mut output_ids = Vec::with_capacity(self.outputs.len());
        for spec in &self.outputs {
            payload_length(spec.payload.len())?;
            output_ids.push(OutputId(offset));
            offset += spec.encoded_len(layout) as u64;
        }

        let start = match self.start.or_else(|| (!self.nodes.is_empty()).then_some(NodeRef(0))) {
            Some(node) => node_ids[node.0].0,
            None => return Err(EudoxusError::InvalidStart(0)),
        };

        let header = Header {
            version: VERSION,
            layout,
            no_advance_no_output: self.no_advance_no_output,
            num_nodes: self.nodes.len() as u64,
            num_outputs: self.outputs.len() as u64,
            data_length: offset,
            start_index: start,
        };
        let mut bytes = Vec::with_capacity(offset as usize);
        bytes.extend_from_slice(&header.to_bytes());

        for spec in &self.nodes {
            bytes.extend(encode_low_node(spec, layout, &node_ids, &output_ids)?);
        }
        for spec in &self.outputs {
            let mut w = VlsWriter::new();
            w.u32_if(layout, payload_length(spec.payload.len())?, true)
                .bytes_if(&spec.payload, true);
            let next = spec.next.map_or(0, |o| output_ids[o.0].0);
            w.id_if(layout, next, true)?;
            bytes.extend(w.into_bytes());
        }

        Ok(BuiltImage {
            bytes,
            node_ids,
            output_ids,
        })
    }
}

/// On-disk length field for a payload of `len` bytes.
fn payload_length(len: usize) -> Result<u32, EudoxusError> {
    u32::try_from(len).map_err(|_| EudoxusError::PayloadTooLarge(len))
}

fn encode_low_node(
    spec: &LowNodeSpec,
    layout: Layout,
    node_ids: &[NodeId],
    output_ids: &[OutputId],
) -> Result<Vec<u8>, EudoxusError> {
    let flags = spec.flags();
    let header = NodeHeader {
        node_type: NodeType::Low as u8,
        flags: flags.to_bits(),
    };

    let mut bitmap = vec![0u8; bitmap_len(spec.edges.len())];
    for (i, edge) in spec.edges.iter().enumerate() {
        if edge.advance {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }

    let mut w = VlsWriter::new();
    w.bytes_if(&[header.to_byte(), spec.edges.len() as u8], true);
    w.id_if(layout, spec.output.map_or(0, |o| output_ids[o.0].0), flags.has_output)?;
    w.id_if(layout, spec.default.map_or(0, |(n, _)| node_ids[n.0].0), flags.has_default)?;
    w.bytes_if(&bitmap, flags.has_nonadvancing);
    for edge in &spec.edges {
        w.bytes_if(&[edge.byte], true);
        w.id_if(layout, node_ids[edge.target.0].0, true)?;
    }
    Ok(w.into_bytes())
}

/// Result of [`ImageBuilder::build`]: the image bytes plus the id assigned
/// to every node and output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    bytes: Vec<u8>,
    node_ids: Vec<NodeId>,
    output_ids: Vec<OutputId>,
}

impl BuiltImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn node_id(&self, node: NodeRef) -> NodeId {
        self.node_ids[node.0]
    }

    pub fn output_id(&self, output: OutputRef) -> OutputId {
        self.output_ids[output.0]
    }
}
