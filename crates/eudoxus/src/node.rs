// Node headers and node-type dispatch.
//
// Every node starts with a one-byte header: bits 0-1 hold the type tag and
// bits 2-7 the type's own flag field. The driver only talks to `next` and
// `output` here; each encoding implements `NodeDecoder`.

use crate::execution::Cursor;
use crate::image::{Automaton, NodeId};
use crate::low::LowNode;
use crate::{Command, EudoxusError, NodeDecoder, Status};

const TYPE_MASK: u8 = 0x03;
const FLAGS_SHIFT: u8 = 2;

/// Decoded node header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub node_type: u8,
    pub flags: u8,
}

impl NodeHeader {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            node_type: byte & TYPE_MASK,
            flags: byte >> FLAGS_SHIFT,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.node_type & TYPE_MASK) | (self.flags << FLAGS_SHIFT)
    }
}

/// Node encodings known to this engine.
///
/// The two-bit tag leaves room for denser encodings of high out-degree
/// nodes; unknown tags are rejected at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeType {
    Low = 0,
}

impl TryFrom<u8> for NodeType {
    type Error = EudoxusError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(NodeType::Low),
            other => Err(EudoxusError::UnknownNodeType(other)),
        }
    }
}

/// A decoded node of any known type.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Low(LowNode<'a>),
}

impl<'a> Node<'a> {
    pub fn decode(image: &'a Automaton, id: NodeId) -> Result<Self, EudoxusError> {
        let header = NodeHeader::from_byte(image.byte(id.0)?);
        match NodeType::try_from(header.node_type)? {
            NodeType::Low => Ok(Node::Low(LowNode::decode(image, id, header.flags)?)),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Low(_) => NodeType::Low,
        }
    }

    fn decoder(&self) -> &dyn NodeDecoder {
        match self {
            Node::Low(node) => node,
        }
    }
}

impl NodeDecoder for Node<'_> {
    fn next(&self, input: &[u8], cursor: &mut Cursor) -> Result<Status, EudoxusError> {
        self.decoder().next(input, cursor)
    }

    fn output(&self, emit: &mut dyn FnMut(&[u8]) -> Command) -> Result<Status, EudoxusError> {
        self.decoder().output(emit)
    }
}

/// Advance `cursor` by one step from its current node.
///
/// A next function may only report [`Status::Ok`] or [`Status::End`] (or an
/// error). Anything else means the decoder is broken and is promoted to
/// [`EudoxusError::Insane`].
pub fn next(image: &Automaton, input: &[u8], cursor: &mut Cursor) -> Result<Status, EudoxusError> {
    let node = Node::decode(image, cursor.node)?;
    check_next(node.next(input, cursor)?)
}

/// Deliver the outputs of node `id` to `emit`.
///
/// An output function may report [`Status::Ok`], [`Status::Stop`] or
/// [`Status::Error`]; [`Status::End`] is promoted to
/// [`EudoxusError::Insane`].
pub fn output(
    image: &Automaton,
    id: NodeId,
    emit: &mut dyn FnMut(&[u8]) -> Command,
) -> Result<Status, EudoxusError> {
    let node = Node::decode(image, id)?;
    check_output(node.output(emit)?)
}

fn check_next(status: Status) -> Result<Status, EudoxusError> {
    match status {
        Status::Ok | Status::End => Ok(status),
        Status::Stop | Status::Error => Err(EudoxusError::Insane(format!(
            "nonsense from next function: {status:?}."
        ))),
    }
}

fn check_output(status: Status) -> Result<Status, EudoxusError> {
    match status {
        Status::Ok | Status::Stop | Status::Error => Ok(status),
        Status::End => Err(EudoxusError::Insane(
            "nonsense from output function: End.".to_string(),
        )),
    }
}
