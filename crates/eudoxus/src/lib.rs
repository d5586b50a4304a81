//! Eudoxus DFA execution engine.
//!
//! This crate runs precompiled, serialized deterministic automata over byte
//! streams. An automaton image is a flat, relocation-free byte buffer: nodes
//! and outputs refer to each other by byte offset ("id") from the start of the
//! image. Execution walks the image one input byte at a time and hands every
//! output attached to a reached node to a caller-supplied callback.
//!
//! # Architecture
//!
//! - [`format`] -- Image header parsing, id width and byte order
//! - [`image`] -- The [`Automaton`] arena and bounds-checked offset reads
//! - [`vls`] -- Variable-length record reader/writer
//! - [`node`] -- Node header decoding and node-type dispatch
//! - [`low`] -- Low out-degree node decoder
//! - [`output`] -- Output record decoding and output-chain walking
//! - [`execution`] -- Per-stream execution state and the execution driver
//! - [`builder`] -- Serializer for explicitly described images
//!
//! # Example
//!
//! ```
//! use eudoxus::builder::{Edge, ImageBuilder, LowNodeSpec};
//! use eudoxus::{Automaton, Command, ExecutionState, Status};
//!
//! let mut b = ImageBuilder::new();
//! let hit = b.add_output(b"hit", None);
//! let root = b.reserve_node();
//! let leaf = b.add_node(LowNodeSpec::new().with_output(hit).with_default(root, true));
//! b.define_node(root, LowNodeSpec::new().with_edge(Edge::new(b'a', leaf)).with_default(root, true));
//! let image = b.build().unwrap();
//!
//! let automaton = Automaton::from_bytes(image.as_bytes()).unwrap();
//! let mut hits = 0;
//! let mut state = ExecutionState::new(&automaton, |_: &eudoxus::Output<'_>| {
//!     hits += 1;
//!     Command::Continue
//! });
//! assert_eq!(state.execute(Some(b"banana")).unwrap(), Status::Ok);
//! drop(state);
//! assert_eq!(hits, 3);
//! ```

pub mod builder;
pub mod execution;
pub mod format;
pub mod image;
pub mod low;
pub mod node;
pub mod output;
pub mod vls;

use std::path::PathBuf;

pub use execution::{ExecutionState, Output};
pub use image::{Automaton, NodeId, OutputId};

/// Error type for image loading and execution.
///
/// Every variant except [`EudoxusError::Insane`] is an "invalid" error: a
/// malformed image or invalid arguments. `Insane` signals a violated internal
/// invariant and should always be reported as a bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EudoxusError {
    #[error("image too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unsupported image version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid id width {0}: must be 1, 2, 4 or 8")]
    InvalidIdWidth(u8),
    #[error("invalid byte order marker {0}")]
    InvalidByteOrder(u8),
    #[error("image length mismatch: header declares {declared} bytes, buffer has {actual}")]
    LengthMismatch { declared: u64, actual: usize },
    #[error("invalid start node id {0}")]
    InvalidStart(u64),
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("unknown node type: {0}")]
    UnknownNodeType(u8),
    #[error("reference to {len} bytes at offset {offset} is outside the image ({size} bytes)")]
    OutOfBounds { offset: u64, len: usize, size: usize },
    #[error("node {0} is flagged as having output but its first output id is 0")]
    MissingOutput(u64),
    #[error("id {id} does not fit in {width} bytes")]
    IdOverflow { id: u64, width: u8 },
    #[error("out degree {0} exceeds 255")]
    TooManyEdges(usize),
    #[error("output payload of {0} bytes does not fit a u32 length")]
    PayloadTooLarge(usize),
    #[error("output chain starting at {0} loops")]
    OutputCycle(u64),
    #[error("non-advancing transitions from node {0} loop without consuming input")]
    NonAdvancingCycle(u64),
    #[error("insanity: {0} Please report as bug.")]
    Insane(String),
}

/// Coarse classification of an [`EudoxusError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed automaton or invalid arguments (EINVAL).
    Invalid,
    /// Internal invariant violated (EINSANE).
    Insane,
}

impl EudoxusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EudoxusError::Insane(_) => ErrorKind::Insane,
            _ => ErrorKind::Invalid,
        }
    }
}

/// Instruction returned by the output callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Deliver the next output and keep executing.
    Continue,
    /// Halt execution; surfaces as [`Status::Stop`].
    Stop,
    /// Halt execution; surfaces as [`Status::Error`].
    Error,
}

/// Non-error outcome of an execution step or an `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// All supplied input was consumed.
    Ok,
    /// No transition exists from the current node for the current byte.
    /// This is a normal termination, not an error.
    End,
    /// The callback returned [`Command::Stop`].
    Stop,
    /// The callback returned [`Command::Error`].
    Error,
}

impl From<Command> for Status {
    fn from(command: Command) -> Self {
        match command {
            Command::Continue => Status::Ok,
            Command::Stop => Status::Stop,
            Command::Error => Status::Error,
        }
    }
}

/// Trait implemented by every node encoding.
///
/// A decoder reports its result as a raw [`Status`]; the dispatch layer in
/// [`node`] decides which statuses are legal for which operation, so a new
/// encoding can be added without touching the execution driver.
pub trait NodeDecoder {
    /// Follow the transition for `input[cursor.position]`.
    ///
    /// On success the cursor's node is replaced by the transition target and,
    /// if the transition advances, the cursor moves past the byte. Returns
    /// [`Status::End`] if the node has no transition for the byte.
    fn next(&self, input: &[u8], cursor: &mut execution::Cursor) -> Result<Status, EudoxusError>;

    /// Deliver every output attached to the node to `emit`, in chain order.
    fn output(&self, emit: &mut dyn FnMut(&[u8]) -> Command) -> Result<Status, EudoxusError>;
}
