// Execution state and driver.
//
// An `ExecutionState` is the per-stream half of the engine: it remembers the
// node the stream is parked on between `execute` calls, so input can arrive
// in arbitrary chunks. The automaton itself is only ever borrowed.

use tracing::{debug, error, trace, warn};

use crate::image::{Automaton, NodeId};
use crate::{Command, ErrorKind, EudoxusError, Status, node};

/// Position of execution within the chunk currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Current node.
    pub node: NodeId,
    /// Index of the next unconsumed byte of the chunk.
    pub position: usize,
    /// Bytes of the chunk not yet consumed.
    pub remaining: usize,
}

/// An output delivered to the callback.
#[derive(Debug, Clone, Copy)]
pub struct Output<'a> {
    payload: &'a [u8],
    position: u64,
    rest: &'a [u8],
}

impl<'a> Output<'a> {
    /// Payload bytes of the output record.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Stream offset at which the output fired: the number of input bytes
    /// consumed since the state was created or reset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Unconsumed input of the current chunk, starting at the current byte.
    pub fn rest(&self) -> &'a [u8] {
        self.rest
    }
}

/// Input left unconsumed by a halted call.
#[derive(Debug, Clone, Default)]
enum Leftover {
    #[default]
    None,
    /// Bytes after a callback-requested halt, resumed by a replay.
    Input(Vec<u8>),
    /// The automaton itself halted. Running the same node over the same
    /// byte reproduces `result`, so only the byte count is kept.
    Halt {
        remaining: usize,
        result: Result<Status, EudoxusError>,
    },
}

impl Leftover {
    fn remaining(&self) -> usize {
        match self {
            Leftover::None => 0,
            Leftover::Input(bytes) => bytes.len(),
            Leftover::Halt { remaining, .. } => *remaining,
        }
    }

    fn input(&self) -> &[u8] {
        match self {
            Leftover::Input(bytes) => bytes,
            _ => &[],
        }
    }

    fn halt_result(&self) -> Option<Result<Status, EudoxusError>> {
        match self {
            Leftover::Halt { result, .. } => Some(result.clone()),
            _ => None,
        }
    }

    fn into_input(self) -> Vec<u8> {
        match self {
            Leftover::Input(bytes) => bytes,
            _ => Vec::new(),
        }
    }
}

/// Mutable per-stream execution state.
///
/// Created per input stream, fed with [`execute`](Self::execute) any number
/// of times and dropped at stream end. Only one thread may use a state at a
/// time; many states may share one [`Automaton`].
pub struct ExecutionState<'a, F> {
    automaton: &'a Automaton,
    node: NodeId,
    callback: Option<F>,
    primed: bool,
    position: u64,
    leftover: Leftover,
    last_error: Option<EudoxusError>,
}

impl<F> std::fmt::Debug for ExecutionState<'_, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionState")
            .field("node", &self.node)
            .field("primed", &self.primed)
            .field("position", &self.position)
            .field("remaining", &self.leftover.remaining())
            .field("delivers_outputs", &self.callback.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl<'a, F> ExecutionState<'a, F>
where
    F: FnMut(&Output<'_>) -> Command,
{
    /// Create a state parked on the automaton's start node.
    ///
    /// `callback` receives every output reached during execution; the
    /// environment it captures plays the role of the callback context.
    pub fn new(automaton: &'a Automaton, callback: F) -> Self {
        Self::with_optional_callback(automaton, Some(callback))
    }

    /// Like [`new`](Self::new), but without a callback no output record is
    /// decoded at all, so a malformed output chain goes unnoticed.
    pub fn with_optional_callback(automaton: &'a Automaton, callback: Option<F>) -> Self {
        Self {
            automaton,
            node: automaton.start(),
            callback,
            primed: false,
            position: 0,
            leftover: Leftover::None,
            last_error: None,
        }
    }

    /// Node the stream is parked on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Input bytes consumed since creation or the last reset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes of the last chunk left unconsumed by a halted call.
    pub fn remaining(&self) -> usize {
        self.leftover.remaining()
    }

    /// Whether any input has been fed since creation or the last reset.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Error of the most recent `execute` call, if it failed.
    pub fn last_error(&self) -> Option<&EudoxusError> {
        self.last_error.as_ref()
    }

    /// Return to the start node as if freshly created.
    ///
    /// This is how a caller re-primes a state after a non-OK result.
    pub fn reset(&mut self) {
        self.node = self.automaton.start();
        self.primed = false;
        self.position = 0;
        self.leftover = Leftover::None;
        self.last_error = None;
    }

    /// Execute the automaton over `input`.
    ///
    /// `Some(chunk)` processes a new chunk from the current node, discarding
    /// anything a previous halted call left unconsumed. `None` is a replay
    /// request: the outputs of the current node are delivered again, then any
    /// input left over by a halted call is processed.
    ///
    /// Returns [`Status::Ok`] once the input is exhausted, [`Status::End`] if
    /// the automaton has no transition for the current byte, or the callback's
    /// [`Status::Stop`]/[`Status::Error`]. Errors are also recorded in
    /// [`last_error`](Self::last_error).
    pub fn execute(&mut self, input: Option<&[u8]>) -> Result<Status, EudoxusError> {
        self.last_error = None;

        let result = self.run(input);
        match &result {
            Ok(Status::Ok) => {}
            Ok(status) => debug!(?status, position = self.position, "execution halted"),
            Err(e) => {
                match e.kind() {
                    ErrorKind::Invalid => warn!(error = %e, node = self.node.0, "invalid automaton"),
                    ErrorKind::Insane => error!(error = %e, node = self.node.0, "eudoxus insanity"),
                }
                self.last_error = Some(e.clone());
            }
        }
        result
    }

    fn run(&mut self, input: Option<&[u8]>) -> Result<Status, EudoxusError> {
        let retained: Vec<u8>;
        let chunk: &[u8] = match input {
            None => {
                trace!(node = self.node.0, "replaying outputs");
                let leftover = std::mem::take(&mut self.leftover);
                let replayed = self.emit(self.node, leftover.input());
                if !matches!(replayed, Ok(Status::Ok)) {
                    self.leftover = leftover;
                    return replayed;
                }
                if let Some(result) = leftover.halt_result() {
                    self.leftover = leftover;
                    return result;
                }
                retained = leftover.into_input();
                &retained
            }
            Some(bytes) => {
                self.leftover = Leftover::None;
                self.primed = true;
                bytes
            }
        };

        if !self.primed {
            return Ok(Status::Ok);
        }

        let mut cursor = Cursor {
            node: self.node,
            position: 0,
            remaining: chunk.len(),
        };
        let result = self.drive(chunk, &mut cursor);
        self.node = cursor.node;
        if cursor.remaining > 0 {
            self.leftover = match result {
                Ok(Status::Stop | Status::Error) => Leftover::Input(chunk[cursor.position..].to_vec()),
                _ => Leftover::Halt {
                    remaining: cursor.remaining,
                    result: result.clone(),
                },
            };
        }
        result
    }

    fn drive(&mut self, chunk: &[u8], cursor: &mut Cursor) -> Result<Status, EudoxusError> {
        let automaton = self.automaton;
        // A deterministic walk that revisits a node on the same byte never
        // advances, and there are fewer nodes than image bytes.
        let mut stalled = 0usize;
        while cursor.remaining > 0 {
            let before = cursor.remaining;
            let status = node::next(automaton, chunk, cursor)?;
            self.position += (before - cursor.remaining) as u64;
            if status != Status::Ok {
                return Ok(status);
            }

            if cursor.remaining == before {
                stalled += 1;
                if stalled > automaton.len() {
                    return Err(EudoxusError::NonAdvancingCycle(cursor.node.0));
                }
                if automaton.no_advance_no_output() {
                    continue;
                }
            } else {
                stalled = 0;
            }
            let status = self.emit(cursor.node, &chunk[cursor.position..])?;
            if status != Status::Ok {
                return Ok(status);
            }
        }
        Ok(Status::Ok)
    }

    fn emit(&mut self, id: NodeId, rest: &[u8]) -> Result<Status, EudoxusError> {
        let Some(callback) = self.callback.as_mut() else {
            return Ok(Status::Ok);
        };
        let position = self.position;
        let mut deliver = |payload: &[u8]| {
            callback(&Output {
                payload,
                position,
                rest,
            })
        };
        node::output(self.automaton, id, &mut deliver)
    }
}
