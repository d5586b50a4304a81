// FFI functions are inherently unsafe: callers must ensure pointer validity.
// Safety contracts are documented per-function in the public API comments.
#![allow(clippy::missing_safety_doc)]

// eudoxus-ffi: C-compatible FFI layer for the Eudoxus engine.
//
// Memory management rules:
// - Opaque `EudoxusAutomaton` pointer: created by `eudoxus_create`, freed by
//   `eudoxus_destroy`. The image bytes are copied; the caller's buffer may be
//   released after creation.
// - Opaque `EudoxusState` pointer: created by `eudoxus_create_state`, freed by
//   `eudoxus_destroy_state`. A state borrows its automaton, so every state
//   must be destroyed before the automaton.
// - Returned strings: caller must free with `eudoxus_free_str`.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;
use std::slice;

use eudoxus::{Automaton, Command, ErrorKind, EudoxusError, ExecutionState, Output, Status};
use tracing::warn;

// ── Result and command codes ────────────────────────────────────

pub const EUDOXUS_OK: c_int = 0;
pub const EUDOXUS_STOP: c_int = 1;
pub const EUDOXUS_ERROR: c_int = 2;
pub const EUDOXUS_END: c_int = 3;
pub const EUDOXUS_EINVAL: c_int = 4;
pub const EUDOXUS_EINSANE: c_int = 5;

pub const EUDOXUS_CMD_CONTINUE: c_int = 0;
pub const EUDOXUS_CMD_STOP: c_int = 1;
pub const EUDOXUS_CMD_ERROR: c_int = 2;

/// Output callback.
///
/// Receives the payload pointer and length, a pointer to the current byte of
/// the input chunk (one past the end once the chunk is exhausted) and the
/// context pointer given to `eudoxus_create_state`. Returns a command code.
pub type EudoxusCallback =
    extern "C" fn(payload: *const u8, length: usize, input: *const u8, ctx: *mut c_void) -> c_int;

fn status_code(status: Status) -> c_int {
    match status {
        Status::Ok => EUDOXUS_OK,
        Status::Stop => EUDOXUS_STOP,
        Status::Error => EUDOXUS_ERROR,
        Status::End => EUDOXUS_END,
    }
}

fn error_code(error: &EudoxusError) -> c_int {
    match error.kind() {
        ErrorKind::Invalid => EUDOXUS_EINVAL,
        ErrorKind::Insane => EUDOXUS_EINSANE,
    }
}

/// Map a callback return value to a command. Unknown values are an error.
fn command(code: c_int) -> Command {
    match code {
        EUDOXUS_CMD_CONTINUE => Command::Continue,
        EUDOXUS_CMD_STOP => Command::Stop,
        other => {
            if other != EUDOXUS_CMD_ERROR {
                warn!(code = other, "unknown callback command treated as error");
            }
            Command::Error
        }
    }
}

// ── Automaton lifecycle ─────────────────────────────────────────

/// Opaque automaton handle.
pub struct EudoxusAutomaton {
    automaton: Automaton,
}

/// Load an automaton from an image of `len` bytes at `data`.
///
/// Returns an opaque pointer on success, NULL on failure.
/// On failure, if `error_out` is non-NULL, it receives a heap-allocated error
/// string that the caller must free with `eudoxus_free_str`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_create(
    data: *const u8,
    len: usize,
    error_out: *mut *mut c_char,
) -> *mut EudoxusAutomaton {
    if data.is_null() || len == 0 {
        set_error(error_out, "image data is null or empty");
        return ptr::null_mut();
    }

    let bytes = unsafe { slice::from_raw_parts(data, len) };
    match Automaton::from_bytes(bytes) {
        Ok(automaton) => Box::into_raw(Box::new(EudoxusAutomaton { automaton })),
        Err(e) => {
            set_error(error_out, &e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an automaton created by `eudoxus_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_destroy(automaton: *mut EudoxusAutomaton) {
    if !automaton.is_null() {
        drop(unsafe { Box::from_raw(automaton) });
    }
}

// ── Execution state ─────────────────────────────────────────────

struct CallbackCtx {
    callback: EudoxusCallback,
    ctx: *mut c_void,
}

impl CallbackCtx {
    fn call(&mut self, o: &Output<'_>) -> Command {
        let payload = o.payload();
        let rest = o.rest();
        // `rest` starts at the current byte, or one past the end of the
        // chunk when it is exhausted. During a replay it points into the
        // state's own copy of the leftover input.
        command((self.callback)(payload.as_ptr(), payload.len(), rest.as_ptr(), self.ctx))
    }
}

type StateInner = ExecutionState<'static, Box<dyn FnMut(&Output<'_>) -> Command>>;

/// Opaque execution state handle.
pub struct EudoxusState {
    inner: StateInner,
}

/// Create an execution state parked on the automaton's start node.
///
/// `callback` may be NULL, in which case output records are never read, so
/// a malformed output chain is not reported. `ctx` is passed through to
/// every callback invocation unchanged.
///
/// The state borrows `automaton`: it must be destroyed with
/// `eudoxus_destroy_state` before `eudoxus_destroy` is called on the
/// automaton. Returns NULL if `automaton` is NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_create_state(
    automaton: *const EudoxusAutomaton,
    callback: Option<EudoxusCallback>,
    ctx: *mut c_void,
) -> *mut EudoxusState {
    // SAFETY: the caller guarantees the automaton outlives the state.
    let handle: Option<&'static EudoxusAutomaton> = unsafe { automaton.as_ref() };
    let Some(handle) = handle else {
        return ptr::null_mut();
    };
    let callback = callback.map(|callback| {
        let mut cb = CallbackCtx { callback, ctx };
        Box::new(move |o: &Output<'_>| cb.call(o)) as Box<dyn FnMut(&Output<'_>) -> Command>
    });
    let inner = ExecutionState::with_optional_callback(&handle.automaton, callback);
    Box::into_raw(Box::new(EudoxusState { inner }))
}

/// Free a state created by `eudoxus_create_state`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_destroy_state(state: *mut EudoxusState) {
    if !state.is_null() {
        drop(unsafe { Box::from_raw(state) });
    }
}

/// Execute the automaton over `len` bytes at `input`.
///
/// A NULL `input` is a replay request: the outputs of the current node are
/// delivered again and any input left by a halted call is resumed. Returns
/// one of the `EUDOXUS_*` result codes; `EUDOXUS_EINVAL` if `state` is NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_execute(
    state: *mut EudoxusState,
    input: *const u8,
    len: usize,
) -> c_int {
    let Some(state) = (unsafe { state.as_mut() }) else {
        return EUDOXUS_EINVAL;
    };
    let input = if input.is_null() {
        None
    } else if len == 0 {
        Some(&[][..])
    } else {
        Some(unsafe { slice::from_raw_parts(input, len) })
    };
    match state.inner.execute(input) {
        Ok(status) => status_code(status),
        Err(e) => error_code(&e),
    }
}

/// Return the state to the start node, as if newly created.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_reset(state: *mut EudoxusState) {
    if let Some(state) = unsafe { state.as_mut() } {
        state.inner.reset();
    }
}

/// Number of input bytes consumed by the state so far.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_position(state: *const EudoxusState) -> u64 {
    unsafe { state.as_ref() }.map_or(0, |s| s.inner.position())
}

/// Message describing the error of the most recent `eudoxus_execute` call.
///
/// Returns NULL if that call did not fail. Otherwise returns a heap-allocated
/// string the caller must free with `eudoxus_free_str`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_state_error(state: *const EudoxusState) -> *mut c_char {
    let Some(state) = (unsafe { state.as_ref() }) else {
        return ptr::null_mut();
    };
    match state.inner.last_error() {
        Some(e) => str_to_c(&e.to_string()),
        None => ptr::null_mut(),
    }
}

/// Free a string returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eudoxus_free_str(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

// ── Internal helpers ────────────────────────────────────────────

fn str_to_c(s: &str) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

fn set_error(out: *mut *mut c_char, msg: &str) {
    if !out.is_null() {
        unsafe {
            *out = str_to_c(msg);
        }
    }
}
