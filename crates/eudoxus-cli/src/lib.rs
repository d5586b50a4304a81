// eudoxus-cli: shared utilities for the command-line tools.

use std::cell::Cell;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use eudoxus::{Automaton, Command, ExecutionState, Output, Status};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable naming the automaton image when no path is given.
pub const AUTOMATON_ENV: &str = "EUDOXUS_AUTOMATON";

/// Default number of bytes read from the input per `execute` call.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Initialize logging to stderr.
///
/// `RUST_LOG` overrides the default filter, which is `warn`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Locate and load an automaton image.
///
/// Search order:
/// 1. `path` argument (if provided)
/// 2. `EUDOXUS_AUTOMATON` environment variable
pub fn load_automaton(path: Option<&Path>) -> Result<Automaton, String> {
    let path = resolve_path(path, std::env::var_os(AUTOMATON_ENV).map(PathBuf::from))?;
    info!(path = %path.display(), "loading automaton");
    Automaton::from_path(&path).map_err(|e| e.to_string())
}

fn resolve_path(arg: Option<&Path>, env: Option<PathBuf>) -> Result<PathBuf, String> {
    arg.map(Path::to_path_buf)
        .or(env)
        .ok_or_else(|| format!("no automaton given: pass a path or set {AUTOMATON_ENV}"))
}

/// Print an error message and exit with code 1.
pub fn fatal(msg: &str) -> ! {
    eprintln!("error: {msg}");
    process::exit(1);
}

/// How output events are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// `POSITION<TAB>PAYLOAD`, payload decoded lossily as UTF-8.
    #[default]
    Text,
    /// `POSITION<TAB>PAYLOAD`, payload as lowercase hex.
    Hex,
    /// One JSON object per line, followed by a status object.
    Json,
}

/// Settings for [`run_stream`].
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Bytes read from the input at a time.
    pub chunk_size: usize,
    /// Upper bound on the bytes handed to a single `execute` call.
    pub max_bytes: Option<usize>,
    pub format: Format,
    /// Issue a replay request once the input is exhausted.
    pub flush: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_bytes: None,
            format: Format::Text,
            flush: false,
        }
    }
}

/// Result of streaming an input through an automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub status: Status,
    /// Input bytes consumed.
    pub position: u64,
    /// Output events printed.
    pub outputs: u64,
}

#[derive(Serialize)]
struct EventRecord<'a> {
    position: u64,
    payload: &'a str,
    payload_hex: &'a str,
    replay: bool,
}

#[derive(Serialize)]
struct SummaryRecord {
    status: &'static str,
    position: u64,
    outputs: u64,
}

/// Lowercase hex rendering of `bytes`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn status_name(status: Status) -> &'static str {
    match status {
        Status::Ok => "ok",
        Status::End => "end",
        Status::Stop => "stop",
        Status::Error => "error",
    }
}

fn write_event<W: Write>(out: &mut W, format: Format, o: &Output<'_>, replay: bool) -> io::Result<()> {
    let payload = o.payload();
    match format {
        Format::Text => writeln!(out, "{}\t{}", o.position(), String::from_utf8_lossy(payload)),
        Format::Hex => writeln!(out, "{}\t{}", o.position(), to_hex(payload)),
        Format::Json => {
            let text = String::from_utf8_lossy(payload);
            let hex = to_hex(payload);
            let record = EventRecord {
                position: o.position(),
                payload: &text,
                payload_hex: &hex,
                replay,
            };
            serde_json::to_writer(&mut *out, &record).map_err(io::Error::other)?;
            writeln!(out)
        }
    }
}

/// Stream `input` through `automaton`, printing every output to `out`.
///
/// Input is read `chunk_size` bytes at a time and each chunk is split
/// further so no `execute` call sees more than `max_bytes`. Streaming stops
/// at the first non-OK status. A failed write makes the callback return
/// [`Command::Error`], and the write error is reported.
pub fn run_stream<R: Read, W: Write>(
    automaton: &Automaton,
    mut input: R,
    out: &mut W,
    opts: &StreamOptions,
) -> Result<StreamSummary, String> {
    if opts.chunk_size == 0 {
        return Err("chunk size must be at least 1".to_string());
    }
    let piece = match opts.max_bytes {
        Some(0) => return Err("byte cap must be at least 1".to_string()),
        Some(cap) => cap.min(opts.chunk_size),
        None => opts.chunk_size,
    };

    let mut outputs = 0u64;
    let replay = Cell::new(false);
    let mut write_error: Option<io::Error> = None;
    let mut state = ExecutionState::new(automaton, |o: &Output<'_>| {
        match write_event(out, opts.format, o, replay.get()) {
            Ok(()) => {
                outputs += 1;
                Command::Continue
            }
            Err(e) => {
                write_error = Some(e);
                Command::Error
            }
        }
    });

    let mut buf = vec![0u8; opts.chunk_size];
    let mut status = Status::Ok;
    'read: loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("failed to read input: {e}")),
        };
        for chunk in buf[..n].chunks(piece) {
            status = state.execute(Some(chunk)).map_err(|e| e.to_string())?;
            if status != Status::Ok {
                debug!(status = status_name(status), "stream halted");
                break 'read;
            }
        }
    }

    if opts.flush && status == Status::Ok {
        replay.set(true);
        status = state.execute(None).map_err(|e| e.to_string())?;
    }

    let position = state.position();
    drop(state);
    if let Some(e) = write_error {
        return Err(format!("failed to write output: {e}"));
    }

    let summary = StreamSummary {
        status,
        position,
        outputs,
    };
    if opts.format == Format::Json {
        let record = SummaryRecord {
            status: status_name(status),
            position,
            outputs,
        };
        serde_json::to_writer(&mut *out, &record).map_err(|e| e.to_string())?;
        writeln!(out).map_err(|e| e.to_string())?;
    }
    Ok(summary)
}
