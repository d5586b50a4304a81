// eudoxus-exec: Stream input through an automaton and print its outputs.
//
// Reads the input file (or stdin) in chunks, executes the automaton over
// each chunk and prints one line per output:
//   POSITION<TAB>PAYLOAD
//
// The exit code is 0 when the stream ends with OK or END, 2 when the
// automaton halts with STOP or ERROR, and 1 on any failure.

use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use eudoxus::Status;
use eudoxus_cli::{DEFAULT_CHUNK_SIZE, Format, StreamOptions};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "eudoxus-exec")]
#[command(about = "Run a Eudoxus automaton over a byte stream")]
struct Args {
    /// Automaton image file
    #[arg(short, long, env = eudoxus_cli::AUTOMATON_ENV)]
    automaton: Option<PathBuf>,

    /// Input file (default: stdin)
    input: Option<PathBuf>,

    /// Bytes read per chunk
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Maximum bytes handed to a single execute call
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Replay the outputs of the final node once input is exhausted
    #[arg(long)]
    flush: bool,
}

fn main() {
    eudoxus_cli::init_logging();

    let args = Args::parse();

    let automaton = eudoxus_cli::load_automaton(args.automaton.as_deref())
        .unwrap_or_else(|e| eudoxus_cli::fatal(&e));

    let input: Box<dyn Read> = match &args.input {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(f),
            Err(e) => eudoxus_cli::fatal(&format!("failed to open {}: {e}", path.display())),
        },
        None => Box::new(io::stdin().lock()),
    };

    let opts = StreamOptions {
        chunk_size: args.chunk_size,
        max_bytes: args.max_bytes,
        format: args.format,
        flush: args.flush,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = eudoxus_cli::run_stream(&automaton, input, &mut out, &opts)
        .unwrap_or_else(|e| eudoxus_cli::fatal(&e));
    drop(out);

    info!(
        status = eudoxus_cli::status_name(summary.status),
        position = summary.position,
        outputs = summary.outputs,
        "stream finished"
    );

    match summary.status {
        Status::Ok | Status::End => {}
        Status::Stop | Status::Error => process::exit(2),
    }
}
