// eudoxus-info: Print the header of an automaton image.
//
// Validates the image and prints its header fields and a summary of the
// start node. With --json the same data is printed as one JSON object.

use std::path::PathBuf;

use clap::Parser;
use eudoxus::node::{Node, NodeType};
use eudoxus::{Automaton, NodeDecoder};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "eudoxus-info")]
#[command(about = "Inspect a Eudoxus automaton image")]
struct Args {
    /// Automaton image file
    #[arg(env = eudoxus_cli::AUTOMATON_ENV)]
    automaton: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Info {
    version: u8,
    id_width: usize,
    byte_order: &'static str,
    no_advance_no_output: bool,
    num_nodes: u64,
    num_outputs: u64,
    data_length: u64,
    start_index: u64,
    start_node_type: &'static str,
    start_out_degree: usize,
    start_outputs: usize,
}

fn describe(automaton: &Automaton) -> Result<Info, eudoxus::EudoxusError> {
    let header = automaton.header();
    let start = Node::decode(automaton, automaton.start())?;
    let out_degree = match start {
        Node::Low(node) => node.out_degree(),
    };
    let mut start_outputs = 0;
    start.output(&mut |_: &[u8]| {
        start_outputs += 1;
        eudoxus::Command::Continue
    })?;

    Ok(Info {
        version: header.version,
        id_width: header.layout.id_width(),
        byte_order: if header.layout.is_big_endian() { "big" } else { "little" },
        no_advance_no_output: header.no_advance_no_output,
        num_nodes: header.num_nodes,
        num_outputs: header.num_outputs,
        data_length: header.data_length,
        start_index: header.start_index,
        start_node_type: match start.node_type() {
            NodeType::Low => "low",
        },
        start_out_degree: out_degree,
        start_outputs,
    })
}

fn main() {
    eudoxus_cli::init_logging();

    let args = Args::parse();

    let automaton = eudoxus_cli::load_automaton(args.automaton.as_deref())
        .unwrap_or_else(|e| eudoxus_cli::fatal(&e));
    let info = describe(&automaton).unwrap_or_else(|e| eudoxus_cli::fatal(&e.to_string()));

    if args.json {
        match serde_json::to_string_pretty(&info) {
            Ok(s) => println!("{s}"),
            Err(e) => eudoxus_cli::fatal(&e.to_string()),
        }
        return;
    }

    println!("version:              {}", info.version);
    println!("id width:             {}", info.id_width);
    println!("byte order:           {}", info.byte_order);
    println!("no_advance_no_output: {}", info.no_advance_no_output);
    println!("nodes:                {}", info.num_nodes);
    println!("outputs:              {}", info.num_outputs);
    println!("length:               {}", info.data_length);
    println!("start:                {}", info.start_index);
    println!("start node type:      {}", info.start_node_type);
    println!("start out degree:     {}", info.start_out_degree);
    println!("start outputs:        {}", info.start_outputs);
}
