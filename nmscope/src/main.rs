//! # nmscope - Main Entry Point
//!
//! Loads a memory image (`--snapshot` manifest or `--core` file) and a
//! layout, then answers one query:
//! - **blob**: which code blob holds an address
//! - **pc-desc**: which debug descriptor covers an instruction address
//! - **inlining**: the inlined Java frames at an instruction address
//! - **line**: the source line of a bytecode index in a method

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use nmscope::cli::{Args, Command};
use nmscope::code::Method;
use nmscope::domain::{Address, Bci};
use nmscope::layout::{Layout, LayoutTable};
use nmscope::memory::{Snapshot, TargetView};
use nmscope::symbolization::Symbolizer;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_snapshot(args: &Args) -> Result<Snapshot> {
    match (&args.snapshot, &args.core) {
        (Some(manifest), _) => Snapshot::from_manifest(manifest),
        (None, Some(core)) => Snapshot::from_core_file(core),
        (None, None) => anyhow::bail!("Missing required argument: --snapshot or --core"),
    }
}

fn open_symbolizer<'a>(view: TargetView<'a>, args: &Args, snapshot: &Snapshot) -> Result<Symbolizer<'a>> {
    let code_heap = args.code_heap.map(Address).or(snapshot.code_heap).context(
        "Missing required argument: --code-heap (the snapshot does not record a code heap address)",
    )?;
    let symbolizer = Symbolizer::new(view, code_heap).context("Failed to read code heap")?;
    let heap = symbolizer.code_heap();
    info!("Using code heap at {} spanning {}", heap.address(), heap.memory());
    Ok(symbolizer)
}

fn run() -> Result<()> {
    let args = Args::parse();

    let snapshot = load_snapshot(&args)?;
    let table = LayoutTable::from_json_file(&args.layout)?;
    let layout = Layout::resolve(&table, table.target).context("Layout file is incomplete")?;
    let view = TargetView::new(&snapshot.image, &layout);

    let symbolizer = if args.command.needs_code_heap() {
        Some(open_symbolizer(view, &args, &snapshot)?)
    } else {
        None
    };

    match (args.command, symbolizer) {
        (Command::Line { method, bci }, _) => {
            let method = Method::read(&view, Address(method))?;
            let line = method.line_number_from_bci(&view, Bci(bci))?;
            println!("{} {} {}", method.qualified_name(&view)?, Bci(bci), line);
        }
        (Command::Blob { address }, Some(symbolizer)) => match symbolizer.locate_blob(Address(address))? {
            Some(blob) => println!(
                "{} {} [{}] instructions at {}",
                blob.header_begin(),
                blob.name(),
                blob.range(),
                blob.instructions_begin()
            ),
            None => println!("{} is not inside any code blob", Address(address)),
        },
        (Command::PcDesc { address, approximate }, Some(symbolizer)) => {
            let pc = Address(address);
            let nm = match symbolizer.locate_blob(pc)? {
                Some(blob) => blob.as_compiled_method(&view)?,
                None => None,
            };
            let Some(nm) = nm else {
                println!("{pc} is not inside a compiled method");
                return Ok(());
            };
            match nm.find_pc_desc(&view, pc, approximate)? {
                Some(desc) => println!(
                    "PcDesc {} real_pc={} pc_offset={} scope_decode_offset={}",
                    desc.address(),
                    desc.real_pc(&nm),
                    desc.pc_offset(),
                    desc.scope_decode_offset()
                ),
                None => println!("No descriptor for {pc}"),
            }
        }
        (Command::Inlining { address }, Some(symbolizer)) => match symbolizer.resolve(Address(address))? {
            Some(resolved) => println!("{}", resolved.format(0)),
            None => println!("{} is not inside any code blob", Address(address)),
        },
        (_, None) => anyhow::bail!("Missing required argument: --code-heap"),
    }

    Ok(())
}
