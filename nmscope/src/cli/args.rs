//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::memory::parse_address;

#[derive(Parser)]
#[command(
    name = "nmscope",
    about = "Map JIT-compiled code addresses back to inlined Java frames",
    after_help = "\
EXAMPLES:
    nmscope --snapshot cap/manifest.json --layout jdk8.json blob 0x7f3a1c0452f0
    nmscope --core core.1234 --layout jdk8.json --code-heap 0x7f3a28012340 inlining 0x7f3a1c0452f0
    nmscope --core core.1234 --layout jdk8.json line 0x7f3a0800c2a8 14"
)]
pub struct Args {
    /// JSON manifest of captured memory regions
    #[arg(long, value_name = "MANIFEST", required_unless_present = "core", conflicts_with = "core")]
    pub snapshot: Option<PathBuf>,

    /// ELF core file to read memory from
    #[arg(long, value_name = "FILE")]
    pub core: Option<PathBuf>,

    /// JSON structure layout of the target binary
    #[arg(short, long, value_name = "FILE")]
    pub layout: PathBuf,

    /// Address of the code heap structure (overrides the manifest)
    #[arg(long, value_name = "ADDR", value_parser = parse_address_arg)]
    pub code_heap: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Find the code blob containing an address
    Blob {
        #[arg(value_parser = parse_address_arg)]
        address: u64,
    },

    /// Find the debug descriptor for an instruction address
    PcDesc {
        #[arg(value_parser = parse_address_arg)]
        address: u64,

        /// Match the descriptor whose range covers the address
        #[arg(long)]
        approximate: bool,
    },

    /// Print the chain of inlined frames at an instruction address
    Inlining {
        #[arg(value_parser = parse_address_arg)]
        address: u64,
    },

    /// Look up the source line of a bytecode index in a method
    Line {
        /// Address of the Method structure
        #[arg(value_parser = parse_address_arg)]
        method: u64,

        #[arg(allow_negative_numbers = true)]
        bci: i32,
    },
}

impl Command {
    /// Whether the command has to walk the code heap
    #[must_use]
    pub fn needs_code_heap(&self) -> bool {
        !matches!(self, Command::Line { .. })
    }
}

fn parse_address_arg(text: &str) -> Result<u64, String> {
    parse_address(text).map_err(|e| e.to_string())
}
