//! Program image interpreter CLI.
//!
//! Loads a binary program image, runs it to a halt, writes a CSV memory dump
//! over the requested address range, and prints a summary of the non-zero
//! registers.
//!
//! # Usage
//! ```text
//! interpreter <program.bin> <dump.csv> [OPTIONS]
//! ```
//!
//! # Options
//! - `--start <addr>`: first dumped address, hex or decimal (default 0x0000)
//! - `--end <addr>`: last dumped address, inclusive (default 0x0100)
//! - `--memory-size <bytes>`: machine memory size (default 1 MiB)
//! - `--limit <count>`: executed-instruction budget (default 10000)

use regvm::report;
use regvm::vm::{Machine, MachineConfig};
use regvm::{error, info, warn};
use std::env;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }
    if args.len() < 3 {
        error!("Expected a program image and a dump output path");
        print_usage(&args[0]);
        process::exit(1);
    }

    let program_path = &args[1];
    let dump_path = &args[2];
    let mut start = 0x0000usize;
    let mut end = 0x0100usize;
    let mut config = MachineConfig::default();

    let mut i = 3;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = match args.get(i + 1) {
            Some(v) => v,
            None => {
                error!("{} requires an argument", flag);
                process::exit(1);
            }
        };
        match flag {
            "--start" => start = parse_number(flag, value),
            "--end" => end = parse_number(flag, value),
            "--memory-size" => config.memory_size = parse_number(flag, value),
            "--limit" => config.instruction_limit = parse_number(flag, value) as u64,
            other => {
                error!("Unexpected argument: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 2;
    }

    let image = match fs::read(program_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read {}: {}", program_path, e);
            process::exit(1);
        }
    };

    let mut machine = Machine::with_config(config);
    if let Err(e) = machine.load(&image) {
        error!("Failed to load program: {}", e);
        process::exit(1);
    }
    info!("Loaded {} bytes of program at 0x00000000", image.len());

    let summary = machine.run();
    if summary.reason.is_fault() {
        warn!("Run stopped on a fault: {}", summary.reason);
    }
    info!(
        "Execution halted: {} ({} instructions executed, pc={:#x})",
        summary.reason,
        summary.executed,
        machine.pc()
    );

    let dump_file = match fs::File::create(dump_path) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to create {}: {}", dump_path, e);
            process::exit(1);
        }
    };
    let mut writer = BufWriter::new(dump_file);
    if let Err(e) = report::write_dump(&mut writer, machine.memory(), start, end) {
        error!("Failed to write memory dump: {}", e);
        process::exit(1);
    }
    if let Err(e) = writer.flush() {
        error!("Failed to write memory dump: {}", e);
        process::exit(1);
    }
    info!(
        "Memory dump for {:#010x}-{:#010x} saved to {}",
        start, end, dump_path
    );

    let stdout = io::stdout();
    if let Err(e) = report::write_registers(&mut stdout.lock(), machine.registers()) {
        error!("Failed to print registers: {}", e);
        process::exit(1);
    }
}

/// Parses a hex (`0x...`) or decimal numeric argument.
fn parse_number(flag: &str, text: &str) -> usize {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.unwrap_or_else(|_| {
        error!("Invalid value for {}: '{}'", flag, text);
        process::exit(1);
    })
}

const USAGE: &str = "\
Program Interpreter

USAGE:
    {program} <program.bin> <dump.csv> [OPTIONS]

ARGS:
    <program.bin>    Binary program image to execute
    <dump.csv>       Output path for the CSV memory dump

OPTIONS:
    --start <addr>          First dumped address, hex or decimal (default 0x0000)
    --end <addr>            Last dumped address, inclusive (default 0x0100)
    --memory-size <bytes>   Machine memory size (default 1048576)
    --limit <count>         Executed-instruction budget (default 10000)
    -h, --help              Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
