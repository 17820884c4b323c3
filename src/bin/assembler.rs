//! JSON program description to binary image compiler CLI.
//!
//! Reads a JSON program description, encodes it into a program image, and
//! writes the raw bytes to a file.
//!
//! # Usage
//! ```text
//! assembler <program.json> <output.bin> [OPTIONS]
//! ```
//!
//! # Options
//! - `-t, --truncate-constants`: mask over-wide LOAD_CONST constants to 28
//!   bits instead of rejecting them (legacy images)
//! - `-q, --quiet`: suppress informational output

use regvm::codec::ConstantPolicy;
use regvm::program::{hex_listing, ProgramSource};
use regvm::utils::log::QUIET;
use regvm::{error, info};
use std::env;
use std::fs;
use std::process;
use std::sync::atomic::Ordering;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }
    if args.len() < 3 {
        error!("Expected an input and an output path");
        print_usage(&args[0]);
        process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];
    let mut policy = ConstantPolicy::Reject;

    for arg in &args[3..] {
        match arg.as_str() {
            "--truncate-constants" | "-t" => policy = ConstantPolicy::Truncate,
            "--quiet" | "-q" => QUIET.store(true, Ordering::Relaxed),
            other => {
                error!("Unexpected argument: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let source = match ProgramSource::from_file(input_path) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to read {}: {}", input_path, e);
            process::exit(1);
        }
    };

    let image = match source.assemble(policy) {
        Ok(image) => image,
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(output_path, &image) {
        error!("Failed to write {}: {}", output_path, e);
        process::exit(1);
    }

    info!(
        "Assembled {} -> {} ({} instructions, {} bytes)",
        input_path,
        output_path,
        source.instructions.len(),
        image.len()
    );
    info!("{}", hex_listing(&image));
}

const USAGE: &str = "\
Program Assembler

USAGE:
    {program} <program.json> <output.bin> [OPTIONS]

ARGS:
    <program.json>    JSON program description to encode
    <output.bin>      Output path for the binary program image

OPTIONS:
    -t, --truncate-constants    Mask over-wide LOAD_CONST constants to 28 bits
    -q, --quiet                 Suppress informational output
    -h, --help                  Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
