//! ricepack command line interface
//!
//! File-in/file-out harness around chunk compression and entity
//! decompression.
//!
//! Usage:
//!   ricepack <input> <mode> <golomb> <spill> [model]     # compress
//!   ricepack -d <input.ent> [model]                      # decompress
//!   ricepack --version
//!   ricepack --help

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use ricepack::{
    compress_chunk, decompress_entity, round_fwd, round_inv, ChunkParams, CmpError, CmpMode,
    CodecContext, Entity, GolombPair, MAX_MODEL_WEIGHT,
};
use std::env;
use std::fs;
use std::path::Path;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print version information.
fn print_version() {
    println!("ricepack {VERSION}");
}

/// Print help message with usage information.
fn print_help(prog_name: &str) {
    println!("ricepack - adaptive Golomb-Rice science telemetry compression (v{VERSION})\n");
    println!("Usage:");
    println!("  {prog_name} <input> <mode> <golomb> <spill> [model]");
    println!("  {prog_name} -d <input.ent> [model]\n");
    println!("Options:");
    println!("  -d             Decompress (default is compress)");
    println!("  -h, --help     Show this help message");
    println!("  -v, --version  Show version information\n");
    println!("Compress arguments:");
    println!("  input          Chunk file (concatenated collections)");
    println!("  mode           0 raw, 1 model/zero, 2 diff/zero, 3 model/multi, 4 diff/multi");
    println!("  golomb         Golomb parameter applied to every field (e.g. 4)");
    println!("  spill          Spillover threshold applied to every field (e.g. 60)");
    println!("  model          Model chunk file (required for modes 1 and 3)\n");
    println!("Decompress arguments:");
    println!("  input.ent      Compressed entity file");
    println!("  model          Model chunk file (required for model-mode entities)\n");
    println!("Output:");
    println!("  Compress:   <input>.ent");
    println!("  Decompress: <input>.dat (or <base>.dat if input ends in .ent)");
}

/// Mission timestamp: milliseconds since the Unix epoch, folded to 48 bits.
fn mission_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        & 0xFFFF_FFFF_FFFF
}

/// Reference model-update blend: weight/16 model, (16-weight)/16 data, with
/// the data first taken through the lossy round trip.
fn blend_model(decoded: u32, model: u32, weight: u8, lossy: u32) -> u32 {
    let data = round_inv(round_fwd(decoded, lossy), lossy);
    let weighted = u64::from(model) * u64::from(weight)
        + u64::from(data) * u64::from(MAX_MODEL_WEIGHT - weight);
    (weighted / u64::from(MAX_MODEL_WEIGHT)) as u32
}

fn context() -> CodecContext {
    CodecContext::new(0x0100, mission_time, blend_model)
}

/// Create output filename for decompression.
fn make_decompress_filename(input: &str) -> String {
    if let Some(stripped) = input.strip_suffix(".ent") {
        format!("{stripped}.dat")
    } else {
        format!("{input}.dat")
    }
}

/// Read a file into a byte vector.
fn read_file(path: &str) -> Result<Vec<u8>, String> {
    let data = fs::read(path).map_err(|e| format!("Cannot read {path}: {e}"))?;
    if data.is_empty() {
        return Err(format!("{path} is empty"));
    }
    Ok(data)
}

/// Parse an integer argument.
fn parse_u32(s: &str, name: &str) -> Result<u32, String> {
    s.parse::<u32>()
        .map_err(|_| format!("{name} must be an unsigned integer"))
}

/// Compress a chunk file into an entity file.
fn do_compress(
    input_path: &str,
    mode: CmpMode,
    golomb: u32,
    spill: u32,
    model_path: Option<&str>,
) -> Result<(), String> {
    let chunk = read_file(input_path)?;
    let model = match model_path {
        Some(path) => Some(read_file(path)?),
        None => None,
    };

    let pair = GolombPair::new(golomb, spill);
    let ima_pair = GolombPair::new(golomb.min(0xFF), spill.min(0xFFFF));
    let params = ChunkParams {
        mode,
        imagette: ima_pair,
        exp_flags: pair,
        fx: pair,
        ncob: pair,
        efx: pair,
        ecob: pair,
        mean: pair,
        variance: pair,
        outliers: pair,
        ..ChunkParams::default()
    };

    let ctx = context();
    let size = compress_chunk(&ctx, &chunk, model.as_deref(), None, None, &params)
        .map_err(|e| format!("Compression failed: {e}"))?;

    let mut entity = vec![0u8; size as usize];
    compress_chunk(
        &ctx,
        &chunk,
        model.as_deref(),
        None,
        Some(&mut entity),
        &params,
    )
    .map_err(|e| format!("Compression failed: {e}"))?;

    let output_path = format!("{input_path}.ent");
    fs::write(&output_path, &entity).map_err(|e| format!("Cannot write {output_path}: {e}"))?;

    let ratio = chunk.len() as f64 / entity.len() as f64;
    println!("Input:       {input_path} ({} bytes)", chunk.len());
    println!("Output:      {output_path} ({} bytes)", entity.len());
    println!("Ratio:       {ratio:.2}x");
    println!(
        "Parameters:  mode={}, golomb={golomb}, spill={spill}",
        mode.to_wire()
    );

    Ok(())
}

/// Decompress an entity file back into a chunk file.
fn do_decompress(input_path: &str, model_path: Option<&str>) -> Result<(), String> {
    let entity = read_file(input_path)?;
    let model = match model_path {
        Some(path) => Some(read_file(path)?),
        None => None,
    };

    let ctx = context();
    let size = decompress_entity(&ctx, &entity, model.as_deref(), None, None)
        .map_err(|e| format!("Decompression failed: {e}"))?;

    let mut chunk = vec![0u8; size as usize];
    decompress_entity(&ctx, &entity, model.as_deref(), None, Some(&mut chunk))
        .map_err(|e| format!("Decompression failed: {e}"))?;

    let output_path = make_decompress_filename(input_path);
    fs::write(&output_path, &chunk).map_err(|e| format!("Cannot write {output_path}: {e}"))?;

    let header = Entity::new(&entity).map_err(|e: CmpError| e.to_string())?;
    println!("Input:       {input_path} ({} bytes)", entity.len());
    println!("Output:      {output_path} ({} bytes)", chunk.len());
    println!(
        "Entity:      version={:#06x}, mode={}, model id={}",
        header.version_id(),
        header.mode_wire(),
        header.model_id()
    );

    Ok(())
}

/// Handle compress mode arguments.
fn handle_compress(args: &[String], prog_name: &str) {
    if args.len() < 5 || args.len() > 6 {
        eprintln!("Error: Compress requires 4 or 5 arguments");
        eprintln!("Usage: {prog_name} <input> <mode> <golomb> <spill> [model]");
        process::exit(1);
    }

    let mode_num = match parse_u32(&args[2], "mode") {
        Ok(v) if v <= u32::from(u8::MAX) => v as u8,
        _ => {
            eprintln!("Error: mode must be 0-4");
            process::exit(1);
        }
    };
    let Some(mode) = CmpMode::from_wire(mode_num) else {
        eprintln!("Error: mode must be 0-4");
        process::exit(1);
    };

    let golomb = match parse_u32(&args[3], "golomb") {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let spill = match parse_u32(&args[4], "spill") {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let model = args.get(5).map(String::as_str);
    if let Err(e) = do_compress(&args[1], mode, golomb, spill, model) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Handle decompress mode arguments.
fn handle_decompress(args: &[String], prog_name: &str) {
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Error: Decompress requires 1 or 2 arguments after -d");
        eprintln!("Usage: {prog_name} -d <input.ent> [model]");
        process::exit(1);
    }

    let model = args.get(3).map(String::as_str);
    if let Err(e) = do_decompress(&args[2], model) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn main() {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog_name = Path::new(&args[0])
        .file_name()
        .map_or("ricepack", |s| s.to_str().unwrap_or("ricepack"));

    if args.len() < 2 {
        print_help(prog_name);
        process::exit(1);
    }

    match args[1].as_str() {
        "-h" | "--help" => print_help(prog_name),
        "-v" | "--version" => print_version(),
        "-d" => handle_decompress(&args, prog_name),
        _ => handle_compress(&args, prog_name),
    }
}
