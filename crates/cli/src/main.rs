//! `porter` — direct verified transfers from the command line.
//!
//! A thin wrapper over the DIRECT-only engine entry point for scripted
//! and offline use. Exit code 0 on success, 1 on any failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use porter_core::OperationMode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Preserve the source after a verified copy.
    Copy,
    /// Delete the source after a verified copy.
    Move,
}

impl From<ModeArg> for OperationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Copy => OperationMode::Copy,
            ModeArg::Move => OperationMode::Move,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "porter", about = "Verified file and folder transfers")]
struct Args {
    /// Source file or directory.
    source: PathBuf,

    /// Destination root directory.
    destination: PathBuf,

    /// Transfer mode.
    #[arg(long, value_enum, default_value = "copy")]
    mode: ModeArg,

    /// Copy chunk size in bytes.
    #[arg(long, default_value_t = 1024 * 1024)]
    chunk_size: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode: OperationMode = args.mode.into();

    match porter_engine::run_direct(&args.source, &args.destination, mode, args.chunk_size) {
        Ok(stats) => {
            println!(
                "[OK] {} {} files / {} bytes",
                match mode {
                    OperationMode::Copy => "COPY",
                    OperationMode::Move => "MOVE",
                },
                stats.files_copied,
                stats.bytes_copied
            );
            println!("Source: {}", args.source.display());
            println!("Destination: {}", args.destination.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[ERROR] transfer failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::parse_from(["porter", "/src/file", "/dest"]);
        assert_eq!(args.mode, ModeArg::Copy);
        assert_eq!(args.chunk_size, 1024 * 1024);
    }

    #[test]
    fn move_mode_parses() {
        let args = Args::parse_from(["porter", "/a", "/b", "--mode", "move", "--chunk-size", "4096"]);
        assert_eq!(args.mode, ModeArg::Move);
        assert_eq!(args.chunk_size, 4096);
        assert_eq!(OperationMode::from(args.mode), OperationMode::Move);
    }
}
