use std::fs;
use std::path::{Path, PathBuf};

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result, WrapErr};

use ls8::{fault_report, load_report, print_trace, Cpu, Status, StdoutSink};

/// Emulator for the LS-8, a tiny 8-bit stack-based CPU.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.ls8` file to run
    path: Option<PathBuf>,

    /// Print CPU state to stderr before every instruction
    #[arg(
        short,
        long,
        global = true,
        env = "LS8_TRACE",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    trace: bool,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long, global = true)]
    minimal: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load and run an `.ls8` program
    Run {
        /// `.ls8` file to run
        name: PathBuf,
    },
    /// Check that an `.ls8` file loads, without running it
    Check {
        /// File to check
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    let (trace, minimal) = (args.trace, args.minimal);

    match args.command {
        Some(Command::Run { name }) => run(&name, trace, minimal),
        Some(Command::Check { name }) => {
            file_message(MsgColor::Green, "Checking", &name);
            let program = ls8::parse_program(&read_source(&name)?).map_err(|e| load_report(&e))?;
            let size = format!("{} of {} bytes used", program.len(), ls8::MEMORY_SIZE);
            message(MsgColor::Green, "Success", &size);
            Ok(())
        }
        None => match args.path {
            Some(path) => run(&path, trace, minimal),
            None => bail!(
                help = "usage: ls8 <FILE> or ls8 run <FILE>",
                "Missing filename argument"
            ),
        },
    }
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn read_source(name: &Path) -> Result<String> {
    fs::read_to_string(name)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not read {}", name.display()))
}

fn run(name: &Path, trace: bool, minimal: bool) -> Result<()> {
    let src = read_source(name)?;

    if !minimal {
        file_message(MsgColor::Green, "Loading", name);
    }
    let mut cpu = Cpu::new(StdoutSink);
    cpu.load_source(&src).map_err(|e| load_report(&e))?;

    if !minimal {
        message(MsgColor::Green, "Running", "loaded program");
    }
    // Step manually so every instruction can be traced
    let status = loop {
        if trace {
            print_trace(&cpu, minimal);
        }
        match cpu.step() {
            Status::Running => continue,
            status => break status,
        }
    };
    match status {
        Status::Faulted(fault) => {
            if !minimal {
                message(MsgColor::Red, "Faulted", &format!("at 0x{:02X}", fault.pc()));
            }
            Err(fault_report(&fault))
        }
        _ => {
            if !minimal {
                message(MsgColor::Cyan, "Halted", &format!("at 0x{:02X}", cpu.pc()));
            }
            Ok(())
        }
    }
}
