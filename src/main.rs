// Copyright (c) 2024 Mudit Bhargava
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
//

// main.rs
//
// CLI entry point: parse the input program file, run it to completion,
// and write the completion table / register dump / memory dump next to
// the input file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use tomasulo_sim::core::Simulator;
use tomasulo_sim::io::{parse_input, write_output};

#[derive(Parser)]
#[command(name = "tomasulo-sim")]
#[command(about = "A cycle-accurate Tomasulo out-of-order core simulator")]
#[command(version)]
struct Cli {
    /// Input program file (parameters, initializers, instructions)
    input: PathBuf,

    /// Log level (error, warn, info, debug)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Maximum cycles to simulate before aborting as non-terminating
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new().parse_filters(&cli.log_level).init();

    match run(&cli) {
        Ok(output_path) => {
            println!("{} wrote {}", "ok:".green().bold(), output_path.display());
            ExitCode::SUCCESS
        },
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        },
    }
}

fn run(cli: &Cli) -> Result<PathBuf, tomasulo_sim::SimulatorError> {
    let parsed = parse_input(&cli.input)?;
    let mut sim =
        Simulator::new(parsed.config, parsed.program, parsed.memory, parsed.registers).with_max_cycles(cli.max_cycles);
    sim.run_to_completion()?;

    let mut output_path = cli.input.clone();
    let stem = output_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "program".into());
    output_path.set_file_name(format!("{stem}_output.txt"));
    write_output(&output_path, &sim)?;
    Ok(output_path)
}
