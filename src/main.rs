// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the DDX project (analytic derivatives for shading code).

//! `ddx`: append analytic derivatives to GLSL source, sed style.
//!
//! Reads a file (or stdin), differentiates every function with respect to
//! each of its parameters and prints the result, or rewrites the file in
//! place with `-i`.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use similar::{ChangeTag, TextDiff};
use tracing_subscriber::EnvFilter;

use ddx::diagnostics;
use ddx::pipeline::{convert_text, DeriveOptions, InputHandling, PipelineError};

#[derive(Parser, Debug)]
#[command(name = "ddx", version, about, long_about = None)]
struct Cli {
    /// Read input from FILE instead of stdin.
    #[arg(short, long, value_name = "FILE")]
    filename: Option<PathBuf>,
    /// Rewrite FILE with the converted source.
    #[arg(short, long, requires = "filename", action = ArgAction::SetTrue)]
    in_place: bool,
    /// Where derivatives go relative to the input functions.
    #[arg(long, value_enum, default_value_t = InputHandling::Embed)]
    input_handling: InputHandling,
    /// Print a line diff of input against output.
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
    /// ANSI color handling for the diff.
    #[arg(long, value_enum, value_name = "WHEN")]
    color: Option<ColorChoice>,
    /// Leave generated derivatives unsimplified.
    #[arg(long)]
    no_simplify: bool,
    /// Differentiate functions on a worker pool.
    #[arg(long)]
    parallel: bool,
    /// Worker count for --parallel.
    #[arg(long, value_name = "N", requires = "parallel")]
    threads: Option<usize>,
    /// Deepest expression nesting the engine will follow.
    #[arg(long, value_name = "N", default_value_t = ddx::autodiff::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
    /// Log at debug level unless DDX_LOG says otherwise.
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(&cli) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("DDX_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let source = read_input(cli.filename.as_deref())?;
    let opts = DeriveOptions {
        input_handling: cli.input_handling,
        simplify: !cli.no_simplify,
        parallel: cli.parallel,
        threads: cli.threads,
        max_depth: cli.max_depth,
    };

    let output = match convert_text(&source, &opts) {
        Ok(text) => text,
        Err(PipelineError::Parse(diags)) => {
            let name = cli.filename.as_deref().map(|p| p.display().to_string());
            eprintln!("{}", diagnostics::render_all(&source, name.as_deref(), &diags));
            process::exit(1);
        }
        Err(err @ PipelineError::Verify(_)) => {
            eprintln!("error[verify]: {err}");
            process::exit(2);
        }
        Err(err) => return Err(err.into()),
    };

    if cli.verbose {
        let color = cli.color.unwrap_or_else(color_from_env).enabled();
        print!("{}", render_diff(&source, &output, color));
    }

    match &cli.filename {
        Some(path) if cli.in_place => fs::write(path, &output)
            .with_context(|| format!("failed to write {}", path.display()))?,
        _ => print!("{output}"),
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn color_from_env() -> ColorChoice {
    std::env::var("DDX_COLOR")
        .ok()
        .and_then(|v| ColorChoice::from_str(&v, true).ok())
        .unwrap_or(ColorChoice::Auto)
}

/// `ndiff`-style listing: every line prefixed by `-`, `+` or a space.
fn render_diff(before: &str, after: &str, color: bool) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let (sign, paint) = match change.tag() {
            ChangeTag::Delete => ("-", "\x1b[31m"),
            ChangeTag::Insert => ("+", "\x1b[32m"),
            ChangeTag::Equal => (" ", ""),
        };
        let line = change.value().trim_end_matches('\n');
        if color && !paint.is_empty() {
            out.push_str(&format!("{paint}{sign} {line}\x1b[0m\n"));
        } else {
            out.push_str(&format!("{sign} {line}\n"));
        }
    }
    out
}
