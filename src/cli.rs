use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use crate::collector::Collector;
use crate::highlight::Highlighter;
use crate::options::{Options, Target};
use crate::run_report::{BranchSummary, CoverageRunReport, FileReport};
use crate::runtime::{Interpreter, ScriptError};
use crate::ui::Ui;

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;

/// Top-level CLI arguments for the `fine-coverage` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fine-coverage",
    version,
    about = "Branch coverage for short-circuit and conditional expressions"
)]
pub struct Cli {
    /// Script to run, or a module name with `-m`.
    pub target: String,

    /// Treat TARGET as a module name resolved from the current directory.
    #[arg(short = 'm', long = "module")]
    pub module: bool,

    /// Only trace code whose qualified name starts with PREFIX.
    #[arg(long = "cov", value_name = "PREFIX")]
    pub cov: Option<String>,

    /// Emit a machine-readable JSON report to stdout.
    #[arg(long)]
    pub json: bool,

    /// Diagnostic log level (off, error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: LevelFilter,

    /// Arguments passed to the script as `argv[1..]`.
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        let target = if cli.module {
            Target::Module(cli.target)
        } else {
            Target::Path(PathBuf::from(cli.target))
        };

        let mut options = Options::new(target);
        options.cov_prefix = cli.cov;
        options.script_args = cli.args;
        options.json_output = cli.json;
        options.log_level = cli.log_level;
        options
    }
}

/// Parse CLI arguments, run the target and exit with its status.
pub fn run() -> Result<()> {
    let options = Options::from(Cli::parse());

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(options.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    let exit_code = execute(&options)?;
    if exit_code != EXIT_OK {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Run the target under a collector, then render and report every traced file.
///
/// Returns the process exit code.
pub fn execute(options: &Options) -> Result<i32> {
    let ui = Ui::new(options.json_output);

    // script output must not end up in the JSON on stdout
    let output: Box<dyn Write> = if options.json_output {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let search_path = match &options.target {
        Target::Module(_) => vec![PathBuf::from(".")],
        Target::Path(_) => Vec::new(),
    };
    let mut interp = Interpreter::new()
        .with_search_path(search_path)
        .with_argv(options.argv())
        .with_output(output);

    let guard = Collector::new(options.cov_prefix.clone())
        .start()
        .context("failed to install the trace collector")?;
    let outcome = match &options.target {
        Target::Path(path) => interp.run_path(path),
        Target::Module(name) => interp.run_module(name),
    };
    let session = guard.stop();

    let script_error = match outcome {
        Ok(_) => None,
        Err(err) => normal_exit(err),
    };

    let highlighter = Highlighter::new(&session);
    let mut files = Vec::new();
    for path in highlighter.files() {
        ui.rule(path.display());

        let mut error = None;
        match highlighter.render_file(path) {
            Ok(text) => ui.source(&text),
            Err(err) => {
                ui.warn(format!("cannot render {}: {err}", path.display()));
                error = Some(err.to_string());
            }
        }

        let branches = highlighter.branches(path);
        ui.summary(&BranchSummary::from_branches(&branches));

        let error = error.or_else(|| highlighter.extraction_error(path));
        files.push(FileReport::new(path.to_path_buf(), branches, error));
    }

    if let Some(err) = &script_error {
        ui.error(format!("error: {err}"));
    }

    let target = options.target.display_name();
    let exit_code = if script_error.is_some() {
        EXIT_ERROR
    } else {
        EXIT_OK
    };

    if options.json_output {
        let report = match script_error {
            Some(err) => CoverageRunReport::failure(target, files, err.to_string()),
            None => CoverageRunReport::success(target, files),
        };
        let json = serde_json::to_string_pretty(&report).context("serialize report to json")?;
        println!("{json}");
    }

    Ok(exit_code)
}

/// `exit(...)` ends a script normally; anything else is a failure.
fn normal_exit(err: ScriptError) -> Option<ScriptError> {
    match err.exit_code() {
        Some(code) => {
            debug!("script called exit({code})");
            None
        }
        None => Some(err),
    }
}
