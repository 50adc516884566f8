//! ShellFlow CLI Entry Point
//!
//! Executes a workflow template once and reports the terminal run state.
//!
//! # Usage
//!
//! ```bash
//! # Execute a template synchronously
//! shellflow template.yaml --file names=data/names.txt
//!
//! # Override a scalar parameter
//! shellflow template.yaml --file names=data/names.txt --arg sleeptime=5
//!
//! # Submit asynchronously and poll until done
//! shellflow template.yaml --file names=data/names.txt --async
//!
//! # Print the final state as JSON
//! shellflow template.yaml --file names=data/names.txt --json
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use colored::Colorize;
use log::{error, info};

use shellflow::template::load_template;
use shellflow::{ArgumentValue, Arguments, Engine, FileHandle, RunOptions, RunState};
use shellflow::{APP_NAME, VERSION};

/// Environment variable holding the default base directory for runs.
const BASE_DIR_ENV_VAR: &str = "SHELLFLOW_BASE_DIR";

/// Base directory used when neither flag nor environment variable is set.
const DEFAULT_BASE_DIR: &str = ".shellflow/runs";

/// Interval for polling asynchronous runs.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    template_path: Option<String>,
    arguments: Arguments,
    base_dir: PathBuf,
    run_async: bool,
    json: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let base_dir = env::var(BASE_DIR_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BASE_DIR));

        Self {
            template_path: None,
            arguments: Arguments::new(),
            base_dir,
            run_async: false,
            json: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: shellflow [OPTIONS] <TEMPLATE_FILE>");
    println!();
    println!("Arguments:");
    println!("  <TEMPLATE_FILE>            Path to workflow template YAML file");
    println!();
    println!("Options:");
    println!("  --arg NAME=VALUE           Value for a template parameter");
    println!("  --file NAME=PATH[:TARGET]  File for a template file parameter");
    println!(
        "  --base-dir DIR             Directory for run workspaces (default: ${} or {})",
        BASE_DIR_ENV_VAR, DEFAULT_BASE_DIR
    );
    println!("  --async                    Execute on a worker and poll for completion");
    println!("  --json                     Print the final run state as JSON");
    println!("  --verbose                  Log commands and enable debug logging");
    println!("  --help                     Show this help message");
    println!("  --version                  Show version information");
}

/// Splits a `NAME=VALUE` option value.
fn split_binding<'a>(option: &str, value: &'a str) -> Result<(&'a str, &'a str), String> {
    match value.split_once('=') {
        Some((name, rest)) if !name.trim().is_empty() => Ok((name.trim(), rest)),
        _ => Err(format!("{} expects NAME=VALUE, got '{}'", option, value)),
    }
}

/// Parses a file argument of the form `PATH[:TARGET]`.
///
/// The target is split at the last colon and must be a relative path, so
/// drive prefixes such as `C:\data` stay part of the source path.
fn parse_file_argument(value: &str) -> FileHandle {
    match value.rsplit_once(':') {
        Some((path, target))
            if !target.is_empty()
                && !target.starts_with(&['/', '\\'][..])
                && !is_drive_letter(path) =>
        {
            FileHandle::new(path).with_target(target)
        }
        _ => FileHandle::new(value),
    }
}

fn is_drive_letter(path: &str) -> bool {
    path.is_empty() || (path.len() == 1 && path.chars().all(|c| c.is_ascii_alphabetic()))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    let next_value = |i: &mut usize, option: &str| -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| format!("{} requires a value", option))
    };

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--async" => config.run_async = true,
            "--json" => config.json = true,
            "--verbose" | "-v" => config.verbose = true,
            "--base-dir" => {
                config.base_dir = PathBuf::from(next_value(&mut i, "--base-dir")?);
            }
            "--arg" => {
                let value = next_value(&mut i, "--arg")?;
                let (name, value) = split_binding("--arg", &value)?;
                config
                    .arguments
                    .insert(name.to_string(), ArgumentValue::scalar(value));
            }
            "--file" => {
                let value = next_value(&mut i, "--file")?;
                let (name, path) = split_binding("--file", &value)?;
                config
                    .arguments
                    .insert(name.to_string(), ArgumentValue::File(parse_file_argument(path)));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.template_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.template_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Prints a terminal run state for humans.
fn print_state(run_id: &str, state: &RunState) {
    println!();
    match state {
        RunState::Success { resources, .. } => {
            println!("Run {} {}", run_id, "succeeded".green().bold());
            if !resources.is_empty() {
                println!();
                println!("Resources:");
                for (name, resource) in resources {
                    println!("  {} -> {}", name.cyan(), resource.filepath.display());
                }
            }
        }
        RunState::Error { messages, .. } => {
            println!("Run {} {}", run_id, "failed".red().bold());
            for message in messages {
                println!();
                println!("{}", message.trim_end());
            }
        }
        RunState::Running { .. } => {
            println!("Run {} {}", run_id, "is still running".yellow());
        }
    }
}

/// Main application entry point.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    let template_path = config
        .template_path
        .as_deref()
        .ok_or("No template file given")?;

    let template = load_template(template_path).map_err(|e| {
        error!("Failed to load template: {}", e);
        format!("Could not load template from '{}': {}", template_path, e)
    })?;

    let engine = Engine::new(&config.base_dir)?;
    let options = RunOptions {
        run_async: config.run_async,
        verbose: config.verbose,
    };

    let submission = engine.execute(&template, &config.arguments, options)?;
    info!("Run {} submitted", submission.run_id);

    let state = if submission.state.is_active() {
        engine.wait(&submission.run_id, POLL_INTERVAL)?
    } else {
        submission.state
    };

    if config.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_state(submission.run_id.as_str(), &state);
        println!();
        println!("Run directory: {}", engine.run_dir(&submission.run_id).display());
    }

    Ok(state.is_success())
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
