//! `slicefold`: weave, verify and run modules in the slicefold text format.
//!
//! Usage:
//!   slicefold weave app.sfil --lib arrayslice.sfil -o app.woven.sfil
//!   slicefold verify app.woven.sfil --level full
//!   slicefold run app.sfil --lib arrayslice.sfil App.Program::Sum '[1,2,3]' 3
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use slicefold_interpreter::Machine;
use slicefold_ir::{ir_writer::ModuleWriter, Module, ModuleSet};
use slicefold_verifier::{verify_module, VerificationLevel, VerifierConfig};
use slicefold_weaver::{WeaveOutcome, Weaver, WeaverConfig};
use tracing_subscriber::EnvFilter;

mod args;

#[derive(Parser)]
#[command(name = "slicefold")]
#[command(about = "Rewrites ArraySlice indexer calls into direct array accesses", long_about = None)]
struct Cli {
    /// Log weaving decisions (`debug` level). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Weave a module and print the result
    Weave {
        input: PathBuf,

        /// Modules the input references, e.g. the slice library
        #[arg(short, long = "lib")]
        libs: Vec<PathBuf>,

        /// TOML file overriding the weaver's defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the woven module here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verify the woven module before writing it
        #[arg(long)]
        verify: bool,
    },

    /// Check the structure and stack discipline of every method body
    Verify {
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = Level::Standard)]
        level: Level,
    },

    /// Interpret a static method
    Run {
        input: PathBuf,

        #[arg(short, long = "lib")]
        libs: Vec<PathBuf>,

        /// Weave the module before running it
        #[arg(long)]
        weave: bool,

        /// TOML file overriding the weaver's defaults, used with `--weave`
        #[arg(short, long, requires = "weave")]
        config: Option<PathBuf>,

        /// Method to run, as `Type::Method`
        method: String,

        /// Arguments: `42`, `42L`, `1.5`, `null`, `"text"` or an int32 array `[1,2,3]`
        args: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    Fast,
    Standard,
    Full,
}

impl From<Level> for VerificationLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Fast => Self::Fast,
            Level::Standard => Self::Standard,
            Level::Full => Self::Full,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Weave {
            input,
            libs,
            config,
            output,
            verify,
        } => {
            let config = load_config(config.as_deref())?;
            let mut module = load_module(&input)?;
            let libs = load_libs(&libs)?;

            let outcome = Weaver::new(config)
                .run(&mut module, &libs)
                .with_context(|| format!("failed to weave {}", input.display()))?;
            match &outcome {
                WeaveOutcome::Woven(report) => eprint!("{report}"),
                WeaveOutcome::NotApplicable(_) => {
                    for diagnostic in outcome.diagnostics() {
                        eprint!("{diagnostic}");
                    }
                }
            }

            if verify {
                let report = verify_module(&module, &VerifierConfig::default());
                if report.has_errors() {
                    eprintln!("{report}");
                    bail!("woven module failed verification");
                }
            }

            let text = ModuleWriter::new(&module).dump_string()?;
            match output {
                Some(path) => fs::write(&path, text)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{text}"),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { input, level } => {
            let module = load_module(&input)?;
            let report = verify_module(&module, &VerifierConfig::for_level(level.into()));
            println!("{report}");
            Ok(if report.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Run {
            input,
            libs,
            weave,
            config,
            method,
            args,
        } => {
            let mut module = load_module(&input)?;
            let lib_modules = load_libs(&libs)?;
            if weave {
                Weaver::new(load_config(config.as_deref())?)
                    .run(&mut module, &lib_modules)
                    .with_context(|| format!("failed to weave {}", input.display()))?;
            }

            let Some((ty, name)) = method.rsplit_once("::") else {
                bail!("method must be written as `Type::Method`, got `{method}`");
            };
            let mut machine = Machine::new(module);
            for path in &libs {
                machine.add_module(load_module(path)?);
            }
            let func = machine
                .func_by_name(ty, name)
                .with_context(|| format!("no method `{method}`"))?;
            let values = args
                .iter()
                .map(|arg| args::parse_value(&mut machine, arg))
                .collect::<Result<Vec<_>>>()?;

            match machine.run(func, values)? {
                Some(value) => println!("{value}"),
                None => println!("(void)"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_module(path: &Path) -> Result<Module> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let path_str = path.display().to_string();
    let module = slicefold_parser::parse_module(&content).map_err(|errs| {
        for err in &errs {
            eprintln!("{}", err.print_to_string(&path_str, &content, true));
        }
        anyhow::anyhow!("failed to parse {path_str} ({} errors)", errs.len())
    })?;
    tracing::debug!(path = %path_str, module = %module.name, "module loaded");
    Ok(module)
}

fn load_libs(paths: &[PathBuf]) -> Result<ModuleSet> {
    paths.iter().map(|path| load_module(path)).collect()
}

fn load_config(path: Option<&Path>) -> Result<WeaverConfig> {
    let Some(path) = path else {
        return Ok(WeaverConfig::default());
    };
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
}
