use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::json;
use temper_typer::{load_path, typecheck, Diagnostics, LogLevel, Module, NodeId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

#[derive(Parser)]
#[command(
    name = "temper-typer",
    version,
    about = "Type-check Temper module descriptions."
)]
struct Cli {
    /// Increase log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and type a module, reporting problems on stderr.
    Check(CheckArgs),
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Module description in YAML, or JSON when the file ends in `.json`.
    input: PathBuf,

    /// Format used for `--dump-plan` and `--dump-types`.
    #[arg(long, value_enum, default_value = "yaml")]
    format: Format,

    /// Print the typer plan.
    #[arg(long)]
    dump_plan: bool,

    /// Print the type decided for every node.
    #[arg(long)]
    dump_types: bool,

    /// Leave out the notes attached to nodes whose type mentions `Invalid`.
    #[arg(long)]
    no_invalid_notes: bool,

    /// Do not report unhandled bubbles.
    #[arg(long)]
    no_bubble_check: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    match cli.command {
        Command::Check(args) => run_check(args),
    }
}

fn setup_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });
    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();
}

fn run_check(args: CheckArgs) -> Result<()> {
    let fixture = load_path(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let mut module = fixture.module;
    let mut options = fixture.options;
    if args.no_invalid_notes {
        options.invalid_notes = false;
    }
    if args.no_bubble_check {
        options.check_bubbles = false;
    }

    let mut diagnostics = Diagnostics::new();
    let plan = typecheck(&mut module, &options, &mut diagnostics);
    tracing::info!(
        nodes = module.tree.len(),
        entries = diagnostics.entries().len(),
        "typed {}",
        args.input.display()
    );

    if args.dump_plan {
        let summary = serde_json::to_value(plan.summarize(&module))?;
        print_value(&summary, args.format)?;
    }
    if args.dump_types {
        print_value(&node_types(&module), args.format)?;
    }

    let path = args.input.display();
    for entry in diagnostics.entries() {
        eprintln!(
            "{path}:{}: {}: {}",
            entry.position,
            entry.level,
            entry.message()
        );
    }

    let errors = diagnostics
        .entries()
        .iter()
        .filter(|entry| entry.level == LogLevel::Error)
        .count();
    if errors > 0 {
        bail!("{path}: {errors} error(s) found while typing");
    }
    Ok(())
}

fn node_types(module: &Module) -> serde_json::Value {
    let tree = &module.tree;
    let mut ids: Vec<NodeId> = tree.ids().collect();
    ids.sort();
    let nodes: Vec<serde_json::Value> = ids
        .into_iter()
        .filter_map(|id| {
            let ty = tree.type_of(id)?;
            Some(json!({
                "position": tree.pos(id).to_string(),
                "kind": tree.kind(id).describe(),
                "type": ty.to_string(),
            }))
        })
        .collect();
    serde_json::Value::Array(nodes)
}

fn print_value(value: &serde_json::Value, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
