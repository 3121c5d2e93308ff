//! Interactive console for topolith worlds.
//!
//! Every line is either a shell directive (`undo`, `redo`, `save`,
//! `load <name>`, `worlds`, `exit`) or a command-language statement handed to
//! the core application, whose response block is printed verbatim.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use topolith_core::{App, World, WorldStore};

mod repl;

#[derive(Parser)]
#[command(name = "topolith")]
#[command(version)]
#[command(about = "Interactive authoring of architecture diagrams as text")]
struct Cli {
    /// World to load on startup (created fresh when it does not exist yet)
    world: Option<String>,

    /// Directory for .world files (defaults to the platform data dir)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Execute the given commands and exit
    #[arg(short = 'c', long = "exec")]
    commands: Vec<String>,

    /// Execute commands from a file (one per line) and exit
    #[arg(long)]
    script: Option<PathBuf>,

    /// Keep going after a failing command in --exec/--script mode
    #[arg(long)]
    continue_on_error: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "topolith=info".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut store = WorldStore::new();
    if let Some(dir) = &cli.dir {
        store.set_directory(dir);
    }

    let name = cli.world.as_deref().unwrap_or("default-world");
    let world = match store.load(name) {
        Ok(world) => world,
        Err(_) => World::new(name),
    };
    let mut app = App::with_store(world, store);

    if cli.script.is_some() || !cli.commands.is_empty() {
        return run_batch(&mut app, &cli);
    }
    repl::run(&mut app)
}

fn run_batch(app: &mut App, cli: &Cli) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();
    if let Some(path) = &cli.script {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read script {}", path.display()))?;
        lines.extend(text.lines().map(str::to_string));
    }
    lines.extend(cli.commands.iter().cloned());

    for raw in &lines {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        println!("{} {line}", ">>>".dimmed());
        match repl::dispatch(app, line) {
            Ok(repl::Control::Continue) => {}
            Ok(repl::Control::Exit) => break,
            Err(err) => {
                eprintln!("{}", err.to_string().red());
                if !cli.continue_on_error {
                    anyhow::bail!("stopping at failed command: {line}");
                }
            }
        }
    }
    Ok(())
}
