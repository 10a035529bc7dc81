//! L-System Walker - Rust Implementation
//!
//! CLI commands:
//! - list: List configured systems
//! - derive: Derive one generation through the level cache
//! - render: Drive the turtle headlessly and record its path
//! - export: Write a system as a session file
//! - check: Build a grammar and print its tables

mod config;
mod formula;
mod levels;
mod logging;
mod lsystem;
mod presets;
mod prng;
mod quaternion;
mod renderer;
mod state;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use levels::{LevelCache, LevelStatus};
use lsystem::{Grammar, Production, TURN_SYMBOLS};
use quaternion::Vector3;
use renderer::{RenderEvent, StepOutcome};
use state::Session;

#[derive(Parser)]
#[command(name = "lsys_walker")]
#[command(about = "Incremental L-system derivation and turtle rendering")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to systems.yaml config
    #[arg(short, long, default_value = "systems.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured systems
    List,

    /// Derive a generation and print its size
    Derive {
        /// System ID
        #[arg(short, long)]
        system: String,

        /// Generation to derive
        #[arg(short, long, default_value = "4")]
        level: usize,

        /// Override the grammar seed
        #[arg(long)]
        seed: Option<u32>,

        /// Print the derived symbols
        #[arg(long)]
        show: bool,
    },

    /// Run the renderer without a display and record the cursor path
    Render {
        /// System ID
        #[arg(short, long, required_unless_present = "session")]
        system: Option<String>,

        /// Session file to render instead of a configured system
        #[arg(long, conflicts_with = "system")]
        session: Option<PathBuf>,

        /// Generation to draw (defaults to the session's level)
        #[arg(short, long)]
        level: Option<usize>,

        /// Maximum draw steps
        #[arg(long, default_value = "1000")]
        steps: usize,

        /// Override the grammar seed
        #[arg(long)]
        seed: Option<u32>,

        /// Replace the axiom, keeping the rules
        #[arg(long)]
        axiom: Option<String>,

        /// Start with heading +x instead of +y
        #[arg(long)]
        flat: bool,

        /// Collapse straight runs of draws into one step
        #[arg(long)]
        quick_draw: bool,

        /// Write the recorded path as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a system as a session file
    Export {
        /// System ID
        #[arg(short, long)]
        system: String,

        /// Generation stored in the session
        #[arg(short, long, default_value = "0")]
        level: usize,

        /// Output file (defaults to <output dir>/<id>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a system's grammar and print its rule table
    Check {
        /// System ID
        #[arg(short, long)]
        system: String,
    },
}

fn main() -> anyhow::Result<()> {
    let env = config::Environment::load();

    // Initialize logging first
    let _guard = logging::init_logging(&env.log_dir)?;
    tracing::info!("L-System Walker starting up");

    let cli = Cli::parse();
    tracing::debug!("CLI args parsed: config={:?}", cli.config);

    let config = config::Config::load_or_default(&cli.config)?;
    tracing::info!("Config loaded: {} systems", config.systems.len());

    match cli.command {
        Commands::List => list_systems(&config),

        Commands::Derive { system, level, seed, show } => {
            derive_level(&config, &system, level, seed, show)?;
        }

        Commands::Render { system, session, level, steps, seed, axiom, flat, quick_draw, output } => {
            let session = match (system, session) {
                (_, Some(path)) => Session::load(&path)?,
                (Some(id), None) => Session::from_system(find_system(&config, &id)?, 0),
                (None, None) => bail!("Specify --system or --session"),
            };
            let overrides = RenderOverrides { level, seed, axiom, flat, quick_draw };
            render(&config, session, overrides, steps, output.as_deref())?;
        }

        Commands::Export { system, level, output } => {
            let sys = find_system(&config, &system)?;
            let path = output.unwrap_or_else(|| Path::new(&env.output_dir).join(format!("{}.json", sys.id)));
            Session::from_system(sys, level).save(&path)?;
            println!("{} -> {:?}", sys.name, path);
        }

        Commands::Check { system } => check_system(&config, &system)?,
    }

    Ok(())
}

fn find_system<'a>(config: &'a config::Config, id: &str) -> anyhow::Result<&'a config::System> {
    config.get_system(id).with_context(|| {
        format!("Unknown system '{}'. Available: {}", id, config.system_ids().join(", "))
    })
}

/// List configured systems
fn list_systems(config: &config::Config) {
    println!("Available systems ({}):", config.systems.len());
    println!();

    for system in &config.systems {
        let g = &system.grammar;
        println!("  - {} [{}] axiom={} angle={} rules={}", system.name, system.id, g.axiom, g.angle, g.rules.len());
    }
}

/// Derive a generation in budget-sized chunks, the way the renderer does
fn derive_level(
    config: &config::Config,
    id: &str,
    level: usize,
    seed: Option<u32>,
    show: bool,
) -> anyhow::Result<()> {
    let system = find_system(config, id)?;
    let mut grammar = Grammar::new(system.grammar.clone());
    if let Some(seed) = seed {
        grammar.set_seed(seed);
    }

    let mut cache = LevelCache::new(grammar.axiom());
    let tuning = &config.tuning;
    let mut ticks = 0usize;
    loop {
        ticks += 1;
        match cache.request(&mut grammar, level, tuning.chars_per_call, tuning.calls_per_tick) {
            LevelStatus::Ready => break,
            LevelStatus::Loading { progress } => {
                tracing::debug!("Deriving {} level {}: {:.1}%", id, level, progress * 100.0);
            }
        }
    }

    let symbols = cache.get(level).unwrap_or_default();
    println!(
        "{} level {} (seed {}): {} symbols in {} tick(s)",
        system.name,
        level,
        grammar.seed(),
        symbols.len(),
        ticks
    );
    if show {
        println!("{}", symbols.iter().collect::<String>());
    }
    Ok(())
}

/// Command-line changes applied on top of a session before rendering
struct RenderOverrides {
    level: Option<usize>,
    seed: Option<u32>,
    axiom: Option<String>,
    flat: bool,
    quick_draw: bool,
}

/// Drive the renderer one tick at a time and record the sink
fn render(
    config: &config::Config,
    mut session: Session,
    overrides: RenderOverrides,
    steps: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if let Some(level) = overrides.level {
        session.level = level;
    }
    let tuning = config.tuning.clone();
    let tick_length = tuning.tick_length;
    let mut renderer = session.into_renderer(tuning);

    if let Some(axiom) = overrides.axiom {
        let mut grammar = renderer.grammar().state().clone();
        grammar.axiom = axiom;
        renderer.set_grammar(grammar);
    }
    if let Some(seed) = overrides.seed {
        renderer.set_seed(seed);
    }
    if overrides.flat || overrides.quick_draw {
        let mut settings = renderer.settings().clone();
        settings.upright &= !overrides.flat;
        settings.quick_draw |= overrides.quick_draw;
        renderer.configure(settings);
    }
    let session = Session::capture(&renderer);

    let mut path: Vec<Vector3> = Vec::new();
    let mut moves = 0usize;
    let mut loading = 0usize;
    let mut events = Vec::new();
    for _ in 0..steps {
        for outcome in renderer.tick(tick_length, &mut path) {
            match outcome {
                StepOutcome::Moved => moves += 1,
                StepOutcome::Loading { .. } => loading += 1,
                _ => {}
            }
        }
        events.extend(renderer.drain_events());
        if renderer.is_halted() {
            break;
        }
    }

    for event in &events {
        if let RenderEvent::LevelDerived { level, symbols } = event {
            tracing::info!("Level {} ready ({} symbols)", level, symbols);
        }
    }

    let length: f64 = path.windows(2).map(|w| w[0].distance(w[1])).sum();
    println!(
        "Rendered level {} ({} symbols): {} moves, {} loading steps, progress {:.1}%, {} polygon(s){}",
        renderer.level(),
        renderer.sequence().map_or(0, |s| s.len()),
        moves,
        loading,
        renderer.progress() * 100.0,
        renderer.polygons().len(),
        if renderer.is_halted() { ", halted" } else { "" }
    );
    println!(
        "Cursor {} camera {} (offset {}), path length {:.3}",
        renderer.cursor(),
        renderer.camera(),
        renderer.relative_cursor(),
        length
    );
    println!("Orientation {}", renderer.orientation_string());

    if let Some(output) = output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let polygons: Vec<Vec<[f64; 3]>> = renderer
            .polygons()
            .iter()
            .map(|p| p.vertices.iter().map(|v| v.to_array()).collect())
            .collect();
        let data = serde_json::json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "session": session,
            "level": renderer.level(),
            "halted": renderer.is_halted(),
            "path": path.iter().map(|v| v.to_array()).collect::<Vec<_>>(),
            "polygons": polygons,
        });
        std::fs::write(output, serde_json::to_string_pretty(&data)?)?;
        println!("  -> {:?} ({} points)", output, path.len());
    }
    Ok(())
}

/// Build a grammar (logging any rule warnings) and print what it resolved to
fn check_system(config: &config::Config, id: &str) -> anyhow::Result<()> {
    let system = find_system(config, id)?;
    let grammar = Grammar::new(system.grammar.clone());

    let text = |d: &[char]| d.iter().collect::<String>();
    let describe = |p: &Production| match p {
        Production::Deterministic(d) => text(d),
        Production::Stochastic(choices) => format!(
            "{} ({} choices)",
            choices.iter().map(|c| text(c)).collect::<Vec<_>>().join(" | "),
            p.alternatives()
        ),
    };

    println!("{} [{}]", system.name, system.id);
    println!("  axiom: {}", text(grammar.axiom()));
    println!("  seed: {}", grammar.seed());
    for (symbol, production) in grammar.rules() {
        println!("  {} -> {}", symbol, describe(production));
    }
    for (symbol, production) in grammar.models() {
        println!("  ~{} -> {}", symbol, describe(production));
    }
    for symbol in TURN_SYMBOLS {
        if let Some(q) = grammar.rotation(symbol) {
            println!("  {} : {}", symbol, q);
        }
    }
    println!("  tropism: {}", grammar.tropism());

    let parsed = system.grammar.rules.iter().filter(|r| !r.trim().is_empty()).count();
    let kept = grammar.rules().count() + grammar.models().count();
    if kept < parsed {
        println!("  {} rule(s) skipped, see log", parsed - kept);
    }
    Ok(())
}
