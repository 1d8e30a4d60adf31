mod state;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hakitree_engine::persistence::export_file_name;
use hakitree_engine::selection::{AuxiliaryKind, NodeStatus};
use hakitree_engine::storage::SAVE_SLOT;
use hakitree_engine::{
    AuxiliaryRequest, AuxiliaryValue, AwakeningConfig, EngineError, RandomFilter, Rng,
    SelectionKey, Session,
};
use state::Workspace;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hakitree")]
#[command(about = "Haki skill-tree builder: select skills, lay out trees, save characters")]
struct Cli {
    /// Use the trees compiled into the binary instead of the data directory.
    #[arg(long, global = true, default_value_t = false)]
    bundled: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Validate,
    Layout {
        #[arg(long)]
        tree: Option<String>,
        #[arg(long, default_value_t = false)]
        fingerprint: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Status {
        #[arg(long)]
        tree: Option<String>,
    },
    /// Select `tree::skill`. Nodes that need input are cancelled unless a value is given.
    Select {
        key: String,
        #[arg(long)]
        pool_choice: Option<i64>,
        #[arg(long)]
        awakening_pool: Option<i64>,
        #[arg(long)]
        awakening_cap: Option<i64>,
        /// Accept the prompt's default value.
        #[arg(long, default_value_t = false)]
        defaults: bool,
    },
    Deselect {
        key: String,
    },
    Randomize {
        #[arg(long, default_value = "all")]
        mode: String,
        #[arg(long)]
        seed: Option<u64>,
    },
    Reset,
    Stats {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Save,
    Load,
    Export {
        path: Option<PathBuf>,
    },
    Import {
        path: PathBuf,
    },
    SetPoints {
        points: u32,
    },
    SetName {
        name: String,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut ws = Workspace::open(cli.bundled)?;

    match cli.command {
        Commands::Validate => cmd_validate(&ws),
        Commands::Layout {
            tree,
            fingerprint,
            json,
        } => cmd_layout(&ws, tree.as_deref(), fingerprint, json),
        Commands::Status { tree } => cmd_status(&ws, tree.as_deref()),
        Commands::Select {
            key,
            pool_choice,
            awakening_pool,
            awakening_cap,
            defaults,
        } => cmd_select(
            &mut ws,
            &key,
            PromptAnswers {
                pool_choice,
                awakening_pool,
                awakening_cap,
                defaults,
            },
        ),
        Commands::Deselect { key } => cmd_deselect(&mut ws, &key),
        Commands::Randomize { mode, seed } => cmd_randomize(&mut ws, &mode, seed),
        Commands::Reset => cmd_reset(&mut ws),
        Commands::Stats { json } => cmd_stats(&ws, json),
        Commands::Save => cmd_save(&mut ws),
        Commands::Load => cmd_load(&mut ws),
        Commands::Export { path } => cmd_export(&ws, path),
        Commands::Import { path } => cmd_import(&mut ws, &path),
        Commands::SetPoints { points } => cmd_set_points(&mut ws, points),
        Commands::SetName { name } => cmd_set_name(&mut ws, &name),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HAKITREE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_key(raw: &str) -> Result<SelectionKey> {
    SelectionKey::parse(raw).with_context(|| format!("Expected tree::skill, got {raw:?}"))
}

fn cmd_validate(ws: &Workspace) -> Result<()> {
    let catalog = ws.engine.catalog();
    let nodes: usize = catalog.graphs().iter().map(|g| g.nodes().len()).sum();
    for graph in catalog.graphs() {
        let deepest = graph.depths().values().copied().max().unwrap_or(0);
        println!(
            "{:<18} {:>3} skills, depth {}  ({})",
            graph.id(),
            graph.nodes().len(),
            deepest,
            graph.title()
        );
    }
    println!(
        "OK: {} trees, {} skills, requirement graphs valid",
        catalog.graphs().len(),
        nodes
    );
    Ok(())
}

fn cmd_layout(ws: &Workspace, tree: Option<&str>, fingerprint: bool, json: bool) -> Result<()> {
    let layout_engine = ws.engine.layout_engine();
    let catalog = ws.engine.catalog();
    let graphs: Vec<_> = match tree {
        Some(id) => vec![catalog.graph(id).with_context(|| format!("Unknown tree {id}"))?],
        None => catalog.graphs().iter().collect(),
    };

    for graph in graphs {
        let layout = layout_engine.layout(graph);
        if fingerprint {
            println!("{}  {}", layout.fingerprint(), layout.tree);
            continue;
        }
        if json {
            println!("{}", serde_json::to_string_pretty(&layout)?);
            continue;
        }
        println!("{} ({})", graph.title(), graph.id());
        for node in &layout.nodes {
            println!(
                "  {:<24} depth {}  ({:>6}, {:>6})",
                node.id, node.depth, node.pos.x, node.pos.y
            );
        }
        for band in &layout.tiers {
            println!("  -- {} divider at y={}", band.label, band.line_y);
        }
    }
    Ok(())
}

fn cmd_status(ws: &Workspace, tree: Option<&str>) -> Result<()> {
    let session = ws.session()?;
    let catalog = ws.engine.catalog();
    if !session.character_name.is_empty() {
        println!("Character: {}", session.character_name);
    }
    println!(
        "Points: {} of {} remaining",
        session.remaining_display(catalog),
        session.total_points
    );

    for graph in catalog.graphs() {
        if tree.is_some_and(|t| t != graph.id()) {
            continue;
        }
        println!("{}", graph.title());
        for node in graph.nodes() {
            let status = match session.node_status(graph, &node.id) {
                Some(NodeStatus::Selected) => "selected",
                Some(NodeStatus::Available) => "available",
                Some(NodeStatus::Locked) | None => "locked",
            };
            println!(
                "  [{:<9}] {}::{}  cost {}  requires {}",
                status,
                graph.id(),
                node.id,
                node.cost,
                graph.requires_display(node)
            );
        }
    }
    Ok(())
}

/// Command-line stand-ins for the interactive auxiliary prompt.
struct PromptAnswers {
    pool_choice: Option<i64>,
    awakening_pool: Option<i64>,
    awakening_cap: Option<i64>,
    defaults: bool,
}

impl PromptAnswers {
    fn answer(&self, request: &AuxiliaryRequest) -> Option<AuxiliaryValue> {
        match request.kind {
            AuxiliaryKind::PoolChoice { default } => match self.pool_choice {
                Some(v) => Some(AuxiliaryValue::PoolChoice(v)),
                None if self.defaults => Some(AuxiliaryValue::PoolChoice(default)),
                None => None,
            },
            AuxiliaryKind::Awakening { default } => {
                if self.awakening_pool.is_none() && self.awakening_cap.is_none() && !self.defaults {
                    return None;
                }
                Some(AuxiliaryValue::Awakening(AwakeningConfig {
                    pool: self.awakening_pool.unwrap_or(default.pool),
                    cap: self.awakening_cap.unwrap_or(default.cap),
                }))
            }
        }
    }
}

fn cmd_select(ws: &mut Workspace, raw_key: &str, answers: PromptAnswers) -> Result<()> {
    let key = parse_key(raw_key)?;
    let mut session = ws.session()?;
    let machine = ws.engine.selection();

    let mut resolver =
        |request: &AuxiliaryRequest| -> Option<AuxiliaryValue> { answers.answer(request) };
    match machine.select_request(&mut session, &key.tree, &key.skill, &mut resolver) {
        Ok(_) => {}
        Err(EngineError::AuxiliaryCancelled(key)) => {
            println!("Cancelled {key}: pass a value (or --defaults) to answer its prompt");
            return Ok(());
        }
        Err(err) => return Err(err).with_context(|| format!("Cannot select {key}")),
    }

    ws.autosave(&session)?;
    println!(
        "Selected {}. {} points remaining",
        key,
        session.remaining_display(ws.engine.catalog())
    );
    Ok(())
}

fn cmd_deselect(ws: &mut Workspace, raw_key: &str) -> Result<()> {
    let key = parse_key(raw_key)?;
    let mut session = ws.session()?;
    ws.engine
        .selection()
        .deselect_request(&mut session, &key.tree, &key.skill)
        .with_context(|| format!("Cannot deselect {key}"))?;
    ws.autosave(&session)?;
    println!(
        "Deselected {}. {} points remaining",
        key,
        session.remaining_display(ws.engine.catalog())
    );
    Ok(())
}

fn cmd_randomize(ws: &mut Workspace, mode: &str, seed: Option<u64>) -> Result<()> {
    let Some(filter) = RandomFilter::parse_mode(mode) else {
        bail!(
            "Unknown randomize mode {mode:?} \
             (all, arm-offense, arm-defense, obs-offense, obs-defense)"
        );
    };
    let mut rng = seed.map_or_else(Rng::from_time, Rng::new);
    let mut session = ws.session()?;

    let report = ws.engine.selection().randomize_fill(
        &mut session,
        |tree, node| filter.matches(tree, node),
        &mut rng,
    )?;
    ws.autosave(&session)?;

    if report.picked.is_empty() {
        println!("Nothing eligible to pick");
    }
    for key in &report.picked {
        println!("Picked {key}");
    }
    println!("{} points remaining", report.remaining.max(0));
    Ok(())
}

fn cmd_reset(ws: &mut Workspace) -> Result<()> {
    let mut session = ws.session()?;
    ws.engine.selection().reset(&mut session);
    ws.autosave(&session)?;
    println!("Reset all selections");
    Ok(())
}

fn cmd_stats(ws: &Workspace, json: bool) -> Result<()> {
    let session = ws.session()?;
    let stats = ws.engine.stats(&session);
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Pool:              {}", stats.pool);
    println!("Cap (attack):      {}", stats.cap_attack);
    println!("Cap (defend):      {}", stats.cap_defend);
    println!("Die (attack):      {}", stats.dice_attack);
    println!("Die (defend):      {}", stats.dice_defend);
    println!("Focus modifier:    {}", stats.focus_modifier);
    println!("Observation range: {}", stats.observation_range);
    Ok(())
}

fn cmd_save(ws: &mut Workspace) -> Result<()> {
    let session = ws.session()?;
    let codec = ws.engine.codec();
    codec
        .store(&mut ws.storage, SAVE_SLOT, &session)
        .context("Failed to write save slot")?;
    println!("Saved {} selections", session.selected_len());
    Ok(())
}

fn cmd_load(ws: &mut Workspace) -> Result<()> {
    let current = ws.session()?;
    let Some(session) = ws
        .engine
        .codec()
        .load(&ws.storage, SAVE_SLOT, &current)
        .context("Saved record is unusable; current selection kept")?
    else {
        bail!("No saved record to load");
    };
    ws.autosave(&session)?;
    println!("Loaded {} selections", session.selected_len());
    Ok(())
}

fn cmd_export(ws: &Workspace, path: Option<PathBuf>) -> Result<()> {
    let session = ws.session()?;
    let path = path.unwrap_or_else(|| PathBuf::from(export_file_name(&session.character_name)));
    let json = ws.engine.codec().export_json(&session)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Exported to {}", path.display());
    Ok(())
}

fn cmd_import(ws: &mut Workspace, path: &PathBuf) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let current = ws.session()?;
    let session: Session = ws
        .engine
        .codec()
        .import_json(&text, &current)
        .with_context(|| format!("Invalid character file {}", path.display()))?;
    ws.autosave(&session)?;
    println!("Imported {} selections", session.selected_len());
    Ok(())
}

fn cmd_set_points(ws: &mut Workspace, points: u32) -> Result<()> {
    let mut session = ws.session()?;
    session.total_points = points;
    ws.autosave(&session)?;
    let remaining = session.remaining(ws.engine.catalog());
    if remaining < 0 {
        tracing::warn!(remaining, "budget is below what is already spent");
    }
    println!("Total points set to {points}");
    Ok(())
}

fn cmd_set_name(ws: &mut Workspace, name: &str) -> Result<()> {
    let mut session = ws.session()?;
    session.character_name = name.trim().to_string();
    ws.autosave(&session)?;
    println!("Character name set to {:?}", session.character_name);
    Ok(())
}
