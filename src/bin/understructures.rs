use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rand::Rng as _;

use understructures::{
    AssetCatalog as _, Canvas, CanvasOp, Config, Engine, FsCatalog, Notice, Palette, Phase,
};

/// Virtual frame period of the headless driver (60 fps).
const FRAME_MS: u64 = 1000 / 60;

#[derive(Parser, Debug)]
#[command(name = "understructures", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the generator headless and export the composition as PNG.
    Render(RenderArgs),
    /// Run the generator and dump its draw calls and notices as JSON.
    Plan(PlanArgs),
    /// List the sprites an asset directory offers.
    Catalog(CatalogArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Asset directory holding `white/` and `black/` sprite folders.
    #[arg(long)]
    assets: PathBuf,

    /// JSON config; omitted fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run seed. Drawn at random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Sets to complete after the ready signal before stopping.
    #[arg(long, default_value_t = 0)]
    sets: u64,

    /// Hold fast-forward for the whole run.
    #[arg(long)]
    fast_forward: bool,

    /// Give up after this much virtual time.
    #[arg(long, default_value_t = 3_600_000)]
    max_virtual_ms: u64,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Directory the exported PNG is written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Output JSON path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct CatalogArgs {
    /// Asset directory holding `white/` and `black/` sprite folders.
    #[arg(long)]
    assets: PathBuf,
}

#[derive(serde::Serialize)]
struct PlanDump<'a> {
    seed: u64,
    notices: &'a [Notice],
    ops: &'a [CanvasOp],
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Plan(args) => cmd_plan(args),
        Command::Catalog(args) => cmd_catalog(args),
    }
}

fn load_config(args: &RunArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_path(path)?,
        None => Config::default(),
    };
    config.fast_forward |= args.fast_forward;
    Ok(config)
}

fn pick_seed(args: &RunArgs) -> u64 {
    let seed = args
        .seed
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..999_999_999));
    tracing::info!(seed, "run seed");
    seed
}

/// Step the engine on a virtual 60 fps clock until `sets` sets have completed
/// after the ready signal, or the machine parks. Returns every notice seen.
fn drive<K: Canvas>(engine: &mut Engine<K>, args: &RunArgs) -> anyhow::Result<Vec<Notice>> {
    let mut seen = Vec::new();
    let mut ready = false;
    let mut sets_after_ready = 0u64;
    let mut now = 0u64;

    engine.reset();
    loop {
        engine.advance_to(now)?;
        engine.frame()?;

        for notice in engine.take_notices() {
            match &notice {
                Notice::Ready { .. } => ready = true,
                Notice::SetCompleted { .. } if ready => sets_after_ready += 1,
                Notice::Halted { reason } => anyhow::bail!("generation halted: {reason}"),
                _ => {}
            }
            seen.push(notice);
        }

        if (ready && sets_after_ready >= args.sets) || engine.phase() == Phase::Parked {
            return Ok(seen);
        }
        if now >= args.max_virtual_ms {
            anyhow::bail!(
                "no result after {} ms of virtual time (phase {:?})",
                args.max_virtual_ms,
                engine.phase()
            );
        }

        now = match engine.next_wakeup() {
            Some(t) if t > now + FRAME_MS => t.div_ceil(FRAME_MS) * FRAME_MS,
            _ => now + FRAME_MS,
        };
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let config = load_config(&args.run)?;
    let seed = pick_seed(&args.run);
    let catalog = FsCatalog::open(&args.run.assets)?;
    let mut engine = Engine::raster(config, seed, Box::new(catalog))?;

    drive(&mut engine, &args.run)?;

    engine.request_export();
    engine.frame()?;
    let file_name = engine
        .take_notices()
        .into_iter()
        .find_map(|n| match n {
            Notice::ExportDue { file_name } => Some(file_name),
            _ => None,
        })
        .context("export was not granted")?;

    let out = args.out_dir.join(file_name);
    understructures::save_png(engine.canvas(), &out)?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = load_config(&args.run)?;
    let seed = pick_seed(&args.run);
    let catalog = FsCatalog::open(&args.run.assets)?;
    let mut engine = Engine::recording(config, seed, Box::new(catalog))?;

    let notices = drive(&mut engine, &args.run)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let f = File::create(&args.out)
        .with_context(|| format!("create plan '{}'", args.out.display()))?;
    let dump = PlanDump {
        seed,
        notices: &notices,
        ops: engine.canvas().ops(),
    };
    serde_json::to_writer_pretty(BufWriter::new(f), &dump).context("write plan JSON")?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_catalog(args: CatalogArgs) -> anyhow::Result<()> {
    let catalog = FsCatalog::open(&args.assets)?;
    for palette in [Palette::Light, Palette::Dark] {
        let names = catalog.list(palette);
        println!("{} ({})", palette.folder(), names.len());
        for name in names {
            println!("  {name}");
        }
    }
    Ok(())
}
