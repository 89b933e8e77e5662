#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter for the Fiducial Sim utilities.
//!
//! `randomize` runs the marker randomizer against the in-memory host,
//! `coeffs` performs a single line-coefficient request, and `serve` hosts the
//! line-coefficient endpoint over newline-delimited JSON on stdin/stdout.

mod config;

use std::{io, path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use fiducial_sim_core::{SlotNaming, TargetSlot};
use fiducial_sim_service_node::{NodeError, ServeOutcome, ServiceNode};
use fiducial_sim_system_line_coefficients::LineCoefficientService;
use fiducial_sim_system_marker_randomizer::{MarkerRandomizer, SlotOutcome};
use fiducial_sim_world::{marker_arena, RenderLoop, SceneSlot};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;

const NODE_NAME: &str = "get_straightline_node";

/// How a subcommand finished; a node shutdown maps to a failing exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Success,
    NodeShutDown,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            Status::NodeShutDown => ExitCode::FAILURE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "fiducial-sim",
    about = "Marker randomizer and line-coefficient service for the simulation exercise",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    /// Settings file; defaults to ./fiducial-sim.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for a reproducible random source; entropy is used otherwise
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Randomize the markers of the demo arena and print the result.
    Randomize {
        /// Frames during which the scene is still loading
        #[arg(long, default_value_t = 1)]
        ready_after: u32,

        /// Frames to render before giving up
        #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
        max_frames: u64,

        /// Slot whose model is removed from the arena (repeatable)
        #[arg(long = "missing")]
        missing: Vec<u8>,
    },

    /// Request one pair of line coefficients.
    Coeffs {
        /// Value of the request's ready flag
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        ready: bool,
    },

    /// Serve line-coefficient requests as JSON lines on stdin/stdout.
    Serve,
}

fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let rng = seeded_rng(cli.seed);

    let status = match cli.cmd {
        Cmd::Randomize {
            ready_after,
            max_frames,
            missing,
        } => randomize(&settings, rng, ready_after, max_frames, &missing)?,
        Cmd::Coeffs { ready } => coeffs(&settings, rng, ready)?,
        Cmd::Serve => serve(&settings, rng)?,
    };
    Ok(status.into())
}

/// Initialize tracing with an env-driven filter (default INFO), logging to stderr.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn randomize(
    settings: &Settings,
    mut rng: ChaCha8Rng,
    ready_after: u32,
    max_frames: u64,
    missing: &[u8],
) -> Result<Status> {
    let config = settings.randomizer_config()?;
    let naming = config.naming.clone();
    let (mut world, scene) = marker_arena(&naming, config.slot_count);
    for &index in missing {
        let slot = TargetSlot::new(index).context("slot indices start at 1")?;
        if world.remove_model(&slot.model_name(&naming)).is_none() {
            bail!("{slot} is not part of the arena");
        }
    }
    let mut scene_slot = SceneSlot::ready_after_polls(scene, ready_after);

    let mut randomizer = MarkerRandomizer::load(config, &world, &mut scene_slot, &mut rng)
        .context("failed to load marker randomizer")?;
    let frames = {
        let mut render_loop = RenderLoop::new();
        let _ = render_loop.connect_pre_render(&mut randomizer);
        render_loop.run_until_idle(max_frames)
    };

    let Some(report) = randomizer.report() else {
        bail!("scene did not become ready within {max_frames} frames");
    };
    info!(frames, "randomizer disconnected");
    for (slot, outcome) in report.slots() {
        println!("{}", describe(*slot, outcome, &naming));
    }

    Ok(Status::Success)
}

fn describe(slot: TargetSlot, outcome: &SlotOutcome, naming: &SlotNaming) -> String {
    let model = slot.model_name(naming);
    match outcome {
        SlotOutcome::Applied { material, .. } => format!("{model} -> {material}"),
        SlotOutcome::ModelMissing { .. } => format!("{model} -> skipped (model not found)"),
        SlotOutcome::LinkMissing { link } => format!("{model} -> skipped (link {link} not found)"),
        SlotOutcome::VisualMissing { visual } => {
            format!("{model} -> skipped (visual {visual} not found)")
        }
    }
}

fn coefficient_node(settings: &Settings, rng: ChaCha8Rng) -> Result<ServiceNode> {
    let ranges = settings.coefficient_ranges()?;
    let mut node = ServiceNode::new(NODE_NAME);
    node.advertise(
        &settings.coefficients.endpoint,
        LineCoefficientService::new(ranges, rng),
    )?;
    Ok(node)
}

fn coeffs(settings: &Settings, rng: ChaCha8Rng, ready: bool) -> Result<Status> {
    let mut node = coefficient_node(settings, rng)?;
    let request = serde_json::json!({ "ready": ready }).to_string();

    match node.call(&settings.coefficients.endpoint, &request) {
        Ok(response) => {
            println!("{response}");
            Ok(Status::Success)
        }
        Err(NodeError::Fatal { endpoint, reason }) => {
            error!(%endpoint, %reason, "node shut down");
            Ok(Status::NodeShutDown)
        }
        Err(other) => Err(other.into()),
    }
}

fn serve(settings: &Settings, rng: ChaCha8Rng) -> Result<Status> {
    let mut node = coefficient_node(settings, rng)?;
    info!(endpoint = %settings.coefficients.endpoint, "serving requests on stdin");

    let stdin = io::stdin();
    let stdout = io::stdout();
    match node
        .serve(stdin.lock(), stdout.lock())
        .context("serve loop failed")?
    {
        ServeOutcome::Drained => Ok(Status::Success),
        ServeOutcome::ShutDown => {
            error!(node = node.name(), "node shut down after fatal request");
            Ok(Status::NodeShutDown)
        }
    }
}
