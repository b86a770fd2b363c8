//! Headless runner for the barrage core: drives the demo stage with a
//! deterministic autopilot, records and plays back replays, and keeps the
//! progress file up to date.

mod demo;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use barrage_core::progress::Progress;
use barrage_core::replay::{GameKey, PlayerInit, Replay};
use barrage_sim::{InputFlags, Stage, StageOutcome};

#[derive(Parser, Debug)]
#[command(name = "barrage", version, about = "barrage - danmaku core runtime")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,

    /// Path to the progress file
    #[arg(long, default_value = "progress.dat")]
    progress: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo stage with the built-in autopilot
    Run {
        /// RNG seed; derived from the clock when omitted
        #[arg(long)]
        seed: Option<u64>,

        /// Hard frame cap in case the stage never ends
        #[arg(long, default_value_t = 18000)]
        max_frames: i32,

        /// Record the run as a replay file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Log a frame report every N frames (0 disables)
        #[arg(long, default_value_t = 600)]
        report_interval: i32,
    },
    /// Play back a recorded replay
    Replay {
        path: PathBuf,

        #[arg(long, default_value_t = 18000)]
        max_frames: i32,
    },
}

const KEY_TABLE: [(GameKey, InputFlags); 8] = [
    (GameKey::Up, InputFlags::UP),
    (GameKey::Down, InputFlags::DOWN),
    (GameKey::Left, InputFlags::LEFT),
    (GameKey::Right, InputFlags::RIGHT),
    (GameKey::Focus, InputFlags::FOCUS),
    (GameKey::Shot, InputFlags::SHOT),
    (GameKey::Bomb, InputFlags::BOMB),
    (GameKey::Skip, InputFlags::SKIP),
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("barrage v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run { seed, max_frames, record, report_interval } => {
            let seed = seed.unwrap_or_else(seed_from_clock);
            run_demo(seed, max_frames, record.as_deref(), report_interval, &args.progress);
        }
        Command::Replay { path, max_frames } => {
            if let Err(e) = run_replay(&path, max_frames, &args.progress) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Only the runtime touches the wall clock; the simulation itself never does.
fn seed_from_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Scripted input for headless runs: always firing, weaving sideways, with
/// periodic focus phases. Purely a function of the frame number, so runs
/// with the same seed are reproducible.
fn autopilot_input(frame: i32) -> InputFlags {
    let mut flags = InputFlags::SHOT;
    match (frame / 90) % 4 {
        0 => flags.insert(InputFlags::LEFT),
        1 | 2 => flags.insert(InputFlags::RIGHT),
        _ => flags.insert(InputFlags::LEFT),
    }
    if frame % 900 > 600 {
        flags.insert(InputFlags::FOCUS);
    }
    flags
}

fn record_edges(replay: &mut Replay, frame: i32, prev: InputFlags, now: InputFlags) {
    for (key, flag) in KEY_TABLE {
        let was = prev.contains(flag);
        let is = now.contains(flag);
        if was != is {
            replay.push(frame, key, is);
        }
    }
}

fn player_init(stage: &Stage) -> PlayerInit {
    let world = stage.world_ref();
    let plr = world.player().expect("demo stage has a player");
    PlayerInit {
        pos: [plr.pos.x, plr.pos.y],
        lives: plr.lives,
        bombs: plr.bombs,
        power: plr.power,
        shot_mode: plr.mode.name.to_string(),
    }
}

fn report(stage: &Stage, sprites: usize, sounds: usize) {
    let world = stage.world_ref();
    tracing::info!(
        "frame {}: {} bullets, {} enemies, {} items, {} tasks | {} sprites, {} sfx | {} pts",
        stage.frame(),
        world.projectile_count(),
        world.enemy_count(),
        world.item_count(),
        stage.sched().task_count(),
        sprites,
        sounds,
        stage.stats().points,
    );
}

fn summarize(stage: &Stage, progress_path: &Path) {
    let stats = stage.stats().clone();
    let outcome = stage.outcome();
    println!("--- stage over ---");
    println!("outcome:  {:?}", outcome);
    println!("frames:   {}", stage.frame());
    println!("points:   {}", stats.points);
    println!("graze:    {}", stats.graze);

    let mut progress = Progress::load(progress_path);
    progress.unlocked_stages.insert(demo::DEMO_STAGE_ID);
    if outcome == Some(StageOutcome::Win) {
        progress.unlocked_stages.insert(demo::DEMO_STAGE_ID + 1);
    }
    progress.hiscore = progress.hiscore.max(stats.points.min(u32::MAX as u64) as u32);
    if let Err(e) = progress.save(progress_path) {
        tracing::warn!("could not save progress: {}", e);
    }
}

fn run_demo(
    seed: u64,
    max_frames: i32,
    record: Option<&Path>,
    report_interval: i32,
    progress_path: &Path,
) {
    tracing::info!("seed: {:#x}", seed);
    let stage = Stage::new(seed);
    demo::setup(&stage);

    let mut replay = Replay::new(seed, demo::DEMO_STAGE_ID, player_init(&stage));
    let mut prev = InputFlags::default();

    while stage.outcome().is_none() && stage.frame() < max_frames {
        let flags = autopilot_input(stage.frame());
        record_edges(&mut replay, stage.frame(), prev, flags);
        prev = flags;

        stage.set_input(flags);
        stage.tick();

        let frame_out = stage.render();
        if report_interval > 0 && stage.frame() % report_interval == 0 {
            report(&stage, frame_out.sprites.len(), frame_out.audio.len());
        }
    }

    if stage.outcome().is_none() {
        tracing::warn!("frame cap reached, aborting stage");
        stage.finish(StageOutcome::Abort);
    }

    summarize(&stage, progress_path);

    if let Some(path) = record {
        match replay.save(path) {
            Ok(()) => tracing::info!("replay saved to {}", path.display()),
            Err(e) => tracing::warn!("could not save replay: {}", e),
        }
    }

    stage.teardown();
}

fn run_replay(path: &Path, max_frames: i32, progress_path: &Path) -> Result<(), String> {
    let replay = Replay::load(path).map_err(|e| e.to_string())?;
    if replay.stage != demo::DEMO_STAGE_ID {
        return Err(format!("replay is for unknown stage {}", replay.stage));
    }
    tracing::info!(
        "replaying seed {:#x}, {} input events",
        replay.seed,
        replay.events.len()
    );

    let stage = Stage::new(replay.seed);
    demo::setup(&stage);

    let mut flags = InputFlags::default();
    while stage.outcome().is_none() && stage.frame() < max_frames {
        for event in replay.events_at(stage.frame()) {
            let flag = InputFlags::from_key(event.key);
            if event.down {
                flags.insert(flag);
            } else {
                flags.remove(flag);
            }
        }
        stage.set_input(flags);
        stage.tick();
        stage.render();
    }

    if stage.outcome().is_none() {
        stage.finish(StageOutcome::Abort);
    }
    summarize(&stage, progress_path);
    stage.teardown();
    Ok(())
}
