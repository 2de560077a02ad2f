//! Scripted day in the demo village: loads content, spawns the market-day
//! NPCs, runs their schedules with the background loop, talks to the
//! innkeeper and plays through the wolf quest.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rpg_core::config::CoreConfig;
use rpg_core::content;
use rpg_core::dialog::{DialogSession, DialogStatus, QUIT_TOPIC};
use rpg_core::error::{CoreError, CoreResult};
use rpg_core::event_bus::{Event, event_types, keys};
use rpg_core::ids::{CharacterDefId, DialogProfileId, MapId, ScenarioId, TopicId};
use rpg_core::npc::{NavGrid, TaskDef, TaskPriority};
use rpg_core::quest::{QuestEngine, QuestStatus};
use rpg_core::world::{GameClock, GameContext, PlayerInfo, World};

const VILLAGE: &[&str] = &[
    "..........",
    ".##....##.",
    ".##....##.",
    "..........",
    "....##....",
    "....##....",
    "..........",
    "..........",
];

const FRAME: Duration = Duration::from_millis(20);
const FRAMES_PER_HOUR: usize = 12;
const START_HOUR: u8 = 5;
const HOURS_TO_PLAY: usize = 16;
const MAX_DIALOG_STEPS: usize = 64;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("rpg-core: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(config: &CoreConfig) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| CoreError::Config(format!("bad log filter: {}", e)))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run() -> CoreResult<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = CoreConfig::load(&config_path)?;
    init_tracing(&config)?;

    let defs = Arc::new(content::load_dir(&config.content_dir)?);
    let world = World::new(
        defs,
        config,
        &CharacterDefId::new("player"),
        PlayerInfo {
            player_name: "Traveler".into(),
            player_culture: None,
        },
    )?;
    let quests = QuestEngine::new(world.clone());
    quests.attach(&world.bus())?;

    world.set_clock(GameClock::at(START_HOUR, 0)?);
    world.queue_scenario(&ScenarioId::new("market_day"))?;
    let coordinator = world.load_map(&MapId::new("village"), NavGrid::from_rows(VILLAGE)?)?;
    coordinator.start_background_jobs()?;

    for _ in 0..HOURS_TO_PLAY {
        play_hour(&world, world.clock().hour())?;
        for _ in 0..FRAMES_PER_HOUR {
            for request in world.update_frame()? {
                info!("{} wants to talk", request.npc_id);
                run_dialog(&world, &request.profile)?;
            }
            tokio::time::sleep(FRAME).await;
        }
        world.advance_time(60)?;
    }

    for state in quests.quest_states() {
        info!(
            "Quest {}: {} (stage {})",
            state.quest_id,
            state.status.as_str(),
            state.current_stage.as_ref().map(|s| s.as_str()).unwrap_or("-")
        );
        for progress in state.objectives.values() {
            info!(
                "  {}: {}/{} ({:.0}%)",
                progress.objective_id,
                progress.current,
                progress.target,
                progress.progress_percent() * 100.0
            );
        }
    }
    let completed = quests.quests_with_status(QuestStatus::Completed);
    info!("{} quests completed, player holds {} coins", completed.len(), world.player_money()?);

    if let Some(coordinator) = world.unload_map() {
        coordinator.join_background_jobs().await?;
    }

    let snapshot = serde_json::to_string_pretty(&world.snapshot())
        .map_err(|e| CoreError::invariant(format!("snapshot did not serialize: {}", e)))?;
    println!("{}", snapshot);
    Ok(())
}

/// Gameplay that would come from the player in a real client.
fn play_hour(world: &World, hour: u8) -> CoreResult<()> {
    match hour {
        7 => world.assign_task_to_npc(
            &CharacterDefId::new("innkeeper"),
            &TaskDef::new("start_dialog", TaskPriority::Assigned, serde_json::Value::Null),
        ),
        9 => world.broadcast(Event::new(event_types::TALK).with(keys::TARGET, "farmer_jon")),
        11 => world.broadcast(
            Event::new(event_types::KILL)
                .with(keys::TARGET, "wolf")
                .with(keys::COUNT, 2),
        ),
        13 => world.broadcast(Event::new(event_types::TALK).with(keys::TARGET, "farmer_jon")),
        _ => Ok(()),
    }
}

/// Ask every available topic once, take the first reply each time, then
/// say goodbye.
fn run_dialog(world: &World, profile: &DialogProfileId) -> CoreResult<()> {
    let mut session = DialogSession::new(world.clone(), profile.clone())?;
    let mut asked: HashSet<TopicId> = HashSet::new();

    for _ in 0..MAX_DIALOG_STEPS {
        match session.status() {
            DialogStatus::Started => {
                info!("{}: {}", profile, session.text());
                session.advance()?;
            }
            DialogStatus::TextDone => session.advance()?,
            DialogStatus::UserReply => {
                info!("> {}", session.replies()[0].text);
                session.apply_reply(0)?;
            }
            DialogStatus::ActionInProgress => {
                info!("{}: {}", profile, session.text());
                let name = world.player_info().player_name;
                session.complete_action(&name)?;
            }
            DialogStatus::Finished => {
                if session.should_exit() {
                    return Ok(());
                }
                let options = session.topic_options()?;
                let pick = options
                    .iter()
                    .find(|o| o.id.as_str() != QUIT_TOPIC && !asked.contains(&o.id))
                    .or_else(|| options.iter().find(|o| o.id.as_str() == QUIT_TOPIC))
                    .ok_or_else(|| CoreError::invariant("dialog offered no quit option"))?;
                info!("> {}", pick.prompt);
                asked.insert(pick.id.clone());
                session.set_topic(&pick.id)?;
            }
        }
    }
    warn!("Dialog with {} did not finish", profile);
    Ok(())
}
