//! NPC Coordinator
//!
//! One per loaded map. The frame loop calls [`NpcCoordinator::update_frame`];
//! a background tokio task calls [`NpcCoordinator::assist_all_once`] at a
//! capped rate so path planning stays off the frame loop. Both touch an NPC
//! only while holding that NPC's slot lock, and no code path holds two slot
//! locks at once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::jam::{Jam, StuckNpc, find_jams};
use super::pathfinding::NavGrid;
use super::schedule::{HOURS_PER_DAY, ScheduleDef, TaskDef, TaskPriority};
use super::task::{Task, TaskStatus, TaskStep, validate_task_chain};
use crate::config::NpcConfig;
use crate::error::{CoreError, CoreResult, ErrorCategory};
use crate::event_bus::{EventBus, keys};
use crate::ids::{CharacterDefId, CharacterStateId, DialogProfileId, MapId, TaskId, TilePos};

const MACHINE: &str = "npc coordinator";

/// Everything needed to put an NPC on the map.
#[derive(Debug, Clone)]
pub struct NpcSpawn {
    pub npc_id: CharacterStateId,
    pub def_id: CharacterDefId,
    pub position: TilePos,
    pub schedule: Option<ScheduleDef>,
    /// Opened by `start_dialog` tasks that name no profile
    pub dialog_profile: Option<DialogProfileId>,
}

#[derive(Debug)]
struct NpcSlot {
    npc_id: CharacterStateId,
    def_id: CharacterDefId,
    /// Resolution priority; lower wins collisions and jams
    priority: u32,
    position: TilePos,
    schedule: Option<ScheduleDef>,
    dialog_profile: Option<DialogProfileId>,
    /// Hour whose schedule task was last loaded
    schedule_hour: Option<u8>,
    task: Option<Task>,
    blocked_frames: u32,
}

/// Read-only copy of one NPC's state.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcView {
    pub npc_id: CharacterStateId,
    pub def_id: CharacterDefId,
    pub priority: u32,
    pub position: TilePos,
    pub task_id: Option<TaskId>,
    pub task_priority: Option<TaskPriority>,
    pub task_status: Option<TaskStatus>,
    pub blocked_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The NPC had no running task
    Assigned,
    /// A running task of equal or lower priority was dropped
    Replaced,
    /// The running task has higher priority; nothing changed
    Rejected,
}

/// An NPC's task asked the host to open a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub npc_id: CharacterStateId,
    pub profile: DialogProfileId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JamResolution {
    pub leader: CharacterStateId,
    pub stepped_aside: Vec<(CharacterStateId, TilePos)>,
    /// Members with no free tile next to them; they stay stuck
    pub waiting: Vec<CharacterStateId>,
}

type SlotHandle = Arc<Mutex<NpcSlot>>;
type Occupancy = HashMap<TilePos, (CharacterStateId, u32)>;

/// Drop a task that failed. Assigned and emergency tasks fall back to the
/// schedule; a failed schedule task idles until the hour changes.
fn abandon_task(slot: &mut NpcSlot) {
    if let Some(task) = slot.task.take() {
        if task.priority() > TaskPriority::Schedule {
            slot.schedule_hour = None;
        }
    }
    slot.blocked_frames = 0;
}

fn lock<T>(mutex: &Mutex<T>) -> CoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| CoreError::invariant("npc coordinator lock poisoned"))
}

#[derive(Debug)]
pub struct NpcCoordinator {
    map_id: MapId,
    grid: NavGrid,
    config: NpcConfig,
    slots: DashMap<CharacterStateId, SlotHandle>,
    next_priority: AtomicU32,
    stuck: Mutex<Vec<CharacterStateId>>,
    /// Checked by the background loop at the top of every iteration
    run_background: AtomicBool,
    background_running: AtomicBool,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl NpcCoordinator {
    pub fn new(map_id: MapId, grid: NavGrid, config: NpcConfig) -> Arc<Self> {
        Arc::new(Self {
            map_id,
            grid,
            config,
            slots: DashMap::new(),
            next_priority: AtomicU32::new(0),
            stuck: Mutex::new(Vec::new()),
            run_background: AtomicBool::new(false),
            background_running: AtomicBool::new(false),
            background_task: Mutex::new(None),
        })
    }

    pub fn map_id(&self) -> &MapId {
        &self.map_id
    }

    pub fn grid(&self) -> &NavGrid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ========================================================================
    // NPC Management
    // ========================================================================

    /// Put an NPC on the map. Returns its resolution priority, taken from a
    /// counter that only goes up.
    pub fn add_npc(&self, spawn: NpcSpawn) -> CoreResult<u32> {
        if spawn.npc_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "npc" });
        }
        if !self.grid.is_walkable(spawn.position) {
            return Err(CoreError::invalid(
                "npc",
                &spawn.npc_id,
                format!("spawn tile {} is not walkable on {}", spawn.position, self.map_id),
            ));
        }
        if let Some(schedule) = &spawn.schedule {
            for task in schedule.hourly.values() {
                validate_task_chain(task)?;
            }
        }
        if let Some((other, _)) = self.occupancy(&self.ordered_slots()?)?.get(&spawn.position) {
            return Err(CoreError::misuse(
                MACHINE,
                format!("spawn tile {} is taken by {}", spawn.position, other),
            ));
        }

        match self.slots.entry(spawn.npc_id.clone()) {
            Entry::Occupied(_) => Err(CoreError::duplicate("npc", &spawn.npc_id)),
            Entry::Vacant(vacant) => {
                let priority = self.next_priority.fetch_add(1, Ordering::SeqCst);
                info!(
                    "NPC {} spawned on {} at {} (priority {})",
                    spawn.npc_id, self.map_id, spawn.position, priority
                );
                vacant.insert(Arc::new(Mutex::new(NpcSlot {
                    npc_id: spawn.npc_id,
                    def_id: spawn.def_id,
                    priority,
                    position: spawn.position,
                    schedule: spawn.schedule,
                    dialog_profile: spawn.dialog_profile,
                    schedule_hour: None,
                    task: None,
                    blocked_frames: 0,
                })));
                Ok(priority)
            }
        }
    }

    pub fn remove_npc(&self, npc_id: &CharacterStateId) -> CoreResult<()> {
        if self.slots.remove(npc_id).is_none() {
            return Err(CoreError::not_found("npc", npc_id));
        }
        lock(&self.stuck)?.retain(|id| id != npc_id);
        info!("NPC {} removed from {}", npc_id, self.map_id);
        Ok(())
    }

    pub fn npc_ids(&self) -> Vec<CharacterStateId> {
        let mut ids: Vec<_> = self.slots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn npc(&self, npc_id: &CharacterStateId) -> CoreResult<NpcView> {
        let handle = self.slot(npc_id)?;
        let slot = lock(&handle)?;
        Ok(NpcView {
            npc_id: slot.npc_id.clone(),
            def_id: slot.def_id.clone(),
            priority: slot.priority,
            position: slot.position,
            task_id: slot.task.as_ref().map(|t| t.task_id().clone()),
            task_priority: slot.task.as_ref().map(Task::priority),
            task_status: slot.task.as_ref().map(Task::status),
            blocked_frames: slot.blocked_frames,
        })
    }

    /// Hand a task to an NPC. A running task with higher priority keeps the
    /// NPC; equal or lower priority is replaced.
    pub fn assign_task(&self, npc_id: &CharacterStateId, def: &TaskDef) -> CoreResult<AssignOutcome> {
        validate_task_chain(def)?;
        let task = Task::from_def(def)?;
        let handle = self.slot(npc_id)?;
        let mut slot = lock(&handle)?;
        if task.goal() == Some(slot.position) {
            return Err(CoreError::misuse(
                MACHINE,
                format!("NPC {} is already at goto goal {}", npc_id, slot.position),
            ));
        }

        let outcome = match slot.task.as_ref().filter(|t| !t.is_ended()) {
            Some(current) if current.priority() > def.priority => {
                info!(
                    "NPC {} keeps {} ({}) over {} ({})",
                    npc_id,
                    current.task_id(),
                    current.priority().as_str(),
                    def.task_id,
                    def.priority.as_str()
                );
                return Ok(AssignOutcome::Rejected);
            }
            Some(_) => AssignOutcome::Replaced,
            None => AssignOutcome::Assigned,
        };

        slot.task = Some(task);
        slot.blocked_frames = 0;
        info!(
            "NPC {} assigned {} ({})",
            npc_id,
            def.task_id,
            def.priority.as_str()
        );
        Ok(outcome)
    }

    // ========================================================================
    // Frame Update
    // ========================================================================

    /// Advance every NPC by one frame, in priority order, then resolve at
    /// most one jam. Returns the dialogs NPCs asked to open.
    pub fn update_frame(&self, hour: u8) -> CoreResult<Vec<DialogRequest>> {
        if hour >= HOURS_PER_DAY {
            return Err(CoreError::misuse(MACHINE, format!("hour {} out of range", hour)));
        }

        let npcs = self.ordered_slots()?;
        let mut occupancy = self.occupancy(&npcs)?;
        let mut requests = Vec::new();

        for handle in &npcs {
            let mut guard = lock(handle)?;
            let slot = &mut *guard;
            if let Err(e) = self.frame_npc(slot, hour, &mut occupancy, &mut requests) {
                if e.category() == ErrorCategory::Invariant {
                    return Err(e);
                }
                error!("NPC {} on {} drops its task: {}", slot.npc_id, self.map_id, e);
                abandon_task(slot);
            }
        }

        if !lock(&self.stuck)?.is_empty() {
            self.resolve_next_jam()?;
        }
        Ok(requests)
    }

    /// One NPC's frame: refresh, start and step its task, then move it or
    /// record the collision.
    fn frame_npc(
        &self,
        slot: &mut NpcSlot,
        hour: u8,
        occupancy: &mut Occupancy,
        requests: &mut Vec<DialogRequest>,
    ) -> CoreResult<()> {
        self.refresh_task(slot, hour)?;

        let Some(task) = slot.task.as_mut() else {
            return Ok(());
        };
        if task.status() == TaskStatus::NotStarted {
            if task.goal() == Some(slot.position) {
                debug!("NPC {} already at {}, {} ends", slot.npc_id, slot.position, task.task_id());
                task.end();
                return Ok(());
            }
            task.start(slot.position)?;
        }

        match task.step(slot.position) {
            TaskStep::Stay => {}
            TaskStep::Dialog(profile) => {
                let profile = profile.or_else(|| slot.dialog_profile.clone()).ok_or_else(|| {
                    CoreError::invalid("npc", &slot.npc_id, "start_dialog names no profile and the NPC has none")
                })?;
                debug!("NPC {} wants to talk ({})", slot.npc_id, profile);
                requests.push(DialogRequest {
                    npc_id: slot.npc_id.clone(),
                    profile,
                });
            }
            TaskStep::Blocked => self.note_blocked(slot)?,
            TaskStep::MoveTo(next) => match occupancy.get(&next) {
                Some((other, other_priority)) if *other != slot.npc_id => {
                    if *other_priority == slot.priority {
                        return Err(CoreError::invariant(format!(
                            "NPCs {} and {} share resolution priority {}",
                            slot.npc_id, other, slot.priority
                        )));
                    }
                    if slot.priority < *other_priority {
                        debug!("NPC {} blocked by {}, re-pathing", slot.npc_id, other);
                        task.request_repath();
                    } else {
                        debug!("NPC {} waiting for {}", slot.npc_id, other);
                    }
                    self.note_blocked(slot)?;
                }
                _ => {
                    occupancy.remove(&slot.position);
                    occupancy.insert(next, (slot.npc_id.clone(), slot.priority));
                    slot.position = next;
                    task.moved(next);
                    if slot.blocked_frames > 0 {
                        slot.blocked_frames = 0;
                        self.clear_stuck(&slot.npc_id)?;
                    }
                }
            },
        }
        Ok(())
    }

    /// Drop an ended task for its chained follow-up or the schedule, and
    /// switch schedule tasks when the hour changes.
    fn refresh_task(&self, slot: &mut NpcSlot, hour: u8) -> CoreResult<()> {
        if slot.task.as_ref().is_some_and(Task::is_ended) {
            if let Some(ended) = slot.task.take() {
                if let Some(next) = ended.def().next_task.as_deref() {
                    debug!("NPC {} chains {} -> {}", slot.npc_id, ended.task_id(), next.task_id);
                    slot.task = Some(Task::from_def(next)?);
                    return Ok(());
                }
                if ended.priority() > TaskPriority::Schedule {
                    info!("NPC {} finished {}, back to schedule", slot.npc_id, ended.task_id());
                    slot.schedule_hour = None;
                }
            }
        }

        let follows_schedule = slot
            .task
            .as_ref()
            .is_none_or(|t| t.priority() == TaskPriority::Schedule);
        if !follows_schedule || slot.schedule_hour == Some(hour) {
            return Ok(());
        }
        let Some(schedule) = &slot.schedule else {
            return Ok(());
        };

        let def = schedule.task_for_hour(hour)?;
        slot.schedule_hour = Some(hour);
        if slot.task.as_ref().is_some_and(|t| t.def() == def) {
            return Ok(());
        }
        let task = Task::from_def(def)?;
        if task.goal() == Some(slot.position) {
            debug!("NPC {} already at {} for hour {}", slot.npc_id, slot.position, hour);
            slot.task = None;
            return Ok(());
        }
        debug!("NPC {} hour {}: {}", slot.npc_id, hour, def.task_id);
        slot.task = Some(task);
        Ok(())
    }

    fn note_blocked(&self, slot: &mut NpcSlot) -> CoreResult<()> {
        slot.blocked_frames += 1;
        if slot.blocked_frames >= self.config.stuck_after_frames {
            self.report_stuck(&slot.npc_id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Stuck NPCs and Jams
    // ========================================================================

    /// Mark an NPC as unable to recover on its own. Repeat reports are ignored.
    pub fn report_stuck(&self, npc_id: &CharacterStateId) -> CoreResult<()> {
        let mut stuck = lock(&self.stuck)?;
        if stuck.contains(npc_id) {
            return Ok(());
        }
        warn!("NPC {} is stuck on {}", npc_id, self.map_id);
        stuck.push(npc_id.clone());
        Ok(())
    }

    /// Returns false (and warns) when the NPC was not reported stuck.
    pub fn recover_stuck(&self, npc_id: &CharacterStateId) -> CoreResult<bool> {
        if self.clear_stuck(npc_id)? {
            return Ok(true);
        }
        warn!("Tried to recover NPC {} which was not stuck", npc_id);
        Ok(false)
    }

    fn clear_stuck(&self, npc_id: &CharacterStateId) -> CoreResult<bool> {
        let mut stuck = lock(&self.stuck)?;
        let Some(index) = stuck.iter().position(|id| id == npc_id) else {
            return Ok(false);
        };
        stuck.swap_remove(index);
        info!("NPC {} recovered", npc_id);
        Ok(true)
    }

    pub fn stuck_npcs(&self) -> CoreResult<Vec<CharacterStateId>> {
        Ok(lock(&self.stuck)?.clone())
    }

    pub fn find_jams(&self) -> CoreResult<Vec<Jam>> {
        let ids = self.stuck_npcs()?;
        let mut stuck = Vec::with_capacity(ids.len());
        for npc_id in ids {
            let Some(handle) = self.slots.get(&npc_id).map(|e| Arc::clone(e.value())) else {
                error!("Stuck NPC {} is not on map {}", npc_id, self.map_id);
                continue;
            };
            let slot = lock(&handle)?;
            stuck.push(StuckNpc {
                npc_id,
                position: slot.position,
                priority: slot.priority,
            });
        }
        Ok(find_jams(&stuck))
    }

    /// Resolve the jam whose leader has the highest precedence. The leader
    /// keeps its goal and re-paths; every other member steps onto a free
    /// neighbouring tile if it has one.
    pub fn resolve_next_jam(&self) -> CoreResult<Option<JamResolution>> {
        let Some(jam) = self.find_jams()?.into_iter().next() else {
            return Ok(None);
        };
        let mut members = jam.members.into_iter();
        let Some(leader) = members.next() else {
            return Ok(None);
        };

        let mut taken: HashSet<TilePos> = self.occupancy(&self.ordered_slots()?)?.into_keys().collect();

        {
            let handle = self.slot(&leader.npc_id)?;
            let mut slot = lock(&handle)?;
            if let Some(task) = slot.task.as_mut() {
                task.request_repath();
            }
            slot.blocked_frames = 0;
        }
        self.clear_stuck(&leader.npc_id)?;

        let mut resolution = JamResolution {
            leader: leader.npc_id,
            ..Default::default()
        };
        for member in members {
            let handle = self.slot(&member.npc_id)?;
            let moved = {
                let mut guard = lock(&handle)?;
                let slot = &mut *guard;
                let free = slot
                    .position
                    .neighbors()
                    .into_iter()
                    .find(|p| self.grid.is_walkable(*p) && !taken.contains(p));
                if let Some(tile) = free {
                    taken.remove(&slot.position);
                    taken.insert(tile);
                    slot.position = tile;
                    slot.blocked_frames = 0;
                    if let Some(task) = slot.task.as_mut() {
                        task.request_repath();
                    }
                }
                free
            };
            match moved {
                Some(tile) => {
                    self.clear_stuck(&member.npc_id)?;
                    resolution.stepped_aside.push((member.npc_id, tile));
                }
                None => resolution.waiting.push(member.npc_id),
            }
        }

        info!(
            "Resolved jam on {}: {} leads, {} stepped aside, {} waiting",
            self.map_id,
            resolution.leader,
            resolution.stepped_aside.len(),
            resolution.waiting.len()
        );
        Ok(Some(resolution))
    }

    // ========================================================================
    // Background Jobs
    // ========================================================================

    /// One pass of background assistance over every NPC with a task.
    /// Returns how many tasks were assisted.
    pub fn assist_all_once(&self) -> CoreResult<usize> {
        let npcs = self.ordered_slots()?;
        let mut occupied: HashSet<TilePos> = self.occupancy(&npcs)?.into_keys().collect();
        let mut assisted = 0;

        for handle in &npcs {
            let mut guard = lock(handle)?;
            let slot = &mut *guard;
            let Some(task) = slot.task.as_mut() else {
                continue;
            };
            let own = occupied.remove(&slot.position);
            task.background_assist(
                slot.position,
                &self.grid,
                &occupied,
                self.config.max_path_iterations,
            );
            if own {
                occupied.insert(slot.position);
            }
            assisted += 1;
        }
        Ok(assisted)
    }

    /// Spawn the background loop on the current tokio runtime.
    pub fn start_background_jobs(self: &Arc<Self>) -> CoreResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CoreError::misuse(MACHINE, "background jobs need a tokio runtime"))?;
        if self.background_running.swap(true, Ordering::SeqCst) {
            return Err(CoreError::misuse(
                MACHINE,
                format!("background jobs already running on {}", self.map_id),
            ));
        }
        self.run_background.store(true, Ordering::SeqCst);

        let coordinator = Arc::clone(self);
        let period = Duration::from_millis(self.config.background_min_period_ms);
        let task = runtime.spawn(async move {
            info!("Starting NPC background jobs on {}", coordinator.map_id);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !coordinator.run_background.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = coordinator.assist_all_once() {
                    error!("NPC background jobs on {}: {}", coordinator.map_id, e);
                }
            }
            coordinator.background_running.store(false, Ordering::SeqCst);
            info!("Stopped NPC background jobs on {}", coordinator.map_id);
        });

        *lock(&self.background_task)? = Some(task);
        Ok(())
    }

    /// Ask the loop to exit at its next iteration.
    pub fn stop_background_jobs(&self) {
        if self.run_background.swap(false, Ordering::SeqCst) {
            debug!("Stop requested for NPC background jobs on {}", self.map_id);
        }
    }

    /// Wait for a stopped loop to finish.
    pub async fn join_background_jobs(&self) -> CoreResult<()> {
        let task = lock(&self.background_task)?.take();
        if let Some(task) = task {
            task.await
                .map_err(|e| CoreError::invariant(format!("background jobs task failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn is_background_running(&self) -> bool {
        self.background_running.load(Ordering::SeqCst)
    }

    /// Route `NPC:<def id>:assign_task` events to this NPC. Returns the
    /// subscriber id for unsubscribing.
    pub fn subscribe_npc_events(self: &Arc<Self>, bus: &EventBus, npc_id: &CharacterStateId) -> CoreResult<String> {
        let slot = self.slot(npc_id)?;
        let def_id = lock(&*slot)?.def_id.clone();
        let coordinator = Arc::downgrade(self);
        let target = npc_id.clone();
        let subscriber = format!("npc_coordinator_{}", self.map_id);

        bus.subscribe_npc_events(&subscriber, &def_id, move |event| {
            let Some(coordinator) = coordinator.upgrade() else {
                return Ok(());
            };
            let payload = event.get(keys::TASK_DEF).ok_or_else(|| {
                CoreError::invalid("event", &event.event_type, "missing task_def payload")
            })?;
            let def: TaskDef = serde_json::from_value(payload.clone()).map_err(|e| {
                CoreError::invalid("event", &event.event_type, format!("bad task_def: {}", e))
            })?;
            coordinator.assign_task(&target, &def)?;
            Ok(())
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn slot(&self, npc_id: &CharacterStateId) -> CoreResult<SlotHandle> {
        if npc_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "npc" });
        }
        self.slots
            .get(npc_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| CoreError::not_found("npc", npc_id))
    }

    /// Slot handles sorted by resolution priority. The map guard is released
    /// before any slot is locked.
    fn ordered_slots(&self) -> CoreResult<Vec<SlotHandle>> {
        let handles: Vec<SlotHandle> = self.slots.iter().map(|e| Arc::clone(e.value())).collect();
        let mut keyed = Vec::with_capacity(handles.len());
        for handle in handles {
            let priority = lock(&handle)?.priority;
            keyed.push((priority, handle));
        }
        keyed.sort_by_key(|(priority, _)| *priority);
        Ok(keyed.into_iter().map(|(_, h)| h).collect())
    }

    fn occupancy(&self, npcs: &[SlotHandle]) -> CoreResult<Occupancy> {
        let mut occupancy = HashMap::with_capacity(npcs.len());
        for handle in npcs {
            let slot = lock(handle)?;
            occupancy.insert(slot.position, (slot.npc_id.clone(), slot.priority));
        }
        Ok(occupancy)
    }
}
