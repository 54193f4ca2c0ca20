use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::info;
use zone_core::{
    admin, build_headless_app,
    notify::{drain_notifications, notification_channel, Notification, NotificationSender},
    run_tick, ZoneMetrics,
};
use zone_runtime::{
    CapabilityId, EntityId, PhysicalState, Position, ProgressionCategory, ProgressionSnapshot,
    TransientHandle, WorldAccess, WorldError,
};

const DEFAULT_TICKS: u64 = 400;
const DEFAULT_ENTITIES: u64 = 24;
const STEP_METERS: f32 = 3.0;
const WORLD_HALF_EXTENT: f32 = 120.0;

#[derive(Debug, Clone, Default)]
struct Walker {
    physical: PhysicalState,
    progression: ProgressionSnapshot,
    loadouts: BTreeSet<String>,
}

#[derive(Default)]
struct DemoState {
    walkers: BTreeMap<EntityId, Walker>,
    transients: HashMap<TransientHandle, String>,
    next_transient: u64,
}

/// Random-walk host world.
struct DemoWorld {
    state: Mutex<DemoState>,
    notifier: NotificationSender,
}

impl DemoWorld {
    fn new(entities: u64, rng: &mut SmallRng, notifier: NotificationSender) -> Self {
        let mut state = DemoState::default();
        for id in 0..entities {
            state.walkers.insert(EntityId(id), random_walker(rng));
        }
        Self {
            state: Mutex::new(state),
            notifier,
        }
    }

    fn step(&self, rng: &mut SmallRng, next_id: &mut u64) {
        let mut state = self.state.lock();
        for walker in state.walkers.values_mut() {
            let position = &mut walker.physical.position;
            position.x = (position.x + rng.gen_range(-STEP_METERS..=STEP_METERS))
                .clamp(-WORLD_HALF_EXTENT, WORLD_HALF_EXTENT);
            position.z = (position.z + rng.gen_range(-STEP_METERS..=STEP_METERS))
                .clamp(-WORLD_HALF_EXTENT, WORLD_HALF_EXTENT);
        }
        // Occasional disconnect and join.
        if rng.gen_bool(0.02) {
            let keys: Vec<EntityId> = state.walkers.keys().copied().collect();
            if !keys.is_empty() {
                let gone = keys[rng.gen_range(0..keys.len())];
                state.walkers.remove(&gone);
                info!(target: "zones::sim", entity = %gone, "walker.disconnected");
            }
            let joined = EntityId(*next_id);
            *next_id += 1;
            state.walkers.insert(joined, random_walker(rng));
        }
    }

    fn with_walker<T>(
        &self,
        entity: EntityId,
        apply: impl FnOnce(&mut Walker) -> T,
    ) -> Result<T, WorldError> {
        let mut state = self.state.lock();
        let walker = state
            .walkers
            .get_mut(&entity)
            .ok_or(WorldError::EntityGone(entity))?;
        Ok(apply(walker))
    }
}

fn random_walker(rng: &mut SmallRng) -> Walker {
    let mut walker = Walker::default();
    walker.physical.position = Position::new(
        rng.gen_range(-WORLD_HALF_EXTENT..WORLD_HALF_EXTENT),
        0.0,
        rng.gen_range(-WORLD_HALF_EXTENT..WORLD_HALF_EXTENT),
    );
    let tech: BTreeSet<CapabilityId> = (0..rng.gen_range(0..4)).map(CapabilityId).collect();
    walker
        .progression
        .insert(ProgressionCategory::TechUnlocks, tech);
    walker
}

impl WorldAccess for DemoWorld {
    fn tracked_entities(&self) -> Vec<EntityId> {
        self.state.lock().walkers.keys().copied().collect()
    }

    fn position(&self, entity: EntityId) -> Option<Position> {
        self.with_walker(entity, |walker| walker.physical.position).ok()
    }

    fn exists(&self, entity: EntityId) -> bool {
        self.state.lock().walkers.contains_key(&entity)
    }

    fn capture_physical(&self, entity: EntityId) -> Result<PhysicalState, WorldError> {
        self.with_walker(entity, |walker| walker.physical)
    }

    fn apply_physical(&self, entity: EntityId, state: &PhysicalState) -> Result<(), WorldError> {
        self.with_walker(entity, |walker| walker.physical = *state)
    }

    fn capture_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<BTreeSet<CapabilityId>, WorldError> {
        self.with_walker(entity, |walker| {
            walker
                .progression
                .get(&category)
                .cloned()
                .unwrap_or_default()
        })
    }

    fn clear_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<(), WorldError> {
        self.with_walker(entity, |walker| {
            walker.progression.remove(&category);
        })
    }

    fn apply_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
        unlocks: &BTreeSet<CapabilityId>,
    ) -> Result<(), WorldError> {
        self.with_walker(entity, |walker| {
            walker
                .progression
                .entry(category)
                .or_default()
                .extend(unlocks.iter().copied());
        })
    }

    fn teleport(&self, entity: EntityId, to: Position) -> Result<(), WorldError> {
        self.with_walker(entity, |walker| walker.physical.position = to)
    }

    fn equip_loadout(&self, entity: EntityId, loadout: &str) -> Result<(), WorldError> {
        self.with_walker(entity, |walker| {
            walker.loadouts.insert(loadout.to_string());
        })
    }

    fn unequip_loadout(&self, entity: EntityId, loadout: &str) -> Result<(), WorldError> {
        self.with_walker(entity, |walker| {
            walker.loadouts.remove(loadout);
        })
    }

    fn spawn_transient(
        &self,
        entity: EntityId,
        prefab: &str,
        _at: Position,
    ) -> Result<TransientHandle, WorldError> {
        let mut state = self.state.lock();
        if !state.walkers.contains_key(&entity) {
            return Err(WorldError::EntityGone(entity));
        }
        state.next_transient += 1;
        let handle = TransientHandle(state.next_transient);
        state.transients.insert(handle, prefab.to_string());
        Ok(handle)
    }

    fn despawn_transient(&self, handle: TransientHandle) -> Result<(), WorldError> {
        self.state.lock().transients.remove(&handle);
        Ok(())
    }

    fn notify(&self, entity: EntityId, message: &str) {
        self.notifier.send(entity, message);
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn log_notifications(receiver: &Receiver<Notification>) {
    for Notification { entity, message } in drain_notifications(receiver) {
        info!(target: "zones::sim", %entity, %message, "player.notified");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ticks = env_u64("ZONE_SIM_TICKS", DEFAULT_TICKS);
    let entities = env_u64("ZONE_SIM_ENTITIES", DEFAULT_ENTITIES);
    let seed = env_u64("ZONE_SIM_SEED", 0x5eed);

    let mut rng = SmallRng::seed_from_u64(seed);
    let (notifier, notifications) = notification_channel();
    let demo = Arc::new(DemoWorld::new(entities, &mut rng, notifier));
    let mut app = build_headless_app(demo.clone());
    let mut next_id = entities;

    info!(ticks, entities, seed, "zone simulation ready");

    for _ in 0..ticks {
        demo.step(&mut rng, &mut next_id);
        run_tick(&mut app);
        log_notifications(&notifications);
    }

    let exited = admin::shutdown(&mut app.world);
    log_notifications(&notifications);

    let metrics = app.world.resource::<ZoneMetrics>();
    info!(
        target: "zones::sim",
        ticks = metrics.tick,
        transitions = metrics.transitions,
        enters = metrics.enters,
        exits = metrics.exits,
        effect_failures = metrics.effect_failures,
        dropped = metrics.dropped_entities,
        exited_on_shutdown = exited,
        "simulation.finished"
    );
}
