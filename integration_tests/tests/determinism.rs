mod common;

use std::collections::BTreeMap;

use common::Harness;
use rand::{rngs::StdRng, Rng, SeedableRng};
use zone_core::ZoneMetrics;
use zone_runtime::{EntityId, Position, ZoneId};

const WALKERS: u64 = 12;

struct RunSummary {
    log: Vec<(u64, String)>,
    enters: u64,
    exits: u64,
    occupancy: BTreeMap<ZoneId, usize>,
    notifications: Vec<(EntityId, String)>,
}

fn run_walk(seed: u64, ticks: usize) -> RunSummary {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut harness = Harness::with_fixture();
    let mut positions: Vec<(f32, f32)> = (0..WALKERS)
        .map(|_| (rng.gen_range(-20.0..70.0), rng.gen_range(-20.0..40.0)))
        .collect();
    for (id, (x, z)) in positions.iter().enumerate() {
        harness
            .world
            .spawn(EntityId(id as u64), Position::new(*x, 0.0, *z));
    }

    for _ in 0..ticks {
        for (id, (x, z)) in positions.iter_mut().enumerate() {
            *x = (*x + rng.gen_range(-4.0..=4.0)).clamp(-20.0, 70.0);
            *z = (*z + rng.gen_range(-4.0..=4.0)).clamp(-20.0, 40.0);
            harness
                .world
                .move_to(EntityId(id as u64), Position::new(*x, 0.0, *z));
        }
        harness.tick();
    }

    let metrics = harness.app.world.resource::<ZoneMetrics>();
    RunSummary {
        enters: metrics.enters,
        exits: metrics.exits,
        occupancy: metrics.occupancy.clone(),
        log: harness.log.clone(),
        notifications: harness.world.notifications(),
    }
}

#[test]
fn seeded_walks_replay_identically() {
    let first = run_walk(0xA11CE, 150);
    let second = run_walk(0xA11CE, 150);

    assert!(!first.log.is_empty());
    assert_eq!(first.log, second.log);
    assert_eq!(first.enters, second.enters);
    assert_eq!(first.exits, second.exits);
    assert_eq!(first.occupancy, second.occupancy);
    assert_eq!(first.notifications, second.notifications);
}

#[test]
fn enters_and_exits_balance_with_occupancy() {
    let summary = run_walk(7, 200);
    let inside: usize = summary.occupancy.values().sum();
    assert_eq!(summary.enters - summary.exits, inside as u64);
}
