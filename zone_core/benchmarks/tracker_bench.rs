use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use zone_core::{
    build_app_with_config, run_tick, testing::ScriptedWorld, ZoneDefinition, ZoneShape,
    ZoneTrackingConfig,
};
use zone_runtime::{EntityId, Position};

fn zone_grid() -> Vec<ZoneDefinition> {
    let mut zones = Vec::new();
    for row in 0..4 {
        for col in 0..4 {
            let min_x = col as f32 * 50.0;
            let min_z = row as f32 * 50.0;
            zones.push(ZoneDefinition::new(
                format!("plot_{row}_{col}"),
                ZoneShape::rectangle(min_x, min_x + 40.0, min_z, min_z + 40.0),
            ));
        }
    }
    zones
}

fn bench_tracker_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_tick");
    let config = ZoneTrackingConfig {
        zones: zone_grid(),
        ..ZoneTrackingConfig::default()
    };

    for entities in [16u64, 128, 1024] {
        group.bench_with_input(
            BenchmarkId::new("entities", entities),
            &entities,
            |b, &entities| {
                b.iter_batched(
                    || {
                        let mut rng = SmallRng::seed_from_u64(entities);
                        let world = Arc::new(ScriptedWorld::new());
                        for id in 0..entities {
                            world.spawn(
                                EntityId(id),
                                Position::new(
                                    rng.gen_range(0.0..200.0),
                                    0.0,
                                    rng.gen_range(0.0..200.0),
                                ),
                            );
                        }
                        let mut app = build_app_with_config(world.clone(), &config);
                        run_tick(&mut app);
                        for id in 0..entities {
                            world.move_to(
                                EntityId(id),
                                Position::new(
                                    rng.gen_range(0.0..200.0),
                                    0.0,
                                    rng.gen_range(0.0..200.0),
                                ),
                            );
                        }
                        app
                    },
                    |mut app| {
                        run_tick(&mut app);
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(tracker_benches, bench_tracker_tick);
criterion_main!(tracker_benches);
