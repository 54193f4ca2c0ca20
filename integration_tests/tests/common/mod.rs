#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use bevy::ecs::event::Events;
use bevy::prelude::App;
use zone_core::{
    build_app_with_config, run_tick, testing::ScriptedWorld, ZoneEntered, ZoneExited,
    ZoneTrackingConfig,
};

static INIT: Once = Once::new();

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_zone_config.json")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path();

        debug_assert!(
            config_path.exists(),
            "missing test zone config at {}",
            config_path.display()
        );

        std::env::set_var("ZONE_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> ZoneTrackingConfig {
    ZoneTrackingConfig::from_file(&fixture_path()).expect("fixture config parses")
}

/// Zone app over a scripted world, recording transitions as
/// `"enter(zone)"` / `"exit(zone)"` per entity.
pub struct Harness {
    pub app: App,
    pub world: Arc<ScriptedWorld>,
    pub log: Vec<(u64, String)>,
}

impl Harness {
    pub fn new(config: &ZoneTrackingConfig) -> Self {
        let world = Arc::new(ScriptedWorld::new());
        let app = build_app_with_config(world.clone(), config);
        Self {
            app,
            world,
            log: Vec::new(),
        }
    }

    pub fn with_fixture() -> Self {
        Self::new(&test_config())
    }

    pub fn tick(&mut self) {
        run_tick(&mut self.app);
        self.record();
    }

    pub fn ticks(&mut self, count: usize) {
        for _ in 0..count {
            self.tick();
        }
    }

    /// Collects events sent during the last update. Exits run before enters
    /// within a tick.
    pub fn record(&mut self) {
        let exits: Vec<(u64, String)> = self
            .app
            .world
            .resource::<Events<ZoneExited>>()
            .iter_current_update_events()
            .map(|event| (event.entity.0, format!("exit({})", event.zone)))
            .collect();
        let enters: Vec<(u64, String)> = self
            .app
            .world
            .resource::<Events<ZoneEntered>>()
            .iter_current_update_events()
            .map(|event| (event.entity.0, format!("enter({})", event.zone)))
            .collect();
        self.log.extend(exits);
        self.log.extend(enters);
    }

    pub fn log_for(&self, entity: u64) -> Vec<String> {
        self.log
            .iter()
            .filter(|(id, _)| *id == entity)
            .map(|(_, event)| event.clone())
            .collect()
    }
}
