use super::*;
use std::sync::Arc;

use crate::model::{AssetInfo, LoadType, ResourceInfo};
use crate::storage::{MemoryStorage, Storage, StorageLimits, TieredFetcher};
use crate::transform::XorDecryptor;

#[derive(Default)]
struct ScriptedDecoder {
    parsed: Vec<String>,
    loaded: Vec<String>,
    released_assets: Vec<String>,
    released_bundles: Vec<String>,
    failing_bundles: Vec<String>,
    failing_assets: Vec<String>,
    refuse_unload: bool,
    last_source: Option<BundleSource>,
}

impl AssetDecoder for ScriptedDecoder {
    type Bundle = String;
    type Asset = String;

    fn parse_bundle(&mut self, resource: &ResourceName, source: BundleSource, reply: DecodeReply<String>) {
        let name = resource.full_name().to_string();
        self.parsed.push(name.clone());
        self.last_source = Some(source);
        if self.failing_bundles.contains(&name) {
            reply.send(Err("corrupt bundle".into()));
        } else {
            reply.send(Ok(name));
        }
    }

    fn load_asset(
        &mut self,
        bundle: &String,
        asset_name: &str,
        _asset_type: Option<&str>,
        _is_scene: bool,
        reply: DecodeReply<String>,
    ) {
        self.loaded.push(asset_name.to_string());
        if self.failing_assets.iter().any(|a| a == asset_name) {
            reply.send(Err("bad asset".into()));
        } else {
            reply.send(Ok(format!("{bundle}/{asset_name}")));
        }
    }

    fn unload_scene(&mut self, _scene_name: &str, _scene: &String, reply: DecodeReply<()>) {
        if self.refuse_unload {
            reply.send(Err("scene is busy".into()));
        } else {
            reply.send(Ok(()));
        }
    }

    fn release_asset(&mut self, asset: &String) {
        self.released_assets.push(asset.clone());
    }

    fn release_bundle(&mut self, bundle: &String) {
        self.released_bundles.push(bundle.clone());
    }
}

struct Fixture {
    table: ResourceTable,
    storage: ResourceStorage,
    read_only: Arc<dyn Storage>,
    loader: ResourceLoader<ScriptedDecoder>,
}

impl Fixture {
    fn new(mode: ResourceMode) -> Self {
        let read_only: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let read_write: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut fx = Self {
            table: ResourceTable::new(),
            storage: ResourceStorage::new(read_only.clone(), read_write, StorageLimits::default()),
            read_only,
            loader: ResourceLoader::new(ScriptedDecoder::default(), Box::new(XorDecryptor), 2, mode),
        };
        fx.add_resource("ui", LoadType::FromMemory, true, &[("hero", &["shader"]), ("icon", &[])]);
        fx.add_resource("core", LoadType::FromMemory, true, &[("shader", &[])]);
        fx.add_resource("level", LoadType::FromMemory, true, &[("level1", &["hero"])]);
        fx.add_resource("data", LoadType::FromBinary, true, &[("config", &[])]);
        fx.add_resource("late", LoadType::FromMemory, false, &[("pending", &[])]);
        fx
    }

    fn add_resource(&mut self, name: &str, load_type: LoadType, ready: bool, assets: &[(&str, &[&str])]) {
        let resource = ResourceName::plain(name, "dat");
        let bytes = format!("{name}-bytes").into_bytes();
        self.read_only.write(&resource.full_name(), &bytes).unwrap();
        self.table
            .insert_resource(ResourceInfo::new(
                resource.clone(),
                None,
                load_type,
                bytes.len() as u64,
                crate::hash::crc32(&bytes),
                bytes.len() as u64,
                true,
                ready,
            ))
            .unwrap();
        for (asset, deps) in assets {
            let deps = deps.iter().map(|d| d.to_string()).collect();
            self.table
                .insert_asset(AssetInfo::new(*asset, resource.clone(), deps))
                .unwrap();
        }
    }

    fn load(&mut self, asset: &str) -> Result<u64, LoadFailure> {
        self.loader.load_asset(&self.table, asset, None, Priority::Normal)
    }

    fn run(&mut self, ticks: usize) -> Vec<LoaderEvent> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            events.extend(self.loader.tick(&self.table, &self.storage));
        }
        events
    }

    fn object(&self, asset: &str) -> ObjectId {
        self.loader.asset_object(asset).unwrap()
    }

    fn bundle(&self, name: &str) -> ObjectId {
        self.loader
            .resource_object(&ResourceName::plain(name, "dat"))
            .unwrap()
    }
}

fn success_of(events: &[LoaderEvent], serial: u64) -> Option<ObjectId> {
    events.iter().find_map(|e| match e {
        LoaderEvent::LoadAssetSuccess { serial: s, object, .. } if *s == serial => Some(*object),
        _ => None,
    })
}

fn failure_of(events: &[LoaderEvent], serial: u64) -> Option<LoadResourceStatus> {
    events.iter().find_map(|e| match e {
        LoaderEvent::LoadAssetFailure { serial: s, status, .. } if *s == serial => Some(*status),
        _ => None,
    })
}

#[test]
fn asset_with_dependency_loads_and_holds_spawns() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let serial = fx.load("hero").unwrap();
    let events = fx.run(5);

    let hero = success_of(&events, serial).expect("hero loaded");
    assert_eq!(fx.loader.asset(hero).map(String::as_str), Some("ui.dat/hero"));
    assert!(events.contains(&LoaderEvent::DependencyLoaded {
        serial,
        asset_name: "hero".into(),
        dependency: "shader".into(),
        loaded: 1,
        total: 1,
    }));
    assert_eq!(fx.loader.asset_spawn_count(hero), Some(1));
    assert_eq!(fx.loader.asset_spawn_count(fx.object("shader")), Some(1));
    assert_eq!(fx.loader.resource_spawn_count(fx.bundle("ui")), Some(1));
    assert_eq!(fx.loader.resource_spawn_count(fx.bundle("core")), Some(1));
    assert_eq!(fx.loader.asset_object_count(), 2);
    assert_eq!(fx.loader.resource_object_count(), 2);
}

#[test]
fn stage_updates_precede_success() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let serial = fx.load("icon").unwrap();
    let events = fx.run(3);
    let stages: Vec<LoadStage> = events
        .iter()
        .filter_map(|e| match e {
            LoaderEvent::LoadAssetUpdate { serial: s, stage, .. } if *s == serial => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![LoadStage::ReadResource, LoadStage::ParseResource, LoadStage::LoadAsset]
    );
    assert!(success_of(&events, serial).is_some());
}

#[test]
fn cached_asset_is_spawned_without_decoding() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.load("hero").unwrap();
    fx.run(5);
    let parsed = fx.loader.decoder().parsed.len();

    let serial = fx.load("hero").unwrap();
    let events = fx.run(2);
    let hero = success_of(&events, serial).unwrap();
    assert_eq!(fx.loader.asset_spawn_count(hero), Some(2));
    assert_eq!(fx.loader.decoder().parsed.len(), parsed);
    assert_eq!(fx.loader.asset_spawn_count(fx.object("shader")), Some(1));
}

#[test]
fn pooled_asset_released_before_start_reloads_its_dependencies() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.load("hero").unwrap();
    fx.run(5);
    fx.loader.unload_asset(fx.object("hero")).unwrap();

    let serial = fx.load("hero").unwrap();
    assert_eq!(fx.loader.waiting_task_count(), 2);
    assert_eq!(fx.loader.release_unused().unwrap(), 4);
    let events = fx.run(6);

    let hero = success_of(&events, serial).expect("hero reloaded");
    let shader = fx.loader.asset_object("shader").expect("shader reloaded with hero");
    assert_eq!(fx.loader.asset_spawn_count(hero), Some(1));
    assert_eq!(fx.loader.asset_spawn_count(shader), Some(1));
    assert_eq!(fx.loader.asset_object_count(), 2);
    assert_eq!(fx.loader.release_unused().unwrap(), 0);
}

#[test]
fn concurrent_requests_share_one_decode() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let first = fx.load("hero").unwrap();
    let second = fx.load("hero").unwrap();
    let events = fx.run(6);

    assert_eq!(success_of(&events, first), success_of(&events, second));
    let hero = fx.object("hero");
    assert_eq!(fx.loader.asset_spawn_count(hero), Some(2));
    assert_eq!(fx.loader.asset_spawn_count(fx.object("shader")), Some(1));
    assert_eq!(fx.loader.decoder().parsed, vec!["core.dat", "ui.dat"]);
}

#[test]
fn release_unused_frees_the_dependency_chain() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.load("hero").unwrap();
    fx.run(5);
    assert_eq!(fx.loader.release_unused().unwrap(), 0);

    fx.loader.unload_asset(fx.object("hero")).unwrap();
    assert_eq!(fx.loader.release_unused().unwrap(), 4);
    assert_eq!(fx.loader.asset_object_count(), 0);
    assert_eq!(fx.loader.resource_object_count(), 0);

    let decoder = fx.loader.decoder();
    assert_eq!(decoder.released_assets, vec!["ui.dat/hero", "core.dat/shader"]);
    assert_eq!(decoder.released_bundles, vec!["ui.dat", "core.dat"]);
}

#[test]
fn force_release_of_used_objects_is_a_fault() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.load("hero").unwrap();
    fx.run(5);
    assert!(fx.loader.force_release_asset(fx.object("shader")).unwrap_err().is_fault());
    assert!(fx.loader.force_release_resource(fx.bundle("core")).unwrap_err().is_fault());
    assert!(fx.loader.unload_asset(fx.object("hero")).is_ok());
    assert!(fx.loader.unload_asset(fx.object("hero")).unwrap_err().is_fault());
}

#[test]
fn rejected_requests_are_classified() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    assert_eq!(fx.load("missing").unwrap_err().status, LoadResourceStatus::NotExist);
    assert_eq!(fx.load("config").unwrap_err().status, LoadResourceStatus::TypeError);
    assert_eq!(fx.load("pending").unwrap_err().status, LoadResourceStatus::NotReady);
    assert_eq!(fx.loader.waiting_task_count(), 0);
}

#[test]
fn dependency_on_unready_resource_is_a_dependency_error() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.table
        .insert_asset(AssetInfo::new("needs_late", ResourceName::plain("core", "dat"), vec!["pending".into()]))
        .unwrap();
    let failure = fx.load("needs_late").unwrap_err();
    assert_eq!(failure.status, LoadResourceStatus::DependencyError);
    assert!(failure.message.contains("pending"));
}

#[test]
fn dependency_cycles_are_rejected() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let core = ResourceName::plain("core", "dat");
    fx.table
        .insert_asset(AssetInfo::new("a", core.clone(), vec!["b".into()]))
        .unwrap();
    fx.table
        .insert_asset(AssetInfo::new("b", core, vec!["a".into()]))
        .unwrap();
    let failure = fx.load("a").unwrap_err();
    assert_eq!(failure.status, LoadResourceStatus::DependencyError);
    assert!(failure.message.contains("cycle"));
}

#[test]
fn while_playing_waits_for_the_update() {
    let mut fx = Fixture::new(ResourceMode::UpdatableWhilePlaying);
    let serial = fx.load("pending").unwrap();
    assert_eq!(fx.loader.take_update_requests(), vec![ResourceName::plain("late", "dat")]);
    assert!(fx.loader.take_update_requests().is_empty());

    assert!(fx.run(3).is_empty());
    assert_eq!(fx.loader.waiting_task_count(), 1);

    assert!(fx.table.mark_ready(&ResourceName::plain("late", "dat")));
    let events = fx.run(3);
    assert!(success_of(&events, serial).is_some());
}

#[test]
fn failed_update_fails_waiting_loads() {
    let mut fx = Fixture::new(ResourceMode::UpdatableWhilePlaying);
    let serial = fx.load("pending").unwrap();
    fx.run(1);
    assert_eq!(fx.loader.fail_waiting_for(&ResourceName::plain("late", "dat"), "retries exhausted"), 1);
    let events = fx.run(1);
    assert_eq!(failure_of(&events, serial), Some(LoadResourceStatus::NotReady));
    assert_eq!(fx.loader.waiting_task_count(), 0);
}

#[test]
fn dependency_failure_fails_the_parent() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.loader.decoder_mut().failing_bundles.push("core.dat".into());
    let serial = fx.load("hero").unwrap();
    let events = fx.run(4);
    assert_eq!(failure_of(&events, serial), Some(LoadResourceStatus::DependencyError));
    assert_eq!(fx.loader.decoder().parsed, vec!["core.dat"]);
    assert_eq!(fx.loader.asset_object_count(), 0);
    assert_eq!(fx.loader.waiting_task_count(), 0);
}

#[test]
fn asset_decode_failure_gives_back_the_bundle() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.loader.decoder_mut().failing_assets.push("icon".into());
    let serial = fx.load("icon").unwrap();
    let events = fx.run(3);
    assert_eq!(failure_of(&events, serial), Some(LoadResourceStatus::AssetError));
    assert_eq!(fx.loader.resource_spawn_count(fx.bundle("ui")), Some(0));
    assert_eq!(fx.loader.release_unused().unwrap(), 1);
}

#[test]
fn scenes_load_once_and_unload() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let serial = fx.loader.load_scene(&fx.table, "level1", Priority::High).unwrap();
    let events = fx.run(8);
    assert!(events
        .iter()
        .any(|e| matches!(e, LoaderEvent::LoadSceneSuccess { serial: s, .. } if *s == serial)));
    assert!(fx.loader.is_scene_loaded("level1"));

    let again = fx.loader.load_scene(&fx.table, "level1", Priority::High).unwrap_err();
    assert_eq!(again.status, LoadResourceStatus::AssetError);

    fx.loader.unload_scene("level1").unwrap();
    assert!(fx.loader.unload_scene("level1").unwrap_err().is_usage());
    let events = fx.run(1);
    assert!(events.contains(&LoaderEvent::SceneUnloaded {
        scene_name: "level1".into()
    }));
    assert!(!fx.loader.is_scene_loaded("level1"));
    assert!(fx.loader.unload_scene("level1").unwrap_err().is_usage());
}

#[test]
fn refused_scene_unload_keeps_the_scene() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.loader.load_scene(&fx.table, "level1", Priority::Normal).unwrap();
    fx.run(8);
    fx.loader.decoder_mut().refuse_unload = true;
    fx.loader.unload_scene("level1").unwrap();
    let events = fx.run(1);
    assert!(matches!(
        events.as_slice(),
        [LoaderEvent::UnloadSceneFailure { scene_name, .. }] if scene_name == "level1"
    ));
    assert!(fx.loader.is_scene_loaded("level1"));
}

#[test]
fn loose_plain_resources_are_handed_over_by_path() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    fx.add_resource("raw", LoadType::FromFile, true, &[("texture", &[])]);
    fx.load("texture").unwrap();
    fx.run(1);
    assert_eq!(
        fx.loader.decoder().last_source,
        Some(BundleSource::File {
            read_only: true,
            path: "raw.dat".into()
        })
    );
}

#[test]
fn binaries_are_fetched_and_decrypted() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let plain = b"binary payload that is longer than nothing".to_vec();
    let resource = ResourceName::plain("secret", "bin");
    let hash = crate::hash::crc32(&plain);
    let mut stored = plain.clone();
    XorDecryptor.decrypt(&resource, LoadType::FromBinaryQuickDecrypt, hash, &mut stored);
    fx.read_only.write("secret.bin", &stored).unwrap();
    fx.table
        .insert_resource(ResourceInfo::new(
            resource.clone(),
            None,
            LoadType::FromBinaryQuickDecrypt,
            plain.len() as u64,
            hash,
            plain.len() as u64,
            true,
            true,
        ))
        .unwrap();
    fx.table
        .insert_asset(AssetInfo::new("secret", resource, Vec::new()))
        .unwrap();

    let fetcher = TieredFetcher::new(fx.read_only.clone(), Arc::new(MemoryStorage::new()));
    let serial = fx.loader.load_binary(&fx.table, &fetcher, "secret").unwrap();
    let events = fx.run(1);
    assert_eq!(
        events,
        vec![LoaderEvent::LoadBinarySuccess {
            serial,
            binary_name: "secret".into(),
            bytes: plain.clone(),
        }]
    );
    assert_eq!(fx.loader.binary_length(&fx.table, "secret"), Some(plain.len() as u64));
    assert_eq!(
        fx.loader.binary_path(&fx.table, "secret"),
        Some(BinaryLocation {
            in_read_only: true,
            path: "secret.bin".into()
        })
    );
}

#[test]
fn binary_entry_points_check_their_types() {
    let mut fx = Fixture::new(ResourceMode::Updatable);
    let fetcher = TieredFetcher::new(fx.read_only.clone(), Arc::new(MemoryStorage::new()));
    let err = fx.loader.load_binary(&fx.table, &fetcher, "hero").unwrap_err();
    assert_eq!(err.status, LoadResourceStatus::TypeError);
    let err = fx
        .loader
        .load_binary_from_packed_store(&fx.table, &fx.storage, "config")
        .unwrap_err();
    assert_eq!(err.status, LoadResourceStatus::TypeError);
    assert!(fx.loader.binary_length(&fx.table, "hero").is_none());
}

#[test]
fn has_asset_reports_location() {
    let fx = Fixture::new(ResourceMode::Updatable);
    assert_eq!(fx.loader.has_asset(&fx.table, "hero"), HasAssetResult::AssetOnDisk);
    assert_eq!(fx.loader.has_asset(&fx.table, "config"), HasAssetResult::BinaryOnDisk);
    assert_eq!(fx.loader.has_asset(&fx.table, "pending"), HasAssetResult::NotReady);
    assert_eq!(fx.loader.has_asset(&fx.table, "nope"), HasAssetResult::NotExist);
}

#[test]
fn shutdown_drops_pending_work() {
    let mut fx = Fixture::new(ResourceMode::UpdatableWhilePlaying);
    fx.load("pending").unwrap();
    fx.load("hero").unwrap();
    fx.loader.shutdown();
    assert_eq!(fx.loader.waiting_task_count(), 0);
    assert_eq!(fx.loader.working_agent_count(), 0);
    assert!(fx.loader.take_update_requests().is_empty());
}
