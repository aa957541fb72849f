//! Shared fixtures for integration tests: an in-memory remote origin, a
//! manually driven download manager and a string-backed asset decoder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use resvault::config::{join_uri, ResourceConfig, ResourceMode};
use resvault::download::{DownloadJob, DownloadManager, DownloadReply};
use resvault::hash::crc32;
use resvault::loader::{AssetDecoder, BundleSource, DecodeReply};
use resvault::manager::{Collaborators, ResourceManager};
use resvault::manifest::{Manifest, ManifestAsset, ManifestKind, ManifestResource};
use resvault::model::{LoadType, ResourceName};
use resvault::storage::{
    ByteFetcher, FetchError, FetchReply, FetchSource, MemoryStorage, ResourceStorage, Storage,
    TieredFetcher,
};
use resvault::transform::{Lz4Decompressor, XorDecryptor};
use resvault::ResourceContext;

pub const PREFIX: &str = "https://cdn.example.com/1.0";

/// Files published on the remote origin, keyed by absolute URI.
#[derive(Clone, Default)]
pub struct RemoteFiles {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl RemoteFiles {
    pub fn put(&self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().insert(uri.into(), bytes);
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.files.lock().get(uri).cloned()
    }

    /// Publish a resource under its hash-qualified remote name.
    pub fn publish(&self, config: &ResourceConfig, name: &ResourceName, hash: u32, bytes: Vec<u8>) {
        let uri = join_uri(
            &config.update_prefix_uri,
            &name.hash_qualified_name(hash, &config.remote_extension),
        );
        self.put(uri, bytes);
    }

    pub fn publish_manifest(&self, config: &ResourceConfig, manifest: &Manifest) {
        self.put(config.remote_manifest_uri(), manifest.encode().unwrap());
    }
}

impl ByteFetcher for RemoteFiles {
    fn fetch(&self, source: FetchSource, reply: FetchReply) {
        let result = match &source {
            FetchSource::Remote(uri) => self
                .get(uri)
                .ok_or_else(|| FetchError::NotFound(uri.clone())),
            other => Err(FetchError::Failed(format!("not a remote source: {other}"))),
        };
        reply.send(result);
    }
}

/// Jobs handed to the download manager, completed explicitly by tests.
#[derive(Clone, Default)]
pub struct DownloadQueue {
    jobs: Arc<Mutex<Vec<(DownloadJob, DownloadReply)>>>,
    issued: Arc<Mutex<Vec<String>>>,
}

impl DownloadQueue {
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Every URI ever requested, in order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().clone()
    }

    /// Complete every pending job from `remote`, writing into `read_write`.
    /// Missing URIs fail the job. Returns how many jobs were completed.
    pub fn serve(&self, remote: &RemoteFiles, read_write: &dyn Storage) -> usize {
        let jobs: Vec<_> = self.jobs.lock().drain(..).collect();
        let count = jobs.len();
        for (job, reply) in jobs {
            match remote.get(&job.uri) {
                Some(bytes) => {
                    read_write.write(&job.path, &bytes).unwrap();
                    reply.progress(bytes.len() as u64);
                    reply.succeed(bytes.len() as u64);
                }
                None => reply.fail(format!("404 {}", job.uri)),
            }
        }
        count
    }

    /// Fail every pending job.
    pub fn fail_all(&self, message: &str) -> usize {
        let jobs: Vec<_> = self.jobs.lock().drain(..).collect();
        for (_, reply) in &jobs {
            reply.fail(message);
        }
        jobs.len()
    }
}

pub struct MockDownloadManager {
    queue: DownloadQueue,
    agents: usize,
}

impl MockDownloadManager {
    pub fn new(queue: DownloadQueue, agents: usize) -> Self {
        Self { queue, agents }
    }
}

impl DownloadManager for MockDownloadManager {
    fn free_agent_count(&self) -> usize {
        self.agents.saturating_sub(self.queue.pending())
    }

    fn waiting_task_count(&self) -> usize {
        0
    }

    fn add_download(&mut self, job: DownloadJob, reply: DownloadReply) {
        self.queue.issued.lock().push(job.uri.clone());
        self.queue.jobs.lock().push((job, reply));
    }
}

/// Decoder whose bundles and assets are plain strings.
#[derive(Default)]
pub struct StringDecoder {
    pub parsed: Vec<String>,
}

impl AssetDecoder for StringDecoder {
    type Bundle = String;
    type Asset = String;

    fn parse_bundle(&mut self, resource: &ResourceName, source: BundleSource, reply: DecodeReply<String>) {
        self.parsed.push(resource.full_name().to_string());
        match source {
            BundleSource::Memory(bytes) => reply.send(Ok(String::from_utf8_lossy(&bytes).into_owned())),
            BundleSource::File { path, .. } => reply.send(Ok(path)),
        };
    }

    fn load_asset(
        &mut self,
        bundle: &String,
        asset_name: &str,
        _asset_type: Option<&str>,
        _is_scene: bool,
        reply: DecodeReply<String>,
    ) {
        reply.send(Ok(format!("{bundle}:{asset_name}")));
    }

    fn unload_scene(&mut self, _scene_name: &str, _scene: &String, reply: DecodeReply<()>) {
        reply.send(Ok(()));
    }
}

/// A manager over two in-memory tiers plus handles to poke at them.
pub struct Harness {
    pub manager: ResourceManager<StringDecoder>,
    pub read_only: MemoryStorage,
    pub read_write: MemoryStorage,
    pub remote: RemoteFiles,
    pub downloads: DownloadQueue,
    pub config: ResourceConfig,
}

impl Harness {
    pub fn new(config: ResourceConfig) -> Self {
        Self::with_tiers(config, MemoryStorage::new(), MemoryStorage::new(), RemoteFiles::default())
    }

    pub fn with_tiers(
        config: ResourceConfig,
        read_only: MemoryStorage,
        read_write: MemoryStorage,
        remote: RemoteFiles,
    ) -> Self {
        let ro: Arc<dyn Storage> = Arc::new(read_only.clone());
        let rw: Arc<dyn Storage> = Arc::new(read_write.clone());
        let storage = ResourceStorage::new(ro.clone(), rw.clone(), config.storage_limits());
        let fetcher = TieredFetcher::new(ro, rw).with_remote(Box::new(remote.clone()));
        let ctx = ResourceContext::new(config.clone(), storage, Box::new(fetcher));
        let downloads = DownloadQueue::default();
        let manager = ResourceManager::new(
            ctx,
            Collaborators {
                download_manager: Box::new(MockDownloadManager::new(downloads.clone(), 4)),
                decompressor: Box::new(Lz4Decompressor),
                decryptor: Box::new(XorDecryptor),
                decoder: StringDecoder::default(),
            },
        );
        Self {
            manager,
            read_only,
            read_write,
            remote,
            downloads,
            config,
        }
    }

    /// Tick the manager `n` times, serving downloads in between.
    pub fn pump(&mut self, n: usize) -> Vec<resvault::ResourceEvent> {
        let mut events = Vec::new();
        for _ in 0..n {
            self.manager.tick();
            self.downloads.serve(&self.remote, &self.read_write);
            events.extend(self.manager.drain_events());
        }
        events
    }
}

pub fn updatable_config() -> ResourceConfig {
    ResourceConfig {
        mode: ResourceMode::Updatable,
        update_prefix_uri: PREFIX.to_string(),
        ..ResourceConfig::default()
    }
}

/// Builder for manifests of any kind.
pub struct ManifestBuilder {
    manifest: Manifest,
}

impl ManifestBuilder {
    pub fn new(kind: ManifestKind) -> Self {
        let mut manifest = Manifest::new(kind);
        if matches!(kind, ManifestKind::Updatable | ManifestKind::Package) {
            manifest.applicable_version = "1.0.0".to_string();
            manifest.internal_version = 1;
        }
        Self { manifest }
    }

    /// Add a plain resource whose content is `bytes`, holding `assets`
    /// given as (name, dependencies).
    pub fn resource(mut self, name: &ResourceName, bytes: &[u8], assets: &[(&str, &[&str])]) -> Self {
        let mut resource =
            ManifestResource::new(name.clone(), LoadType::FromMemory, bytes.len() as u64, crc32(bytes));
        for (asset, deps) in assets {
            resource.assets.push(asset.to_string());
            self.manifest.assets.push(ManifestAsset {
                name: asset.to_string(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
            });
        }
        self.manifest.resources.push(resource);
        self
    }

    pub fn raw(mut self, resource: ManifestResource) -> Self {
        self.manifest.resources.push(resource);
        self
    }

    pub fn group(mut self, name: &str, members: &[&ResourceName]) -> Self {
        self.manifest.groups.push(resvault::manifest::ManifestGroup {
            name: name.to_string(),
            resources: members.iter().map(|m| (*m).clone()).collect(),
        });
        self
    }

    pub fn build(self) -> Manifest {
        self.manifest
    }
}

pub fn plain(name: &str) -> ResourceName {
    ResourceName::plain(name, "dat")
}
