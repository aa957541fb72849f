//! On-disk tiers: a full update cycle over `LocalStorage` followed by an
//! offline verification pass of the same directory.

mod common;

use std::sync::Arc;

use common::{plain, updatable_config, DownloadQueue, ManifestBuilder, MockDownloadManager, RemoteFiles, StringDecoder};

use resvault::cli::verify_cmd::verify_directory;
use resvault::hash::crc32;
use resvault::manager::{Collaborators, ResourceManager};
use resvault::manifest::{read_pack_header, build_pack, Manifest, ManifestKind, ManifestResource};
use resvault::model::LoadType;
use resvault::storage::{LocalStorage, MemoryStorage, ResourceStorage, Storage, TieredFetcher};
use resvault::transform::{Lz4Decompressor, XorDecryptor};
use resvault::ResourceContext;

fn local_manager(dir: &std::path::Path, remote: &RemoteFiles, downloads: &DownloadQueue) -> ResourceManager<StringDecoder> {
    let config = updatable_config();
    let ro: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let rw: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir));
    let storage = ResourceStorage::new(ro.clone(), rw.clone(), config.storage_limits());
    let fetcher = TieredFetcher::new(ro, rw).with_remote(Box::new(remote.clone()));
    ResourceManager::new(
        ResourceContext::new(config, storage, Box::new(fetcher)),
        Collaborators {
            download_manager: Box::new(MockDownloadManager::new(downloads.clone(), 2)),
            decompressor: Box::new(Lz4Decompressor),
            decryptor: Box::new(XorDecryptor),
            decoder: StringDecoder::default(),
        },
    )
}

#[tokio::test]
async fn downloaded_tier_verifies_clean_then_detects_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let config = updatable_config();
    let remote = RemoteFiles::default();
    let downloads = DownloadQueue::default();

    let a = b"first resource".to_vec();
    let b = b"second resource".to_vec();
    let mut b_entry = ManifestResource::new(plain("b"), LoadType::FromMemory, b.len() as u64, crc32(&b));
    b_entry.packed_store = Some("bundle".to_string());
    let manifest = ManifestBuilder::new(ManifestKind::Updatable)
        .resource(&plain("a"), &a, &[])
        .raw(b_entry)
        .build();
    remote.publish_manifest(&config, &manifest);
    remote.publish(&config, &plain("a"), crc32(&a), a.clone());
    remote.publish(&config, &plain("b"), crc32(&b), b.clone());

    let mut manager = local_manager(dir.path(), &remote, &downloads);
    let rw = LocalStorage::new(dir.path());
    manager.check_resources().unwrap();
    manager.tick();
    manager.update_resources("").unwrap();
    for _ in 0..4 {
        manager.tick();
        downloads.serve(&remote, &rw);
    }
    assert_eq!(manager.table().ready_resource_count(), 2);
    assert_eq!(std::fs::read(dir.path().join("a.dat")).unwrap(), a);

    let root = dir.path().to_str().unwrap();
    let report = verify_directory(root, config.clone()).await.unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.verified, 2);

    std::fs::write(dir.path().join("a.dat"), b"tampered resou").unwrap();
    let report = verify_directory(root, config.clone()).await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(!dir.path().join("a.dat").exists());

    let manifest = Manifest::decode(&std::fs::read(dir.path().join(&config.read_write_manifest_name)).unwrap()).unwrap();
    assert_eq!(manifest.resources.len(), 1);
    assert_eq!(manifest.resources[0].name, plain("b"));
}

#[test]
fn pack_header_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path());
    let bytes = b"payload".to_vec();
    let pack = build_pack(vec![(
        ManifestResource::new(plain("x"), LoadType::FromMemory, bytes.len() as u64, crc32(&bytes)),
        bytes.clone(),
    )])
    .unwrap();
    storage.write("packs/one.pack", &pack).unwrap();

    let header = read_pack_header(&storage, "packs/one.pack").unwrap();
    assert_eq!(header.manifest.kind, ManifestKind::ResourcePack);
    assert_eq!(header.content_length(), bytes.len() as u64);
    let data = storage
        .read_range("packs/one.pack", header.data_offset, bytes.len())
        .unwrap();
    assert_eq!(data, bytes);
}
