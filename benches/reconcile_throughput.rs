//! Reconciliation benchmarks.
//!
//! Measures building and classifying CheckInfos for manifests of growing
//! size, with a mix of read-only hits, read-write hits and updates.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use resvault::checker::build_check_infos;
use resvault::manifest::{Manifest, ManifestKind, ManifestResource};
use resvault::model::{LoadType, ResourceName};

fn resource(i: usize, hash: u32) -> ManifestResource {
    let name = if i % 7 == 0 {
        ResourceName::new(format!("res/{i}"), Some("hd"), "dat")
    } else {
        ResourceName::plain(format!("res/{i}"), "dat")
    };
    let mut r = ManifestResource::new(name, LoadType::FromMemory, 1024 + i as u64, hash);
    if i % 5 == 0 {
        r.packed_store = Some(format!("store{}", i % 3));
    }
    r
}

/// Remote lists every resource; a third are in the read-only tier, a third
/// in the read-write tier (half of those stale).
fn manifests(count: usize) -> (Manifest, Manifest, Manifest) {
    let mut remote = Manifest::new(ManifestKind::Updatable);
    let mut read_only = Manifest::new(ManifestKind::ReadOnly);
    let mut read_write = Manifest::new(ManifestKind::ReadWrite);
    for i in 0..count {
        let hash = i as u32;
        remote.resources.push(resource(i, hash));
        match i % 3 {
            0 => read_only.resources.push(resource(i, hash)),
            1 => {
                let stale = if i % 2 == 0 { hash } else { hash ^ 0xFFFF };
                read_write.resources.push(resource(i, stale));
            }
            _ => {}
        }
    }
    (remote, read_only, read_write)
}

fn bench_build_check_infos(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_check_infos");

    for count in [100usize, 1_000, 10_000] {
        let (remote, read_only, read_write) = manifests(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let infos = build_check_infos(
                    black_box(&remote),
                    Some(&read_only),
                    Some(&read_write),
                    Some("sd"),
                    false,
                )
                .unwrap();
                black_box(infos.len())
            })
        });
    }

    group.finish();
}

fn bench_manifest_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_decode");

    for count in [100usize, 10_000] {
        let (remote, _, _) = manifests(count);
        let bytes = remote.encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| Manifest::decode(black_box(bytes)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_check_infos, bench_manifest_decode);
criterion_main!(benches);
