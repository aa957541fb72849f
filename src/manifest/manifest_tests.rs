use super::*;
use crate::model::{LoadType, ResourceName};

fn updatable() -> Manifest {
    let mut m = Manifest::new(ManifestKind::Updatable);
    m.applicable_version = "1.2.0".into();
    m.internal_version = 7;
    m.assets = vec![
        ManifestAsset {
            name: "ui/icon".into(),
            dependencies: vec![],
        },
        ManifestAsset {
            name: "ui/main".into(),
            dependencies: vec!["ui/icon".into()],
        },
    ];
    let mut atlas = ManifestResource::new(ResourceName::plain("atlas", "dat"), LoadType::FromMemory, 100, 11);
    atlas.compressed_length = 60;
    atlas.compressed_hash = 12;
    atlas.assets = vec!["ui/icon".into()];
    atlas.packed_store = Some("shared".into());
    let mut main = ManifestResource::new(ResourceName::new("ui", Some("hd"), "dat"), LoadType::FromMemoryQuickDecrypt, 40, 21);
    main.assets = vec!["ui/main".into()];
    m.resources = vec![atlas, main];
    m.groups = vec![ManifestGroup {
        name: "base".into(),
        resources: vec![ResourceName::plain("atlas", "dat")],
    }];
    m
}

#[test]
fn updatable_manifest_survives_encoding() {
    let m = updatable();
    let decoded = Manifest::decode(&m.encode().unwrap()).unwrap();
    assert_eq!(decoded, m);
}

#[test]
fn read_only_kind_drops_compressed_and_asset_sections() {
    let mut m = updatable();
    m.kind = ManifestKind::ReadOnly;
    let decoded = Manifest::decode(&m.encode().unwrap()).unwrap();
    assert_eq!(decoded.applicable_version, "");
    assert!(decoded.assets.is_empty());
    assert!(decoded.groups.is_empty());
    let atlas = &decoded.resources[0];
    assert_eq!(atlas.compressed_length, atlas.length);
    assert!(!atlas.is_compressed());
    assert_eq!(atlas.packed_store.as_deref(), Some("shared"));
    assert!(atlas.assets.is_empty());
}

#[test]
fn decode_as_checks_kind() {
    let bytes = updatable().encode().unwrap();
    assert!(matches!(
        Manifest::decode_as(&bytes, ManifestKind::ReadWrite),
        Err(ManifestError::WrongKind {
            expected: ManifestKind::ReadWrite,
            actual: ManifestKind::Updatable
        })
    ));
}

#[test]
fn bad_magic_and_version_are_rejected() {
    let mut bytes = updatable().encode().unwrap();
    bytes[0] = b'X';
    assert_eq!(Manifest::decode(&bytes), Err(ManifestError::BadMagic));

    let mut bytes = updatable().encode().unwrap();
    bytes[4] = 9;
    assert_eq!(Manifest::decode(&bytes), Err(ManifestError::UnsupportedVersion(9)));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = updatable().encode().unwrap();
    bytes.push(0);
    assert_eq!(Manifest::decode(&bytes), Err(ManifestError::TrailingBytes(1)));
}

#[test]
fn truncation_is_rejected_everywhere() {
    let bytes = updatable().encode().unwrap();
    for cut in 0..bytes.len() {
        assert!(Manifest::decode(&bytes[..cut]).is_err(), "cut at {cut}");
    }
}

#[test]
fn duplicate_resource_is_rejected_on_encode() {
    let mut m = updatable();
    let dup = m.resources[0].clone();
    m.resources.push(dup);
    assert!(matches!(m.encode(), Err(ManifestError::DuplicateResource(_))));
}

#[test]
fn unknown_dependency_is_rejected_on_encode() {
    let mut m = updatable();
    m.assets[1].dependencies.push("nope".into());
    assert!(matches!(
        m.encode(),
        Err(ManifestError::UnknownReference { table: "asset", .. })
    ));
}

#[test]
fn asset_shared_by_two_resources_is_rejected() {
    let mut m = updatable();
    m.resources[1].assets.push("ui/icon".into());
    let bytes = m.encode().unwrap();
    assert_eq!(
        Manifest::decode(&bytes),
        Err(ManifestError::DuplicateAsset("ui/icon".into()))
    );
}

#[test]
fn pack_kind_requires_trailer() {
    let m = Manifest::new(ManifestKind::ResourcePack);
    assert_eq!(m.encode(), Err(ManifestError::MissingSection("pack trailer")));
}

#[test]
fn totals_and_store_names() {
    let m = updatable();
    assert_eq!(m.total_length(), 140);
    assert_eq!(m.total_compressed_length(), 100);
    assert_eq!(m.packed_store_names().into_iter().collect::<Vec<_>>(), vec!["shared"]);
    assert!(m.resource(&ResourceName::new("ui", Some("hd"), "dat")).is_some());
    assert_eq!(m.asset("ui/main").map(|a| a.dependencies.len()), Some(1));
}
