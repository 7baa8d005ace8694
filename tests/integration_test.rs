use fragstore::{EngineOptions, FragmentError, FragmentStore};
use tempfile::tempdir;

fn open(path: &std::path::Path, versions: &[&str], active: &str) -> FragmentStore {
    FragmentStore::open_with_versions(
        path,
        versions.iter().map(|s| s.to_string()).collect(),
        active,
    )
    .unwrap()
}

#[test]
fn seed_scenario_create_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let mut s = open(&path, &["public", "private"], "public");

    s.upsert(0xa1b2, "hi", None).unwrap();
    assert_eq!(s.get(0xa1b2, "public").unwrap(), Some("hi".to_string()));
    assert_eq!(s.get(0xa1b2, "private").unwrap(), Some(String::new()));
}

#[test]
fn seed_scenario_cross_version_update() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let mut s = open(&path, &["public", "private"], "public");

    s.upsert(0xa1b2, "hi", None).unwrap();
    s.upsert(0xa1b2, "secret", Some("private")).unwrap();

    assert_eq!(s.get(0xa1b2, "public").unwrap(), Some("hi".to_string()));
    assert_eq!(s.get(0xa1b2, "private").unwrap(), Some("secret".to_string()));
}

#[test]
fn seed_scenario_persistence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    {
        let mut s = open(&path, &["public", "private"], "public");
        s.upsert(0xa1b2, "hi", None).unwrap();
        s.upsert(0xa1b2, "secret", Some("private")).unwrap();
        s.close();
    }
    let mut s = open(&path, &["public", "private"], "public");
    assert_eq!(s.get(0xa1b2, "public").unwrap(), Some("hi".to_string()));
    assert_eq!(s.get(0xa1b2, "private").unwrap(), Some("secret".to_string()));
}

#[test]
fn seed_scenario_unknown_fragment_update() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let mut s = open(&path, &["public", "private"], "public");

    let err = s.upsert(0xffff, "x", Some("public")).unwrap_err();
    assert!(matches!(err, FragmentError::FragmentNotFound { id: 0xffff }));
}

#[test]
fn seed_scenario_unknown_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let mut s = open(&path, &["public", "private"], "public");

    let err = s.upsert(0xfffe, "x", Some("draft")).unwrap_err();
    assert!(matches!(err, FragmentError::UnknownVersion { .. }));
}

#[test]
fn seed_scenario_many_fragments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    {
        let mut s = open(&path, &["public", "private"], "public");
        for i in 0u16..100 {
            s.upsert(i, &format!("content {i}"), None).unwrap();
        }
        s.close();
    }
    let mut s = open(&path, &["public", "private"], "public");
    for i in 0u16..100 {
        assert_eq!(s.get(i, "public").unwrap(), Some(format!("content {i}")));
    }
}

#[test]
fn seed_scenario_large_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let mut s = open(&path, &["public", "private"], "public");

    let ok_text = "y".repeat(65000);
    s.upsert(0xffff, &ok_text, None).unwrap();
    assert_eq!(s.get(0xffff, "public").unwrap(), Some(ok_text));

    let too_big = "y".repeat(70000);
    let err = s.upsert(0xfffd, &too_big, None).unwrap_err();
    assert!(matches!(err, FragmentError::PayloadTooLarge { .. }));
}

#[test]
fn seed_scenario_compaction_convergence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let opts = EngineOptions {
        compaction_min_fragments: 8,
        compaction_min_bytes: 65_536,
        compaction_density_threshold: 0.6,
        incremental_compaction_max_bytes: 524_288,
        ..EngineOptions::new(vec!["public".into(), "private".into()], "public")
    };
    let mut s = FragmentStore::open(&path, opts).unwrap();

    let big = "x".repeat(4096);
    for i in 0u16..32 {
        s.upsert(i, &big, None).unwrap();
        s.upsert(i, &big, Some("private")).unwrap();
    }
    for i in 0u16..20 {
        s.upsert(i, "", Some("public")).unwrap();
        s.upsert(i, "", Some("private")).unwrap();
    }

    // Drive more upserts so the incremental compactor (one relocation per
    // upsert) has enough invocations to converge.
    for round in 0..4 {
        for i in 20u16..32 {
            s.upsert(i, &format!("{big}{round}"), None).unwrap();
        }
    }

    for i in 0u16..20 {
        assert_eq!(s.get(i, "public").unwrap(), Some(String::new()));
    }
    for i in 20u16..32 {
        assert!(s.get(i, "public").unwrap().unwrap().starts_with('x'));
    }
}

#[test]
fn unicode_round_trips_through_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frags.bin");
    let text = "héllo 世界 🎉 — multi-byte UTF-8";
    {
        let mut s = open(&path, &["public", "private"], "public");
        s.upsert(0x1234, text, None).unwrap();
        s.close();
    }
    let mut s = open(&path, &["public", "private"], "public");
    assert_eq!(s.get(0x1234, "public").unwrap(), Some(text.to_string()));
}

#[test]
fn corrupt_file_rejections() {
    let dir = tempdir().unwrap();

    let bad_magic = dir.path().join("bad_magic.bin");
    std::fs::write(&bad_magic, [0u8; 256]).unwrap();
    let err = FragmentStore::open_with_versions(&bad_magic, vec!["public".into()], "public")
        .unwrap_err();
    assert!(matches!(err, FragmentError::InvalidFormat));

    let truncated = dir.path().join("truncated.bin");
    std::fs::write(&truncated, b"FRAG\x02").unwrap();
    let err = FragmentStore::open_with_versions(&truncated, vec!["public".into()], "public")
        .unwrap_err();
    assert!(matches!(err, FragmentError::BadHeader { .. }));
}

#[test]
fn version_table_boundary_behaviors() {
    let dir = tempdir().unwrap();

    let no_versions = dir.path().join("none.bin");
    let err = FragmentStore::open_with_versions(&no_versions, vec![], "public").unwrap_err();
    assert!(matches!(err, FragmentError::NoVersions));

    let max_versions = dir.path().join("max.bin");
    let names: Vec<String> = ["a", "b", "c", "d", "e", "f"].iter().map(|s| s.to_string()).collect();
    assert!(FragmentStore::open_with_versions(&max_versions, names, "a").is_ok());

    let too_many = dir.path().join("too_many.bin");
    let names: Vec<String> = ["a", "b", "c", "d", "e", "f", "g"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let err = FragmentStore::open_with_versions(&too_many, names, "a").unwrap_err();
    assert!(matches!(err, FragmentError::TooManyVersions { count: 7 }));
}
