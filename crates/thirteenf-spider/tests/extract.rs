use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::path::Path;
use thirteenf_spider::sec::extract::{extract_feed, extract_feeds, extract_quarter};
use thirteenf_spider::Config;

const ACME: &str = "0001234567-21-000001";
const BETA: &str = "0007654321-21-000003";
const GAMMA: &str = "0001111111-21-000004";
const ABSENT: &str = "0009999999-21-000009";

// Write a `.tar.gz` feed holding `entries` in order.
fn write_feed(path: &Path, entries: &[(String, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn nc(accession: &str) -> String {
    format!("{accession}.nc")
}

fn targets(accessions: &[&str]) -> HashSet<String> {
    accessions.iter().map(|s| s.to_string()).collect()
}

#[test]
fn extracts_each_target_once() {
    let dir = tempfile::tempdir().unwrap();
    let feed = dir.path().join("20210510.nc.tar.gz");
    write_feed(
        &feed,
        &[
            (nc(ACME), "first copy"),
            (nc(GAMMA), "not a target"),
            (nc(ACME), "second copy"),
            ("README".to_string(), "no accession number here"),
            (nc(BETA), "beta"),
        ],
    );

    let extraction = extract_feed(&feed, &targets(&[ACME, BETA])).unwrap();

    assert_eq!(
        extraction.extracted,
        vec![
            dir.path().join(nc(ACME)),
            dir.path().join(nc(BETA))
        ]
    );
    assert!(extraction.remaining.is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join(nc(ACME))).unwrap(),
        "first copy"
    );
    assert!(!dir.path().join(nc(GAMMA)).exists());
    assert!(!dir.path().join("README").exists());
}

#[test]
fn missing_targets_remain() {
    let dir = tempfile::tempdir().unwrap();
    let feed = dir.path().join("20210510.nc.tar.gz");
    write_feed(&feed, &[(nc(ACME), "acme")]);

    let extraction = extract_feed(&feed, &targets(&[ACME, BETA])).unwrap();

    assert_eq!(extraction.extracted.len(), 1);
    assert_eq!(extraction.remaining, targets(&[BETA]));
}

#[test]
fn no_targets_leaves_the_archive_unread() {
    let dir = tempfile::tempdir().unwrap();
    // never opened, so it does not even need to exist
    let feed = dir.path().join("missing.nc.tar.gz");

    let extraction = extract_feed(&feed, &HashSet::new()).unwrap();
    assert!(extraction.extracted.is_empty());
}

#[test]
fn quarter_extraction_across_feeds() {
    let storage = tempfile::tempdir().unwrap();
    let config = Config {
        storage_path: storage.path().to_path_buf(),
        ..Config::default()
    };
    let dir = config.quarter_dir(2021, 2);
    std::fs::create_dir_all(&dir).unwrap();

    write_feed(
        &dir.join("20210510.nc.tar.gz"),
        &[(nc(ACME), "acme"), (nc(GAMMA), "gamma")],
    );
    write_feed(
        &dir.join("20210511.nc.tar.gz"),
        &[(nc(ACME), "acme again"), (nc(BETA), "beta")],
    );
    std::fs::write(dir.join("20210512.nc.tar.gz"), b"definitely not gzip").unwrap();

    let summary =
        extract_quarter(&config, 2021, 2, None, &targets(&[ACME, BETA, ABSENT]), true).unwrap();

    assert_eq!(summary.extracted.len(), 2);
    assert_eq!(summary.remaining, targets(&[ABSENT]));
    assert_eq!(
        std::fs::read_to_string(dir.join(nc(ACME))).unwrap(),
        "acme"
    );
    assert!(!dir.join(nc(GAMMA)).exists());

    // scanned feeds are deleted, the unreadable one is kept for another try
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, dir.join("20210512.nc.tar.gz"));
    assert!(!dir.join("20210510.nc.tar.gz").exists());
    assert!(!dir.join("20210511.nc.tar.gz").exists());
    assert!(dir.join("20210512.nc.tar.gz").exists());
}

#[test]
fn quarter_extraction_keeps_feeds_by_default() {
    let storage = tempfile::tempdir().unwrap();
    let config = Config {
        storage_path: storage.path().to_path_buf(),
        ..Config::default()
    };
    let dir = config.quarter_dir(2021, 2);
    std::fs::create_dir_all(&dir).unwrap();
    write_feed(&dir.join("20210510.nc.tar.gz"), &[(nc(ACME), "acme")]);

    let summary = extract_quarter(&config, 2021, 2, None, &targets(&[ACME]), false).unwrap();

    assert_eq!(summary.extracted.len(), 1);
    assert!(dir.join("20210510.nc.tar.gz").exists());
}

#[test]
fn quarter_extraction_of_a_single_date() {
    let storage = tempfile::tempdir().unwrap();
    let config = Config {
        storage_path: storage.path().to_path_buf(),
        ..Config::default()
    };
    let dir = config.quarter_dir(2021, 2);
    std::fs::create_dir_all(&dir).unwrap();
    write_feed(&dir.join("20210510.nc.tar.gz"), &[(nc(ACME), "acme")]);
    write_feed(&dir.join("20210511.nc.tar.gz"), &[(nc(BETA), "beta")]);

    let summary = extract_quarter(
        &config,
        2021,
        2,
        Some("20210511"),
        &targets(&[ACME, BETA]),
        true,
    )
    .unwrap();

    assert_eq!(summary.feeds, 1);
    assert_eq!(summary.extracted, vec![dir.join(nc(BETA))]);
    assert_eq!(summary.remaining, targets(&[ACME]));
    assert!(dir.join("20210510.nc.tar.gz").exists());
    assert!(!dir.join("20210511.nc.tar.gz").exists());

    let none = extract_quarter(&config, 2021, 2, Some("20210601"), &targets(&[ACME]), false)
        .unwrap();
    assert_eq!(none.feeds, 0);
}

#[test]
fn failed_delete_is_recorded_and_the_scan_goes_on() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("20210510.nc.tar.gz");
    let last = dir.path().join("20210512.nc.tar.gz");
    write_feed(&first, &[(nc(ACME), "acme")]);
    write_feed(&last, &[(nc(BETA), "beta")]);
    // every target is found before this one, so it is never opened, only deleted
    let vanished = dir.path().join("20210511.nc.tar.gz");

    let summary = extract_feeds(
        &[first.clone(), vanished.clone(), last.clone()],
        &targets(&[ACME]),
        true,
    );

    assert_eq!(summary.feeds, 3);
    assert_eq!(summary.extracted, vec![dir.path().join(nc(ACME))]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, vanished);
    // the archive after the failed delete was still processed
    assert!(!first.exists());
    assert!(!last.exists());
}
