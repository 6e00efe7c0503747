use image::{Rgb, RgbImage};
use photoreject::history::{self, HistoryAction, Selection};
use photoreject::{
    ApplyAction, ApplyOptions, DedupConfig, DedupError, Deduplicator, SurvivorPolicy,
    find_duplicates_to_reject,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Horizontal ramp. Two ramps of the same direction hash alike at any size;
/// opposite directions are as far apart as gradient hashes get.
fn save_photo(dir: &Path, name: &str, width: u32, rising: bool) {
    let height = width * 3 / 4;
    RgbImage::from_fn(width, height, |x, y| {
        let v = (x * 255 / (width - 1)) as u8;
        let v = if rising { v } else { 255 - v };
        Rgb([v, v.saturating_sub((y % 4) as u8), v / 2])
    })
    .save(dir.join(name))
    .unwrap();
}

fn visible_files(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect()
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn empty_folder_rejects_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let outcome = find_duplicates_to_reject(temp_dir.path()).unwrap();
    assert!(outcome.rejected().is_empty());
    assert!(!outcome.is_partial());
}

#[test]
fn single_image_rejects_nothing() {
    let temp_dir = TempDir::new().unwrap();
    save_photo(temp_dir.path(), "only.jpg", 64, true);

    let outcome = find_duplicates_to_reject(temp_dir.path()).unwrap();
    assert!(outcome.rejected().is_empty());
    assert_eq!(visible_files(temp_dir.path()), set(&["only.jpg"]));
}

#[test]
fn unrelated_images_are_left_alone() {
    let temp_dir = TempDir::new().unwrap();
    save_photo(temp_dir.path(), "left.jpg", 64, true);
    save_photo(temp_dir.path(), "right.jpg", 64, false);

    let outcome = find_duplicates_to_reject(temp_dir.path()).unwrap();
    assert!(outcome.rejected().is_empty());
    assert!(outcome.applied.removed.is_empty());
    assert_eq!(visible_files(temp_dir.path()), set(&["left.jpg", "right.jpg"]));
}

#[test]
fn identical_copy_is_rejected_and_removed() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save_photo(root, "cat1.jpg", 96, true);
    fs::copy(root.join("cat1.jpg"), root.join("cat1_copy.jpg")).unwrap();
    save_photo(root, "dog.jpg", 96, false);

    let outcome = find_duplicates_to_reject(root).unwrap();
    assert_eq!(outcome.rejected(), set(&["cat1_copy.jpg"]));
    assert_eq!(outcome.applied.removed, vec!["cat1_copy.jpg".to_string()]);
    assert_eq!(visible_files(root), set(&["cat1.jpg", "dog.jpg"]));

    let records = history::read_records(root).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].retained, "cat1.jpg");
    assert_eq!(records[0].action, HistoryAction::Deleted);
}

#[test]
fn first_discovered_of_three_survives() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save_photo(root, "a.jpg", 128, true);
    save_photo(root, "b.jpg", 96, true);
    save_photo(root, "c.jpg", 64, true);

    let outcome = find_duplicates_to_reject(root).unwrap();
    assert_eq!(outcome.rejected(), set(&["b.jpg", "c.jpg"]));
    assert_eq!(outcome.plan.clusters.len(), 1);
    assert_eq!(outcome.plan.clusters[0].survivor, "a.jpg");
    assert_eq!(visible_files(root), set(&["a.jpg"]));
}

#[test]
fn second_run_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save_photo(root, "x.jpg", 64, true);
    fs::copy(root.join("x.jpg"), root.join("y.jpg")).unwrap();

    assert_eq!(find_duplicates_to_reject(root).unwrap().rejected(), set(&["y.jpg"]));
    assert!(find_duplicates_to_reject(root).unwrap().rejected().is_empty());
}

#[test]
fn corrupt_image_is_skipped_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save_photo(root, "a.jpg", 64, true);
    fs::copy(root.join("a.jpg"), root.join("b.jpg")).unwrap();
    fs::write(root.join("broken.jpg"), b"\xFF\xD8 truncated").unwrap();

    let outcome = find_duplicates_to_reject(root).unwrap();
    assert!(outcome.is_partial());
    assert_eq!(outcome.skipped().len(), 1);
    assert_eq!(outcome.skipped()[0].name, "broken.jpg");
    assert_eq!(outcome.rejected(), set(&["b.jpg"]));
    assert!(root.join("broken.jpg").exists());
}

#[test]
fn missing_folder_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("photos");
    assert!(matches!(
        find_duplicates_to_reject(&missing),
        Err(DedupError::FolderNotFound { .. })
    ));
}

#[test]
fn largest_policy_keeps_biggest_image() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save_photo(root, "a_small.jpg", 64, true);
    save_photo(root, "b_large.jpg", 160, true);

    let dedup = Deduplicator::new(DedupConfig {
        keep: SurvivorPolicy::Largest,
        history: false,
        ..DedupConfig::default()
    })
    .unwrap();
    let outcome = dedup.find_duplicates_to_reject(root).unwrap();
    assert_eq!(outcome.rejected(), set(&["a_small.jpg"]));
    assert_eq!(visible_files(root), set(&["b_large.jpg"]));
}

#[test]
fn moved_duplicates_can_be_restored() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save_photo(root, "p.jpg", 64, true);
    fs::copy(root.join("p.jpg"), root.join("q.jpg")).unwrap();

    let dedup = Deduplicator::new(DedupConfig::default()).unwrap();
    let plan = dedup.plan(root).unwrap();
    let options = ApplyOptions {
        action: ApplyAction::Move {
            target_dir: root.join("duplicates"),
        },
        ..ApplyOptions::default()
    };
    dedup.apply(&plan, &options).unwrap();
    assert!(!root.join("q.jpg").exists());

    let report = history::restore(root, Selection::Latest).unwrap();
    assert_eq!(report.restored, vec!["q.jpg".to_string()]);
    assert!(root.join("q.jpg").exists());
    assert!(history::read_records(root).unwrap().is_empty());
}
