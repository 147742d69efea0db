use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{ImageFormat, RgbImage};
use tempfile::TempDir;

fn hoard_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_hoard"))
}

fn picture(variant: u8) -> Vec<u8> {
    let mut img = RgbImage::from_fn(64, 64, |x, y| {
        let v = if (x / 8 + y / 16) % 2 == 0 { 20 } else { 235 };
        image::Rgb([v, v, v])
    });
    img.put_pixel(0, 0, image::Rgb([variant, variant, variant]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let incoming = root.join("incoming");
    fs::create_dir_all(&incoming).unwrap();
    fs::write(incoming.join("one.png"), picture(1)).unwrap();
    fs::write(incoming.join("two.png"), picture(2)).unwrap();
    fs::write(incoming.join("notes.txt"), "not an image").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/hoard.sqlite"

[storage]
root = "{root}/data/blobs"

[thumbnails]
width = 32
height = 32

[duplicates]
batch_limit = 10
similarity_threshold = 95.0
"#,
        root = root.display()
    );

    let config_path = config_dir.join("hoard.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn source(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .join("incoming")
        .join(name)
        .to_string_lossy()
        .to_string()
}

fn run_hoard(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hoard_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hoard binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database_and_buckets() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hoard(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/hoard.sqlite").exists());
    assert!(tmp.path().join("data/blobs/files/f00").is_dir());
    assert!(tmp.path().join("data/blobs/files/tff").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_hoard(&config_path, &["init"]);
    let (_, _, success2) = run_hoard(&config_path, &["init"]);
    assert!(success1);
    assert!(success2);
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_hoard(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_import_file_twice_reports_already_imported() {
    let (_tmp, config_path) = setup_test_env();
    run_hoard(&config_path, &["init"]);
    let one = source(&config_path, "one.png");

    let (stdout, stderr, success) = run_hoard(&config_path, &["import", "file", &one]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("succeeded: 1"));
    assert!(stdout.contains("thumbnails: 1"));

    let (stdout, _, success) = run_hoard(&config_path, &["import", "file", &one]);
    assert!(success);
    assert!(stdout.contains("already imported"));
    assert!(stdout.contains("succeeded: 1"));
}

#[test]
fn test_import_type_filter_rejects_non_images() {
    let (_tmp, config_path) = setup_test_env();
    let notes = source(&config_path, "notes.txt");
    let one = source(&config_path, "one.png");

    let (stdout, _, success) = run_hoard(
        &config_path,
        &["import", "file", &notes, &one, "--type", "png"],
    );
    assert!(success);
    assert!(stdout.contains("Failed Filetype filter"));
    assert!(stdout.contains("succeeded: 1"));
    assert!(stdout.contains("failed: 1"));
}

#[test]
fn test_delete_then_reimport_requires_flag() {
    let (_tmp, config_path) = setup_test_env();
    let one = source(&config_path, "one.png");
    run_hoard(&config_path, &["import", "file", &one]);

    let (stdout, _, success) = run_hoard(&config_path, &["delete", "1"]);
    assert!(success);
    assert!(stdout.contains("deleted: 1"));

    let (stdout, _, _) = run_hoard(&config_path, &["delete", "1"]);
    assert!(stdout.contains("already deleted"));

    let (stdout, _, success) = run_hoard(&config_path, &["import", "file", &one]);
    assert!(success);
    assert!(stdout.contains("reimport is not allowed"));
    assert!(stdout.contains("failed: 1"));

    let (stdout, _, success) =
        run_hoard(&config_path, &["import", "file", &one, "--allow-reimport"]);
    assert!(success);
    assert!(stdout.contains("reimported"));
    assert!(stdout.contains("succeeded: 1"));
}

#[test]
fn test_delete_unknown_item() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_hoard(&config_path, &["delete", "42"]);
    assert!(success);
    assert!(stdout.contains("Item not found"));
    assert!(stdout.contains("failed: 1"));
}

#[test]
fn test_dupes_scan_list_and_resolve_with_keep() {
    let (_tmp, config_path) = setup_test_env();
    let one = source(&config_path, "one.png");
    let two = source(&config_path, "two.png");
    run_hoard(&config_path, &["import", "file", &one, &two]);

    let (stdout, stderr, success) = run_hoard(&config_path, &["dupes", "scan"]);
    assert!(success, "scan failed: {}", stderr);
    assert!(stdout.contains("hashed: 2"));
    assert!(stdout.contains("new candidates: 1"));

    // A second scan must not record the same pair again.
    let (stdout, _, _) = run_hoard(&config_path, &["dupes", "scan"]);
    assert!(stdout.contains("new candidates: 0"));

    let (stdout, _, success) = run_hoard(&config_path, &["dupes", "list"]);
    assert!(success);
    assert!(stdout.contains("SCORE"));
    assert_eq!(stdout.lines().count(), 2);

    let (stdout, stderr, success) =
        run_hoard(&config_path, &["dupes", "resolve", "1", "--keep", "1"]);
    assert!(success, "resolve failed: {}", stderr);
    assert!(stdout.contains("kept: 1"));
    assert!(stdout.contains("deleted: 2"));

    let (stdout, _, _) = run_hoard(&config_path, &["dupes", "list"]);
    assert!(stdout.contains("No duplicate candidates."));
}

#[test]
fn test_dupes_resolve_rejects_keep_outside_pair() {
    let (_tmp, config_path) = setup_test_env();
    let one = source(&config_path, "one.png");
    let two = source(&config_path, "two.png");
    run_hoard(&config_path, &["import", "file", &one, &two]);
    run_hoard(&config_path, &["dupes", "scan"]);

    let (_, _, success) = run_hoard(&config_path, &["dupes", "resolve", "1", "--keep", "7"]);
    assert!(!success);

    let (stdout, _, success) = run_hoard(
        &config_path,
        &["dupes", "resolve", "1", "--resolution", "keep-both"],
    );
    assert!(success);
    assert!(stdout.contains("decision: keep_both"));
}

#[test]
fn test_move_to_archive() {
    let (_tmp, config_path) = setup_test_env();
    let one = source(&config_path, "one.png");
    run_hoard(&config_path, &["import", "file", &one]);
    let hash = hoard_core::hash(&picture(1)).to_hex();

    let (stdout, stderr, success) = run_hoard(&config_path, &["move", &hash, "--to", "archive"]);
    assert!(success, "move failed: {}", stderr);
    assert!(stdout.contains("repository: archive"));
    assert!(stdout.contains("updated: 1"));
}

#[test]
fn test_move_unknown_hash_errors() {
    let (_tmp, config_path) = setup_test_env();
    let hash = "0".repeat(64);
    let (_, stderr, success) = run_hoard(&config_path, &["move", &hash, "--to", "trash"]);
    assert!(!success);
    assert!(stderr.contains("Hash not found"));
}
