// CLI entry point tests

use std::path::Path;
use std::process::Command;

use lopdf::{Document, Object, Stream, dictionary};

fn cargo_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pdf_image_extract"))
}

/// ヘルパー: 1x1 グレー画像を1枚だけ持つPDFを書き出す
fn write_single_image_pdf(path: &Path) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![128],
    ));
    let contents_id = doc.add_object(Stream::new(dictionary! {}, vec![]));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        "Contents" => contents_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save test PDF");
}

// ============================================================
// 1. No arguments shows usage and exits with failure
// ============================================================

#[test]
fn test_main_no_args_shows_usage() {
    let output = cargo_bin().output().expect("failed to execute binary");

    assert!(
        !output.status.success(),
        "should exit with failure when no args given"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Usage"),
        "stderr should contain 'Usage', got: {stderr}"
    );
}

// ============================================================
// 2. --help / --version
// ============================================================

#[test]
fn test_main_help_flag() {
    let output = cargo_bin()
        .arg("-h")
        .output()
        .expect("failed to execute binary");

    assert!(output.status.success(), "should exit with success for -h");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "got: {stderr}");
}

#[test]
fn test_main_version_flag() {
    let output = cargo_bin()
        .arg("--version")
        .output()
        .expect("failed to execute binary");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let version = env!("CARGO_PKG_VERSION");
    assert!(
        stderr.contains(version),
        "stderr should contain version '{version}', got: {stderr}"
    );
}

// ============================================================
// 3. Job files
// ============================================================

#[test]
fn test_main_nonexistent_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = cargo_bin()
        .arg(dir.path().join("missing.yaml"))
        .output()
        .expect("failed to execute binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR"), "got: {stderr}");
}

#[test]
fn test_main_runs_job_and_writes_log() {
    let dir = tempfile::tempdir().unwrap();
    write_single_image_pdf(&dir.path().join("input.pdf"));
    std::fs::write(
        dir.path().join("settings.yaml"),
        "opaque_format: png\nlog_dir: logs\n",
    )
    .unwrap();
    let job_path = dir.path().join("jobs.yaml");
    std::fs::write(
        &job_path,
        "jobs:\n  - input: input.pdf\n    output: images\n",
    )
    .unwrap();

    let output = cargo_bin()
        .arg(&job_path)
        .output()
        .expect("failed to execute binary");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "got: {stderr}");
    assert!(stderr.contains("OK:"), "got: {stderr}");
    assert!(stderr.contains("(1 images, 0 fallbacks)"), "got: {stderr}");

    assert!(dir.path().join("images").join("image_1_1.png").exists());
    assert!(dir.path().join("images").join("manifest.json").exists());

    let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("image_extraction_"));
}

#[test]
fn test_main_failed_job_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let job_path = dir.path().join("jobs.yaml");
    std::fs::write(
        &job_path,
        "jobs:\n  - input: missing.pdf\n    output: images\n",
    )
    .unwrap();

    let output = cargo_bin()
        .arg(&job_path)
        .output()
        .expect("failed to execute binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR:"), "got: {stderr}");
}
