//! Directory scanning and per-file failure isolation.

use std::fs;

use logsift::scanner::{list_log_files, scan_directory};

#[test]
fn one_error_and_one_info_line_yield_one_signature() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("sample.log"),
        "[2025-10-14 08:02:11] [ERROR] Timeout occurred\n[INFO] ok\n",
    )
    .expect("write log");

    let report = scan_directory(dir.path()).expect("scan");
    assert_eq!(report.files_parsed, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.counts.len(), 1);
    assert_eq!(report.counts.get("Timeout occurred"), Some(1));
}

#[test]
fn empty_directory_yields_empty_counts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = scan_directory(dir.path()).expect("scan");
    assert!(report.counts.is_empty());
    assert_eq!(report.files_parsed, 0);
}

#[test]
fn missing_directory_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = scan_directory(&dir.path().join("nope")).expect("scan");
    assert!(report.counts.is_empty());
    assert!(list_log_files(&dir.path().join("nope"))
        .expect("list")
        .is_empty());
}

#[test]
fn only_log_extension_is_scanned() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("b.log"), "ERROR kept\n").expect("write");
    fs::write(dir.path().join("a.log"), "ERROR kept\n").expect("write");
    fs::write(dir.path().join("notes.txt"), "ERROR ignored\n").expect("write");
    fs::write(dir.path().join("old.log.1"), "ERROR ignored\n").expect("write");

    let files = list_log_files(dir.path()).expect("list");
    let names: Vec<_> = files
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .collect();
    assert_eq!(names, vec!["a.log", "b.log"]);

    let report = scan_directory(dir.path()).expect("scan");
    assert_eq!(report.counts.get("ERROR kept"), Some(2));
    assert_eq!(report.counts.len(), 1);
}

#[test]
fn subdirectories_are_not_descended() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("nested");
    fs::create_dir_all(&nested).expect("mkdir");
    fs::write(nested.join("deep.log"), "ERROR hidden\n").expect("write");

    let report = scan_directory(dir.path()).expect("scan");
    assert!(report.counts.is_empty());
}

#[test]
fn unreadable_file_is_skipped_and_scan_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    // A directory with a .log name is listed but cannot be read as a file.
    fs::create_dir_all(dir.path().join("broken.log")).expect("mkdir");
    fs::write(dir.path().join("good.log"), "[t] [ERROR] still counted\n").expect("write");

    let report = scan_directory(dir.path()).expect("scan");
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_parsed, 1);
    assert_eq!(report.counts.get("still counted"), Some(1));
}

#[test]
fn invalid_utf8_does_not_fail_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("bin.log"), b"ERROR \xc3\x28 broken\n").expect("write");

    let report = scan_directory(dir.path()).expect("scan");
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.counts.total(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_file_names_are_scanned() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let name = OsStr::from_bytes(b"app-\xff\xfe.log");
    fs::write(dir.path().join(name), "[t] [ERROR] odd name\n").expect("write");
    fs::write(dir.path().join("app-\u{e9}.txt"), "ERROR ignored\n").expect("write");

    let files = list_log_files(dir.path()).expect("list");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name(), Some(name));

    let report = scan_directory(dir.path()).expect("scan");
    assert_eq!(report.files_parsed, 1);
    assert_eq!(report.counts.get("odd name"), Some(1));
}
