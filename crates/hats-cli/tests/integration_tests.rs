//! Integration tests for the `hats` CLI binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const CATALOG: &str = r#"{
    "atmosphere": {
        "name": "Atmosphere",
        "category": "Core",
        "source_type": "github_release",
        "repo": "Atmosphere-NX/Atmosphere",
        "asset_patterns": [{"pattern": "atmosphere-*.zip", "processing_steps": [{"action": "unzip_to_root"}]}],
        "asset_info": {"version": "1.8.0"},
        "default": true
    },
    "ftpd": {
        "name": "ftpd",
        "category": "Homebrew",
        "source_type": "direct_url",
        "url": "https://example.invalid/3.2.0/ftpd.nro",
        "processing_steps": [{"action": "copy_file", "target_path": "switch/ftpd"}]
    }
}"#;

/// Test context that sets up a temporary HATS home and SD card root
struct TestContext {
    _temp_dir: TempDir,
    hats_home: PathBuf,
    sd_root: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let hats_home = temp_dir.path().join(".hats");
        let sd_root = temp_dir.path().join("sd");
        std::fs::create_dir_all(&hats_home).expect("failed to create hats home");
        std::fs::create_dir_all(&sd_root).expect("failed to create sd root");
        std::fs::write(hats_home.join("components.json"), CATALOG).expect("failed to write catalog");

        Self {
            _temp_dir: temp_dir,
            hats_home,
            sd_root,
        }
    }

    fn hats(&self, args: &[&str]) -> Output {
        let bin_path = env!("CARGO_BIN_EXE_hats");
        Command::new(bin_path)
            .args(args)
            .env("HATS_HOME", &self.hats_home)
            .env("HATS_API_URL", "http://127.0.0.1:9")
            .env_remove("GITHUB_TOKEN")
            .env_remove("HATS_CATALOG")
            .output()
            .expect("failed to run hats")
    }

    fn root_arg(&self) -> &str {
        self.sd_root.to_str().expect("utf-8 temp path")
    }

    fn write_sd(&self, rel: &str, contents: &str) {
        let path = self.sd_root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read_json(&self, name: &str) -> serde_json::Value {
        let text = std::fs::read_to_string(self.sd_root.join(name)).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_pack(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.hats(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_list_reads_catalog_from_hats_home() {
    let ctx = TestContext::new();
    let output = ctx.hats(&["list"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("atmosphere"));
    assert!(out.contains("direct_url"));
    assert!(out.contains("1.8.0"));
    assert!(out.contains("2 components"));
}

#[test]
fn test_build_rejects_unknown_component_before_network() {
    let ctx = TestContext::new();
    let output = ctx.hats(&["build", "nope"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("'nope' is not in the catalog"));
    assert!(!ctx.hats_home.join("manifest.json").exists());
}

#[test]
fn test_build_without_selection_fails() {
    let ctx = TestContext::new();
    let output = ctx.hats(&["build"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Nothing selected"));
}

#[test]
fn test_trash_and_restore_on_sd_root() {
    let ctx = TestContext::new();
    ctx.write_sd("switch/ftpd/ftpd.nro", "nro");
    ctx.write_sd("atmosphere/package3", "fw");
    let manifest = serde_json::json!({
        "pack_name": "HATS-01012025-abcdef0.zip",
        "components": {
            "ftpd": {"name": "ftpd", "version": "3.2.0", "category": "Homebrew",
                     "files": ["switch/ftpd/ftpd.nro"]},
            "atmosphere": {"name": "Atmosphere", "version": "1.8.0", "category": "Core",
                           "files": ["atmosphere/package3"]}
        }
    });
    std::fs::write(ctx.sd_root.join("manifest.json"), manifest.to_string()).unwrap();

    let output = ctx.hats(&["trash", "--root", ctx.root_arg(), "ftpd"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!ctx.sd_root.join("switch/ftpd/ftpd.nro").exists());
    assert!(ctx.sd_root.join("atmosphere/package3").exists());
    assert!(ctx.read_json("manifest.json")["components"].get("ftpd").is_none());
    assert_eq!(ctx.read_json("trash.json")["components"]["ftpd"]["version"], "3.2.0");

    let status = ctx.hats(&["status", "--root", ctx.root_arg()]);
    assert!(status.status.success());
    assert!(stdout(&status).contains("1 installed, 1 in trash"));

    let output = ctx.hats(&["restore", "--root", ctx.root_arg(), "ftpd"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        ctx.read_json("manifest.json")["components"]["ftpd"],
        manifest["components"]["ftpd"]
    );
    assert!(ctx.read_json("trash.json")["components"].as_object().unwrap().is_empty());
    assert!(!ctx.sd_root.join("switch/ftpd/ftpd.nro").exists());
}

#[test]
fn test_install_replaces_mutable_state() {
    let ctx = TestContext::new();
    ctx.write_sd("atmosphere/contents/stale/exefs.nsp", "old");
    ctx.write_sd("HATS-01012024-1111111.txt", "old summary");
    ctx.write_sd("trash.json", r#"{"components": {}}"#);
    ctx.write_sd("Nintendo/save.dat", "keep");

    let pack = ctx.hats_home.join("HATS-02022025-2222222.zip");
    write_pack(
        &pack,
        &[
            ("atmosphere/package3", "fw"),
            (
                "manifest.json",
                r#"{"pack_name": "HATS-02022025-2222222.zip", "components": {"atmosphere": {"name": "Atmosphere", "version": "1.8.0", "files": ["atmosphere/package3"]}}}"#,
            ),
            ("HATS-02022025-2222222.txt", "summary"),
        ],
    );

    let output = ctx.hats(&["install", "--root", ctx.root_arg(), pack.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!ctx.sd_root.join("atmosphere/contents/stale").exists());
    assert!(ctx.sd_root.join("atmosphere/package3").exists());
    assert!(!ctx.sd_root.join("HATS-01012024-1111111.txt").exists());
    assert!(!ctx.sd_root.join("trash.json").exists());
    assert!(ctx.sd_root.join("Nintendo/save.dat").exists());
    assert_eq!(
        ctx.read_json("manifest.json")["pack_name"],
        "HATS-02022025-2222222.zip"
    );
}
