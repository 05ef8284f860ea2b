use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MANIFEST: &str = r#"
targets:
  default:
    env:
      - OUT={PKGDIR}/out
    commands:
      - echo compiling
      - cd src
      - echo "writing to $OUT"
  broken:
    commands:
      - echo first
      - "false"
      - echo unreachable
"#;

struct Fixture {
    _temp: TempDir,
    package: PathBuf,
    cache: PathBuf,
    config: PathBuf,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let package = temp.path().join("widget");
    fs::create_dir_all(package.join("src")).unwrap();
    fs::write(package.join(".kiln.yml"), MANIFEST).unwrap();
    let cache = temp.path().join("cache");
    let config = temp.path().join("config");
    fs::create_dir_all(&config).unwrap();
    Fixture {
        _temp: temp,
        package,
        cache,
        config,
    }
}

fn kiln(fixture: &Fixture, dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(dir)
        .env("KILN_CACHE_DIR", &fixture.cache)
        .env("KILN_CONFIG_DIR", &fixture.config)
        .env_remove("KILN_UPLOAD_BUILD_LOGS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_platform_reports_directories() {
    let fx = fixture();
    kiln(&fx, &fx.package)
        .arg("platform")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("cache:    {}", fx.cache.display())))
        .stdout(predicate::str::contains(format!("config:   {}", fx.config.display())))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_build_default_target() {
    let fx = fixture();
    kiln(&fx, &fx.package)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Running: echo compiling"))
        .stdout(predicate::str::contains(format!(
            "writing to {}/out",
            fx.package.display()
        )))
        .stdout(predicate::str::contains("TOTAL"))
        .stdout(predicate::str::contains("-- BUILD SUCCEEDED --"));

    assert!(fx.cache.join("packages/widget").is_dir());
}

#[test]
fn test_build_from_subdirectory_finds_package() {
    let fx = fixture();
    kiln(&fx, &fx.package.join("src"))
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("compiling"));
}

#[test]
fn test_failing_command_exits_with_build_failure() {
    let fx = fixture();
    kiln(&fx, &fx.package)
        .args(["build", "broken"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("first"))
        .stdout(predicate::str::contains("unreachable").not())
        .stdout(predicate::str::contains("-- BUILD FAILED --"))
        .stdout(predicate::str::contains("Build terminated with the following error"));
}

#[test]
fn test_unknown_target_is_usage_error() {
    let fx = fixture();
    kiln(&fx, &fx.package)
        .args(["build", "release"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Build target 'release' does not exist"))
        .stderr(predicate::str::contains("broken, default"));
}

#[test]
fn test_missing_manifest_is_usage_error() {
    let fx = fixture();
    let empty = fx.cache.join("nowhere");
    fs::create_dir_all(&empty).unwrap();
    kiln(&fx, &empty)
        .arg("build")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(".kiln.yml"));
}

#[test]
fn test_deps_only_runs_nothing() {
    let fx = fixture();
    kiln(&fx, &fx.package)
        .args(["build", "--deps-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compiling").not());
}

#[test]
fn test_exec_prefix_is_applied() {
    let fx = fixture();
    kiln(&fx, &fx.package)
        .args(["build", "--exec-prefix", "env"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Running: env echo compiling"));
}

#[test]
fn test_clean_removes_package_cache() {
    let fx = fixture();
    let stale = fx.cache.join("packages/widget/stale");
    fs::create_dir_all(&stale).unwrap();

    kiln(&fx, &fx.package)
        .args(["build", "--clean"])
        .assert()
        .success();

    assert!(!stale.exists());
    assert!(fx.cache.join("packages/widget").is_dir());
}

#[test]
fn test_uploads_build_log() {
    let fx = fixture();
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/buildlogs")
        .match_body(mockito::Matcher::Regex("compiling".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"contents":"","uuid":"b1d"}"#)
        .create();

    kiln(&fx, &fx.package)
        .arg("build")
        .env("KILN_UPLOAD_BUILD_LOGS", "true")
        .env("KILN_API_URL", server.url())
        .env("KILN_MANAGEMENT_URL", "https://app.example.com")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "View your build log here: https://app.example.com/buildlogs/b1d",
        ));

    mock.assert();
}

#[test]
fn test_rejected_upload_keeps_build_outcome() {
    let fx = fixture();
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/buildlogs")
        .with_status(500)
        .with_body("down for maintenance")
        .create();

    kiln(&fx, &fx.package)
        .arg("build")
        .env("KILN_UPLOAD_BUILD_LOGS", "true")
        .env("KILN_API_URL", server.url())
        .assert()
        .success()
        .stdout(predicate::str::contains("View your build log").not());

    mock.assert();
}
