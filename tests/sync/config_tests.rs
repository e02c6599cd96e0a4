// Config file loading tests

use std::fs;
use std::path::Path;

use logsync::config::Config;
use logsync::sync::UnknownRemotePolicy;

#[test]
fn test_load_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(
        &path,
        r#"
s3_bucket: pds-logs
s3_logdir: /logs/
unknown_remote: skip
subdirs:
  img:
    img-http:
      include: ["*.log", "access_log*"]
      extra: ["*.log"]
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    let jobs = config.jobs(Path::new("/var/log"));

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].source_dir, Path::new("/var/log/img/img-http"));
    assert_eq!(jobs[0].dest_prefix, "logs/img/img-http");
    assert_eq!(jobs[0].include_patterns(), vec!["*.log", "access_log*"]);
    assert_eq!(config.sync_options().unknown_remote, UnknownRemotePolicy::Skip);
}

#[test]
fn test_load_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
s3_bucket = "pds-logs"
compression_level = 9

[subdirs.naif.naif-http]
include = ["*.log"]
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.compression_level().value(), 9);
    assert_eq!(config.jobs(Path::new("/l"))[0].dest_prefix, "naif/naif-http");
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
