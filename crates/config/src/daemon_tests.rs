// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn parses_a_full_daemon_config() {
    let file = write_config(
        r#"
socket = "/run/trellis/trellisd.sock"
log_level = "debug"
log_dir = "/var/log/trellis"

[environments.lab]
path = "/srv/trellis/lab"

[environments.staging]
path = "/srv/trellis/staging"
"#,
    );

    let config = DaemonConfig::load(file.path()).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.environments.len(), 2);
    assert_eq!(
        config.environments["lab"].path,
        std::path::PathBuf::from("/srv/trellis/lab")
    );
}

#[test]
fn socket_is_required() {
    let file = write_config("log_level = \"info\"\n");
    assert!(matches!(DaemonConfig::load(file.path()), Err(ConfigError::Parse { .. })));
}

#[test]
fn missing_file_is_an_io_error() {
    let missing = std::path::Path::new("/nonexistent/trellis.toml");
    assert!(matches!(DaemonConfig::load(missing), Err(ConfigError::Io { .. })));
}

#[test]
fn defaults_apply_for_log_rotation() {
    let file = write_config("socket = \"/tmp/t.sock\"\n");
    let config = DaemonConfig::load(file.path()).unwrap();
    assert_eq!(config.log_level, "info");
    assert_eq!(config.backup_count, 5);
    assert!(config.environments.is_empty());
}
