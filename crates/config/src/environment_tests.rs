// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

const FULL: &str = r#"
data_directory = "data"
queue_size = 10
working_set = ["demo"]
continuous_exporters = ["json_log"]

[modules.goal]
type = "xml"
interval = -1
config = { file = "goal.xml" }

[modules.netscan]
type = "fake"
interval = 30

[triggered_exporters.topology_xml]
interval = 300

[planner]
binary = "/opt/fast-downward/fast-downward.py"
domain = "/etc/trellis/planning/testbed_domain.pddl"
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn parses_modules_and_exporters() {
    let file = write_config(FULL);
    let config = EnvironmentConfig::load(file.path()).unwrap();

    assert_eq!(config.queue_size, 10);
    assert_eq!(config.modules.len(), 2);
    let goal = config.module("goal").unwrap();
    assert_eq!(goal.kind, "xml");
    assert_eq!(goal.interval, -1);
    assert_eq!(goal.config["file"].as_str(), Some("goal.xml"));

    let netscan = config.module("netscan").unwrap();
    assert_eq!(netscan.interval, 30);
    assert!(netscan.config.is_empty());

    assert_eq!(config.continuous_exporters, vec!["json_log"]);
    assert_eq!(config.triggered_exporters["topology_xml"].interval, 300);

    let planner = config.planner.unwrap();
    assert_eq!(planner.search, "eager_greedy(ff(), preferred=ff())");
}

#[test]
fn data_directory_is_required() {
    let file = write_config("queue_size = 3\n");
    assert!(matches!(EnvironmentConfig::load(file.path()), Err(ConfigError::Parse { .. })));
}

#[test]
fn relative_data_directory_resolves_against_environment_dir() {
    let file = write_config(FULL);
    let config = EnvironmentConfig::load(file.path()).unwrap();
    let dir = config.data_dir(std::path::Path::new("/srv/trellis/lab"));
    assert_eq!(dir, std::path::PathBuf::from("/srv/trellis/lab/data"));
}

#[test]
fn unknown_module_is_a_missing_key() {
    let file = write_config(FULL);
    let config = EnvironmentConfig::load(file.path()).unwrap();
    assert!(matches!(config.module("nope"), Err(ConfigError::MissingKey { .. })));
}

#[test]
fn queue_size_defaults_to_twenty() {
    let file = write_config("data_directory = \"data\"\n");
    let config = EnvironmentConfig::load(file.path()).unwrap();
    assert_eq!(config.queue_size, DEFAULT_QUEUE_SIZE);
}
