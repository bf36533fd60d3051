// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

#[test]
fn lookup_by_object_and_action() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[h1]
configureCpus = "xen_configure_cpus_legacy"

["enxaabbccddeeff"]
configureInterface = "debian_configure_interface"
"#,
    )
    .unwrap();

    let overrides = BuilderOverrides::load(file.path()).unwrap();
    assert_eq!(overrides.lookup("h1", "configureCpus"), Some("xen_configure_cpus_legacy"));
    assert_eq!(
        overrides.lookup("enxaabbccddeeff", "configureInterface"),
        Some("debian_configure_interface")
    );
    assert_eq!(overrides.lookup("h1", "boot"), None);
    assert_eq!(overrides.lookup("h2", "configureCpus"), None);
}

#[test]
fn absent_file_defaults_to_empty() {
    let overrides =
        BuilderOverrides::load_or_default(std::path::Path::new("/nonexistent/builder.toml"))
            .unwrap();
    assert!(overrides.is_empty());
    assert_eq!(overrides.lookup("h1", "boot"), None);
}
