// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use trellis_core::FakeClock;

fn daemon_config(dir: &Path) -> DaemonConfig {
    let lab = dir.join("lab");
    std::fs::create_dir_all(&lab).unwrap();
    std::fs::write(lab.join("environment.toml"), "data_directory = \"data\"\n").unwrap();

    // One broken environment that must not take the daemon down.
    let broken = dir.join("broken");
    std::fs::create_dir_all(&broken).unwrap();

    let config = format!(
        r#"
socket = "{}"

[environments.lab]
path = "{}"

[environments.broken]
path = "{}"
"#,
        dir.join("trellisd.sock").display(),
        lab.display(),
        broken.display()
    );
    let path = dir.join("trellisd.toml");
    std::fs::write(&path, config).unwrap();
    DaemonConfig::load(&path).unwrap()
}

fn manager(dir: &Path) -> EnvironmentManager {
    let config = daemon_config(dir);
    EnvironmentManager::new(
        &config,
        Arc::new(LocationsRegistry::default()),
        &CollectorRegistry::builtin(),
        &ExporterRegistry::builtin(),
        |_| {},
        Arc::new(FakeClock::new()),
    )
}

fn text(response: Response) -> String {
    match response {
        Response::Message { text } => text,
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test]
async fn broken_environments_never_reach_running_state() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());
    assert_eq!(manager.names(), vec!["lab"]);
}

#[tokio::test]
async fn upload_list_and_read_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let reply = manager
        .handle(Request::UploadConfiguration {
            environment: "lab".to_string(),
            name: "goal.xml".to_string(),
            data: "<config name=\"demo\"/>".to_string(),
        })
        .await;
    assert_eq!(text(reply), "Successfully uploaded configuration 'goal.xml'.");

    let reply = manager.handle(Request::ListFiles { environment: "lab".to_string() }).await;
    let listing = text(reply);
    assert!(listing.contains("Found 1 file(s)"));
    assert!(listing.contains("goal.xml"));

    let reply = manager
        .handle(Request::GetFile { environment: "lab".to_string(), name: "goal.xml".to_string() })
        .await;
    assert!(text(reply).contains("<config name=\"demo\"/>"));
}

#[tokio::test]
async fn unknown_environments_get_a_string_reply() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let reply = manager.handle(Request::ListFiles { environment: "nope".to_string() }).await;
    assert_eq!(text(reply), "Environment 'nope' unknown.");
}

#[tokio::test]
async fn setup_progress_is_idle_before_any_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let reply =
        manager.handle(Request::GetSetupProgress { environment: "lab".to_string() }).await;
    assert_eq!(text(reply), "Process of 'lab': ");
}

#[tokio::test]
async fn command_listing_carries_arities_and_docs() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let reply = manager.handle(Request::GetCommands).await;
    match reply {
        Response::Commands { commands } => {
            let upload = &commands["uploadConfiguration"];
            assert_eq!((upload.min_args, upload.max_args), (3, 3));
            assert!(!upload.doc.is_empty());
            assert!(commands.contains_key("applyConfiguration"));
            assert!(commands.contains_key("getEnvironments"));
        }
        other => panic!("expected commands, got {other:?}"),
    }
}

#[tokio::test]
async fn environments_list_and_ping() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    assert_eq!(text(manager.handle(Request::GetEnvironments).await), "lab");
    assert_eq!(text(manager.handle(Request::Ping).await), "pong");
}
