//! Hot reload against the real `notify` backend.
//!
//! Command files live in a temp dir; the client runs in development mode and
//! the tests edit files on disk the way editors do, then wait for the new
//! reply to show up.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatcmd::{Client, ClientConfig, EventHub, Member, Message, RecordingChannel, User};
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(10);

fn message(content: &str) -> Message {
    let user = User {
        id: "7".into(),
        username: "user7".into(),
    };
    Message {
        id: "m".into(),
        channel_id: "c".into(),
        guild_id: Some("g".into()),
        member: Some(Member {
            user: user.clone(),
            nickname: None,
            permissions: BTreeSet::new(),
        }),
        author: user,
        content: content.into(),
    }
}

fn manifest(reply: &str) -> String {
    format!("label = \"ping\"\nreply = \"{reply}\"\n")
}

/// Save by writing a sibling temp file and renaming it over `path`.
fn save_atomically(path: &Path, body: &str) {
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, body).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

async fn dev_client(dir: &Path) -> (Arc<Client>, RecordingChannel) {
    let channel = RecordingChannel::new();
    let config = ClientConfig {
        development: true,
        ..ClientConfig::default()
    };
    let client = Client::builder(config, Arc::new(channel.clone()), Arc::new(EventHub::new()))
        .build()
        .expect("client builds");
    assert_eq!(client.register_directory(dir).await.unwrap(), 1);
    (client, channel)
}

/// Send `!ping` until it answers `expected`.
async fn wait_for_reply(client: &Arc<Client>, channel: &RecordingChannel, expected: &str) {
    let start = Instant::now();
    loop {
        client.handle_message(message("!ping")).await.unwrap();
        if channel.texts().last().map(String::as_str) == Some(expected) {
            return;
        }
        assert!(
            start.elapsed() < DEADLINE,
            "never saw {expected:?}, last replies: {:?}",
            channel.texts().iter().rev().take(3).collect::<Vec<_>>()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn in_place_edits_are_picked_up() {
    let temp = TempDir::new().expect("temp dir");
    let ping = temp.path().join("ping.toml");
    std::fs::write(&ping, manifest("v1")).unwrap();

    let (client, channel) = dev_client(temp.path()).await;
    wait_for_reply(&client, &channel, "v1").await;

    std::fs::write(&ping, manifest("v2")).unwrap();
    wait_for_reply(&client, &channel, "v2").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_survives_successive_rename_saves() {
    let temp = TempDir::new().expect("temp dir");
    let ping = temp.path().join("ping.toml");
    std::fs::write(&ping, manifest("v1")).unwrap();

    let (client, channel) = dev_client(temp.path()).await;
    wait_for_reply(&client, &channel, "v1").await;

    for version in ["v2", "v3", "v4"] {
        save_atomically(&ping, &manifest(version));
        wait_for_reply(&client, &channel, version).await;
    }

    // The temp file never becomes a command.
    assert!(client.resolve("ping").await.is_some());
    assert_eq!(
        client
            .with_reloader(|reloader| reloader.is_tracked(&temp.path().join("ping.toml.tmp")))
            .await,
        Some(false)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn renamed_import_reloads_its_dependent() {
    let temp = TempDir::new().expect("temp dir");
    let shared = temp.path().join("shared");
    std::fs::create_dir(&shared).unwrap();
    let words = shared.join("words.toml");
    std::fs::write(&words, "[vars]\nword = \"v1\"\n").unwrap();
    std::fs::write(
        temp.path().join("ping.toml"),
        "label = \"ping\"\nimports = [\"./shared/words.toml\"]\nreply = \"{word}\"\n",
    )
    .unwrap();

    let (client, channel) = dev_client(temp.path()).await;
    wait_for_reply(&client, &channel, "v1").await;

    for version in ["v2", "v3"] {
        save_atomically(&words, &format!("[vars]\nword = \"{version}\"\n"));
        wait_for_reply(&client, &channel, version).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_the_file_unregisters_the_command() {
    let temp = TempDir::new().expect("temp dir");
    let ping = temp.path().join("ping.toml");
    std::fs::write(&ping, manifest("v1")).unwrap();

    let (client, _) = dev_client(temp.path()).await;
    assert!(client.resolve("ping").await.is_some());

    std::fs::remove_file(&ping).unwrap();
    let start = Instant::now();
    while client.resolve("ping").await.is_some() {
        assert!(start.elapsed() < DEADLINE, "command still registered");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
