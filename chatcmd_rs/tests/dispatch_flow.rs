//! Library-level flows: nested routing, built-ins, collectors inside handlers
//! and hot reload driven through the client.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chatcmd::reload::{Subscribe, Subscription};
use chatcmd::{
    ArgumentSpec, Client, ClientConfig, Collected, CollectorOptions, Command, Event,
    EventHandlers, EventHub, EventKind, Member, Message, Outcome, RecordingChannel, ReloadOutcome,
    Reply, User,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn message(author: &str, content: &str) -> Message {
    let user = User {
        id: author.into(),
        username: format!("user{author}"),
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

fn setup(config: ClientConfig) -> (Arc<Client>, RecordingChannel, Arc<EventHub>) {
    let channel = RecordingChannel::new();
    let hub = Arc::new(EventHub::new());
    let client = Client::builder(config, Arc::new(channel.clone()), hub.clone())
        .build()
        .expect("client builds");
    (client, channel, hub)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

// ============================================
// Routing
// ============================================

#[tokio::test]
async fn deepest_matching_subcommand_gets_the_leftover() {
    let (client, channel, _) = setup(ClientConfig::default());
    client
        .register_command(
            Command::new("a").reply("root").subcommand(
                Command::new("b")
                    .reply("mid")
                    .subcommand(Command::new("c").reply("leaf {args}")),
            ),
        )
        .await
        .unwrap();

    client.handle_message(message("7", "!A B C x y")).await.unwrap();
    client.handle_message(message("7", "!a b")).await.unwrap();
    client.handle_message(message("7", "!a q")).await.unwrap();
    assert_eq!(channel.texts(), vec!["leaf x y", "mid", "root"]);
}

#[tokio::test]
async fn first_registered_root_wins_and_collisions_are_refused() {
    let (client, channel, _) = setup(ClientConfig::default());
    client
        .register_command(Command::new("first").alias("go").reply("one"))
        .await
        .unwrap();
    let refused = client
        .register_command(Command::new("GO").reply("two"))
        .await;
    assert!(refused.is_err());

    client.handle_message(message("7", "!go")).await.unwrap();
    assert_eq!(channel.texts(), vec!["one"]);
    assert_eq!(client.unregister("FIRST").await, 1);
    let outcome = client.handle_message(message("7", "!go")).await.unwrap();
    assert_eq!(outcome, Outcome::UnknownCommand("go".into()));
}

#[tokio::test]
async fn zero_is_a_real_argument_value() {
    let (client, channel, _) = setup(ClientConfig::default());
    client
        .register_command(
            Command::new("count")
                .argument(ArgumentSpec::new("number", "n"))
                .handler(|inv| async move {
                    let n = inv.parsed.number("n");
                    Ok(Some(Reply::from(format!("{n:?}"))))
                }),
        )
        .await
        .unwrap();

    client.handle_message(message("7", "!count 0")).await.unwrap();
    assert_eq!(channel.texts(), vec!["Some(0.0)"]);
}

#[tokio::test]
async fn response_formatter_wraps_handler_replies_only() {
    let channel = RecordingChannel::new();
    let client = Client::builder(
        ClientConfig::default(),
        Arc::new(channel.clone()),
        Arc::new(EventHub::new()),
    )
    .format_response(|reply| match reply {
        Reply::Text(text) => Reply::Text(format!("> {text}")),
        other => other,
    })
    .build()
    .unwrap();
    client
        .register_command(
            Command::new("say")
                .argument(ArgumentSpec::new("string", "word"))
                .reply("{word}"),
        )
        .await
        .unwrap();

    client.handle_message(message("7", "!say hi")).await.unwrap();
    client.handle_message(message("7", "!say")).await.unwrap();
    assert_eq!(
        channel.texts(),
        vec!["> hi", "Not enough arguments, 1 required"]
    );
}

// ============================================
// Collectors
// ============================================

#[tokio::test]
async fn handler_waits_for_a_confirmation() {
    let (client, channel, hub) = setup(ClientConfig::default());
    client
        .register_command(Command::new("wipe").handler(|inv| async move {
            let author = inv.message.author.id.clone();
            inv.reply.send("Sure? (yes/no)").await?;
            let answer = inv
                .client
                .collectors()
                .await_messages(
                    CollectorOptions::new(move |m: &Message| m.author.id == author)
                        .timeout(Duration::from_secs(5)),
                )
                .await;
            let text = match answer {
                Collected::Single(Some(m)) if m.content == "yes" => "Wiped.",
                _ => "Cancelled.",
            };
            Ok(Some(Reply::from(text)))
        }))
        .await
        .unwrap();
    client.attach();

    hub.emit(&Event::MessageCreate(message("7", "!wipe")));
    let collectors = client.clone();
    wait_until(|| {
        collectors
            .collectors()
            .active_count(EventKind::MessageCreate)
            == 1
    })
    .await;

    // Someone else answering does not count.
    hub.emit(&Event::MessageCreate(message("8", "yes")));
    hub.emit(&Event::MessageCreate(message("7", "yes")));
    wait_until(|| channel.texts().len() == 2).await;
    assert_eq!(channel.texts(), vec!["Sure? (yes/no)", "Wiped."]);
}

#[tokio::test]
async fn streamed_matches_arrive_before_the_batch_completes() {
    let (client, _, hub) = setup(ClientConfig::default());
    let mut stream = client
        .collectors()
        .stream_messages(CollectorOptions::any().limit(2).timeout(Duration::ZERO));

    hub.emit(&Event::MessageCreate(message("7", "one")));
    let first = stream.next().await.expect("first match");
    assert_eq!(first.content, "one");

    hub.emit(&Event::MessageCreate(message("7", "two")));
    let collected = stream.finish().await;
    let contents: Vec<String> = collected.into_vec().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["one", "two"]);
}

// ============================================
// Event handlers
// ============================================

fn echo_handlers(origin: &str, tag: &'static str) -> EventHandlers {
    EventHandlers::new(origin).on(
        EventKind::MessageCreate,
        move |client: Arc<Client>, event: Event| async move {
            if let Event::MessageCreate(message) = event {
                client
                    .replier(&message.channel_id)
                    .send(format!("{tag}: {}", message.content))
                    .await?;
            }
            Ok(())
        },
    )
}

#[tokio::test]
async fn event_handlers_get_the_client_and_can_be_swapped() {
    let (client, channel, hub) = setup(ClientConfig::default());
    assert_eq!(client.add_events(echo_handlers("events/log", "v1")), 1);
    assert_eq!(hub.listener_count(EventKind::MessageCreate), 1);

    hub.emit(&Event::MessageCreate(message("7", "one")));
    wait_until(|| channel.texts().len() == 1).await;

    // Same origin again replaces the group instead of stacking a second one.
    client.add_events(echo_handlers("events/log", "v2"));
    hub.emit(&Event::MessageCreate(message("7", "two")));
    wait_until(|| channel.texts().len() == 2).await;
    assert_eq!(hub.listener_count(EventKind::MessageCreate), 1);

    assert_eq!(client.remove_events("events/log"), 1);
    hub.emit(&Event::MessageCreate(message("7", "three")));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(channel.texts(), vec!["v1: one", "v2: two"]);
}

#[tokio::test]
async fn failing_event_handler_does_not_stop_the_others() {
    let (client, channel, hub) = setup(ClientConfig::default());
    client.add_events(
        EventHandlers::new("broken")
            .on(EventKind::MessageCreate, |_, _| async { Err(anyhow::anyhow!("boom")) })
            .on(EventKind::ReactionAdd, |_, _| async { Ok(()) }),
    );
    client.add_events(echo_handlers("log", "ok"));

    hub.emit(&Event::MessageCreate(message("7", "hi")));
    wait_until(|| channel.texts().len() == 1).await;
    assert_eq!(channel.texts(), vec!["ok: hi"]);
    assert_eq!(hub.listener_count(EventKind::ReactionAdd), 1);
}

// ============================================
// Hot reload
// ============================================

/// Watch backend that only records what it was asked to watch.
#[derive(Default)]
struct RecordingSubscriber {
    watched: Arc<Mutex<Vec<PathBuf>>>,
}

impl Subscribe for RecordingSubscriber {
    fn subscribe(&self, path: &Path) -> anyhow::Result<Subscription> {
        self.watched.lock().push(path.to_path_buf());
        Ok(Subscription::new(()))
    }
}

fn write(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[tokio::test]
async fn reload_swaps_commands_and_follows_imports() {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path().canonicalize().unwrap();
    let fragment = root.join("shared/words.toml");
    let greet = root.join("greet.toml");
    write(&fragment, "[vars]\nword = \"hello\"");
    write(
        &greet,
        "label = \"greet\"\nimports = [\"./shared/words.toml\"]\nreply = \"{word}\"",
    );

    let (client, channel, _) = setup(ClientConfig::default());
    assert_eq!(client.register_directory(&root).await.unwrap(), 1);

    let subscriber = RecordingSubscriber::default();
    let watched = subscriber.watched.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    assert!(client.enable_hot_reload_with(Arc::new(subscriber), rx).await);
    assert_eq!(watched.lock().len(), 2);

    // Editing an imported fragment reloads its dependents.
    write(&fragment, "[vars]\nword = \"howdy\"");
    let outcomes = client.reload_path(&fragment).await;
    assert_eq!(outcomes, vec![ReloadOutcome::Replaced("greet".into())]);

    // Renaming the label takes effect; the old keyword is gone.
    write(&greet, "label = \"wave\"\nimports = [\"./shared/words.toml\"]\nreply = \"{word}!\"");
    assert_eq!(
        client.reload_path(&greet).await,
        vec![ReloadOutcome::Replaced("wave".into())]
    );

    // A broken edit keeps the last good version.
    write(&greet, "label = ");
    assert_eq!(
        client.reload_path(&greet).await,
        vec![ReloadOutcome::Kept("wave".into())]
    );

    client.handle_message(message("7", "!wave")).await.unwrap();
    let gone = client.handle_message(message("7", "!greet")).await.unwrap();
    assert_eq!(gone, Outcome::UnknownCommand("greet".into()));
    assert_eq!(channel.texts(), vec!["howdy!"]);

    // Deleting the file unregisters the command and drops its watches.
    std::fs::remove_file(&greet).unwrap();
    assert_eq!(
        client.reload_path(&greet).await,
        vec![ReloadOutcome::Removed("wave".into())]
    );
    assert!(client.resolve("wave").await.is_none());
    let watchers = client
        .with_reloader(|reloader| reloader.graph().watcher_count())
        .await;
    assert_eq!(watchers, Some(0));
}

#[tokio::test]
async fn unrelated_changes_reload_nothing() {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path().canonicalize().unwrap();
    write(&root.join("ping.toml"), "label = \"ping\"\nreply = \"pong\"");

    let (client, _, _) = setup(ClientConfig::default());
    client.register_directory(&root).await.unwrap();
    assert!(client.reload_path(&root.join("ping.toml")).await.is_empty());

    let (_tx, rx) = mpsc::unbounded_channel();
    client
        .enable_hot_reload_with(Arc::new(RecordingSubscriber::default()), rx)
        .await;
    assert!(client.reload_path(&root.join("other.toml")).await.is_empty());
}
