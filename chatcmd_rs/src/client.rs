//! The root context object.
//!
//! A [`Client`] owns the command registry, the parser registry, the collector
//! manager, the hooks and the hot reloader. Everything that needs shared state
//! gets it through an `Arc<Client>`; there is no global registry.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::Context;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::args::{ArgParser, ParserRegistry};
use crate::builtin;
use crate::collector::CollectorManager;
use crate::command::{
    Command, CommandRegistry, CommandTree, Invocation, Replier, ResponseFormatter, eq_ignore_case,
};
use crate::config::{ClientConfig, expand_mentions};
use crate::dispatch::{self, FailureContext, FailureHandler, Outcome, default_failure_reply};
use crate::error::ConfigError;
use crate::events::{EventHandlers, EventSource, HandlerTable};
use crate::manifest::ManifestLoader;
use crate::reload::{HotReloader, NotifySubscriber, Subscribe};
use crate::types::{Directory, Event, EventKind, MemoryDirectory, Message, Reply, ReplyChannel};

/// Formats a command description for help output; gets the guild id, if any.
pub type DescriptionFormatter = Arc<dyn Fn(&str, Option<&str>) -> String + Send + Sync>;

/// Chooses the prefixes for one message instead of the configured list.
pub type PrefixResolver = Arc<dyn Fn(&Message) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
struct Hooks {
    failure: FailureHandler,
    response: ResponseFormatter,
    description: DescriptionFormatter,
    prefix: Option<PrefixResolver>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            failure: Arc::new(default_failure_reply),
            response: Arc::new(|reply: Reply| reply),
            description: Arc::new(|description: &str, _: Option<&str>| description.to_string()),
            prefix: None,
        }
    }
}

/// Result of reloading one command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Replaced(String),
    /// The file is gone; its command was unregistered
    Removed(String),
    /// The new version was rejected; the old command stays registered
    Kept(String),
}

pub struct ClientBuilder {
    config: ClientConfig,
    parsers: ParserRegistry,
    channel: Arc<dyn ReplyChannel>,
    source: Arc<dyn EventSource>,
    directory: Arc<dyn Directory>,
    hooks: Hooks,
    manifests: ManifestLoader,
}

impl ClientBuilder {
    /// Lookups used by the default parsers. Defaults to an empty
    /// [`MemoryDirectory`].
    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    /// Add a parser, or replace a default one.
    pub fn parser(mut self, tag: impl Into<String>, parser: ArgParser) -> Self {
        self.parsers.insert(tag, parser);
        self
    }

    pub fn on_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FailureContext) -> Option<Reply> + Send + Sync + 'static,
    {
        self.hooks.failure = Arc::new(handler);
        self
    }

    pub fn format_response<F>(mut self, formatter: F) -> Self
    where
        F: Fn(Reply) -> Reply + Send + Sync + 'static,
    {
        self.hooks.response = Arc::new(formatter);
        self
    }

    pub fn format_description<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> String + Send + Sync + 'static,
    {
        self.hooks.description = Arc::new(formatter);
        self
    }

    pub fn resolve_prefix<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
    {
        self.hooks.prefix = Some(Arc::new(resolver));
        self
    }

    /// Handler available to manifests as `handler = "<name>"`.
    pub fn manifest_handler<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        self.manifests.handler(name, handler);
        self
    }

    /// Predicate available to manifests as `requirement = "<name>"`.
    pub fn manifest_requirement<F>(mut self, name: impl Into<String>, requirement: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.manifests.requirement(name, requirement);
        self
    }

    pub fn build(self) -> Result<Arc<Client>, ConfigError> {
        let mut registry = CommandRegistry::new();
        if self.config.default_commands {
            for command in [builtin::help(), builtin::sudo()] {
                let tree = command.build()?;
                tree.validate(&self.parsers)?;
                registry.register(tree)?;
            }
        }

        Ok(Arc::new(Client {
            collectors: CollectorManager::new(self.source.clone()),
            config: self.config,
            parsers: self.parsers,
            registry: RwLock::new(registry),
            source: self.source,
            channel: self.channel,
            directory: self.directory,
            hooks: self.hooks,
            manifests: self.manifests,
            reloader: Mutex::new(None),
            events: HandlerTable::default(),
        }))
    }
}

pub struct Client {
    config: ClientConfig,
    parsers: ParserRegistry,
    registry: RwLock<CommandRegistry>,
    collectors: CollectorManager,
    source: Arc<dyn EventSource>,
    channel: Arc<dyn ReplyChannel>,
    directory: Arc<dyn Directory>,
    hooks: Hooks,
    manifests: ManifestLoader,
    reloader: Mutex<Option<HotReloader>>,
    events: HandlerTable,
}

impl Client {
    pub fn builder(
        config: ClientConfig,
        channel: Arc<dyn ReplyChannel>,
        source: Arc<dyn EventSource>,
    ) -> ClientBuilder {
        ClientBuilder {
            config,
            parsers: ParserRegistry::with_defaults(),
            channel,
            source,
            directory: Arc::new(MemoryDirectory::new()),
            hooks: Hooks::default(),
            manifests: ManifestLoader::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    pub fn collectors(&self) -> &CollectorManager {
        &self.collectors
    }

    pub fn directory(&self) -> Arc<dyn Directory> {
        self.directory.clone()
    }

    pub fn channel(&self) -> &Arc<dyn ReplyChannel> {
        &self.channel
    }

    /// Prefixes accepted for `message`, with `@mention` expanded.
    pub fn prefixes_for(&self, message: &Message) -> Vec<String> {
        let prefixes = match &self.hooks.prefix {
            Some(resolve) => resolve(message),
            None => self.config.prefixes.clone(),
        };
        expand_mentions(&prefixes, &self.config.bot_id)
    }

    pub fn failure_reply(&self, ctx: &FailureContext) -> Option<Reply> {
        (self.hooks.failure)(ctx)
    }

    pub fn format_description(&self, description: &str, guild_id: Option<&str>) -> String {
        (self.hooks.description)(description, guild_id)
    }

    /// Reply callback for `channel_id` that applies the response formatter.
    pub fn replier(&self, channel_id: &str) -> Replier {
        Replier::new(
            self.channel.clone(),
            channel_id.to_string(),
            self.hooks.response.clone(),
        )
    }

    /// Validate `tree` against the parser registry and add it as a root.
    ///
    /// In development mode a tree loaded from a file is also put under watch.
    pub async fn register(self: &Arc<Self>, tree: CommandTree) -> Result<Arc<CommandTree>, ConfigError> {
        tree.validate(&self.parsers)?;
        let tree = self.registry.write().await.register(tree)?;
        info!(label = tree.label(), "command registered");

        if self.config.development
            && let Some(source) = tree.source()
        {
            // Turning hot reload on tracks every registered file, this one included.
            if !self.enable_hot_reload().await
                && let Some(reloader) = self.reloader.lock().await.as_mut()
            {
                reloader.track(source, tree.label()).await;
            }
        }
        Ok(tree)
    }

    pub async fn register_command(
        self: &Arc<Self>,
        command: Command,
    ) -> Result<Arc<CommandTree>, ConfigError> {
        self.register(command.build()?).await
    }

    /// Register every command manifest under `dir`. Fragments are skipped.
    pub async fn register_directory(self: &Arc<Self>, dir: &Path) -> anyhow::Result<usize> {
        let mut manifests = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                manifests.push(path.to_path_buf());
            }
        }

        let mut count = 0;
        for path in manifests {
            let loaded = self
                .manifests
                .load(&path)
                .await
                .with_context(|| format!("failed to load command {}", path.display()))?;
            let Some(tree) = loaded else {
                debug!(path = %path.display(), "skipping fragment");
                continue;
            };
            self.register(tree)
                .await
                .with_context(|| format!("failed to register command {}", path.display()))?;
            count += 1;
        }
        info!(count, dir = %dir.display(), "commands registered from directory");
        Ok(count)
    }

    /// Remove every root labelled `label`, and stop watching its file.
    pub async fn unregister(&self, label: &str) -> usize {
        let sources: Vec<PathBuf> = self
            .registry
            .read()
            .await
            .commands()
            .iter()
            .filter(|root| eq_ignore_case(root.label(), label))
            .filter_map(|root| root.source().map(Path::to_path_buf))
            .collect();
        let removed = self.registry.write().await.unregister(label);

        if let Some(reloader) = self.reloader.lock().await.as_mut() {
            for source in &sources {
                reloader.forget(source);
            }
        }
        removed
    }

    pub async fn resolve(&self, token: &str) -> Option<Arc<CommandTree>> {
        self.registry.read().await.resolve(token)
    }

    /// Roots in registration order.
    pub async fn commands(&self) -> Vec<Arc<CommandTree>> {
        self.registry.read().await.commands().to_vec()
    }

    pub async fn handle_message(self: &Arc<Self>, message: Message) -> anyhow::Result<Outcome> {
        dispatch::handle_message(self, message).await
    }

    /// Dispatch every new message from the event source.
    ///
    /// Must be called from within a tokio runtime; each message is handled on
    /// its own task.
    pub fn attach(self: &Arc<Self>) {
        let client: Weak<Client> = Arc::downgrade(self);
        let runtime = tokio::runtime::Handle::current();
        self.source.listen(
            EventKind::MessageCreate,
            Arc::new(move |event: &Event| {
                let Event::MessageCreate(message) = event else {
                    return;
                };
                let Some(client) = client.upgrade() else {
                    return;
                };
                let message = message.clone();
                runtime.spawn(async move {
                    if let Err(err) = client.handle_message(message).await {
                        error!(error = %format!("{err:#}"), "dispatch failed");
                    }
                });
            }),
        );
        debug!("dispatcher attached to event source");
    }

    /// Run `handlers` for matching events from the event source, each call on
    /// its own task. A group with an origin already registered replaces it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_events(self: &Arc<Self>, handlers: EventHandlers) -> usize {
        let origin = handlers.origin().to_string();
        let count = handlers.len();
        let (replaced, fresh) = self.events.replace(handlers);
        for kind in fresh {
            self.listen_for_handlers(kind);
        }
        info!(origin = %origin, count, replaced, "event handlers registered");
        count
    }

    /// Drop every handler registered under `origin`.
    pub fn remove_events(&self, origin: &str) -> usize {
        let removed = self.events.remove(origin);
        debug!(origin, removed, "event handlers removed");
        removed
    }

    fn listen_for_handlers(self: &Arc<Self>, kind: EventKind) {
        let client: Weak<Client> = Arc::downgrade(self);
        let runtime = tokio::runtime::Handle::current();
        self.source.listen(
            kind,
            Arc::new(move |event: &Event| {
                let Some(client) = client.upgrade() else {
                    return;
                };
                for handler in client.events.handlers_for(kind) {
                    let client = client.clone();
                    let event = event.clone();
                    runtime.spawn(async move {
                        if let Err(err) = handler(client, event).await {
                            error!(event = kind.name(), error = %format!("{err:#}"), "event handler failed");
                        }
                    });
                }
            }),
        );
        debug!(event = kind.name(), "event handlers attached to event source");
    }

    /// Watch registered command files with `notify`. Returns `false` when hot
    /// reload was already on.
    pub async fn enable_hot_reload(self: &Arc<Self>) -> bool {
        let (tx, rx) = mpsc::unbounded_channel();
        self.enable_hot_reload_with(Arc::new(NotifySubscriber::new(tx)), rx)
            .await
    }

    /// Hot reload with a custom watch backend. `changes` carries the paths
    /// the backend saw change.
    pub async fn enable_hot_reload_with(
        self: &Arc<Self>,
        subscriber: Arc<dyn Subscribe>,
        changes: mpsc::UnboundedReceiver<PathBuf>,
    ) -> bool {
        let mut slot = self.reloader.lock().await;
        if slot.is_some() {
            return false;
        }

        let mut reloader = HotReloader::new(subscriber);
        let sources: Vec<(PathBuf, String)> = self
            .registry
            .read()
            .await
            .commands()
            .iter()
            .filter_map(|root| {
                root.source()
                    .map(|source| (source.to_path_buf(), root.label().to_string()))
            })
            .collect();
        for (source, label) in sources {
            reloader.track(&source, &label).await;
        }
        *slot = Some(reloader);
        drop(slot);

        tokio::spawn(run_reload_queue(Arc::downgrade(self), changes));
        info!("hot reload enabled");
        true
    }

    /// Apply one file change: reload the command file itself, or every
    /// command depending on it.
    pub async fn reload_path(&self, changed: &Path) -> Vec<ReloadOutcome> {
        let mut slot = self.reloader.lock().await;
        let Some(reloader) = slot.as_mut() else {
            return Vec::new();
        };

        let mut outcomes = Vec::new();
        for source in reloader.affected(changed) {
            if let Some(outcome) = self.reload_source(reloader, &source).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Run `f` against the hot reloader, if enabled.
    pub async fn with_reloader<R>(&self, f: impl FnOnce(&HotReloader) -> R) -> Option<R> {
        self.reloader.lock().await.as_ref().map(f)
    }

    async fn reload_source(
        &self,
        reloader: &mut HotReloader,
        source: &Path,
    ) -> Option<ReloadOutcome> {
        let old_label = reloader.label_of(source)?.to_string();
        info!(path = %source.display(), label = %old_label, "reloading command file");

        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            self.registry.write().await.unregister(&old_label);
            reloader.forget(source);
            info!(label = %old_label, "command file removed, command unregistered");
            return Some(ReloadOutcome::Removed(old_label));
        }

        let tree = match self.manifests.load(source).await {
            Ok(Some(tree)) => tree,
            Ok(None) => {
                warn!(path = %source.display(), "file no longer declares a command, keeping the old one");
                return Some(ReloadOutcome::Kept(old_label));
            }
            Err(err) => {
                error!(path = %source.display(), error = %err, "reload failed, keeping the old command");
                return Some(ReloadOutcome::Kept(old_label));
            }
        };
        if let Err(err) = tree.validate(&self.parsers) {
            error!(path = %source.display(), error = %err, "reload failed, keeping the old command");
            return Some(ReloadOutcome::Kept(old_label));
        }

        let replaced = self.registry.write().await.replace(&old_label, tree);
        match replaced {
            Ok(tree) => {
                reloader.track(source, tree.label()).await;
                info!(label = tree.label(), "command reloaded");
                Some(ReloadOutcome::Replaced(tree.label().to_string()))
            }
            Err(err) => {
                error!(path = %source.display(), error = %err, "reload failed, keeping the old command");
                Some(ReloadOutcome::Kept(old_label))
            }
        }
    }
}

async fn run_reload_queue(client: Weak<Client>, mut changes: mpsc::UnboundedReceiver<PathBuf>) {
    while let Some(path) = changes.recv().await {
        let Some(client) = client.upgrade() else {
            break;
        };
        debug!(path = %path.display(), "file changed");
        client.reload_path(&path).await;
    }
    debug!("reload queue stopped");
}
