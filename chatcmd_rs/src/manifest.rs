//! TOML command manifests.
//!
//! A manifest describes one command tree. Behaviour comes either from a
//! `reply` template or from a `handler` name registered with the
//! [`ManifestLoader`], so a manifest can be reloaded without recompiling.
//!
//! ```toml
//! label = "greet"
//! aliases = ["hi"]
//! imports = ["./shared/greetings.toml"]
//! reply = "{greeting}, {who}!"
//!
//! [[arguments]]
//! type = "string"
//! name = "who"
//! ```
//!
//! A file without `label` is a fragment: it only exists to be imported and
//! contributes its `vars`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::args::ArgumentSpec;
use crate::command::{Command, CommandTree, Handler, Invocation, Requirement};
use crate::error::ConfigError;
use crate::reload::scan::{is_relative, normalize, resolve_specifier};
use crate::types::{Message, Reply};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Manifest {
    label: Option<String>,
    aliases: Vec<String>,
    description: Option<String>,
    category: Option<String>,
    owner_only: bool,
    guild_only: bool,
    permissions: Vec<String>,
    requirement: Option<String>,
    usages: Vec<String>,
    handler: Option<String>,
    reply: Option<String>,
    arguments: Vec<ArgumentSpec>,
    subcommands: Vec<Manifest>,
    vars: BTreeMap<String, String>,
    /// Top level only
    imports: Vec<String>,
}

/// Turns manifests into command trees, resolving handler and requirement
/// names against what the host registered.
#[derive(Clone, Default)]
pub struct ManifestLoader {
    handlers: HashMap<String, Handler>,
    requirements: HashMap<String, Requirement>,
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handler = "<name>"` run `handler`.
    pub fn handler<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        self.handlers.insert(name.into(), Handler::run(handler));
        self
    }

    /// Make `requirement = "<name>"` check `requirement`.
    pub fn requirement<F>(&mut self, name: impl Into<String>, requirement: F) -> &mut Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.requirements.insert(name.into(), Arc::new(requirement));
        self
    }

    /// Load the manifest at `path`. Fragments yield `Ok(None)`.
    pub async fn load(&self, path: &Path) -> Result<Option<CommandTree>, ConfigError> {
        let path = normalize(path);
        let manifest = read_manifest(&path).await?;
        if manifest.label.is_none() {
            return Ok(None);
        }

        let mut vars = BTreeMap::new();
        let mut visited = HashSet::from([path.clone()]);
        collect_vars(&path, &manifest.imports, &mut visited, &mut vars).await?;

        let command = self.command(&path, manifest, &vars)?;
        Ok(Some(command.build()?.with_source(path)))
    }

    /// Whether `path` holds a labelled manifest.
    pub async fn is_command(path: &Path) -> bool {
        read_manifest(path)
            .await
            .is_ok_and(|manifest| manifest.label.is_some())
    }

    fn command(
        &self,
        path: &Path,
        manifest: Manifest,
        inherited: &BTreeMap<String, String>,
    ) -> Result<Command, ConfigError> {
        let Manifest {
            label,
            aliases,
            description,
            category,
            owner_only,
            guild_only,
            permissions,
            requirement,
            usages,
            handler,
            reply,
            arguments,
            subcommands,
            vars: own_vars,
            imports: _,
        } = manifest;

        let label = label.ok_or_else(|| invalid(path, "subcommand without a label"))?;
        let mut vars = inherited.clone();
        vars.extend(own_vars);

        let mut command = Command::new(label.clone());
        {
            let spec = command.spec_mut();
            spec.aliases = aliases;
            spec.description = description;
            spec.category = category;
            spec.guards.owner_only = owner_only;
            spec.guards.guild_only = guild_only;
            spec.guards.permissions = permissions;
            spec.arguments = arguments;
            spec.usages = usages;
        }

        if let Some(name) = requirement {
            let predicate = self.requirements.get(&name).cloned().ok_or_else(|| {
                ConfigError::UnknownRequirement {
                    label: label.clone(),
                    requirement: name,
                }
            })?;
            command.spec_mut().guards.requirement = Some(predicate);
        }

        match (handler, reply) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    path,
                    &format!("\"{label}\" declares both a handler and a reply"),
                ));
            }
            (Some(name), None) => {
                let handler = self
                    .handlers
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownHandler {
                        label: label.clone(),
                        handler: name,
                    })?;
                command.set_handler(handler);
            }
            (None, Some(template)) => command.set_handler(Handler::Template {
                template,
                vars: vars.clone(),
            }),
            // reported by `Command::build`
            (None, None) => {}
        }

        for sub in subcommands {
            command = command.subcommand(self.command(path, sub, &vars)?);
        }
        Ok(command)
    }
}

fn invalid(path: &Path, reason: &str) -> ConfigError {
    ConfigError::Manifest {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

async fn read_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| invalid(path, &err.to_string()))?;
    toml::from_str(&content).map_err(|err| invalid(path, &err.to_string()))
}

/// Vars of every fragment imported from `from`, depth first in import order.
/// Later fragments override earlier ones.
fn collect_vars<'a>(
    from: &'a Path,
    imports: &'a [String],
    visited: &'a mut HashSet<PathBuf>,
    vars: &'a mut BTreeMap<String, String>,
) -> BoxFuture<'a, Result<(), ConfigError>> {
    Box::pin(async move {
        for specifier in imports.iter().filter(|s| is_relative(s)) {
            let path = resolve_specifier(from, specifier);
            if !visited.insert(path.clone()) {
                continue;
            }
            let fragment = read_manifest(&path).await?;
            collect_vars(&path, &fragment.imports, visited, vars).await?;
            vars.extend(fragment.vars);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    fn template(tree: &CommandTree) -> (&str, &BTreeMap<String, String>) {
        match &tree.root().handler {
            Handler::Template { template, vars } => (template.as_str(), vars),
            Handler::Run(_) => panic!("expected a template"),
        }
    }

    #[tokio::test]
    async fn loads_a_full_manifest() {
        let temp = TempDir::new().expect("temp dir");
        let path = write(
            temp.path(),
            "remind.toml",
            r#"
label = "remind"
aliases = ["rm"]
description = "Set a reminder"
category = "util"
guild_only = true
permissions = ["SEND_MESSAGES"]
reply = "in {when}: {args}"

[[arguments]]
type = "time"
name = "when"

[[arguments]]
type = "string"
name = "tags"
optional = true
accept_multiple = true
limit = 2
"#,
        );

        let tree = ManifestLoader::new().load(&path).await.unwrap().unwrap();
        let spec = &tree.root().spec;
        assert_eq!(spec.label, "remind");
        assert!(spec.handles("RM"));
        assert!(spec.guards.guild_only);
        assert_eq!(spec.arguments.len(), 2);
        assert_eq!(spec.arguments[1].limit, 2);
        assert_eq!(spec.arguments[1].delimiter, ";");
        assert_eq!(template(&tree).0, "in {when}: {args}");
        assert_eq!(tree.source(), Some(normalize(&path).as_path()));
    }

    #[tokio::test]
    async fn imported_vars_merge_in_order_and_own_vars_win() {
        let temp = TempDir::new().expect("temp dir");
        write(
            temp.path(),
            "shared/base.toml",
            "[vars]\ngreeting = \"hello\"\nmark = \"!\"",
        );
        write(
            temp.path(),
            "shared/loud.toml",
            "imports = [\"./base.toml\"]\n[vars]\ngreeting = \"HELLO\"",
        );
        let path = write(
            temp.path(),
            "greet.toml",
            "label = \"greet\"\nimports = [\"./shared/loud.toml\", \"some-package\"]\nreply = \"{greeting}{mark}\"\n[vars]\nmark = \"?\"",
        );

        let tree = ManifestLoader::new().load(&path).await.unwrap().unwrap();
        let (_, vars) = template(&tree);
        assert_eq!(vars.get("greeting").map(String::as_str), Some("HELLO"));
        assert_eq!(vars.get("mark").map(String::as_str), Some("?"));
    }

    #[tokio::test]
    async fn fragment_is_not_a_command() {
        let temp = TempDir::new().expect("temp dir");
        let path = write(temp.path(), "frag.toml", "[vars]\na = \"b\"");
        assert!(ManifestLoader::new().load(&path).await.unwrap().is_none());
        assert!(!ManifestLoader::is_command(&path).await);
    }

    #[tokio::test]
    async fn named_handler_and_requirement_resolve() {
        let temp = TempDir::new().expect("temp dir");
        let path = write(
            temp.path(),
            "ping.toml",
            "label = \"ping\"\nhandler = \"ping\"\nrequirement = \"never\"\n[[subcommands]]\nlabel = \"loud\"\nreply = \"PONG\"",
        );
        let mut loader = ManifestLoader::new();
        loader
            .handler("ping", |_| async { Ok(Some(Reply::from("pong"))) })
            .requirement("never", |_| false);

        let tree = loader.load(&path).await.unwrap().unwrap();
        assert!(matches!(tree.root().handler, Handler::Run(_)));
        assert!(tree.root().spec.guards.requirement.is_some());
        assert!(tree.find_child(CommandTree::ROOT, "LOUD").is_some());
    }

    #[tokio::test]
    async fn unknown_names_are_configuration_faults() {
        let temp = TempDir::new().expect("temp dir");
        let handler = write(temp.path(), "a.toml", "label = \"a\"\nhandler = \"nope\"");
        let requirement = write(
            temp.path(),
            "b.toml",
            "label = \"b\"\nreply = \"x\"\nrequirement = \"nope\"",
        );
        let loader = ManifestLoader::new();

        assert!(matches!(
            loader.load(&handler).await.unwrap_err(),
            ConfigError::UnknownHandler { .. }
        ));
        assert!(matches!(
            loader.load(&requirement).await.unwrap_err(),
            ConfigError::UnknownRequirement { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_manifests_are_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let loader = ManifestLoader::new();
        let cases = [
            ("typo.toml", "label = \"x\"\nreply = \"y\"\nalias = [\"z\"]"),
            ("both.toml", "label = \"x\"\nreply = \"y\"\nhandler = \"h\""),
            ("sub.toml", "label = \"x\"\nreply = \"y\"\n[[subcommands]]\nreply = \"z\""),
            ("broken.toml", "label = "),
        ];
        for (name, body) in cases {
            let path = write(temp.path(), name, body);
            assert!(
                matches!(loader.load(&path).await, Err(ConfigError::Manifest { .. })),
                "{name} should be rejected"
            );
        }

        let empty = write(temp.path(), "empty.toml", "label = \"x\"");
        assert!(matches!(
            loader.load(&empty).await.unwrap_err(),
            ConfigError::MissingHandler(_)
        ));
    }
}
