//! Static dependency scan of command sources.
//!
//! Only literal, relative specifiers are found. Computed imports are missed;
//! a change to such a dependency is not noticed until the dependent itself
//! changes.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, warn};

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn regex_import_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"(?m)^\s*import\s+[^;]+?\s+from\s+["']([^"']+)["']"#))
}

fn regex_side_effect_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"(?m)^\s*import\s+["']([^"']+)["']"#))
}

fn regex_export_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(r#"(?m)^\s*export\s+(?:\*(?:\s+as\s+[A-Za-z0-9_$]+)?|\{[^}]*\})\s+from\s+["']([^"']+)["']"#)
    })
}

fn regex_require() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#))
}

fn regex_dynamic_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#))
}

/// Dependency specifiers declared by `content`, in source order per form.
///
/// Manifests (`.toml`) declare them in a top-level `imports` array; anything
/// else is scanned for import, export-from and require statements.
pub fn scan_specifiers(path: &Path, content: &str) -> Result<Vec<String>> {
    if path.extension().is_some_and(|ext| ext == "toml") {
        return scan_manifest(content);
    }

    let mut found = Vec::new();
    for re in [
        regex_import_from(),
        regex_side_effect_import(),
        regex_export_from(),
        regex_require(),
        regex_dynamic_import(),
    ] {
        for caps in re.captures_iter(content) {
            let spec = caps[1].to_string();
            if !found.contains(&spec) {
                found.push(spec);
            }
        }
    }
    Ok(found)
}

fn scan_manifest(content: &str) -> Result<Vec<String>> {
    let table: toml::Table = toml::from_str(content).context("malformed manifest")?;
    let Some(imports) = table.get("imports") else {
        return Ok(Vec::new());
    };
    let Some(list) = imports.as_array() else {
        bail!("`imports` must be an array of paths");
    };
    list.iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .context("`imports` entries must be strings")
        })
        .collect()
}

/// `./x` and `../x`. Package names and absolute paths are external.
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Path of `specifier` as seen from `from`. An extensionless specifier that
/// does not exist is retried with the extension of `from`.
pub fn resolve_specifier(from: &Path, specifier: &str) -> PathBuf {
    let base = from.parent().unwrap_or(Path::new("."));
    let candidate = base.join(specifier);
    if candidate.extension().is_none()
        && !candidate.exists()
        && let Some(ext) = from.extension()
    {
        let retried = candidate.with_extension(ext);
        if retried.exists() {
            return normalize(&retried);
        }
    }
    normalize(&candidate)
}

/// Canonical form used as the key in watcher maps. Falls back to the path as
/// given when it no longer exists.
pub fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Every relative dependency of `root`, followed transitively.
///
/// Fails only when `root` itself cannot be read or scanned; problems further
/// down are logged and that branch is cut.
pub async fn dependency_closure(root: &Path) -> Result<BTreeSet<PathBuf>> {
    let root = normalize(root);
    let content = tokio::fs::read_to_string(&root)
        .await
        .with_context(|| format!("failed to read {}", root.display()))?;
    let direct = scan_specifiers(&root, &content)
        .with_context(|| format!("failed to scan {}", root.display()))?;

    let mut deps = BTreeSet::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    enqueue(&root, &root, direct, &mut deps, &mut queue);

    while let Some(file) = queue.pop_front() {
        let content = match tokio::fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %file.display(), error = %err, "dependency unreadable");
                continue;
            }
        };
        match scan_specifiers(&file, &content) {
            Ok(specs) => enqueue(&root, &file, specs, &mut deps, &mut queue),
            Err(err) => {
                warn!(path = %file.display(), error = %err, "dependency scan failed");
            }
        }
    }
    Ok(deps)
}

fn enqueue(
    root: &Path,
    from: &Path,
    specifiers: Vec<String>,
    deps: &mut BTreeSet<PathBuf>,
    queue: &mut VecDeque<PathBuf>,
) {
    for spec in specifiers.iter().filter(|s| is_relative(s)) {
        let path = resolve_specifier(from, spec);
        if path == root {
            continue;
        }
        if deps.insert(path.clone()) {
            debug!(dependent = %from.display(), dependency = %path.display(), "dependency discovered");
            queue.push_back(path);
        }
    }
}
