//! Translation of image configuration into `import --change` directives.
//!
//! [`translate`] is pure: it maps an [`ImageConfig`] to an ordered list of
//! Dockerfile-style [`ChangeDirective`]s that re-create the runtime configuration
//! on an imported filesystem. List and string values are JSON-encoded so that the
//! engine's change parser sees argument boundaries, spaces and quotes unambiguously.
//!
//! Emission order is fixed: `CMD`, `ENTRYPOINT`, `WORKDIR`, one `ENV` per
//! environment entry (input order), `USER`.

use crate::inspect::ImageConfig;
use std::fmt;

/// A single `KEY VALUE` instruction applied while importing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDirective {
    Cmd(Vec<String>),
    Entrypoint(Vec<String>),
    Workdir(String),
    Env { name: String, value: String },
    User(String),
}

impl ChangeDirective {
    pub fn instruction(&self) -> &'static str {
        match self {
            ChangeDirective::Cmd(_) => "CMD",
            ChangeDirective::Entrypoint(_) => "ENTRYPOINT",
            ChangeDirective::Workdir(_) => "WORKDIR",
            ChangeDirective::Env { .. } => "ENV",
            ChangeDirective::User(_) => "USER",
        }
    }

    /// Builds an `ENV` directive from a `KEY=VALUE` entry, splitting on the first `=` only.
    pub fn env_from_entry(entry: &str) -> Self {
        let (name, value) = entry.split_once('=').unwrap_or((entry, ""));
        ChangeDirective::Env {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ChangeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeDirective::Cmd(args) | ChangeDirective::Entrypoint(args) => {
                write!(f, "{} {}", self.instruction(), json(args)?)
            }
            ChangeDirective::Workdir(path) => write!(f, "WORKDIR {}", json(path)?),
            ChangeDirective::Env { name, value } => write!(f, "ENV {}={}", name, json(value)?),
            // Passed through raw: a user spec is a single token.
            ChangeDirective::User(user) => write!(f, "USER {}", user),
        }
    }
}

fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, fmt::Error> {
    serde_json::to_string(value).map_err(|_| fmt::Error)
}

/// The image uses configuration that cannot be expressed as an import change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported fields encountered: {}", fields.join(", "))]
pub struct UnsupportedFields {
    pub fields: Vec<&'static str>,
}

/// Maps an image configuration to the ordered change directives that reproduce it.
///
/// Fails without producing any directive when `Volumes` or `OnBuild` is set.
pub fn translate(config: &ImageConfig) -> Result<Vec<ChangeDirective>, UnsupportedFields> {
    let mut unsupported = Vec::new();
    if config.volumes.as_ref().is_some_and(|v| !v.is_empty()) {
        unsupported.push("Volumes");
    }
    if config.on_build.as_ref().is_some_and(|v| !v.is_empty()) {
        unsupported.push("OnBuild");
    }
    if !unsupported.is_empty() {
        return Err(UnsupportedFields {
            fields: unsupported,
        });
    }

    let non_empty_list = |v: &Option<Vec<String>>| v.clone().filter(|v| !v.is_empty());
    let non_empty_str = |v: &Option<String>| v.clone().filter(|v| !v.is_empty());

    let directives = non_empty_list(&config.cmd)
        .map(ChangeDirective::Cmd)
        .into_iter()
        .chain(non_empty_list(&config.entrypoint).map(ChangeDirective::Entrypoint))
        .chain(non_empty_str(&config.working_dir).map(ChangeDirective::Workdir))
        .chain(
            config
                .env
                .iter()
                .flatten()
                .map(|entry| ChangeDirective::env_from_entry(entry)),
        )
        .chain(non_empty_str(&config.user).map(ChangeDirective::User))
        .collect();

    Ok(directives)
}

/// Argument list for the import call: `--change <directive>` per directive.
pub fn import_flags(directives: &[ChangeDirective]) -> Vec<String> {
    directives
        .iter()
        .flat_map(|d| ["--change".to_string(), d.to_string()])
        .collect()
}

/// One-line, shell-quoted rendering of the import flags, for logs.
pub fn describe(directives: &[ChangeDirective]) -> String {
    shell_words::join(import_flags(directives))
}
