use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The engine answered, but not with a usable inspection record.
#[derive(Debug, Error)]
pub enum InspectOutputError {
    #[error("failed to parse image inspect output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image inspect returned no records")]
    Empty,
    #[error("image inspect record has no Id")]
    MissingId,
}

/// One entry of `<engine> image inspect` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInspect {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default, rename = "RepoTags", deserialize_with = "null_as_default")]
    pub repo_tags: Vec<String>,
    #[serde(default, rename = "Config", deserialize_with = "null_as_default")]
    pub config: ImageConfig,
    #[serde(default, rename = "RootFS", deserialize_with = "null_as_default")]
    pub root_fs: RootFs,
}

/// Runtime configuration of an image, as reported by the engine.
///
/// Every field is optional on the wire; engines emit `null` for unset values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default, rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, rename = "Entrypoint")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(default, rename = "WorkingDir")]
    pub working_dir: Option<String>,
    #[serde(default, rename = "User")]
    pub user: Option<String>,
    #[serde(default, rename = "Volumes")]
    pub volumes: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, rename = "OnBuild")]
    pub on_build: Option<Vec<String>>,
    #[serde(default, rename = "ExposedPorts")]
    pub exposed_ports: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(default, rename = "Type")]
    pub kind: String,
    #[serde(default, rename = "Layers", deserialize_with = "null_as_default")]
    pub layers: Vec<String>,
}

impl ImageInspect {
    pub fn layer_count(&self) -> usize {
        self.root_fs.layers.len()
    }
}

impl ImageConfig {
    /// Whether the engine would have a command to record for a container of this image.
    pub fn has_command(&self) -> bool {
        let non_empty = |v: &Option<Vec<String>>| v.as_ref().is_some_and(|v| !v.is_empty());
        non_empty(&self.cmd) || non_empty(&self.entrypoint)
    }

    /// Exposed ports, sorted. These are not carried over to the flattened image.
    pub fn exposed_port_names(&self) -> Vec<&str> {
        let mut ports: Vec<&str> = self
            .exposed_ports
            .iter()
            .flat_map(|ports| ports.keys().map(String::as_str))
            .collect();
        ports.sort_unstable();
        ports
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses the JSON array printed by `image inspect` and returns its first record.
pub fn parse_inspect_output(stdout: &str) -> Result<ImageInspect, InspectOutputError> {
    let records: Vec<ImageInspect> = serde_json::from_str(stdout)?;

    let record = records
        .into_iter()
        .next()
        .ok_or(InspectOutputError::Empty)?;

    if record.id.is_empty() {
        return Err(InspectOutputError::MissingId);
    }

    Ok(record)
}
