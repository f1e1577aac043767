use crate::document::ConfigDocument;
use crate::model::Config;
use crate::normalize::{sanity_check, sort_config};
use anyhow::Context as _;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }
}

pub fn parse(content: &str, format: Format) -> anyhow::Result<Config> {
    let doc: ConfigDocument = match format {
        Format::Yaml => serde_yaml::from_str(content)?,
        Format::Toml => toml::from_str(content)?,
    };
    doc.into_config()
}

pub fn render(cfg: &Config, format: Format) -> anyhow::Result<String> {
    let doc = ConfigDocument::from_config(cfg);
    Ok(match format {
        Format::Yaml => serde_yaml::to_string(&doc)?,
        Format::Toml => toml::to_string(&doc)?,
    })
}

/// Per-team lists replacing the ones of the primary document.
#[derive(Debug, Default, Deserialize)]
pub struct OverrideConfig {
    #[serde(default)]
    pub teams: BTreeMap<String, TeamOverride>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamOverride {
    pub members: Option<Vec<String>>,
    pub mentors: Option<Vec<String>>,
}

impl OverrideConfig {
    pub fn apply(self, cfg: &mut Config) {
        for (name, team_override) in self.teams {
            let Some(team) = cfg.teams.get_mut(&name) else {
                warn!("override references unknown team {name}, ignoring it");
                continue;
            };
            if let Some(members) = team_override.members {
                team.members = members;
            }
            if let Some(mentors) = team_override.mentors {
                team.mentors = mentors;
            }
        }
    }
}

fn read_document<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(match Format::from_path(path) {
        Format::Yaml => serde_yaml::from_str(&content)?,
        Format::Toml => toml::from_str(&content)?,
    })
}

/// Loads the local configuration, layering the override document on top of
/// it when one is given.
pub fn load_state(path: &Path, override_path: Option<&Path>) -> anyhow::Result<Config> {
    let doc: ConfigDocument =
        read_document(path).with_context(|| format!("failed to load {}", path.display()))?;
    let mut cfg = doc
        .into_config()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    if let Some(override_path) = override_path {
        debug!("applying overrides from {}", override_path.display());
        let overrides: OverrideConfig = read_document(override_path)
            .with_context(|| format!("failed to load {}", override_path.display()))?;
        overrides.apply(&mut cfg);
    }
    Ok(cfg)
}

/// Validates, canonicalizes and atomically writes the configuration.
pub fn store_state(path: &Path, cfg: &mut Config) -> anyhow::Result<()> {
    sanity_check(cfg).context("refusing to store an invalid configuration")?;
    sort_config(cfg);
    let rendered = render(cfg, Format::from_path(path))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create a temporary file in {}", dir.display()))?;
    file.write_all(rendered.as_bytes())?;
    file.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!("stored configuration in {}", path.display());
    Ok(())
}

/// Whether loading failed only because the file does not exist yet.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|err| err.kind() == std::io::ErrorKind::NotFound)
    })
}
