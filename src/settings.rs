use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{EngineMode, PageSegMode};

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub datapath: Option<String>,
    pub language: String,
    pub engine_mode: EngineMode,
    pub page_seg_mode: Option<PageSegMode>,
    pub variables: BTreeMap<String, String>,
    pub config_files: Vec<String>,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            datapath: None,
            language: "eng".to_string(),
            engine_mode: EngineMode::Default,
            page_seg_mode: None,
            variables: BTreeMap::new(),
            config_files: Vec::new(),
            debug: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    engine: Option<EngineSettings>,
    layout: Option<LayoutSettings>,
    variables: Option<BTreeMap<String, String>>,
    config: Option<ConfigSettings>,
    log: Option<LogSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct EngineSettings {
    datapath: Option<String>,
    language: Option<String>,
    mode: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    page_seg_mode: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigSettings {
    files: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LogSettings {
    debug: Option<bool>,
}

/// Merges `tess-bridge.toml`, `tess-bridge.local.toml` (working directory) and
/// `extra_path`, later files overriding earlier ones.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("tess-bridge.toml"),
        PathBuf::from("tess-bridge.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }
    load_settings_from(&ordered_paths)
}

pub(crate) fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed = parse_settings(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        settings.merge(parsed)?;
    }
    Ok(settings)
}

fn parse_settings(content: &str) -> Result<SettingsFile> {
    Ok(toml::from_str(content)?)
}

/// Writes the bundled defaults to `path` unless a file is already there.
/// Returns whether a file was written.
pub fn write_default_settings(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory: {}", parent.display())
            })?;
        }
    }
    fs::write(path, DEFAULT_SETTINGS_TOML)
        .with_context(|| format!("failed to write settings: {}", path.display()))?;
    Ok(true)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(engine) = incoming.engine {
            if let Some(datapath) = engine.datapath {
                let datapath = datapath.trim();
                self.datapath = (!datapath.is_empty()).then(|| datapath.to_string());
            }
            if let Some(language) = engine.language {
                if !language.trim().is_empty() {
                    self.language = language.trim().to_string();
                }
            }
            if let Some(mode) = engine.mode {
                self.engine_mode = EngineMode::try_from(mode)
                    .map_err(|value| anyhow!("invalid engine mode: {value}"))?;
            }
        }
        if let Some(layout) = incoming.layout {
            if let Some(mode) = layout.page_seg_mode {
                let mode = PageSegMode::try_from(mode)
                    .map_err(|value| anyhow!("invalid page segmentation mode: {value}"))?;
                self.page_seg_mode = Some(mode);
            }
        }
        if let Some(variables) = incoming.variables {
            for (name, value) in variables {
                self.variables.insert(name, value);
            }
        }
        if let Some(config) = incoming.config {
            if let Some(files) = config.files {
                self.config_files = files
                    .into_iter()
                    .filter(|file| !file.trim().is_empty())
                    .collect();
            }
        }
        if let Some(log) = incoming.log {
            if let Some(debug) = log.debug {
                self.debug = debug;
            }
        }
        Ok(())
    }
}
