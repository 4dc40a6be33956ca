//! Resolution pipeline: reads scenario files, resolves names, builds a basin.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers, plus the two entry points: [`load_scenario`] for
//! a single scenario file and [`load_scenario_dir`] for a directory holding
//! one file per section.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use floodplain_core::basin::Basin;
use floodplain_core::config::{BasinConfig, SegmentParams};
use floodplain_core::error::{ConfigError, StructuralError};
use floodplain_core::fixed::f64_to_fixed64;
use floodplain_core::id::{NodeId, StewardId};
use floodplain_policy::{Policy, RulesError};
use tracing::{debug, info};

use crate::schema::{
    FlowData, NetworkData, RunData, ScenarioData, SegmentData, SourceData, StewardData,
};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A configuration or segment parameter is out of range.
    #[error("invalid parameter in {file}: {source}")]
    Config { file: PathBuf, source: ConfigError },

    /// The flow network is not a forest of single-outflow chains.
    #[error("invalid flow network in {file}: {source}")]
    Structure {
        file: PathBuf,
        source: StructuralError,
    },

    /// The policy rules are unusable.
    #[error("invalid policy in {file}: {source}")]
    Rules { file: PathBuf, source: RulesError },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .get(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
                .clone();
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Basin construction
// ===========================================================================

/// A loaded scenario, ready to run.
#[derive(Debug)]
pub struct Scenario {
    pub basin: Basin,
    pub policy: Policy,
    pub run: RunData,
}

/// Build a basin from a network description.
///
/// Stewards are added first, then sources and segments (whose names share
/// one namespace), then flow edges, then ownership. `file` is only used in
/// error messages.
pub fn build_basin(
    network: &NetworkData,
    config: BasinConfig,
    file: &Path,
) -> Result<Basin, DataLoadError> {
    let config_error = |source: ConfigError| DataLoadError::Config {
        file: file.to_path_buf(),
        source,
    };
    let structure_error = |source: StructuralError| DataLoadError::Structure {
        file: file.to_path_buf(),
        source,
    };

    let defaults = config.clone();
    let mut basin = Basin::new(config).map_err(config_error)?;

    let mut stewards: HashMap<String, StewardId> = HashMap::new();
    for StewardData { name, balance } in &network.stewards {
        check_duplicate(&stewards, name, file)?;
        stewards.insert(name.clone(), basin.add_steward(name.clone(), *balance));
    }

    let mut nodes: HashMap<String, NodeId> = HashMap::new();
    for SourceData { name, mean, stddev } in &network.sources {
        check_duplicate(&nodes, name, file)?;
        let node = basin
            .add_source(name.clone(), *mean, *stddev)
            .map_err(config_error)?;
        nodes.insert(name.clone(), node);
    }
    for data in &network.segments {
        check_duplicate(&nodes, &data.name, file)?;
        let node = basin
            .add_segment(data.name.clone(), segment_params(&defaults, data))
            .map_err(config_error)?;
        nodes.insert(data.name.clone(), node);
    }

    for flow in &network.flows {
        let (from, to) = flow.endpoints();
        let from = *resolve_name(&nodes, from, file, "node")?;
        let to = *resolve_name(&nodes, to, file, "node")?;
        basin.connect(from, to).map_err(structure_error)?;
    }

    for data in &network.segments {
        let Some(owner) = &data.owner else {
            continue;
        };
        let steward = *resolve_name(&stewards, owner, file, "steward")?;
        let node = *resolve_name(&nodes, &data.name, file, "segment")?;
        basin.assign_owner(node, steward).map_err(structure_error)?;
    }

    info!(
        file = %file.display(),
        stewards = stewards.len(),
        sources = network.sources.len(),
        segments = network.segments.len(),
        flows = network.flows.len(),
        "basin built"
    );
    Ok(basin)
}

fn segment_params(defaults: &BasinConfig, data: &SegmentData) -> SegmentParams {
    let mut params = defaults.segment_params(data.length_km, data.dike_capacity);
    if let Some(max) = data.max_dike_capacity {
        params.max_dike_capacity = max;
    }
    if let Some(min) = data.min_discharge {
        params.min_discharge = min;
    }
    if let Some(factor) = data.safety_factor {
        params.safety_factor = f64_to_fixed64(factor);
    }
    params.retainable = data.retainable;
    params.natural_dike = data.natural_dike;
    params
}

fn finish(
    network: &NetworkData,
    config: BasinConfig,
    policy: Policy,
    run: RunData,
    file: &Path,
) -> Result<Scenario, DataLoadError> {
    policy.validate().map_err(|source| DataLoadError::Rules {
        file: file.to_path_buf(),
        source,
    })?;
    let basin = build_basin(network, config, file)?;
    Ok(Scenario { basin, policy, run })
}

// ===========================================================================
// Entry points
// ===========================================================================

/// Load a complete scenario from one file.
pub fn load_scenario(path: &Path) -> Result<Scenario, DataLoadError> {
    let data: ScenarioData = deserialize_file(path)?;
    debug!(file = %path.display(), "scenario file parsed");
    finish(&data.network, data.config, data.policy, data.run, path)
}

/// Load a scenario split across files in `dir`.
///
/// `segments` is required. `stewards`, `sources` and `flows` are optional
/// lists; `config`, `policy` and `run` are optional single values that fall
/// back to their defaults.
pub fn load_scenario_dir(dir: &Path) -> Result<Scenario, DataLoadError> {
    let segments_path = require_data_file(dir, "segments")?;
    let network = NetworkData {
        segments: deserialize_list::<SegmentData>(&segments_path, "segments")?,
        stewards: optional_list::<StewardData>(dir, "stewards")?,
        sources: optional_list::<SourceData>(dir, "sources")?,
        flows: optional_list::<FlowData>(dir, "flows")?,
    };
    let config: BasinConfig = optional_value(dir, "config")?;
    let policy: Policy = optional_value(dir, "policy")?;
    let run: RunData = optional_value(dir, "run")?;
    debug!(dir = %dir.display(), "scenario directory parsed");
    finish(&network, config, policy, run, dir)
}

fn optional_list<T: DeserializeOwned>(
    dir: &Path,
    base_name: &str,
) -> Result<Vec<T>, DataLoadError> {
    match find_data_file(dir, base_name)? {
        Some(path) => deserialize_list(&path, base_name),
        None => Ok(Vec::new()),
    }
}

fn optional_value<T: DeserializeOwned + Default>(
    dir: &Path,
    base_name: &str,
) -> Result<T, DataLoadError> {
    match find_data_file(dir, base_name)? {
        Some(path) => deserialize_file(&path),
        None => Ok(T::default()),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
