//! Class name <-> index mapping and per-class anomaly thresholds.
//!
//! Loaded once at startup from two artefacts and never mutated afterwards:
//! a JSON object `{"<name>": <index>}` and a threshold table that is either
//! JSON (`{"<index>": <float>}` or `[<float>, ...]`) or a 1-D `.npy` array.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed JSON in {path}: {source}")]
    Json { path: PathBuf, #[source] source: serde_json::Error },
    #[error(
        "failed to read npy thresholds {path}: {message}. Only 1-D float arrays are read; a pickled dict must be exported to JSON first: \
         json.dump({{str(k): float(v) for k, v in np.load(p, allow_pickle=True).item().items()}}, f)"
    )]
    Npy { path: PathBuf, message: String },
    #[error("class map is empty")]
    Empty,
    #[error("class index {index} is assigned to both {first:?} and {second:?}")]
    DuplicateIndex { index: usize, first: String, second: String },
    #[error("class indices must be contiguous from 0; index {0} is missing")]
    NonContiguous(usize),
    #[error("threshold key {0:?} is not an integer class index")]
    BadThresholdKey(String),
    #[error("no threshold registered for class index {index} ({name})")]
    MissingThreshold { index: usize, name: String },
    #[error("threshold for class index {index} is not finite: {value}")]
    NonFinite { index: usize, value: f64 },
}

/// Raised at request time for names outside the registry.
#[derive(Debug, Error)]
#[error("Unknown class name: {0}")]
pub struct UnknownClass(pub String);

#[derive(Debug, Clone)]
pub struct ClassRegistry {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
    thresholds: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClassEntry<'a> {
    pub index: usize,
    pub name: &'a str,
    pub threshold: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ThresholdFile {
    Table(BTreeMap<String, f64>),
    List(Vec<f64>),
}

impl ClassRegistry {
    pub fn load(class_map: &Path, thresholds: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read(class_map).map_err(|source| RegistryError::Io { path: class_map.to_path_buf(), source })?;
        let map: HashMap<String, usize> = serde_json::from_slice(&raw).map_err(|source| RegistryError::Json { path: class_map.to_path_buf(), source })?;
        let table = read_thresholds(thresholds)?;
        let registry = Self::from_parts(map, table)?;
        info!(classes = registry.len(), class_map = %class_map.display(), thresholds = %thresholds.display(), "class registry loaded");
        Ok(registry)
    }

    /// Validates and assembles a registry. Threshold entries for indices that
    /// no class uses are dropped with a warning.
    pub fn from_parts(map: HashMap<String, usize>, thresholds: BTreeMap<usize, f64>) -> Result<Self, RegistryError> {
        if map.is_empty() { return Err(RegistryError::Empty); }
        let mut slots: Vec<Option<String>> = vec![None; map.len()];
        let mut entries: Vec<(String, usize)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (name, index) in entries {
            // entries are index-ordered, so an out-of-range index means a gap below it
            let Some(slot) = slots.get_mut(index) else {
                let missing = (0..index).find(|i| !matches!(slots.get(*i), Some(Some(_)))).unwrap_or(index);
                return Err(RegistryError::NonContiguous(missing));
            };
            if let Some(first) = slot.take() {
                return Err(RegistryError::DuplicateIndex { index, first, second: name });
            }
            *slot = Some(name);
        }
        let mut names = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            names.push(slot.ok_or(RegistryError::NonContiguous(index))?);
        }

        let mut table = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let value = *thresholds.get(&index).ok_or_else(|| RegistryError::MissingThreshold { index, name: name.clone() })?;
            if !value.is_finite() { return Err(RegistryError::NonFinite { index, value }); }
            table.push(value);
        }
        let extra: Vec<usize> = thresholds.keys().copied().filter(|i| *i >= names.len()).collect();
        if !extra.is_empty() { warn!(?extra, "ignoring thresholds for unregistered class indices"); }

        let by_name = names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        Ok(Self { names, by_name, thresholds: table })
    }

    pub fn index_of(&self, name: &str) -> Result<usize, UnknownClass> {
        self.by_name.get(name).copied().ok_or_else(|| UnknownClass(name.to_string()))
    }

    pub fn name_of(&self, index: usize) -> Option<&str> { self.names.get(index).map(String::as_str) }

    pub fn threshold(&self, index: usize) -> Option<f64> { self.thresholds.get(index).copied() }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    /// Class names ordered by index.
    pub fn names(&self) -> &[String] { &self.names }

    pub fn entries(&self) -> impl Iterator<Item = ClassEntry<'_>> + '_ {
        self.names.iter().zip(&self.thresholds).enumerate().map(|(index, (name, threshold))| ClassEntry { index, name, threshold: *threshold })
    }
}

fn read_thresholds(path: &Path) -> Result<BTreeMap<usize, f64>, RegistryError> {
    let is_npy = path.extension().map(|e| e.eq_ignore_ascii_case("npy")).unwrap_or(false);
    if is_npy {
        let values = read_npy_values(path)?;
        return Ok(values.into_iter().enumerate().collect());
    }
    let raw = std::fs::read(path).map_err(|source| RegistryError::Io { path: path.to_path_buf(), source })?;
    let parsed: ThresholdFile = serde_json::from_slice(&raw).map_err(|source| RegistryError::Json { path: path.to_path_buf(), source })?;
    match parsed {
        ThresholdFile::List(values) => Ok(values.into_iter().enumerate().collect()),
        ThresholdFile::Table(table) => table
            .into_iter()
            .map(|(k, v)| k.trim().parse::<usize>().map(|i| (i, v)).map_err(|_| RegistryError::BadThresholdKey(k)))
            .collect(),
    }
}

fn read_npy_values(path: &Path) -> Result<Vec<f64>, RegistryError> {
    match ndarray_npy::read_npy::<_, Array1<f64>>(path) {
        Ok(arr) => Ok(arr.to_vec()),
        Err(first) => match ndarray_npy::read_npy::<_, Array1<f32>>(path) {
            Ok(arr) => Ok(arr.iter().map(|v| f64::from(*v)).collect()),
            Err(_) => Err(RegistryError::Npy { path: path.to_path_buf(), message: first.to_string() }),
        },
    }
}
