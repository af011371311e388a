//! Static place-name lookup.
//!
//! Keys are normalized with the same letters-only rule applied to
//! findings, and lookups are exact matches on that normalized form.

use crate::ingest::normalize_name;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// A point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Resolves a finding's name to a coordinate.
pub trait CoordinateResolver {
    /// `None` means the name is unknown; it is not an error.
    fn resolve(&self, name: &str) -> Option<Coordinate>;
}

impl<R: CoordinateResolver + ?Sized> CoordinateResolver for &R {
    fn resolve(&self, name: &str) -> Option<Coordinate> {
        (**self).resolve(name)
    }
}

/// Errors from loading a gazetteer.
#[derive(Debug, Error)]
pub enum GazetteerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid gazetteer: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Entry as stored on disk: `{ "lat": .., "lon": .. }`.
#[derive(Debug, Deserialize)]
struct Entry {
    lat: f64,
    #[serde(alias = "lng")]
    lon: f64,
}

/// Places shown on the default map view.
const BUILTIN_PLACES: &[(&str, f64, f64)] = &[
    ("Bakhmut", 48.6, 38.0),
    ("Donetsk", 48.0, 37.8),
    ("Mariupol", 47.1, 37.6),
    ("Kharkiv", 49.9, 36.2),
    ("Kyiv", 50.45, 30.52),
    ("Odesa", 46.48, 30.72),
    ("Dnipro", 48.46, 35.05),
    ("Zaporizhzhia", 47.84, 35.14),
    ("Kherson", 46.64, 32.61),
    ("Mykolaiv", 46.97, 32.0),
    ("Lviv", 49.84, 24.03),
    ("Sumy", 50.91, 34.8),
    ("Chernihiv", 51.49, 31.29),
    ("Luhansk", 48.57, 39.31),
    ("Avdiivka", 48.14, 37.75),
    ("Kramatorsk", 48.72, 37.56),
    ("Sloviansk", 48.85, 37.61),
    ("Pokrovsk", 48.28, 37.18),
    ("Kupiansk", 49.71, 37.62),
    ("Izium", 49.21, 37.26),
    ("Melitopol", 46.85, 35.37),
    ("Sevastopol", 44.62, 33.52),
];

static BUILTIN: Lazy<Gazetteer> = Lazy::new(|| {
    let mut gazetteer = Gazetteer::new();
    for &(name, lat, lon) in BUILTIN_PLACES {
        gazetteer.insert(name, Coordinate::new(lat, lon));
    }
    gazetteer
});

/// In-memory name → coordinate table.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    entries: HashMap<String, Coordinate>,
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table compiled into the binary.
    pub fn builtin() -> &'static Gazetteer {
        &BUILTIN
    }

    /// Parse a JSON object mapping place names to `{ lat, lon }`.
    pub fn from_json(json: &str) -> Result<Self, GazetteerError> {
        let raw: HashMap<String, Entry> = serde_json::from_str(json)?;
        let mut gazetteer = Self::new();
        for (name, entry) in raw {
            gazetteer.insert(&name, Coordinate::new(entry.lat, entry.lon));
        }
        Ok(gazetteer)
    }

    /// Load a JSON gazetteer from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GazetteerError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let gazetteer = Self::from_json(&content)?;
        tracing::info!(
            path = %path.as_ref().display(),
            places = gazetteer.len(),
            "gazetteer loaded"
        );
        Ok(gazetteer)
    }

    /// Add or overwrite a place. Returns the coordinate it replaced, if any.
    pub fn insert(&mut self, name: &str, coordinate: Coordinate) -> Option<Coordinate> {
        let key = normalize_name(name);
        let previous = self.entries.insert(key.clone(), coordinate);
        if previous.is_some() {
            tracing::warn!(%key, "gazetteer entry overwritten");
        }
        previous
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CoordinateResolver for Gazetteer {
    fn resolve(&self, name: &str) -> Option<Coordinate> {
        self.entries.get(name).copied()
    }
}
