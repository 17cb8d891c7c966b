//! Persona catalog
//!
//! Personas are loaded once at process start, validated as a whole, and then
//! shared read-only. A catalog that fails validation aborts startup.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catalog compiled into the binary, used when no catalog file is configured
const BUILTIN_CATALOG: &str = include_str!("persona/bots.json");

/// A conversation needs at least two speakers, so a smaller catalog is useless
pub const MIN_CATALOG_SIZE: usize = 2;

/// Prompt material for a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructions {
    /// May contain a `{{topic}}` placeholder
    pub base_prompt: String,
    pub behavior_description: String,
    pub traits: Vec<String>,
}

/// A configured bot identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "avatar")]
    pub avatar_glyph: String,
    pub instructions: Instructions,
    /// Trait name to score in [0, 1]; ordered by name so prompts are stable
    #[serde(rename = "behaviors")]
    pub behavior_scores: BTreeMap<String, f64>,
    /// Chance in [0, 1] of forfeiting a turn
    #[serde(rename = "skipQuotient", default)]
    pub skip_probability: f64,
}

impl Persona {
    /// Full structural validation, applied when a catalog is loaded
    pub fn validate(&self) -> Result<(), PersonaError> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.display_name),
            ("avatar", &self.avatar_glyph),
        ] {
            if value.trim().is_empty() {
                return Err(self.missing(field));
            }
        }
        self.check_instructions()?;

        check_unit_range(&self.id, "skipQuotient", self.skip_probability)?;
        for (name, score) in &self.behavior_scores {
            check_unit_range(&self.id, &format!("behaviors.{name}"), *score)?;
        }
        Ok(())
    }

    /// The subset of validation the prompt builder depends on
    pub fn check_instructions(&self) -> Result<(), PersonaError> {
        if self.instructions.base_prompt.trim().is_empty() {
            return Err(self.missing("instructions.basePrompt"));
        }
        if self.instructions.behavior_description.trim().is_empty() {
            return Err(self.missing("instructions.behaviorDescription"));
        }
        Ok(())
    }

    /// True when the persona can never take a turn
    pub fn always_skips(&self) -> bool {
        self.skip_probability >= 1.0
    }

    fn missing(&self, field: &'static str) -> PersonaError {
        PersonaError::MissingField {
            id: self.id.clone(),
            field,
        }
    }
}

fn check_unit_range(id: &str, field: &str, value: f64) -> Result<(), PersonaError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PersonaError::OutOfRange {
            id: id.to_string(),
            field: field.to_string(),
            value,
        })
    }
}

/// A persona record that cannot be used to build prompts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersonaError {
    #[error("persona {id:?} is missing {field}")]
    MissingField { id: String, field: &'static str },
    #[error("persona {id:?}: {field} must be within [0, 1], got {value}")]
    OutOfRange { id: String, field: String, value: f64 },
}

/// Failure to load the persona catalog at startup
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read persona catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("persona catalog is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("persona catalog must be a JSON array")]
    NotAnArray,
    #[error("persona record #{index} is malformed: {source}")]
    MalformedRecord {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    InvalidPersona(#[from] PersonaError),
    #[error("duplicate persona id {0:?}")]
    DuplicateId(String),
    #[error("persona catalog needs at least {MIN_CATALOG_SIZE} personas, found {0}")]
    TooFew(usize),
}

/// Lookup of an id the catalog does not know
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown persona id {0:?}")]
pub struct UnknownPersona(pub String);

/// Read-only registry of validated personas
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl PersonaCatalog {
    /// Load from `path` when given, otherwise the built-in catalog
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse record by record so a bad entry is reported by position
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let parsed: serde_json::Value = serde_json::from_str(raw).map_err(CatalogError::Parse)?;
        let serde_json::Value::Array(records) = parsed else {
            return Err(CatalogError::NotAnArray);
        };

        let personas = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::from_value::<Persona>(record)
                    .map_err(|source| CatalogError::MalformedRecord { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_personas(personas)
    }

    pub fn from_personas(personas: Vec<Persona>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for persona in &personas {
            persona.validate()?;
            if !seen.insert(persona.id.as_str()) {
                return Err(CatalogError::DuplicateId(persona.id.clone()));
            }
        }
        if personas.len() < MIN_CATALOG_SIZE {
            return Err(CatalogError::TooFew(personas.len()));
        }
        Ok(Self { personas })
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Resolve ids in order, failing on the first unknown one
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<Persona>, UnknownPersona> {
        ids.iter()
            .map(|id| {
                self.get(id)
                    .cloned()
                    .ok_or_else(|| UnknownPersona(id.clone()))
            })
            .collect()
    }

    /// Pick `count` distinct personas in random order.
    ///
    /// `count` is clamped to the catalog size.
    pub fn random_subset<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Persona> {
        let mut picked: Vec<Persona> = self
            .personas
            .choose_multiple(rng, count.min(self.personas.len()))
            .cloned()
            .collect();
        picked.shuffle(rng);
        picked
    }
}
