//! Versioned selector schemas.
//!
//! A selector schema tells the parser where a site keeps its listing links,
//! headline fields, spec rows and images. Schemas live as JSON files under a
//! schemas directory as `{name}/{version}.json`, with `registry.json` mapping
//! each name to its latest version.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use lotwatch_core::assemble::{AssemblyRules, default_labels};
use lotwatch_core::{AppError, Field, IndexSource};
use serde::{Deserialize, Serialize};

/// Index page selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSelectors {
    /// Index URL with a `{page}` placeholder.
    pub url_template: String,
    pub base_url: String,
    /// Anchor elements linking to listing detail pages.
    pub listing_link: String,
    /// Element the browser fetcher waits for before reading an index page.
    #[serde(default)]
    pub ready: Option<String>,
}

/// A headline value read from an attribute, falling back to element text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrSelector {
    pub selector: String,
    #[serde(default)]
    pub attr: Option<String>,
}

/// Detail page selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSelectors {
    /// A page where none of these match has not rendered yet.
    #[serde(default)]
    pub ready: Vec<String>,
    pub make: String,
    pub model: String,
    pub price: AttrSelector,
    /// One label/value spec row.
    pub spec_row: String,
    /// Label cell within a row; its last `span` holds the label text.
    pub spec_label: String,
    /// Value cell within a row.
    pub spec_value: String,
    /// Labels whose value cell nests the real text in sub-elements.
    #[serde(default)]
    pub nested_values: HashMap<String, String>,
    /// Label of the row combining make and model.
    #[serde(default = "default_model_row_label")]
    pub model_row_label: String,
    /// Element holding the make inside the model row's value cell.
    pub model_row_make: String,
    /// Every value cell, scanned when labelled rows miss Year or Mileage.
    pub loose_values: String,
    pub images: String,
}

fn default_model_row_label() -> String {
    "model".to_string()
}

/// Image post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRules {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_full_width")]
    pub full_width: u32,
}

fn default_full_width() -> u32 {
    1324
}

impl Default for ImageRules {
    fn default() -> Self {
        Self {
            host: None,
            full_width: default_full_width(),
        }
    }
}

/// Selector schema for one classifieds site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSchema {
    pub name: String,
    pub version: String,
    pub index: IndexSelectors,
    pub detail: DetailSelectors,
    #[serde(default)]
    pub images: ImageRules,
    /// Spec-row label to column name; the built-in table when empty.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SelectorSchema {
    pub fn index_source(&self) -> Result<IndexSource, AppError> {
        IndexSource::new(&self.index.url_template, &self.index.base_url)
    }

    pub fn assembly_rules(&self) -> Result<AssemblyRules, AppError> {
        let labels = if self.labels.is_empty() {
            default_labels()
        } else {
            self.labels
                .iter()
                .map(|(label, column)| {
                    let field: Field = column.parse().map_err(AppError::SchemaError)?;
                    Ok((label.trim().to_lowercase(), field))
                })
                .collect::<Result<_, AppError>>()?
        };

        Ok(AssemblyRules {
            labels,
            image_host: self.images.host.clone(),
            image_width: self.images.full_width,
        })
    }
}

/// A fully resolved schema: path, canonical name, and parsed selectors.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub path: PathBuf,
    pub name: String,
    pub schema: SelectorSchema,
}

/// Resolves schema references (file paths or `name@version` strings).
pub struct SchemaResolver {
    schemas_dir: PathBuf,
}

impl SchemaResolver {
    pub fn new(schemas_dir: impl Into<PathBuf>) -> Self {
        Self {
            schemas_dir: schemas_dir.into(),
        }
    }

    /// Resolve a schema reference.
    ///
    /// Accepts:
    /// - A direct file path (e.g. `schemas/lindacars/1.json`)
    /// - `name@version` (e.g. `lindacars@1`)
    /// - `name@latest` (resolved via `registry.json`)
    pub fn resolve(&self, schema_ref: &str) -> Result<ResolvedSchema, AppError> {
        let path = self.resolve_path(schema_ref)?;

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::SchemaError(format!(
                "Failed to read schema file {}: {e}",
                path.display()
            ))
        })?;
        let schema: SelectorSchema = serde_json::from_str(&raw).map_err(|e| {
            AppError::SchemaError(format!(
                "Invalid selector schema {}: {e}",
                path.display()
            ))
        })?;

        let name = format!("{}@{}", schema.name, schema.version);
        Ok(ResolvedSchema { path, name, schema })
    }

    fn resolve_path(&self, schema_ref: &str) -> Result<PathBuf, AppError> {
        let direct = PathBuf::from(schema_ref);
        if direct.is_file() {
            return Ok(direct);
        }

        let (name, version) = schema_ref
            .split_once('@')
            .ok_or_else(|| AppError::SchemaError(format!("Schema not found: {schema_ref}")))?;
        if name.is_empty() || version.is_empty() {
            return Err(AppError::SchemaError(format!(
                "Schema must be a path or name@version, got: {schema_ref}"
            )));
        }

        let version = if version == "latest" {
            self.load_registry()?.remove(name).ok_or_else(|| {
                AppError::SchemaError(format!("No latest version for schema {name}"))
            })?
        } else {
            version.to_string()
        };

        let path = self.schemas_dir.join(name).join(format!("{version}.json"));
        if !path.is_file() {
            return Err(AppError::SchemaError(format!(
                "Schema file not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    fn load_registry(&self) -> Result<HashMap<String, String>, AppError> {
        let registry_path = self.schemas_dir.join("registry.json");
        let raw = std::fs::read_to_string(&registry_path).map_err(|e| {
            AppError::SchemaError(format!(
                "Failed to read schema registry {}: {e}",
                registry_path.display()
            ))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::SchemaError(format!("Invalid JSON in schema registry: {e}")))
    }

    pub fn schemas_dir(&self) -> &Path {
        &self.schemas_dir
    }
}
