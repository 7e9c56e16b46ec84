use serde::Serialize;
use url::Url;

use crate::error::AppError;

/// Where the paginated listing index lives.
#[derive(Debug, Clone)]
pub struct IndexSource {
    /// Index URL with a `{page}` placeholder for the zero-based page number.
    pub url_template: String,
    /// Base that relative listing links are resolved against.
    pub base_url: Url,
}

impl IndexSource {
    pub fn new(url_template: impl Into<String>, base_url: &str) -> Result<Self, AppError> {
        let url_template = url_template.into();
        if !url_template.contains("{page}") {
            return Err(AppError::ConfigError(format!(
                "Index URL template has no {{page}} placeholder: {url_template}"
            )));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
        Ok(Self {
            url_template,
            base_url,
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}

/// The "model" spec row: make plus the model name without it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelRow {
    pub make: String,
    pub suffix: String,
}

/// What a parser read off one detail page, before assembly into a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawListing {
    pub make: String,
    pub model: String,
    pub price: String,
    pub model_row: Option<ModelRow>,
    /// `(label, value)` spec rows in document order; labels lower-cased.
    pub specs: Vec<(String, String)>,
    /// Every value cell on the page, used when labelled rows miss Year/Mileage.
    pub loose_values: Vec<String>,
    /// Image sources as found on the page.
    pub images: Vec<String>,
}

/// A listing that could not be extracted within the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    pub url: String,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
    /// False when a non-retryable error ended the attempts early.
    pub retries_exhausted: bool,
}

/// Coarse classification of why an extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Network,
    Http,
    PageNotReady,
    Schema,
    Other,
}

impl From<&AppError> for FailureKind {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Timeout(_) => FailureKind::Timeout,
            AppError::NetworkError(_) => FailureKind::Network,
            AppError::HttpError(_) | AppError::HttpStatus { .. } => FailureKind::Http,
            AppError::PageNotReady(_) => FailureKind::PageNotReady,
            AppError::SchemaError(_) => FailureKind::Schema,
            _ => FailureKind::Other,
        }
    }
}
