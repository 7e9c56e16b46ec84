//! Listing identity and the fixed field schema.
//!
//! A [`Listing`] is keyed by its canonical source URL and always carries a
//! value for every [`Field`] (empty string when the page did not show it).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// One tracked attribute of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Make,
    Model,
    Description,
    Price,
    Color,
    Year,
    Mileage,
    Fuel,
    Engine,
    Transmission,
    Drive,
    Trim,
    BodyType,
    Seats,
    Condition,
    Owners,
    Accidents,
    GeneralCondition,
    BodyCondition,
    MechanicalCondition,
    InteriorCondition,
    Specs,
    EmissionStandard,
    EmissionCo2,
}

/// Fields whose change alone makes a listing UPDATED.
///
/// Kept separate from [`Field::ALL`] so that a newly extracted field never
/// becomes diff-relevant by accident.
pub const MUTABLE_FIELDS: [Field; 2] = [Field::Price, Field::Mileage];

impl Field {
    /// Every field, in artifact column order.
    pub const ALL: [Field; 24] = [
        Field::Make,
        Field::Model,
        Field::Description,
        Field::Price,
        Field::Color,
        Field::Year,
        Field::Mileage,
        Field::Fuel,
        Field::Engine,
        Field::Transmission,
        Field::Drive,
        Field::Trim,
        Field::BodyType,
        Field::Seats,
        Field::Condition,
        Field::Owners,
        Field::Accidents,
        Field::GeneralCondition,
        Field::BodyCondition,
        Field::MechanicalCondition,
        Field::InteriorCondition,
        Field::Specs,
        Field::EmissionStandard,
        Field::EmissionCo2,
    ];

    /// Column name used in artifacts and label maps.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Make => "Make",
            Field::Model => "Model",
            Field::Description => "Description",
            Field::Price => "Price",
            Field::Color => "Color",
            Field::Year => "Year",
            Field::Mileage => "Mileage",
            Field::Fuel => "Fuel",
            Field::Engine => "Engine",
            Field::Transmission => "Transmission",
            Field::Drive => "Drive",
            Field::Trim => "Trim",
            Field::BodyType => "BodyType",
            Field::Seats => "Seats",
            Field::Condition => "Condition",
            Field::Owners => "Owners",
            Field::Accidents => "Accidents",
            Field::GeneralCondition => "GeneralCondition",
            Field::BodyCondition => "BodyCondition",
            Field::MechanicalCondition => "MechanicalCondition",
            Field::InteriorCondition => "InteriorCondition",
            Field::Specs => "Specs",
            Field::EmissionStandard => "EmissionStandard",
            Field::EmissionCo2 => "EmissionCO2",
        }
    }

    pub fn is_mutable(&self) -> bool {
        MUTABLE_FIELDS.contains(self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.column().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown field: {s}"))
    }
}

/// One scraped listing.
///
/// Built once by the extractor (or read back from an artifact) and never
/// mutated afterwards; the `with_*` methods consume and return the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    url: String,
    values: BTreeMap<Field, String>,
    images: Vec<String>,
}

impl Listing {
    /// A listing with every field present and empty.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            values: Field::ALL.iter().map(|f| (*f, String::new())).collect(),
            images: Vec::new(),
        }
    }

    /// Set a field, normalising its text.
    pub fn with(mut self, field: Field, value: impl AsRef<str>) -> Self {
        self.values.insert(field, normalize_text(value.as_ref()));
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// The listing identity.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }
}

/// Collapse runs of whitespace and trim, so values compare by their visible text.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a listing link against the site base and drop query and fragment.
///
/// Returns `None` for empty or unresolvable links.
pub fn canonical_identity(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = base.join(href).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}
