//! Turns a [`RawListing`] into a [`Listing`] with a total field set.
//!
//! This is where label rows are mapped to fields, combined fuel/engine text is
//! split and thumbnail image URLs are rewritten to full resolution.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;
use crate::listing::{Field, Listing, normalize_text};
use crate::models::RawListing;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19[5-9]\d|20[0-3]\d)$").expect("year pattern"));
static MILEAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)km").expect("mileage pattern"));
static FUEL_ENGINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z][\w\s\-]*?)\s+(\d.*)").expect("fuel/engine pattern")
});
static SIZE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fit-\d+xauto").expect("size token pattern"));
static THUMB_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/thumbs/([a-f0-9]+)/").expect("thumb key pattern"));

/// Spec-row label (lower-case) to field.
pub type LabelMap = HashMap<String, Field>;

/// The label table of the deal-drive listing pages.
pub fn default_labels() -> LabelMap {
    [
        ("trim", Field::Trim),
        ("body type", Field::BodyType),
        ("body color", Field::Color),
        ("colour", Field::Color),
        ("color", Field::Color),
        ("transmission", Field::Transmission),
        ("gearbox", Field::Transmission),
        ("drive", Field::Drive),
        ("fuel type", Field::Fuel),
        ("fuel", Field::Fuel),
        ("year", Field::Year),
        ("mileage", Field::Mileage),
        ("condition", Field::Condition),
        ("seat count", Field::Seats),
        ("previous owners", Field::Owners),
        ("accidents", Field::Accidents),
        ("general condition", Field::GeneralCondition),
        ("body condition", Field::BodyCondition),
        ("mechanical condition", Field::MechanicalCondition),
        ("interior condition", Field::InteriorCondition),
        ("regional specs", Field::Specs),
        ("emission standard", Field::EmissionStandard),
        ("emission co2", Field::EmissionCo2),
    ]
    .into_iter()
    .map(|(label, field)| (label.to_string(), field))
    .collect()
}

/// Site-specific post-processing knobs, supplied by the selector schema.
#[derive(Debug, Clone)]
pub struct AssemblyRules {
    pub labels: LabelMap,
    /// Keep only images whose URL contains this host.
    pub image_host: Option<String>,
    /// Width of the full-resolution `fit-<W>xauto` variant.
    pub image_width: u32,
}

impl Default for AssemblyRules {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            image_host: Some("content.deal-drive.com".to_string()),
            image_width: 1324,
        }
    }
}

/// Split `"Petrol 2.0 L (254 hp)"` into `("Petrol", "2.0 L (254 hp)")`.
///
/// Text that does not look like `<fuel words> <digit...>` is returned as the
/// engine with an empty fuel.
pub fn split_fuel_engine(raw: &str) -> (String, String) {
    let raw = raw.trim();
    match FUEL_ENGINE_RE.captures(raw) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (String::new(), raw.to_string()),
    }
}

/// Rewrite the thumbnail size token to the full-resolution one.
pub fn upscale_image_url(url: &str, width: u32) -> String {
    SIZE_TOKEN_RE
        .replace_all(url, format!("fit-{width}xauto").as_str())
        .into_owned()
}

/// Images that differ only in size share the `/thumbs/<hash>/` key.
fn image_key(url: &str) -> &str {
    THUMB_KEY_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(url)
}

fn collect_images(raw: &[String], rules: &AssemblyRules) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for src in raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Some(host) = &rules.image_host {
            if !src.contains(host.as_str()) {
                continue;
            }
        }
        let full = upscale_image_url(src, rules.image_width);
        if seen.insert(image_key(&full).to_string()) {
            images.push(full);
        }
    }
    images
}

/// Map spec rows to fields. The first non-empty value for a field wins.
fn map_specs(raw: &RawListing, labels: &LabelMap) -> BTreeMap<Field, String> {
    let mut found = BTreeMap::new();

    for (label, value) in &raw.specs {
        let value = normalize_text(value);
        if value.is_empty() {
            continue;
        }
        let label = label.trim().to_lowercase();
        if label == "engine" {
            let (fuel, engine) = split_fuel_engine(&value);
            if !fuel.is_empty() {
                found.entry(Field::Fuel).or_insert(fuel);
            }
            if !engine.is_empty() {
                found.entry(Field::Engine).or_insert(engine);
            }
            continue;
        }
        if let Some(field) = labels.get(&label) {
            found.entry(*field).or_insert(value);
        }
    }

    if !found.contains_key(&Field::Year) || !found.contains_key(&Field::Mileage) {
        for value in raw.loose_values.iter().map(|v| normalize_text(v)) {
            if value.is_empty() {
                continue;
            }
            if !found.contains_key(&Field::Year) && YEAR_RE.is_match(&value) {
                found.insert(Field::Year, value);
            } else if !found.contains_key(&Field::Mileage) && MILEAGE_RE.is_match(&value) {
                found.insert(Field::Mileage, value);
            }
        }
    }

    found
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> String {
    candidates
        .into_iter()
        .map(normalize_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Build the listing for `url` from what the parser found.
///
/// Fails with a retryable [`AppError::PageNotReady`] when make, model and
/// price are all empty, which means the page had not rendered yet.
pub fn assemble_listing(
    url: &str,
    raw: &RawListing,
    rules: &AssemblyRules,
) -> Result<Listing, AppError> {
    let mut specs = map_specs(raw, &rules.labels);
    let row = raw.model_row.clone().unwrap_or_default();

    let make = first_non_empty([
        raw.make.as_str(),
        row.make.as_str(),
        specs.get(&Field::Make).map(String::as_str).unwrap_or(""),
    ]);
    let suffix = normalize_text(&row.suffix);
    let model = if !normalize_text(&raw.model).is_empty() {
        normalize_text(&raw.model)
    } else if !make.is_empty() && !suffix.is_empty() {
        format!("{make} {suffix}")
    } else if !suffix.is_empty() {
        suffix
    } else {
        make.clone()
    };
    let price = first_non_empty([
        raw.price.as_str(),
        specs.get(&Field::Price).map(String::as_str).unwrap_or(""),
    ]);

    if make.is_empty() && model.is_empty() && price.is_empty() {
        return Err(AppError::PageNotReady(format!(
            "all core fields empty for {url}"
        )));
    }

    for field in [Field::Make, Field::Model, Field::Description, Field::Price] {
        specs.remove(&field);
    }

    let listing = specs
        .into_iter()
        .fold(Listing::new(url), |listing, (field, value)| {
            listing.with(field, value)
        })
        .with(Field::Make, &make)
        .with(Field::Model, &model)
        .with(Field::Description, &model)
        .with(Field::Price, &price)
        .with_images(collect_images(&raw.images, rules));

    Ok(listing)
}
