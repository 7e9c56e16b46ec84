use std::collections::HashMap;
use std::sync::Arc;

use lotwatch_core::error::AppError;
use lotwatch_core::listing::normalize_text;
use lotwatch_core::models::{ModelRow, RawListing};
use lotwatch_core::traits::ListingParser;
use scraper::{ElementRef, Html, Selector};

use crate::schema::SelectorSchema;

/// CSS-selector parser driven by a [`SelectorSchema`].
///
/// All selectors are compiled once up front; an invalid selector is a schema
/// error at construction time, never a per-page failure.
#[derive(Clone)]
pub struct SelectorParser {
    selectors: Arc<Compiled>,
}

struct Compiled {
    listing_link: Selector,
    detail_ready: Vec<Selector>,
    make: Selector,
    model: Selector,
    price: Selector,
    price_attr: Option<String>,
    spec_row: Selector,
    spec_label: Selector,
    spec_value: Selector,
    span: Selector,
    nested_values: HashMap<String, Selector>,
    model_row_label: String,
    model_row_make: Selector,
    loose_values: Selector,
    images: Selector,
}

fn compile(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|e| AppError::SchemaError(format!("Invalid CSS selector '{css}': {e}")))
}

/// Whitespace-normalised text content of an element.
fn text_of(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(root: ElementRef<'_>, selector: &Selector) -> String {
    root.select(selector).next().map(text_of).unwrap_or_default()
}

impl SelectorParser {
    pub fn new(schema: &SelectorSchema) -> Result<Self, AppError> {
        let index = &schema.index;
        let detail = &schema.detail;

        // The index readiness selector only drives the browser wait; an index
        // page without tiles is an empty page, not an unready one.
        if let Some(css) = &index.ready {
            compile(css)?;
        }

        let nested_values = detail
            .nested_values
            .iter()
            .map(|(label, css)| Ok((label.trim().to_lowercase(), compile(css)?)))
            .collect::<Result<_, AppError>>()?;

        let selectors = Compiled {
            listing_link: compile(&index.listing_link)?,
            detail_ready: detail
                .ready
                .iter()
                .map(|css| compile(css))
                .collect::<Result<_, _>>()?,
            make: compile(&detail.make)?,
            model: compile(&detail.model)?,
            price: compile(&detail.price.selector)?,
            price_attr: detail.price.attr.clone(),
            spec_row: compile(&detail.spec_row)?,
            spec_label: compile(&detail.spec_label)?,
            spec_value: compile(&detail.spec_value)?,
            span: compile("span")?,
            nested_values,
            model_row_label: detail.model_row_label.trim().to_lowercase(),
            model_row_make: compile(&detail.model_row_make)?,
            loose_values: compile(&detail.loose_values)?,
            images: compile(&detail.images)?,
        };

        Ok(Self {
            selectors: Arc::new(selectors),
        })
    }

    /// Label text of a spec row, lower-cased.
    ///
    /// Icons sit in earlier spans of the label cell, so the last span wins.
    fn row_label(&self, row: ElementRef<'_>) -> String {
        let Some(cell) = row.select(&self.selectors.spec_label).next() else {
            return String::new();
        };
        let text = cell
            .select(&self.selectors.span)
            .last()
            .map(text_of)
            .unwrap_or_else(|| text_of(cell));
        text.to_lowercase()
    }

    fn row_value(&self, label: &str, cell: ElementRef<'_>) -> String {
        if let Some(nested) = self.selectors.nested_values.get(label) {
            let parts: Vec<String> = cell
                .select(nested)
                .map(text_of)
                .filter(|t| !t.is_empty())
                .collect();
            if !parts.is_empty() {
                return parts.join(" ");
            }
        }
        text_of(cell)
    }

    fn model_row(&self, cell: ElementRef<'_>) -> ModelRow {
        let make = first_text(cell, &self.selectors.model_row_make);
        let full = text_of(cell);
        let suffix = if make.is_empty() {
            full
        } else {
            normalize_text(&full.replacen(&make, "", 1))
        };
        ModelRow { make, suffix }
    }

    fn price(&self, root: ElementRef<'_>) -> String {
        let Some(el) = root.select(&self.selectors.price).next() else {
            return String::new();
        };
        self.selectors
            .price_attr
            .as_deref()
            .and_then(|attr| el.value().attr(attr))
            .map(normalize_text)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| text_of(el))
    }
}

impl ListingParser for SelectorParser {
    fn index_links(&self, html: &str) -> Result<Vec<String>, AppError> {
        let document = Html::parse_document(html);
        Ok(document
            .select(&self.selectors.listing_link)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .collect())
    }

    fn parse_detail(&self, html: &str) -> Result<RawListing, AppError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let s = &self.selectors;

        let rendered = s.detail_ready.is_empty()
            || s.detail_ready.iter().any(|r| root.select(r).next().is_some());
        if !rendered {
            return Err(AppError::PageNotReady(
                "detail page content has not rendered".to_string(),
            ));
        }

        let mut raw = RawListing {
            make: first_text(root, &s.make),
            model: first_text(root, &s.model),
            price: self.price(root),
            ..Default::default()
        };

        for row in root.select(&s.spec_row) {
            let label = self.row_label(row);
            if label.is_empty() {
                continue;
            }
            let Some(cell) = row.select(&s.spec_value).next() else {
                continue;
            };
            if label == s.model_row_label {
                if raw.model_row.is_none() {
                    raw.model_row = Some(self.model_row(cell));
                }
                continue;
            }
            let value = self.row_value(&label, cell);
            raw.specs.push((label, value));
        }

        raw.loose_values = root.select(&s.loose_values).map(text_of).collect();
        raw.images = root
            .select(&s.images)
            .filter_map(|img| {
                let attrs = img.value();
                ["src", "data-src"]
                    .into_iter()
                    .filter_map(|name| attrs.attr(name))
                    .find(|v| !v.trim().is_empty())
            })
            .map(str::to_string)
            .collect();

        Ok(raw)
    }
}
