use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::listing::Listing;

/// The complete listing set of one run, keyed by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    captured_on: NaiveDate,
    listings: BTreeMap<String, Listing>,
}

impl Snapshot {
    pub fn empty(captured_on: NaiveDate) -> Self {
        Self {
            captured_on,
            listings: BTreeMap::new(),
        }
    }

    /// Build a snapshot, refusing duplicate identities.
    pub fn from_listings(
        captured_on: NaiveDate,
        listings: impl IntoIterator<Item = Listing>,
    ) -> Result<Self, AppError> {
        let mut map = BTreeMap::new();
        for listing in listings {
            match map.entry(listing.url().to_string()) {
                Entry::Occupied(e) => return Err(AppError::DuplicateIdentity(e.key().clone())),
                Entry::Vacant(e) => {
                    e.insert(listing);
                }
            }
        }
        Ok(Self {
            captured_on,
            listings: map,
        })
    }

    pub fn captured_on(&self) -> NaiveDate {
        self.captured_on
    }

    pub fn get(&self, identity: &str) -> Option<&Listing> {
        self.listings.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.listings.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Listings in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.listings.keys().map(String::as_str)
    }
}
