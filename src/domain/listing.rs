//! Temporal listing resolution.
//!
//! Listings bind a canonical security to an (exchange, symbol) pair for a
//! date window. Windows of one pair never overlap and at most one of them is
//! open-ended. This module classifies how an incoming record relates to the
//! existing windows and works out the attribute changes an update implies.

use crate::domain::error::SecmasterError;
use crate::domain::record::ExternalRecord;
use crate::domain::security::{Exchange, ListedSecurity, ListingDiff, ListingWindow, search_key};
use crate::domain::similarity::similarity;
use crate::ports::registry_port::RegistryPort;
use chrono::NaiveDate;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingLookup {
    /// No window covers the active date.
    Create,
    /// Exactly one window covers it.
    Update(ListedSecurity),
    /// Several windows cover it; the pair's data needs manual repair.
    IntegrityViolation(Vec<ListedSecurity>),
}

pub fn look_up(
    registry: &dyn RegistryPort,
    exchange: &Exchange,
    symbol: &str,
    active_date: NaiveDate,
) -> Result<ListingLookup, SecmasterError> {
    let mut rows = registry.find_overlapping_listings(exchange.id, symbol, active_date)?;
    match rows.len() {
        0 => Ok(ListingLookup::Create),
        1 => Ok(rows
            .pop()
            .map(ListingLookup::Update)
            .unwrap_or(ListingLookup::Create)),
        _ => {
            for row in &rows {
                error!(
                    exchange = %exchange.label,
                    symbol = %symbol,
                    active_date = %active_date,
                    listing_id = row.id,
                    security_id = row.security_id,
                    window = %row.window(),
                    "overlapping listing window"
                );
            }
            Ok(ListingLookup::IntegrityViolation(rows))
        }
    }
}

/// Existing listings of the pair that would overlap `window`, ignoring the
/// listing being updated.
pub fn conflicting_listings(
    registry: &dyn RegistryPort,
    exchange_id: i64,
    symbol: &str,
    window: &ListingWindow,
    ignore: Option<i64>,
) -> Result<Vec<ListedSecurity>, SecmasterError> {
    let rows = registry.find_listings_in_window(exchange_id, symbol, window)?;
    Ok(rows
        .into_iter()
        .filter(|row| Some(row.id) != ignore && row.window().overlaps(window))
        .collect())
}

/// Listing attributes that differ between an existing listing and a record.
pub fn listing_diff(existing: &ListedSecurity, record: &ExternalRecord) -> ListingDiff {
    let symbol = record.listing_symbol();
    ListingDiff {
        security_id: None,
        symbol: (existing.symbol != symbol).then_some(symbol),
        start_date: (existing.start_date != record.start_date).then_some(record.start_date),
        end_date: (existing.end_date != record.end_date).then_some(record.end_date),
        vendor_id: (record.vendor_id.is_some() && existing.vendor_id != record.vendor_id)
            .then_some(record.vendor_id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NameCheck {
    /// Same normalized name.
    Same,
    /// Different, but similar enough to be the same instrument renamed.
    Drifted { score: f64 },
    /// A different instrument now trading under the symbol.
    Distinct { score: f64 },
}

pub fn compare_names(existing: &str, incoming: &str, threshold: f64) -> NameCheck {
    if search_key(existing) == search_key(incoming) {
        return NameCheck::Same;
    }
    let score = similarity(existing, incoming);
    if score >= threshold {
        NameCheck::Drifted { score }
    } else {
        NameCheck::Distinct { score }
    }
}
