//! Registry data model: canonical securities, listings, exchanges and types.

use chrono::NaiveDate;
use std::fmt;

/// Normalized search key for a security name.
pub fn search_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentType {
    pub id: i64,
    pub name: String,
}

/// The single authoritative record for a tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSecurity {
    pub id: i64,
    pub name: String,
    pub search_key: String,
    pub instrument_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecurity {
    pub name: String,
    pub instrument_type_id: i64,
}

/// Rename of a canonical security; the search key follows the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDiff {
    pub name: String,
}

/// A time-bounded binding of a canonical security to one exchange/symbol pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedSecurity {
    pub id: i64,
    pub security_id: i64,
    pub exchange_id: i64,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub vendor_id: Option<i64>,
}

impl ListedSecurity {
    pub fn window(&self) -> ListingWindow {
        ListingWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.window().covers(date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewListing {
    pub security_id: i64,
    pub exchange_id: i64,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub vendor_id: Option<i64>,
}

/// Listing attributes to change. `None` leaves a field untouched;
/// `end_date: Some(None)` reopens a window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDiff {
    pub security_id: Option<i64>,
    pub symbol: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub vendor_id: Option<Option<i64>>,
}

impl ListingDiff {
    pub fn is_empty(&self) -> bool {
        self.security_id.is_none()
            && self.symbol.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.vendor_id.is_none()
    }

    /// Changes the window bounds, if any.
    pub fn touches_window(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    /// The listing as it would look after this diff.
    pub fn apply_to(&self, listing: &ListedSecurity) -> ListedSecurity {
        ListedSecurity {
            id: listing.id,
            security_id: self.security_id.unwrap_or(listing.security_id),
            exchange_id: listing.exchange_id,
            symbol: self.symbol.clone().unwrap_or_else(|| listing.symbol.clone()),
            start_date: self.start_date.unwrap_or(listing.start_date),
            end_date: self.end_date.unwrap_or(listing.end_date),
            vendor_id: self.vendor_id.unwrap_or(listing.vendor_id),
        }
    }
}

/// Inclusive date window; `end == None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl ListingWindow {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && self.end.is_none_or(|end| date <= end)
    }

    pub fn overlaps(&self, other: &ListingWindow) -> bool {
        let self_before_other = self.end.is_some_and(|end| end < other.start);
        let other_before_self = other.end.is_some_and(|end| end < self.start);
        !self_before_other && !other_before_self
    }
}

impl fmt::Display for ListingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, open]", self.start),
        }
    }
}
