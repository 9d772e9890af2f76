//! Persistence port for the canonical security registry.
//!
//! The reconciliation engine brackets the writes for one record between
//! [`RegistryPort::begin`] and [`RegistryPort::commit`] (or
//! [`RegistryPort::rollback`]), so every record is applied atomically or not
//! at all.

use crate::domain::error::SecmasterError;
use crate::domain::security::{
    CanonicalSecurity, Exchange, InstrumentType, ListedSecurity, ListingDiff, ListingWindow,
    NewListing, NewSecurity, SecurityDiff,
};
use chrono::NaiveDate;

pub trait RegistryPort {
    fn begin(&self) -> Result<(), SecmasterError>;
    fn commit(&self) -> Result<(), SecmasterError>;
    fn rollback(&self) -> Result<(), SecmasterError>;

    fn find_exchange(&self, label: &str) -> Result<Option<Exchange>, SecmasterError>;
    fn get_or_create_exchange(&self, label: &str) -> Result<Exchange, SecmasterError>;

    fn find_instrument_type(&self, name: &str) -> Result<Option<InstrumentType>, SecmasterError>;
    fn get_instrument_type(&self, id: i64) -> Result<Option<InstrumentType>, SecmasterError>;
    fn get_or_create_instrument_type(&self, name: &str) -> Result<InstrumentType, SecmasterError>;

    /// Securities of a type whose search key equals the normalized `name`.
    /// More than one row means the registry's uniqueness invariant is broken.
    fn find_exact(
        &self,
        name: &str,
        instrument_type_id: i64,
    ) -> Result<Vec<CanonicalSecurity>, SecmasterError>;
    fn get_entity(&self, id: i64) -> Result<Option<CanonicalSecurity>, SecmasterError>;
    /// Display names of every security of a type, for building a name index.
    fn security_names(&self, instrument_type_id: i64) -> Result<Vec<String>, SecmasterError>;
    fn create_entity(&self, new: &NewSecurity) -> Result<CanonicalSecurity, SecmasterError>;
    fn update_entity(&self, id: i64, diff: &SecurityDiff) -> Result<(), SecmasterError>;

    /// Listings of the pair whose window covers `date`.
    fn find_overlapping_listings(
        &self,
        exchange_id: i64,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Vec<ListedSecurity>, SecmasterError>;
    /// Listings of the pair whose window intersects `window`.
    fn find_listings_in_window(
        &self,
        exchange_id: i64,
        symbol: &str,
        window: &ListingWindow,
    ) -> Result<Vec<ListedSecurity>, SecmasterError>;
    /// Every listing of the pair, ordered by start date.
    fn listings_for(
        &self,
        exchange_id: i64,
        symbol: &str,
    ) -> Result<Vec<ListedSecurity>, SecmasterError>;
    fn create_listing(&self, new: &NewListing) -> Result<ListedSecurity, SecmasterError>;
    fn update_listing(&self, id: i64, diff: &ListingDiff) -> Result<(), SecmasterError>;

    /// Pairs of listings for the same exchange and symbol whose windows overlap.
    fn window_conflicts(&self) -> Result<Vec<(ListedSecurity, ListedSecurity)>, SecmasterError>;
}
