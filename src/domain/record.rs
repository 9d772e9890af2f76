//! Vendor records as they arrive from a feed.

use crate::domain::error::SecmasterError;
use crate::domain::security::ListingWindow;
use chrono::NaiveDate;

/// One vendor row. Lives only while its batch entry is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    /// Line in the source feed, for log context.
    pub line: u64,
    pub symbol: String,
    pub name: String,
    pub exchange_code: String,
    pub sub_exchange_code: String,
    pub instrument_type_hint: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub vendor_id: Option<i64>,
}

impl ExternalRecord {
    /// Ticker symbol in the form stored on listings.
    pub fn listing_symbol(&self) -> String {
        self.symbol.trim().to_uppercase()
    }

    pub fn window(&self) -> ListingWindow {
        ListingWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn validate(&self) -> Result<(), SecmasterError> {
        let invalid = |reason: &str| SecmasterError::Validation {
            symbol: self.symbol.clone(),
            reason: reason.to_string(),
        };

        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.exchange_code.trim().is_empty() {
            return Err(invalid("exchange code is empty"));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(invalid(&format!(
                    "end date {} is before start date {}",
                    end, self.start_date
                )));
            }
        }
        Ok(())
    }
}
