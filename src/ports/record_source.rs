//! Vendor record source port.

use crate::domain::error::SecmasterError;
use crate::domain::record::ExternalRecord;

pub trait RecordSource {
    /// Reads the whole feed. The outer error means the feed as a whole is
    /// unusable; a row that fails to parse is reported in place so the rest
    /// of the batch still runs.
    fn records(&self) -> Result<Vec<Result<ExternalRecord, SecmasterError>>, SecmasterError>;
}
