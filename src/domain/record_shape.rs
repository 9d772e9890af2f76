//! Vendor feed shapes.
//!
//! A feed's first line decides its [`RecordShape`]; each shape has a fixed
//! column layout, so rows are parsed by position once the shape is known.

use crate::domain::error::SecmasterError;
use crate::domain::record::ExternalRecord;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// Full listing rows including an instrument type column.
    Listing,
    /// Listing rows without a type; the batch default type applies.
    Untyped,
    /// Symbol, name, exchange and window only.
    Compact,
}

const LISTING_COLUMNS: &[&str] = &[
    "symbol",
    "name",
    "exchange",
    "sub_exchange",
    "type",
    "start_date",
    "end_date",
    "vendor_id",
];

const UNTYPED_COLUMNS: &[&str] = &[
    "symbol",
    "name",
    "exchange",
    "sub_exchange",
    "start_date",
    "end_date",
    "vendor_id",
];

const COMPACT_COLUMNS: &[&str] = &["symbol", "name", "exchange", "start_date", "end_date"];

impl RecordShape {
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RecordShape::Listing => LISTING_COLUMNS,
            RecordShape::Untyped => UNTYPED_COLUMNS,
            RecordShape::Compact => COMPACT_COLUMNS,
        }
    }

    /// Builds a record from the fields of one data row.
    pub fn parse_row(&self, line: u64, fields: &[&str]) -> Result<ExternalRecord, SecmasterError> {
        let expected = self.columns().len();
        if fields.len() != expected {
            return Err(SecmasterError::RecordParse {
                line,
                reason: format!("expected {} fields, found {}", expected, fields.len()),
            });
        }
        let field = |i: usize| fields[i].trim();
        let bad = |reason: String| SecmasterError::RecordParse { line, reason };

        let (sub_exchange, type_hint, start, end, vendor) = match self {
            RecordShape::Listing => (field(3), optional(field(4)), field(5), field(6), field(7)),
            RecordShape::Untyped => (field(3), None, field(4), field(5), field(6)),
            RecordShape::Compact => ("", None, field(3), field(4), ""),
        };

        let start_date = parse_date(start).map_err(|e| bad(format!("start_date: {e}")))?;
        let end_date = match optional(end) {
            Some(s) => Some(parse_date(s).map_err(|e| bad(format!("end_date: {e}")))?),
            None => None,
        };
        let vendor_id = match optional(vendor) {
            Some(s) => Some(
                s.parse::<i64>()
                    .map_err(|e| bad(format!("vendor_id {s:?}: {e}")))?,
            ),
            None => None,
        };

        Ok(ExternalRecord {
            line,
            symbol: field(0).to_string(),
            name: field(1).to_string(),
            exchange_code: field(2).to_string(),
            sub_exchange_code: sub_exchange.to_string(),
            instrument_type_hint: type_hint.map(str::to_string),
            start_date,
            end_date,
            vendor_id,
        })
    }
}

fn optional(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value) }
}

/// Picks the shape whose header matches the first line of a feed.
pub fn classify(first_line: &str) -> Option<RecordShape> {
    let header: Vec<String> = first_line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|col| col.trim().trim_matches('"').to_lowercase())
        .collect();

    [RecordShape::Listing, RecordShape::Untyped, RecordShape::Compact]
        .into_iter()
        .find(|shape| header.iter().map(String::as_str).eq(shape.columns().iter().copied()))
}

/// Accepts `YYYYMMDD` and `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    let format = if value.contains('-') { "%Y-%m-%d" } else { "%Y%m%d" };
    NaiveDate::parse_from_str(value, format).map_err(|e| format!("invalid date {value:?}: {e}"))
}
