//! Static vendor code tables: exchange code pairs to canonical exchange
//! labels, and instrument type hints to canonical type names.

use crate::domain::error::SecmasterError;
use crate::ports::config_port::ConfigPort;
use std::collections::HashMap;

/// `(exchange code, sub-exchange code, canonical label)`. An empty
/// sub-exchange code matches any sub-exchange of that code.
const EXCHANGES: &[(&str, &str, &str)] = &[
    ("NYSE", "", "NYSE"),
    ("NASDAQ", "NGS", "NASDAQ-GSM"),
    ("NASDAQ", "NGM", "NASDAQ-GM"),
    ("NASDAQ", "NCM", "NASDAQ-CM"),
    ("NASDAQ", "NSD", "NASDAQ-GSM"),
    ("NYSE MKT", "", "NYSE-AMERICAN"),
    ("AMEX", "", "NYSE-AMERICAN"),
    ("NYSE ARCA", "", "NYSE-ARCA"),
    ("ARCA", "", "NYSE-ARCA"),
    ("BATS", "", "CBOE-BZX"),
    ("OTC", "OTCQX", "OTCQX"),
    ("OTC", "OTCQB", "OTCQB"),
    ("OTC", "PINK", "OTC-PINK"),
    ("OTC", "GREY", "OTC-GREY"),
    ("INDEX", "", "INDEX"),
];

const INSTRUMENT_TYPES: &[(&str, &str)] = &[
    ("EQUITY", "Equity"),
    ("COMMON STOCK", "Equity"),
    ("CS", "Equity"),
    ("ADR", "Equity"),
    ("PREFERRED STOCK", "Equity"),
    ("REIT", "Equity"),
    ("FUND", "Fund"),
    ("ETF", "Fund"),
    ("ETN", "Fund"),
    ("MUTUAL FUND", "Fund"),
    ("CLOSED-END FUND", "Fund"),
    ("INDEX", "Index"),
];

fn code_key(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Pure lookup tables. Lookups never fail; absence is a normal answer.
#[derive(Debug, Clone, Default)]
pub struct CodeMap {
    exchanges: HashMap<(String, String), String>,
    instrument_types: HashMap<String, String>,
}

impl CodeMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut map = Self::empty();
        for (code, sub, label) in EXCHANGES {
            map.insert_exchange(code, sub, label);
        }
        for (hint, name) in INSTRUMENT_TYPES {
            map.insert_instrument_type(hint, name);
        }
        map
    }

    /// Built-in tables extended by the `[exchange_map]` and `[type_map]`
    /// config sections.
    ///
    /// `[exchange_map]` keys are `CODE/SUB` or plain `CODE` (any sub-code).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SecmasterError> {
        let mut map = Self::builtin();

        for (key, label) in config.section("exchange_map") {
            let (code, sub) = key.split_once('/').unwrap_or((key.as_str(), ""));
            if code.trim().is_empty() || label.trim().is_empty() {
                return Err(SecmasterError::ConfigInvalid {
                    section: "exchange_map".into(),
                    key,
                    reason: "expected CODE[/SUB] = LABEL".into(),
                });
            }
            map.insert_exchange(code, sub, label.trim());
        }

        for (hint, name) in config.section("type_map") {
            if name.trim().is_empty() {
                return Err(SecmasterError::ConfigInvalid {
                    section: "type_map".into(),
                    key: hint,
                    reason: "type name is empty".into(),
                });
            }
            map.insert_instrument_type(&hint, name.trim());
        }

        Ok(map)
    }

    pub fn insert_exchange(&mut self, code: &str, sub_code: &str, label: &str) {
        self.exchanges
            .insert((code_key(code), code_key(sub_code)), label.to_string());
    }

    pub fn insert_instrument_type(&mut self, hint: &str, name: &str) {
        self.instrument_types
            .insert(code_key(hint), name.to_string());
    }

    /// Canonical exchange label for a vendor code pair. An exact pair wins
    /// over a code-wide entry.
    pub fn exchange_label(&self, code: &str, sub_code: &str) -> Option<&str> {
        let code = code_key(code);
        self.exchanges
            .get(&(code.clone(), code_key(sub_code)))
            .or_else(|| self.exchanges.get(&(code, String::new())))
            .map(String::as_str)
    }

    pub fn instrument_type(&self, hint: &str) -> Option<&str> {
        self.instrument_types
            .get(&code_key(hint))
            .map(String::as_str)
    }

    /// Canonical type for a batch default: a mapped hint, or a name that is
    /// already one of the table's type names.
    pub fn canonical_type(&self, name: &str) -> Option<&str> {
        self.instrument_type(name).or_else(|| {
            let name = name.trim();
            self.instrument_types
                .values()
                .find(|canonical| canonical.as_str() == name)
                .map(String::as_str)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pair_maps() {
        let map = CodeMap::builtin();
        assert_eq!(map.exchange_label("NASDAQ", "NGS"), Some("NASDAQ-GSM"));
        assert_eq!(map.exchange_label("otc", "otcqx"), Some("OTCQX"));
    }

    #[test]
    fn code_wide_entry_matches_any_sub_code() {
        let map = CodeMap::builtin();
        assert_eq!(map.exchange_label("NYSE", ""), Some("NYSE"));
        assert_eq!(map.exchange_label("NYSE", "N"), Some("NYSE"));
    }

    #[test]
    fn unknown_child_of_otc_is_unmapped() {
        let map = CodeMap::builtin();
        assert_eq!(map.exchange_label("OTC", "Unrecognized-Child"), None);
        assert_eq!(map.exchange_label("OTC", ""), None);
        assert_eq!(map.exchange_label("LSE", ""), None);
    }

    #[test]
    fn nasdaq_requires_a_tier() {
        let map = CodeMap::builtin();
        assert_eq!(map.exchange_label("NASDAQ", ""), None);
    }

    #[test]
    fn instrument_type_hints() {
        let map = CodeMap::builtin();
        assert_eq!(map.instrument_type("Common Stock"), Some("Equity"));
        assert_eq!(map.instrument_type("etf"), Some("Fund"));
        assert_eq!(map.instrument_type("Index"), Some("Index"));
        assert_eq!(map.instrument_type("Warrant"), None);
    }

    #[test]
    fn default_types_resolve_like_hints() {
        let mut map = CodeMap::builtin();
        assert_eq!(map.canonical_type("ETF"), Some("Fund"));
        assert_eq!(map.canonical_type(" equity "), Some("Equity"));
        assert_eq!(map.canonical_type("Equtiy"), None);

        map.insert_instrument_type("GOVT", "Government Bond");
        assert_eq!(map.canonical_type("Government Bond"), Some("Government Bond"));
    }

    #[test]
    fn empty_map_knows_nothing() {
        let map = CodeMap::empty();
        assert_eq!(map.exchange_label("NYSE", ""), None);
        assert_eq!(map.instrument_type("Equity"), None);
    }
}
