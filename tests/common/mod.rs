#![allow(dead_code)]

use chrono::NaiveDate;
use secmaster::domain::error::SecmasterError;
use secmaster::domain::record::ExternalRecord;
use secmaster::domain::resolver::Candidate;
use secmaster::domain::security::{
    CanonicalSecurity, Exchange, InstrumentType, ListedSecurity, ListingDiff, ListingWindow,
    NewListing, NewSecurity, SecurityDiff, search_key,
};
use secmaster::ports::disambiguation_port::DisambiguationPolicy;
use secmaster::ports::registry_port::RegistryPort;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub exchanges: Vec<Exchange>,
    pub types: Vec<InstrumentType>,
    pub securities: Vec<CanonicalSecurity>,
    pub listings: Vec<ListedSecurity>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory registry with snapshot transactions, a write counter and
/// injectable failures.
#[derive(Default)]
pub struct MemoryRegistry {
    state: RefCell<State>,
    snapshot: RefCell<Option<State>>,
    writes: Cell<usize>,
    fail_on: RefCell<Option<&'static str>>,
    vanish_after_lookup: Cell<Option<i64>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state.borrow().clone()
    }

    /// Persisting writes performed so far, including rolled-back ones.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.borrow().is_some()
    }

    /// Makes every later call of `op` fail with a database error.
    pub fn fail_on(&self, op: &'static str) {
        *self.fail_on.borrow_mut() = Some(op);
    }

    pub fn clear_failure(&self) {
        *self.fail_on.borrow_mut() = None;
    }

    /// Deletes listing `id` right after the next covering-listing lookup
    /// returns it, as if another writer had removed it.
    pub fn vanish_after_lookup(&self, id: i64) {
        self.vanish_after_lookup.set(Some(id));
    }

    fn check(&self, op: &str) -> Result<(), SecmasterError> {
        if *self.fail_on.borrow() == Some(op) {
            return Err(SecmasterError::DatabaseQuery {
                reason: format!("injected failure in {op}"),
            });
        }
        Ok(())
    }

    fn write(&self) {
        self.writes.set(self.writes.get() + 1);
    }

    /// Inserts a security without the uniqueness check.
    pub fn seed_security(&self, name: &str, instrument_type: &str) -> CanonicalSecurity {
        let type_id = self.get_or_create_instrument_type(instrument_type).unwrap().id;
        let mut state = self.state.borrow_mut();
        let security = CanonicalSecurity {
            id: state.next_id(),
            name: name.to_string(),
            search_key: search_key(name),
            instrument_type_id: type_id,
        };
        state.securities.push(security.clone());
        security
    }

    /// Inserts a listing without any window check.
    pub fn seed_listing(
        &self,
        security: &CanonicalSecurity,
        exchange: &str,
        symbol: &str,
        start: &str,
        end: Option<&str>,
    ) -> ListedSecurity {
        let exchange_id = self.get_or_create_exchange(exchange).unwrap().id;
        let mut state = self.state.borrow_mut();
        let listing = ListedSecurity {
            id: state.next_id(),
            security_id: security.id,
            exchange_id,
            symbol: symbol.to_string(),
            start_date: date(start),
            end_date: end.map(date),
            vendor_id: None,
        };
        state.listings.push(listing.clone());
        listing
    }

    pub fn security(&self, id: i64) -> Option<CanonicalSecurity> {
        self.state
            .borrow()
            .securities
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn listing(&self, id: i64) -> Option<ListedSecurity> {
        self.state
            .borrow()
            .listings
            .iter()
            .find(|l| l.id == id)
            .cloned()
    }
}

impl RegistryPort for MemoryRegistry {
    fn begin(&self) -> Result<(), SecmasterError> {
        self.check("begin")?;
        if self.in_transaction() {
            return Err(SecmasterError::Database {
                reason: "transaction already open".into(),
            });
        }
        *self.snapshot.borrow_mut() = Some(self.state());
        Ok(())
    }

    fn commit(&self) -> Result<(), SecmasterError> {
        self.check("commit")?;
        self.snapshot
            .borrow_mut()
            .take()
            .map(|_| ())
            .ok_or_else(|| SecmasterError::Database {
                reason: "commit without transaction".into(),
            })
    }

    fn rollback(&self) -> Result<(), SecmasterError> {
        if let Some(snapshot) = self.snapshot.borrow_mut().take() {
            *self.state.borrow_mut() = snapshot;
        }
        Ok(())
    }

    fn find_exchange(&self, label: &str) -> Result<Option<Exchange>, SecmasterError> {
        Ok(self
            .state
            .borrow()
            .exchanges
            .iter()
            .find(|e| e.label == label)
            .cloned())
    }

    fn get_or_create_exchange(&self, label: &str) -> Result<Exchange, SecmasterError> {
        if let Some(exchange) = self.find_exchange(label)? {
            return Ok(exchange);
        }
        self.check("get_or_create_exchange")?;
        self.write();
        let mut state = self.state.borrow_mut();
        let exchange = Exchange {
            id: state.next_id(),
            label: label.to_string(),
        };
        state.exchanges.push(exchange.clone());
        Ok(exchange)
    }

    fn find_instrument_type(&self, name: &str) -> Result<Option<InstrumentType>, SecmasterError> {
        Ok(self
            .state
            .borrow()
            .types
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    fn get_instrument_type(&self, id: i64) -> Result<Option<InstrumentType>, SecmasterError> {
        Ok(self
            .state
            .borrow()
            .types
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    fn get_or_create_instrument_type(&self, name: &str) -> Result<InstrumentType, SecmasterError> {
        if let Some(instrument_type) = self.find_instrument_type(name)? {
            return Ok(instrument_type);
        }
        self.write();
        let mut state = self.state.borrow_mut();
        let instrument_type = InstrumentType {
            id: state.next_id(),
            name: name.to_string(),
        };
        state.types.push(instrument_type.clone());
        Ok(instrument_type)
    }

    fn find_exact(
        &self,
        name: &str,
        instrument_type_id: i64,
    ) -> Result<Vec<CanonicalSecurity>, SecmasterError> {
        let key = search_key(name);
        Ok(self
            .state
            .borrow()
            .securities
            .iter()
            .filter(|s| s.search_key == key && s.instrument_type_id == instrument_type_id)
            .cloned()
            .collect())
    }

    fn get_entity(&self, id: i64) -> Result<Option<CanonicalSecurity>, SecmasterError> {
        Ok(self.security(id))
    }

    fn security_names(&self, instrument_type_id: i64) -> Result<Vec<String>, SecmasterError> {
        let mut names: Vec<String> = self
            .state
            .borrow()
            .securities
            .iter()
            .filter(|s| s.instrument_type_id == instrument_type_id)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn create_entity(&self, new: &NewSecurity) -> Result<CanonicalSecurity, SecmasterError> {
        self.check("create_entity")?;
        self.write();
        let mut state = self.state.borrow_mut();
        let security = CanonicalSecurity {
            id: state.next_id(),
            name: new.name.clone(),
            search_key: search_key(&new.name),
            instrument_type_id: new.instrument_type_id,
        };
        state.securities.push(security.clone());
        Ok(security)
    }

    fn update_entity(&self, id: i64, diff: &SecurityDiff) -> Result<(), SecmasterError> {
        self.check("update_entity")?;
        self.write();
        let mut state = self.state.borrow_mut();
        let security = state
            .securities
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SecmasterError::DatabaseQuery {
                reason: format!("security {id} vanished before update"),
            })?;
        security.name = diff.name.clone();
        security.search_key = search_key(&diff.name);
        Ok(())
    }

    fn find_overlapping_listings(
        &self,
        exchange_id: i64,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        let found: Vec<ListedSecurity> = self
            .state
            .borrow()
            .listings
            .iter()
            .filter(|l| l.exchange_id == exchange_id && l.symbol == symbol && l.covers(date))
            .cloned()
            .collect();
        if let Some(id) = self.vanish_after_lookup.take() {
            self.state.borrow_mut().listings.retain(|l| l.id != id);
        }
        Ok(found)
    }

    fn find_listings_in_window(
        &self,
        exchange_id: i64,
        symbol: &str,
        window: &ListingWindow,
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        Ok(self
            .state
            .borrow()
            .listings
            .iter()
            .filter(|l| {
                l.exchange_id == exchange_id && l.symbol == symbol && l.window().overlaps(window)
            })
            .cloned()
            .collect())
    }

    fn listings_for(
        &self,
        exchange_id: i64,
        symbol: &str,
    ) -> Result<Vec<ListedSecurity>, SecmasterError> {
        let mut listings: Vec<ListedSecurity> = self
            .state
            .borrow()
            .listings
            .iter()
            .filter(|l| l.exchange_id == exchange_id && l.symbol == symbol)
            .cloned()
            .collect();
        listings.sort_by_key(|l| (l.start_date, l.id));
        Ok(listings)
    }

    fn create_listing(&self, new: &NewListing) -> Result<ListedSecurity, SecmasterError> {
        self.check("create_listing")?;
        self.write();
        let mut state = self.state.borrow_mut();
        let listing = ListedSecurity {
            id: state.next_id(),
            security_id: new.security_id,
            exchange_id: new.exchange_id,
            symbol: new.symbol.clone(),
            start_date: new.start_date,
            end_date: new.end_date,
            vendor_id: new.vendor_id,
        };
        state.listings.push(listing.clone());
        Ok(listing)
    }

    fn update_listing(&self, id: i64, diff: &ListingDiff) -> Result<(), SecmasterError> {
        self.check("update_listing")?;
        self.write();
        let mut state = self.state.borrow_mut();
        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| SecmasterError::DatabaseQuery {
                reason: format!("listing {id} vanished before update"),
            })?;
        *listing = diff.apply_to(listing);
        Ok(())
    }

    fn window_conflicts(&self) -> Result<Vec<(ListedSecurity, ListedSecurity)>, SecmasterError> {
        let state = self.state.borrow();
        let mut conflicts = Vec::new();
        for (i, a) in state.listings.iter().enumerate() {
            for b in &state.listings[i + 1..] {
                if a.exchange_id == b.exchange_id
                    && a.symbol == b.symbol
                    && a.window().overlaps(&b.window())
                {
                    conflicts.push((a.clone(), b.clone()));
                }
            }
        }
        Ok(conflicts)
    }
}

/// Policy with canned answers that counts how often it was consulted.
pub struct ScriptedPolicy {
    pub confirm: bool,
    pub choice: Option<usize>,
    pub skip: bool,
    calls: Rc<Cell<usize>>,
}

impl ScriptedPolicy {
    pub fn new(confirm: bool, choice: Option<usize>, skip: bool) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Self {
                confirm,
                choice,
                skip,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }
}

impl DisambiguationPolicy for ScriptedPolicy {
    fn confirm(&mut self, _query: &str, _candidate: &Candidate) -> bool {
        self.calls.set(self.calls.get() + 1);
        self.confirm
    }

    fn choose(&mut self, _query: &str, _candidates: &[Candidate]) -> Option<usize> {
        self.calls.set(self.calls.get() + 1);
        self.choice
    }

    fn skip_declined(&self) -> bool {
        self.skip
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_record(symbol: &str, name: &str, exchange: &str, start: &str) -> ExternalRecord {
    ExternalRecord {
        line: 2,
        symbol: symbol.to_string(),
        name: name.to_string(),
        exchange_code: exchange.to_string(),
        sub_exchange_code: String::new(),
        instrument_type_hint: None,
        start_date: date(start),
        end_date: None,
        vendor_id: None,
    }
}

/// Asserts that no (exchange, symbol) pair has overlapping windows or more
/// than one open window.
pub fn assert_windows_disjoint(registry: &MemoryRegistry) {
    assert!(
        registry.window_conflicts().unwrap().is_empty(),
        "overlapping windows: {:?}",
        registry.window_conflicts().unwrap()
    );
    let state = registry.state();
    for listing in &state.listings {
        let open = state
            .listings
            .iter()
            .filter(|l| {
                l.exchange_id == listing.exchange_id
                    && l.symbol == listing.symbol
                    && l.end_date.is_none()
            })
            .count();
        assert!(open <= 1, "{} open windows for {}", open, listing.symbol);
    }
}
