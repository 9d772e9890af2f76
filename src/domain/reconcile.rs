//! Reconciliation orchestrator.
//!
//! Drives one vendor record at a time through exchange mapping, temporal
//! listing lookup and candidate resolution, and reports a single
//! [`Outcome`] per record. Each record's writes run in their own registry
//! transaction. Record-level errors never abort a batch: they roll the
//! record back and surface as a skip or `failed` outcome.

use crate::domain::code_map::CodeMap;
use crate::domain::error::SecmasterError;
use crate::domain::listing::{self, ListingLookup, NameCheck};
use crate::domain::record::ExternalRecord;
use crate::domain::resolver::{CandidateResolver, Resolution, describe};
use crate::domain::security::{
    CanonicalSecurity, Exchange, InstrumentType, ListedSecurity, ListingDiff, ListingWindow,
    NewListing, NewSecurity, SecurityDiff,
};
use crate::domain::settings::ReconcileSettings;
use crate::ports::disambiguation_port::DisambiguationPolicy;
use crate::ports::registry_port::RegistryPort;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Created,
    Updated,
    /// Matched an existing listing with nothing to change.
    Unchanged,
    SkippedAmbiguous,
    SkippedUnmapped,
    SkippedIntegrityViolation,
    SkippedInvalid,
    /// A persistence error rolled the record back.
    Failed,
}

impl Outcome {
    pub const ALL: [Outcome; 8] = [
        Outcome::Created,
        Outcome::Updated,
        Outcome::Unchanged,
        Outcome::SkippedAmbiguous,
        Outcome::SkippedUnmapped,
        Outcome::SkippedIntegrityViolation,
        Outcome::SkippedInvalid,
        Outcome::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
            Outcome::SkippedAmbiguous => "skipped_ambiguous",
            Outcome::SkippedUnmapped => "skipped_unmapped",
            Outcome::SkippedIntegrityViolation => "skipped_integrity_violation",
            Outcome::SkippedInvalid => "skipped_invalid",
            Outcome::Failed => "failed",
        }
    }

    /// Outcomes that leave the registry untouched.
    pub fn is_skip(&self) -> bool {
        !matches!(self, Outcome::Created | Outcome::Updated | Outcome::Unchanged)
    }

    fn for_error(err: &SecmasterError) -> Self {
        match err {
            SecmasterError::IntegrityViolation { .. } => Outcome::SkippedIntegrityViolation,
            SecmasterError::Ambiguity { .. } => Outcome::SkippedAmbiguous,
            SecmasterError::NotFound { .. } => Outcome::SkippedUnmapped,
            SecmasterError::Validation { .. } | SecmasterError::RecordParse { .. } => {
                Outcome::SkippedInvalid
            }
            _ => Outcome::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordResult {
    pub entity_id: Option<i64>,
    pub listing_id: Option<i64>,
    pub outcome: Outcome,
}

impl RecordResult {
    fn skipped(outcome: Outcome) -> Self {
        Self {
            entity_id: None,
            listing_id: None,
            outcome,
        }
    }
}

/// Per-record results of a batch, in input order, with outcome tallies.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub results: Vec<RecordResult>,
    counts: BTreeMap<Outcome, usize>,
}

impl BatchSummary {
    pub fn push(&mut self, result: RecordResult) {
        *self.counts.entry(result.outcome).or_default() += 1;
        self.results.push(result);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// `(outcome, count)` for every outcome seen, in declaration order.
    pub fn counts(&self) -> impl Iterator<Item = (Outcome, usize)> + '_ {
        self.counts.iter().map(|(o, n)| (*o, *n))
    }
}

/// Exchange and instrument type rows seen during a run.
///
/// Entries may refer to rows created inside a transaction that was later
/// rolled back, so the reconciler clears the cache on every rollback.
#[derive(Debug, Default)]
pub struct LookupCache {
    exchanges: HashMap<String, Exchange>,
    types_by_name: HashMap<String, InstrumentType>,
    types_by_id: HashMap<i64, InstrumentType>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange(
        &mut self,
        registry: &dyn RegistryPort,
        label: &str,
    ) -> Result<Exchange, SecmasterError> {
        if let Some(exchange) = self.exchanges.get(label) {
            return Ok(exchange.clone());
        }
        let exchange = registry.get_or_create_exchange(label)?;
        self.exchanges.insert(label.to_string(), exchange.clone());
        Ok(exchange)
    }

    pub fn instrument_type(
        &mut self,
        registry: &dyn RegistryPort,
        name: &str,
    ) -> Result<InstrumentType, SecmasterError> {
        if let Some(instrument_type) = self.types_by_name.get(name) {
            return Ok(instrument_type.clone());
        }
        let instrument_type = registry.get_or_create_instrument_type(name)?;
        self.remember_type(name, &instrument_type);
        Ok(instrument_type)
    }

    pub fn instrument_type_by_id(
        &mut self,
        registry: &dyn RegistryPort,
        id: i64,
    ) -> Result<InstrumentType, SecmasterError> {
        if let Some(instrument_type) = self.types_by_id.get(&id) {
            return Ok(instrument_type.clone());
        }
        let instrument_type =
            registry
                .get_instrument_type(id)?
                .ok_or_else(|| SecmasterError::IntegrityViolation {
                    subject: format!("instrument type {id}"),
                    reason: "referenced by a security but missing".into(),
                })?;
        let name = instrument_type.name.clone();
        self.remember_type(&name, &instrument_type);
        Ok(instrument_type)
    }

    fn remember_type(&mut self, name: &str, instrument_type: &InstrumentType) {
        self.types_by_name
            .insert(name.to_string(), instrument_type.clone());
        self.types_by_id
            .insert(instrument_type.id, instrument_type.clone());
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
        self.types_by_name.clear();
        self.types_by_id.clear();
    }
}

/// Name index updates held back until the record's transaction commits.
#[derive(Debug)]
enum IndexChange {
    Add {
        instrument_type: String,
        name: String,
    },
    Rename {
        instrument_type: String,
        old_name: String,
        new_name: String,
    },
}

pub struct Reconciler<'a> {
    registry: &'a dyn RegistryPort,
    code_map: &'a CodeMap,
    policy: Box<dyn DisambiguationPolicy + 'a>,
    settings: ReconcileSettings,
    resolver: CandidateResolver,
    cache: LookupCache,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        registry: &'a dyn RegistryPort,
        code_map: &'a CodeMap,
        policy: Box<dyn DisambiguationPolicy + 'a>,
        settings: ReconcileSettings,
    ) -> Self {
        let resolver = CandidateResolver::new(settings.threshold, settings.separation_margin);
        Self {
            registry,
            code_map,
            policy,
            settings,
            resolver,
            cache: LookupCache::new(),
            dry_run: false,
        }
    }

    /// In dry-run mode every record is rolled back after reconciliation;
    /// outcomes are reported as if the writes had been kept.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run<I>(&mut self, records: I) -> BatchSummary
    where
        I: IntoIterator<Item = Result<ExternalRecord, SecmasterError>>,
    {
        let mut summary = BatchSummary::default();
        for record in records {
            let result = match record {
                Ok(record) => self.process(&record),
                Err(e) => {
                    warn!(error = %e, outcome = %Outcome::SkippedInvalid, "unreadable record");
                    RecordResult::skipped(Outcome::SkippedInvalid)
                }
            };
            summary.push(result);
        }
        info!(
            total = summary.total(),
            created = summary.count(Outcome::Created),
            updated = summary.count(Outcome::Updated),
            unchanged = summary.count(Outcome::Unchanged),
            failed = summary.count(Outcome::Failed),
            dry_run = self.dry_run,
            "batch reconciled"
        );
        summary
    }

    pub fn process(&mut self, record: &ExternalRecord) -> RecordResult {
        let span = info_span!(
            "record",
            line = record.line,
            symbol = %record.symbol,
            exchange = %record.exchange_code
        );
        let _entered = span.enter();

        if let Err(e) = record.validate() {
            warn!(error = %e, outcome = %Outcome::SkippedInvalid, "invalid record");
            return RecordResult::skipped(Outcome::SkippedInvalid);
        }

        let Some(label) = self
            .code_map
            .exchange_label(&record.exchange_code, &record.sub_exchange_code)
            .map(str::to_string)
        else {
            warn!(
                sub_exchange = %record.sub_exchange_code,
                outcome = %Outcome::SkippedUnmapped,
                "unmapped exchange code"
            );
            return RecordResult::skipped(Outcome::SkippedUnmapped);
        };

        if let Err(e) = self.registry.begin() {
            error!(error = %e, outcome = %Outcome::Failed, "could not start transaction");
            return RecordResult::skipped(Outcome::Failed);
        }

        let mut pending = Vec::new();
        let result = match self.reconcile(record, &label, &mut pending) {
            Ok(result) if self.dry_run => {
                self.abandon();
                result
            }
            Ok(result) => match self.registry.commit() {
                Ok(()) => {
                    self.apply(pending);
                    result
                }
                Err(e) => {
                    error!(error = %e, outcome = %Outcome::Failed, "commit failed");
                    self.abandon();
                    RecordResult::skipped(Outcome::Failed)
                }
            },
            Err(e) => {
                self.abandon();
                let outcome = Outcome::for_error(&e);
                if outcome == Outcome::Failed {
                    error!(error = %e, outcome = %outcome, "record rolled back");
                } else {
                    warn!(error = %e, outcome = %outcome, "record skipped");
                }
                return RecordResult::skipped(outcome);
            }
        };

        info!(
            outcome = %result.outcome,
            entity_id = ?result.entity_id,
            listing_id = ?result.listing_id,
            "record reconciled"
        );
        result
    }

    fn abandon(&mut self) {
        if let Err(e) = self.registry.rollback() {
            error!(error = %e, "rollback failed");
        }
        self.cache.clear();
    }

    fn apply(&mut self, pending: Vec<IndexChange>) {
        for change in pending {
            debug!(?change, "updating name index");
            match change {
                IndexChange::Add {
                    instrument_type,
                    name,
                } => self.resolver.register(&instrument_type, &name),
                IndexChange::Rename {
                    instrument_type,
                    old_name,
                    new_name,
                } => self.resolver.rename(&instrument_type, &old_name, &new_name),
            }
        }
    }

    fn reconcile(
        &mut self,
        record: &ExternalRecord,
        exchange_label: &str,
        pending: &mut Vec<IndexChange>,
    ) -> Result<RecordResult, SecmasterError> {
        let exchange = self.cache.exchange(self.registry, exchange_label)?;
        let symbol = record.listing_symbol();

        match listing::look_up(self.registry, &exchange, &symbol, record.start_date)? {
            ListingLookup::Create => self.create(record, &exchange, &symbol, None, pending),
            ListingLookup::Update(existing) => {
                self.update(record, &exchange, &symbol, existing, pending)
            }
            ListingLookup::IntegrityViolation(rows) => Err(SecmasterError::IntegrityViolation {
                subject: format!("{}:{}", exchange.label, symbol),
                reason: format!("{} listings cover {}", rows.len(), record.start_date),
            }),
        }
    }

    /// Inserts a listing for the record, resolving or creating its security.
    /// `superseded` is an existing listing of the pair that is closed the day
    /// before the record starts.
    fn create(
        &mut self,
        record: &ExternalRecord,
        exchange: &Exchange,
        symbol: &str,
        superseded: Option<ListedSecurity>,
        pending: &mut Vec<IndexChange>,
    ) -> Result<RecordResult, SecmasterError> {
        let window = record.window();
        let ignore = superseded.as_ref().map(|l| l.id);
        self.check_window(exchange, symbol, &window, ignore)?;

        let instrument_type = self.instrument_type_for(record)?;
        let security = self.resolve_or_create(record, &instrument_type, pending)?;

        if let Some(old) = superseded {
            let closed_on =
                record
                    .start_date
                    .pred_opt()
                    .ok_or_else(|| SecmasterError::Validation {
                        symbol: record.symbol.clone(),
                        reason: "start date has no predecessor".into(),
                    })?;
            self.registry.update_listing(
                old.id,
                &ListingDiff {
                    end_date: Some(Some(closed_on)),
                    ..ListingDiff::default()
                },
            )?;
            info!(listing_id = old.id, closed_on = %closed_on, "closed superseded listing");
        }

        let listing = self.registry.create_listing(&NewListing {
            security_id: security.id,
            exchange_id: exchange.id,
            symbol: symbol.to_string(),
            start_date: record.start_date,
            end_date: record.end_date,
            vendor_id: record.vendor_id,
        })?;

        Ok(RecordResult {
            entity_id: Some(security.id),
            listing_id: Some(listing.id),
            outcome: Outcome::Created,
        })
    }

    fn update(
        &mut self,
        record: &ExternalRecord,
        exchange: &Exchange,
        symbol: &str,
        existing: ListedSecurity,
        pending: &mut Vec<IndexChange>,
    ) -> Result<RecordResult, SecmasterError> {
        let security = self.registry.get_entity(existing.security_id)?.ok_or_else(|| {
            SecmasterError::IntegrityViolation {
                subject: format!("listing {}", existing.id),
                reason: format!("bound to missing security {}", existing.security_id),
            }
        })?;

        let mut diff = listing::listing_diff(&existing, record);
        let mut entity_id = security.id;
        let mut renamed = false;

        match listing::compare_names(&security.name, &record.name, self.settings.threshold) {
            NameCheck::Same => {}
            NameCheck::Drifted { score } => {
                match self.rename_or_rebind(record, &security, score, pending)? {
                    Some(owner) => {
                        diff.security_id = Some(owner);
                        entity_id = owner;
                    }
                    None => renamed = true,
                }
            }
            NameCheck::Distinct { score } => {
                warn!(
                    listing_id = existing.id,
                    existing_name = %security.name,
                    incoming_name = %record.name,
                    score,
                    threshold = self.settings.threshold,
                    "name mismatch, treating record as a new instrument"
                );
                if existing.start_date >= record.start_date {
                    return Err(SecmasterError::Ambiguity {
                        query: record.name.clone(),
                        reason: format!(
                            "listing {} of {} starts {} and cannot be split",
                            existing.id, security.name, existing.start_date
                        ),
                    });
                }
                return self.create(record, exchange, symbol, Some(existing), pending);
            }
        }

        if diff.touches_window() {
            let after = diff.apply_to(&existing).window();
            self.check_window(exchange, symbol, &after, Some(existing.id))?;
        }

        if !diff.is_empty() {
            self.registry.update_listing(existing.id, &diff)?;
        }

        let outcome = if renamed || !diff.is_empty() {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        };
        Ok(RecordResult {
            entity_id: Some(entity_id),
            listing_id: Some(existing.id),
            outcome,
        })
    }

    /// Applies a confirmed name change. Renames the security unless another
    /// security of its type already owns the new name, in which case that
    /// owner's id is returned for the listing to be rebound to.
    fn rename_or_rebind(
        &mut self,
        record: &ExternalRecord,
        security: &CanonicalSecurity,
        score: f64,
        pending: &mut Vec<IndexChange>,
    ) -> Result<Option<i64>, SecmasterError> {
        let instrument_type = self
            .cache
            .instrument_type_by_id(self.registry, security.instrument_type_id)?;
        let new_name = record.name.trim().to_string();

        if let Some(owner) = self
            .resolver
            .resolve_exact(self.registry, &new_name, &instrument_type)?
        {
            info!(
                from_security = security.id,
                to_security = owner.id,
                name = %owner.name,
                score,
                "rebinding listing to existing security"
            );
            return Ok(Some(owner.id));
        }

        self.registry.update_entity(
            security.id,
            &SecurityDiff {
                name: new_name.clone(),
            },
        )?;
        info!(
            security_id = security.id,
            old_name = %security.name,
            new_name = %new_name,
            score,
            "renamed security"
        );
        pending.push(IndexChange::Rename {
            instrument_type: instrument_type.name,
            old_name: security.name.clone(),
            new_name,
        });
        Ok(None)
    }

    fn check_window(
        &self,
        exchange: &Exchange,
        symbol: &str,
        window: &ListingWindow,
        ignore: Option<i64>,
    ) -> Result<(), SecmasterError> {
        let conflicts =
            listing::conflicting_listings(self.registry, exchange.id, symbol, window, ignore)?;
        if conflicts.is_empty() {
            return Ok(());
        }
        for conflict in &conflicts {
            error!(
                listing_id = conflict.id,
                security_id = conflict.security_id,
                window = %conflict.window(),
                incoming = %window,
                "listing windows would overlap"
            );
        }
        Err(SecmasterError::IntegrityViolation {
            subject: format!("{}:{}", exchange.label, symbol),
            reason: format!(
                "window {} overlaps {} existing listing(s)",
                window,
                conflicts.len()
            ),
        })
    }

    fn instrument_type_for(
        &mut self,
        record: &ExternalRecord,
    ) -> Result<InstrumentType, SecmasterError> {
        let name = match record.instrument_type_hint.as_deref() {
            Some(hint) => self.code_map.instrument_type(hint),
            None => self.code_map.canonical_type(&self.settings.default_type),
        }
        .ok_or_else(|| SecmasterError::NotFound {
            kind: "instrument type".into(),
            code: record
                .instrument_type_hint
                .clone()
                .unwrap_or_else(|| self.settings.default_type.clone()),
        })?
        .to_string();
        self.cache.instrument_type(self.registry, &name)
    }

    fn resolve_or_create(
        &mut self,
        record: &ExternalRecord,
        instrument_type: &InstrumentType,
        pending: &mut Vec<IndexChange>,
    ) -> Result<CanonicalSecurity, SecmasterError> {
        if let Some(security) =
            self.resolver
                .resolve_exact(self.registry, &record.name, instrument_type)?
        {
            return Ok(security);
        }

        match self.resolver.resolve_approximate(
            self.registry,
            self.policy.as_mut(),
            &record.name,
            instrument_type,
        )? {
            Resolution::Matched(candidate) => Ok(candidate.security),
            Resolution::NoCandidate => {
                let security = self.registry.create_entity(&NewSecurity {
                    name: record.name.trim().to_string(),
                    instrument_type_id: instrument_type.id,
                })?;
                info!(
                    security_id = security.id,
                    name = %security.name,
                    instrument_type = %instrument_type.name,
                    "created security"
                );
                pending.push(IndexChange::Add {
                    instrument_type: instrument_type.name.clone(),
                    name: security.name.clone(),
                });
                Ok(security)
            }
            Resolution::Ambiguous(candidates) => Err(SecmasterError::Ambiguity {
                query: record.name.clone(),
                reason: format!("unresolved between {}", describe(&candidates)),
            }),
        }
    }
}
