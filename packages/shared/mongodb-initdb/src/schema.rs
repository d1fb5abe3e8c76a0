//! Canonical schema table and the operations that materialize it.
//!
//! A [`SchemaTable`] maps each collection name to its `$jsonSchema` validator
//! and index list, plus the counter documents to seed. [`SchemaInitializer`]
//! turns those declarations into server objects, one operation at a time,
//! honouring the [`OnExisting`] policy carried by the [`MigrationContext`].

use std::collections::HashSet;

use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{
        Collation, CollationStrength, CreateCollectionOptions, IndexOptions, UpdateOptions,
        ValidationAction, ValidationLevel,
    },
    results::CollectionSpecification,
    Database, IndexModel,
};
use serde::Serialize;

use crate::{is_duplicate_key, InitError, MigrationContext, OnExisting, Result};

/// Locale used for case-insensitive collations
pub const COLLATION_LOCALE: &str = "en";

/// A single index declaration
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    name: String,
    keys: Document,
    unique: bool,
    case_insensitive: bool,
}

impl IndexSpec {
    /// Declare an index over `keys`. The name follows the server's default
    /// naming scheme (`field_1_other_-1`) so indexes created by older tooling
    /// are recognized.
    pub fn new(keys: Document) -> Self {
        let name = keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction_suffix(direction)))
            .collect::<Vec<_>>()
            .join("_");
        Self {
            name,
            keys,
            unique: false,
            case_insensitive: false,
        }
    }

    /// Declare a unique index over `keys`
    pub fn unique(keys: Document) -> Self {
        Self { unique: true, ..Self::new(keys) }
    }

    /// Compare string keys with a primary-strength `en` collation, so values
    /// differing only in letter case collide
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &Document {
        &self.keys
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Why the live index `live` does not enforce this declaration, if it doesn't
    pub fn mismatch(&self, live: &IndexModel) -> Option<String> {
        if !same_keys(&self.keys, &live.keys) {
            return Some(format!("keys are {}, expected {}", live.keys, self.keys));
        }

        let options = live.options.as_ref();
        let unique = options.and_then(|o| o.unique).unwrap_or(false);
        if unique != self.unique {
            return Some(format!("unique is {}, expected {}", unique, self.unique));
        }

        let collation = options.and_then(|o| o.collation.as_ref());
        let case_insensitive = collation.map_or(false, |c| {
            c.locale == COLLATION_LOCALE && matches!(c.strength, Some(CollationStrength::Primary))
        });
        if self.case_insensitive && !case_insensitive {
            return Some(format!("collation is not {}/primary", COLLATION_LOCALE));
        }
        if !self.case_insensitive && collation.map_or(false, |c| c.locale != "simple") {
            return Some("unexpected collation".to_string());
        }

        None
    }

    /// Driver-level index model for this declaration
    pub fn to_model(&self) -> IndexModel {
        let collation = self.case_insensitive.then(|| {
            Collation::builder()
                .locale(COLLATION_LOCALE.to_string())
                .strength(CollationStrength::Primary)
                .build()
        });

        let options = IndexOptions::builder()
            .name(self.name.clone())
            .unique(self.unique)
            .collation(collation)
            .build();

        IndexModel::builder()
            .keys(self.keys.clone())
            .options(options)
            .build()
    }
}

fn same_keys(declared: &Document, live: &Document) -> bool {
    declared.len() == live.len()
        && declared
            .iter()
            .zip(live.iter())
            .all(|((f1, d1), (f2, d2))| f1 == f2 && direction_suffix(d1) == direction_suffix(d2))
}

fn direction_suffix(direction: &Bson) -> String {
    match direction {
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => (*v as i64).to_string(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A collection declaration: name, validator and indexes
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    name: String,
    json_schema: Document,
    indexes: Vec<IndexSpec>,
}

impl CollectionSpec {
    /// `json_schema` is the body of the `$jsonSchema` operator
    pub fn new(name: impl Into<String>, json_schema: Document) -> Self {
        Self {
            name: name.into(),
            json_schema,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn json_schema(&self) -> &Document {
        &self.json_schema
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// The full validator document as stored on the collection
    pub fn validator(&self) -> Document {
        doc! { "$jsonSchema": self.json_schema.clone() }
    }

    /// Fields listed as required at the top level of the schema
    pub fn required_fields(&self) -> Vec<&str> {
        self.json_schema
            .get_array("required")
            .map(|fields| fields.iter().filter_map(Bson::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `live` is exactly the declared validator
    pub fn validator_matches(&self, live: Option<&Document>) -> bool {
        live == Some(&self.validator())
    }

    fn coll_mod_command(&self) -> Document {
        doc! {
            "collMod": &self.name,
            "validator": self.validator(),
            "validationLevel": "strict",
            "validationAction": "error",
        }
    }

    fn create_options(&self) -> CreateCollectionOptions {
        CreateCollectionOptions::builder()
            .validator(self.validator())
            .validation_level(ValidationLevel::Strict)
            .validation_action(ValidationAction::Error)
            .build()
    }
}

/// A named counter and the value it starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSeed {
    pub name: String,
    pub value: i32,
}

impl CounterSeed {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self { name: name.into(), value }
    }

    fn to_document(&self) -> Document {
        doc! { "_id": &self.name, "sequence_value": self.value }
    }
}

/// Every collection a service owns, declared exactly once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaTable {
    collections: Vec<CollectionSpec>,
    counter_collection: Option<String>,
    counters: Vec<CounterSeed>,
}

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, spec: CollectionSpec) -> Self {
        self.collections.push(spec);
        self
    }

    /// Declare the counter documents to seed into `collection`
    pub fn counters(mut self, collection: impl Into<String>, seeds: Vec<CounterSeed>) -> Self {
        self.counter_collection = Some(collection.into());
        self.counters = seeds;
        self
    }

    /// Collections in declaration order
    pub fn collections(&self) -> &[CollectionSpec] {
        &self.collections
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.name()).collect()
    }

    pub fn counter_collection(&self) -> Option<&str> {
        self.counter_collection.as_deref()
    }

    pub fn counter_seeds(&self) -> &[CounterSeed] {
        &self.counters
    }

    /// Reject tables that declare something twice or seed an undeclared collection
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for spec in &self.collections {
            if !names.insert(spec.name()) {
                return Err(InitError::ConfigError {
                    message: format!("collection '{}' is declared more than once", spec.name()),
                });
            }

            let mut index_names = HashSet::new();
            for index in spec.indexes() {
                if !index_names.insert(index.name()) {
                    return Err(InitError::ConfigError {
                        message: format!(
                            "index '{}' is declared more than once on '{}'",
                            index.name(),
                            spec.name()
                        ),
                    });
                }
            }
        }

        if let Some(counter_collection) = self.counter_collection() {
            if !names.contains(counter_collection) {
                return Err(InitError::ConfigError {
                    message: format!("counter collection '{}' is not declared", counter_collection),
                });
            }
        }

        let mut seeds = HashSet::new();
        for seed in &self.counters {
            if seed.value < 0 {
                return Err(InitError::ConfigError {
                    message: format!("counter '{}' cannot start below zero", seed.name),
                });
            }
            if !seeds.insert(seed.name.as_str()) {
                return Err(InitError::ConfigError {
                    message: format!("counter '{}' is seeded more than once", seed.name),
                });
            }
        }

        Ok(())
    }
}

/// Outcome of a single initializer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    /// Existed with a different definition and was brought in line
    Updated,
    Skipped,
}

/// Applies schema declarations against the context's database
pub struct SchemaInitializer<'a> {
    database: &'a Database,
    on_existing: OnExisting,
}

impl<'a> SchemaInitializer<'a> {
    pub fn new(ctx: &'a MigrationContext) -> Self {
        Self {
            database: ctx.database(),
            on_existing: ctx.on_existing(),
        }
    }

    async fn existing_collections(&self) -> Result<HashSet<String>> {
        let names = self.database.list_collection_names(None).await?;
        Ok(names.into_iter().collect())
    }

    async fn live_collection(&self, name: &str) -> Result<Option<CollectionSpecification>> {
        let mut cursor = self
            .database
            .list_collections(doc! { "name": name }, None)
            .await?;
        Ok(cursor.try_next().await?)
    }

    async fn live_indexes(&self, collection: &str) -> Result<Vec<IndexModel>> {
        let cursor = self
            .database
            .collection::<Document>(collection)
            .list_indexes(None)
            .await?;
        let indexes: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(indexes)
    }

    /// Under [`OnExisting::Fail`], make sure none of the declared collections
    /// exist before anything is written
    pub async fn preflight(&self, table: &SchemaTable) -> Result<()> {
        if self.on_existing != OnExisting::Fail {
            return Ok(());
        }

        let existing = self.existing_collections().await?;
        if let Some(name) = table.collection_names().into_iter().find(|n| existing.contains(*n)) {
            tracing::error!(collection = name, "Database is not empty, refusing to initialize");
            return Err(InitError::AlreadyExists { kind: "collection", name: name.to_string() });
        }

        Ok(())
    }

    /// Create `spec` as a validated collection. Under [`OnExisting::Skip`] an
    /// existing collection whose validator differs gets the declared one.
    pub async fn create_collection(&self, spec: &CollectionSpec) -> Result<Applied> {
        if let Some(live) = self.live_collection(spec.name()).await? {
            if self.on_existing == OnExisting::Fail
                || spec.validator_matches(live.options.validator.as_ref())
            {
                return self.on_existing_object("collection", spec.name());
            }

            self.database.run_command(spec.coll_mod_command(), None).await?;
            tracing::warn!(collection = spec.name(), "Replaced validator on existing collection");
            return Ok(Applied::Updated);
        }

        self.database
            .create_collection(spec.name(), spec.create_options())
            .await?;

        tracing::info!(collection = spec.name(), "Created collection with validator");
        Ok(Applied::Created)
    }

    /// Create `index` on `collection`. An existing index of the same name must
    /// enforce the same constraint, otherwise [`InitError::Conflict`].
    pub async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<Applied> {
        let qualified = format!("{}.{}", collection, index.name());

        let live = self.live_indexes(collection).await?;
        if let Some(existing) = live.iter().find(|m| index_name(m) == Some(index.name())) {
            if let Some(reason) = index.mismatch(existing) {
                tracing::error!(index = %qualified, %reason, "Existing index differs from declaration");
                return Err(InitError::Conflict { kind: "index", name: qualified, reason });
            }
            return self.on_existing_object("index", &qualified);
        }

        self.database
            .collection::<Document>(collection)
            .create_index(index.to_model(), None)
            .await?;

        tracing::info!(
            collection,
            index = index.name(),
            unique = index.is_unique(),
            case_insensitive = index.is_case_insensitive(),
            "Created index"
        );
        Ok(Applied::Created)
    }

    /// Insert one counter document per seed. Existing counters keep their value.
    pub async fn seed_counters(&self, collection: &str, seeds: &[CounterSeed]) -> Result<Vec<Applied>> {
        let coll = self.database.collection::<Document>(collection);
        let mut outcomes = Vec::with_capacity(seeds.len());

        for seed in seeds {
            let outcome = match self.on_existing {
                OnExisting::Skip => {
                    let result = coll
                        .update_one(
                            doc! { "_id": &seed.name },
                            doc! { "$setOnInsert": { "sequence_value": seed.value } },
                            UpdateOptions::builder().upsert(true).build(),
                        )
                        .await?;

                    if result.upserted_id.is_some() {
                        Applied::Created
                    } else {
                        tracing::info!(counter = %seed.name, "Counter already present, keeping its value");
                        Applied::Skipped
                    }
                }
                OnExisting::Fail => match coll.insert_one(seed.to_document(), None).await {
                    Ok(_) => Applied::Created,
                    Err(e) if is_duplicate_key(&e) => {
                        return Err(InitError::AlreadyExists { kind: "counter", name: seed.name.clone() });
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            if outcome == Applied::Created {
                tracing::info!(counter = %seed.name, value = seed.value, "Seeded counter");
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Compare the live database against `table` without changing anything
    pub async fn verify(&self, table: &SchemaTable) -> Result<VerifyReport> {
        let mut cursor = self.database.list_collections(None, None).await?;
        let mut specs: Vec<CollectionSpecification> = Vec::new();
        while let Some(spec) = cursor.try_next().await? {
            specs.push(spec);
        }

        let mut report = VerifyReport::default();

        for declared in table.collections() {
            let Some(live) = specs.iter().find(|s| s.name == declared.name()) else {
                report.missing_collections.push(declared.name().to_string());
                continue;
            };

            match live.options.validator.as_ref() {
                None => report.missing_validators.push(declared.name().to_string()),
                Some(validator) if !declared.validator_matches(Some(validator)) => {
                    report.mismatched_validators.push(declared.name().to_string())
                }
                Some(_) => {}
            }

            let live_indexes = self.live_indexes(declared.name()).await?;
            for index in declared.indexes() {
                let qualified = format!("{}.{}", declared.name(), index.name());
                match live_indexes.iter().find(|m| index_name(m) == Some(index.name())) {
                    None => report.missing_indexes.push(qualified),
                    Some(live) => {
                        if let Some(reason) = index.mismatch(live) {
                            report.mismatched_indexes.push(format!("{} ({})", qualified, reason));
                        }
                    }
                }
            }
        }

        if let Some(counter_collection) = table.counter_collection() {
            if specs.iter().any(|s| s.name == counter_collection) {
                let coll = self.database.collection::<Document>(counter_collection);
                for seed in table.counter_seeds() {
                    if coll.find_one(doc! { "_id": &seed.name }, None).await?.is_none() {
                        report.missing_counters.push(seed.name.clone());
                    }
                }
            } else {
                report
                    .missing_counters
                    .extend(table.counter_seeds().iter().map(|s| s.name.clone()));
            }
        }

        Ok(report)
    }

    fn on_existing_object(&self, kind: &'static str, name: &str) -> Result<Applied> {
        match self.on_existing {
            OnExisting::Skip => {
                tracing::info!(kind, name, "Already exists, skipping");
                Ok(Applied::Skipped)
            }
            OnExisting::Fail => Err(InitError::AlreadyExists { kind, name: name.to_string() }),
        }
    }
}

fn index_name(model: &IndexModel) -> Option<&str> {
    model.options.as_ref().and_then(|o| o.name.as_deref())
}

/// Differences between a [`SchemaTable`] and the live database
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerifyReport {
    pub missing_collections: Vec<String>,
    pub missing_validators: Vec<String>,
    pub mismatched_validators: Vec<String>,
    pub missing_indexes: Vec<String>,
    pub mismatched_indexes: Vec<String>,
    pub missing_counters: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.missing_collections.is_empty()
            && self.missing_validators.is_empty()
            && self.mismatched_validators.is_empty()
            && self.missing_indexes.is_empty()
            && self.mismatched_indexes.is_empty()
            && self.missing_counters.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_ok() {
            return "Schema matches declaration".to_string();
        }

        let mut parts = Vec::new();
        if !self.missing_collections.is_empty() {
            parts.push(format!("collections: {}", self.missing_collections.join(", ")));
        }
        if !self.missing_validators.is_empty() {
            parts.push(format!("validators: {}", self.missing_validators.join(", ")));
        }
        if !self.missing_indexes.is_empty() {
            parts.push(format!("indexes: {}", self.missing_indexes.join(", ")));
        }
        if !self.missing_counters.is_empty() {
            parts.push(format!("counters: {}", self.missing_counters.join(", ")));
        }
        let mut summary = Vec::new();
        if !parts.is_empty() {
            summary.push(format!("Missing {}", parts.join("; ")));
        }

        let mut differing = Vec::new();
        if !self.mismatched_validators.is_empty() {
            differing.push(format!("validators: {}", self.mismatched_validators.join(", ")));
        }
        if !self.mismatched_indexes.is_empty() {
            differing.push(format!("indexes: {}", self.mismatched_indexes.join(", ")));
        }
        if !differing.is_empty() {
            summary.push(format!("Differing {}", differing.join("; ")));
        }

        summary.join(". ")
    }
}
