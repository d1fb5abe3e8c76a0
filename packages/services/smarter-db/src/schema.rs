//! The SMARTER schema table.
//!
//! Every collection the registry owns is declared here once. The bootstrap
//! steps in [`crate::migrations`] only ever read from [`smarter_schema`].

use bson::{doc, Document};
use mongodb_initdb::{CollectionSpec, CounterSeed, IndexSpec, SchemaTable};

use crate::models::Species;

pub const COUNTERS: &str = "counters";
pub const BREEDS: &str = "breeds";

fn counters_schema() -> Document {
    doc! {
        "bsonType": "object",
        "required": ["_id", "sequence_value"],
        "properties": {
            "_id": {
                "bsonType": "string",
                "description": "counter name"
            },
            "sequence_value": {
                "bsonType": "int",
                "minimum": 0,
                "description": "last sequence value"
            }
        }
    }
}

fn breeds_schema() -> Document {
    doc! {
        "bsonType": "object",
        "required": ["species", "breed"],
        "properties": {
            "species": {
                "bsonType": "string",
                "description": "species of the breed"
            },
            "breed": {
                "bsonType": "object",
                "required": ["name", "code"],
                "properties": {
                    "name": { "bsonType": "string", "description": "breed name" },
                    "code": { "bsonType": "string", "description": "breed code" }
                }
            },
            "nIndividuals": {
                "bsonType": "int",
                "minimum": 0,
                "description": "number of samples of this breed"
            }
        }
    }
}

/// Validator shared by every per-species sample collection
pub fn sample_schema() -> Document {
    doc! {
        "bsonType": "object",
        "required": ["smarterId", "originalId"],
        "properties": {
            "smarterId": {
                "bsonType": "string",
                "description": "SMARTER identifier"
            },
            "originalId": {
                "bsonType": "string",
                "description": "identifier in the source dataset"
            }
        }
    }
}

/// Declaration of the sample collection for `species`
pub fn sample_collection(species: Species) -> CollectionSpec {
    CollectionSpec::new(species.collection_name(), sample_schema())
        .with_index(IndexSpec::unique(doc! { "smarterId": 1 }))
}

/// The canonical SMARTER schema
///
/// Only the sheep sample collection is created up front. Goat samples live
/// in a collection of the same shape that the application creates on first
/// use, but both species get a counter.
pub fn smarter_schema() -> SchemaTable {
    SchemaTable::new()
        .collection(CollectionSpec::new(COUNTERS, counters_schema()))
        .collection(
            CollectionSpec::new(BREEDS, breeds_schema())
                .with_index(IndexSpec::unique(doc! { "species": 1, "breed.code": 1 }).case_insensitive())
                .with_index(IndexSpec::unique(doc! { "species": 1, "breed.name": 1 }).case_insensitive()),
        )
        .collection(sample_collection(Species::Sheep))
        .counters(
            COUNTERS,
            Species::ALL
                .iter()
                .map(|species| CounterSeed::new(species.counter_name(), 0))
                .collect(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_three_collections() {
        let table = smarter_schema();
        assert!(table.validate().is_ok());
        assert_eq!(table.collection_names(), vec!["counters", "breeds", "sampleSheep"]);
    }

    #[test]
    fn test_counter_seeds() {
        let table = smarter_schema();
        assert_eq!(table.counter_collection(), Some(COUNTERS));
        assert_eq!(
            table.counter_seeds(),
            &[CounterSeed::new("sampleSheep", 0), CounterSeed::new("sampleGoat", 0)]
        );
    }

    #[test]
    fn test_breed_indexes_are_unique_and_case_insensitive() {
        let table = smarter_schema();
        let breeds = table.get(BREEDS).unwrap();

        let names: Vec<&str> = breeds.indexes().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["species_1_breed.code_1", "species_1_breed.name_1"]);
        assert!(breeds.indexes().iter().all(|i| i.is_unique() && i.is_case_insensitive()));
        assert_eq!(breeds.required_fields(), vec!["species", "breed"]);
    }

    #[test]
    fn test_sample_collection_shape() {
        let table = smarter_schema();
        let sheep = table.get("sampleSheep").unwrap();
        assert_eq!(sheep.required_fields(), vec!["smarterId", "originalId"]);
        assert_eq!(sheep.indexes().len(), 1);
        assert!(sheep.indexes()[0].is_unique());
        assert!(!sheep.indexes()[0].is_case_insensitive());

        let goat = sample_collection(Species::Goat);
        assert_eq!(goat.name(), "sampleGoat");
        assert_eq!(goat.json_schema(), sheep.json_schema());
        assert!(table.get("sampleGoat").is_none());
    }

    #[test]
    fn test_counter_validator_requires_int() {
        let table = smarter_schema();
        let counters = table.get(COUNTERS).unwrap();
        let sequence = counters
            .json_schema()
            .get_document("properties")
            .and_then(|p| p.get_document("sequence_value"))
            .unwrap();
        assert_eq!(sequence.get_str("bsonType").unwrap(), "int");
        assert_eq!(sequence.get_i32("minimum").unwrap(), 0);
    }
}
