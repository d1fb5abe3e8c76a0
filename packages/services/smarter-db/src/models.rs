use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::SmarterError;

/// Species tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Sheep,
    Goat,
}

impl Species {
    pub const ALL: [Species; 2] = [Species::Sheep, Species::Goat];

    /// `_id` of the counter that numbers this species' samples
    pub fn counter_name(&self) -> &'static str {
        self.collection_name()
    }

    /// Collection holding this species' samples
    pub fn collection_name(&self) -> &'static str {
        match self {
            Species::Sheep => "sampleSheep",
            Species::Goat => "sampleGoat",
        }
    }

    /// Two-letter taxonomic code used in SMARTER IDs (Ovis aries, Capra hircus)
    pub fn code(&self) -> &'static str {
        match self {
            Species::Sheep => "OA",
            Species::Goat => "CH",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Species::Sheep => f.write_str("Sheep"),
            Species::Goat => f.write_str("Goat"),
        }
    }
}

impl FromStr for Species {
    type Err = SmarterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheep" => Ok(Species::Sheep),
            "goat" => Ok(Species::Goat),
            _ => Err(SmarterError::UnknownSpecies(s.to_string())),
        }
    }
}

/// A named sequence in the `counters` collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub name: String,
    pub sequence_value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedName {
    pub name: String,
    pub code: String,
}

/// A document in the `breeds` collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breed {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub species: String,
    pub breed: BreedName,
    #[serde(rename = "nIndividuals", skip_serializing_if = "Option::is_none")]
    pub n_individuals: Option<i32>,
}

impl Breed {
    pub fn new(species: impl Into<String>, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: None,
            species: species.into(),
            breed: BreedName {
                name: name.into(),
                code: code.into(),
            },
            n_individuals: None,
        }
    }
}

/// A document in a per-species sample collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub smarter_id: String,
    pub original_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip_name: Option<String>,
}

impl Sample {
    pub fn new(smarter_id: impl Into<String>, original_id: impl Into<String>) -> Self {
        Self {
            id: None,
            smarter_id: smarter_id.into(),
            original_id: original_id.into(),
            country: None,
            species: None,
            breed: None,
            breed_code: None,
            chip_name: None,
        }
    }
}
