//! Sample counters and SMARTER ID generation.

use bson::{doc, Document};
use mongodb::{
    options::{Collation, CollationStrength, FindOneAndUpdateOptions, FindOneOptions, ReturnDocument},
    Database,
};
use mongodb_initdb::schema::COLLATION_LOCALE;

use crate::{
    error::{Result, SmarterError},
    models::{Counter, Species},
    schema::{BREEDS, COUNTERS},
};

/// Country code used when the sample origin is not known
pub const UNKNOWN_COUNTRY: &str = "UN";

/// Atomically increment the counter `name` and return the new value
pub async fn next_sequence_value(db: &Database, name: &str) -> Result<i32> {
    let counter = db
        .collection::<Counter>(COUNTERS)
        .find_one_and_update(
            doc! { "_id": name },
            doc! { "$inc": { "sequence_value": 1 } },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await?
        .ok_or_else(|| SmarterError::UnknownCounter(name.to_string()))?;

    tracing::debug!(counter = name, value = counter.sequence_value, "Incremented counter");
    Ok(counter.sequence_value)
}

fn country_code(country: &str) -> Result<String> {
    let country = country.trim();
    if country.eq_ignore_ascii_case("unknown") {
        return Ok(UNKNOWN_COUNTRY.to_string());
    }

    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SmarterError::InvalidCountry(country.to_string()));
    }
    Ok(country.to_ascii_uppercase())
}

/// Build a SMARTER ID such as `ITOA-TEX-000000001`
pub fn format_smarter_id(country: &str, species: Species, breed_code: &str, sequence: i32) -> Result<String> {
    let country = country_code(country)?;

    let breed_code = breed_code.trim();
    if breed_code.is_empty() || breed_code.contains(char::is_whitespace) {
        return Err(SmarterError::InvalidBreedCode(breed_code.to_string()));
    }

    Ok(format!("{}{}-{}-{:09}", country, species.code(), breed_code, sequence))
}

/// Whether a `species` breed with `breed_code` is registered, ignoring case
/// the same way the unique breed index does
pub async fn breed_exists(db: &Database, species: Species, breed_code: &str) -> Result<bool> {
    let collation = Collation::builder()
        .locale(COLLATION_LOCALE.to_string())
        .strength(CollationStrength::Primary)
        .build();

    let breed = db
        .collection::<Document>(BREEDS)
        .find_one(
            doc! { "species": species.to_string(), "breed.code": breed_code.trim() },
            FindOneOptions::builder().collation(collation).build(),
        )
        .await?;
    Ok(breed.is_some())
}

/// Issue the next SMARTER ID for a sample of a registered breed
pub async fn next_smarter_id(db: &Database, country: &str, species: Species, breed_code: &str) -> Result<String> {
    // Validate before consuming a sequence number.
    format_smarter_id(country, species, breed_code, 0)?;
    if !breed_exists(db, species, breed_code).await? {
        return Err(SmarterError::UnknownBreed {
            species: species.to_string(),
            code: breed_code.trim().to_string(),
        });
    }

    let sequence = next_sequence_value(db, species.counter_name()).await?;
    format_smarter_id(country, species, breed_code, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_smarter_id() {
        assert_eq!(
            format_smarter_id("IT", Species::Sheep, "TEX", 1).unwrap(),
            "ITOA-TEX-000000001"
        );
        assert_eq!(
            format_smarter_id("fr", Species::Goat, "ALP", 123_456).unwrap(),
            "FRCH-ALP-000123456"
        );
    }

    #[test]
    fn test_unknown_country() {
        assert_eq!(
            format_smarter_id("Unknown", Species::Sheep, "MER", 7).unwrap(),
            "UNOA-MER-000000007"
        );
    }

    #[test]
    fn test_invalid_country() {
        for country in ["", "ITA", "I1", "Italy"] {
            assert!(matches!(
                format_smarter_id(country, Species::Sheep, "TEX", 1),
                Err(SmarterError::InvalidCountry(_))
            ));
        }
    }

    #[test]
    fn test_invalid_breed_code() {
        assert!(matches!(
            format_smarter_id("IT", Species::Sheep, "  ", 1),
            Err(SmarterError::InvalidBreedCode(_))
        ));
        assert!(matches!(
            format_smarter_id("IT", Species::Sheep, "TE X", 1),
            Err(SmarterError::InvalidBreedCode(_))
        ));
    }
}
