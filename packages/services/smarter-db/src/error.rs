use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmarterError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Counter '{0}' does not exist, was the database initialized?")]
    UnknownCounter(String),

    #[error("Invalid country code '{0}', expected two ASCII letters")]
    InvalidCountry(String),

    #[error("Invalid breed code '{0}'")]
    InvalidBreedCode(String),

    #[error("No {species} breed with code '{code}' is registered")]
    UnknownBreed { species: String, code: String },

    #[error("Unknown species '{0}', expected 'Sheep' or 'Goat'")]
    UnknownSpecies(String),
}

pub type Result<T> = std::result::Result<T, SmarterError>;
