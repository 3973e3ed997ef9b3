use thiserror::Error;

pub type PilotResult<T> = Result<T, OfferPilotError>;

#[derive(Error, Debug)]
pub enum OfferPilotError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing features: {}", .names.join(", "))]
    MissingFeatures { names: Vec<String> },

    #[error("No oracle trains on label '{0}'")]
    UnknownLabel(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Numeric error: {0}")]
    Numeric(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_features_lists_every_name() {
        let err = OfferPilotError::MissingFeatures {
            names: vec!["morning".to_string(), "weekend".to_string()],
        };
        assert_eq!(err.to_string(), "Missing features: morning, weekend");
    }

    #[test]
    fn test_unknown_label_display() {
        let err = OfferPilotError::UnknownLabel("rating".to_string());
        assert_eq!(err.to_string(), "No oracle trains on label 'rating'");
    }
}
