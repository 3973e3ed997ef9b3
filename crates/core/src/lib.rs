pub mod error;
pub mod types;

pub use error::{OfferPilotError, PilotResult};
pub use types::{
    Action, CatalogInput, Context, FeatureSpec, Recommendation, Slate, SlateItem, TrainingExample,
};
