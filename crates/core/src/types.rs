//! Shared types for the OfferPilot recommendation engine: actions and the
//! catalogue input shapes, recommendations, slates, and training examples.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied situational feature values (e.g. time of day) shared
/// across all actions in one decision.
pub type Context = HashMap<String, f64>;

/// A candidate item the bandit can recommend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    #[serde(default)]
    pub features: HashMap<String, f64>,
}

impl Action {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            features: HashMap::new(),
        }
    }

    pub fn with_features(action_id: impl Into<String>, features: HashMap<String, f64>) -> Self {
        Self {
            action_id: action_id.into(),
            features,
        }
    }
}

/// Per-action feature specification accepted in the map-shaped catalogue
/// input: either explicit feature values, or a list of feature names each
/// implicitly valued 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureSpec {
    Values(HashMap<String, f64>),
    Names(Vec<String>),
}

/// The three equivalent catalogue input shapes. Normalized once at bandit
/// construction into an ordered action list; the map shape is normalized in
/// sorted-key order so catalogue iteration order is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogInput {
    Ids(Vec<String>),
    Actions(Vec<Action>),
    Map(HashMap<String, FeatureSpec>),
}

impl CatalogInput {
    /// Normalize into the canonical ordered action list.
    pub fn into_actions(self) -> Vec<Action> {
        match self {
            Self::Ids(ids) => ids.into_iter().map(Action::new).collect(),
            Self::Actions(actions) => actions,
            Self::Map(map) => {
                let mut entries: Vec<(String, FeatureSpec)> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries
                    .into_iter()
                    .map(|(action_id, spec)| {
                        let features = match spec {
                            FeatureSpec::Values(values) => values,
                            FeatureSpec::Names(names) => {
                                names.into_iter().map(|name| (name, 1.0)).collect()
                            }
                        };
                        Action::with_features(action_id, features)
                    })
                    .collect()
            }
        }
    }
}

impl From<Vec<String>> for CatalogInput {
    fn from(ids: Vec<String>) -> Self {
        Self::Ids(ids)
    }
}

impl From<Vec<&str>> for CatalogInput {
    fn from(ids: Vec<&str>) -> Self {
        Self::Ids(ids.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Action>> for CatalogInput {
    fn from(actions: Vec<Action>) -> Self {
        Self::Actions(actions)
    }
}

impl From<HashMap<String, FeatureSpec>> for CatalogInput {
    fn from(map: HashMap<String, FeatureSpec>) -> Self {
        Self::Map(map)
    }
}

/// A single sampled action, produced fresh on every call and immutable once
/// returned. The `recommendation_id` correlates later feedback back to the
/// exact draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_id: Uuid,
    pub context: Context,
    pub action_id: String,
    pub score: f64,
    pub probability: f64,
    pub generated_at: DateTime<Utc>,
}

/// One entry of a slate, carrying the score and the sampling probability it
/// held at its own draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlateItem {
    pub action_id: String,
    pub score: f64,
    pub probability: f64,
}

/// An ordered list of actions sampled without replacement, first-shown to
/// last-shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slate {
    pub recommendation_id: Uuid,
    pub context: Context,
    pub slate_items: Vec<SlateItem>,
    pub generated_at: DateTime<Utc>,
}

impl Slate {
    pub fn contains(&self, action_id: &str) -> bool {
        self.slate_items.iter().any(|item| item.action_id == action_id)
    }
}

/// A canonical training example generated from feedback on a recommendation
/// or slate. Ephemeral: consumed by the oracle immediately and returned to
/// the caller for persistence, never retained by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub recommendation_id: Uuid,
    pub action_id: String,
    pub features: HashMap<String, f64>,
    pub context: Context,
    /// Probability under which the action was originally sampled, used for
    /// inverse propensity weighting.
    pub probability: Option<f64>,
    /// Target signal this example carries (e.g. "click", "rating").
    pub label: String,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_input_normalizes_in_order() {
        let input = CatalogInput::from(vec!["pear", "apple"]);
        let actions = input.into_actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_id, "pear");
        assert_eq!(actions[1].action_id, "apple");
        assert!(actions[0].features.is_empty());
    }

    #[test]
    fn test_map_input_normalizes_in_sorted_key_order() {
        let mut map = HashMap::new();
        map.insert(
            "pear".to_string(),
            FeatureSpec::Names(vec!["fruit".to_string()]),
        );
        map.insert(
            "apple".to_string(),
            FeatureSpec::Values(HashMap::from([("fruit".to_string(), 0.5)])),
        );
        let actions = CatalogInput::Map(map).into_actions();
        assert_eq!(actions[0].action_id, "apple");
        assert_eq!(actions[0].features.get("fruit"), Some(&0.5));
        assert_eq!(actions[1].action_id, "pear");
        // Listed feature names are implicitly valued 1.0
        assert_eq!(actions[1].features.get("fruit"), Some(&1.0));
    }

    #[test]
    fn test_catalog_input_deserializes_all_three_shapes() {
        let ids: CatalogInput = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(ids.into_actions().len(), 2);

        let actions: CatalogInput = serde_json::from_str(
            r#"[{"action_id": "a", "features": {"fruit": 1.0}}, {"action_id": "b"}]"#,
        )
        .unwrap();
        let actions = actions.into_actions();
        assert_eq!(actions[0].features.get("fruit"), Some(&1.0));
        assert!(actions[1].features.is_empty());

        let map: CatalogInput =
            serde_json::from_str(r#"{"a": {"fruit": 1.0}, "b": ["fruit", "sweet"]}"#).unwrap();
        let actions = map.into_actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].features.get("sweet"), Some(&1.0));
    }

    #[test]
    fn test_slate_contains() {
        let slate = Slate {
            recommendation_id: Uuid::new_v4(),
            context: Context::new(),
            slate_items: vec![SlateItem {
                action_id: "apple".to_string(),
                score: 0.5,
                probability: 1.0,
            }],
            generated_at: Utc::now(),
        };
        assert!(slate.contains("apple"));
        assert!(!slate.contains("pear"));
    }
}
