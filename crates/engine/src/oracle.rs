//! Online logistic-regression oracle: feature schema, weight vector,
//! prediction, and single-example SGD updates with inverse propensity
//! weighting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use offerpilot_core::{Context, OfferPilotError, PilotResult, TrainingExample};

/// Reserved weight key for the intercept term.
pub const INTERCEPT: &str = "intercept";

/// Default target label trained by the accept/reject/choose feedback paths.
pub const CLICK_LABEL: &str = "click";

/// Constructor parameters for an [`Oracle`]. Every field round-trips through
/// [`OracleState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Action-id vocabulary, one-hot encoded into the input vector.
    pub action_ids: Vec<String>,
    /// Context feature names. Context enters the model only through
    /// interaction terms.
    pub context_features: Vec<String>,
    /// Action feature names.
    pub action_features: Vec<String>,
    /// Generate `context * action_id` interaction features.
    pub context_action_id_interactions: bool,
    /// Generate `context * action_feature` interaction features.
    pub context_action_feature_interactions: bool,
    pub learning_rate: f64,
    /// Which field of a training example this oracle is trained against.
    pub target_label: String,
    pub inverse_propensity_weighting: bool,
    /// Extra sample-weight multiplier applied when the label value is 0.
    pub negative_class_weight: f64,
    /// Fail on missing schema features instead of defaulting them to 0.
    pub strict_features: bool,
    pub name: String,
    /// Combination weight applied when several oracles are summed.
    pub oracle_weight: f64,
    /// Starting weights by feature name; unspecified names default to 0.
    #[serde(default)]
    pub initial_weights: HashMap<String, f64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            action_ids: Vec::new(),
            context_features: Vec::new(),
            action_features: Vec::new(),
            context_action_id_interactions: true,
            context_action_feature_interactions: true,
            learning_rate: 1.0,
            target_label: CLICK_LABEL.to_string(),
            inverse_propensity_weighting: true,
            negative_class_weight: 1.0,
            strict_features: false,
            name: CLICK_LABEL.to_string(),
            oracle_weight: 1.0,
            initial_weights: HashMap::new(),
        }
    }
}

/// Persisted form of an [`Oracle`]. Field names are part of the wire
/// contract; weights are keyed by fully-qualified feature name so a state
/// saved under one vocabulary order rehydrates correctly under another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleState {
    pub action_ids: Vec<String>,
    pub context_features: Vec<String>,
    pub action_features: Vec<String>,
    pub context_action_id_interactions: bool,
    pub context_action_feature_interactions: bool,
    pub weights: HashMap<String, f64>,
    pub learning_rate: f64,
    pub target_label: String,
    pub inverse_propensity_weighting: bool,
    pub negative_class_weight: f64,
    pub strict_features: bool,
    pub name: String,
    pub oracle_weight: f64,
}

/// The online predictor for one feedback signal (e.g. clicks, ratings).
#[derive(Debug, Clone)]
pub struct Oracle {
    config: OracleConfig,
    /// Fully-qualified feature name per weight index. Index 0 is the
    /// intercept; interaction names follow the deterministic nested-loop
    /// order over the registered vocabularies.
    feature_names: Vec<String>,
    weights: Vec<f64>,
}

impl Oracle {
    pub fn new(config: OracleConfig) -> PilotResult<Self> {
        if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
            return Err(OfferPilotError::Validation(format!(
                "learning rate must be a positive number, got {}",
                config.learning_rate
            )));
        }
        if !config.negative_class_weight.is_finite() || config.negative_class_weight < 0.0 {
            return Err(OfferPilotError::Validation(format!(
                "negative class weight must be a non-negative number, got {}",
                config.negative_class_weight
            )));
        }
        if !config.oracle_weight.is_finite() {
            return Err(OfferPilotError::Validation(format!(
                "oracle weight must be finite, got {}",
                config.oracle_weight
            )));
        }
        if config.target_label.is_empty() {
            return Err(OfferPilotError::Validation(
                "target label must not be empty".to_string(),
            ));
        }

        let feature_names = build_feature_names(&config);
        let weights = feature_names
            .iter()
            .map(|name| config.initial_weights.get(name).copied().unwrap_or(0.0))
            .collect();

        debug!(
            "oracle '{}' initialized with {} weights targeting label '{}'",
            config.name,
            feature_names.len(),
            config.target_label
        );
        Ok(Self {
            config,
            feature_names,
            weights,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn target_label(&self) -> &str {
        &self.config.target_label
    }

    pub fn oracle_weight(&self) -> f64 {
        self.config.oracle_weight
    }

    /// Current weights as a feature-name -> value map, including the
    /// reserved `"intercept"` key.
    pub fn weights(&self) -> HashMap<String, f64> {
        self.feature_names
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect()
    }

    /// Build the ordered numeric input vector for one (action, context)
    /// pair: `[intercept, action-id indicators..., action features...,
    /// interaction features...]`.
    ///
    /// Schema features absent from both maps default to 0 unless
    /// `strict_features` is set, in which case the call fails listing every
    /// missing name. An action id outside the vocabulary yields an all-zero
    /// one-hot, not an error.
    pub fn input_vector(
        &self,
        action_id: &str,
        context: &Context,
        action_features: &HashMap<String, f64>,
    ) -> PilotResult<Vec<f64>> {
        let mut inputs: HashMap<&str, f64> = HashMap::new();
        for (name, value) in context {
            inputs.insert(name.as_str(), *value);
        }
        for (name, value) in action_features {
            inputs.insert(name.as_str(), *value);
        }

        if self.config.strict_features {
            let missing: Vec<String> = self
                .config
                .context_features
                .iter()
                .chain(self.config.action_features.iter())
                .filter(|name| !inputs.contains_key(name.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(OfferPilotError::MissingFeatures { names: missing });
            }
        }

        let value_of = |name: &str| inputs.get(name).copied().unwrap_or(0.0);

        let mut vector = Vec::with_capacity(self.feature_names.len());
        vector.push(1.0);
        for id in &self.config.action_ids {
            vector.push(if id == action_id { 1.0 } else { 0.0 });
        }
        for name in &self.config.action_features {
            vector.push(value_of(name));
        }
        if self.config.context_action_id_interactions {
            for context_name in &self.config.context_features {
                let context_value = value_of(context_name);
                for id in &self.config.action_ids {
                    vector.push(if id == action_id { context_value } else { 0.0 });
                }
            }
        }
        if self.config.context_action_feature_interactions {
            for context_name in &self.config.context_features {
                let context_value = value_of(context_name);
                for name in &self.config.action_features {
                    vector.push(context_value * value_of(name));
                }
            }
        }
        Ok(vector)
    }

    /// Predicted probability in (0, 1) for one (action, context) pair.
    /// Pure: no side effects.
    pub fn predict(
        &self,
        action_id: &str,
        context: &Context,
        action_features: &HashMap<String, f64>,
    ) -> PilotResult<f64> {
        let vector = self.input_vector(action_id, context, action_features)?;
        Ok(sigmoid(self.logit(&vector)))
    }

    /// One stochastic gradient step on the cross-entropy loss. A no-op when
    /// the example does not carry this oracle's target label. Prediction
    /// uses the weights as they stand before the update.
    pub fn fit(&mut self, example: &TrainingExample) -> PilotResult<()> {
        if example.label != self.config.target_label {
            return Ok(());
        }

        let vector =
            self.input_vector(&example.action_id, &example.context, &example.features)?;
        let y = example.value;

        let mut sample_weight = if self.config.inverse_propensity_weighting {
            1.0 / example.probability.unwrap_or(0.1)
        } else {
            1.0
        };
        if y == 0.0 {
            sample_weight *= self.config.negative_class_weight;
        }

        let pred = sigmoid(self.logit(&vector));
        for (weight, x) in self.weights.iter_mut().zip(vector.iter()) {
            *weight -= sample_weight * self.config.learning_rate * (pred - y) * x;
        }
        Ok(())
    }

    /// Apply [`fit`](Self::fit) sequentially in the given order. Order
    /// matters: each step conditions the next prediction.
    pub fn fit_many(&mut self, examples: &[TrainingExample]) -> PilotResult<()> {
        for example in examples {
            self.fit(example)?;
        }
        Ok(())
    }

    /// Verify every example this oracle would train on can produce an input
    /// vector, without touching the weights. Lets a batch fail atomically
    /// before any gradient step is applied.
    pub fn check_examples(&self, examples: &[TrainingExample]) -> PilotResult<()> {
        for example in examples
            .iter()
            .filter(|e| e.label == self.config.target_label)
        {
            self.input_vector(&example.action_id, &example.context, &example.features)?;
        }
        Ok(())
    }

    pub fn state(&self) -> OracleState {
        OracleState {
            action_ids: self.config.action_ids.clone(),
            context_features: self.config.context_features.clone(),
            action_features: self.config.action_features.clone(),
            context_action_id_interactions: self.config.context_action_id_interactions,
            context_action_feature_interactions: self.config.context_action_feature_interactions,
            weights: self.weights(),
            learning_rate: self.config.learning_rate,
            target_label: self.config.target_label.clone(),
            inverse_propensity_weighting: self.config.inverse_propensity_weighting,
            negative_class_weight: self.config.negative_class_weight,
            strict_features: self.config.strict_features,
            name: self.config.name.clone(),
            oracle_weight: self.config.oracle_weight,
        }
    }

    pub fn from_state(state: &OracleState) -> PilotResult<Self> {
        Self::new(OracleConfig {
            action_ids: state.action_ids.clone(),
            context_features: state.context_features.clone(),
            action_features: state.action_features.clone(),
            context_action_id_interactions: state.context_action_id_interactions,
            context_action_feature_interactions: state.context_action_feature_interactions,
            learning_rate: state.learning_rate,
            target_label: state.target_label.clone(),
            inverse_propensity_weighting: state.inverse_propensity_weighting,
            negative_class_weight: state.negative_class_weight,
            strict_features: state.strict_features,
            name: state.name.clone(),
            oracle_weight: state.oracle_weight,
            initial_weights: state.weights.clone(),
        })
    }

    pub fn to_json(&self) -> PilotResult<String> {
        Ok(serde_json::to_string(&self.state())?)
    }

    pub fn from_json(json: &str) -> PilotResult<Self> {
        let state: OracleState = serde_json::from_str(json)?;
        Self::from_state(&state)
    }

    fn logit(&self, vector: &[f64]) -> f64 {
        self.weights.iter().zip(vector.iter()).map(|(w, x)| w * x).sum()
    }
}

fn sigmoid(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}

/// Fully-qualified feature names in vector order: intercept, action-id
/// indicators, action features, then `context*action_id` and
/// `context*action_feature` interactions in nested-loop order.
fn build_feature_names(config: &OracleConfig) -> Vec<String> {
    let mut names = Vec::with_capacity(
        1 + config.action_ids.len()
            + config.action_features.len()
            + config.context_features.len() * (config.action_ids.len() + config.action_features.len()),
    );
    names.push(INTERCEPT.to_string());
    names.extend(config.action_ids.iter().cloned());
    names.extend(config.action_features.iter().cloned());
    if config.context_action_id_interactions {
        for context_name in &config.context_features {
            for id in &config.action_ids {
                names.push(format!("{}*{}", context_name, id));
            }
        }
    }
    if config.context_action_feature_interactions {
        for context_name in &config.context_features {
            for feature_name in &config.action_features {
                names.push(format!("{}*{}", context_name, feature_name));
            }
        }
    }
    names
}
