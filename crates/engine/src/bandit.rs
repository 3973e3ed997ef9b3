//! Contextual bandit decision layer: combined oracle scoring, softmax or
//! greedy action selection, slates sampled without replacement, and
//! feedback-driven training serialized through the update mutex.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use offerpilot_core::{
    Action, CatalogInput, Context, OfferPilotError, PilotResult, Recommendation, Slate, SlateItem,
    TrainingExample,
};

use crate::math;
use crate::mutex::UpdateMutex;
use crate::oracle::{Oracle, OracleConfig, OracleState, CLICK_LABEL};

/// Constructor parameters for a [`Bandit`]. An empty oracle list defaults to
/// a single oracle with default settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    #[serde(default)]
    pub oracles: Vec<OracleConfig>,
    pub actions: CatalogInput,
    /// Softmax sharpness. 0 is reserved greedy mode: the maximal action is
    /// chosen deterministically.
    pub temperature: f64,
    /// Default number of actions per slate.
    pub slate_size: usize,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            oracles: Vec::new(),
            actions: CatalogInput::Ids(Vec::new()),
            temperature: 0.5,
            slate_size: 1,
        }
    }
}

/// Persisted form of a [`Bandit`]. The action catalogue is supplied again on
/// rehydration; only the learned state travels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditState {
    pub oracle_states: Vec<OracleState>,
    pub temperature: f64,
    pub slate_size: usize,
}

/// One catalogue action with its combined score and selection probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAction {
    pub action_id: String,
    pub score: f64,
    pub probability: f64,
}

/// Per-oracle observability view: each oracle's raw prediction by oracle
/// name alongside the combined weighted score. `probability` is filled by
/// [`Bandit::scored_actions_per_oracle`] and absent from the raw
/// [`Bandit::action_scores_per_oracle`] view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleScoredAction {
    pub action_id: String,
    pub oracle_scores: HashMap<String, f64>,
    pub score: f64,
    pub probability: Option<f64>,
}

/// Include/exclude filters and the optional slate-size override accepted by
/// the read-path operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionOptions {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub slate_size: Option<usize>,
}

/// The decision and feedback layer. Owns the action catalogue and one or
/// more oracles; every feedback call trains the affected oracles under
/// mutual exclusion while reads stay lock-light and never suspend.
pub struct Bandit {
    oracles: RwLock<Vec<Oracle>>,
    /// Catalogue in registration order; iteration order is the documented
    /// tie-break order for greedy selection.
    actions: Vec<Action>,
    temperature: f64,
    slate_size: usize,
    update_mutex: UpdateMutex,
}

impl Bandit {
    pub fn new(config: BanditConfig) -> PilotResult<Self> {
        if !config.temperature.is_finite() || config.temperature < 0.0 {
            return Err(OfferPilotError::Validation(format!(
                "temperature must be a non-negative number, got {}",
                config.temperature
            )));
        }
        if config.slate_size == 0 {
            return Err(OfferPilotError::Validation(
                "slate size must be at least 1".to_string(),
            ));
        }

        let oracle_configs = if config.oracles.is_empty() {
            vec![OracleConfig::default()]
        } else {
            config.oracles
        };
        let oracles = oracle_configs
            .into_iter()
            .map(Oracle::new)
            .collect::<PilotResult<Vec<_>>>()?;

        let actions = config.actions.into_actions();
        for (i, action) in actions.iter().enumerate() {
            if actions[..i].iter().any(|a| a.action_id == action.action_id) {
                return Err(OfferPilotError::Validation(format!(
                    "duplicate action id '{}' in catalogue",
                    action.action_id
                )));
            }
        }

        info!(
            "bandit initialized with {} actions and {} oracles",
            actions.len(),
            oracles.len()
        );
        Ok(Self {
            oracles: RwLock::new(oracles),
            actions,
            temperature: config.temperature,
            slate_size: config.slate_size,
            update_mutex: UpdateMutex::new(),
        })
    }

    /// Target labels the attached oracles train on.
    pub fn trained_labels(&self) -> Vec<String> {
        let oracles = self.oracles.read();
        let mut labels: Vec<String> = Vec::new();
        for oracle in oracles.iter() {
            if !labels.iter().any(|l| l == oracle.target_label()) {
                labels.push(oracle.target_label().to_string());
            }
        }
        labels
    }

    /// Score every eligible action with the combined weighted oracle
    /// prediction and attach selection probabilities (softmax for
    /// `temperature > 0`, the documented all-maximal-get-1 rule for greedy
    /// mode). An empty eligible set yields an empty list.
    pub fn scored_actions(
        &self,
        context: &Context,
        options: &DecisionOptions,
    ) -> PilotResult<Vec<ScoredAction>> {
        let eligible = self.eligible_actions(options);
        if eligible.is_empty() {
            return Ok(Vec::new());
        }
        let scores = self.combined_scores(&eligible, context)?;
        let probabilities = self.selection_probabilities(&scores)?;

        Ok(eligible
            .into_iter()
            .zip(scores.into_iter())
            .zip(probabilities.into_iter())
            .map(|((action, score), probability)| ScoredAction {
                action_id: action.action_id.clone(),
                score,
                probability,
            })
            .collect())
    }

    /// Sample one action and stamp it with a fresh recommendation id.
    /// Greedy mode picks the first maximal action in catalogue order.
    pub fn recommend(
        &self,
        context: &Context,
        options: &DecisionOptions,
    ) -> PilotResult<Recommendation> {
        let scored = self.scored_actions(context, options)?;
        if scored.is_empty() {
            return Err(OfferPilotError::Numeric(
                "no eligible actions to recommend from".to_string(),
            ));
        }

        let index = if self.temperature > 0.0 {
            let probabilities: Vec<f64> = scored.iter().map(|s| s.probability).collect();
            math::sample_index(&probabilities)?
        } else {
            first_maximal(&scored)
        };
        let chosen = &scored[index];

        Ok(Recommendation {
            recommendation_id: Uuid::new_v4(),
            context: context.clone(),
            action_id: chosen.action_id.clone(),
            score: chosen.score,
            probability: chosen.probability,
            generated_at: Utc::now(),
        })
    }

    /// Sample an ordered slate of `min(requested, eligible)` actions without
    /// replacement. Each draw recomputes the selection distribution over the
    /// actions still remaining, so the result is a ranking rather than a
    /// top-k set.
    pub fn slate(&self, context: &Context, options: &DecisionOptions) -> PilotResult<Slate> {
        let eligible = self.eligible_actions(options);
        let scores = self.combined_scores(&eligible, context)?;
        let mut pool: Vec<(String, f64)> = eligible
            .into_iter()
            .map(|a| a.action_id.clone())
            .zip(scores.into_iter())
            .collect();

        let size = options.slate_size.unwrap_or(self.slate_size).min(pool.len());
        let mut slate_items = Vec::with_capacity(size);
        for _ in 0..size {
            let remaining_scores: Vec<f64> = pool.iter().map(|(_, s)| *s).collect();
            let probabilities = self.selection_probabilities(&remaining_scores)?;
            let index = if self.temperature > 0.0 {
                math::sample_index(&probabilities)?
            } else {
                first_maximal_score(&remaining_scores)
            };
            let probability = probabilities[index];
            let (action_id, score) = pool.remove(index);
            slate_items.push(SlateItem {
                action_id,
                score,
                probability,
            });
        }

        Ok(Slate {
            recommendation_id: Uuid::new_v4(),
            context: context.clone(),
            slate_items,
            generated_at: Utc::now(),
        })
    }

    /// Raw per-oracle predictions alongside the combined weighted score.
    pub fn action_scores_per_oracle(
        &self,
        context: &Context,
        options: &DecisionOptions,
    ) -> PilotResult<Vec<OracleScoredAction>> {
        self.per_oracle_view(context, options, false)
    }

    /// Per-oracle predictions with the combined selection probability
    /// attached.
    pub fn scored_actions_per_oracle(
        &self,
        context: &Context,
        options: &DecisionOptions,
    ) -> PilotResult<Vec<OracleScoredAction>> {
        self.per_oracle_view(context, options, true)
    }

    /// Positive click feedback for a single recommendation.
    pub async fn accept(
        &self,
        recommendation: &Recommendation,
    ) -> PilotResult<Vec<TrainingExample>> {
        self.feedback(recommendation, CLICK_LABEL, 1.0).await
    }

    /// Negative click feedback for a single recommendation.
    pub async fn reject(
        &self,
        recommendation: &Recommendation,
    ) -> PilotResult<Vec<TrainingExample>> {
        self.feedback(recommendation, CLICK_LABEL, 0.0).await
    }

    /// Generic feedback for a single recommendation under any trained label
    /// (e.g. a rating). Returns the generated examples after training has
    /// been applied.
    pub async fn feedback(
        &self,
        recommendation: &Recommendation,
        label: &str,
        value: f64,
    ) -> PilotResult<Vec<TrainingExample>> {
        self.ensure_trained_label(label)?;
        let action = self.find_action(&recommendation.action_id)?;
        let examples = vec![TrainingExample {
            recommendation_id: recommendation.recommendation_id,
            action_id: recommendation.action_id.clone(),
            features: action.features.clone(),
            context: recommendation.context.clone(),
            probability: Some(recommendation.probability),
            label: label.to_string(),
            value,
        }];
        self.train(&examples).await?;
        Ok(examples)
    }

    /// Click feedback for a slate: the chosen action trains as `click = 1`
    /// and every other shown item as `click = 0` — picking one item is
    /// training signal for all shown items, not just the winner.
    pub async fn choose(
        &self,
        slate: &Slate,
        action_id: &str,
    ) -> PilotResult<Vec<TrainingExample>> {
        self.ensure_trained_label(CLICK_LABEL)?;
        if !slate.contains(action_id) {
            return Err(OfferPilotError::UnknownAction(action_id.to_string()));
        }
        let examples = self.slate_examples(slate, |item| {
            let value = if item.action_id == action_id { 1.0 } else { 0.0 };
            (CLICK_LABEL.to_string(), value)
        })?;
        self.train(&examples).await?;
        Ok(examples)
    }

    /// Negative click feedback for every item of a slate.
    pub async fn reject_slate(&self, slate: &Slate) -> PilotResult<Vec<TrainingExample>> {
        self.ensure_trained_label(CLICK_LABEL)?;
        let examples = self.slate_examples(slate, |_| (CLICK_LABEL.to_string(), 0.0))?;
        self.train(&examples).await?;
        Ok(examples)
    }

    /// Generic feedback for one identified item of a slate under any
    /// trained label.
    pub async fn slate_feedback(
        &self,
        slate: &Slate,
        label: &str,
        value: f64,
        action_id: &str,
    ) -> PilotResult<Vec<TrainingExample>> {
        self.ensure_trained_label(label)?;
        let item = slate
            .slate_items
            .iter()
            .find(|item| item.action_id == action_id)
            .ok_or_else(|| OfferPilotError::UnknownAction(action_id.to_string()))?;
        let action = self.find_action(&item.action_id)?;
        let examples = vec![TrainingExample {
            recommendation_id: slate.recommendation_id,
            action_id: item.action_id.clone(),
            features: action.features.clone(),
            context: slate.context.clone(),
            probability: Some(item.probability),
            label: label.to_string(),
            value,
        }];
        self.train(&examples).await?;
        Ok(examples)
    }

    /// Train every attached oracle on a batch of examples. The batch is
    /// validated up front so a failure applies no partial update; the
    /// gradient steps run inside the FIFO update mutex under the write
    /// lock.
    pub async fn train(&self, examples: &[TrainingExample]) -> PilotResult<()> {
        for example in examples {
            self.ensure_trained_label(&example.label)?;
        }
        self.update_mutex
            .run(|| {
                let mut oracles = self.oracles.write();
                for oracle in oracles.iter() {
                    oracle.check_examples(examples)?;
                }
                for oracle in oracles.iter_mut() {
                    oracle.fit_many(examples)?;
                }
                Ok::<(), OfferPilotError>(())
            })
            .await?;
        debug!(
            "trained {} examples across {} oracles",
            examples.len(),
            self.oracles.read().len()
        );
        Ok(())
    }

    pub fn state(&self) -> BanditState {
        let oracles = self.oracles.read();
        BanditState {
            oracle_states: oracles.iter().map(Oracle::state).collect(),
            temperature: self.temperature,
            slate_size: self.slate_size,
        }
    }

    /// Rehydrate from persisted state. The catalogue does not travel with
    /// the state and is supplied again by the caller.
    pub fn from_state(state: &BanditState, actions: CatalogInput) -> PilotResult<Self> {
        let oracles = state
            .oracle_states
            .iter()
            .map(Oracle::from_state)
            .collect::<PilotResult<Vec<_>>>()?;
        let bandit = Self::new(BanditConfig {
            oracles: Vec::new(),
            actions,
            temperature: state.temperature,
            slate_size: state.slate_size,
        })?;
        *bandit.oracles.write() = oracles;
        Ok(bandit)
    }

    pub fn to_json(&self) -> PilotResult<String> {
        Ok(serde_json::to_string(&self.state())?)
    }

    pub fn from_json(json: &str, actions: CatalogInput) -> PilotResult<Self> {
        let state: BanditState = serde_json::from_str(json)?;
        Self::from_state(&state, actions)
    }

    fn eligible_actions(&self, options: &DecisionOptions) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|action| {
                options
                    .include
                    .as_ref()
                    .map_or(true, |include| include.contains(&action.action_id))
            })
            .filter(|action| {
                options
                    .exclude
                    .as_ref()
                    .map_or(true, |exclude| !exclude.contains(&action.action_id))
            })
            .collect()
    }

    fn combined_scores(&self, actions: &[&Action], context: &Context) -> PilotResult<Vec<f64>> {
        let oracles = self.oracles.read();
        actions
            .iter()
            .map(|action| {
                let mut score = 0.0;
                for oracle in oracles.iter() {
                    score += oracle.oracle_weight()
                        * oracle.predict(&action.action_id, context, &action.features)?;
                }
                Ok(score)
            })
            .collect()
    }

    fn selection_probabilities(&self, scores: &[f64]) -> PilotResult<Vec<f64>> {
        if self.temperature > 0.0 {
            math::softmax(scores, self.temperature)
        } else {
            // Greedy mode: every action attaining the maximum reports
            // probability 1, all others 0.
            let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            Ok(scores
                .iter()
                .map(|s| if *s == max { 1.0 } else { 0.0 })
                .collect())
        }
    }

    fn per_oracle_view(
        &self,
        context: &Context,
        options: &DecisionOptions,
        with_probabilities: bool,
    ) -> PilotResult<Vec<OracleScoredAction>> {
        let eligible = self.eligible_actions(options);
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let oracles = self.oracles.read();
        let mut rows = Vec::with_capacity(eligible.len());
        for action in &eligible {
            let mut oracle_scores = HashMap::new();
            let mut combined = 0.0;
            for oracle in oracles.iter() {
                let prediction =
                    oracle.predict(&action.action_id, context, &action.features)?;
                oracle_scores.insert(oracle.name().to_string(), prediction);
                combined += oracle.oracle_weight() * prediction;
            }
            rows.push(OracleScoredAction {
                action_id: action.action_id.clone(),
                oracle_scores,
                score: combined,
                probability: None,
            });
        }
        drop(oracles);

        if with_probabilities {
            let scores: Vec<f64> = rows.iter().map(|r| r.score).collect();
            let probabilities = self.selection_probabilities(&scores)?;
            for (row, probability) in rows.iter_mut().zip(probabilities.into_iter()) {
                row.probability = Some(probability);
            }
        }
        Ok(rows)
    }

    fn slate_examples(
        &self,
        slate: &Slate,
        label_value: impl Fn(&SlateItem) -> (String, f64),
    ) -> PilotResult<Vec<TrainingExample>> {
        slate
            .slate_items
            .iter()
            .map(|item| {
                let action = self.find_action(&item.action_id)?;
                let (label, value) = label_value(item);
                Ok(TrainingExample {
                    recommendation_id: slate.recommendation_id,
                    action_id: item.action_id.clone(),
                    features: action.features.clone(),
                    context: slate.context.clone(),
                    probability: Some(item.probability),
                    label,
                    value,
                })
            })
            .collect()
    }

    fn ensure_trained_label(&self, label: &str) -> PilotResult<()> {
        let oracles = self.oracles.read();
        if oracles.iter().any(|o| o.target_label() == label) {
            Ok(())
        } else {
            Err(OfferPilotError::UnknownLabel(label.to_string()))
        }
    }

    fn find_action(&self, action_id: &str) -> PilotResult<&Action> {
        self.actions
            .iter()
            .find(|a| a.action_id == action_id)
            .ok_or_else(|| OfferPilotError::UnknownAction(action_id.to_string()))
    }
}

/// Index of the first maximal scored action in catalogue order.
fn first_maximal(scored: &[ScoredAction]) -> usize {
    let mut best = 0;
    for (i, s) in scored.iter().enumerate().skip(1) {
        if s.score > scored[best].score {
            best = i;
        }
    }
    best
}

fn first_maximal_score(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate().skip(1) {
        if *s > scores[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_oracle_config() -> OracleConfig {
        OracleConfig {
            action_ids: vec![
                "apple".to_string(),
                "pear".to_string(),
                "chocolate".to_string(),
            ],
            context_features: vec!["morning".to_string()],
            action_features: vec!["fruit".to_string()],
            ..Default::default()
        }
    }

    fn make_actions() -> CatalogInput {
        CatalogInput::Actions(vec![
            Action::with_features("apple", HashMap::from([("fruit".to_string(), 1.0)])),
            Action::with_features("pear", HashMap::from([("fruit".to_string(), 1.0)])),
            Action::with_features("chocolate", HashMap::from([("fruit".to_string(), 0.0)])),
        ])
    }

    fn make_bandit(temperature: f64) -> Bandit {
        Bandit::new(BanditConfig {
            oracles: vec![make_oracle_config()],
            actions: make_actions(),
            temperature,
            slate_size: 2,
        })
        .unwrap()
    }

    fn morning_context() -> Context {
        HashMap::from([("morning".to_string(), 1.0)])
    }

    /// Seed one oracle weight through the state path so scores are
    /// deterministic without training.
    fn make_biased_bandit(temperature: f64, weights: &[(&str, f64)]) -> Bandit {
        let mut config = make_oracle_config();
        config.initial_weights = weights
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        Bandit::new(BanditConfig {
            oracles: vec![config],
            actions: make_actions(),
            temperature,
            slate_size: 2,
        })
        .unwrap()
    }

    #[test]
    fn test_probability_conservation() {
        let bandit = make_bandit(0.5);
        let scored = bandit
            .scored_actions(&morning_context(), &DecisionOptions::default())
            .unwrap();
        assert_eq!(scored.len(), 3);
        let sum: f64 = scored.iter().map(|s| s.probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_greedy_mode_marks_all_maximal_actions() {
        // apple and pear share the maximal score; chocolate trails
        let bandit = make_biased_bandit(0.0, &[("fruit", 2.0)]);
        let scored = bandit
            .scored_actions(&morning_context(), &DecisionOptions::default())
            .unwrap();
        assert_eq!(scored[0].probability, 1.0);
        assert_eq!(scored[1].probability, 1.0);
        assert_eq!(scored[2].probability, 0.0);
    }

    #[test]
    fn test_greedy_recommend_is_deterministic() {
        let bandit = make_biased_bandit(0.0, &[("pear", 3.0)]);
        for _ in 0..25 {
            let recommendation = bandit
                .recommend(&morning_context(), &DecisionOptions::default())
                .unwrap();
            assert_eq!(recommendation.action_id, "pear");
        }
    }

    #[test]
    fn test_greedy_ties_break_by_catalogue_order() {
        let bandit = make_biased_bandit(0.0, &[("fruit", 2.0)]);
        let recommendation = bandit
            .recommend(&morning_context(), &DecisionOptions::default())
            .unwrap();
        assert_eq!(recommendation.action_id, "apple");
    }

    #[test]
    fn test_include_exclude_filters() {
        let bandit = make_bandit(0.5);
        let options = DecisionOptions {
            include: Some(vec!["apple".to_string(), "pear".to_string()]),
            exclude: Some(vec!["apple".to_string()]),
            slate_size: None,
        };
        let scored = bandit.scored_actions(&morning_context(), &options).unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].action_id, "pear");
        assert_eq!(scored[0].probability, 1.0);
    }

    #[test]
    fn test_empty_eligible_set_yields_empty_scores_and_recommend_fails() {
        let bandit = make_bandit(0.5);
        let options = DecisionOptions {
            include: Some(Vec::new()),
            exclude: None,
            slate_size: None,
        };
        assert!(bandit
            .scored_actions(&morning_context(), &options)
            .unwrap()
            .is_empty());
        assert!(bandit.recommend(&morning_context(), &options).is_err());
    }

    #[test]
    fn test_slate_samples_without_replacement() {
        let bandit = make_bandit(0.5);
        for _ in 0..25 {
            let slate = bandit
                .slate(&morning_context(), &DecisionOptions::default())
                .unwrap();
            assert_eq!(slate.slate_items.len(), 2);
            assert_ne!(slate.slate_items[0].action_id, slate.slate_items[1].action_id);
        }
    }

    #[test]
    fn test_slate_size_is_capped_by_catalogue() {
        let bandit = make_bandit(0.5);
        let options = DecisionOptions {
            include: None,
            exclude: None,
            slate_size: Some(10),
        };
        let slate = bandit.slate(&morning_context(), &options).unwrap();
        assert_eq!(slate.slate_items.len(), 3);
        let mut ids: Vec<&str> = slate
            .slate_items
            .iter()
            .map(|item| item.action_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_greedy_slate_ranks_by_score() {
        let bandit = make_biased_bandit(0.0, &[("chocolate", 2.0), ("pear", 1.0)]);
        let options = DecisionOptions {
            include: None,
            exclude: None,
            slate_size: Some(3),
        };
        let slate = bandit.slate(&morning_context(), &options).unwrap();
        let ids: Vec<&str> = slate
            .slate_items
            .iter()
            .map(|item| item.action_id.as_str())
            .collect();
        assert_eq!(ids, vec!["chocolate", "pear", "apple"]);
    }

    #[tokio::test]
    async fn test_accept_trains_toward_the_action() {
        let bandit = make_bandit(0.5);
        let context = morning_context();
        let before = bandit
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();

        let recommendation = bandit
            .recommend(&context, &DecisionOptions::default())
            .unwrap();
        let examples = bandit.accept(&recommendation).await.unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, CLICK_LABEL);
        assert_eq!(examples[0].value, 1.0);

        let after = bandit
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();
        let index = before
            .iter()
            .position(|s| s.action_id == recommendation.action_id)
            .unwrap();
        assert!(after[index].score > before[index].score);
    }

    #[tokio::test]
    async fn test_reject_trains_away_from_the_action() {
        let bandit = make_bandit(0.5);
        let context = morning_context();
        let recommendation = bandit
            .recommend(&context, &DecisionOptions::default())
            .unwrap();
        let before = bandit
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();
        bandit.reject(&recommendation).await.unwrap();
        let after = bandit
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();
        let index = before
            .iter()
            .position(|s| s.action_id == recommendation.action_id)
            .unwrap();
        assert!(after[index].score < before[index].score);
    }

    #[tokio::test]
    async fn test_choose_expands_feedback_to_every_slate_item() {
        let bandit = make_bandit(0.5);
        let options = DecisionOptions {
            include: None,
            exclude: None,
            slate_size: Some(3),
        };
        let slate = bandit.slate(&morning_context(), &options).unwrap();
        let chosen = slate.slate_items[1].action_id.clone();

        let examples = bandit.choose(&slate, &chosen).await.unwrap();
        assert_eq!(examples.len(), 3);
        for example in &examples {
            let expected = if example.action_id == chosen { 1.0 } else { 0.0 };
            assert_eq!(example.value, expected);
            assert_eq!(example.label, CLICK_LABEL);
        }
        assert_eq!(
            examples.iter().filter(|e| e.value == 1.0).count(),
            1,
            "exactly one positive example"
        );
    }

    #[tokio::test]
    async fn test_choose_rejects_action_outside_the_slate() {
        let bandit = make_bandit(0.5);
        let options = DecisionOptions {
            include: None,
            exclude: Some(vec!["chocolate".to_string()]),
            slate_size: Some(2),
        };
        let slate = bandit.slate(&morning_context(), &options).unwrap();
        let err = bandit.choose(&slate, "chocolate").await.unwrap_err();
        assert!(matches!(err, OfferPilotError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn test_reject_slate_trains_every_item_negative() {
        let bandit = make_bandit(0.5);
        let slate = bandit
            .slate(&morning_context(), &DecisionOptions::default())
            .unwrap();
        let examples = bandit.reject_slate(&slate).await.unwrap();
        assert_eq!(examples.len(), 2);
        assert!(examples.iter().all(|e| e.value == 0.0));
    }

    #[tokio::test]
    async fn test_feedback_rejects_untrained_label() {
        let bandit = make_bandit(0.5);
        let recommendation = bandit
            .recommend(&morning_context(), &DecisionOptions::default())
            .unwrap();
        let err = bandit
            .feedback(&recommendation, "rating", 0.8)
            .await
            .unwrap_err();
        assert!(matches!(err, OfferPilotError::UnknownLabel(_)));
    }

    #[tokio::test]
    async fn test_second_oracle_trains_on_its_own_label() {
        let click_oracle = make_oracle_config();
        let rating_oracle = OracleConfig {
            target_label: "rating".to_string(),
            name: "rating".to_string(),
            oracle_weight: 0.5,
            ..make_oracle_config()
        };
        let bandit = Bandit::new(BanditConfig {
            oracles: vec![click_oracle, rating_oracle],
            actions: make_actions(),
            temperature: 0.5,
            slate_size: 2,
        })
        .unwrap();
        assert_eq!(bandit.trained_labels(), vec!["click", "rating"]);

        let recommendation = bandit
            .recommend(&morning_context(), &DecisionOptions::default())
            .unwrap();
        let examples = bandit
            .feedback(&recommendation, "rating", 1.0)
            .await
            .unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, "rating");

        // Only the rating oracle's weights moved
        let state = bandit.state();
        let click_weights = &state.oracle_states[0].weights;
        let rating_weights = &state.oracle_states[1].weights;
        assert!(click_weights.values().all(|w| *w == 0.0));
        assert!(rating_weights.values().any(|w| *w != 0.0));
    }

    #[test]
    fn test_per_oracle_views() {
        let bandit = make_bandit(0.5);
        let raw = bandit
            .action_scores_per_oracle(&morning_context(), &DecisionOptions::default())
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert!(raw[0].oracle_scores.contains_key("click"));
        assert!(raw[0].probability.is_none());

        let scored = bandit
            .scored_actions_per_oracle(&morning_context(), &DecisionOptions::default())
            .unwrap();
        let sum: f64 = scored.iter().map(|s| s.probability.unwrap()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_state_round_trip_scores_identically() {
        let bandit = make_bandit(0.5);
        let context = morning_context();
        let recommendation = bandit
            .recommend(&context, &DecisionOptions::default())
            .unwrap();
        bandit.accept(&recommendation).await.unwrap();

        let json = bandit.to_json().unwrap();
        let restored = Bandit::from_json(&json, make_actions()).unwrap();

        let original = bandit
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();
        let rehydrated = restored
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();
        for (a, b) in original.iter().zip(rehydrated.iter()) {
            assert_eq!(a.action_id, b.action_id);
            assert_eq!(a.score, b.score);
            assert_eq!(a.probability, b.probability);
        }
    }

    #[test]
    fn test_empty_oracle_list_defaults_to_click_oracle() {
        let bandit = Bandit::new(BanditConfig {
            actions: CatalogInput::from(vec!["a", "b"]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(bandit.trained_labels(), vec!["click"]);
    }

    #[test]
    fn test_rejects_invalid_construction() {
        assert!(Bandit::new(BanditConfig {
            temperature: -1.0,
            ..Default::default()
        })
        .is_err());
        assert!(Bandit::new(BanditConfig {
            slate_size: 0,
            ..Default::default()
        })
        .is_err());
        assert!(Bandit::new(BanditConfig {
            actions: CatalogInput::from(vec!["a", "a"]),
            ..Default::default()
        })
        .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_feedback_all_applies() {
        let bandit = std::sync::Arc::new(make_bandit(0.5));
        let context = morning_context();
        let recommendation = bandit
            .recommend(&context, &DecisionOptions::default())
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bandit = std::sync::Arc::clone(&bandit);
            let recommendation = recommendation.clone();
            handles.push(tokio::spawn(async move {
                bandit.accept(&recommendation).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Eight positive updates leave the accepted action clearly ahead
        let scored = bandit
            .scored_actions(&context, &DecisionOptions::default())
            .unwrap();
        let accepted = scored
            .iter()
            .find(|s| s.action_id == recommendation.action_id)
            .unwrap();
        assert!(scored
            .iter()
            .filter(|s| s.action_id != recommendation.action_id)
            .all(|other| accepted.score >= other.score));
    }
}
