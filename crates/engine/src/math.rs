//! Stateless numeric primitives: numerically-stable softmax, weighted
//! sampling from a discrete distribution, cosine similarity, and the
//! weighted harmonic mean.

use offerpilot_core::{OfferPilotError, PilotResult};
use rand::Rng;

/// Convert raw scores to a probability distribution via temperature-scaled
/// softmax. The maximum score is subtracted before exponentiation so large
/// logits cannot overflow.
pub fn softmax(scores: &[f64], temperature: f64) -> PilotResult<Vec<f64>> {
    if scores.is_empty() {
        return Err(OfferPilotError::Numeric(
            "softmax requires a non-empty score list".to_string(),
        ));
    }
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(OfferPilotError::Numeric(format!(
            "softmax temperature must be greater than zero, got {}",
            temperature
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(OfferPilotError::Numeric(format!(
            "non-finite score {} passed to softmax",
            bad
        )));
    }

    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores
        .iter()
        .map(|s| ((s - max) / temperature).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Draw an index from a discrete probability distribution by inverting the
/// cumulative distribution against a uniform draw in `[0, 1)`.
pub fn sample_index(probabilities: &[f64]) -> PilotResult<usize> {
    let draw = rand::thread_rng().gen::<f64>();
    sample_index_with(probabilities, draw)
}

/// Deterministic core of [`sample_index`]: returns the smallest index whose
/// cumulative probability exceeds `draw`. The distribution is normalized to
/// sum 1 first, and the final cumulative bucket is clamped to 1.0 so
/// floating-point shortfall can never push the draw past every bucket.
pub fn sample_index_with(probabilities: &[f64], draw: f64) -> PilotResult<usize> {
    if probabilities.is_empty() {
        return Err(OfferPilotError::Numeric(
            "cannot sample from an empty distribution".to_string(),
        ));
    }
    if let Some(bad) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(OfferPilotError::Numeric(format!(
            "probability {} is outside [0, 1]",
            bad
        )));
    }
    let sum: f64 = probabilities.iter().sum();
    if sum <= 0.0 {
        return Err(OfferPilotError::Numeric(
            "probability distribution must sum to a value greater than zero".to_string(),
        ));
    }

    let last = probabilities.len() - 1;
    let mut cumulative = 0.0;
    for (i, p) in probabilities.iter().enumerate() {
        cumulative += p / sum;
        if i == last {
            cumulative = 1.0;
        }
        if draw < cumulative {
            return Ok(i);
        }
    }
    Ok(last)
}

/// Cosine similarity of two equal-length vectors. Two empty vectors are
/// defined to have similarity 0, as is any zero-magnitude vector.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> PilotResult<f64> {
    if a.len() != b.len() {
        return Err(OfferPilotError::Numeric(format!(
            "cosine similarity length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if let Some(bad) = a.iter().chain(b.iter()).find(|v| !v.is_finite()) {
        return Err(OfferPilotError::Numeric(format!(
            "non-finite value {} passed to cosine similarity",
            bad
        )));
    }
    if a.is_empty() {
        return Ok(0.0);
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (mag_a * mag_b))
}

/// Weighted harmonic mean: `Σw / Σ(w/v)`. Undefined for zero values.
pub fn weighted_harmonic_mean(values: &[f64], weights: &[f64]) -> PilotResult<f64> {
    if values.len() != weights.len() {
        return Err(OfferPilotError::Numeric(format!(
            "harmonic mean length mismatch: {} values vs {} weights",
            values.len(),
            weights.len()
        )));
    }
    if values.iter().any(|v| *v == 0.0) {
        return Err(OfferPilotError::Numeric(
            "harmonic mean is undefined for zero values".to_string(),
        ));
    }

    let weight_sum: f64 = weights.iter().sum();
    let denominator: f64 = values.iter().zip(weights.iter()).map(|(v, w)| w / v).sum();
    Ok(weight_sum / denominator)
}
