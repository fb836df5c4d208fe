//! Score decoding.
//!
//! Maps a raw score matrix from the classifier head to a labeled prediction.
//! A single-column head carries sigmoid semantics (one probability for the
//! positive class); a wider head carries softmax semantics and is decoded by
//! argmax.

use crate::core::errors::{TriageError, TriageResult};
use crate::runtime::ScoreMatrix;
use serde::Serialize;

/// A decoded classifier prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// The human-readable class label.
    pub label: String,
    /// Confidence in the predicted label, in `[0, 1]`.
    pub probability: f32,
    /// Index of the predicted class in the score head.
    ///
    /// For a sigmoid head this is always 0 (the sole output column), for both
    /// the positive and the negative outcome. It selects the logit a visual
    /// explanation is computed against.
    pub class_index: usize,
}

/// Decodes a score matrix into a [`PredictionResult`].
///
/// # Arguments
///
/// * `scores` - A `(1, k)` score matrix from the classifier head.
/// * `labels` - Class labels; sigmoid heads (`k == 1`) need exactly two,
///   ordered negative then positive, wider heads need one per column.
///
/// # Errors
///
/// Rejects empty or multi-row score matrices and label lists whose length
/// doesn't match the head width.
pub fn decide(scores: &ScoreMatrix, labels: &[String]) -> TriageResult<PredictionResult> {
    if scores.nrows() != 1 || scores.ncols() == 0 {
        return Err(TriageError::invalid_input(format!(
            "expected a (1, k) score matrix with k >= 1, got ({}, {})",
            scores.nrows(),
            scores.ncols()
        )));
    }

    let row = scores.row(0);

    if scores.ncols() == 1 {
        if labels.len() != 2 {
            return Err(TriageError::invalid_input(format!(
                "sigmoid head needs exactly 2 labels, got {}",
                labels.len()
            )));
        }
        let p = row[0];
        let positive = p >= 0.5;
        return Ok(PredictionResult {
            label: labels[usize::from(positive)].clone(),
            probability: if positive { p } else { 1.0 - p },
            class_index: 0,
        });
    }

    if labels.len() != scores.ncols() {
        return Err(TriageError::invalid_input(format!(
            "{} score column(s) but {} label(s)",
            scores.ncols(),
            labels.len()
        )));
    }

    // Argmax; ties keep the earliest column.
    let (class_index, &probability) = row
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, &f32)>, (i, v)| match best {
            Some((_, bv)) if *bv >= *v => best,
            _ => Some((i, v)),
        })
        .ok_or_else(|| TriageError::invalid_input("empty score row"))?;

    Ok(PredictionResult {
        label: labels[class_index].clone(),
        probability,
        class_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sigmoid_positive() {
        let scores = ScoreMatrix::from_shape_vec((1, 1), vec![0.7]).unwrap();
        let result = decide(&scores, &labels(&["no_tumor", "tumor"])).unwrap();
        assert_eq!(result.label, "tumor");
        assert!((result.probability - 0.7).abs() < 1e-6);
        assert_eq!(result.class_index, 0);
    }

    #[test]
    fn sigmoid_negative_flips_probability() {
        let scores = ScoreMatrix::from_shape_vec((1, 1), vec![0.3]).unwrap();
        let result = decide(&scores, &labels(&["no_tumor", "tumor"])).unwrap();
        assert_eq!(result.label, "no_tumor");
        assert!((result.probability - 0.7).abs() < 1e-6);
        assert_eq!(result.class_index, 0);
    }

    #[test]
    fn sigmoid_threshold_is_inclusive() {
        let scores = ScoreMatrix::from_shape_vec((1, 1), vec![0.5]).unwrap();
        let result = decide(&scores, &labels(&["no_tumor", "tumor"])).unwrap();
        assert_eq!(result.label, "tumor");
    }

    #[test]
    fn argmax_decodes_multiclass_head() {
        let scores = ScoreMatrix::from_shape_vec((1, 3), vec![0.1, 0.6, 0.3]).unwrap();
        let result = decide(&scores, &labels(&["glioma", "meningioma", "pituitary"])).unwrap();
        assert_eq!(result.label, "meningioma");
        assert!((result.probability - 0.6).abs() < 1e-6);
        assert_eq!(result.class_index, 1);
    }

    #[test]
    fn argmax_ties_keep_earliest_column() {
        let scores = ScoreMatrix::from_shape_vec((1, 3), vec![0.4, 0.4, 0.2]).unwrap();
        let result = decide(&scores, &labels(&["a", "b", "c"])).unwrap();
        assert_eq!(result.class_index, 0);
    }

    #[test]
    fn label_count_must_match_head_width() {
        let scores = ScoreMatrix::from_shape_vec((1, 3), vec![0.1, 0.6, 0.3]).unwrap();
        assert!(decide(&scores, &labels(&["a", "b"])).is_err());

        let sigmoid = ScoreMatrix::from_shape_vec((1, 1), vec![0.7]).unwrap();
        assert!(decide(&sigmoid, &labels(&["only"])).is_err());
    }

    #[test]
    fn empty_scores_are_rejected() {
        let scores = ScoreMatrix::from_shape_vec((1, 0), Vec::new()).unwrap();
        assert!(decide(&scores, &labels(&["a", "b"])).is_err());
    }
}
