//! Preference scoring of answer completions
//!
//! Scores a text by summing the model's softmax-normalized output
//! distribution over every position, then compares a statement's correct
//! completion against its incorrect alternatives.
//!
//! The aggregate grows with sequence length, so longer completions score
//! higher regardless of content. That is the behavior this tool ships
//! with; a masked log-probability variant would be a different contract.

use anyhow::{ensure, Result};
use candle_core::DType;
use tracing::debug;

use crate::model::{forward_text, TapBackend};

/// Score a text: softmax over the vocabulary at every position, summed
/// over all positions and vocabulary entries.
// TODO: mask prompt tokens so only the completion contributes to the score
pub fn score(model: &dyn TapBackend, text: &str) -> Result<f32> {
    let logits = forward_text(model, text)?;
    let probs = candle_nn::ops::softmax_last_dim(&logits)?;
    let total = probs.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()?;
    Ok(total)
}

/// True iff the correct completion strictly beats every incorrect one.
/// Ties lose.
pub fn preference_label(correct_score: f32, incorrect_scores: &[f32]) -> bool {
    let best_incorrect = incorrect_scores
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    correct_score > best_incorrect
}

/// Label each statement by whether the model prefers its correct answer.
///
/// For statement `i`, scores `"{statement} {correct_answers[i]}"` against
/// one concatenation per entry of `incorrect_answers[i]`. Output order
/// matches input order.
pub fn evaluate(
    model: &dyn TapBackend,
    statements: &[String],
    correct_answers: &[String],
    incorrect_answers: &[Vec<String>],
) -> Result<Vec<bool>> {
    ensure!(
        statements.len() == correct_answers.len()
            && statements.len() == incorrect_answers.len(),
        "statements ({}), correct answers ({}) and incorrect answers ({}) must be parallel",
        statements.len(),
        correct_answers.len(),
        incorrect_answers.len()
    );

    let mut labels = Vec::with_capacity(statements.len());
    for (i, statement) in statements.iter().enumerate() {
        let incorrect = &incorrect_answers[i];
        ensure!(
            !incorrect.is_empty(),
            "statement {i} has no incorrect answers to compare against"
        );

        let correct_score = score(model, &format!("{statement} {}", correct_answers[i]))?;

        let mut incorrect_scores = Vec::with_capacity(incorrect.len());
        for answer in incorrect {
            incorrect_scores.push(score(model, &format!("{statement} {answer}"))?);
        }

        let label = preference_label(correct_score, &incorrect_scores);
        debug!(
            "statement {}: correct {:.3} vs best incorrect {:.3} -> {}",
            i,
            correct_score,
            incorrect_scores
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max),
            label
        );
        labels.push(label);
    }

    Ok(labels)
}
