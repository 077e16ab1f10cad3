//! Statement dataset loading
//!
//! Datasets are CSV files with `statement`, `correct_answer` and
//! `incorrect_answers` columns. The incorrect-answers cell is either a
//! JSON list of strings (the common export format) or a single plain
//! string. Rows load wholesale into three parallel vectors; row order is
//! meaningful, it aligns activations with labels downstream.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StatementRow {
    statement: String,
    correct_answer: String,
    incorrect_answers: String,
}

/// A statement dataset: one statement per row with its candidate answers.
#[derive(Debug, Clone)]
pub struct StatementDataset {
    statements: Vec<String>,
    correct: Vec<String>,
    incorrect: Vec<Vec<String>>,
}

impl StatementDataset {
    /// Load a dataset from a CSV file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open dataset {}", path.display()))?;

        let mut statements = Vec::new();
        let mut correct = Vec::new();
        let mut incorrect = Vec::new();

        for (i, row) in reader.deserialize().enumerate() {
            let row: StatementRow = row
                .with_context(|| format!("malformed row {} in {}", i + 1, path.display()))?;
            statements.push(row.statement);
            correct.push(row.correct_answer);
            incorrect.push(parse_answer_cell(&row.incorrect_answers).with_context(|| {
                format!("bad incorrect_answers in row {} of {}", i + 1, path.display())
            })?);
        }

        ensure!(!statements.is_empty(), "dataset {} is empty", path.display());

        Ok(Self {
            statements,
            correct,
            incorrect,
        })
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn correct_answers(&self) -> &[String] {
        &self.correct
    }

    pub fn incorrect_answers(&self) -> &[Vec<String>] {
        &self.incorrect
    }
}

/// Parse an `incorrect_answers` cell: a JSON list of strings, or a single
/// bare answer.
fn parse_answer_cell(cell: &str) -> Result<Vec<String>> {
    let trimmed = cell.trim();
    if trimmed.starts_with('[') {
        let answers: Vec<String> = serde_json::from_str(trimmed)
            .with_context(|| format!("cell is not a JSON string list: {trimmed}"))?;
        Ok(answers)
    } else {
        Ok(vec![trimmed.to_string()])
    }
}
