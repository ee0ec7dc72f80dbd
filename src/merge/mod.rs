//! Positional merge of generated answers into partially cached answer sets.


use thiserror::Error;
use tracing::warn;

use crate::model::AnswerGroup;
use crate::reader::ResidualIndices;

/// Whole-call alignment failures. Nothing is merged when one of these occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("residual descriptors ({residual}) do not align with existing groups ({existing})")]
    GroupCountMismatch { existing: usize, residual: usize },

    #[error("expected {expected} generated groups for the residual, got {actual}")]
    GeneratedCountMismatch { expected: usize, actual: usize },
}

/// Per-group structural failures. The affected group is left unmerged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupMergeError {
    #[error("group {group}: question type '{existing}' does not match residual '{residual}'")]
    TypeMismatch {
        group: usize,
        existing: String,
        residual: String,
    },

    #[error("group {group}: {indices} residual indices but {generated} generated questions")]
    CountMismatch {
        group: usize,
        indices: usize,
        generated: usize,
    },

    #[error("group {group}: index {index} is past the end of a {len}-question list")]
    IndexOutOfRange { group: usize, index: usize, len: usize },
}

pub type MergeResult<T> = Result<T, MergeError>;

/// Merged groups plus the groups that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub groups: Vec<AnswerGroup>,
    pub skipped: Vec<GroupMergeError>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Pairs each residual descriptor with its generated group.
///
/// `None` descriptors consume no generated group, so the output is aligned 1:1 with the
/// original template.
pub fn pad_generated<'a, T>(
    residual_indices: &'a [Option<ResidualIndices>],
    generated: &'a [T],
) -> MergeResult<Vec<Option<(&'a ResidualIndices, &'a T)>>> {
    let expected = residual_indices.iter().flatten().count();
    if expected != generated.len() {
        return Err(MergeError::GeneratedCountMismatch {
            expected,
            actual: generated.len(),
        });
    }

    let mut generated = generated.iter();
    Ok(residual_indices
        .iter()
        .map(|descriptor| {
            descriptor
                .as_ref()
                .and_then(|d| generated.next().map(|g| (d, g)))
        })
        .collect())
}

/// Inserts each generated question at its recorded position.
///
/// The existing lists already omit the missing slots, so this inserts rather than
/// overwrites. Pure: the same inputs always produce the same output.
pub fn merge(
    existing: Vec<AnswerGroup>,
    newly_generated: &[AnswerGroup],
    residual_indices: &[Option<ResidualIndices>],
) -> MergeResult<MergeOutcome> {
    if existing.len() != residual_indices.len() {
        return Err(MergeError::GroupCountMismatch {
            existing: existing.len(),
            residual: residual_indices.len(),
        });
    }

    let padded = pad_generated(residual_indices, newly_generated)?;
    let mut skipped = Vec::new();

    let groups = existing
        .into_iter()
        .zip(padded)
        .enumerate()
        .map(|(index, (group, pair))| match pair {
            None => group,
            Some((descriptor, generated)) => match merge_group(index, &group, descriptor, generated) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!(error = %e, "Skipping group during merge");
                    skipped.push(e);
                    group
                }
            },
        })
        .collect();

    Ok(MergeOutcome { groups, skipped })
}

fn merge_group(
    index: usize,
    existing: &AnswerGroup,
    descriptor: &ResidualIndices,
    generated: &AnswerGroup,
) -> Result<AnswerGroup, GroupMergeError> {
    if existing.question_type != descriptor.question_type {
        return Err(GroupMergeError::TypeMismatch {
            group: index,
            existing: existing.question_type.clone(),
            residual: descriptor.question_type.clone(),
        });
    }

    if descriptor.indices.len() != generated.questions.len() {
        return Err(GroupMergeError::CountMismatch {
            group: index,
            indices: descriptor.indices.len(),
            generated: generated.questions.len(),
        });
    }

    let mut positions: Vec<(usize, usize)> = descriptor
        .indices
        .iter()
        .copied()
        .enumerate()
        .map(|(i, position)| (position, i))
        .collect();
    positions.sort_unstable();

    let mut merged = existing.clone();
    for (position, source) in positions {
        if position > merged.questions.len() {
            return Err(GroupMergeError::IndexOutOfRange {
                group: index,
                index: position,
                len: merged.questions.len(),
            });
        }
        merged
            .questions
            .insert(position, generated.questions[source].clone());
    }
    merged.number_of_questions += descriptor.indices.len();

    Ok(merged)
}
