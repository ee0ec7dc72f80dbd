//! Placement plan for folding generated questions back into cache entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::hashing::{hash_normalized, normalize_question_text};
use crate::merge::{GroupMergeError, MergeError};
use crate::model::{AnswerGroup, CacheEntry, CacheKey, CachedQuestion, TemplateGroup, UnitLevel};

/// Where one generated question lands in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTarget {
    pub unit_id: String,
    pub unit_name: String,
    pub objective: String,
}

/// Placeholders for one residual group, aligned with its generated answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonGroup {
    pub question_type: String,
    pub marks_per_question: u32,
    pub cacheable: bool,
    pub targets: Vec<SlotTarget>,
}

/// A unit touched by the residual template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlaceholder {
    pub unit_id: String,
    pub unit_name: String,
}

/// Per-unit placeholders ready to receive newly generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSkeleton {
    pub unit_level: UnitLevel,
    pub units: Vec<UnitPlaceholder>,
    pub groups: Vec<SkeletonGroup>,
}

/// Question text that still needs an embedding record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmbedding {
    pub hash: String,
    pub normalized_text: String,
}

/// Result of applying generated answers to the skeleton.
#[derive(Debug, Clone, Default)]
pub struct CachePlan {
    /// Entries that gained at least one question, ordered by unit key.
    pub entries: Vec<CacheEntry>,
    /// One item per distinct new question text.
    pub embeddings: Vec<PendingEmbedding>,
    pub appended: usize,
    pub skipped: Vec<GroupMergeError>,
}

impl CachePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hashes(&self) -> Vec<String> {
        self.embeddings.iter().map(|p| p.hash.clone()).collect()
    }
}

impl CacheSkeleton {
    /// Builds placement targets from the residual template, in the order the generator
    /// answers them.
    pub fn from_residual(unit_level: UnitLevel, residual: &[TemplateGroup]) -> Self {
        let mut units: Vec<UnitPlaceholder> = Vec::new();
        let groups = residual
            .iter()
            .map(|group| {
                let targets = group
                    .slots()
                    .iter()
                    .map(|slot| {
                        if !units.iter().any(|u| {
                            u.unit_id == slot.unit_id
                                && u.unit_name.eq_ignore_ascii_case(&slot.unit_name)
                        }) {
                            units.push(UnitPlaceholder {
                                unit_id: slot.unit_id.clone(),
                                unit_name: slot.unit_name.clone(),
                            });
                        }
                        SlotTarget {
                            unit_id: slot.unit_id.clone(),
                            unit_name: slot.unit_name.clone(),
                            objective: slot.objective.clone(),
                        }
                    })
                    .collect();
                SkeletonGroup {
                    question_type: group.question_type().to_string(),
                    marks_per_question: group.marks_per_question(),
                    cacheable: group.is_cacheable(),
                    targets,
                }
            })
            .collect();

        Self {
            unit_level,
            units,
            groups,
        }
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.unit_id.clone()).collect()
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.unit_name.clone()).collect()
    }

    /// Appends generated questions to `current` entries (creating missing ones).
    ///
    /// Group-level mismatches are recorded in [`CachePlan::skipped`]. A question whose
    /// normalized text is already cached under the same objective is not appended twice.
    pub fn apply(
        &self,
        current: Vec<CacheEntry>,
        generated: &[AnswerGroup],
    ) -> Result<CachePlan, MergeError> {
        if generated.len() != self.groups.len() {
            return Err(MergeError::GeneratedCountMismatch {
                expected: self.groups.len(),
                actual: generated.len(),
            });
        }

        let mut entries: BTreeMap<String, CacheEntry> = current
            .into_iter()
            .filter(|e| e.unit_level == self.unit_level)
            .map(|e| (e.key().document_id(), e))
            .collect();
        let mut touched: Vec<String> = Vec::new();
        let mut plan = CachePlan::default();

        for (index, (group, answers)) in self.groups.iter().zip(generated).enumerate() {
            if !group.cacheable {
                debug!(group = index, question_type = %group.question_type, "Not caching group");
                continue;
            }

            if group.question_type != answers.question_type {
                let e = GroupMergeError::TypeMismatch {
                    group: index,
                    existing: group.question_type.clone(),
                    residual: answers.question_type.clone(),
                };
                warn!(error = %e, "Skipping group during reconciliation");
                plan.skipped.push(e);
                continue;
            }

            if group.targets.len() != answers.questions.len() {
                let e = GroupMergeError::CountMismatch {
                    group: index,
                    indices: group.targets.len(),
                    generated: answers.questions.len(),
                };
                warn!(error = %e, "Skipping group during reconciliation");
                plan.skipped.push(e);
                continue;
            }

            for (target, question) in group.targets.iter().zip(&answers.questions) {
                let key = CacheKey::new(target.unit_id.clone(), target.unit_name.clone());
                let id = key.document_id();
                let entry = entries.entry(id.clone()).or_insert_with(|| {
                    CacheEntry::new(target.unit_id.clone(), target.unit_name.clone(), self.unit_level)
                });

                let normalized = normalize_question_text(&question.content.searchable_text());
                let hash = hash_normalized(&normalized);
                if entry
                    .questions_for(&target.objective)
                    .iter()
                    .any(|q| q.embedding_hash == hash)
                {
                    debug!(hash = %hash, "Question already cached under objective");
                    continue;
                }

                entry.append(
                    target.objective.clone(),
                    CachedQuestion {
                        question_type: group.question_type.clone(),
                        marks_per_question: group.marks_per_question,
                        content: question.content.clone(),
                        embedding_hash: hash.clone(),
                    },
                );
                plan.appended += 1;

                if !touched.contains(&id) {
                    touched.push(id);
                }
                if !plan.embeddings.iter().any(|p| p.hash == hash) {
                    plan.embeddings.push(PendingEmbedding {
                        hash,
                        normalized_text: normalized,
                    });
                }
            }
        }

        plan.entries = entries
            .into_iter()
            .filter(|(id, _)| touched.contains(id))
            .map(|(_, e)| e)
            .collect();

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Question, QuestionContent, QuestionSlot};

    fn slot(unit: &str, objective: &str) -> QuestionSlot {
        QuestionSlot::new(format!("{}-id", unit.to_lowercase()), unit, objective)
    }

    fn answers(question_type: &str, bodies: &[&str]) -> AnswerGroup {
        AnswerGroup::with_questions(
            question_type,
            1,
            bodies
                .iter()
                .map(|b| Question::new("ignored", "ignored", QuestionContent::text(*b)))
                .collect(),
        )
    }

    fn residual() -> Vec<TemplateGroup> {
        vec![
            TemplateGroup::new("MCQ", 1, vec![slot("Cells", "Recall"), slot("Plants", "Apply")]),
            TemplateGroup::new("Match the following", 1, vec![slot("Cells", "Recall")]),
        ]
    }

    #[test]
    fn test_from_residual_collects_units_and_targets() {
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual());

        assert_eq!(skeleton.unit_ids(), vec!["cells-id", "plants-id"]);
        assert_eq!(skeleton.groups.len(), 2);
        assert!(skeleton.groups[0].cacheable);
        assert!(!skeleton.groups[1].cacheable);
        assert_eq!(skeleton.groups[0].targets[1].objective, "Apply");
    }

    #[test]
    fn test_apply_creates_entries_and_skips_uncacheable() {
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual());
        let generated = vec![
            answers("MCQ", &["What is a cell?", "How do plants grow?"]),
            answers("Match the following", &["pairs"]),
        ];

        let plan = skeleton.apply(Vec::new(), &generated).expect("aligned");

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.appended, 2);
        assert_eq!(plan.embeddings.len(), 2);
        let cells = plan
            .entries
            .iter()
            .find(|e| e.unit_name == "Cells")
            .expect("cells entry");
        assert_eq!(cells.questions_for("Recall").len(), 1);
        assert_eq!(cells.unit_level, UnitLevel::Chapter);
    }

    #[test]
    fn test_apply_appends_to_existing_entry() {
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual());
        let mut existing = CacheEntry::new("cells-id", "Cells", UnitLevel::Chapter);
        existing.append("Recall", CachedQuestion::new("MCQ", 1, QuestionContent::text("Old")));

        let plan = skeleton
            .apply(
                vec![existing],
                &[answers("MCQ", &["New", "Grow"]), answers("Match the following", &["p"])],
            )
            .expect("aligned");

        let cells = plan
            .entries
            .iter()
            .find(|e| e.unit_name == "Cells")
            .expect("cells entry");
        assert_eq!(cells.questions_for("Recall").len(), 2);
    }

    #[test]
    fn test_apply_is_idempotent_for_same_content() {
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual());
        let generated = vec![
            answers("MCQ", &["What is a cell?", "How do plants grow?"]),
            answers("Match the following", &["pairs"]),
        ];

        let first = skeleton.apply(Vec::new(), &generated).expect("aligned");
        let second = skeleton.apply(first.entries, &generated).expect("aligned");

        assert_eq!(second.appended, 0);
        assert!(second.is_empty());
    }

    #[test]
    fn test_apply_isolates_group_mismatches() {
        let residual = vec![
            TemplateGroup::new("MCQ", 1, vec![slot("Cells", "Recall")]),
            TemplateGroup::new("Essay", 1, vec![slot("Cells", "Apply")]),
        ];
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual);

        let plan = skeleton
            .apply(Vec::new(), &[answers("MCQ", &["a", "b"]), answers("Essay", &["c"])])
            .expect("aligned");

        assert_eq!(plan.appended, 1);
        assert!(matches!(
            plan.skipped.as_slice(),
            [GroupMergeError::CountMismatch { group: 0, .. }]
        ));
    }

    #[test]
    fn test_apply_rejects_group_count_mismatch() {
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual());
        assert!(matches!(
            skeleton.apply(Vec::new(), &[answers("MCQ", &["a", "b"])]),
            Err(MergeError::GeneratedCountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_duplicate_text_gets_one_embedding() {
        let residual = vec![TemplateGroup::new(
            "MCQ",
            1,
            vec![slot("Cells", "Recall"), slot("Plants", "Recall")],
        )];
        let skeleton = CacheSkeleton::from_residual(UnitLevel::Chapter, &residual);

        let plan = skeleton
            .apply(Vec::new(), &[answers("MCQ", &["Same text?", "same TEXT"])])
            .expect("aligned");

        assert_eq!(plan.appended, 2);
        assert_eq!(plan.embeddings.len(), 1);
    }
}
