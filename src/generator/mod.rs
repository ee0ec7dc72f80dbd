//! Seam to the external question generation service.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AnswerGroup, TemplateGroup};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generator returned {actual} groups for a {expected}-group residual")]
    ShapeMismatch { expected: usize, actual: usize },
}

pub type GeneratorResult<T> = Result<T, GeneratorError>;

#[async_trait]
/// Produces questions for the residual template.
///
/// The response must contain one [`AnswerGroup`] per residual group, in order.
/// `accepted` holds the cache hits already chosen for the request, so the service can
/// avoid repeating them.
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        residual: &[TemplateGroup],
        accepted: &[AnswerGroup],
    ) -> GeneratorResult<Vec<AnswerGroup>>;
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockGenerator;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{GeneratorError, GeneratorResult, QuestionGenerator};
    use crate::model::{AnswerGroup, Question, QuestionContent, TemplateGroup};

    /// Deterministic generator for tests.
    ///
    /// Each slot yields a text question named after its unit and objective plus a running
    /// letter tag, so every generated body stays distinct after normalization.
    #[derive(Default, Clone)]
    pub struct MockGenerator {
        calls: Arc<AtomicUsize>,
        produced: Arc<AtomicUsize>,
        should_fail: Arc<AtomicBool>,
        drop_last_group: Arc<AtomicBool>,
    }

    impl MockGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }

        /// Makes responses one group short of the residual.
        pub fn set_drop_last_group(&self, drop: bool) {
            self.drop_last_group.store(drop, Ordering::SeqCst);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn question_for(&self, group: &TemplateGroup, index: usize) -> Question {
            let slot = &group.slots()[index];
            let tag = letter_tag(self.produced.fetch_add(1, Ordering::SeqCst));
            let content = if group.is_cacheable() {
                QuestionContent::text(format!(
                    "Generated question {tag} about {} for {}",
                    slot.unit_name, slot.objective
                ))
            } else {
                QuestionContent::Match {
                    left: vec![format!("{} term {tag}", slot.unit_name)],
                    right: vec![format!("{} meaning {tag}", slot.objective)],
                }
            };
            Question::new(slot.unit_name.clone(), slot.objective.clone(), content)
        }
    }

    /// Spells `n` in base-26 letters so it survives text normalization.
    fn letter_tag(mut n: usize) -> String {
        let mut tag = Vec::new();
        loop {
            tag.push(b'a' + (n % 26) as u8);
            n /= 26;
            if n == 0 {
                break;
            }
        }
        tag.reverse();
        String::from_utf8_lossy(&tag).into_owned()
    }

    #[async_trait]
    impl QuestionGenerator for MockGenerator {
        async fn generate(
            &self,
            residual: &[TemplateGroup],
            _accepted: &[AnswerGroup],
        ) -> GeneratorResult<Vec<AnswerGroup>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(GeneratorError::Unavailable("mock failure".to_string()));
            }

            let mut groups: Vec<AnswerGroup> = residual
                .iter()
                .map(|group| {
                    let questions = (0..group.len())
                        .map(|i| self.question_for(group, i))
                        .collect();
                    AnswerGroup::with_questions(
                        group.question_type(),
                        group.marks_per_question(),
                        questions,
                    )
                })
                .collect();

            if self.drop_last_group.load(Ordering::SeqCst) {
                groups.pop();
            }
            Ok(groups)
        }
    }
}
