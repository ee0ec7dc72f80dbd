//! Request, answer, and cache document types.

pub mod cache;
pub mod template;

pub use cache::{CacheEntry, CacheKey, CachedQuestion, EmbeddingRecord};
pub use template::{
    AnswerGroup, GenerationRequest, Question, QuestionContent, QuestionSlot, SlotGroup,
    TemplateGroup, UnitLevel,
};
