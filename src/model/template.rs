//! Request templates and answer groups.

use serde::{Deserialize, Serialize};

use crate::constants::is_match_the_following;

/// Curriculum level a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitLevel {
    Chapter,
    Subtopic,
}

impl std::fmt::Display for UnitLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitLevel::Chapter => write!(f, "CHAPTER"),
            UnitLevel::Subtopic => write!(f, "SUBTOPIC"),
        }
    }
}

/// One required question. Type and marks come from the owning [`SlotGroup`]; the
/// position is the slot's index within that group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSlot {
    pub unit_id: String,
    pub unit_name: String,
    pub objective: String,
}

impl QuestionSlot {
    pub fn new(
        unit_id: impl Into<String>,
        unit_name: impl Into<String>,
        objective: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            unit_name: unit_name.into(),
            objective: objective.into(),
        }
    }
}

/// Ordered slots sharing a question type and mark value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotGroup {
    pub question_type: String,
    pub marks_per_question: u32,
    pub slots: Vec<QuestionSlot>,
}

impl SlotGroup {
    /// Returns a group with the same type/marks holding only the slots at `indices`.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            question_type: self.question_type.clone(),
            marks_per_question: self.marks_per_question,
            slots: indices
                .iter()
                .filter_map(|&i| self.slots.get(i).cloned())
                .collect(),
        }
    }
}

/// A group of the caller's template.
///
/// "Match the following" groups (two parallel column lists) are never served from or
/// written to the cache, so they get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateGroup {
    Standard(SlotGroup),
    MatchTheFollowing(SlotGroup),
}

impl TemplateGroup {
    /// Builds a group, routing "Match the following" to its own variant.
    pub fn new(
        question_type: impl Into<String>,
        marks_per_question: u32,
        slots: Vec<QuestionSlot>,
    ) -> Self {
        let group = SlotGroup {
            question_type: question_type.into(),
            marks_per_question,
            slots,
        };
        if is_match_the_following(&group.question_type) {
            TemplateGroup::MatchTheFollowing(group)
        } else {
            TemplateGroup::Standard(group)
        }
    }

    pub fn slot_group(&self) -> &SlotGroup {
        match self {
            TemplateGroup::Standard(group) | TemplateGroup::MatchTheFollowing(group) => group,
        }
    }

    pub fn question_type(&self) -> &str {
        &self.slot_group().question_type
    }

    pub fn marks_per_question(&self) -> u32 {
        self.slot_group().marks_per_question
    }

    pub fn slots(&self) -> &[QuestionSlot] {
        &self.slot_group().slots
    }

    pub fn len(&self) -> usize {
        self.slot_group().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_group().slots.is_empty()
    }

    /// Returns `true` if this group may be served from and written to the cache.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, TemplateGroup::Standard(_))
    }

    /// Same variant, keeping only the slots at `indices`.
    pub fn select(&self, indices: &[usize]) -> Self {
        match self {
            TemplateGroup::Standard(group) => TemplateGroup::Standard(group.select(indices)),
            TemplateGroup::MatchTheFollowing(group) => {
                TemplateGroup::MatchTheFollowing(group.select(indices))
            }
        }
    }

    /// An empty answer group with this group's type and marks.
    pub fn empty_answers(&self) -> AnswerGroup {
        AnswerGroup::empty(self.question_type(), self.marks_per_question())
    }
}

/// A full generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub unit_level: UnitLevel,
    pub groups: Vec<TemplateGroup>,
}

impl GenerationRequest {
    pub fn new(unit_level: UnitLevel, groups: Vec<TemplateGroup>) -> Self {
        Self { unit_level, groups }
    }

    pub fn total_slots(&self) -> usize {
        self.groups.iter().map(TemplateGroup::len).sum()
    }

    /// Distinct unit ids referenced by any slot, in first-seen order.
    pub fn unit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for slot in self.groups.iter().flat_map(|g| g.slots()) {
            if !ids.contains(&slot.unit_id) {
                ids.push(slot.unit_id.clone());
            }
        }
        ids
    }

    /// Distinct unit names referenced by any slot (case-insensitive), in first-seen order.
    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for slot in self.groups.iter().flat_map(|g| g.slots()) {
            if !names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&slot.unit_name))
            {
                names.push(slot.unit_name.clone());
            }
        }
        names
    }
}

/// Question payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum QuestionContent {
    Text {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    Match {
        left: Vec<String>,
        right: Vec<String>,
    },
}

impl QuestionContent {
    pub fn text(body: impl Into<String>) -> Self {
        QuestionContent::Text {
            body: body.into(),
            answer: None,
            options: Vec::new(),
        }
    }

    /// Text used for normalization and embedding.
    pub fn searchable_text(&self) -> String {
        match self {
            QuestionContent::Text { body, .. } => body.clone(),
            QuestionContent::Match { left, right } => {
                let mut parts = left.clone();
                parts.extend(right.iter().cloned());
                parts.join(" ")
            }
        }
    }
}

/// A question with content, placed under a unit and objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub unit_name: String,
    pub objective: String,
    pub content: QuestionContent,
}

impl Question {
    pub fn new(
        unit_name: impl Into<String>,
        objective: impl Into<String>,
        content: QuestionContent,
    ) -> Self {
        Self {
            unit_name: unit_name.into(),
            objective: objective.into(),
            content,
        }
    }
}

/// Answer-side counterpart of a [`TemplateGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerGroup {
    pub question_type: String,
    pub marks_per_question: u32,
    pub number_of_questions: usize,
    pub questions: Vec<Question>,
}

impl AnswerGroup {
    pub fn empty(question_type: impl Into<String>, marks_per_question: u32) -> Self {
        Self {
            question_type: question_type.into(),
            marks_per_question,
            number_of_questions: 0,
            questions: Vec::new(),
        }
    }

    pub fn with_questions(
        question_type: impl Into<String>,
        marks_per_question: u32,
        questions: Vec<Question>,
    ) -> Self {
        Self {
            question_type: question_type.into(),
            marks_per_question,
            number_of_questions: questions.len(),
            questions,
        }
    }

    pub fn push(&mut self, question: Question) {
        self.questions.push(question);
        self.number_of_questions += 1;
    }
}
