use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    AnswerRecordEntity, DailyQuizEntity, EventEntity, EventStatus, ParticipantEntity,
    QuestionEntity, SubscriptionTier, UserEntity, WinnerEntity,
};

/// Quiz document: events live in their own collection, referenced by ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub theme: String,
    pub question_ids: Vec<Uuid>,
    pub event_ids: Vec<Uuid>,
}

impl From<&DailyQuizEntity> for MongoQuizDocument {
    fn from(value: &DailyQuizEntity) -> Self {
        Self {
            id: value.id.clone(),
            theme: value.theme.clone(),
            question_ids: value.question_ids.clone(),
            event_ids: value.events.iter().map(|event| event.id).collect(),
        }
    }
}

/// Event document; participants live in their own collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub quiz_id: String,
    pub start_time: DateTime,
    pub end_time: DateTime,
    pub status: EventStatus,
    pub current_question_index: Option<usize>,
    pub winner: Option<WinnerEntity>,
}

impl From<&EventEntity> for MongoEventDocument {
    fn from(value: &EventEntity) -> Self {
        Self {
            id: value.id,
            quiz_id: value.quiz_id.clone(),
            start_time: DateTime::from_system_time(value.start_time),
            end_time: DateTime::from_system_time(value.end_time),
            status: value.status,
            current_question_index: value.current_question_index,
            winner: value.winner.clone(),
        }
    }
}

impl MongoEventDocument {
    /// Rebuild the entity, attaching participants loaded separately.
    pub fn into_entity(self, participants: Vec<ParticipantEntity>) -> EventEntity {
        EventEntity {
            id: self.id,
            quiz_id: self.quiz_id,
            start_time: self.start_time.to_system_time(),
            end_time: self.end_time.to_system_time(),
            status: self.status,
            current_question_index: self.current_question_index,
            participants,
            winner: self.winner,
        }
    }
}

/// Participant document keyed by (event, user); `joined_at` orders the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    pub event_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime,
    pub score: u32,
    pub correct_answers: u32,
    pub answers: Vec<Option<AnswerRecordEntity>>,
}

impl From<(Uuid, ParticipantEntity)> for MongoParticipantDocument {
    fn from((event_id, value): (Uuid, ParticipantEntity)) -> Self {
        Self {
            event_id,
            user_id: value.user_id,
            display_name: value.display_name,
            joined_at: DateTime::from_system_time(value.joined_at),
            score: value.score,
            correct_answers: value.correct_answers,
            answers: value.answers,
        }
    }
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            user_id: value.user_id,
            display_name: value.display_name,
            joined_at: value.joined_at.to_system_time(),
            score: value.score,
            correct_answers: value.correct_answers,
            answers: value.answers,
        }
    }
}

/// Question document in the read-only question bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub text: String,
    pub correct_answer: String,
    pub category: String,
    pub difficulty: String,
    pub explanation: String,
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: value.id,
            text: value.text,
            correct_answer: value.correct_answer,
            category: value.category,
            difficulty: value.difficulty,
            explanation: value.explanation,
        }
    }
}

/// User directory document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub display_name: String,
    pub tier: SubscriptionTier,
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            tier: value.tier,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
