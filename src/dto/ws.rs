use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from participant WebSocket clients.
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// First message on every connection; carries the user ID.
    Identify {
        /// Opaque user identifier, validated against the user directory.
        user_id: String,
    },
    /// Subscribe to announcements about events that have not started yet.
    JoinUpcomingEvents,
    /// Unsubscribe from the upcoming-events feed.
    LeaveUpcomingEvents,
    /// Join one event room.
    JoinEvent {
        /// Date key of the owning quiz.
        quiz_id: String,
        /// Event identifier.
        event_id: Uuid,
    },
    /// Leave one event room.
    LeaveEvent {
        /// Date key of the owning quiz.
        quiz_id: String,
        /// Event identifier.
        event_id: Uuid,
    },
    /// Submit an answer for the question currently showing.
    SubmitAnswer(SubmitAnswer),
    /// Request the current standings of one event.
    GetLeaderboard {
        /// Date key of the owning quiz.
        quiz_id: String,
        /// Event identifier.
        event_id: Uuid,
    },
    /// Anything unrecognised; answered with an error message.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
/// Answer submission payload.
pub struct SubmitAnswer {
    /// Date key of the owning quiz.
    pub quiz_id: String,
    /// Event identifier.
    pub event_id: Uuid,
    /// Position of the question being answered.
    pub question_index: usize,
    /// Submitted answer text.
    #[validate(length(min = 1, max = 512))]
    pub answer: String,
    /// Client epoch-ms at which the answer was submitted.
    pub answer_time: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Positive acknowledgement sent after a successful `identify`.
pub struct IdentifyAck {
    /// Echoed user identifier.
    pub user_id: String,
    /// Display name from the user directory.
    pub display_name: String,
    /// Always `"identified"`.
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Unicast acknowledgement of a `join-event` request.
pub struct JoinAck {
    /// Event identifier.
    pub event_id: Uuid,
    /// `"waiting"` before the event starts, `"joined"` once it is live.
    pub status: String,
    /// Participants registered so far, present once live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<usize>,
    /// Question currently showing, for mid-countdown joins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<crate::dto::common::QuestionSnapshot>,
    /// Milliseconds already elapsed from that question's window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Unicast result of an answer submission.
pub struct AnswerResult {
    /// Whether the submission was recorded.
    pub success: bool,
    /// Whether the answer matched.
    pub is_correct: bool,
    /// Points awarded.
    pub score: u32,
    /// The correct answer, echoed back to the submitter.
    pub correct_answer: String,
    /// Explanation of the answer.
    pub explanation: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Unicast error envelope.
pub struct ErrorMessage {
    /// Always `"error"`.
    pub r#type: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorMessage {
    /// Error envelope with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            r#type: "error".into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"identify","user_id":"u1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Identify { user_id } if user_id == "u1"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"submit-answer","quiz_id":"2026-08-30","event_id":"4f9c1c9a-7a91-4a0e-9db1-93a9f1f3a111","question_index":2,"answer":"Paris","answer_time":1756500000000}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::SubmitAnswer(submit) => {
                assert_eq!(submit.question_index, 2);
                assert_eq!(submit.answer, "Paris");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_message_type_falls_through() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"dance"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }
}
