use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc, serialize_to_bson},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoEventDocument, MongoParticipantDocument, MongoQuestionDocument, MongoQuizDocument,
        MongoUserDocument, doc_id, uuid_as_binary,
    },
};
use crate::dao::{
    models::{
        DailyQuizEntity, EventEntity, ParticipantEntity, QuestionEntity, UserEntity, WinnerEntity,
    },
    quiz_store::QuizStore,
    storage::StorageResult,
};

const QUIZ_COLLECTION: &str = "quizzes";
const EVENT_COLLECTION: &str = "events";
const PARTICIPANT_COLLECTION: &str = "participants";
const QUESTION_COLLECTION: &str = "questions";
const USER_COLLECTION: &str = "users";

/// MongoDB-backed [`QuizStore`].
#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let events = database.collection::<MongoEventDocument>(EVENT_COLLECTION);
        let by_quiz = IndexModel::builder()
            .keys(doc! {"quiz_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("event_quiz_idx".to_owned()))
                    .build(),
            )
            .build();
        events
            .create_index(by_quiz)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EVENT_COLLECTION,
                index: "quiz_id",
                source,
            })?;

        // The stale-event reconciliation scan filters on status and end time.
        let by_window = IndexModel::builder()
            .keys(doc! {"status": 1, "end_time": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("event_window_idx".to_owned()))
                    .build(),
            )
            .build();
        events
            .create_index(by_window)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EVENT_COLLECTION,
                index: "status,end_time",
                source,
            })?;

        // One participant record per (event, user) pair, enforced by the store.
        let participants = database.collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION);
        let unique_participant = IndexModel::builder()
            .keys(doc! {"event_id": 1, "user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_event_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        participants
            .create_index(unique_participant)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION,
                index: "event_id,user_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn quiz_collection(&self) -> Collection<MongoQuizDocument> {
        self.database()
            .await
            .collection::<MongoQuizDocument>(QUIZ_COLLECTION)
    }

    async fn event_collection(&self) -> Collection<MongoEventDocument> {
        self.database()
            .await
            .collection::<MongoEventDocument>(EVENT_COLLECTION)
    }

    async fn participant_collection(&self) -> Collection<MongoParticipantDocument> {
        self.database()
            .await
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION)
    }

    async fn load_participants(&self, event_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let collection = self.participant_collection().await;
        let documents: Vec<MongoParticipantDocument> = collection
            .find(doc! {"event_id": uuid_as_binary(event_id)})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::Participant { event_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Participant { event_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_quiz(&self, quiz: DailyQuizEntity) -> MongoResult<()> {
        let quiz_doc = MongoQuizDocument::from(&quiz);
        let id = quiz.id.clone();

        let events = self.event_collection().await;
        for event in &quiz.events {
            let event_doc = MongoEventDocument::from(event);
            events
                .replace_one(doc_id(event.id), &event_doc)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::Event {
                    id: event.id,
                    source,
                })?;
        }

        let quizzes = self.quiz_collection().await;
        quizzes
            .replace_one(doc! {"_id": &quiz_doc.id}, &quiz_doc)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveQuiz { id, source })?;

        Ok(())
    }

    async fn find_quiz(&self, date: String) -> MongoResult<Option<DailyQuizEntity>> {
        let quizzes = self.quiz_collection().await;
        let Some(quiz_doc) = quizzes
            .find_one(doc! {"_id": &date})
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: date.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        let events_coll = self.event_collection().await;
        let event_docs: Vec<MongoEventDocument> = events_coll
            .find(doc! {"quiz_id": &date})
            .sort(doc! {"start_time": 1})
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: date.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: date.clone(),
                source,
            })?;

        let mut events = Vec::with_capacity(event_docs.len());
        for event_doc in event_docs {
            let participants = self.load_participants(event_doc.id).await?;
            events.push(event_doc.into_entity(participants));
        }

        Ok(Some(DailyQuizEntity {
            id: quiz_doc.id,
            theme: quiz_doc.theme,
            question_ids: quiz_doc.question_ids,
            events,
        }))
    }

    async fn find_event(&self, event_id: Uuid) -> MongoResult<Option<EventEntity>> {
        let events = self.event_collection().await;
        let Some(event_doc) = events
            .find_one(doc_id(event_id))
            .await
            .map_err(|source| MongoDaoError::Event {
                id: event_id,
                source,
            })?
        else {
            return Ok(None);
        };

        let participants = self.load_participants(event_id).await?;
        Ok(Some(event_doc.into_entity(participants)))
    }

    async fn activate_event(&self, event_id: Uuid) -> MongoResult<bool> {
        let events = self.event_collection().await;
        let result = events
            .update_one(
                doc! {"_id": uuid_as_binary(event_id), "status": "scheduled"},
                doc! {"$set": {"status": "active"}},
            )
            .await
            .map_err(|source| MongoDaoError::Event {
                id: event_id,
                source,
            })?;
        Ok(result.modified_count > 0)
    }

    async fn set_current_question(&self, event_id: Uuid, index: usize) -> MongoResult<()> {
        let events = self.event_collection().await;
        events
            .update_one(
                doc! {"_id": uuid_as_binary(event_id), "status": "active"},
                doc! {"$set": {"current_question_index": index as i64}},
            )
            .await
            .map_err(|source| MongoDaoError::Event {
                id: event_id,
                source,
            })?;
        Ok(())
    }

    async fn complete_event(
        &self,
        event_id: Uuid,
        winner: Option<WinnerEntity>,
    ) -> MongoResult<bool> {
        let winner_bson = serialize_to_bson(&winner).map_err(|source| MongoDaoError::Event {
            id: event_id,
            source: source.into(),
        })?;

        let events = self.event_collection().await;
        let result = events
            .update_one(
                // Guard keeps completion a one-shot transition at the document level.
                doc! {"_id": uuid_as_binary(event_id), "status": {"$ne": "completed"}},
                doc! {"$set": {"status": "completed", "winner": winner_bson}},
            )
            .await
            .map_err(|source| MongoDaoError::Event {
                id: event_id,
                source,
            })?;
        Ok(result.modified_count > 0)
    }

    async fn save_participant(
        &self,
        event_id: Uuid,
        participant: ParticipantEntity,
    ) -> MongoResult<()> {
        let document: MongoParticipantDocument = (event_id, participant).into();
        let collection = self.participant_collection().await;
        collection
            .replace_one(
                doc! {"event_id": uuid_as_binary(event_id), "user_id": &document.user_id},
                &document,
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Participant { event_id, source })?;
        Ok(())
    }

    async fn find_participant(
        &self,
        event_id: Uuid,
        user_id: String,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let collection = self.participant_collection().await;
        let document = collection
            .find_one(doc! {"event_id": uuid_as_binary(event_id), "user_id": &user_id})
            .await
            .map_err(|source| MongoDaoError::Participant { event_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_stale_events(&self, now: SystemTime) -> MongoResult<Vec<EventEntity>> {
        let events = self.event_collection().await;
        let documents: Vec<MongoEventDocument> = events
            .find(doc! {
                "status": {"$ne": "completed"},
                "end_time": {"$lt": DateTime::from_system_time(now)},
            })
            .await
            .map_err(|source| MongoDaoError::StaleScan { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::StaleScan { source })?;

        let mut stale = Vec::with_capacity(documents.len());
        for document in documents {
            let participants = self.load_participants(document.id).await?;
            stale.push(document.into_entity(participants));
        }
        Ok(stale)
    }

    async fn fetch_questions(&self, ids: Vec<Uuid>) -> MongoResult<Vec<QuestionEntity>> {
        let database = self.database().await;
        let collection = database.collection::<MongoQuestionDocument>(QUESTION_COLLECTION);

        let binaries: Vec<_> = ids.iter().copied().map(uuid_as_binary).collect();
        let documents: Vec<MongoQuestionDocument> = collection
            .find(doc! {"_id": {"$in": binaries}})
            .await
            .map_err(|source| MongoDaoError::Questions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Questions { source })?;

        // Preserve the rotation order of the requested ids.
        let mut questions: Vec<QuestionEntity> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(document) = documents.iter().find(|doc| doc.id == id) {
                questions.push(document.clone().into());
            }
        }
        Ok(questions)
    }

    async fn sample_question_ids(&self, count: usize) -> MongoResult<Vec<Uuid>> {
        let database = self.database().await;
        let collection = database.collection::<MongoQuestionDocument>(QUESTION_COLLECTION);

        let mut cursor = collection
            .aggregate(vec![doc! {"$sample": {"size": count as i64}}])
            .await
            .map_err(|source| MongoDaoError::Questions { source })?
            .with_type::<MongoQuestionDocument>();

        let mut ids = Vec::with_capacity(count);
        while let Some(document) = cursor
            .try_next()
            .await
            .map_err(|source| MongoDaoError::Questions { source })?
        {
            ids.push(document.id);
        }
        Ok(ids)
    }

    async fn find_user(&self, id: String) -> MongoResult<Option<UserEntity>> {
        let database = self.database().await;
        let collection = database.collection::<MongoUserDocument>(USER_COLLECTION);

        let document = collection
            .find_one(doc! {"_id": &id})
            .await
            .map_err(|source| MongoDaoError::User {
                id: id.clone(),
                source,
            })?;
        Ok(document.map(Into::into))
    }
}

impl QuizStore for MongoQuizStore {
    fn save_quiz(&self, quiz: DailyQuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_quiz(quiz).await.map_err(Into::into) })
    }

    fn find_quiz(
        &self,
        date: String,
    ) -> BoxFuture<'static, StorageResult<Option<DailyQuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(date).await.map_err(Into::into) })
    }

    fn find_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_event(event_id).await.map_err(Into::into) })
    }

    fn activate_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.activate_event(event_id).await.map_err(Into::into) })
    }

    fn set_current_question(
        &self,
        event_id: Uuid,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_current_question(event_id, index)
                .await
                .map_err(Into::into)
        })
    }

    fn complete_event(
        &self,
        event_id: Uuid,
        winner: Option<WinnerEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .complete_event(event_id, winner)
                .await
                .map_err(Into::into)
        })
    }

    fn save_participant(
        &self,
        event_id: Uuid,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_participant(event_id, participant)
                .await
                .map_err(Into::into)
        })
    }

    fn find_participant(
        &self,
        event_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participant(event_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn find_stale_events(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_stale_events(now).await.map_err(Into::into) })
    }

    fn fetch_questions(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_questions(ids).await.map_err(Into::into) })
    }

    fn sample_question_ids(&self, count: usize) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.sample_question_ids(count).await.map_err(Into::into) })
    }

    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
