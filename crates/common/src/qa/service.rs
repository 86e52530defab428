//! QA Service - orchestrates parse → normalize → dispatch → synthesize

use super::dispatcher::QueryDispatcher;
use super::intent::{Entities, QueryType, SuggestionReport};
use super::normalizer::{EntityNormalizer, MatchSettings};
use super::parser::IntentParser;
use super::synthesizer::{AnswerMode, AnswerSynthesizer, SynthesisInput};
use crate::cache::VocabularyCache;
use crate::config::{AppConfig, QaConfig};
use crate::errors::{AppError, Result};
use crate::graph::{GraphRecord, GraphStore};
use crate::llm::{ChatMessage, ChatModel, ChatRole};
use crate::metrics::record_question;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Answer language when the request does not name one
pub const DEFAULT_LANGUAGE: &str = "zh";

/// One prior conversation turn as sent by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct QaOptions {
    /// Result cap for plan-listing queries
    #[validate(range(min = 1, max = 100, message = "max_plans must be between 1 and 100"))]
    pub max_plans: Option<usize>,

    #[validate(length(min = 1, max = 16, message = "language must be 1-16 characters"))]
    pub language: Option<String>,
}

/// QA request body
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QaRequest {
    #[validate(length(max = 2000, message = "question must be at most 2000 characters"))]
    pub question: String,

    #[serde(default)]
    pub history: Option<Vec<HistoryItem>>,

    #[serde(default)]
    #[validate(nested)]
    pub options: Option<QaOptions>,

    /// Query the knowledge graph; `false` answers from general knowledge
    #[serde(default)]
    pub use_kg: Option<bool>,
}

impl QaRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            history: None,
            options: None,
            use_kg: None,
        }
    }
}

/// QA response body; every field but `answer` may be null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    pub answer: String,
    pub query_type: Option<QueryType>,
    pub entities: Option<Entities>,
    pub cypher: Option<String>,
    pub records: Option<Vec<GraphRecord>>,
    pub entity_suggest: Option<SuggestionReport>,
}

/// The question-answering pipeline
pub struct QaService {
    parser: IntentParser,
    normalizer: EntityNormalizer,
    dispatcher: QueryDispatcher,
    synthesizer: AnswerSynthesizer,
    vocabulary: Arc<VocabularyCache>,
    settings: QaConfig,
}

impl QaService {
    /// Wire the pipeline from configuration and its two external services
    pub fn from_config(
        config: &AppConfig,
        chat: Arc<dyn ChatModel>,
        store: Arc<dyn GraphStore>,
    ) -> Result<Self> {
        let vocabulary = Arc::new(VocabularyCache::new(store.clone(), config.vocabulary_ttl()));

        Ok(Self {
            parser: IntentParser::new(
                chat.clone(),
                config.llm.parse_model.clone(),
                config.llm.parse_temperature,
            )?,
            normalizer: EntityNormalizer::new(
                vocabulary.clone(),
                MatchSettings::from(&config.vocabulary),
            ),
            dispatcher: QueryDispatcher::new(store),
            synthesizer: AnswerSynthesizer::from_config(chat, &config.llm),
            vocabulary,
            settings: config.qa.clone(),
        })
    }

    /// Vocabulary cache shared with the normalizer
    pub fn vocabulary(&self) -> &Arc<VocabularyCache> {
        &self.vocabulary
    }

    /// Answer one question
    #[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
    pub async fn answer(&self, request: QaRequest) -> Result<QaResponse> {
        let start = Instant::now();

        let question = request.question.trim();
        if question.is_empty() {
            return Err(AppError::invalid_field("question", "问题不能为空。"));
        }
        request.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        let history = bound_history(request.history.as_deref(), self.settings.max_history_turns);
        let use_kg = request.use_kg.unwrap_or(true);
        let options = request.options.as_ref();
        let max_plans = options
            .and_then(|o| o.max_plans)
            .unwrap_or(self.settings.default_max_plans);
        let language = options
            .and_then(|o| o.language.as_deref())
            .unwrap_or(DEFAULT_LANGUAGE);

        let intent = self.parser.parse(question, &history).await;
        let (normalized, suggestions) = self.normalizer.normalize(intent).await;
        let query_type = normalized.query_type;
        info!(%query_type, use_kg, "Intent resolved");

        let (cypher, records) = if use_kg {
            match self.dispatcher.plan(&normalized, max_plans)? {
                None => (None, Some(Vec::new())),
                Some(query) => {
                    let records = match self.dispatcher.execute(&query).await {
                        Ok(records) => records,
                        Err(e) if self.settings.degrade_on_store_error => {
                            warn!(error = %e, "Graph query failed, answering from empty records");
                            Vec::new()
                        }
                        Err(e) => return Err(e),
                    };
                    (Some(query.cypher.trim().to_string()), Some(records))
                }
            }
        } else {
            (None, None)
        };

        let mode = if use_kg { AnswerMode::Grounded } else { AnswerMode::General };
        let entities = normalized.into_intent().entities;
        let answer = self
            .synthesizer
            .synthesize(SynthesisInput {
                question,
                query_type,
                entities: &entities,
                records: records.as_deref().unwrap_or_default(),
                history: &history,
                mode,
                language,
            })
            .await;

        record_question(start.elapsed().as_secs_f64(), query_type.as_str(), use_kg);

        Ok(QaResponse {
            answer,
            query_type: Some(query_type),
            entities: Some(entities),
            cypher,
            records,
            entity_suggest: suggestions.into_option(),
        })
    }
}

/// Keep user/assistant turns in order, at most the `max_turns` most recent,
/// starting on a user turn
fn bound_history(history: Option<&[HistoryItem]>, max_turns: usize) -> Vec<ChatMessage> {
    let turns: Vec<ChatMessage> = history
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match item.role.as_str() {
            "user" => Some(ChatMessage::user(item.content.clone())),
            "assistant" => Some(ChatMessage::assistant(item.content.clone())),
            _ => None,
        })
        .collect();

    let skip = turns.len().saturating_sub(max_turns);
    turns
        .into_iter()
        .skip(skip)
        .skip_while(|turn| turn.role == ChatRole::Assistant)
        .collect()
}
