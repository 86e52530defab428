//! In-memory doubles for the external collaborators
//!
//! Enabled for this crate's tests and, through the `test-util` feature,
//! for dependants' tests.

use crate::cache::VocabularySource;
use crate::errors::{AppError, Result};
use crate::graph::{GraphRecord, GraphStore, QueryParams};
use crate::llm::{ChatMessage, ChatModel};
use crate::qa::EntityCategory;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One call observed by `ScriptedChat`
#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Chat model replaying queued completions in order.
/// An exhausted queue behaves like an unreachable service.
#[derive(Default)]
pub struct ScriptedChat {
    responses: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<Vec<RecordedCompletion>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion
    pub fn respond(self, text: impl Into<String>) -> Self {
        lock(&self.responses).push_back(Some(text.into()));
        self
    }

    /// Queue a failed completion
    pub fn fail(self) -> Self {
        lock(&self.responses).push_back(None);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCompletion> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String> {
        lock(&self.calls).push(RecordedCompletion {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature,
        });

        match lock(&self.responses).pop_front() {
            Some(Some(text)) => Ok(text),
            Some(None) => Err(AppError::Generation {
                message: "scripted failure".to_string(),
            }),
            None => Err(AppError::Generation {
                message: "no scripted response left".to_string(),
            }),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Graph store answering vocabulary queries from fixed name lists and
/// every other query with a fixed record set
#[derive(Default)]
pub struct FakeGraphStore {
    vocabularies: HashMap<EntityCategory, Vec<String>>,
    records: Vec<GraphRecord>,
    fail: bool,
    calls: Mutex<Vec<(String, QueryParams)>>,
}

impl FakeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vocabulary<I, S>(mut self, category: EntityCategory, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabularies
            .insert(category, names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_records(mut self, records: Vec<GraphRecord>) -> Self {
        self.records = records;
        self
    }

    /// Make every query fail
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, QueryParams)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Calls other than vocabulary loads
    pub fn query_calls(&self) -> Vec<(String, QueryParams)> {
        lock(&self.calls)
            .iter()
            .filter(|(query, _)| vocabulary_category(query).is_none())
            .cloned()
            .collect()
    }
}

fn vocabulary_category(query: &str) -> Option<EntityCategory> {
    EntityCategory::ALL
        .into_iter()
        .find(|category| category.vocabulary_query() == query)
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn run(&self, query: &str, params: &QueryParams) -> Result<Vec<GraphRecord>> {
        lock(&self.calls).push((query.to_string(), params.clone()));

        if self.fail {
            return Err(AppError::GraphStore {
                message: "connection refused".to_string(),
            });
        }

        match vocabulary_category(query) {
            Some(category) => Ok(self
                .vocabularies
                .get(&category)
                .into_iter()
                .flatten()
                .map(|name| {
                    let mut record = GraphRecord::new();
                    record.insert("name".to_string(), name.clone().into());
                    record
                })
                .collect()),
            None => Ok(self.records.clone()),
        }
    }
}

/// Fixed vocabulary, without a graph store behind it
#[derive(Default)]
pub struct StaticVocabulary {
    names: HashMap<EntityCategory, Arc<[String]>>,
    fail: bool,
}

impl StaticVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, category: EntityCategory, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names
            .insert(category, names.into_iter().map(Into::into).collect());
        self
    }

    /// Make every lookup fail
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl VocabularySource for StaticVocabulary {
    async fn vocabulary(&self, category: EntityCategory) -> Result<Arc<[String]>> {
        if self.fail {
            return Err(AppError::GraphStore {
                message: "vocabulary unavailable".to_string(),
            });
        }
        Ok(self
            .names
            .get(&category)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new())))
    }
}
