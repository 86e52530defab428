//! Query Dispatcher - maps an intent onto a graph query template

use super::intent::{EntityCategory, Intent, QueryType};
use super::templates;
use crate::errors::{AppError, Result};
use crate::graph::{GraphRecord, GraphStore, QueryParams};
use crate::metrics::record_graph_query;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Chooses which mention of a category drives the query
pub trait PrimaryEntityPolicy: Send + Sync {
    fn select<'a>(&self, category: EntityCategory, names: &'a [String]) -> Option<&'a str>;
}

/// Takes the first mention
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstEntity;

impl PrimaryEntityPolicy for FirstEntity {
    fn select<'a>(&self, _category: EntityCategory, names: &'a [String]) -> Option<&'a str> {
        names.first().map(String::as_str)
    }
}

/// A fully bound query, ready to run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub query_type: QueryType,
    pub cypher: &'static str,
    pub params: QueryParams,
}

/// A planned query and its rows
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub query: QueryDescriptor,
    pub records: Vec<GraphRecord>,
}

pub struct QueryDispatcher {
    store: Arc<dyn GraphStore>,
    policy: Arc<dyn PrimaryEntityPolicy>,
}

impl QueryDispatcher {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self::with_policy(store, Arc::new(FirstEntity))
    }

    pub fn with_policy(store: Arc<dyn GraphStore>, policy: Arc<dyn PrimaryEntityPolicy>) -> Self {
        Self { store, policy }
    }

    /// Pick the template and bind its parameters.
    ///
    /// `Ok(None)` for `unknown`; `MissingEntity` when a required category is empty.
    pub fn plan(&self, intent: &Intent, max_results: usize) -> Result<Option<QueryDescriptor>> {
        let query_type = intent.query_type;
        let cypher = match query_type {
            QueryType::DiseaseToPlans => templates::DISEASE_TO_PLANS,
            QueryType::ComboToDiseases => templates::COMBO_TO_DISEASES,
            QueryType::DiseaseComboToEffect => templates::DISEASE_COMBO_TO_EFFECT,
            QueryType::ComboToPoints => templates::COMBO_TO_POINTS,
            QueryType::DiseaseToPointSummary => templates::DISEASE_TO_POINT_SUMMARY,
            QueryType::Unknown => return Ok(None),
        };

        let mut params = QueryParams::new();
        for &category in query_type.required_categories() {
            let name = self
                .policy
                .select(category, intent.entities.get(category))
                .ok_or_else(|| AppError::MissingEntity {
                    query_type: query_type.to_string(),
                    required: category.as_str(),
                })?;
            params.insert(param_name(category).to_string(), Value::from(name));
        }

        if is_limited(query_type) {
            params.insert("limit".to_string(), Value::from(max_results as i64));
        }

        Ok(Some(QueryDescriptor {
            query_type,
            cypher,
            params,
        }))
    }

    /// Run a planned query
    pub async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<GraphRecord>> {
        info!(query_type = %query.query_type, params = ?query.params, "Executing graph query");
        debug!(cypher = query.cypher, "Graph query text");

        let start = Instant::now();
        let result = self.store.run(query.cypher, &query.params).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(records) => {
                record_graph_query(elapsed, query.query_type.as_str(), Some(records.len()));
                info!(query_type = %query.query_type, records = records.len(), "Graph query completed");
            }
            Err(e) => {
                record_graph_query(elapsed, query.query_type.as_str(), None);
                error!(query_type = %query.query_type, error = %e, "Graph query failed");
            }
        }

        result
    }

    /// Plan and run in one step
    pub async fn dispatch(&self, intent: &Intent, max_results: usize) -> Result<Option<DispatchOutcome>> {
        let Some(query) = self.plan(intent, max_results)? else {
            return Ok(None);
        };
        let records = self.execute(&query).await?;
        Ok(Some(DispatchOutcome { query, records }))
    }
}

fn param_name(category: EntityCategory) -> &'static str {
    match category {
        EntityCategory::Disease => "disease_name",
        EntityCategory::Combo => "combo_name",
        EntityCategory::Point => "point_name",
    }
}

fn is_limited(query_type: QueryType) -> bool {
    matches!(
        query_type,
        QueryType::DiseaseToPlans | QueryType::DiseaseComboToEffect
    )
}
