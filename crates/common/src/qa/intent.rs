//! Intent data model - query types, entity categories and suggestion reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

/// The fixed set of question shapes the pipeline can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Which treatment plans exist for a disease
    DiseaseToPlans,
    /// Which diseases a combo is used for
    ComboToDiseases,
    /// Evidence for a combo treating a disease
    DiseaseComboToEffect,
    /// Which points, local points and sub-combos make up a combo
    ComboToPoints,
    /// Main/auxiliary point summary of a disease
    DiseaseToPointSummary,
    /// Nothing recognisable
    Unknown,
}

impl QueryType {
    pub const ALL: [QueryType; 6] = [
        QueryType::DiseaseToPlans,
        QueryType::ComboToDiseases,
        QueryType::DiseaseComboToEffect,
        QueryType::ComboToPoints,
        QueryType::DiseaseToPointSummary,
        QueryType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::DiseaseToPlans => "disease_to_plans",
            QueryType::ComboToDiseases => "combo_to_diseases",
            QueryType::DiseaseComboToEffect => "disease_combo_to_effect",
            QueryType::ComboToPoints => "combo_to_points",
            QueryType::DiseaseToPointSummary => "disease_to_point_summary",
            QueryType::Unknown => "unknown",
        }
    }

    /// Look up a query type by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|qt| qt.as_str() == name)
    }

    /// Entity categories that must be non-empty before a query can run
    pub fn required_categories(&self) -> &'static [EntityCategory] {
        match self {
            QueryType::DiseaseToPlans | QueryType::DiseaseToPointSummary => &[EntityCategory::Disease],
            QueryType::ComboToDiseases | QueryType::ComboToPoints => &[EntityCategory::Combo],
            QueryType::DiseaseComboToEffect => &[EntityCategory::Disease, EntityCategory::Combo],
            QueryType::Unknown => &[],
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity categories backed by a controlled vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Disease,
    Combo,
    Point,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 3] = [
        EntityCategory::Disease,
        EntityCategory::Combo,
        EntityCategory::Point,
    ];

    /// Singular tag used in `unmatched` entries
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Disease => "disease",
            EntityCategory::Combo => "combo",
            EntityCategory::Point => "point",
        }
    }

    /// Plural key used in entity lists and candidate maps
    pub fn plural(&self) -> &'static str {
        match self {
            EntityCategory::Disease => "diseases",
            EntityCategory::Combo => "combos",
            EntityCategory::Point => "points",
        }
    }

    /// Graph node label holding the vocabulary
    pub fn node_label(&self) -> &'static str {
        match self {
            EntityCategory::Disease => "Disease",
            EntityCategory::Combo => "AcupointCombo",
            EntityCategory::Point => "Acupoint",
        }
    }

    /// Query listing every distinct name of this category
    pub fn vocabulary_query(&self) -> &'static str {
        match self {
            EntityCategory::Disease => "MATCH (n:Disease) RETURN DISTINCT n.name AS name",
            EntityCategory::Combo => "MATCH (n:AcupointCombo) RETURN DISTINCT n.name AS name",
            EntityCategory::Point => "MATCH (n:Acupoint) RETURN DISTINCT n.name AS name",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity mentions grouped by category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub diseases: Vec<String>,
    #[serde(default)]
    pub combos: Vec<String>,
    #[serde(default)]
    pub points: Vec<String>,
}

impl Entities {
    pub fn get(&self, category: EntityCategory) -> &[String] {
        match category {
            EntityCategory::Disease => &self.diseases,
            EntityCategory::Combo => &self.combos,
            EntityCategory::Point => &self.points,
        }
    }

    pub fn get_mut(&mut self, category: EntityCategory) -> &mut Vec<String> {
        match category {
            EntityCategory::Disease => &mut self.diseases,
            EntityCategory::Combo => &mut self.combos,
            EntityCategory::Point => &mut self.points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty() && self.combos.is_empty() && self.points.is_empty()
    }
}

/// Structured representation of what a question asks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub query_type: QueryType,
    #[serde(flatten)]
    pub entities: Entities,
}

impl Intent {
    pub fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            entities: Entities::default(),
        }
    }

    /// The intent used when nothing could be recognised
    pub fn unknown() -> Self {
        Self::new(QueryType::Unknown)
    }

    pub fn with_diseases<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities.diseases = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_combos<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities.combos = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_points<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities.points = names.into_iter().map(Into::into).collect();
        self
    }
}

/// An intent whose entities went through vocabulary alignment.
///
/// Every entity is either an exact vocabulary name or the original mention;
/// lengths and order per category match the parsed intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedIntent(Intent);

impl NormalizedIntent {
    pub(crate) fn new(intent: Intent) -> Self {
        Self(intent)
    }

    pub fn into_intent(self) -> Intent {
        self.0
    }
}

impl Deref for NormalizedIntent {
    type Target = Intent;

    fn deref(&self) -> &Intent {
        &self.0
    }
}

/// A mention that matched no vocabulary name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedEntity {
    #[serde(rename = "type")]
    pub category: EntityCategory,
    pub name: String,
}

/// Unmatched mentions plus candidate names for ambiguous or failed matches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionReport {
    pub unmatched: Vec<UnmatchedEntity>,
    /// original mention → category plural → candidate names
    pub candidates: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl SuggestionReport {
    pub fn is_empty(&self) -> bool {
        self.unmatched.is_empty() && self.candidates.is_empty()
    }

    pub(crate) fn add_candidates(&mut self, mention: &str, category: EntityCategory, names: Vec<String>) {
        self.candidates
            .entry(mention.to_string())
            .or_default()
            .insert(category.plural().to_string(), names);
    }

    /// `None` when there is nothing to report
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_type_names_round_trip() {
        for qt in QueryType::ALL {
            assert_eq!(QueryType::from_name(qt.as_str()), Some(qt));
            assert_eq!(serde_json::to_value(qt).unwrap(), json!(qt.as_str()));
        }
        assert_eq!(QueryType::from_name("point_to_combos"), None);
    }

    #[test]
    fn test_required_categories() {
        assert_eq!(
            QueryType::DiseaseComboToEffect.required_categories(),
            &[EntityCategory::Disease, EntityCategory::Combo]
        );
        assert!(QueryType::Unknown.required_categories().is_empty());
    }

    #[test]
    fn test_intent_serializes_flat() {
        let intent = Intent::new(QueryType::DiseaseToPlans).with_diseases(["失眠"]);
        assert_eq!(
            serde_json::to_value(&intent).unwrap(),
            json!({
                "query_type": "disease_to_plans",
                "diseases": ["失眠"],
                "combos": [],
                "points": []
            })
        );
    }

    #[test]
    fn test_suggestion_report_shape() {
        let mut report = SuggestionReport::default();
        assert!(report.clone().into_option().is_none());

        report.unmatched.push(UnmatchedEntity {
            category: EntityCategory::Combo,
            name: "四神针".into(),
        });
        report.add_candidates("四神针", EntityCategory::Combo, vec!["四神聪".into()]);

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "unmatched": [{"type": "combo", "name": "四神针"}],
                "candidates": {"四神针": {"combos": ["四神聪"]}}
            })
        );
    }
}
