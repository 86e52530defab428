//! Entity normalization against the graph vocabulary

use super::intent::{EntityCategory, Intent, NormalizedIntent, SuggestionReport, UnmatchedEntity};
use super::similarity::close_matches;
use crate::cache::VocabularySource;
use crate::config::VocabularyConfig;
use crate::metrics::record_unmatched;
use std::sync::Arc;
use tracing::{info, warn};

/// Fuzzy matching thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSettings {
    /// Minimum ratio for adopting a vocabulary name
    pub cutoff: f64,
    /// Candidates ranked per mention
    pub top_n: usize,
    /// Minimum ratio for suggesting names for an unmatched mention
    pub suggest_cutoff: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from(&VocabularyConfig::default())
    }
}

impl From<&VocabularyConfig> for MatchSettings {
    fn from(config: &VocabularyConfig) -> Self {
        Self {
            cutoff: config.cutoff,
            top_n: config.top_n,
            suggest_cutoff: config.suggest_cutoff,
        }
    }
}

/// Outcome of matching one mention
#[derive(Debug, PartialEq)]
enum MatchOutcome {
    /// A name cleared the cutoff; `cleared` holds every name that did, best first
    Adopted { name: String, cleared: Vec<String> },
    /// Nothing cleared; `suggestions` are names above the suggestion cutoff
    Unmatched { suggestions: Vec<String> },
}

/// Aligns extracted mentions to canonical vocabulary names
pub struct EntityNormalizer {
    vocabulary: Arc<dyn VocabularySource>,
    settings: MatchSettings,
}

impl EntityNormalizer {
    pub fn new(vocabulary: Arc<dyn VocabularySource>, settings: MatchSettings) -> Self {
        Self {
            vocabulary,
            settings,
        }
    }

    pub fn settings(&self) -> MatchSettings {
        self.settings
    }

    /// Replace each mention with its best vocabulary match, keeping shape and order.
    ///
    /// Categories are handled independently. A vocabulary that cannot be
    /// loaded behaves as an empty one for this call.
    pub async fn normalize(&self, intent: Intent) -> (NormalizedIntent, SuggestionReport) {
        let mut intent = intent;
        let mut report = SuggestionReport::default();

        for category in EntityCategory::ALL {
            let mentions = std::mem::take(intent.entities.get_mut(category));
            if mentions.is_empty() {
                continue;
            }

            let vocabulary = match self.vocabulary.vocabulary(category).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(%category, error = %e, "Vocabulary unavailable, treating as empty");
                    Arc::from(Vec::new())
                }
            };

            let mut normalized = Vec::with_capacity(mentions.len());
            let mut unmatched = 0;
            for mention in mentions {
                match self.match_one(&mention, &vocabulary) {
                    MatchOutcome::Adopted { name, cleared } => {
                        if name != mention {
                            info!(%category, from = %mention, to = %name, "Entity aligned");
                        }
                        if cleared.len() > 1 {
                            report.add_candidates(&mention, category, cleared);
                        }
                        normalized.push(name);
                    }
                    MatchOutcome::Unmatched { suggestions } => {
                        unmatched += 1;
                        report.unmatched.push(UnmatchedEntity {
                            category,
                            name: mention.clone(),
                        });
                        if !suggestions.is_empty() {
                            report.add_candidates(&mention, category, suggestions);
                        }
                        normalized.push(mention);
                    }
                }
            }

            record_unmatched(category.as_str(), unmatched);
            *intent.entities.get_mut(category) = normalized;
        }

        (NormalizedIntent::new(intent), report)
    }

    fn match_one(&self, mention: &str, vocabulary: &[String]) -> MatchOutcome {
        let floor = self.settings.suggest_cutoff.min(self.settings.cutoff);
        let ranked = close_matches(mention, vocabulary, self.settings.top_n, floor);

        let (cleared, below): (Vec<_>, Vec<_>) = ranked
            .into_iter()
            .partition(|scored| scored.score >= self.settings.cutoff);

        match cleared.first() {
            Some(best) => MatchOutcome::Adopted {
                name: best.name.clone(),
                cleared: cleared.into_iter().map(|s| s.name).collect(),
            },
            None => MatchOutcome::Unmatched {
                suggestions: below.into_iter().map(|s| s.name).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::QueryType;
    use crate::testing::StaticVocabulary;

    fn normalizer(vocabulary: StaticVocabulary) -> EntityNormalizer {
        EntityNormalizer::new(Arc::new(vocabulary), MatchSettings::default())
    }

    fn combos() -> StaticVocabulary {
        StaticVocabulary::new()
            .with(EntityCategory::Combo, ["颞三针", "智三针", "脑三针", "手三针"])
            .with(EntityCategory::Disease, ["脑卒中后遗症", "失眠", "自闭症"])
    }

    #[tokio::test]
    async fn test_fuzzy_mention_adopts_vocabulary_name() {
        let normalizer = normalizer(combos());
        let intent = Intent::new(QueryType::ComboToDiseases).with_combos(["颞三针法"]);

        let (normalized, report) = normalizer.normalize(intent).await;

        assert_eq!(normalized.entities.combos, vec!["颞三针"]);
        // Only 颞三针 clears 0.7, so no candidate list
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_mention_is_kept() {
        let normalizer = normalizer(combos());
        let intent = Intent::new(QueryType::ComboToDiseases).with_combos(["四神针"]);

        let (normalized, report) = normalizer.normalize(intent).await;

        assert_eq!(normalized.entities.combos, vec!["四神针"]);
        assert_eq!(
            report.unmatched,
            vec![UnmatchedEntity {
                category: EntityCategory::Combo,
                name: "四神针".into()
            }]
        );
        // Every vocabulary name scores 1/3 against it
        assert!(report.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_cleared_candidates_are_reported() {
        let vocabulary = StaticVocabulary::new()
            .with(EntityCategory::Disease, ["脑卒中后遗症", "脑卒中", "中风后遗症"]);
        let normalizer = normalizer(vocabulary);
        let intent = Intent::new(QueryType::DiseaseToPlans).with_diseases(["脑卒中后遗症"]);

        let (normalized, report) = normalizer.normalize(intent).await;

        assert_eq!(normalized.entities.diseases, vec!["脑卒中后遗症"]);
        assert!(report.unmatched.is_empty());
        // 脑卒中后遗症 1.0, 脑卒中 6/9, 中风后遗症 8/11
        assert_eq!(
            report.candidates["脑卒中后遗症"]["diseases"],
            vec!["脑卒中后遗症".to_string(), "中风后遗症".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sub_cutoff_suggestions_for_unmatched() {
        let normalizer = normalizer(combos());
        let intent = Intent::new(QueryType::ComboToPoints).with_combos(["颞部针法"]);

        let (normalized, report) = normalizer.normalize(intent).await;

        assert_eq!(normalized.entities.combos, vec!["颞部针法"]);
        assert_eq!(report.unmatched.len(), 1);
        // 颞三针 scores 4/7: suggested, not adopted
        assert_eq!(report.candidates["颞部针法"]["combos"], vec!["颞三针".to_string()]);
    }

    #[tokio::test]
    async fn test_shape_and_order_preserved() {
        let normalizer = normalizer(combos());
        let intent = Intent::new(QueryType::DiseaseComboToEffect)
            .with_diseases(["失眠症", "未知病", "自闭症"])
            .with_combos(["智三针", "智三针"])
            .with_points(["合谷"]);

        let (normalized, report) = normalizer.normalize(intent).await;

        assert_eq!(normalized.query_type, QueryType::DiseaseComboToEffect);
        assert_eq!(normalized.entities.diseases, vec!["失眠", "未知病", "自闭症"]);
        assert_eq!(normalized.entities.combos, vec!["智三针", "智三针"]);
        // Empty point vocabulary: kept and reported
        assert_eq!(normalized.entities.points, vec!["合谷"]);
        let unmatched: Vec<&str> = report.unmatched.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(unmatched, vec!["未知病", "合谷"]);
    }

    #[tokio::test]
    async fn test_normalization_is_idempotent() {
        let normalizer = normalizer(combos());
        let intent = Intent::new(QueryType::DiseaseComboToEffect)
            .with_diseases(["失眠症", "脑卒中后遗证"])
            .with_combos(["颞三针法", "四神针"]);

        let (once, _) = normalizer.normalize(intent).await;
        let (twice, _) = normalizer.normalize(once.clone().into_intent()).await;

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_raising_cutoff_never_adds_adoptions() {
        let vocabulary = Arc::new(combos());
        let intent = Intent::new(QueryType::DiseaseComboToEffect)
            .with_diseases(["失眠症", "脑卒中后遗证", "自闭"])
            .with_combos(["颞三针法", "智针", "四神针"]);

        let mut previous: Option<Vec<bool>> = None;
        for cutoff in [0.5, 0.6, 0.7, 0.8, 0.9, 1.0] {
            let settings = MatchSettings {
                cutoff,
                top_n: 5,
                suggest_cutoff: 0.5,
            };
            let normalizer = EntityNormalizer::new(vocabulary.clone(), settings);
            let (normalized, _) = normalizer.normalize(intent.clone()).await;

            let adopted: Vec<bool> = intent
                .entities
                .diseases
                .iter()
                .zip(&normalized.entities.diseases)
                .chain(intent.entities.combos.iter().zip(&normalized.entities.combos))
                .map(|(before, after)| before != after)
                .collect();

            if let Some(previous) = &previous {
                for (now, before) in adopted.iter().zip(previous) {
                    assert!(!now || *before, "cutoff {} adopted a new mention", cutoff);
                }
            }
            previous = Some(adopted);
        }
    }

    #[tokio::test]
    async fn test_vocabulary_failure_degrades_to_unmatched() {
        let normalizer = normalizer(StaticVocabulary::new().failing());
        let intent = Intent::new(QueryType::DiseaseToPlans).with_diseases(["失眠"]);

        let (normalized, report) = normalizer.normalize(intent).await;

        assert_eq!(normalized.entities.diseases, vec!["失眠"]);
        assert_eq!(report.unmatched.len(), 1);
        assert!(report.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_empty_intent_needs_no_vocabulary() {
        let normalizer = normalizer(StaticVocabulary::new().failing());
        let (normalized, report) = normalizer.normalize(Intent::unknown()).await;

        assert_eq!(normalized.into_intent(), Intent::unknown());
        assert!(report.is_empty());
    }
}
