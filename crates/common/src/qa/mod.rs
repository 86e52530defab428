//! Question answering over the Jin's three-needle knowledge graph
//!
//! Pipeline stages, leaf first:
//! - `normalizer`: aligns mentions to the graph vocabulary
//! - `parser`: question → intent, with keyword fallback
//! - `dispatcher`: intent → bound graph query → records
//! - `synthesizer`: records → disclaimed answer
//! - `service`: the orchestrating `QaService`

pub mod dispatcher;
pub mod intent;
pub mod normalizer;
pub mod parser;
pub mod service;
pub mod similarity;
pub mod synthesizer;
pub mod templates;

pub use dispatcher::{DispatchOutcome, FirstEntity, PrimaryEntityPolicy, QueryDescriptor, QueryDispatcher};
pub use intent::{
    Entities, EntityCategory, Intent, NormalizedIntent, QueryType, SuggestionReport, UnmatchedEntity,
};
pub use normalizer::{EntityNormalizer, MatchSettings};
pub use parser::{FallbackRule, IntentParser};
pub use service::{HistoryItem, QaOptions, QaRequest, QaResponse, QaService};
pub use synthesizer::{AnswerMode, AnswerSynthesizer, SynthesisInput};
