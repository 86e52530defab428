//! Intent Parser - turns a question into a structured intent
//!
//! Provides:
//! - Model-based extraction of query type and entity mentions
//! - Validation of the model's JSON output
//! - Ordered keyword rules used when the model is unavailable or off-format

use super::intent::{Intent, QueryType};
use crate::errors::{AppError, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::metrics::{record_intent_parse, record_llm};
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const PARSE_SYSTEM_PROMPT: &str = r#"你是一个靳三针针灸知识图谱问答系统的问题解析助手。
请把用户问题解析为一个 JSON，结构如下（必须严格 JSON）：

{
  "query_type": "<string>",
  "diseases": ["..."],
  "combos": ["..."],
  "points": ["..."]
}

query_type 必须从下列值中选一个：
- "disease_to_plans"          ：问“某个疾病有哪些靳三针治疗方案”
- "combo_to_diseases"         ：问“某个靳三针组合能治什么病”
- "disease_combo_to_effect"   ：问“某个组合治疗某病的疗效如何”
- "combo_to_points"           ：问“某个靳三针组合包含哪些穴位/子组合”
- "disease_to_point_summary"  ：问“某病靳三针常用主穴/配穴总结”
- "unknown"                   ：问题与以上类型都无关，或无法识别

说明：
- diseases：提取文本中的疾病名称，如“脑卒中后遗症”、“失眠”等。
- combos：提取靳三针“组合名称”，如“颞三针”、“智三针”、“自闭九项”等。
- points：提取单个标准穴位名，如“合谷”、“足三里”，不要把“三针组合”算作点。

必须：
1）只返回 JSON，本身不加任何注释文字；
2）所有字段都要出现，即使为空也要给空数组。"#;

/// Shape accepted from the model; anything else is a parse failure
#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    diseases: Option<Vec<String>>,
    #[serde(default)]
    combos: Option<Vec<String>>,
    #[serde(default)]
    points: Option<Vec<String>>,
}

/// Keyword rule: every pattern must match for the rule to fire
#[derive(Debug)]
pub struct FallbackRule {
    pub name: &'static str,
    patterns: Vec<Regex>,
    intent: Intent,
}

impl FallbackRule {
    pub fn new(name: &'static str, patterns: &[&str], intent: Intent) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| AppError::Configuration {
                    message: format!("Invalid fallback pattern '{}': {}", p, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            patterns,
            intent,
        })
    }

    fn matches(&self, question: &str) -> bool {
        self.patterns.iter().all(|p| p.is_match(question))
    }
}

/// Rules tried in order when model output is unusable
pub fn default_fallback_rules() -> Result<Vec<FallbackRule>> {
    Ok(vec![
        FallbackRule::new(
            "temporal_combo_indications",
            &["颞三针", "什么病|哪些病|适应证"],
            Intent::new(QueryType::ComboToDiseases).with_combos(["颞三针"]),
        )?,
        FallbackRule::new(
            "stroke_plans",
            &["脑卒中"],
            Intent::new(QueryType::DiseaseToPlans).with_diseases(["脑卒中后遗症"]),
        )?,
    ])
}

/// Extracts intents with the parse model, falling back to keyword rules
pub struct IntentParser {
    chat: Arc<dyn ChatModel>,
    model: String,
    temperature: f32,
    rules: Vec<FallbackRule>,
}

impl IntentParser {
    /// Create a parser with the default fallback rules
    pub fn new(chat: Arc<dyn ChatModel>, model: impl Into<String>, temperature: f32) -> Result<Self> {
        Ok(Self::with_rules(chat, model, temperature, default_fallback_rules()?))
    }

    pub fn with_rules(
        chat: Arc<dyn ChatModel>,
        model: impl Into<String>,
        temperature: f32,
        rules: Vec<FallbackRule>,
    ) -> Self {
        Self {
            chat,
            model: model.into(),
            temperature,
            rules,
        }
    }

    /// Parse a question in the context of prior turns. Never fails.
    pub async fn parse(&self, question: &str, history: &[ChatMessage]) -> Intent {
        match self.parse_with_model(question, history).await {
            Ok(intent) => {
                record_intent_parse("llm");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent parsing failed, using keyword rules");
                self.fallback(question)
            }
        }
    }

    async fn parse_with_model(&self, question: &str, history: &[ChatMessage]) -> Result<Intent> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(PARSE_SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(question));

        let start = Instant::now();
        let result = self.chat.complete(&self.model, &messages, self.temperature).await;
        record_llm(start.elapsed().as_secs_f64(), &self.model, "parse", result.is_ok());

        let raw = result?;
        info!(raw = %raw, "Model parse output");
        parse_model_output(&raw)
    }

    /// First matching rule, or `unknown`
    pub fn fallback(&self, question: &str) -> Intent {
        let question = question.trim();
        match self.rules.iter().find(|rule| rule.matches(question)) {
            Some(rule) => {
                info!(rule = rule.name, "Fallback rule matched");
                record_intent_parse("fallback_rule");
                rule.intent.clone()
            }
            None => {
                record_intent_parse("fallback_unknown");
                Intent::unknown()
            }
        }
    }
}

/// Validate raw model output into an intent
pub fn parse_model_output(raw: &str) -> Result<Intent> {
    let text = strip_code_fence(raw.trim());
    let invalid = |e: serde_json::Error| AppError::InvalidFormat {
        message: format!("Model output is not a valid intent object: {}", e),
    };

    let value: serde_json::Value = serde_json::from_str(text).map_err(invalid)?;
    if !value.is_object() {
        return Err(AppError::InvalidFormat {
            message: "Model output is not a JSON object".to_string(),
        });
    }
    let parsed: RawIntent = serde_json::from_value(value).map_err(invalid)?;

    let query_type = match parsed.query_type.as_deref() {
        None => QueryType::DiseaseToPlans,
        Some(name) => QueryType::from_name(name.trim()).ok_or_else(|| AppError::InvalidFormat {
            message: format!("Unknown query_type '{}'", name),
        })?,
    };

    Ok(Intent::new(query_type)
        .with_diseases(clean(parsed.diseases))
        .with_combos(clean(parsed.combos))
        .with_points(clean(parsed.points)))
}

fn clean(names: Option<Vec<String>>) -> Vec<String> {
    names
        .unwrap_or_default()
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

/// Drop a surrounding ``` / ```json fence
fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }

    let body = match text.split_once('\n') {
        Some((_, rest)) => rest,
        None => return "",
    };

    let body = body.trim_end();
    match body.rfind('\n') {
        Some(idx) if body[idx + 1..].starts_with("```") => body[..idx].trim(),
        None if body.starts_with("```") => "",
        _ => body.trim(),
    }
}
