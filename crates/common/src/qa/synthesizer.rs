//! Answer Synthesizer - turns records into a disclaimed natural-language answer
//!
//! Provides:
//! - Grounded answers constrained to graph records
//! - General-knowledge answers when the graph is bypassed
//! - Fixed texts for clarification, empty results and generation failure

use super::intent::{Entities, QueryType};
use crate::config::LlmConfig;
use crate::graph::GraphRecord;
use crate::llm::{ChatMessage, ChatModel};
use crate::metrics::record_llm;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Returned verbatim for `unknown` intents, in every mode
pub const CLARIFICATION_ANSWER: &str = "当前无法从问题中提取出明确的疾病、靳三针组合或穴位信息，建议你补充更具体的描述，例如“脑卒中后遗症常用哪些靳三针方案？”。";

/// Grounded mode with an empty record set
pub const NOT_FOUND_ANSWER: &str = "在目前已构建的靳三针知识图谱中，暂未检索到与该问题直接对应的结构化记录，可能是相关文献尚未收录或仍在整理中。请结合权威教材和临床指南进一步查证，本系统仅用于科研与教学参考。";

pub const GROUNDED_APOLOGY: &str = "系统已成功从知识图谱中检索到若干条与问题相关的靳三针方案，但在生成自然语言总结时发生错误。建议直接查看原始 records 数据，并结合原文文献进行分析。";

pub const GENERAL_APOLOGY: &str = "当前在未调用知识图谱的前提下生成答案失败，建议稍后重试或在有 KG 模式下查看回答。";

pub const GROUNDED_DISCLAIMER: &str = "以上内容仅基于已纳入的靳三针知识图谱与相关文献，供教学与科研参考，不构成个体化诊疗建议。";

pub const GENERAL_DISCLAIMER: &str = "以上内容主要基于通用中医针灸与靳三针相关知识，供教学与科研参考，不构成个体化诊疗建议。";

const GROUNDED_SYSTEM_PROMPT: &str = r#"你是一个靳三针知识图谱问答助手。现在提供给你：
1）用户原始问题（当前轮）；
2）必要时提供的前文对话历史（多轮上下文）；
3）从知识图谱检索到的 records（JSON 列表）；
4）解析出的 query_type 和实体（疾病、组合、穴位）。

请严格根据 records 中的信息，用中文生成一个“学术、客观、不过度推断、不给诊断/处方”的回答。
不要杜撰 records 里没有的结论。

不同 query_type 时的侧重点：
- disease_to_plans：
    围绕“该疾病有哪些靳三针治疗方案”，概括主穴组合、辅助穴位、电针/艾灸/药物配合、疗程和疗效结论等。
- combo_to_diseases：
    总结“该靳三针组合主要用于哪些疾病或病证”，可按系统或疾病列举。
- disease_combo_to_effect：
    围绕“该组合治疗该病的疗效证据”，说明研究设计（若有）、疗程、主要疗效指标。
- disease_to_point_summary：
    以提纲式列出某病常用主穴、配穴（可区分主穴/配穴），不需要详细操作方法。
- combo_to_points：
    总结“该靳三针组合由哪些标准穴位、局部点和子组合构成”，
    可按主穴、局部点、子组合分类列出，并说明刺法（若 records 中有）。

必须：
- 严格基于 records 中的字段，例如：
  disease, plan_id, method_text, course_text, effect_text, effect_level,
  has_electroacupuncture, has_moxibustion, has_drug,
  main_combos, aux_combos, main_points, aux_points,
  std_points, local_points, sub_combos, diseases 等。
- 可以适当合并相似方案做总结，但不要推断不存在的适应证。
- 不要给出针对个人的具体处方或个体化诊疗建议。"#;

const GENERAL_SYSTEM_PROMPT: &str = r#"你是一个靳三针针灸领域的学术型问答助手。
当前模式为“仅 LLM（不依赖知识图谱）”，
请基于你已有的通用医学知识和中医针灸知识，
围绕用户问题进行回答，重点说明靳三针相关内容。

要求：
- 用中文专业、客观地回答，尽量结构清晰（可分点、分条）。
- 可以结合你已知的靳三针理论、常见取穴组合、常见适应证和疗效结论进行总结。
- 不能声称“来自本系统图谱”，也不要编造具体文献标题或编号。
- 不要给出具体处方或个体化诊疗建议（如“你应该去扎哪里”这类直指个人的说法）。"#;

const GROUNDED_PAYLOAD_LEAD: &str = "下面是本次查询的完整数据，请在理解以上对话历史的基础上作答：\n";
const GENERAL_PAYLOAD_LEAD: &str = "下面是本次查询的结构化解析数据，请结合这些信息并依靠你自身知识回答：\n";

/// Where the answer's facts may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Only the retrieved graph records
    Grounded,
    /// General domain knowledge, graph bypassed
    General,
}

impl AnswerMode {
    pub fn disclaimer(&self) -> &'static str {
        match self {
            AnswerMode::Grounded => GROUNDED_DISCLAIMER,
            AnswerMode::General => GENERAL_DISCLAIMER,
        }
    }

    fn other(&self) -> AnswerMode {
        match self {
            AnswerMode::Grounded => AnswerMode::General,
            AnswerMode::General => AnswerMode::Grounded,
        }
    }

    fn apology(&self) -> &'static str {
        match self {
            AnswerMode::Grounded => GROUNDED_APOLOGY,
            AnswerMode::General => GENERAL_APOLOGY,
        }
    }
}

/// Everything the synthesizer needs for one answer
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub question: &'a str,
    pub query_type: QueryType,
    pub entities: &'a Entities,
    /// Ignored in general mode
    pub records: &'a [GraphRecord],
    pub history: &'a [ChatMessage],
    pub mode: AnswerMode,
    /// Answer language tag; `zh` needs no extra instruction
    pub language: &'a str,
}

pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatModel>,
    model: String,
    grounded_temperature: f32,
    general_temperature: f32,
}

impl AnswerSynthesizer {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        model: impl Into<String>,
        grounded_temperature: f32,
        general_temperature: f32,
    ) -> Self {
        Self {
            chat,
            model: model.into(),
            grounded_temperature,
            general_temperature,
        }
    }

    pub fn from_config(chat: Arc<dyn ChatModel>, config: &LlmConfig) -> Self {
        Self::new(
            chat,
            config.answer_model.clone(),
            config.grounded_temperature,
            config.general_temperature,
        )
    }

    /// Produce the answer text. Never fails.
    pub async fn synthesize(&self, input: SynthesisInput<'_>) -> String {
        if input.query_type == QueryType::Unknown {
            return CLARIFICATION_ANSWER.to_string();
        }

        if input.mode == AnswerMode::Grounded && input.records.is_empty() {
            return with_disclaimer(NOT_FOUND_ANSWER, input.mode);
        }

        let messages = build_messages(&input);
        let temperature = match input.mode {
            AnswerMode::Grounded => self.grounded_temperature,
            AnswerMode::General => self.general_temperature,
        };

        let start = Instant::now();
        let result = self.chat.complete(&self.model, &messages, temperature).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(text) if !text.trim().is_empty() => {
                record_llm(elapsed, &self.model, "answer", true);
                info!(mode = ?input.mode, chars = text.chars().count(), "Answer generated");
                with_disclaimer(&text, input.mode)
            }
            Ok(_) => {
                record_llm(elapsed, &self.model, "answer", false);
                error!(mode = ?input.mode, "Answer generation returned empty text");
                with_disclaimer(input.mode.apology(), input.mode)
            }
            Err(e) => {
                record_llm(elapsed, &self.model, "answer", false);
                error!(mode = ?input.mode, error = %e, "Answer generation failed");
                with_disclaimer(input.mode.apology(), input.mode)
            }
        }
    }
}

fn build_messages(input: &SynthesisInput<'_>) -> Vec<ChatMessage> {
    let (prompt, lead, payload) = match input.mode {
        AnswerMode::Grounded => (
            GROUNDED_SYSTEM_PROMPT,
            GROUNDED_PAYLOAD_LEAD,
            json!({
                "question": input.question,
                "query_type": input.query_type,
                "entities": input.entities,
                "records": input.records,
            }),
        ),
        AnswerMode::General => (
            GENERAL_SYSTEM_PROMPT,
            GENERAL_PAYLOAD_LEAD,
            json!({
                "question": input.question,
                "query_type": input.query_type,
                "entities": input.entities,
            }),
        ),
    };

    let mut system = prompt.to_string();
    let language = input.language.trim();
    if !language.is_empty() && !language.eq_ignore_ascii_case("zh") {
        system.push_str(&format!("\n- 请使用以下语言作答：{}。", language));
    }

    let mut messages = Vec::with_capacity(input.history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend_from_slice(input.history);
    messages.push(ChatMessage::user(format!("{}{:#}", lead, payload)));
    messages
}

/// Append the mode's disclaimer once and remove the other mode's
fn with_disclaimer(answer: &str, mode: AnswerMode) -> String {
    let other = mode.other().disclaimer();
    let mut text = answer
        .replace(&format!("“{}”", other), "")
        .replace(other, "");

    let own = mode.disclaimer();
    if !text.contains(own) {
        let trimmed_len = text.trim_end().len();
        text.truncate(trimmed_len);
        text.push_str("\n\n");
        text.push_str(own);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;
    use crate::testing::ScriptedChat;

    fn synthesizer(chat: ScriptedChat) -> (Arc<ScriptedChat>, AnswerSynthesizer) {
        let chat = Arc::new(chat);
        let synthesizer = AnswerSynthesizer::from_config(chat.clone(), &LlmConfig::default());
        (chat, synthesizer)
    }

    fn records() -> Vec<GraphRecord> {
        let mut record = GraphRecord::new();
        record.insert("disease".into(), "脑卒中后遗症".into());
        record.insert("plan_id".into(), "P001".into());
        record.insert("main_combos".into(), json!(["颞三针"]));
        vec![record]
    }

    fn input<'a>(
        query_type: QueryType,
        entities: &'a Entities,
        records: &'a [GraphRecord],
        mode: AnswerMode,
    ) -> SynthesisInput<'a> {
        SynthesisInput {
            question: "脑卒中后遗症常用哪些靳三针方案？",
            query_type,
            entities,
            records,
            history: &[],
            mode,
            language: "zh",
        }
    }

    fn assert_disjoint(answer: &str, mode: AnswerMode) {
        assert!(answer.contains(mode.disclaimer()));
        assert!(!answer.contains(mode.other().disclaimer()));
    }

    #[tokio::test]
    async fn test_unknown_returns_clarification_without_generation() {
        let (chat, synthesizer) = synthesizer(ScriptedChat::new());
        let entities = Entities::default();

        for mode in [AnswerMode::Grounded, AnswerMode::General] {
            let answer = synthesizer
                .synthesize(input(QueryType::Unknown, &entities, &[], mode))
                .await;
            assert_eq!(answer, CLARIFICATION_ANSWER);
        }
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_grounded_without_records_is_not_found() {
        let (chat, synthesizer) = synthesizer(ScriptedChat::new());
        let entities = Entities::default();

        let answer = synthesizer
            .synthesize(input(QueryType::DiseaseToPlans, &entities, &[], AnswerMode::Grounded))
            .await;

        assert!(answer.starts_with(NOT_FOUND_ANSWER));
        assert!(answer.ends_with(GROUNDED_DISCLAIMER));
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_grounded_answer_sends_records() {
        let (chat, synthesizer) = synthesizer(ScriptedChat::new().respond("常用方案以颞三针为主穴。"));
        let entities = Entities {
            diseases: vec!["脑卒中后遗症".into()],
            ..Entities::default()
        };
        let records = records();
        let history = [ChatMessage::user("之前的问题"), ChatMessage::assistant("之前的回答")];
        let mut request = input(QueryType::DiseaseToPlans, &entities, &records, AnswerMode::Grounded);
        request.history = &history;

        let answer = synthesizer.synthesize(request).await;

        assert_eq!(answer, format!("常用方案以颞三针为主穴。\n\n{}", GROUNDED_DISCLAIMER));

        let calls = chat.calls();
        assert_eq!(calls.len(), 1);
        assert!((calls[0].temperature - 0.3).abs() < f32::EPSILON);
        let roles: Vec<ChatRole> = calls[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        let payload = &calls[0].messages[3].content;
        assert!(payload.starts_with(GROUNDED_PAYLOAD_LEAD));
        let body: serde_json::Value = serde_json::from_str(&payload[GROUNDED_PAYLOAD_LEAD.len()..]).unwrap();
        assert_eq!(body["query_type"], "disease_to_plans");
        assert_eq!(body["entities"]["diseases"][0], "脑卒中后遗症");
        assert_eq!(body["records"][0]["plan_id"], "P001");
    }

    #[tokio::test]
    async fn test_general_mode_omits_records_and_strips_grounded_disclaimer() {
        let reply = format!("颞三针常用于中风后遗症。\n{}", GROUNDED_DISCLAIMER);
        let (chat, synthesizer) = synthesizer(ScriptedChat::new().respond(reply));
        let entities = Entities {
            combos: vec!["颞三针".into()],
            ..Entities::default()
        };
        let records = records();

        let answer = synthesizer
            .synthesize(input(QueryType::ComboToDiseases, &entities, &records, AnswerMode::General))
            .await;

        assert_disjoint(&answer, AnswerMode::General);

        let calls = chat.calls();
        assert!((calls[0].temperature - 0.5).abs() < f32::EPSILON);
        let payload = &calls[0].messages.last().unwrap().content;
        assert!(payload.starts_with(GENERAL_PAYLOAD_LEAD));
        assert!(!payload.contains("records"));
    }

    #[tokio::test]
    async fn test_existing_disclaimer_not_duplicated() {
        let reply = format!("结论如下。\n“{}”", GROUNDED_DISCLAIMER);
        let (_, synthesizer) = synthesizer(ScriptedChat::new().respond(reply.clone()));
        let entities = Entities::default();
        let records = records();

        let answer = synthesizer
            .synthesize(input(QueryType::DiseaseToPlans, &entities, &records, AnswerMode::Grounded))
            .await;

        assert_eq!(answer, reply);
        assert_eq!(answer.matches(GROUNDED_DISCLAIMER).count(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_returns_apology() {
        let (_, synthesizer) = synthesizer(ScriptedChat::new().fail().fail());
        let entities = Entities::default();
        let records = records();

        let grounded = synthesizer
            .synthesize(input(QueryType::DiseaseToPlans, &entities, &records, AnswerMode::Grounded))
            .await;
        assert!(grounded.starts_with(GROUNDED_APOLOGY));
        assert_disjoint(&grounded, AnswerMode::Grounded);

        let general = synthesizer
            .synthesize(input(QueryType::DiseaseToPlans, &entities, &[], AnswerMode::General))
            .await;
        assert!(general.starts_with(GENERAL_APOLOGY));
        assert_disjoint(&general, AnswerMode::General);
    }

    #[tokio::test]
    async fn test_non_default_language_is_requested() {
        let (chat, synthesizer) = synthesizer(ScriptedChat::new().respond("Temporal three needles..."));
        let entities = Entities::default();
        let records = records();
        let mut request = input(QueryType::ComboToPoints, &entities, &records, AnswerMode::Grounded);
        request.language = "en";

        synthesizer.synthesize(request).await;

        let system = &chat.calls()[0].messages[0].content;
        assert!(system.ends_with("请使用以下语言作答：en。"));
    }

    #[test]
    fn test_disclaimer_rewrite() {
        let text = with_disclaimer(&format!("答案{}", GENERAL_DISCLAIMER), AnswerMode::Grounded);
        assert_eq!(text, format!("答案\n\n{}", GROUNDED_DISCLAIMER));
    }
}
