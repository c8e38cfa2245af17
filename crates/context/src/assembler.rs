//! Context Assembler - builds the messages a generation call sees
//!
//! Provides:
//! - History filtering (tool-call stubs and tool results never reach the model)
//! - System instruction assembly: persona, response rules, retrieved passages

use finchat_common::config::AssistantConfig;
use finchat_common::conversation::{ConversationMessage, Role};
use finchat_search::RankedPassage;

const RULES_HEADING: &str = "**กรุณาปฏิบัติตามเงื่อนไขในการตอบคำถาม:**";
const PASSAGES_HEADING: &str = "**ข้อมูลที่เกี่ยวข้อง:**";
const PASSAGES_CLOSING: &str =
    "กรุณาตอบคำถามโดยใช้ข้อมูลข้างต้น หากไม่มีข้อมูลที่เกี่ยวข้อง ให้บอกว่าไม่สามารถหาคำตอบได้";

/// Everything one generation call needs
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub system_instruction: String,

    /// Filtered prior conversation followed by the current utterance
    pub filtered_history: Vec<ConversationMessage>,

    /// Passages embedded in the instruction, in ranked order
    pub passages_used: Vec<RankedPassage>,
}

impl GenerationContext {
    /// System instruction first, then the conversation
    pub fn to_messages(&self) -> Vec<ConversationMessage> {
        let mut messages = Vec::with_capacity(self.filtered_history.len() + 1);
        messages.push(ConversationMessage::system(self.system_instruction.clone()));
        messages.extend(self.filtered_history.iter().cloned());
        messages
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    persona: String,
    rules: Vec<String>,
    insufficient_evidence_message: String,
}

impl ContextAssembler {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            persona: config.persona.clone(),
            rules: config.rules.clone(),
            insufficient_evidence_message: config.insufficient_evidence_message.clone(),
        }
    }

    /// Keep user, system and plain assistant messages in their original order
    pub fn filter_history(messages: &[ConversationMessage]) -> Vec<ConversationMessage> {
        messages
            .iter()
            .filter(|m| match m.role {
                Role::User | Role::System => true,
                Role::Assistant => !m.is_tool_request(),
                Role::Tool => false,
            })
            .cloned()
            .collect()
    }

    /// Persona, rules and, when there are any, the passages with their sources
    pub fn system_instruction(&self, passages: &[RankedPassage]) -> String {
        let mut instruction = format!("{}\n\n{}\n", self.persona.trim_end(), RULES_HEADING);
        for rule in &self.rules {
            instruction.push_str(&format!("- {}\n", rule));
        }
        instruction.push_str(&format!(
            "- หากข้อมูลไม่เพียงพอ ให้ตอบว่า: `\"{}\"`\n",
            self.insufficient_evidence_message
        ));

        if !passages.is_empty() {
            let serialized = passages
                .iter()
                .map(format_passage)
                .collect::<Vec<_>>()
                .join("\n\n");
            instruction.push_str(&format!(
                "\n{}\n{}\n\n{}\n",
                PASSAGES_HEADING, serialized, PASSAGES_CLOSING
            ));
        }

        instruction
    }

    /// Build the context for one call over `history` plus the new utterance
    pub fn assemble(
        &self,
        history: &[ConversationMessage],
        utterance: &str,
        passages: &[RankedPassage],
    ) -> GenerationContext {
        let mut filtered_history = Self::filter_history(history);
        filtered_history.push(ConversationMessage::user(utterance));

        GenerationContext {
            system_instruction: self.system_instruction(passages),
            filtered_history,
            passages_used: passages.to_vec(),
        }
    }
}

fn format_passage(ranked: &RankedPassage) -> String {
    let passage = &ranked.passage;
    match passage.page {
        Some(page) => format!(
            "Source: {} (page {})\nContent: {}",
            passage.source_filename, page, passage.content
        ),
        None => format!("Source: {}\nContent: {}", passage.source_filename, passage.content),
    }
}
