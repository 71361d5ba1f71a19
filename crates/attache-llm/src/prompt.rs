// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic prompt construction for the four gateway operations.
//!
//! System prompt priority for replies: per-call override > configured
//! system prompt + identity block > composed persona parts > built-in
//! OWNER/REPRESENTATIVE template. The contact context, owner profile,
//! temporal context, and length constraint are appended in a fixed order so
//! identical inputs always produce identical prompts.

use attache_core::{ChatTurn, ModelMessage, ModelRequest, Role};
use chrono::{DateTime, Local};

/// Agent persona fields (mirrors the `ai_profile` singleton).
#[derive(Debug, Clone, Default)]
pub struct PromptPersona {
    pub system_prompt: Option<String>,
    pub identity_name: Option<String>,
    pub identity_role: Option<String>,
    pub traits: Option<String>,
    pub instructions: Option<String>,
    pub greeting: Option<String>,
    pub response_length: Option<String>,
}

/// Owner profile fields (mirrors the `user_profile` singleton).
#[derive(Debug, Clone, Default)]
pub struct PromptOwner {
    pub name: Option<String>,
    pub profession: Option<String>,
    pub availability: Option<String>,
    pub notes: Option<String>,
}

/// Everything `generate_reply` needs to build its request.
#[derive(Debug, Clone)]
pub struct ReplyPrompt {
    pub contact_address: String,
    pub contact_name: Option<String>,
    pub contact_summary: Option<String>,
    pub verified: bool,
    pub is_owner: bool,
    pub persona: PromptPersona,
    pub owner_profile: PromptOwner,
    pub override_prompt: Option<String>,
    pub history: Vec<ChatTurn>,
    pub batch_text: String,
    pub tools: Vec<serde_json::Value>,
}

/// Session metadata included in report prompts.
#[derive(Debug, Clone, Default)]
pub struct ReportMeta {
    pub started_at: String,
    pub ended_at: Option<String>,
    pub urgency: Option<i64>,
}

const OWNER_TEMPLATE: &str = "You are a personal assistant speaking directly with your \
owner. Be direct and efficient, execute requests without hedging, and use the available \
tools whenever they answer the question better than memory.";

const REPRESENTATIVE_TEMPLATE: &str = "You are a messaging representative answering on \
behalf of your owner, who is currently unavailable. Be polite and helpful, take messages, \
answer questions you are confident about, and never commit your owner to anything you \
cannot verify.";

const IDENTITY_DISCOVERY: &str = "The sender's identity is not yet confirmed. If they \
mention their name naturally, confirm it and record it with the update_contact_info tool. \
Do not interrogate them; one polite ask is enough.";

const SHORT_RESPONSE: &str = "Keep replies short: one or two sentences unless the sender \
explicitly asks for detail.";

/// Builds the full reply request: system prompt plus structured history with
/// the batch as the final user message.
pub fn build_reply_request(
    prompt: &ReplyPrompt,
    model: &str,
    max_tokens: u32,
    now: &DateTime<Local>,
) -> ModelRequest {
    let system = build_reply_system(prompt, now);

    let mut messages: Vec<ModelMessage> = prompt
        .history
        .iter()
        .map(|turn| ModelMessage {
            role: match turn.role {
                Role::User => "user".to_string(),
                Role::Agent => "assistant".to_string(),
            },
            content: turn.content.clone(),
        })
        .collect();
    messages.push(ModelMessage {
        role: "user".to_string(),
        content: prompt.batch_text.clone(),
    });

    ModelRequest {
        model: model.to_string(),
        system: Some(system),
        messages,
        max_tokens,
        tools: if prompt.tools.is_empty() {
            None
        } else {
            Some(prompt.tools.clone())
        },
    }
}

fn build_reply_system(prompt: &ReplyPrompt, now: &DateTime<Local>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(override_prompt) = &prompt.override_prompt {
        sections.push(override_prompt.clone());
        sections.push(contact_context(prompt));
    } else if let Some(system_prompt) = non_empty(&prompt.persona.system_prompt) {
        sections.push(system_prompt.to_string());
        if let Some(identity) = identity_block(&prompt.persona) {
            sections.push(identity);
        }
        sections.push(contact_context(prompt));
    } else if persona_has_parts(&prompt.persona) {
        sections.push(composed_persona(&prompt.persona, prompt.is_owner));
        sections.push(contact_context(prompt));
        if let Some(greeting) = non_empty(&prompt.persona.greeting) {
            sections.push(format!("Preferred greeting: {greeting}"));
        }
    } else {
        sections.push(
            if prompt.is_owner {
                OWNER_TEMPLATE
            } else {
                REPRESENTATIVE_TEMPLATE
            }
            .to_string(),
        );
        sections.push(contact_context(prompt));
    }

    if let Some(owner_block) = owner_profile_block(&prompt.owner_profile) {
        sections.push(owner_block);
    }

    sections.push(temporal_context(now));

    if prompt.persona.response_length.as_deref() == Some("short") {
        sections.push(SHORT_RESPONSE.to_string());
    }

    if !prompt.verified && !prompt.is_owner {
        sections.push(IDENTITY_DISCOVERY.to_string());
    }

    sections.join("\n\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn persona_has_parts(persona: &PromptPersona) -> bool {
    non_empty(&persona.identity_name).is_some()
        || non_empty(&persona.identity_role).is_some()
        || non_empty(&persona.traits).is_some()
        || non_empty(&persona.instructions).is_some()
}

fn identity_block(persona: &PromptPersona) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(name) = non_empty(&persona.identity_name) {
        lines.push(format!("Your name is {name}."));
    }
    if let Some(role) = non_empty(&persona.identity_role) {
        lines.push(format!("Your role: {role}."));
    }
    if let Some(traits) = non_empty(&persona.traits) {
        lines.push(format!("Your traits: {traits}."));
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

fn composed_persona(persona: &PromptPersona, is_owner: bool) -> String {
    let mut parts = Vec::new();
    if let Some(identity) = identity_block(persona) {
        parts.push(identity);
    }
    // Operating instructions apply when representing the owner to others;
    // the owner talks to the agent directly.
    if !is_owner {
        if let Some(instructions) = non_empty(&persona.instructions) {
            parts.push(instructions.to_string());
        }
    }
    if parts.is_empty() {
        REPRESENTATIVE_TEMPLATE.to_string()
    } else {
        parts.join("\n")
    }
}

fn contact_context(prompt: &ReplyPrompt) -> String {
    if prompt.is_owner {
        return "You are talking with your owner.".to_string();
    }
    let mut lines = vec![format!(
        "You are talking with {} ({}).",
        prompt.contact_name.as_deref().unwrap_or("an unknown sender"),
        prompt.contact_address
    )];
    if let Some(summary) = prompt.contact_summary.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("What you know about them: {summary}"));
    }
    lines.join("\n")
}

fn owner_profile_block(profile: &PromptOwner) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(name) = non_empty(&profile.name) {
        lines.push(format!("Owner name: {name}."));
    }
    if let Some(profession) = non_empty(&profile.profession) {
        lines.push(format!("Owner profession: {profession}."));
    }
    if let Some(availability) = non_empty(&profile.availability) {
        lines.push(format!("Owner availability: {availability}."));
    }
    if let Some(notes) = non_empty(&profile.notes) {
        lines.push(format!("Owner notes: {notes}"));
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Day-of-week, local time, and timezone, so the model can reason about
/// business hours without a tool call.
pub fn temporal_context(now: &DateTime<Local>) -> String {
    format!(
        "Current time: {} {}, timezone {}.",
        now.format("%A"),
        now.format("%H:%M"),
        now.format("%Z")
    )
}

/// Renders history as a plain transcript for the JSON-returning operations.
pub fn transcript(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Agent => "Agent",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const ANALYZE_SYSTEM: &str = "You review a conversation between a user and an assistant. \
Respond with ONLY a JSON object: {\"urgency\": <1-10>, \"status\": \"active\"|\"resolved\"|\
\"needs_attention\", \"summary\": \"<one or two sentences>\"}. No prose, no markdown fences.";

/// Request for `analyze_conversation`.
pub fn build_analysis_request(history: &[ChatTurn], model: &str) -> ModelRequest {
    ModelRequest {
        model: model.to_string(),
        system: Some(ANALYZE_SYSTEM.to_string()),
        messages: vec![ModelMessage {
            role: "user".to_string(),
            content: transcript(history),
        }],
        max_tokens: 512,
        tools: None,
    }
}

const PROFILE_SYSTEM: &str = "You maintain a short profile of a message sender. Given the \
conversation and the current profile summary, respond with ONLY a JSON object \
{\"summary\": \"<updated one-paragraph summary>\", \"trust_level\": <0-10>} when something \
meaningful changed, or the literal word null when nothing did. No markdown fences.";

/// Request for `update_profile`.
pub fn build_profile_request(
    history: &[ChatTurn],
    current_summary: Option<&str>,
    model: &str,
) -> ModelRequest {
    let content = format!(
        "Current summary: {}\n\nConversation:\n{}",
        current_summary.unwrap_or("(none)"),
        transcript(history)
    );
    ModelRequest {
        model: model.to_string(),
        system: Some(PROFILE_SYSTEM.to_string()),
        messages: vec![ModelMessage {
            role: "user".to_string(),
            content,
        }],
        max_tokens: 512,
        tools: None,
    }
}

const REPORT_SYSTEM: &str = "You write a brief session report for the owner of a messaging \
assistant. Summarize who wrote, what they wanted, what was answered, and anything that \
needs the owner's follow-up. Three to six sentences, plain text.";

/// Request for `generate_report`.
pub fn build_report_request(
    history: &[ChatTurn],
    contact_name: &str,
    meta: &ReportMeta,
    model: &str,
) -> ModelRequest {
    let mut header = format!("Conversation with {contact_name}, started {}", meta.started_at);
    if let Some(ended) = &meta.ended_at {
        header.push_str(&format!(", ended {ended}"));
    }
    if let Some(urgency) = meta.urgency {
        header.push_str(&format!(", urgency {urgency}/10"));
    }
    ModelRequest {
        model: model.to_string(),
        system: Some(REPORT_SYSTEM.to_string()),
        messages: vec![ModelMessage {
            role: "user".to_string(),
            content: format!("{header}\n\n{}", transcript(history)),
        }],
        max_tokens: 512,
        tools: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_prompt() -> ReplyPrompt {
        ReplyPrompt {
            contact_address: "15551234567".into(),
            contact_name: Some("Alice".into()),
            contact_summary: None,
            verified: true,
            is_owner: false,
            persona: PromptPersona::default(),
            owner_profile: PromptOwner::default(),
            override_prompt: None,
            history: vec![],
            batch_text: "hi".into(),
            tools: vec![],
        }
    }

    fn fixed_now() -> DateTime<Local> {
        // A Wednesday.
        Local.with_ymd_and_hms(2026, 3, 4, 14, 30, 0).unwrap()
    }

    #[test]
    fn override_prompt_wins_over_everything() {
        let mut prompt = base_prompt();
        prompt.override_prompt = Some("OVERRIDE INSTRUCTIONS".into());
        prompt.persona.system_prompt = Some("configured prompt".into());

        let request = build_reply_request(&prompt, "m", 256, &fixed_now());
        let system = request.system.unwrap();
        assert!(system.starts_with("OVERRIDE INSTRUCTIONS"));
        assert!(!system.contains("configured prompt"));
        assert!(system.contains("Alice"));
    }

    #[test]
    fn configured_system_prompt_gets_identity_block() {
        let mut prompt = base_prompt();
        prompt.persona.system_prompt = Some("configured prompt".into());
        prompt.persona.identity_name = Some("Desk".into());

        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(system.contains("configured prompt"));
        assert!(system.contains("Your name is Desk."));
    }

    #[test]
    fn composed_persona_skips_instructions_for_owner() {
        let mut prompt = base_prompt();
        prompt.persona.identity_name = Some("Desk".into());
        prompt.persona.instructions = Some("Always take messages.".into());

        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(system.contains("Always take messages."));

        prompt.is_owner = true;
        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(!system.contains("Always take messages."));
    }

    #[test]
    fn default_template_depends_on_owner_flag() {
        let mut prompt = base_prompt();
        let non_owner = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(non_owner.contains("messaging representative"));

        prompt.is_owner = true;
        let owner = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(owner.contains("speaking directly with your owner"));
    }

    #[test]
    fn unverified_non_owner_gets_identity_discovery() {
        let mut prompt = base_prompt();
        prompt.verified = false;
        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(system.contains("update_contact_info"));

        prompt.is_owner = true;
        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(!system.contains("update_contact_info"));
    }

    #[test]
    fn short_response_constraint_is_conditional() {
        let mut prompt = base_prompt();
        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(!system.contains("Keep replies short"));

        prompt.persona.response_length = Some("short".into());
        let system = build_reply_request(&prompt, "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(system.contains("Keep replies short"));
    }

    #[test]
    fn temporal_context_names_the_weekday() {
        let system = build_reply_request(&base_prompt(), "m", 256, &fixed_now())
            .system
            .unwrap();
        assert!(system.contains("Wednesday"));
        assert!(system.contains("14:30"));
    }

    #[test]
    fn history_maps_to_structured_messages_with_batch_last() {
        let mut prompt = base_prompt();
        prompt.history = vec![
            ChatTurn {
                role: Role::User,
                content: "earlier question".into(),
            },
            ChatTurn {
                role: Role::Agent,
                content: "earlier answer".into(),
            },
        ];
        prompt.batch_text = "new question".into();

        let request = build_reply_request(&prompt, "m", 256, &fixed_now());
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[1].role, "assistant");
        assert_eq!(request.messages[2].role, "user");
        assert_eq!(request.messages[2].content, "new question");
    }

    #[test]
    fn tools_are_attached_when_present() {
        let mut prompt = base_prompt();
        assert!(build_reply_request(&prompt, "m", 256, &fixed_now())
            .tools
            .is_none());

        prompt.tools = vec![serde_json::json!({"name": "get_current_time"})];
        let request = build_reply_request(&prompt, "m", 256, &fixed_now());
        assert_eq!(request.tools.unwrap().len(), 1);
    }

    #[test]
    fn transcript_renders_roles() {
        let history = vec![
            ChatTurn {
                role: Role::User,
                content: "hello".into(),
            },
            ChatTurn {
                role: Role::Agent,
                content: "hi".into(),
            },
        ];
        assert_eq!(transcript(&history), "User: hello\nAgent: hi");
    }

    #[test]
    fn report_request_includes_meta_header() {
        let meta = ReportMeta {
            started_at: "2026-03-04T10:00:00.000Z".into(),
            ended_at: Some("2026-03-04T10:25:00.000Z".into()),
            urgency: Some(7),
        };
        let request = build_report_request(&[], "Alice", &meta, "m");
        let content = &request.messages[0].content;
        assert!(content.contains("Alice"));
        assert!(content.contains("urgency 7/10"));
        assert!(content.contains("ended 2026-03-04T10:25:00.000Z"));
    }
}
