// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reply engine: drives one leased queue item through the LLM and tool
//! loop to a sent, logged reply.
//!
//! The loop lets the model invoke tools up to a bounded depth, splicing each
//! result back into the conversation as a user-role line. Depth exhaustion
//! yields a canned fallback instead of silence. The `#END_SESSION#` sentinel
//! is stripped from the reply and completes the session immediately.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use attache_core::{
    types::RuntimeStats, AttacheError, ChatTurn, ModelReply, Platform, Role, TextSender,
};
use attache_llm::{LlmGateway, PromptOwner, PromptPersona, ReplyPrompt};
use attache_storage::database::iso_after;
use attache_storage::models::{AiProfile, MessageLog, QueueItem, UserProfile};
use attache_storage::queries::{contacts, messages, profiles, queue};
use attache_storage::Database;
use attache_tools::side::SideApi;
use attache_tools::{ToolContext, ToolRegistry};
use tracing::{debug, info, warn};

/// The end-of-session sentinel the model may embed in a reply.
pub const END_SESSION_SENTINEL: &str = "#END_SESSION#";

/// Sent when the model keeps calling tools past the depth bound.
const FALLBACK_REPLY: &str =
    "I'm getting stuck working this out. Could you rephrase, or I'll have my owner follow up?";

/// Consecutive tool calls allowed before the fallback reply.
const MAX_TOOL_DEPTH: u32 = 5;

/// Log rows loaded as conversation context.
const HISTORY_LIMIT: i64 = 50;

/// Deferral applied when every key is permanently dead and no cooldown
/// expiry exists to wait for.
const DEAD_POOL_DEFER: Duration = Duration::from_secs(300);

use crate::session_tracker::SessionTracker;

/// Executes leased queue items end to end.
pub struct ReplyEngine {
    db: Arc<Database>,
    gateway: Arc<LlmGateway>,
    tools: Arc<ToolRegistry>,
    senders: HashMap<Platform, Arc<dyn TextSender>>,
    sessions: Arc<SessionTracker>,
    stats: Arc<RuntimeStats>,
    side: Arc<dyn SideApi>,
    owner_address: Option<String>,
}

impl ReplyEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<LlmGateway>,
        tools: Arc<ToolRegistry>,
        senders: HashMap<Platform, Arc<dyn TextSender>>,
        sessions: Arc<SessionTracker>,
        stats: Arc<RuntimeStats>,
        side: Arc<dyn SideApi>,
        owner_address: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            gateway,
            tools,
            senders,
            sessions,
            stats,
            side,
            owner_address,
        })
    }

    pub fn is_owner(&self, sender: &str) -> bool {
        self.owner_address.as_deref() == Some(sender)
    }

    /// Queue visibility for a deferred batch: when the earliest key finishes
    /// cooling down, or a flat fallback when the pool is permanently dead.
    pub async fn defer_visible_at(&self) -> String {
        match self.gateway.earliest_available().await {
            Some(wait) if wait > Duration::ZERO => iso_after(wait),
            Some(_) => iso_after(Duration::from_secs(1)),
            None => iso_after(DEAD_POOL_DEFER),
        }
    }

    /// Plain-text error note for the owner when their batch cannot be
    /// processed. Best-effort.
    pub async fn send_error_note(&self, sender: &str, error: &AttacheError) {
        let platform = self
            .contact_platform(sender)
            .await
            .unwrap_or(Platform::Whatsapp);
        let note = format!("I couldn't process that right now: {error}");
        if let Err(e) = self.send_to(platform, sender, &note).await {
            warn!(sender, error = %e, "failed to deliver error note");
        }
    }

    async fn contact_platform(&self, sender: &str) -> Option<Platform> {
        let contact = contacts::get(&self.db, sender).await.ok()??;
        Platform::from_str(&contact.platform).ok()
    }

    async fn send_to(
        &self,
        platform: Platform,
        address: &str,
        text: &str,
    ) -> Result<(), AttacheError> {
        let sender = self.senders.get(&platform).ok_or_else(|| {
            AttacheError::Transport {
                message: format!("no transport registered for {platform}"),
                source: None,
            }
        })?;
        sender.send_text(address, text).await
    }

    /// Entry point for workers: dispatch on the item kind.
    pub async fn handle_item(&self, item: &QueueItem) -> Result<(), AttacheError> {
        match item.kind.as_str() {
            "profile" => self.run_profiling(&item.sender).await,
            _ => self.handle_batch(item).await,
        }
    }

    async fn handle_batch(&self, item: &QueueItem) -> Result<(), AttacheError> {
        let texts = item
            .texts()
            .map_err(|e| AttacheError::Internal(format!("corrupt queue payload: {e}")))?;
        if texts.is_empty() {
            return Ok(());
        }
        let sender = item.sender.as_str();
        let joined = texts.join("\n");
        let is_owner = self.is_owner(sender);

        let contact = contacts::get(&self.db, sender)
            .await?
            .ok_or_else(|| AttacheError::Internal(format!("no contact row for {sender}")))?;
        let platform = Platform::from_str(&contact.platform).unwrap_or(Platform::Whatsapp);

        let history: Vec<ChatTurn> = messages::history(&self.db, sender, HISTORY_LIMIT)
            .await?
            .iter()
            .filter_map(log_to_turn)
            .collect();

        let persona = map_persona(profiles::get_ai_profile(&self.db).await?);
        let owner_profile = map_owner(profiles::get_user_profile(&self.db).await?);

        let base = ReplyPrompt {
            contact_address: sender.to_string(),
            contact_name: contact
                .confirmed_name
                .clone()
                .or_else(|| contact.display_name.clone()),
            contact_summary: contact.summary.clone(),
            verified: contact.verified,
            is_owner,
            persona,
            owner_profile,
            override_prompt: None,
            history: Vec::new(),
            batch_text: String::new(),
            tools: self.tools.tool_definitions(is_owner),
        };

        let tool_ctx = ToolContext {
            db: self.db.clone(),
            contact_phone: sender.to_string(),
            is_owner,
            stats: self.stats.clone(),
            side: self.side.clone(),
        };

        // The tool loop. Each tool result becomes the next "user" message;
        // the previous one moves into the working history.
        let mut working = history;
        let mut current_text = joined.clone();
        let mut depth: u32 = 0;
        let final_text = loop {
            let mut prompt = base.clone();
            prompt.history = working.clone();
            prompt.batch_text = current_text.clone();

            match self.gateway.generate_reply(&prompt).await? {
                ModelReply::Text(text) => break text,
                ModelReply::ToolCall { name, args } => {
                    depth += 1;
                    if depth > MAX_TOOL_DEPTH {
                        warn!(sender, depth, "tool depth exhausted, sending fallback");
                        break FALLBACK_REPLY.to_string();
                    }
                    debug!(sender, tool = %name, depth, "model requested tool");
                    let result = self.tools.execute(&name, args, &tool_ctx).await;
                    working.push(ChatTurn {
                        role: Role::User,
                        content: current_text,
                    });
                    current_text = format!("[tool '{name}' returned {result}]");
                }
            }
        };

        let end_session = final_text.contains(END_SESSION_SENTINEL);
        let final_text = final_text
            .replace(END_SESSION_SENTINEL, "")
            .trim()
            .to_string();

        if !final_text.is_empty() {
            self.send_to(platform, sender, &final_text).await?;
        }

        // Logs only land on the success path, so a deferred batch never
        // duplicates its rows on retry.
        for text in &texts {
            messages::append(&self.db, sender, "user", text, "text", &contact.platform).await?;
        }
        messages::append(&self.db, sender, "agent", &final_text, "text", &contact.platform)
            .await?;

        self.sessions.touch(sender, None, false).await?;
        if end_session {
            info!(sender, "end-of-session sentinel received");
            self.sessions.end_now(sender).await?;
        }

        if !is_owner && self.gateway.is_idle() {
            queue::enqueue_profiling(&self.db, sender).await?;
        }

        Ok(())
    }

    /// Background profiling pass (LOW-priority queue items).
    async fn run_profiling(&self, sender: &str) -> Result<(), AttacheError> {
        let Some(contact) = contacts::get(&self.db, sender).await? else {
            return Ok(());
        };
        let turns: Vec<ChatTurn> = messages::history(&self.db, sender, HISTORY_LIMIT)
            .await?
            .iter()
            .filter_map(log_to_turn)
            .collect();
        if turns.is_empty() {
            return Ok(());
        }
        if let Some(update) = self
            .gateway
            .update_profile(&turns, contact.summary.as_deref())
            .await?
        {
            contacts::apply_profile_update(
                &self.db,
                sender,
                update.summary.as_deref(),
                update.trust_level,
            )
            .await?;
            info!(sender, "contact profile updated");
        }
        Ok(())
    }
}

fn log_to_turn(log: &MessageLog) -> Option<ChatTurn> {
    let role = Role::from_str(&log.role).ok()?;
    Some(ChatTurn {
        role,
        content: log.content.clone(),
    })
}

fn map_persona(profile: AiProfile) -> PromptPersona {
    PromptPersona {
        system_prompt: profile.system_prompt,
        identity_name: profile.identity_name,
        identity_role: profile.identity_role,
        traits: profile.traits,
        instructions: profile.instructions,
        greeting: profile.greeting,
        response_length: profile.response_length,
    }
}

fn map_owner(profile: UserProfile) -> PromptOwner {
    PromptOwner {
        name: profile.name,
        profession: profile.profession,
        availability: profile.availability,
        notes: profile.notes,
    }
}
