// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message routing and content extraction for the Telegram transport.
//!
//! Only private (DM) chats reach the pipeline. The chat id doubles as the
//! contact address, so replies route back without extra metadata.

use attache_core::{InboundEvent, MediaKind, Platform};
use teloxide::prelude::*;
use teloxide::types::ChatKind;

/// Checks whether the message is from a private (DM) chat.
///
/// Group, supergroup, and channel messages return `false`.
pub fn is_dm(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

/// Best-available display name pushed by the sender's client.
fn push_name(msg: &Message) -> Option<String> {
    let user = msg.from.as_ref()?;
    let mut name = user.first_name.clone();
    if let Some(last) = &user.last_name {
        name.push(' ');
        name.push_str(last);
    }
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The media kind of a message, for logging. Text is extracted; everything
/// else is tagged and dropped by intake (no text to reply to).
fn media_kind(msg: &Message) -> MediaKind {
    if msg.text().is_some() {
        MediaKind::Text
    } else if msg.photo().is_some() {
        MediaKind::Image
    } else if msg.voice().is_some() || msg.audio().is_some() {
        MediaKind::Audio
    } else if msg.video().is_some() {
        MediaKind::Video
    } else if msg.document().is_some() {
        MediaKind::Document
    } else {
        MediaKind::Other
    }
}

/// Maps a Telegram DM onto the uniform inbound event.
pub fn to_inbound_event(msg: &Message) -> InboundEvent {
    InboundEvent {
        address: msg.chat.id.0.to_string(),
        push_name: push_name(msg),
        text: msg
            .text()
            .or_else(|| msg.caption())
            .map(|t| t.to_string()),
        media_kind: media_kind(msg),
        platform: Platform::Telegram,
        from_self: msg.from.as_ref().is_some_and(|u| u.is_bot),
        undecryptable: false,
    }
}
