//! Text-rewrite service interface.
//!
//! The rewriting itself (prompt selection and model generation) lives
//! outside this crate. This module fixes the request shape, the set of
//! supported modes and the validation every implementation applies.

use crate::error::RewriteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What kind of rewrite is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Correct spelling and grammar, keeping the original style.
    QuickFix,
    /// Draft a chat message.
    SlackMessage,
    /// Reply to an email.
    EmailReply,
    /// Respond to a conversational message.
    DailyChat,
    /// Summarize meeting notes.
    MeetingSummary,
    /// Write a status update.
    StatusUpdate,
}

impl RewriteMode {
    pub const ALL: [RewriteMode; 6] = [
        RewriteMode::QuickFix,
        RewriteMode::SlackMessage,
        RewriteMode::EmailReply,
        RewriteMode::DailyChat,
        RewriteMode::MeetingSummary,
        RewriteMode::StatusUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RewriteMode::QuickFix => "quick_fix",
            RewriteMode::SlackMessage => "slack_message",
            RewriteMode::EmailReply => "email_reply",
            RewriteMode::DailyChat => "daily_chat",
            RewriteMode::MeetingSummary => "meeting_summary",
            RewriteMode::StatusUpdate => "status_update",
        }
    }
}

impl FromStr for RewriteMode {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RewriteMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| RewriteError::InvalidMode(s.to_string()))
    }
}

impl std::fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rewrite request as sent by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteRequest {
    /// Text to rewrite.
    pub text: String,

    /// Mode name, one of [`RewriteMode`]'s string forms.
    pub mode: String,

    /// Free-form tone descriptor, e.g. "friendly".
    pub style: String,

    /// Extra context for the rewrite.
    pub context: String,
}

impl RewriteRequest {
    /// Checks the request and returns its parsed mode.
    pub fn validate(&self) -> Result<RewriteMode, RewriteError> {
        if self.text.is_empty() {
            return Err(RewriteError::EmptyInput);
        }
        self.mode.parse()
    }
}

/// A service that rewrites text according to a [`RewriteRequest`].
#[async_trait]
pub trait TextRewriter: Send + Sync {
    /// Produces the formatted rewrite for `request`.
    ///
    /// Implementations call [`RewriteRequest::validate`] first so that
    /// validation errors surface unchanged.
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError>;
}
