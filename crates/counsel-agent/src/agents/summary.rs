use std::fmt::Write as _;

use async_trait::async_trait;
use counsel_core::{
    documents::truncate_chars,
    keywords::{IntentTable, KeywordSet},
    AgentId, HistoryEntry, MessageType,
};
use tracing::error;

use super::{asked_about, AgentCapability, AgentDeps, AgentRequest};
use crate::{inference::ModelTier, prompt::PromptBuilder};

const ROLE: &str = "You are a legal case summarizer. You write short, structured summaries \
a busy attorney can scan, and you never invent facts that are not in the material.";

const KEY_ISSUES_CHARS: usize = 5000;
const STATUS_ACTIVITIES: usize = 5;
const PROGRESS_ACTIVITIES: usize = 20;
const CONVERSATION_TURNS: usize = 10;

/// Reply when there is no conversation to summarize.
pub const NO_CONVERSATION: &str = "No recent conversation to summarize.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    CaseOverview,
    DocumentSummary,
    StatusUpdate,
    KeyIssues,
    Progress,
    Conversation,
    General,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::CaseOverview => "case_overview",
            Intent::DocumentSummary => "document_summary",
            Intent::StatusUpdate => "status_update",
            Intent::KeyIssues => "key_issues",
            Intent::Progress => "progress_summary",
            Intent::Conversation => "conversation_summary",
            Intent::General => "general",
        }
    }
}

pub(crate) const INTENTS: IntentTable<Intent> = IntentTable::new(
    &[
        (
            Intent::CaseOverview,
            KeywordSet(&["overview", "case summary", "overall", "big picture", "case status"]),
        ),
        (
            Intent::DocumentSummary,
            KeywordSet(&["document summary", "summarize documents", "document overview"]),
        ),
        (
            Intent::StatusUpdate,
            KeywordSet(&["status", "update", "current state", "where are we"]),
        ),
        (
            Intent::KeyIssues,
            KeywordSet(&["key issues", "main issues", "important points", "highlights"]),
        ),
        (
            Intent::Progress,
            KeywordSet(&["progress", "advancement", "milestones", "achievements"]),
        ),
        (
            Intent::Conversation,
            KeywordSet(&["conversation", "discussion", "chat summary", "what we discussed"]),
        ),
    ],
    Intent::General,
);

/// Case overviews, status reports and conversation recaps.
pub struct SummaryAgent {
    deps: AgentDeps,
}

impl SummaryAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    /// Recap of the last ten turns of `messages`.
    pub async fn summarize_conversation(&self, messages: &[HistoryEntry]) -> String {
        if messages.is_empty() {
            return NO_CONVERSATION.to_string();
        }
        let prompt = PromptBuilder::new(ROLE, "Summarize this conversation")
            .history(messages, CONVERSATION_TURNS)
            .ask(&[
                "**Main Topics**: key topics discussed",
                "**Questions Asked**: the user's primary questions",
                "**Information Provided**: key guidance given",
                "**Action Items**: suggested next steps",
                "**Unresolved Items**: questions that need follow-up",
            ])
            .closing("Keep the summary concise and focused on the legal aspects.")
            .build();
        match self
            .deps
            .generate(
                AgentId::Summary,
                Intent::Conversation.as_str(),
                prompt,
                ModelTier::Standard,
            )
            .await
        {
            Some(text) => format!("💬 **Conversation Summary**\n\n{text}"),
            None => basic_conversation_summary(messages),
        }
    }

    async fn activities(&self, case_id: &str, limit: usize) -> String {
        match self.deps.store.list_case_activities(case_id, limit).await {
            Ok(acts) if acts.is_empty() => "No activities recorded.".into(),
            Ok(acts) => acts
                .iter()
                .map(|a| format!("- {} ({})", a.action, a.timestamp.format("%Y-%m-%d %H:%M")))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                error!(case_id, "activity lookup failed: {e:#}");
                "Activity information unavailable.".into()
            },
        }
    }

    async fn case_overview(&self, req: &AgentRequest<'_>) -> String {
        let context = self.deps.docs.case_context(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case context", context.as_str())
            .ask(&[
                "**Case Summary**: what the matter is about",
                "**Current Status**: where the case stands",
                "**Key Documents**: the most important material on file",
                "**Next Steps**: what should happen next",
            ])
            .build();
        match self
            .deps
            .generate(AgentId::Summary, Intent::CaseOverview.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("📋 **Case Overview**\n\n{text}"),
            None => format!(
                "📋 **Case Overview**\n\n{}\n\n{context}\n\n\
                 **Next steps**: review the documents on file, confirm upcoming deadlines \
                 and decide which issues need attention first.",
                asked_about(req.message)
            ),
        }
    }

    async fn document_summary(&self, req: &AgentRequest<'_>) -> String {
        let detailed = self.deps.docs.documents_detailed(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Documents", detailed.as_str())
            .ask(&[
                "A one-paragraph summary of each document",
                "How the documents relate to each other",
                "Documents that still need review",
            ])
            .build();
        match self
            .deps
            .generate(
                AgentId::Summary,
                Intent::DocumentSummary.as_str(),
                prompt,
                ModelTier::Standard,
            )
            .await
        {
            Some(text) => format!("📄 **Document Summary**\n\n{text}"),
            None => format!(
                "📄 **Document Summary**\n\n{}\n\n{detailed}\n\n\
                 Documents still pending extraction will appear here once processed.",
                asked_about(req.message)
            ),
        }
    }

    async fn status_update(&self, req: &AgentRequest<'_>) -> String {
        let stats = self.deps.docs.document_statistics(req.case_id).await;
        let recent = self.activities(req.case_id, STATUS_ACTIVITIES).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Document statistics", stats.as_str())
            .section("Recent activity", recent.as_str())
            .ask(&[
                "Current status in one or two sentences",
                "Recent developments",
                "Outstanding items",
                "Recommended next actions",
            ])
            .build();
        match self
            .deps
            .generate(AgentId::Summary, Intent::StatusUpdate.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("📊 **Status Update**\n\n{text}"),
            None => format!(
                "📊 **Status Update**\n\n{}\n\n**Documents**:\n{stats}\n\n**Recent activity**:\n{recent}",
                asked_about(req.message)
            ),
        }
    }

    async fn key_issues(&self, req: &AgentRequest<'_>) -> String {
        let content = self
            .deps
            .docs
            .documents_for_analysis(req.case_id, KEY_ISSUES_CHARS)
            .await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Document content", content)
            .ask(&[
                "The main legal issues, most important first",
                "Why each issue matters",
                "Open questions for each issue",
            ])
            .build();
        match self
            .deps
            .generate(AgentId::Summary, Intent::KeyIssues.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("🎯 **Key Issues**\n\n{text}"),
            None => format!(
                "🎯 **Key Issues**\n\n{}\n\nWhen reviewing the case, check these areas first:\n\
                 1. **Liability**: who is responsible and on what basis\n\
                 2. **Damages**: what losses can be shown\n\
                 3. **Procedure**: deadlines and jurisdiction\n\
                 4. **Evidence**: gaps that could weaken the position",
                asked_about(req.message)
            ),
        }
    }

    async fn progress(&self, req: &AgentRequest<'_>) -> String {
        let activities = self.activities(req.case_id, PROGRESS_ACTIVITIES).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case activity", activities.as_str())
            .ask(&["Milestones reached", "Work in progress", "What is blocking progress"])
            .build();
        match self
            .deps
            .generate(AgentId::Summary, Intent::Progress.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("📈 **Progress Summary**\n\n{text}"),
            None => format!(
                "📈 **Progress Summary**\n\n{}\n\n**Recorded activity**:\n{activities}",
                asked_about(req.message)
            ),
        }
    }

    async fn general(&self, req: &AgentRequest<'_>) -> String {
        let context = self.deps.docs.case_context(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case context", context)
            .history(req.history, 3)
            .build();
        self.deps
            .generate(AgentId::Summary, Intent::General.as_str(), prompt, ModelTier::Standard)
            .await
            .unwrap_or_else(|| summary_guidance(req.message))
    }
}

#[async_trait]
impl AgentCapability for SummaryAgent {
    fn id(&self) -> AgentId {
        AgentId::Summary
    }

    async fn respond(&self, req: &AgentRequest<'_>) -> String {
        match INTENTS.classify(req.message) {
            Intent::CaseOverview => self.case_overview(req).await,
            Intent::DocumentSummary => self.document_summary(req).await,
            Intent::StatusUpdate => self.status_update(req).await,
            Intent::KeyIssues => self.key_issues(req).await,
            Intent::Progress => self.progress(req).await,
            Intent::Conversation => self.summarize_conversation(req.history).await,
            Intent::General => self.general(req).await,
        }
    }
}

pub(crate) fn basic_conversation_summary(messages: &[HistoryEntry]) -> String {
    let user = messages
        .iter()
        .filter(|m| m.message_type == MessageType::User)
        .count();
    let ai = messages.len() - user;

    let mut out = format!(
        "💬 **Conversation Summary**\n\n**Overview**:\n- Total messages: {}\n- User questions: {user}\n- AI responses: {ai}\n",
        messages.len()
    );
    let questions: Vec<&HistoryEntry> = messages
        .iter()
        .rev()
        .filter(|m| m.message_type == MessageType::User)
        .take(3)
        .collect();
    if !questions.is_empty() {
        out.push_str("\n**Recent questions**:");
        for q in questions.into_iter().rev() {
            let _ = write!(out, "\n- {}", truncate_chars(&q.message, 120, "..."));
        }
    }
    out
}

fn summary_guidance(message: &str) -> String {
    format!(
        "📋 **Summary Assistance**\n\n{}\n\nI can prepare:\n\
         - **Case overview**: the matter at a glance\n\
         - **Document summary**: what each document says\n\
         - **Status update**: where the case stands now\n\
         - **Key issues**: the questions that decide the case\n\
         - **Progress summary**: milestones so far\n\
         - **Conversation summary**: a recap of this chat\n\n\
         Tell me which one you need.",
        asked_about(message)
    )
}
