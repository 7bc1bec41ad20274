use std::fmt::Write as _;

use async_trait::async_trait;
use counsel_core::{
    documents::{truncate_chars, ANALYSIS_CHAR_LIMIT},
    keywords::{IntentTable, KeywordSet},
    AgentId,
};

use super::{asked_about, AgentCapability, AgentDeps, AgentRequest};
use crate::{inference::ModelTier, prompt::PromptBuilder};

const ROLE: &str = "You are a legal evidence analyst. You read case documents closely, \
cite the document a fact comes from, and flag uncertainty instead of guessing.";

const SEARCH_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "find", "search", "look", "show", "me",
];
const MAX_SEARCH_TERMS: usize = 5;
const SEARCH_LIMIT: usize = 10;
const SHOWN_HITS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    Search,
    Analyze,
    Timeline,
    Contradictions,
    Facts,
    General,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::Search => "search_documents",
            Intent::Analyze => "analyze_evidence",
            Intent::Timeline => "build_timeline",
            Intent::Contradictions => "find_contradictions",
            Intent::Facts => "extract_facts",
            Intent::General => "general",
        }
    }
}

pub(crate) const INTENTS: IntentTable<Intent> = IntentTable::new(
    &[
        (
            Intent::Search,
            KeywordSet(&["search", "find", "locate", "look for", "show me"]),
        ),
        (
            Intent::Timeline,
            KeywordSet(&["timeline", "chronology", "sequence", "when", "order"]),
        ),
        (
            Intent::Contradictions,
            KeywordSet(&["contradiction", "inconsistent", "conflict", "discrepancy"]),
        ),
        (
            Intent::Facts,
            KeywordSet(&["facts", "extract", "key points", "important details"]),
        ),
        (
            Intent::Analyze,
            KeywordSet(&["analyze", "analysis", "examine", "review", "evaluate"]),
        ),
    ],
    Intent::General,
);

/// Search, timelines, contradictions and fact extraction over case documents.
pub struct EvidenceAgent {
    deps: AgentDeps,
}

impl EvidenceAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn search(&self, req: &AgentRequest<'_>) -> String {
        let terms = search_terms(req.message);
        let hits = self.deps.docs.search(req.case_id, &terms, SEARCH_LIMIT).await;
        if hits.is_empty() {
            return format!(
                "I couldn't find any documents matching '{}' in this case. Try different \
                 search terms, or check that the documents have been uploaded and processed.",
                terms.join(" ")
            );
        }

        let mut out = format!("I found {} document(s) related to your search:\n", hits.len());
        for (i, hit) in hits.iter().take(SHOWN_HITS).enumerate() {
            let _ = write!(
                out,
                "\n**{}. {}**\n   📄 Relevance: {:.0}%\n   📝 Excerpt: {}\n",
                i + 1,
                hit.filename,
                hit.relevance * 100.0,
                hit.excerpt,
            );
        }
        if hits.len() > SHOWN_HITS {
            let _ = write!(
                out,
                "\n... and {} more documents. Ask me to refine the search to narrow them down.",
                hits.len() - SHOWN_HITS
            );
        }
        out
    }

    async fn analyze(&self, req: &AgentRequest<'_>) -> String {
        let documents = self.deps.docs.documents_summary(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case documents", documents.as_str())
            .ask(&[
                "Key evidence identified",
                "Strength of the evidence",
                "Gaps or weaknesses",
                "Recommendations for further investigation",
            ])
            .build();
        self.deps
            .generate(AgentId::Evidence, Intent::Analyze.as_str(), prompt, ModelTier::Standard)
            .await
            .unwrap_or_else(|| basic_analysis(req.message, &documents))
    }

    async fn timeline(&self, req: &AgentRequest<'_>) -> String {
        let dates = self.deps.docs.timeline_data(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Dates found in case documents", dates.as_str())
            .ask(&[
                "A chronological timeline of events",
                "Key dates and deadlines",
                "Gaps in the timeline",
                "The significance of each event for the case",
            ])
            .build();
        match self
            .deps
            .generate(AgentId::Evidence, Intent::Timeline.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("📅 **Case Timeline**\n\n{text}"),
            None => basic_timeline(req.message, &dates),
        }
    }

    async fn contradictions(&self, req: &AgentRequest<'_>) -> String {
        let content = self
            .deps
            .docs
            .documents_for_analysis(req.case_id, ANALYSIS_CHAR_LIMIT)
            .await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Document content", content)
            .ask(&[
                "Contradictory statements between documents",
                "Inconsistent dates, amounts or facts",
                "Conflicting accounts of events",
                "How significant each contradiction is",
            ])
            .build();
        match self
            .deps
            .generate(
                AgentId::Evidence,
                Intent::Contradictions.as_str(),
                prompt,
                ModelTier::Standard,
            )
            .await
        {
            Some(text) => format!("🔍 **Contradiction Analysis**\n\n{text}"),
            None => format!(
                "🔍 **Contradiction Analysis**\n\n{}\n\nI couldn't run an automated \
                 comparison right now. To check for contradictions by hand:\n\
                 1. Line up every date, amount and party name per document\n\
                 2. Compare each account of the same event side by side\n\
                 3. Flag statements that cannot both be true\n\
                 4. Note which source is more reliable for each conflict",
                asked_about(req.message)
            ),
        }
    }

    async fn facts(&self, req: &AgentRequest<'_>) -> String {
        let documents = self.deps.docs.documents_summary(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case documents", documents.as_str())
            .ask(&[
                "Parties involved",
                "Key dates",
                "Amounts and financial terms",
                "Legal issues raised",
            ])
            .build();
        match self
            .deps
            .generate(AgentId::Evidence, Intent::Facts.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("📋 **Key Facts Summary**\n\n{text}"),
            None => basic_facts(req.message, &documents),
        }
    }

    async fn general(&self, req: &AgentRequest<'_>) -> String {
        let context = self.deps.docs.case_context(req.case_id).await;
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case context", context)
            .history(req.history, 3)
            .closing("Answer the evidence question directly and refer to specific documents where you can.")
            .build();
        self.deps
            .generate(AgentId::Evidence, Intent::General.as_str(), prompt, ModelTier::Standard)
            .await
            .unwrap_or_else(|| evidence_guidance(req.message))
    }
}

#[async_trait]
impl AgentCapability for EvidenceAgent {
    fn id(&self) -> AgentId {
        AgentId::Evidence
    }

    async fn respond(&self, req: &AgentRequest<'_>) -> String {
        match INTENTS.classify(req.message) {
            Intent::Search => self.search(req).await,
            Intent::Analyze => self.analyze(req).await,
            Intent::Timeline => self.timeline(req).await,
            Intent::Contradictions => self.contradictions(req).await,
            Intent::Facts => self.facts(req).await,
            Intent::General => self.general(req).await,
        }
    }
}

/// Lower-cased words longer than two characters, minus stop words, at most five.
pub(crate) fn search_terms(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !SEARCH_STOP_WORDS.contains(w))
        .map(|w| w.trim_matches(|c| matches!(c, '.' | ',' | '!' | '?' | '"' | ';')))
        .filter(|w| w.chars().count() > 2)
        .take(MAX_SEARCH_TERMS)
        .map(str::to_string)
        .collect()
}

fn basic_analysis(message: &str, documents: &str) -> String {
    format!(
        "🔍 **Evidence Analysis**\n\n{}\n\n📄 **Documents on file**:\n{}\n\n\
         **Analysis approach**:\n\
         1. Review each document for factual content\n\
         2. Identify key evidence and supporting materials\n\
         3. Look for corroborating evidence across documents\n\
         4. Note potential gaps in the evidence\n\n\
         Tell me which aspect of the evidence to focus on for a closer look.",
        asked_about(message),
        documents
    )
}

fn basic_timeline(message: &str, dates: &str) -> String {
    format!(
        "📅 **Basic Timeline Analysis**\n\n{}\n\nDates found in the case documents:\n\n{}\n\n\
         This is a preliminary timeline. Verify each date against its source and add \
         witness statements or correspondence where the sequence is unclear.",
        asked_about(message),
        truncate_chars(dates.trim(), 3000, "..."),
    )
}

fn basic_facts(message: &str, documents: &str) -> String {
    format!(
        "📋 **Key Facts Summary**\n\n{}\n\n**Documents to review**:\n{}\n\n\
         **Fact categories**:\n\
         1. **Parties**: individuals and entities involved\n\
         2. **Dates**: deadlines and chronological events\n\
         3. **Locations**: relevant places and jurisdictions\n\
         4. **Financial**: amounts, damages and costs\n\
         5. **Legal issues**: statutes and principles that apply",
        asked_about(message),
        documents
    )
}

fn evidence_guidance(message: &str) -> String {
    format!(
        "🔍 **Evidence Analysis Guidance**\n\n{}\n\n\
         **Document review**:\n\
         1. Catalog all documents by type and date\n\
         2. Summarize each document's key points\n\
         3. Map each document to the issues in the case\n\n\
         **Evaluating evidence**:\n\
         - Assess the credibility of each source\n\
         - Consider authentication requirements\n\
         - Flag inconsistencies for further review\n\n\
         Ask me to search the documents, build a timeline or extract key facts.",
        asked_about(message)
    )
}
