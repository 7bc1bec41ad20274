//! Read-only views over a case's documents, formatted as prompt context.
//!
//! Every method degrades to a short placeholder sentence when the store
//! fails; agents splice the result into prompts and never see an error.

use std::{
    collections::{BTreeMap, HashSet},
    fmt::Write as _,
    sync::{Arc, LazyLock},
};

use regex::Regex;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    keywords::KeywordSet,
    store::ContentStore,
    types::{Document, ExtractedDocument},
};

const SUMMARY_DOC_LIMIT: usize = 20;
const ANALYSIS_DOC_LIMIT: usize = 10;
const SEARCH_DOC_LIMIT: usize = 50;
const DETAIL_PREVIEW_CHARS: usize = 300;
const CONTRACT_PREVIEW_CHARS: usize = 1000;
const ANALYSIS_SUMMARY_CHARS: usize = 500;
const EXCERPT_CHARS: usize = 200;
const DATES_PER_DOCUMENT: usize = 10;

/// Default character budget for [`DocumentContext::documents_for_analysis`].
pub const ANALYSIS_CHAR_LIMIT: usize = 8000;

const CONTRACT_FILENAME_TERMS: KeywordSet =
    KeywordSet(&["contract", "agreement", "terms", "conditions", "deal", "mou", "nda"]);

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
        r"\b[A-Za-z]+ \d{1,2}, \d{4}\b",
        r"\b\d{1,2} [A-Za-z]+ \d{4}\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// One document matching a search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub document_id: String,
    pub filename: String,
    /// In (0, 1].
    pub relevance: f64,
    pub excerpt: String,
    pub page_count: i64,
    pub text_length: usize,
}

/// Character-safe prefix with a trailing marker when cut.
pub fn truncate_chars(text: &str, max: usize, marker: &str) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{marker}", &text[..idx]),
        None => text.to_string(),
    }
}

fn size_mb(bytes: i64) -> f64 {
    if bytes <= 0 {
        return 0.0;
    }
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct DocumentContext {
    store: Arc<dyn ContentStore>,
}

impl DocumentContext {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Case header, document list and the latest analysis summary.
    pub async fn case_context(&self, case_id: &str) -> String {
        let case = match self.store.get_case(case_id).await {
            Ok(Some(case)) => case,
            Ok(None) => return "Case information not available.".into(),
            Err(e) => {
                error!(case_id, "case context lookup failed: {e:#}");
                return "Case context unavailable due to error.".into();
            },
        };

        let docs = self.documents_summary(case_id).await;
        let analysis = self.recent_analysis_summary(case_id).await;
        let description = if case.description.is_empty() {
            "No description available"
        } else {
            case.description.as_str()
        };

        let mut out = format!(
            "Case: {}\nType: {}\nStatus: {}\nPriority: {}\nCreated: {}\nDescription: {}\n\nDocuments: {}\n\n",
            case.title,
            case.case_type,
            case.status,
            case.priority,
            case.created_at.format("%Y-%m-%d"),
            description,
            docs,
        );
        match analysis {
            Some(summary) => {
                let _ = write!(out, "Recent Analysis: {summary}");
            },
            None => out.push_str("No recent analysis available."),
        }
        out
    }

    async fn recent_analysis_summary(&self, case_id: &str) -> Option<String> {
        match self.store.latest_case_analysis(case_id).await {
            Ok(Some(a)) if !a.executive_summary.is_empty() => {
                Some(truncate_chars(&a.executive_summary, ANALYSIS_SUMMARY_CHARS, "..."))
            },
            Ok(_) => None,
            Err(e) => {
                error!(case_id, "analysis lookup failed: {e:#}");
                None
            },
        }
    }

    async fn documents(&self, case_id: &str) -> Result<Vec<Document>, ()> {
        self.store.list_documents(case_id).await.map_err(|e| {
            error!(case_id, "document listing failed: {e:#}");
        })
    }

    async fn extracted(&self, case_id: &str, limit: usize) -> Result<Vec<ExtractedDocument>, ()> {
        self.store
            .list_extracted_documents(case_id, limit)
            .await
            .map_err(|e| {
                error!(case_id, "extracted text lookup failed: {e:#}");
            })
    }

    /// One line per document, at most twenty.
    pub async fn documents_summary(&self, case_id: &str) -> String {
        let Ok(mut docs) = self.documents(case_id).await else {
            return "Document summary unavailable.".into();
        };
        if docs.is_empty() {
            return "No documents uploaded yet.".into();
        }
        docs.truncate(SUMMARY_DOC_LIMIT);

        let mut out = format!("{} documents:", docs.len());
        for d in &docs {
            let _ = write!(
                out,
                "\n- {} ({}MB, {}, {})",
                d.filename,
                size_mb(d.size),
                d.extraction_status,
                d.uploaded_at.format("%Y-%m-%d"),
            );
        }
        out
    }

    fn preview(extracted: &[ExtractedDocument], document_id: &str, chars: usize) -> String {
        extracted
            .iter()
            .find(|e| e.document_id == document_id)
            .map(|e| truncate_chars(&e.text, chars, "..."))
            .unwrap_or_else(|| "Text not yet extracted.".into())
    }

    /// Per-document metadata with a short text preview.
    pub async fn documents_detailed(&self, case_id: &str) -> String {
        let Ok(docs) = self.documents(case_id).await else {
            return "Detailed document information unavailable.".into();
        };
        if docs.is_empty() {
            return "No documents available for analysis.".into();
        }
        let extracted = self.extracted(case_id, usize::MAX).await.unwrap_or_default();

        let blocks: Vec<String> = docs
            .iter()
            .map(|d| {
                format!(
                    "Document: {}\nSize: {}MB\nType: {}\nUploaded: {}\nExtraction Status: {}\nText Preview: {}",
                    d.filename,
                    size_mb(d.size),
                    d.content_type,
                    d.uploaded_at.format("%Y-%m-%d"),
                    d.extraction_status,
                    Self::preview(&extracted, &d.id, DETAIL_PREVIEW_CHARS),
                )
            })
            .collect();
        blocks.join("\n\n")
    }

    /// Newest extracted texts concatenated under per-document headers,
    /// cut at `limit` characters.
    pub async fn documents_for_analysis(&self, case_id: &str, limit: usize) -> String {
        let Ok(docs) = self.extracted(case_id, ANALYSIS_DOC_LIMIT).await else {
            return "Document content unavailable for analysis.".into();
        };
        if docs.is_empty() {
            return "No extracted document content available for analysis.".into();
        }

        let mut out = String::new();
        let mut used = 0usize;
        for d in &docs {
            let header = format!("\n--- Document: {} ---\n", d.filename);
            let header_len = header.chars().count();
            let text_len = d.text.chars().count();
            if used + header_len + text_len <= limit {
                out.push_str(&header);
                out.push_str(&d.text);
                used += header_len + text_len;
            } else {
                let remaining = limit.saturating_sub(used + header_len);
                if remaining > 100 {
                    out.push_str(&header);
                    out.push_str(&truncate_chars(&d.text, remaining, "... [truncated]"));
                }
                break;
            }
        }

        if out.is_empty() {
            "No document content available.".into()
        } else {
            out
        }
    }

    /// Documents whose filename looks like a contract, with longer previews.
    pub async fn contract_documents(&self, case_id: &str) -> String {
        let Ok(docs) = self.documents(case_id).await else {
            return "Contract document information unavailable.".into();
        };
        let contracts: Vec<&Document> = docs
            .iter()
            .filter(|d| CONTRACT_FILENAME_TERMS.any_in(&d.filename))
            .collect();
        if contracts.is_empty() {
            return "No contract documents identified in the case.".into();
        }
        let extracted = self.extracted(case_id, usize::MAX).await.unwrap_or_default();

        contracts
            .iter()
            .map(|d| {
                format!(
                    "Contract Document: {}\nContent Preview: {}",
                    d.filename,
                    Self::preview(&extracted, &d.id, CONTRACT_PREVIEW_CHARS),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Dates found in extracted text, grouped by document.
    pub async fn timeline_data(&self, case_id: &str) -> String {
        let Ok(docs) = self.extracted(case_id, ANALYSIS_DOC_LIMIT).await else {
            return "Timeline data extraction failed.".into();
        };
        if docs.is_empty() {
            return "No documents available for timeline extraction.".into();
        }

        let mut out = String::new();
        for d in &docs {
            let dates = extract_dates(&d.text);
            if !dates.is_empty() {
                let _ = write!(out, "Document: {}\nDates found: {}\n\n", d.filename, dates.join(", "));
            }
        }
        if out.is_empty() {
            "No date information found in documents.".into()
        } else {
            out
        }
    }

    pub async fn document_statistics(&self, case_id: &str) -> String {
        let Ok(docs) = self.documents(case_id).await else {
            return "Document statistics unavailable.".into();
        };
        if docs.is_empty() {
            return "No documents to analyze.".into();
        }

        let total_size: i64 = docs.iter().map(|d| d.size).sum();
        let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
        let (mut completed, mut pending, mut failed) = (0, 0, 0);
        for d in &docs {
            let kind = d
                .content_type
                .split_once('/')
                .map(|(major, _)| major)
                .unwrap_or(if d.content_type.is_empty() { "unknown" } else { &d.content_type });
            *kinds.entry(kind.to_string()).or_default() += 1;
            match d.extraction_status.as_str() {
                "completed" => completed += 1,
                "error" => failed += 1,
                _ => pending += 1,
            }
        }

        let total_mb = size_mb(total_size);
        let avg_mb = (total_mb / docs.len() as f64 * 100.0).round() / 100.0;
        let kinds = kinds
            .iter()
            .map(|(k, n)| format!("- {k}: {n}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Total Documents: {}\nTotal Size: {total_mb} MB\nAverage Size: {avg_mb} MB per document\n\n\
             Document Types:\n{kinds}\n\n\
             Extraction Status:\n- Completed: {completed}\n- Pending: {pending}\n- Error: {failed}",
            docs.len(),
        )
    }

    /// Ranked full-text search over extracted documents.
    pub async fn search(&self, case_id: &str, terms: &[String], limit: usize) -> Vec<SearchHit> {
        let Ok(docs) = self.extracted(case_id, SEARCH_DOC_LIMIT).await else {
            return Vec::new();
        };

        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter_map(|d| {
                let lowered = d.text.to_lowercase();
                let relevance = relevance(&lowered, terms);
                (relevance > 0.0).then(|| SearchHit {
                    document_id: d.document_id.clone(),
                    filename: d.filename.clone(),
                    relevance,
                    excerpt: excerpt(&lowered, terms, EXCERPT_CHARS),
                    page_count: d.page_count,
                    text_length: lowered.chars().count(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        hits.truncate(limit);
        info!(case_id, terms = ?terms, hits = hits.len(), "document search");
        hits
    }
}

/// Unique dates in first-seen order, at most ten per document.
pub fn extract_dates(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    DATE_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .take(DATES_PER_DOCUMENT)
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

/// Phrase hits weigh 3 each; words longer than two characters add their
/// frequency per hundred words. Averaged over terms and capped at 1.
pub fn relevance(lowered: &str, terms: &[String]) -> f64 {
    if lowered.is_empty() || terms.is_empty() {
        return 0.0;
    }
    let word_total = lowered.split_whitespace().count().max(1) as f64;
    let mut total = 0.0;
    for term in terms {
        let term = term.to_lowercase();
        if term.is_empty() {
            continue;
        }
        total += lowered.matches(term.as_str()).count() as f64 * 3.0;
        for word in term.split_whitespace().filter(|w| w.chars().count() > 2) {
            total += lowered.matches(word).count() as f64 / word_total * 100.0;
        }
    }
    (total / terms.len() as f64).min(1.0)
}

/// Roughly `max` characters around the earliest term hit.
pub fn excerpt(lowered: &str, terms: &[String], max: usize) -> String {
    let first = terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .filter_map(|t| lowered.find(t.as_str()).map(|pos| (pos, t.len())))
        .min_by_key(|(pos, _)| *pos);

    let Some((pos, term_len)) = first else {
        return truncate_chars(lowered, max, "...");
    };

    let chars: Vec<(usize, char)> = lowered.char_indices().collect();
    let hit = chars.partition_point(|(i, _)| *i < pos);
    let hit_end = chars.partition_point(|(i, _)| *i < pos + term_len);
    let start = hit.saturating_sub(max / 3);
    let end = (hit_end + max * 2 / 3).min(chars.len());

    let body: String = chars[start..end].iter().map(|(_, c)| c).collect();
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&body);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}
