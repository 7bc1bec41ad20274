use std::sync::Arc;

use chrono::{Duration, Utc};
use counsel_core::{
    documents::{excerpt, extract_dates, relevance, DocumentContext},
    memory::MemoryStore,
    types::{Case, CaseAnalysis, Document, ExtractedDocument},
};

fn seeded() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    store.put_case(Case {
        id: "c1".into(),
        title: "Smith v. Jones".into(),
        case_type: "contract".into(),
        status: "active".into(),
        priority: "high".into(),
        description: "Breach of a supply agreement".into(),
        created_by: "owner".into(),
        created_at: now,
        updated_at: now,
        document_count: 2,
        analysis_count: 1,
    });
    for (id, name, kind, status) in [
        ("d1", "Supply Agreement.pdf", "application/pdf", "completed"),
        ("d2", "emails.txt", "text/plain", "pending"),
    ] {
        store.put_document(Document {
            id: id.into(),
            case_id: "c1".into(),
            filename: name.into(),
            content_type: kind.into(),
            size: 1024 * 1024,
            status: "active".into(),
            extraction_status: status.into(),
            uploaded_at: now,
        });
    }
    store.put_extracted(ExtractedDocument {
        id: "e1".into(),
        document_id: "d1".into(),
        case_id: "c1".into(),
        filename: "Supply Agreement.pdf".into(),
        text: "This agreement was signed on March 3, 2021 and amended 04/15/2022. \
               Delivery was due 1 June 2022. The supplier failed to deliver."
            .into(),
        page_count: 4,
        created_at: now - Duration::minutes(5),
    });
    store.put_extracted(ExtractedDocument {
        id: "e2".into(),
        document_id: "d2".into(),
        case_id: "c1".into(),
        filename: "emails.txt".into(),
        text: "x".repeat(9000),
        page_count: 1,
        created_at: now,
    });
    store.put_analysis(CaseAnalysis {
        id: "a1".into(),
        case_id: "c1".into(),
        executive_summary: "Supplier likely in breach.".into(),
        key_findings: vec!["Late delivery".into()],
        analyzed_at: now,
    });
    store
}

#[tokio::test]
async fn test_case_context_includes_header_documents_and_analysis() {
    let ctx = DocumentContext::new(seeded());
    let text = ctx.case_context("c1").await;
    assert!(text.contains("Case: Smith v. Jones"));
    assert!(text.contains("Priority: high"));
    assert!(text.contains("2 documents:"));
    assert!(text.contains("Recent Analysis: Supplier likely in breach."));
}

#[tokio::test]
async fn test_case_context_for_unknown_case() {
    let ctx = DocumentContext::new(seeded());
    assert_eq!(ctx.case_context("missing").await, "Case information not available.");
}

#[tokio::test]
async fn test_documents_summary_lists_size_and_status() {
    let ctx = DocumentContext::new(seeded());
    let text = ctx.documents_summary("c1").await;
    assert!(text.contains("- Supply Agreement.pdf (1MB, completed,"));
    assert!(text.contains("- emails.txt (1MB, pending,"));
}

#[tokio::test]
async fn test_documents_for_analysis_truncates_at_limit() {
    let ctx = DocumentContext::new(seeded());
    let text = ctx.documents_for_analysis("c1", 8000).await;
    // Newest first: the long email dump is cut, the agreement never fits.
    assert!(text.starts_with("\n--- Document: emails.txt ---\n"));
    assert!(text.ends_with("... [truncated]"));
    assert!(!text.contains("Supply Agreement"));
}

#[tokio::test]
async fn test_contract_documents_match_filename() {
    let ctx = DocumentContext::new(seeded());
    let text = ctx.contract_documents("c1").await;
    assert!(text.contains("Contract Document: Supply Agreement.pdf"));
    assert!(!text.contains("emails.txt"));
}

#[tokio::test]
async fn test_timeline_data_lists_dates() {
    let ctx = DocumentContext::new(seeded());
    let text = ctx.timeline_data("c1").await;
    assert!(text.contains("Document: Supply Agreement.pdf"));
    assert!(text.contains("04/15/2022"));
    assert!(text.contains("March 3, 2021"));
    assert!(text.contains("1 June 2022"));
}

#[tokio::test]
async fn test_document_statistics_counts_types() {
    let ctx = DocumentContext::new(seeded());
    let text = ctx.document_statistics("c1").await;
    assert!(text.contains("Total Documents: 2"));
    assert!(text.contains("- application: 1"));
    assert!(text.contains("- text: 1"));
    assert!(text.contains("- Completed: 1"));
    assert!(text.contains("- Pending: 1"));
}

#[tokio::test]
async fn test_search_ranks_and_excerpts() {
    let ctx = DocumentContext::new(seeded());
    let hits = ctx.search("c1", &["deliver".to_string()], 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, "d1");
    assert!(hits[0].relevance > 0.0 && hits[0].relevance <= 1.0);
    assert!(hits[0].excerpt.contains("deliver"));
}

#[tokio::test]
async fn test_empty_case_placeholders() {
    let ctx = DocumentContext::new(Arc::new(MemoryStore::new()));
    assert_eq!(ctx.documents_summary("c1").await, "No documents uploaded yet.");
    assert_eq!(
        ctx.documents_for_analysis("c1", 8000).await,
        "No extracted document content available for analysis."
    );
    assert!(ctx.search("c1", &["x".into()], 5).await.is_empty());
}

// ── scoring helpers ──────────────────────────────────────────────────────────

#[test]
fn test_relevance_is_capped_and_zero_without_hits() {
    let terms = vec!["breach".to_string()];
    assert_eq!(relevance("no match here", &terms), 0.0);
    assert_eq!(relevance("breach breach", &terms), 1.0);
    assert_eq!(relevance("", &terms), 0.0);
    assert_eq!(relevance("breach", &[]), 0.0);
}

#[test]
fn test_excerpt_marks_cuts() {
    let text = format!("{}needle{}", "a".repeat(300), "b".repeat(300));
    let ex = excerpt(&text, &["needle".to_string()], 200);
    assert!(ex.starts_with("..."));
    assert!(ex.ends_with("..."));
    assert!(ex.contains("needle"));
}

#[test]
fn test_extract_dates_dedupes() {
    let dates = extract_dates("On 01/02/2020 and again 01/02/2020, then 3 May 2021.");
    assert_eq!(dates, ["01/02/2020", "3 May 2021"]);
}
