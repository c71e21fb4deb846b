//! Document relevance filtering, insight extraction, and narrative synthesis
//! (spec §4.6 Pass 1+3, document side).

use super::temporal::{combined_score, detect_stale_references, recency_score};
use super::MeetingContext;
use crate::domain::{DocumentArtifact, StageOutput, StalenessFlag};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;

const RELEVANCE_BATCH: usize = 50;
const INSIGHT_BATCH: usize = 5;
const KEEP_TOP: usize = 20;
const EMPTY_CORPUS_NARRATIVE: &str = "No relevant documents found for this meeting.";

#[derive(Deserialize, Default)]
struct RelevanceResponse {
    #[serde(default)]
    relevant_indices: Vec<usize>,
    #[serde(default)]
    reasoning: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct InsightResponse {
    #[serde(default)]
    insights: Vec<String>,
}

pub struct DocumentPipelineOutput {
    pub stage: StageOutput,
    pub reasoning: HashMap<String, String>,
    pub staleness: Vec<StalenessFlag>,
    pub relevant_count: usize,
}

pub struct DocumentRelevancePipeline {
    llm: LlmClient,
}

impl DocumentRelevancePipeline {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn run(&self, ctx: &MeetingContext, documents: &[DocumentArtifact], meeting_start: DateTime<Utc>) -> DocumentPipelineOutput {
        if documents.is_empty() {
            return DocumentPipelineOutput {
                stage: StageOutput { narrative: EMPTY_CORPUS_NARRATIVE.to_string(), skipped: true },
                reasoning: HashMap::new(),
                staleness: Vec::new(),
                relevant_count: 0,
            };
        }

        let (mut relevant, reasoning) = self.pass1_relevance(ctx, documents).await;
        if relevant.is_empty() {
            return DocumentPipelineOutput {
                stage: StageOutput { narrative: EMPTY_CORPUS_NARRATIVE.to_string(), skipped: true },
                reasoning,
                staleness: Vec::new(),
                relevant_count: 0,
            };
        }

        relevant.sort_by(|a, b| {
            let score_a = combined_score(1.0, recency_score(a.modified_time, meeting_start));
            let score_b = combined_score(1.0, recency_score(b.modified_time, meeting_start));
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        relevant.truncate(KEEP_TOP);

        let staleness = detect_staleness(&relevant, Utc::now());
        let insights = self.extract_insights(&relevant).await;
        let narrative = self.narrative(ctx, &insights, &staleness).await;

        DocumentPipelineOutput { stage: StageOutput { narrative, skipped: false }, reasoning, staleness, relevant_count: relevant.len() }
    }

    async fn pass1_relevance<'a>(&self, ctx: &MeetingContext, documents: &'a [DocumentArtifact]) -> (Vec<&'a DocumentArtifact>, HashMap<String, String>) {
        let batches: Vec<&[DocumentArtifact]> = documents.chunks(RELEVANCE_BATCH).collect();
        let results = join_all(batches.iter().map(|batch| self.relevance_batch(ctx, batch))).await;

        let mut relevant = Vec::new();
        let mut reasoning = HashMap::new();
        for (batch, result) in batches.iter().zip(results) {
            if let Some(r) = result {
                for &idx in &r.relevant_indices {
                    if let Some(doc) = batch.get(idx) {
                        relevant.push(doc);
                    }
                }
                reasoning.extend(r.reasoning);
            }
        }
        (relevant, reasoning)
    }

    async fn relevance_batch(&self, ctx: &MeetingContext, batch: &[DocumentArtifact]) -> Option<RelevanceResponse> {
        let listing = batch
            .iter()
            .enumerate()
            .map(|(i, d)| format!("[{i}] {} ({}) modified {}", d.name, d.mime_type, d.modified_time))
            .collect::<Vec<_>>()
            .join("\n");

        let (lo, hi) = super::inclusion_target(ctx.confidence, true);
        let prompt = format!(
            "Meeting: {} — purpose: {}. User company: {}.\n\
             Target inclusion rate: {lo}-{hi}% (a guideline, not a hard cutoff). This is metadata only, no content.\n\
             Documents:\n{listing}\n\
             Respond with JSON: {{\"relevant_indices\": [int], \"reasoning\": {{\"index\": string}}}}",
            ctx.title,
            ctx.purpose,
            ctx.user_company.as_deref().unwrap_or("unknown"),
        );
        let messages = vec![ChatMessage::system("You filter documents for relevance to an upcoming meeting by metadata."), ChatMessage::user(&prompt)];

        let response = self.llm.complete(messages, 800).await.ok()?;
        let value = parse_tolerant(&response)?;
        serde_json::from_value(value).ok()
    }

    async fn extract_insights(&self, documents: &[&DocumentArtifact]) -> Vec<String> {
        let batches: Vec<&[&DocumentArtifact]> = documents.chunks(INSIGHT_BATCH).collect();
        let results = join_all(batches.iter().map(|batch| self.insight_batch(batch))).await;
        results.into_iter().flatten().flat_map(|r| r.insights).collect()
    }

    async fn insight_batch(&self, batch: &[&DocumentArtifact]) -> Option<InsightResponse> {
        let listing = batch
            .iter()
            .map(|d| format!("Document: {}\nContent: {}", d.name, d.content.as_deref().unwrap_or("(no content)")))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "Extract 3-10 insights (20-80 words each) per document from this content.\n{listing}\n\
             Respond with JSON: {{\"insights\": [string]}}"
        );
        let messages = vec![ChatMessage::system("You extract document insights for meeting preparation."), ChatMessage::user(&prompt)];

        let response = self.llm.complete(messages, 1200).await.ok()?;
        let value = parse_tolerant(&response)?;
        serde_json::from_value(value).ok()
    }

    async fn narrative(&self, ctx: &MeetingContext, insights: &[String], staleness: &[StalenessFlag]) -> String {
        if insights.is_empty() {
            return EMPTY_CORPUS_NARRATIVE.to_string();
        }
        let warnings = staleness.iter().map(|s| s.detail.clone()).collect::<Vec<_>>().join("; ");
        let prompt = format!(
            "Write a grounded narrative synthesizing these document insights for the meeting \"{}\". \
             Staleness warnings (if any, weigh accordingly): {warnings}\nInsights:\n{}",
            ctx.title,
            insights.join("\n"),
        );
        let messages = vec![ChatMessage::system("You write grounded document-analysis narratives."), ChatMessage::user(&prompt)];

        self.llm.complete(messages, 600).await.unwrap_or_else(|_| "Document context could not be synthesized.".to_string())
    }
}

/// Scans each document's own content (falling back to its name) for
/// outdated year/quarter/relative-time references — never used to drop the
/// document itself, only to warn the synthesizer it may be citing stale
/// information.
fn detect_staleness(documents: &[&DocumentArtifact], now: DateTime<Utc>) -> Vec<StalenessFlag> {
    documents
        .iter()
        .flat_map(|d| {
            let text = d.content.as_deref().filter(|c| !c.is_empty()).unwrap_or(&d.name);
            detect_stale_references(text, now).into_iter().map(move |indicator| StalenessFlag {
                kind: indicator.kind.into(),
                severity: indicator.severity.into(),
                detail: format!("{}: {} reference \"{}\"", d.name, indicator.kind.replace('_', " "), indicator.value),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Confidence;
    use chrono::Duration;

    fn doc(name: &str, modified: DateTime<Utc>) -> DocumentArtifact {
        doc_with_content(name, modified, "content")
    }

    fn doc_with_content(name: &str, modified: DateTime<Utc>, content: &str) -> DocumentArtifact {
        DocumentArtifact {
            id: "d1".into(),
            name: name.into(),
            mime_type: "text/plain".into(),
            size: 0,
            modified_time: modified,
            owner: "me".into(),
            owner_email: "me@x.com".into(),
            url: "https://x".into(),
            content: Some(content.into()),
        }
    }

    #[test]
    fn staleness_detected_from_old_year_in_content() {
        let now = Utc::now();
        let stale_year = now.format("%Y").to_string().parse::<i32>().unwrap() - 3;
        let old = doc_with_content("Plan", now - Duration::days(10), &format!("Budget approved in {stale_year}."));
        let refs = vec![&old];
        let flags = detect_staleness(&refs, now);
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn fresh_document_not_flagged() {
        let now = Utc::now();
        let fresh = doc("Plan", now - Duration::days(10));
        let refs = vec![&fresh];
        assert!(detect_staleness(&refs, now).is_empty());
    }

    #[test]
    fn inclusion_target_document_vs_email() {
        let (doc_lo, _) = super::super::inclusion_target(Confidence::Low, true);
        let (email_lo, _) = super::super::inclusion_target(Confidence::Low, false);
        assert!(doc_lo < email_lo);
    }
}
