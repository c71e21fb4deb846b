//! Email relevance filtering, context extraction, and narrative synthesis
//! (spec §4.6 Pass 1-3, email side).

use super::temporal::{combined_score, recency_score};
use super::{MeetingContext, dedup_similar};
use crate::domain::{EmailArtifact, StageOutput};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;

const RELEVANCE_BATCH: usize = 25;
const EXTRACTION_BATCH: usize = 20;
const EMPTY_CORPUS_NARRATIVE: &str = "No relevant email activity found for this meeting.";

#[derive(Debug, Default, Clone)]
pub struct EmailExtractionFields {
    pub working_relationships: Vec<String>,
    pub project_progress: Vec<String>,
    pub blockers: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<String>,
    pub topics: Vec<String>,
    pub key_context: Vec<String>,
    pub attachments: Vec<String>,
    pub sentiment: Vec<String>,
}

impl EmailExtractionFields {
    fn merge(&mut self, other: EmailExtractionFields) {
        self.working_relationships.extend(other.working_relationships);
        self.project_progress.extend(other.project_progress);
        self.blockers.extend(other.blockers);
        self.decisions.extend(other.decisions);
        self.action_items.extend(other.action_items);
        self.topics.extend(other.topics);
        self.key_context.extend(other.key_context);
        self.attachments.extend(other.attachments);
        self.sentiment.extend(other.sentiment);
    }

    fn dedup(self) -> Self {
        Self {
            working_relationships: dedup_similar(self.working_relationships),
            project_progress: dedup_similar(self.project_progress),
            blockers: dedup_similar(self.blockers),
            decisions: dedup_similar(self.decisions),
            action_items: dedup_similar(self.action_items),
            topics: dedup_similar(self.topics),
            key_context: dedup_similar(self.key_context),
            attachments: dedup_similar(self.attachments),
            sentiment: dedup_similar(self.sentiment),
        }
    }
}

#[derive(Deserialize, Default)]
struct RelevanceResponse {
    #[serde(default)]
    relevant_indices: Vec<usize>,
    #[serde(default)]
    reasoning: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ExtractionResponse {
    #[serde(default)]
    working_relationships: Vec<String>,
    #[serde(default)]
    project_progress: Vec<String>,
    #[serde(default)]
    blockers: Vec<String>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    key_context: Vec<String>,
    #[serde(default)]
    attachments: Vec<String>,
    #[serde(default)]
    sentiment: Vec<String>,
}

impl From<ExtractionResponse> for EmailExtractionFields {
    fn from(r: ExtractionResponse) -> Self {
        Self {
            working_relationships: r.working_relationships,
            project_progress: r.project_progress,
            blockers: r.blockers,
            decisions: r.decisions,
            action_items: r.action_items,
            topics: r.topics,
            key_context: r.key_context,
            attachments: r.attachments,
            sentiment: r.sentiment,
        }
    }
}

pub struct EmailRelevancePipeline {
    llm: LlmClient,
}

pub struct EmailPipelineOutput {
    pub stage: StageOutput,
    pub fields: EmailExtractionFields,
    pub reasoning: HashMap<String, String>,
    pub relevant_count: usize,
}

impl EmailRelevancePipeline {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn run(&self, ctx: &MeetingContext, emails: &[EmailArtifact], meeting_start: DateTime<Utc>) -> EmailPipelineOutput {
        if emails.is_empty() {
            return EmailPipelineOutput {
                stage: StageOutput { narrative: EMPTY_CORPUS_NARRATIVE.to_string(), skipped: true },
                fields: EmailExtractionFields::default(),
                reasoning: HashMap::new(),
                relevant_count: 0,
            };
        }

        let (relevant, reasoning) = self.pass1_relevance(ctx, emails).await;
        if relevant.is_empty() {
            return EmailPipelineOutput {
                stage: StageOutput { narrative: EMPTY_CORPUS_NARRATIVE.to_string(), skipped: true },
                fields: EmailExtractionFields::default(),
                reasoning,
                relevant_count: 0,
            };
        }

        let mut ranked: Vec<&EmailArtifact> = relevant.clone();
        ranked.sort_by(|a, b| {
            let score_a = combined_score(1.0, recency_score(a.date, meeting_start));
            let score_b = combined_score(1.0, recency_score(b.date, meeting_start));
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        let fields = self.pass2_extraction(&ranked).await;
        let narrative = self.pass3_narrative(ctx, &fields).await;

        EmailPipelineOutput {
            stage: StageOutput { narrative, skipped: false },
            fields,
            reasoning,
            relevant_count: ranked.len(),
        }
    }

    async fn pass1_relevance<'a>(&self, ctx: &MeetingContext, emails: &'a [EmailArtifact]) -> (Vec<&'a EmailArtifact>, HashMap<String, String>) {
        let batches: Vec<&[EmailArtifact]> = emails.chunks(RELEVANCE_BATCH).collect();

        let results = join_all(batches.iter().map(|batch| self.relevance_batch(ctx, batch))).await;

        let mut relevant = Vec::new();
        let mut reasoning = HashMap::new();
        for (batch, result) in batches.iter().zip(results) {
            if let Some(r) = result {
                for &idx in &r.relevant_indices {
                    if let Some(email) = batch.get(idx) {
                        relevant.push(email);
                    }
                }
                reasoning.extend(r.reasoning);
            }
            // A batch that fails to parse simply contributes nothing; it is
            // never allowed to abort the pipeline.
        }
        (relevant, reasoning)
    }

    async fn relevance_batch(&self, ctx: &MeetingContext, batch: &[EmailArtifact]) -> Option<RelevanceResponse> {
        let listing = batch
            .iter()
            .enumerate()
            .map(|(i, e)| format!("[{i}] From: {} Subject: {} Snippet: {}", e.from, e.subject, e.snippet))
            .collect::<Vec<_>>()
            .join("\n");

        let (lo, hi) = super::inclusion_target(ctx.confidence, false);
        let prompt = format!(
            "Meeting: {} — purpose: {}. Key entities: {}. User company: {}.\n\
             Target inclusion rate: {lo}-{hi}% (a guideline, not a hard cutoff).\n\
             Emails:\n{listing}\n\
             Respond with JSON: {{\"relevant_indices\": [int], \"reasoning\": {{\"index\": string}}}}",
            ctx.title,
            ctx.purpose,
            ctx.key_entities.join(", "),
            ctx.user_company.as_deref().unwrap_or("unknown"),
        );
        let messages = vec![ChatMessage::system("You filter emails for relevance to an upcoming meeting."), ChatMessage::user(&prompt)];

        let response = self.llm.complete(messages, 800).await.ok()?;
        let value = parse_tolerant(&response)?;
        serde_json::from_value(value).ok()
    }

    async fn pass2_extraction(&self, ranked: &[&EmailArtifact]) -> EmailExtractionFields {
        let batches: Vec<&[&EmailArtifact]> = ranked.chunks(EXTRACTION_BATCH).collect();
        let results = join_all(batches.iter().map(|batch| self.extraction_batch(batch))).await;

        let mut fields = EmailExtractionFields::default();
        for result in results.into_iter().flatten() {
            fields.merge(result.into());
        }
        fields.dedup()
    }

    async fn extraction_batch(&self, batch: &[&EmailArtifact]) -> Option<ExtractionResponse> {
        let listing = batch
            .iter()
            .map(|e| format!("Subject: {}\nFrom: {}\nBody: {}", e.subject, e.from, e.body))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "Extract structured context from these emails.\n{listing}\n\
             Respond with JSON: {{\"workingRelationships\": [string], \"projectProgress\": [string], \"blockers\": [string], \
             \"decisions\": [string], \"actionItems\": [string], \"topics\": [string], \"keyContext\": [string], \
             \"attachments\": [string], \"sentiment\": [string]}}"
        );
        let messages = vec![ChatMessage::system("You extract structured facts from email threads."), ChatMessage::user(&prompt)];

        let response = self.llm.complete(messages, 1200).await.ok()?;
        let value = parse_tolerant(&response)?;
        serde_json::from_value(value).ok()
    }

    async fn pass3_narrative(&self, ctx: &MeetingContext, fields: &EmailExtractionFields) -> String {
        let serialized = serde_json::to_string(&SerializableFields::from(fields)).unwrap_or_default();
        let budget_note = if serialized.len() > 32 * 1024 {
            "The extracted context is large; prioritize recency and specificity over completeness."
        } else {
            ""
        };

        let prompt = format!(
            "Write an 8-12 sentence narrative grounded only in this extracted context for the meeting \"{}\". {budget_note}\n{serialized}",
            ctx.title
        );
        let messages = vec![ChatMessage::system("You write grounded meeting-prep narratives."), ChatMessage::user(&prompt)];

        self.llm.complete(messages, 600).await.unwrap_or_else(|_| "Email context could not be synthesized.".to_string())
    }
}

#[derive(serde::Serialize)]
struct SerializableFields<'a> {
    working_relationships: &'a [String],
    project_progress: &'a [String],
    blockers: &'a [String],
    decisions: &'a [String],
    action_items: &'a [String],
    topics: &'a [String],
    key_context: &'a [String],
}

impl<'a> From<&'a EmailExtractionFields> for SerializableFields<'a> {
    fn from(f: &'a EmailExtractionFields) -> Self {
        Self {
            working_relationships: &f.working_relationships,
            project_progress: &f.project_progress,
            blockers: &f.blockers,
            decisions: &f.decisions,
            action_items: &f.action_items,
            topics: &f.topics,
            key_context: &f.key_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_fields_merge_and_dedup() {
        let mut a = EmailExtractionFields { blockers: vec!["waiting on legal review of the contract".into()], ..Default::default() };
        let b = EmailExtractionFields { blockers: vec!["waiting on legal review of the contract terms".into()], ..Default::default() };
        a.merge(b);
        let deduped = a.dedup();
        assert_eq!(deduped.blockers.len(), 1);
    }
}
