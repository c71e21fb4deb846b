//! BriefSynthesizer (spec §4.8): eight sequential LLM stages composing the
//! final [`Brief`] from the staged outputs of every upstream component.
//! Runs only after relevance filtering and attendee research both complete.

use super::timeline::TimelineBuilder;
use super::trend::{Trend, classify_trend};
use crate::attendee_research::AttendeeResearchResult;
use crate::domain::{
    Attendee, Brief, BriefStats, CalendarArtifact, DocumentArtifact, EmailArtifact, ExtractionData, Meeting, StageOutput, StalenessFlag, User,
};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use crate::purpose::PurposeResult;
use crate::relevance::emails::EmailExtractionFields;
use serde::Deserialize;
use std::collections::HashMap;

pub struct SynthesisInputs<'a> {
    pub meeting: &'a Meeting,
    pub user: &'a User,
    pub attendees: &'a [Attendee],
    pub purpose: &'a PurposeResult,
    pub email_stage: &'a StageOutput,
    pub email_fields: &'a EmailExtractionFields,
    pub document_stage: &'a StageOutput,
    pub attendee_research: &'a [AttendeeResearchResult],
    pub emails: &'a [EmailArtifact],
    pub documents: &'a [DocumentArtifact],
    pub past_meetings: &'a [CalendarArtifact],
    pub reasoning: HashMap<String, String>,
    pub staleness: Vec<StalenessFlag>,
    pub warnings: Vec<String>,
    pub emails_considered: usize,
    pub documents_considered: usize,
}

pub struct BriefSynthesizer {
    llm: LlmClient,
    timeline: TimelineBuilder,
}

impl BriefSynthesizer {
    pub fn new(llm: LlmClient) -> Self {
        let timeline = TimelineBuilder::new(llm.clone());
        Self { llm, timeline }
    }

    pub async fn synthesize(&self, inputs: SynthesisInputs<'_>) -> Brief {
        let relationship_analysis = self.relationship_analysis(&inputs).await;
        let contribution_analysis = self.contribution_analysis(&inputs).await;
        let broader_narrative = self.broader_narrative(&inputs, &relationship_analysis, &contribution_analysis).await;
        let timeline = self.timeline.build(inputs.meeting, inputs.emails, inputs.documents, inputs.past_meetings).await;

        let dates: Vec<_> = inputs.emails.iter().map(|e| e.date).chain(inputs.documents.iter().map(|d| d.modified_time)).collect();
        let trend = classify_trend(&dates);

        let recommendations = self.recommendations(&inputs, &broader_narrative, trend).await;
        let action_items = self.action_items(&inputs, &recommendations).await;
        let (purpose, summary, one_liner) = self.executive_summary(&inputs, &broader_narrative, &recommendations).await;

        Brief {
            user_id: inputs.user.id.clone(),
            meeting_id: inputs.meeting.id.clone(),
            summary,
            one_liner,
            purpose,
            agenda: inputs.purpose.agenda.clone(),
            attendees: inputs.attendees.to_vec(),
            email_analysis: inputs.email_stage.clone(),
            document_analysis: inputs.document_stage.clone(),
            relationship_analysis: StageOutput { narrative: relationship_analysis, skipped: false },
            contribution_analysis: StageOutput { narrative: contribution_analysis, skipped: false },
            broader_narrative,
            timeline,
            recommendations,
            action_items,
            stats: BriefStats {
                emails_considered: inputs.emails_considered,
                emails_relevant: inputs.emails.len(),
                documents_considered: inputs.documents_considered,
                documents_relevant: inputs.documents.len(),
                attendees_researched: inputs.attendee_research.len(),
            },
            extraction_data: ExtractionData { reasoning: inputs.reasoning, document_staleness: inputs.staleness, warnings: inputs.warnings },
        }
    }

    async fn complete_or(&self, prompt: String, system: &'static str, max_tokens: u32, fallback: &str) -> String {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(&prompt)];
        self.llm.complete(messages, max_tokens).await.unwrap_or_else(|_| fallback.to_string())
    }

    async fn relationship_analysis(&self, inputs: &SynthesisInputs<'_>) -> String {
        let facts = inputs
            .attendee_research
            .iter()
            .map(|a| format!("{} ({}): {}", a.name, a.company.clone().unwrap_or_default(), a.facts.join("; ")))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Write an 8-12 sentence relationship analysis for {} ahead of \"{}\", reasoning over per-attendee interaction evidence.\n{facts}",
            inputs.user.name, inputs.meeting.title
        );
        self.complete_or(prompt, "You write grounded attendee-relationship analyses.", 600, "Relationship context could not be synthesized.").await
    }

    async fn contribution_analysis(&self, inputs: &SynthesisInputs<'_>) -> String {
        let grid = inputs.email_fields.working_relationships.join("; ");
        let prompt = format!(
            "Given these working-relationship facts, write a narrative describing who contributes what ahead of \"{}\": {grid}",
            inputs.meeting.title
        );
        self.complete_or(prompt, "You describe contribution patterns among meeting participants.", 500, "Contribution analysis could not be synthesized.").await
    }

    async fn broader_narrative(&self, inputs: &SynthesisInputs<'_>, relationship: &str, contribution: &str) -> String {
        let prompt = format!(
            "Weave these summaries into a 10-15 sentence story of how the meeting \"{}\" came to be.\nEmail analysis: {}\nDocument analysis: {}\nRelationship analysis: {relationship}\nContribution analysis: {contribution}",
            inputs.meeting.title, inputs.email_stage.narrative, inputs.document_stage.narrative
        );
        self.complete_or(prompt, "You write broader-context narratives for meeting preparation.", 700, "A broader narrative could not be synthesized.").await
    }

    async fn recommendations(&self, inputs: &SynthesisInputs<'_>, narrative: &str, trend: Trend) -> Vec<String> {
        let prompt = format!(
            "Produce 3-5 strategic recommendations (25-70 words each), each referencing specific context, for \"{}\". Activity trend: {:?}.\nContext: {narrative}\n\
             Respond with JSON array of strings.",
            inputs.meeting.title, trend
        );
        self.list_or_empty(prompt, "You produce strategic meeting-prep recommendations.", 700).await
    }

    async fn action_items(&self, inputs: &SynthesisInputs<'_>, recommendations: &[String]) -> Vec<String> {
        let prompt = format!(
            "Produce 3-7 concrete preparation steps (15-50 words each) for \"{}\", derived from these recommendations: {}.\n\
             Respond with JSON array of strings.",
            inputs.meeting.title,
            recommendations.join("; ")
        );
        self.list_or_empty(prompt, "You produce concrete meeting-preparation action items.", 500).await
    }

    async fn list_or_empty(&self, prompt: String, system: &'static str, max_tokens: u32) -> Vec<String> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(&prompt)];
        let response = match self.llm.complete(messages, max_tokens).await {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        match parse_tolerant(&response) {
            Some(serde_json::Value::Array(items)) => items.into_iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `(purpose, summary, one_liner)` — the full executive-summary
    /// paragraph is kept verbatim in `summary`; `one_liner` is its
    /// notification-length condensation, never the other way around.
    async fn executive_summary(&self, inputs: &SynthesisInputs<'_>, narrative: &str, recommendations: &[String]) -> (String, String, String) {
        let purpose_prompt = format!(
            "Analyze this meeting and produce a structured purpose object.\nTitle: {}\nNarrative: {narrative}\nRecommendations: {}\n\
             Respond with JSON: {{\"corePurpose\": string, \"whyNow\": string, \"keyQuestions\": [string], \"narrative\": string, \"stakes\": string, \"keyPlayers\": [string], \"criticalContext\": string}}",
            inputs.meeting.title,
            recommendations.join("; ")
        );
        let purpose_messages = vec![ChatMessage::system("You analyze meeting purpose for an executive summary."), ChatMessage::user(&purpose_prompt)];

        let purpose_data: Option<PurposeData> = match self.llm.complete(purpose_messages, 600).await {
            Ok(response) => parse_tolerant(&response).and_then(|v| serde_json::from_value(v).ok()),
            Err(_) => None,
        };

        let purpose_text = purpose_data.as_ref().map(|p| p.core_purpose.clone()).unwrap_or_else(|| inputs.purpose.purpose.clone());

        let struct_json = purpose_data.as_ref().map(|p| serde_json::to_string(p).unwrap_or_default()).unwrap_or_default();
        let summary_prompt = format!(
            "Using this structured purpose analysis and the prior analyses, write a 4-5 sentence second-person paragraph addressed to {}.\n{struct_json}\n\
             Email analysis: {}\nDocument analysis: {}",
            inputs.user.name, inputs.email_stage.narrative, inputs.document_stage.narrative
        );
        let summary = self.complete_or(summary_prompt, "You write second-person executive summaries for meeting preparation.", 300, "").await;

        let summary = if summary.is_empty() { format!("Prep ready for {}.", inputs.meeting.title) } else { summary };
        let one_liner = truncate_one_liner(&summary);

        (purpose_text, summary, one_liner)
    }
}

/// Condenses a full summary paragraph to a ≤150-char notification-length
/// one-liner, matching [`BriefSynthesizer::executive_summary`]'s truncation.
pub fn truncate_one_liner(summary: &str) -> String {
    if summary.chars().count() > 150 { summary.chars().take(147).collect::<String>() + "..." } else { summary.to_string() }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PurposeData {
    core_purpose: String,
    #[serde(default)]
    why_now: String,
    #[serde(default)]
    key_questions: Vec<String>,
    #[serde(default)]
    narrative: String,
    #[serde(default)]
    stakes: String,
    #[serde(default)]
    key_players: Vec<String>,
    #[serde(default)]
    critical_context: String,
}
