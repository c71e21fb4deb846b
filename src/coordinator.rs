//! PrepCoordinator (spec §4.10): orchestrates the full pipeline as a
//! streaming job with progress events, a keepalive cadence, and cooperative
//! cancellation threaded through every spawned sub-task.
//!
//! Modeled on the teacher's background-task-plus-mpsc-channel streaming
//! pattern, with a `CancellationToken` replacing the teacher's per-request
//! shutdown signal.

use crate::attendee_research::AttendeeResearcher;
use crate::brief::{BriefSynthesizer, SynthesisInputs};
use crate::classifier::EventClassifier;
use crate::db::BriefRepository;
use crate::domain::{Account, Attendee, Brief, Meeting, PrepDepth, StageOutput, User};
use crate::error::{ErrorPayload, PrepError};
use crate::harvester::MultiAccountHarvester;
use crate::purpose::PurposeDetector;
use crate::relevance::documents::DocumentRelevancePipeline;
use crate::relevance::emails::EmailRelevancePipeline;
use crate::relevance::MeetingContext;
use crate::token_guard::TokenGuard;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event")]
pub enum StreamEvent {
    #[serde(rename = "progress")]
    Progress { step: String, timestamp: chrono::DateTime<Utc>, elapsed_seconds: f64, #[serde(skip_serializing_if = "Option::is_none")] data: Option<serde_json::Value> },
    #[serde(rename = "keepalive")]
    Keepalive { message: String },
    #[serde(rename = "complete")]
    Complete { brief: Box<Brief> },
    #[serde(rename = "error")]
    Error { #[serde(flatten)] payload: ErrorPayload },
}

pub struct PrepCoordinator {
    token_guard: Arc<TokenGuard>,
    harvester: Arc<MultiAccountHarvester>,
    classifier: Arc<EventClassifier>,
    purpose_detector: Arc<PurposeDetector>,
    email_pipeline: Arc<EmailRelevancePipeline>,
    doc_pipeline: Arc<DocumentRelevancePipeline>,
    researcher: Arc<AttendeeResearcher>,
    synthesizer: Arc<BriefSynthesizer>,
    briefs: Arc<dyn BriefRepository>,
}

impl PrepCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token_guard: Arc<TokenGuard>,
        harvester: Arc<MultiAccountHarvester>,
        classifier: Arc<EventClassifier>,
        purpose_detector: Arc<PurposeDetector>,
        email_pipeline: Arc<EmailRelevancePipeline>,
        doc_pipeline: Arc<DocumentRelevancePipeline>,
        researcher: Arc<AttendeeResearcher>,
        synthesizer: Arc<BriefSynthesizer>,
        briefs: Arc<dyn BriefRepository>,
    ) -> Self {
        Self { token_guard, harvester, classifier, purpose_detector, email_pipeline, doc_pipeline, researcher, synthesizer, briefs }
    }

    /// `run(meeting, attendees, user) -> stream<StreamEvent>` (spec §4.10).
    pub fn run(self: Arc<Self>, meeting: Meeting, attendees: Vec<Attendee>, user: User, accounts: Vec<Account>, cancel: CancellationToken) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let last_sent = Arc::new(AtomicI64::new(now_millis()));

        let heartbeat_tx = tx.clone();
        let heartbeat_last = last_sent.clone();
        let heartbeat_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => break,
                    _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {
                        let elapsed = now_millis() - heartbeat_last.load(Ordering::Relaxed);
                        if elapsed >= KEEPALIVE_INTERVAL.as_millis() as i64
                            && heartbeat_tx.send(StreamEvent::Keepalive { message: "still working".into() }).await.is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        tokio::spawn(async move {
            let start = Instant::now();
            let result = self.drive(&meeting, &attendees, &user, &accounts, &tx, &last_sent, start, &cancel).await;
            if let Err(err) = result {
                let payload = ErrorPayload::from_error(&err, uuid::Uuid::new_v4().to_string());
                let _ = tx.send(StreamEvent::Error { payload }).await;
            }
            cancel.cancel();
        });

        rx
    }

    async fn emit(&self, tx: &mpsc::Sender<StreamEvent>, last_sent: &AtomicI64, start: Instant, step: &str, data: Option<serde_json::Value>) -> Result<(), PrepError> {
        last_sent.store(now_millis(), Ordering::Relaxed);
        let event = StreamEvent::Progress { step: step.to_string(), timestamp: Utc::now(), elapsed_seconds: start.elapsed().as_secs_f64(), data };
        tx.send(event).await.map_err(|_| PrepError::Cancelled)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        meeting: &Meeting,
        attendees: &[Attendee],
        user: &User,
        accounts: &[Account],
        tx: &mpsc::Sender<StreamEvent>,
        last_sent: &AtomicI64,
        start: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), PrepError> {
        self.emit(tx, last_sent, start, "starting", None).await?;

        let user_emails: HashSet<String> = user.emails.iter().map(|e| e.to_ascii_lowercase()).collect();

        self.emit(tx, last_sent, start, "fetching_context", None).await?;
        let batch = self.token_guard.ensure_all_valid(accounts).await;
        if batch.all_revoked() {
            return Err(PrepError::NoValidAccounts { user_id: user.id.clone() });
        }
        if batch.valid.is_empty() {
            return Err(PrepError::TransientProvider("no accounts could be validated".into()));
        }
        check_cancelled(cancel)?;

        let classification = self.classifier.classify(meeting, &user_emails).await;
        if classification.prep_depth == PrepDepth::None {
            return Err(PrepError::ClassificationNonMeeting { reason: classification.reason });
        }

        self.emit(tx, last_sent, start, "fetching_data", Some(serde_json::json!({"classification": classification.reason}))).await?;
        let (email_result, file_result, account_stats) = self.harvester.fetch_all_account_context(&batch.valid, meeting, attendees).await;
        let calendar_result = self.harvester.fetch_calendar(&batch.valid, meeting).await;
        check_cancelled(cancel)?;

        if classification.prep_depth == PrepDepth::Minimal {
            let brief = minimal_brief(user, meeting, attendees, &classification.reason);
            self.persist(user, meeting, &brief).await?;
            self.emit(tx, last_sent, start, "complete", None).await?;
            let _ = tx.send(StreamEvent::Complete { brief: Box::new(brief) }).await;
            return Ok(());
        }

        self.emit(tx, last_sent, start, "researching_attendees", Some(serde_json::json!({"accounts_failed": account_stats.failed_accounts}))).await?;

        let attendee_names: Vec<String> = attendees.iter().map(|a| a.display_name.clone().unwrap_or_else(|| a.email.clone())).collect();
        let attendee_emails: Vec<String> = attendees.iter().map(|a| a.email.to_ascii_lowercase()).collect();

        // Past meetings with this same attendee list often carry a display
        // name the current invite lacks (e.g. a resource-booked recurring
        // series); feed those in as a resolution fallback.
        let calendar_history_names: Vec<(String, String)> = calendar_result
            .items
            .iter()
            .flat_map(|c| c.attendees.iter())
            .filter_map(|a| a.display_name.as_ref().map(|name| (a.email.clone(), name.clone())))
            .collect();

        let purpose_fut = self.purpose_detector.detect(meeting, &attendee_names, &email_result.items, &attendee_emails);
        let research_fut = self.researcher.research_all(attendees, &email_result.items, &calendar_history_names);
        let (purpose, attendee_research) = tokio::join!(purpose_fut, research_fut);
        check_cancelled(cancel)?;

        let ctx = MeetingContext { title: meeting.title.clone(), purpose: purpose.purpose.clone(), key_entities: attendee_names.clone(), confidence: purpose.confidence, user_company: None };

        self.emit(tx, last_sent, start, "analyzing_emails", None).await?;
        let email_output = self.email_pipeline.run(&ctx, &email_result.items, meeting.start).await;
        check_cancelled(cancel)?;

        self.emit(tx, last_sent, start, "analyzing_documents", None).await?;
        let doc_output = self.doc_pipeline.run(&ctx, &file_result.items, meeting.start).await;
        check_cancelled(cancel)?;

        self.emit(tx, last_sent, start, "analyzing_relationships", None).await?;
        self.emit(tx, last_sent, start, "analyzing_contributions", None).await?;
        self.emit(tx, last_sent, start, "synthesizing_narrative", None).await?;
        self.emit(tx, last_sent, start, "building_timeline", None).await?;

        let mut reasoning = email_output.reasoning.clone();
        reasoning.extend(doc_output.reasoning.clone());
        let mut warnings = Vec::new();
        if !account_stats.failed_accounts.is_empty() {
            warnings.push(format!("{} account(s) failed to harvest", account_stats.failed_accounts.len()));
        }

        let inputs = SynthesisInputs {
            meeting,
            user,
            attendees,
            purpose: &purpose,
            email_stage: &email_output.stage,
            email_fields: &email_output.fields,
            document_stage: &doc_output.stage,
            attendee_research: &attendee_research,
            emails: &email_result.items,
            documents: &file_result.items,
            past_meetings: &calendar_result.items,
            reasoning,
            staleness: doc_output.staleness.clone(),
            warnings,
            emails_considered: email_result.items.len(),
            documents_considered: file_result.items.len(),
        };

        self.emit(tx, last_sent, start, "generating_summary", None).await?;
        let brief = self.synthesizer.synthesize(inputs).await;
        check_cancelled(cancel)?;

        self.persist(user, meeting, &brief).await?;

        self.emit(tx, last_sent, start, "complete", None).await?;
        let _ = tx.send(StreamEvent::Complete { brief: Box::new(brief) }).await;
        Ok(())
    }

    async fn persist(&self, user: &User, meeting: &Meeting, brief: &Brief) -> Result<(), PrepError> {
        let json = serde_json::to_value(brief).map_err(|e| PrepError::Internal(e.into()))?;
        self.briefs.upsert_brief(&user.id, &meeting.id, &json, Utc::now()).await.map_err(PrepError::Internal)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PrepError> {
    if cancel.is_cancelled() {
        Err(PrepError::Cancelled)
    } else {
        Ok(())
    }
}

fn minimal_brief(user: &User, meeting: &Meeting, attendees: &[Attendee], reason: &str) -> Brief {
    let summary = format!("Minimal prep: {reason}");
    Brief {
        user_id: user.id.clone(),
        meeting_id: meeting.id.clone(),
        one_liner: crate::brief::synthesizer::truncate_one_liner(&summary),
        summary,
        purpose: String::new(),
        agenda: Vec::new(),
        attendees: attendees.to_vec(),
        email_analysis: StageOutput { narrative: String::new(), skipped: true },
        document_analysis: StageOutput { narrative: String::new(), skipped: true },
        relationship_analysis: StageOutput { narrative: String::new(), skipped: true },
        contribution_analysis: StageOutput { narrative: String::new(), skipped: true },
        broader_narrative: String::new(),
        timeline: Vec::new(),
        recommendations: Vec::new(),
        action_items: Vec::new(),
        stats: Default::default(),
        extraction_data: Default::default(),
    }
}

fn now_millis() -> i64 {
    // Wall-clock read for keepalive cadence bookkeeping only, never for
    // pipeline decisions.
    chrono::Utc::now().timestamp_millis()
}
