//! AttendeeResearcher (spec §4.7): per-attendee name/company resolution,
//! email-evidence extraction, and optional web research — fanned out
//! concurrently in waves of 25.

use crate::domain::{Attendee, EmailArtifact};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant_array};
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const CONCURRENCY_CAP: usize = 25;
const MAX_EVIDENCE_EMAILS: usize = 20;
const MAX_FALLBACK_FACTS: usize = 3;
const MAX_FACTS: usize = 6;
const GENERIC_PROVIDERS: &[&str] = &["gmail", "yahoo", "outlook", "hotmail", "icloud", "protonmail"];

static NAME_ADDR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*"?([^"<]+?)"?\s*<([^>]+)>\s*$"#).unwrap());

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub excerpt: String,
}

#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone)]
pub struct AttendeeResearchResult {
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub facts: Vec<String>,
    pub data_source: String,
}

pub struct AttendeeResearcher {
    llm: LlmClient,
    web_search: Option<std::sync::Arc<dyn WebSearchClient>>,
}

impl AttendeeResearcher {
    pub fn new(llm: LlmClient, web_search: Option<std::sync::Arc<dyn WebSearchClient>>) -> Self {
        Self { llm, web_search }
    }

    pub async fn research_all(&self, attendees: &[Attendee], emails: &[EmailArtifact], calendar_history_names: &[(String, String)]) -> Vec<AttendeeResearchResult> {
        let humans: Vec<&Attendee> = attendees.iter().filter(|a| !a.is_resource()).collect();

        let mut out = Vec::with_capacity(humans.len());
        for wave in humans.chunks(CONCURRENCY_CAP) {
            let results = join_all(wave.iter().map(|a| self.research_one(a, emails, calendar_history_names))).await;
            out.extend(results);
        }
        out
    }

    async fn research_one(&self, attendee: &Attendee, emails: &[EmailArtifact], calendar_history_names: &[(String, String)]) -> AttendeeResearchResult {
        let name = resolve_name(attendee, emails, calendar_history_names);
        let company = infer_company(&attendee.email);

        let evidence = gather_evidence(attendee, emails);
        let mut facts = self.email_evidence_facts(&name, &evidence).await;
        let mut data_source = if facts.is_empty() { "basic" } else { "local" };

        if let Some(web) = &self.web_search {
            if let Some(web_facts) = self.web_research(&name, &company, &attendee.email, web.as_ref()).await {
                let had_local = !facts.is_empty();
                facts.extend(web_facts);
                data_source = if had_local { "local+web" } else { "web" };
            }
        }

        facts = dedup_facts(facts);
        facts.truncate(MAX_FACTS);

        if facts.is_empty() {
            facts = basic_identity_facts(&name, &company, &attendee.email);
            data_source = "basic";
        }

        AttendeeResearchResult { email: attendee.email.clone(), name, company, facts, data_source: data_source.to_string() }
    }

    async fn email_evidence_facts(&self, name: &str, evidence: &[&EmailArtifact]) -> Vec<String> {
        if evidence.is_empty() {
            return Vec::new();
        }
        let excerpt = evidence
            .iter()
            .take(MAX_EVIDENCE_EMAILS)
            .map(|e| format!("Subject: {}\nFrom: {}\nSnippet: {}", e.subject, e.from, e.snippet))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "From these emails involving {name}, extract 15-80 word facts rooted in the email text. \
             Return a JSON array of strings, or objects with a \"fact\" or \"text\" field.\n{excerpt}"
        );
        let messages = vec![ChatMessage::system("You extract attendee facts strictly from email evidence."), ChatMessage::user(&prompt)];

        let response = match self.llm.complete(messages, 700).await {
            Ok(r) => r,
            Err(_) => return fallback_facts_from_metadata(evidence),
        };

        let values = parse_tolerant_array(&response);
        let facts = extract_fact_strings(&values);
        if facts.is_empty() {
            fallback_facts_from_metadata(evidence)
        } else {
            facts
        }
    }

    async fn web_research(&self, name: &str, company: &Option<String>, email: &str, web: &dyn WebSearchClient) -> Option<Vec<String>> {
        let domain = email.split('@').nth(1).unwrap_or("");
        let company_name = company.clone().unwrap_or_default();
        let queries = [
            format!("\"{name}\" site:linkedin.com {domain}"),
            format!("\"{name}\" {company_name} site:linkedin.com"),
            format!("\"{name}\" \"{email}\""),
        ];

        let mut all_results = Vec::new();
        for q in &queries {
            if let Ok(mut r) = web.search(q).await {
                all_results.append(&mut r);
            }
        }
        if all_results.is_empty() {
            return None;
        }

        let name_tokens: Vec<String> = name.split_whitespace().map(|s| s.to_ascii_lowercase()).collect();
        let validated: Vec<&SearchResult> = all_results
            .iter()
            .filter(|r| {
                let haystack = format!("{} {} {}", r.title, r.excerpt, r.url).to_ascii_lowercase();
                name_tokens.iter().any(|t| haystack.contains(t.as_str()))
                    || haystack.contains(&email.to_ascii_lowercase())
                    || (!company_name.is_empty() && haystack.contains(&company_name.to_ascii_lowercase()))
            })
            .collect();

        let chosen: Vec<&SearchResult> = if validated.is_empty() { all_results.iter().take(3).collect() } else { validated };

        let excerpt = chosen.iter().map(|r| format!("{} — {}", r.title, r.excerpt)).collect::<Vec<_>>().join("\n");
        let prompt = format!("Synthesize 3-6 additional facts about {name} from these web search snippets:\n{excerpt}\nReturn a JSON array of strings.");
        let messages = vec![ChatMessage::system("You synthesize attendee facts from public web search results."), ChatMessage::user(&prompt)];

        let response = self.llm.complete(messages, 500).await.ok()?;
        let values = parse_tolerant_array(&response);
        Some(extract_fact_strings(&values))
    }
}

fn resolve_name(attendee: &Attendee, emails: &[EmailArtifact], calendar_history_names: &[(String, String)]) -> String {
    if let Some(name) = &attendee.display_name {
        if !name.trim().is_empty() {
            return name.clone();
        }
    }
    if let Some((_, name)) = calendar_history_names.iter().find(|(e, _)| e.eq_ignore_ascii_case(&attendee.email)) {
        return name.clone();
    }
    for email in emails {
        for header in [&email.from].into_iter().chain(email.to.iter()) {
            if let Some(caps) = NAME_ADDR_RE.captures(header) {
                if caps[2].eq_ignore_ascii_case(&attendee.email) {
                    return caps[1].trim().to_string();
                }
            }
        }
    }
    attendee.email.split('@').next().unwrap_or(&attendee.email).to_string()
}

fn infer_company(email: &str) -> Option<String> {
    let domain = email.split('@').nth(1)?;
    let local_part = domain.split('.').next()?;
    let lower = domain.to_ascii_lowercase();

    if lower.ends_with(".edu") || lower.contains(".ac.") {
        return Some("Student".to_string());
    }
    if GENERIC_PROVIDERS.contains(&local_part.to_ascii_lowercase().as_str()) {
        return None;
    }
    let mut chars = local_part.chars();
    Some(match chars.next() {
        Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
        None => return None,
    })
}

fn gather_evidence<'a>(attendee: &Attendee, emails: &'a [EmailArtifact]) -> Vec<&'a EmailArtifact> {
    let addr = attendee.email.to_ascii_lowercase();
    let mut seen = HashSet::new();
    emails
        .iter()
        .filter(|e| e.from.to_ascii_lowercase() == addr || e.to.iter().any(|t| t.to_ascii_lowercase() == addr))
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

fn extract_fact_strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("fact").or_else(|| map.get("text")).and_then(|v| v.as_str()).map(String::from),
            _ => None,
        })
        .collect()
}

fn fallback_facts_from_metadata(evidence: &[&EmailArtifact]) -> Vec<String> {
    let mut facts = Vec::new();
    if !evidence.is_empty() {
        facts.push(format!("Exchanged {} email(s) in the harvested corpus.", evidence.len()));
    }
    let subjects: Vec<&str> = evidence.iter().map(|e| e.subject.as_str()).take(3).collect();
    if !subjects.is_empty() {
        facts.push(format!("Recent subject lines: {}.", subjects.join("; ")));
    }
    facts.truncate(MAX_FALLBACK_FACTS);
    facts
}

fn basic_identity_facts(name: &str, company: &Option<String>, email: &str) -> Vec<String> {
    let mut facts = vec![format!("{name} can be reached at {email}.")];
    if let Some(c) = company {
        facts.push(format!("Appears to be affiliated with {c} based on their email domain."));
    }
    facts
}

fn dedup_facts(facts: Vec<String>) -> Vec<String> {
    crate::relevance::dedup_similar(facts)
}

/// Generic web-search backend, queried by [`AttendeeResearcher`] and by the
/// `parallel_search` tool. Absent `config.web_search.api_key`, no
/// `WebSearchClient` is wired at all and research degrades to
/// email-evidence-only facts (§4.7).
#[derive(Clone)]
pub struct HttpWebSearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpWebSearchClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build web search http client");
        Self { http, base_url, api_key }
    }
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResponseItem>,
}

#[derive(serde::Deserialize)]
struct SearchResponseItem {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl WebSearchClient for HttpWebSearchClient {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>> {
        let resp = self
            .http
            .get(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json::<SearchResponse>()
            .await?;

        Ok(resp
            .results
            .into_iter()
            .map(|r| SearchResult { title: r.title, url: r.url, excerpt: r.snippet })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attendee(email: &str, name: Option<&str>) -> Attendee {
        Attendee { email: email.into(), display_name: name.map(String::from), response_status: None }
    }

    #[test]
    fn company_inferred_from_domain() {
        assert_eq!(infer_company("bob@acme.com"), Some("Acme".to_string()));
    }

    #[test]
    fn edu_domain_yields_student() {
        assert_eq!(infer_company("alice@university.edu"), Some("Student".to_string()));
    }

    #[test]
    fn generic_provider_yields_no_company() {
        assert_eq!(infer_company("bob@gmail.com"), None);
    }

    #[test]
    fn name_resolution_prefers_display_name() {
        let a = attendee("bob@acme.com", Some("Bob Smith"));
        let name = resolve_name(&a, &[], &[]);
        assert_eq!(name, "Bob Smith");
    }

    #[test]
    fn name_resolution_falls_back_to_header_parsing() {
        let a = attendee("bob@acme.com", None);
        let email = EmailArtifact {
            id: "e1".into(),
            subject: "Hi".into(),
            from: "Bob Smith <bob@acme.com>".into(),
            to: vec!["me@x.com".into()],
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body: String::new(),
            snippet: String::new(),
            attachments: vec![],
        };
        let name = resolve_name(&a, &[email], &[]);
        assert_eq!(name, "Bob Smith");
    }

    #[test]
    fn name_resolution_falls_back_to_local_part() {
        let a = attendee("bob.smith@acme.com", None);
        let name = resolve_name(&a, &[], &[]);
        assert_eq!(name, "bob.smith");
    }

    #[test]
    fn resource_calendars_filtered_before_research() {
        let humans = vec![attendee("room@resource.calendar.google.com", None)];
        assert!(humans[0].is_resource());
    }
}
