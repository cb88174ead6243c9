use crate::error::{Result, ToolError};
use crate::traits::{Pricing, Tool, ToolSpec, optional_u64, require_string};
use async_trait::async_trait;
use regex::Regex;
use scout_llm::{Message, ModelGateway};
use std::path::PathBuf;
use std::sync::Arc;

const SCORER_PREAMBLE: &str = "You are a resume matching expert.";

#[derive(Debug, Clone)]
pub struct JobSearchConfig {
    /// Charged per requested posting; surfaces in the approval prompt.
    pub unit_cost: f64,
    /// Minimum match score (0-100) for a posting to enter the report.
    pub match_threshold: u32,
    pub resume_path: PathBuf,
    pub report_path: PathBuf,
    pub request_timeout_secs: u64,
    /// Hard cap on postings fetched regardless of `job_limit`.
    pub max_postings: usize,
}

impl Default for JobSearchConfig {
    fn default() -> Self {
        Self {
            unit_cost: 2.0,
            match_threshold: 50,
            resume_path: PathBuf::from("resume.txt"),
            report_path: PathBuf::from("good_jobs.txt"),
            request_timeout_secs: 30,
            max_postings: 25,
        }
    }
}

/// Priced job-board search: fetches postings for a query, scores each against
/// the user's resume via the model gateway, and appends matches to a
/// plain-text report.
pub struct JobSearchTool {
    gateway: Arc<dyn ModelGateway>,
    http: reqwest::Client,
    cfg: JobSearchConfig,
}

impl JobSearchTool {
    pub fn new(gateway: Arc<dyn ModelGateway>, cfg: JobSearchConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self { gateway, http, cfg }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .header("User-Agent", "Mozilla/5.0 (compatible; scout/0.1)")
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("fetch {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "fetch {url}: status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("read {url}: {e}")))
    }

    async fn score_match(&self, resume: &str, description: &str) -> Result<u32> {
        let prompt = format!(
            "Score how well this resume matches this job (0-100%).\n\n\
             RESUME:\n{}\n\nJOB DESCRIPTION:\n{}\n\n\
             Respond ONLY with: SCORE: X%\nWhere X is a number between 0-100.",
            truncate(resume, 3000),
            truncate(description, 3000),
        );
        let response = self
            .gateway
            .invoke(SCORER_PREAMBLE, &[Message::user(prompt)], &[])
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("match scoring failed: {e}")))?;
        Ok(extract_score(&response.message.text))
    }

    async fn append_report(&self, entry: &str) -> Result<()> {
        let existing = tokio::fs::read_to_string(&self.cfg.report_path)
            .await
            .unwrap_or_default();
        let mut content = if existing.is_empty() {
            format!(
                "=== JOB SEARCH REPORT ===\nDate: {}\n",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
            )
        } else {
            existing
        };
        content.push_str(entry);
        if let Some(parent) = self.cfg.report_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.cfg.report_path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl Tool for JobSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "job_search".to_string(),
            description: "Searches a job board for postings matching a title and location, \
                          scores each against the user's resume, and records good matches \
                          in a report. Charged per requested posting."
                .to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "job_title": { "type": "string", "description": "Role to search for" },
                    "country": { "type": "string", "description": "Country, e.g. 'uk' or 'canada'" },
                    "location": { "type": "string", "description": "City or region" },
                    "job_limit": { "type": "integer", "description": "How many postings to analyze" }
                },
                "required": ["job_title", "country", "location"]
            }),
            pricing: Some(Pricing::per_unit(self.cfg.unit_cost, "job_limit")),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let job_title = require_string(&arguments, "job_title")?;
        let country = require_string(&arguments, "country")?;
        let location = require_string(&arguments, "location")?;
        let job_limit = optional_u64(&arguments, "job_limit")?.unwrap_or(1) as usize;
        let job_limit = job_limit.clamp(1, self.cfg.max_postings.max(1));

        let resume = tokio::fs::read_to_string(&self.cfg.resume_path)
            .await
            .map_err(|_| {
                ToolError::ExecutionFailed(format!(
                    "resume file not found at {}; create it before searching",
                    self.cfg.resume_path.display()
                ))
            })?;

        let domain = board_domain(&country);
        let url = search_url(&domain, &job_title, &location);
        tracing::info!(%url, job_limit, "job search started");

        let listing = self.fetch_text(&url).await?;
        let job_ids = extract_job_ids(&listing);
        if job_ids.is_empty() {
            return Ok(format!(
                "No postings found for '{job_title}' in {location}. \
                 Try a broader title or another location."
            ));
        }

        let mut analyzed = 0usize;
        let mut good_matches = 0usize;
        for job_id in job_ids.iter().take(job_limit) {
            let posting_url = format!("https://{domain}/viewjob?jk={job_id}");
            let page = match self.fetch_text(&posting_url).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(%posting_url, error = %e, "skipping unreadable posting");
                    continue;
                }
            };
            let description = strip_html(&page);
            if description.len() < 100 {
                tracing::debug!(%posting_url, "posting description too short, skipping");
                continue;
            }
            analyzed += 1;

            let score = self.score_match(&resume, &description).await?;
            tracing::info!(%posting_url, score, "posting scored");
            if score >= self.cfg.match_threshold {
                good_matches += 1;
                self.append_report(&format!(
                    "\n{}\nJob #{good_matches}\nTitle: {job_title}\nMatch Score: {score}%\n\
                     Link: {posting_url}\n{}\n",
                    "=".repeat(60),
                    "=".repeat(60),
                ))
                .await?;
            }
        }

        if analyzed == 0 {
            return Ok(format!(
                "Found {} postings but none could be read for '{job_title}' in {location}.",
                job_ids.len().min(job_limit)
            ));
        }
        if good_matches == 0 {
            return Ok(format!(
                "Search completed: analyzed {analyzed} posting(s) but found no matches at or \
                 above the {}% threshold. Consider broadening the search.",
                self.cfg.match_threshold
            ));
        }
        Ok(format!(
            "Found {good_matches} matching job(s) out of {analyzed} analyzed. \
             The report lists titles, scores and links."
        ))
    }
}

/// Country name to job-board domain; unknown countries fall back to the
/// US board.
fn board_domain(country: &str) -> String {
    match country.trim().to_lowercase().as_str() {
        "usa" | "us" | "united states" => "indeed.com",
        "canada" => "ca.indeed.com",
        "uk" | "united kingdom" => "indeed.co.uk",
        "uae" | "dubai" => "ae.indeed.com",
        "india" => "in.indeed.com",
        "pakistan" => "pk.indeed.com",
        "australia" => "au.indeed.com",
        _ => "indeed.com",
    }
    .to_string()
}

fn search_url(domain: &str, job_title: &str, location: &str) -> String {
    format!(
        "https://{domain}/jobs?q={}&l={}",
        job_title.replace(' ', "+"),
        location.replace(' ', "+"),
    )
}

/// Posting ids from listing-page links (`...jk=<id>...`), deduplicated in
/// first-seen order.
fn extract_job_ids(html: &str) -> Vec<String> {
    let re = Regex::new(r"jk=([0-9a-zA-Z]+)").expect("static regex");
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for cap in re.captures_iter(html) {
        let id = cap[1].to_string();
        if seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}

fn strip_html(html: &str) -> String {
    let no_scripts = Regex::new(r"(?si)<(script|style)[^>]*>.*?</(script|style)>")
        .expect("static regex")
        .replace_all(html, " ");
    let no_tags = Regex::new(r"<[^>]+>")
        .expect("static regex")
        .replace_all(&no_scripts, " ");
    no_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pulls the percentage out of a `SCORE: X%` reply; tolerates a bare `X%`
/// anywhere in the text; anything else scores 0.
fn extract_score(text: &str) -> u32 {
    let strict = Regex::new(r"SCORE:\s*(\d+)%").expect("static regex");
    let loose = Regex::new(r"(\d+)%").expect("static regex");
    strict
        .captures(text)
        .or_else(|| loose.captures(text))
        .and_then(|cap| cap[1].parse().ok())
        .map(|s: u32| s.min(100))
        .unwrap_or(0)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
