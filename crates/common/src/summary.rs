//! AI dashboard summary
//!
//! The text-generation service is an opaque collaborator behind
//! [`TextGenerator`]. [`SummaryService::summarize`] never fails: a missing
//! generator or a generator error comes back as a tagged outcome.

use crate::aggregation::{AggregationService, KpiSummary, NamedCount};
use crate::config::{AppConfig, SummaryConfig};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const SYSTEM_PROMPT: &str = "You are an analyst writing short briefings about a portfolio of \
development-aid projects. Use only the figures provided. Do not invent numbers.";

/// How many entries of each breakdown go into the prompt
const TOP_N: usize = 5;

/// Trait for text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for `prompt` under `system` instructions
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;

    /// Model identifier reported back to callers
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat-completions client
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

impl HttpTextGenerator {
    pub fn new(config: &SummaryConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "summary.api_key is required for the text generator".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::SummaryError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SummaryError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AppError::SummaryError {
            message: format!("Failed to parse response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::SummaryError {
                message: "Response contained no choices".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Result of a summary request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Available { summary: String, model: String },
    Unavailable { reason: String },
    Failed { message: String },
}

/// Builds dashboard figures into a prompt and asks the generator for prose
#[derive(Clone)]
pub struct SummaryService {
    aggregation: AggregationService,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl SummaryService {
    pub fn new(aggregation: AggregationService, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { aggregation, generator }
    }

    /// Wire an HTTP generator when summaries are enabled and keyed
    pub fn from_config(aggregation: AggregationService, config: &AppConfig) -> Result<Self> {
        let generator: Option<Arc<dyn TextGenerator>> = if config.summary_configured() {
            info!(model = %config.summary.model, "AI summary enabled");
            Some(Arc::new(HttpTextGenerator::new(&config.summary)?))
        } else {
            info!("AI summary disabled");
            None
        };

        Ok(Self::new(aggregation, generator))
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    #[instrument(skip(self))]
    pub async fn summarize(&self) -> SummaryOutcome {
        let Some(generator) = self.generator.as_ref() else {
            metrics::record_summary("unavailable");
            return SummaryOutcome::Unavailable {
                reason: "No text generation service is configured".to_string(),
            };
        };

        let prompt = match self.gather_prompt().await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Could not gather dashboard figures for summary");
                metrics::record_summary("failed");
                return SummaryOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        match generator.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                metrics::record_summary("available");
                SummaryOutcome::Available {
                    summary: text.trim().to_string(),
                    model: generator.model_name().to_string(),
                }
            }
            Ok(_) => {
                metrics::record_summary("failed");
                SummaryOutcome::Failed {
                    message: "Text generator returned an empty summary".to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Text generator failed");
                metrics::record_summary("failed");
                SummaryOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn gather_prompt(&self) -> Result<String> {
        let kpi = self.aggregation.kpi_summary().await?;
        let countries = self.aggregation.count_by_country().await?;
        let themes = self.aggregation.count_by_theme().await?;
        Ok(build_prompt(&kpi, &countries, &themes))
    }
}

fn build_prompt(kpi: &KpiSummary, countries: &[NamedCount], themes: &[NamedCount]) -> String {
    let mut prompt = format!(
        "Write a three-paragraph executive summary of this project portfolio.\n\n\
         Total projects: {}\n\
         Total PAG value: {}\n\
         Total expenditure: {}\n\
         Total contribution: {}\n\
         Contribution minus expenditure: {}\n\
         Countries: {}, organizational units: {}, themes: {}\n",
        kpi.total_projects,
        kpi.total_pag_value,
        kpi.total_expenditure,
        kpi.total_contribution,
        kpi.contribution_expenditure_diff,
        kpi.countries,
        kpi.org_units,
        kpi.themes,
    );

    push_ranking(&mut prompt, "Projects by country", countries);
    push_ranking(&mut prompt, "Projects by theme", themes);
    prompt
}

fn push_ranking(prompt: &mut String, heading: &str, entries: &[NamedCount]) {
    if entries.is_empty() {
        return;
    }

    prompt.push_str(&format!("\n{} (top {}):\n", heading, TOP_N));
    for entry in entries.iter().take(TOP_N) {
        prompt.push_str(&format!("- {}: {}\n", entry.name, entry.count));
    }
}
