use crate::core::state::{Beat, FocusChar, Page};
use crate::services::auth::CredentialMonitor;
use crate::services::llm::LlmClient;
use crate::services::prompt::{self, StorySettings};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub const DEFAULT_CHOICES: [&str; 2] = ["Fight for History", "Fight for Future"];

static SPEAKER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w\s\-]+:\s*").expect("speaker prefix pattern is valid")
});

const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’'];

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    match s.find("```") {
        Some(start) => {
            let after = &s[start + 3..];
            let after = after
                .strip_prefix("json")
                .or_else(|| after.strip_prefix("JSON"))
                .unwrap_or(after);
            let body = match after.rfind("```") {
                Some(end) => &after[..end],
                None => after,
            };
            body.trim().to_string()
        }
        None => s.to_string(),
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn clean_caption(raw: &str) -> Option<String> {
    let text = SPEAKER_PREFIX.replace(raw, "");
    Some(text.trim().to_string()).filter(|s| !s.is_empty())
}

fn clean_dialogue(raw: &str) -> Option<String> {
    let text = SPEAKER_PREFIX.replace(raw, "");
    let text = text.trim().trim_matches(QUOTES).trim();
    Some(text.to_string()).filter(|s| !s.is_empty())
}

/// Parses a model response into a normalized beat. Any error here means the
/// caller should fall back to [`Beat::fallback`].
pub fn parse_beat(raw: &str, is_decision_page: bool) -> Result<Beat> {
    let clean = strip_code_blocks(raw);
    let value: Value = serde_json::from_str(&clean)
        .with_context(|| format!("Failed to parse beat JSON: {}", clean))?;

    // Some responses wrap the object in a one-element array.
    let value = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Beat JSON was an empty array"))?,
        other => other,
    };
    if !value.is_object() {
        bail!("Beat JSON is not an object: {}", clean);
    }

    let scene = text_field(&value, "scene")
        .ok_or_else(|| anyhow!("Beat JSON has no scene: {}", clean))?;

    let focus_char = value
        .get("focus_char")
        .and_then(Value::as_str)
        .and_then(FocusChar::parse)
        .unwrap_or(FocusChar::Hero);

    let mut choices: Vec<String> = if is_decision_page {
        value
            .get("choices")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    if is_decision_page {
        if choices.len() < 2 {
            choices = DEFAULT_CHOICES.iter().map(|c| c.to_string()).collect();
        }
        choices.truncate(2);
    }

    Ok(Beat {
        caption: text_field(&value, "caption").and_then(|c| clean_caption(&c)),
        dialogue: text_field(&value, "dialogue").and_then(|d| clean_dialogue(&d)),
        scene,
        focus_char,
        choices,
    })
}

pub struct NarrativeGenerator {
    llm: Arc<dyn LlmClient>,
    monitor: Arc<CredentialMonitor>,
    settings: StorySettings,
    max_story_pages: u32,
    timeout: Duration,
}

impl NarrativeGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        monitor: Arc<CredentialMonitor>,
        settings: StorySettings,
        max_story_pages: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            monitor,
            settings,
            max_story_pages,
            timeout,
        }
    }

    /// Never fails: backend and parse errors are reported to the credential
    /// monitor and replaced by the fallback beat.
    pub async fn generate(&self, page_index: u32, history: &[Page], is_decision_page: bool) -> Beat {
        match self.try_generate(page_index, history, is_decision_page).await {
            Ok(beat) => {
                info!("Beat ready for page {}", page_index);
                beat
            }
            Err(e) => {
                self.monitor
                    .report(&format!("Beat generation for page {}", page_index), &e);
                Beat::fallback()
            }
        }
    }

    async fn try_generate(
        &self,
        page_index: u32,
        history: &[Page],
        is_decision_page: bool,
    ) -> Result<Beat> {
        let prompt = prompt::narrative_prompt(
            page_index,
            self.max_story_pages,
            history,
            is_decision_page,
            &self.settings,
        );
        debug!("Narrative prompt for page {}:\n{}", page_index, prompt);

        let raw = tokio::time::timeout(self.timeout, self.llm.generate_json(&prompt))
            .await
            .map_err(|_| anyhow!("Narrative request timed out after {:?}", self.timeout))??;

        parse_beat(&raw, is_decision_page)
    }
}
