use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::llm::LlmConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default)]
    pub unattended: bool,

    pub llm: LlmConfig,

    #[serde(default)]
    pub story: StoryConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Reader-facing choices. Anything left empty is asked for by the setup step.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoryConfig {
    pub style: Option<String>,
    pub city: Option<String>,
    pub role: Option<String>,
    pub language: Option<String>,
    pub rich_mode: Option<bool>,
    pub hero_image: Option<String>,
    pub mentor_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Index of the back cover; story pages are `1..total_pages`.
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,
    #[serde(default = "default_decision_pages")]
    pub decision_pages: Vec<u32>,
    #[serde(default = "default_initial_pages")]
    pub initial_pages: u32,
    #[serde(default = "default_background_pages")]
    pub background_pages: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_pages: default_total_pages(),
            decision_pages: default_decision_pages(),
            initial_pages: default_initial_pages(),
            background_pages: default_background_pages(),
            batch_size: default_batch_size(),
            launch_delay_ms: default_launch_delay_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn back_cover_index(&self) -> u32 {
        self.total_pages
    }

    pub fn max_story_pages(&self) -> u32 {
        self.total_pages.saturating_sub(1)
    }

    pub fn is_decision_page(&self, page_index: u32) -> bool {
        self.decision_pages.contains(&page_index)
    }
}

fn default_output() -> String {
    "output".to_string()
}
fn default_total_pages() -> u32 {
    11
}
fn default_decision_pages() -> Vec<u32> {
    vec![3]
}
fn default_initial_pages() -> u32 {
    2
}
fn default_background_pages() -> u32 {
    3
}
fn default_batch_size() -> u32 {
    6
}
fn default_launch_delay_ms() -> u64 {
    1100
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.yml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.llm.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write("config.yml", content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.total_pages < 2 {
            bail!("pipeline.total_pages must leave room for at least one story page");
        }
        if p.batch_size == 0 {
            bail!("pipeline.batch_size must be at least 1");
        }
        if let Some(bad) = p
            .decision_pages
            .iter()
            .find(|&&d| d == 0 || d > p.max_story_pages())
        {
            bail!(
                "decision page {} is outside the story range 1..={}",
                bad,
                p.max_story_pages()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let yaml = r#"
llm:
  provider: gemini
  gemini:
    api_key: "abc"
"#;
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.output_folder, "output");
        assert_eq!(config.pipeline.total_pages, 11);
        assert_eq!(config.pipeline.back_cover_index(), 11);
        assert_eq!(config.pipeline.max_story_pages(), 10);
        assert_eq!(config.pipeline.decision_pages, vec![3]);
        assert_eq!(config.pipeline.batch_size, 6);
        assert!(config.story.style.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_decision_page_outside_story_range_is_rejected() {
        let yaml = r#"
llm:
  provider: gemini
pipeline:
  total_pages: 5
  decision_pages: [5]
"#;
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("config.yml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
