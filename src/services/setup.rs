use crate::core::catalog::{self, CITIES, LANGUAGES, ROLES, VISUAL_STYLES};
use crate::core::config::{Config, StoryConfig};
use anyhow::{bail, Result};
use inquire::{Confirm, Password, PasswordDisplayMode, Select, Text};
use log::info;

/// Fills every unset story option with the first catalog entry. Returns true
/// if anything changed.
pub fn apply_defaults(story: &mut StoryConfig) -> bool {
    let mut changed = false;
    if story.style.is_none() {
        story.style = Some(VISUAL_STYLES[0].to_string());
        changed = true;
    }
    if story.city.is_none() {
        story.city = Some(CITIES[0].to_string());
        changed = true;
    }
    if story.role.is_none() {
        story.role = Some(ROLES[0].id.to_string());
        changed = true;
    }
    if story.language.is_none() {
        story.language = Some(LANGUAGES[0].code.to_string());
        changed = true;
    }
    if story.rich_mode.is_none() {
        story.rich_mode = Some(true);
        changed = true;
    }
    changed
}

/// Asks for whatever the story section of config.yml leaves open and saves
/// the answers.
pub fn run_setup(config: &mut Config) -> Result<()> {
    let mut needs_save = false;

    if config.unattended {
        needs_save = apply_defaults(&mut config.story);
    } else {
        let story = &mut config.story;

        if story.style.is_none() {
            let style = Select::new("Select visual style:", VISUAL_STYLES.to_vec()).prompt()?;
            story.style = Some(style.to_string());
            needs_save = true;
        }
        if story.city.is_none() {
            let city = Select::new("Select city:", CITIES.to_vec()).prompt()?;
            story.city = Some(city.to_string());
            needs_save = true;
        }
        if story.role.is_none() {
            let options: Vec<String> = ROLES
                .iter()
                .map(|r| format!("{} - {}", r.name, r.power))
                .collect();
            let selection = Select::new("Select your role:", options).raw_prompt()?;
            story.role = Some(ROLES[selection.index].id.to_string());
            needs_save = true;
        }
        if story.language.is_none() {
            let options: Vec<String> = LANGUAGES
                .iter()
                .map(|l| format!("{} ({})", l.name, l.code))
                .collect();
            let selection = Select::new("Select story language:", options).raw_prompt()?;
            story.language = Some(LANGUAGES[selection.index].code.to_string());
            needs_save = true;
        }
        if story.rich_mode.is_none() {
            let rich = Confirm::new("Enable rich mode (longer captions, more dialogue)?")
                .with_default(true)
                .prompt()?;
            story.rich_mode = Some(rich);
            needs_save = true;
        }
        if story.hero_image.is_none() {
            let path = Text::new("Path to your hero portrait:").prompt()?;
            story.hero_image = Some(path.trim().to_string()).filter(|p| !p.is_empty());
            needs_save = true;
        }
        if story.mentor_image.is_none() {
            let path = Text::new("Path to a mentor portrait (leave empty to skip):").prompt()?;
            story.mentor_image = Some(path.trim().to_string()).filter(|p| !p.is_empty());
            needs_save = needs_save || story.mentor_image.is_some();
        }
    }

    if needs_save {
        config.save()?;
        println!("Configuration saved.");
    }

    let story = &config.story;
    info!(
        "Story: {} in {} as {} ({})",
        story.style.as_deref().unwrap_or(VISUAL_STYLES[0]),
        story.city.as_deref().unwrap_or(CITIES[0]),
        catalog::find_role(story.role.as_deref().unwrap_or_default()).name,
        catalog::language_name(story.language.as_deref().unwrap_or_default())
    );
    Ok(())
}

/// Prompts for a Gemini API key. Unattended runs cannot ask, so they fail.
pub fn prompt_api_key(config: &Config, reason: &str) -> Result<String> {
    if config.unattended {
        bail!("{}; set GEMINI_API_KEY or llm.gemini.api_key in config.yml", reason);
    }
    println!("{}", reason);
    let key = Password::new("Gemini API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    let key = key.trim().to_string();
    if key.is_empty() {
        bail!("No API key entered");
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_defaults_fills_only_missing_options() {
        let mut story = StoryConfig {
            city: Some("Bristol".to_string()),
            rich_mode: Some(false),
            ..Default::default()
        };
        assert!(apply_defaults(&mut story));
        assert_eq!(story.style.as_deref(), Some("Afrofuturist Cyberpunk"));
        assert_eq!(story.city.as_deref(), Some("Bristol"));
        assert_eq!(story.role.as_deref(), Some("fluxion"));
        assert_eq!(story.language.as_deref(), Some("en-US"));
        assert_eq!(story.rich_mode, Some(false));
        assert!(story.hero_image.is_none());

        assert!(!apply_defaults(&mut story));
    }

    #[test]
    fn test_unattended_key_prompt_fails_fast() {
        let config: Config =
            serde_yaml_ng::from_str("unattended: true\nllm:\n  provider: gemini\n").unwrap();
        let err = prompt_api_key(&config, "API key rejected").unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
