use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Select;
use oomf_comic::core::config::Config;
use oomf_comic::core::io::NativeStorage;
use oomf_comic::core::lore::STORY_TITLE;
use oomf_comic::core::state::{Page, PageKind, PageStatus};
use oomf_comic::services::auth::CredentialMonitor;
use oomf_comic::services::llm::{create_backend, Backend, GeminiConfig};
use oomf_comic::services::pipeline::Pipeline;
use oomf_comic::services::{export, setup, upload};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn store_api_key(config: &mut Config, backend: &Backend, key: &str) -> Result<()> {
    backend.gemini.update_api_key(key);
    config
        .llm
        .gemini
        .get_or_insert_with(GeminiConfig::default)
        .api_key = key.to_string();
    config.save()
}

fn describe(page: &Page) -> String {
    let label = match page.kind {
        PageKind::Cover => "Cover".to_string(),
        PageKind::BackCover => "Back cover".to_string(),
        PageKind::Story => format!("Page {}", page.page_index),
    };
    if page.status == PageStatus::Failed {
        return format!("{}: [panel failed to render]", label);
    }
    let mut text = label;
    if let Some(beat) = &page.narrative {
        if let Some(caption) = &beat.caption {
            text.push_str(&format!("\n  [{}]", caption));
        }
        if let Some(dialogue) = &beat.dialogue {
            text.push_str(&format!("\n  \"{}\"", dialogue));
        }
    }
    text
}

/// Prints pages in order as they settle, answers decisions, and keeps the
/// story moving until the back cover is done.
async fn read_book(
    pipeline: &Pipeline,
    config: &mut Config,
    backend: &Backend,
) -> Result<()> {
    let total = config.pipeline.back_cover_index() as u64 + 1;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut credentials = pipeline.monitor().subscribe();
    let mut next_to_show = 0u32;
    loop {
        let snap = pipeline.snapshot();
        pb.set_position(snap.settled_count() as u64);

        while let Some(page) = snap.page(next_to_show).filter(|p| p.status.is_settled()) {
            pb.println(describe(page));
            next_to_show += 1;
            pipeline.advance_cursor();
        }

        if snap.credentials_required {
            let key = pb.suspend(|| {
                setup::prompt_api_key(&*config, "The API key was rejected. Please enter a new one.")
            })?;
            store_api_key(config, backend, &key)?;
            pipeline.acknowledge_credentials();
            let retried = pipeline.retry_failed()?;
            // Show regenerated pages again once they settle.
            if let Some(&first) = retried.first() {
                next_to_show = next_to_show.min(first);
            }
            pb.println("Resuming the story with the new key.");
            continue;
        }

        if let Some(decision) = snap
            .pending_decision()
            .filter(|p| p.page_index < next_to_show)
        {
            let choice = if config.unattended {
                decision.choices[0].clone()
            } else {
                pb.suspend(|| Select::new("What do you do?", decision.choices.clone()).prompt())?
            };
            pb.println(format!("You chose: {}", choice));
            pipeline.resolve_choice(decision.page_index, &choice)?;
            continue;
        }

        if pipeline.is_idle() && snap.pending_decision().is_none() {
            if !pipeline.continue_story()? {
                let snap = pipeline.snapshot();
                if snap.page(next_to_show).is_none() {
                    break;
                }
            }
        }

        // Wake early when the backend rejects the key.
        tokio::select! {
            _ = credentials.changed() => {}
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    pb.finish_with_message("Story complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid LLM settings.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    setup::run_setup(&mut config)?;

    let backend = create_backend(&config)?;
    if !backend.gemini.has_api_key() {
        let key = setup::prompt_api_key(&config, "No Gemini API key configured.")?;
        store_api_key(&mut config, &backend, &key)?;
    }

    let storage = NativeStorage::new();
    let personas = match upload::load_personas(&storage, &config.story).await {
        Ok(personas) => personas,
        Err(e) => {
            eprintln!("Could not load the character portraits: {:#}", e);
            return Err(e);
        }
    };

    let monitor = Arc::new(CredentialMonitor::new());
    let pipeline = Pipeline::new(&config, backend.text.clone(), backend.image.clone(), monitor);

    println!("{}", STORY_TITLE);
    pipeline.launch(personas)?;
    read_book(&pipeline, &mut config, &backend).await?;

    let path = export::export_book(&storage, &pipeline.snapshot(), &config.output_folder).await?;
    println!("Comic saved to {}", path);
    Ok(())
}
