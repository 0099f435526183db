use crate::core::config::{Config, PipelineConfig};
use crate::core::state::{
    Beat, ImagePayload, Page, PageKind, PageStatus, Personas, Session, SessionSnapshot,
};
use crate::services::auth::CredentialMonitor;
use crate::services::image::ImageGenerator;
use crate::services::llm::{ImageClient, LlmClient};
use crate::services::narrative::NarrativeGenerator;
use crate::services::prompt::StorySettings;
use anyhow::{bail, Result};
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Drives page generation for one reading session.
///
/// All page mutations go through the session lock, which is never held across
/// an await. Work started before a [`Pipeline::reset`] or relaunch keeps
/// running but its results are dropped.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    session: Mutex<Session>,
    config: PipelineConfig,
    narrative: NarrativeGenerator,
    images: ImageGenerator,
    monitor: Arc<CredentialMonitor>,
    retry_count: usize,
    retry_delay: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Indices claimed by one batch. Whatever is still held when this drops
/// (cancellation, panic) is forced into a terminal status.
struct Reservation<'a> {
    inner: &'a Inner,
    epoch: u64,
    pending: Vec<u32>,
}

impl Reservation<'_> {
    fn settle(&mut self, page_index: u32) {
        self.pending.retain(|&i| i != page_index);
        let mut session = self.inner.session();
        if session.epoch() == self.epoch {
            session.settle(page_index);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut session = self.inner.session();
        if session.epoch() != self.epoch {
            return;
        }
        for &page_index in &self.pending {
            session.settle(page_index);
        }
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.session().epoch() == epoch
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Applies `f` to the page if the session has not been reset since
    /// `epoch` and the page still exists.
    fn update_page(&self, epoch: u64, page_index: u32, f: impl FnOnce(&mut Page)) -> bool {
        let mut session = self.session();
        if session.epoch() != epoch {
            debug!("Dropping stale result for page {}", page_index);
            return false;
        }
        match session.page_mut(page_index) {
            Some(page) => {
                f(page);
                true
            }
            None => false,
        }
    }

    fn claim(&self, start: u32, count: u32, epoch: Option<u64>) -> Option<(u64, Vec<u32>)> {
        if self.monitor.is_raised() {
            warn!(
                "Skipping pages {}..{}: waiting for a new API key",
                start,
                start.saturating_add(count)
            );
            return None;
        }
        let mut session = self.session();
        if epoch.is_some_and(|e| e != session.epoch()) {
            return None;
        }
        let claimed = session.reserve(
            start..start.saturating_add(count),
            self.config.back_cover_index(),
            |i| self.config.is_decision_page(i),
        );
        Some((session.epoch(), claimed))
    }

    async fn run_batch(&self, start: u32, count: u32, epoch: Option<u64>) -> Vec<u32> {
        let Some((epoch, claimed)) = self.claim(start, count, epoch) else {
            return Vec::new();
        };
        if claimed.is_empty() {
            debug!("Nothing to claim in {}..{}", start, start.saturating_add(count));
            return claimed;
        }
        self.process(epoch, claimed.clone()).await;
        claimed
    }

    /// Pages are generated one after another so each beat sees the ones
    /// before it.
    async fn process(&self, epoch: u64, claimed: Vec<u32>) {
        info!("Generating pages {:?}", claimed);
        let mut reservation = Reservation {
            inner: self,
            epoch,
            pending: claimed.clone(),
        };
        for page_index in claimed {
            if !self.is_current(epoch) {
                debug!("Session reset, abandoning batch at page {}", page_index);
                break;
            }
            self.generate_single_page(page_index, epoch).await;
            reservation.settle(page_index);
        }
    }

    async fn generate_single_page(&self, page_index: u32, epoch: u64) {
        let (kind, is_decision_page, history, personas) = {
            let mut session = self.session();
            if session.epoch() != epoch {
                return;
            }
            let Some(page) = session.page_mut(page_index) else {
                return;
            };
            let kind = page.kind;
            let is_decision_page = page.is_decision_page;
            page.status = match kind {
                PageKind::Story => PageStatus::GeneratingNarrative,
                _ => PageStatus::GeneratingImage,
            };
            let history = session.history_before(page_index);
            (kind, is_decision_page, history, session.personas().clone())
        };

        let beat = match kind {
            PageKind::Cover => Beat::default(),
            PageKind::BackCover => Beat::back_cover(),
            PageKind::Story => {
                let beat = self
                    .narrative
                    .generate(page_index, &history, is_decision_page)
                    .await;
                let attached = self.update_page(epoch, page_index, |page| {
                    page.narrative = Some(beat.clone());
                    page.choices = beat.choices.clone();
                    page.status = PageStatus::GeneratingImage;
                });
                if !attached {
                    return;
                }
                beat
            }
        };

        let first_panel = match kind {
            PageKind::Story => self.session().first_story_image(),
            _ => None,
        };

        let image = self
            .render(page_index, &beat, kind, &personas, first_panel.as_ref())
            .await;
        let ready = image.is_some();
        let stored = self.update_page(epoch, page_index, |page| match image {
            Some(image) => {
                page.image = Some(image);
                page.status = PageStatus::Ready;
            }
            None => page.status = PageStatus::Failed,
        });
        if stored {
            if ready {
                info!("Page {} ready", page_index);
            } else {
                warn!("Page {} failed to render", page_index);
            }
        }
    }

    async fn render(
        &self,
        page_index: u32,
        beat: &Beat,
        kind: PageKind,
        personas: &Personas,
        first_panel: Option<&ImagePayload>,
    ) -> Option<ImagePayload> {
        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                if self.monitor.is_raised() {
                    break;
                }
                warn!(
                    "Retrying image for page {} ({}/{})",
                    page_index, attempt, self.retry_count
                );
                tokio::time::sleep(self.retry_delay).await;
            }
            if let Some(image) = self.images.generate(beat, kind, personas, first_panel).await {
                return Some(image);
            }
        }
        None
    }
}

impl Pipeline {
    pub fn new(
        config: &Config,
        llm: Arc<dyn LlmClient>,
        image: Arc<dyn ImageClient>,
        monitor: Arc<CredentialMonitor>,
    ) -> Self {
        let settings = StorySettings::from_config(&config.story);
        let timeout = Duration::from_secs(config.llm.request_timeout_seconds);
        let narrative = NarrativeGenerator::new(
            llm,
            monitor.clone(),
            settings.clone(),
            config.pipeline.max_story_pages(),
            timeout,
        );
        let images = ImageGenerator::new(image, monitor.clone(), settings, timeout);
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(Session::new()),
                config: config.pipeline.clone(),
                narrative,
                images,
                monitor,
                retry_count: config.llm.retry_count,
                retry_delay: Duration::from_secs(config.llm.retry_delay_seconds),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.track(tokio::spawn(task));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let raised = self.inner.monitor.is_raised();
        self.inner.session().snapshot(raised)
    }

    pub fn monitor(&self) -> Arc<CredentialMonitor> {
        self.inner.monitor.clone()
    }

    pub fn acknowledge_credentials(&self) {
        info!("API key updated, resuming generation");
        self.inner.monitor.acknowledge();
    }

    /// Starts a fresh book: the cover right away, the opening pages after a
    /// short delay, then the background batch once those are done.
    pub fn launch(&self, personas: Personas) -> Result<()> {
        if personas.hero.is_none() {
            bail!("A hero portrait is required before the story can start");
        }
        if self.inner.monitor.is_raised() {
            bail!("A valid API key is required before the story can start");
        }

        let (epoch, cover) = {
            let mut session = self.inner.session();
            session.reset();
            session.set_personas(personas);
            let epoch = session.epoch();
            let cover = session.reserve(
                [0],
                self.inner.config.back_cover_index(),
                |i| self.inner.config.is_decision_page(i),
            );
            (epoch, cover)
        };
        info!("Launching story (session {})", epoch);

        let inner = self.inner.clone();
        self.spawn(async move { inner.process(epoch, cover).await });

        let pipeline = self.clone();
        let delay = Duration::from_millis(self.inner.config.launch_delay_ms);
        let initial = self.inner.config.initial_pages;
        let background = self.inner.config.background_pages;
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            pipeline.inner.run_batch(1, initial, Some(epoch)).await;
            if !pipeline.inner.is_current(epoch) {
                return;
            }
            let inner = pipeline.inner.clone();
            pipeline.spawn(async move {
                inner.run_batch(1 + initial, background, Some(epoch)).await;
            });
        });
        Ok(())
    }

    /// Claims and generates `start..start + count`. Indices that are already
    /// on the book, in flight elsewhere, or past the back cover are skipped.
    /// Returns the indices this call generated.
    pub async fn generate_batch(&self, start: u32, count: u32) -> Vec<u32> {
        self.inner.run_batch(start, count, None).await
    }

    /// Records the reader's pick and schedules the next batch. Repeat calls
    /// for a page that already has a choice change nothing.
    pub fn resolve_choice(&self, page_index: u32, choice: &str) -> Result<()> {
        let (epoch, next) = {
            let mut session = self.inner.session();
            if !session.resolve_choice(page_index, choice)? {
                debug!("Page {} already resolved", page_index);
                return Ok(());
            }
            (session.epoch(), session.max_page_index() + 1)
        };
        info!("Page {}: reader chose \"{}\"", page_index, choice);

        let inner = self.inner.clone();
        let count = self.inner.config.batch_size;
        self.spawn(async move {
            inner.run_batch(next, count, Some(epoch)).await;
        });
        Ok(())
    }

    /// Schedules the next batch when nothing is running and no decision is
    /// waiting. Returns false when the book is already complete or busy.
    pub fn continue_story(&self) -> Result<bool> {
        if self.inner.monitor.is_raised() {
            bail!("A valid API key is required before the story can continue");
        }
        let (epoch, next) = {
            let session = self.inner.session();
            if session.in_flight_count() > 0 {
                return Ok(false);
            }
            // A decision page whose beat fell back has no choices to offer
            // and does not hold the story up.
            let snapshot = session.snapshot(false);
            if snapshot.pending_decision().is_some() {
                return Ok(false);
            }
            let next = session.max_page_index() + 1;
            if snapshot.pages.is_empty() || next > self.inner.config.back_cover_index() {
                return Ok(false);
            }
            (session.epoch(), next)
        };

        let inner = self.inner.clone();
        let count = self.inner.config.batch_size;
        self.spawn(async move {
            inner.run_batch(next, count, Some(epoch)).await;
        });
        Ok(true)
    }

    /// Frees every failed page without a reader choice and generates them
    /// again in one batch. Returns the freed indices.
    pub fn retry_failed(&self) -> Result<Vec<u32>> {
        if self.inner.monitor.is_raised() {
            bail!("A valid API key is required before failed pages can be retried");
        }
        let (epoch, freed) = {
            let mut session = self.inner.session();
            (session.epoch(), session.requeue_failed())
        };
        let (Some(&first), Some(&last)) = (freed.first(), freed.last()) else {
            return Ok(freed);
        };
        info!("Retrying failed pages {:?}", freed);

        let inner = self.inner.clone();
        self.spawn(async move {
            inner.run_batch(first, last - first + 1, Some(epoch)).await;
        });
        Ok(freed)
    }

    pub fn reset(&self) {
        self.inner.session().reset();
        info!("Session reset");
    }

    pub fn advance_cursor(&self) -> bool {
        self.inner.session().advance_cursor()
    }

    /// True when no page is reserved and no background task is pending.
    pub fn is_idle(&self) -> bool {
        let tasks_done = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(|h| h.is_finished());
        tasks_done && self.inner.session().in_flight_count() == 0
    }

    /// Waits for every spawned task, including ones spawned while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(
                &mut *self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for result in join_all(handles).await {
                if let Err(e) = result {
                    error!("Generation task ended abnormally: {}", e);
                }
            }
        }
    }
}
