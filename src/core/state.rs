use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Cover,
    Story,
    BackCover,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Queued,
    GeneratingNarrative,
    GeneratingImage,
    Ready,
    Failed,
}

impl PageStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, PageStatus::Ready | PageStatus::Failed)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FocusChar {
    #[default]
    Hero,
    #[serde(alias = "friend")]
    Mentor,
    Other,
}

impl FocusChar {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hero" => Some(FocusChar::Hero),
            "mentor" | "friend" => Some(FocusChar::Mentor),
            "other" => Some(FocusChar::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FocusChar::Hero => "hero",
            FocusChar::Mentor => "mentor",
            FocusChar::Other => "other",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Beat {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub dialogue: Option<String>,
    pub scene: String,
    #[serde(default)]
    pub focus_char: FocusChar,
    #[serde(default)]
    pub choices: Vec<String>,
}

impl Beat {
    /// Stand-in used whenever the narrative call produced nothing usable.
    pub fn fallback() -> Self {
        Self {
            caption: Some("System Error...".to_string()),
            dialogue: None,
            scene: "Static and glitch artifacts.".to_string(),
            focus_char: FocusChar::Other,
            choices: Vec::new(),
        }
    }

    pub fn back_cover() -> Self {
        Self {
            scene: "Teaser".to_string(),
            focus_char: FocusChar::Other,
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64, no data-URI prefix.
    pub data: String,
}

impl ImagePayload {
    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| anyhow!("Invalid base64 image payload: {}", e))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersonaRole {
    Hero,
    Mentor,
}

impl PersonaRole {
    pub fn label(self) -> &'static str {
        match self {
            PersonaRole::Hero => "Main Agent",
            PersonaRole::Mentor => "Cipher (Mentor)",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Persona {
    pub base64: String,
    pub mime_type: String,
    pub desc: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Personas {
    pub hero: Option<Persona>,
    pub mentor: Option<Persona>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub kind: PageKind,
    pub page_index: u32,
    pub status: PageStatus,
    pub narrative: Option<Beat>,
    pub image: Option<ImagePayload>,
    pub is_decision_page: bool,
    pub choices: Vec<String>,
    pub resolved_choice: Option<String>,
}

impl Page {
    pub fn placeholder(page_index: u32, back_cover_index: u32, is_decision_page: bool) -> Self {
        let (id, kind) = if page_index == 0 {
            ("cover".to_string(), PageKind::Cover)
        } else if page_index == back_cover_index {
            (format!("page-{}", page_index), PageKind::BackCover)
        } else {
            (format!("page-{}", page_index), PageKind::Story)
        };
        Self {
            id,
            kind,
            page_index,
            status: PageStatus::Queued,
            narrative: None,
            image: None,
            is_decision_page: is_decision_page && kind == PageKind::Story,
            choices: Vec::new(),
            resolved_choice: None,
        }
    }

    /// Narrative-only copy for prompt history.
    pub fn without_image(&self) -> Page {
        Page {
            image: None,
            ..self.clone()
        }
    }

    /// Ready with an image: safe to display and to export.
    pub fn is_displayable(&self) -> bool {
        self.status == PageStatus::Ready && self.image.is_some()
    }

    pub fn awaits_choice(&self) -> bool {
        self.is_decision_page
            && self.status.is_settled()
            && self.choices.len() == 2
            && self.resolved_choice.is_none()
    }
}

/// Read-only copy handed to presentation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub pages: Vec<Page>,
    pub cursor: u32,
    pub personas: Personas,
    pub credentials_required: bool,
}

impl SessionSnapshot {
    pub fn page(&self, page_index: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_index == page_index)
    }

    pub fn pending_decision(&self) -> Option<&Page> {
        self.pages.iter().find(|p| p.awaits_choice())
    }

    pub fn settled_count(&self) -> usize {
        self.pages.iter().filter(|p| p.status.is_settled()).count()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pages: BTreeMap<u32, Page>,
    in_flight: BTreeSet<u32>,
    cursor: u32,
    personas: Personas,
    epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.pages.clear();
        self.in_flight.clear();
        self.cursor = 0;
        self.personas = Personas::default();
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn personas(&self) -> &Personas {
        &self.personas
    }

    pub fn set_personas(&mut self, personas: Personas) {
        self.personas = personas;
    }

    pub fn page(&self, page_index: u32) -> Option<&Page> {
        self.pages.get(&page_index)
    }

    pub fn page_mut(&mut self, page_index: u32) -> Option<&mut Page> {
        self.pages.get_mut(&page_index)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Claims every index that is neither mid-generation nor already on the
    /// book, inserting a queued placeholder for each in the same step.
    pub fn reserve(
        &mut self,
        candidates: impl IntoIterator<Item = u32>,
        back_cover_index: u32,
        is_decision_page: impl Fn(u32) -> bool,
    ) -> Vec<u32> {
        let mut claimed = Vec::new();
        for page_index in candidates {
            if page_index > back_cover_index
                || self.in_flight.contains(&page_index)
                || self.pages.contains_key(&page_index)
            {
                continue;
            }
            self.in_flight.insert(page_index);
            self.pages.insert(
                page_index,
                Page::placeholder(page_index, back_cover_index, is_decision_page(page_index)),
            );
            claimed.push(page_index);
        }
        claimed
    }

    /// Drops the reservation and forces a terminal status if generation
    /// stopped before the page settled.
    pub fn settle(&mut self, page_index: u32) {
        self.in_flight.remove(&page_index);
        if let Some(page) = self.pages.get_mut(&page_index) {
            if !page.status.is_settled() {
                page.status = PageStatus::Failed;
            }
        }
    }

    /// Drops failed pages that carry no reader choice so a later batch can
    /// claim them again. Returns the freed indices in ascending order.
    pub fn requeue_failed(&mut self) -> Vec<u32> {
        let freed: Vec<u32> = self
            .pages
            .values()
            .filter(|p| {
                p.status == PageStatus::Failed
                    && p.resolved_choice.is_none()
                    && !self.in_flight.contains(&p.page_index)
            })
            .map(|p| p.page_index)
            .collect();
        for page_index in &freed {
            self.pages.remove(page_index);
        }
        freed
    }

    pub fn max_page_index(&self) -> u32 {
        self.pages.keys().next_back().copied().unwrap_or(0)
    }

    /// Story pages strictly before `page_index` that already carry a narrative.
    pub fn history_before(&self, page_index: u32) -> Vec<Page> {
        self.pages
            .range(..page_index)
            .map(|(_, p)| p)
            .filter(|p| p.kind == PageKind::Story && p.narrative.is_some())
            .map(Page::without_image)
            .collect()
    }

    pub fn first_story_image(&self) -> Option<ImagePayload> {
        self.page(1)
            .filter(|p| p.kind == PageKind::Story && p.is_displayable())
            .and_then(|p| p.image.clone())
    }

    /// Returns `Ok(false)` when the page already carries a choice; the stored
    /// value is never replaced.
    pub fn resolve_choice(&mut self, page_index: u32, choice: &str) -> Result<bool> {
        let page = self
            .pages
            .get_mut(&page_index)
            .ok_or_else(|| anyhow!("Page {} does not exist", page_index))?;
        if page.resolved_choice.is_some() {
            return Ok(false);
        }
        if !page.is_decision_page {
            bail!("Page {} is not a decision page", page_index);
        }
        if !page.choices.iter().any(|c| c == choice) {
            bail!("'{}' is not one of the choices on page {}", choice, page_index);
        }
        page.resolved_choice = Some(choice.to_string());
        Ok(true)
    }

    /// Moves the reading cursor forward once the page under it has settled.
    pub fn advance_cursor(&mut self) -> bool {
        let settled = self
            .page(self.cursor)
            .map_or(false, |p| p.status.is_settled());
        let has_next = self.page(self.cursor + 1).is_some();
        if settled && has_next {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self, credentials_required: bool) -> SessionSnapshot {
        SessionSnapshot {
            pages: self.pages.values().cloned().collect(),
            cursor: self.cursor,
            personas: self.personas.clone(),
            credentials_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(indices: &[u32]) -> Session {
        let mut session = Session::new();
        session.reserve(indices.iter().copied(), 11, |i| i == 3);
        session
    }

    #[test]
    fn test_reserve_skips_in_flight_and_existing_pages() {
        let mut session = session_with(&[1, 2]);
        let claimed = session.reserve(1..=4, 11, |i| i == 3);
        assert_eq!(claimed, vec![3, 4]);

        session.settle(1);
        // Settled-but-present pages are not scheduled again either.
        let claimed = session.reserve(1..=4, 11, |i| i == 3);
        assert!(claimed.is_empty());
    }

    #[test]
    fn test_settle_forces_terminal_status() {
        let mut session = session_with(&[1, 2]);
        session.page_mut(2).unwrap().status = PageStatus::Ready;

        session.settle(1);
        session.settle(2);
        assert_eq!(session.page(1).unwrap().status, PageStatus::Failed);
        assert_eq!(session.page(2).unwrap().status, PageStatus::Ready);
        assert_eq!(session.in_flight_count(), 0);
    }

    #[test]
    fn test_requeue_failed_keeps_chosen_and_in_flight_pages() {
        let mut session = session_with(&[1, 2, 3, 4]);
        for idx in [1, 2, 3] {
            session.settle(idx);
        }
        let decision = session.page_mut(3).unwrap();
        decision.choices = vec!["a".to_string(), "b".to_string()];
        decision.resolved_choice = Some("a".to_string());

        assert_eq!(session.requeue_failed(), vec![1, 2]);
        assert!(session.page(1).is_none());
        assert!(session.page(3).is_some());
        assert_eq!(session.page(4).unwrap().status, PageStatus::Queued);
        assert_eq!(session.reserve(1..=4, 11, |i| i == 3), vec![1, 2]);
    }

    #[test]
    fn test_reserve_never_passes_back_cover() {
        let mut session = Session::new();
        let claimed = session.reserve(9..=14, 11, |_| false);
        assert_eq!(claimed, vec![9, 10, 11]);
        assert_eq!(session.page(11).unwrap().kind, PageKind::BackCover);
        assert_eq!(session.page(10).unwrap().kind, PageKind::Story);
    }

    #[test]
    fn test_placeholder_marks_decision_pages() {
        let session = session_with(&[2, 3]);
        assert!(!session.page(2).unwrap().is_decision_page);
        assert!(session.page(3).unwrap().is_decision_page);
        assert_eq!(session.page(3).unwrap().id, "page-3");
        assert_eq!(session.page(3).unwrap().status, PageStatus::Queued);
    }

    #[test]
    fn test_resolved_choice_is_immutable() -> Result<()> {
        let mut session = session_with(&[3]);
        session.page_mut(3).unwrap().choices =
            vec!["Fight for History".to_string(), "Fight for Future".to_string()];

        assert!(session.resolve_choice(3, "Fight for History")?);
        assert!(!session.resolve_choice(3, "Fight for Future")?);
        assert_eq!(
            session.page(3).unwrap().resolved_choice.as_deref(),
            Some("Fight for History")
        );
        Ok(())
    }

    #[test]
    fn test_resolve_choice_rejects_unknown_option_and_plain_pages() {
        let mut session = session_with(&[2, 3]);
        session.page_mut(3).unwrap().choices = vec!["A".to_string(), "B".to_string()];
        assert!(session.resolve_choice(3, "C").is_err());
        assert!(session.resolve_choice(2, "A").is_err());
        assert!(session.resolve_choice(7, "A").is_err());
    }

    #[test]
    fn test_history_before_is_ordered_story_only() {
        let mut session = session_with(&[0, 1, 2, 3, 4]);
        for i in [3, 1, 2] {
            session.page_mut(i).unwrap().narrative = Some(Beat {
                scene: format!("scene {}", i),
                ..Default::default()
            });
        }
        let history: Vec<u32> = session.history_before(4).iter().map(|p| p.page_index).collect();
        assert_eq!(history, vec![1, 2, 3]);
        let history: Vec<u32> = session.history_before(2).iter().map(|p| p.page_index).collect();
        assert_eq!(history, vec![1]);
    }

    #[test]
    fn test_cursor_only_advances_past_settled_pages() {
        let mut session = session_with(&[0, 1]);
        assert!(!session.advance_cursor());
        session.page_mut(0).unwrap().status = PageStatus::Failed;
        assert!(session.advance_cursor());
        assert!(!session.advance_cursor());
        assert_eq!(session.snapshot(false).cursor, 1);
    }

    #[test]
    fn test_reset_twice_matches_reset_once() {
        let mut once = session_with(&[0, 1, 2]);
        once.reset();
        let mut twice = session_with(&[0, 1, 2]);
        twice.reset();
        twice.reset();
        assert_eq!(once.snapshot(false), twice.snapshot(false));
        assert_eq!(twice.snapshot(false), SessionSnapshot::default());
        assert_eq!(twice.in_flight_count(), 0);
    }

    #[test]
    fn test_focus_char_accepts_friend_alias() {
        let beat: Beat =
            serde_json::from_str(r#"{"scene": "x", "focus_char": "friend"}"#).unwrap();
        assert_eq!(beat.focus_char, FocusChar::Mentor);
        assert_eq!(FocusChar::parse("HERO"), Some(FocusChar::Hero));
        assert_eq!(FocusChar::parse("villain"), None);
    }
}
