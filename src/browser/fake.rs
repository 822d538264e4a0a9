// src/browser/fake.rs
//! Scripted in-memory page for tests. Elements appear and vanish on the
//! tokio clock (use paused time) or in reaction to clicks.

use super::{BrowserError, BrowserSession, ElementRef, Locator};
use crate::core::Document;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Fill { target: String, value: String },
    Click(String),
    Select { target: String, label: String },
    Upload { target: String, file_name: String },
    Close,
}

#[derive(Debug, Clone)]
pub enum Effect {
    Show(Locator),
    Hide(Locator),
    Redirect(String),
    Fail(String),
    Panic(String),
}

#[derive(Debug, Clone)]
struct FakeElement {
    id: String,
    locator: Locator,
    parent: Option<String>,
    appears_at: Instant,
    removed_at: Option<Instant>,
    displayed: bool,
    text: String,
    attributes: HashMap<String, String>,
}

impl FakeElement {
    fn present(&self, now: Instant) -> bool {
        self.appears_at <= now && self.removed_at.map_or(true, |r| now < r)
    }
}

#[derive(Default)]
struct State {
    elements: Vec<FakeElement>,
    urls: Vec<(Instant, String)>,
    goto_failures: Vec<(String, String)>,
    click_effects: HashMap<Locator, Vec<Effect>>,
    page_source: String,
    actions: Vec<Action>,
}

pub struct FakeBrowser {
    state: Mutex<State>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                page_source: "<html><body></body></html>".into(),
                ..State::default()
            }),
        }
    }

    fn insert(&self, locator: Locator, parent: Option<String>, appears_at: Instant, removed_at: Option<Instant>, displayed: bool) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("el-{}", state.elements.len());
        state.elements.push(FakeElement {
            id: id.clone(),
            locator,
            parent,
            appears_at,
            removed_at,
            displayed,
            text: String::new(),
            attributes: HashMap::new(),
        });
        id
    }

    pub fn show(&self, locator: Locator) -> String {
        self.insert(locator, None, Instant::now(), None, true)
    }

    pub fn show_after(&self, locator: Locator, delay: Duration) -> String {
        self.insert(locator, None, Instant::now() + delay, None, true)
    }

    pub fn show_between(&self, locator: Locator, from: Duration, to: Duration) -> String {
        let now = Instant::now();
        self.insert(locator, None, now + from, Some(now + to), true)
    }

    pub fn attach_hidden(&self, locator: Locator) -> String {
        self.insert(locator, None, Instant::now(), None, false)
    }

    /// A displayed child found through `find_within(parent, locator)`.
    pub fn child(&self, parent: &str, locator: Locator, text: &str) -> String {
        let id = self.insert(locator, Some(parent.to_string()), Instant::now(), None, true);
        self.set_text(&id, text);
        id
    }

    pub fn set_text(&self, id: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(el) = state.elements.iter_mut().find(|e| e.id == id) {
            el.text = text.to_string();
        }
    }

    pub fn set_attribute(&self, id: &str, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(el) = state.elements.iter_mut().find(|e| e.id == id) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn on_click(&self, locator: Locator, effect: Effect) {
        let mut state = self.state.lock().unwrap();
        state.click_effects.entry(locator).or_default().push(effect);
    }

    pub fn fail_goto(&self, url_fragment: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .goto_failures
            .push((url_fragment.to_string(), message.to_string()));
    }

    pub fn redirect_after(&self, url: &str, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.urls.push((Instant::now() + delay, url.to_string()));
    }

    pub fn set_page_source(&self, html: &str) {
        self.state.lock().unwrap().page_source = html.to_string();
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn visited(&self, fragment: &str) -> bool {
        self.actions()
            .iter()
            .any(|a| matches!(a, Action::Goto(url) if url.contains(fragment)))
    }

    pub fn clicked(&self, locator: &Locator) -> bool {
        let target = locator.to_string();
        self.actions()
            .iter()
            .any(|a| matches!(a, Action::Click(t) if *t == target))
    }

    fn record(&self, action: Action) {
        self.state.lock().unwrap().actions.push(action);
    }

    fn element(&self, element: &ElementRef) -> Result<FakeElement, BrowserError> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .iter()
            .find(|e| e.id == element.0 && e.present(Instant::now()))
            .cloned()
            .ok_or_else(|| BrowserError::WebDriver {
                error: "stale element reference".into(),
                message: element.0.clone(),
            })
    }

    fn apply(&self, effect: Effect) -> Result<(), BrowserError> {
        if let Effect::Panic(message) = &effect {
            panic!("{message}");
        }
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        match effect {
            Effect::Show(locator) => {
                let mut found = false;
                for el in state.elements.iter_mut().filter(|e| e.locator == locator) {
                    el.appears_at = now;
                    el.removed_at = None;
                    found = true;
                }
                if !found {
                    let id = format!("el-{}", state.elements.len());
                    state.elements.push(FakeElement {
                        id,
                        locator,
                        parent: None,
                        appears_at: now,
                        removed_at: None,
                        displayed: true,
                        text: String::new(),
                        attributes: HashMap::new(),
                    });
                }
            }
            Effect::Hide(locator) => {
                for el in state.elements.iter_mut().filter(|e| e.locator == locator) {
                    el.removed_at = Some(now);
                }
            }
            Effect::Redirect(url) => state.urls.push((now, url)),
            Effect::Fail(message) => {
                return Err(BrowserError::WebDriver {
                    error: "element click intercepted".into(),
                    message,
                })
            }
            Effect::Panic(_) => {}
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.record(Action::Goto(url.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some((_, message)) = state.goto_failures.iter().find(|(f, _)| url.contains(f.as_str())) {
            return Err(BrowserError::WebDriver {
                error: "unknown error".into(),
                message: message.clone(),
            });
        }
        state.urls.push((Instant::now(), url.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let now = Instant::now();
        let state = self.state.lock().unwrap();
        Ok(state
            .urls
            .iter()
            .filter(|(at, _)| *at <= now)
            .max_by_key(|(at, _)| *at)
            .map(|(_, url)| url.clone())
            .unwrap_or_else(|| "about:blank".into()))
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().unwrap().page_source.clone())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
        let now = Instant::now();
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .filter(|e| e.parent.is_none() && e.locator == *locator && e.present(now))
            .map(|e| ElementRef(e.id.clone()))
            .collect())
    }

    async fn find_within(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let now = Instant::now();
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .filter(|e| e.parent.as_deref() == Some(parent.0.as_str()) && e.locator == *locator && e.present(now))
            .map(|e| ElementRef(e.id.clone()))
            .collect())
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        Ok(self.element(element)?.displayed)
    }

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        Ok(self.element(element)?.text)
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<(), BrowserError> {
        let el = self.element(element)?;
        self.set_attribute(&el.id, "value", value);
        self.record(Action::Fill {
            target: el.locator.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let el = self.element(element)?;
        self.record(Action::Click(el.locator.to_string()));
        let effects = self
            .state
            .lock()
            .unwrap()
            .click_effects
            .get(&el.locator)
            .cloned()
            .unwrap_or_default();
        for effect in effects {
            self.apply(effect)?;
        }
        Ok(())
    }

    async fn select_option(&self, element: &ElementRef, label: &str) -> Result<(), BrowserError> {
        let el = self.element(element)?;
        let known = {
            let state = self.state.lock().unwrap();
            state
                .elements
                .iter()
                .any(|o| o.parent.as_deref() == Some(el.id.as_str()) && o.text == label)
        };
        if !known {
            return Err(BrowserError::OptionNotFound(label.to_string()));
        }
        self.record(Action::Select {
            target: el.locator.to_string(),
            label: label.to_string(),
        });
        Ok(())
    }

    async fn set_input_file(&self, element: &ElementRef, document: &Document) -> Result<(), BrowserError> {
        let el = self.element(element)?;
        self.record(Action::Upload {
            target: el.locator.to_string(),
            file_name: document.file_name.clone(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.record(Action::Close);
        Ok(())
    }
}
