// src/browser/mod.rs
//! The live page the automation drives. Stages only ever talk to a
//! [`BrowserSession`]; the production implementation speaks WebDriver.

pub mod wait;
pub mod webdriver;

use crate::core::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use wait::{wait_gone, wait_present, wait_url, wait_visible, wait_visible_any, wait_visible_first};
pub use webdriver::{WebDriverFactory, WebDriverSession};

/// How to find an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(v) => write!(f, "css={v}"),
            Locator::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

/// Opaque handle to an element of the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("Browser transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),

    #[error("Option '{0}' not found")]
    OptionNotFound(String),
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn page_source(&self) -> Result<String, BrowserError>;

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError>;
    async fn find_within(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError>;

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, BrowserError>;
    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError>;
    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError>;

    /// Clear the field, then type `value`.
    async fn fill(&self, element: &ElementRef, value: &str) -> Result<(), BrowserError>;
    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError>;
    /// Choose the option of a `<select>` whose visible label is `label`.
    async fn select_option(&self, element: &ElementRef, label: &str) -> Result<(), BrowserError>;
    /// Inject an in-memory file into an `<input type=file>`.
    async fn set_input_file(&self, element: &ElementRef, document: &Document) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Opens one fresh session per run; the run owns it exclusively.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn BrowserSession>, BrowserError>;
}

#[cfg(test)]
pub mod fake;
