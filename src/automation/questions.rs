// src/automation/questions.rs
//! Screening questions. Each recognized question is resolved on its own;
//! a failure is a warning and never stops the others.

use super::workflow::{QuestionCatalog, QuestionProbe, QuestionShape};
use crate::browser::{wait_present, BrowserSession, ElementRef, Locator};
use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuestionTally {
    pub seen: usize,
    pub answered: usize,
}

impl QuestionTally {
    pub fn add(&mut self, other: QuestionTally) {
        self.seen += other.seen;
        self.answered += other.answered;
    }
}

enum Resolution {
    Answered(String),
    AlreadyFilled,
}

/// Answer every recognized question currently on the page.
pub async fn answer_visible_questions(
    session: &dyn BrowserSession,
    catalog: &QuestionCatalog,
    scan: Duration,
) -> QuestionTally {
    let mut tally = QuestionTally::default();

    for probe in &catalog.probes {
        if wait_present(session, &probe.container, scan).await.is_none() {
            continue;
        }
        let containers = match session.find_all(&probe.container).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Could not list {:?} questions: {}", probe.shape, e);
                continue;
            }
        };

        for container in containers {
            tally.seen += 1;
            match resolve(session, catalog, probe, &container).await {
                Ok(Resolution::Answered(answer)) => {
                    debug!("Answered {:?} question with '{}'", probe.shape, answer);
                    tally.answered += 1;
                }
                Ok(Resolution::AlreadyFilled) => {
                    debug!("{:?} question already filled", probe.shape);
                    tally.answered += 1;
                }
                Err(e) => warn!("Skipping {:?} question: {:#}", probe.shape, e),
            }
        }
    }

    tally
}

async fn resolve(
    session: &dyn BrowserSession,
    catalog: &QuestionCatalog,
    probe: &QuestionProbe,
    container: &ElementRef,
) -> Result<Resolution> {
    let label = question_label(session, probe, container).await;

    match probe.shape {
        QuestionShape::YesNo => {
            let answer = catalog
                .answer_for(QuestionShape::YesNo, &label)
                .ok_or_else(|| anyhow!("no answer for '{label}'"))?;
            let choice = first_within(session, container, &choice_locator(&probe.control, &answer))
                .await
                .with_context(|| format!("choice '{answer}' for '{label}'"))?;
            session.click(&choice).await?;
            Ok(Resolution::Answered(answer))
        }
        QuestionShape::Numeric => {
            let input = first_within(session, container, &probe.control).await?;
            let current = session.attribute(&input, "value").await?.unwrap_or_default();
            if !current.trim().is_empty() {
                return Ok(Resolution::AlreadyFilled);
            }
            let answer = catalog
                .answer_for(QuestionShape::Numeric, &label)
                .ok_or_else(|| anyhow!("no answer for '{label}'"))?;
            session.fill(&input, &answer).await?;
            Ok(Resolution::Answered(answer))
        }
        QuestionShape::Select => {
            let select = first_within(session, container, &probe.control).await?;
            let answer = match catalog.answer_for(QuestionShape::Select, &label) {
                Some(answer) => answer,
                None => first_real_option(session, catalog, &select)
                    .await?
                    .ok_or_else(|| anyhow!("no selectable option for '{label}'"))?,
            };
            session.select_option(&select, &answer).await?;
            Ok(Resolution::Answered(answer))
        }
    }
}

async fn question_label(session: &dyn BrowserSession, probe: &QuestionProbe, container: &ElementRef) -> String {
    let Ok(found) = session.find_within(container, &probe.label).await else {
        return String::new();
    };
    match found.first() {
        Some(label) => session.text(label).await.unwrap_or_default(),
        None => String::new(),
    }
}

async fn first_within(
    session: &dyn BrowserSession,
    container: &ElementRef,
    locator: &Locator,
) -> Result<ElementRef> {
    session
        .find_within(container, locator)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("nothing matches {locator}"))
}

async fn first_real_option(
    session: &dyn BrowserSession,
    catalog: &QuestionCatalog,
    select: &ElementRef,
) -> Result<Option<String>> {
    for option in session.find_within(select, &Locator::css("option")).await? {
        let text = session.text(&option).await?;
        if !catalog.is_placeholder(&text) {
            return Ok(Some(text.trim().to_string()));
        }
    }
    Ok(None)
}

/// Substitute `{answer}` in a choice template. Quotes are dropped so the
/// answer cannot break out of the selector.
fn choice_locator(template: &Locator, answer: &str) -> Locator {
    let answer: String = answer.chars().filter(|c| *c != '\'' && *c != '"').collect();
    match template {
        Locator::Css(v) => Locator::css(v.replace("{answer}", &answer)),
        Locator::XPath(v) => Locator::xpath(v.replace("{answer}", &answer)),
    }
}
