// src/browser/wait.rs
//! Bounded polling waits. A wait that runs out of time is an answer
//! ("absent"), never an error.

use super::{BrowserSession, ElementRef, Locator};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::trace;

pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

async fn first_visible(session: &dyn BrowserSession, locator: &Locator) -> Option<ElementRef> {
    // Lookup errors while a page is still settling count as "not yet".
    let elements = session.find_all(locator).await.ok()?;
    for element in elements {
        if session.is_displayed(&element).await.unwrap_or(false) {
            return Some(element);
        }
    }
    None
}

/// First displayed element matching `locator`, or `None` once `limit` passes.
pub async fn wait_visible(
    session: &dyn BrowserSession,
    locator: &Locator,
    limit: Duration,
) -> Option<ElementRef> {
    let polled = timeout(limit, async {
        loop {
            if let Some(element) = first_visible(session, locator).await {
                return element;
            }
            sleep(POLL_INTERVAL).await;
        }
    })
    .await;

    if polled.is_err() {
        trace!("No visible element for {} within {:?}", locator, limit);
    }
    polled.ok()
}

/// First visible element across several locators, tried in order on each
/// poll, with the index of the locator that matched.
pub async fn wait_visible_first(
    session: &dyn BrowserSession,
    locators: &[Locator],
    limit: Duration,
) -> Option<(usize, ElementRef)> {
    timeout(limit, async {
        loop {
            for (index, locator) in locators.iter().enumerate() {
                if let Some(element) = first_visible(session, locator).await {
                    return (index, element);
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .ok()
}

pub async fn wait_visible_any(
    session: &dyn BrowserSession,
    locators: &[Locator],
    limit: Duration,
) -> Option<ElementRef> {
    wait_visible_first(session, locators, limit)
        .await
        .map(|(_, element)| element)
}

/// Attached to the page, displayed or not. Used for file inputs, which are
/// usually hidden behind a styled button.
pub async fn wait_present(
    session: &dyn BrowserSession,
    locator: &Locator,
    limit: Duration,
) -> Option<ElementRef> {
    timeout(limit, async {
        loop {
            if let Ok(elements) = session.find_all(locator).await {
                if let Some(element) = elements.into_iter().next() {
                    return element;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .ok()
}

/// `true` once nothing matching `locator` is displayed.
pub async fn wait_gone(session: &dyn BrowserSession, locator: &Locator, limit: Duration) -> bool {
    timeout(limit, async {
        loop {
            if first_visible(session, locator).await.is_none() {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// `true` once the current URL contains any of `fragments`.
pub async fn wait_url(session: &dyn BrowserSession, fragments: &[String], limit: Duration) -> bool {
    timeout(limit, async {
        loop {
            if let Ok(url) = session.current_url().await {
                if fragments.iter().any(|f| url.contains(f.as_str())) {
                    return;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeBrowser;

    #[tokio::test(start_paused = true)]
    async fn element_appearing_late_is_found() {
        let browser = FakeBrowser::new();
        browser.show_after(Locator::css("#late"), Duration::from_secs(2));

        let found = wait_visible(&browser, &Locator::css("#late"), Duration::from_secs(5)).await;
        assert!(found.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_means_absent() {
        let browser = FakeBrowser::new();
        browser.show_after(Locator::css("#late"), Duration::from_secs(10));

        let found = wait_visible(&browser, &Locator::css("#late"), Duration::from_secs(3)).await;
        assert!(found.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_elements_are_present_but_not_visible() {
        let browser = FakeBrowser::new();
        browser.attach_hidden(Locator::css("input[type=file]"));

        let locator = Locator::css("input[type=file]");
        assert!(wait_visible(&browser, &locator, Duration::from_secs(1)).await.is_none());
        assert!(wait_present(&browser, &locator, Duration::from_secs(1)).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn gone_and_url_waits() {
        let browser = FakeBrowser::new();
        browser.show_between(Locator::css(".modal"), Duration::ZERO, Duration::from_secs(2));
        assert!(wait_gone(&browser, &Locator::css(".modal"), Duration::from_secs(5)).await);

        browser.redirect_after("https://www.linkedin.com/feed/", Duration::from_secs(1));
        assert!(wait_url(&browser, &["/feed".to_string()], Duration::from_secs(3)).await);
        assert!(!wait_url(&browser, &["/never".to_string()], Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn first_match_reports_which_locator_hit() {
        let browser = FakeBrowser::new();
        browser.show_after(Locator::css(".next"), Duration::from_secs(1));
        browser.show_after(Locator::css(".submit"), Duration::from_secs(3));

        let locators = [Locator::css(".submit"), Locator::css(".next")];
        let (index, _) = wait_visible_first(&browser, &locators, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(index, 1);
    }
}
