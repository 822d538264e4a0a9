// src/core/job_page.rs
//! Extract job title/company/location from a rendered job page so that
//! placeholder job records can be completed.

use crate::core::status::JobDetails;
use scraper::{Html, Selector};
use tracing::{debug, warn};

const LINKEDIN_TITLE: &[&str] = &[
    "h1.top-card-layout__title",
    ".job-details-jobs-unified-top-card__job-title",
    "h1[data-test-id='job-title']",
    ".jobs-unified-top-card__job-title",
];

const LINKEDIN_COMPANY: &[&str] = &[
    ".job-details-jobs-unified-top-card__company-name",
    ".top-card-layout__card .top-card-layout__second-subline",
    "a[data-test-id='job-poster-name']",
    ".jobs-unified-top-card__company-name",
];

const LINKEDIN_LOCATION: &[&str] = &[
    ".job-details-jobs-unified-top-card__bullet",
    ".top-card-layout__card .top-card-layout__first-subline",
    "[data-test-id='job-location']",
    ".jobs-unified-top-card__bullet",
];

const GENERIC_TITLE: &[&str] = &["h1", "[class*='job-title']", "[class*='position']"];
const GENERIC_COMPANY: &[&str] = &["[class*='company']", "[class*='employer']"];

/// Parse a page source. Returns `None` when not even a title can be found.
pub fn extract_job_details(html: &str) -> Option<JobDetails> {
    let document = Html::parse_document(html);

    parse_linkedin(&document).or_else(|| parse_generic(&document))
}

fn parse_linkedin(document: &Html) -> Option<JobDetails> {
    let title = find_text_by_selectors(document, LINKEDIN_TITLE)?;
    let company = find_text_by_selectors(document, LINKEDIN_COMPANY).unwrap_or_default();
    let location = find_text_by_selectors(document, LINKEDIN_LOCATION);

    debug!("Parsed LinkedIn job page: {} at {}", title, company);
    Some(JobDetails {
        title,
        company,
        location,
    })
}

fn parse_generic(document: &Html) -> Option<JobDetails> {
    warn!("Falling back to generic job page parsing");

    let title = find_text_by_selectors(document, GENERIC_TITLE)?;
    let company = find_text_by_selectors(document, GENERIC_COMPANY).unwrap_or_default();

    Some(JobDetails {
        title,
        company,
        location: None,
    })
}

fn find_text_by_selectors(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        let element = document.select(&selector).next()?;
        let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
        (!text.is_empty()).then_some(text)
    })
}

fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linkedin_top_card() {
        let html = r#"
            <html><body>
              <h1 class="top-card-layout__title">  Senior   Rust Engineer </h1>
              <div class="top-card-layout__card">
                <span class="top-card-layout__first-subline">Berlin, Germany</span>
                <span class="top-card-layout__second-subline">Acme Corp</span>
              </div>
            </body></html>"#;

        let details = extract_job_details(html).unwrap();
        assert_eq!(details.title, "Senior Rust Engineer");
        assert_eq!(details.company, "Acme Corp");
        assert_eq!(details.location.as_deref(), Some("Berlin, Germany"));
    }

    #[test]
    fn falls_back_to_generic_markup() {
        let html = r#"<html><body><h1>Backend Developer</h1><div class="company-name">Initech</div></body></html>"#;
        let details = extract_job_details(html).unwrap();
        assert_eq!(details.title, "Backend Developer");
        assert_eq!(details.company, "Initech");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extract_job_details("<html><body><p>Sign in</p></body></html>").is_none());
    }
}
