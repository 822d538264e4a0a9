// src/automation/workflow.rs
//! Data-driven description of the target site: every selector, probe,
//! answer rule and timeout the run uses. Operators can dump the built-in
//! definition as YAML, edit it and point `automation.workflow_path` at it.

use crate::browser::Locator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub login: LoginSurface,
    pub confirmation: LoginConfirmation,
    pub job_page: JobPageProbes,
    pub form: ApplicationForm,
    pub questions: QuestionCatalog,
    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSurface {
    pub url: String,
    pub username: Vec<Locator>,
    pub password: Vec<Locator>,
    pub submit: Vec<Locator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginConfirmation {
    pub success_urls: Vec<String>,
    pub signed_in: Vec<Locator>,
    pub challenge_urls: Vec<String>,
    pub challenge: Vec<Locator>,
    pub errors: Vec<Locator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPageProbes {
    pub unavailable: Vec<Locator>,
    pub easy_apply: Vec<Locator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Email,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldControl {
    Text,
    Select,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: ProfileField,
    pub control: FieldControl,
    pub locators: Vec<Locator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationForm {
    /// The surface that holds the fast-path form; its disappearance after
    /// submit counts as success.
    pub modal: Locator,
    pub profile_fields: Vec<FieldRule>,
    pub file_input: Locator,
    /// "Next"/"Review" style buttons, tried in order.
    pub advance: Vec<Locator>,
    pub submit: Vec<Locator>,
    pub success: Vec<Locator>,
    pub errors: Vec<Locator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionShape {
    YesNo,
    Numeric,
    Select,
}

/// One recognizable question shape. For `yes_no`, `control` locates the
/// choice to click and may contain an `{answer}` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionProbe {
    pub shape: QuestionShape,
    pub container: Locator,
    pub label: Locator,
    pub control: Locator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRule {
    /// Matched case-insensitively against the question label; any hit applies.
    pub keywords: Vec<String>,
    #[serde(default)]
    pub shape: Option<QuestionShape>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDefaults {
    pub yes_no: String,
    pub numeric: String,
    /// `None` picks the first real option.
    #[serde(default)]
    pub select: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCatalog {
    pub probes: Vec<QuestionProbe>,
    pub answers: Vec<AnswerRule>,
    pub defaults: ShapeDefaults,
    #[serde(default)]
    pub placeholder_options: Vec<String>,
    /// Upper bound on question pages walked before submit.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_max_pages() -> usize {
    5
}

impl QuestionCatalog {
    /// First matching rule wins, then the per-shape default.
    pub fn answer_for(&self, shape: QuestionShape, label: &str) -> Option<String> {
        let label = label.to_lowercase();
        self.answers
            .iter()
            .filter(|rule| rule.shape.map_or(true, |s| s == shape))
            .find(|rule| rule.keywords.iter().any(|k| label.contains(&k.to_lowercase())))
            .map(|rule| rule.answer.clone())
            .or_else(|| match shape {
                QuestionShape::YesNo => Some(self.defaults.yes_no.clone()),
                QuestionShape::Numeric => Some(self.defaults.numeric.clone()),
                QuestionShape::Select => self.defaults.select.clone(),
            })
    }

    pub fn is_placeholder(&self, option: &str) -> bool {
        let option = option.trim();
        option.is_empty()
            || self
                .placeholder_options
                .iter()
                .any(|p| p.eq_ignore_ascii_case(option))
    }
}

/// All waits in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub login_form_ms: u64,
    pub login_url_ms: u64,
    pub signed_in_ms: u64,
    pub challenge_ms: u64,
    pub login_error_ms: u64,
    pub unavailable_ms: u64,
    pub apply_path_ms: u64,
    pub form_open_ms: u64,
    pub field_ms: u64,
    pub file_input_ms: u64,
    pub question_scan_ms: u64,
    pub advance_ms: u64,
    pub submit_ms: u64,
    pub outcome_success_ms: u64,
    pub outcome_closed_ms: u64,
    pub outcome_error_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_form_ms: 10_000,
            login_url_ms: 15_000,
            signed_in_ms: 10_000,
            challenge_ms: 15_000,
            login_error_ms: 1_000,
            unavailable_ms: 2_000,
            apply_path_ms: 5_000,
            form_open_ms: 10_000,
            field_ms: 2_000,
            file_input_ms: 5_000,
            question_scan_ms: 1_000,
            advance_ms: 5_000,
            submit_ms: 10_000,
            outcome_success_ms: 15_000,
            outcome_closed_ms: 15_000,
            outcome_error_ms: 5_000,
        }
    }
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl WorkflowDefinition {
    /// The built-in LinkedIn Easy Apply workflow.
    pub fn linkedin() -> Self {
        let css = Locator::css;
        let xpath = Locator::xpath;

        Self {
            name: "linkedin-easy-apply".into(),
            login: LoginSurface {
                url: "https://www.linkedin.com/login".into(),
                username: vec![
                    css("#username"),
                    xpath("//input[@id=//label[normalize-space(.)='Email or phone number']/@for]"),
                ],
                password: vec![
                    css("#password"),
                    xpath("//input[@id=//label[normalize-space(.)='Password']/@for]"),
                ],
                submit: vec![
                    xpath("//button[normalize-space(.)='Sign in']"),
                    css("button[type='submit']"),
                ],
            },
            confirmation: LoginConfirmation {
                success_urls: vec!["/feed".into()],
                signed_in: vec![
                    css("div[data-test-id='main-feed-activity-list']"),
                    css("#global-nav"),
                ],
                challenge_urls: vec!["/checkpoint/challenge".into()],
                challenge: vec![
                    css("#captcha-internal"),
                    css("input[name='pin']"),
                ],
                errors: vec![css("#error-for-password"), css("#error-for-username")],
            },
            job_page: JobPageProbes {
                unavailable: vec![
                    css(".jobs-details-top-card__apply-error"),
                    xpath("//*[contains(normalize-space(text()), 'No longer accepting applications')]"),
                ],
                easy_apply: vec![
                    css("button.jobs-apply-button[aria-label*='Easy Apply']"),
                    xpath("//button[contains(@class, 'jobs-apply-button')][.//span[normalize-space(.)='Easy Apply']]"),
                ],
            },
            form: ApplicationForm {
                modal: css(".jobs-easy-apply-modal"),
                profile_fields: vec![
                    FieldRule {
                        field: ProfileField::Email,
                        control: FieldControl::Select,
                        locators: vec![css("select[id*='emailAddress']")],
                    },
                    FieldRule {
                        field: ProfileField::Phone,
                        control: FieldControl::Text,
                        locators: vec![
                            css("input[id*='phoneNumber-nationalNumber']"),
                            css("input[name='phoneNumber']"),
                        ],
                    },
                ],
                file_input: css("input[type='file']"),
                advance: vec![
                    css("button[aria-label='Continue to next step']"),
                    css("button[aria-label='Review your application']"),
                ],
                submit: vec![css("button[aria-label='Submit application']")],
                success: vec![
                    xpath("//*[self::h2 or self::h3][contains(normalize-space(.), 'application was sent')]"),
                    css(".artdeco-inline-feedback--success"),
                ],
                errors: vec![
                    css(".artdeco-inline-feedback--error"),
                    css("[data-test-form-element-error-messages]"),
                ],
            },
            questions: QuestionCatalog {
                probes: vec![
                    QuestionProbe {
                        shape: QuestionShape::YesNo,
                        container: css("fieldset[data-test-form-builder-radio-button-form-component='true']"),
                        label: css("legend"),
                        control: xpath(".//label[normalize-space(.)='{answer}']"),
                    },
                    QuestionProbe {
                        shape: QuestionShape::Numeric,
                        container: css("div[data-test-single-line-text-form-component]"),
                        label: css("label"),
                        control: css("input"),
                    },
                    QuestionProbe {
                        shape: QuestionShape::Select,
                        container: css("div[data-test-text-entity-list-form-component]"),
                        label: css("label"),
                        control: css("select"),
                    },
                ],
                answers: vec![
                    AnswerRule {
                        keywords: vec!["sponsorship".into(), "visa".into()],
                        shape: None,
                        answer: "No".into(),
                    },
                    AnswerRule {
                        keywords: vec!["authorized".into(), "authorised".into(), "legally".into()],
                        shape: None,
                        answer: "Yes".into(),
                    },
                    AnswerRule {
                        keywords: vec!["years".into(), "experience".into()],
                        shape: Some(QuestionShape::Numeric),
                        answer: "3".into(),
                    },
                    AnswerRule {
                        keywords: vec!["relocat".into(), "commut".into(), "on-site".into(), "onsite".into()],
                        shape: None,
                        answer: "Yes".into(),
                    },
                ],
                defaults: ShapeDefaults {
                    yes_no: "Yes".into(),
                    numeric: "1".into(),
                    select: None,
                },
                placeholder_options: vec!["Select an option".into()],
                max_pages: default_max_pages(),
            },
            timeouts: Timeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_definition_survives_yaml() {
        let workflow = WorkflowDefinition::linkedin();
        let yaml = serde_yaml::to_string(&workflow).unwrap();
        let parsed: WorkflowDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, workflow);
    }

    #[test]
    fn partial_timeouts_fall_back_to_defaults() {
        let timeouts: Timeouts = serde_yaml::from_str("apply_path_ms: 750\n").unwrap();
        assert_eq!(timeouts.apply_path_ms, 750);
        assert_eq!(timeouts.submit_ms, Timeouts::default().submit_ms);
    }

    #[test]
    fn answers_follow_rules_then_defaults() {
        let catalog = WorkflowDefinition::linkedin().questions;

        assert_eq!(
            catalog.answer_for(QuestionShape::YesNo, "Will you now or in the future require visa sponsorship?").as_deref(),
            Some("No")
        );
        assert_eq!(
            catalog.answer_for(QuestionShape::Numeric, "How many years of experience do you have with Rust?").as_deref(),
            Some("3")
        );
        assert_eq!(
            catalog.answer_for(QuestionShape::YesNo, "Do you enjoy pairing?").as_deref(),
            Some("Yes")
        );
        assert_eq!(catalog.answer_for(QuestionShape::Select, "Pick one"), None);
        assert!(catalog.is_placeholder("  Select an option "));
        assert!(!catalog.is_placeholder("Native"));
    }
}
