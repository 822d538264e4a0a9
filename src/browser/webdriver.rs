// src/browser/webdriver.rs
//! W3C WebDriver client over plain JSON/HTTP. Works against chromedriver,
//! Selenium or a hosted grid; nothing here assumes the browser is local.

use super::{BrowserError, BrowserSession, ElementRef, Locator, SessionFactory};
use crate::core::Document;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const ATTACH_FILE_SCRIPT: &str = r#"
const [input, data, name, type] = arguments;
const bytes = Uint8Array.from(atob(data), c => c.charCodeAt(0));
const transfer = new DataTransfer();
transfer.items.add(new File([bytes], name, { type }));
input.files = transfer.files;
input.dispatchEvent(new Event('input', { bubbles: true }));
input.dispatchEvent(new Event('change', { bubbles: true }));
return input.files.length;
"#;

pub struct WebDriverFactory {
    client: reqwest::Client,
    endpoint: String,
    headless: bool,
}

impl WebDriverFactory {
    pub fn new(endpoint: &str, headless: bool, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage", "--window-size=1280,900"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn open(&self) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        let url = format!("{}/session", self.endpoint);
        let value = send(self.client.post(&url).json(&self.capabilities())).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("new session response without sessionId".into()))?;

        info!("Opened WebDriver session {}", session_id);
        Ok(Arc::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
}

/// Send a command and unwrap the `value` envelope, mapping WebDriver error
/// bodies onto [`BrowserError::WebDriver`].
async fn send(request: reqwest::RequestBuilder) -> Result<Value, BrowserError> {
    let response = request.send().await?;
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(BrowserError::WebDriver { error, message })
}

fn element_json(id: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(ELEMENT_KEY.to_string(), Value::String(id.to_string()));
    Value::Object(map)
}

fn strategy(locator: &Locator) -> Value {
    match locator {
        Locator::Css(selector) => json!({ "using": "css selector", "value": selector }),
        Locator::XPath(expression) => json!({ "using": "xpath", "value": expression }),
    }
}

fn element_refs(value: Value) -> Result<Vec<ElementRef>, BrowserError> {
    let items = value
        .as_array()
        .ok_or_else(|| BrowserError::Protocol("expected an array of elements".into()))?;

    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| BrowserError::Protocol("element without reference".into()))
        })
        .collect()
}

/// Quote a string for use inside an XPath expression.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

impl WebDriverSession {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn element_url(&self, element: &ElementRef, path: &str) -> String {
        format!("{}/element/{}{}", self.base, element.0, path)
    }

    async fn get(&self, url: String) -> Result<Value, BrowserError> {
        send(self.client.get(url)).await
    }

    async fn post(&self, url: String, body: Value) -> Result<Value, BrowserError> {
        send(self.client.post(url).json(&body)).await
    }

    async fn get_string(&self, url: String) -> Result<String, BrowserError> {
        match self.get(url).await? {
            Value::String(s) => Ok(s),
            other => Err(BrowserError::Protocol(format!("expected a string, got {other}"))),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!("WebDriver navigate: {}", url);
        self.post(self.url("/url"), json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.get_string(self.url("/url")).await
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.get_string(self.url("/source")).await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
        element_refs(self.post(self.url("/elements"), strategy(locator)).await?)
    }

    async fn find_within(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        element_refs(
            self.post(self.element_url(parent, "/elements"), strategy(locator))
                .await?,
        )
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        Ok(self
            .get(self.element_url(element, "/displayed"))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        self.get_string(self.element_url(element, "/text")).await
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let value = self
            .get(self.element_url(element, &format!("/attribute/{name}")))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<(), BrowserError> {
        self.post(self.element_url(element, "/clear"), json!({})).await?;
        self.post(self.element_url(element, "/value"), json!({ "text": value }))
            .await?;
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.post(self.element_url(element, "/click"), json!({})).await?;
        Ok(())
    }

    async fn select_option(&self, element: &ElementRef, label: &str) -> Result<(), BrowserError> {
        let option = Locator::xpath(format!(
            ".//option[normalize-space(.)={}]",
            xpath_literal(label.trim())
        ));
        let option = self
            .find_within(element, &option)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::OptionNotFound(label.to_string()))?;
        self.click(&option).await
    }

    async fn set_input_file(&self, element: &ElementRef, document: &Document) -> Result<(), BrowserError> {
        let args = json!([
            element_json(&element.0),
            STANDARD.encode(&document.bytes),
            document.file_name,
            document.mime_type,
        ]);
        let attached = self
            .post(
                self.url("/execute/sync"),
                json!({ "script": ATTACH_FILE_SCRIPT, "args": args }),
            )
            .await?;

        if attached.as_u64() == Some(1) {
            Ok(())
        } else {
            Err(BrowserError::Protocol(format!(
                "file input reported {attached} attached files"
            )))
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        match send(self.client.delete(&self.base)).await {
            Ok(_) => {
                info!("Closed WebDriver session");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to close WebDriver session: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> Arc<dyn BrowserSession> {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s1", "capabilities": {} }
            })))
            .mount(server)
            .await;

        WebDriverFactory::new(&server.uri(), true, Duration::from_secs(5))
            .unwrap()
            .open()
            .await
            .unwrap()
    }

    #[test]
    fn xpath_literals_survive_quotes() {
        assert_eq!(xpath_literal("Yes"), "'Yes'");
        assert_eq!(xpath_literal("I'm"), "\"I'm\"");
        assert_eq!(
            xpath_literal(r#"a'b"c"#),
            r#"concat('a', "'", 'b"c')"#
        );
    }

    #[tokio::test]
    async fn finds_elements_by_css() {
        let server = MockServer::start().await;
        let browser = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .and(body_partial_json(json!({ "using": "css selector", "value": "#username" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [element_json("e-1"), element_json("e-2")]
            })))
            .mount(&server)
            .await;

        let found = browser.find_all(&Locator::css("#username")).await.unwrap();
        assert_eq!(found, vec![ElementRef("e-1".into()), ElementRef("e-2".into())]);
    }

    #[tokio::test]
    async fn navigation_errors_are_typed() {
        let server = MockServer::start().await;
        let browser = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {
                    "error": "unknown error",
                    "message": "net::ERR_NAME_NOT_RESOLVED"
                }
            })))
            .mount(&server)
            .await;

        let err = browser.goto("https://nowhere.invalid/").await.unwrap_err();
        match err {
            BrowserError::WebDriver { error, message } => {
                assert_eq!(error, "unknown error");
                assert!(message.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn file_injection_sends_base64_payload() {
        let server = MockServer::start().await;
        let browser = session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/execute/sync"))
            .and(body_partial_json(json!({
                "args": [element_json("file-1"), "JVBERi0=", "resume_r1.pdf", "application/pdf"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let document = Document {
            bytes: b"%PDF-".to_vec(),
            file_name: "resume_r1.pdf".into(),
            mime_type: "application/pdf".into(),
        };
        browser
            .set_input_file(&ElementRef("file-1".into()), &document)
            .await
            .unwrap();
    }
}
