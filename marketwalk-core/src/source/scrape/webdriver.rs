//! Minimal W3C WebDriver client.
//!
//! Talks to a running driver (chromedriver, geckodriver) over its JSON wire
//! protocol with a blocking `reqwest` client. One [`WebDriverSession`] is one
//! browser; the session is deleted when the value is dropped.

use crate::error::AcquireError;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// What the snapshot adapter needs from a browser.
pub trait BrowserDriver {
    /// Load `url` and wait for the document to finish loading.
    fn navigate(&mut self, url: &str) -> Result<(), AcquireError>;

    /// Run a synchronous script in the page and return its result.
    fn execute_script(&mut self, script: &str) -> Result<Value, AcquireError>;

    /// Markup of the current page as rendered.
    fn page_source(&mut self) -> Result<String, AcquireError>;
}

impl<D: BrowserDriver + ?Sized> BrowserDriver for Box<D> {
    fn navigate(&mut self, url: &str) -> Result<(), AcquireError> {
        (**self).navigate(url)
    }

    fn execute_script(&mut self, script: &str) -> Result<Value, AcquireError> {
        (**self).execute_script(script)
    }

    fn page_source(&mut self) -> Result<String, AcquireError> {
        (**self).page_source()
    }
}

/// Session options sent when the browser is started.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Chrome capabilities for a new session.
fn capabilities(opts: &SessionOptions) -> Value {
    let mut args = vec!["--lang=en-US", "--window-size=1920,1080", "--disable-gpu"];
    if opts.headless {
        args.push("--headless=new");
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args },
                "timeouts": { "pageLoad": opts.page_load_timeout.as_millis() as u64 }
            }
        }
    })
}

/// Pull `value` out of a WebDriver response, turning protocol errors into
/// [`AcquireError::Render`].
fn unwrap_value(body: Value, what: &str) -> Result<Value, AcquireError> {
    let value = body
        .get("value")
        .cloned()
        .ok_or_else(|| AcquireError::Render(format!("{what}: response has no 'value'")))?;
    if let Some(err) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(AcquireError::Render(format!("{what}: {err}: {message}")));
    }
    Ok(value)
}

/// A live browser session.
pub struct WebDriverSession {
    client: reqwest::blocking::Client,
    base: String,
    session_id: String,
}

impl WebDriverSession {
    /// Start a browser through the driver listening at `webdriver_url`.
    pub fn start(webdriver_url: &str, opts: &SessionOptions) -> Result<Self, AcquireError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(opts.request_timeout)
            .build()
            .map_err(|e| AcquireError::Config(format!("failed to build WebDriver client: {e}")))?;
        let base = webdriver_url.trim_end_matches('/').to_string();

        let body = client
            .post(format!("{base}/session"))
            .json(&capabilities(opts))
            .send()
            .and_then(|r| r.json::<Value>())
            .map_err(|e| AcquireError::Render(format!("could not start browser at {base}: {e}")))?;
        let value = unwrap_value(body, "new session")?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AcquireError::Render("new session: no sessionId in response".into()))?
            .to_string();

        debug!(session = %session_id, headless = opts.headless, "browser session started");
        Ok(Self {
            client,
            base,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/session/{}/{endpoint}", self.base, self.session_id)
    }

    fn post(&self, endpoint: &str, payload: Value) -> Result<Value, AcquireError> {
        let body = self
            .client
            .post(self.url(endpoint))
            .json(&payload)
            .send()
            .and_then(|r| r.json::<Value>())
            .map_err(|e| AcquireError::Render(format!("{endpoint}: {e}")))?;
        unwrap_value(body, endpoint)
    }

    fn get(&self, endpoint: &str) -> Result<Value, AcquireError> {
        let body = self
            .client
            .get(self.url(endpoint))
            .send()
            .and_then(|r| r.json::<Value>())
            .map_err(|e| AcquireError::Render(format!("{endpoint}: {e}")))?;
        unwrap_value(body, endpoint)
    }
}

impl BrowserDriver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), AcquireError> {
        self.post("url", json!({ "url": url })).map(|_| ())
    }

    fn execute_script(&mut self, script: &str) -> Result<Value, AcquireError> {
        self.post("execute/sync", json!({ "script": script, "args": [] }))
    }

    fn page_source(&mut self) -> Result<String, AcquireError> {
        match self.get("source")? {
            Value::String(html) => Ok(html),
            other => Err(AcquireError::Render(format!(
                "page source is not a string: {}",
                other
            ))),
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.base, self.session_id);
        match self.client.delete(&url).send() {
            Ok(_) => debug!(session = %self.session_id, "browser session closed"),
            Err(e) => warn!(session = %self.session_id, error = %e, "failed to close browser session"),
        }
    }
}
