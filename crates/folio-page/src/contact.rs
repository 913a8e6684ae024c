//! Contact form: validity gating, multipart submission, transient status.

use std::time::Duration;

use folio_core::{SiteError, SiteResult};
use folio_net::{Fetch, Request};
use http::header::{HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

/// Input kind; only emails get a format check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Email,
    Textarea,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactField {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default = "required_default")]
    pub required: bool,
    #[serde(default)]
    pub value: String,
}

fn required_default() -> bool {
    true
}

impl ContactField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            value: String::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        let value = self.value.trim();
        if value.is_empty() {
            return !self.required;
        }
        match self.kind {
            FieldKind::Email => is_email(value),
            FieldKind::Text | FieldKind::Textarea => true,
        }
    }
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Escape text so it can be placed in markup verbatim.
pub fn sanitize_input(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitButton {
    Disabled,
    Enabled,
    Sending,
}

impl SubmitButton {
    pub fn label(&self) -> &'static str {
        match self {
            SubmitButton::Sending => "Sending...",
            SubmitButton::Disabled | SubmitButton::Enabled => "Send Message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStatus {
    Hidden,
    Success,
    Error,
}

impl FormStatus {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            FormStatus::Hidden => None,
            FormStatus::Success => Some("✓ Message sent successfully! I'll get back to you soon."),
            FormStatus::Error => {
                Some("✗ Oops! Something went wrong. Please try again or email me directly.")
            }
        }
    }
}

pub struct ContactForm {
    fields: Vec<ContactField>,
    action: Option<Url>,
    button: SubmitButton,
    status: FormStatus,
    status_until: Option<Instant>,
    status_duration: Duration,
}

impl ContactForm {
    pub fn new(fields: Vec<ContactField>, action: Option<Url>, status_duration: Duration) -> Self {
        let mut form = Self {
            fields,
            action,
            button: SubmitButton::Disabled,
            status: FormStatus::Hidden,
            status_until: None,
            status_duration,
        };
        form.refresh_button();
        form
    }

    /// The name, email and message form the site ships with.
    pub fn standard(action: Option<Url>, status_duration: Duration) -> Self {
        Self::new(
            vec![
                ContactField::new("fullname", FieldKind::Text),
                ContactField::new("email", FieldKind::Email),
                ContactField::new("message", FieldKind::Textarea),
            ],
            action,
            status_duration,
        )
    }

    pub fn fields(&self) -> &[ContactField] {
        &self.fields
    }

    pub fn button(&self) -> SubmitButton {
        self.button
    }

    /// Status currently shown, hiding it once its time is up.
    pub fn status(&mut self) -> FormStatus {
        if let Some(until) = self.status_until {
            if Instant::now() >= until {
                self.status = FormStatus::Hidden;
                self.status_until = None;
            }
        }
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.fields.iter().all(ContactField::is_valid)
    }

    /// Update one input and re-check the form.
    pub fn set_input(&mut self, name: &str, value: &str) -> SiteResult<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| SiteError::NotFound(format!("form field {name}")))?;
        field.value = value.to_string();
        self.refresh_button();
        Ok(())
    }

    /// Field values escaped for display.
    pub fn preview(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), sanitize_input(&f.value)))
            .collect()
    }

    fn refresh_button(&mut self) {
        self.button = if self.is_valid() {
            SubmitButton::Enabled
        } else {
            SubmitButton::Disabled
        };
    }

    fn reset(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
        }
    }

    /// POST the form as multipart data and show the outcome.
    ///
    /// The button is re-enabled afterwards either way and the status hides
    /// itself after the configured duration.
    pub async fn submit(&mut self, fetcher: &dyn Fetch) -> FormStatus {
        self.button = SubmitButton::Sending;

        let status = match self.send(fetcher).await {
            Ok(()) => {
                info!("Contact form sent");
                self.reset();
                FormStatus::Success
            }
            Err(e) => {
                debug!(error = %e, "Contact form submission failed");
                FormStatus::Error
            }
        };

        self.button = SubmitButton::Enabled;
        self.status = status;
        self.status_until = Some(Instant::now() + self.status_duration);
        status
    }

    async fn send(&self, fetcher: &dyn Fetch) -> SiteResult<()> {
        let action = self
            .action
            .clone()
            .ok_or_else(|| SiteError::form("no form action configured"))?;
        let fields = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect();

        let request = Request::post_form(action, fields)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        let response = fetcher
            .fetch(request)
            .await
            .map_err(|e| SiteError::network(e.to_string()))?;

        if !response.ok() {
            return Err(SiteError::form(format!(
                "form submission failed with status {}",
                response.status.as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_net::{LoaderConfig, ResourceLoader};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn filled(action: Option<Url>) -> ContactForm {
        let mut form = ContactForm::standard(action, Duration::from_secs(5));
        form.set_input("fullname", "Ada Lovelace").unwrap();
        form.set_input("email", "ada@example.com").unwrap();
        form.set_input("message", "Hello <there>").unwrap();
        form
    }

    fn loader() -> ResourceLoader {
        ResourceLoader::new(LoaderConfig::default()).unwrap()
    }

    #[test]
    fn test_button_tracks_validity() {
        let mut form = ContactForm::standard(None, Duration::from_secs(5));
        assert_eq!(form.button(), SubmitButton::Disabled);

        form.set_input("fullname", "Ada").unwrap();
        form.set_input("email", "not-an-email").unwrap();
        form.set_input("message", "hi").unwrap();
        assert_eq!(form.button(), SubmitButton::Disabled);

        form.set_input("email", "ada@example.com").unwrap();
        assert_eq!(form.button(), SubmitButton::Enabled);
        assert!(form.set_input("phone", "123").is_err());
    }

    #[test]
    fn test_sanitize_input() {
        assert_eq!(sanitize_input("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
        let form = filled(None);
        assert_eq!(form.preview()[2].1, "Hello &lt;there&gt;");
    }

    #[tokio::test]
    async fn test_successful_submit_resets_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/f/contact"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let action = Url::parse(&format!("{}/f/contact", server.uri())).unwrap();
        let mut form = filled(Some(action));

        assert_eq!(form.submit(&loader()).await, FormStatus::Success);
        assert!(form.fields().iter().all(|f| f.value.is_empty()));
        assert_eq!(form.button(), SubmitButton::Enabled);
        assert_eq!(form.status(), FormStatus::Success);
    }

    #[tokio::test]
    async fn test_rejected_submit_keeps_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let action = Url::parse(&server.uri()).unwrap();
        let mut form = filled(Some(action));

        assert_eq!(form.submit(&loader()).await, FormStatus::Error);
        assert_eq!(form.fields()[0].value, "Ada Lovelace");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_hides_after_duration() {
        let mut form = filled(None);

        assert_eq!(form.submit(&loader()).await, FormStatus::Error);
        assert_eq!(form.status(), FormStatus::Error);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(form.status(), FormStatus::Hidden);
    }
}
