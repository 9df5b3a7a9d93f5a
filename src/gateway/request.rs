// Request descriptors

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::auth::Scope;

/// Per-call request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,

    /// Abort the call after this long (surfaces as a timeout error)
    pub timeout: Option<Duration>,

    /// Credential scope refreshed on 401; inferred from the endpoint when unset
    pub scope: Option<Scope>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Drop any caller-supplied Content-Type so the multipart boundary is set by the transport
    pub(crate) fn without_content_type(mut self) -> Self {
        self.headers.remove(CONTENT_TYPE);
        self
    }
}

/// Outgoing request body
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,

    /// Pre-serialized body, sent as-is
    Text(String),

    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// Data handed to the body-bearing convenience methods
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,

    /// Serialized to JSON before sending
    Json(Value),

    /// Already serialized, sent unchanged
    Text(String),
}

impl Payload {
    /// Serialize any value into a JSON payload
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Payload::Json)
    }

    pub(crate) fn into_body(self) -> RequestBody {
        match self {
            Payload::Empty | Payload::Json(Value::Null) => RequestBody::Empty,
            Payload::Json(value) => RequestBody::Text(value.to_string()),
            Payload::Text(text) if text.is_empty() => RequestBody::Empty,
            Payload::Text(text) => RequestBody::Text(text),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

/// Multipart form that can be rebuilt for every attempt
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone)]
struct FormPart {
    name: String,
    value: FormValue,
}

#[derive(Debug, Clone)]
enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        data: Bytes,
    },
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::File {
                file_name: file_name.into(),
                mime: mime.map(str::to_string),
                data: data.into(),
            },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Build a fresh `reqwest` form
    pub fn to_form(&self) -> reqwest::Result<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match &part.value {
                FormValue::Text(value) => form.text(part.name.clone(), value.clone()),
                FormValue::File {
                    file_name,
                    mime,
                    data,
                } => {
                    let mut file = Part::stream_with_length(data.clone(), data.len() as u64)
                        .file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime)?;
                    }
                    form.part(part.name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}
