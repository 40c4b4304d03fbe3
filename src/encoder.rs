//! Fixed-schema JSON line encoder.
//!
//! The encoder writes one compact JSON object per event, field by field, in
//! a fixed order. Missing properties become `null`; keys are never omitted
//! from an object that is written.
//!
//! ```text
//! {"Level":"Information","Time":"1700000000000","CorrelationId":"abc",
//!  "Message":"Completed Request","Exception":null,
//!  "Http":{"Request":{"Path":"/api/v1/customers","Method":"GET","Query":null,
//!                     "Body":null,"ContentType":null,"Scheme":"http",
//!                     "Protocol":"HTTP/1.1","UserAgent":null},
//!          "Response":{"StatusCode":200,"ResponseTime":0.004,"Bytes":10}},
//!  "Host":{"Hostname":"localhost","ForwardedHostname":null,"Ip":"127.0.0.1"}}
//! ```
//!
//! `Time` and `CorrelationId` keep the quoting of the existing log format:
//! the epoch milliseconds sit inside quotes, and an event without a
//! correlation ID carries the string `"null"`.

use std::io::{self, Write};

use crate::event::LogEvent;
use crate::value::{PropertyValue, Scalar};

/// Property names the encoder reads.
pub mod keys {
    pub const CORRELATION_ID: &str = "CorrelationId";
    pub const HAS_HTTP_REQUEST: &str = "HasHttpRequest";
    pub const URL: &str = "Url";
    pub const METHOD: &str = "Method";
    pub const QUERY: &str = "Query";
    pub const REQUEST_BODY: &str = "RequestBody";
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const SCHEME: &str = "Scheme";
    pub const PROTOCOL: &str = "Protocol";
    pub const USER_AGENT: &str = "UserAgent";
    pub const HOSTNAME: &str = "Hostname";
    pub const FORWARDED_HOSTNAME: &str = "ForwardedHostname";
    pub const IP: &str = "Ip";
    pub const HAS_HTTP_RESPONSE: &str = "HasHttpResponse";
    pub const STATUS_CODE: &str = "StatusCode";
    pub const RESPONSE_TIME: &str = "ResponseTime";
    pub const RESPONSE_BYTES: &str = "ResponseBytes";
}

/// Renders [`LogEvent`]s as single JSON lines. Holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEncoder;

impl EventEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encodes `event` into a newline-terminated line.
    pub fn encode(&self, event: &LogEvent) -> String {
        let mut buf = Vec::with_capacity(512);
        // Writes into a Vec only fail on allocation, which aborts anyway.
        let _ = self.encode_to(event, &mut buf);
        String::from_utf8(buf).unwrap_or_default()
    }

    /// Encodes `event` straight into `out`.
    pub fn encode_to<W: Write>(&self, event: &LogEvent, out: &mut W) -> io::Result<()> {
        let properties = event.properties();
        let field = |key: &str| properties.get(key);

        out.write_all(b"{\"Level\":\"")?;
        out.write_all(event.level().as_str().as_bytes())?;

        out.write_all(b"\",\"Time\":\"")?;
        write!(out, "{}", event.unix_millis())?;

        out.write_all(b"\",\"CorrelationId\":")?;
        match field(keys::CORRELATION_ID) {
            Some(PropertyValue::Scalar(Scalar::Str(id))) => write_json_string(out, id)?,
            Some(value) if !value.is_null() => write_json_string(out, &value.to_string())?,
            _ => out.write_all(b"\"null\"")?,
        }

        out.write_all(b",\"Message\":")?;
        write_json_string(out, &event.render_message())?;

        out.write_all(b",\"Exception\":")?;
        match event.exception() {
            Some(text) => write_json_string(out, text)?,
            None => out.write_all(b"null")?,
        }

        if properties.contains_key(keys::HAS_HTTP_REQUEST) {
            out.write_all(b",\"Http\":{\"Request\":{\"Path\":")?;
            write_native(out, field(keys::URL))?;

            out.write_all(b",\"Method\":")?;
            write_native(out, field(keys::METHOD))?;

            out.write_all(b",\"Query\":")?;
            write_native(out, field(keys::QUERY))?;

            out.write_all(b",\"Body\":")?;
            write_free_text(out, field(keys::REQUEST_BODY))?;

            out.write_all(b",\"ContentType\":")?;
            write_native(out, field(keys::CONTENT_TYPE))?;

            out.write_all(b",\"Scheme\":")?;
            write_native(out, field(keys::SCHEME))?;

            out.write_all(b",\"Protocol\":")?;
            write_native(out, field(keys::PROTOCOL))?;

            out.write_all(b",\"UserAgent\":")?;
            write_native(out, field(keys::USER_AGENT))?;

            out.write_all(b"}")?;

            if properties.contains_key(keys::HAS_HTTP_RESPONSE) {
                out.write_all(b",\"Response\":{\"StatusCode\":")?;
                write_native(out, field(keys::STATUS_CODE))?;

                out.write_all(b",\"ResponseTime\":")?;
                write_native(out, field(keys::RESPONSE_TIME))?;

                out.write_all(b",\"Bytes\":")?;
                write_native(out, field(keys::RESPONSE_BYTES))?;

                out.write_all(b"}")?;
            }

            out.write_all(b"}")?;

            out.write_all(b",\"Host\":{\"Hostname\":")?;
            write_native(out, field(keys::HOSTNAME))?;

            out.write_all(b",\"ForwardedHostname\":")?;
            write_native(out, field(keys::FORWARDED_HOSTNAME))?;

            out.write_all(b",\"Ip\":")?;
            write_native(out, field(keys::IP))?;

            out.write_all(b"}")?;
        }

        out.write_all(b"}\n")
    }
}

/// The value's native text, which is already valid JSON, or `null`.
fn write_native<W: Write>(out: &mut W, value: Option<&PropertyValue>) -> io::Result<()> {
    match value {
        Some(value) => write!(out, "{value}"),
        None => out.write_all(b"null"),
    }
}

/// Free text such as a request body: string content is escaped as-is rather
/// than taken from its native (already quoted) form.
fn write_free_text<W: Write>(out: &mut W, value: Option<&PropertyValue>) -> io::Result<()> {
    match value {
        Some(PropertyValue::Scalar(Scalar::Str(text))) => write_json_string(out, text),
        Some(value) if !value.is_null() => write_json_string(out, &value.to_string()),
        _ => out.write_all(b"null"),
    }
}

fn write_json_string<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    serde_json::to_writer(out, text).map_err(io::Error::from)
}
