//! MIME message assembly for emailed artifacts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::EmailSettings;

/// Base64 line length required by RFC 2045.
const LINE_LENGTH: usize = 76;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// An email carrying one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Attachment,
}

impl OutgoingMail {
    pub fn new(settings: &EmailSettings, to: &str, attachment: Attachment) -> Self {
        Self {
            from: settings.sender.clone(),
            to: to.to_string(),
            subject: settings.subject.clone(),
            body: settings.body.clone(),
            attachment,
        }
    }

    /// Render as a `multipart/mixed` message.
    pub fn to_mime(&self, boundary: &str) -> String {
        let mut out = String::new();
        if let Some(from) = &self.from {
            push_header(&mut out, "From", &header_value(from));
        }
        push_header(&mut out, "To", &header_value(&self.to));
        push_header(&mut out, "Subject", &encode_word(&header_value(&self.subject)));
        push_header(&mut out, "MIME-Version", "1.0");
        push_header(
            &mut out,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        out.push_str("\r\n");

        out.push_str(&format!("--{boundary}\r\n"));
        push_header(&mut out, "Content-Type", "text/plain; charset=\"UTF-8\"");
        push_header(&mut out, "Content-Transfer-Encoding", "base64");
        out.push_str("\r\n");
        push_base64(&mut out, self.body.as_bytes());

        let name = header_value(&self.attachment.file_name).replace('"', "");
        out.push_str(&format!("--{boundary}\r\n"));
        push_header(
            &mut out,
            "Content-Type",
            &format!("{}; name=\"{name}\"", header_value(&self.attachment.content_type)),
        );
        push_header(
            &mut out,
            "Content-Disposition",
            &format!("attachment; filename=\"{name}\""),
        );
        push_header(&mut out, "Content-Transfer-Encoding", "base64");
        out.push_str("\r\n");
        push_base64(&mut out, &self.attachment.data);

        out.push_str(&format!("--{boundary}--\r\n"));
        out
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Strip line breaks so a value cannot start a new header.
fn header_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// RFC 2047 encoded word for non-ASCII header text.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

fn push_base64(out: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    for chunk in encoded.as_bytes().chunks(LINE_LENGTH) {
        // Base64 output is ASCII.
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
}
