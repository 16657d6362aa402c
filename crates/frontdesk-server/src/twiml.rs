//! Telephony markup (TwiML) response builder.

use std::fmt::Write as _;

/// Fluent builder for the XML documents the telephony gateway consumes.
#[derive(Debug, Default)]
pub struct TwimlResponse {
    elements: Vec<String>,
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speak text with the gateway's built-in voice.
    pub fn say(mut self, text: &str) -> Self {
        self.elements.push(format!(
            "<Say voice=\"Polly.Joanna\">{}</Say>",
            escape_xml(text)
        ));
        self
    }

    /// Play audio from a URL.
    pub fn play(mut self, url: &str) -> Self {
        self.elements
            .push(format!("<Play>{}</Play>", escape_xml(url)));
        self
    }

    /// Connect the call to a bidirectional media stream, attaching custom
    /// parameters passed through in the stream's `start` frame.
    pub fn connect_stream(mut self, url: &str, parameters: &[(&str, &str)]) -> Self {
        let mut element = String::new();
        let _ = write!(element, "<Connect><Stream url=\"{}\">", escape_xml(url));
        for (name, value) in parameters {
            let _ = write!(
                element,
                "<Parameter name=\"{}\" value=\"{}\" />",
                escape_xml(name),
                escape_xml(value)
            );
        }
        element.push_str("</Stream></Connect>");
        self.elements.push(element);
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.elements
            .push(format!("<Pause length=\"{}\" />", seconds));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.elements.push("<Hangup />".to_string());
        self
    }

    pub fn to_xml(&self) -> String {
        let mut body = String::new();
        for element in &self.elements {
            body.push_str("\n    ");
            body.push_str(element);
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>{}\n</Response>",
            body
        )
    }
}
