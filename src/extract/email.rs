//! `.eml` message reading on top of `mail-parser`.
//!
//! The first non-empty `text/plain` body part wins; otherwise the HTML body
//! is rendered to text with `html2text`. Attachments are ignored.

use mail_parser::{Address, Message, MessageParser, PartType};

use super::ExtractError;

/// Line width for HTML bodies rendered to text.
const HTML_WRAP_WIDTH: usize = 120;

#[derive(Debug, Default, PartialEq)]
pub(super) struct ParsedEmail {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub body: String,
}

pub(super) fn parse_eml(bytes: &[u8]) -> Result<ParsedEmail, ExtractError> {
    let message = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| ExtractError::Email("not an RFC 5322 message".to_string()))?;
    if message.headers().is_empty() {
        return Err(ExtractError::Email("no message headers found".to_string()));
    }

    Ok(ParsedEmail {
        subject: message.subject().map(|s| s.trim().to_string()),
        from: addresses(message.from()),
        to: addresses(message.to()),
        date: message.date().map(|d| d.to_rfc3339()),
        body: body_text(&message)?,
    })
}

/// `Name <addr>` entries, comma separated.
fn addresses(address: Option<&Address<'_>>) -> Option<String> {
    let list: Vec<String> = address?
        .iter()
        .filter_map(|addr| match (addr.name(), addr.address()) {
            (Some(name), Some(email)) => Some(format!("{} <{}>", name, email)),
            (None, Some(email)) => Some(email.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        })
        .collect();
    (!list.is_empty()).then(|| list.join(", "))
}

fn body_text(message: &Message<'_>) -> Result<String, ExtractError> {
    let plain = message
        .text_body
        .iter()
        .filter_map(|id| message.part(*id))
        .find_map(|part| match &part.body {
            PartType::Text(text) if !text.trim().is_empty() => Some(text.to_string()),
            _ => None,
        });
    if let Some(text) = plain {
        return Ok(text);
    }

    for part in message.html_body.iter().filter_map(|id| message.part(*id)) {
        if let PartType::Html(html) = &part.body {
            let text = html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH)
                .map_err(|e| ExtractError::Email(format!("failed to render HTML body: {}", e)))?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
    }
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_with_folded_subject() {
        let raw = "From: Clinic <clinic@example.org>\r\n\
                   To: patient@example.org\r\n\
                   Subject: Your lab\r\n results\r\n\
                   Date: Mon, 3 Mar 2025 09:00:00 +0000\r\n\
                   \r\n\
                   Ferritin is within range.\r\n";
        let mail = parse_eml(raw.as_bytes()).unwrap();
        assert_eq!(mail.subject.as_deref(), Some("Your lab results"));
        assert_eq!(mail.from.as_deref(), Some("Clinic <clinic@example.org>"));
        assert_eq!(mail.to.as_deref(), Some("patient@example.org"));
        assert!(mail.date.unwrap().starts_with("2025-03-03T09:00:00"));
        assert_eq!(mail.body.trim(), "Ferritin is within range.");
    }

    #[test]
    fn multipart_prefers_plain_text() {
        let raw = "Subject: Results\n\
                   Content-Type: multipart/alternative; boundary=\"XYZ\"\n\
                   \n\
                   preamble\n\
                   --XYZ\n\
                   Content-Type: text/html\n\
                   \n\
                   <p>HTML version</p>\n\
                   --XYZ\n\
                   Content-Type: text/plain; charset=utf-8\n\
                   Content-Transfer-Encoding: base64\n\
                   \n\
                   UGxhaW4gdmVyc2lvbg==\n\
                   --XYZ--\n";
        let mail = parse_eml(raw.as_bytes()).unwrap();
        assert_eq!(mail.body.trim(), "Plain version");
    }

    #[test]
    fn html_body_drops_styles_and_decodes_entities() {
        let raw = "Subject: Labs\n\
                   Content-Type: text/html; charset=utf-8\n\
                   \n\
                   <html><head><style>p { color: red; }</style></head>\
                   <body><p>Ferritin &#8805; 12</p><script>track()</script></body></html>\n";
        let mail = parse_eml(raw.as_bytes()).unwrap();
        assert!(mail.body.contains("Ferritin \u{2265} 12"), "{:?}", mail.body);
        assert!(!mail.body.contains("color"));
        assert!(!mail.body.contains("track()"));
    }

    #[test]
    fn quoted_printable_body() {
        let raw = "Subject: qp\nContent-Transfer-Encoding: quoted-printable\n\nH=C3=A9moglobine =\nbasse =3D 11";
        let mail = parse_eml(raw.as_bytes()).unwrap();
        assert_eq!(mail.body.trim(), "H\u{e9}moglobine basse = 11");
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(parse_eml(b""), Err(ExtractError::Email(_))));
    }
}
