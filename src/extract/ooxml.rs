//! Word (`.docx`) text extraction.
//!
//! A `.docx` is a ZIP container of XML parts; body text lives in the
//! `<w:t>` runs of `word/document.xml`.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use super::ExtractError;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

fn ooxml_err(e: impl ToString) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(ooxml_err)
}

/// Read one entry, `Ok(None)` if the archive does not contain it.
fn read_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Option<Vec<u8>>, ExtractError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ooxml_err(e)),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

/// Body text of a Word document, one line per paragraph.
pub(super) fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry_bounded(&mut archive, "word/document.xml")?
        .ok_or_else(|| ExtractError::Ooxml("word/document.xml not found".to_string()))?;

    let mut out = String::new();
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => out.push_str(&te.unescape().map_err(ooxml_err)?),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["Complete blood count", "Hemoglobin low "]);
        let text = docx_text(&bytes).unwrap();
        assert_eq!(text, "Complete blood count\nHemoglobin low \n");
    }

    #[test]
    fn docx_without_document_part_fails() {
        let bytes = zip_with(&[("word/other.xml", "<x/>")]);
        let err = docx_text(&bytes).unwrap_err();
        assert!(err.to_string().contains("word/document.xml not found"));
    }

    #[test]
    fn invalid_zip_returns_error() {
        assert!(matches!(docx_text(b"not a zip"), Err(ExtractError::Ooxml(_))));
    }

    #[test]
    fn tabs_and_breaks_are_kept() {
        let xml = "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>\
                   <w:p><w:r><w:t>Dose</w:t><w:tab/><w:t>5 mg</w:t><w:br/><w:t>daily</w:t></w:r></w:p>\
                   </w:body></w:document>";
        let bytes = zip_with(&[("word/document.xml", xml)]);
        assert_eq!(docx_text(&bytes).unwrap(), "Dose\t5 mg\ndaily\n");
    }
}
