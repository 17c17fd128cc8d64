//! Word (`.docx`) paragraph text, read from `word/document.xml` inside the archive.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract paragraph text, one paragraph per line. Errors are plain messages;
/// the caller attaches the file name.
pub(crate) fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("failed to read DOCX as ZIP: {e}"))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| format!("invalid DOCX: missing {DOCUMENT_PART}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("failed to read {DOCUMENT_PART}: {e}"))?;

    paragraphs_from_xml(&xml)
}

fn paragraphs_from_xml(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| format!("XML parse error: {e}"))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {e}")),
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}
