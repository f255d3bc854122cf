use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::schemas::paper::{DocumentKind, SourceDocument};

#[derive(Debug, Error)]
pub(crate) enum DocumentExtractionError {
    #[error("unsupported document type: {0}")]
    UnsupportedKind(String),
    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("docx archive is unreadable: {0}")]
    Archive(String),
    #[error("docx body is not valid xml: {0}")]
    Xml(String),
    #[error("pdf text extraction failed: {0}")]
    Pdf(String),
    #[error("text file is not valid {0}")]
    Encoding(&'static str),
    #[error("document contains no text")]
    Empty,
    #[error("extraction was interrupted: {0}")]
    Interrupted(String),
}

/// Turns an uploaded document into line-preserving UTF-8 text.
pub(crate) trait DocumentTextExtractor: Send + Sync {
    fn kind(&self) -> DocumentKind;

    fn extract_text(&self, bytes: &[u8]) -> Result<String, DocumentExtractionError>;
}

pub(crate) struct DocxExtractor;

pub(crate) struct PdfExtractor;

pub(crate) struct PlainTextExtractor;

#[derive(Debug, Clone)]
pub(crate) struct ExtractedDocument {
    pub(crate) text: String,
    pub(crate) source: SourceDocument,
}

const DOCX_BODY: &str = "word/document.xml";

pub(crate) fn extractor_for(
    filename: &str,
) -> Result<&'static dyn DocumentTextExtractor, DocumentExtractionError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "docx" => Ok(&DocxExtractor),
        "pdf" => Ok(&PdfExtractor),
        "txt" | "text" => Ok(&PlainTextExtractor),
        _ => Err(DocumentExtractionError::UnsupportedKind(filename.to_string())),
    }
}

/// Picks an extractor by file name and fingerprints the upload. Blocking; callers on the
/// async runtime go through `spawn_blocking`.
pub(crate) fn extract_document(
    filename: &str,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<ExtractedDocument, DocumentExtractionError> {
    if bytes.len() > max_bytes {
        return Err(DocumentExtractionError::TooLarge { size: bytes.len(), limit: max_bytes });
    }

    let extractor = extractor_for(filename)?;
    let text = extractor.extract_text(bytes)?;
    if text.trim().is_empty() {
        return Err(DocumentExtractionError::Empty);
    }

    let source = SourceDocument {
        filename: filename.to_string(),
        kind: extractor.kind(),
        sha256: hex::encode(Sha256::digest(bytes)),
        size_bytes: bytes.len() as u64,
    };

    Ok(ExtractedDocument { text, source })
}

impl DocumentTextExtractor for DocxExtractor {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Docx
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, DocumentExtractionError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| DocumentExtractionError::Archive(err.to_string()))?;
        let mut body = Vec::new();
        archive
            .by_name(DOCX_BODY)
            .map_err(|err| DocumentExtractionError::Archive(format!("{DOCX_BODY}: {err}")))?
            .read_to_end(&mut body)
            .map_err(|err| DocumentExtractionError::Archive(err.to_string()))?;

        docx_body_text(&body)
    }
}

/// One output line per `w:p`; `w:br`/`w:cr` also break, `w:tab` becomes a tab.
fn docx_body_text(xml: &[u8]) -> Result<String, DocumentExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut output = String::with_capacity(xml.len() / 4);
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"tab" => output.push('\t'),
                b"br" | b"cr" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(element)) => match element.local_name().as_ref() {
                b"tab" => output.push('\t'),
                b"br" | b"cr" => output.push('\n'),
                _ => {}
            },
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text_run => {
                let unescaped =
                    text.unescape().map_err(|err| DocumentExtractionError::Xml(err.to_string()))?;
                output.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(DocumentExtractionError::Xml(format!(
                    "at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(output)
}

impl DocumentTextExtractor for PdfExtractor {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, DocumentExtractionError> {
        // pdf-extract panics on some font encodings instead of returning an error.
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| DocumentExtractionError::Pdf("unsupported font encoding".to_string()))?;
        let text = outcome.map_err(|err| DocumentExtractionError::Pdf(err.to_string()))?;

        // Page breaks come out as form feeds.
        Ok(text.replace('\u{c}', "\n"))
    }
}

impl DocumentTextExtractor for PlainTextExtractor {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Text
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, DocumentExtractionError> {
        match bytes {
            [0xEF, 0xBB, 0xBF, rest @ ..] => std::str::from_utf8(rest)
                .map(str::to_string)
                .map_err(|_| DocumentExtractionError::Encoding("utf-8")),
            [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
            [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
            _ => std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|_| DocumentExtractionError::Encoding("utf-8")),
        }
    }
}

fn decode_utf16(
    bytes: &[u8],
    to_unit: fn([u8; 2]) -> u16,
) -> Result<String, DocumentExtractionError> {
    if bytes.len() % 2 != 0 {
        return Err(DocumentExtractionError::Encoding("utf-16"));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]])).collect();
    String::from_utf16(&units).map_err(|_| DocumentExtractionError::Encoding("utf-16"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file(DOCX_BODY, options).expect("start file");
            writer.write_all(body.as_bytes()).expect("write body");
            writer.finish().expect("finish archive");
        }
        cursor.into_inner()
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let body = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>[PHẦN 1]</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Câu 1: </w:t></w:r><w:r><w:t>A</w:t></w:r></w:p>
    <w:p><w:r><w:t>[PHẦN 2]</w:t></w:r></w:p>
    <w:p><w:r><w:t>1.</w:t><w:tab/><w:t>Đ S S Đ</w:t></w:r></w:p>
    <w:p><w:r><w:t>2. A &amp; B</w:t><w:br/><w:t>3. C</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let bytes = docx_with_body(body);

        let text = DocxExtractor.extract_text(&bytes).expect("extract");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["[PHẦN 1]", "Câu 1: A", "[PHẦN 2]", "1.\tĐ S S Đ", "2. A & B", "3. C"]
        );
    }

    #[test]
    fn docx_without_body_fails() {
        let err = DocxExtractor.extract_text(b"not a zip archive").unwrap_err();
        assert!(matches!(err, DocumentExtractionError::Archive(_)));
    }

    #[test]
    fn plain_text_handles_boms() {
        let utf8 = [&[0xEF, 0xBB, 0xBF][..], "[PART1]\n1. A".as_bytes()].concat();
        assert_eq!(PlainTextExtractor.extract_text(&utf8).expect("utf8"), "[PART1]\n1. A");

        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "1. Đ".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(PlainTextExtractor.extract_text(&utf16).expect("utf16"), "1. Đ");

        let err = PlainTextExtractor.extract_text(&[0xC3, 0x28]).unwrap_err();
        assert!(matches!(err, DocumentExtractionError::Encoding("utf-8")));
    }

    #[test]
    fn extractor_is_chosen_by_extension() {
        assert_eq!(extractor_for("de-101.DOCX").expect("docx").kind(), DocumentKind::Docx);
        assert_eq!(extractor_for("key.pdf").expect("pdf").kind(), DocumentKind::Pdf);
        assert_eq!(extractor_for("key.txt").expect("txt").kind(), DocumentKind::Text);
        assert!(matches!(
            extractor_for("key.doc"),
            Err(DocumentExtractionError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn extract_document_fingerprints_upload() {
        let bytes = b"[PART1]\n1. A\n";
        let extracted = extract_document("key.txt", bytes, 1024).expect("extract");
        assert_eq!(extracted.source.size_bytes, bytes.len() as u64);
        assert_eq!(extracted.source.sha256.len(), 64);
        assert_eq!(extracted.source.kind, DocumentKind::Text);
    }

    #[test]
    fn extract_document_enforces_limits() {
        let err = extract_document("key.txt", b"1. A", 2).unwrap_err();
        assert!(matches!(err, DocumentExtractionError::TooLarge { size: 4, limit: 2 }));

        let err = extract_document("key.txt", b" \n ", 1024).unwrap_err();
        assert!(matches!(err, DocumentExtractionError::Empty));
    }
}
