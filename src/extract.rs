//! Text extraction for uploaded documents.
//!
//! Ingestion accepts raw bytes plus the original file name; this module
//! turns them into plain UTF-8 text. PDF is handled by `pdf-extract`;
//! Markdown and plain text pass through as UTF-8. Anything else fails with
//! [`Error::UnsupportedFormat`] before any chunking or index write happens.

use crate::error::{Error, Result};

/// File extensions treated as plain UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

/// Extract plain text from an uploaded file's bytes.
///
/// The format is chosen by the file name's extension (lowercased). A PDF
/// that cannot be parsed, or text that is not valid UTF-8, is an
/// [`Error::UnsupportedFormat`] — the whole ingestion attempt fails.
pub fn extract_text(file_name: &str, bytes: &[u8]) -> Result<String> {
    match extension(file_name).as_deref() {
        Some("pdf") => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| Error::UnsupportedFormat(format!("{file_name}: {e}"))),
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::UnsupportedFormat(format!("{file_name}: not valid UTF-8"))),
        Some(other) => Err(Error::UnsupportedFormat(format!(
            "{file_name}: unrecognized extension '.{other}'"
        ))),
        None => Err(Error::UnsupportedFormat(format!(
            "{file_name}: no file extension"
        ))),
    }
}

fn extension(file_name: &str) -> Option<String> {
    let ext = file_name.rsplit('.').next()?;
    if ext == file_name {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("notes.txt", b"Refunds are accepted within 30 days.").unwrap();
        assert_eq!(text, "Refunds are accepted within 30 days.");
    }

    #[test]
    fn markdown_passes_through() {
        let text = extract_text("manual.md", b"# Refund policy\n\nSee section 3.").unwrap();
        assert!(text.starts_with("# Refund policy"));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = extract_text("photo.png", b"\x89PNG").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_extension_is_unsupported() {
        let err = extract_text("README", b"hello").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_is_unsupported() {
        let err = extract_text("manual.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_utf8_text_is_unsupported() {
        let err = extract_text("weird.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(extract_text("NOTES.TXT", b"ok").is_ok());
    }

    #[test]
    fn valid_pdf_yields_its_text() {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("descale monthly")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let text = extract_text("manual.pdf", &bytes).unwrap();
        assert!(text.contains("descale monthly"), "got: {text:?}");
    }
}
