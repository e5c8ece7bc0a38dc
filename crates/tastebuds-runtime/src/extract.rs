//! Pulls the HTML document out of raw completion text.

const DOCUMENT_START: &str = "<!DOCTYPE";
const DOCUMENT_END: &str = "</html>";

/// Extract the document from a completion.
///
/// Takes the span from the first `<!DOCTYPE` through the first `</html>`
/// after it. Without an end marker the span runs to the end of input;
/// without a start marker the whole input is returned. Always trimmed.
pub fn extract_document(raw: &str) -> &str {
    let Some(start) = raw.find(DOCUMENT_START) else {
        return raw.trim();
    };
    let tail = &raw[start..];
    match tail.find(DOCUMENT_END) {
        Some(end) => tail[..end + DOCUMENT_END.len()].trim(),
        None => tail.trim(),
    }
}
