use crate::errors::AppError;

/// Upload formats whose text we can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFileKind {
    Pdf,
    PlainText,
}

impl ResumeFileKind {
    /// Classifies by file-name extension, case-insensitively.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "md" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::PlainText => "text/plain; charset=utf-8",
        }
    }
}

/// Extracts plain text from an uploaded resume. PDF parsing is CPU-bound and
/// runs on the blocking pool.
pub async fn extract_text(kind: ResumeFileKind, bytes: Vec<u8>) -> Result<String, AppError> {
    let text = match kind {
        ResumeFileKind::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
        ResumeFileKind::Pdf => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}")))?
        .map_err(|e| AppError::Validation(format!("Could not read PDF: {e}")))?,
    };
    Ok(normalize_whitespace(&text))
}

/// Trims each line and collapses runs of blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && out.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
