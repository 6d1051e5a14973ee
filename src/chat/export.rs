//! Markdown export of a session transcript.

use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::{Error, Result};
use crate::observability::{EXPORT_ERRORS, EXPORT_FILES};
use crate::types::{Message, Role, conversation_turns};

const FILE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]-[hour]-[minute]-[second]");

const GENERATED_ON: &[BorrowedFormatItem<'static>] = format_description!(
    "[month repr:long] [day padding:none], [year] [hour]:[minute]:[second]"
);

const USER_HEADING: &str = "### 💭 You";
const ASSISTANT_HEADING: &str = "### 🤖 AI";

/// The current local time, or UTC when the local offset is unknown.
pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Writes transcripts as markdown files into one directory.
#[derive(Debug, Clone)]
pub struct HistoryExporter {
    dir: PathBuf,
}

impl HistoryExporter {
    /// An exporter writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export `history` stamped with the current time.
    ///
    /// Returns `Ok(None)` without touching the filesystem when the history
    /// holds no turns.
    pub fn export(&self, history: &[Message]) -> Result<Option<PathBuf>> {
        self.export_at(history, now())
    }

    /// Export `history` stamped with `at`.
    pub fn export_at(&self, history: &[Message], at: OffsetDateTime) -> Result<Option<PathBuf>> {
        if conversation_turns(history).is_empty() {
            return Ok(None);
        }
        let path = self.dir.join(file_name(at)?);
        let markdown = render_markdown(history, at)?;
        if let Err(err) = fs::write(&path, markdown) {
            EXPORT_ERRORS.click();
            return Err(Error::export(
                format!("could not write {}: {err}", path.display()),
                Some(Box::new(err)),
            ));
        }
        EXPORT_FILES.click();
        tracing::info!(path = %path.display(), "transcript exported");
        Ok(Some(path))
    }
}

/// `chat-history-YYYY-MM-DD-HH-MM-SS.md` for `at`.
pub fn file_name(at: OffsetDateTime) -> Result<String> {
    Ok(format!("chat-history-{}.md", format_time(at, FILE_STAMP)?))
}

/// Render every message after the system message as a markdown section.
pub fn render_markdown(history: &[Message], generated: OffsetDateTime) -> Result<String> {
    let mut out = String::from("# Chat History\n\n");
    out.push_str(&format!(
        "Generated on: {}\n\n",
        format_time(generated, GENERATED_ON)?
    ));
    out.push_str("---\n\n");
    for message in conversation_turns(history) {
        let heading = match message.role {
            Role::User => USER_HEADING,
            Role::Assistant => ASSISTANT_HEADING,
            Role::System => continue,
        };
        out.push_str(&format!("{heading}\n{}\n\n", message.transcript_content()));
        out.push_str("---\n\n");
    }
    Ok(out)
}

fn format_time(at: OffsetDateTime, format: &[BorrowedFormatItem<'_>]) -> Result<String> {
    at.format(format).map_err(|err| {
        EXPORT_ERRORS.click();
        Error::export(format!("could not format timestamp: {err}"), Some(Box::new(err)))
    })
}
