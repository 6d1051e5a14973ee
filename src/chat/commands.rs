//! Meta-command recognition for the chat loop.
//!
//! A meta-command is a whole entry that controls the session instead of
//! being sent to the backend.  Matching is exact on the trimmed entry and
//! ignores case, so `Exit` ends the session but `exit now` is chat content.

/// A parsed meta-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    /// End the session.
    Exit,
    /// Reset history to the system message and redraw the screen.
    Clear,
    /// Export the transcript to a markdown file.
    History,
    /// Send the transcript to the notification endpoint.
    Email,
}

impl MetaCommand {
    /// Every meta-command, in the order the banner lists them.
    pub const ALL: [MetaCommand; 4] = [
        MetaCommand::Exit,
        MetaCommand::Clear,
        MetaCommand::History,
        MetaCommand::Email,
    ];

    /// The token that invokes this command.
    pub fn token(&self) -> &'static str {
        match self {
            MetaCommand::Exit => "exit",
            MetaCommand::Clear => "clear",
            MetaCommand::History => "/history",
            MetaCommand::Email => "/email",
        }
    }
}

/// Parses an entry for a meta-command.
///
/// Returns `Some(MetaCommand)` if the entry is a meta-command,
/// or `None` if it should be treated as chat content.
///
/// # Examples
///
/// ```
/// # use genie::chat::{MetaCommand, parse_command};
/// assert_eq!(parse_command("  EXIT "), Some(MetaCommand::Exit));
/// assert_eq!(parse_command("/History"), Some(MetaCommand::History));
/// assert!(parse_command("clear the cache").is_none());
/// ```
pub fn parse_command(entry: &str) -> Option<MetaCommand> {
    let entry = entry.trim().to_lowercase();
    MetaCommand::ALL
        .into_iter()
        .find(|command| command.token() == entry)
}
