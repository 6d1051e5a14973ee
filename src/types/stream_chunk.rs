/// One incremental unit of model output.
///
/// Chunks are transient: they are rendered and folded into the in-flight
/// answer as they arrive and are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text to append to the answer.
    pub content_delta: String,
    /// Text to append to the reasoning trace.
    pub reasoning_delta: String,
    /// True on the last chunk of a turn.
    pub is_final: bool,
}

impl StreamChunk {
    /// A non-final chunk carrying answer text.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content_delta: text.into(),
            ..Self::default()
        }
    }

    /// A non-final chunk carrying reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning_delta: text.into(),
            ..Self::default()
        }
    }

    /// An empty final chunk.
    pub fn finished() -> Self {
        Self {
            is_final: true,
            ..Self::default()
        }
    }

    /// Marks this chunk as the last one of the turn.
    pub fn into_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// True when the chunk carries no text.
    pub fn is_empty(&self) -> bool {
        self.content_delta.is_empty() && self.reasoning_delta.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let chunk = StreamChunk::content("ls");
        assert_eq!(chunk.content_delta, "ls");
        assert!(!chunk.is_final);

        let chunk = StreamChunk::reasoning("hmm").into_final();
        assert_eq!(chunk.reasoning_delta, "hmm");
        assert!(chunk.is_final);

        assert!(StreamChunk::finished().is_empty());
    }
}
