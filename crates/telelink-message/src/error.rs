/// Errors raised while interpreting packet contents.
///
/// These surface through serde's custom-error channel, so payload decoders
/// report them as part of their own error message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// A known variant key was followed by further top-level keys.
    #[error("`{tag}` message carries {extra} extra top-level key(s)")]
    ExtraKeys { tag: &'static str, extra: usize },

    /// A diagnostic level code or name outside the known set.
    #[error("unknown diagnostic level `{0}`")]
    UnknownLevel(String),
}

pub type Result<T> = std::result::Result<T, MessageError>;
