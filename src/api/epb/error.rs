use reqwest::StatusCode;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum Error {
    /// Bad credentials, missing token, or the token keeps expiring.
    #[display("authentication failed: {_0}")]
    #[from(ignore)]
    Auth(#[error(not(source))] String),

    /// Connection-level failure, including timeouts.
    #[display("failed to reach EPB API")]
    Transport(reqwest::Error),

    #[display("EPB API responded with `{status}`: {body}")]
    #[from(ignore)]
    Api { status: StatusCode, body: String },

    #[display("failed to deserialize EPB API response")]
    Malformed(serde_json::Error),
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
