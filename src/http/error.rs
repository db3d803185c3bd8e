use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Too many redirects: {url} exceeded {max} hops")]
    TooManyRedirects { url: String, max: usize },

    #[error("Redirect from {from} to {to} leaves the requested host")]
    CrossOriginRedirect { from: String, to: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Body of {length} bytes exceeds the limit of {limit}")]
    BodyTooLarge { length: usize, limit: usize },
}

impl FetchError {
    /// Whether the failure means "the document could not be reached"
    ///
    /// Such failures become part of the history; the others are caller errors.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Unreachable(_) | FetchError::TooManyRedirects { .. }
        )
    }
}
