use reqwest::StatusCode;

/// Why a snapshot could not be obtained.
///
/// All variants are transient from the dashboard's point of view: the last
/// good reading stays on screen and the next poll tries again.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },
    #[error("malformed snapshot from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}
