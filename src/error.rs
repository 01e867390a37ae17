use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bencode decode error: {0}")]
    BencodeDecode(String),

    #[error("Bencode encode error: {0}")]
    BencodeEncode(String),

    #[error("{0}")]
    TorrentDecoding(String),

    #[error("{0}")]
    UnknownTracker(String),

    #[error("{0}")]
    TorrentNotFound(String),

    #[error("{0}")]
    TorrentAlreadyExists(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Maximum number of retries reached: {0}")]
    MaxRetries(String),

    #[error("Configuration error:\n{0}")]
    Config(String),

    #[error("{0}")]
    TorrentClient(String),

    #[error("{0}")]
    TorrentClientAuthentication(String),

    #[error("{0}")]
    TorrentExistsInClient(String),

    #[error("{0}")]
    TorrentInjection(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("{0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, Error>;
