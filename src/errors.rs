use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    /// 配置错误，在任何网络请求之前返回
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 单次抓取失败（网络、超时、HTTP状态码），可以重试
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// 数据源整体不可用，整个窗口的抓取无法开始
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, DataHubError>;

// 用于从字符串创建错误
impl From<String> for DataHubError {
    fn from(s: String) -> Self {
        DataHubError::Unknown(s)
    }
}

// 用于从&str创建错误
impl From<&str> for DataHubError {
    fn from(s: &str) -> Self {
        DataHubError::Unknown(s.to_string())
    }
}
