use std::path::PathBuf;

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onair")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(temp_dir).join("onair")
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join("onair")
}

/// Epoch milliseconds — the unit of every shared timestamp in the protocol.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
