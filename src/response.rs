use serde::Serialize;

/// Static landing page served at the base path
pub const INDEX_PAGE: &str = include_str!("../static/index.html");

/// Build and version description reported by `/info` and `--version`
pub fn server_info() -> String {
    let version = option_env!("GIT_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    let rust = env!("CARGO_PKG_RUST_VERSION");
    let date = chrono::Local::now().format("%Y-%m-%d");
    format!("git={} rust={} date={}", version, rust, date)
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub server: String,
}

impl InfoResponse {
    pub fn current() -> Self {
        Self {
            server: server_info(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_format() {
        let info = server_info();
        assert!(info.starts_with("git="));
        assert!(info.contains(" rust="));
        assert!(info.contains(" date="));
    }

    #[test]
    fn test_info_serialization() {
        let json = serde_json::to_value(InfoResponse::current()).unwrap();
        assert!(json["server"].as_str().unwrap().starts_with("git="));
    }
}
