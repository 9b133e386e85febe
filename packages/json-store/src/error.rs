use crate::STORE_PATH_ENV_VAR;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings document: {message}")]
    Document { message: String },

    #[error("no settings store path: set {STORE_PATH_ENV_VAR}, XDG_CONFIG_HOME or HOME")]
    NoStorePath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_error_display() {
        let e = Error::Document {
            message: "root is not an object".to_string(),
        };
        assert!(e.to_string().contains("root is not an object"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e = Error::from(io_err);
        assert!(e.to_string().contains("missing"));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e = Error::from(json_err);
        assert!(e.to_string().contains("JSON error"));
    }

    #[test]
    fn no_store_path_names_the_env_var() {
        assert!(Error::NoStorePath.to_string().contains(STORE_PATH_ENV_VAR));
    }
}
