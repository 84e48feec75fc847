//! Secret wrapper for sensitive values

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Resolve a secret from `env_var`, falling back to the contents of
    /// `file`.
    ///
    /// The environment variable wins when set to a non-blank value. Both
    /// sources are trimmed; a blank value counts as absent. An unreadable
    /// file is an error.
    pub fn from_env_or_file(env_var: &str, file: Option<&Path>) -> Result<Option<Self>> {
        if let Ok(mut value) = std::env::var(env_var) {
            let trimmed = value.trim().to_owned();
            value.zeroize();
            if !trimmed.is_empty() {
                return Ok(Some(Self::new(trimmed)));
            }
        }
        let Some(path) = file else {
            return Ok(None);
        };
        let mut contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read secret file {}: {e}", path.display()))
        })?;
        let trimmed = contents.trim().to_owned();
        contents.zeroize();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::new(trimmed)))
        }
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Secret::new(String::from("idp-client-secret"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "idp-client-secret");
    }

    #[test]
    fn file_contents_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "  from-file\n").unwrap();

        let secret =
            Secret::from_env_or_file("COMMON_TEST_SECRET_TRIMMED", Some(&path)).unwrap();
        assert_eq!(secret.unwrap().expose(), "from-file");
    }

    #[test]
    fn whitespace_only_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, " \n\t\n").unwrap();

        let secret = Secret::from_env_or_file("COMMON_TEST_SECRET_BLANK", Some(&path)).unwrap();
        assert!(secret.is_none());
    }

    #[test]
    fn env_value_wins_and_is_trimmed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file").unwrap();

        unsafe { set_env("COMMON_TEST_SECRET_ENV", " from-env\n") };
        let secret = Secret::from_env_or_file("COMMON_TEST_SECRET_ENV", Some(&path)).unwrap();
        unsafe { remove_env("COMMON_TEST_SECRET_ENV") };

        assert_eq!(secret.unwrap().expose(), "from-env");
    }

    #[test]
    fn blank_env_value_falls_back_to_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file\n").unwrap();

        unsafe { set_env("COMMON_TEST_SECRET_EMPTY_ENV", "  ") };
        let from_file =
            Secret::from_env_or_file("COMMON_TEST_SECRET_EMPTY_ENV", Some(&path)).unwrap();
        let no_file = Secret::from_env_or_file("COMMON_TEST_SECRET_EMPTY_ENV", None).unwrap();
        unsafe { remove_env("COMMON_TEST_SECRET_EMPTY_ENV") };

        assert_eq!(from_file.unwrap().expose(), "from-file");
        assert!(no_file.is_none());
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = Secret::from_env_or_file(
            "COMMON_TEST_SECRET_MISSING",
            Some(Path::new("/nonexistent/secret")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("/nonexistent/secret"));
    }

    #[test]
    fn no_env_and_no_file_is_none() {
        assert!(
            Secret::from_env_or_file("COMMON_TEST_SECRET_ABSENT", None)
                .unwrap()
                .is_none()
        );
    }
}
