//! R2 connection settings from the environment or a secrets directory.

use std::path::Path;

use crate::R2Error;

/// Connection settings for one R2 bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// (environment variable, secrets file) pairs, in field order.
const ACCOUNT_ID: (&str, &str) = ("CLOUDFLARE_ACCOUNT_ID", "account_id");
const ACCESS_KEY_ID: (&str, &str) = ("R2_ACCESS_KEY_ID", "access_key_id");
const SECRET_ACCESS_KEY: (&str, &str) = ("R2_SECRET_ACCESS_KEY", "access_key");

impl R2Config {
    /// Reads credentials from the process environment, falling back to
    /// files in `secrets_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::MissingCredential`] if a value is found in
    /// neither place.
    pub fn from_env(bucket: &str, secrets_dir: &Path) -> Result<Self, R2Error> {
        Self::resolve(|name| std::env::var(name).ok(), bucket, secrets_dir)
    }

    /// Resolves credentials through `lookup` (an environment), falling
    /// back to one trimmed file per value in `secrets_dir`. Blank values
    /// count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::MissingCredential`] if a value is found in
    /// neither place.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        bucket: &str,
        secrets_dir: &Path,
    ) -> Result<Self, R2Error> {
        let get = |(env, file): (&str, &str)| {
            lookup(env)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| read_secret(&secrets_dir.join(file)))
                .ok_or_else(|| R2Error::MissingCredential {
                    env: env.to_string(),
                    file: secrets_dir.join(file).display().to_string(),
                })
        };

        Ok(Self {
            account_id: get(ACCOUNT_ID)?,
            access_key_id: get(ACCESS_KEY_ID)?,
            secret_access_key: get(SECRET_ACCESS_KEY)?,
            bucket: bucket.to_string(),
        })
    }

    /// S3-compatible endpoint for the account.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

fn read_secret(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn environment_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("account_id"), "from-file").unwrap();

        let config = R2Config::resolve(
            env(&[
                ("CLOUDFLARE_ACCOUNT_ID", "acct"),
                ("R2_ACCESS_KEY_ID", "key"),
                ("R2_SECRET_ACCESS_KEY", "secret"),
            ]),
            "www",
            dir.path(),
        )
        .unwrap();

        assert_eq!(config.account_id, "acct");
        assert_eq!(config.bucket, "www");
        assert_eq!(config.endpoint(), "https://acct.r2.cloudflarestorage.com");
    }

    #[test]
    fn falls_back_to_trimmed_secret_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("account_id"), "acct\n").unwrap();
        std::fs::write(dir.path().join("access_key_id"), "  key ").unwrap();
        std::fs::write(dir.path().join("access_key"), "secret\n").unwrap();

        let config = R2Config::resolve(env(&[("R2_ACCESS_KEY_ID", "")]), "www", dir.path()).unwrap();

        assert_eq!(config.account_id, "acct");
        assert_eq!(config.access_key_id, "key");
        assert_eq!(config.secret_access_key, "secret");
    }

    #[test]
    fn reports_first_missing_credential() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("account_id"), "acct").unwrap();

        let err = R2Config::resolve(env(&[]), "www", dir.path()).unwrap_err();

        match err {
            R2Error::MissingCredential { env, file } => {
                assert_eq!(env, "R2_ACCESS_KEY_ID");
                assert!(file.ends_with("access_key_id"), "{file}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = R2Config {
            account_id: "acct".into(),
            access_key_id: "key".into(),
            secret_access_key: "hunter2".into(),
            bucket: "www".into(),
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
