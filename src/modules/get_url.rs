//! Get URL module - download a file over HTTP(S).
//!
//! Downloads a URL to a destination path, skipping the transfer when the
//! destination already matches the expected checksum, and verifying the
//! downloaded content before it replaces the destination.

use serde::Deserialize;
use std::any::Any;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::result::{CommonResult, FileResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

use super::{apply_file_attrs, atomic_write, de_opt_scalar, sha256_bytes, sha256_file};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Parameters of the get_url module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GetUrlTask {
    /// URL to download.
    pub url: String,
    /// Destination path.
    pub dest: String,
    /// Expected checksum, in `sha256:<hex>` form.
    pub checksum: Option<String>,
    /// Re-download even when the destination exists.
    pub force: bool,
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
    /// Permission bits as an octal string.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub mode: Option<String>,
}

impl GetUrlTask {
    /// The expected sha256 hex digest, when a checksum parameter is given.
    fn expected_sha256(&self) -> Result<Option<String>> {
        match &self.checksum {
            None => Ok(None),
            Some(spec) => match spec.split_once(':') {
                Some(("sha256", hex)) => Ok(Some(hex.to_ascii_lowercase())),
                _ => Err(Error::invalid_parameter(
                    "get_url",
                    format!("unsupported checksum '{spec}'; expected 'sha256:<hex>'"),
                )),
            },
        }
    }

    fn result(&self, common: CommonResult, checksum: Option<String>, status: Option<u16>) -> FileResult {
        let mut result = FileResult::new(common).with_dest(&self.dest);
        result.checksum = checksum;
        result.status_code = status;
        result.mode = self.mode.clone();
        result
    }
}

impl Templatable for GetUrlTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::Scalar(&mut self.url),
            FieldMut::Scalar(&mut self.dest),
            FieldMut::OptScalar(&mut self.checksum),
            FieldMut::OptScalar(&mut self.mode),
        ]
    }
}

impl TaskContent for GetUrlTask {
    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::MissingParameter {
                module: "get_url",
                parameter: "url",
            });
        }
        if self.dest.is_empty() {
            return Err(Error::MissingParameter {
                module: "get_url",
                parameter: "dest",
            });
        }
        url::Url::parse(&self.url)
            .map_err(|e| Error::invalid_parameter("get_url", format!("invalid url: {e}")))?;
        self.expected_sha256()?;
        Ok(())
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        let expected = self.expected_sha256()?;
        let dest = Path::new(&self.dest);

        // An existing destination that already matches the expected
        // checksum satisfies the task without a transfer.
        if !self.force && dest.exists() {
            if let (Some(expected), Ok(existing)) = (&expected, sha256_file(dest)) {
                if *expected == existing {
                    return Ok(Box::new(self.result(
                        CommonResult::ok("destination checksum already matches"),
                        Some(existing),
                        None,
                    )));
                }
            } else if expected.is_none() {
                return Ok(Box::new(self.result(
                    CommonResult::ok("destination already exists"),
                    sha256_file(dest).ok(),
                    None,
                )));
            }
        }

        if ctx.check_mode {
            return Ok(Box::new(self.result(
                CommonResult::changed(format!("would download {}", self.url)),
                None,
                None,
            )));
        }

        let timeout = Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        let response = client.get(&self.url).send()?;
        let status = response.status();

        if !status.is_success() {
            return Ok(Box::new(self.result(
                CommonResult::failed(format!("request failed with status {status}")),
                None,
                Some(status.as_u16()),
            )));
        }

        let bytes = response.bytes()?;
        let actual = sha256_bytes(&bytes);
        if let Some(expected) = &expected {
            if *expected != actual {
                return Ok(Box::new(self.result(
                    CommonResult::failed(format!(
                        "checksum mismatch: expected sha256:{expected}, got sha256:{actual}"
                    )),
                    Some(actual),
                    Some(status.as_u16()),
                )));
            }
        }

        atomic_write(dest, &bytes)?;
        apply_file_attrs("get_url", dest, self.mode.as_deref(), None, None)?;

        Ok(Box::new(self.result(
            CommonResult::changed(format!("downloaded {}", self.url)),
            Some(actual),
            Some(status.as_u16()),
        )))
    }

    fn clone_content(&self) -> Box<dyn TaskContent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate() {
        assert!(GetUrlTask::default().validate().is_err());

        let task = GetUrlTask {
            url: "not a url".to_string(),
            dest: "/tmp/x".to_string(),
            ..Default::default()
        };
        assert!(task.validate().is_err());

        let task = GetUrlTask {
            url: "https://example.com/f.tar.gz".to_string(),
            dest: "/tmp/f.tar.gz".to_string(),
            checksum: Some("md5:abcd".to_string()),
            ..Default::default()
        };
        assert!(task.validate().is_err());

        let task = GetUrlTask {
            url: "https://example.com/f.tar.gz".to_string(),
            dest: "/tmp/f.tar.gz".to_string(),
            checksum: Some("sha256:abcd".to_string()),
            ..Default::default()
        };
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_matching_checksum_skips_download() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("existing");
        std::fs::write(&dest, b"payload").unwrap();
        let digest = sha256_bytes(b"payload");

        let task = GetUrlTask {
            // Unreachable on purpose: the checksum short-circuit must win
            url: "http://127.0.0.1:1/unreachable".to_string(),
            dest: dest.display().to_string(),
            checksum: Some(format!("sha256:{digest}")),
            ..Default::default()
        };
        let result = task.apply(&Scope::new(), &ExecutionContext::new()).unwrap();
        assert!(!result.is_changed());
        assert!(!result.is_failed());
    }

    #[test]
    fn test_existing_dest_without_checksum_is_satisfied() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("existing");
        std::fs::write(&dest, b"payload").unwrap();

        let task = GetUrlTask {
            url: "http://127.0.0.1:1/unreachable".to_string(),
            dest: dest.display().to_string(),
            ..Default::default()
        };
        let result = task.apply(&Scope::new(), &ExecutionContext::new()).unwrap();
        assert!(!result.is_changed());
    }
}
