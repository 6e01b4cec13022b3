//! [`ObjectStore`] backed by Cloudflare R2 through the AWS S3 SDK.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use site_sync_models::{ObjectMetadata, RemoteObject};

use crate::{ListPage, ObjectStore, R2Config, R2Error};

/// S3 client bound to one R2 bucket.
pub struct R2Client {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl R2Client {
    #[must_use]
    pub fn new(config: &R2Config) -> Self {
        Self::with_endpoint(config, config.endpoint())
    }

    /// Builds a client against an explicit endpoint URL.
    ///
    /// SDK retries are disabled: every request the SDK sends must be one
    /// call that [`crate::Remote`] charged.
    fn with_endpoint(config: &R2Config, endpoint: String) -> Self {
        let creds = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2-site-sync",
        );

        let sdk_config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new("auto"))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, continuation_token: Option<String>) -> Result<ListPage, R2Error> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| R2Error::List {
                bucket: self.bucket.clone(),
                source: Box::new(e),
            })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                #[allow(clippy::cast_sign_loss)] // S3 sizes are non-negative
                let size = obj.size().unwrap_or(0).max(0) as u64;
                Some(RemoteObject {
                    key: key.to_string(),
                    size,
                })
            })
            .collect();

        Ok(ListPage {
            objects,
            truncated: output.is_truncated() == Some(true),
            continuation_token: output.next_continuation_token().map(String::from),
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, R2Error> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                #[allow(clippy::cast_sign_loss)] // S3 content-length is non-negative
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let metadata = output.metadata().map_or(
                    ObjectMetadata {
                        size,
                        content_hash: None,
                    },
                    |map| ObjectMetadata::from_map(size, map),
                );
                Ok(Some(metadata))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    return Ok(None);
                }
                Err(R2Error::Head {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<(), R2Error> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type(key))
            .set_metadata(Some(metadata.to_map()))
            .send()
            .await
            .map_err(|e| R2Error::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), R2Error> {
        let delete_err = |source: Box<dyn std::error::Error + Send + Sync>| R2Error::Delete {
            bucket: self.bucket.clone(),
            count: keys.len(),
            source,
        };

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| delete_err(Box::new(e)))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| delete_err(Box::new(e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| delete_err(Box::new(e)))?;

        let rejected: Vec<String> = output
            .errors()
            .iter()
            .map(|e| {
                log::warn!(
                    "  failed to delete {}: {}",
                    e.key().unwrap_or("<unknown>"),
                    e.message().unwrap_or("unknown error")
                );
                e.key().unwrap_or("<unknown>").to_string()
            })
            .collect();

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(R2Error::DeletePartial {
                bucket: self.bucket.clone(),
                keys: rejected,
            })
        }
    }
}

/// `Content-Type` for a site file, by extension.
fn content_type(key: &str) -> String {
    mime_guess::from_path(key).first_or_octet_stream().to_string()
}
