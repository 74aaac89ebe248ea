//! AWS SDK S3 implementation of the object store port.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

use deltaglider_common::{DeltaGliderConfig, BODY_OP_TIMEOUT_SECS, METADATA_OP_TIMEOUT_SECS};
use deltaglider_core::{
    ObjectInfo, ObjectMeta, ObjectPage, ObjectStore, PutReceipt, StoreError,
};

use crate::error::map_sdk_error;
use crate::retry::RetryPolicy;

/// `ObjectStore` implementation using the AWS SDK for Rust.
///
/// Works against AWS S3 and any S3-compatible endpoint (MinIO, R2); when an
/// endpoint override is configured, path-style addressing is enabled.
pub struct S3ObjectStore {
    /// The underlying S3 client.
    client: S3Client,
    /// Backoff policy for transient failures.
    retry: RetryPolicy,
}

impl S3ObjectStore {
    /// Create a store from the default credential chain plus config overrides.
    ///
    /// # Arguments
    /// * `config` - Endpoint/region overrides (`AWS_ENDPOINT_URL`,
    ///   `AWS_DEFAULT_REGION` when built via `DeltaGliderConfig::from_env`)
    pub async fn from_env(config: &DeltaGliderConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(ref region) = config.region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = config.endpoint_url {
            // Path-style addressing: MinIO and most self-hosted endpoints
            // do not resolve virtual-hosted bucket names.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
            retry: RetryPolicy::default(),
        }
    }

    /// Create a store from an existing S3 client (for testing).
    pub fn from_client(client: S3Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn metadata_deadline() -> Duration {
        Duration::from_secs(METADATA_OP_TIMEOUT_SECS)
    }

    fn body_deadline() -> Duration {
        Duration::from_secs(BODY_OP_TIMEOUT_SECS)
    }
}

/// Run a future under a deadline, mapping expiry to a transient error.
async fn with_deadline<T>(
    op_name: &str,
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Transient {
            message: format!("{op_name}: deadline of {}s exceeded", deadline.as_secs()),
            attempts: 1,
        }),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, StoreError> {
        self.retry
            .run("head_object", || async {
                with_deadline("head_object", Self::metadata_deadline(), async {
                    let result = self
                        .client
                        .head_object()
                        .bucket(bucket)
                        .key(key)
                        .send()
                        .await;

                    match result {
                        Ok(output) => {
                            let user_metadata: HashMap<String, String> = output
                                .metadata()
                                .map(|m| {
                                    m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                                })
                                .unwrap_or_default();
                            let last_modified: Option<i64> = output
                                .last_modified()
                                .and_then(|dt| dt.to_millis().ok())
                                .map(|ms| ms / 1000);

                            Ok(Some(ObjectMeta {
                                size: output.content_length().map(|l| l as u64).unwrap_or(0),
                                etag: output.e_tag().map(|s| s.to_string()),
                                last_modified,
                                user_metadata,
                            }))
                        }
                        Err(err) => {
                            if let SdkError::ServiceError(ref ctx) = err {
                                if ctx.err().is_not_found() {
                                    return Ok(None);
                                }
                            }
                            Err(map_sdk_error(bucket, key, err))
                        }
                    }
                })
                .await
            })
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.retry
            .run("get_object", || async {
                with_deadline("get_object", Self::body_deadline(), async {
                    let response = self
                        .client
                        .get_object()
                        .bucket(bucket)
                        .key(key)
                        .send()
                        .await
                        .map_err(|err| map_sdk_error(bucket, key, err))?;

                    let data: Vec<u8> = response
                        .body
                        .collect()
                        .await
                        .map_err(|e| StoreError::Transient {
                            message: e.to_string(),
                            attempts: 1,
                        })?
                        .into_bytes()
                        .to_vec();

                    Ok(data)
                })
                .await
            })
            .await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &HashMap<String, String>,
    ) -> Result<PutReceipt, StoreError> {
        self.retry
            .run("put_object", || async {
                with_deadline("put_object", Self::body_deadline(), async {
                    let mut request = self
                        .client
                        .put_object()
                        .bucket(bucket)
                        .key(key)
                        .body(ByteStream::from(body.to_vec()));
                    for (k, v) in metadata {
                        request = request.metadata(k, v);
                    }

                    let output = request
                        .send()
                        .await
                        .map_err(|err| map_sdk_error(bucket, key, err))?;

                    Ok(PutReceipt {
                        etag: output.e_tag().map(|s| s.to_string()),
                        version_id: output.version_id().map(|s| s.to_string()),
                    })
                })
                .await
            })
            .await
    }

    async fn put_object_if_absent(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &HashMap<String, String>,
    ) -> Result<bool, StoreError> {
        self.retry
            .run("put_object_if_absent", || async {
                with_deadline("put_object_if_absent", Self::body_deadline(), async {
                    let mut request = self
                        .client
                        .put_object()
                        .bucket(bucket)
                        .key(key)
                        .if_none_match("*")
                        .body(ByteStream::from(body.to_vec()));
                    for (k, v) in metadata {
                        request = request.metadata(k, v);
                    }

                    match request.send().await {
                        Ok(_) => Ok(true),
                        Err(err) => {
                            if let SdkError::ServiceError(ref ctx) = err {
                                let status: u16 = ctx.raw().status().as_u16();
                                // 412: the key already exists, the other
                                // writer won. 409: a concurrent conditional
                                // write is in flight; retried.
                                if status == 412 {
                                    debug!(bucket, key, "conditional create lost the race");
                                    return Ok(false);
                                }
                                if status == 409 {
                                    return Err(StoreError::Transient {
                                        message: "conditional write conflict".to_string(),
                                        attempts: 1,
                                    });
                                }
                            }
                            Err(map_sdk_error(bucket, key, err))
                        }
                    }
                })
                .await
            })
            .await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, StoreError> {
        self.retry
            .run("list_objects", || async {
                with_deadline("list_objects", Self::metadata_deadline(), async {
                    let mut request = self
                        .client
                        .list_objects_v2()
                        .bucket(bucket)
                        .prefix(prefix)
                        .max_keys(max_keys as i32);
                    if let Some(after) = start_after {
                        request = request.start_after(after);
                    }

                    let response = request
                        .send()
                        .await
                        .map_err(|err| map_sdk_error(bucket, prefix, err))?;

                    let objects: Vec<ObjectInfo> = response
                        .contents()
                        .iter()
                        .map(|obj| ObjectInfo {
                            key: obj.key().unwrap_or_default().to_string(),
                            size: obj.size().map(|s| s as u64).unwrap_or(0),
                            last_modified: obj
                                .last_modified()
                                .and_then(|dt| dt.to_millis().ok())
                                .map(|ms| ms / 1000),
                            etag: obj.e_tag().map(|s| s.to_string()),
                        })
                        .collect();

                    let is_truncated: bool = response.is_truncated() == Some(true);
                    let next_start_after: Option<String> = if is_truncated {
                        objects.last().map(|info| info.key.clone())
                    } else {
                        None
                    };

                    Ok(ObjectPage {
                        objects,
                        is_truncated,
                        next_start_after,
                    })
                })
                .await
            })
            .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.retry
            .run("delete_object", || async {
                with_deadline("delete_object", Self::metadata_deadline(), async {
                    self.client
                        .delete_object()
                        .bucket(bucket)
                        .key(key)
                        .send()
                        .await
                        .map_err(|err| map_sdk_error(bucket, key, err))?;
                    Ok(())
                })
                .await
            })
            .await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), StoreError> {
        self.retry
            .run("copy_object", || async {
                with_deadline("copy_object", Self::body_deadline(), async {
                    self.client
                        .copy_object()
                        .copy_source(format!("{src_bucket}/{src_key}"))
                        .bucket(dst_bucket)
                        .key(dst_key)
                        .send()
                        .await
                        .map_err(|err| map_sdk_error(src_bucket, src_key, err))?;
                    Ok(())
                })
                .await
            })
            .await
    }
}
