//! S3 Object Store Implementation
//!
//! Backs a queue or processed bucket with S3 through the `object_store` crate
//! from the Arrow ecosystem.
//!
//! Supports:
//! - AWS S3
//! - S3-compatible services (MinIO, LocalStack, etc.) via a custom endpoint
//! - Canned ACLs (`x-amz-acl`) from the configured access policy
//! - Presigned URLs for private objects

use crate::store::{AccessPolicy, ListResult, ObjectMeta, ObjectStore, PutOptions, UrlOptions};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ClientOptions, ObjectStore as ObjectStoreTrait};
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// S3 page size for `list`
const PAGE_SIZE: usize = 1000;

/// Longest validity S3 accepts for a presigned URL (7 days)
pub const PRESIGNED_URL_MAX: Duration = Duration::from_secs(7 * 24 * 3600);

/// Connection settings for one bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
    /// Access key; falls back to AWS_ACCESS_KEY_ID
    pub access_key_id: Option<String>,
    /// Secret key; falls back to AWS_SECRET_ACCESS_KEY
    pub secret_access_key: Option<String>,
    /// Canned ACL sent with every write. It is fixed per client, so a put
    /// asking for a different policy is rejected rather than stored with
    /// the wrong ACL.
    pub access_policy: AccessPolicy,
}

/// S3 Object Store for production deployments
#[derive(Clone)]
pub struct S3ObjectStore {
    store: Arc<AmazonS3>,
    bucket: String,
    endpoint: Option<String>,
    access_policy: AccessPolicy,
}

impl S3ObjectStore {
    /// Create a new S3 object store for one bucket
    pub fn new(config: S3Config) -> IoResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        // Use custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let access_key_id = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .unwrap_or_default();
        let secret_access_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .unwrap_or_default();
        builder = builder
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key);

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-amz-acl"),
            HeaderValue::from_static(config.access_policy.as_str()),
        );
        builder = builder.with_client_options(ClientOptions::new().with_default_headers(headers));

        let store = builder.build().map_err(|e| {
            IoError::new(
                ErrorKind::InvalidInput,
                format!("Failed to create S3 store: {}", e),
            )
        })?;

        Ok(S3ObjectStore {
            store: Arc::new(store),
            bucket: config.bucket,
            endpoint: config.endpoint,
            access_policy: config.access_policy,
        })
    }

    /// Plain (unsigned) URL for a public object
    fn public_url(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }

    /// Convert object_store errors to IoError
    fn map_error(err: object_store::Error) -> IoError {
        match &err {
            object_store::Error::NotFound { .. } => {
                IoError::new(ErrorKind::NotFound, err.to_string())
            }
            object_store::Error::AlreadyExists { .. } => {
                IoError::new(ErrorKind::AlreadyExists, err.to_string())
            }
            object_store::Error::Precondition { .. } => {
                IoError::new(ErrorKind::InvalidInput, err.to_string())
            }
            _ => IoError::new(ErrorKind::Other, err.to_string()),
        }
    }

    fn to_meta(&self, meta: object_store::ObjectMeta) -> ObjectMeta {
        ObjectMeta {
            key: meta.location.to_string(),
            size_bytes: meta.size as u64,
            created_at_ms: meta
                .last_modified
                .timestamp_millis()
                .try_into()
                .unwrap_or(0),
            etag: meta.e_tag,
        }
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ObjectStore for S3ObjectStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        // The canned ACL travels as a default header set at construction
        Box::pin(async move {
            if options.access != self.access_policy {
                return Err(IoError::new(
                    ErrorKind::InvalidInput,
                    format!(
                        "bucket '{}' writes with ACL '{}', cannot store '{}' as '{}'",
                        self.bucket,
                        self.access_policy.as_str(),
                        key,
                        options.access.as_str()
                    ),
                ));
            }
            let path = ObjectPath::from(key);
            self.store
                .put(&path, bytes::Bytes::copy_from_slice(data).into())
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let path = ObjectPath::from(key);
            let result = self.store.get(&path).await.map_err(Self::map_error)?;
            let data = result.bytes().await.map_err(Self::map_error)?;
            Ok(data.to_vec())
        })
    }

    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<bool>> + Send + 'a>> {
        Box::pin(async move {
            let path = ObjectPath::from(key);
            match self.store.head(&path).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = ObjectPath::from(key);
            // S3 delete is idempotent - ignore not found errors
            match self.store.delete(&path).await {
                Ok(()) => Ok(()),
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = IoResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            use futures::TryStreamExt;

            let prefix_path = ObjectPath::from(prefix);
            let prefix_arg = if prefix.trim_matches('/').is_empty() {
                None
            } else {
                Some(&prefix_path)
            };

            // Parse offset from continuation token
            let offset: usize = continuation_token
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);

            let mut all_objects: Vec<_> = self
                .store
                .list(prefix_arg)
                .try_collect()
                .await
                .map_err(Self::map_error)?;
            all_objects.sort_by(|a, b| a.location.cmp(&b.location));

            let has_more = all_objects.len() > offset + PAGE_SIZE;
            let objects = all_objects
                .into_iter()
                .skip(offset)
                .take(PAGE_SIZE)
                .map(|meta| self.to_meta(meta))
                .collect();

            Ok(ListResult {
                objects,
                continuation_token: has_more.then(|| (offset + PAGE_SIZE).to_string()),
            })
        })
    }

    fn rename<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let from_path = ObjectPath::from(from);
            let to_path = ObjectPath::from(to);

            // object_store implements rename as copy+delete; not atomic
            self.store
                .rename(&from_path, &to_path)
                .await
                .map_err(Self::map_error)?;

            Ok(())
        })
    }

    fn head<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            let path = ObjectPath::from(key);
            let meta = self.store.head(&path).await.map_err(Self::map_error)?;
            Ok(self.to_meta(meta))
        })
    }

    fn url_for<'a>(
        &'a self,
        key: &'a str,
        options: UrlOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<String>> + Send + 'a>> {
        Box::pin(async move {
            // Private objects are unreachable without a signature
            let expires_in = match options.expires_in {
                Some(expires_in) => Some(expires_in),
                None if !self.access_policy.is_public() => Some(PRESIGNED_URL_MAX),
                None => None,
            };
            match expires_in {
                None => Ok(self.public_url(key)),
                Some(expires_in) => {
                    let path = ObjectPath::from(key);
                    let url = self
                        .store
                        .signed_url(http::Method::GET, &path, expires_in.min(PRESIGNED_URL_MAX))
                        .await
                        .map_err(Self::map_error)?;
                    Ok(url.to_string())
                }
            }
        })
    }
}
