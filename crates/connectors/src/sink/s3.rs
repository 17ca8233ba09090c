use crate::{error::SinkError, sink::SinkWriter};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region, http::HttpResponse},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
};
use bytes::Bytes;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Writes blobs as objects of a single S3 (or S3 compatible) bucket.
pub struct S3Sink {
    client: Client,
    bucket: String,
}

impl S3Sink {
    pub async fn new(config: S3Config) -> Result<Self, SinkError> {
        if config.bucket.trim().is_empty() {
            return Err(SinkError::Config("S3 bucket must not be empty".to_string()));
        }

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(
                    access_key, secret_key, None, None, "doc2blob",
                ))
                .region(Region::new(
                    config.region.clone().unwrap_or_else(|| "us-east-1".to_string()),
                )),
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                let mut builder = aws_sdk_s3::config::Builder::from(&shared);
                if let Some(region) = &config.region {
                    builder = builder.region(Region::new(region.clone()));
                }
                builder
            }
            _ => {
                return Err(SinkError::Config(
                    "S3 access key and secret key must be set together".to_string(),
                ));
            }
        };

        builder = builder.force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!(bucket = %config.bucket, "S3 sink initialized");

        Ok(S3Sink {
            client,
            bucket: config.bucket,
        })
    }
}

#[async_trait]
impl SinkWriter for S3Sink {
    fn name(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn ping(&self) -> Result<(), SinkError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("head_bucket", e))?;
        Ok(())
    }

    async fn exists(&self, blob: &str) -> Result<bool, SinkError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(blob)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(map_sdk_error("head_object", err)),
        }
    }

    async fn write(&self, blob: &str, data: Bytes) -> Result<(), SinkError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(blob)
            .content_type(content_type_for(blob))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object", e))?;

        debug!(bucket = %self.bucket, blob, size, "Uploaded object");
        Ok(())
    }
}

fn content_type_for(blob: &str) -> &'static str {
    if blob.ends_with(".parquet") {
        "application/vnd.apache.parquet"
    } else if blob.ends_with(".gz") {
        "application/gzip"
    } else {
        "application/x-ndjson"
    }
}

/// Timeouts and dispatch failures never reached the service; everything
/// else carries the HTTP status when one was received.
fn map_sdk_error<E>(op: &str, err: SdkError<E, HttpResponse>) -> SinkError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("{op}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) => SinkError::Timeout(message),
        SdkError::DispatchFailure(_) => SinkError::Dispatch(message),
        _ => SinkError::Service {
            status: err.raw_response().map(|r| r.status().as_u16()),
            message,
        },
    }
}
