// src/store/s3.rs

//! Live S3 backend
//!
//! Every construction resolves credentials from scratch: with a role ARN
//! configured it performs an STS AssumeRole exchange (session `taxi`, 20
//! minutes, tagged `client=TAXI`), otherwise it uses the base credentials.
//! Nothing is cached between constructions, so callers build a fresh backend
//! per operation. Requests use path-style addressing.

use super::{ObjectBackend, ObjectInfo};
use crate::config::S3Section;
use crate::error::{Error, Result};
use aws_config::BehaviorVersion;
use aws_sdk_sts::types::Tag;
use chrono::{DateTime, Utc};
use ::s3::bucket::Bucket;
use ::s3::creds::Credentials;
use ::s3::region::Region;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// STS session name
pub const ROLE_SESSION_NAME: &str = "taxi";

/// Lifetime of assumed-role credentials in seconds
pub const ROLE_DURATION_SECS: i32 = 1200;

fn s3_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::s3(format!("{}: {}", context, e))
}

/// A bucket-agnostic S3 client with resolved credentials
pub struct S3Backend {
    runtime: Runtime,
    region: Region,
    credentials: Credentials,
}

impl S3Backend {
    /// Resolve credentials and region for a new client
    pub fn connect(settings: &S3Section) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let credentials = match &settings.role_arn {
            Some(role) => runtime.block_on(assume_role(settings, role))?,
            None => base_credentials(settings)?,
        };

        let region = match &settings.endpoint {
            Some(endpoint) => Region::Custom {
                region: settings.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => settings.region.parse().map_err(|e| {
                Error::ConfigError(format!("invalid AWS region {}: {}", settings.region, e))
            })?,
        };

        Ok(Self {
            runtime,
            region,
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| s3_err(name, e))?;
        Ok(bucket.with_path_style())
    }
}

fn base_credentials(settings: &S3Section) -> Result<Credentials> {
    Credentials::new(
        settings.access_key_id.as_deref(),
        settings.secret_access_key.as_deref(),
        None,
        None,
        None,
    )
    .map_err(|e| Error::ConfigError(format!("no usable AWS credentials: {}", e)))
}

async fn assume_role(settings: &S3Section, role: &str) -> Result<Credentials> {
    info!("Assuming role {}", role);
    let loader = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_sdk_sts::config::Region::new(settings.region.clone()));
    let loader = match (&settings.access_key_id, &settings.secret_access_key) {
        (Some(key), Some(secret)) => loader.credentials_provider(
            aws_sdk_sts::config::Credentials::new(key, secret, None, None, "taxi"),
        ),
        _ => loader,
    };
    let sdk_config = loader.load().await;
    let sts = aws_sdk_sts::Client::new(&sdk_config);

    let tag = Tag::builder()
        .key("client")
        .value("TAXI")
        .build()
        .map_err(|e| s3_err("session tag", e))?;
    let output = sts
        .assume_role()
        .role_arn(role)
        .role_session_name(ROLE_SESSION_NAME)
        .duration_seconds(ROLE_DURATION_SECS)
        .tags(tag)
        .send()
        .await
        .map_err(|e| s3_err(&format!("assume role {}", role), e.into_service_error()))?;

    let assumed = output
        .credentials()
        .ok_or_else(|| Error::s3(format!("assume role {} returned no credentials", role)))?;
    debug!("Assumed role {} until {}", role, assumed.expiration());
    Credentials::new(
        Some(assumed.access_key_id()),
        Some(assumed.secret_access_key()),
        Some(assumed.session_token()),
        Some(assumed.session_token()),
        None,
    )
    .map_err(|e| s3_err("assumed credentials", e))
}

fn check_status(code: u16, bucket: &str, key: &str) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        404 => Err(Error::NotFound(format!("s3://{}/{}", bucket, key))),
        code => Err(Error::s3(format!("s3://{}/{}: HTTP {}", bucket, key, code))),
    }
}

impl ObjectBackend for S3Backend {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let handle = self.bucket(bucket)?;
        let pages = self
            .runtime
            .block_on(handle.list(prefix.to_string(), None))
            .map_err(|e| s3_err(&format!("list s3://{}/{}", bucket, prefix), e))?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| ObjectInfo {
                last_modified: DateTime::parse_from_rfc3339(&object.last_modified)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
                key: object.key,
                size: object.size,
            })
            .collect())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let handle = self.bucket(bucket)?;
        let response = self
            .runtime
            .block_on(handle.get_object(key))
            .map_err(|e| s3_err(&format!("get s3://{}/{}", bucket, key), e))?;
        check_status(response.status_code(), bucket, key)?;
        Ok(response.bytes().to_vec())
    }

    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let handle = self.bucket(bucket)?;
        let response = self
            .runtime
            .block_on(handle.put_object(key, data))
            .map_err(|e| s3_err(&format!("put s3://{}/{}", bucket, key), e))?;
        check_status(response.status_code(), bucket, key)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let handle = self.bucket(bucket)?;
        let response = self
            .runtime
            .block_on(handle.delete_object(key))
            .map_err(|e| s3_err(&format!("delete s3://{}/{}", bucket, key), e))?;
        match response.status_code() {
            404 => Ok(()),
            code => check_status(code, bucket, key),
        }
    }
}
