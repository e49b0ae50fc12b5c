//! Amazon S3 backend.
//!
//! The SDK is async; the index protocol is a blocking loop in a short-lived
//! CLI process, so each store owns a current-thread runtime and blocks on
//! every request.

use std::fmt;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Tag, Tagging};
use aws_sdk_s3::Client;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::{ObjectStore, StoreError, StoreResult};

pub struct S3Store {
    client: Client,
    runtime: Runtime,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store").finish_non_exhaustive()
    }
}

pub(crate) fn blocking_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the AWS runtime")
}

pub(crate) fn load_sdk_config(runtime: &Runtime) -> SdkConfig {
    runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()))
}

impl S3Store {
    /// Connects with the default credential chain. `endpoint` points the
    /// client at an S3-compatible service and switches to path-style URLs.
    pub fn connect(endpoint: Option<&str>) -> Result<Self> {
        let runtime = blocking_runtime()?;
        let sdk_config = load_sdk_config(&runtime);
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
        })
    }

    fn current_tagging(&self, bucket: &str, key: &str) -> StoreResult<Option<String>> {
        let response = self.runtime.block_on(
            self.client
                .get_object_tagging()
                .bucket(bucket)
                .key(key)
                .send(),
        );
        match response {
            Ok(output) if output.tag_set().is_empty() => Ok(None),
            Ok(output) => Ok(Some(encode_tags(
                output.tag_set().iter().map(|tag| (tag.key(), tag.value())),
            ))),
            Err(err) => match classify(&err, bucket, key) {
                absent if absent.is_absent() => Ok(None),
                other => Err(other),
            },
        }
    }
}

fn encode_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(tags)
        .finish()
}

fn classify<E>(err: &SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let code = err.as_service_error().and_then(ProvideErrorMetadata::code);
    match (code, status) {
        (Some("NoSuchKey" | "NotFound"), _) | (None, Some(404)) => {
            StoreError::not_found(bucket, key)
        }
        (Some("MethodNotAllowed"), _) | (None, Some(405)) => StoreError::MethodNotAllowed {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::backend(bucket, key, DisplayErrorContext(err).to_string()),
    }
}

impl ObjectStore for S3Store {
    fn get_tag(&self, bucket: &str, key: &str, tag: &str) -> StoreResult<Option<String>> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .get_object_tagging()
                    .bucket(bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|err| classify(&err, bucket, key))?;
        Ok(output
            .tag_set()
            .iter()
            .find(|candidate| candidate.key() == tag)
            .map(|found| found.value().to_string()))
    }

    fn put_tag(&self, bucket: &str, key: &str, tag: &str, value: &str) -> StoreResult<()> {
        let tag = Tag::builder()
            .key(tag)
            .value(value)
            .build()
            .map_err(|err| StoreError::backend(bucket, key, err.to_string()))?;
        let tagging = Tagging::builder()
            .tag_set(tag)
            .build()
            .map_err(|err| StoreError::backend(bucket, key, err.to_string()))?;
        self.runtime
            .block_on(
                self.client
                    .put_object_tagging()
                    .bucket(bucket)
                    .key(key)
                    .tagging(tagging)
                    .send(),
            )
            .map_err(|err| classify(&err, bucket, key))?;
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let output = self
            .runtime
            .block_on(self.client.get_object().bucket(bucket).key(key).send())
            .map_err(|err| classify(&err, bucket, key))?;
        let body = self
            .runtime
            .block_on(output.body.collect())
            .map_err(|err| StoreError::backend(bucket, key, format!("failed to read body: {err}")))?;
        Ok(body.into_bytes().to_vec())
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        initial_tags: &[(&str, &str)],
    ) -> StoreResult<()> {
        // S3 replaces the tag set on every PUT, so carry existing tags over.
        let tagging = if initial_tags.is_empty() {
            self.current_tagging(bucket, key)?
        } else {
            Some(encode_tags(initial_tags.iter().copied()))
        };
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()));
        if let Some(tagging) = tagging {
            request = request.tagging(tagging);
        }
        self.runtime
            .block_on(request.send())
            .map_err(|err| classify(&err, bucket, key))?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(bucket)
                        .prefix(prefix)
                        .set_continuation_token(token.take())
                        .send(),
                )
                .map_err(|err| classify(&err, bucket, prefix))?;
            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_owned)),
            );
            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let versions = self
            .runtime
            .block_on(
                self.client
                    .list_object_versions()
                    .bucket(bucket)
                    .prefix(key)
                    .send(),
            )
            .map_err(|err| classify(&err, bucket, key))?;
        for version in versions.versions() {
            if version.key() != Some(key) {
                continue;
            }
            let Some(version_id) = version.version_id() else {
                continue;
            };
            debug!(bucket, key, version_id, "deleting object version");
            self.runtime
                .block_on(
                    self.client
                        .delete_object()
                        .bucket(bucket)
                        .key(key)
                        .version_id(version_id)
                        .send(),
                )
                .map_err(|err| classify(&err, bucket, key))?;
        }
        self.runtime
            .block_on(self.client.delete_object().bucket(bucket).key(key).send())
            .map_err(|err| classify(&err, bucket, key))?;
        Ok(())
    }

    fn describe(&self) -> String {
        "s3://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_form_encoded() {
        assert_eq!(encode_tags([("Lock", "True")].into_iter()), "Lock=True");
        assert_eq!(
            encode_tags([("Lock", "False"), ("owner", "ci runner")].into_iter()),
            "Lock=False&owner=ci+runner"
        );
    }
}
