//! Object-storage plumbing.
//!
//! The GCS-backed artifact store sits behind the `ObjectStore` seam so tests
//! run against `object_store::memory::InMemory`.
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload};

pub type DynStore = Arc<dyn ObjectStore>;

/// GCS client for the configured bucket, authenticated with the
/// service-account JSON the deployment mounts.
pub fn gcs_store(bucket: &str, credentials_path: &str) -> Result<DynStore> {
    let store = GoogleCloudStorageBuilder::new()
        .with_bucket_name(bucket)
        .with_service_account_path(credentials_path)
        .build()
        .with_context(|| format!("failed to open gs://{bucket}"))?;
    Ok(Arc::new(store))
}

/// Upload a JSONL body, unconditionally overwriting whatever is at
/// `location`.
pub async fn put_jsonl(store: &DynStore, location: &ObjectPath, body: String) -> Result<()> {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, "application/jsonl".into());
    let opts = PutOptions {
        attributes,
        ..Default::default()
    };
    store
        .put_opts(location, PutPayload::from(Bytes::from(body)), opts)
        .await
        .with_context(|| format!("failed to upload {location}"))?;
    Ok(())
}

/// `head`-based existence probe; only `NotFound` maps to `false`.
pub async fn exists(store: &DynStore, location: &ObjectPath) -> Result<bool> {
    match store.head(location).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Download an artifact fully into memory as UTF-8 text.
pub async fn fetch_text(store: &DynStore, location: &ObjectPath) -> Result<String> {
    let bytes = store
        .get(location)
        .await
        .with_context(|| format!("failed to download {location}"))?
        .bytes()
        .await
        .with_context(|| format!("failed to read {location}"))?;
    String::from_utf8(bytes.to_vec()).with_context(|| format!("{location} is not valid UTF-8"))
}

/// Most recently written object under `prefix`, if any. Operator aid for
/// locating the newest snapshot without knowing its date.
///
/// Ordering uses `last_modified`: snapshot objects are written once per day
/// and never patched in place, so modification time and creation time
/// coincide.
pub async fn latest_artifact(store: &DynStore, prefix: &str) -> Result<Option<ObjectMeta>> {
    let prefix = ObjectPath::from(prefix.trim_matches('/').to_string());
    let metas: Vec<ObjectMeta> = store
        .list(Some(&prefix))
        .try_collect()
        .await
        .with_context(|| format!("failed to list {prefix}"))?;
    Ok(metas.into_iter().max_by_key(|m| m.last_modified))
}

/// Like [`latest_artifact`], but an empty prefix is an error: an operator
/// asking for the newest snapshot when none exist should see a failure, not
/// a quiet success.
pub async fn require_latest_artifact(store: &DynStore, prefix: &str) -> Result<ObjectMeta> {
    latest_artifact(store, prefix)
        .await?
        .with_context(|| format!("no artifacts found under {prefix}"))
}
