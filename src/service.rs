// Copyright 2022 Mathew Odden <mathewrodden@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Validated bucket and object operations on top of an [`ObjectStore`].
//!
//! Every operation checks its arguments before touching the store and
//! returns `Err` only when an argument is invalid. Failures reported by the
//! store are logged and handed back inside an [`Outcome`] next to a default
//! value (no file, an empty list, `false`), so callers that only look at
//! the value see the same result whatever went wrong, while callers that
//! care can inspect [`Outcome::failure`].

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::download::stream_to_file;
use crate::error::{Error, FailureKind};
use crate::store::{ObjectStore, PublicAccessBlockConfiguration, StorageClass};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(e: &Error) -> Self {
        let message = match e {
            Error::Service { message, .. } => message.clone(),
            other => other.to_string(),
        };

        Self {
            kind: e.kind(),
            status: e.status(),
            message,
        }
    }
}

#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub failure: Option<Failure>,
}

impl<T> Outcome<T> {
    fn success(value: T) -> Self {
        Self {
            value,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Default> Outcome<T> {
    fn failed(failure: Failure) -> Self {
        Self {
            value: T::default(),
            failure: Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: u64,
    pub status: u16,
    pub version_id: Option<String>,
}

/// Status codes of the two requests behind [`Storage::create_private_bucket`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketCreation {
    pub create_status: Option<u16>,
    pub access_block_status: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Purge {
    pub deleted: Vec<String>,
}

fn require(name: &'static str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(name));
    }
    Ok(())
}

/// Path under `dir` a download of `key` is written to. Keys that would
/// leave `dir` (absolute, or with `..` segments) are rejected.
fn local_path(dir: &Path, key: &str) -> Result<PathBuf, Error> {
    let mut path = dir.to_path_buf();
    let mut segments = 0;

    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                segments += 1;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                return Err(Error::InvalidArgument("key"));
            }
        }
    }

    if segments == 0 {
        return Err(Error::InvalidArgument("key"));
    }
    Ok(path)
}

fn report(e: &Error) -> Failure {
    let failure = Failure::from(e);
    if let Some(status) = failure.status {
        warn!("HTTP status code : {}", status);
    }
    warn!("Message: {}", failure.message);
    failure
}

pub struct Storage<S> {
    store: S,
    download_dir: PathBuf,
}

impl<S: ObjectStore> Storage<S> {
    /// Downloads land in the current working directory.
    pub fn new(store: S) -> Self {
        Self {
            store,
            download_dir: PathBuf::from("."),
        }
    }

    pub fn with_download_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetches the latest version of `key`, or `version` when given, into a
    /// file named after the key.
    pub fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
    ) -> Result<Outcome<Option<Download>>, Error> {
        require("bucket", bucket)?;
        require("key", key)?;
        if let Some(v) = version {
            require("version", v)?;
        }
        let path = local_path(&self.download_dir, key)?;

        let object = match self.store.get_object(bucket, key, version) {
            Ok(o) => o,
            Err(e) => return Ok(Outcome::failed(report(&e))),
        };

        let mut content = match object.content {
            Some(c) => c,
            None => {
                warn!("Failure");
                warn!("HTTP status code : {}", object.status);
                return Ok(Outcome::failed(Failure {
                    kind: FailureKind::Other,
                    status: Some(object.status),
                    message: "response has no body".to_string(),
                }));
            }
        };

        match stream_to_file(&mut content, &path) {
            Ok(bytes) => {
                info!("HTTP status code : {}", object.status);
                if let Some(v) = &object.version_id {
                    info!("Version ID: {}", v);
                }
                info!("Success.");

                Ok(Outcome::success(Some(Download {
                    path,
                    bytes,
                    status: object.status,
                    version_id: object.version_id,
                })))
            }
            Err(e) => Ok(Outcome::failed(report(&Error::from(e)))),
        }
    }

    /// Version ids of `key`, in the order the store lists them. Delete
    /// markers are included; other keys sharing the prefix are not.
    pub fn list_versions(&self, bucket: &str, key: &str) -> Result<Outcome<Vec<String>>, Error> {
        require("bucket", bucket)?;
        require("key", key)?;

        let listing = match self.store.list_object_versions(bucket, key) {
            Ok(l) => l,
            Err(e) => return Ok(Outcome::failed(report(&e))),
        };

        if listing.is_truncated {
            warn!("version listing for {}/{} is truncated", bucket, key);
        }

        let versions = listing
            .versions
            .into_iter()
            .filter(|v| v.key == key)
            .map(|v| {
                info!("Version ID: {}", v.version_id);
                v.version_id
            })
            .collect();

        Ok(Outcome::success(versions))
    }

    /// Uploads the file under its own file name.
    pub fn put_object(&self, bucket: &str, file_path: &Path) -> Result<Outcome<Option<u16>>, Error> {
        let key = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(Error::InvalidArgument("file_path"))?;

        self.put_object_as(bucket, file_path, key)
    }

    pub fn put_object_as(
        &self,
        bucket: &str,
        file_path: &Path,
        key: &str,
    ) -> Result<Outcome<Option<u16>>, Error> {
        require("bucket", bucket)?;
        require("key", key)?;
        if file_path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("file_path"));
        }

        let file = match File::open(file_path) {
            Ok(f) => f,
            Err(e) => return Ok(Outcome::failed(report(&Error::from(e)))),
        };

        match self
            .store
            .put_object(bucket, key, file, StorageClass::Standard)
        {
            Ok(status) => {
                info!("HTTP status code : {}", status);
                Ok(Outcome::success(Some(status)))
            }
            Err(e) => Ok(Outcome::failed(report(&e))),
        }
    }

    /// Deletes `key`, or only `version` of it when given.
    ///
    /// Without a version this is a plain delete: on a versioned bucket the
    /// store adds a delete marker and keeps older versions. Use
    /// [`Storage::delete_all_versions`] to remove every version.
    pub fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
    ) -> Result<Outcome<Option<u16>>, Error> {
        require("bucket", bucket)?;
        require("key", key)?;
        if let Some(v) = version {
            require("version", v)?;
        }

        match self.store.delete_object(bucket, key, version) {
            Ok(status) => {
                info!("HTTP status code : {}", status);
                Ok(Outcome::success(Some(status)))
            }
            Err(e) => Ok(Outcome::failed(report(&e))),
        }
    }

    /// Deletes every listed version of `key`, one request per version.
    /// Stops at the first failure; `value.deleted` holds what was removed.
    ///
    /// Only one listing page is read. When the store reports more versions
    /// than it returned, the listed ones are deleted and the outcome carries
    /// a failure saying the purge is incomplete.
    pub fn delete_all_versions(&self, bucket: &str, key: &str) -> Result<Outcome<Purge>, Error> {
        require("bucket", bucket)?;
        require("key", key)?;

        let listing = match self.store.list_object_versions(bucket, key) {
            Ok(l) => l,
            Err(e) => return Ok(Outcome::failed(report(&e))),
        };

        let mut purge = Purge::default();
        for version in listing.versions.into_iter().filter(|v| v.key == key) {
            match self
                .store
                .delete_object(bucket, key, Some(&version.version_id))
            {
                Ok(status) => {
                    info!("Deleted version {} : {}", version.version_id, status);
                    purge.deleted.push(version.version_id);
                }
                Err(e) => {
                    return Ok(Outcome {
                        value: purge,
                        failure: Some(report(&e)),
                    });
                }
            }
        }

        if listing.is_truncated {
            warn!("version listing for {}/{} is truncated", bucket, key);
            return Ok(Outcome {
                value: purge,
                failure: Some(Failure {
                    kind: FailureKind::Other,
                    status: None,
                    message: "listing truncated; more versions remain".to_string(),
                }),
            });
        }

        Ok(Outcome::success(purge))
    }

    pub fn bucket_exists(&self, bucket: &str) -> Result<Outcome<bool>, Error> {
        require("bucket", bucket)?;

        match self.store.head_bucket(bucket) {
            Ok(true) => {
                info!("Bucket name already exist.");
                Ok(Outcome::success(true))
            }
            Ok(false) => Ok(Outcome::success(false)),
            Err(e) => Ok(Outcome::failed(report(&e))),
        }
    }

    /// Creates the bucket and then blocks all public access to it.
    ///
    /// The two steps are separate requests. If the second one fails the
    /// bucket exists without the access block; the outcome then carries the
    /// create status together with the failure.
    pub fn create_private_bucket(&self, bucket: &str) -> Result<Outcome<BucketCreation>, Error> {
        require("bucket", bucket)?;

        let create_status = match self.store.create_bucket(bucket) {
            Ok(status) => status,
            Err(e) => return Ok(Outcome::failed(report(&e))),
        };
        info!("HTTP status code : {}", create_status);

        let config = PublicAccessBlockConfiguration::all_blocked();
        match self.store.put_public_access_block(bucket, &config) {
            Ok(status) => {
                info!("HTTP status code : {}", status);
                Ok(Outcome::success(BucketCreation {
                    create_status: Some(create_status),
                    access_block_status: Some(status),
                }))
            }
            Err(e) => {
                warn!(
                    "bucket {} was created but public access is not blocked",
                    bucket
                );
                Ok(Outcome {
                    value: BucketCreation {
                        create_status: Some(create_status),
                        access_block_status: None,
                    },
                    failure: Some(report(&e)),
                })
            }
        }
    }
}
