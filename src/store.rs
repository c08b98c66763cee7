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

use std::fmt;
use std::fs::File;
use std::io::Read;

use serde::Serialize;

use crate::error::Error;

/// The calls the storage façade needs from an object store.
///
/// Every method maps to exactly one request against the store. Errors are
/// returned as is; the façade decides how to report them.
pub trait ObjectStore {
    fn get_object(&self, bucket: &str, key: &str, version_id: Option<&str>)
        -> Result<ObjectBody, Error>;

    fn list_object_versions(&self, bucket: &str, key: &str) -> Result<ListVersionsResult, Error>;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: File,
        storage_class: StorageClass,
    ) -> Result<u16, Error>;

    fn delete_object(&self, bucket: &str, key: &str, version_id: Option<&str>)
        -> Result<u16, Error>;

    /// `Ok(false)` when the store answers that the bucket does not exist.
    fn head_bucket(&self, bucket: &str) -> Result<bool, Error>;

    /// Creates the bucket in the store's configured region.
    fn create_bucket(&self, bucket: &str) -> Result<u16, Error>;

    fn put_public_access_block(
        &self,
        bucket: &str,
        config: &PublicAccessBlockConfiguration,
    ) -> Result<u16, Error>;
}

pub struct ObjectBody {
    pub status: u16,
    pub version_id: Option<String>,
    pub content: Option<Box<dyn Read>>,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("status", &self.status)
            .field("version_id", &self.version_id)
            .field("content", &self.content.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: String,
    pub is_delete_marker: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListVersionsResult {
    /// Versions and delete markers in the order the store listed them.
    pub versions: Vec<ObjectVersion>,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageClass {
    #[default]
    Standard,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicAccessBlockConfiguration {
    #[serde(rename = "$unflatten=BlockPublicAcls")]
    pub block_public_acls: bool,
    #[serde(rename = "$unflatten=IgnorePublicAcls")]
    pub ignore_public_acls: bool,
    #[serde(rename = "$unflatten=BlockPublicPolicy")]
    pub block_public_policy: bool,
    #[serde(rename = "$unflatten=RestrictPublicBuckets")]
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockConfiguration {
    pub fn all_blocked() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }

    pub fn is_fully_blocked(&self) -> bool {
        *self == Self::all_blocked()
    }
}
