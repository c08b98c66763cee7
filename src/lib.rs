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

pub mod config;
pub mod download;
pub mod error;
pub mod hmac;
pub mod s3;
pub mod service;
pub mod store;

pub use error::{Error, FailureKind};

use crate::config::Settings;
use crate::service::Storage;

/// Loads the settings file and builds a storage façade over an S3 client.
pub fn connect<P: AsRef<std::path::Path>>(settings_path: P) -> Result<Storage<s3::Client>, Error> {
    let settings = Settings::load(settings_path)?;
    let client = s3::Client::from_settings(&settings)?;
    Ok(Storage::new(client))
}
