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
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::Error;

pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";
pub const DEFAULT_REGION: &str = "eu-central-1";

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(rename = "Authentication")]
    pub authentication: Credentials,
    #[serde(rename = "Storage", default)]
    pub storage: StorageSettings,
}

#[derive(Deserialize, Clone, Default)]
pub struct Credentials {
    #[serde(rename = "AccessKey", default)]
    pub access_key: String,
    #[serde(rename = "SecretKey", default)]
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StorageSettings {
    #[serde(rename = "Region", default)]
    pub region: Option<String>,
    #[serde(rename = "Endpoint", default)]
    pub endpoint: Option<String>,
}

impl StorageSettings {
    pub fn region(&self) -> &str {
        match self.region.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => DEFAULT_REGION,
        }
    }

    /// Endpoint URL including the scheme. Without an explicit scheme HTTPS is used.
    pub fn endpoint_url(&self) -> String {
        match self.endpoint.as_deref() {
            Some(e) if e.starts_with("http://") || e.starts_with("https://") => {
                e.trim_end_matches('/').to_string()
            }
            Some(e) if !e.is_empty() => format!("https://{}", e.trim_end_matches('/')),
            _ => format!("https://s3.{}.amazonaws.com", self.region()),
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("loading settings from {}", path.display());

        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("unable to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.authentication.validate()?;
        Ok(settings)
    }
}

impl Credentials {
    pub fn new(access_key: &str, secret_key: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::Config(
                "check the settings file and set up the access and secret key".into(),
            ));
        }
        Ok(())
    }
}
