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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("request failed: code='{status}' error='{code}' message='{message}'")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    XmlSerialize(#[from] quick_xml::de::DeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}

/// Coarse classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Denied,
    Transient,
    Other,
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Service { status, .. } => match *status {
                404 => FailureKind::NotFound,
                401 | 403 => FailureKind::Denied,
                408 | 429 | 500..=599 => FailureKind::Transient,
                _ => FailureKind::Other,
            },
            Error::Http(_) => FailureKind::Transient,
            _ => FailureKind::Other,
        }
    }

    /// HTTP status of the response that caused the error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Service { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: u16) -> Error {
        Error::Service {
            status,
            code: "Code".to_string(),
            message: "message".to_string(),
        }
    }

    #[test]
    fn test_kind_from_status() {
        assert_eq!(service(404).kind(), FailureKind::NotFound);
        assert_eq!(service(403).kind(), FailureKind::Denied);
        assert_eq!(service(401).kind(), FailureKind::Denied);
        assert_eq!(service(503).kind(), FailureKind::Transient);
        assert_eq!(service(429).kind(), FailureKind::Transient);
        assert_eq!(service(409).kind(), FailureKind::Other);
        assert_eq!(service(409).status(), Some(409));
    }

    #[test]
    fn test_local_errors_are_other() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(e.kind(), FailureKind::Other);
        assert_eq!(e.status(), None);
        assert_eq!(Error::InvalidArgument("bucket").kind(), FailureKind::Other);
    }
}
