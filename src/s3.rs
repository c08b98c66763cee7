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

use std::collections::BTreeMap;
use std::fs::File;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::se::to_string;
use quick_xml::Reader;
use reqwest::blocking::{Body, Response};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{Credentials, Settings};
use crate::error::Error;
use crate::hmac::{
    amz_date, canonicalize_query_params, canonicalize_uri, hexdigest, sign, UNSIGNED_PAYLOAD,
};
use crate::store::{
    ListVersionsResult, ObjectBody, ObjectStore, ObjectVersion, PublicAccessBlockConfiguration,
    StorageClass,
};

/// Region whose buckets are created without a location constraint.
const US_EAST_1: &str = "us-east-1";

#[derive(Deserialize, Debug)]
struct S3Error {
    #[serde(rename = "$unflatten=Code", default)]
    code: Option<String>,
    #[serde(rename = "$unflatten=Message", default)]
    message: Option<String>,
}

#[derive(Serialize, Debug)]
struct CreateBucketConfiguration {
    #[serde(rename = "$unflatten=LocationConstraint")]
    location_constraint: String,
}

enum Payload {
    Empty,
    Bytes(Vec<u8>),
    File(File),
}

/// Blocking S3 client bound to one endpoint and region, using path-style
/// addressing and SigV4 signed requests.
pub struct Client {
    credentials: Credentials,
    region: String,
    base_url: String,
    host: String,
    pub(crate) client: reqwest::blocking::Client,
}

impl Client {
    pub fn new(endpoint: &str, region: &str, credentials: Credentials) -> Result<Self, Error> {
        credentials.validate()?;

        let url = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(Error::Config(format!("endpoint '{}' has no host", endpoint)));
            }
        };

        Ok(Self {
            credentials,
            region: region.to_string(),
            base_url: format!("{}://{}", url.scheme(), host),
            host,
            client: reqwest::blocking::Client::new(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        Self::new(
            &settings.storage.endpoint_url(),
            settings.storage.region(),
            settings.authentication.clone(),
        )
    }

    fn send(
        &self,
        method: Method,
        bucket: &str,
        key: Option<&str>,
        params: BTreeMap<String, String>,
        mut headers: BTreeMap<String, String>,
        payload: Payload,
    ) -> Result<Response, Error> {
        let mut path = format!("/{}", canonicalize_uri(bucket));
        if let Some(k) = key {
            path.push('/');
            path.push_str(&canonicalize_uri(k));
        }

        let query = canonicalize_query_params(&params);
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let payload_hash = match &payload {
            Payload::Empty => hexdigest(b""),
            Payload::Bytes(b) => hexdigest(b),
            Payload::File(_) => UNSIGNED_PAYLOAD.to_string(),
        };

        let now = Utc::now();
        headers.insert("host".to_string(), self.host.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), amz_date(now));

        let sig = sign(
            &self.credentials.access_key,
            &self.credentials.secret_key,
            &self.region,
            now,
            method.as_str(),
            &path,
            &params,
            &headers,
            &payload_hash,
        )?;

        trace!("Sig: {:?}", sig);

        let mut req = self.client.request(method, url).header("Authorization", sig);

        // reqwest derives the host header from the url
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            req = req.header(name.as_str(), value.as_str());
        }

        req = match payload {
            Payload::Empty => req,
            Payload::Bytes(b) => req.body(b),
            Payload::File(f) => req.body(Body::from(f)),
        };

        debug!("{:?}", req);

        let response = req.send()?;
        check_response(response)
    }
}

pub(crate) fn check_response(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
    let text = response.text().unwrap_or_default();

    let (code, message) = match from_str::<S3Error>(&text) {
        Ok(doc) => (
            doc.code.unwrap_or_else(|| reason.clone()),
            doc.message.unwrap_or_else(|| reason.clone()),
        ),
        Err(_) if text.is_empty() => (reason.clone(), reason),
        Err(_) => (reason, text),
    };

    Err(Error::Service {
        status: status.as_u16(),
        code,
        message,
    })
}

pub(crate) fn parse_list_versions(xml: &str) -> Result<ListVersionsResult, Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut result = ListVersionsResult::default();
    let mut current: Option<ObjectVersion> = None;
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event(&mut buf)? {
            Event::Start(ref e) => match e.name() {
                b"Version" => current = Some(ObjectVersion::default()),
                b"DeleteMarker" => {
                    current = Some(ObjectVersion {
                        is_delete_marker: true,
                        ..Default::default()
                    })
                }
                name => field = Some(name.to_vec()),
            },
            Event::Text(e) => {
                let text = e.unescape_and_decode(&reader)?;
                match (current.as_mut(), field.as_deref()) {
                    (Some(v), Some(b"Key")) => v.key = text,
                    (Some(v), Some(b"VersionId")) => v.version_id = text,
                    (Some(v), Some(b"IsLatest")) => v.is_latest = text == "true",
                    (Some(v), Some(b"LastModified")) => v.last_modified = text,
                    (None, Some(b"IsTruncated")) => result.is_truncated = text == "true",
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name() {
                b"Version" | b"DeleteMarker" => {
                    if let Some(v) = current.take() {
                        result.versions.push(v);
                    }
                }
                _ => field = None,
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(result)
}

impl ObjectStore for Client {
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectBody, Error> {
        let mut params = BTreeMap::new();
        if let Some(v) = version_id {
            params.insert("versionId".to_string(), v.to_string());
        }

        let response = self.send(
            Method::GET,
            bucket,
            Some(key),
            params,
            BTreeMap::new(),
            Payload::Empty,
        )?;

        let status = response.status().as_u16();
        let version_id = response
            .headers()
            .get("x-amz-version-id")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let content: Option<Box<dyn std::io::Read>> = match status {
            204 => None,
            _ => Some(Box::new(response)),
        };

        Ok(ObjectBody {
            status,
            version_id,
            content,
        })
    }

    fn list_object_versions(&self, bucket: &str, key: &str) -> Result<ListVersionsResult, Error> {
        let mut params = BTreeMap::new();
        params.insert("versions".to_string(), "".to_string());
        params.insert("prefix".to_string(), key.to_string());

        let response = self.send(
            Method::GET,
            bucket,
            None,
            params,
            BTreeMap::new(),
            Payload::Empty,
        )?;

        let text = response.text()?;
        parse_list_versions(&text)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: File,
        storage_class: StorageClass,
    ) -> Result<u16, Error> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-amz-storage-class".to_string(),
            storage_class.as_str().to_string(),
        );

        let response = self.send(
            Method::PUT,
            bucket,
            Some(key),
            BTreeMap::new(),
            headers,
            Payload::File(file),
        )?;

        Ok(response.status().as_u16())
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<u16, Error> {
        let mut params = BTreeMap::new();
        if let Some(v) = version_id {
            params.insert("versionId".to_string(), v.to_string());
        }

        let response = self.send(
            Method::DELETE,
            bucket,
            Some(key),
            params,
            BTreeMap::new(),
            Payload::Empty,
        )?;

        Ok(response.status().as_u16())
    }

    fn head_bucket(&self, bucket: &str) -> Result<bool, Error> {
        match self.send(
            Method::HEAD,
            bucket,
            None,
            BTreeMap::new(),
            BTreeMap::new(),
            Payload::Empty,
        ) {
            Ok(_) => Ok(true),
            // taken by another account, or living in another region
            Err(Error::Service { status: 301 | 403, .. }) => Ok(true),
            Err(Error::Service { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_bucket(&self, bucket: &str) -> Result<u16, Error> {
        let payload = if self.region == US_EAST_1 {
            Payload::Empty
        } else {
            let cfg = CreateBucketConfiguration {
                location_constraint: self.region.clone(),
            };
            Payload::Bytes(to_string(&cfg)?.into_bytes())
        };

        let response = self.send(
            Method::PUT,
            bucket,
            None,
            BTreeMap::new(),
            BTreeMap::new(),
            payload,
        )?;

        Ok(response.status().as_u16())
    }

    fn put_public_access_block(
        &self,
        bucket: &str,
        config: &PublicAccessBlockConfiguration,
    ) -> Result<u16, Error> {
        let body = to_string(config)?.into_bytes();

        let mut params = BTreeMap::new();
        params.insert("publicAccessBlock".to_string(), "".to_string());

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-md5".to_string(),
            BASE64.encode(md5::compute(&body).0),
        );

        let response = self.send(
            Method::PUT,
            bucket,
            None,
            params,
            headers,
            Payload::Bytes(body),
        )?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use mockito::Matcher;
    use std::io::{Read, Write};

    const AUTH_PATTERN: &str = r"^AWS4-HMAC-SHA256 Credential=AKID/\d{8}/eu-central-1/s3/aws4_request,SignedHeaders=[a-z0-9;-]+,Signature=[0-9a-f]{64}$";

    fn client(server: &mockito::ServerGuard) -> Client {
        Client::new(
            &server.url(),
            "eu-central-1",
            Credentials::new("AKID", "SECRET"),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_input() {
        let creds = Credentials::new("AKID", "SECRET");
        assert!(matches!(
            Client::new("not a url", "eu-central-1", creds),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Client::new(
                "https://s3.eu-central-1.amazonaws.com",
                "eu-central-1",
                Credentials::new("", "SECRET")
            ),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_get_object_version() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/bucket/dir/a.txt")
            .match_query(Matcher::UrlEncoded("versionId".into(), "v1".into()))
            .match_header("authorization", Matcher::Regex(AUTH_PATTERN.into()))
            .match_header("x-amz-content-sha256", hexdigest(b"").as_str())
            .match_header("x-amz-date", Matcher::Regex(r"^\d{8}T\d{6}Z$".into()))
            .with_status(200)
            .with_header("x-amz-version-id", "v1")
            .with_body("hello world")
            .create();

        let c = client(&server);
        let obj = c.get_object("bucket", "dir/a.txt", Some("v1")).unwrap();

        assert_eq!(obj.status, 200);
        assert_eq!(obj.version_id.as_deref(), Some("v1"));

        let mut body = String::new();
        obj.content.unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello world");
        m.assert();
    }

    #[test]
    fn test_error_document() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/bucket/missing")
            .with_status(404)
            .with_body(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>NoSuchKey</Code>\
                 <Message>The specified key does not exist.</Message>\
                 <Key>missing</Key></Error>",
            )
            .create();

        let c = client(&server);
        let err = c.get_object("bucket", "missing", None).unwrap_err();

        match &err {
            Error::Service {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 404);
                assert_eq!(code, "NoSuchKey");
                assert_eq!(message, "The specified key does not exist.");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.kind(), FailureKind::NotFound);
        m.assert();
    }

    #[test]
    fn test_error_without_document() {
        let mut server = mockito::Server::new();
        let empty = server.mock("GET", "/bucket/gone").with_status(410).create();
        let plain = server
            .mock("GET", "/bucket/odd")
            .with_status(400)
            .with_body("not xml at all")
            .create();

        let c = client(&server);

        match c.get_object("bucket", "gone", None).unwrap_err() {
            Error::Service { code, message, .. } => {
                assert_eq!(code, "Gone");
                assert_eq!(message, "Gone");
            }
            other => panic!("unexpected error {:?}", other),
        }

        match c.get_object("bucket", "odd", None).unwrap_err() {
            Error::Service { code, message, .. } => {
                assert_eq!(code, "Bad Request");
                assert_eq!(message, "not xml at all");
            }
            other => panic!("unexpected error {:?}", other),
        }

        empty.assert();
        plain.assert();
    }

    #[test]
    fn test_list_object_versions() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/bucket")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("versions".into(), "".into()),
                Matcher::UrlEncoded("prefix".into(), "notes.txt".into()),
            ]))
            .with_status(200)
            .with_body(
                "<ListVersionsResult>\
                 <Name>bucket</Name><Prefix>notes.txt</Prefix>\
                 <IsTruncated>false</IsTruncated>\
                 <Version><Key>notes.txt</Key><VersionId>v3</VersionId>\
                 <IsLatest>true</IsLatest></Version>\
                 <Version><Key>notes.txt</Key><VersionId>v2</VersionId>\
                 <IsLatest>false</IsLatest></Version>\
                 </ListVersionsResult>",
            )
            .create();

        let c = client(&server);
        let res = c.list_object_versions("bucket", "notes.txt").unwrap();

        let ids: Vec<&str> = res.versions.iter().map(|v| v.version_id.as_str()).collect();
        assert_eq!(ids, vec!["v3", "v2"]);
        assert!(res.versions[0].is_latest);
        m.assert();
    }

    #[test]
    fn test_parse_list_versions_keeps_document_order() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <ListVersionsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
            <Name>bucket</Name><Prefix>a</Prefix><KeyMarker></KeyMarker>\
            <MaxKeys>1000</MaxKeys><IsTruncated>true</IsTruncated>\
            <DeleteMarker><Key>a</Key><VersionId>dm1</VersionId><IsLatest>true</IsLatest>\
            <LastModified>2024-01-03T00:00:00.000Z</LastModified>\
            <Owner><ID>o</ID><DisplayName>owner</DisplayName></Owner></DeleteMarker>\
            <Version><Key>a</Key><VersionId>v2</VersionId><IsLatest>false</IsLatest>\
            <LastModified>2024-01-02T00:00:00.000Z</LastModified><ETag>&quot;x&quot;</ETag>\
            <Size>3</Size><StorageClass>STANDARD</StorageClass></Version>\
            <Version><Key>ab</Key><VersionId>v9</VersionId><IsLatest>true</IsLatest></Version>\
            <Version><Key>a</Key><VersionId>v1</VersionId><IsLatest>false</IsLatest></Version>\
            </ListVersionsResult>";

        let res = parse_list_versions(xml).unwrap();
        assert!(res.is_truncated);

        let got: Vec<(&str, &str, bool)> = res
            .versions
            .iter()
            .map(|v| (v.key.as_str(), v.version_id.as_str(), v.is_delete_marker))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a", "dm1", true),
                ("a", "v2", false),
                ("ab", "v9", false),
                ("a", "v1", false),
            ]
        );
        assert_eq!(res.versions[1].last_modified, "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn test_parse_empty_listing() {
        let res = parse_list_versions(
            "<ListVersionsResult><Name>b</Name><IsTruncated>false</IsTruncated></ListVersionsResult>",
        )
        .unwrap();
        assert!(res.versions.is_empty());
        assert!(!res.is_truncated);
    }

    #[test]
    fn test_put_object() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"file contents").unwrap();

        let mut server = mockito::Server::new();
        let m = server
            .mock("PUT", "/bucket/upload.bin")
            .match_header("x-amz-storage-class", "STANDARD")
            .match_header("x-amz-content-sha256", "UNSIGNED-PAYLOAD")
            .match_header("authorization", Matcher::Regex(AUTH_PATTERN.into()))
            .match_body("file contents")
            .with_status(200)
            .create();

        let c = client(&server);
        let file = File::open(f.path()).unwrap();
        let status = c
            .put_object("bucket", "upload.bin", file, StorageClass::Standard)
            .unwrap();

        assert_eq!(status, 200);
        m.assert();
    }

    #[test]
    fn test_delete_object_version() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("DELETE", "/bucket/a.txt")
            .match_query(Matcher::UrlEncoded("versionId".into(), "v7".into()))
            .with_status(204)
            .create();

        let c = client(&server);
        assert_eq!(c.delete_object("bucket", "a.txt", Some("v7")).unwrap(), 204);
        m.assert();
    }

    #[test]
    fn test_head_bucket() {
        let mut server = mockito::Server::new();
        let found = server.mock("HEAD", "/present").with_status(200).create();
        let missing = server.mock("HEAD", "/absent").with_status(404).create();
        let denied = server.mock("HEAD", "/locked").with_status(403).create();
        let moved = server
            .mock("HEAD", "/elsewhere")
            .with_status(301)
            .with_header("x-amz-bucket-region", "us-west-2")
            .create();
        let broken = server.mock("HEAD", "/flaky").with_status(503).create();

        let c = client(&server);
        assert!(c.head_bucket("present").unwrap());
        assert!(!c.head_bucket("absent").unwrap());
        assert!(c.head_bucket("locked").unwrap());
        assert!(c.head_bucket("elsewhere").unwrap());

        let err = c.head_bucket("flaky").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);

        found.assert();
        missing.assert();
        denied.assert();
        moved.assert();
        broken.assert();
    }

    #[test]
    fn test_create_bucket_with_location() {
        let body = "<CreateBucketConfiguration>\
                    <LocationConstraint>eu-central-1</LocationConstraint>\
                    </CreateBucketConfiguration>";

        let mut server = mockito::Server::new();
        let m = server
            .mock("PUT", "/new-bucket")
            .match_header("x-amz-content-sha256", hexdigest(body.as_bytes()).as_str())
            .match_body(body)
            .with_status(200)
            .create();

        let c = client(&server);
        assert_eq!(c.create_bucket("new-bucket").unwrap(), 200);
        m.assert();
    }

    #[test]
    fn test_put_public_access_block() {
        let body = to_string(&PublicAccessBlockConfiguration::all_blocked()).unwrap();
        let md5 = BASE64.encode(md5::compute(body.as_bytes()).0);

        let mut server = mockito::Server::new();
        let m = server
            .mock("PUT", "/new-bucket")
            .match_query(Matcher::UrlEncoded("publicAccessBlock".into(), "".into()))
            .match_header("content-md5", md5.as_str())
            .match_body(body.as_str())
            .with_status(200)
            .create();

        let c = client(&server);
        let status = c
            .put_public_access_block("new-bucket", &PublicAccessBlockConfiguration::all_blocked())
            .unwrap();
        assert_eq!(status, 200);
        m.assert();
    }
}
