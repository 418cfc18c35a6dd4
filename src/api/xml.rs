//! S3 XML response builders and parsers

use crate::listing::{MultipartPage, ObjectPage, VersionsPage};
use crate::types::{format_last_modified, BucketInfo};
use serde::Deserialize;

/// Escape special XML characters
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Encode a key/prefix value: URL-encode if `url_encode`, otherwise
/// XML-escape.
fn encode_value(s: &str, url_encode: bool) -> String {
    if url_encode {
        urlencoding::encode(s).into_owned()
    } else {
        escape_xml(s)
    }
}

/// ListObjects v1/v2 response
#[derive(Debug)]
pub struct ListBucketResult<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub delimiter: Option<&'a str>,
    pub max_keys: u32,
    pub encoding_type_url: bool,
    pub page: &'a ObjectPage,
    /// v2 request echo
    pub continuation_token: Option<&'a str>,
    pub start_after: Option<&'a str>,
    /// v1 request echo
    pub marker: Option<&'a str>,
    /// v1 vs v2 flag
    pub is_v1: bool,
}

impl ListBucketResult<'_> {
    /// Convert to S3 XML format (v1 or v2 depending on construction)
    pub fn to_xml(&self) -> String {
        let url = self.encoding_type_url;
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
        xml.push('\n');

        xml.push_str(&format!("  <Name>{}</Name>\n", escape_xml(self.name)));
        xml.push_str(&format!(
            "  <Prefix>{}</Prefix>\n",
            encode_value(self.prefix, url)
        ));
        if let Some(delim) = self.delimiter {
            xml.push_str(&format!(
                "  <Delimiter>{}</Delimiter>\n",
                encode_value(delim, url)
            ));
        }
        if url {
            xml.push_str("  <EncodingType>url</EncodingType>\n");
        }
        xml.push_str(&format!("  <MaxKeys>{}</MaxKeys>\n", self.max_keys));

        if self.is_v1 {
            // v1: <Marker>, <NextMarker>, no <KeyCount>
            xml.push_str(&format!(
                "  <Marker>{}</Marker>\n",
                encode_value(self.marker.unwrap_or(""), url)
            ));
            xml.push_str(&format!(
                "  <IsTruncated>{}</IsTruncated>\n",
                self.page.is_truncated
            ));
            if self.page.is_truncated {
                if let Some(next_marker) = &self.page.next_marker {
                    xml.push_str(&format!(
                        "  <NextMarker>{}</NextMarker>\n",
                        encode_value(next_marker, url)
                    ));
                }
            }
        } else {
            // v2: <KeyCount>, <ContinuationToken>, <NextContinuationToken>
            let key_count = self.page.contents.len() + self.page.common_prefixes.len();
            xml.push_str(&format!("  <KeyCount>{key_count}</KeyCount>\n"));
            xml.push_str(&format!(
                "  <IsTruncated>{}</IsTruncated>\n",
                self.page.is_truncated
            ));
            if let Some(token) = self.continuation_token {
                xml.push_str(&format!(
                    "  <ContinuationToken>{}</ContinuationToken>\n",
                    escape_xml(token)
                ));
            }
            if let Some(start_after) = self.start_after {
                xml.push_str(&format!(
                    "  <StartAfter>{}</StartAfter>\n",
                    encode_value(start_after, url)
                ));
            }
            if let Some(token) = &self.page.next_continuation_token {
                xml.push_str(&format!(
                    "  <NextContinuationToken>{}</NextContinuationToken>\n",
                    escape_xml(token)
                ));
            }
        }

        for obj in &self.page.contents {
            xml.push_str("  <Contents>\n");
            xml.push_str(&format!("    <Key>{}</Key>\n", encode_value(&obj.key, url)));
            xml.push_str(&format!(
                "    <LastModified>{}</LastModified>\n",
                format_last_modified(&obj.last_modified)
            ));
            xml.push_str(&format!(
                "    <ETag>{}</ETag>\n",
                escape_xml(&obj.quoted_etag())
            ));
            xml.push_str(&format!("    <Size>{}</Size>\n", obj.size));
            xml.push_str("    <StorageClass>STANDARD</StorageClass>\n");
            xml.push_str("  </Contents>\n");
        }

        for common_prefix in &self.page.common_prefixes {
            xml.push_str("  <CommonPrefixes>\n");
            xml.push_str(&format!(
                "    <Prefix>{}</Prefix>\n",
                encode_value(common_prefix, url)
            ));
            xml.push_str("  </CommonPrefixes>\n");
        }

        xml.push_str("</ListBucketResult>");
        xml
    }
}

/// ListObjectVersions response
#[derive(Debug)]
pub struct ListVersionsResult<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub delimiter: Option<&'a str>,
    pub max_keys: u32,
    pub encoding_type_url: bool,
    pub key_marker: Option<&'a str>,
    pub version_id_marker: Option<&'a str>,
    pub page: &'a VersionsPage,
}

impl ListVersionsResult<'_> {
    /// Version IDs that equal the literal "null" are never re-encoded.
    fn encode_version_id(version_id: &str, url: bool) -> String {
        if version_id == "null" {
            version_id.to_string()
        } else {
            encode_value(version_id, url)
        }
    }

    pub fn to_xml(&self) -> String {
        let url = self.encoding_type_url;
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<ListVersionsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
        xml.push('\n');

        xml.push_str(&format!("  <Name>{}</Name>\n", escape_xml(self.name)));
        xml.push_str(&format!(
            "  <Prefix>{}</Prefix>\n",
            encode_value(self.prefix, url)
        ));
        xml.push_str(&format!(
            "  <KeyMarker>{}</KeyMarker>\n",
            encode_value(self.key_marker.unwrap_or(""), url)
        ));
        xml.push_str(&format!(
            "  <VersionIdMarker>{}</VersionIdMarker>\n",
            Self::encode_version_id(self.version_id_marker.unwrap_or(""), url)
        ));
        if let Some(delim) = self.delimiter {
            xml.push_str(&format!(
                "  <Delimiter>{}</Delimiter>\n",
                encode_value(delim, url)
            ));
        }
        if url {
            xml.push_str("  <EncodingType>url</EncodingType>\n");
        }
        xml.push_str(&format!("  <MaxKeys>{}</MaxKeys>\n", self.max_keys));
        xml.push_str(&format!(
            "  <IsTruncated>{}</IsTruncated>\n",
            self.page.is_truncated
        ));
        if self.page.is_truncated {
            if let Some(next_key) = &self.page.next_key_marker {
                xml.push_str(&format!(
                    "  <NextKeyMarker>{}</NextKeyMarker>\n",
                    encode_value(next_key, url)
                ));
            }
            if let Some(next_version) = &self.page.next_version_id_marker {
                xml.push_str(&format!(
                    "  <NextVersionIdMarker>{}</NextVersionIdMarker>\n",
                    Self::encode_version_id(next_version, url)
                ));
            }
        }

        // Versions and delete markers keep their own collections; order
        // within each follows the engine's emission order.
        for version in &self.page.versions {
            xml.push_str("  <Version>\n");
            xml.push_str(&format!(
                "    <Key>{}</Key>\n",
                encode_value(&version.key, url)
            ));
            xml.push_str(&format!(
                "    <VersionId>{}</VersionId>\n",
                Self::encode_version_id(&version.version_id, url)
            ));
            xml.push_str(&format!(
                "    <IsLatest>{}</IsLatest>\n",
                version.is_latest
            ));
            xml.push_str(&format!(
                "    <LastModified>{}</LastModified>\n",
                format_last_modified(&version.last_modified)
            ));
            xml.push_str(&format!(
                "    <ETag>{}</ETag>\n",
                escape_xml(&format!("\"{}\"", version.etag))
            ));
            xml.push_str(&format!("    <Size>{}</Size>\n", version.size));
            xml.push_str("    <StorageClass>STANDARD</StorageClass>\n");
            xml.push_str("  </Version>\n");
        }

        for marker in &self.page.delete_markers {
            xml.push_str("  <DeleteMarker>\n");
            xml.push_str(&format!(
                "    <Key>{}</Key>\n",
                encode_value(&marker.key, url)
            ));
            xml.push_str(&format!(
                "    <VersionId>{}</VersionId>\n",
                Self::encode_version_id(&marker.version_id, url)
            ));
            xml.push_str(&format!(
                "    <IsLatest>{}</IsLatest>\n",
                marker.is_latest
            ));
            xml.push_str(&format!(
                "    <LastModified>{}</LastModified>\n",
                format_last_modified(&marker.last_modified)
            ));
            xml.push_str("  </DeleteMarker>\n");
        }

        for common_prefix in &self.page.common_prefixes {
            xml.push_str("  <CommonPrefixes>\n");
            xml.push_str(&format!(
                "    <Prefix>{}</Prefix>\n",
                encode_value(common_prefix, url)
            ));
            xml.push_str("  </CommonPrefixes>\n");
        }

        xml.push_str("</ListVersionsResult>");
        xml
    }
}

/// ListMultipartUploads response
#[derive(Debug)]
pub struct ListMultipartUploadsResult<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    pub max_uploads: u32,
    pub page: &'a MultipartPage,
}

impl ListMultipartUploadsResult<'_> {
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<ListMultipartUploadsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
        );
        xml.push('\n');
        xml.push_str(&format!("  <Bucket>{}</Bucket>\n", escape_xml(self.bucket)));
        xml.push_str("  <KeyMarker/>\n");
        xml.push_str("  <UploadIdMarker/>\n");
        if !self.prefix.is_empty() {
            xml.push_str(&format!(
                "  <Prefix>{}</Prefix>\n",
                escape_xml(self.prefix)
            ));
        }
        xml.push_str(&format!(
            "  <MaxUploads>{}</MaxUploads>\n",
            self.max_uploads
        ));
        xml.push_str(&format!(
            "  <IsTruncated>{}</IsTruncated>\n",
            self.page.is_truncated
        ));

        for upload in &self.page.uploads {
            xml.push_str("  <Upload>\n");
            xml.push_str(&format!("    <Key>{}</Key>\n", escape_xml(&upload.key)));
            xml.push_str(&format!(
                "    <UploadId>{}</UploadId>\n",
                escape_xml(&upload.upload_id)
            ));
            xml.push_str(&format!(
                "    <Initiated>{}</Initiated>\n",
                format_last_modified(&upload.initiated)
            ));
            xml.push_str("  </Upload>\n");
        }

        xml.push_str("</ListMultipartUploadsResult>");
        xml
    }
}

/// ListBuckets response
#[derive(Debug)]
pub struct ListBucketsResult<'a> {
    pub owner_id: &'a str,
    pub owner_display_name: &'a str,
    pub buckets: &'a [BucketInfo],
}

impl ListBucketsResult<'_> {
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
        xml.push('\n');

        xml.push_str("  <Owner>\n");
        xml.push_str(&format!("    <ID>{}</ID>\n", escape_xml(self.owner_id)));
        xml.push_str(&format!(
            "    <DisplayName>{}</DisplayName>\n",
            escape_xml(self.owner_display_name)
        ));
        xml.push_str("  </Owner>\n");

        xml.push_str("  <Buckets>\n");
        for bucket in self.buckets {
            xml.push_str("    <Bucket>\n");
            xml.push_str(&format!(
                "      <Name>{}</Name>\n",
                escape_xml(&bucket.name)
            ));
            xml.push_str(&format!(
                "      <CreationDate>{}</CreationDate>\n",
                bucket.created_at.format("%Y-%m-%dT%H:%M:%SZ")
            ));
            xml.push_str("    </Bucket>\n");
        }
        xml.push_str("  </Buckets>\n");

        xml.push_str("</ListAllMyBucketsResult>");
        xml
    }
}

/// GetBucketLocation response. us-east-1 renders as the empty constraint.
pub fn location_constraint_xml(region: &str) -> String {
    if region == "us-east-1" {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#
            .to_string()
    } else {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">{}</LocationConstraint>"#,
            escape_xml(region)
        )
    }
}

/// GetBucketVersioning response.
pub fn versioning_configuration_xml(status: Option<&str>) -> String {
    match status {
        None => r#"<?xml version="1.0" encoding="UTF-8"?>
<VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#
            .to_string(),
        Some(status) => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Status>{}</Status>
</VersioningConfiguration>"#,
            escape_xml(status)
        ),
    }
}

/// PutBucketVersioning request body
#[derive(Debug, Clone, Deserialize)]
pub struct VersioningConfigurationRequest {
    #[serde(rename = "Status")]
    pub status: Option<String>,
}

impl VersioningConfigurationRequest {
    /// Parse from XML body
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }
}
