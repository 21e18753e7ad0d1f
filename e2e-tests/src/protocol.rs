use chrono::{DateTime, FixedOffset, Utc};
use eyre::{bail, eyre, Result as EyreResult};
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::errors::HarnessError;
use crate::model::DocKind;

pub const SERVICE_DISCOVERY_PATH: &str = "/service/json/1/foobox";
pub const ADMIN_DEVICE_CODE_PATH: &str = "/admin/new_device_code";
pub const NEW_DEVICE_PATH: &str = "/token/json/2/device/new";
pub const NEW_USER_PATH: &str = "/token/json/2/user/new";
pub const DOCS_PATH: &str = "/document-storage/json/2/docs";
pub const UPDATE_STATUS_PATH: &str = "/document-storage/json/2/upload/update-status";
pub const UPLOAD_REQUEST_PATH: &str = "/document-storage/json/2/upload/request";
pub const DELETE_PATH: &str = "/document-storage/json/2/delete";
pub const NOTIFICATIONS_PATH: &str = "/notifications/ws/json/1";

#[derive(Debug, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(rename = "Host")]
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub struct DeviceCodeResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub code: String,
    pub device_desc: String,
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

/// Sparse metadata update: id and version are always sent, every other
/// field only when populated. This is how partial-field mutations reach the
/// wire without clobbering untouched fields.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataUpdate {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_client: Option<DateTime<Utc>>,
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<DocKind>,
    #[serde(rename = "VissibleName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl MetadataUpdate {
    pub fn new(id: String, version: i64) -> Self {
        Self {
            id,
            version,
            modified_client: None,
            kind: None,
            name: None,
            current_page: None,
            bookmarked: None,
            parent: None,
        }
    }

    pub fn modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified_client = Some(at);
        self
    }

    pub fn kind(mut self, kind: DocKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn current_page(mut self, page: i64) -> Self {
        self.current_page = Some(page);
        self
    }

    pub fn bookmarked(mut self, bookmarked: bool) -> Self {
        self.bookmarked = Some(bookmarked);
        self
    }

    pub fn parent(mut self, parent: String) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadRequest {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: i64,
    #[serde(rename = "Type")]
    pub kind: DocKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRequest {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: i64,
}

/// Per-item response envelope shared by the update, upload-request and
/// delete endpoints. `Success = false` inside a 200 is still a failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusResponse {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub success: bool,
    #[serde(rename = "BlobURLPut", default)]
    pub blob_url_put: String,
}

/// One entry of the authoritative document listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: i64,
    pub modified_client: DateTime<FixedOffset>,
    #[serde(rename = "Type")]
    pub kind: DocKind,
    #[serde(rename = "VissibleName")]
    pub name: String,
    pub current_page: i64,
    pub bookmarked: bool,
    pub parent: String,
    #[serde(rename = "BlobURLGet", default)]
    pub blob_url_get: String,
}

#[derive(Debug, Deserialize)]
struct NotificationEnvelope {
    message: NotificationMessage,
}

#[derive(Debug, Deserialize)]
struct NotificationMessage {
    attributes: NotificationRecord,
}

/// The wire-observed counterpart of an [`crate::model::ExpectedEvent`].
///
/// The push channel string-encodes every attribute; the decoding accessors
/// below are the single coercion boundary between the loosely-typed wire
/// form and the typed model, used only by the verifier.
#[derive(Debug, Deserialize)]
pub struct NotificationRecord {
    pub event: String,
    pub id: String,
    pub version: String,
    #[serde(rename = "vissibleName")]
    pub vissible_name: String,
    pub parent: String,
    pub bookmarked: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NotificationRecord {
    pub fn from_frame(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<NotificationEnvelope>(text).map(|envelope| envelope.message.attributes)
    }

    /// Decode the string-of-integer version attribute.
    pub fn version_number(&self) -> EyreResult<i64> {
        self.version
            .parse()
            .map_err(|err| eyre!("bad notification version {:?}: {err}", self.version))
    }

    /// Decode the `"true"` / `"false"` bookmark attribute.
    pub fn bookmarked_flag(&self) -> EyreResult<bool> {
        match self.bookmarked.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(eyre!("bad notification bookmark flag {other:?}")),
        }
    }
}

/// Typed document-storage operations over a user-authenticated connection.
#[derive(Clone, Debug)]
pub struct DocumentApi {
    conn: Connection,
}

impl DocumentApi {
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn list(&self) -> EyreResult<Vec<DocumentEntry>> {
        self.conn.get(DOCS_PATH).await
    }

    pub async fn list_one_with_blob(&self, id: &str) -> EyreResult<Vec<DocumentEntry>> {
        self.conn
            .get(&format!("{DOCS_PATH}?doc={id}&withBlob=true"))
            .await
    }

    pub async fn update_metadata(&self, update: MetadataUpdate) -> EyreResult<()> {
        let results: Vec<StatusResponse> = self.conn.put(UPDATE_STATUS_PATH, &[update]).await?;

        check_item_success(&results)
    }

    /// Two-phase blob write: obtain a pre-signed upload URL for the given
    /// id/version, then PUT the raw payload to it.
    pub async fn upload_blob(&self, id: &str, version: i64, data: &[u8]) -> EyreResult<()> {
        let request = UploadRequest {
            id: id.to_owned(),
            version,
            kind: DocKind::Document,
        };

        let results: Vec<StatusResponse> = self.conn.put(UPLOAD_REQUEST_PATH, &[request]).await?;

        check_item_success(&results)?;

        let url = &results[0].blob_url_put;

        self.conn.put_bytes_at(url, data.to_vec()).await
    }

    /// Fetch a document's current payload through its pre-signed download
    /// URL from the per-document listing.
    pub async fn download_blob(&self, id: &str) -> EyreResult<Vec<u8>> {
        let entries = self.list_one_with_blob(id).await?;

        let Some(entry) = entries.first() else {
            bail!(HarnessError::Request {
                status: 200,
                message: format!("document {id} missing from its own listing"),
            });
        };

        self.conn.get_bytes_at(&entry.blob_url_get).await
    }

    pub async fn delete(&self, id: &str, version: i64) -> EyreResult<()> {
        let request = DeleteRequest {
            id: id.to_owned(),
            version,
        };

        let results: Vec<StatusResponse> = self.conn.put(DELETE_PATH, &[request]).await?;

        check_item_success(&results)
    }
}

fn check_item_success(results: &[StatusResponse]) -> EyreResult<()> {
    let Some(failed) = results.iter().find(|result| !result.success) else {
        if results.is_empty() {
            bail!(HarnessError::Request {
                status: 200,
                message: "empty result array".to_owned(),
            });
        }

        return Ok(());
    };

    bail!(HarnessError::Request {
        status: 200,
        message: format!("item {} rejected: {}", failed.id, failed.message),
    })
}
