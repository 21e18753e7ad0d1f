use chrono::Utc;
use eyre::{bail, Result as EyreResult};

use crate::errors::HarnessError;
use crate::model::{DocKind, Document, DocumentModel, ExpectedEvent};
use crate::output::OutputWriter;
use crate::protocol::{DocumentApi, DocumentEntry, NotificationRecord};

/// Reconcile the service's authoritative listing (and per-document blobs)
/// against the model, draining every matched entry. Server documents the
/// model does not know are ignored; model documents the server does not
/// report are a hard failure.
pub async fn verify_state(
    api: &DocumentApi,
    mut model: DocumentModel,
    output_writer: OutputWriter,
) -> EyreResult<()> {
    let listing = api.list().await?;

    output_writer.write_str(&format!(
        "Reconciling {} expected documents against {} listed",
        model.len(),
        listing.len(),
    ));

    for entry in &listing {
        let Some(doc) = model.take_by_id(&entry.id) else {
            continue;
        };

        check_document(&doc, entry)?;

        if doc.kind == DocKind::Document {
            let blob = api.download_blob(&entry.id).await?;
            let expected = doc.data.as_deref().unwrap_or_default();

            if blob != expected {
                bail!(HarnessError::Assertion(format!(
                    "document {}: blob mismatch ({} bytes on server, {} expected)",
                    doc.id,
                    blob.len(),
                    expected.len(),
                )));
            }
        }
    }

    if !model.is_empty() {
        let missing: Vec<_> = model.ids().collect();

        bail!(HarnessError::Assertion(format!(
            "documents missing from the service listing: {missing:?}"
        )));
    }

    Ok(())
}

/// Field-by-field comparison of one model document against its listing
/// entry. Timestamps match within 1 second; the service serializes them
/// with whole-second precision.
fn check_document(doc: &Document, entry: &DocumentEntry) -> EyreResult<()> {
    if doc.version != entry.version {
        bail!(assertion(doc, "version", &entry.version, &doc.version));
    }

    let drift = (doc.modified_at - entry.modified_client.with_timezone(&Utc))
        .num_milliseconds()
        .abs();
    if drift >= 1_000 {
        bail!(HarnessError::Assertion(format!(
            "document {}: timestamp drift of {drift} ms (server {}, expected {})",
            doc.id, entry.modified_client, doc.modified_at,
        )));
    }

    if doc.kind != entry.kind {
        bail!(assertion(doc, "type", &entry.kind, &doc.kind));
    }

    if doc.name != entry.name {
        bail!(assertion(doc, "name", &entry.name, &doc.name));
    }

    if doc.current_page != entry.current_page {
        bail!(assertion(doc, "current page", &entry.current_page, &doc.current_page));
    }

    if doc.bookmarked != entry.bookmarked {
        bail!(assertion(doc, "bookmark", &entry.bookmarked, &doc.bookmarked));
    }

    if doc.parent != entry.parent {
        bail!(assertion(doc, "parent", &entry.parent, &doc.parent));
    }

    Ok(())
}

/// Pair the captured notification stream positionally against the expected
/// event log. A length mismatch is a failure: the settling delay guarantees
/// delivery, and every effectful operation produces exactly one event.
pub fn verify_notifications(
    expected: &[ExpectedEvent],
    records: &[NotificationRecord],
) -> EyreResult<()> {
    if expected.len() != records.len() {
        bail!(HarnessError::Assertion(format!(
            "expected {} notifications, captured {}",
            expected.len(),
            records.len(),
        )));
    }

    for (index, (event, record)) in expected.iter().zip(records).enumerate() {
        let doc = &event.snapshot;

        if record.event != event.kind.wire_name() {
            bail!(notification_assertion(index, "event", &record.event, &event.kind.wire_name()));
        }

        if record.id != doc.id {
            bail!(notification_assertion(index, "id", &record.id, &doc.id));
        }

        if record.version_number()? != doc.version {
            bail!(notification_assertion(index, "version", &record.version, &doc.version));
        }

        if record.vissible_name != doc.name {
            bail!(notification_assertion(index, "name", &record.vissible_name, &doc.name));
        }

        if record.parent != doc.parent {
            bail!(notification_assertion(index, "parent", &record.parent, &doc.parent));
        }

        if record.kind != doc.kind.wire_name() {
            bail!(notification_assertion(index, "type", &record.kind, &doc.kind.wire_name()));
        }

        if record.bookmarked_flag()? != doc.bookmarked {
            bail!(notification_assertion(index, "bookmark", &record.bookmarked, &doc.bookmarked));
        }
    }

    Ok(())
}

fn assertion(
    doc: &Document,
    field: &str,
    got: &dyn core::fmt::Debug,
    expected: &dyn core::fmt::Debug,
) -> HarnessError {
    HarnessError::Assertion(format!(
        "document {}: {field} mismatch (server {got:?}, expected {expected:?})",
        doc.id,
    ))
}

fn notification_assertion(
    index: usize,
    field: &str,
    got: &dyn core::fmt::Debug,
    expected: &dyn core::fmt::Debug,
) -> HarnessError {
    HarnessError::Assertion(format!(
        "notification {index}: {field} mismatch (wire {got:?}, expected {expected:?})"
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use crate::model::{EventKind, ROOT_PARENT};

    use super::*;

    fn doc() -> Document {
        Document {
            id: "d1".to_owned(),
            name: "notes".to_owned(),
            kind: DocKind::Document,
            data: Some(vec![1, 2, 3]),
            current_page: 5,
            bookmarked: true,
            parent: ROOT_PARENT.to_owned(),
            modified_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap(),
            version: 2,
        }
    }

    fn entry() -> DocumentEntry {
        serde_json::from_value(serde_json::json!({
            "ID": "d1",
            "Version": 2,
            "ModifiedClient": "2024-05-01T12:30:45Z",
            "Type": "DocumentType",
            "VissibleName": "notes",
            "CurrentPage": 5,
            "Bookmarked": true,
            "Parent": "",
        }))
        .expect("deserialize")
    }

    fn record() -> NotificationRecord {
        NotificationRecord {
            event: "DocAdded".to_owned(),
            id: "d1".to_owned(),
            version: "2".to_owned(),
            vissible_name: "notes".to_owned(),
            parent: ROOT_PARENT.to_owned(),
            bookmarked: "true".to_owned(),
            kind: "DocumentType".to_owned(),
        }
    }

    #[test]
    fn matching_document_passes_field_checks() {
        check_document(&doc(), &entry()).expect("fields should match");
    }

    #[test]
    fn subsecond_timestamp_drift_is_tolerated() {
        let mut d = doc();
        d.modified_at += Duration::milliseconds(999);

        check_document(&d, &entry()).expect("sub-second drift should pass");

        d.modified_at += Duration::milliseconds(2);
        assert!(check_document(&d, &entry()).is_err());
    }

    #[test]
    fn version_mismatch_is_an_assertion_failure() {
        let mut d = doc();
        d.version = 3;

        let err = check_document(&d, &entry()).expect_err("must fail");
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn matching_notification_sequence_passes() {
        let expected = vec![ExpectedEvent {
            kind: EventKind::Added,
            snapshot: doc(),
        }];

        verify_notifications(&expected, &[record()]).expect("sequences should match");
    }

    #[test]
    fn decoded_wire_coercions_are_compared() {
        let expected = vec![ExpectedEvent {
            kind: EventKind::Added,
            snapshot: doc(),
        }];

        let mut wrong_version = record();
        wrong_version.version = "3".to_owned();
        assert!(verify_notifications(&expected, &[wrong_version]).is_err());

        let mut wrong_bookmark = record();
        wrong_bookmark.bookmarked = "false".to_owned();
        assert!(verify_notifications(&expected, &[wrong_bookmark]).is_err());
    }

    #[test]
    fn deleted_events_require_the_delete_tag() {
        let expected = vec![ExpectedEvent {
            kind: EventKind::Deleted,
            snapshot: doc(),
        }];

        let err = verify_notifications(&expected, &[record()]).expect_err("must fail");
        assert!(err.to_string().contains("event mismatch"));
    }

    #[test]
    fn length_mismatch_is_flagged() {
        let expected = vec![ExpectedEvent {
            kind: EventKind::Added,
            snapshot: doc(),
        }];

        let err = verify_notifications(&expected, &[]).expect_err("must fail");
        assert!(err.to_string().contains("captured 0"));
    }
}
