use chrono::Utc;
use eyre::Result as EyreResult;
use rand::Rng;
use tracing::debug;

use crate::model::{
    DocKind, Document, DocumentModel, EventKind, ExpectedEvent, ROOT_PARENT,
};
use crate::protocol::{DocumentApi, MetadataUpdate};

/// Characters the backend accepts in display names; mirrors what real
/// clients produce (letters, digits and punctuation).
pub(crate) const NAME_CHARSET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\
      !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// One randomized lifecycle operation, fully decided before any state or
/// wire effect happens. Index fields refer to the model at planning time.
#[derive(Debug, Eq, PartialEq)]
pub enum PlannedOp {
    Create(Document),
    Mutate { index: usize, change: FieldChange },
    Move { index: usize, parent: String },
    Delete { index: usize },
}

#[derive(Debug, Eq, PartialEq)]
pub enum FieldChange {
    Name(String),
    CurrentPage(i64),
    Bookmarked,
    Payload(Vec<u8>),
}

/// What must go over the wire after the model has been updated. Built
/// exclusively from post-mutation model state.
#[derive(Debug)]
pub enum WireAction {
    /// Optional blob replacement followed by a metadata update.
    Update {
        blob: Option<(String, i64, Vec<u8>)>,
        update: MetadataUpdate,
    },
    Delete { id: String, version: i64 },
}

/// Decide the next operation, or `None` for an iteration that must not
/// touch any state (empty-model picks, self-parenting moves, payload
/// mutation of a payload-less document).
///
/// Pure with respect to the model: all preconditions are checked here,
/// before anything is mutated.
pub fn plan(model: &DocumentModel, rng: &mut impl Rng) -> Option<PlannedOp> {
    match rng.gen_range(0..4_u8) {
        0 => Some(PlannedOp::Create(plan_create(model, rng))),
        1 => {
            if model.is_empty() {
                return None;
            }

            let index = rng.gen_range(0..model.len());
            let change = match rng.gen_range(0..4_u8) {
                0 => FieldChange::Name(random_name(rng)),
                1 => FieldChange::CurrentPage(rng.gen_range(0..100)),
                2 => FieldChange::Bookmarked,
                _ => {
                    if model.get(index).data.is_none() {
                        return None;
                    }

                    FieldChange::Payload(random_payload(rng))
                }
            };

            Some(PlannedOp::Mutate { index, change })
        }
        2 => {
            if model.is_empty() {
                return None;
            }

            let index = rng.gen_range(0..model.len());
            let parent_index = rng.gen_range(0..model.len());

            if index == parent_index {
                return None;
            }

            Some(PlannedOp::Move {
                index,
                parent: model.get(parent_index).id.clone(),
            })
        }
        _ => {
            if model.is_empty() {
                return None;
            }

            Some(PlannedOp::Delete {
                index: rng.gen_range(0..model.len()),
            })
        }
    }
}

fn plan_create(model: &DocumentModel, rng: &mut impl Rng) -> Document {
    let (kind, data) = if rng.gen_bool(0.5) {
        (DocKind::Document, Some(random_payload(rng)))
    } else {
        (DocKind::Collection, None)
    };

    let parent_pick = rng.gen_range(0..=model.len());
    let parent = if parent_pick == model.len() {
        ROOT_PARENT.to_owned()
    } else {
        model.get(parent_pick).id.clone()
    };

    Document {
        id: uuid::Uuid::new_v4().to_string(),
        name: random_name(rng),
        kind,
        data,
        current_page: rng.gen_range(0..4),
        bookmarked: rng.gen_bool(0.5),
        parent,
        modified_at: Utc::now(),
        version: 1,
    }
}

fn random_name(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(8..20);

    (0..len)
        .map(|_| char::from(NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())]))
        .collect()
}

fn random_payload(rng: &mut impl Rng) -> Vec<u8> {
    let len = rng.gen_range(1..128);

    (0..len).map(|_| rng.gen()).collect()
}

/// Apply a planned operation to the model, record the expected notification,
/// and return the wire request it must produce. The model is always updated
/// before the request is constructed.
pub fn apply(
    model: &mut DocumentModel,
    expected: &mut Vec<ExpectedEvent>,
    op: PlannedOp,
) -> WireAction {
    match op {
        PlannedOp::Create(doc) => {
            let blob = doc
                .data
                .as_ref()
                .map(|data| (doc.id.clone(), doc.version, data.clone()));

            let update = MetadataUpdate::new(doc.id.clone(), doc.version)
                .modified(doc.modified_at)
                .kind(doc.kind)
                .name(doc.name.clone())
                .current_page(doc.current_page)
                .bookmarked(doc.bookmarked)
                .parent(doc.parent.clone());

            expected.push(ExpectedEvent {
                kind: EventKind::Added,
                snapshot: doc.clone(),
            });
            model.insert(doc);

            WireAction::Update { blob, update }
        }
        PlannedOp::Mutate { index, change } => {
            let doc = model.get_mut(index);
            doc.touch();

            let mut blob = None;
            let mut update =
                MetadataUpdate::new(doc.id.clone(), doc.version).modified(doc.modified_at);

            match change {
                FieldChange::Name(name) => {
                    doc.name = name;
                    update = update.name(doc.name.clone());
                }
                FieldChange::CurrentPage(page) => {
                    doc.current_page = page;
                    update = update.current_page(page);
                }
                FieldChange::Bookmarked => {
                    doc.bookmarked = !doc.bookmarked;
                    update = update.bookmarked(doc.bookmarked);
                }
                FieldChange::Payload(data) => {
                    // Blob replacement: upload under the new version, then
                    // touch the metadata so the timestamp moves with it.
                    blob = Some((doc.id.clone(), doc.version, data.clone()));
                    doc.data = Some(data);
                }
            }

            expected.push(ExpectedEvent {
                kind: EventKind::Added,
                snapshot: doc.clone(),
            });

            WireAction::Update { blob, update }
        }
        PlannedOp::Move { index, parent } => {
            let doc = model.get_mut(index);
            doc.touch();
            doc.parent = parent;

            let update = MetadataUpdate::new(doc.id.clone(), doc.version)
                .modified(doc.modified_at)
                .parent(doc.parent.clone());

            expected.push(ExpectedEvent {
                kind: EventKind::Added,
                snapshot: doc.clone(),
            });

            WireAction::Update { blob: None, update }
        }
        PlannedOp::Delete { index } => {
            let doc = model.remove(index);
            let action = WireAction::Delete {
                id: doc.id.clone(),
                version: doc.version,
            };

            expected.push(ExpectedEvent {
                kind: EventKind::Deleted,
                snapshot: doc,
            });

            action
        }
    }
}

/// Drives a randomized document lifecycle sequence against the service
/// while maintaining the expected-state model and the notification oracle.
#[derive(Debug)]
pub struct MutationEngine<'a> {
    api: &'a DocumentApi,
    model: DocumentModel,
    expected: Vec<ExpectedEvent>,
}

impl<'a> MutationEngine<'a> {
    pub fn new(api: &'a DocumentApi) -> Self {
        Self {
            api,
            model: DocumentModel::default(),
            expected: Vec::new(),
        }
    }

    pub async fn run(&mut self, iterations: usize) -> EyreResult<()> {
        for iteration in 0..iterations {
            let Some(op) = plan(&self.model, &mut rand::thread_rng()) else {
                continue;
            };

            debug!(iteration, ?op, "executing lifecycle operation");

            let action = apply(&mut self.model, &mut self.expected, op);

            self.issue(action).await?;
        }

        Ok(())
    }

    pub fn into_parts(self) -> (DocumentModel, Vec<ExpectedEvent>) {
        (self.model, self.expected)
    }

    async fn issue(&self, action: WireAction) -> EyreResult<()> {
        match action {
            WireAction::Update { blob, update } => {
                if let Some((id, version, data)) = blob {
                    self.api.upload_blob(&id, version, &data).await?;
                }

                self.api.update_metadata(update).await
            }
            WireAction::Delete { id, version } => self.api.delete(&id, version).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn run_sequence(seed: u64, iterations: usize) -> (DocumentModel, Vec<ExpectedEvent>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = DocumentModel::default();
        let mut expected = Vec::new();

        for _ in 0..iterations {
            if let Some(op) = plan(&model, &mut rng) {
                let _action = apply(&mut model, &mut expected, op);
            }
        }

        (model, expected)
    }

    #[test]
    fn planned_ops_support_full_equality() {
        fn assert_full_eq<T: Eq>() {}

        assert_full_eq::<PlannedOp>();
        assert_full_eq::<FieldChange>();

        let mut rng = StdRng::seed_from_u64(5);
        let doc = plan_create(&DocumentModel::default(), &mut rng);

        assert_eq!(
            PlannedOp::Create(doc.clone()),
            PlannedOp::Create(doc),
        );
    }

    #[test]
    fn empty_model_only_ever_plans_creates() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = DocumentModel::default();

        for _ in 0..256 {
            match plan(&model, &mut rng) {
                None | Some(PlannedOp::Create(_)) => {}
                Some(other) => panic!("unexpected op on empty model: {other:?}"),
            }
        }
    }

    #[test]
    fn versions_are_strictly_monotonic_per_document() {
        for seed in 0..8 {
            let (_model, expected) = run_sequence(seed, 200);

            let mut last_seen: HashMap<String, i64> = HashMap::new();
            for event in &expected {
                let doc = &event.snapshot;
                if let Some(previous) = last_seen.get(&doc.id) {
                    match event.kind {
                        // Deletes ship the current version unchanged.
                        EventKind::Deleted => assert_eq!(doc.version, *previous),
                        EventKind::Added => assert_eq!(
                            doc.version,
                            previous + 1,
                            "version must advance by exactly 1 per mutation"
                        ),
                    }
                }

                let _previous = last_seen.insert(doc.id.clone(), doc.version);
            }
        }
    }

    #[test]
    fn payloads_only_exist_on_document_kind() {
        let (model, expected) = run_sequence(42, 300);

        for event in &expected {
            match event.snapshot.kind {
                DocKind::Document => assert!(event.snapshot.data.is_some()),
                DocKind::Collection => assert!(event.snapshot.data.is_none()),
            }
        }

        for id in model.ids() {
            let doc = model.find(id).expect("listed id");
            if doc.kind == DocKind::Collection {
                assert!(doc.data.is_none());
            }
        }
    }

    #[test]
    fn no_document_is_ever_its_own_parent() {
        let (_model, expected) = run_sequence(7, 300);

        for event in &expected {
            assert_ne!(event.snapshot.id, event.snapshot.parent);
        }
    }

    #[test]
    fn created_names_and_payloads_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..100 {
            let name = random_name(&mut rng);
            assert!((8..20).contains(&name.chars().count()));

            let payload = random_payload(&mut rng);
            assert!((1..128).contains(&payload.len()));
        }
    }

    #[test]
    fn deletes_remove_from_model_and_record_final_snapshot() {
        let (model, expected) = run_sequence(3, 300);

        for event in expected.iter().filter(|e| e.kind == EventKind::Deleted) {
            // A deleted document may be re-created only with a fresh uuid,
            // so its id never reappears in the model.
            assert!(model.find(&event.snapshot.id).is_none());
        }
    }

    #[test]
    fn apply_emits_exactly_one_event_per_effectful_op() {
        let (model, expected) = run_sequence(11, 200);

        let creates = expected
            .iter()
            .filter(|e| e.kind == EventKind::Added && e.snapshot.version == 1)
            .count();
        let deletes = expected
            .iter()
            .filter(|e| e.kind == EventKind::Deleted)
            .count();

        assert_eq!(creates - deletes, model.len());
    }
}
