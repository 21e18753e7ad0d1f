use chrono::Utc;
use eyre::Result as EyreResult;
use futures_util::future::try_join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::driver::{Test, TestContext};
use crate::engine::NAME_CHARSET;
use crate::model::DocKind;
use crate::protocol::MetadataUpdate;

/// Concurrent write-contention probe: a batch of creates, then updates,
/// then deletes against distinct ids, each phase fully settled before the
/// next starts so a failure isolates to one operation type.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressStep {
    pub batch: usize,
}

impl Test for StressStep {
    fn display_name(&self) -> String {
        format!("concurrent stress ({} writers)", self.batch)
    }

    async fn run_assert(&self, ctx: &mut TestContext) -> EyreResult<()> {
        let ids: Vec<String> = (0..self.batch)
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        ctx.output_writer
            .write_phase(1, &format!("{} concurrent blob creates", ids.len()));

        let _results = try_join_all(ids.iter().map(|id| ctx.api.upload_blob(id, 1, &[]))).await?;

        ctx.output_writer
            .write_phase(2, &format!("{} concurrent metadata updates", ids.len()));

        let updates: Vec<_> = ids
            .iter()
            .map(|id| {
                MetadataUpdate::new(id.clone(), 1)
                    .modified(Utc::now())
                    .kind(DocKind::Document)
                    .name(random_name(16))
            })
            .collect();

        let _results = try_join_all(
            updates
                .into_iter()
                .map(|update| ctx.api.update_metadata(update)),
        )
        .await?;

        ctx.output_writer
            .write_phase(3, &format!("{} concurrent deletes", ids.len()));

        let _results = try_join_all(ids.iter().map(|id| ctx.api.delete(id, 1))).await?;

        Ok(())
    }
}

fn random_name(len: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..len)
        .map(|_| char::from(NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_names_draw_from_the_shared_display_charset() {
        let mut punctuation_seen = false;

        for _ in 0..64 {
            let name = random_name(16);

            assert_eq!(name.chars().count(), 16);

            for c in name.chars() {
                assert!(
                    NAME_CHARSET.contains(&(c as u8)),
                    "character {c:?} outside the display-name charset"
                );
                punctuation_seen |= !c.is_ascii_alphanumeric();
            }
        }

        // 1024 draws from a charset that is one-third punctuation.
        assert!(punctuation_seen);
    }
}

