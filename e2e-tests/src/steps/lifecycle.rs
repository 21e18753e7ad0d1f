use core::time::Duration;

use eyre::Result as EyreResult;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::driver::{Test, TestContext};
use crate::engine::MutationEngine;
use crate::listener::NotificationListener;
use crate::verify;

/// Randomized document lifecycle sequence with full state and notification
/// reconciliation afterwards.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLifecycleStep {
    pub iterations: usize,
    /// How long to wait for in-flight notifications before cancelling the
    /// listener.
    pub settle_ms: u64,
}

impl Test for DocumentLifecycleStep {
    fn display_name(&self) -> String {
        format!("document lifecycle ({} iterations)", self.iterations)
    }

    async fn run_assert(&self, ctx: &mut TestContext) -> EyreResult<()> {
        // The channel must be open before the first mutation so every
        // produced notification is observable.
        let listener = NotificationListener::spawn(ctx.host(), ctx.user_token()).await?;

        let mut engine = MutationEngine::new(&ctx.api);
        engine.run(self.iterations).await?;

        let (model, expected) = engine.into_parts();

        ctx.output_writer
            .write_str(&format!("Produced {} expected events", expected.len()));

        verify::verify_state(&ctx.api, model, ctx.output_writer).await?;

        sleep(Duration::from_millis(self.settle_ms)).await;

        let records = listener.finish().await?;

        ctx.output_writer
            .write_str(&format!("Captured {} notifications", records.len()));

        verify::verify_notifications(&expected, &records)
    }
}
