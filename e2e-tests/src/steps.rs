use eyre::Result as EyreResult;
use serde::{Deserialize, Serialize};

use crate::driver::{Test, TestContext};

mod authorization;
mod lifecycle;
mod stress;

use authorization::AuthorizationStep;
use lifecycle::DocumentLifecycleStep;
use stress::StressStep;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestStep {
    Authorization(AuthorizationStep),
    DocumentLifecycle(DocumentLifecycleStep),
    Stress(StressStep),
}

impl Test for TestStep {
    fn display_name(&self) -> String {
        match self {
            Self::Authorization(step) => step.display_name(),
            Self::DocumentLifecycle(step) => step.display_name(),
            Self::Stress(step) => step.display_name(),
        }
    }

    async fn run_assert(&self, ctx: &mut TestContext) -> EyreResult<()> {
        match self {
            Self::Authorization(step) => step.run_assert(ctx).await,
            Self::DocumentLifecycle(step) => step.run_assert(ctx).await,
            Self::Stress(step) => step.run_assert(ctx).await,
        }
    }
}
