use eyre::{bail, Result as EyreResult};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::auth;
use crate::connection::Connection;
use crate::driver::{Test, TestContext};
use crate::errors::HarnessError;
use crate::listener;
use crate::model::DocKind;
use crate::protocol::{DocumentApi, MetadataUpdate};

/// Probes every authenticated endpoint with a wrong-class or garbage
/// credential and requires exactly a 401 back — never success, never a
/// different failure.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationStep {}

impl Test for AuthorizationStep {
    fn display_name(&self) -> String {
        "authorization boundary".to_owned()
    }

    async fn run_assert(&self, ctx: &mut TestContext) -> EyreResult<()> {
        let host = ctx.host().to_owned();
        let anon = Connection::new(host.clone());

        // Device registration with a code nobody issued.
        expect_unauthorized(
            "device registration",
            auth::register_device(
                &anon,
                "foobar".to_owned(),
                "foobar".to_owned(),
                "foobar".to_owned(),
            )
            .await,
        )?;

        // User minting authenticates with a device token, not a user token.
        let user_conn = Connection::new(host.clone()).with_token(ctx.user_token().to_owned());
        expect_unauthorized("user token minting", auth::create_user(&user_conn).await)?;

        // Document endpoints authenticate with a user token, not a device
        // token.
        let device_api = DocumentApi::new(
            Connection::new(host.clone()).with_token(ctx.device_token().to_owned()),
        );

        expect_unauthorized("document listing", device_api.list().await)?;
        expect_unauthorized("blob upload", device_api.upload_blob("", 1, &[]).await)?;
        expect_unauthorized(
            "metadata update",
            device_api
                .update_metadata(MetadataUpdate::new(String::new(), 2).kind(DocKind::Document))
                .await,
        )?;
        expect_unauthorized("document delete", device_api.delete("", 1).await)?;

        // The push channel rejects non-user credentials during the
        // handshake.
        match listener::connect(&host, ctx.device_token()).await {
            Ok(_stream) => bail!(HarnessError::Authorization {
                endpoint: "notification channel".to_owned(),
                outcome: "connection accepted".to_owned(),
            }),
            Err(WsError::Http(response)) if response.status().as_u16() == 401 => {}
            Err(err) => bail!(HarnessError::Authorization {
                endpoint: "notification channel".to_owned(),
                outcome: err.to_string(),
            }),
        }

        ctx.output_writer
            .write_str("All authenticated endpoints rejected bad credentials with 401");

        Ok(())
    }
}

fn expect_unauthorized<T>(endpoint: &str, result: EyreResult<T>) -> EyreResult<()> {
    let err = match result {
        Ok(_) => bail!(HarnessError::Authorization {
            endpoint: endpoint.to_owned(),
            outcome: "success".to_owned(),
        }),
        Err(err) => err,
    };

    // Auth-flow helpers re-wrap transport failures, so walk the chain for
    // the underlying status.
    let status = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<HarnessError>())
        .find_map(|harness_err| match harness_err {
            HarnessError::Request { status, .. } => Some(*status),
            _ => None,
        });

    match status {
        Some(401) => Ok(()),
        _ => bail!(HarnessError::Authorization {
            endpoint: endpoint.to_owned(),
            outcome: err.to_string(),
        }),
    }
}
