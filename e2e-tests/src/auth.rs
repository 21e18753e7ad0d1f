use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use jsonwebtoken::{EncodingKey, Header};
use serde::Serialize;
use tracing::debug;

use crate::connection::Connection;
use crate::errors::HarnessError;
use crate::protocol::{
    DeviceCodeResponse, DiscoveryResponse, RegisterDeviceRequest, ADMIN_DEVICE_CODE_PATH,
    NEW_DEVICE_PATH, NEW_USER_PATH, SERVICE_DISCOVERY_PATH,
};

#[derive(Debug, Serialize)]
struct AdminClaims {
    sub: &'static str,
}

/// Mint the administrative bearer token from the service's locally
/// persisted signing secret (hex-encoded under `jwt_secret_key` in its
/// sqlite `config` table). HS256, subject-only claim.
pub fn mint_admin_token(db_path: &Utf8Path) -> EyreResult<String> {
    let conn = rusqlite::Connection::open(db_path)
        .wrap_err_with(|| format!("failed to open service database at {db_path}"))?;

    let secret: String = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'jwt_secret_key'",
            [],
            |row| row.get(0),
        )
        .wrap_err("jwt_secret_key not found in service database")?;

    let secret = hex::decode(secret).wrap_err("corrupt jwt_secret_key in service database")?;

    let token = jsonwebtoken::encode(
        &Header::default(),
        &AdminClaims { sub: "Admin Token" },
        &EncodingKey::from_secret(&secret),
    )?;

    Ok(token)
}

/// Resolve the logical service name to the host all further calls go to.
pub async fn discover(conn: &Connection) -> EyreResult<String> {
    let response: DiscoveryResponse = conn
        .get(SERVICE_DISCOVERY_PATH)
        .await
        .wrap_err_with(|| HarnessError::Discovery("service lookup returned no host".to_owned()))?;

    debug!(host = %response.host, "service discovery succeeded");

    Ok(response.host)
}

/// Obtain a short-lived device enrollment code from the admin endpoint.
pub async fn request_device_code(admin: &Connection) -> EyreResult<String> {
    let response: DeviceCodeResponse = admin
        .post(ADMIN_DEVICE_CODE_PATH, None::<&()>)
        .await
        .wrap_err_with(|| HarnessError::Auth("device code request".to_owned()))?;

    Ok(response.code)
}

/// Exchange the enrollment code for a long-lived device credential.
pub async fn register_device(
    conn: &Connection,
    code: String,
    device_desc: String,
    device_id: String,
) -> EyreResult<String> {
    let request = RegisterDeviceRequest {
        code,
        device_desc,
        device_id,
    };

    conn.post_text(NEW_DEVICE_PATH, Some(&request))
        .await
        .wrap_err_with(|| HarnessError::Auth("device registration".to_owned()))
}

/// Exchange the device credential for the user credential that authorizes
/// all document operations.
pub async fn create_user(device: &Connection) -> EyreResult<String> {
    device
        .post_text::<()>(NEW_USER_PATH, None)
        .await
        .wrap_err_with(|| HarnessError::Auth("user token request".to_owned()))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct DecodedClaims {
        sub: String,
    }

    #[test]
    fn admin_token_is_signed_with_the_persisted_secret() {
        let db_path = Utf8PathBuf::from_path_buf(
            std::env::temp_dir().join(format!("foobox-auth-test-{}.sqlite", uuid::Uuid::new_v4())),
        )
        .expect("temp dir should be utf-8");

        let secret = [7_u8; 32];

        {
            let conn = rusqlite::Connection::open(&db_path).expect("create db");
            conn.execute_batch("CREATE TABLE config (key TEXT PRIMARY KEY, value TEXT)")
                .expect("create table");
            conn.execute(
                "INSERT INTO config (key, value) VALUES ('jwt_secret_key', ?1)",
                [hex::encode(secret)],
            )
            .expect("insert secret");
        }

        let token = mint_admin_token(&db_path).expect("mint");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub"]);

        let decoded = jsonwebtoken::decode::<DecodedClaims>(
            &token,
            &DecodingKey::from_secret(&secret),
            &validation,
        )
        .expect("decode");

        assert_eq!(decoded.claims.sub, "Admin Token");

        let _ignored = std::fs::remove_file(db_path);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let db_path = Utf8PathBuf::from_path_buf(
            std::env::temp_dir().join(format!("foobox-auth-test-{}.sqlite", uuid::Uuid::new_v4())),
        )
        .expect("temp dir should be utf-8");

        {
            let conn = rusqlite::Connection::open(&db_path).expect("create db");
            conn.execute_batch("CREATE TABLE config (key TEXT PRIMARY KEY, value TEXT)")
                .expect("create table");
        }

        assert!(mint_admin_token(&db_path).is_err());

        let _ignored = std::fs::remove_file(db_path);
    }
}
