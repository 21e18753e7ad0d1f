use serde::{Deserialize, Serialize};

use crate::steps::TestStep;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub device: DeviceConfig,
    pub steps: Box<[TestStep]>,
}

/// Identity the harness enrolls under during the device handshake.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub description: String,
    pub id: String,
}
