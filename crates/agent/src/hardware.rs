//! Device hardware description.

use serde::Deserialize;

use crate::bus::BusCaller;
use crate::error::Result;

/// Bus object describing the device.
pub const HARDWARE_PATH: &str = "System.Hardware";

/// Fields of the `System.Hardware` bus object.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
pub struct SystemHardware {
    /// Product class.
    pub product_class: String,
    /// Marketing name.
    pub friendly_name: String,
    /// Manufacturer.
    pub manufacturer: String,
    /// Model name.
    pub model: String,
    /// Hardware variant.
    pub variant: String,
    /// Casing colour.
    pub casing_colour: String,
    /// MAC address without separators.
    #[serde(rename = "MAC")]
    pub mac: String,
    /// Serial number.
    pub serial_number: String,
    /// Carrier.
    pub carrier: String,
    /// Firmware version.
    pub software_version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ResponseHeader {
    code: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HardwareResponse {
    #[serde(default)]
    response: ResponseHeader,
    body: SystemHardware,
}

impl SystemHardware {
    /// Fixed description used in standalone mode.
    #[must_use]
    pub fn sample() -> Self {
        Self {
            product_class: "Sample Device".to_string(),
            friendly_name: "Edgewire Sample Device".to_string(),
            manufacturer: "Edgewire".to_string(),
            model: "HG5244B".to_string(),
            variant: "Edgewire".to_string(),
            casing_colour: "Black".to_string(),
            mac: "AABBCCDDEEFF".to_string(),
            serial_number: "AAAAA00001".to_string(),
            carrier: "Edgewire".to_string(),
            software_version: "FAKE.1.2.3".to_string(),
        }
    }

    /// Parses a `Get` response of the hardware object.
    ///
    /// # Errors
    ///
    /// Fails if the text is not JSON or has no `Body`.
    pub fn parse(text: &str) -> Result<Self> {
        let response: HardwareResponse = serde_json::from_str(text)?;
        tracing::debug!(
            code = response.response.code,
            name = %response.response.name,
            "hardware response"
        );
        Ok(response.body)
    }

    /// Reads the hardware object from the bus.
    ///
    /// # Errors
    ///
    /// Fails if the bus call fails or the response cannot be parsed.
    pub async fn query(bus: &dyn BusCaller) -> Result<Self> {
        let text = bus.call("Get", HARDWARE_PATH, "").await?;
        Self::parse(&text)
    }

    /// Arguments of the `F_IDENTIFY` request: serial, MAC, model, firmware.
    #[must_use]
    pub fn identification(&self) -> [&str; 4] {
        [
            self.serial_number.as_str(),
            self.mac.as_str(),
            self.model.as_str(),
            self.software_version.as_str(),
        ]
    }
}
