//! Scenario driver for one switch endpoint.
//!
//! Combines the serial device and the zigbee2mqtt bridge so a scenario can
//! read as a causal sequence: act, wait for the firmware's log line, wait for
//! the network report, assert. Every wait consumes its channel in order.

use super::attributes::{Attribute, AttributeValue, ON_OFF_CLUSTER, SWITCH_CFG_CLUSTER};
use super::button::{ActionKind, ButtonState, LevelCommand, SwitchCommand};
use super::serial_device::SerialDevice;
use crate::error::{HarnessError, Result};
use crate::input::mqtt::{BindRequest, Cluster, EndpointPath, StateMessage, ZigbeeBridge};
use log::{debug, info};
use serde_json::{Map, Value};

pub struct SmartSwitch {
    device: SerialDevice,
    bridge: ZigbeeBridge,
    ep: u8,
    z2m_name: String,
    coordinator: String,
}

impl SmartSwitch {
    /// Attach to endpoint `ep`, exposed in zigbee2mqtt as `z2m_name`.
    ///
    /// Subscribes to state reports and clears any Level Control binding a
    /// previous run may have left behind.
    pub async fn new(
        device: SerialDevice,
        bridge: ZigbeeBridge,
        ep: u8,
        z2m_name: impl Into<String>,
        coordinator: impl Into<String>,
    ) -> Result<Self> {
        let mut switch = Self {
            device,
            bridge,
            ep,
            z2m_name: z2m_name.into(),
            coordinator: coordinator.into(),
        };

        switch.bridge.subscribe().await?;
        switch.unbind(Cluster::GenLevelCtrl).await?;
        Ok(switch)
    }

    /// zigbee2mqtt endpoint name for a firmware endpoint (EP 2 is `button_1`).
    pub fn default_z2m_name(ep: u8) -> String {
        format!("button_{}", ep.saturating_sub(1))
    }

    pub fn endpoint(&self) -> u8 {
        self.ep
    }

    /// Button index used in serial commands.
    pub fn button(&self) -> u8 {
        self.ep.saturating_sub(1)
    }

    pub fn z2m_name(&self) -> &str {
        &self.z2m_name
    }

    pub fn into_parts(self) -> (SerialDevice, ZigbeeBridge) {
        (self.device, self.bridge)
    }

    /// Reset the device. Serial lines and state reports queued before the
    /// reset are dropped.
    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting device (EP={})", self.ep);
        self.device.reset()?;
        let stale = self.bridge.observer().discard_pending();
        if stale > 0 {
            debug!("Dropped {} state report(s) from before the reset", stale);
        }
        Ok(())
    }

    /// Known starting point for a scenario: a freshly reset device with no
    /// Level Control binding left over from an earlier scenario.
    pub async fn prepare(&mut self) -> Result<()> {
        self.reset()?;
        self.unbind(Cluster::GenLevelCtrl).await
    }

    /// `<kind>_<name>`, as reported in the `action` property.
    pub fn action_name(&self, kind: ActionKind) -> String {
        format!("{}_{}", kind, self.z2m_name)
    }

    fn state_property(&self) -> String {
        format!("state_{}", self.z2m_name)
    }

    fn state_change_msg(&self, expected_state: bool) -> String {
        format!(
            "SwitchEndpoint EP={}: do state change {}",
            self.ep,
            u8::from(expected_state)
        )
    }

    fn read_attribute_msg(&self, cluster: &str, attr_id: &str) -> String {
        format!(
            "ZCL Read Attribute: EP={} Cluster={} Command=00 Attr={}",
            self.ep, cluster, attr_id
        )
    }

    /// Publish a `/set`, wait for the firmware's confirmation line, then for
    /// the echoed report. Returns the echoed value.
    async fn set_device_attribute(
        &mut self,
        property: &str,
        value: Value,
        confirmation: &str,
    ) -> Result<Value> {
        debug!("Setting {} = {}", property, value);
        self.bridge.set(property, value).await?;
        self.device.wait_str(confirmation).await?;
        self.bridge.wait_attribute(property).await
    }

    /// Publish a `/get`, wait for the firmware's read line, then for the report.
    async fn get_device_attribute(&mut self, property: &str, confirmation: &str) -> Result<Value> {
        debug!("Reading {}", property);
        self.bridge.get(property).await?;
        self.device.wait_str(confirmation).await?;
        self.bridge.wait_attribute(property).await
    }

    /// Switch the relay and return the reported state (`"ON"`/`"OFF"`).
    pub async fn switch(&mut self, cmd: SwitchCommand, expected_state: bool) -> Result<String> {
        let confirmation = self.state_change_msg(expected_state);
        let property = self.state_property();
        let value = self
            .set_device_attribute(&property, Value::String(cmd.to_string()), &confirmation)
            .await?;
        Ok(value_text(value))
    }

    pub async fn get_state(&mut self) -> Result<String> {
        let confirmation = self.read_attribute_msg(ON_OFF_CLUSTER, "0000");
        let property = self.state_property();
        let value = self.get_device_attribute(&property, &confirmation).await?;
        Ok(value_text(value))
    }

    pub async fn wait_state_change_msg(&mut self, expected_state: bool) -> Result<()> {
        let msg = self.state_change_msg(expected_state);
        self.device.wait_str(&msg).await?;
        Ok(())
    }

    /// Write a switch option and return the value zigbee2mqtt echoes.
    ///
    /// The value is checked against the attribute's domain before anything is
    /// sent. A missing `ZCL Write Attribute` line fails with
    /// `AttributeWriteTimeout`.
    pub async fn set_attribute(
        &mut self,
        attr: Attribute,
        value: impl AsRef<str>,
    ) -> Result<AttributeValue> {
        let value = attr.validate(value.as_ref())?;
        let property = attr.property(&self.z2m_name);
        let confirmation = format!(
            "ZCL Write Attribute: Cluster {} Attrib {}",
            SWITCH_CFG_CLUSTER,
            attr.wire_id()
        );

        let echoed = match self
            .set_device_attribute(&property, value, &confirmation)
            .await
        {
            Err(HarnessError::Timeout { expected, elapsed }) if expected == confirmation => {
                return Err(HarnessError::AttributeWriteTimeout {
                    attribute: attr.to_string(),
                    elapsed,
                });
            }
            other => other?,
        };
        Ok(AttributeValue::from_json(&echoed))
    }

    /// `set_attribute` by logical name; unknown names fail before any I/O.
    pub async fn set_attribute_by_name(
        &mut self,
        name: &str,
        value: impl AsRef<str>,
    ) -> Result<AttributeValue> {
        let attr = Attribute::from_name(name)?;
        self.set_attribute(attr, value).await
    }

    /// Read a switch option. Numeric attributes come back as numbers even if
    /// zigbee2mqtt reports them as strings.
    pub async fn get_attribute(&mut self, attr: Attribute) -> Result<AttributeValue> {
        let property = attr.property(&self.z2m_name);
        let confirmation = self.read_attribute_msg(SWITCH_CFG_CLUSTER, attr.wire_id());
        let value = self.get_device_attribute(&property, &confirmation).await?;
        Ok(AttributeValue::coerce(attr, &value))
    }

    pub async fn get_attribute_by_name(&mut self, name: &str) -> Result<AttributeValue> {
        let attr = Attribute::from_name(name)?;
        self.get_attribute(attr).await
    }

    pub fn press_button(&self) -> Result<()> {
        self.device.send_str(&format!("BTN{}_PRESS", self.button()))
    }

    pub fn release_button(&self) -> Result<()> {
        self.device
            .send_str(&format!("BTN{}_RELEASE", self.button()))
    }

    pub async fn wait_button_state(&mut self, state: ButtonState) -> Result<()> {
        let msg = format!("Switching button {} state to {}", self.ep, state);
        self.device.wait_str(&msg).await?;
        Ok(())
    }

    pub async fn wait_report_multistate(&mut self, value: u8) -> Result<()> {
        let msg = format!(
            "Reporting multistate action EP={} value={}... status: 00",
            self.ep, value
        );
        self.device.wait_str(&msg).await?;
        Ok(())
    }

    pub async fn wait_report_level_ctrl(&mut self, cmd: LevelCommand) -> Result<()> {
        let msg = format!("Sending Level Control {} command status: 00", cmd);
        self.device.wait_str(&msg).await?;
        Ok(())
    }

    /// Payload of the next state report.
    pub async fn wait_zigbee_state(&mut self) -> Result<Map<String, Value>> {
        Ok(self.bridge.wait_msg().await?.payload)
    }

    /// Next state report, whole.
    pub async fn wait_zigbee_msg(&mut self) -> Result<StateMessage> {
        self.bridge.wait_msg().await
    }

    /// Value of the next reported `action`.
    pub async fn wait_zigbee_action(&mut self) -> Result<String> {
        let value = self.bridge.wait_attribute("action").await?;
        Ok(value_text(value))
    }

    fn bind_request(&self, cluster: Cluster) -> BindRequest {
        BindRequest::new(
            cluster,
            EndpointPath::new(self.bridge.device_name(), self.ep),
            self.coordinator.clone(),
        )
    }

    /// Have the coordinator receive `cluster` commands from this endpoint.
    pub async fn bind(&self, cluster: Cluster) -> Result<()> {
        self.bridge.bind(&self.bind_request(cluster)).await
    }

    pub async fn unbind(&self, cluster: Cluster) -> Result<()> {
        self.bridge.unbind(&self.bind_request(cluster)).await
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
