//! End-to-end scenarios for a switch endpoint.
//!
//! Each scenario drives one endpoint through a sequence of actions and checks
//! what shows up on the serial and zigbee2mqtt channels, in order.

use crate::device::button::multistate;
use crate::device::{
    ActionKind, Attribute, ButtonState, LevelCommand, LongPressMode, RelayMode, SmartSwitch,
    SwitchActions, SwitchCommand, SwitchMode,
};
use crate::error::{HarnessError, Result};
use crate::input::mqtt::Cluster;
use log::info;
use serde_json::{Value, json};
use std::fmt::Debug;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    OnOff,
    Toggle,
    SwitchMode,
    SwitchActions,
    RelayMode,
    AttributesSurviveReboot,
    ButtonPress,
    DoubleClick,
    LevelControl,
}

impl Scenario {
    pub fn description(self) -> &'static str {
        match self {
            Scenario::OnOff => "Switch the relay on and off over zigbee2mqtt",
            Scenario::Toggle => "Toggle the relay and read its state back",
            Scenario::SwitchMode => "Round trip every switch_mode value",
            Scenario::SwitchActions => "Round trip every switch_actions value",
            Scenario::RelayMode => "Round trip every relay_mode value",
            Scenario::AttributesSurviveReboot => "Switch options persist across a device reset",
            Scenario::ButtonPress => "Short press in toggle mode switches the relay",
            Scenario::DoubleClick => "Double click in multifunction/double mode",
            Scenario::LevelControl => "Long press sends Level Control Move/Stop",
        }
    }

    /// Prepare the switch, then run the scenario.
    pub async fn run_prepared(self, switch: &mut SmartSwitch) -> Result<()> {
        switch.prepare().await?;
        self.run(switch).await
    }

    pub async fn run(self, switch: &mut SmartSwitch) -> Result<()> {
        info!("=== {} (EP={}) ===", self, switch.endpoint());
        match self {
            Scenario::OnOff => on_off(switch).await,
            Scenario::Toggle => toggle(switch).await,
            Scenario::SwitchMode => round_trip_all::<SwitchMode>(switch, Attribute::SwitchMode).await,
            Scenario::SwitchActions => {
                round_trip_all::<SwitchActions>(switch, Attribute::SwitchActions).await
            }
            Scenario::RelayMode => round_trip_all::<RelayMode>(switch, Attribute::RelayMode).await,
            Scenario::AttributesSurviveReboot => attributes_survive_reboot(switch).await,
            Scenario::ButtonPress => button_press(switch).await,
            Scenario::DoubleClick => double_click(switch).await,
            Scenario::LevelControl => level_control(switch).await,
        }
    }
}

fn expect_eq<A, B>(what: &str, actual: A, expected: B) -> Result<()>
where
    A: PartialEq<B> + Debug,
    B: Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::ScenarioFailed(format!(
            "{what}: expected {expected:?}, got {actual:?}"
        )))
    }
}

fn field<'a>(payload: &'a serde_json::Map<String, Value>, key: &str) -> &'a Value {
    payload.get(key).unwrap_or(&Value::Null)
}

async fn set_expect(switch: &mut SmartSwitch, attr: Attribute, value: &str) -> Result<()> {
    let echoed = switch.set_attribute(attr, value).await?;
    expect_eq(&format!("set {attr}"), echoed, value)
}

async fn on_off(switch: &mut SmartSwitch) -> Result<()> {
    expect_eq("switch ON", switch.switch(SwitchCommand::On, true).await?, "ON")?;
    expect_eq("switch OFF", switch.switch(SwitchCommand::Off, false).await?, "OFF")
}

async fn toggle(switch: &mut SmartSwitch) -> Result<()> {
    expect_eq("switch OFF", switch.switch(SwitchCommand::Off, false).await?, "OFF")?;
    expect_eq("state", switch.get_state().await?, "OFF")?;

    expect_eq("toggle", switch.switch(SwitchCommand::Toggle, true).await?, "ON")?;
    expect_eq("state", switch.get_state().await?, "ON")?;

    expect_eq("toggle", switch.switch(SwitchCommand::Toggle, false).await?, "OFF")?;
    expect_eq("state", switch.get_state().await?, "OFF")
}

async fn round_trip_all<E>(switch: &mut SmartSwitch, attr: Attribute) -> Result<()>
where
    E: IntoEnumIterator + AsRef<str>,
{
    for value in E::iter() {
        let value = value.as_ref();
        set_expect(switch, attr, value).await?;
        expect_eq(&format!("get {attr}"), switch.get_attribute(attr).await?, value)?;
    }
    Ok(())
}

async fn attributes_survive_reboot(switch: &mut SmartSwitch) -> Result<()> {
    set_expect(switch, Attribute::SwitchMode, SwitchMode::Multifunction.as_ref()).await?;
    set_expect(switch, Attribute::RelayMode, RelayMode::Double.as_ref()).await?;
    set_expect(
        switch,
        Attribute::LongPressMode,
        LongPressMode::LevelCtrlUp.as_ref(),
    )
    .await?;
    set_expect(switch, Attribute::MaxPause, "152").await?;
    set_expect(switch, Attribute::MinLongPress, "602").await?;

    switch.reset()?;

    expect_eq(
        "switch_mode after reset",
        switch.get_attribute(Attribute::SwitchMode).await?,
        "multifunction",
    )?;
    expect_eq(
        "relay_mode after reset",
        switch.get_attribute(Attribute::RelayMode).await?,
        "double",
    )?;
    expect_eq(
        "long_press_mode after reset",
        switch.get_attribute(Attribute::LongPressMode).await?,
        "levelCtrlUp",
    )?;
    expect_eq(
        "max_pause after reset",
        switch.get_attribute(Attribute::MaxPause).await?,
        152i64,
    )?;
    expect_eq(
        "min_long_press after reset",
        switch.get_attribute(Attribute::MinLongPress).await?,
        602i64,
    )
}

async fn button_press(switch: &mut SmartSwitch) -> Result<()> {
    expect_eq("switch OFF", switch.switch(SwitchCommand::Off, false).await?, "OFF")?;
    set_expect(switch, Attribute::SwitchMode, SwitchMode::Toggle.as_ref()).await?;

    switch.press_button()?;
    switch.wait_button_state(ButtonState::Pressed1).await?;

    // Toggle mode switches on press, not on release
    switch.wait_state_change_msg(true).await?;

    switch.release_button()?;
    switch.wait_button_state(ButtonState::Idle).await?;

    let single = switch.action_name(ActionKind::Single);
    let state_key = format!("state_{}", switch.z2m_name());
    let report = switch.wait_zigbee_state().await?;
    expect_eq("action", field(&report, "action"), &json!(single))?;
    let report = switch.wait_zigbee_state().await?;
    expect_eq(&state_key, field(&report, &state_key), &json!("ON"))
}

async fn double_click(switch: &mut SmartSwitch) -> Result<()> {
    expect_eq("switch OFF", switch.switch(SwitchCommand::Off, false).await?, "OFF")?;
    set_expect(switch, Attribute::SwitchMode, SwitchMode::Multifunction.as_ref()).await?;
    set_expect(switch, Attribute::RelayMode, RelayMode::Double.as_ref()).await?;

    switch.press_button()?;
    switch.wait_button_state(ButtonState::Pressed1).await?;
    switch.release_button()?;
    switch.wait_button_state(ButtonState::Pause1).await?;

    switch.press_button()?;
    switch.wait_button_state(ButtonState::Pressed2).await?;
    switch.release_button()?;
    switch.wait_button_state(ButtonState::Pause2).await?;

    switch.wait_state_change_msg(true).await?;

    let double = switch.action_name(ActionKind::Double);
    let state_key = format!("state_{}", switch.z2m_name());
    let report = switch.wait_zigbee_state().await?;
    expect_eq("action", field(&report, "action"), &json!(double))?;
    let report = switch.wait_zigbee_state().await?;
    expect_eq(&state_key, field(&report, &state_key), &json!("ON"))
}

async fn level_control(switch: &mut SmartSwitch) -> Result<()> {
    switch.bind(Cluster::GenLevelCtrl).await?;

    set_expect(switch, Attribute::SwitchMode, SwitchMode::Multifunction.as_ref()).await?;
    set_expect(switch, Attribute::RelayMode, RelayMode::Unlinked.as_ref()).await?;
    set_expect(
        switch,
        Attribute::LongPressMode,
        LongPressMode::LevelCtrlDown.as_ref(),
    )
    .await?;

    switch.press_button()?;
    switch.wait_button_state(ButtonState::Pressed1).await?;
    switch.wait_button_state(ButtonState::LongPress).await?;
    switch.wait_report_multistate(multistate::LONG_PRESS).await?;
    switch.wait_report_level_ctrl(LevelCommand::Move).await?;

    let hold = switch.action_name(ActionKind::Hold);
    let report = switch.wait_zigbee_state().await?;
    expect_eq("action", field(&report, "action"), &json!(hold))?;
    let report = switch.wait_zigbee_state().await?;
    expect_eq(
        "level_ctrl",
        field(&report, "level_ctrl"),
        &json!({"command": "commandMove", "payload": {"movemode": 1, "rate": 80}}),
    )?;

    switch.release_button()?;
    switch.wait_button_state(ButtonState::Idle).await?;
    switch.wait_report_multistate(multistate::RELEASED).await?;
    switch.wait_report_level_ctrl(LevelCommand::Stop).await?;

    let release = switch.action_name(ActionKind::Release);
    let report = switch.wait_zigbee_state().await?;
    expect_eq("action", field(&report, "action"), &json!(release))?;
    let report = switch.wait_zigbee_state().await?;
    expect_eq(
        "level_ctrl.command",
        field(&report, "level_ctrl").get("command").unwrap_or(&Value::Null),
        &json!("commandStop"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reaction, SimulatedSwitch};

    async fn attach(sim: &SimulatedSwitch) -> SmartSwitch {
        let (device, bridge) = sim.channels();
        SmartSwitch::new(device, bridge, 2, "button_1", "Coordinator")
            .await
            .unwrap()
    }

    #[test]
    fn test_scenario_names() {
        assert_eq!(Scenario::DoubleClick.to_string(), "double-click");
        assert_eq!(
            "attributes-survive-reboot".parse::<Scenario>().unwrap(),
            Scenario::AttributesSurviveReboot
        );
        assert_eq!(Scenario::iter().count(), 9);
    }

    #[test]
    fn test_expect_eq_reports_both_sides() {
        let err = expect_eq("action", "hold_button_1", "single_button_1").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("hold_button_1"));
        assert!(text.contains("single_button_1"));
    }

    #[tokio::test]
    async fn test_attribute_scenarios_pass_against_simulation() {
        let sim = SimulatedSwitch::new(2, "button_1");
        let mut switch = attach(&sim).await;

        for scenario in [
            Scenario::OnOff,
            Scenario::Toggle,
            Scenario::SwitchMode,
            Scenario::SwitchActions,
            Scenario::RelayMode,
            Scenario::AttributesSurviveReboot,
        ] {
            scenario.run(&mut switch).await.unwrap();
        }
        assert_eq!(sim.resets(), 1);
    }

    #[tokio::test]
    async fn test_button_press_scenario() {
        let sim = SimulatedSwitch::new(2, "button_1");
        sim.on_command(
            "BTN1_PRESS",
            Reaction::lines([
                "Switching button 2 state to PRESSED1",
                "SwitchEndpoint EP=2: do state change 1",
            ]),
        );
        sim.on_command(
            "BTN1_RELEASE",
            Reaction::lines(["Switching button 2 state to IDLE"])
                .report(json!({"action": "single_button_1"}))
                .report(json!({"state_button_1": "ON"})),
        );
        let mut switch = attach(&sim).await;

        Scenario::ButtonPress.run(&mut switch).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_click_reports_out_of_order_fail() {
        let sim = SimulatedSwitch::new(2, "button_1");
        sim.on_command("BTN1_PRESS", Reaction::lines(["Switching button 2 state to PRESSED1"]));
        sim.on_command("BTN1_RELEASE", Reaction::lines(["Switching button 2 state to PAUSE1"]));
        sim.on_command("BTN1_PRESS", Reaction::lines(["Switching button 2 state to PRESSED2"]));
        sim.on_command(
            "BTN1_RELEASE",
            Reaction::lines([
                "Switching button 2 state to PAUSE2",
                "SwitchEndpoint EP=2: do state change 1",
            ])
            // State report arrives before the action
            .report(json!({"state_button_1": "ON"}))
            .report(json!({"action": "double_button_1"})),
        );
        let mut switch = attach(&sim).await;

        let err = Scenario::DoubleClick.run(&mut switch).await.unwrap_err();
        assert!(matches!(err, HarnessError::ScenarioFailed(_)));
    }

    fn script_level_control(sim: &SimulatedSwitch) {
        sim.on_command(
            "BTN1_PRESS",
            Reaction::lines([
                "Switching button 2 state to PRESSED1",
                "Switching button 2 state to LONG_PRESS",
                "Reporting multistate action EP=2 value=255... status: 00",
                "Sending Level Control Move command status: 00",
            ])
            .report(json!({"action": "hold_button_1"}))
            .report(json!({"level_ctrl": {"command": "commandMove", "payload": {"movemode": 1, "rate": 80}}})),
        );
        sim.on_command(
            "BTN1_RELEASE",
            Reaction::lines([
                "Switching button 2 state to IDLE",
                "Reporting multistate action EP=2 value=0... status: 00",
                "Sending Level Control Stop command status: 00",
            ])
            .report(json!({"action": "release_button_1"}))
            .report(json!({"level_ctrl": {"command": "commandStop", "payload": {}}})),
        );
    }

    #[tokio::test]
    async fn test_level_control_scenario() {
        let sim = SimulatedSwitch::new(2, "button_1");
        script_level_control(&sim);
        let mut switch = attach(&sim).await;

        Scenario::LevelControl.run(&mut switch).await.unwrap();

        let binds: Vec<String> = sim
            .published()
            .into_iter()
            .map(|(topic, _)| topic)
            .filter(|topic| topic.contains("/bridge/request/device/"))
            .collect();
        assert_eq!(
            binds,
            vec![
                "zigbee2mqtt/bridge/request/device/unbind",
                "zigbee2mqtt/bridge/request/device/bind",
            ]
        );
    }

    #[tokio::test]
    async fn test_each_prepared_scenario_starts_unbound() {
        let sim = SimulatedSwitch::new(2, "button_1");
        script_level_control(&sim);
        sim.on_command("BTN1_PRESS", Reaction::lines(["Switching button 2 state to PRESSED1"]));
        sim.on_command("BTN1_RELEASE", Reaction::lines(["Switching button 2 state to PAUSE1"]));
        sim.on_command("BTN1_PRESS", Reaction::lines(["Switching button 2 state to PRESSED2"]));
        sim.on_command(
            "BTN1_RELEASE",
            Reaction::lines([
                "Switching button 2 state to PAUSE2",
                "SwitchEndpoint EP=2: do state change 1",
            ])
            .report(json!({"action": "double_button_1"}))
            .report(json!({"state_button_1": "ON"})),
        );
        let mut switch = attach(&sim).await;

        Scenario::LevelControl.run_prepared(&mut switch).await.unwrap();
        Scenario::DoubleClick.run_prepared(&mut switch).await.unwrap();

        let requests: Vec<String> = sim
            .published()
            .into_iter()
            .map(|(topic, _)| topic)
            .filter_map(|topic| {
                topic
                    .strip_prefix("zigbee2mqtt/bridge/request/device/")
                    .map(str::to_string)
            })
            .collect();
        assert_eq!(requests, vec!["unbind", "unbind", "bind", "unbind"]);
        assert_eq!(sim.resets(), 2);
    }
}
