//! In-process stand-ins for the serial port and the broker.
//!
//! `SimulatedSwitch` answers attribute and on/off requests the way the
//! firmware and zigbee2mqtt do, and replays scripted reactions for button
//! commands, so drivers and scenarios can run without hardware.

use crate::device::{Attribute, SerialDevice};
use crate::error::{HarnessError, Result};
use crate::input::mqtt::{MqttTransport, StateMessage, ZigbeeBridge};
use crate::input::serial::{DeviceLink, RawLine, SerialWatcher};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;

const BASE_TOPIC: &str = "zigbee2mqtt";
const DEVICE_NAME: &str = "my_test_switch";

/// Transport that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingTransport {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// Make every later call fail as if the event loop had died.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::TransportClosed("recording transport".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MqttTransport for RecordingTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.check_open()?;
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.check_open()?;
        self.published
            .lock()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Lines and reports the simulated firmware emits in response to a command.
#[derive(Debug, Clone, Default)]
pub struct Reaction {
    lines: Vec<String>,
    reports: Vec<Value>,
}

impl Reaction {
    pub fn lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            lines: lines.into_iter().map(str::to_string).collect(),
            reports: Vec::new(),
        }
    }

    pub fn report(mut self, payload: Value) -> Self {
        self.reports.push(payload);
        self
    }
}

struct SimState {
    ep: u8,
    z2m_name: String,
    lines: mpsc::Sender<RawLine>,
    reports: mpsc::Sender<StateMessage>,
    relay_on: bool,
    attributes: HashMap<Attribute, Value>,
    scripts: HashMap<String, VecDeque<Reaction>>,
    commands: Vec<String>,
    published: Vec<(String, String)>,
    subscriptions: Vec<String>,
    resets: usize,
    mute_writes: bool,
}

impl SimState {
    fn device_topic(&self) -> String {
        format!("{}/{}", BASE_TOPIC, DEVICE_NAME)
    }

    fn emit_line(&self, line: &str) {
        let _ = self.lines.try_send(RawLine::from(line));
    }

    fn emit_report(&self, payload: Value) {
        if let Value::Object(map) = payload {
            let _ = self
                .reports
                .try_send(StateMessage::new(self.device_topic(), map));
        }
    }

    fn emit_property(&self, property: &str, value: Value) {
        let mut map = Map::new();
        map.insert(property.to_string(), value);
        self.emit_report(Value::Object(map));
    }

    fn relay_state(&self) -> Value {
        Value::String(if self.relay_on { "ON" } else { "OFF" }.to_string())
    }

    fn react(&mut self, reaction: Reaction) {
        for line in &reaction.lines {
            self.emit_line(line);
        }
        for report in reaction.reports {
            self.emit_report(report);
        }
    }

    fn on_publish(&mut self, topic: &str, payload: &str) {
        self.published
            .push((topic.to_string(), payload.to_string()));

        let set_topic = format!("{}/set", self.device_topic());
        let get_topic = format!("{}/get", self.device_topic());
        let is_set = topic == set_topic;
        if !is_set && topic != get_topic {
            return;
        }

        let Ok(request) = serde_json::from_str::<Map<String, Value>>(payload) else {
            return;
        };

        let state_property = format!("state_{}", self.z2m_name);
        for (property, value) in request {
            if property == state_property {
                if is_set {
                    self.relay_on = match value.as_str() {
                        Some("ON") => true,
                        Some("OFF") => false,
                        Some("TOGGLE") => !self.relay_on,
                        _ => continue,
                    };
                    self.emit_line(&format!(
                        "SwitchEndpoint EP={}: do state change {}",
                        self.ep,
                        u8::from(self.relay_on)
                    ));
                } else {
                    self.emit_line(&format!(
                        "ZCL Read Attribute: EP={} Cluster=0006 Command=00 Attr=0000",
                        self.ep
                    ));
                }
                self.emit_property(&property, self.relay_state());
                continue;
            }

            let Some(attr) = Attribute::iter().find(|a| a.property(&self.z2m_name) == property)
            else {
                continue;
            };

            if is_set {
                if !self.mute_writes {
                    self.emit_line(&format!(
                        "ZCL Write Attribute: Cluster 0007 Attrib {}",
                        attr.wire_id()
                    ));
                }
                self.attributes.insert(attr, value.clone());
                self.emit_property(&property, value);
            } else {
                self.emit_line(&format!(
                    "ZCL Read Attribute: EP={} Cluster=0007 Command=00 Attr={}",
                    self.ep,
                    attr.wire_id()
                ));
                let stored = self.attributes.get(&attr).cloned().unwrap_or(Value::Null);
                self.emit_property(&property, stored);
            }
        }
    }
}

/// A scriptable fake of the switch and its zigbee2mqtt bridge.
pub struct SimulatedSwitch {
    state: Arc<Mutex<SimState>>,
    receivers: Mutex<Option<(mpsc::Receiver<RawLine>, mpsc::Receiver<StateMessage>)>>,
    timeout: Duration,
}

impl SimulatedSwitch {
    pub fn new(ep: u8, z2m_name: &str) -> Self {
        let (line_tx, line_rx) = mpsc::channel(256);
        let (report_tx, report_rx) = mpsc::channel(256);
        Self {
            state: Arc::new(Mutex::new(SimState {
                ep,
                z2m_name: z2m_name.to_string(),
                lines: line_tx,
                reports: report_tx,
                relay_on: false,
                attributes: HashMap::new(),
                scripts: HashMap::new(),
                commands: Vec::new(),
                published: Vec::new(),
                subscriptions: Vec::new(),
                resets: 0,
                mute_writes: false,
            })),
            receivers: Mutex::new(Some((line_rx, report_rx))),
            timeout: Duration::from_millis(500),
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    /// Serial device and bridge wired to this simulation. Callable once.
    pub fn channels(&self) -> (SerialDevice, ZigbeeBridge) {
        let (lines, reports) = self
            .receivers
            .lock()
            .take()
            .expect("channels already taken");

        let device = SerialDevice::new(
            Box::new(SimLink {
                state: self.state.clone(),
            }),
            SerialWatcher::new(lines),
            self.timeout,
        );
        let bridge = ZigbeeBridge::new(
            Arc::new(SimTransport {
                state: self.state.clone(),
            }),
            reports,
            BASE_TOPIC,
            DEVICE_NAME,
            self.timeout,
        );
        (device, bridge)
    }

    /// Queue a reaction for the next time `command` arrives on the serial port.
    pub fn on_command(&self, command: &str, reaction: Reaction) {
        self.state
            .lock()
            .scripts
            .entry(command.to_string())
            .or_default()
            .push_back(reaction);
    }

    /// Stop printing `ZCL Write Attribute` lines.
    pub fn mute_write_confirmations(&self) {
        self.state.lock().mute_writes = true;
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().published.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }
}

struct SimLink {
    state: Arc<Mutex<SimState>>,
}

impl DeviceLink for SimLink {
    fn send_line(&self, line: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(line.to_string());
        let reaction = state
            .scripts
            .get_mut(line)
            .and_then(VecDeque::pop_front);
        if let Some(reaction) = reaction {
            state.react(reaction);
        }
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.resets += 1;
        // Boot banner, dropped by the device's post-reset discard
        state.emit_line("Initializing...");
        Ok(())
    }
}

struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl MqttTransport for SimTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.state.lock().subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.state.lock().on_publish(topic, payload);
        Ok(())
    }
}
