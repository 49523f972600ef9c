//! Turning lifecycle moments into outbound actions.
//!
//! [`plan_outputs`] is pure: it selects the automations bound to a moment,
//! checks their filters against a state snapshot and renders every template.
//! [`AutomationDispatcher`] sends the result from its own worker thread so a
//! slow HTTP target never holds up the tick loop.

use crossbeam_channel::Sender;
use rosc::OscType;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

use super::filter::matches;
use super::model::{AutomationOutput, AutomationSettings, TimerLifeCycle};
use super::template::render;
use crate::control::{parse_action, ControlAction};
use crate::osc::{parse_args, OscClient};
use crate::state::{EngineMessage, RuntimeState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// A rendered output, ready to send.
#[derive(Clone, Debug, PartialEq)]
pub enum PlannedOutput {
    Osc {
        /// "host:port"
        target: String,
        address: String,
        args: Vec<OscType>,
    },
    Http {
        url: String,
    },
    /// An action for this runtime.
    Internal(ControlAction),
}

/// Render the outputs of every automation bound to `cycle` whose filters
/// pass against `state`.
pub fn plan_outputs(
    settings: &AutomationSettings,
    cycle: TimerLifeCycle,
    state: &RuntimeState,
) -> Vec<PlannedOutput> {
    let mut planned = Vec::new();
    for automation in settings.automations_for(cycle) {
        if !matches(automation, state) {
            continue;
        }
        log::debug!("[AUTOMATION] '{}' triggered by {}", automation.id, cycle);
        for output in &automation.outputs {
            match output {
                AutomationOutput::Osc {
                    target_ip,
                    target_port,
                    address,
                    args,
                } => planned.push(PlannedOutput::Osc {
                    target: format!("{}:{}", target_ip, target_port),
                    address: render(address, state),
                    args: parse_args(&render(args, state)),
                }),
                AutomationOutput::Http { url } => planned.push(PlannedOutput::Http {
                    url: render(url, state),
                }),
                AutomationOutput::Ontime { action, value } => {
                    let value = value.as_deref().map(|v| render(v, state));
                    match parse_action(&render(action, state), value.as_deref()) {
                        Ok(action) => planned.push(PlannedOutput::Internal(action)),
                        Err(e) => log::warn!(
                            "[AUTOMATION] '{}' has an invalid internal action: {}",
                            automation.id,
                            e
                        ),
                    }
                }
            }
        }
    }
    planned
}

/// Background sender for planned outputs.
pub struct AutomationDispatcher {
    tx: Option<mpsc::UnboundedSender<PlannedOutput>>,
    thread: Option<JoinHandle<()>>,
}

impl AutomationDispatcher {
    /// Start the worker. Internal actions are sent to `control`.
    pub fn start(control: Sender<EngineMessage>) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("showrun-automation".to_string())
            .spawn(move || run_worker(rx, control))?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue outputs in order.
    pub fn dispatch(&self, outputs: Vec<PlannedOutput>) {
        let Some(tx) = &self.tx else {
            return;
        };
        for output in outputs {
            if tx.send(output).is_err() {
                log::warn!("[AUTOMATION] Dispatcher stopped, dropping outputs");
                return;
            }
        }
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // closing the channel ends the worker loop
        self.tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutomationDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(mut rx: mpsc::UnboundedReceiver<PlannedOutput>, control: Sender<EngineMessage>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("[AUTOMATION] Failed to start worker runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let http = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
            Ok(client) => Some(client),
            Err(e) => {
                log::error!("[AUTOMATION] HTTP outputs disabled: {}", e);
                None
            }
        };
        let mut osc_clients: HashMap<String, OscClient> = HashMap::new();

        while let Some(output) = rx.recv().await {
            match output {
                PlannedOutput::Osc {
                    target,
                    address,
                    args,
                } => {
                    let client = match osc_clients.entry(target.clone()) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => match OscClient::new(target.clone()) {
                            Ok(client) => entry.insert(client),
                            Err(e) => {
                                log::warn!("[AUTOMATION] OSC target {} unusable: {}", target, e);
                                continue;
                            }
                        },
                    };
                    match client.send_msg(&address, args) {
                        Ok(()) => log::debug!("[AUTOMATION] OSC {} -> {}", address, target),
                        Err(e) => log::warn!("[AUTOMATION] OSC output to {} failed: {}", target, e),
                    }
                }
                PlannedOutput::Http { url } => {
                    let Some(http) = http.clone() else {
                        continue;
                    };
                    tokio::spawn(async move {
                        match http.get(&url).send().await {
                            Ok(response) if response.status().is_success() => {
                                log::debug!("[AUTOMATION] HTTP {} -> {}", url, response.status())
                            }
                            Ok(response) => log::warn!(
                                "[AUTOMATION] HTTP output {} answered {}",
                                url,
                                response.status()
                            ),
                            Err(e) => log::warn!("[AUTOMATION] HTTP output {} failed: {}", url, e),
                        }
                    });
                }
                PlannedOutput::Internal(action) => {
                    let message = EngineMessage::Control {
                        action,
                        reply: None,
                    };
                    if control.send(message).is_err() {
                        log::debug!("[AUTOMATION] Runtime gone, dropping internal action");
                    }
                }
            }
        }
        log::debug!("[AUTOMATION] Worker stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{Automation, AutomationFilter, FilterOperator, FilterRule, Trigger};
    use crate::playback::Playback;
    use crate::rundown::EventEntry;
    use std::collections::BTreeMap;
    use std::net::UdpSocket;

    fn settings(outputs: Vec<AutomationOutput>, filters: Vec<AutomationFilter>) -> AutomationSettings {
        let automation = Automation {
            id: "auto".to_string(),
            title: "Lights".to_string(),
            filter_rule: FilterRule::All,
            filters,
            outputs,
        };
        AutomationSettings {
            enabled: true,
            triggers: vec![Trigger {
                id: "t".to_string(),
                title: String::new(),
                trigger: TimerLifeCycle::OnStart,
                automation_id: "auto".to_string(),
            }],
            automations: BTreeMap::from([("auto".to_string(), automation)]),
        }
    }

    fn state() -> RuntimeState {
        let mut state = RuntimeState::default();
        state.timer.playback = Playback::Play;
        state.event_now = Some(EventEntry::new("e1", 0, 1000).with_cue("A1"));
        state
    }

    #[test]
    fn test_plan_renders_outputs() {
        let settings = settings(
            vec![
                AutomationOutput::Osc {
                    target_ip: "127.0.0.1".to_string(),
                    target_port: 9000,
                    address: "/cue/{{eventNow.cue}}/go".to_string(),
                    args: "1 \"{{eventNow.id}}\"".to_string(),
                },
                AutomationOutput::Http {
                    url: "http://host/{{eventNow.id}}".to_string(),
                },
                AutomationOutput::Ontime {
                    action: "auxtimer/1".to_string(),
                    value: Some("start".to_string()),
                },
            ],
            vec![],
        );
        let planned = plan_outputs(&settings, TimerLifeCycle::OnStart, &state());
        assert_eq!(
            planned,
            vec![
                PlannedOutput::Osc {
                    target: "127.0.0.1:9000".to_string(),
                    address: "/cue/A1/go".to_string(),
                    args: vec![OscType::Int(1), OscType::String("e1".to_string())],
                },
                PlannedOutput::Http {
                    url: "http://host/e1".to_string()
                },
                PlannedOutput::Internal(ControlAction::Aux(crate::control::AuxAction::Start)),
            ]
        );
        assert!(plan_outputs(&settings, TimerLifeCycle::OnStop, &state()).is_empty());
    }

    #[test]
    fn test_plan_respects_filters_and_enabled() {
        let output = AutomationOutput::Http {
            url: "http://host".to_string(),
        };
        let blocked = settings(
            vec![output.clone()],
            vec![AutomationFilter {
                field: "timer.playback".to_string(),
                operator: FilterOperator::Equals,
                value: "pause".to_string(),
            }],
        );
        assert!(plan_outputs(&blocked, TimerLifeCycle::OnStart, &state()).is_empty());

        let mut disabled = settings(vec![output], vec![]);
        disabled.enabled = false;
        assert!(plan_outputs(&disabled, TimerLifeCycle::OnStart, &state()).is_empty());
    }

    #[test]
    fn test_invalid_internal_action_is_skipped() {
        let settings = settings(
            vec![AutomationOutput::Ontime {
                action: "dance".to_string(),
                value: None,
            }],
            vec![],
        );
        assert!(plan_outputs(&settings, TimerLifeCycle::OnStart, &state()).is_empty());
    }

    #[test]
    fn test_dispatcher_sends_osc_and_internal() {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let target = sock.local_addr().unwrap().to_string();

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let dispatcher = AutomationDispatcher::start(control_tx).unwrap();
        dispatcher.dispatch(vec![
            PlannedOutput::Osc {
                target,
                address: "/go".to_string(),
                args: vec![OscType::Int(7)],
            },
            PlannedOutput::Internal(ControlAction::Pause),
        ]);

        let mut buf = [0u8; 1024];
        let (size, _) = sock.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
        match packet {
            rosc::OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/go");
                assert_eq!(msg.args, vec![OscType::Int(7)]);
            }
            other => panic!("unexpected packet {other:?}"),
        }

        match control_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            EngineMessage::Control { action, reply } => {
                assert_eq!(action, ControlAction::Pause);
                assert!(reply.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
        dispatcher.shutdown();
    }
}
