//! Node controller lifecycle against the mock platform: boot, join,
//! measurement cycles, downlink commands and every restart path.

use iaqnode::adapters::nvs::NvsAdapter;
use iaqnode::app::commands::DownlinkCommand;
use iaqnode::app::events::NodeEvent;
use iaqnode::app::ports::{ConfigPort, RadioPort, SystemPort};
use iaqnode::codec::UPLINK_LEN;
use iaqnode::diagnostics::RestartLog;
use iaqnode::error::SensorError;
use iaqnode::events::{RadioEvent, RADIO_EVENT_DEPTH};
use iaqnode::fault::RestartReason;
use iaqnode::fsm::StateId;
use iaqnode::sensors::{BaselinePair, Co2Reading};

use crate::mock_hw::{
    connect, node, node_with, restarts, run_cycles, tick_until, MockSensors, SensorCall, TestNode,
};

const REBOOT: [u8; 2] = [0x11, 0x00];
const SET_BASELINE_41000_400: [u8; 6] = [0x13, 0x00, 0x28, 0xA0, 0x90, 0x01];

fn i16_at(p: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([p[off], p[off + 1]])
}

fn u16_at(p: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([p[off], p[off + 1]])
}

fn f32_at(p: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

fn last_uplink(node: &TestNode) -> Vec<u8> {
    node.peripherals()
        .radio
        .sent
        .last()
        .cloned()
        .expect("no uplink sent")
}

fn uplinks(node: &TestNode) -> usize {
    node.peripherals().radio.sent.len()
}

fn sink(node: &TestNode) -> &[NodeEvent] {
    &node.peripherals().sink.events
}

/// Keep ticking after a restart decision; nothing else may happen.
fn assert_stays_stopped(node: &mut TestNode) {
    let sent = uplinks(node);
    for _ in 0..5_000 {
        assert_eq!(node.tick(), StateId::Fatal);
    }
    assert_eq!(restarts(node).len(), 1, "restart must be issued once");
    assert_eq!(uplinks(node), sent, "no cycle may run after a restart decision");
}

// ── Boot and join ─────────────────────────────────────────────

#[test]
fn boot_arms_watchdog_and_joins() {
    let mut node = node();
    connect(&mut node);

    let hw = node.peripherals();
    assert_eq!(hw.system.watchdog_ms, Some(270_000));
    assert_eq!(hw.radio.join_requests.len(), 1);
    assert_eq!(hw.radio.join_requests[0].dev_eui, hw.radio.device_eui());
    assert_eq!(hw.radio.socket, Some((5, true)));
    assert!(hw.radio.events.is_some(), "radio must be subscribed after join");
    assert_eq!(hw.system.feeds, 1, "watchdog fed once the link is up");
    assert_eq!(hw.sensors.calls.first(), Some(&SensorCall::Start));
    assert!(node.node_state().joined);

    let events = sink(&node);
    assert!(matches!(
        events.first(),
        Some(NodeEvent::Started {
            interval_secs: 120,
            ..
        })
    ));
    assert!(events.iter().any(|e| matches!(e, NodeEvent::Joined { .. })));
    let transitions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            NodeEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (StateId::Init, StateId::Joining),
            (StateId::Joining, StateId::Connected)
        ]
    );
}

#[test]
fn join_is_polled_until_it_completes() {
    let mut node = node();
    node.peripherals_mut().radio.polls_until_joined = 4;
    connect(&mut node);

    assert_eq!(node.peripherals().radio.polls, 4);
    assert_eq!(node.peripherals().radio.join_requests.len(), 1);
    // Four 2.5 s polls and the 5 s settle, on top of sensor start-up.
    assert!(node.peripherals().system.uptime_ms() >= 4 * 2_500 + 5_000);
    assert!(restarts(&node).is_empty());
}

// ── Measurement cycle ─────────────────────────────────────────

#[test]
fn first_cycle_runs_one_interval_after_connect() {
    let mut node = node();
    connect(&mut node);
    let connected_at = node.peripherals().system.uptime_ms();

    tick_until(&mut node, |n| uplinks(n) == 1);
    let sent_at = node.peripherals().system.uptime_ms();
    assert!(sent_at >= connected_at + 120_000);
    assert!(sent_at < connected_at + 125_000);

    run_cycles(&mut node, 2);
    assert_eq!(uplinks(&node), 3);
    assert_eq!(node.peripherals().system.feeds, 1 + 3);
    assert!(restarts(&node).is_empty());
}

#[test]
fn end_to_end_payload() {
    let mut node = node();
    connect(&mut node);
    run_cycles(&mut node, 1);

    let p = last_uplink(&node);
    assert_eq!(p.len(), UPLINK_LEN);
    assert_eq!(i16_at(&p, 0), 2231);
    assert_eq!(i16_at(&p, 2), 4567);
    assert_eq!(f32_at(&p, 4), 450.2);
    assert_eq!(f32_at(&p, 8), 12.0);
    assert_eq!(f32_at(&p, 12), 415.0);
    assert_eq!(i16_at(&p, 16), 32);
    assert_eq!(i16_at(&p, 18), 51);
    assert_eq!(i16_at(&p, 20), 60);
    assert_eq!(i16_at(&p, 22), 78);
    assert_eq!(u16_at(&p, 24), 42000);
    assert_eq!(u16_at(&p, 26), 410);

    assert!(sink(&node)
        .iter()
        .any(|e| *e == NodeEvent::UplinkSent { len: UPLINK_LEN }));
}

#[test]
fn unavailable_channels_carry_sentinel() {
    let sensors = MockSensors {
        co2: Ok(Co2Reading {
            co2_ppm: f32::NAN,
            temperature_c: f32::NAN,
            humidity_pct: f32::NAN,
        }),
        pm: Err(SensorError::NotResponding),
        ..MockSensors::default()
    };
    let mut node = node_with(NvsAdapter::new().unwrap(), sensors);
    connect(&mut node);
    run_cycles(&mut node, 1);

    let p = last_uplink(&node);
    assert_eq!(i16_at(&p, 0), 16860);
    assert_eq!(i16_at(&p, 2), 16860);
    assert_eq!(f32_at(&p, 4), 9999.0);
    // The IAQ sensor still answered.
    assert_eq!(f32_at(&p, 8), 12.0);
    for off in [16, 18, 20, 22] {
        assert_eq!(i16_at(&p, off), -31082);
    }
    assert!(restarts(&node).is_empty());
}

#[test]
fn failed_baseline_readback_sends_sentinel() {
    let sensors = MockSensors {
        baseline: Err(SensorError::BusError),
        ..MockSensors::default()
    };
    let mut node = node_with(NvsAdapter::new().unwrap(), sensors);
    connect(&mut node);
    run_cycles(&mut node, 1);

    let p = last_uplink(&node);
    assert_eq!(u16_at(&p, 24), 9999);
    assert_eq!(u16_at(&p, 26), 9999);
}

#[test]
fn cycle_order_is_presence_then_iaq_co2_pm() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut().sensors.calls.clear();
    run_cycles(&mut node, 1);

    assert_eq!(
        node.peripherals().sensors.calls,
        vec![
            SensorCall::Scan,
            SensorCall::ReadIaq,
            SensorCall::ReadBaseline,
            SensorCall::ReadCo2,
            SensorCall::ReadPm,
        ]
    );
}

// ── Sensor bus presence ───────────────────────────────────────

#[test]
fn missing_sensors_restart_once_after_fourth_failure() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut().sensors.responding = 2;

    run_cycles(&mut node, 10);
    assert_eq!(node.state(), StateId::Fatal);
    assert_eq!(restarts(&node), &[RestartReason::SensorBusAbsent]);
    // Degraded cycles still sample and send.
    assert_eq!(uplinks(&node), 3);

    let counts: Vec<u8> = sink(&node)
        .iter()
        .filter_map(|e| match e {
            NodeEvent::SensorsMissing { fail_count, .. } => Some(*fail_count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2, 3, 4]);

    assert_stays_stopped(&mut node);
}

#[test]
fn healthy_scan_resets_fail_count() {
    let mut node = node();
    connect(&mut node);

    node.peripherals_mut().sensors.responding = 1;
    run_cycles(&mut node, 3);
    assert_eq!(node.node_state().fail_count(), 3);

    node.peripherals_mut().sensors.responding = 3;
    run_cycles(&mut node, 1);
    assert_eq!(node.node_state().fail_count(), 0);

    node.peripherals_mut().sensors.responding = 2;
    run_cycles(&mut node, 3);
    assert_eq!(node.node_state().fail_count(), 3);
    assert!(restarts(&node).is_empty());
    assert_eq!(uplinks(&node), 7);
}

// ── Downlink commands ─────────────────────────────────────────

#[test]
fn set_interval_below_range_is_ignored() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut()
        .radio
        .queue_downlink(&[0x12, 0x00, 0x0F, 0x00]);

    run_cycles(&mut node, 2);
    assert!(restarts(&node).is_empty());
    assert_eq!(
        node.peripherals_mut().store.load().unwrap().measurement_interval_secs,
        120
    );
    assert!(sink(&node).contains(&NodeEvent::CommandIgnored(DownlinkCommand::SetInterval {
        secs: 15
    })));
}

#[test]
fn set_interval_in_range_persists_and_restarts_once() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut()
        .radio
        .queue_downlink(&[0x12, 0x00, 0x58, 0x02]);

    run_cycles(&mut node, 1);
    assert_eq!(restarts(&node), &[RestartReason::IntervalChanged]);
    assert_eq!(
        node.peripherals_mut().store.load().unwrap().measurement_interval_secs,
        600
    );
    assert_stays_stopped(&mut node);

    // Next boot picks the new interval up.
    let store = node.into_peripherals().store;
    let mut node = node_with(store, MockSensors::default());
    connect(&mut node);
    assert_eq!(node.config().measurement_interval_secs, 600);
    assert_eq!(node.node_state().measurement_interval_secs, 600);
    assert_eq!(node.peripherals().system.watchdog_ms, Some(1_230_000));
}

#[test]
fn set_baseline_is_pushed_on_every_later_cycle() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut()
        .radio
        .queue_downlink(&SET_BASELINE_41000_400);

    run_cycles(&mut node, 1);
    let forced = BaselinePair {
        voc: 41000,
        co2eq: 400,
    };
    assert!(node.node_state().baseline.manual);
    assert_eq!(node.node_state().baseline.pair(), forced);
    assert!(node.peripherals().sensors.pushes().is_empty());

    node.peripherals_mut().sensors.calls.clear();
    run_cycles(&mut node, 2);
    assert_eq!(node.peripherals().sensors.pushes(), vec![forced, forced]);

    // The push comes before the reading it compensates.
    let calls = &node.peripherals().sensors.calls;
    let push = calls
        .iter()
        .position(|c| *c == SensorCall::PushBaseline(forced))
        .unwrap();
    let read = calls.iter().position(|c| *c == SensorCall::ReadIaq).unwrap();
    assert!(push < read);

    let p = last_uplink(&node);
    assert_eq!(u16_at(&p, 24), 41000);
    assert_eq!(u16_at(&p, 26), 400);

    // A later SET_BASELINE overrides the first.
    node.peripherals_mut()
        .radio
        .queue_downlink(&[0x13, 0x00, 0x2A, 0x00, 0x2B, 0x00]);
    run_cycles(&mut node, 2);
    assert_eq!(
        node.peripherals().sensors.pushes().last(),
        Some(&BaselinePair { voc: 42, co2eq: 43 })
    );
    assert!(restarts(&node).is_empty());
}

#[test]
fn reboot_restarts_once_regardless_of_payload() {
    for frame in [&REBOOT[..], &[0x11, 0x00, 0xDE, 0xAD, 0xBE, 0xEF][..]] {
        let mut node = node();
        connect(&mut node);
        node.peripherals_mut().radio.queue_downlink(frame);
        // Never reached: the restart ends the window.
        node.peripherals_mut()
            .radio
            .queue_downlink(&SET_BASELINE_41000_400);

        run_cycles(&mut node, 1);
        assert_eq!(restarts(&node), &[RestartReason::RebootCommand]);
        assert!(!node.node_state().baseline.manual);
        assert_eq!(node.peripherals().radio.downlinks.len(), 1);
        assert_eq!(node.node_state().cycles_completed, 0);
        assert_stays_stopped(&mut node);
    }
}

#[test]
fn unknown_and_short_downlinks_are_ignored() {
    let mut node = node();
    connect(&mut node);
    {
        let radio = &mut node.peripherals_mut().radio;
        radio.queue_downlink(&[0x42]);
        radio.queue_downlink(&[0x99, 0x00, 0x01]);
        radio.queue_downlink(&[0x13, 0x00, 0x28]);
    }

    run_cycles(&mut node, 2);
    assert!(restarts(&node).is_empty());
    assert!(!node.node_state().baseline.manual);

    let ignored: Vec<_> = sink(&node)
        .iter()
        .filter_map(|e| match e {
            NodeEvent::CommandIgnored(cmd) => Some(*cmd),
            _ => None,
        })
        .collect();
    assert_eq!(
        ignored,
        vec![
            DownlinkCommand::Unknown { opcode: 0 },
            DownlinkCommand::Unknown { opcode: 0x99 },
            DownlinkCommand::Malformed { opcode: 0x13 },
        ]
    );
    let received = sink(&node)
        .iter()
        .filter(|e| matches!(e, NodeEvent::DownlinkReceived { port: 1, .. }))
        .count();
    assert_eq!(received, 3);
}

#[test]
fn receive_window_is_bounded() {
    let mut node = node();
    connect(&mut node);
    for _ in 0..20 {
        node.peripherals_mut().radio.queue_downlink(&[0xFF, 0xFF]);
    }

    run_cycles(&mut node, 1);
    assert_eq!(node.peripherals().radio.downlinks.len(), 4);
    run_cycles(&mut node, 1);
    assert!(node.peripherals().radio.downlinks.is_empty());
}

// ── Transmit failure ──────────────────────────────────────────

#[test]
fn transmit_failure_during_cycle_restarts_once() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut().radio.fail_next_tx = true;
    node.peripherals_mut()
        .radio
        .queue_downlink(&SET_BASELINE_41000_400);

    run_cycles(&mut node, 3);
    assert_eq!(restarts(&node), &[RestartReason::TransmitFailed]);
    assert_eq!(uplinks(&node), 1);
    assert_eq!(node.node_state().cycles_completed, 0);
    // The receive window never opened.
    assert_eq!(node.peripherals().radio.downlinks.len(), 1);
    assert!(sink(&node).contains(&NodeEvent::Radio(RadioEvent::TxFailed)));
    assert_stays_stopped(&mut node);
}

#[test]
fn transmit_failure_while_idle_restarts_once() {
    let mut node = node();
    connect(&mut node);
    run_cycles(&mut node, 1);
    assert_eq!(uplinks(&node), 1);

    node.peripherals().radio.raise(RadioEvent::TxFailed);
    tick_until(&mut node, |n| n.state() == StateId::Fatal);
    assert_eq!(restarts(&node), &[RestartReason::TransmitFailed]);
    assert_stays_stopped(&mut node);
}

#[test]
fn transmit_failure_during_receive_window_restarts_once() {
    let mut node = node();
    connect(&mut node);
    let feeds = node.peripherals().system.feeds;
    node.peripherals_mut().radio.fail_tx_on_receive = true;
    node.peripherals_mut()
        .radio
        .queue_downlink(&SET_BASELINE_41000_400);

    run_cycles(&mut node, 3);
    assert_eq!(restarts(&node), &[RestartReason::TransmitFailed]);
    assert_eq!(uplinks(&node), 1);
    assert_eq!(node.node_state().cycles_completed, 0);
    // The downlink that arrived alongside the failure is not acted on.
    assert!(!node.node_state().baseline.manual);
    assert_eq!(node.peripherals().system.feeds, feeds);
    assert!(sink(&node).contains(&NodeEvent::Radio(RadioEvent::TxFailed)));
    assert_stays_stopped(&mut node);
}

#[test]
fn transmit_failure_behind_a_full_event_queue_is_not_lost() {
    let mut node = node();
    connect(&mut node);
    run_cycles(&mut node, 1);

    for _ in 0..RADIO_EVENT_DEPTH {
        node.peripherals().radio.raise(RadioEvent::RxPacket);
    }
    node.peripherals().radio.raise(RadioEvent::TxFailed);

    run_cycles(&mut node, 3);
    assert_eq!(restarts(&node), &[RestartReason::TransmitFailed]);
    assert_eq!(uplinks(&node), 1);
    assert_eq!(node.node_state().cycles_completed, 1);
    assert_stays_stopped(&mut node);
}

#[test]
fn rejected_send_is_a_transmit_failure() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut().radio.reject_send = true;

    run_cycles(&mut node, 2);
    assert_eq!(restarts(&node), &[RestartReason::TransmitFailed]);
    assert_stays_stopped(&mut node);
}

#[test]
fn successful_transmit_events_are_reported_not_fatal() {
    let mut node = node();
    connect(&mut node);
    run_cycles(&mut node, 1);
    node.peripherals().radio.raise(RadioEvent::RxPacket);
    run_cycles(&mut node, 1);

    assert!(restarts(&node).is_empty());
    let radio_events = sink(&node)
        .iter()
        .filter(|e| matches!(e, NodeEvent::Radio(_)))
        .count();
    assert_eq!(radio_events, 3);
}

// ── Restart log ───────────────────────────────────────────────

#[test]
fn restart_reason_survives_in_the_log() {
    let mut node = node();
    connect(&mut node);
    node.peripherals_mut().radio.queue_downlink(&REBOOT);
    run_cycles(&mut node, 1);
    assert_eq!(node.restart_reason(), Some(RestartReason::RebootCommand));

    let store = node.into_peripherals().store;
    let mut log = RestartLog::new();
    log.init(&store);
    let entries = log.read_all(&store);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, RestartReason::RebootCommand);
    assert_eq!(entries[0].cycles, 0);
    assert!(entries[0].uptime_secs >= 120);
}
