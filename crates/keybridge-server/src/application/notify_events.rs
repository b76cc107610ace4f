//! Producer-side notifications.
//!
//! Each `notify_*` call corresponds to one firmware event: a key-switch
//! transition, or a HID report leaving on some transport.  The notifier reads
//! the current report state from a [`HidReportSource`], builds the matching
//! [`Event`] and hands it to an [`EventSink`] (normally the
//! [`crate::infrastructure::network::EventHub`]).
//!
//! Transports are named with the firmware's descriptor strings and parsed by
//! [`Endpoint::from_transport_str`].

use std::sync::Arc;

use keybridge_core::protocol::messages::{
    HidConsumerReport, HidKeyboardReport, KscanEvent, KEYBOARD_KEYS_CAPACITY,
};
#[cfg(feature = "pointing")]
use keybridge_core::protocol::messages::HidMouseReport;
use keybridge_core::{Endpoint, Event};
use tracing::debug;

/// Current keyboard report contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardState {
    pub modifiers: u8,
    pub keys: Vec<u8>,
}

/// Current mouse report contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseState {
    pub buttons: u32,
    pub dx: i32,
    pub dy: i32,
    pub scroll_x: i32,
    pub scroll_y: i32,
}

/// Where report contents come from (the HID layer).
#[cfg_attr(test, mockall::automock)]
pub trait HidReportSource: Send + Sync {
    fn keyboard(&self) -> KeyboardState;
    /// Raw consumer usage array.
    fn consumer(&self) -> Vec<u8>;
    fn mouse(&self) -> MouseState;
}

/// Anything that can deliver events to observers.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn broadcast(&self, event: &Event);
}

pub struct EventNotifier {
    reports: Arc<dyn HidReportSource>,
    sink: Arc<dyn EventSink>,
}

impl EventNotifier {
    pub fn new(reports: Arc<dyn HidReportSource>, sink: Arc<dyn EventSink>) -> Self {
        Self { reports, sink }
    }

    /// A key switch at `position` changed state.
    pub fn notify_kscan_event(&self, source: u32, position: u32, pressed: bool, timestamp: u64) {
        let event = Event::Kscan(KscanEvent {
            source,
            position,
            pressed,
            timestamp,
        });
        self.sink.broadcast(&event);
    }

    /// A keyboard report was sent on `transport`.
    ///
    /// Key arrays longer than the wire capacity are truncated.
    pub fn notify_keyboard_report(&self, transport: &str) {
        let state = self.reports.keyboard();
        let endpoint = Endpoint::from_transport_str(transport);
        if state.keys.len() > KEYBOARD_KEYS_CAPACITY {
            debug!("keyboard report of {} bytes truncated", state.keys.len());
        }
        let report = HidKeyboardReport::truncating(endpoint, state.modifiers, &state.keys);
        self.sink.broadcast(&Event::Keyboard(report));
    }

    /// A consumer-control report was sent on `transport`.
    pub fn notify_consumer_report(&self, transport: &str) {
        let keys = self.reports.consumer();
        let endpoint = Endpoint::from_transport_str(transport);
        let report = HidConsumerReport::truncating(endpoint, &keys);
        self.sink.broadcast(&Event::Consumer(report));
    }

    /// A mouse report was sent on `transport`.
    #[cfg(feature = "pointing")]
    pub fn notify_mouse_report(&self, transport: &str) {
        let m = self.reports.mouse();
        let report = HidMouseReport {
            endpoint: Endpoint::from_transport_str(transport),
            buttons: m.buttons,
            dx: m.dx,
            dy: m.dy,
            scroll_x: m.scroll_x,
            scroll_y: m.scroll_y,
        };
        self.sink.broadcast(&Event::Mouse(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keybridge_core::TransportType;
    use mockall::predicate::*;

    fn notifier(reports: MockHidReportSource, sink: MockEventSink) -> EventNotifier {
        EventNotifier::new(Arc::new(reports), Arc::new(sink))
    }

    #[test]
    fn test_notify_kscan_event_broadcasts_transition() {
        // Arrange
        let reports = MockHidReportSource::new();
        let mut sink = MockEventSink::new();
        let expected = Event::Kscan(KscanEvent {
            source: 0,
            position: 13,
            pressed: true,
            timestamp: 5000,
        });
        sink.expect_broadcast()
            .with(eq(expected))
            .times(1)
            .return_const(());

        // Act / Assert (mock verifies on drop)
        notifier(reports, sink).notify_kscan_event(0, 13, true, 5000);
    }

    #[test]
    fn test_notify_keyboard_report_parses_ble_endpoint() {
        // Arrange
        let mut reports = MockHidReportSource::new();
        reports.expect_keyboard().times(1).returning(|| KeyboardState {
            modifiers: 0x02,
            keys: vec![0x04, 0, 0, 0, 0, 0],
        });
        let mut sink = MockEventSink::new();
        sink.expect_broadcast()
            .withf(|event| match event {
                Event::Keyboard(r) => {
                    r.endpoint.transport == TransportType::Ble
                        && r.endpoint.ble_profile_index == 2
                        && r.modifiers == 0x02
                        && r.keys.as_slice() == [0x04, 0, 0, 0, 0, 0]
                }
                _ => false,
            })
            .times(1)
            .return_const(());

        // Act
        notifier(reports, sink).notify_keyboard_report("BLE:2");
    }

    #[test]
    fn test_notify_keyboard_report_truncates_long_key_array() {
        let mut reports = MockHidReportSource::new();
        reports.expect_keyboard().returning(|| KeyboardState {
            modifiers: 0,
            keys: vec![1; 40],
        });
        let mut sink = MockEventSink::new();
        sink.expect_broadcast()
            .withf(|event| matches!(event, Event::Keyboard(r) if r.keys.len() == 32))
            .times(1)
            .return_const(());

        notifier(reports, sink).notify_keyboard_report("USB");
    }

    #[test]
    fn test_notify_consumer_report_with_unknown_transport_uses_none() {
        let mut reports = MockHidReportSource::new();
        reports.expect_consumer().returning(|| vec![0xE9, 0x00]);
        let mut sink = MockEventSink::new();
        sink.expect_broadcast()
            .with(eq(Event::Consumer(HidConsumerReport::truncating(
                Endpoint::default(),
                &[0xE9, 0x00],
            ))))
            .times(1)
            .return_const(());

        notifier(reports, sink).notify_consumer_report("None");
    }

    #[cfg(feature = "pointing")]
    #[test]
    fn test_notify_mouse_report_copies_state() {
        let mut reports = MockHidReportSource::new();
        reports.expect_mouse().returning(|| MouseState {
            buttons: 1,
            dx: -3,
            dy: 4,
            scroll_x: 0,
            scroll_y: -1,
        });
        let mut sink = MockEventSink::new();
        sink.expect_broadcast()
            .withf(|event| {
                matches!(event, Event::Mouse(r)
                    if r.endpoint == Endpoint::USB && r.dx == -3 && r.dy == 4 && r.scroll_y == -1)
            })
            .times(1)
            .return_const(());

        notifier(reports, sink).notify_mouse_report("USB");
    }
}
