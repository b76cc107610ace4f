//! Application layer: the device-side use cases.
//!
//! - **`kscan_device`** – The key-matrix driver contract (callback registration,
//!   enable/disable) that injected key events are delivered through.
//!
//! - **`notify_events`** – Turns firmware notifications (key transitions, HID
//!   reports) into [`keybridge_core::Event`]s for the broadcast hub.
//!
//! Nothing here opens a socket; both modules depend only on traits and core
//! types, so they are unit-tested with mocks.

pub mod kscan_device;
pub mod notify_events;
