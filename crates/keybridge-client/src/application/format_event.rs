//! One-line, human-readable rendering of observer events.
//!
//! ```text
//! [kscan   ] PRESS    pos=5     source=0  ts=1234 ms
//! [keyboard] transport=TRANSPORT_USB    modifiers=0x02  keys=[0x04]
//! [consumer] transport=TRANSPORT_BLE    keys=[-]
//! [mouse   ] transport=TRANSPORT_USB    buttons=1  dx=-3  dy=4  scroll_x=0  scroll_y=0
//! ```
//!
//! Zero bytes in a key array are empty slots and are not printed.

use keybridge_core::Event;

pub fn format_event(event: &Event) -> String {
    match event {
        Event::Kscan(k) => {
            let state = if k.pressed { "PRESS  " } else { "RELEASE" };
            format!(
                "[kscan   ] {state}  pos={:<4}  source={}  ts={} ms",
                k.position, k.source, k.timestamp
            )
        }
        Event::Keyboard(kb) => format!(
            "[keyboard] transport={:<15}  modifiers=0x{:02x}  keys=[{}]",
            kb.endpoint.transport.name(),
            kb.modifiers,
            pressed_keys(&kb.keys)
        ),
        Event::Consumer(cr) => format!(
            "[consumer] transport={:<15}  keys=[{}]",
            cr.endpoint.transport.name(),
            pressed_keys(&cr.keys)
        ),
        #[cfg(feature = "pointing")]
        Event::Mouse(mr) => format!(
            "[mouse   ] transport={:<15}  buttons={}  dx={}  dy={}  scroll_x={}  scroll_y={}",
            mr.endpoint.transport.name(),
            mr.buttons,
            mr.dx,
            mr.dy,
            mr.scroll_x,
            mr.scroll_y
        ),
    }
}

/// Non-zero usages as `0x..`, or `-` when none are held.
fn pressed_keys(keys: &[u8]) -> String {
    let held: Vec<String> = keys
        .iter()
        .filter(|&&b| b != 0)
        .map(|b| format!("0x{b:02x}"))
        .collect();
    if held.is_empty() {
        "-".to_string()
    } else {
        held.join(", ")
    }
}
