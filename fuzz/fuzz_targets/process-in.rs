#![no_main]

use libfuzzer_sys::fuzz_target;
use pof_test_utils::*;

// Arbitrary frames through the L2 fixture pipeline must never panic,
// and anything sent must be one of the switch's ports.
fuzz_target!(|data: &[u8]| {
    let store = l2_switch(4);
    let Ok(mut pkt) = PacketContext::new(data, 1) else {
        return;
    };
    let out = Pipeline::default().process(&store, &mut pkt);
    for rec in &out.outputs {
        assert!((1..=4).contains(&rec.port_id));
    }
});
