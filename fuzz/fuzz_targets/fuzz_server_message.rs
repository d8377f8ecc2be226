#![no_main]

use blanco_session_client::dispatch;
use blanco_session_client::reconcile::Reconciler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Decode and route through a reconciler whose cache carries over between
    // frames, the way the session loop feeds it.
    let mut reconciler = Reconciler::default();
    for line in text.lines() {
        if let Some(message) = dispatch::decode(line) {
            let _ = dispatch::route(message, &mut reconciler);
        }
    }
});
