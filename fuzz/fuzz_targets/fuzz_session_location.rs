#![no_main]

use libfuzzer_sys::fuzz_target;
use session_join::SessionId;

fuzz_target!(|data: &[u8]| {
    let Ok(location) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(id) = SessionId::from_location(location, "r=") {
        assert!(!id.as_str().is_empty());
    }
});
