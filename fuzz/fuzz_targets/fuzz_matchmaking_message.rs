#![no_main]

use libfuzzer_sys::fuzz_target;
use session_join::protocol::{CredentialResponse, MatchmakingServerMessage};

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<MatchmakingServerMessage>(data);

    // Credential responses come from a remote authority too.
    let _ = serde_json::from_slice::<CredentialResponse>(data);
});
