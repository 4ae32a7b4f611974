//! Communication-channel collaborator seam.
//!
//! The video/audio widget is external. The orchestrator hands it a
//! [`ChannelOpenRequest`] and the id of the container element to mount into.
//! Opening does not suspend; the widget connects on its own schedule.

use crate::error::Result;
use crate::protocol::ChannelOpenRequest;

/// Container element the channel widget mounts into by default.
pub const DEFAULT_CONTAINER_ID: &str = "sessionContainer";

/// A real-time communication channel that can be opened once credentials exist.
pub trait CommunicationChannel: Send + 'static {
    /// Open the channel inside `container` with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SessionJoinError::Channel`](crate::SessionJoinError::Channel)
    /// if the widget refuses the request.
    fn open(&mut self, container: &str, request: ChannelOpenRequest) -> Result<()>;
}

impl<F> CommunicationChannel for F
where
    F: FnMut(&str, ChannelOpenRequest) -> Result<()> + Send + 'static,
{
    fn open(&mut self, container: &str, request: ChannelOpenRequest) -> Result<()> {
        self(container, request)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_FEATURES;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn closures_are_channels() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut channel = move |container: &str, request: ChannelOpenRequest| -> Result<()> {
            sink.lock()
                .unwrap()
                .push((container.to_string(), request.user_name));
            Ok(())
        };

        let request = ChannelOpenRequest {
            credential: "T".into(),
            session_name: "room1".into(),
            user_name: "Ana".into(),
            passcode: String::new(),
            features: DEFAULT_FEATURES.to_vec(),
        };
        CommunicationChannel::open(&mut channel, DEFAULT_CONTAINER_ID, request).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(DEFAULT_CONTAINER_ID.to_string(), "Ana".to_string())]
        );
    }
}
