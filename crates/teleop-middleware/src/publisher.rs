//! Single-topic publisher.
//!
//! A [`Publisher`] owns exactly one outbound topic.  It encodes a
//! [`CommandState`] through its [`MessageLayout`], hands the body to the
//! transport, and remembers what it last sent so the lifecycle guard can tell
//! whether the robot has already been told to stop.

use std::sync::Arc;

use teleop_types::{CommandState, TeleopError};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::layout::MessageLayout;
use crate::transport::Transport;

pub struct Publisher {
    transport: Arc<dyn Transport>,
    topic: String,
    layout: MessageLayout,
    advertised: bool,
    last_sent: Option<CommandState>,
    published: u64,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>, layout: MessageLayout) -> Self {
        Self {
            transport,
            topic: topic.into(),
            layout,
            advertised: false,
            last_sent: None,
            published: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn layout(&self) -> &MessageLayout {
        &self.layout
    }

    pub fn is_advertised(&self) -> bool {
        self.advertised
    }

    /// Number of messages handed to the transport so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn last_sent(&self) -> Option<&CommandState> {
        self.last_sent.as_ref()
    }

    /// `true` when nothing has been sent yet or the last message was neutral.
    pub fn last_sent_is_neutral(&self) -> bool {
        self.last_sent.as_ref().is_none_or(CommandState::is_neutral)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn connection(&self) -> watch::Receiver<bool> {
        self.transport.connection()
    }

    /// Announce the topic.  Idempotent once it succeeded.
    pub fn advertise(&mut self) -> Result<(), TeleopError> {
        if self.advertised {
            return Ok(());
        }
        self.transport.advertise(&self.topic, &self.layout.message_type)?;
        self.advertised = true;
        info!(topic = %self.topic, message_type = %self.layout.message_type, "topic advertised");
        Ok(())
    }

    /// Withdraw the topic.  A no-op when it was never advertised.
    ///
    /// The local flag is cleared even if the transport refuses, so a later
    /// [`advertise`][Self::advertise] is never skipped.
    pub fn unadvertise(&mut self) -> Result<(), TeleopError> {
        if !self.advertised {
            return Ok(());
        }
        self.advertised = false;
        self.transport.unadvertise(&self.topic)?;
        info!(topic = %self.topic, "topic unadvertised");
        Ok(())
    }

    /// Encode and send `state`.
    ///
    /// # Errors
    ///
    /// * [`TeleopError::TransportNotReady`] when the topic is not advertised
    ///   or the transport is disconnected.
    /// * [`TeleopError::Serialization`] when the layout cannot encode `state`.
    pub fn publish(&mut self, state: &CommandState) -> Result<(), TeleopError> {
        if !self.advertised {
            return Err(TeleopError::TransportNotReady(format!(
                "topic '{}' is not advertised",
                self.topic
            )));
        }
        let body = self.layout.encode(state)?;
        self.transport.publish(&self.topic, &body)?;
        self.last_sent = Some(state.clone());
        self.published += 1;
        debug!(topic = %self.topic, neutral = state.is_neutral(), "published");
        Ok(())
    }
}
