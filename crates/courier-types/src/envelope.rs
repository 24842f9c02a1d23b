//! The envelope: the single unit everything in Courier routes and transports
//!
//! An envelope carries an opaque message body between two addresses under a
//! protocol specification id. When either leg is a component identifier the
//! envelope travels between internal components and must not carry an
//! explicit connection override in its context.

use crate::ids::{Address, ComponentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Envelope construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("component-addressed envelope cannot carry an explicit connection id")]
    ContextOnComponentEnvelope,

    #[error("message is missing a recipient address")]
    MissingRecipient,

    #[error("message is missing a sender address")]
    MissingSender,
}

/// Routing hints attached to an envelope by its producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeContext {
    /// Explicit connection override, consulted before any routing defaults.
    pub connection_id: Option<ComponentId>,
    /// Transport-specific target, opaque to the routing layer.
    pub uri: Option<String>,
}

impl EnvelopeContext {
    pub fn with_connection_id(connection_id: ComponentId) -> Self {
        Self {
            connection_id: Some(connection_id),
            uri: None,
        }
    }
}

/// The transport unit of the framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    to: Address,
    sender: Address,
    protocol_specification_id: ComponentId,
    message: Vec<u8>,
    context: Option<EnvelopeContext>,
}

impl Envelope {
    pub fn new(
        to: Address,
        sender: Address,
        protocol_specification_id: ComponentId,
        message: Vec<u8>,
    ) -> Self {
        Self {
            to,
            sender,
            protocol_specification_id,
            message,
            context: None,
        }
    }

    /// Attach a context, enforcing that component-addressed envelopes never
    /// carry an explicit connection override.
    pub fn with_context(mut self, context: EnvelopeContext) -> Result<Self, EnvelopeError> {
        if context.connection_id.is_some() && !self.is_agent_to_agent() {
            return Err(EnvelopeError::ContextOnComponentEnvelope);
        }
        self.context = Some(context);
        Ok(self)
    }

    pub fn to(&self) -> &Address {
        &self.to
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn protocol_specification_id(&self) -> &ComponentId {
        &self.protocol_specification_id
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn into_message(self) -> Vec<u8> {
        self.message
    }

    pub fn context(&self) -> Option<&EnvelopeContext> {
        self.context.as_ref()
    }

    /// Explicit connection override, if the producer attached one.
    pub fn connection_id(&self) -> Option<&ComponentId> {
        self.context.as_ref().and_then(|c| c.connection_id.as_ref())
    }

    /// True when either leg addresses an internal component.
    pub fn is_component_to_component(&self) -> bool {
        !self.is_agent_to_agent()
    }

    /// True when both legs are plain agent addresses.
    pub fn is_agent_to_agent(&self) -> bool {
        self.to.as_component_id().is_none() && self.sender.as_component_id().is_none()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope(to={}, sender={}, protocol_specification_id={}, message_len={})",
            self.to,
            self.sender,
            self.protocol_specification_id,
            self.message.len()
        )
    }
}

/// A bare message as handed over by a skill or behaviour, before it is
/// wrapped into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub to: Address,
    pub sender: Address,
    pub protocol_specification_id: ComponentId,
    pub body: Vec<u8>,
}

impl Message {
    /// Build the envelope for this message, rejecting missing legs. This is
    /// the only structural validation applied to bare messages.
    pub fn into_envelope(self) -> Result<Envelope, EnvelopeError> {
        if self.to.is_empty() {
            return Err(EnvelopeError::MissingRecipient);
        }
        if self.sender.is_empty() {
            return Err(EnvelopeError::MissingSender);
        }
        Ok(Envelope::new(
            self.to,
            self.sender,
            self.protocol_specification_id,
            self.body,
        ))
    }
}
