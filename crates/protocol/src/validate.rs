//! Two-stage validation: envelope shape (already enforced by
//! [`crate::codec::decode`]'s `deny_unknown_fields`), then payload shape and
//! the cross-field invariants from §3 (§4.1).

use mudvault_common::{
    names::{self, NameKind},
    sanitize,
};

use crate::{
    ErrorCode, MAX_FORMATTED_CHARS, MAX_PRIORITY, MAX_TTL_SECS, MIN_PRIORITY, MIN_TTL_SECS,
    PROTOCOL_VERSION,
    envelope::{Envelope, MessageType},
    error::ValidationError,
    payload::{ChannelPayload, EmotePayload, FingerPayload, Payload, TellPayload},
};

/// Validate `envelope` in place: checks version, endpoint name formats,
/// metadata bounds, and the payload shape for its `type`; sanitizes and
/// bounds payload strings. Returns the parsed [`Payload`] on success.
pub fn validate(envelope: &mut Envelope) -> Result<Payload, ValidationError> {
    if envelope.version != PROTOCOL_VERSION {
        return Err(ValidationError::UnsupportedVersion(envelope.version.clone()));
    }

    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&envelope.metadata.priority) {
        return Err(ValidationError::MalformedEnvelope(format!(
            "metadata.priority {} out of range [{MIN_PRIORITY},{MAX_PRIORITY}]",
            envelope.metadata.priority
        )));
    }
    if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&envelope.metadata.ttl) {
        return Err(ValidationError::MalformedEnvelope(format!(
            "metadata.ttl {} out of range [{MIN_TTL_SECS},{MAX_TTL_SECS}]",
            envelope.metadata.ttl
        )));
    }

    validate_endpoint_names(envelope, envelope.r#type)?;

    let mut payload = Payload::parse(envelope.r#type, &envelope.payload)?;
    sanitize_payload(&mut payload);
    envelope.payload = payload.to_value();
    Ok(payload)
}

fn validate_endpoint_names(
    envelope: &Envelope,
    message_type: MessageType,
) -> Result<(), ValidationError> {
    if envelope.from.mud.is_empty() && !matches!(message_type, MessageType::Auth) {
        // `from.mud` is stamped by the router from the authenticated
        // connection for most types; auth frames precede authentication so
        // the client-supplied `from` is informational only and may be empty.
        return Ok(());
    }
    if !envelope.from.mud.is_empty()
        && !names::is_valid(&envelope.from.mud, NameKind::Mud)
        && !names::is_wildcard_mud(&envelope.from.mud)
    {
        return Err(ValidationError::MalformedEnvelope(format!(
            "from.mud {:?} is not a valid mud name",
            envelope.from.mud
        )));
    }
    if !envelope.to.mud.is_empty()
        && !names::is_valid(&envelope.to.mud, NameKind::Mud)
        && !names::is_wildcard_mud(&envelope.to.mud)
    {
        return Err(ValidationError::MalformedEnvelope(format!(
            "to.mud {:?} is not a valid mud name",
            envelope.to.mud
        )));
    }
    for endpoint in [&envelope.from, &envelope.to] {
        if let Some(user) = &endpoint.user
            && !names::is_valid(user, NameKind::User)
        {
            return Err(ValidationError::MalformedEnvelope(format!(
                "user {user:?} is not a valid user name"
            )));
        }
        if let Some(channel) = &endpoint.channel
            && !names::is_valid(channel, NameKind::Channel)
        {
            return Err(ValidationError::MalformedEnvelope(format!(
                "channel {channel:?} is not a valid channel name"
            )));
        }
    }
    Ok(())
}

fn sanitize_payload(payload: &mut Payload) {
    match payload {
        Payload::Tell(TellPayload { message }) => {
            *message = sanitize::sanitize(message, sanitize::MAX_MESSAGE_CHARS);
        },
        Payload::Emote(EmotePayload { action, .. }) | Payload::Emoteto(EmotePayload { action, .. }) => {
            *action = sanitize::sanitize(action, sanitize::MAX_MESSAGE_CHARS);
        },
        Payload::Channel(ChannelPayload { message, .. }) => {
            if let Some(m) = message {
                *m = sanitize::sanitize(m, sanitize::MAX_MESSAGE_CHARS);
            }
        },
        Payload::Finger(FingerPayload { info, .. }) => {
            if let Some(i) = info {
                *i = sanitize::sanitize(i, MAX_FORMATTED_CHARS);
            }
        },
        _ => {},
    }
}

/// Convenience: build the `error` envelope payload `ErrorCode` maps to, for
/// replying to a sender whose frame failed validation (§4.1).
#[must_use]
pub fn error_code_for(err: &ValidationError) -> ErrorCode {
    err.code()
}
