//! Authenticate-then-command exchange with the hub.
//!
//! STATE MACHINE
//! =============
//! `AwaitAuthRequired → AuthSent → AwaitAuthResult → AuthOk → CommandSent →
//! AwaitResponse → Done`, with `AuthFailed` as the terminal rejection. Exactly
//! one command is sent per session, tagged with [`COMMAND_ID`]; every inbound
//! message carrying another id is dropped while waiting for the reply.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::handshake;
use crate::transport::{self, Transport};

/// Correlation id of the single command a session sends.
pub const COMMAND_ID: u64 = 1;

const TYPE_AUTH_REQUIRED: &str = "auth_required";
const TYPE_AUTH_OK: &str = "auth_ok";
const TYPE_AUTH_INVALID: &str = "auth_invalid";

/// The one key extra command fields cannot override.
const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitAuthRequired,
    AuthSent,
    AwaitAuthResult,
    AuthOk,
    AuthFailed,
    CommandSent,
    AwaitResponse,
    Done,
}

/// One command for the hub: its `type` plus any extra top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub command_type: String,
    pub extra: Map<String, Value>,
}

impl CommandRequest {
    /// Build a request; `extra` must be a JSON object when present.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidExtraFields`] when `extra` is not an object or null.
    pub fn new(command_type: impl Into<String>, extra: Option<Value>) -> Result<Self, Error> {
        let extra = match extra {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => return Err(Error::InvalidExtraFields(other)),
        };
        Ok(Self {
            command_type: command_type.into(),
            extra,
        })
    }

    /// Wire body: `id` and `type`, then the extra fields layered on top.
    ///
    /// Extra fields win, `type` included. `id` stays pinned because the
    /// reply is matched on it.
    fn to_message(&self, id: u64) -> Value {
        let mut body = Map::with_capacity(self.extra.len() + 2);
        body.insert(ID_FIELD.to_owned(), Value::from(id));
        body.insert("type".to_owned(), Value::String(self.command_type.clone()));
        for (key, value) in &self.extra {
            if key == ID_FIELD {
                tracing::warn!(%value, "ignoring id in command data");
                continue;
            }
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

#[derive(Serialize)]
struct AuthMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    access_token: &'a str,
}

/// An inbound hub message. Fields are read leniently: a missing or oddly
/// typed field never fails the parse.
#[derive(Debug)]
struct Inbound(Value);

impl Inbound {
    fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The `type` as shown in protocol errors.
    fn describe_kind(&self) -> String {
        match self.0.get("type") {
            None | Some(Value::Null) => "<no type>".to_owned(),
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => other.to_string(),
        }
    }

    fn message(&self) -> String {
        match self.0.get("message") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
        }
    }

    fn succeeded(&self) -> bool {
        self.0.get("success").is_some_and(is_truthy)
    }

    /// Remove `field`, treating `null` as absent.
    fn take(&mut self, field: &str) -> Option<Value> {
        self.0
            .as_object_mut()
            .and_then(|body| body.remove(field))
            .filter(|value| !value.is_null())
    }
}

/// Drives one exchange over an upgraded connection.
pub struct Session<S: Transport> {
    conn: Connection<S>,
    state: SessionState,
}

impl<S: Transport> Session<S> {
    #[must_use]
    pub fn new(conn: Connection<S>) -> Self {
        Self {
            conn,
            state: SessionState::AwaitAuthRequired,
        }
    }

    /// Authenticate with `token`, send `request`, and wait for its reply.
    ///
    /// Consumes the session; the connection is closed on every exit path.
    ///
    /// # Errors
    ///
    /// [`Error::AuthInvalid`] and [`Error::CommandFailed`] carry the hub's
    /// answer. [`Error::Protocol`], [`Error::Codec`], and [`Error::Json`] mean
    /// the exchange broke.
    pub fn run(mut self, token: &str, request: &CommandRequest) -> Result<Value, Error> {
        self.authenticate(token)?;
        self.execute(request)
    }

    fn authenticate(&mut self, token: &str) -> Result<(), Error> {
        let challenge = self.recv()?;
        if challenge.kind() != Some(TYPE_AUTH_REQUIRED) {
            return Err(Error::Protocol {
                expected: TYPE_AUTH_REQUIRED,
                actual: challenge.describe_kind(),
            });
        }

        self.conn.send_json(&AuthMessage {
            kind: "auth",
            access_token: token,
        })?;
        self.transition(SessionState::AuthSent);
        self.transition(SessionState::AwaitAuthResult);

        let verdict = self.recv()?;
        match verdict.kind() {
            Some(TYPE_AUTH_OK) => {
                self.transition(SessionState::AuthOk);
                Ok(())
            }
            Some(TYPE_AUTH_INVALID) => {
                self.transition(SessionState::AuthFailed);
                Err(Error::AuthInvalid {
                    message: verdict.message(),
                })
            }
            _ => Err(Error::Protocol {
                expected: TYPE_AUTH_OK,
                actual: verdict.describe_kind(),
            }),
        }
    }

    fn execute(&mut self, request: &CommandRequest) -> Result<Value, Error> {
        self.conn.send_json(&request.to_message(COMMAND_ID))?;
        self.transition(SessionState::CommandSent);
        tracing::debug!(command = %request.command_type, id = COMMAND_ID, "command sent");

        self.transition(SessionState::AwaitResponse);
        let mut reply = self.await_reply()?;
        self.transition(SessionState::Done);

        if reply.succeeded() {
            Ok(reply.take("result").unwrap_or_else(empty_object))
        } else {
            Err(Error::CommandFailed {
                error: reply.take("error").unwrap_or_else(empty_object),
            })
        }
    }

    /// Read until the message tagged [`COMMAND_ID`] arrives.
    fn await_reply(&mut self) -> Result<Inbound, Error> {
        loop {
            let text = self.conn.recv_text()?;
            let value: Value = serde_json::from_str(&text)?;
            if value.get(ID_FIELD).is_some_and(is_command_id) {
                return Ok(Inbound(value));
            }
            tracing::debug!(
                id = ?value.get("id"),
                kind = ?value.get("type"),
                "discarding unrelated message"
            );
        }
    }

    fn recv(&mut self) -> Result<Inbound, Error> {
        let text = self.conn.recv_text()?;
        Ok(Inbound(serde_json::from_str(&text)?))
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// Ids compare by numeric value, so `1.0` names the command too.
#[allow(clippy::cast_precision_loss)]
fn is_command_id(id: &Value) -> bool {
    id.as_u64() == Some(COMMAND_ID) || id.as_f64() == Some(COMMAND_ID as f64)
}

/// JSON truthiness: `null`, `false`, zero, and empty values are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Connect, upgrade, and run one command against the hub described by `config`.
///
/// # Errors
///
/// Any [`Error`]; see [`Session::run`] for which ones are hub answers.
pub fn run(config: &SessionConfig, request: &CommandRequest) -> Result<Value, Error> {
    let stream = transport::connect(&config.endpoint, &config.timeouts)?;
    let conn = handshake::upgrade(stream, &config.endpoint)?;
    Session::new(conn).run(&config.token, request)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
