//! Two-step SOCKS5 gateway in front of the MRIM and redirector handlers.
//!
//! Only no-authentication CONNECT requests to one of two configured ports are accepted.
//! On success the socket is not proxied anywhere: the bare connection, including any bytes
//! the client already sent after its request, is handed to the matching handler in-process.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tracing::{debug, info, warn};

use crate::config::SocksConfig;
use crate::core::binary::BinaryReader;
use crate::engine::{ConnectionHandler, Rejection, Step, StepByStep, StepOutcome};
use crate::error::{constants, ProtocolError};
use crate::socks::messages::*;
use crate::utils::metrics::global_metrics;

type StepResult = std::result::Result<StepOutcome, Rejection>;

/// Destination ports the gateway accepts and the handler each one is spliced into.
#[derive(Clone)]
pub struct SocksRoutes {
    mrim_port: u16,
    mrim: Arc<dyn ConnectionHandler>,
    redirector_port: u16,
    redirector: Arc<dyn ConnectionHandler>,
}

impl SocksRoutes {
    pub fn new(
        config: &SocksConfig,
        mrim: Arc<dyn ConnectionHandler>,
        redirector: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self {
            mrim_port: config.mrim_port,
            mrim,
            redirector_port: config.redirector_port,
            redirector,
        }
    }

    pub fn route(&self, port: u16) -> Option<&Arc<dyn ConnectionHandler>> {
        if port == self.mrim_port {
            Some(&self.mrim)
        } else if port == self.redirector_port {
            Some(&self.redirector)
        } else {
            None
        }
    }
}

/// The gateway as a connection handler.
pub fn gateway(routes: SocksRoutes) -> StepByStep {
    StepByStep::new("socks5", move || {
        vec![
            Box::new(MethodNegotiation) as Box<dyn Step>,
            Box::new(ConnectCommand {
                routes: routes.clone(),
            }),
        ]
    })
}

/// Keep waiting on short input, close on anything else.
fn fatal(error: ProtocolError) -> Rejection {
    if error.is_incomplete() {
        Rejection::new(error)
    } else {
        Rejection::new(error).closing()
    }
}

pub struct MethodNegotiation;

impl Step for MethodNegotiation {
    fn name(&self) -> &'static str {
        "socks_handshake"
    }

    fn advance(&mut self, input: &mut BytesMut) -> StepResult {
        let mut reader = BinaryReader::network(&input[..]);
        let hello = Handshake::decode_from(&mut reader).map_err(fatal)?;
        let used = reader.position();

        if !hello.offers(method::NO_AUTHENTICATION) {
            global_metrics().socks_refused();
            debug!(methods = ?hello.methods, "no acceptable method offered");
            let refusal = MethodSelection {
                method: method::NO_ACCEPTABLE,
            }
            .encode()?;
            return Err(Rejection::new(ProtocolError::UnsupportedOperation(
                constants::ERR_SOCKS_NO_ACCEPTABLE_METHOD.into(),
            ))
            .with_reply(refusal)
            .closing());
        }

        input.advance(used);
        Ok(StepOutcome::reply(
            MethodSelection {
                method: method::NO_AUTHENTICATION,
            }
            .encode()?,
        ))
    }
}

pub struct ConnectCommand {
    routes: SocksRoutes,
}

impl ConnectCommand {
    fn refuse(error: ProtocolError, code: u8) -> Rejection {
        global_metrics().socks_refused();
        debug!(error = %error, code, "connect refused");
        let rejection = Rejection::new(error).closing();
        match ConnectReply::status(code).encode() {
            Ok(reply) => rejection.with_reply(reply),
            Err(e) => {
                warn!(error = %e, "failed to encode SOCKS reply");
                rejection
            }
        }
    }
}

impl Step for ConnectCommand {
    fn name(&self) -> &'static str {
        "socks_connect"
    }

    fn advance(&mut self, input: &mut BytesMut) -> StepResult {
        let mut reader = BinaryReader::network(&input[..]);
        let request = match ConnectRequest::decode_from(&mut reader) {
            Ok(request) => request,
            Err(e) if e.is_incomplete() => return Err(Rejection::new(e)),
            Err(e @ ProtocolError::UnsupportedOperation(_)) => {
                return Err(Self::refuse(e, reply::ADDRESS_TYPE_NOT_SUPPORTED))
            }
            Err(e) => return Err(Self::refuse(e, reply::GENERAL_FAILURE)),
        };
        let used = reader.position();

        if request.command != command::CONNECT {
            return Err(Self::refuse(
                ProtocolError::UnsupportedOperation(constants::ERR_SOCKS_COMMAND.into()),
                reply::COMMAND_NOT_SUPPORTED,
            ));
        }
        let Some(handler) = self.routes.route(request.port) else {
            return Err(Self::refuse(
                ProtocolError::UnsupportedOperation(format!(
                    "{}: {}",
                    constants::ERR_SOCKS_PORT,
                    request.port
                )),
                reply::CONNECTION_NOT_ALLOWED,
            ));
        };

        input.advance(used);
        global_metrics().socks_handoff();
        info!(
            destination = %request.address,
            port = request.port,
            handler = handler.name(),
            "connect accepted"
        );
        Ok(StepOutcome::reply(ConnectReply::status(reply::SUCCEEDED).encode()?)
            .hand_off(Arc::clone(handler)))
    }
}
