use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::RelayContext;

use super::{
    protocol::{
        codec, Envelope, Event, ReqChain, ReqGetBlock, ReqGetFee, ReqMessage, ReqMessageList,
        ReqRelayMessage, ReqSetFee, ResCurrentHeight, ResGetFee, ResRevertMessage, ResStatus,
    },
    ControlError,
};

/// Serves the control socket
#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    context: Arc<RelayContext>,
}

impl ControlServer {
    /// Bind the socket at `path`, replacing a stale socket file
    pub fn bind(path: impl Into<PathBuf>, context: Arc<RelayContext>) -> io::Result<Self> {
        let path = path.into();
        if path.exists() {
            debug!(path = %path.display(), "Removing stale control socket");
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            listener,
            path,
            context,
        })
    }

    /// Path of the socket
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until cancelled, serving each on its own task.
    pub async fn run(self, cancel: CancellationToken) {
        info!(path = %self.path.display(), "Control socket listening");
        let mut next_connection = 0u64;
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    next_connection += 1;
                    let context = self.context.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(
                        serve_connection(stream, context, cancel)
                            .instrument(info_span!("ControlConnection", id = next_connection)),
                    );
                }
                Err(err) => warn!(?err, "Failed to accept control connection"),
            }
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!(?err, "Failed to remove control socket");
        }
        info!("Control socket closed");
    }
}

async fn serve_connection(stream: UnixStream, context: Arc<RelayContext>, cancel: CancellationToken) {
    let mut framed = Framed::new(stream, codec());
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = framed.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                debug!(?err, "Failed to read control frame");
                break;
            }
            None => break,
        };

        let response = handle_frame(&context, &frame).await;
        let encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(?err, "Failed to encode control response");
                break;
            }
        };
        if let Err(err) = framed.send(Bytes::from(encoded)).await {
            debug!(?err, "Failed to write control response");
            break;
        }
    }
    debug!("Control connection closed");
}

/// Answer one raw frame. Failures become an `Error` envelope.
pub(crate) async fn handle_frame(context: &RelayContext, frame: &[u8]) -> Envelope {
    let request: Envelope = match serde_json::from_slice(frame) {
        Ok(request) => request,
        Err(err) => return Envelope::error(None, err),
    };
    let id = request.id;
    match handle_request(context, &request).await {
        Ok(data) => Envelope {
            event: request.event,
            id,
            data,
        },
        Err(err) => {
            warn!(?err, event = %request.event, "Control request failed");
            Envelope::error(id, err)
        }
    }
}

async fn handle_request(context: &RelayContext, request: &Envelope) -> Result<Value, ControlError> {
    debug!(event = %request.event, "Handling control request");
    let response = match request.event {
        Event::GetBlock => {
            let req: ReqGetBlock = request.decode()?;
            serde_json::to_value(context.get_block(&req.chain, req.all).await?)?
        }
        Event::GetMessageList => {
            let req: ReqMessageList = request.decode()?;
            serde_json::to_value(context.get_message_list(&req.chain, req.pagination)?)?
        }
        Event::RelayMessage => {
            let req: ReqRelayMessage = request.decode()?;
            serde_json::to_value(context.relay_message(&req.chain, req.sn, req.height).await?)?
        }
        Event::MessageRemove => {
            let req: ReqMessage = request.decode()?;
            serde_json::to_value(context.remove_message(&req.chain, req.sn).await?)?
        }
        Event::RevertMessage => {
            let req: ReqMessage = request.decode()?;
            context.revert_message(&req.chain, req.sn).await?;
            serde_json::to_value(ResRevertMessage { sn: req.sn })?
        }
        Event::GetFee => {
            let req: ReqGetFee = request.decode()?;
            let fee = context
                .get_fee(&req.chain, &req.network, req.response)
                .await?;
            serde_json::to_value(ResGetFee {
                chain: req.chain,
                fee,
                response: req.response,
            })?
        }
        Event::SetFee => {
            let req: ReqSetFee = request.decode()?;
            context
                .set_fee(&req.chain, &req.network, req.msg_fee, req.res_fee)
                .await?;
            serde_json::to_value(ResStatus::success())?
        }
        Event::ClaimFee => {
            let req: ReqChain = request.decode()?;
            context.claim_fee(&req.chain).await?;
            serde_json::to_value(ResStatus::success())?
        }
        Event::CurrentHeight => {
            let req: ReqChain = request.decode()?;
            let height = context.current_height(&req.chain).await?;
            serde_json::to_value(ResCurrentHeight {
                chain: req.chain,
                height,
            })?
        }
        Event::PruneDb => {
            context.prune_db()?;
            serde_json::to_value(ResStatus::success())?
        }
        Event::Error => return Err(ControlError::NotARequest(Event::Error)),
    };
    Ok(response)
}
