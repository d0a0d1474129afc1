use std::path::Path;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use relay_core::{Pagination, RouteMessage};

use super::{
    protocol::{
        codec, Envelope, Event, ReqChain, ReqGetBlock, ReqGetFee, ReqMessage, ReqMessageList,
        ReqRelayMessage, ReqSetFee, ResCurrentHeight, ResError, ResGetBlock, ResGetFee,
        ResMessageList, ResMessageRemove, ResRevertMessage, ResStatus,
    },
    ControlError,
};

/// Client side of the control socket. Requests are sent one at a time over a
/// single connection.
#[derive(Debug)]
pub struct ControlClient {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
    next_id: u64,
}

impl ControlClient {
    /// Connect to the socket at `path`
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            framed: Framed::new(stream, codec()),
            next_id: 0,
        })
    }

    /// Send one request and wait for its response.
    pub async fn call<Req, Res>(&mut self, event: Event, request: &Req) -> Result<Res, ControlError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.next_id += 1;
        let id = self.next_id;
        let envelope = Envelope::new(event, Some(id), request)?;
        self.framed
            .send(Bytes::from(serde_json::to_vec(&envelope)?))
            .await?;

        let frame = self.framed.next().await.ok_or(ControlError::Closed)??;
        let response: Envelope = serde_json::from_slice(&frame)?;
        if response.id != Some(id) {
            return Err(ControlError::UnexpectedResponse {
                expected: event,
                id,
                event: response.event,
                got: response.id,
            });
        }
        match response.event {
            Event::Error => {
                let err: ResError = response.decode()?;
                Err(ControlError::Remote(err.message))
            }
            got if got == event => Ok(response.decode()?),
            got => Err(ControlError::UnexpectedResponse {
                expected: event,
                id,
                event: got,
                got: response.id,
            }),
        }
    }

    /// Persisted height of `chain`, or of every chain
    pub async fn get_block(&mut self, chain: &str, all: bool) -> Result<Vec<ResGetBlock>, ControlError> {
        let req = ReqGetBlock {
            chain: chain.to_owned(),
            all,
        };
        self.call(Event::GetBlock, &req).await
    }

    /// A page of the stored messages of `chain`
    pub async fn get_message_list(
        &mut self,
        chain: &str,
        pagination: Pagination,
    ) -> Result<ResMessageList, ControlError> {
        let req = ReqMessageList {
            chain: chain.to_owned(),
            pagination,
        };
        self.call(Event::GetMessageList, &req).await
    }

    /// Replay message `sn` of `chain`, regenerated at `height` if given
    pub async fn relay_message(
        &mut self,
        chain: &str,
        sn: u64,
        height: Option<u64>,
    ) -> Result<RouteMessage, ControlError> {
        let req = ReqRelayMessage {
            chain: chain.to_owned(),
            sn,
            height,
        };
        self.call(Event::RelayMessage, &req).await
    }

    /// Drop a pending message
    pub async fn remove_message(&mut self, chain: &str, sn: u64) -> Result<ResMessageRemove, ControlError> {
        let req = ReqMessage {
            chain: chain.to_owned(),
            sn,
        };
        self.call(Event::MessageRemove, &req).await
    }

    /// Revert message `sn` on `chain`
    pub async fn revert_message(&mut self, chain: &str, sn: u64) -> Result<ResRevertMessage, ControlError> {
        let req = ReqMessage {
            chain: chain.to_owned(),
            sn,
        };
        self.call(Event::RevertMessage, &req).await
    }

    /// Fee of `chain` towards `network`
    pub async fn get_fee(
        &mut self,
        chain: &str,
        network: &str,
        response: bool,
    ) -> Result<ResGetFee, ControlError> {
        let req = ReqGetFee {
            chain: chain.to_owned(),
            network: network.to_owned(),
            response,
        };
        self.call(Event::GetFee, &req).await
    }

    /// Update the fees of `chain` towards `network`
    pub async fn set_fee(
        &mut self,
        chain: &str,
        network: &str,
        msg_fee: u64,
        res_fee: u64,
    ) -> Result<ResStatus, ControlError> {
        let req = ReqSetFee {
            chain: chain.to_owned(),
            network: network.to_owned(),
            msg_fee,
            res_fee,
        };
        self.call(Event::SetFee, &req).await
    }

    /// Withdraw the fees collected on `chain`
    pub async fn claim_fee(&mut self, chain: &str) -> Result<ResStatus, ControlError> {
        let req = ReqChain {
            chain: chain.to_owned(),
        };
        self.call(Event::ClaimFee, &req).await
    }

    /// Latest height reported by `chain`
    pub async fn current_height(&mut self, chain: &str) -> Result<ResCurrentHeight, ControlError> {
        let req = ReqChain {
            chain: chain.to_owned(),
        };
        self.call(Event::CurrentHeight, &req).await
    }

    /// Wipe the relayer database
    pub async fn prune_db(&mut self) -> Result<ResStatus, ControlError> {
        self.call(Event::PruneDb, &serde_json::json!({})).await
    }
}
