#![allow(non_snake_case)]

use async_trait::async_trait;
use mockall::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relay_core::*;

mock! {
    pub ChainProvider {
        pub fn _chain_id(&self) -> &str {}

        pub fn _chain_type(&self) -> &str {}

        pub fn _init(&self) -> ChainResult<()> {}

        pub fn _query_latest_height(&self) -> ChainResult<u64> {}

        pub fn _finality_depth(&self) -> u64 {}

        /// Blocks handed to the listener's queue before it waits for
        /// cancellation. An error is returned from `listen` right away.
        pub fn _listen(&self, start_height: u64) -> ChainResult<Vec<BlockInfo>> {}

        pub fn _should_send_message(&self, message: &Message) -> ChainResult<bool> {}

        pub fn _should_receive_message(&self, message: &Message) -> ChainResult<bool> {}

        /// Outcome reported through the route callback.
        pub fn _route(&self, message: &Message) -> ChainResult<TxResponse> {}

        pub fn _message_received(&self, key: &MessageKey) -> ChainResult<bool> {}

        pub fn _generate_messages(
            &self,
            key: &MessageKeyAtHeight,
        ) -> ChainResult<Vec<Message>> {}

        pub fn _query_transaction_receipt(&self, tx_hash: &str) -> ChainResult<Receipt> {}

        pub fn _revert_message(&self, sn: u64) -> ChainResult<()> {}

        pub fn _get_fee(&self, network: &str, response_fee: bool) -> ChainResult<u64> {}

        pub fn _set_fee(&self, network: &str, msg_fee: u64, res_fee: u64) -> ChainResult<()> {}

        pub fn _claim_fee(&self) -> ChainResult<()> {}
    }
}

impl std::fmt::Debug for MockChainProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockChainProvider")
    }
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    fn chain_id(&self) -> &str {
        self._chain_id()
    }

    fn chain_type(&self) -> &str {
        self._chain_type()
    }

    async fn init(&self) -> ChainResult<()> {
        self._init()
    }

    async fn query_latest_height(&self) -> ChainResult<u64> {
        self._query_latest_height()
    }

    fn finality_depth(&self) -> u64 {
        self._finality_depth()
    }

    async fn listen(
        &self,
        cancel: CancellationToken,
        start_height: u64,
        outbound: mpsc::Sender<BlockInfo>,
    ) -> ChainResult<()> {
        for block in self._listen(start_height)? {
            if outbound.send(block).await.is_err() {
                return Ok(());
            }
        }
        cancel.cancelled().await;
        Ok(())
    }

    async fn should_send_message(&self, message: &Message) -> ChainResult<bool> {
        self._should_send_message(message)
    }

    async fn should_receive_message(&self, message: &Message) -> ChainResult<bool> {
        self._should_receive_message(message)
    }

    async fn route(&self, message: &Message, callback: RouteCallback) -> ChainResult<()> {
        callback.complete(self._route(message));
        Ok(())
    }

    async fn message_received(&self, key: &MessageKey) -> ChainResult<bool> {
        self._message_received(key)
    }

    async fn generate_messages(&self, key: &MessageKeyAtHeight) -> ChainResult<Vec<Message>> {
        self._generate_messages(key)
    }

    async fn query_transaction_receipt(&self, tx_hash: &str) -> ChainResult<Receipt> {
        self._query_transaction_receipt(tx_hash)
    }

    async fn revert_message(&self, sn: u64) -> ChainResult<()> {
        self._revert_message(sn)
    }

    async fn get_fee(&self, network: &str, response_fee: bool) -> ChainResult<u64> {
        self._get_fee(network, response_fee)
    }

    async fn set_fee(&self, network: &str, msg_fee: u64, res_fee: u64) -> ChainResult<()> {
        self._set_fee(network, msg_fee, res_fee)
    }

    async fn claim_fee(&self) -> ChainResult<()> {
        self._claim_fee()
    }
}
