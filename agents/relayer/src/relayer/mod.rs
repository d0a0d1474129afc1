use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use eyre::{eyre, Result};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use relay_base::{
    db::{DbResult, DB},
    BaseAgent, CoreMetrics,
};

use crate::{
    control::{protocol::SOCKET_NAME, ControlServer},
    settings::RelayerSettings,
    Chain, ChainRuntime, Chains, RelayerError,
};

pub use context::*;

mod completion;
mod context;
mod operations;
mod processor;
mod router;

/// Time given to outstanding deliveries to report their outcome on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The relay agent: listens to every configured chain and delivers the
/// messages it finds to their destination chains.
pub struct Relayer {
    context: Arc<RelayContext>,
    socket_path: PathBuf,
}

impl Debug for Relayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Relayer {{ context: {:?}, socket_path: {} }}",
            self.context,
            self.socket_path.display()
        )
    }
}

impl Relayer {
    /// Relayer over `chains`, resuming from the state persisted in `db`
    pub fn new(
        chains: &Chains,
        db: DB,
        config: RelayConfig,
        metrics: Arc<CoreMetrics>,
        socket_path: PathBuf,
    ) -> DbResult<Self> {
        Ok(Self {
            context: Arc::new(RelayContext::new(chains, db, config, metrics)?),
            socket_path,
        })
    }

    /// State shared by the relay tasks
    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Path of the control socket
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Run every relay task until `cancel` fires or a listener fails.
    ///
    /// On shutdown the listeners, block processors, router and control socket
    /// are stopped first. Outcomes of deliveries that are still outstanding
    /// are then awaited for at most [`SHUTDOWN_GRACE`].
    pub async fn run_until(self, cancel: CancellationToken) -> Result<()> {
        let context = self.context;
        let server = ControlServer::bind(&self.socket_path, context.clone())?;

        context.flush_stored_messages().await;

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let completion = tokio::spawn(
            context
                .clone()
                .run_completion(outcome_rx)
                .instrument(info_span!("Completion")),
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for runtime in context.runtimes() {
            let Some(inbound) = runtime.take_inbound() else {
                warn!(chain = runtime.chain_id(), "Inbound queue already taken, not processing blocks");
                continue;
            };
            tasks.push(tokio::spawn(
                context
                    .clone()
                    .run_block_processor(runtime.clone(), inbound, cancel.clone())
                    .instrument(info_span!("BlockProcessor", chain = runtime.chain_id())),
            ));
        }
        tasks.push(tokio::spawn(
            context
                .clone()
                .run_router(outcome_tx, cancel.clone())
                .instrument(info_span!("Router")),
        ));
        tasks.push(tokio::spawn(
            server
                .run(cancel.clone())
                .instrument(info_span!("ControlServer")),
        ));

        let mut listeners = Vec::new();
        for runtime in context.runtimes() {
            let start_height = runtime.start_height().await;
            listeners.push(spawn_listener(runtime.clone(), start_height, cancel.clone()));
        }
        info!(chains = listeners.len(), "Relayer started");

        cancel.cancelled().await;
        info!("Stopping relayer");

        let mut failure = None;
        for listener in listeners {
            match listener.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(err) => error!(?err, "Listener task panicked"),
            }
        }
        for task in tasks {
            if let Err(err) = task.await {
                error!(?err, "Relay task panicked");
            }
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, completion).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(?err, "Completion task panicked"),
            Err(_) => warn!(grace = ?SHUTDOWN_GRACE, "Deliveries still outstanding at shutdown"),
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// A listener that fails takes the whole relayer down with it.
fn spawn_listener(
    runtime: Arc<ChainRuntime>,
    start_height: u64,
    cancel: CancellationToken,
) -> JoinHandle<Result<(), RelayerError>> {
    let span = info_span!("Listener", chain = runtime.chain_id());
    tokio::spawn(
        async move {
            info!(start_height, "Starting listener");
            let result = runtime
                .provider()
                .listen(cancel.clone(), start_height, runtime.inbound_sender())
                .await;
            match result {
                Ok(()) => {
                    info!("Listener stopped");
                    Ok(())
                }
                Err(source) => {
                    error!(err = ?source, "Listener failed, stopping relayer");
                    cancel.cancel();
                    Err(RelayerError::Listener {
                        chain: runtime.chain_id().to_owned(),
                        source,
                    })
                }
            }
        }
        .instrument(span),
    )
}

#[async_trait]
impl BaseAgent for Relayer {
    const AGENT_NAME: &'static str = "relayer";

    type Settings = RelayerSettings;

    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized,
    {
        let db = DB::from_path(&settings.db)?;
        if settings.fresh {
            info!(path = %settings.db.display(), "Starting fresh, clearing the database");
            db.clear()?;
        }

        let mut chains = Chains::default();
        for (chain_id, conf) in settings.enabled_chains() {
            let provider = conf.build_provider(chain_id).await?;
            info!(chain = %chain_id, chain_type = %conf.chain_type, start_height = conf.start_height, "Chain configured");
            chains.insert(Chain::new(chain_id.clone(), conf.start_height, provider));
        }
        if chains.is_empty() {
            return Err(eyre!("No enabled chains configured"));
        }

        std::fs::create_dir_all(&settings.socket_dir)?;
        let socket_path = settings.socket_dir.join(SOCKET_NAME);
        let config = RelayConfig::from(&settings);
        Ok(Self::new(&chains, db, config, metrics, socket_path)?)
    }

    async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(?err, "Failed to listen for the interrupt signal");
                return;
            }
            info!("Interrupt received");
            interrupt.cancel();
        });
        self.run_until(cancel).await
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use prometheus::Registry;
    use tokio::{sync::mpsc::unbounded_channel, time::timeout};
    use tracing_test::traced_test;

    use relay_base::db::{test_utils::run_test_db, DbError};
    use relay_core::{
        BlockInfo, ChainCommunicationError, ChainProvider, ChainResult, DeliveryOutcome,
        EventType, Message, MessageKey, Pagination, RouteCallback, RouteMessage, TxResponse,
    };
    use relay_mockchain::{MockChainConf, MockProvider, ScriptedMessage};
    use relay_test::mocks::MockChainProvider;

    use super::*;

    fn metrics() -> Arc<CoreMetrics> {
        Arc::new(CoreMetrics::new("relayer", None, Registry::new()).unwrap())
    }

    fn message(sn: u64, dst: &str) -> Message {
        Message {
            dst: dst.into(),
            src: "mock-1".into(),
            sn,
            data: b"hello".to_vec(),
            message_height: 15,
            event_type: EventType::EmitMessage,
            req_id: None,
        }
    }

    fn chain<P: ChainProvider + 'static>(id: &str, provider: Arc<P>) -> Chain {
        Chain::new(id.to_owned(), 10, provider)
    }

    fn willing_source() -> MockChainProvider {
        let mut src = MockChainProvider::new();
        src.expect__should_send_message().returning(|_| Ok(true));
        src
    }

    fn willing_destination(route: fn() -> ChainResult<TxResponse>) -> MockChainProvider {
        let mut dst = MockChainProvider::new();
        dst.expect__should_receive_message().returning(|_| Ok(true));
        dst.expect__message_received().returning(|_| Ok(false));
        dst.expect__finality_depth().return_const(0u64);
        dst.expect__route().returning(move |_| route());
        dst
    }

    async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<DeliveryOutcome>) -> DeliveryOutcome {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn relays_message_end_to_end() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(willing_source())),
                chain(
                    "mock-2",
                    Arc::new(willing_destination(|| Ok(TxResponse::success(20, "0xabc")))),
                ),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let src = context.runtime("mock-1").unwrap().clone();
            let dst = context.runtime("mock-2").unwrap().clone();

            context
                .process_block(&src, BlockInfo::new(15, vec![message(1, "mock-2")]))
                .await;
            assert_eq!(dst.cache_len().await, 1);
            assert_eq!(src.cache_len().await, 0);
            assert_eq!(context.block_store().last_stored_height("mock-1").unwrap(), 15);
            assert_eq!(src.state().await.last_persisted_height, 15);
            let key = MessageKey::new("mock-1".into(), 1);
            assert!(context.message_store().get_message(&key).is_ok());

            let (tx, mut rx) = unbounded_channel();
            context.dispatch_pass(&tx).await;
            let outcome = next_outcome(&mut rx).await;
            assert_eq!(outcome.key, key);
            assert!(dst.cached_message(&key).await.unwrap().processing);

            context.handle_outcome(outcome).await;
            assert_eq!(dst.cache_len().await, 0);
            assert!(matches!(
                context.message_store().get_message(&key),
                Err(DbError::NotFound(_))
            ));
            assert!(logs_contain("Message relayed successfully"));
        })
        .await;
    }

    #[tokio::test]
    async fn lower_block_does_not_rewind_persisted_height() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([chain("mock-1", Arc::new(MockChainProvider::new()))]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let src = context.runtime("mock-1").unwrap().clone();

            context.process_block(&src, BlockInfo::new(20, vec![])).await;
            context.process_block(&src, BlockInfo::new(18, vec![])).await;
            assert_eq!(context.block_store().last_stored_height("mock-1").unwrap(), 20);
            let state = src.state().await;
            assert_eq!(state.last_persisted_height, 20);
            assert_eq!(state.last_observed_height, 20);
        })
        .await;
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_delivery_backs_off_until_max_retries() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(willing_source())),
                chain(
                    "mock-2",
                    Arc::new(willing_destination(|| Ok(TxResponse::failure(20, "0xdead")))),
                ),
            ]);
            let config = RelayConfig {
                max_retries: 2,
                ..Default::default()
            };
            let context = RelayContext::new(&chains, db, config, metrics()).unwrap();
            let src = context.runtime("mock-1").unwrap().clone();
            let dst = context.runtime("mock-2").unwrap().clone();
            let key = MessageKey::new("mock-1".into(), 1);
            context
                .process_block(&src, BlockInfo::new(15, vec![message(1, "mock-2")]))
                .await;

            let (tx, mut rx) = unbounded_channel();
            context.dispatch_pass(&tx).await;
            context.handle_outcome(next_outcome(&mut rx).await).await;

            let cached = dst.cached_message(&key).await.unwrap();
            assert_eq!(cached.retry, 1);
            assert!(!cached.processing);
            assert!(cached.last_try.is_some());
            assert_eq!(context.message_store().get_message(&key).unwrap().retry, 1);

            // still backing off
            context.dispatch_pass(&tx).await;
            assert!(rx.try_recv().is_err());

            dst.state().await.cache.get_mut(&key).unwrap().last_try = None;
            context.dispatch_pass(&tx).await;
            context.handle_outcome(next_outcome(&mut rx).await).await;
            assert_eq!(dst.cache_len().await, 0);
            assert!(logs_contain("maximum number of retries"));

            let stored = context.message_store().get_message(&key).unwrap();
            assert_eq!(stored.retry, 2);
            context.flush_stored_messages().await;
            assert_eq!(dst.cache_len().await, 0);

            let replayed = context.relay_message("mock-1", 1, None).await.unwrap();
            assert_eq!(replayed.retry, 0);
            assert_eq!(dst.cache_len().await, 1);
            assert_eq!(context.message_store().get_message(&key).unwrap().retry, 0);
        })
        .await;
    }

    #[tokio::test]
    async fn dropped_callback_counts_as_failure() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(willing_source())),
                chain(
                    "mock-2",
                    Arc::new(willing_destination(|| Ok(TxResponse::success(20, "0xabc")))),
                ),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let src = context.runtime("mock-1").unwrap().clone();
            let dst = context.runtime("mock-2").unwrap().clone();
            let key = MessageKey::new("mock-1".into(), 1);
            context
                .process_block(&src, BlockInfo::new(15, vec![message(1, "mock-2")]))
                .await;
            dst.state().await.cache.get_mut(&key).unwrap().set_processing();

            let (tx, mut rx) = unbounded_channel();
            drop(RouteCallback::new(key.clone(), "mock-2".into(), tx));
            let outcome = next_outcome(&mut rx).await;
            assert!(matches!(
                outcome.result,
                Err(ChainCommunicationError::CallbackDropped(_))
            ));
            context.handle_outcome(outcome).await;

            let cached = dst.cached_message(&key).await.unwrap();
            assert_eq!(cached.retry, 1);
            assert!(!cached.processing);
        })
        .await;
    }

    #[tokio::test]
    async fn already_received_message_is_dropped() {
        run_test_db(|db| async move {
            let mut dst = MockChainProvider::new();
            dst.expect__should_receive_message().returning(|_| Ok(true));
            dst.expect__message_received().returning(|_| Ok(true));
            dst.expect__route().never();
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(willing_source())),
                chain("mock-2", Arc::new(dst)),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let src = context.runtime("mock-1").unwrap().clone();
            context
                .process_block(&src, BlockInfo::new(15, vec![message(1, "mock-2")]))
                .await;

            let (tx, mut rx) = unbounded_channel();
            context.dispatch_pass(&tx).await;
            assert!(rx.try_recv().is_err());
            assert_eq!(context.runtime("mock-2").unwrap().cache_len().await, 0);
            assert_eq!(context.message_store().total_count().unwrap(), 0);
        })
        .await;
    }

    #[tokio::test]
    async fn sequence_reuse_is_rejected() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(MockChainProvider::new())),
                chain("mock-2", Arc::new(MockChainProvider::new())),
                chain("mock-3", Arc::new(MockChainProvider::new())),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();

            context.accept_message(message(1, "mock-2")).await.unwrap();
            // same destination is a plain update
            context.accept_message(message(1, "mock-2")).await.unwrap();
            let err = context.accept_message(message(1, "mock-3")).await.unwrap_err();
            assert!(matches!(
                err,
                RelayerError::SequenceReuse { ref pending_dst, ref dst, .. } if pending_dst == "mock-2" && dst == "mock-3"
            ));
            assert_eq!(context.runtime("mock-3").unwrap().cache_len().await, 0);

            let err = context.accept_message(message(2, "mock-9")).await.unwrap_err();
            assert!(matches!(err, RelayerError::ChainNotConfigured(id) if id == "mock-9"));
            assert_eq!(context.message_store().total_count().unwrap(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn flush_reloads_stored_messages() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(MockChainProvider::new())),
                chain("mock-2", Arc::new(MockChainProvider::new())),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let dst = context.runtime("mock-2").unwrap().clone();

            for sn in 1..=12 {
                let mut stored = RouteMessage::new(message(sn, "mock-2"));
                stored.set_processing();
                context.message_store().store_message(&stored).unwrap();
            }
            let mut exhausted = RouteMessage::new(message(13, "mock-2"));
            exhausted.retry = context.config().max_retries;
            context.message_store().store_message(&exhausted).unwrap();

            context.flush_stored_messages().await;
            assert_eq!(dst.cache_len().await, MAX_FLUSH_MESSAGES);
            let state = dst.state().await;
            assert!(state.cache.iter().all(|m| !m.processing));
            assert!(state.cache.get(&MessageKey::new("mock-1".into(), 13)).is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn flush_keeps_cached_entries() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(MockChainProvider::new())),
                chain("mock-2", Arc::new(MockChainProvider::new())),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let dst = context.runtime("mock-2").unwrap().clone();
            let key = MessageKey::new("mock-1".into(), 1);

            context.accept_message(message(1, "mock-2")).await.unwrap();
            dst.state().await.cache.get_mut(&key).unwrap().set_processing();

            context.flush_stored_messages().await;
            assert!(dst.cached_message(&key).await.unwrap().processing);
        })
        .await;
    }

    #[tokio::test]
    async fn expired_messages_are_dropped() {
        run_test_db(|db| async move {
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(MockChainProvider::new())),
                chain("mock-2", Arc::new(MockChainProvider::new())),
            ]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let dst = context.runtime("mock-2").unwrap().clone();

            context.accept_message(message(1, "mock-2")).await.unwrap();
            context.accept_message(message(2, "mock-2")).await.unwrap();
            let mut stale = dst.cached_message(&MessageKey::new("mock-1".into(), 1)).await.unwrap();
            stale.last_try = Some(chrono::Utc::now() - chrono::Duration::hours(25));
            context.message_store().store_message(&stale).unwrap();

            context.clean_expired_messages().await;
            assert_eq!(dst.cache_len().await, 1);
            assert_eq!(context.message_store().total_count().unwrap(), 1);
            assert!(context
                .message_store()
                .get_message(&MessageKey::new("mock-1".into(), 2))
                .is_ok());
        })
        .await;
    }

    fn scripted_source() -> Arc<MockProvider> {
        Arc::new(MockProvider::new(
            "mock-1".into(),
            MockChainConf {
                block_duration_ms: 5,
                initial_height: 9,
                messages: vec![ScriptedMessage {
                    dst: "mock-2".into(),
                    sn: 1,
                    height: 15,
                    data: "hello".into(),
                }],
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_delivery_is_relayed_again_after_finality() {
        run_test_db(|db| async move {
            let src = scripted_source();
            let dst = Arc::new(MockProvider::new(
                "mock-2".into(),
                MockChainConf {
                    finality_block: 2,
                    ..Default::default()
                },
            ));
            let chains =
                Chains::from_iter([chain("mock-1", src.clone()), chain("mock-2", dst.clone())]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let key = MessageKey::new("mock-1".into(), 1);

            let relayed = context.relay_message("mock-1", 1, Some(15)).await.unwrap();
            assert_eq!(relayed.message.data, b"hello");
            let err = context.relay_message("mock-1", 7, Some(15)).await.unwrap_err();
            assert!(matches!(err, RelayerError::MessageNotFound { height: 15, .. }));

            dst.advance_head(20);
            let (tx, mut rx) = unbounded_channel();
            context.dispatch_pass(&tx).await;
            context.handle_outcome(next_outcome(&mut rx).await).await;
            assert_eq!(dst.delivered(), vec![key.clone()]);

            let tracked = context
                .finality_store()
                .get_tx_objects(Pagination::default().get_all())
                .unwrap();
            assert_eq!(tracked.len(), 1);
            assert_eq!(tracked[0].tx_height, 20);
            assert_eq!(tracked[0].message_height, 15);

            // not deep enough yet
            context.check_finality().await;
            assert!(context.finality_store().get_tx_object("mock-2", &key).is_ok());

            dst.advance_head(22);
            dst.revert_receipt(&tracked[0].tx_hash);
            context.check_finality().await;
            assert!(context.finality_store().get_tx_object("mock-2", &key).is_err());
            assert!(logs_contain("Delivery missing after finality"));
            let dst_runtime = context.runtime("mock-2").unwrap();
            assert_eq!(dst_runtime.cache_len().await, 1);
            assert!(context.message_store().get_message(&key).is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn final_delivery_is_forgotten() {
        run_test_db(|db| async move {
            let src = scripted_source();
            let dst = Arc::new(MockProvider::new(
                "mock-2".into(),
                MockChainConf {
                    finality_block: 2,
                    ..Default::default()
                },
            ));
            let chains = Chains::from_iter([chain("mock-1", src), chain("mock-2", dst.clone())]);
            let context = RelayContext::new(&chains, db, RelayConfig::default(), metrics()).unwrap();
            let key = MessageKey::new("mock-1".into(), 1);

            context.relay_message("mock-1", 1, Some(15)).await.unwrap();
            dst.advance_head(20);
            let (tx, mut rx) = unbounded_channel();
            context.dispatch_pass(&tx).await;
            context.handle_outcome(next_outcome(&mut rx).await).await;

            dst.advance_head(30);
            context.check_finality().await;
            assert!(context.finality_store().get_tx_object("mock-2", &key).is_err());
            assert_eq!(context.runtime("mock-2").unwrap().cache_len().await, 0);
        })
        .await;
    }

    #[tokio::test]
    #[traced_test]
    async fn run_until_relays_and_shuts_down() {
        run_test_db(|db| async move {
            let src = scripted_source();
            let dst = Arc::new(MockProvider::new(
                "mock-2".into(),
                MockChainConf {
                    initial_height: 9,
                    ..Default::default()
                },
            ));
            let chains = Chains::from_iter([chain("mock-1", src), chain("mock-2", dst.clone())]);
            let config = RelayConfig {
                route_interval: Duration::from_millis(10),
                ..Default::default()
            };
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join(SOCKET_NAME);
            let relayer = Relayer::new(&chains, db, config, metrics(), socket_path.clone()).unwrap();
            let context = relayer.context().clone();

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(relayer.run_until(cancel.clone()));

            let key = MessageKey::new("mock-1".into(), 1);
            timeout(Duration::from_secs(10), async {
                loop {
                    let gone = matches!(
                        context.message_store().get_message(&key),
                        Err(DbError::NotFound(_))
                    );
                    if dst.delivered().contains(&key) && gone {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
            assert!(socket_path.exists());
            assert!(context.block_store().last_stored_height("mock-1").unwrap() >= 15);

            cancel.cancel();
            timeout(Duration::from_secs(10), handle)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert!(!socket_path.exists());
            assert_eq!(dst.route_calls(), 1);
            assert!(logs_contain("All delivery outcomes processed"));
        })
        .await;
    }

    #[tokio::test]
    async fn listener_failure_stops_relayer() {
        run_test_db(|db| async move {
            let mut failing = MockChainProvider::new();
            failing
                .expect__listen()
                .returning(|_| Err(ChainCommunicationError::from_other_str("invalid start height")));
            let mut healthy = MockChainProvider::new();
            healthy.expect__listen().returning(|_| Ok(vec![]));
            let chains = Chains::from_iter([
                chain("mock-1", Arc::new(failing)),
                chain("mock-2", Arc::new(healthy)),
            ]);

            let dir = tempfile::tempdir().unwrap();
            let relayer = Relayer::new(
                &chains,
                db,
                RelayConfig::default(),
                metrics(),
                dir.path().join(SOCKET_NAME),
            )
            .unwrap();

            let err = timeout(Duration::from_secs(10), relayer.run_until(CancellationToken::new()))
                .await
                .unwrap()
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RelayerError>(),
                Some(RelayerError::Listener { chain, .. }) if chain == "mock-1"
            ));
        })
        .await;
    }

    #[tokio::test]
    #[traced_test]
    async fn listener_start_beyond_head_stops_relayer() {
        run_test_db(|db| async move {
            // head 0, listener asked to start at 10
            let behind = Arc::new(MockProvider::new("mock-1".into(), MockChainConf::default()));
            let healthy = Arc::new(MockProvider::new(
                "mock-2".into(),
                MockChainConf {
                    initial_height: 9,
                    ..Default::default()
                },
            ));
            let chains = Chains::from_iter([chain("mock-1", behind), chain("mock-2", healthy)]);

            let dir = tempfile::tempdir().unwrap();
            let relayer = Relayer::new(
                &chains,
                db,
                RelayConfig::default(),
                metrics(),
                dir.path().join(SOCKET_NAME),
            )
            .unwrap();

            let err = timeout(Duration::from_secs(10), relayer.run_until(CancellationToken::new()))
                .await
                .unwrap()
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RelayerError>(),
                Some(RelayerError::Listener {
                    chain,
                    source: ChainCommunicationError::InvalidStartHeight { start: 10, latest: 0 },
                }) if chain == "mock-1"
            ));
            assert!(logs_contain("Listener failed, stopping relayer"));
        })
        .await;
    }
}
