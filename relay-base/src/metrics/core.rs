use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use prometheus::{
    labels, opts, register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    Encoder, IntCounterVec, IntGaugeVec, Registry,
};

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", super::NAMESPACE, $name)
    };
}

/// Metrics of the relay
pub struct CoreMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    listen_port: Option<u16>,
    agent_name: String,

    last_known_height: IntGaugeVec,
    messages_processed_count: IntCounterVec,
    delivery_failures: IntCounterVec,
    message_cache_size: IntGaugeVec,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    ///
    /// - `for_agent` name of the agent these metrics are tracking.
    /// - `listen_port` port to start the HTTP server on, if any.
    /// - `registry` prometheus registry to attach the metrics to
    pub fn new(
        for_agent: &str,
        listen_port: Option<u16>,
        registry: Registry,
    ) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("baselib_version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let last_known_height = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("last_known_height"),
                "Last block height observed or persisted by the relay",
                const_labels_ref
            ),
            &["chain", "phase"],
            registry
        )?;

        let messages_processed_count = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("messages_processed_count"),
                "Number of messages delivered successfully",
                const_labels_ref
            ),
            &["origin", "remote"],
            registry
        )?;

        let delivery_failures = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("delivery_failures"),
                "Number of failed delivery attempts",
                const_labels_ref
            ),
            &["origin", "remote"],
            registry
        )?;

        let message_cache_size = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("message_cache_size"),
                "Number of messages waiting in a chain's message cache",
                const_labels_ref
            ),
            &["chain"],
            registry
        )?;

        Ok(Self {
            registry,
            listen_port,
            agent_name: for_agent.into(),
            last_known_height,
            messages_processed_count,
            delivery_failures,
            message_cache_size,
        })
    }

    /// Last observed/persisted height.
    ///
    /// Labels:
    /// - `chain`: chain id.
    /// - `phase`: `observed` or `persisted`.
    pub fn last_known_height(&self) -> IntGaugeVec {
        self.last_known_height.clone()
    }

    /// Successful deliveries.
    ///
    /// Labels:
    /// - `origin`: source chain.
    /// - `remote`: destination chain.
    pub fn messages_processed_count(&self) -> IntCounterVec {
        self.messages_processed_count.clone()
    }

    /// Failed delivery attempts, same labels as
    /// [`CoreMetrics::messages_processed_count`].
    pub fn delivery_failures(&self) -> IntCounterVec {
        self.delivery_failures.clone()
    }

    /// Size of each destination chain's message cache
    pub fn message_cache_size(&self) -> IntGaugeVec {
        self.message_cache_size.clone()
    }

    /// Port the metrics server listens on, if any
    pub fn listen_port(&self) -> Option<u16> {
        self.listen_port
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format)
    /// report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    /// Get the name of this agent, e.g. "relayer"
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CoreMetrics {{ agent_name: {}, listen_port: {:?} }}",
            self.agent_name, self.listen_port
        )
    }
}
