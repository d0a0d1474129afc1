mod provider;

pub use provider::MockChainProvider;
