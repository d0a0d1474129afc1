//! The relayer watches every configured chain for cross-chain messages and
//! delivers each of them on its destination chain, retrying failed
//! deliveries.
//!
//! Operators inspect and steer the pending work through a local control
//! socket.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use eyre::Result;

use relay_base::agent_main;

use relayer::Relayer;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // Logging is not initialised at this point, so, using `println!`
    println!("Relayer starting up...");

    agent_main::<Relayer>().await
}
