//! `dht-node`: a runnable daemon wiring `dht-core`'s protocol machinery to
//! concrete collaborators — TCP transport, a tokio-backed scheduler, and
//! Ed25519/BLAKE3 signing — the way SPEC_FULL §10.5 describes. No
//! subcommand framework: like the teacher's daemon entrypoints, this takes
//! at most one positional argument, an optional config file path.

mod bootstrap;
mod config;
mod node;
mod scheduler;
mod transport;

use std::path::Path;
use std::sync::Arc;

use dht_crypto::collab::{derive_node_id, Blake3Hasher, Ed25519Signer, Ed25519Verifier};
use dht_crypto::ed25519::KeyPair;
use tracing_subscriber::EnvFilter;

use crate::config::DhtNodeConfig;
use crate::node::Node;
use crate::scheduler::TokioScheduler;
use crate::transport::TcpTransport;

const IDENTITY_FILE_NAME: &str = "identity.key";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "dht-node.toml".into());
    let config = DhtNodeConfig::load(Path::new(&config_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.logging.level.clone()))
        .init();

    let data_dir = DhtNodeConfig::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let keypair = load_or_generate_keypair(&data_dir.join(IDENTITY_FILE_NAME))?;
    let local_id = derive_node_id(&keypair.verifying_key);

    tracing::info!(%local_id, listen_address = %config.network.listen_address, "starting dht-node");

    let signer = Ed25519Signer::new(keypair);
    let node = Node::new(
        local_id,
        env!("CARGO_PKG_VERSION").to_string(),
        Box::new(TcpTransport),
        Box::new(TokioScheduler),
        Box::new(signer),
        Box::new(Ed25519Verifier),
        Box::new(Blake3Hasher),
        config.network.clone(),
        config.storage.clone(),
    );

    let listener_node = node.clone();
    let listen_address = config.network.listen_address.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(err) = listener_node.run_listener(&listen_address).await {
            tracing::error!(%err, "listener exited");
        }
    });

    if !config.network.bootstrap_seeds.is_empty() {
        let result = bootstrap::bootstrap(&node, &config.network.bootstrap_seeds).await;
        tracing::info!(
            responsive = result.responsive_seeds,
            total = result.total_seeds,
            "bootstrap finished"
        );
    }

    tokio::select! {
        _ = listener_handle => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down on ctrl-c");
        }
    }

    Ok(())
}

fn load_or_generate_keypair(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let hex_bytes = std::fs::read_to_string(path)?;
        let bytes = hex::decode(hex_bytes.trim())?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("identity file is not a 32-byte key"))?;
        Ok(KeyPair::from_bytes(&secret))
    } else {
        let keypair = KeyPair::generate();
        std::fs::write(path, hex::encode(keypair.signing_key.to_bytes()))?;
        tracing::info!(path = %path.display(), "generated new node identity");
        Ok(keypair)
    }
}
