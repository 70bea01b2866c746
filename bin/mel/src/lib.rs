//! The message extraction node.
//!
//! Wires the extraction runner to an rpc parent chain, a beacon node and a sql database, and
//! logs the messages it extracts.

mod args;
pub use args::MelNodeArgs;

pub mod constants;

use alloy_provider::ProviderBuilder;
use eyre::OptionExt;
use mel_db::{MelDatabase, SqlKeyValueStore};
use mel_l1::EventSchema;
use mel_migration::{Migrator, MigratorTrait};
use mel_primitives::MelState;
use mel_providers::{BeaconClientProvider, LiveDataSource, ParentChainClient, RpcParentChain};
use mel_runner::{initialize_state, ChannelConsumer, MelRunner};

/// Launches the node and runs it until the process receives a ctrl-c.
pub async fn launch(args: MelNodeArgs) -> eyre::Result<()> {
    let config = args.mel.clone().into_config()?;
    if !config.enable {
        tracing::info!(target: "mel::node", "message extraction is disabled");
        return Ok(())
    }

    // Instantiate the database and run the migrations.
    let store = SqlKeyValueStore::new(&args.database_url).await?;
    Migrator::up(store.connection(), None).await?;
    let db = MelDatabase::new(store);

    let client = RpcParentChain::new(ProviderBuilder::new().connect_http(args.l1_rpc_url.clone()));
    let genesis_hash = match args.genesis_block_hash {
        Some(hash) => hash,
        None => client
            .header_by_number(args.genesis_block_number.into())
            .await?
            .ok_or_eyre("genesis block not found on the parent chain")?
            .hash(),
    };
    let genesis = MelState::genesis(
        args.chain_id,
        args.genesis_block_number,
        genesis_hash,
        args.sequencer_inbox,
        args.bridge,
    );
    let head = initialize_state(&db, &genesis).await?;
    tracing::info!(
        target: "mel::node",
        block = head.parent_chain_block_number,
        msg_count = head.msg_count,
        delayed_messages_seen = head.delayed_messages_seen,
        "loaded mel head state"
    );

    let schema = EventSchema::new()?;
    let source = LiveDataSource::new(client, &schema, args.cache_size);
    let blobs = BeaconClientProvider::new_http(args.beacon_rpc_url.clone()).await?;
    let (consumer, mut messages) = ChannelConsumer::new();

    let handle = MelRunner::new(config, schema, db, source, blobs, consumer).spawn();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            batch = messages.recv() => {
                let Some(batch) = batch else { break };
                tracing::info!(
                    target: "mel::node",
                    first_index = batch.first_index,
                    count = batch.messages.len(),
                    "extracted messages"
                );
            }
            _ = &mut shutdown => {
                tracing::info!(target: "mel::node", "received shutdown signal");
                break
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
