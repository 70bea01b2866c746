use crate::constants;
use alloy_primitives::{Address, B256};
use mel_runner::MelArgs;

/// The arguments of the message extraction node.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "mel", about = "Extracts the messages of a rollup from its parent chain")]
pub struct MelNodeArgs {
    /// The parent chain rpc url.
    #[arg(long = "l1.rpc-url", env = "MEL_L1_RPC_URL")]
    pub l1_rpc_url: reqwest::Url,
    /// The beacon node url serving blob sidecars.
    #[arg(long = "beacon.rpc-url", env = "MEL_BEACON_RPC_URL")]
    pub beacon_rpc_url: reqwest::Url,
    /// The database url.
    #[arg(
        long = "db.url",
        env = "MEL_DATABASE_URL",
        default_value = constants::DEFAULT_DATABASE_URL
    )]
    pub database_url: String,
    /// The number of parent chain blocks kept in the header and log caches.
    #[arg(long = "l1.cache-size", default_value_t = constants::DEFAULT_BLOCK_CACHE_SIZE)]
    pub cache_size: usize,
    /// The chain id of the parent chain.
    #[arg(long = "l1.chain-id", env = "MEL_L1_CHAIN_ID")]
    pub chain_id: u64,
    /// The address of the sequencer inbox contract.
    #[arg(long = "contracts.sequencer-inbox", env = "MEL_SEQUENCER_INBOX")]
    pub sequencer_inbox: Address,
    /// The address of the bridge contract.
    #[arg(long = "contracts.bridge", env = "MEL_BRIDGE")]
    pub bridge: Address,
    /// The parent chain block the rollup was deployed at.
    #[arg(long = "genesis.block-number", env = "MEL_GENESIS_BLOCK_NUMBER")]
    pub genesis_block_number: u64,
    /// The hash of the genesis block, fetched from the parent chain when omitted.
    #[arg(long = "genesis.block-hash", env = "MEL_GENESIS_BLOCK_HASH")]
    pub genesis_block_hash: Option<B256>,
    /// The extraction runner arguments.
    #[command(flatten)]
    pub mel: MelArgs,
}
