//! The entry points a UI's native-module layer calls.
//!
//! One client lives in a process-wide slot; the `init_*` functions fill it and the
//! `execute_*` functions run commands against it. Every function answers with a
//! string: `OK`, JSON, or a line starting with `Error`.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use lazy_static::lazy_static;
use log::{error, info};

use crate::{
    chain::ChainSource,
    commands::{self, RT},
    config::WalletConfig,
    error::WalletError,
    lightclient::LightClient,
    wallet::WalletBase,
};

lazy_static! {
    static ref LIGHTCLIENT: Mutex<Option<Arc<LightClient>>> = Mutex::new(None);
}

fn slot() -> MutexGuard<'static, Option<Arc<LightClient>>> {
    LIGHTCLIENT.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_client(lightclient: LightClient) {
    slot().replace(Arc::new(lightclient));
}

fn current_client() -> Result<Arc<LightClient>, WalletError> {
    slot().clone().ok_or(WalletError::NotInitialized)
}

fn respond(result: Result<String, WalletError>) -> String {
    result.unwrap_or_else(|e| {
        error!("{e}");
        format!("Error: {e}")
    })
}

/// Whether `config` points at an existing wallet file.
pub fn wallet_exists(config: &WalletConfig) -> bool {
    config.wallet_exists()
}

/// Creates a wallet from fresh entropy with its birthday 100 blocks below the chain tip,
/// and answers with its seed phrase.
pub fn init_new(config: WalletConfig, chain: Arc<dyn ChainSource>) -> String {
    respond(RT.block_on(async move {
        LightClient::init_logging(&config)?;
        let latest = chain.get_latest_block().await?.height;
        let birthday = latest
            .saturating_sub(100)
            .max(config.sapling_activation_height());
        let lightclient = LightClient::new_from_wallet_base_async(
            WalletBase::FreshEntropy,
            &config,
            chain,
            birthday,
            false,
        )
        .await?;
        let seed = lightclient.do_seed_phrase().await?;
        info!("Created a new wallet with birthday {birthday}");
        lock_client(lightclient);
        Ok::<_, WalletError>(seed.pretty(2))
    }))
}

fn init_from_base(
    config: WalletConfig,
    chain: Arc<dyn ChainSource>,
    base: WalletBase,
    birthday: u64,
    overwrite: bool,
) -> String {
    respond(RT.block_on(async move {
        LightClient::init_logging(&config)?;
        let lightclient =
            LightClient::new_from_wallet_base_async(base, &config, chain, birthday, overwrite)
                .await?;
        lock_client(lightclient);
        Ok::<_, WalletError>("OK".to_string())
    }))
}

/// Restores a wallet from its seed phrase.
pub fn init_from_seed(
    config: WalletConfig,
    chain: Arc<dyn ChainSource>,
    seed: String,
    birthday: u64,
    overwrite: bool,
) -> String {
    init_from_base(config, chain, WalletBase::MnemonicPhrase(seed), birthday, overwrite)
}

/// Creates a view-only wallet from a unified full viewing key.
pub fn init_from_ufvk(
    config: WalletConfig,
    chain: Arc<dyn ChainSource>,
    ufvk: String,
    birthday: u64,
    overwrite: bool,
) -> String {
    init_from_base(config, chain, WalletBase::Ufvk(ufvk), birthday, overwrite)
}

/// Loads the wallet file `config` points at.
pub fn init_from_wallet_file(config: WalletConfig, chain: Arc<dyn ChainSource>) -> String {
    respond(RT.block_on(async move {
        LightClient::init_logging(&config)?;
        let lightclient = LightClient::read_wallet_from_disk(&config, chain).await?;
        lock_client(lightclient);
        Ok::<_, WalletError>("OK".to_string())
    }))
}

/// Drops the client. Background work it started keeps its own handle and finishes.
pub fn deinitialize() -> String {
    slot().take();
    "OK".to_string()
}

/// An empty `args` string passes no arguments, anything else is passed as the single
/// argument (a JSON array for `send`, `name=value` for `setoption`).
fn split_args(args: &str) -> Vec<&str> {
    if args.is_empty() {
        vec![]
    } else {
        vec![args]
    }
}

/// Runs a command and answers with its result. Blocks the calling thread until the
/// command is done, so a UI calls it from a worker.
pub fn execute_async(cmd: &str, args: &str) -> String {
    respond(current_client().map(|lightclient| {
        commands::do_user_command(cmd, &split_args(args), &lightclient)
    }))
}

/// Starts a command on its own thread and answers `OK` right away.
pub fn execute_spawn(cmd: String, args: String) -> String {
    respond(current_client().map(|lightclient| {
        thread::spawn(move || {
            let response = commands::do_user_command(&cmd, &split_args(&args), &lightclient);
            info!("{cmd} finished: {response}");
        });
        "OK".to_string()
    }))
}
