//! An interface that passes strings (e.g. from a UI bridge) into walletcore.
//!
//! Every command is a variant of [`Command`]; a command string parses into one and
//! [`Command::exec`] runs it, returning JSON text or an `Error: ...` line.

use std::{str::FromStr, sync::Arc};

use indoc::indoc;
use json::{object, JsonValue};
use lazy_static::lazy_static;
use tokio::runtime::Runtime;

use crate::{
    error::WalletError,
    lightclient::LightClient,
    wallet::{
        address::{network_name, parse_address, AddressKind},
        propose::{ShieldSource, DEFAULT_FEE},
    },
};

pub use self::error::CommandError;

/// Errors associated with the commands interface
mod error;
/// Utilities associated with the commands interface
mod utils;

lazy_static! {
    pub(crate) static ref RT: Runtime = tokio::runtime::Runtime::new().unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Version,
    Info,
    Height,
    UpdateCurrentPrice,
    SyncStatus,
    Sync,
    Rescan,
    InterruptSyncAfterBatch,
    Balance,
    Addresses,
    Notes,
    Send,
    Confirm,
    Abandon,
    SendProgress,
    Shield,
    ParseAddress,
    Export,
    NewAddress,
    Seed,
    ExportUfvk,
    WalletKind,
    Encrypt,
    Decrypt,
    Lock,
    Unlock,
    GetOption,
    SetOption,
    ValueTransfers,
    ValueToAddress,
    SendsToAddress,
    MemoBytesToAddress,
    DefaultFee,
    Birthday,
    Clear,
    Save,
    Help,
}

impl Command {
    pub const ALL: [Command; 37] = [
        Command::Version,
        Command::Info,
        Command::Height,
        Command::UpdateCurrentPrice,
        Command::SyncStatus,
        Command::Sync,
        Command::Rescan,
        Command::InterruptSyncAfterBatch,
        Command::Balance,
        Command::Addresses,
        Command::Notes,
        Command::Send,
        Command::Confirm,
        Command::Abandon,
        Command::SendProgress,
        Command::Shield,
        Command::ParseAddress,
        Command::Export,
        Command::NewAddress,
        Command::Seed,
        Command::ExportUfvk,
        Command::WalletKind,
        Command::Encrypt,
        Command::Decrypt,
        Command::Lock,
        Command::Unlock,
        Command::GetOption,
        Command::SetOption,
        Command::ValueTransfers,
        Command::ValueToAddress,
        Command::SendsToAddress,
        Command::MemoBytesToAddress,
        Command::DefaultFee,
        Command::Birthday,
        Command::Clear,
        Command::Save,
        Command::Help,
    ];

    /// The string that invokes the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Info => "info",
            Command::Height => "height",
            Command::UpdateCurrentPrice => "updatecurrentprice",
            Command::SyncStatus => "syncstatus",
            Command::Sync => "sync",
            Command::Rescan => "rescan",
            Command::InterruptSyncAfterBatch => "interrupt_sync_after_batch",
            Command::Balance => "balance",
            Command::Addresses => "addresses",
            Command::Notes => "notes",
            Command::Send => "send",
            Command::Confirm => "confirm",
            Command::Abandon => "abandon",
            Command::SendProgress => "sendprogress",
            Command::Shield => "shield",
            Command::ParseAddress => "parse_address",
            Command::Export => "export",
            Command::NewAddress => "new",
            Command::Seed => "seed",
            Command::ExportUfvk => "exportufvk",
            Command::WalletKind => "wallet_kind",
            Command::Encrypt => "encrypt",
            Command::Decrypt => "decrypt",
            Command::Lock => "lock",
            Command::Unlock => "unlock",
            Command::GetOption => "getoption",
            Command::SetOption => "setoption",
            Command::ValueTransfers => "valuetransfers",
            Command::ValueToAddress => "value_to_address",
            Command::SendsToAddress => "sends_to_address",
            Command::MemoBytesToAddress => "memobytes_to_address",
            Command::DefaultFee => "defaultfee",
            Command::Birthday => "birthday",
            Command::Clear => "clear",
            Command::Save => "save",
            Command::Help => "help",
        }
    }

    pub fn short_help(&self) -> &'static str {
        match self {
            Command::Version => "Get version of build code",
            Command::Info => "Get the lightwalletd server's info",
            Command::Height => "Get the latest block height that the wallet is at",
            Command::UpdateCurrentPrice => "Get the latest ZEC price in USD from the server",
            Command::SyncStatus => "Get the sync status of the wallet",
            Command::Sync => "Download CompactBlocks and sync to the server",
            Command::Rescan => "Rescan the wallet, downloading and scanning all blocks and transactions",
            Command::InterruptSyncAfterBatch => "Toggle the sync interrupt after batch flag.",
            Command::Balance => "Show the current ZEC balance in the wallet",
            Command::Addresses => "List current addresses in the wallet",
            Command::Notes => "Lists all sapling/orchard notes and transparent coins in the wallet",
            Command::Send => "Propose a transfer of ZEC to the given address(es) and display a proposal for confirmation.",
            Command::Confirm => "Confirms the latest proposal, completing and broadcasting the transaction.",
            Command::Abandon => "Abandon a proposal, releasing the notes it holds.",
            Command::SendProgress => "Get the progress of any send transactions that are currently computing",
            Command::Shield => "Propose a shield of transparent or sapling funds to the orchard pool and display a proposal for confirmation.",
            Command::ParseAddress => "Parse an address",
            Command::Export => "Export private key for wallet addresses",
            Command::NewAddress => "Create a new address in this wallet",
            Command::Seed => "Display the seed phrase",
            Command::ExportUfvk => "Export full viewing key for wallet addresses",
            Command::WalletKind => "Displays the kind of wallet currently loaded",
            Command::Encrypt => "Encrypt the wallet with a password",
            Command::Decrypt => "Completely remove wallet encryption",
            Command::Lock => "Lock a wallet that's been temporarily unlocked",
            Command::Unlock => "Unlock wallet encryption for spending",
            Command::GetOption => "Get a wallet option",
            Command::SetOption => "Set a wallet option",
            Command::ValueTransfers => "List all value transfers for this wallet.",
            Command::ValueToAddress => "Show total value sent to each address",
            Command::SendsToAddress => "Show number of sends to each address",
            Command::MemoBytesToAddress => "Show by address memo_bytes transfers to address",
            Command::DefaultFee => "Returns the minimum fee in zats for outbound transactions",
            Command::Birthday => "Get wallet birthday.",
            Command::Clear => "Clear the wallet state, rolling back the wallet to an empty state.",
            Command::Save => "Save wallet file to disk",
            Command::Help => "Lists all available commands",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Command::Version => indoc! {r#"
                Return the git describe --dirty of the repo at build time.
            "#},
            Command::Info => indoc! {r#"
                Get info about the lightwalletd we're connected to
                Usage:
                info

            "#},
            Command::Height => indoc! {r#"
                Get the latest block height that the wallet is at.
                Usage:
                height

            "#},
            Command::UpdateCurrentPrice => indoc! {r#"
                Get the latest ZEC price in USD from the server and record it in the wallet.
                Transactions the wallet sees within a day of the update are tagged with it.
                Answers with the bare price.
                Usage:
                updatecurrentprice

            "#},
            Command::SyncStatus => indoc! {r#"
                Get the sync status of the wallet
                Usage:
                syncstatus

            "#},
            Command::Sync => indoc! {r#"
                Sync the light client with the server in the background.
                Returns the id of the sync. If a sync is already running, its id is returned
                and no new sync is started. Poll 'syncstatus' for progress.
                Usage:
                sync

            "#},
            Command::Rescan => indoc! {r#"
                Rescan the wallet, rescanning all blocks for new transactions
                Usage:
                rescan

                This command will download all blocks since the initial block again from the light client server
                and attempt to scan each block for transactions belonging to the wallet.
                If a sync is already running no rescan is started and the running sync's id is
                returned. Wait for 'syncstatus' to show it finished, then run rescan again.
            "#},
            Command::InterruptSyncAfterBatch => indoc! {r#"
                Toggle the sync interrupt after batch flag.
                Usage:
                interrupt_sync_after_batch true|false

            "#},
            Command::Balance => indoc! {r#"
                Show the current ZEC balance in the wallet
                Usage:
                balance

                Transparent and Shielded balances, along with the addresses they belong to are displayed
            "#},
            Command::Addresses => indoc! {r#"
                List current addresses in the wallet
                Usage:
                addresses

            "#},
            Command::Notes => indoc! {r#"
                Show all sapling/orchard notes and transparent coins in this wallet
                Usage:
                notes [all]

                If you supply the "all" parameter, all previously spent sapling/orchard notes and transparent coins are also included
            "#},
            Command::Send => indoc! {r#"
                Propose a transfer of ZEC to the given address(es).
                The fee required to send this transaction will be added to the proposal and displayed to the user.
                The 'confirm' command must be called to complete and broadcast the proposed transaction.
                A memo longer than 512 bytes is split over several outputs, each prefixed with (i/n).

                Usage:
                    send <address> <amount in zatoshis> "<optional memo>"
                    OR
                    send '[{"address":"<address>", "amount":<amount in zatoshis>, "memo":"<optional memo>"}, ...]'
                Example:
                    send tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd 200000
                    confirm

            "#},
            Command::Confirm => indoc! {r#"
                Confirms a proposal, completing and broadcasting the transaction.
                Without a proposal id the latest proposal made by 'send' or 'shield' is confirmed.
                Fails if no such proposal is outstanding.

                Usage:
                    confirm [proposal_id]
                Example:
                    send tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd 200000
                    confirm

            "#},
            Command::Abandon => indoc! {r#"
                Abandon a proposal so its notes can be spent by another one.
                Without a proposal id the latest proposal made by 'send' or 'shield' is abandoned.

                Usage:
                    abandon [proposal_id]

            "#},
            Command::SendProgress => indoc! {r#"
                Get the progress of any send transactions that are currently computing
                Usage:
                sendprogress
            "#},
            Command::Shield => indoc! {r#"
                Propose a shield of transparent and/or sapling funds to the orchard pool.
                The fee required to send this transaction will be added to the proposal and displayed to the user.
                The 'confirm' command must be called to complete and broadcast the proposed shield.

                Usage:
                    shield [all|transparent|sapling]
                Example:
                    shield transparent
                    confirm

            "#},
            Command::ParseAddress => indoc! {r#"
                Parse an address
                Usage:
                parse_address [address]

                Example
                parse_address tmSwk8bjXdCgBvpS8Kybk5nUyE21QFcDqre
            "#},
            Command::Export => indoc! {r#"
                Export the private key for an individual wallet address, or all of them.
                Usage:
                export [address]

                Note: The wallet must be unlocked.
            "#},
            Command::NewAddress => indoc! {r#"
                Create a new address in this wallet
                Usage:
                new [o|z|t combination]

                Example:
                To create a new unified address with orchard and transparent receivers:
                new ot
            "#},
            Command::Seed => indoc! {r#"
                Show the wallet's seed phrase
                Usage:
                seed

                Your wallet is entirely recoverable from the seed phrase. Please save it carefully and don't share it with anyone
            "#},
            Command::ExportUfvk => indoc! {r#"
                Export Unified full viewing key for the wallet.
                Note: If you want to use this ufvk to reconstruct a watch-only wallet, you will need to keep the birthday with it.
                Usage:
                exportufvk

            "#},
            Command::WalletKind => indoc! {r#"
                Displays the kind of wallet currently loaded
                A seeded wallet also reports whether it is encrypted and unlocked.
                Usage:
                wallet_kind

            "#},
            Command::Encrypt => indoc! {r#"
                Encrypt the wallet with a password
                Note 1: This will encrypt the seed and the sapling and transparent private keys.
                        Use 'unlock' to temporarily unlock the wallet for spending or 'decrypt'
                        to permanently remove the encryption
                Note 2: If you forget the password, the only way to recover the wallet is to restore
                        from the seed phrase.
                Usage:
                encrypt password

            "#},
            Command::Decrypt => indoc! {r#"
                Completely remove wallet encryption, storing the wallet in plaintext on disk
                Note 1: This will decrypt the seed and the sapling and transparent private keys and store them on disk.
                        Use 'unlock' to temporarily unlock the wallet for spending
                Usage:
                decrypt password

            "#},
            Command::Lock => indoc! {r#"
                Lock a wallet that's been temporarily unlocked. You should already have encryption enabled.
                Note 1: This will remove all spending keys from memory. The wallet remains encrypted on disk
                Note 2: If you've forgotten the password, the only way to recover the wallet is to restore
                        from the seed phrase.
                Usage:
                lock

            "#},
            Command::Unlock => indoc! {r#"
                Unlock the wallet's encryption in memory, allowing spending from this wallet.
                Note 1: This will decrypt spending keys in memory only. The wallet remains encrypted on disk.
                        Use 'decrypt' to remove the encryption permanently.
                Usage:
                unlock password

            "#},
            Command::GetOption => indoc! {r#"
                Get a wallet option
                Usage:
                getoption <optionname>

                Options:
                download_memos - none|wallet|all
                transaction_filter_threshold - number of outputs above which a transaction is skipped, -1 for no limit
            "#},
            Command::SetOption => indoc! {r#"
                Set a wallet option
                Usage:
                setoption <optionname>=<optionvalue>

                Options:
                download_memos - none|wallet|all
                transaction_filter_threshold - number of outputs above which a transaction is skipped, -1 for no limit
            "#},
            Command::ValueTransfers => indoc! {r#"
                List all value transfers for this wallet.
                A value transfer is a group of all notes to a specific receiver in a transaction.

                Usage:
                valuetransfers
            "#},
            Command::ValueToAddress => indoc! {r#"
                Show total value sent to each address
                Usage:
                value_to_address

            "#},
            Command::SendsToAddress => indoc! {r#"
                Show number of sends to each address
                Usage:
                sends_to_address

            "#},
            Command::MemoBytesToAddress => indoc! {r#"
                Show by address memo_bytes transfers to address
                Usage:
                memobytes_to_address

            "#},
            Command::DefaultFee => indoc! {r#"
                Returns the minimum fee in zats for outbound transactions.
                Usage:
                defaultfee
            "#},
            Command::Birthday => indoc! {r#"
                Report the height the wallet was created at. Rescans start from here.
                Usage:
                birthday

            "#},
            Command::Clear => indoc! {r#"
                Clear the wallet state, rolling back the wallet to an empty state.
                Usage:
                clear

                This command will clear all notes, utxos and transactions from the wallet, setting up the wallet to be synced from scratch.
            "#},
            Command::Save => indoc! {r#"
                Save the wallet to disk
                Usage:
                save

            "#},
            Command::Help => indoc! {r#"
                List all available commands
                Usage:
                help [command_name]

                If no "command_name" is specified, a list of all available commands is returned
                Example:
                help send

            "#},
        }
    }

    /// Runs the command. Never panics on bad input: argument errors come back as an
    /// `Error: ...` line and failures as `{"error": ...}` JSON.
    pub fn exec(&self, args: &[&str], lightclient: &Arc<LightClient>) -> String {
        match self {
            Command::Version => crate::git_description().to_string(),
            Command::Info => RT.block_on(async move { lightclient.do_info().await.pretty(2) }),
            Command::Height => RT.block_on(async move { lightclient.do_height().await.pretty(2) }),
            Command::UpdateCurrentPrice => RT.block_on(async move {
                match lightclient.do_update_price().await {
                    Ok(price) => price.to_string(),
                    Err(e) => format!("Error: {e}"),
                }
            }),
            Command::SyncStatus => RT.block_on(async move {
                let interrupt = lightclient.get_sync_interrupt().await;
                lightclient.do_sync_status().to_json(interrupt).pretty(2)
            }),
            Command::Sync => RT.block_on(async move {
                object! { "sync_id" => lightclient.start_sync() }.pretty(2)
            }),
            Command::Rescan => RT.block_on(async move {
                object! { "sync_id" => lightclient.start_rescan() }.pretty(2)
            }),
            Command::InterruptSyncAfterBatch => self.exec_interrupt(args, lightclient),
            Command::Balance => {
                RT.block_on(async move { lightclient.do_balance().await.to_json().pretty(2) })
            }
            Command::Addresses => {
                RT.block_on(async move { lightclient.do_addresses().await.pretty(2) })
            }
            Command::Notes => self.exec_notes(args, lightclient),
            Command::Send => self.exec_send(args, lightclient),
            Command::Confirm => self.exec_confirm(args, lightclient),
            Command::Abandon => self.exec_abandon(args, lightclient),
            Command::SendProgress => {
                RT.block_on(async move { lightclient.do_send_progress().await.pretty(2) })
            }
            Command::Shield => self.exec_shield(args, lightclient),
            Command::ParseAddress => match args {
                [address] => parse_address_json(address).pretty(4),
                _ => self.help().to_string(),
            },
            Command::Export => match args {
                [] | [_] => RT.block_on(async move {
                    match lightclient.do_export(args.first().copied()).await {
                        Ok(keys) => keys.pretty(2),
                        Err(e) => object! { "error" => e }.pretty(2),
                    }
                }),
                _ => self.help().to_string(),
            },
            Command::NewAddress => match args {
                [receivers] => RT.block_on(async move {
                    match lightclient.do_new_address(receivers).await {
                        Ok(addresses) => addresses.pretty(2),
                        Err(e) => object! { "error" => e }.pretty(2),
                    }
                }),
                _ => self.help().to_string(),
            },
            Command::Seed => RT.block_on(async move {
                match lightclient.do_seed_phrase().await {
                    Ok(seed) => seed.pretty(2),
                    Err(e) => WalletError::from(e).to_json().pretty(2),
                }
            }),
            Command::ExportUfvk => RT.block_on(async move {
                match lightclient.do_ufvk().await {
                    Ok(ufvk) => ufvk.pretty(2),
                    Err(e) => WalletError::from(e).to_json().pretty(2),
                }
            }),
            Command::WalletKind => {
                RT.block_on(async move { lightclient.do_wallet_kind().await.pretty(4) })
            }
            Command::Encrypt | Command::Decrypt | Command::Unlock => {
                let [password] = args else {
                    return self.help().to_string();
                };
                RT.block_on(async move {
                    let result = match self {
                        Command::Encrypt => lightclient.do_encrypt(password).await,
                        Command::Decrypt => lightclient.do_decrypt(password).await,
                        _ => lightclient.do_unlock(password).await,
                    };
                    result_json(result.map_err(|e| e.to_string())).pretty(2)
                })
            }
            Command::Lock => match args {
                [] => RT.block_on(async move {
                    result_json(lightclient.do_lock().await.map_err(|e| e.to_string())).pretty(2)
                }),
                _ => self.help().to_string(),
            },
            Command::GetOption => match args {
                [name] => RT.block_on(async move {
                    match lightclient.get_option(name).await {
                        Ok(value) => value.pretty(2),
                        Err(e) => e,
                    }
                }),
                _ => self.help().to_string(),
            },
            Command::SetOption => match utils::parse_option_args(args) {
                Ok(option) => RT.block_on(async move {
                    lightclient.set_option(option).await;
                    match lightclient.get_option(option.name()).await {
                        Ok(value) => value.pretty(2),
                        Err(e) => e,
                    }
                }),
                Err(e) => format!(
                    "Error: {}\nTry 'help setoption' for correct usage and examples.",
                    e
                ),
            },
            Command::ValueTransfers => {
                if !args.is_empty() {
                    return self.help().to_string();
                }
                RT.block_on(async move { lightclient.value_transfers().await.to_json().pretty(2) })
            }
            Command::ValueToAddress => RT.block_on(async move {
                JsonValue::from(lightclient.wallet.total_value_to_address().await).pretty(2)
            }),
            Command::SendsToAddress => RT.block_on(async move {
                JsonValue::from(lightclient.wallet.total_sends_to_address().await).pretty(2)
            }),
            Command::MemoBytesToAddress => RT.block_on(async move {
                JsonValue::from(lightclient.wallet.total_memobytes_to_address().await).pretty(2)
            }),
            Command::DefaultFee => object! { "defaultfee" => DEFAULT_FEE }.pretty(2),
            Command::Birthday => object! { "birthday" => lightclient.wallet.get_birthday() }.pretty(2),
            Command::Clear => RT.block_on(async move {
                lightclient.do_clear().await;
                object! { "result" => "success" }.pretty(2)
            }),
            Command::Save => RT.block_on(async move { result_json(lightclient.do_save().await).pretty(2) }),
            Command::Help => match args {
                [] => help_all(),
                [name] => match name.parse::<Command>() {
                    Ok(cmd) => cmd.help().to_string(),
                    Err(e) => format!("Error: {e}"),
                },
                _ => self.help().to_string(),
            },
        }
    }

    fn exec_interrupt(&self, args: &[&str], lightclient: &LightClient) -> String {
        match args {
            [flag @ ("true" | "false")] => RT.block_on(async move {
                lightclient
                    .interrupt_sync_after_batch(*flag == "true")
                    .await;
                flag.to_string()
            }),
            _ => self.help().to_string(),
        }
    }

    fn exec_notes(&self, args: &[&str], lightclient: &LightClient) -> String {
        let all_notes = match args {
            [] => false,
            ["all"] => true,
            [a] => {
                return format!(
                    "Invalid argument \"{}\". Specify 'all' to include spent notes",
                    a
                )
            }
            _ => return self.short_help().to_string(),
        };
        RT.block_on(async move { lightclient.do_list_notes(all_notes).await.pretty(2) })
    }

    fn exec_send(&self, args: &[&str], lightclient: &LightClient) -> String {
        let recipients = match utils::parse_send_args(args) {
            Ok(recipients) => recipients,
            Err(e) => {
                return format!(
                    "Error: {}\nTry 'help send' for correct usage and examples.",
                    e
                )
            }
        };
        RT.block_on(async move {
            match lightclient.propose_send(recipients).await {
                Ok(proposal) => proposal.to_json(),
                Err(e) => WalletError::from(e).to_json(),
            }
            .pretty(2)
        })
    }

    fn exec_shield(&self, args: &[&str], lightclient: &LightClient) -> String {
        let source = match args {
            [] => ShieldSource::All,
            [pool] => match pool.parse::<ShieldSource>() {
                Ok(source) => source,
                Err(e) => {
                    return format!(
                        "Error: {}\nTry 'help shield' for correct usage and examples.",
                        e
                    )
                }
            },
            _ => return self.help().to_string(),
        };
        RT.block_on(async move {
            match lightclient.propose_shield(source).await {
                Ok(proposal) => proposal.to_json(),
                Err(e) => WalletError::from(e).to_json(),
            }
            .pretty(2)
        })
    }

    fn exec_confirm(&self, args: &[&str], lightclient: &LightClient) -> String {
        let id = match utils::parse_proposal_id(args) {
            Ok(id) => id,
            Err(e) => {
                return format!(
                    "Error: {}\nTry 'help confirm' for correct usage and examples.",
                    e
                )
            }
        };
        RT.block_on(async move {
            let result = match id {
                Some(id) => lightclient.confirm(id).await,
                None => lightclient.confirm_current().await,
            };
            match result {
                Ok(txid) => object! { "txids" => vec![txid.to_string()] },
                Err(e) => WalletError::from(e).to_json(),
            }
            .pretty(2)
        })
    }

    fn exec_abandon(&self, args: &[&str], lightclient: &LightClient) -> String {
        let id = match utils::parse_proposal_id(args) {
            Ok(id) => id,
            Err(e) => {
                return format!(
                    "Error: {}\nTry 'help abandon' for correct usage and examples.",
                    e
                )
            }
        };
        RT.block_on(async move {
            if lightclient.abandon(id).await {
                object! { "result" => "success" }
            } else {
                object! { "error" => "no such proposal is outstanding" }
            }
            .pretty(2)
        })
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.name() == name)
            .ok_or_else(|| CommandError::UnknownCommand(s.to_string()))
    }
}

fn result_json(result: Result<(), String>) -> JsonValue {
    match result {
        Ok(()) => object! { "result" => "success" },
        Err(e) => object! { "result" => "error", "error" => e },
    }
}

fn parse_address_json(address: &str) -> JsonValue {
    match parse_address(address) {
        Ok(parsed) => {
            let mut res = object! {
                "status" => "success",
                "chain_name" => network_name(parsed.network),
                "address_kind" => parsed.kind.to_string(),
            };
            if parsed.kind == AddressKind::Unified {
                res["receivers_available"] = parsed.receivers_available().into();
            }
            res
        }
        Err(e) => object! {
            "status" => "Invalid address",
            "error" => e.to_string(),
            "chain_name" => JsonValue::Null,
            "address_kind" => JsonValue::Null,
        },
    }
}

fn help_all() -> String {
    let mut responses = vec!["Available commands:".to_string()];
    let mut commands = Command::ALL.to_vec();
    commands.sort_by_key(|cmd| cmd.name());
    for cmd in commands {
        responses.push(format!("{} - {}", cmd.name(), cmd.short_help()));
    }
    responses.join("\n")
}

/// Parses `cmd` and runs it against `lightclient`.
pub fn do_user_command(cmd: &str, args: &[&str], lightclient: &Arc<LightClient>) -> String {
    match cmd.parse::<Command>() {
        Ok(cmd) => cmd.exec(args, lightclient),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lightclient::test_support::{first_address, test_client};

    const TADDR: &str = "tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd";

    fn run(cmd: &str, args: &[&str], client: &Arc<LightClient>) -> JsonValue {
        json::parse(&do_user_command(cmd, args, client)).unwrap()
    }

    #[test]
    fn every_command_parses_from_its_name() {
        for cmd in Command::ALL {
            assert_eq!(cmd.name().parse::<Command>().unwrap(), cmd);
            assert!(!cmd.help().is_empty());
        }
        assert_eq!("SyncStatus".parse::<Command>().unwrap(), Command::SyncStatus);
        assert!(matches!(
            "frobnicate".parse::<Command>(),
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[test]
    fn unknown_and_malformed_commands_answer_with_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = RT.block_on(test_client(&dir));

        assert!(do_user_command("frobnicate", &[], &client).starts_with("Unknown command"));
        assert!(do_user_command("send", &["tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd"], &client)
            .starts_with("Error:"));
        assert!(do_user_command("confirm", &["x"], &client).starts_with("Error:"));
        assert_eq!(
            run("confirm", &[], &client)["error"],
            "No proposal. Call send or shield first."
        );
        assert!(do_user_command("help", &["send"], &client).contains("Usage:"));
        assert!(do_user_command("help", &[], &client).contains("sendprogress - "));
    }

    #[test]
    fn parse_address_reports_kind_and_receivers() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = RT.block_on(test_client(&dir));
        let own = RT.block_on(first_address(&client));

        let parsed = run("parse_address", &[own.as_str()], &client);
        assert_eq!(parsed["status"], "success");
        assert_eq!(parsed["chain_name"], "regtest");
        assert_eq!(parsed["address_kind"], "unified");
        assert_eq!(parsed["receivers_available"].len(), 3);

        let parsed = run("parse_address", &[TADDR], &client);
        assert_eq!(parsed["chain_name"], "test");
        assert_eq!(parsed["address_kind"], "transparent");
        assert!(!parsed.has_key("receivers_available"));

        assert_eq!(run("parse_address", &["nope"], &client)["status"], "Invalid address");
    }

    #[test]
    fn send_confirm_and_progress_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = RT.block_on(test_client(&dir));
        let own = RT.block_on(first_address(&client));
        chain.fund(&own, 300_000, None).unwrap();
        chain.mine_block();

        let sync_id = run("sync", &[], &client)["sync_id"].as_u64().unwrap();
        let mut status = client.subscribe_sync_status();
        RT.block_on(status.wait_for(|s| s.sync_id == sync_id && !s.in_progress))
            .unwrap();
        let status = run("syncstatus", &[], &client);
        assert_eq!(status["in_progress"], false);
        assert!(status["last_error"].is_null());
        assert_eq!(run("balance", &[], &client)["spendable_orchard_balance"], 300_000);

        let proposal = run("send", &[TADDR, "100000"], &client);
        assert_eq!(proposal["fee"], 15_000);
        let replaced = run("send", &[TADDR, "50000"], &client);
        assert_ne!(replaced["proposal_id"], proposal["proposal_id"]);
        let replaced_id = proposal["proposal_id"].to_string();
        assert!(run("abandon", &[replaced_id.as_str()], &client).has_key("error"));

        let confirmed = run("confirm", &[], &client);
        let txid = confirmed["txids"][0].as_str().unwrap().to_string();
        assert_eq!(txid.len(), 64);

        let progress = run("sendprogress", &[], &client);
        assert_eq!(progress["txid"], txid.as_str());
        assert_eq!(progress["sending"], false);
        assert_eq!(chain.sent_transactions().len(), 1);

        chain.mine_block();
        RT.block_on(client.do_sync()).unwrap();
        let transfers = run("valuetransfers", &[], &client);
        let sent: Vec<&JsonValue> = transfers["value_transfers"]
            .members()
            .filter(|vt| vt["kind"] == "sent")
            .collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["recipient_address"], TADDR);
        assert_eq!(run("value_to_address", &[], &client)[TADDR], 50_000);
        assert_eq!(run("sends_to_address", &[], &client)[TADDR], 1);
    }

    #[test]
    fn interrupt_flag_shows_in_status() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = RT.block_on(test_client(&dir));

        assert_eq!(do_user_command("interrupt_sync_after_batch", &["true"], &client), "true");
        assert_eq!(run("syncstatus", &[], &client)["sync_interrupt"], true);
        assert_eq!(run("sendprogress", &[], &client)["sync_interrupt"], true);
        assert!(do_user_command("interrupt_sync_after_batch", &["maybe"], &client)
            .contains("Usage:"));
    }

    #[test]
    fn current_price_comes_from_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = RT.block_on(test_client(&dir));

        assert!(do_user_command("updatecurrentprice", &[], &client).starts_with("Error:"));
        chain.set_zec_price(Some(31.5));
        assert_eq!(do_user_command("updatecurrentprice", &[], &client), "31.5");
        let (_, price) = RT
            .block_on(client.wallet.price.read())
            .zec_price
            .unwrap();
        assert_eq!(price, 31.5);
    }

    #[test]
    fn options_and_wallet_settings() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = RT.block_on(test_client(&dir));

        assert_eq!(
            run("setoption", &["download_memos=none"], &client)["download_memos"],
            "none"
        );
        assert_eq!(
            run("getoption", &["transaction_filter_threshold"], &client)["transaction_filter_threshold"],
            -1
        );
        let rejected = do_user_command("setoption", &["colour=blue"], &client);
        assert!(rejected.starts_with("Error: colour is not a valid option"));
        assert_eq!(rejected.matches("Error:").count(), 1);
        let rejected = do_user_command("setoption", &["download_memos=some"], &client);
        assert!(rejected.starts_with("Error: Couldn't understand download_memos value some"));
        assert!(do_user_command("getoption", &["colour"], &client)
            .starts_with("Error: colour is not a valid option"));
        assert_eq!(run("defaultfee", &[], &client)["defaultfee"], 10_000);
        assert_eq!(run("birthday", &[], &client)["birthday"], 1);
        assert_eq!(run("new", &["o"], &client).len(), 1);
        assert_eq!(run("addresses", &[], &client).len(), 2);
        assert_eq!(run("lock", &[], &client)["result"], "error");
        assert_eq!(run("encrypt", &["pw"], &client)["result"], "success");
        assert!(run("seed", &[], &client).has_key("error"));
        assert_eq!(run("unlock", &["pw"], &client)["result"], "success");
        assert_eq!(run("seed", &[], &client)["birthday"], 1);
        assert_eq!(run("save", &[], &client)["result"], "success");
    }
}
