//! Wallet addresses and parsing of addresses the user types in.
//!
//! Every wallet address is derived from the account viewing key and a diversifier index,
//! so the registry only has to persist the index and the receiver selection of each
//! address and can re-derive the rest.

use std::{
    fmt,
    io::{self, Read, Write},
    str::FromStr,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zcash_address::{
    unified::{self, Container, Encoding, Receiver},
    ConversionError, Network, ToAddress, TryFromAddress, ZcashAddress,
};
use zcash_encoding::Vector;
use zcash_protocol::PoolType;

use crate::{chain::transaction::TransparentScript, config::ChainType};

use super::{error::AddressError, keys::ViewingKey};

pub(crate) fn network_name(network: Network) -> &'static str {
    match network {
        Network::Main => "main",
        Network::Test => "test",
        Network::Regtest => "regtest",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Unified,
    Sapling,
    Transparent,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressKind::Unified => "unified",
            AddressKind::Sapling => "sapling",
            AddressKind::Transparent => "transparent",
        })
    }
}

/// Which receivers a new address carries, written as a combination of `o`, `z`, `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverSelection {
    pub orchard: bool,
    pub sapling: bool,
    pub transparent: bool,
}

impl ReceiverSelection {
    pub fn all() -> Self {
        ReceiverSelection {
            orchard: true,
            sapling: true,
            transparent: true,
        }
    }

    fn to_bits(self) -> u8 {
        (self.orchard as u8) | (self.sapling as u8) << 1 | (self.transparent as u8) << 2
    }

    fn from_bits(bits: u8) -> Self {
        ReceiverSelection {
            orchard: bits & 1 != 0,
            sapling: bits & 2 != 0,
            transparent: bits & 4 != 0,
        }
    }
}

impl FromStr for ReceiverSelection {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selection = ReceiverSelection::default();
        for c in s.chars() {
            match c {
                'o' => selection.orchard = true,
                'z' => selection.sapling = true,
                't' => selection.transparent = true,
                _ => return Err(AddressError::InvalidReceiverSelection(s.to_string())),
            }
        }
        if selection == ReceiverSelection::default() {
            return Err(AddressError::InvalidReceiverSelection(s.to_string()));
        }
        Ok(selection)
    }
}

/// An address belonging to this wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAddress {
    pub index: u32,
    pub selection: ReceiverSelection,
    pub encoded: String,
    pub orchard: Option<[u8; 43]>,
    pub sapling: Option<[u8; 43]>,
    pub transparent: Option<[u8; 20]>,
}

impl WalletAddress {
    /// Derives the address at `index`. An orchard receiver, or sapling together with
    /// transparent, makes a unified address; a lone sapling or transparent receiver is
    /// encoded as a plain address of that kind.
    pub fn derive(
        viewing_key: &ViewingKey,
        index: u32,
        selection: ReceiverSelection,
        chain: ChainType,
    ) -> Result<Self, AddressError> {
        let network = chain.to_zcash_address_network();
        let orchard = selection
            .orchard
            .then(|| viewing_key.orchard_receiver(index));
        let sapling = selection
            .sapling
            .then(|| viewing_key.sapling_receiver(index));
        let transparent = selection
            .transparent
            .then(|| viewing_key.transparent_receiver(index));

        let encoded = match (orchard, sapling, transparent) {
            (None, None, None) => {
                return Err(AddressError::InvalidReceiverSelection(String::new()))
            }
            (None, Some(sapling), None) => ZcashAddress::from_sapling(network, sapling).encode(),
            (None, None, Some(transparent)) => {
                ZcashAddress::from_transparent_p2pkh(network, transparent).encode()
            }
            _ => {
                let mut items = vec![];
                if let Some(receiver) = orchard {
                    items.push(Receiver::Orchard(receiver));
                }
                if let Some(receiver) = sapling {
                    items.push(Receiver::Sapling(receiver));
                }
                if let Some(receiver) = transparent {
                    items.push(Receiver::P2pkh(receiver));
                }
                let ua = unified::Address::try_from_items(items)
                    .map_err(|e| AddressError::Encoding(e.to_string()))?;
                ZcashAddress::from_unified(network, ua).encode()
            }
        };

        Ok(WalletAddress {
            index,
            selection,
            encoded,
            orchard,
            sapling,
            transparent,
        })
    }

    pub fn kind(&self) -> AddressKind {
        match (self.orchard, self.sapling, self.transparent) {
            (None, Some(_), None) => AddressKind::Sapling,
            (None, None, Some(_)) => AddressKind::Transparent,
            _ => AddressKind::Unified,
        }
    }

    /// The transparent receiver on its own, as senders of transparent funds see it.
    pub fn transparent_encoded(&self, chain: ChainType) -> Option<String> {
        self.transparent.map(|receiver| {
            ZcashAddress::from_transparent_p2pkh(chain.to_zcash_address_network(), receiver)
                .encode()
        })
    }

    pub fn sapling_encoded(&self, chain: ChainType) -> Option<String> {
        self.sapling.map(|receiver| {
            ZcashAddress::from_sapling(chain.to_zcash_address_network(), receiver).encode()
        })
    }

    pub fn has_receiver(&self, pool: PoolType) -> bool {
        match pool {
            PoolType::ORCHARD => self.orchard.is_some(),
            PoolType::SAPLING => self.sapling.is_some(),
            _ => self.transparent.is_some(),
        }
    }

    pub fn to_json(&self, chain: ChainType) -> json::JsonValue {
        json::object! {
            "address" => self.encoded.clone(),
            "receivers" => json::object! {
                "transparent" => self.transparent_encoded(chain),
                "sapling" => self.sapling_encoded(chain),
                "orchard_exists" => self.orchard.is_some(),
            }
        }
    }
}

/// The wallet's addresses in creation order.
#[derive(Debug, Clone, Default)]
pub struct AddressRegistry {
    addresses: Vec<WalletAddress>,
}

impl AddressRegistry {
    pub const fn serialized_version() -> u8 {
        1
    }

    pub fn new_address(
        &mut self,
        viewing_key: &ViewingKey,
        selection: ReceiverSelection,
        chain: ChainType,
    ) -> Result<&WalletAddress, AddressError> {
        let index = self.addresses.len() as u32;
        let address = WalletAddress::derive(viewing_key, index, selection, chain)?;
        self.addresses.push(address);
        Ok(&self.addresses[index as usize])
    }

    pub fn iter(&self) -> impl Iterator<Item = &WalletAddress> {
        self.addresses.iter()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Where change and shielded funds go.
    pub fn first_orchard(&self) -> Option<&WalletAddress> {
        self.addresses.iter().find(|a| a.orchard.is_some())
    }

    pub fn by_orchard_receiver(&self, receiver: &[u8; 43]) -> Option<&WalletAddress> {
        self.addresses
            .iter()
            .find(|a| a.orchard.as_ref() == Some(receiver))
    }

    pub fn by_sapling_receiver(&self, receiver: &[u8; 43]) -> Option<&WalletAddress> {
        self.addresses
            .iter()
            .find(|a| a.sapling.as_ref() == Some(receiver))
    }

    pub fn by_transparent_receiver(&self, receiver: &[u8; 20]) -> Option<&WalletAddress> {
        self.addresses
            .iter()
            .find(|a| a.transparent.as_ref() == Some(receiver))
    }

    pub fn by_encoded(&self, encoded: &str) -> Option<&WalletAddress> {
        self.addresses.iter().find(|a| a.encoded == encoded)
    }

    /// Whether `parsed` pays to one of this wallet's receivers.
    pub fn owns(&self, parsed: &ParsedAddress) -> bool {
        parsed
            .orchard
            .as_ref()
            .is_some_and(|r| self.by_orchard_receiver(r).is_some())
            || parsed
                .sapling
                .as_ref()
                .is_some_and(|r| self.by_sapling_receiver(r).is_some())
            || matches!(parsed.transparent, Some(TransparentScript::P2pkh(r)) if self.by_transparent_receiver(&r).is_some())
    }

    /// All transparent receivers, encoded on their own.
    pub fn transparent_addresses(&self, chain: ChainType) -> Vec<String> {
        self.addresses
            .iter()
            .filter_map(|a| a.transparent_encoded(chain))
            .collect()
    }

    pub fn read<R: Read>(
        mut reader: R,
        viewing_key: &ViewingKey,
        chain: ChainType,
    ) -> io::Result<Self> {
        let _version = reader.read_u8()?;
        let entries = Vector::read(&mut reader, |r| {
            let index = r.read_u32::<LittleEndian>()?;
            let selection = ReceiverSelection::from_bits(r.read_u8()?);
            Ok((index, selection))
        })?;
        let addresses = entries
            .into_iter()
            .map(|(index, selection)| {
                WalletAddress::derive(viewing_key, index, selection, chain)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
            })
            .collect::<io::Result<_>>()?;
        Ok(AddressRegistry { addresses })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(Self::serialized_version())?;
        Vector::write(&mut writer, &self.addresses, |w, address| {
            w.write_u32::<LittleEndian>(address.index)?;
            w.write_u8(address.selection.to_bits())
        })
    }
}

/// The receivers of an address typed in by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub network: Network,
    pub kind: AddressKind,
    pub orchard: Option<[u8; 43]>,
    pub sapling: Option<[u8; 43]>,
    pub transparent: Option<TransparentScript>,
}

impl ParsedAddress {
    fn empty(network: Network, kind: AddressKind) -> Self {
        ParsedAddress {
            network,
            kind,
            orchard: None,
            sapling: None,
            transparent: None,
        }
    }

    pub fn receivers_available(&self) -> Vec<&'static str> {
        let mut receivers = vec![];
        if self.orchard.is_some() {
            receivers.push("orchard");
        }
        if self.sapling.is_some() {
            receivers.push("sapling");
        }
        if self.transparent.is_some() {
            receivers.push("transparent");
        }
        receivers
    }

    pub fn can_receive_memo(&self) -> bool {
        self.orchard.is_some() || self.sapling.is_some()
    }

    /// The pool a payment to this address lands in: orchard over sapling over transparent.
    pub fn preferred_pool(&self) -> PoolType {
        if self.orchard.is_some() {
            PoolType::ORCHARD
        } else if self.sapling.is_some() {
            PoolType::SAPLING
        } else {
            PoolType::TRANSPARENT
        }
    }
}

impl TryFromAddress for ParsedAddress {
    type Error = &'static str;

    fn try_from_sapling(
        net: Network,
        data: [u8; 43],
    ) -> Result<Self, ConversionError<Self::Error>> {
        Ok(ParsedAddress {
            sapling: Some(data),
            ..ParsedAddress::empty(net, AddressKind::Sapling)
        })
    }

    fn try_from_unified(
        net: Network,
        data: unified::Address,
    ) -> Result<Self, ConversionError<Self::Error>> {
        let mut parsed = ParsedAddress::empty(net, AddressKind::Unified);
        for receiver in data.items() {
            match receiver {
                Receiver::Orchard(r) => parsed.orchard = Some(r),
                Receiver::Sapling(r) => parsed.sapling = Some(r),
                Receiver::P2pkh(r) => parsed.transparent = Some(TransparentScript::P2pkh(r)),
                Receiver::P2sh(r) => parsed.transparent = Some(TransparentScript::P2sh(r)),
                Receiver::Unknown { .. } => {}
            }
        }
        if parsed.receivers_available().is_empty() {
            return Err(ConversionError::User("no known receivers"));
        }
        Ok(parsed)
    }

    fn try_from_transparent_p2pkh(
        net: Network,
        data: [u8; 20],
    ) -> Result<Self, ConversionError<Self::Error>> {
        Ok(ParsedAddress {
            transparent: Some(TransparentScript::P2pkh(data)),
            ..ParsedAddress::empty(net, AddressKind::Transparent)
        })
    }

    fn try_from_transparent_p2sh(
        net: Network,
        data: [u8; 20],
    ) -> Result<Self, ConversionError<Self::Error>> {
        Ok(ParsedAddress {
            transparent: Some(TransparentScript::P2sh(data)),
            ..ParsedAddress::empty(net, AddressKind::Transparent)
        })
    }
}

/// Parses an address on whichever network it encodes.
pub fn parse_address(encoded: &str) -> Result<ParsedAddress, AddressError> {
    let address = ZcashAddress::try_from_encoded(encoded)
        .map_err(|_| AddressError::Invalid(encoded.to_string()))?;
    address
        .convert::<ParsedAddress>()
        .map_err(|e| match e {
            ConversionError::Unsupported(_) => AddressError::Unsupported(encoded.to_string()),
            _ => AddressError::Invalid(encoded.to_string()),
        })
}

/// Parses an address a wallet on `chain` can pay to.
///
/// Transparent addresses have no regtest encoding, so a regtest wallet accepts testnet
/// transparent addresses.
pub fn parse_address_for(encoded: &str, chain: ChainType) -> Result<ParsedAddress, AddressError> {
    let parsed = parse_address(encoded)?;
    let expected = chain.to_zcash_address_network();
    let transparent_on_regtest = expected == Network::Regtest
        && parsed.network == Network::Test
        && parsed.kind == AddressKind::Transparent;
    if parsed.network != expected && !transparent_on_regtest {
        return Err(AddressError::WrongNetwork {
            address: encoded.to_string(),
            expected: network_name(expected),
            actual: network_name(parsed.network),
        });
    }
    Ok(parsed)
}

/// Encodes a receiver the wallet saw only by its raw bytes.
pub(crate) fn encode_transparent(script: &TransparentScript, chain: ChainType) -> String {
    let network = chain.to_zcash_address_network();
    match script {
        TransparentScript::P2pkh(hash) => {
            ZcashAddress::from_transparent_p2pkh(network, *hash).encode()
        }
        TransparentScript::P2sh(hash) => ZcashAddress::from_transparent_p2sh(network, *hash).encode(),
    }
}

#[cfg(test)]
mod tests {
    use bip0039::Mnemonic;
    use test_case::test_case;

    use super::*;
    use crate::wallet::keys::WalletCapability;

    fn viewing_key() -> ViewingKey {
        let mnemonic = Mnemonic::from_entropy(vec![3u8; 32]).unwrap();
        WalletCapability::new_from_phrase(ChainType::Regtest, &mnemonic, 0)
            .viewing_key()
            .clone()
    }

    #[test_case("ozt", AddressKind::Unified ; "all receivers")]
    #[test_case("o", AddressKind::Unified ; "orchard only")]
    #[test_case("zt", AddressKind::Unified ; "sapling and transparent")]
    #[test_case("z", AddressKind::Sapling ; "sapling only")]
    #[test_case("t", AddressKind::Transparent ; "transparent only")]
    fn derived_addresses_parse_back(selection: &str, kind: AddressKind) {
        let selection: ReceiverSelection = selection.parse().unwrap();
        let address = WalletAddress::derive(&viewing_key(), 2, selection, ChainType::Regtest).unwrap();
        assert_eq!(address.kind(), kind);

        let parsed = parse_address_for(&address.encoded, ChainType::Regtest).unwrap();
        assert_eq!(parsed.kind, kind);
        assert_eq!(parsed.orchard, address.orchard);
        assert_eq!(parsed.sapling, address.sapling);
        assert_eq!(
            parsed.transparent,
            address.transparent.map(TransparentScript::P2pkh)
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("ox" ; "unknown letter")]
    fn bad_receiver_selection(s: &str) {
        assert!(matches!(
            s.parse::<ReceiverSelection>(),
            Err(AddressError::InvalidReceiverSelection(_))
        ));
    }

    #[test]
    fn rejects_garbage_and_other_networks() {
        assert!(matches!(
            parse_address("not-an-address"),
            Err(AddressError::Invalid(_))
        ));

        let address =
            WalletAddress::derive(&viewing_key(), 0, "o".parse().unwrap(), ChainType::Regtest)
                .unwrap();
        assert!(matches!(
            parse_address_for(&address.encoded, ChainType::Mainnet),
            Err(AddressError::WrongNetwork { .. })
        ));
    }

    #[test]
    fn regtest_wallet_accepts_testnet_transparent() {
        let address =
            WalletAddress::derive(&viewing_key(), 0, "t".parse().unwrap(), ChainType::Testnet)
                .unwrap();
        assert!(parse_address_for(&address.encoded, ChainType::Regtest).is_ok());

        let sapling =
            WalletAddress::derive(&viewing_key(), 0, "z".parse().unwrap(), ChainType::Testnet)
                .unwrap();
        assert!(parse_address_for(&sapling.encoded, ChainType::Regtest).is_err());
    }

    #[test]
    fn registry_rederives_on_read() {
        let vk = viewing_key();
        let mut registry = AddressRegistry::default();
        registry
            .new_address(&vk, ReceiverSelection::all(), ChainType::Regtest)
            .unwrap();
        registry
            .new_address(&vk, "z".parse().unwrap(), ChainType::Regtest)
            .unwrap();

        let mut bytes = vec![];
        registry.write(&mut bytes).unwrap();
        let read = AddressRegistry::read(&bytes[..], &vk, ChainType::Regtest).unwrap();
        assert_eq!(read.addresses, registry.addresses);
        assert_eq!(read.first_orchard().map(|a| a.index), Some(0));

        let parsed = parse_address(&registry.addresses[1].encoded).unwrap();
        assert!(read.owns(&parsed));
    }
}
