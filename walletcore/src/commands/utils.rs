use json::JsonValue;

use crate::commands::error::CommandError;
use crate::lightclient::keys::WalletOption;
use crate::wallet::propose::{ProposalId, Recipient};

/// Expands one payment into as many recipients as its memo needs.
fn recipients_for(
    address: String,
    amount: u64,
    memo: Option<String>,
) -> Result<Vec<Recipient>, CommandError> {
    let Some(memo) = memo.filter(|m| !m.is_empty()) else {
        return Ok(vec![Recipient {
            address,
            amount,
            memo: None,
        }]);
    };
    Ok(walletcore_memo::chunk_recipient(&address, amount, &memo)
        .map_err(|e| CommandError::InvalidMemo(e.to_string()))?
        .into_iter()
        .map(|chunk| Recipient {
            address: chunk.address,
            amount: chunk.amount,
            memo: Some(chunk.memo),
        })
        .collect())
}

fn parse_json_recipient(j: &JsonValue) -> Result<Vec<Recipient>, CommandError> {
    if !j.is_object() {
        return Err(CommandError::JsonArrayNotObj(j.to_string()));
    }
    if !j.has_key("address") {
        return Err(CommandError::MissingKey("address".to_string()));
    } else if !j.has_key("amount") {
        return Err(CommandError::MissingKey("amount".to_string()));
    }

    let address = j["address"]
        .as_str()
        .ok_or_else(|| CommandError::UnexpectedType(j["address"].to_string()))?
        .to_string();
    let amount = j["amount"]
        .as_u64()
        .ok_or_else(|| CommandError::NonJsonNumberForAmount(j["amount"].to_string()))?;
    let memo = match &j["memo"] {
        JsonValue::Null => None,
        memo => Some(
            memo.as_str()
                .ok_or_else(|| CommandError::InvalidMemo(memo.to_string()))?
                .to_string(),
        ),
    };
    recipients_for(address, amount, memo)
}

/// Parses `send` arguments: a JSON array of `{address, amount, memo?}` objects, or
/// `address amount [memo]`. Memos too long for one output are split into chunks.
pub(super) fn parse_send_args(args: &[&str]) -> Result<Vec<Recipient>, CommandError> {
    let per_payment = match args.len() {
        1 => {
            let json_args = json::parse(args[0]).map_err(CommandError::ArgsNotJson)?;
            if !json_args.is_array() {
                return Err(CommandError::SingleArgNotJsonArray(json_args.to_string()));
            }
            if json_args.is_empty() {
                return Err(CommandError::EmptyJsonArray);
            }
            json_args
                .members()
                .map(parse_json_recipient)
                .collect::<Result<Vec<_>, _>>()?
        }
        2 | 3 => {
            let amount = args[1]
                .parse::<u64>()
                .map_err(CommandError::ParseIntFromString)?;
            vec![recipients_for(
                args[0].to_string(),
                amount,
                args.get(2).map(|m| m.to_string()),
            )?]
        }
        _ => return Err(CommandError::InvalidArguments),
    };
    Ok(per_payment.into_iter().flatten().collect())
}

/// An optional single proposal id argument.
pub(super) fn parse_proposal_id(args: &[&str]) -> Result<Option<ProposalId>, CommandError> {
    match args {
        [] => Ok(None),
        [id] => id
            .parse::<u64>()
            .map(|id| Some(ProposalId(id)))
            .map_err(CommandError::ParseIntFromString),
        _ => Err(CommandError::InvalidArguments),
    }
}

/// Parses `name=value`, or `name value`.
pub(super) fn parse_option_args(args: &[&str]) -> Result<WalletOption, CommandError> {
    let (name, value) = match args {
        [pair] => pair.split_once('=').ok_or(CommandError::InvalidArguments)?,
        [name, value] => (*name, *value),
        _ => return Err(CommandError::InvalidArguments),
    };
    WalletOption::parse(name.trim(), value.trim()).map_err(CommandError::InvalidOption)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TADDR: &str = "tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd";

    #[test]
    fn parse_send_args() {
        let address = "uregtest1zkuzfv5m3yhv2j4fmvq5rjurkxenxyq8r7h4daun2zkznrjaa8ra8asgdm8wwgwjvlwwrxx7347r8w0ee6dqyw4rufw4wg9djwcr6frzkezmdw6dud3wsm99eany5r8wgsctlxquu009nzd6hsme2tcsk0v3sgjvxa70er7h27z5epr67p5q767s2z5gt88paru56mxpm6pwz0cu35m";

        assert_eq!(
            super::parse_send_args(&[address, "100000"]).unwrap(),
            vec![Recipient {
                address: address.to_string(),
                amount: 100_000,
                memo: None,
            }]
        );
        assert_eq!(
            super::parse_send_args(&[address, "100000", "test memo"]).unwrap()[0].memo,
            Some("test memo".to_string())
        );

        let json = format!(
            "[{{\"address\":\"{TADDR}\", \"amount\":50000}}, \
            {{\"address\":\"{address}\", \"amount\":100000, \"memo\":\"test memo\"}}]"
        );
        let recipients = super::parse_send_args(&[&json]).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].address, TADDR);
        assert_eq!(recipients[0].amount, 50_000);
        assert_eq!(recipients[1].memo.as_deref(), Some("test memo"));
    }

    #[test]
    fn bad_send_args_are_explained() {
        assert!(matches!(
            super::parse_send_args(&["{\"address\": 1}"]),
            Err(CommandError::SingleArgNotJsonArray(_))
        ));
        assert!(matches!(
            super::parse_send_args(&["[]"]),
            Err(CommandError::EmptyJsonArray)
        ));
        assert!(matches!(
            super::parse_send_args(&["[{\"amount\": 1}]"]),
            Err(CommandError::MissingKey(key)) if key == "address"
        ));
        assert!(matches!(
            super::parse_send_args(&[TADDR, "lots"]),
            Err(CommandError::ParseIntFromString(_))
        ));
        assert!(matches!(
            super::parse_send_args(&[]),
            Err(CommandError::InvalidArguments)
        ));
    }

    #[test]
    fn long_memos_are_sent_in_chunks() {
        let memo: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let recipients = super::parse_send_args(&[TADDR, "70000", &memo]).unwrap();

        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].amount, 70_000);
        assert_eq!(recipients[1].amount, 0);
        let memos: Vec<String> = recipients.into_iter().filter_map(|r| r.memo).collect();
        assert!(memos.iter().all(|m| m.len() <= walletcore_memo::MEMO_SIZE));
        assert!(memos[0].starts_with("(1/2)"));
        assert_eq!(walletcore_memo::reassemble(&memos), Some(memo));
    }

    #[test]
    fn proposal_and_option_args() {
        assert_eq!(parse_proposal_id(&[]).unwrap(), None);
        assert_eq!(parse_proposal_id(&["7"]).unwrap(), Some(ProposalId(7)));
        assert!(parse_proposal_id(&["seven"]).is_err());

        assert_eq!(
            parse_option_args(&["transaction_filter_threshold=-1"]).unwrap(),
            WalletOption::TransactionFilterThreshold(None)
        );
        assert!(parse_option_args(&["download_memos"]).is_err());
    }
}
