//! Calldata and event decoding for the staking contract
//!
//! Call parameters are decoded only for transactions sent to the staking
//! contract, by matching the 4-byte selector against a fixed table of
//! function signatures. Event logs emitted by the staking contract are
//! mapped to [`StakingEvent`]s, some of which move balances outside of the
//! transaction's declared value.

use crate::error::IndexError;
use crate::records::{CallData, DecodedValue};
use crate::types::EventLog;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{b256, keccak256, Address, B256, U256};

/// Staking contract functions whose parameters are decoded.
const STAKING_FUNCTIONS: &[&str] = &[
    "delegate(address)",
    "undelegate(address,uint256)",
    "undelegateV2(address,uint256)",
    "confirmUndelegate(address)",
    "confirmUndelegateV2(address,uint64)",
    "cancelUndelegate(address)",
    "cancelUndelegateV2(address,uint64)",
    "redelegate(address,address,uint256)",
    "claimRewards(address)",
    "claimAllRewards()",
    "claimCommissionRewards(address)",
    "registerValidator(address,bytes,bytes,uint16,string,string)",
    "setValidatorInfo(address,string,string)",
    "setCommission(address,uint16)",
];

pub const DELEGATED_TOPIC: B256 =
    b256!("e5541a6b6103d4fa7e021ed54fad39c66f27a76bd13d374cf6240ae6bd0bb72b");
pub const UNDELEGATED_TOPIC: B256 =
    b256!("4d10bd049775c77bd7f255195afba5088028ecb3c7c277d393ccff7934f2f92c");
pub const UNDELEGATED_V2_TOPIC: B256 =
    b256!("cfe7d712cc67daf9a8d00e8cca5881948bc528988fc31a071effa1dbe6dc91ef");
pub const UNDELEGATE_CONFIRMED_TOPIC: B256 =
    b256!("f8bef3a6fe3b4c932b5b51c6472a89f171d039f4bacf18cff632208938bf0426");
pub const UNDELEGATE_CONFIRMED_V2_TOPIC: B256 =
    b256!("a637e566d82568efa4bd8c588e17232aee483873fa17fb873f6d398ba85ed57c");
pub const UNDELEGATE_CANCELLED_TOPIC: B256 =
    b256!("88d329de3a86740b469fce9356c67013aca83f005717fa8007a7b876b8fb65db");
pub const UNDELEGATE_CANCELLED_V2_TOPIC: B256 =
    b256!("a8dfacf6c8381594b1967a86ff28e296a86c6ab3b28adcc0a71eead5bcf1267b");
pub const REDELEGATED_TOPIC: B256 =
    b256!("12e144c27d0bad08abc77c66a640b5cf15a03a93f6582f40de6932b033a5fa5e");
pub const REWARDS_CLAIMED_TOPIC: B256 =
    b256!("9310ccfcb8de723f578a9e4282ea9f521f05ae40dc08f3068dfad528a65ee3c7");
pub const COMMISSION_REWARDS_CLAIMED_TOPIC: B256 =
    b256!("f0ec9e0f6add850a1738c5822244e26ffc3d1f14da7537aa240582b25af12ad0");

/// Decoded staking contract event.
///
/// `account` is always the first indexed parameter (delegator, or the
/// validator for commission claims).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakingEvent {
    Delegated { account: Address, validator: Address, amount: U256 },
    Undelegated { account: Address, validator: Address, amount: U256 },
    UndelegateConfirmed { account: Address, validator: Address, amount: U256 },
    UndelegateCancelled { account: Address, validator: Address, amount: U256 },
    Redelegated { account: Address, from: Address, to: Address, amount: U256 },
    RewardsClaimed { account: Address, validator: Address, amount: U256 },
    CommissionRewardsClaimed { account: Address, validator: Address, amount: U256 },
}

/// Decode call parameters of a transaction sent to the staking contract.
///
/// Returns `None` for other targets, unknown selectors, and inputs that
/// do not decode against the matched signature.
pub fn decode_call(staking_contract: Address, to: Option<Address>, input: &[u8]) -> Option<CallData> {
    if to != Some(staking_contract) || input.len() < 4 {
        return None;
    }
    let selector = &input[..4];
    let signature = STAKING_FUNCTIONS
        .iter()
        .find(|sig| &keccak256(sig.as_bytes())[..4] == selector)?;

    let open = signature.find('(')?;
    let name = &signature[..open];
    let params_type = DynSolType::parse(&signature[open..]).ok()?;

    let params = match params_type.abi_decode_params(&input[4..]).ok()? {
        DynSolValue::Tuple(values) => values.into_iter().map(to_decoded_value).collect(),
        other => vec![to_decoded_value(other)],
    };

    Some(CallData {
        name: name.to_string(),
        params,
    })
}

/// Render an ABI value as text, keeping nesting for arrays and tuples.
fn to_decoded_value(value: DynSolValue) -> DecodedValue {
    match value {
        DynSolValue::Bool(b) => DecodedValue::Scalar(b.to_string()),
        DynSolValue::Int(i, _) => DecodedValue::Scalar(i.to_string()),
        DynSolValue::Uint(u, _) => DecodedValue::Scalar(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            DecodedValue::Scalar(format!("0x{}", hex::encode(&word[..size])))
        }
        DynSolValue::Address(a) => DecodedValue::Scalar(format!("{:#x}", a)),
        DynSolValue::Function(f) => DecodedValue::Scalar(format!("0x{}", hex::encode(f.as_slice()))),
        DynSolValue::Bytes(b) => DecodedValue::Scalar(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => DecodedValue::Scalar(s),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            DecodedValue::List(values.into_iter().map(to_decoded_value).collect())
        }
        #[allow(unreachable_patterns)]
        other => DecodedValue::Scalar(format!("{:?}", other)),
    }
}

/// Decode a log emitted by the staking contract.
///
/// Returns `Ok(None)` for logs of other contracts and for unknown topics.
/// A known event with missing topics or short data is a decode error.
pub fn decode_log(log: &EventLog, staking_contract: Address) -> Result<Option<StakingEvent>, IndexError> {
    if log.address != staking_contract {
        return Ok(None);
    }
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };

    let topic = *topic0;
    let event = match topic {
        t if t == DELEGATED_TOPIC => {
            let (account, validator, amount) = two_accounts_and_amount(log, "Delegated")?;
            StakingEvent::Delegated { account, validator, amount }
        }
        t if t == UNDELEGATED_TOPIC || t == UNDELEGATED_V2_TOPIC => {
            let (account, validator, amount) = two_accounts_and_amount(log, "Undelegated")?;
            StakingEvent::Undelegated { account, validator, amount }
        }
        t if t == UNDELEGATE_CONFIRMED_TOPIC || t == UNDELEGATE_CONFIRMED_V2_TOPIC => {
            let (account, validator, amount) = two_accounts_and_amount(log, "UndelegateConfirmed")?;
            StakingEvent::UndelegateConfirmed { account, validator, amount }
        }
        t if t == UNDELEGATE_CANCELLED_TOPIC || t == UNDELEGATE_CANCELLED_V2_TOPIC => {
            let (account, validator, amount) = two_accounts_and_amount(log, "UndelegateCancelled")?;
            StakingEvent::UndelegateCancelled { account, validator, amount }
        }
        t if t == REDELEGATED_TOPIC => {
            let account = topic_address(log, 1, "Redelegated")?;
            let from = topic_address(log, 2, "Redelegated")?;
            let to = topic_address(log, 3, "Redelegated")?;
            let amount = last_word(log, "Redelegated")?;
            StakingEvent::Redelegated { account, from, to, amount }
        }
        t if t == REWARDS_CLAIMED_TOPIC => {
            let (account, validator, amount) = two_accounts_and_amount(log, "RewardsClaimed")?;
            StakingEvent::RewardsClaimed { account, validator, amount }
        }
        t if t == COMMISSION_REWARDS_CLAIMED_TOPIC => {
            let (account, validator, amount) =
                two_accounts_and_amount(log, "CommissionRewardsClaimed")?;
            StakingEvent::CommissionRewardsClaimed { account, validator, amount }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn two_accounts_and_amount(
    log: &EventLog,
    event: &str,
) -> Result<(Address, Address, U256), IndexError> {
    Ok((
        topic_address(log, 1, event)?,
        topic_address(log, 2, event)?,
        last_word(log, event)?,
    ))
}

/// Indexed address parameter: the low 20 bytes of a topic.
fn topic_address(log: &EventLog, index: usize, event: &str) -> Result<Address, IndexError> {
    log.topics
        .get(index)
        .map(|topic| Address::from_slice(&topic[12..]))
        .ok_or_else(|| IndexError::decode(format!("{} log", event), format!("missing topic {}", index)))
}

/// The amount is the last 32-byte word of the data section.
fn last_word(log: &EventLog, event: &str) -> Result<U256, IndexError> {
    if log.data.len() < 32 || log.data.len() % 32 != 0 {
        return Err(IndexError::decode(
            format!("{} log", event),
            format!("data length {} is not a non-empty multiple of 32", log.data.len()),
        ));
    }
    Ok(U256::from_be_slice(&log.data[log.data.len() - 32..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_hex_bytes;
    use alloy_primitives::address;

    const STAKING: Address = address!("00000000000000000000000000000000000000fe");

    fn log(topics: Vec<B256>, data: &str) -> EventLog {
        EventLog {
            address: STAKING,
            topics,
            data: parse_hex_bytes(data).unwrap(),
            log_index: Some(0),
        }
    }

    #[test]
    fn test_topic_constants_match_signatures() {
        let pairs = [
            ("Delegated(address,address,uint256)", DELEGATED_TOPIC),
            ("Undelegated(address,address,uint256)", UNDELEGATED_TOPIC),
            ("UndelegatedV2(address,address,uint64,uint256)", UNDELEGATED_V2_TOPIC),
            ("UndelegateConfirmed(address,address,uint256)", UNDELEGATE_CONFIRMED_TOPIC),
            ("UndelegateConfirmedV2(address,address,uint64,uint256)", UNDELEGATE_CONFIRMED_V2_TOPIC),
            ("UndelegateCancelled(address,address,uint256)", UNDELEGATE_CANCELLED_TOPIC),
            ("UndelegateCancelledV2(address,address,uint64,uint256)", UNDELEGATE_CANCELLED_V2_TOPIC),
            ("Redelegated(address,address,address,uint256)", REDELEGATED_TOPIC),
            ("RewardsClaimed(address,address,uint256)", REWARDS_CLAIMED_TOPIC),
            ("CommissionRewardsClaimed(address,address,uint256)", COMMISSION_REWARDS_CLAIMED_TOPIC),
        ];
        for (signature, topic) in pairs {
            assert_eq!(keccak256(signature.as_bytes()), topic, "{}", signature);
        }
    }

    #[test]
    fn test_decode_delegate_call() {
        let input =
            parse_hex_bytes("0x5c19a95c000000000000000000000000ed4d5f4f3641cbc056e466d15dbe2403e38056f8")
                .unwrap();
        let call = decode_call(STAKING, Some(STAKING), &input).unwrap();
        assert_eq!(call.name, "delegate");
        assert_eq!(
            call.params,
            vec![DecodedValue::Scalar("0xed4d5f4f3641cbc056e466d15dbe2403e38056f8".to_string())]
        );
    }

    #[test]
    fn test_decode_undelegate_call() {
        let mut input = parse_hex_bytes("0x4d99dd16").unwrap();
        input.extend_from_slice(&[0u8; 12]);
        input.extend_from_slice(address!("ed4d5f4f3641cbc056e466d15dbe2403e38056f8").as_slice());
        input.extend_from_slice(&U256::from(1_000u64).to_be_bytes::<32>());
        let call = decode_call(STAKING, Some(STAKING), &input).unwrap();
        assert_eq!(call.name, "undelegate");
        assert_eq!(call.params[1], DecodedValue::Scalar("1000".to_string()));
    }

    #[test]
    fn test_decode_call_ignores_other_targets_and_unknown_selectors() {
        let input =
            parse_hex_bytes("0x5c19a95c000000000000000000000000ed4d5f4f3641cbc056e466d15dbe2403e38056f8")
                .unwrap();
        let other = address!("0000000000000000000000000000000000000001");
        assert!(decode_call(STAKING, Some(other), &input).is_none());
        assert!(decode_call(STAKING, None, &input).is_none());
        assert!(decode_call(STAKING, Some(STAKING), &[0xde, 0xad, 0xbe, 0xef]).is_none());
        // truncated parameters
        assert!(decode_call(STAKING, Some(STAKING), &input[..20]).is_none());
    }

    #[test]
    fn test_decode_commission_rewards_claimed() {
        let event = decode_log(
            &log(
                vec![
                    COMMISSION_REWARDS_CLAIMED_TOPIC,
                    b256!("0000000000000000000000000dc0d841f962759da25547c686fa440cf6c28c61"),
                    b256!("000000000000000000000000ed4d5f4f3641cbc056e466d15dbe2403e38056f8"),
                ],
                "0x000000000000000000000000000000000000000000000000a7a44a964be1f30a",
            ),
            STAKING,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(StakingEvent::CommissionRewardsClaimed {
                account: address!("0dc0d841f962759da25547c686fa440cf6c28c61"),
                validator: address!("ed4d5f4f3641cbc056e466d15dbe2403e38056f8"),
                amount: U256::from(12079862109893161738u64),
            })
        );
    }

    #[test]
    fn test_unknown_topics_and_other_contracts_are_ignored() {
        let unknown = log(vec![B256::repeat_byte(0x11)], "0x");
        assert_eq!(decode_log(&unknown, STAKING).unwrap(), None);

        let mut foreign = log(vec![DELEGATED_TOPIC], "0x");
        foreign.address = address!("0000000000000000000000000000000000000001");
        assert_eq!(decode_log(&foreign, STAKING).unwrap(), None);
    }

    #[test]
    fn test_malformed_known_event_is_error() {
        let missing_topic = log(
            vec![REWARDS_CLAIMED_TOPIC],
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        );
        assert!(matches!(
            decode_log(&missing_topic, STAKING),
            Err(IndexError::Decode { .. })
        ));

        let short_data = log(
            vec![REWARDS_CLAIMED_TOPIC, B256::ZERO, B256::ZERO],
            "0x01",
        );
        assert!(decode_log(&short_data, STAKING).is_err());
    }

    #[test]
    fn test_v2_events_use_last_data_word() {
        let event = decode_log(
            &log(
                vec![
                    UNDELEGATE_CONFIRMED_V2_TOPIC,
                    b256!("0000000000000000000000001111111111111111111111111111111111111111"),
                    b256!("0000000000000000000000002222222222222222222222222222222222222222"),
                ],
                "0x00000000000000000000000000000000000000000000000000000000000000070000000000000000000000000000000000000000000000000000000000000064",
            ),
            STAKING,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(StakingEvent::UndelegateConfirmed {
                account: address!("1111111111111111111111111111111111111111"),
                validator: address!("2222222222222222222222222222222222222222"),
                amount: U256::from(100u64),
            })
        );
    }
}
