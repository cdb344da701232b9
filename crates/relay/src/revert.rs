//! Turns revert payloads of failed user operations into readable messages.

use std::fmt;

use alloy_primitives::{Address, B256, Bytes, U256, hex};
use alloy_sol_types::{Panic, Revert, SolError, SolInterface};
use chrono::DateTime;
use quarry_core::abi::IQuarryPaymaster::IQuarryPaymasterErrors as Errors;

/// Paymaster errors the relay knows how to explain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertKind {
    AllowanceBelowMinimum,
    InsufficientBalance,
    AllowancesLimitReached,
    NotAuthorized,
    PendingCooldown { pass_id: B256, user: Address, next_claim_at: u64 },
    /// `expired_at` is `None` when the user never held the pass.
    PassExpired { pass_id: B256, user: Address, expired_at: Option<u64> },
    InsufficientGrantorAllowance { grantor: Address },
    PassUnauthorized { pass_id: B256, caller: Address, grantor: Address },
    Other,
}

impl RevertKind {
    pub fn explanation(&self) -> Option<String> {
        let text = match self {
            Self::AllowanceBelowMinimum => "Allowance below minimum.".to_string(),
            Self::InsufficientBalance => {
                "Sponsor balance is not sufficient to grant allowance.".to_string()
            }
            Self::AllowancesLimitReached => {
                "User has reached the maximum number of allowances. Remove one and try again."
                    .to_string()
            }
            Self::NotAuthorized => "Not authorized to remove allowance.".to_string(),
            Self::PendingCooldown { pass_id, user, next_claim_at } => format!(
                "Next time user {user} can claim from pass {pass_id} is {}.",
                utc_string(*next_claim_at)
            ),
            Self::PassExpired { pass_id, user, expired_at: None } => {
                format!("User {user} doesn't have pass {pass_id}.")
            }
            Self::PassExpired { pass_id, user, expired_at: Some(at) } => {
                format!("User {user}'s pass {pass_id} expired on {}.", utc_string(*at))
            }
            Self::InsufficientGrantorAllowance { grantor } => {
                format!("Grantor {grantor} ran out of grant allowance.")
            }
            Self::PassUnauthorized { pass_id, grantor, .. } if grantor.is_zero() => {
                format!("Pass {pass_id} does not exist.")
            }
            Self::PassUnauthorized { pass_id, caller, .. } => {
                format!("Caller {caller} is not authorized to issue pass {pass_id}.")
            }
            Self::Other => return None,
        };
        Some(text)
    }
}

/// An ABI-decoded revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRevert {
    pub name: String,
    pub args: Vec<String>,
    pub kind: RevertKind,
}

impl fmt::Display for DecodedRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(", "))
    }
}

/// What went wrong with an included-but-failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertExplanation {
    /// `None` when the payload could not be decoded.
    pub decoded: Option<DecodedRevert>,
    /// Verb phrase used in the fallback message, e.g. "grant allowance".
    pub action: String,
    pub transaction_hash: B256,
}

impl RevertExplanation {
    pub fn kind(&self) -> Option<&RevertKind> {
        self.decoded.as_ref().map(|d| &d.kind)
    }
}

impl fmt::Display for RevertExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(decoded) = &self.decoded else {
            return write!(
                f,
                "Failed to {} for an unknown reason.\n\nTransaction hash: {}",
                self.action, self.transaction_hash
            );
        };
        write!(f, "{decoded}\n\n")?;
        if let Some(explanation) = decoded.kind.explanation() {
            write!(f, "{explanation}\n\n")?;
        }
        write!(f, "Transaction hash: {}", self.transaction_hash)
    }
}

/// Decodes reverts against the paymaster error ABI plus the builtin
/// `Error(string)` and `Panic(uint256)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertDecoder;

impl RevertDecoder {
    /// `reason` is the hex payload from the user operation receipt. Anything
    /// that is not hex or does not match a known error yields the generic message.
    pub fn explain(&self, reason: Option<&str>, action: &str, transaction_hash: B256) -> RevertExplanation {
        let decoded = reason
            .and_then(|r| hex::decode(r).ok())
            .and_then(|payload| self.decode(&Bytes::from(payload)));
        RevertExplanation { decoded, action: action.to_string(), transaction_hash }
    }

    pub fn decode(&self, payload: &[u8]) -> Option<DecodedRevert> {
        if let Ok(error) = Errors::abi_decode(payload) {
            return Some(decode_paymaster_error(error));
        }
        if let Ok(revert) = Revert::abi_decode(payload) {
            return Some(DecodedRevert {
                name: "Error".to_string(),
                args: vec![revert.reason],
                kind: RevertKind::Other,
            });
        }
        if let Ok(panic) = Panic::abi_decode(payload) {
            return Some(DecodedRevert {
                name: "Panic".to_string(),
                args: vec![panic.code.to_string()],
                kind: RevertKind::Other,
            });
        }
        None
    }
}

fn error_name<E: SolError>() -> String {
    E::SIGNATURE.split('(').next().unwrap_or(E::SIGNATURE).to_string()
}

fn decoded<E: SolError>(args: Vec<String>, kind: RevertKind) -> DecodedRevert {
    DecodedRevert { name: error_name::<E>(), args, kind }
}

fn seconds(value: U256) -> u64 {
    value.saturating_to()
}

fn decode_paymaster_error(error: Errors) -> DecodedRevert {
    use quarry_core::abi::IQuarryPaymaster::*;

    match error {
        Errors::AllowanceSystem_AllowanceBelowMinimum(e) => decoded::<AllowanceSystem_AllowanceBelowMinimum>(
            vec![e.allowance.to_string(), e.minAllowance.to_string()],
            RevertKind::AllowanceBelowMinimum,
        ),
        Errors::GrantSystem_AllowanceBelowMinimum(e) => decoded::<GrantSystem_AllowanceBelowMinimum>(
            vec![e.allowance.to_string(), e.minAllowance.to_string()],
            RevertKind::AllowanceBelowMinimum,
        ),
        Errors::AllowanceSystem_InsufficientBalance(e) => decoded::<AllowanceSystem_InsufficientBalance>(
            vec![e.balance.to_string(), e.allowance.to_string()],
            RevertKind::InsufficientBalance,
        ),
        Errors::GrantSystem_InsufficientBalance(e) => decoded::<GrantSystem_InsufficientBalance>(
            vec![e.balance.to_string(), e.allowance.to_string()],
            RevertKind::InsufficientBalance,
        ),
        Errors::AllowanceSystem_AllowancesLimitReached(e) => {
            decoded::<AllowanceSystem_AllowancesLimitReached>(
                vec![e.user.to_string(), e.length.to_string(), e.maxLength.to_string()],
                RevertKind::AllowancesLimitReached,
            )
        }
        Errors::GrantSystem_AllowancesLimitReached(e) => decoded::<GrantSystem_AllowancesLimitReached>(
            vec![e.user.to_string(), e.length.to_string(), e.maxLength.to_string()],
            RevertKind::AllowancesLimitReached,
        ),
        Errors::AllowanceSystem_NotAuthorized(e) => decoded::<AllowanceSystem_NotAuthorized>(
            vec![e.caller.to_string(), e.sponsor.to_string(), e.user.to_string()],
            RevertKind::NotAuthorized,
        ),
        Errors::PassSystem_PendingCooldown(e) => decoded::<PassSystem_PendingCooldown>(
            vec![
                e.passId.to_string(),
                e.claimInterval.to_string(),
                e.user.to_string(),
                e.lastClaimed.to_string(),
            ],
            RevertKind::PendingCooldown {
                pass_id: e.passId,
                user: e.user,
                next_claim_at: seconds(e.lastClaimed).saturating_add(seconds(e.claimInterval)),
            },
        ),
        Errors::PassSystem_PassExpired(e) => decoded::<PassSystem_PassExpired>(
            vec![
                e.passId.to_string(),
                e.validityPeriod.to_string(),
                e.user.to_string(),
                e.lastRenewed.to_string(),
            ],
            RevertKind::PassExpired {
                pass_id: e.passId,
                user: e.user,
                expired_at: (!e.lastRenewed.is_zero())
                    .then(|| seconds(e.lastRenewed).saturating_add(seconds(e.validityPeriod))),
            },
        ),
        Errors::PassSystem_InsufficientGrantorAllowance(e) => {
            decoded::<PassSystem_InsufficientGrantorAllowance>(
                vec![e.passId.to_string(), e.grantor.to_string()],
                RevertKind::InsufficientGrantorAllowance { grantor: e.grantor },
            )
        }
        Errors::PassSystem_Unauthorized(e) => decoded::<PassSystem_Unauthorized>(
            vec![e.passId.to_string(), e.caller.to_string(), e.grantor.to_string()],
            RevertKind::PassUnauthorized { pass_id: e.passId, caller: e.caller, grantor: e.grantor },
        ),
        Errors::SpenderSystem_AlreadyRegistered(e) => decoded::<SpenderSystem_AlreadyRegistered>(
            vec![e.spender.to_string(), e.user.to_string()],
            RevertKind::Other,
        ),
        Errors::World_AccessDenied(e) => decoded::<World_AccessDenied>(
            vec![e.resource, e.caller.to_string()],
            RevertKind::Other,
        ),
        Errors::World_ResourceNotFound(e) => decoded::<World_ResourceNotFound>(
            vec![e.resourceId.to_string(), e.resourceIdString],
            RevertKind::Other,
        ),
    }
}

/// Formats a unix timestamp the way HTTP dates look, e.g.
/// `Tue, 01 Oct 2024 12:00:00 GMT`.
pub fn utc_string(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_else(|| "Invalid Date".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};
    use quarry_core::abi::IQuarryPaymaster;

    const TX: B256 = b256!("abababababababababababababababababababababababababababababababab");

    fn hex_payload<E: SolError>(error: E) -> String {
        hex::encode_prefixed(error.abi_encode())
    }

    #[test]
    fn below_minimum_mentions_reason_and_transaction() {
        let payload = hex_payload(IQuarryPaymaster::GrantSystem_AllowanceBelowMinimum {
            allowance: U256::from(5),
            minAllowance: U256::from(10),
        });

        let explanation = RevertDecoder.explain(Some(&payload), "grant allowance", TX);
        assert_eq!(explanation.kind(), Some(&RevertKind::AllowanceBelowMinimum));
        let message = explanation.to_string();
        assert!(message.contains("below minimum"));
        assert!(message.contains(&TX.to_string()));
        assert_eq!(
            message,
            format!(
                "GrantSystem_AllowanceBelowMinimum(5, 10)\n\nAllowance below minimum.\n\nTransaction hash: {TX}"
            )
        );
    }

    #[test]
    fn undecodable_payload_falls_back_to_generic_message() {
        for reason in [None, Some("not hex"), Some("0xdeadbeef")] {
            let explanation = RevertDecoder.explain(reason, "claim allowance", TX);
            assert!(explanation.decoded.is_none());
            assert_eq!(
                explanation.to_string(),
                format!("Failed to claim allowance for an unknown reason.\n\nTransaction hash: {TX}")
            );
        }
    }

    #[test]
    fn expired_pass_distinguishes_never_held() {
        let user = address!("1111111111111111111111111111111111111111");
        let pass_id = B256::with_last_byte(7);
        let never = RevertDecoder
            .decode(
                &IQuarryPaymaster::PassSystem_PassExpired {
                    passId: pass_id,
                    validityPeriod: U256::from(60),
                    user,
                    lastRenewed: U256::ZERO,
                }
                .abi_encode(),
            )
            .unwrap();
        assert_eq!(never.kind.explanation().unwrap(), format!("User {user} doesn't have pass {pass_id}."));

        let expired = RevertDecoder
            .decode(
                &IQuarryPaymaster::PassSystem_PassExpired {
                    passId: pass_id,
                    validityPeriod: U256::from(60),
                    user,
                    lastRenewed: U256::from(1_727_784_000u64 - 60),
                }
                .abi_encode(),
            )
            .unwrap();
        assert_eq!(
            expired.kind.explanation().unwrap(),
            format!("User {user}'s pass {pass_id} expired on Tue, 01 Oct 2024 12:00:00 GMT.")
        );
    }

    #[test]
    fn cooldown_reports_next_claim_time() {
        let decoded = RevertDecoder
            .decode(
                &IQuarryPaymaster::PassSystem_PendingCooldown {
                    passId: B256::ZERO,
                    claimInterval: U256::from(3_600),
                    user: Address::ZERO,
                    lastClaimed: U256::from(1_727_784_000u64 - 3_600),
                }
                .abi_encode(),
            )
            .unwrap();
        assert_eq!(decoded.name, "PassSystem_PendingCooldown");
        assert!(decoded.kind.explanation().unwrap().ends_with("is Tue, 01 Oct 2024 12:00:00 GMT."));
    }

    #[test]
    fn unauthorized_issuer_of_missing_pass() {
        let pass_id = B256::with_last_byte(1);
        let caller = address!("2222222222222222222222222222222222222222");
        let missing = RevertKind::PassUnauthorized { pass_id, caller, grantor: Address::ZERO };
        assert_eq!(missing.explanation().unwrap(), format!("Pass {pass_id} does not exist."));

        let foreign = RevertKind::PassUnauthorized { pass_id, caller, grantor: caller };
        assert_eq!(
            foreign.explanation().unwrap(),
            format!("Caller {caller} is not authorized to issue pass {pass_id}.")
        );
    }

    #[test]
    fn known_errors_without_template_keep_name_and_args() {
        let payload = hex_payload(IQuarryPaymaster::World_AccessDenied {
            resource: "ns:quarry".to_string(),
            caller: Address::ZERO,
        });
        let message = RevertDecoder.explain(Some(&payload), "register namespace", TX).to_string();
        assert_eq!(
            message,
            format!("World_AccessDenied(ns:quarry, {})\n\nTransaction hash: {TX}", Address::ZERO)
        );
    }

    #[test]
    fn builtin_error_string_is_surfaced() {
        let payload = Revert { reason: "nope".to_string() }.abi_encode();
        let decoded = RevertDecoder.decode(&payload).unwrap();
        assert_eq!(decoded.to_string(), "Error(nope)");
    }
}
