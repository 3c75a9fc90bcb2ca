//! Contract ABI definitions and topic hash computation.
//!
//! Minimal interfaces covering the oracle, its token and governance: the
//! events we filter on plus the reads and writes the disputer needs.

use alloy::primitives::{b256, B256};
use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ITellorOracle {
        event NewReport(
            bytes32 indexed _queryId,
            uint256 indexed _time,
            bytes _value,
            uint256 _nonce,
            bytes _queryData,
            address indexed _reporter
        );

        function getStakeAmount() external view returns (uint256);
    }

    #[sol(rpc)]
    interface ITellorToken {
        event NewOracleAddress(address _newOracle, uint256 _timestamp);
        event NewProposedOracleAddress(address _newProposedOracle, uint256 _timestamp);

        function balanceOf(address _user) external view returns (uint256);
        function approve(address _spender, uint256 _amount) external returns (bool);
    }

    #[sol(rpc)]
    interface IGovernance {
        function getDisputeFee() external view returns (uint256);
        function getVoteRounds(bytes32 _hash) external view returns (uint256[] memory);
        function getOpenDisputesOnId(bytes32 _queryId) external view returns (uint256);
        function beginDispute(bytes32 _queryId, uint256 _timestamp) external;
    }
}

// ─── Event topic0 hashes (keccak256 of event signature) ──────────────────────

/// keccak256("NewReport(bytes32,uint256,bytes,uint256,bytes,address)")
pub const NEW_REPORT_TOPIC: B256 =
    b256!("48e9e2c732ba278de6ac88a3a57a5c5ba13d3d8370e709b3b98333a57876ca95");

/// keccak256("NewOracleAddress(address,uint256)")
pub const NEW_ORACLE_ADDRESS_TOPIC: B256 =
    b256!("31f30a38b53d085dbe09f68f490447e9032b29de8deb5aae4ccd3577a09ff284");

/// keccak256("NewProposedOracleAddress(address,uint256)")
pub const NEW_PROPOSED_ORACLE_ADDRESS_TOPIC: B256 =
    b256!("8fe6b09081e9ffdaf91e337aba6769019098771106b34b194f1781b7db1bf42b");

/// Compute keccak256 hash of a byte slice.
pub fn keccak256(data: &[u8]) -> B256 {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// `keccak256(abi.encodePacked(queryId, timestamp))`, the key of a dispute's vote rounds.
pub fn dispute_hash(query_id: B256, timestamp: u64) -> B256 {
    let mut packed = [0u8; 64];
    packed[..32].copy_from_slice(query_id.as_slice());
    packed[56..].copy_from_slice(&timestamp.to_be_bytes());
    keccak256(&packed)
}

/// Verify that our pre-computed topic hashes match the event signatures.
/// Call this at startup to catch any signature mismatches.
pub fn verify_topic_hashes() -> Vec<(String, bool)> {
    let checks = [
        (
            "NewReport(bytes32,uint256,bytes,uint256,bytes,address)",
            NEW_REPORT_TOPIC,
        ),
        ("NewOracleAddress(address,uint256)", NEW_ORACLE_ADDRESS_TOPIC),
        (
            "NewProposedOracleAddress(address,uint256)",
            NEW_PROPOSED_ORACLE_ADDRESS_TOPIC,
        ),
    ];

    checks
        .into_iter()
        .map(|(sig, expected)| (sig.to_string(), keccak256(sig.as_bytes()) == expected))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_topic_hashes_match_signatures() {
        for (sig, ok) in verify_topic_hashes() {
            assert!(ok, "topic mismatch for {sig}");
        }
    }

    #[test]
    fn test_topics_agree_with_sol_bindings() {
        assert_eq!(ITellorOracle::NewReport::SIGNATURE_HASH, NEW_REPORT_TOPIC);
        assert_eq!(
            ITellorToken::NewOracleAddress::SIGNATURE_HASH,
            NEW_ORACLE_ADDRESS_TOPIC
        );
        assert_eq!(
            ITellorToken::NewProposedOracleAddress::SIGNATURE_HASH,
            NEW_PROPOSED_ORACLE_ADDRESS_TOPIC
        );
    }

    #[test]
    fn test_dispute_hash_packs_id_and_timestamp() {
        let id = B256::repeat_byte(0xab);
        let mut packed = id.to_vec();
        packed.extend_from_slice(&[0u8; 24]);
        packed.extend_from_slice(&1_700_000_000u64.to_be_bytes());
        assert_eq!(dispute_hash(id, 1_700_000_000), keccak256(&packed));
        assert_ne!(dispute_hash(id, 1), dispute_hash(id, 2));
    }
}
