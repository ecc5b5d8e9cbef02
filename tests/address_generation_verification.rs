//! 地址生成算法验证测试
//!
//! 使用 BIP39 标准测试向量验证地址派生与主流钱包一致

mod common;

use common::{test_app_state, TEST_ADDRESS, TEST_MNEMONIC};
use ethers::utils::to_checksum;
use ironvault::{
    domain::{derivation::AddressEncoding, derivation_path::DerivationPath, KeyDerivation},
    service::Credential,
    EngineError,
};

/// 测试向量：
/// - Mnemonic: "abandon ×11 about"
/// - m/44'/60'/0'/0/{0,1,2}
const EXPECTED_EVM: [&str; 3] = [
    "0x9858EfFD232B4033E47d90003D41EC34EcaEda94",
    "0x6Fac4D18c912343BF86fa7049364Dd4E424Ab9C0",
    "0xb6716976A3ebe8D39aCEB04372f22Ff8e6802D7A",
];

#[test]
fn test_ethereum_address_generation_bip39_vector() {
    let path = DerivationPath::parse("m/44'/60'/0'/0/0").unwrap();
    let address = KeyDerivation::new()
        .derive_address(TEST_MNEMONIC, &path)
        .unwrap();
    assert_eq!(to_checksum(&address, None), TEST_ADDRESS);
}

#[test]
fn test_derivation_is_deterministic() {
    let path = DerivationPath::default_evm();
    let first = KeyDerivation::new()
        .derive_signing_key(TEST_MNEMONIC, &path)
        .unwrap();
    for _ in 0..5 {
        let again = KeyDerivation::new()
            .derive_signing_key(TEST_MNEMONIC, &path)
            .unwrap();
        assert_eq!(first.address(), again.address());
    }
}

#[test]
fn test_multi_chain_vectors() {
    let kd = KeyDerivation::new();

    let btc = kd
        .derive_chain_address(
            TEST_MNEMONIC,
            &DerivationPath::parse("m/84'/0'/0'/0/0").unwrap(),
            AddressEncoding::BitcoinSegwit,
        )
        .unwrap();
    assert_eq!(btc, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");

    let sol = kd
        .derive_chain_address(
            TEST_MNEMONIC,
            &DerivationPath::parse("m/44'/501'/0'/0'").unwrap(),
            AddressEncoding::Solana,
        )
        .unwrap();
    assert_eq!(sol, "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk");

    let evm = kd
        .derive_chain_address(
            TEST_MNEMONIC,
            &DerivationPath::default_evm(),
            AddressEncoding::Evm,
        )
        .unwrap();
    assert_eq!(evm, TEST_ADDRESS);
}

#[tokio::test]
async fn test_derive_addresses_through_session() {
    let (state, _networks) = test_app_state();
    let opened = state.wallet.open_session(TEST_MNEMONIC, None).await.unwrap();

    let addresses = state
        .wallet
        .derive_addresses(&Credential::session(&opened.session_id), None, Some(0), Some(3))
        .await
        .unwrap();

    let rendered: Vec<String> = addresses.iter().map(|a| to_checksum(a, None)).collect();
    assert_eq!(rendered, EXPECTED_EVM);
}

#[tokio::test]
async fn test_derive_addresses_with_mnemonic_and_offset() {
    let (state, _networks) = test_app_state();
    let addresses = state
        .wallet
        .derive_addresses(&Credential::mnemonic(TEST_MNEMONIC), None, Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(to_checksum(&addresses[0], None), EXPECTED_EVM[1]);
    assert_eq!(to_checksum(&addresses[1], None), EXPECTED_EVM[2]);

    // 默认只派生一个
    let single = state
        .wallet
        .derive_addresses(&Credential::mnemonic(TEST_MNEMONIC), None, None, None)
        .await
        .unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(to_checksum(&single[0], None), EXPECTED_EVM[0]);
}

#[tokio::test]
async fn test_invalid_mnemonic_rejected_before_derivation() {
    let (state, _networks) = test_app_state();
    let err = state
        .wallet
        .derive_addresses(
            &Credential::mnemonic("abandon abandon abandon"),
            None,
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidMnemonic(_)));
    assert!(err.is_client_error());
}
