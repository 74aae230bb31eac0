use proptest::prelude::*;

use maker_types::{from_raw, to_raw, Address, ChainId, PoolKey, Timestamp};

proptest! {
    /// Raw amounts that fit a Decimal survive conversion to human units and back.
    #[test]
    fn raw_amount_survives_human_conversion(raw in 0u128..(1u128 << 90), decimals in 0u32..=18) {
        let human = from_raw(raw, decimals).unwrap();
        prop_assert_eq!(to_raw(human, decimals).unwrap(), raw);
    }

    /// Address parsing is case-insensitive.
    #[test]
    fn address_parse_ignores_case(body in "[0-9a-fA-F]{40}") {
        let upper = Address::parse(&format!("0x{}", body.to_uppercase())).unwrap();
        let lower = Address::parse(&format!("0x{}", body.to_lowercase())).unwrap();
        prop_assert_eq!(upper, lower);
    }

    /// Pool keys built from differently-cased symbols are identical.
    #[test]
    fn pool_key_symbol_case_insensitive(symbol in "[a-zA-Z]{2,6}") {
        let signer = Address::parse("0x0000000000000000000000000000000000000001").unwrap();
        let a = PoolKey::new(ChainId::new("1"), signer.clone(), &symbol.to_uppercase());
        let b = PoolKey::new(ChainId::new("1"), signer, &symbol.to_lowercase());
        prop_assert_eq!(a, b);
    }

    /// has_expired agrees with elapsed_since.
    #[test]
    fn timestamp_expiry_matches_elapsed(start in 0u64..1_000_000, elapsed in 0u64..1_000_000, window in 0u64..1_000_000) {
        let t = Timestamp::from_millis(start);
        let now = Timestamp::from_millis(start + elapsed);
        prop_assert_eq!(t.elapsed_since(now), elapsed);
        prop_assert_eq!(t.has_expired(window, now), elapsed >= window);
    }
}
