//! Lookup table over chain metadata and per-chain settings.

use std::collections::HashMap;

use crate::{Address, ChainId, ChainInfo, ChainSettings, Token, TypesError};

/// Immutable registry of every chain the maker settles on.
///
/// The native currency of each chain is always present in its token list
/// (inserted first when the source document omits it) and flagged native.
#[derive(Clone, Debug, Default)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, ChainInfo>,
    settings: HashMap<ChainId, ChainSettings>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainInfo>) -> Self {
        let chains = chains
            .into_iter()
            .map(|mut info| {
                let native = info.native_currency.address.clone();
                info.native_currency.is_native = true;
                for token in info.tokens.iter_mut() {
                    if token.address == native {
                        token.is_native = true;
                    }
                }
                if !info.tokens.iter().any(|t| t.address == native) {
                    info.tokens.insert(0, info.native_currency.clone());
                }
                (info.chain_id.clone(), info)
            })
            .collect();
        Self {
            chains,
            settings: HashMap::new(),
        }
    }

    /// Parse a JSON array of [`ChainInfo`] documents.
    pub fn from_json_str(s: &str) -> Result<Self, TypesError> {
        let chains: Vec<ChainInfo> =
            serde_json::from_str(s).map_err(|e| TypesError::Registry(e.to_string()))?;
        Ok(Self::new(chains))
    }

    /// Attach per-chain settings; chains without an entry use the defaults.
    pub fn with_settings(mut self, settings: HashMap<ChainId, ChainSettings>) -> Self {
        self.settings = settings;
        self
    }

    pub fn chain_info(&self, chain: &ChainId) -> Option<&ChainInfo> {
        self.chains.get(chain)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &ChainId> {
        self.chains.keys()
    }

    pub fn token_by_symbol(&self, chain: &ChainId, symbol: &str) -> Option<&Token> {
        self.chains
            .get(chain)?
            .tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn token_by_address(&self, chain: &ChainId, address: &Address) -> Option<&Token> {
        self.chains
            .get(chain)?
            .tokens
            .iter()
            .find(|t| &t.address == address)
    }

    pub fn is_native_token(&self, chain: &ChainId, address: &Address) -> bool {
        self.chains
            .get(chain)
            .is_some_and(|info| &info.native_currency.address == address)
    }

    pub fn settings(&self, chain: &ChainId) -> ChainSettings {
        self.settings.get(chain).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAINS: &str = r#"[
        {
            "chain_id": "1",
            "name": "Ethereum",
            "native_currency": {
                "symbol": "ETH",
                "address": "0x0000000000000000000000000000000000000000",
                "decimals": 18
            },
            "tokens": [
                {
                    "symbol": "USDT",
                    "address": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                    "decimals": 6
                }
            ]
        }
    ]"#;

    #[test]
    fn native_currency_is_indexed_first() {
        let registry = ChainRegistry::from_json_str(CHAINS).unwrap();
        let info = registry.chain_info(&ChainId::new("1")).unwrap();
        assert_eq!(info.tokens.len(), 2);
        assert!(info.tokens[0].is_native);
        assert_eq!(info.tokens[0].symbol, "ETH");
    }

    #[test]
    fn token_lookup_is_case_insensitive() {
        let registry = ChainRegistry::from_json_str(CHAINS).unwrap();
        let chain = ChainId::new("1");
        let usdt = registry.token_by_symbol(&chain, "usdt").unwrap();
        assert_eq!(usdt.decimals, 6);
        let by_addr = registry
            .token_by_address(&chain, &usdt.address.clone())
            .unwrap();
        assert_eq!(by_addr.symbol, "USDT");
    }

    #[test]
    fn native_token_detection() {
        let registry = ChainRegistry::from_json_str(CHAINS).unwrap();
        let chain = ChainId::new("1");
        assert!(registry.is_native_token(&chain, &Address::zero()));
        let usdt = registry.token_by_symbol(&chain, "USDT").unwrap().address.clone();
        assert!(!registry.is_native_token(&chain, &usdt));
    }

    #[test]
    fn unknown_chain_uses_default_settings() {
        let registry = ChainRegistry::from_json_str(CHAINS).unwrap();
        assert_eq!(registry.settings(&ChainId::new("10")), ChainSettings::default());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(ChainRegistry::from_json_str("{").is_err());
    }
}
