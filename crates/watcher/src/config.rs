use crate::decimals::{DecimalTable, RawDecimals};
use crate::error::ConfigError;
use crate::gas::GasSpeed;
use chainrelay_types::defaults::{
    DEFAULT_BLOCK_CONFIRMATIONS, DEFAULT_BLOCK_RETRY_INTERVAL_MS, DEFAULT_GAS_LIMIT,
    DEFAULT_GAS_MULTIPLIER, DEFAULT_MAX_GAS_PRICE, DEFAULT_MIN_GAS_PRICE,
};
use chainrelay_types::{parse_address, Address, ChainId, ZERO_ADDRESS};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const BRIDGE_OPT: &str = "bridge";
pub const ERC20_HANDLER_OPT: &str = "erc20Handler";
pub const ERC721_HANDLER_OPT: &str = "erc721Handler";
pub const GENERIC_HANDLER_OPT: &str = "genericHandler";
pub const MAX_GAS_PRICE_OPT: &str = "maxGasPrice";
pub const MIN_GAS_PRICE_OPT: &str = "minGasPrice";
pub const GAS_LIMIT_OPT: &str = "gasLimit";
pub const GAS_MULTIPLIER_OPT: &str = "gasMultiplier";
pub const HTTP_OPT: &str = "http";
pub const START_BLOCK_OPT: &str = "startBlock";
pub const BLOCK_CONFIRMATIONS_OPT: &str = "blockConfirmations";
pub const BLOCK_RETRY_INTERVAL_OPT: &str = "blockSuccessRetryInterval";
pub const EGS_API_KEY_OPT: &str = "egsApiKey";
pub const EGS_SPEED_OPT: &str = "egsSpeed";

/// Chain entry as loaded from the configuration file: identity fields plus
/// loosely typed `opts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawChainConfig {
    pub name: String,
    pub id: u8,
    pub endpoint: String,
    /// Address of the relayer key.
    pub from: String,
    #[serde(default)]
    pub keystore_path: PathBuf,
    #[serde(default)]
    pub blockstore_path: PathBuf,
    /// Ignore any stored cursor and start from `startBlock`.
    #[serde(default)]
    pub fresh_start: bool,
    /// Start from the current chain head, overriding everything else.
    #[serde(default)]
    pub latest_block: bool,
    #[serde(default)]
    pub decimals: RawDecimals,
    #[serde(default)]
    pub opts: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub chains: Vec<RawChainConfig>,
}

/// Validated runtime parameters of one chain. Immutable once built.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub id: ChainId,
    pub endpoint: String,
    pub from: String,
    pub keystore_path: PathBuf,
    pub blockstore_path: PathBuf,
    pub fresh_start: bool,
    pub latest_block: bool,
    pub bridge_contract: Address,
    pub erc20_handler_contract: Address,
    pub erc721_handler_contract: Address,
    pub generic_handler_contract: Address,
    pub gas_limit: BigUint,
    pub max_gas_price: BigUint,
    pub min_gas_price: BigUint,
    pub gas_multiplier: f64,
    pub http: bool,
    pub start_block: u64,
    pub block_confirmations: u64,
    pub block_retry_interval_ms: u64,
    pub decimals: DecimalTable,
    pub egs_api_key: Option<String>,
    pub egs_speed: GasSpeed,
}

impl ChainConfig {
    /// Builds a config from `raw`. Options are consumed from a private copy of
    /// `raw.opts`; whatever is left over afterwards is rejected.
    pub fn from_raw(raw: &RawChainConfig) -> Result<Self, ConfigError> {
        let mut opts = raw.opts.clone();

        let bridge_contract = match opts.remove(BRIDGE_OPT) {
            Some(value) if !value.is_empty() => parse_contract(BRIDGE_OPT, &value)?,
            _ => return Err(ConfigError::MissingBridge),
        };
        if bridge_contract == ZERO_ADDRESS {
            return Err(ConfigError::ZeroBridgeAddress);
        }

        let erc20_handler_contract = take_contract(&mut opts, ERC20_HANDLER_OPT)?;
        let erc721_handler_contract = take_contract(&mut opts, ERC721_HANDLER_OPT)?;
        let generic_handler_contract = take_contract(&mut opts, GENERIC_HANDLER_OPT)?;

        let max_gas_price = take_uint(&mut opts, MAX_GAS_PRICE_OPT)?
            .unwrap_or_else(|| BigUint::from(DEFAULT_MAX_GAS_PRICE));
        let min_gas_price = take_uint(&mut opts, MIN_GAS_PRICE_OPT)?
            .unwrap_or_else(|| BigUint::from(DEFAULT_MIN_GAS_PRICE));
        let gas_limit = take_uint(&mut opts, GAS_LIMIT_OPT)?
            .unwrap_or_else(|| BigUint::from(DEFAULT_GAS_LIMIT));

        let gas_multiplier = match opts.remove(GAS_MULTIPLIER_OPT) {
            Some(value) => value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|m| m.is_finite())
                .ok_or(ConfigError::InvalidFloat {
                    option: GAS_MULTIPLIER_OPT,
                    value,
                })?,
            None => DEFAULT_GAS_MULTIPLIER,
        };

        // Only the exact literals are consumed; anything else stays behind and
        // is reported with the other unknown options.
        let http = match opts.get(HTTP_OPT).map(String::as_str) {
            Some("true") => {
                opts.remove(HTTP_OPT);
                true
            }
            Some("false") => {
                opts.remove(HTTP_OPT);
                false
            }
            _ => false,
        };

        let start_block = take_u64_or_default(&mut opts, START_BLOCK_OPT, 0)?;
        let block_confirmations =
            take_u64_or_default(&mut opts, BLOCK_CONFIRMATIONS_OPT, DEFAULT_BLOCK_CONFIRMATIONS)?;
        let block_retry_interval_ms = take_u64_or_default(
            &mut opts,
            BLOCK_RETRY_INTERVAL_OPT,
            DEFAULT_BLOCK_RETRY_INTERVAL_MS,
        )?;
        if block_retry_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                option: BLOCK_RETRY_INTERVAL_OPT,
            });
        }

        let egs_api_key = opts.remove(EGS_API_KEY_OPT).filter(|key| !key.is_empty());
        let egs_speed = opts
            .remove(EGS_SPEED_OPT)
            .and_then(|speed| speed.parse::<GasSpeed>().ok())
            .unwrap_or_default();

        if !opts.is_empty() {
            let mut unknown: Vec<String> = opts.into_keys().collect();
            unknown.sort();
            return Err(ConfigError::UnknownOptions(unknown));
        }

        let decimals = DecimalTable::from_raw(&raw.decimals)?;

        Ok(Self {
            name: raw.name.clone(),
            id: ChainId(raw.id),
            endpoint: raw.endpoint.clone(),
            from: raw.from.clone(),
            keystore_path: raw.keystore_path.clone(),
            blockstore_path: raw.blockstore_path.clone(),
            fresh_start: raw.fresh_start,
            latest_block: raw.latest_block,
            bridge_contract,
            erc20_handler_contract,
            erc721_handler_contract,
            generic_handler_contract,
            gas_limit,
            max_gas_price,
            min_gas_price,
            gas_multiplier,
            http,
            start_block,
            block_confirmations,
            block_retry_interval_ms,
            decimals,
            egs_api_key,
            egs_speed,
        })
    }

    pub fn block_retry_interval(&self) -> Duration {
        Duration::from_millis(self.block_retry_interval_ms)
    }
}

fn parse_contract(option: &'static str, value: &str) -> Result<Address, ConfigError> {
    parse_address(value).map_err(|e| ConfigError::InvalidAddress {
        option,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Handler addresses are optional; absent or empty means "not deployed".
fn take_contract(opts: &mut HashMap<String, String>, option: &'static str) -> Result<Address, ConfigError> {
    match opts.remove(option) {
        Some(value) if !value.is_empty() => parse_contract(option, &value),
        _ => Ok(ZERO_ADDRESS),
    }
}

fn take_uint(opts: &mut HashMap<String, String>, option: &'static str) -> Result<Option<BigUint>, ConfigError> {
    match opts.remove(option) {
        Some(value) => parse_uint256_or_hex(&value)
            .map(Some)
            .ok_or(ConfigError::InvalidNumber { option, value }),
        None => Ok(None),
    }
}

/// Absent or empty falls back to `default`; a present but malformed value is an error.
fn take_u64_or_default(
    opts: &mut HashMap<String, String>,
    option: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match opts.remove(option) {
        Some(value) if !value.is_empty() => {
            parse_u64_or_hex(&value).ok_or(ConfigError::InvalidNumber { option, value })
        }
        _ => Ok(default),
    }
}

/// Splits off an optional `0x` prefix and checks that only digits of the
/// matching radix remain. Signs and `_` separators are rejected.
fn integer_digits(value: &str) -> Option<(&str, u32)> {
    let (digits, radix) = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => (digits, 16),
        None => (value, 10),
    };
    let valid = !digits.is_empty() && digits.chars().all(|c| c.is_digit(radix));
    valid.then_some((digits, radix))
}

/// Parses a base-10 or `0x`-prefixed hex integer that fits in 256 bits.
pub fn parse_uint256_or_hex(value: &str) -> Option<BigUint> {
    let (digits, radix) = integer_digits(value)?;
    let parsed = BigUint::parse_bytes(digits.as_bytes(), radix)?;
    if parsed.bits() > 256 {
        return None;
    }
    Some(parsed)
}

fn parse_u64_or_hex(value: &str) -> Option<u64> {
    let (digits, radix) = integer_digits(value)?;
    u64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
impl RawChainConfig {
    pub(crate) fn for_test() -> Self {
        let mut opts = HashMap::new();
        opts.insert(
            BRIDGE_OPT.to_string(),
            "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B".to_string(),
        );
        Self {
            name: "ethereum".to_string(),
            id: 1,
            endpoint: "http://localhost:8545".to_string(),
            from: "0xff93B45308FD417dF303D6515aB04D9e89a750Ca".to_string(),
            opts,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrelay_types::ResourceId;

    fn with_opt(key: &str, value: &str) -> RawChainConfig {
        let mut raw = RawChainConfig::for_test();
        raw.opts.insert(key.to_string(), value.to_string());
        raw
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ChainConfig::from_raw(&RawChainConfig::for_test()).unwrap();

        assert_eq!(config.id, ChainId(1));
        assert_eq!(config.erc20_handler_contract, ZERO_ADDRESS);
        assert_eq!(config.gas_limit, BigUint::from(DEFAULT_GAS_LIMIT));
        assert_eq!(config.max_gas_price, BigUint::from(DEFAULT_MAX_GAS_PRICE));
        assert_eq!(config.min_gas_price, BigUint::from(0u32));
        assert_eq!(config.gas_multiplier, 1.0);
        assert!(!config.http);
        assert_eq!(config.start_block, 0);
        assert_eq!(config.block_confirmations, 10);
        assert_eq!(config.block_retry_interval(), Duration::from_millis(400));
        assert_eq!(config.egs_api_key, None);
        assert_eq!(config.egs_speed, GasSpeed::Average);
    }

    #[test]
    fn test_full_config() {
        let mut raw = RawChainConfig::for_test();
        let opts = [
            (ERC20_HANDLER_OPT, "0x3167776db165D8eA0f51790CA2bbf44Db5105ADF"),
            (ERC721_HANDLER_OPT, "0x3f709398808af36ADBA86ACC617FeB7F5B7B193E"),
            (GENERIC_HANDLER_OPT, "0x2B6Ab4b880A45a07d83Cf4d664Df4Ab85705Bc07"),
            (GAS_LIMIT_OPT, "0x2710"),
            (MAX_GAS_PRICE_OPT, "100"),
            (MIN_GAS_PRICE_OPT, "10"),
            (GAS_MULTIPLIER_OPT, "1.25"),
            (HTTP_OPT, "true"),
            (START_BLOCK_OPT, "10"),
            (BLOCK_CONFIRMATIONS_OPT, "5"),
            (BLOCK_RETRY_INTERVAL_OPT, "1000"),
            (EGS_API_KEY_OPT, "secret"),
            (EGS_SPEED_OPT, "fastest"),
        ];
        for (k, v) in opts {
            raw.opts.insert(k.to_string(), v.to_string());
        }

        let config = ChainConfig::from_raw(&raw).unwrap();
        assert_eq!(config.erc20_handler_contract[0], 0x31);
        assert_eq!(config.erc721_handler_contract[19], 0x3e);
        assert_eq!(config.gas_limit, BigUint::from(10_000u32));
        assert_eq!(config.max_gas_price, BigUint::from(100u32));
        assert_eq!(config.min_gas_price, BigUint::from(10u32));
        assert_eq!(config.gas_multiplier, 1.25);
        assert!(config.http);
        assert_eq!(config.start_block, 10);
        assert_eq!(config.block_confirmations, 5);
        assert_eq!(config.block_retry_interval_ms, 1000);
        assert_eq!(config.egs_api_key.as_deref(), Some("secret"));
        assert_eq!(config.egs_speed, GasSpeed::Fastest);
    }

    #[test]
    fn test_caller_options_are_not_mutated() {
        let raw = with_opt(GAS_LIMIT_OPT, "100");
        ChainConfig::from_raw(&raw).unwrap();
        assert_eq!(raw.opts.len(), 2);
    }

    #[test]
    fn test_missing_bridge_fails() {
        let mut raw = RawChainConfig::for_test();
        raw.opts.remove(BRIDGE_OPT);
        assert_eq!(ChainConfig::from_raw(&raw).unwrap_err(), ConfigError::MissingBridge);

        let raw = with_opt(BRIDGE_OPT, "");
        assert_eq!(ChainConfig::from_raw(&raw).unwrap_err(), ConfigError::MissingBridge);
    }

    #[test]
    fn test_zero_bridge_fails() {
        let raw = with_opt(BRIDGE_OPT, "0x0000000000000000000000000000000000000000");
        assert_eq!(ChainConfig::from_raw(&raw).unwrap_err(), ConfigError::ZeroBridgeAddress);
    }

    #[test]
    fn test_unknown_option_is_named() {
        let raw = with_opt("foo", "bar");
        assert_eq!(
            ChainConfig::from_raw(&raw).unwrap_err(),
            ConfigError::UnknownOptions(vec!["foo".to_string()])
        );
    }

    #[test]
    fn test_all_unknown_options_are_listed() {
        let mut raw = with_opt("zeta", "1");
        raw.opts.insert("alpha".to_string(), "2".to_string());
        let err = ChainConfig::from_raw(&raw).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownOptions(vec!["alpha".to_string(), "zeta".to_string()])
        );
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_malformed_numbers_name_the_option() {
        for option in [MAX_GAS_PRICE_OPT, MIN_GAS_PRICE_OPT, GAS_LIMIT_OPT, START_BLOCK_OPT] {
            let raw = with_opt(option, "12abc");
            match ChainConfig::from_raw(&raw) {
                Err(ConfigError::InvalidNumber { option: named, .. }) => assert_eq!(named, option),
                other => panic!("Expected InvalidNumber for {}, got {:?}", option, other),
            }
        }
    }

    #[test]
    fn test_gas_price_above_256_bits_fails() {
        let too_big = format!("0x1{}", "0".repeat(64));
        let raw = with_opt(MAX_GAS_PRICE_OPT, &too_big);
        assert!(matches!(
            ChainConfig::from_raw(&raw),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_malformed_multiplier_fails() {
        let raw = with_opt(GAS_MULTIPLIER_OPT, "one");
        assert!(matches!(
            ChainConfig::from_raw(&raw),
            Err(ConfigError::InvalidFloat { .. })
        ));
    }

    #[test]
    fn test_empty_confirmations_and_interval_use_defaults() {
        let mut raw = with_opt(BLOCK_CONFIRMATIONS_OPT, "");
        raw.opts.insert(BLOCK_RETRY_INTERVAL_OPT.to_string(), "".to_string());
        raw.opts.insert(START_BLOCK_OPT.to_string(), "".to_string());

        let config = ChainConfig::from_raw(&raw).unwrap();
        assert_eq!(config.block_confirmations, DEFAULT_BLOCK_CONFIRMATIONS);
        assert_eq!(config.block_retry_interval_ms, DEFAULT_BLOCK_RETRY_INTERVAL_MS);
        assert_eq!(config.start_block, 0);
    }

    #[test]
    fn test_unparsable_confirmations_fail() {
        let raw = with_opt(BLOCK_CONFIRMATIONS_OPT, "ten");
        match ChainConfig::from_raw(&raw) {
            Err(ConfigError::InvalidNumber { option, .. }) => assert_eq!(option, BLOCK_CONFIRMATIONS_OPT),
            other => panic!("Expected InvalidNumber, got {:?}", other),
        }

        let raw = with_opt(BLOCK_RETRY_INTERVAL_OPT, "-1");
        assert!(ChainConfig::from_raw(&raw).is_err());
    }

    #[test]
    fn test_http_accepts_only_literals() {
        let config = ChainConfig::from_raw(&with_opt(HTTP_OPT, "false")).unwrap();
        assert!(!config.http);

        let err = ChainConfig::from_raw(&with_opt(HTTP_OPT, "TRUE")).unwrap_err();
        assert_eq!(err, ConfigError::UnknownOptions(vec![HTTP_OPT.to_string()]));
    }

    #[test]
    fn test_speed_membership() {
        let config = ChainConfig::from_raw(&with_opt(EGS_SPEED_OPT, "fast")).unwrap();
        assert_eq!(config.egs_speed, GasSpeed::Fast);

        let config = ChainConfig::from_raw(&with_opt(EGS_SPEED_OPT, "slow")).unwrap();
        assert_eq!(config.egs_speed, GasSpeed::Average);

        let config = ChainConfig::from_raw(&with_opt(EGS_SPEED_OPT, "")).unwrap();
        assert_eq!(config.egs_speed, GasSpeed::Average);
    }

    #[test]
    fn test_invalid_handler_address_fails() {
        let raw = with_opt(ERC20_HANDLER_OPT, "0x1234");
        match ChainConfig::from_raw(&raw) {
            Err(ConfigError::InvalidAddress { option, .. }) => assert_eq!(option, ERC20_HANDLER_OPT),
            other => panic!("Expected InvalidAddress, got {:?}", other),
        }
    }

    #[test]
    fn test_decimals_are_loaded() {
        let mut raw = RawChainConfig::for_test();
        let resource = format!("0x{}", "01".repeat(32));
        raw.decimals
            .entry(2)
            .or_default()
            .insert(resource.clone(), [18, 6]);

        let config = ChainConfig::from_raw(&raw).unwrap();
        let id: ResourceId = resource.parse().unwrap();
        assert!(config.decimals.get(ChainId(2), &id).is_some());
    }

    #[test]
    fn test_watcher_config_from_json() {
        let json = r#"{
            "chains": [{
                "name": "goerli",
                "id": 5,
                "endpoint": "http://localhost:8545",
                "from": "0xff93B45308FD417dF303D6515aB04D9e89a750Ca",
                "fresh_start": true,
                "decimals": { "2": { "0x0101010101010101010101010101010101010101010101010101010101010101": [18, 6] } },
                "opts": { "bridge": "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B", "http": "true" }
            }]
        }"#;

        let config: WatcherConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.chains.len(), 1);
        let chain = ChainConfig::from_raw(&config.chains[0]).unwrap();
        assert_eq!(chain.id, ChainId(5));
        assert!(chain.fresh_start);
        assert!(chain.http);
        assert_eq!(chain.decimals.len(), 1);
    }

    #[test]
    fn test_parse_uint256_or_hex() {
        assert_eq!(parse_uint256_or_hex("255"), Some(BigUint::from(255u32)));
        assert_eq!(parse_uint256_or_hex("0xff"), Some(BigUint::from(255u32)));
        assert_eq!(parse_uint256_or_hex(""), None);
        assert_eq!(parse_uint256_or_hex("0x"), None);
        assert_eq!(parse_uint256_or_hex("-5"), None);
        assert_eq!(parse_uint256_or_hex("+5"), None);
    }

    #[test]
    fn test_numeric_options_share_one_grammar() {
        for value in ["1_000", "+1000", " 1000", "0x_ff", "1e3"] {
            assert_eq!(
                ChainConfig::from_raw(&with_opt(MAX_GAS_PRICE_OPT, value)).unwrap_err(),
                ConfigError::InvalidNumber {
                    option: MAX_GAS_PRICE_OPT,
                    value: value.to_string()
                },
                "maxGasPrice {:?}",
                value
            );
            assert_eq!(
                ChainConfig::from_raw(&with_opt(START_BLOCK_OPT, value)).unwrap_err(),
                ConfigError::InvalidNumber {
                    option: START_BLOCK_OPT,
                    value: value.to_string()
                },
                "startBlock {:?}",
                value
            );
        }

        let config = ChainConfig::from_raw(&with_opt(MAX_GAS_PRICE_OPT, "0X3E8")).unwrap();
        assert_eq!(config.max_gas_price, BigUint::from(1000u32));
        let config = ChainConfig::from_raw(&with_opt(START_BLOCK_OPT, "0X3E8")).unwrap();
        assert_eq!(config.start_block, 1000);
    }

    #[test]
    fn test_zero_retry_interval_fails() {
        for value in ["0", "0x0"] {
            assert_eq!(
                ChainConfig::from_raw(&with_opt(BLOCK_RETRY_INTERVAL_OPT, value)).unwrap_err(),
                ConfigError::NotPositive {
                    option: BLOCK_RETRY_INTERVAL_OPT
                }
            );
        }
    }
}
