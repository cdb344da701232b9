use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use alloy_primitives::{Address, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use clap::{ArgAction, Parser};
use quarry_core::{EntryPointVersion, logger::LogFormat};
use quarry_relay::{
    GasParams, InterceptorConfig, RewriteMethods,
    interceptor::{DEFAULT_SEND_RAW_TRANSACTION, DEFAULT_SEND_USER_OPERATION},
};
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "QUARRY_SPONSOR_ADDRESS", default_value = "0.0.0.0")]
    pub address: IpAddr,

    /// Port to bind the HTTP server to
    #[arg(long, env = "QUARRY_SPONSOR_PORT", default_value = "3003")]
    pub port: u16,

    /// Address the Prometheus exporter listens on
    #[arg(long, env = "QUARRY_SPONSOR_METRICS_ADDR", default_value = "0.0.0.0:9002")]
    pub metrics_addr: SocketAddr,

    /// Chain RPC endpoint
    #[arg(long, env = "QUARRY_SPONSOR_RPC_URL")]
    pub rpc_url: Url,

    /// Bundler endpoint. Defaults to the chain RPC endpoint
    #[arg(long, env = "QUARRY_SPONSOR_BUNDLER_URL")]
    pub bundler_url: Option<Url>,

    /// Address of the paymaster world
    #[arg(long, env = "QUARRY_SPONSOR_PAYMASTER_ADDRESS")]
    pub paymaster_address: Address,

    /// Owner key of the sponsor smart account
    #[arg(long, env = "QUARRY_SPONSOR_PRIVATE_KEY", hide_env_values = true)]
    pub sponsor_private_key: String,

    #[arg(long, env = "QUARRY_SPONSOR_ENTRY_POINT_VERSION", default_value = "0.7")]
    pub entry_point_version: EntryPointVersion,

    /// Simple account factory. Defaults to the canonical one for the entry point version
    #[arg(long, env = "QUARRY_SPONSOR_ACCOUNT_FACTORY")]
    pub account_factory: Option<Address>,

    /// Namespace of the grants table. Grants are not tracked when unset
    #[arg(long, env = "QUARRY_SPONSOR_NAMESPACE")]
    pub namespace: Option<String>,

    /// Allowance granted per request, in wei
    #[arg(long, env = "QUARRY_SPONSOR_ALLOWANCE_AMOUNT", default_value = "100000000000000000")]
    pub allowance_amount: U256,

    /// Rewrite submissions to the low-latency methods below
    #[arg(
        long,
        env = "QUARRY_SPONSOR_LOW_LATENCY_REWRITES",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub low_latency_rewrites: bool,

    #[arg(
        long,
        env = "QUARRY_SPONSOR_SEND_RAW_TRANSACTION_METHOD",
        default_value = DEFAULT_SEND_RAW_TRANSACTION
    )]
    pub send_raw_transaction_method: String,

    #[arg(
        long,
        env = "QUARRY_SPONSOR_SEND_USER_OPERATION_METHOD",
        default_value = DEFAULT_SEND_USER_OPERATION
    )]
    pub send_user_operation_method: String,

    /// Interval between receipt polls in milliseconds
    #[arg(long, env = "QUARRY_SPONSOR_POLL_INTERVAL_MS", default_value = "500")]
    pub poll_interval_ms: u64,

    /// How long to wait for a user operation receipt in milliseconds
    #[arg(long, env = "QUARRY_SPONSOR_RECEIPT_TIMEOUT_MS", default_value = "60000")]
    pub receipt_timeout_ms: u64,

    /// Timeout of a single upstream request in milliseconds
    #[arg(long, env = "QUARRY_SPONSOR_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    #[arg(long, env = "QUARRY_SPONSOR_RECEIPT_CACHE_CAPACITY", default_value = "10000")]
    pub receipt_cache_capacity: u64,

    #[arg(long, env = "QUARRY_SPONSOR_RECEIPT_CACHE_TTL_SECONDS", default_value = "600")]
    pub receipt_cache_ttl_seconds: u64,

    #[arg(long, env = "QUARRY_SPONSOR_PRE_VERIFICATION_GAS")]
    pub pre_verification_gas: Option<u64>,

    #[arg(long, env = "QUARRY_SPONSOR_VERIFICATION_GAS_LIMIT")]
    pub verification_gas_limit: Option<u64>,

    #[arg(long, env = "QUARRY_SPONSOR_CALL_GAS_LIMIT")]
    pub call_gas_limit: Option<u64>,

    #[arg(long, env = "QUARRY_SPONSOR_PAYMASTER_VERIFICATION_GAS_LIMIT")]
    pub paymaster_verification_gas_limit: Option<u64>,

    #[arg(long, env = "QUARRY_SPONSOR_PAYMASTER_POST_OP_GAS_LIMIT")]
    pub paymaster_post_op_gas_limit: Option<u64>,

    #[arg(long, env = "QUARRY_SPONSOR_MAX_FEE_PER_GAS")]
    pub max_fee_per_gas: Option<u64>,

    #[arg(long, env = "QUARRY_SPONSOR_MAX_PRIORITY_FEE_PER_GAS")]
    pub max_priority_fee_per_gas: Option<u64>,

    /// Skip namespace, table and deposit setup at startup
    #[arg(long, env = "QUARRY_SPONSOR_SKIP_SETUP", default_value = "false")]
    pub skip_setup: bool,

    #[arg(long, env = "QUARRY_SPONSOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "QUARRY_SPONSOR_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Config {
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn bundler_url(&self) -> &Url {
        self.bundler_url.as_ref().unwrap_or(&self.rpc_url)
    }

    pub fn signer(&self) -> anyhow::Result<PrivateKeySigner> {
        self.sponsor_private_key.trim().parse().context("invalid sponsor private key")
    }

    pub fn account_factory(&self) -> Address {
        self.account_factory.unwrap_or_else(|| self.entry_point_version.default_factory())
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn interceptor_config(&self) -> InterceptorConfig {
        InterceptorConfig {
            rewrites: self.low_latency_rewrites.then(|| RewriteMethods {
                send_raw_transaction: self.send_raw_transaction_method.clone(),
                send_user_operation: self.send_user_operation_method.clone(),
            }),
            cache_capacity: self.receipt_cache_capacity,
            cache_ttl: Duration::from_secs(self.receipt_cache_ttl_seconds),
        }
    }

    /// Defaults with the configured overrides applied.
    pub fn gas_params(&self) -> GasParams {
        let mut gas = GasParams::default();
        let overrides = [
            (&mut gas.pre_verification_gas, self.pre_verification_gas),
            (&mut gas.verification_gas_limit, self.verification_gas_limit),
            (&mut gas.call_gas_limit, self.call_gas_limit),
            (&mut gas.paymaster_verification_gas_limit, self.paymaster_verification_gas_limit),
            (&mut gas.paymaster_post_op_gas_limit, self.paymaster_post_op_gas_limit),
            (&mut gas.max_fee_per_gas, self.max_fee_per_gas),
            (&mut gas.max_priority_fee_per_gas, self.max_priority_fee_per_gas),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = U256::from(value);
            }
        }
        gas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn parse(extra: &[&str]) -> Config {
        let mut args = vec![
            "quarry-sponsor",
            "--rpc-url",
            "http://localhost:8545",
            "--paymaster-address",
            "0x3333333333333333333333333333333333333333",
            "--sponsor-private-key",
            KEY,
        ];
        args.extend_from_slice(extra);
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]);
        assert_eq!(config.bind_addr().port(), 3003);
        assert_eq!(config.bundler_url(), &config.rpc_url);
        assert_eq!(config.entry_point_version, EntryPointVersion::V07);
        assert_eq!(config.account_factory(), quarry_core::abi::SIMPLE_ACCOUNT_FACTORY_V07);
        assert!(config.namespace.is_none());
        assert_eq!(config.gas_params(), GasParams::default());

        let interceptor = config.interceptor_config();
        assert_eq!(interceptor.rewrites, Some(RewriteMethods::default()));
        assert_eq!(interceptor.cache_capacity, 10_000);
    }

    #[test]
    fn rewrites_can_be_disabled() {
        let config = parse(&["--low-latency-rewrites", "false"]);
        assert!(config.interceptor_config().rewrites.is_none());
    }

    #[test]
    fn gas_overrides_replace_single_fields() {
        let config = parse(&["--call-gas-limit", "42", "--max-fee-per-gas", "7"]);
        let gas = config.gas_params();
        assert_eq!(gas.call_gas_limit, U256::from(42));
        assert_eq!(gas.max_fee_per_gas, U256::from(7));
        assert_eq!(gas.verification_gas_limit, U256::from(1_000_000));
    }

    #[test]
    fn paymaster_gas_limits_can_be_overridden() {
        let config = parse(&[
            "--paymaster-verification-gas-limit",
            "250000",
            "--paymaster-post-op-gas-limit",
            "60000",
        ]);
        let gas = config.gas_params();
        assert_eq!(gas.paymaster_verification_gas_limit, U256::from(250_000));
        assert_eq!(gas.paymaster_post_op_gas_limit, U256::from(60_000));
        assert_eq!(gas.call_gas_limit, GasParams::default().call_gas_limit);
    }

    #[test]
    fn signer_parses_hex_key() {
        let config = parse(&["--entry-point-version", "0.6"]);
        assert!(config.signer().is_ok());
        assert_eq!(config.account_factory(), quarry_core::abi::SIMPLE_ACCOUNT_FACTORY_V06);
    }
}
