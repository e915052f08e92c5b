use log::*;
use std::env;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RISK_CEILING: i64 = 10_000_000;
const DEFAULT_SETTLEMENT_WAIT: Duration = Duration::from_millis(50);
const DEFAULT_TEST_PAYMENT_METHOD: &str = "pm_card_visa";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

/// Wraps a sensitive value so it never ends up in logs.
#[derive(Clone, Default)]
pub struct Secret<T>
where
    T: Clone + Default,
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[derive(Clone, Debug)]
pub struct SagaConfig {
    /// Authorizations for this many minor units or more are rejected locally.
    pub risk_ceiling: i64,
    /// How long a successful capture waits for settlement before it is recorded.
    pub settlement_wait: Duration,
    pub use_test_payment_method: bool,
    pub test_payment_method: String,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            risk_ceiling: DEFAULT_RISK_CEILING,
            settlement_wait: DEFAULT_SETTLEMENT_WAIT,
            use_test_payment_method: true,
            test_payment_method: DEFAULT_TEST_PAYMENT_METHOD.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Upper bound on a single remote call.
    pub request_timeout: Duration,
    /// Webhooks are rejected outright while this is unset.
    pub webhook_secret: Option<Secret<String>>,
    pub signature_tolerance: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            webhook_secret: None,
            signature_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Trial requests admitted while half-open, and consecutive successes needed to close.
    pub max_requests: u32,
    /// Closed-state counts are cleared this often. Zero never clears them.
    pub interval: Duration,
    /// Time spent open before trial requests are admitted.
    pub cooldown: Duration,
    pub min_requests: u32,
    pub failure_ratio: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            interval: Duration::from_secs(60),
            cooldown: Duration::from_secs(8),
            min_requests: 10,
            failure_ratio: 0.6,
        }
    }
}

/// Outer deadlines applied by the service to a whole saga call.
#[derive(Clone, Debug)]
pub struct ServiceDeadlines {
    pub authorize: Duration,
    pub capture: Duration,
    pub cancel: Duration,
}

impl Default for ServiceDeadlines {
    fn default() -> Self {
        Self {
            authorize: Duration::from_secs(25),
            capture: Duration::from_secs(25),
            cancel: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub saga: SagaConfig,
    pub gateway: GatewayConfig,
    pub breaker: BreakerConfig,
    pub deadlines: ServiceDeadlines,
}

impl AppConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let saga = SagaConfig {
            risk_ceiling: env_parse("PAYSAGA_RISK_CEILING", defaults.saga.risk_ceiling),
            settlement_wait: env_millis("PAYSAGA_SETTLEMENT_WAIT_MS", defaults.saga.settlement_wait),
            use_test_payment_method: env_flag(
                "PAYSAGA_ENABLE_TEST_PM",
                defaults.saga.use_test_payment_method,
            ),
            test_payment_method: env::var("PAYSAGA_TEST_PAYMENT_METHOD")
                .unwrap_or(defaults.saga.test_payment_method),
        };
        let webhook_secret = env::var("PAYSAGA_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(Secret::new);
        if webhook_secret.is_none() {
            warn!("🪛️ PAYSAGA_WEBHOOK_SECRET is not set. Every webhook delivery will be rejected.");
        }
        let gateway = GatewayConfig {
            request_timeout: env_millis("PAYSAGA_REQUEST_TIMEOUT_MS", defaults.gateway.request_timeout),
            webhook_secret,
            signature_tolerance: env_millis(
                "PAYSAGA_SIGNATURE_TOLERANCE_MS",
                defaults.gateway.signature_tolerance,
            ),
        };
        let breaker = BreakerConfig {
            max_requests: env_parse("PAYSAGA_CB_MAX_REQUESTS", defaults.breaker.max_requests),
            interval: env_millis("PAYSAGA_CB_INTERVAL_MS", defaults.breaker.interval),
            cooldown: env_millis("PAYSAGA_CB_COOLDOWN_MS", defaults.breaker.cooldown),
            min_requests: env_parse("PAYSAGA_CB_MIN_REQUESTS", defaults.breaker.min_requests),
            failure_ratio: env_parse("PAYSAGA_CB_FAILURE_RATIO", defaults.breaker.failure_ratio),
        };
        let deadlines = ServiceDeadlines {
            authorize: env_millis("PAYSAGA_AUTHORIZE_DEADLINE_MS", defaults.deadlines.authorize),
            capture: env_millis("PAYSAGA_CAPTURE_DEADLINE_MS", defaults.deadlines.capture),
            cancel: env_millis("PAYSAGA_CANCEL_DEADLINE_MS", defaults.deadlines.cancel),
        };
        Self {
            saga,
            gateway,
            breaker,
            deadlines,
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or(key, env::var(key).ok(), default)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw {
        Some(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        }),
        None => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    let millis = env_parse(key, default.as_millis() as u64);
    Duration::from_millis(millis)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|s| &s == "1" || &s == "true")
        .unwrap_or(default)
}
