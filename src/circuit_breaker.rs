use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker guarding one enrichment provider.
pub type ProviderBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates a circuit breaker for an enrichment provider so a dead provider is
/// skipped quickly for the rest of a batch.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, calls pass through.
/// - **OPEN**: Too many failures, calls are rejected without reaching the provider.
/// - **HALF_OPEN**: Testing if the provider recovered.
pub fn create_provider_circuit_breaker() -> ProviderBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
