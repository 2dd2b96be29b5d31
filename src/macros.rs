/// Logs through the `log` facade when the given verbosity flag is set.
///
/// This is the single gate for the agent's own diagnostics: nothing is
/// emitted for a quiet agent, no matter how the host configured its logger.
macro_rules! relic_debug {
    ($verbose:expr, $($arg:tt)*) => {
        if $verbose {
            ::log::info!(target: "relic_agent", $($arg)*);
        }
    };
}
