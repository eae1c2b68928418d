//! English messages

use super::messages::*;

/// Get English message
pub fn get(key: &str) -> &'static str {
    match key {
        // CLI messages
        MSG_CLI_USAGE => "Usage: {} [options] <number-of-contexts> <number-of-yields>",
        MSG_CLI_VERSION => "{} version {}",
        MSG_CLI_HELP => "carrier - user-mode context scheduling benchmark",
        MSG_CLI_ARGUMENTS => "Arguments:\n  <number-of-contexts>  Contexts to create (at least 1)\n  <number-of-yields>    Yields performed by each context",
        MSG_CLI_OPTIONS => "Options:\n  --lang <en|zh>                Set language (default: en)\n  --variant <fiber|ums|thread>  Scheduling variant (default: fiber)\n  --carriers <n>                Carrier threads, 0 = one per CPU (default: 1)\n  --stack-size <bytes>          Stack size per context\n  --backend <fiber|thread>      Context switch backend\n  --block-us <n>                Block for n microseconds instead of yielding\n  --stats                       Print scheduler statistics to stderr",
        MSG_CLI_ERROR => "Error: {}",

        // Argument errors
        ERR_CLI_INVALID_NUMBER => "Invalid number for {}: '{}'",
        ERR_CLI_UNKNOWN_OPTION => "Unknown option: {}",
        ERR_CLI_MISSING_VALUE => "Option {} requires a value",

        // Scheduler errors
        ERR_SCHED_RESOURCE_EXHAUSTED => "Cannot allocate {} of {} bytes: {}",
        ERR_SCHED_INVALID_ARGUMENT => "Invalid argument {}: '{}'",
        ERR_SCHED_UNSUPPORTED => "Not supported on this platform: {}",
        ERR_SCHED_INCOMPLETE => "Only {} of {} contexts completed",

        // Statistics
        MSG_STATS_HEADER => "Scheduler statistics ({}, {} backend):",
        MSG_STATS_CONTEXTS => "  contexts: {} created, {} terminated, {} panicked",
        MSG_STATS_SWITCHES => "  resumes: {}  yields: {}  blocks: {}  unblocks: {}",
        MSG_STATS_CARRIERS => "  dispatches per carrier: {}",
        MSG_STATS_HARNESS => "Run ({}): {} of {} contexts completed, wake fired {} time(s)",
        MSG_STATS_STATE => "  remaining: {} live, {} blocked, {} ready; scheduler alive {}",

        // Unknown message key
        _ => "Unknown message key",
    }
}
