//! 消息键定义

// CLI 消息
pub const MSG_CLI_USAGE: &str = "cli.usage";
pub const MSG_CLI_VERSION: &str = "cli.version";
pub const MSG_CLI_HELP: &str = "cli.help";
pub const MSG_CLI_ARGUMENTS: &str = "cli.arguments";
pub const MSG_CLI_OPTIONS: &str = "cli.options";
pub const MSG_CLI_ERROR: &str = "cli.error";

// 参数错误
pub const ERR_CLI_INVALID_NUMBER: &str = "cli.invalid_number";
pub const ERR_CLI_UNKNOWN_OPTION: &str = "cli.unknown_option";
pub const ERR_CLI_MISSING_VALUE: &str = "cli.missing_value";

// 调度错误
pub const ERR_SCHED_RESOURCE_EXHAUSTED: &str = "sched.resource_exhausted";
pub const ERR_SCHED_INVALID_ARGUMENT: &str = "sched.invalid_argument";
pub const ERR_SCHED_UNSUPPORTED: &str = "sched.unsupported";
pub const ERR_SCHED_INCOMPLETE: &str = "sched.incomplete";

// 统计信息
pub const MSG_STATS_HEADER: &str = "stats.header";
pub const MSG_STATS_CONTEXTS: &str = "stats.contexts";
pub const MSG_STATS_SWITCHES: &str = "stats.switches";
pub const MSG_STATS_CARRIERS: &str = "stats.carriers";
pub const MSG_STATS_HARNESS: &str = "stats.harness";
pub const MSG_STATS_STATE: &str = "stats.state";
