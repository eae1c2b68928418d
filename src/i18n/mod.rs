//! 国际化模块
//! 
//! 提供多语言消息支持，目前支持英文和中文

pub mod messages;
pub mod en;
pub mod zh;

/// 支持的语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// 英文（默认）
    #[default]
    En,
    /// 中文
    Zh,
}

/// 获取指定语言的消息
pub fn get_message(key: &str, locale: Locale) -> &'static str {
    match locale {
        Locale::En => en::get(key),
        Locale::Zh => zh::get(key),
    }
}

/// 获取带参数的消息（使用 {} 占位符）
pub fn format_message(key: &str, locale: Locale, args: &[&str]) -> String {
    let mut msg = get_message(key, locale).to_string();
    for arg in args {
        if let Some(pos) = msg.find("{}") {
            msg.replace_range(pos..pos + 2, arg);
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let msg = format_message(messages::MSG_CLI_VERSION, Locale::En, &["carrier", "0.1.0"]);
        assert_eq!(msg, "carrier version 0.1.0");

        let msg = format_message(messages::ERR_CLI_UNKNOWN_OPTION, Locale::Zh, &["--x"]);
        assert_eq!(msg, "未知的选项: --x");
    }

    #[test]
    fn test_all_keys_translated() {
        let keys = [
            messages::MSG_CLI_USAGE,
            messages::MSG_CLI_HELP,
            messages::ERR_CLI_INVALID_NUMBER,
            messages::ERR_SCHED_RESOURCE_EXHAUSTED,
            messages::ERR_SCHED_INCOMPLETE,
            messages::MSG_STATS_SWITCHES,
            messages::MSG_STATS_HARNESS,
            messages::MSG_STATS_STATE,
        ];
        for key in keys {
            assert_ne!(get_message(key, Locale::En), "Unknown message key");
            assert_ne!(get_message(key, Locale::Zh), "未知的消息键");
        }
    }
}
