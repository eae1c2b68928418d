//! 中文消息

use super::messages::*;

/// 获取中文消息
pub fn get(key: &str) -> &'static str {
    match key {
        // CLI 消息
        MSG_CLI_USAGE => "用法: {} [选项] <上下文数量> <让出次数>",
        MSG_CLI_VERSION => "{} 版本 {}",
        MSG_CLI_HELP => "carrier - 用户态上下文调度基准测试",
        MSG_CLI_ARGUMENTS => "参数:\n  <上下文数量>  创建的上下文数量（至少 1）\n  <让出次数>    每个上下文的让出次数",
        MSG_CLI_OPTIONS => "选项:\n  --lang <en|zh>                设置语言（默认: en）\n  --variant <fiber|ums|thread>  调度变体（默认: fiber）\n  --carriers <n>                载体线程数，0 表示每个 CPU 一个（默认: 1）\n  --stack-size <字节>           每个上下文的栈大小\n  --backend <fiber|thread>      上下文切换后端\n  --block-us <n>                以阻塞 n 微秒代替让出\n  --stats                       在标准错误输出调度统计",
        MSG_CLI_ERROR => "错误: {}",

        // 参数错误
        ERR_CLI_INVALID_NUMBER => "{} 不是有效的数字: '{}'",
        ERR_CLI_UNKNOWN_OPTION => "未知的选项: {}",
        ERR_CLI_MISSING_VALUE => "选项 {} 需要一个值",

        // 调度错误
        ERR_SCHED_RESOURCE_EXHAUSTED => "无法分配 {}（{} 字节）: {}",
        ERR_SCHED_INVALID_ARGUMENT => "无效的参数 {}: '{}'",
        ERR_SCHED_UNSUPPORTED => "当前平台不支持: {}",
        ERR_SCHED_INCOMPLETE => "只有 {} / {} 个上下文完成",

        // 统计信息
        MSG_STATS_HEADER => "调度统计（{}，{} 后端）:",
        MSG_STATS_CONTEXTS => "  上下文: 创建 {}，终止 {}，panic {}",
        MSG_STATS_SWITCHES => "  切入: {}  让出: {}  阻塞: {}  解除阻塞: {}",
        MSG_STATS_CARRIERS => "  各载体切入次数: {}",
        MSG_STATS_HARNESS => "运行（{}）: {} / {} 个上下文完成，唤醒事件触发 {} 次",
        MSG_STATS_STATE => "  剩余: 存活 {}，阻塞 {}，就绪 {}；调度器存活 {}",

        // 未知消息键
        _ => "未知的消息键",
    }
}
