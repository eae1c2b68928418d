//! carrier 用户态上下文调度基准测试
//!
//! 主入口点

mod bench;
mod config;
mod error;
mod i18n;
mod runtime;

use std::env;
use std::process;
use std::time::Duration;

use bench::{BenchConfig, BenchReport, BenchVariant, OpKind};
use config::{APP_NAME, VERSION};
use error::SchedError;
use i18n::{format_message, messages, Locale};
use runtime::BackendKind;

/// 命令
#[derive(Debug)]
enum Command {
    Help,
    Version,
    /// 参数个数不对
    Usage,
    Bench { config: BenchConfig, stats: bool },
}

/// 命令行错误
#[derive(Debug, PartialEq)]
enum CliError {
    UnknownOption(String),
    MissingValue(String),
    InvalidNumber { name: &'static str, value: String },
    Sched(SchedError),
}

impl CliError {
    fn localize(&self, locale: Locale) -> String {
        match self {
            CliError::UnknownOption(opt) => format_message(messages::ERR_CLI_UNKNOWN_OPTION, locale, &[opt.as_str()]),
            CliError::MissingValue(opt) => format_message(messages::ERR_CLI_MISSING_VALUE, locale, &[opt.as_str()]),
            CliError::InvalidNumber { name, value } => {
                format_message(messages::ERR_CLI_INVALID_NUMBER, locale, &[*name, value.as_str()])
            }
            CliError::Sched(e) => describe_error(e, locale),
        }
    }
}

impl From<SchedError> for CliError {
    fn from(e: SchedError) -> Self {
        CliError::Sched(e)
    }
}

/// 调度错误的本地化描述
fn describe_error(e: &SchedError, locale: Locale) -> String {
    match e {
        SchedError::ResourceExhausted { what, requested, reason } => format_message(
            messages::ERR_SCHED_RESOURCE_EXHAUSTED,
            locale,
            &[*what, requested.to_string().as_str(), reason.as_str()],
        ),
        SchedError::InvalidArgument { name, value } => {
            format_message(messages::ERR_SCHED_INVALID_ARGUMENT, locale, &[*name, value.as_str()])
        }
        SchedError::Unsupported(what) => format_message(messages::ERR_SCHED_UNSUPPORTED, locale, &[*what]),
        SchedError::Incomplete { completed, expected } => format_message(
            messages::ERR_SCHED_INCOMPLETE,
            locale,
            &[completed.to_string().as_str(), expected.to_string().as_str()],
        ),
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

/// 解析命令行
///
/// 选项在位置参数之前；出错时仍返回已解析到的语言
fn parse_args(args: &[String]) -> (Locale, Result<Command, CliError>) {
    let mut locale = Locale::En;
    let mut config = BenchConfig::default();
    let mut stats = false;

    let mut i = 1;
    while i < args.len() {
        let opt = args[i].as_str();
        if !opt.starts_with("--") || opt == "--help" || opt == "--version" {
            break;
        }
        if opt == "--stats" {
            stats = true;
            i += 1;
            continue;
        }

        let Some(value) = args.get(i + 1).map(|s| s.as_str()) else {
            return (locale, Err(CliError::MissingValue(opt.to_string())));
        };
        let applied = match opt {
            "--lang" => {
                locale = match value {
                    "zh" | "cn" | "chinese" => Locale::Zh,
                    _ => Locale::En,
                };
                Ok(())
            }
            "--variant" => BenchVariant::parse(value).map(|v| config.variant = v).map_err(CliError::from),
            "--backend" => BackendKind::parse(value).map(|b| config.backend = b).map_err(CliError::from),
            "--carriers" => parse_number("--carriers", value).map(|n| config.carriers = n),
            "--stack-size" => parse_number("--stack-size", value).map(|n| config.stack_size = n),
            "--block-us" => {
                parse_number("--block-us", value).map(|us| config.op = OpKind::Block(Duration::from_micros(us)))
            }
            _ => Err(CliError::UnknownOption(opt.to_string())),
        };
        if let Err(e) = applied {
            return (locale, Err(e));
        }
        i += 2;
    }

    let remaining: Vec<&str> = args[i.min(args.len())..].iter().map(|s| s.as_str()).collect();
    let command = match remaining.as_slice() {
        ["help"] | ["--help"] | ["-h"] => Ok(Command::Help),
        ["version"] | ["--version"] | ["-v"] => Ok(Command::Version),
        [contexts, yields] => parse_population(contexts, yields, config).map(|config| Command::Bench { config, stats }),
        _ => Ok(Command::Usage),
    };
    (locale, command)
}

/// 解析 N 和 Y
fn parse_population(contexts: &str, yields: &str, mut config: BenchConfig) -> Result<BenchConfig, CliError> {
    config.contexts = parse_number("contextCount", contexts)?;
    config.yields = parse_number("yieldsPerContext", yields)?;
    config.validate()?;
    Ok(config)
}

/// 打印用法（标准错误）
fn print_usage(locale: Locale) {
    eprintln!("{}", format_message(messages::MSG_CLI_USAGE, locale, &[APP_NAME]));
}

/// 打印帮助信息
fn print_help(locale: Locale) {
    println!("{}", format_message(messages::MSG_CLI_HELP, locale, &[]));
    println!();
    println!("{}", format_message(messages::MSG_CLI_USAGE, locale, &[APP_NAME]));
    println!();
    println!("{}", format_message(messages::MSG_CLI_ARGUMENTS, locale, &[]));
    println!();
    println!("{}", format_message(messages::MSG_CLI_OPTIONS, locale, &[]));
}

/// 打印版本信息
fn print_version(locale: Locale) {
    let msg = format_message(messages::MSG_CLI_VERSION, locale, &[APP_NAME, VERSION]);
    println!("{}", msg);
}

/// 打印结果（格式固定，不随语言变化）
fn print_report(report: &BenchReport) {
    println!("Duration: {}s.", report.duration_secs());
    println!("Average execution time: {}ns.", report.avg_per_op_nanos());
}

/// 打印运行统计（标准错误）
fn print_stats(report: &BenchReport, locale: Locale) {
    eprintln!(
        "{}",
        format_message(
            messages::MSG_STATS_HARNESS,
            locale,
            &[
                report.variant.name(),
                report.completed.to_string().as_str(),
                report.contexts.to_string().as_str(),
                report.wake_fires.to_string().as_str(),
            ],
        )
    );
    let Some(stats) = &report.stats else {
        return;
    };
    eprintln!(
        "{}",
        format_message(messages::MSG_STATS_HEADER, locale, &[stats.variant.name(), stats.backend.name()])
    );
    eprintln!(
        "{}",
        format_message(
            messages::MSG_STATS_CONTEXTS,
            locale,
            &[
                stats.contexts_created.to_string().as_str(),
                stats.terminations.to_string().as_str(),
                stats.panics.to_string().as_str(),
            ],
        )
    );
    eprintln!(
        "{}",
        format_message(
            messages::MSG_STATS_SWITCHES,
            locale,
            &[
                stats.resumes.to_string().as_str(),
                stats.yields.to_string().as_str(),
                stats.blocks.to_string().as_str(),
                stats.unblocks.to_string().as_str(),
            ],
        )
    );
    let per_carrier: Vec<String> = stats.carrier_dispatch_counts.iter().map(|n| n.to_string()).collect();
    eprintln!(
        "{}",
        format_message(messages::MSG_STATS_CARRIERS, locale, &[per_carrier.join(", ").as_str()])
    );
    eprintln!(
        "{}",
        format_message(
            messages::MSG_STATS_STATE,
            locale,
            &[
                stats.live.to_string().as_str(),
                stats.blocked.to_string().as_str(),
                stats.ready_len.to_string().as_str(),
                format!("{:?}", stats.elapsed).as_str(),
            ],
        )
    );
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let (locale, parsed) = parse_args(&args);

    let command = match parsed {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", format_message(messages::MSG_CLI_ERROR, locale, &[e.localize(locale).as_str()]));
            process::exit(1);
        }
    };

    match command {
        Command::Help => print_help(locale),
        Command::Version => print_version(locale),
        Command::Usage => {
            print_usage(locale);
            process::exit(1);
        }
        Command::Bench { config, stats } => match bench::run(&config) {
            Ok(report) => {
                print_report(&report);
                if stats {
                    print_stats(&report, locale);
                }
            }
            Err(e) => {
                let msg = describe_error(&e, locale);
                eprintln!("{}", format_message(messages::MSG_CLI_ERROR, locale, &[msg.as_str()]));
                process::exit(1);
            }
        },
    }
}
