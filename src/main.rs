//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、宿主适配器装配及运行结果输出。

mod core;
mod engine;
mod interfaces;
mod network;
mod ui;
mod utils;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

use crate::core::config::AppConfig;
use crate::core::event::create_event_channel;
use crate::core::model::Completion;
use crate::engine::{ProfileSwitcher, RegionDetector, RegionRotator, SwitcherSettings, validate_setting};
use crate::interfaces::CompletionSink;
use crate::network::{ControllerClient, HttpProbe};
use crate::ui::{StdoutCompletion, Ui, get_multi};
use crate::utils::netid::resolve_network_id;
use crate::utils::notify::build_notifier;
use crate::utils::store::{JsonFileStore, PrefixedStore};

/// 进度条感知的日志写入器 (TUI-aware Log Writer)
///
/// 日志写到 stderr 且经由进度容器输出，stdout 只保留运行结果。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let multi = get_multi();
        // 非终端环境下进度容器被隐藏，println 会被吞掉
        if multi.is_hidden() {
            return io::Write::write(&mut io::stderr(), buf);
        }
        let s = String::from_utf8_lossy(buf);
        let _ = multi.println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径 (默认 ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 轮换策略组节点，直到出口区域等于目标区域
    Rotate {
        /// 策略组名称
        #[arg(short, long)]
        group: Option<String>,
        /// 目标区域码 (如 CN)
        #[arg(short, long)]
        region: Option<String>,
        /// 单次探测超时 (毫秒)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// 按当前网络应用运行模式与策略组选择
    Switch {
        /// 当前网络标识 (SSID)，缺省时自动探测
        #[arg(short, long)]
        network: Option<String>,
    },
    /// 读写切换设置 (notificationMode / defaultModel / modelList)
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// 读取一个键
    Get { key: String },
    /// 写入一个键，已知键会先校验格式
    Set { key: String, value: String },
    /// 列出全部键
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 遥测层初始化 (Telemetry Layer Initialization)
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Rotate {
            group,
            region,
            timeout_ms,
        } => rotate(&config, group, region, timeout_ms).await,
        Commands::Switch { network } => switch(&config, network).await,
        Commands::Store { action } => store(&config, action),
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Arc<ControllerClient>> {
    let controller = ControllerClient::new(&config.controller)?;
    controller
        .wait_for_api(config.controller.ready_timeout_secs)
        .await?;
    Ok(Arc::new(controller))
}

async fn rotate(
    config: &AppConfig,
    group: Option<String>,
    region: Option<String>,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let group = group
        .or_else(|| config.rotator.group.clone())
        .context("未指定策略组 (--group 或 rotator.group)")?;
    let region = region.unwrap_or_else(|| config.rotator.target_region.clone());
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(config.probe.timeout_ms));

    let controller = connect(config).await?;
    let probe = Arc::new(HttpProbe::new(&config.probe)?);
    let detector = RegionDetector::new(&config.region)?;

    // 建立 UI 事件反馈链路 (Event feedback loop)
    let (event_sender, event_receiver) = create_event_channel();
    let ui_handle = Ui::run(event_receiver);

    // 信号处理：中断时恢复原节点
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let outcome = {
        let rotator = RegionRotator::new(controller, probe, detector, timeout)
            .with_events(event_sender)
            .with_shutdown(shutdown);
        rotator.rotate(&group, &region).await
    };

    // Await UI shutdown after event sender closure
    let _ = ui_handle.await;
    let outcome = outcome?;

    if outcome.matched {
        tracing::info!("{} 已切换到区域为 {} 的节点: {}", outcome.group, region, outcome.selection);
    } else if outcome.interrupted {
        tracing::warn!("轮换被中断，已恢复原节点: {}", outcome.selection);
    } else {
        tracing::warn!(
            "{} 次探测均未命中 {}，保持原节点: {}",
            outcome.probes,
            region,
            outcome.selection
        );
    }

    StdoutCompletion.done(outcome.completion())?;
    Ok(())
}

async fn switch(config: &AppConfig, network: Option<String>) -> anyhow::Result<()> {
    let network_id = resolve_network_id(network, &config.network).await?;

    let backing = JsonFileStore::open(config.store.resolve_path()?)?;
    let store = PrefixedStore::new(&backing, config.store.key_prefix.as_str());
    let settings = SwitcherSettings::load(&store).context("读取切换设置失败")?;

    let controller = connect(config).await?;
    let switcher = ProfileSwitcher::new(
        controller.clone(),
        controller,
        build_notifier(&config.notification),
    );
    let applied = switcher.apply(&settings, &network_id).await?;

    tracing::debug!(
        "网络 {} ({:?}): 模式 {:?}, {} 个策略组, 已通知: {}\n{}",
        applied.network_id,
        applied.source,
        applied.routing_mode,
        applied.selections.len(),
        applied.notified,
        applied.summary.trim_end()
    );
    if applied.failures > 0 {
        tracing::warn!("{} 项变更未能生效", applied.failures);
    }

    StdoutCompletion.done(Completion::empty())?;
    Ok(())
}

fn store(config: &AppConfig, action: StoreAction) -> anyhow::Result<()> {
    let path = config.store.resolve_path()?;
    let backing = JsonFileStore::open(&path)?;
    let store = PrefixedStore::new(&backing, config.store.key_prefix.as_str());

    match action {
        StoreAction::Get { key } => {
            if let Some(value) = store.get(&key)? {
                println!("{}", value);
            }
        }
        StoreAction::Set { key, value } => {
            validate_setting(&key, &value).with_context(|| format!("{} 格式无效", key))?;
            store.set(&key, &value)?;
            tracing::info!("已写入 {} ({})", key, path.display());
        }
        StoreAction::List => {
            for key in store.keys()? {
                println!("{}", key);
            }
        }
    }
    Ok(())
}
