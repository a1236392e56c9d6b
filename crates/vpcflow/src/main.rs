mod commands;
mod settings;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use settings::Settings;
use std::path::PathBuf;
use vpcflow_cloud::HostKeyPolicy;

#[derive(Parser)]
#[command(name = "vpc")]
#[command(about = "踏み台の奥に、環境をまるごと。", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// 環境名（全リソースの Env タグと名前の接頭辞）
    #[arg(short = 'e', long = "env", env = "VPC_ENV", default_value = "dev", global = true)]
    env: String,

    /// 進捗を出さない（警告とエラーのみ）
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// 発行したコマンドもすべて表示
    #[arg(short, long, global = true)]
    verbose: bool,

    /// インスタンスに登録するキーペア名（鍵ファイルは <key-dir>/<key>.pem）
    #[arg(short = 'k', long, env = "VPC_KEY", default_value = "ec2-user", global = true)]
    key: String,

    /// AMI イメージ ID
    #[arg(
        short = 'i',
        long,
        env = "VPC_IMAGE",
        default_value = "ami-81f7e8b1",
        global = true
    )]
    image: String,

    /// インスタンスタイプ
    #[arg(
        short = 't',
        long = "type",
        env = "VPC_TYPE",
        default_value = "t1.micro",
        global = true
    )]
    instance_type: String,

    /// AWS リージョン（省略時は AWS_REGION / ~/.aws/config）
    #[arg(long, global = true)]
    region: Option<String>,

    /// ssh のログインユーザー
    #[arg(long, env = "VPC_SSH_USER", default_value = "ec2-user", global = true)]
    ssh_user: String,

    /// 鍵ファイルのディレクトリ（デフォルト: ~/.ssh）
    #[arg(long, env = "VPC_KEY_DIR", global = true)]
    key_dir: Option<PathBuf>,

    /// 未知のホスト鍵の扱い (strict, accept-new, disabled)
    #[arg(long, env = "VPC_HOST_KEY", default_value = "accept-new", global = true)]
    host_key: HostKeyPolicy,

    /// 状態遷移・ssh 到達待ちのタイムアウト（秒）
    #[arg(long, global = true)]
    wait_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// 管理ネットワークと踏み台を構築
    Setup {
        /// 踏み台への ssh を許可する CIDR
        #[arg(short = 'c', long = "ctrl", env = "VPC_CTRL", default_value = "0.0.0.0/0")]
        control_cidr: String,
        /// 踏み台グループのデフォルト egress (全許可) を削除
        #[arg(long)]
        revoke_default_egress: bool,
    },
    /// 環境のネットワーク・ゾーン・マシンを表示
    Describe,
    /// 環境のリソースをすべて削除
    Cleanup,
    /// 環境のネットワーク一覧 (JSON)
    List,
    /// アプリネットワークを作成して管理ネットワークとピアリング
    Create {
        /// ネットワーク名
        name: String,
        /// CIDR ブロック (例: 10.1.0.0/16)
        cidr: String,
    },
    /// ネットワークを依存リソースごと削除
    Destroy {
        /// ネットワーク名
        name: String,
    },
    /// ネットワーク内にゾーン（サブネット）を作成
    CreateZone {
        /// ネットワーク名
        network: String,
        /// ゾーン名
        zone: String,
        /// CIDR ブロック（省略時はネットワーク全体）
        cidr: Option<String>,
    },
    /// ゾーンにマシンを起動
    RunMachine {
        /// マシン名
        name: String,
        /// ゾーン (<env>.<network>.<zone>)
        zone: String,
    },
    /// マシン上でコマンドを実行（踏み台経由）
    Ssh {
        /// インスタンス ID
        instance_id: String,
        /// 実行するコマンド（-- 以降）。省略時は hostname
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// 稼働中のマシン一覧 (JSON)
    Machines,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// -q でも片付けの失敗（warn）は出す
fn log_level(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        "warn"
    } else if global.verbose {
        "debug"
    } else {
        "info"
    }
}

/// ログは stderr。RUST_LOG があればそちらを優先
fn init_logging(global: &GlobalArgs) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level(global)));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_args(&cli.global)?;
    let session = commands::Session::connect(&settings).await?;

    match cli.command {
        Commands::Setup {
            control_cidr,
            revoke_default_egress,
        } => {
            commands::setup::handle(&session, &settings, control_cidr, revoke_default_egress)
                .await?;
        }
        Commands::Describe => commands::describe::handle(&session).await?,
        Commands::Cleanup => commands::cleanup::handle(&session).await?,
        Commands::List => commands::describe::list_networks(&session).await?,
        Commands::Create { name, cidr } => {
            commands::network::create(&session, &name, &cidr).await?;
        }
        Commands::Destroy { name } => commands::network::destroy(&session, &name).await?,
        Commands::CreateZone {
            network,
            zone,
            cidr,
        } => {
            commands::network::create_zone(&session, &network, &zone, cidr.as_deref()).await?;
        }
        Commands::RunMachine { name, zone } => {
            commands::machine::run(&session, &settings, &name, &zone).await?;
        }
        Commands::Ssh {
            instance_id,
            command,
        } => {
            commands::machine::ssh(&session, &settings, &instance_id, &command).await?;
        }
        Commands::Machines => commands::describe::list_machines(&session).await?,
    }

    Ok(())
}
