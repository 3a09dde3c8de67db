use clap::{Parser, Subcommand};
use risk_guard_cli::commands::{
    run_check_config, run_monitor, run_sign, run_tick, CheckConfigArgs, RunArgs, SignArgs,
    TickArgs,
};
use risk_guard_cli::logging::{self, LogFormat};

#[derive(Parser)]
#[command(name = "risk-guard")]
#[command(about = "Liquidation-distance guard for LN Markets futures positions", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "RISK_GUARD_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop until Ctrl-C
    Run(RunArgs),
    /// Evaluate every active configuration once and print the report
    Tick(TickArgs),
    /// Load and validate configuration without contacting the exchange
    CheckConfig(CheckConfigArgs),
    /// Print the authentication headers for a request
    Sign(SignArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command {
        Commands::Run(args) => run_monitor(args).await?,
        Commands::Tick(args) => run_tick(args).await?,
        Commands::CheckConfig(args) => run_check_config(args).await?,
        Commands::Sign(args) => run_sign(args)?,
    }

    Ok(())
}
