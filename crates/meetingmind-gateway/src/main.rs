use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "meetingmind-gateway",
    version,
    about = "MeetingMind streaming relay"
)]
struct Cli {
    #[arg(long, global = true)]
    conf_dir: Option<std::path::PathBuf>,
    #[command(subcommand)]
    command: GatewaySubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum GatewaySubcommand {
    /// Serve the HTTP API and static frontend.
    Serve(ServeArgs),
    /// Print the model catalog.
    Models,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Overrides `[server] bind` and `PORT`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    meetingmind_gateway::init_conf_dir(cli.conf_dir.clone());
    let result = match cli.command {
        GatewaySubcommand::Serve(serve) => meetingmind_gateway::run_serve(serve.bind).await,
        GatewaySubcommand::Models => meetingmind_gateway::print_models(),
    };
    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
