use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gavel")]
#[command(author = "Gavel Team")]
#[command(version = "0.1.0")]
#[command(about = "Live auction engine for deal-room marketplaces", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the auction server
    Serve,
    /// Load and validate configuration, then exit
    CheckConfig,
}
