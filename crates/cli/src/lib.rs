pub mod commands;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::process::ExitCode;

use crate::commands::swap::SwapArgs;
use crate::commands::withdraw::WithdrawArgs;

#[derive(Debug, Parser)]
#[command(
    name = "intentdesk",
    about = "Intentdesk operator CLI",
    long_about = "Swap, deposit and withdraw through NEAR intents, inspect config, and run readiness checks.",
    after_help = "Examples:\n  intentdesk doctor --json\n  intentdesk swap --from usdc --amount 1.5 --to zcash"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Show the signing account and its native balance")]
    Status,
    #[command(about = "Quote, sign and publish a swap intent through the solver bus")]
    Swap {
        #[arg(long, help = "Asset to sell (registry symbol)")]
        from: String,
        #[arg(long, help = "Amount to sell, in whole units")]
        amount: Decimal,
        #[arg(long, help = "Asset to buy (registry symbol)")]
        to: String,
        #[arg(long, help = "Ask for an exact output amount instead")]
        amount_out: Option<Decimal>,
    },
    #[command(about = "Move funds from the wallet into the verifying contract")]
    Deposit {
        #[arg(long, default_value = "NEAR")]
        asset: String,
        #[arg(long)]
        amount: Decimal,
    },
    #[command(about = "Withdraw funds from the verifying contract to a NEAR or foreign address")]
    Withdraw {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, help = "Receiver account or foreign address")]
        to: String,
        #[arg(long, help = "Foreign network of the receiver, e.g. eth")]
        network: Option<String>,
        #[arg(long, help = "Settle with execute_intents instead of the solver bus")]
        on_chain: bool,
    },
    #[command(about = "Register the signing key with the verifying contract (idempotent)")]
    RegisterKey,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, credentials, and account balance readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Status => commands::status::run(),
        Command::Swap { from, amount, to, amount_out } => {
            commands::swap::run(SwapArgs { from, amount, to, amount_out })
        }
        Command::Deposit { asset, amount } => commands::deposit::run(asset, amount),
        Command::Withdraw { asset, amount, to, network, on_chain } => {
            commands::withdraw::run(WithdrawArgs { asset, amount, receiver: to, network, on_chain })
        }
        Command::RegisterKey => commands::register_key::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
