#![deny(unsafe_code)]
pub mod commands;
mod version;

use anyhow::Result;
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Custom styles for CLI help output
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());
use commands::command::Command;
use commands::express::Express;
use commands::insert_size::InsertSize;
use commands::libraries::Libraries;
use commands::sniff::Sniff;
use enum_dispatch::enum_dispatch;
use env_logger::Env;
use log::info;
use svexpress_lib::signals::install_interrupt_handler;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(styles = STYLES)]
struct Args {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[enum_dispatch(Command)]
#[derive(Parser, Debug)]
#[command(version)]
#[allow(clippy::large_enum_variant)]
enum Subcommand {
    // Calling
    #[command(display_order = 1)]
    Express(Express),

    // Utilities
    #[command(display_order = 2)]
    Sniff(Sniff),
    #[command(display_order = 3)]
    Libraries(Libraries),
    #[command(display_order = 4)]
    InsertSize(InsertSize),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    install_interrupt_handler();

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();

    info!("Running {}", version::VERSION.as_str());
    args.subcommand.execute(&command_line)
}
