use clap::Command;

mod client;
mod context;
mod deployment;
mod login;
mod profile;
mod table;
mod template;

use context::Context;

fn cli() -> Command {
    Command::new("shipyard")
        .about("publish deployments across clusters")
        .version("0.1.1")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(deployment::args())
        .subcommand(login::args())
        .subcommand(template::args())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("login", submatches)) => login::handlers(submatches).await,
        Some(("deployment", submatches)) => {
            deployment::handlers(submatches, &Context::load()?).await
        }
        Some(("template", submatches)) => template::handlers(submatches, &Context::load()?).await,
        _ => unreachable!(), // subcommand_required
    }
}
