use clap::{arg, Arg, Command};

use crate::client::GatewayClient;
use crate::profile::{Profile, DEFAULT_ENDPOINT};

pub fn args() -> Command {
    Command::new("login")
        .about("save the api key and endpoint used by other commands")
        .arg_required_else_help(true)
        .arg(arg!(<APIKEY> "api key token"))
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .help("shipyard api endpoint")
                .default_value(DEFAULT_ENDPOINT),
        )
}

pub async fn handlers(model_match: &clap::ArgMatches) -> anyhow::Result<()> {
    let apikey = model_match
        .get_one::<String>("APIKEY")
        .cloned()
        .unwrap_or_default();
    let endpoint = model_match
        .get_one::<String>("endpoint")
        .cloned()
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());

    GatewayClient::new(&endpoint, &apikey).health().await?;

    let profile = Profile { endpoint, apikey };
    let profile_path = profile.save()?;

    tracing::info!(
        "logged in to {} - profile saved to {}",
        profile.endpoint,
        profile_path.display()
    );

    Ok(())
}
