use clap::{arg, Arg, Command};

use crate::context::Context;
use crate::table;

pub fn args() -> Command {
    Command::new("template")
        .about("inspect deployment templates")
        .subcommand_required(true)
        .subcommand(
            Command::new("latest")
                .about("show the newest template of a deployment")
                .arg(arg!(<DEPLOYMENT> "deployment name"))
                .arg(
                    Arg::new("namespace")
                        .long("namespace")
                        .short('n')
                        .help("namespace owning the deployment")
                        .required(true),
                )
                .arg(
                    Arg::new("app")
                        .long("app")
                        .short('a')
                        .help("app owning the deployment")
                        .required(true),
                )
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .help("print the template manifest")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

pub async fn handlers(model_match: &clap::ArgMatches, context: &Context) -> anyhow::Result<()> {
    match model_match.subcommand() {
        Some(("latest", latest_match)) => {
            let params = vec![
                (
                    "namespace",
                    latest_match
                        .get_one::<String>("namespace")
                        .cloned()
                        .unwrap_or_default(),
                ),
                (
                    "app",
                    latest_match
                        .get_one::<String>("app")
                        .cloned()
                        .unwrap_or_default(),
                ),
                (
                    "deployment",
                    latest_match
                        .get_one::<String>("DEPLOYMENT")
                        .cloned()
                        .unwrap_or_default(),
                ),
            ];

            let response = context
                .client
                .action("get_latest_deployment_tpl", &params)
                .await?;

            if let Some(template) = &response.template {
                table::print(
                    &["ID", "NAME", "USER", "DESCRIPTION", "CREATED"],
                    vec![vec![
                        template.id.to_string(),
                        template.name.clone(),
                        template.user.clone(),
                        template.description.clone(),
                        template.create_time.to_rfc3339(),
                    ]],
                );

                if latest_match.get_flag("manifest") {
                    let manifest: serde_json::Value = serde_json::from_str(&template.template)?;
                    println!("{}", serde_json::to_string_pretty(&manifest)?);
                }
            }

            table::finish(&response)
        }
        _ => unreachable!(), // subcommand_required
    }
}
