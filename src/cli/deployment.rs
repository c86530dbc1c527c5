use clap::{arg, Arg, ArgAction, Command};

use crate::context::Context;
use crate::table;

fn target_args(command: Command) -> Command {
    command
        .arg(arg!(<DEPLOYMENT> "deployment name"))
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .short('n')
                .help("namespace owning the deployment")
                .required(true),
        )
        .arg(
            Arg::new("cluster")
                .long("cluster")
                .short('c')
                .help("target cluster, repeat or comma separate for several")
                .action(ArgAction::Append)
                .required(true),
        )
}

pub fn args() -> Command {
    Command::new("deployment")
        .about("publish and operate deployments")
        .subcommand_required(true)
        .subcommand(
            target_args(Command::new("upgrade").about("patch images or environment and publish"))
                .arg(
                    Arg::new("image")
                        .long("image")
                        .short('i')
                        .help("container=image")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("env")
                        .long("env")
                        .short('e')
                        .help("KEY=VALUE set on every container that declares KEY")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("template-id")
                        .long("template-id")
                        .help("template to publish, or with --no-publish to patch")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new("no-publish")
                        .long("no-publish")
                        .help("only create templates")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("description")
                        .long("description")
                        .short('d')
                        .help("description recorded on new templates")
                        .default_value(""),
                ),
        )
        .subcommand(target_args(
            Command::new("restart").about("roll every pod of the deployment"),
        ))
        .subcommand(
            target_args(Command::new("scale").about("set the replica count")).arg(
                Arg::new("replicas")
                    .long("replicas")
                    .short('r')
                    .help("desired replicas")
                    .value_parser(clap::value_parser!(i64))
                    .required(true),
            ),
        )
        .subcommand(target_args(
            Command::new("status").about("show live template and rollout per cluster"),
        ))
}

fn joined(matches: &clap::ArgMatches, id: &str) -> String {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default()
}

fn target_params(matches: &clap::ArgMatches) -> Vec<(&'static str, String)> {
    vec![
        (
            "namespace",
            matches
                .get_one::<String>("namespace")
                .cloned()
                .unwrap_or_default(),
        ),
        (
            "deployment",
            matches
                .get_one::<String>("DEPLOYMENT")
                .cloned()
                .unwrap_or_default(),
        ),
        ("cluster", joined(matches, "cluster")),
    ]
}

pub async fn handlers(model_match: &clap::ArgMatches, context: &Context) -> anyhow::Result<()> {
    match model_match.subcommand() {
        Some(("upgrade", upgrade_match)) => {
            let mut params = target_params(upgrade_match);
            params.push(("images", joined(upgrade_match, "image")));
            params.push(("environments", joined(upgrade_match, "env")));
            params.push((
                "publish",
                (!upgrade_match.get_flag("no-publish")).to_string(),
            ));
            params.push((
                "description",
                upgrade_match
                    .get_one::<String>("description")
                    .cloned()
                    .unwrap_or_default(),
            ));

            if let Some(template_id) = upgrade_match.get_one::<i64>("template-id") {
                params.push(("template_id", template_id.to_string()));
            }

            let response = context.client.action("upgrade_deployment", &params).await?;

            table::print_clusters(&response);
            table::finish(&response)
        }
        Some(("restart", restart_match)) => {
            let response = context
                .client
                .action("restart_deployment", &target_params(restart_match))
                .await?;

            table::print_clusters(&response);
            table::finish(&response)
        }
        Some(("scale", scale_match)) => {
            let mut params = target_params(scale_match);

            if let Some(replicas) = scale_match.get_one::<i64>("replicas") {
                params.push(("replicas", replicas.to_string()));
            }

            let response = context.client.action("scale_deployment", &params).await?;

            table::print_clusters(&response);
            table::finish(&response)
        }
        Some(("status", status_match)) => {
            let response = context
                .client
                .action("get_deployment_status", &target_params(status_match))
                .await?;

            table::print_statuses(&response);
            table::finish(&response)
        }
        _ => unreachable!(), // subcommand_required
    }
}
