use ascii_table::{Align, AsciiTable};

use shipyard::http::ActionResponse;

pub fn print(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut ascii_table = AsciiTable::default();

    for (index, header) in headers.iter().enumerate() {
        ascii_table
            .column(index)
            .set_header(*header)
            .set_align(Align::Left);
    }

    ascii_table.print(rows);
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "-".to_owned())
}

pub fn print_clusters(response: &ActionResponse) {
    if let Some(operation_id) = &response.operation_id {
        tracing::info!("operation {operation_id}");
    }

    let rows = response
        .clusters
        .iter()
        .map(|cluster| {
            vec![
                cluster.cluster.clone(),
                optional(cluster.template_id),
                if cluster.success { "ok" } else { "failed" }.to_owned(),
                cluster.error.clone().unwrap_or_default(),
            ]
        })
        .collect();

    print(&["CLUSTER", "TEMPLATE ID", "RESULT", "ERROR"], rows);
}

pub fn print_statuses(response: &ActionResponse) {
    let rows = response
        .statuses
        .iter()
        .map(|status| {
            let replicas = status.replicas.unwrap_or_default();

            vec![
                status.cluster.clone(),
                optional(status.template_id),
                status.healthz.to_string(),
                format!("{}/{}", replicas.ready, replicas.desired),
                replicas.updated.to_string(),
                replicas.available.to_string(),
                status.error.clone().unwrap_or_default(),
            ]
        })
        .collect();

    print(
        &["CLUSTER", "TEMPLATE ID", "HEALTHZ", "READY", "UPDATED", "AVAILABLE", "ERROR"],
        rows,
    );

    let pod_rows: Vec<Vec<String>> = response
        .statuses
        .iter()
        .flat_map(|status| {
            status.pods.iter().map(move |pod| {
                let restarts: i32 = pod
                    .containers
                    .iter()
                    .map(|container| container.restart_count)
                    .sum();

                vec![
                    status.cluster.clone(),
                    pod.name.clone(),
                    pod.state.clone(),
                    pod.pod_ip.clone(),
                    pod.node_name.clone(),
                    restarts.to_string(),
                    optional(pod.start_time.as_deref()),
                ]
            })
        })
        .collect();

    if !pod_rows.is_empty() {
        print(
            &["CLUSTER", "POD", "STATE", "IP", "NODE", "RESTARTS", "STARTED"],
            pod_rows,
        );
    }
}

/// Errors the action reported for the batch, with an exit failure when anything failed.
pub fn finish(response: &ActionResponse) -> anyhow::Result<()> {
    if response.is_success() {
        return Ok(());
    }

    for error in &response.errors {
        tracing::error!("{error}");
    }

    Err(anyhow::anyhow!(
        "action failed with code {}",
        response.code
    ))
}
