//! Route handlers: translate runtime-compatible HTTP requests into cluster
//! operations (§4.6).

use std::collections::HashMap;

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::model::{Container, Image, Port};

use super::AppState;

/// Route parameters for every single-container route. These are registered
/// both bare (`/containers/:name/...`) and nested under `/:version` (§4.6),
/// so the matched path may carry a `name` segment alone or a `version` and a
/// `name` segment together — a scalar `Path<String>` only accepts a route
/// with exactly one captured segment and rejects the rest, so this struct
/// extracts whichever segments are present by name instead.
#[derive(Debug, Deserialize)]
struct ContainerParams {
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
    name: String,
}

/// Default reservation assumed for containers submitted through the native
/// create endpoint, which has no `Cpus`/`Memory` field in its wire format
/// (§4.6's extraction list covers only `Image`, `Cmd`, and the host-config
/// port fields). Mirrors the bootstrap example's own placement request.
const DEFAULT_CREATE_CPUS: f64 = 0.4;
const DEFAULT_CREATE_MEMORY: f64 = 256.0;

pub async fn ping() -> &'static str {
    "OK"
}

pub async fn info(State(state): State<AppState>) -> ClusterResult<Json<serde_json::Value>> {
    let containers = state.cluster.list_containers(true).await?;
    Ok(Json(json!({ "Containers": containers.len() })))
}

/// Native-shape container descriptor, the wire shape `docker ps` clients
/// expect. Names are prefixed with the owning engine id so containers with
/// identical names on different engines stay distinguishable (§4.6).
#[derive(Debug, Serialize)]
struct NativeContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names")]
    names: Vec<String>,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Ports")]
    ports: Vec<NativePort>,
}

#[derive(Debug, Serialize)]
struct NativePort {
    #[serde(rename = "PrivatePort")]
    private_port: u16,
    #[serde(rename = "PublicPort", skip_serializing_if = "Option::is_none")]
    public_port: Option<u16>,
    #[serde(rename = "Type")]
    typ: String,
}

fn to_native(container: &Container) -> NativeContainer {
    let name = container
        .name
        .clone()
        .unwrap_or_else(|| container.id.clone());
    let name = if name.starts_with('/') {
        name
    } else {
        format!("/{name}")
    };
    // `/<engine-id><name>` per §4.6 — `name` already carries its own leading
    // slash, so the two concatenate straight into e.g. `/h1/web1`.
    let prefixed = format!("/{}{}", container.engine_id, name);

    NativeContainer {
        id: container.id.clone(),
        names: vec![prefixed],
        image: container.image.name.clone(),
        state: container.state.clone(),
        status: container.state.clone(),
        ports: container
            .ports
            .iter()
            .map(|p| NativePort {
                private_port: p.container_port,
                public_port: if p.port == 0 { None } else { Some(p.port) },
                typ: p.proto.clone(),
            })
            .collect(),
    }
}

/// `GET /containers/json`, `/containers/ps` (resolves a §9 open question):
/// a live, cluster-wide query rather than the refresh cache, filtered to
/// running containers unless `all=1`.
pub async fn list_containers(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> ClusterResult<Json<Vec<NativeContainer>>> {
    let all = query.get("all").map(|v| v == "1").unwrap_or(false);
    let containers = state.cluster.list_containers(all).await?;

    let filtered: Vec<NativeContainer> = containers
        .iter()
        .filter(|c| all || c.is_running())
        .map(to_native)
        .collect();

    Ok(Json(filtered))
}

/// `GET /containers/{name}/json`, `/export`, `/changes`, `/top`, `/logs`:
/// redirect to the owning engine, preserving the original path and query. No
/// match means no body and no redirect.
pub async fn redirect_to_owner(
    State(state): State<AppState>,
    Path(params): Path<ContainerParams>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    match state.cluster.find_container(&params.name).await {
        Ok(Some(container)) => match state.cluster.engine_by_id(&container.engine_id) {
            Some(engine) => {
                let suffix = uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or(uri.path());
                let location = format!("{}{}", engine.address.as_str().trim_end_matches('/'), suffix);
                (
                    StatusCode::SEE_OTHER,
                    [(header::LOCATION, location)],
                )
                    .into_response()
            }
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Docker-compatible `HostConfig`, decoded only for the fields §4.6 names.
#[derive(Debug, Default, Deserialize)]
struct HostConfigRequest {
    #[serde(rename = "PortBindings", default)]
    port_bindings: HashMap<String, Vec<PortBindingRequest>>,
    #[serde(rename = "PublishAllPorts", default)]
    publish_all_ports: bool,
}

#[derive(Debug, Deserialize)]
struct PortBindingRequest {
    #[serde(rename = "HostIp", default)]
    host_ip: Option<String>,
    #[serde(rename = "HostPort", default)]
    host_port: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateContainerRequest {
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Cmd", default)]
    cmd: Vec<String>,
    #[serde(rename = "HostConfig", default)]
    host_config: HostConfigRequest,
}

/// Port key is `"<container-port>/<proto>"`. Keys that fail integer parsing
/// are silently skipped (§4.6).
fn extract_port_bindings(bindings: &HashMap<String, Vec<PortBindingRequest>>) -> Vec<Port> {
    let mut ports = Vec::new();

    for (key, values) in bindings {
        let Some((port_str, proto)) = key.split_once('/') else {
            continue;
        };
        let Ok(container_port) = port_str.parse::<u16>() else {
            continue;
        };

        for binding in values {
            let Some(host_port) = binding
                .host_port
                .as_deref()
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };

            ports.push(Port {
                proto: proto.to_string(),
                host_ip: binding.host_ip.clone(),
                port: host_port,
                container_port,
            });
        }
    }

    ports
}

/// `POST /containers/create`: build an `Image` from the native create-config
/// and submit it to the placement pipeline with `pull=true`. The wire format
/// carries no cpu/memory request, so `DEFAULT_CREATE_CPUS`/`_MEMORY` stand in
/// — `validate_image` rejects zero on both fields, so the endpoint would
/// otherwise never place anything.
pub async fn create_container(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    Json(request): Json<CreateContainerRequest>,
) -> ClusterResult<Json<serde_json::Value>> {
    let ports = extract_port_bindings(&request.host_config.port_bindings);

    let image = Image {
        name: request.image,
        cpus: DEFAULT_CREATE_CPUS,
        memory: DEFAULT_CREATE_MEMORY,
        type_tag: "service".to_string(),
        labels: HashMap::new(),
        environment: HashMap::new(),
        hostname: String::new(),
        domainname: String::new(),
        args: request.cmd,
        ports,
        publish_all_ports: request.host_config.publish_all_ports,
        container_name: query.get("name").cloned(),
    };

    let container = state.cluster.start(image, true).await?;
    Ok(Json(json!({ "Id": container.id })))
}

/// `POST /containers/{name}/start`: resolve the container by name and start
/// it on its already-assigned engine (not the placement pipeline — the
/// container already has an owning engine).
pub async fn start_container(
    State(state): State<AppState>,
    Path(params): Path<ContainerParams>,
    body: Option<Json<serde_json::Value>>,
) -> ClusterResult<Json<serde_json::Value>> {
    // The host-config body is decoded for wire compatibility only; no field
    // of it is consulted before dispatch, and a missing/malformed body must
    // not abort the call (§4.6, §9).
    if body.is_none() {
        debug!("start_container: request body absent or undecodable, proceeding anyway");
    }

    let container = state
        .cluster
        .find_container(&params.name)
        .await?
        .ok_or_else(|| ClusterError::NotFound(params.name.clone()))?;

    let id = state.cluster.start_existing(&container, true).await?;
    Ok(Json(json!({ "Id": id })))
}

/// `DELETE /containers/{name}`.
pub async fn remove_container(
    State(state): State<AppState>,
    Path(params): Path<ContainerParams>,
) -> ClusterResult<StatusCode> {
    let container = state
        .cluster
        .find_container(&params.name)
        .await?
        .ok_or_else(|| ClusterError::NotFound(params.name.clone()))?;

    state.cluster.remove(&container).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_port_bindings_parses_well_formed_key() {
        let mut bindings = HashMap::new();
        bindings.insert(
            "80/tcp".to_string(),
            vec![PortBindingRequest {
                host_ip: None,
                host_port: Some("8080".to_string()),
            }],
        );

        let ports = extract_port_bindings(&bindings);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].container_port, 80);
        assert_eq!(ports[0].proto, "tcp");
        assert_eq!(ports[0].port, 8080);
    }

    #[test]
    fn extract_port_bindings_skips_malformed_keys() {
        let mut bindings = HashMap::new();
        bindings.insert(
            "not-a-port/tcp".to_string(),
            vec![PortBindingRequest {
                host_ip: None,
                host_port: Some("8080".to_string()),
            }],
        );
        bindings.insert(
            "no-proto-separator".to_string(),
            vec![PortBindingRequest {
                host_ip: None,
                host_port: Some("8080".to_string()),
            }],
        );

        assert!(extract_port_bindings(&bindings).is_empty());
    }
}
