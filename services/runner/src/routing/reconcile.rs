//! Route materialization.
//!
//! Declared routes name versions; reconciled routes name addresses. A
//! scale-to-zero HTTP destination is pointed at the activation edge with
//! the true address tucked into forward metadata, so a cold request can
//! wake the workload and still land where it was headed. Warm and TCP
//! destinations go direct.

use std::collections::BTreeMap;

use strato_model::{
    ForwardInfo, Protocol, ReconciledDestination, ReconciledRoute, Route, RouteError, RouteTarget,
    ScaleConfig, ServiceSpec, DEFAULT_REQUEST_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Addressing inputs the reconciler needs beyond the declared state.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    pub gate_host: &'a str,
    pub gate_port: u16,
    pub cluster_domain: &'a str,
}

impl ReconcileContext<'_> {
    /// Internal DNS name a version answers on when reached directly.
    fn direct_host(&self, project: &str, service: &str, version: &str) -> String {
        format!("{service}-{version}.{project}.svc.{}", self.cluster_domain)
    }
}

/// One catch-all route per declared port, pointed at the spec's version.
pub fn default_routes(spec: &ServiceSpec) -> Vec<Route> {
    spec.ports
        .iter()
        .map(|port| Route {
            id: format!("{}-{}", port.protocol, port.port),
            source: strato_model::RouteSource {
                protocol: port.protocol,
                port: port.port,
            },
            targets: vec![RouteTarget::Version {
                version: spec.version.clone(),
                port: port.port,
                weight: 100,
            }],
            request_retries: None,
            request_timeout_secs: None,
        })
        .collect()
}

/// Materialize a full route set from declared intent.
pub fn reconcile_routes(
    ctx: &ReconcileContext<'_>,
    project: &str,
    service: &str,
    declared: &[Route],
    scale_configs: &BTreeMap<String, ScaleConfig>,
) -> Result<Vec<ReconciledRoute>, RouteError> {
    declared
        .iter()
        .map(|route| reconcile_route(ctx, project, service, route, scale_configs))
        .collect()
}

fn reconcile_route(
    ctx: &ReconcileContext<'_>,
    project: &str,
    service: &str,
    route: &Route,
    scale_configs: &BTreeMap<String, ScaleConfig>,
) -> Result<ReconciledRoute, RouteError> {
    if route.source.port == 0 {
        return Err(RouteError::ZeroPort);
    }
    if route.targets.is_empty() {
        return Err(RouteError::NoTargets);
    }

    let destinations = route
        .targets
        .iter()
        .map(|target| reconcile_destination(ctx, project, service, route.source.protocol, target, scale_configs))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReconciledRoute {
        name: format!("{}-{}", route.source.protocol, route.source.port),
        protocol: route.source.protocol,
        source_port: route.source.port,
        retries: route.request_retries.unwrap_or(DEFAULT_REQUEST_RETRIES),
        timeout_secs: route
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        destinations,
    })
}

fn reconcile_destination(
    ctx: &ReconcileContext<'_>,
    project: &str,
    service: &str,
    protocol: Protocol,
    target: &RouteTarget,
    scale_configs: &BTreeMap<String, ScaleConfig>,
) -> Result<ReconciledDestination, RouteError> {
    match target {
        RouteTarget::External { host, port, weight } => Ok(ReconciledDestination {
            host: host.clone(),
            port: *port,
            weight: *weight,
            version: None,
            forward: None,
        }),
        RouteTarget::Version {
            version,
            port,
            weight,
        } => {
            let scale = scale_configs
                .get(version)
                .ok_or_else(|| RouteError::UnknownVersion {
                    version: version.clone(),
                    service: service.to_string(),
                })?;
            let direct = ctx.direct_host(project, service, version);

            // Only HTTP can be held at the edge and replayed.
            if protocol == Protocol::Http && scale.scales_to_zero() {
                Ok(ReconciledDestination {
                    host: ctx.gate_host.to_string(),
                    port: ctx.gate_port,
                    weight: *weight,
                    version: Some(version.clone()),
                    forward: Some(ForwardInfo {
                        project: project.to_string(),
                        service: service.to_string(),
                        host: direct,
                        port: *port,
                        version: version.clone(),
                    }),
                })
            } else {
                Ok(ReconciledDestination {
                    host: direct,
                    port: *port,
                    weight: *weight,
                    version: Some(version.clone()),
                    forward: None,
                })
            }
        }
    }
}

/// Rewrite an existing set after scale configs change. Only destinations
/// whose indirection no longer matches their version's floor are touched;
/// everything else is carried over bit for bit.
pub fn patch_transitions(
    ctx: &ReconcileContext<'_>,
    project: &str,
    service: &str,
    current: &[ReconciledRoute],
    scale_configs: &BTreeMap<String, ScaleConfig>,
) -> Vec<ReconciledRoute> {
    current
        .iter()
        .map(|route| ReconciledRoute {
            destinations: route
                .destinations
                .iter()
                .map(|dest| patch_destination(ctx, project, service, route.protocol, dest, scale_configs))
                .collect(),
            ..route.clone()
        })
        .collect()
}

fn patch_destination(
    ctx: &ReconcileContext<'_>,
    project: &str,
    service: &str,
    protocol: Protocol,
    dest: &ReconciledDestination,
    scale_configs: &BTreeMap<String, ScaleConfig>,
) -> ReconciledDestination {
    let Some(version) = &dest.version else {
        return dest.clone();
    };
    let Some(scale) = scale_configs.get(version) else {
        return dest.clone();
    };

    let should_indirect = protocol == Protocol::Http && scale.scales_to_zero();
    match (&dest.forward, should_indirect) {
        (None, false) | (Some(_), true) => dest.clone(),
        // Floor dropped to zero: park the true address in forward metadata.
        (None, true) => ReconciledDestination {
            host: ctx.gate_host.to_string(),
            port: ctx.gate_port,
            weight: dest.weight,
            version: dest.version.clone(),
            forward: Some(ForwardInfo {
                project: project.to_string(),
                service: service.to_string(),
                host: dest.host.clone(),
                port: dest.port,
                version: version.clone(),
            }),
        },
        // Floor raised above zero: the forward metadata is the true address.
        (Some(forward), false) => ReconciledDestination {
            host: forward.host.clone(),
            port: forward.port,
            weight: dest.weight,
            version: dest.version.clone(),
            forward: None,
        },
    }
}

/// Drop a deleted version's destinations; routes left empty go with it.
pub fn prune_version(current: &[ReconciledRoute], version: &str) -> Vec<ReconciledRoute> {
    current
        .iter()
        .filter_map(|route| {
            let destinations: Vec<_> = route
                .destinations
                .iter()
                .filter(|dest| dest.version.as_deref() != Some(version))
                .cloned()
                .collect();
            if destinations.is_empty() {
                return None;
            }
            Some(ReconciledRoute {
                destinations,
                ..route.clone()
            })
        })
        .collect()
}
