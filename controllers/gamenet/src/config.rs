//! Workload network configuration
//!
//! Two configuration surfaces feed the engine: the allocator's port range
//! from environment variables, and the free-form key/value map attached to
//! each workload (pod annotation / `GameServerSetSpec.network`).

use std::collections::{BTreeMap, BTreeSet};
use std::env;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::allocator::selection::SelectionPolicy;
use crate::error::ControllerError;
use crds::{Protocol, ZoneSubnet, NETWORK_CONF_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Configuration key: comma-separated candidate load balancer ids.
pub const CONF_LB_IDS: &str = "load-balancer-ids";
/// Configuration key: comma-separated `port[/protocol]` list per replica.
pub const CONF_PORTS: &str = "ports";
/// Configuration key: fixed (workload-set-keyed) binding flag.
pub const CONF_FIXED: &str = "fixed";
/// Configuration key: selection policy, `first-fit` or `scatter`.
pub const CONF_POLICY: &str = "policy";
/// Configuration key: keep pool resources after workload-set deletion.
pub const CONF_RETAIN: &str = "retain-resources";
/// Configuration key: extra prewarmed pool entries beyond the high-water mark.
pub const CONF_RESERVE: &str = "reserve";
/// Configuration key: comma-separated network line types to prewarm.
pub const CONF_ISP_TYPES: &str = "isp-types";
/// Configuration key: comma-separated `zone:subnet` placement pairs.
pub const CONF_ZONES: &str = "zones";

/// Global allocator settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Inclusive lower bound of the allocatable range
    pub min_port: i32,
    /// Exclusive upper bound of the allocatable range
    pub max_port: i32,
    /// Ports never handed out, regardless of bitmap state
    pub blocked_ports: BTreeSet<i32>,
}

impl AllocatorConfig {
    /// Reads `GAMENET_MIN_PORT`, `GAMENET_MAX_PORT`, and
    /// `GAMENET_BLOCKED_PORTS` from the environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        let min_port = read_port_env("GAMENET_MIN_PORT", 8000)?;
        let max_port = read_port_env("GAMENET_MAX_PORT", 8100)?;
        let blocked_ports = match env::var("GAMENET_BLOCKED_PORTS") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|p| {
                    p.trim().parse::<i32>().map_err(|_| {
                        ControllerError::InvalidConfig(format!(
                            "GAMENET_BLOCKED_PORTS entry is not a port: {p}"
                        ))
                    })
                })
                .collect::<Result<BTreeSet<i32>, _>>()?,
            _ => BTreeSet::new(),
        };
        Self::new(min_port, max_port, blocked_ports)
    }

    /// Validates and constructs an allocator range.
    pub fn new(
        min_port: i32,
        max_port: i32,
        blocked_ports: BTreeSet<i32>,
    ) -> Result<Self, ControllerError> {
        if min_port <= 0 || max_port > 65536 || min_port >= max_port {
            return Err(ControllerError::InvalidConfig(format!(
                "invalid port range [{min_port}, {max_port})"
            )));
        }
        Ok(Self {
            min_port,
            max_port,
            blocked_ports,
        })
    }

    /// Ports in `[min_port, max_port)`.
    #[must_use]
    pub fn range_size(&self) -> usize {
        (self.max_port - self.min_port) as usize
    }

    /// Blocked ports that fall inside the configured range.
    #[must_use]
    pub fn blocked_in_range(&self) -> usize {
        self.blocked_ports
            .iter()
            .filter(|p| (self.min_port..self.max_port).contains(*p))
            .count()
    }
}

fn read_port_env(name: &str, default: i32) -> Result<i32, ControllerError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<i32>().map_err(|_| {
            ControllerError::InvalidConfig(format!("{name} is not a port: {raw}"))
        }),
        Err(_) => Ok(default),
    }
}

/// One declared pod-local port.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfPort {
    /// Stable name used on the materialized network object
    pub name: String,
    /// Pod-local port number
    pub port: i32,
    /// Transport protocol
    pub protocol: Protocol,
}

/// Parsed per-workload network configuration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkConf {
    /// Ordered candidate load balancer ids (shared-LB mode)
    pub lb_ids: Vec<String>,
    /// Declared ports per replica
    pub ports: Vec<ConfPort>,
    /// Fixed bindings are keyed by the workload set and survive recreation
    pub fixed: bool,
    /// Load-balancer selection policy
    pub policy: SelectionPolicy,
    /// Keep pool resources when the workload set is deleted
    pub retain_resources: bool,
    /// Extra prewarmed pool entries beyond the high-water mark
    pub reserve: usize,
    /// Network line types to prewarm; empty disables the dedicated pool
    pub isp_types: Vec<String>,
    /// Zone/subnet placement for pool resources
    pub zones: Vec<ZoneSubnet>,
}

impl NetworkConf {
    /// Parses the free-form key/value map.
    pub fn parse(map: &BTreeMap<String, String>) -> Result<Self, ControllerError> {
        let ports = parse_ports(map.get(CONF_PORTS).map(String::as_str).unwrap_or(""))?;

        let lb_ids = split_list(map.get(CONF_LB_IDS));
        let isp_types = split_list(map.get(CONF_ISP_TYPES));
        let zones = parse_zones(map.get(CONF_ZONES))?;

        if lb_ids.is_empty() && isp_types.is_empty() {
            return Err(ControllerError::InvalidConfig(format!(
                "one of {CONF_LB_IDS} or {CONF_ISP_TYPES} must be set"
            )));
        }
        if !isp_types.is_empty() && zones.is_empty() {
            return Err(ControllerError::InvalidConfig(format!(
                "{CONF_ZONES} is required when {CONF_ISP_TYPES} is set"
            )));
        }

        let policy = match map.get(CONF_POLICY) {
            Some(raw) => raw.parse().map_err(ControllerError::InvalidConfig)?,
            None => SelectionPolicy::FirstFit,
        };

        let reserve = match map.get(CONF_RESERVE) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ControllerError::InvalidConfig(format!("{CONF_RESERVE} is not a count: {raw}"))
            })?,
            None => 0,
        };

        Ok(Self {
            lb_ids,
            ports,
            fixed: parse_flag(map.get(CONF_FIXED)),
            policy,
            retain_resources: parse_flag(map.get(CONF_RETAIN)),
            reserve,
            isp_types,
            zones,
        })
    }

    /// Parses the network-conf annotation; `None` when the pod carries none.
    pub fn from_annotations(meta: &ObjectMeta) -> Result<Option<Self>, ControllerError> {
        let Some(raw) = meta
            .annotations
            .as_ref()
            .and_then(|a| a.get(NETWORK_CONF_ANNOTATION))
        else {
            return Ok(None);
        };
        let map: BTreeMap<String, String> = serde_json::from_str(raw).map_err(|e| {
            ControllerError::InvalidConfig(format!("{NETWORK_CONF_ANNOTATION}: {e}"))
        })?;
        Self::parse(&map).map(Some)
    }

    /// Whether this workload uses the dedicated prewarmed pool.
    #[must_use]
    pub fn dedicated(&self) -> bool {
        !self.isp_types.is_empty()
    }

    /// Hash of the fields that shape the materialized network object.
    /// Stored on the object so drift re-materializes it.
    #[must_use]
    pub fn hash(&self) -> String {
        #[derive(Serialize)]
        struct Hashed<'a> {
            lb_ids: &'a [String],
            ports: &'a [ConfPort],
            fixed: bool,
        }
        let hashed = Hashed {
            lb_ids: &self.lb_ids,
            ports: &self.ports,
            fixed: self.fixed,
        };
        // Serialization of a struct with ordered fields is deterministic.
        let bytes = serde_json::to_vec(&hashed).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        hex::encode(&digest[..8])
    }
}

fn parse_flag(value: Option<&String>) -> bool {
    value.map(|v| v.trim().eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn split_list(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_ports(raw: &str) -> Result<Vec<ConfPort>, ControllerError> {
    let mut ports = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (port_str, proto_str) = match entry.split_once('/') {
            Some((p, proto)) => (p, proto),
            None => (entry, "TCP"),
        };
        let port: i32 = port_str.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{CONF_PORTS} entry is not a port: {entry}"))
        })?;
        if !(1..=65535).contains(&port) {
            return Err(ControllerError::InvalidConfig(format!(
                "{CONF_PORTS} entry out of range: {entry}"
            )));
        }
        let protocol: Protocol = proto_str
            .trim()
            .parse()
            .map_err(ControllerError::InvalidConfig)?;
        ports.push(ConfPort {
            name: format!("{}-{port}", proto_str.trim().to_ascii_lowercase()),
            port,
            protocol,
        });
    }
    if ports.is_empty() {
        return Err(ControllerError::InvalidConfig(format!(
            "{CONF_PORTS} must declare at least one port"
        )));
    }
    Ok(ports)
}

fn parse_zones(value: Option<&String>) -> Result<Vec<ZoneSubnet>, ControllerError> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };
    let mut zones = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((zone, subnet)) = entry.split_once(':') else {
            return Err(ControllerError::InvalidConfig(format!(
                "{CONF_ZONES} entry is not zone:subnet: {entry}"
            )));
        };
        zones.push(ZoneSubnet {
            zone: zone.trim().to_string(),
            subnet: subnet.trim().to_string(),
        });
    }
    Ok(zones)
}
