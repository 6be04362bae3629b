//! Data loading from JSON files

use crate::{OptimizerError, Result};
use relay_stats::RelayStatsUpdate;
use route_matrix::Relay;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use tracing::{info, warn};

/// Validate latitude is in valid range
fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

/// Validate longitude is in valid range
fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && lon.is_finite()
}

/// Sanitize name (printable, limited length)
fn sanitize_name(name: String) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || " -_.,()".contains(*c))
        .take(256)
        .collect()
}

/// Raw relay from the registry dump
#[derive(Debug, Deserialize)]
struct RawRelay {
    id: Option<u64>,
    name: Option<String>,
    address: Option<String>,
    /// Hex encoded
    public_key: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    datacenter_id: Option<u64>,
    datacenter_name: Option<String>,
}

/// Relay registry file: a bare array or `{"relays": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayFile {
    List(Vec<RawRelay>),
    Wrapped { relays: Vec<RawRelay> },
}

fn parse_relay(raw: RawRelay, index: usize) -> std::result::Result<Relay, &'static str> {
    let id = raw.id.ok_or("missing id")?;
    let address: SocketAddr = raw
        .address
        .as_deref()
        .ok_or("missing address")?
        .parse()
        .map_err(|_| "bad address")?;
    let lat = raw.latitude.filter(|l| is_valid_latitude(*l)).ok_or("bad latitude")?;
    let lon = raw.longitude.filter(|l| is_valid_longitude(*l)).ok_or("bad longitude")?;
    let public_key = match raw.public_key {
        Some(key) => hex::decode(key.trim()).map_err(|_| "bad public key")?,
        None => Vec::new(),
    };

    let name = sanitize_name(raw.name.unwrap_or_else(|| format!("relay-{index}")));
    let datacenter_name = sanitize_name(raw.datacenter_name.unwrap_or_default());

    Ok(Relay::new(id, name, address)
        .with_location(lat as f32, lon as f32)
        .with_datacenter(raw.datacenter_id.unwrap_or(0), datacenter_name)
        .with_public_key(public_key))
}

/// Load the relay registry. Invalid and duplicate relays are skipped.
pub fn load_relays(path: impl AsRef<Path>) -> Result<Vec<Relay>> {
    let path = path.as_ref();
    info!("Loading relays from {:?}", path);

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let raw = match serde_json::from_reader::<_, RelayFile>(reader)? {
        RelayFile::List(relays) | RelayFile::Wrapped { relays } => relays,
    };

    let mut relays = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;

    for (i, entry) in raw.into_iter().enumerate() {
        match parse_relay(entry, i) {
            Ok(relay) if seen.insert(relay.id) => relays.push(relay),
            Ok(relay) => {
                warn!(relay_id = relay.id, "duplicate relay id");
                skipped += 1;
            }
            Err(reason) => {
                warn!(index = i, reason, "skipping relay");
                skipped += 1;
            }
        }
    }

    info!("Loaded {} relays ({} skipped)", relays.len(), skipped);

    if relays.is_empty() {
        return Err(OptimizerError::NoRelays);
    }
    Ok(relays)
}

/// Load relay stats updates (array of `{relay_id, pings: [...]}`)
pub fn load_stats(path: impl AsRef<Path>) -> Result<Vec<RelayStatsUpdate>> {
    let path = path.as_ref();
    info!("Loading relay stats from {:?}", path);

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let updates: Vec<RelayStatsUpdate> = serde_json::from_reader(reader)?;

    let pings: usize = updates.iter().map(|u| u.pings.len()).sum();
    info!("Loaded {} stats updates ({} pings)", updates.len(), pings);

    Ok(updates)
}
