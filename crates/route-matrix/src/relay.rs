//! Relay metadata carried by every matrix snapshot

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::net::SocketAddr;

/// A relay node as seen by one topology snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    pub id: u64,
    pub name: String,
    pub address: SocketAddr,
    #[serde(default)]
    pub public_key: Vec<u8>,
    pub latitude: f32,
    pub longitude: f32,
    pub datacenter_id: u64,
    #[serde(default)]
    pub datacenter_name: String,
}

impl Relay {
    pub fn new(id: u64, name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            id,
            name: name.into(),
            address,
            public_key: Vec::new(),
            latitude: 0.0,
            longitude: 0.0,
            datacenter_id: 0,
            datacenter_name: String::new(),
        }
    }

    pub fn with_location(mut self, latitude: f32, longitude: f32) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_datacenter(mut self, id: u64, name: impl Into<String>) -> Self {
        self.datacenter_id = id;
        self.datacenter_name = name.into();
        self
    }

    pub fn with_public_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.public_key = key.into();
        self
    }
}

/// Haversine distance between two points in km
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const R: f64 = 6371.0; // Earth radius in km

    let lat1_rad = lat1 * PI / 180.0;
    let lat2_rad = lat2 * PI / 180.0;
    let dlat = (lat2 - lat1) * PI / 180.0;
    let dlon = (lon2 - lon1) * PI / 180.0;

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    R * c
}
