//! Versioned little-endian binary formats
//!
//! Strings and blobs are `u32` length-prefixed. Per-relay columns are written
//! one field at a time for all relays (ids, then names, ...).
//!
//! Route matrix layout:
//! ```text
//! version u32 | relay count u32 | ids u64*n | names
//! [v>=2] datacenter ids u64*n | datacenter names
//! addresses | public keys
//! datacenter table: count u32, per dc { id u64, relay count u32, ids u64* }
//! [v>=3] latitudes f32*n | longitudes f32*n
//! entry count u32, per entry { direct i32, routes i32, per route { cost i32, relays i32, hash u32, ids u64* } }
//! ```
//!
//! Cost matrix layout (version 1): version, relay count, ids, names,
//! datacenter ids, datacenter names, addresses, public keys, latitudes,
//! longitudes, cost count u32, costs i32*count.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};

use crate::cost::CostMatrix;
use crate::matrix::{RouteMatrix, RouteMatrixEntry};
use crate::relay::Relay;
use crate::tri::tri_len;
use crate::{MatrixError, Result, MAX_RELAYS, MAX_RELAYS_PER_ROUTE, MAX_ROUTES_PER_PAIR, UNREACHABLE};

/// Current route matrix format version
pub const ROUTE_MATRIX_VERSION: u32 = 3;

/// Current cost matrix format version
pub const COST_MATRIX_VERSION: u32 = 1;

/// Binary snapshot format shared by the matrix types
pub trait MatrixCodec: Sized + Send + Sync + 'static {
    /// Name used in errors and logs
    const KIND: &'static str;

    fn encode(&self) -> Result<Bytes>;

    fn decode(bytes: Bytes) -> Result<Self>;
}

impl MatrixCodec for RouteMatrix {
    const KIND: &'static str = "route matrix";

    fn encode(&self) -> Result<Bytes> {
        write_route_matrix(self, ROUTE_MATRIX_VERSION)
    }

    fn decode(bytes: Bytes) -> Result<Self> {
        let mut r = Reader::new(bytes, Self::KIND);
        let version = r.u32()?;
        if version == 0 || version > ROUTE_MATRIX_VERSION {
            return Err(MatrixError::UnsupportedVersion {
                kind: Self::KIND,
                version,
            });
        }

        let n = check_relay_count(r.u32()? as usize)?;
        let ids = r.u64s(n)?;
        let names = r.strings(n)?;
        let (dc_ids, dc_names) = if version >= 2 {
            (r.u64s(n)?, r.strings(n)?)
        } else {
            (vec![0; n], vec![String::new(); n])
        };
        let addresses = r.addresses(n)?;
        let keys = r.blobs(n)?;

        let dc_count = r.u32()? as usize;
        let mut datacenter_relays = BTreeMap::new();
        for _ in 0..dc_count {
            let dc = r.u64()?;
            let count = r.u32()? as usize;
            datacenter_relays.insert(dc, r.u64s(count)?);
        }

        let (lats, lons) = if version >= 3 {
            (r.f32s(n)?, r.f32s(n)?)
        } else {
            (vec![0.0; n], vec![0.0; n])
        };

        let mut relays = build_relays(ids, names, dc_ids, dc_names, addresses, keys, lats, lons);
        if version < 2 {
            for (dc, members) in &datacenter_relays {
                for relay in relays.iter_mut().filter(|r| members.contains(&r.id)) {
                    relay.datacenter_id = *dc;
                }
            }
        }

        let count = r.u32()? as usize;
        let expected = tri_len(n);
        if count != expected {
            return Err(MatrixError::LengthMismatch {
                relays: n,
                expected,
                actual: count,
            });
        }

        // header count is untrusted; each entry takes at least 8 bytes
        let mut entries = Vec::with_capacity(count.min(r.remaining() / 8));
        for _ in 0..count {
            entries.push(r.entry()?);
        }

        Ok(RouteMatrix {
            relays,
            datacenter_relays,
            entries,
        })
    }
}

impl RouteMatrix {
    /// Encode in an older format version, for consumers not yet upgraded
    pub fn encode_version(&self, version: u32) -> Result<Bytes> {
        if version == 0 || version > ROUTE_MATRIX_VERSION {
            return Err(MatrixError::UnsupportedVersion {
                kind: Self::KIND,
                version,
            });
        }
        write_route_matrix(self, version)
    }
}

fn check_relay_count(n: usize) -> Result<usize> {
    if n > MAX_RELAYS {
        return Err(MatrixError::TooManyRelays {
            relays: n,
            max: MAX_RELAYS,
        });
    }
    Ok(n)
}

/// Length prefixes below are `u32`; bounded relay and slot counts keep them exact
fn check_lengths(relays: usize, slots: usize) -> Result<()> {
    check_relay_count(relays)?;
    let expected = tri_len(relays);
    if slots != expected {
        return Err(MatrixError::LengthMismatch {
            relays,
            expected,
            actual: slots,
        });
    }
    Ok(())
}

fn write_route_matrix(m: &RouteMatrix, version: u32) -> Result<Bytes> {
    let n = m.relays.len();
    check_lengths(n, m.entries.len())?;
    let mut buf = BytesMut::with_capacity(64 + n * 96 + m.entries.len() * 16);

    buf.put_u32_le(version);
    buf.put_u32_le(n as u32);
    for r in &m.relays {
        buf.put_u64_le(r.id);
    }
    for r in &m.relays {
        put_str(&mut buf, &r.name);
    }
    if version >= 2 {
        for r in &m.relays {
            buf.put_u64_le(r.datacenter_id);
        }
        for r in &m.relays {
            put_str(&mut buf, &r.datacenter_name);
        }
    }
    for r in &m.relays {
        put_str(&mut buf, &r.address.to_string());
    }
    for r in &m.relays {
        put_blob(&mut buf, &r.public_key);
    }

    buf.put_u32_le(m.datacenter_relays.len() as u32);
    for (dc, members) in &m.datacenter_relays {
        buf.put_u64_le(*dc);
        buf.put_u32_le(members.len() as u32);
        for id in members {
            buf.put_u64_le(*id);
        }
    }

    if version >= 3 {
        for r in &m.relays {
            buf.put_f32_le(r.latitude);
        }
        for r in &m.relays {
            buf.put_f32_le(r.longitude);
        }
    }

    buf.put_u32_le(m.entries.len() as u32);
    for e in &m.entries {
        buf.put_i32_le(e.direct_cost);
        buf.put_i32_le(e.num_routes as i32);
        for k in 0..e.num_routes {
            buf.put_i32_le(e.route_cost[k]);
            buf.put_i32_le(e.route_num_relays[k] as i32);
            buf.put_u32_le(e.route_hash[k]);
            for id in e.relays(k) {
                buf.put_u64_le(*id);
            }
        }
    }

    Ok(buf.freeze())
}

impl MatrixCodec for CostMatrix {
    const KIND: &'static str = "cost matrix";

    fn encode(&self) -> Result<Bytes> {
        let relays = self.relays();
        check_lengths(relays.len(), self.costs().len())?;
        let mut buf = BytesMut::with_capacity(64 + relays.len() * 96 + self.costs().len() * 4);

        buf.put_u32_le(COST_MATRIX_VERSION);
        buf.put_u32_le(relays.len() as u32);
        for r in relays {
            buf.put_u64_le(r.id);
        }
        for r in relays {
            put_str(&mut buf, &r.name);
        }
        for r in relays {
            buf.put_u64_le(r.datacenter_id);
        }
        for r in relays {
            put_str(&mut buf, &r.datacenter_name);
        }
        for r in relays {
            put_str(&mut buf, &r.address.to_string());
        }
        for r in relays {
            put_blob(&mut buf, &r.public_key);
        }
        for r in relays {
            buf.put_f32_le(r.latitude);
        }
        for r in relays {
            buf.put_f32_le(r.longitude);
        }

        buf.put_u32_le(self.costs().len() as u32);
        for c in self.costs() {
            buf.put_i32_le(*c);
        }

        Ok(buf.freeze())
    }

    fn decode(bytes: Bytes) -> Result<Self> {
        let mut r = Reader::new(bytes, Self::KIND);
        let version = r.u32()?;
        if version != COST_MATRIX_VERSION {
            return Err(MatrixError::UnsupportedVersion {
                kind: Self::KIND,
                version,
            });
        }

        let n = check_relay_count(r.u32()? as usize)?;
        let ids = r.u64s(n)?;
        let names = r.strings(n)?;
        let dc_ids = r.u64s(n)?;
        let dc_names = r.strings(n)?;
        let addresses = r.addresses(n)?;
        let keys = r.blobs(n)?;
        let lats = r.f32s(n)?;
        let lons = r.f32s(n)?;

        let count = r.u32()? as usize;
        let mut costs = Vec::with_capacity(count.min(r.remaining() / 4));
        for _ in 0..count {
            let cost = r.i32()?;
            costs.push(if cost < 0 { UNREACHABLE } else { cost });
        }

        CostMatrix::new(build_relays(ids, names, dc_ids, dc_names, addresses, keys, lats, lons), costs)
    }
}

#[allow(clippy::too_many_arguments)]
fn build_relays(
    ids: Vec<u64>,
    names: Vec<String>,
    dc_ids: Vec<u64>,
    dc_names: Vec<String>,
    addresses: Vec<SocketAddr>,
    keys: Vec<Vec<u8>>,
    lats: Vec<f32>,
    lons: Vec<f32>,
) -> Vec<Relay> {
    let mut columns = names
        .into_iter()
        .zip(dc_ids)
        .zip(dc_names)
        .zip(addresses)
        .zip(keys)
        .zip(lats.into_iter().zip(lons));

    ids.into_iter()
        .filter_map(|id| {
            let (((((name, dc_id), dc_name), address), key), (lat, lon)) = columns.next()?;
            Some(Relay {
                id,
                name,
                address,
                public_key: key,
                latitude: lat,
                longitude: lon,
                datacenter_id: dc_id,
                datacenter_name: dc_name,
            })
        })
        .collect()
}

fn put_str(buf: &mut BytesMut, s: &str) {
    put_blob(buf, s.as_bytes());
}

fn put_blob(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u32_le(b.len() as u32);
    buf.put_slice(b);
}

/// Bounds-checked cursor that reports truncation with its offset
struct Reader {
    buf: Bytes,
    len: usize,
    kind: &'static str,
}

impl Reader {
    fn new(buf: Bytes, kind: &'static str) -> Self {
        let len = buf.len();
        Self { buf, len, kind }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(MatrixError::Truncated {
                kind: self.kind,
                needed: n - self.buf.remaining(),
                offset: self.len - self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn u64s(&mut self, n: usize) -> Result<Vec<u64>> {
        self.need(n.saturating_mul(8))?;
        Ok((0..n).map(|_| self.buf.get_u64_le()).collect())
    }

    fn f32s(&mut self, n: usize) -> Result<Vec<f32>> {
        self.need(n.saturating_mul(4))?;
        Ok((0..n).map(|_| self.buf.get_f32_le()).collect())
    }

    fn blob(&mut self) -> Result<Bytes> {
        let len = self.u32()? as usize;
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    fn blobs(&mut self, n: usize) -> Result<Vec<Vec<u8>>> {
        (0..n).map(|_| self.blob().map(|b| b.to_vec())).collect()
    }

    fn string(&mut self) -> Result<String> {
        let raw = self.blob()?;
        String::from_utf8(raw.to_vec()).map_err(|_| MatrixError::InvalidString(self.kind))
    }

    fn strings(&mut self, n: usize) -> Result<Vec<String>> {
        (0..n).map(|_| self.string()).collect()
    }

    fn addresses(&mut self, n: usize) -> Result<Vec<SocketAddr>> {
        (0..n)
            .map(|_| {
                let s = self.string()?;
                if s.is_empty() {
                    return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
                }
                s.parse().map_err(|_| MatrixError::InvalidAddress(s))
            })
            .collect()
    }

    fn entry(&mut self) -> Result<RouteMatrixEntry> {
        let mut entry = RouteMatrixEntry {
            direct_cost: self.i32()?,
            ..RouteMatrixEntry::default()
        };

        let routes = self.i32()?;
        if routes < 0 || routes as usize > MAX_ROUTES_PER_PAIR {
            return Err(MatrixError::InvalidEntry(format!("{routes} routes")));
        }
        entry.num_routes = routes as usize;

        for k in 0..entry.num_routes {
            entry.route_cost[k] = self.i32()?;
            let relays = self.i32()?;
            if relays < 0 || relays as usize > MAX_RELAYS_PER_ROUTE {
                return Err(MatrixError::InvalidEntry(format!("{relays} relays in route")));
            }
            entry.route_num_relays[k] = relays as usize;
            entry.route_hash[k] = self.u32()?;
            for slot in 0..entry.route_num_relays[k] {
                entry.route_relays[k][slot] = self.u64()?;
            }
        }

        Ok(entry)
    }
}
