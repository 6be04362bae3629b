//! Atomically swapped matrix snapshot with cached serialized bytes

use arc_swap::ArcSwap;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::MatrixCodec;
use crate::Result;

/// A published matrix and the bytes it was built from or encoded to
#[derive(Debug)]
pub struct Snapshot<M> {
    pub matrix: Arc<M>,
    pub bytes: Bytes,
    pub built_at: DateTime<Utc>,
}

/// Single writer, many readers.
///
/// The matrix and its bytes are swapped as one value, so a reader holding a
/// `Snapshot` always sees a matching pair and never a partially built pass.
pub struct MatrixStore<M: MatrixCodec> {
    current: ArcSwap<Snapshot<M>>,
}

/// Empty matrix, no bytes until the first publish
impl<M: MatrixCodec + Default> Default for MatrixStore<M> {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                matrix: Arc::new(M::default()),
                bytes: Bytes::new(),
                built_at: Utc::now(),
            }),
        }
    }
}

impl<M: MatrixCodec> MatrixStore<M> {
    pub fn new(initial: M) -> Result<Self> {
        let bytes = initial.encode()?;
        Ok(Self {
            current: ArcSwap::from_pointee(Self::snapshot_of(initial, bytes)),
        })
    }

    fn snapshot_of(matrix: M, bytes: Bytes) -> Snapshot<M> {
        Snapshot {
            matrix: Arc::new(matrix),
            bytes,
            built_at: Utc::now(),
        }
    }

    /// Encode and swap in a freshly built snapshot. Nothing changes if encoding fails.
    pub fn publish(&self, matrix: M) -> Result<()> {
        let bytes = matrix.encode()?;
        debug!(kind = M::KIND, bytes = bytes.len(), "publishing snapshot");
        self.current.store(Arc::new(Self::snapshot_of(matrix, bytes)));
        Ok(())
    }

    /// Decode and swap in a serialized snapshot.
    ///
    /// On a decode error the previous snapshot stays in place.
    pub fn publish_bytes(&self, bytes: Bytes) -> Result<()> {
        match M::decode(bytes.clone()) {
            Ok(matrix) => {
                self.current.store(Arc::new(Self::snapshot_of(matrix, bytes)));
                Ok(())
            }
            Err(e) => {
                warn!(kind = M::KIND, error = %e, "rejected snapshot, keeping last good");
                Err(e)
            }
        }
    }

    /// Matrix and bytes of the same pass
    pub fn snapshot(&self) -> Arc<Snapshot<M>> {
        self.current.load_full()
    }

    pub fn load(&self) -> Arc<M> {
        self.current.load().matrix.clone()
    }

    /// Serialized form of the current snapshot
    pub fn bytes(&self) -> Bytes {
        self.current.load().bytes.clone()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.current.load().built_at
    }
}
