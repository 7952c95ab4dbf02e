//! Cells and mutations.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{LocalTime, Timestamp};

/// Liveness metadata of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellKind {
    Live,
    /// Expires once the clock reaches `local_deletion_time`.
    Expiring {
        ttl: u32,
        local_deletion_time: LocalTime,
    },
    /// A deletion marker, created at `local_deletion_time`.
    Tombstone { local_deletion_time: LocalTime },
}

/// One named value of a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: Timestamp,
    pub kind: CellKind,
}

impl Cell {
    pub fn live(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: Timestamp) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
            kind: CellKind::Live,
        }
    }

    /// A cell that expires `ttl` seconds after `now`.
    pub fn expiring(
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        timestamp: Timestamp,
        ttl: u32,
        now: LocalTime,
    ) -> Self {
        Self::expiring_at(name, value, timestamp, ttl, now + LocalTime::from(ttl))
    }

    pub fn expiring_at(
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        timestamp: Timestamp,
        ttl: u32,
        local_deletion_time: LocalTime,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
            kind: CellKind::Expiring {
                ttl,
                local_deletion_time,
            },
        }
    }

    pub fn tombstone(name: impl Into<Vec<u8>>, timestamp: Timestamp, now: LocalTime) -> Self {
        Self {
            name: name.into(),
            value: Vec::new(),
            timestamp,
            kind: CellKind::Tombstone {
                local_deletion_time: now,
            },
        }
    }

    /// Whether the cell holds data at `now`.
    pub fn is_live(&self, now: LocalTime) -> bool {
        match self.kind {
            CellKind::Live => true,
            CellKind::Expiring {
                local_deletion_time,
                ..
            } => now < local_deletion_time,
            CellKind::Tombstone { .. } => false,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.kind, CellKind::Tombstone { .. })
    }

    /// Whether `self` supersedes `other` for the same cell name.
    ///
    /// The higher timestamp wins. On a tie a tombstone beats data, and
    /// between two data cells the greater value wins so that every replica
    /// picks the same one.
    pub fn supersedes(&self, other: &Cell) -> bool {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match (self.is_tombstone(), other.is_tombstone()) {
                (true, false) => true,
                (false, true) => false,
                _ => self.value > other.value,
            },
        }
    }
}

/// A batch of cells for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mutation {
    cells: Vec<Cell>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(cell: Cell) -> Self {
        Self { cells: vec![cell] }
    }

    pub fn add(mut self, cell: Cell) -> Self {
        self.cells.push(cell);
        self
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
