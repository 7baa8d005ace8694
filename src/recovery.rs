//! Read-only diagnostic scanner: walks the index and data region of a
//! fragment store and reports slot health without trusting the in-memory
//! free list the engine maintains. Grounded on the teacher's
//! `recovery::scanner` module (`BlockHealth`/`ScannedBlock`/`RecoveryReport`),
//! generalized from "scan a block stream for the INDEX block" to "scan an
//! index slot array and verify its own framing claims".
//!
//! This is ambient diagnostic tooling, not part of the core storage
//! contract — `FragmentStore::open` does its own (trusting) reconstruction
//! of the id map and free list; `scan` is for operators who want to verify
//! a file independently of that trust, e.g. after a suspected crash.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FragmentError;
use crate::header::{Header, INDEX_ENTRY_SIZE};
use crate::slot::IndexSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotHealth {
    /// Used slot; offsets in range and length-prefix framing checks out.
    Healthy,
    /// `used` bit clear — a tombstone, expected and benign.
    Tombstone,
    /// `used` bit set but the length prefix at `dataOffset` doesn't agree
    /// with the slot's own `dataLength`, or the payload fails to decode.
    FramingMismatch,
    /// `used` bit set but `[dataOffset, dataOffset+dataLength)` falls
    /// outside `[dataStart, dataEnd)`.
    OutOfBounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedSlot {
    pub slot_index: usize,
    pub fragment_id: u16,
    pub health: SlotHealth,
    pub data_offset: u32,
    pub data_len: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub slots: Vec<ScannedSlot>,
    pub healthy_count: usize,
    pub tombstone_count: usize,
    pub problem_count: usize,
}

impl ScanReport {
    pub fn health_pct(&self) -> f64 {
        if self.slots.is_empty() {
            return 100.0;
        }
        100.0 * (self.healthy_count + self.tombstone_count) as f64 / self.slots.len() as f64
    }

    pub fn summary(&self) -> String {
        format!(
            "{} slots: {} healthy, {} tombstoned, {} with problems ({:.1}% sound)",
            self.slots.len(),
            self.healthy_count,
            self.tombstone_count,
            self.problem_count,
            self.health_pct()
        )
    }

    /// One `fragment_id (hex) — health` line per non-healthy, non-tombstone
    /// slot, for the CLI's human-readable `inspect` output.
    pub fn problem_lines(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| matches!(s.health, SlotHealth::FramingMismatch | SlotHealth::OutOfBounds))
            .map(|s| format!("{} — {:?}", hex::encode(s.fragment_id.to_be_bytes()), s.health))
            .collect()
    }
}

/// Open `path` read-only and independently re-verify every index slot's
/// framing, without consulting or rebuilding the free-extent list.
pub fn scan(path: impl AsRef<Path>) -> Result<ScanReport, FragmentError> {
    let mut file = File::open(path)?;
    let header = Header::read(&mut file)?;
    scan_with_header(&mut file, &header)
}

fn scan_with_header(file: &mut File, header: &Header) -> Result<ScanReport, FragmentError> {
    let index_used = header.index_used as usize;
    file.seek(SeekFrom::Start(header.index_offset))?;

    let mut slots = Vec::with_capacity(index_used);
    let mut healthy_count = 0;
    let mut tombstone_count = 0;
    let mut problem_count = 0;

    for slot_index in 0..index_used {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        file.read_exact(&mut buf)?;
        let slot = IndexSlot::from_bytes(&buf);

        let health = if !slot.is_used() {
            tombstone_count += 1;
            SlotHealth::Tombstone
        } else {
            classify(file, header, &slot)?
        };

        match health {
            SlotHealth::Healthy => healthy_count += 1,
            SlotHealth::Tombstone => {}
            SlotHealth::FramingMismatch | SlotHealth::OutOfBounds => problem_count += 1,
        }

        slots.push(ScannedSlot {
            slot_index,
            fragment_id: slot.fragment_id,
            health,
            data_offset: slot.data_offset,
            data_len: slot.data_len,
        });

        // scanning the slot array advances the cursor past the data
        // region reads `classify` may have performed; seek back.
        file.seek(SeekFrom::Start(
            header.index_offset + (slot_index as u64 + 1) * INDEX_ENTRY_SIZE as u64,
        ))?;
    }

    Ok(ScanReport {
        slots,
        healthy_count,
        tombstone_count,
        problem_count,
    })
}

fn classify(file: &mut File, header: &Header, slot: &IndexSlot) -> Result<SlotHealth, FragmentError> {
    let start = slot.data_offset as u64;
    let end = start + slot.data_len as u64;
    if slot.data_len < 5 || start < header.data_start || end > header.data_end {
        return Ok(SlotHealth::OutOfBounds);
    }

    let mut prefix = [0u8; 4];
    file.seek(SeekFrom::Start(start))?;
    if file.read_exact(&mut prefix).is_err() {
        return Ok(SlotHealth::FramingMismatch);
    }
    let payload_len = u32::from_be_bytes(prefix) as usize;
    if payload_len == 0 || 4 + payload_len != slot.data_len as usize {
        return Ok(SlotHealth::FramingMismatch);
    }

    let mut buf = vec![0u8; payload_len];
    if file.read_exact(&mut buf).is_err() {
        return Ok(SlotHealth::FramingMismatch);
    }
    match crate::payload::decode(&buf) {
        Ok(_) => Ok(SlotHealth::Healthy),
        Err(_) => Ok(SlotHealth::FramingMismatch),
    }
}
