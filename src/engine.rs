//! The storage engine: opens/creates the file, loads metadata, and
//! orchestrates upsert/read, index growth, and the incremental compactor.
//!
//! Grounded on the teacher's `io_stream::SixCyWriter`/`SixCyReader` pair
//! (one struct owning the file handle plus in-memory metadata, with
//! `finalize`/`scan_blocks`-style load paths) but collapsed to a single
//! read-write struct since this format supports in-place mutation, unlike
//! the teacher's write-once archive.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::compaction;
use crate::config::EngineOptions;
use crate::error::FragmentError;
use crate::freelist::FreeList;
use crate::header::{Header, INDEX_ENTRY_SIZE};
use crate::payload::{self, PayloadEntry};
use crate::slot::IndexSlot;

/// A fragment store, open over a single file.
///
/// Not `Sync`; the engine does not synchronize internally. Callers running
/// multiple operations concurrently over one instance get undefined
/// behavior — serialize externally, the same contract the teacher's
/// `SixCyWriter` assumes of its caller.
pub struct FragmentStore {
    pub(crate) file: Option<File>,
    pub(crate) path: PathBuf,
    pub(crate) header: Header,
    /// Slot array in on-disk scan order; index here is the on-disk slot
    /// index, not the fragment id. Includes tombstones (`used = false`).
    pub(crate) slots: Vec<IndexSlot>,
    pub(crate) id_map: HashMap<u16, usize>,
    pub(crate) free_list: FreeList,
    pub(crate) options: EngineOptions,
}

/// Where a chunk's bytes landed, and what bookkeeping that choice implies.
pub(crate) enum Placement {
    InPlace { offset: u64, leftover: u64 },
    Reallocated { offset: u64 },
}

impl FragmentStore {
    /// Open or create the store at `path` with a fully specified config.
    pub fn open(path: impl AsRef<Path>, options: EngineOptions) -> Result<Self, FragmentError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let existed_nonempty = path.exists() && std::fs::metadata(&path)?.len() > 0;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if existed_nonempty {
            tracing::debug!(path = %path.display(), "opening existing fragment store");
            Self::load(path, file, options)
        } else {
            tracing::debug!(path = %path.display(), "creating new fragment store");
            Self::create(path, file, options)
        }
    }

    /// Convenience constructor matching spec's `open(versions?, activeVersion?)`.
    pub fn open_with_versions(
        path: impl AsRef<Path>,
        versions: Vec<String>,
        active_version: impl Into<String>,
    ) -> Result<Self, FragmentError> {
        Self::open(path, EngineOptions::new(versions, active_version))
    }

    fn create(path: PathBuf, file: File, options: EngineOptions) -> Result<Self, FragmentError> {
        let header =
            Header::with_capacity(&options.versions, &options.active_version, options.initial_index_capacity)?;

        let mut store = Self {
            file: Some(file),
            path,
            header,
            slots: Vec::new(),
            id_map: HashMap::new(),
            free_list: FreeList::new(),
            options,
        };

        let data_end = store.header.data_end;
        store.file_mut()?.set_len(data_end)?;
        store.persist_header()?;
        store.sync()?;
        store.free_list = FreeList::rebuild(store.header.data_start, store.header.data_end, Vec::new());
        Ok(store)
    }

    fn load(path: PathBuf, mut file: File, options: EngineOptions) -> Result<Self, FragmentError> {
        file.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut file)?;

        if !options.versions.is_empty() && options.versions != header.versions {
            tracing::warn!(
                path = %path.display(),
                "EngineOptions.versions ignored: on-disk version table is authoritative once created"
            );
        }

        let index_used = header.index_used as usize;
        let mut slots = Vec::with_capacity(index_used);
        file.seek(SeekFrom::Start(header.index_offset))?;
        for _ in 0..index_used {
            let mut buf = [0u8; INDEX_ENTRY_SIZE];
            file.read_exact(&mut buf)?;
            slots.push(IndexSlot::from_bytes(&buf));
        }

        let mut id_map = HashMap::new();
        let mut occupied = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            if slot.is_used() {
                if id_map.insert(slot.fragment_id, i).is_some() {
                    tracing::warn!(
                        path = %path.display(),
                        fragment_id = slot.fragment_id,
                        "duplicate fragment id in index; keeping the later slot"
                    );
                }
                occupied.push((slot.data_offset as u64, slot.data_len as u64));
            }
        }

        let free_list = FreeList::rebuild(header.data_start, header.data_end, occupied);

        Ok(Self {
            file: Some(file),
            path,
            header,
            slots,
            id_map,
            free_list,
            options,
        })
    }

    /// Release the handle and clear in-memory structures. Idempotent.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            self.slots.clear();
            self.id_map.clear();
            self.free_list = FreeList::new();
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn active_version(&self) -> &str {
        self.header.active_version_name()
    }

    pub fn available_versions(&self) -> &[String] {
        &self.header.versions
    }

    pub fn set_active_version(&mut self, name: &str) -> Result<(), FragmentError> {
        let idx = self
            .header
            .version_index(name)
            .ok_or_else(|| FragmentError::UnknownVersion { name: name.to_owned() })?;
        self.header.active_version = idx;
        self.persist_header()?;
        self.sync()?;
        Ok(())
    }

    /// `upsert(id, content, version)` per spec §4.1.
    pub fn upsert(&mut self, id: u16, content: &str, version: Option<&str>) -> Result<(), FragmentError> {
        let wrote = self.upsert_internal(id, content, version, false)?;
        if wrote {
            compaction::maybe_compact(self)?;
            self.persist_header()?;
            self.sync()?;
        }
        Ok(())
    }

    /// Returns `false` for the ensure-semantics no-op case; `true` if a
    /// write actually happened (the caller then owes a header persist).
    pub(crate) fn upsert_internal(
        &mut self,
        id: u16,
        content: &str,
        version: Option<&str>,
        force_move: bool,
    ) -> Result<bool, FragmentError> {
        let slot_idx = self.id_map.get(&id).copied();

        // Version-table validation precedes the missing-fragment check:
        // an unknown version is a caller error regardless of whether the
        // fragment exists, so it must be reported as `UnknownVersion`
        // rather than being masked by `FragmentNotFound`.
        let target_version_index = match version {
            Some(v) => {
                let idx = self
                    .header
                    .version_index(v)
                    .ok_or_else(|| FragmentError::UnknownVersion { name: v.to_owned() })?;
                if slot_idx.is_none() {
                    return Err(FragmentError::FragmentNotFound { id });
                }
                idx
            }
            None => {
                if slot_idx.is_some() {
                    return Ok(false); // ensure semantics: already exists, no-op.
                }
                self.header.active_version
            }
        };

        let mut entries = match slot_idx {
            Some(idx) => {
                let slot = self.slots[idx];
                self.read_payload_entries(&slot)?
            }
            None => Vec::new(),
        };
        entries.retain(|e| e.version_index != target_version_index);
        entries.push(PayloadEntry {
            version_index: target_version_index,
            data: content.as_bytes().to_vec(),
        });
        entries.sort_by_key(|e| e.version_index);

        let payload = payload::encode(&entries);
        let chunk_len = 4 + payload.len();
        if chunk_len > 0xFFFF {
            return Err(FragmentError::PayloadTooLarge { chunk_len });
        }

        let is_new = slot_idx.is_none();
        if is_new {
            self.ensure_index_capacity(self.slots.len() + 1)?;
        }

        let old_extent = slot_idx.map(|idx| {
            let s = self.slots[idx];
            (s.data_offset as u64, s.data_len as u64)
        });

        let placement = self.choose_write_offset(old_extent, chunk_len as u64, force_move);

        let write_offset = match placement {
            Placement::InPlace { offset, leftover } => {
                if leftover > 0 {
                    self.free_list.release(offset + chunk_len as u64, leftover);
                }
                offset
            }
            Placement::Reallocated { offset } => {
                if let Some((old_offset, old_len)) = old_extent {
                    self.free_list.release(old_offset, old_len);
                }
                offset
            }
        };

        let mut chunk = Vec::with_capacity(chunk_len);
        chunk.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        chunk.extend_from_slice(&payload);
        self.write_at_raw(write_offset, &chunk)?;

        let new_slot = IndexSlot::used(id, write_offset as u32, chunk_len as u16);
        let slot_array_idx = match slot_idx {
            Some(idx) => {
                self.slots[idx] = new_slot;
                idx
            }
            None => {
                let idx = self.slots.len();
                self.slots.push(new_slot);
                self.id_map.insert(id, idx);
                self.header.index_used = self.slots.len() as u32;
                idx
            }
        };
        self.write_slot(slot_array_idx)?;

        self.trim_data_end()?;

        Ok(true)
    }

    /// `get(id, version)` per spec §4.1.
    pub fn get(&mut self, id: u16, version: &str) -> Result<Option<String>, FragmentError> {
        let version_index = self
            .header
            .version_index(version)
            .ok_or_else(|| FragmentError::UnknownVersion { name: version.to_owned() })?;

        let idx = match self.id_map.get(&id).copied() {
            Some(idx) => idx,
            None => return Ok(None),
        };
        let slot = self.slots[idx];
        let entries = self.read_payload_entries(&slot)?;
        let bytes = entries
            .into_iter()
            .find(|e| e.version_index == version_index)
            .map(|e| e.data)
            .unwrap_or_default();
        let text = String::from_utf8(bytes)
            .map_err(|_| FragmentError::CorruptPayload { reason: "payload is not valid UTF-8".into() })?;
        Ok(Some(text))
    }

    pub(crate) fn read_payload_entries(&mut self, slot: &IndexSlot) -> Result<Vec<PayloadEntry>, FragmentError> {
        let mut prefix = [0u8; 4];
        self.read_at_raw(slot.data_offset as u64, &mut prefix)?;
        let payload_len = u32::from_be_bytes(prefix) as usize;
        if payload_len == 0 || 4 + payload_len != slot.data_len as usize {
            return Err(FragmentError::CorruptPayload {
                reason: format!(
                    "length prefix {payload_len} inconsistent with slot data_len {}",
                    slot.data_len
                ),
            });
        }
        let mut buf = vec![0u8; payload_len];
        self.read_at_raw(slot.data_offset as u64 + 4, &mut buf)?;
        payload::decode(&buf)
    }

    /// Shared by the public upsert path and the compactor's relocation:
    /// in-place reuse, else first-fit from the free list, else tail append.
    /// `force_move` bypasses in-place reuse unconditionally (the compactor
    /// always routes through the allocator, never reuses the slot it is
    /// trying to move out of).
    pub(crate) fn choose_write_offset(
        &mut self,
        old_extent: Option<(u64, u64)>,
        new_len: u64,
        force_move: bool,
    ) -> Placement {
        if !force_move {
            if let Some((old_offset, old_len)) = old_extent {
                if old_len >= new_len {
                    return Placement::InPlace {
                        offset: old_offset,
                        leftover: old_len - new_len,
                    };
                }
            }
        }

        if let Some(extent) = self.free_list.find_first_fit(new_len) {
            self.free_list.allocate(extent.offset, new_len);
            return Placement::Reallocated { offset: extent.offset };
        }

        let offset = self.header.data_end;
        self.header.data_end += new_len;
        Placement::Reallocated { offset }
    }

    fn trim_data_end(&mut self) -> Result<(), FragmentError> {
        loop {
            let trimmed = self.free_list.trim_tail(self.header.data_end);
            if trimmed == 0 {
                break;
            }
            self.header.data_end -= trimmed;
        }
        self.file_mut()?.set_len(self.header.data_end)?;
        Ok(())
    }

    fn ensure_index_capacity(&mut self, required_slots: usize) -> Result<(), FragmentError> {
        let capacity = self.header.index_capacity();
        if (required_slots as u64) <= capacity {
            return Ok(());
        }
        let mut new_capacity = capacity.max(1);
        while (required_slots as u64) > new_capacity {
            new_capacity *= 2;
        }
        self.grow_index_to(new_capacity)
    }

    /// Grow the index by shifting the entire data region forward, highest
    /// offset first, in fixed-size windows, so the shift never overwrites
    /// bytes not yet copied.
    fn grow_index_to(&mut self, new_capacity: u64) -> Result<(), FragmentError> {
        const SHIFT_WINDOW: u64 = 1 << 20; // 1 MiB

        let old_index_size = self.header.index_size;
        let new_index_size = new_capacity * INDEX_ENTRY_SIZE as u64;
        let growth = new_index_size - old_index_size;
        let old_data_end = self.header.data_end;
        let new_data_end = old_data_end + growth;

        self.file_mut()?.set_len(new_data_end)?;

        let region_len = old_data_end - self.header.data_start;
        let mut remaining = region_len;
        while remaining > 0 {
            let take = remaining.min(SHIFT_WINDOW);
            let src_offset = self.header.data_start + remaining - take;
            let dst_offset = src_offset + growth;
            let mut buf = vec![0u8; take as usize];
            self.read_at_raw(src_offset, &mut buf)?;
            self.write_at_raw(dst_offset, &buf)?;
            remaining -= take;
        }

        self.header.index_size = new_index_size;
        self.header.data_start += growth;
        self.header.data_end = new_data_end;

        for slot in self.slots.iter_mut() {
            if slot.is_used() {
                slot.data_offset += growth as u32;
            }
        }
        self.write_all_slots()?;
        self.persist_header()?;
        self.sync()?;

        let occupied: Vec<(u64, u64)> = self
            .slots
            .iter()
            .filter(|s| s.is_used())
            .map(|s| (s.data_offset as u64, s.data_len as u64))
            .collect();
        self.free_list = FreeList::rebuild(self.header.data_start, self.header.data_end, occupied);

        tracing::debug!(
            path = %self.path.display(),
            new_capacity,
            growth,
            "grew index and shifted data region"
        );
        Ok(())
    }

    pub(crate) fn write_slot(&mut self, array_idx: usize) -> Result<(), FragmentError> {
        let offset = self.header.index_offset + array_idx as u64 * INDEX_ENTRY_SIZE as u64;
        let bytes = self.slots[array_idx].to_bytes();
        self.write_at_raw(offset, &bytes)
    }

    fn write_all_slots(&mut self) -> Result<(), FragmentError> {
        for idx in 0..self.slots.len() {
            self.write_slot(idx)?;
        }
        Ok(())
    }

    pub(crate) fn persist_header(&mut self) -> Result<(), FragmentError> {
        let mut buf = Vec::with_capacity(crate::header::HEADER_SIZE);
        self.header.write(&mut buf)?;
        self.write_at_raw(0, &buf)
    }

    pub(crate) fn sync(&mut self) -> Result<(), FragmentError> {
        self.file_mut()?.sync_all()?;
        Ok(())
    }

    pub(crate) fn file_mut(&mut self) -> Result<&mut File, FragmentError> {
        self.file.as_mut().ok_or_else(FragmentError::closed)
    }

    pub(crate) fn read_at_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), FragmentError> {
        let f = self.file_mut()?;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)?;
        Ok(())
    }

    pub(crate) fn write_at_raw(&mut self, offset: u64, buf: &[u8]) -> Result<(), FragmentError> {
        let f = self.file_mut()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(buf)?;
        Ok(())
    }
}

impl Drop for FragmentStore {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(err) = self.persist_header() {
                tracing::warn!(error = %err, "failed to persist header while dropping fragment store");
            }
        }
    }
}

/// Parse a caller-chosen textual fragment id into its `u16` storage form.
/// Accepts exactly lowercase 4-hex-digit strings, per spec §6.2.
pub fn parse_fragment_id(text: &str) -> Result<u16, FragmentError> {
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(FragmentError::BadFragmentId { text: text.to_owned() });
    }
    u16::from_str_radix(text, 16).map_err(|_| FragmentError::BadFragmentId { text: text.to_owned() })
}
