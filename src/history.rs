//! The History Store: an in-memory deduped, frequency-ranked ring of entries
//! backed by a single byte pool, plus the on-disk encrypted append log that
//! persists it. The two halves are kept as distinct components talking
//! through a narrow `add`/`iter`/`search` interface — the log wrapper
//! consumes the in-memory store through calls, never through inheritance.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::crypto::Vault;
use crate::error::{ZishError, ZishResult};

pub const MAX_HISTORY_ENTRIES: usize = 10_000;
pub const MAX_COMMAND_LEN: usize = 2_048;
pub const DEFAULT_POOL_CAPACITY: usize = 4 * 1024 * 1024;

const RECORD_MAGIC: u32 = 0x5A49_5348; // "ZISH"
const RECORD_VERSION: u8 = 1;
const AAD_LEN: usize = 24;

fn validate_command(command: &str) -> ZishResult<()> {
    if command.is_empty() || command.len() > MAX_COMMAND_LEN {
        return Err(ZishError::CommandTooLong);
    }
    if !command
        .bytes()
        .all(|b| (0x20..=0x7e).contains(&b) || b == b'\t' || b == b'\n')
    {
        return Err(ZishError::UnsafeCommand);
    }
    Ok(())
}

fn hash_command(command: &str) -> u64 {
    use std::hash::Hasher;
    let mut hasher = twox_hash::XxHash64::with_seed(0);
    hasher.write(command.as_bytes());
    hasher.finish()
}

/// Immutable record of an executed command.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub hash: u64,
    offset: u32,
    length: u32,
    pub frequency: u16,
    pub last_used: u32,
    pub exit_code: u8,
    flags: u8,
}

const FLAG_SUCCESSFUL: u8 = 1 << 0;
const FLAG_BOOKMARKED: u8 = 1 << 1;

impl HistoryEntry {
    pub fn successful(&self) -> bool {
        self.flags & FLAG_SUCCESSFUL != 0
    }

    pub fn bookmarked(&self) -> bool {
        self.flags & FLAG_BOOKMARKED != 0
    }
}

/// One fuzzy-search hit, ranked by `score` (descending).
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub command: String,
    pub score: f64,
    pub index: usize,
}

/// The in-memory half of the History Store.
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    pool: Vec<u8>,
    pool_capacity: usize,
    hash_index: HashMap<u64, usize>,
    bookmarks: HashSet<usize>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_pool_capacity(DEFAULT_POOL_CAPACITY)
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_capacity(pool_capacity: usize) -> Self {
        HistoryStore {
            entries: Vec::new(),
            pool: Vec::new(),
            pool_capacity,
            hash_index: HashMap::new(),
            bookmarks: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn command_at(&self, idx: usize) -> &str {
        let entry = &self.entries[idx];
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        // Only ever populated via `validate_command`, which requires ASCII.
        std::str::from_utf8(&self.pool[start..end]).unwrap_or("")
    }

    /// Append a command to history, deduping and bumping frequency if it's
    /// already present.
    pub fn add(&mut self, command: &str, now: u32, exit_code: i32) -> ZishResult<()> {
        validate_command(command)?;
        let hash = hash_command(command);

        if let Some(&idx) = self.hash_index.get(&hash) {
            let entry = &mut self.entries[idx];
            entry.frequency = entry.frequency.saturating_add(1);
            entry.last_used = now;
            entry.exit_code = (exit_code & 0xff) as u8;
            if exit_code == 0 {
                entry.flags |= FLAG_SUCCESSFUL;
            } else {
                entry.flags &= !FLAG_SUCCESSFUL;
            }
            return Ok(());
        }

        if self.entries.len() >= MAX_HISTORY_ENTRIES {
            self.evict_oldest();
        }

        if self.pool.len() + command.len() > self.pool_capacity {
            return Err(ZishError::PoolFull);
        }

        let offset = self.pool.len() as u32;
        self.pool.extend_from_slice(command.as_bytes());
        let mut flags = 0u8;
        if exit_code == 0 {
            flags |= FLAG_SUCCESSFUL;
        }
        let entry = HistoryEntry {
            hash,
            offset,
            length: command.len() as u32,
            frequency: 1,
            last_used: now,
            exit_code: (exit_code & 0xff) as u8,
            flags,
        };
        let new_index = self.entries.len();
        self.entries.push(entry);
        self.hash_index.insert(hash, new_index);
        Ok(())
    }

    /// Evict the entry with the minimum `last_used` timestamp (O(n) scan,
    /// acceptable at this cap). The pool slice is leaked — the
    /// pool itself never shrinks, which is the accepted tradeoff for staying
    /// within `MAX_HISTORY_ENTRIES`.
    fn evict_oldest(&mut self) {
        let Some((oldest_idx, _)) = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_used)
        else {
            return;
        };

        self.entries.remove(oldest_idx);
        self.bookmarks.remove(&oldest_idx);
        self.bookmarks = self
            .bookmarks
            .iter()
            .map(|&i| if i > oldest_idx { i - 1 } else { i })
            .collect();
        self.rebuild_hash_index();
    }

    fn rebuild_hash_index(&mut self) {
        self.hash_index.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.hash_index.insert(entry.hash, idx);
        }
    }

    /// Toggle the bookmark flag for the most recent entry matching `command`.
    pub fn toggle_bookmark(&mut self, command: &str) -> ZishResult<bool> {
        validate_command(command)?;
        let hash = hash_command(command);
        let Some(&idx) = self.hash_index.get(&hash) else {
            return Err(ZishError::Other("no such history entry".into()));
        };
        let entry = &mut self.entries[idx];
        let now_bookmarked = entry.flags & FLAG_BOOKMARKED == 0;
        if now_bookmarked {
            entry.flags |= FLAG_BOOKMARKED;
            self.bookmarks.insert(idx);
        } else {
            entry.flags &= !FLAG_BOOKMARKED;
            self.bookmarks.remove(&idx);
        }
        Ok(now_bookmarked)
    }

    /// Fuzzy search, scored by subsequence match plus recency and frequency.
    /// Returns the top 10 by descending score, ties broken by ascending
    /// entry index.
    pub fn search(&self, query: &str, now: u32) -> ZishResult<Vec<SearchHit>> {
        validate_command(query)?;
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let command = self.command_at(idx);
                if !command.contains(query) {
                    return None;
                }
                let age = now.saturating_sub(entry.last_used);
                let recency_bonus = if age < 3600 {
                    2.0
                } else if age < 86_400 {
                    1.0
                } else {
                    0.0
                };
                let mut score = 1.0 + 0.1 * f64::from(entry.frequency) + recency_bonus;
                if entry.successful() {
                    score += 0.5;
                }
                if command.starts_with(query) {
                    score += 2.0;
                }
                if command == query {
                    score += 5.0;
                }
                Some(SearchHit { command: command.to_string(), score, index: idx })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        hits.truncate(10);
        Ok(hits)
    }

    /// All entries in insertion order, most recent last — used by the
    /// `history` builtin and by the editor's prefix-filtered navigation.
    pub fn iter_commands(&self) -> impl Iterator<Item = &str> {
        (0..self.entries.len()).map(move |idx| self.command_at(idx))
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn bookmarked_commands(&self) -> Vec<String> {
        self.bookmarks.iter().map(|&idx| self.command_at(idx).to_string()).collect()
    }
}

// ── On-disk encrypted log ──────────────────────────────────────────────────

/// One on-disk record's unencrypted header.
struct RecordHeader {
    instance: u8,
    sequence: u64,
    timestamp: u64,
}

impl RecordHeader {
    fn aad(&self) -> [u8; AAD_LEN] {
        let mut aad = [0u8; AAD_LEN];
        aad[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        aad[4] = RECORD_VERSION;
        aad[5] = 0; // reserved
        aad[6] = self.instance;
        aad[7] = 0; // padding
        aad[8..16].copy_from_slice(&self.sequence.to_le_bytes());
        aad[16..24].copy_from_slice(&self.timestamp.to_le_bytes());
        aad
    }
}

/// What kind of event a plaintext record payload encodes.
enum RecordPayload {
    Submit { exit_code: u8, command: String },
    BookmarkToggle { bookmarked: bool, command: String },
}

impl RecordPayload {
    fn encode(&self) -> Vec<u8> {
        match self {
            RecordPayload::Submit { exit_code, command } => {
                let mut buf = Vec::with_capacity(2 + command.len());
                buf.push(0);
                buf.push(*exit_code);
                buf.extend_from_slice(command.as_bytes());
                buf
            }
            RecordPayload::BookmarkToggle { bookmarked, command } => {
                let mut buf = Vec::with_capacity(2 + command.len());
                buf.push(1);
                buf.push(u8::from(*bookmarked));
                buf.extend_from_slice(command.as_bytes());
                buf
            }
        }
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        let command = String::from_utf8(bytes[2..].to_vec()).ok()?;
        match bytes[0] {
            0 => Some(RecordPayload::Submit { exit_code: bytes[1], command }),
            1 => Some(RecordPayload::BookmarkToggle { bookmarked: bytes[1] != 0, command }),
            _ => None,
        }
    }
}

/// The append-only encrypted log wrapper. Talks to [`HistoryStore`] only
/// through `add`/`toggle_bookmark`, never reaching into its internals.
pub struct HistoryLog {
    path: PathBuf,
    instance: u8,
    next_sequence: u64,
}

impl HistoryLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let next_sequence = Self::scan_last_sequence(path)?.map(|s| s + 1).unwrap_or(0);
        Ok(HistoryLog {
            path: path.to_path_buf(),
            instance: (std::process::id() & 0xff) as u8,
            next_sequence,
        })
    }

    fn scan_last_sequence(path: &Path) -> io::Result<Option<u64>> {
        let Ok(bytes) = fs::read(path) else {
            return Ok(None);
        };
        let mut last = None;
        let mut cursor = &bytes[..];
        while let Some((header, _blob, rest)) = read_one_record(cursor) {
            last = Some(header.sequence);
            cursor = rest;
        }
        Ok(last)
    }

    /// Read the first sealed record on disk, if any — used by
    /// [`crate::crypto::Vault::open`] to validate a candidate password.
    pub fn peek_first_record(path: &Path) -> Option<(Vec<u8>, Vec<u8>)> {
        let bytes = fs::read(path).ok()?;
        let (header, blob, _rest) = read_one_record(&bytes)?;
        Some((header.aad().to_vec(), blob.to_vec()))
    }

    fn append_payload(&mut self, vault: &Vault, payload: &RecordPayload, now: u64) -> ZishResult<()> {
        let header = RecordHeader {
            instance: self.instance,
            sequence: self.next_sequence,
            timestamp: now,
        };
        let aad = header.aad();
        let blob = vault.seal(&payload.encode(), &aad);

        let mut record = Vec::with_capacity(aad.len() + 4 + blob.len());
        record.extend_from_slice(&aad);
        record.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        record.extend_from_slice(&blob);

        let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&record)?;
        self.next_sequence += 1;
        Ok(())
    }

    pub fn append_submit(&mut self, vault: &Vault, command: &str, exit_code: u8, now: u64) -> ZishResult<()> {
        self.append_payload(vault, &RecordPayload::Submit { exit_code, command: command.to_string() }, now)
    }

    pub fn append_bookmark_toggle(&mut self, vault: &Vault, command: &str, bookmarked: bool, now: u64) -> ZishResult<()> {
        self.append_payload(vault, &RecordPayload::BookmarkToggle { bookmarked, command: command.to_string() }, now)
    }

    /// Replay every record on disk into a fresh [`HistoryStore`], in the
    /// order they were written.
    pub fn replay(path: &Path, vault: &Vault) -> ZishResult<HistoryStore> {
        let mut store = HistoryStore::new();
        let Ok(bytes) = fs::read(path) else {
            return Ok(store);
        };
        let mut cursor = &bytes[..];
        while let Some((header, blob, rest)) = read_one_record(cursor) {
            cursor = rest;
            let Ok(plaintext) = vault.open_blob(blob, &header.aad()) else {
                log::warn!("zish: history record {} failed to decrypt, skipping", header.sequence);
                continue;
            };
            let Some(payload) = RecordPayload::decode(&plaintext) else {
                continue;
            };
            match payload {
                RecordPayload::Submit { exit_code, command } => {
                    let _ = store.add(&command, header.timestamp as u32, exit_code as i32);
                }
                RecordPayload::BookmarkToggle { bookmarked, command } => {
                    if store.toggle_bookmark(&command).ok() != Some(bookmarked) {
                        // toggle_bookmark flips state; if it landed on the
                        // wrong side (e.g. replay ordering), flip again.
                        let _ = store.toggle_bookmark(&command);
                    }
                }
            }
        }
        Ok(store)
    }

    /// Rekey: decrypt every record with `old_vault`, reseal with `new_vault`,
    /// and atomically replace the log file.
    pub fn rekey(path: &Path, old_vault: &Vault, new_vault: &Vault) -> ZishResult<()> {
        let Ok(bytes) = fs::read(path) else {
            return Ok(());
        };
        let mut rewritten = Vec::with_capacity(bytes.len());
        let mut cursor = &bytes[..];
        while let Some((header, blob, rest)) = read_one_record(cursor) {
            cursor = rest;
            let plaintext = old_vault.open_blob(blob, &header.aad())?;
            let new_blob = new_vault.seal(&plaintext, &header.aad());
            rewritten.extend_from_slice(&header.aad());
            rewritten.extend_from_slice(&(new_blob.len() as u32).to_le_bytes());
            rewritten.extend_from_slice(&new_blob);
        }

        let tmp_path = path.with_extension("log.enc.tmp");
        fs::write(&tmp_path, &rewritten)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// Parse one record off the front of `bytes`, returning
/// `(header, blob, rest)`. Returns `None` if `bytes` doesn't hold a whole
/// record (end of file, or a truncated/corrupt tail).
fn read_one_record(bytes: &[u8]) -> Option<(RecordHeader, &[u8], &[u8])> {
    if bytes.len() < AAD_LEN + 4 {
        return None;
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
    if magic != RECORD_MAGIC {
        return None;
    }
    let version = bytes[4];
    if version != RECORD_VERSION {
        return None;
    }
    let instance = bytes[6];
    let sequence = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
    let timestamp = u64::from_le_bytes(bytes[16..24].try_into().ok()?);
    let entry_len = u32::from_le_bytes(bytes[24..28].try_into().ok()?) as usize;

    let blob_start = AAD_LEN + 4;
    let blob_end = blob_start.checked_add(entry_len)?;
    if bytes.len() < blob_end {
        return None;
    }

    let header = RecordHeader { instance, sequence, timestamp };
    Some((header, &bytes[blob_start..blob_end], &bytes[blob_end..]))
}
