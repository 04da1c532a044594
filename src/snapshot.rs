use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

const UUID: &str = r"[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}";
const SPACE_NOTE: &str = "this snapshot limits the minimum size";

static DISK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Snapshots?[ \t]+for[ \t]+(\S+)").expect("Failed to compile disk regex")
});

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        concat!(
            r"(?m)^[ \t|+\-]*({uuid})[^\r\n]*\r?\n",
            r"[ \t|]*Name:[ \t]*([^\r\n]*)\r?\n",
            r"[ \t|]*XID:[ \t]*(\d+)[ \t]*\r?\n",
            r"[ \t|]*Purgeable:[ \t]*(?i:(yes|no))\b",
        ),
        uuid = UUID
    ))
    .expect("Failed to compile snapshot block regex")
});

static BLOCK_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^[ \t|+\-]*{}", UUID)).expect("Failed to compile block start regex")
});

static MOUNT_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Mount[ \t]+Point[ \t]*:[ \t]*(.+?)[ \t\r]*$")
        .expect("Failed to compile mount point regex")
});

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}-\d{6})").expect("Failed to compile timestamp regex")
});

/// One APFS snapshot as reported by `diskutil apfs listSnapshots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub disk: String,
    pub uuid: String,
    pub name: String,
    pub xid: String,
    pub purgeable: bool,
    /// The listing notes that this snapshot limits the minimum size of
    /// the APFS container.
    pub space_reserving: bool,
}

/// Snapshots keyed by their 1-based position in the listing text.
pub type SnapshotIndex = BTreeMap<usize, Snapshot>;

impl Snapshot {
    /// Creation time encoded in Time Machine snapshot names
    /// (`com.apple.TimeMachine.2024-01-01-101500.local`).
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let stamp = TIMESTAMP_RE.captures(&self.name)?.get(1)?.as_str();
        NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d-%H%M%S").ok()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Disk: {}", self.disk)?;
        writeln!(f, "UUID: {}", self.uuid)?;
        writeln!(f, "Name: {}", self.name)?;
        if let Some(created) = self.created_at() {
            writeln!(f, "Created: {}", created.format("%Y-%m-%d %H:%M:%S"))?;
        }
        writeln!(f, "XID: {}", self.xid)?;
        write!(f, "Purgeable: {}", if self.purgeable { "YES" } else { "NO" })?;
        if self.space_reserving {
            write!(f, "\nLimits minimum container size: YES")?;
        }
        Ok(())
    }
}

/// Turns the free-form listing text into an index. Blocks missing any of
/// the UUID/Name/XID/Purgeable lines are skipped.
pub fn parse_snapshots(text: &str) -> SnapshotIndex {
    let disk = DISK_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut index = SnapshotIndex::new();
    for caps in BLOCK_RE.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        let note_end = BLOCK_START_RE
            .find_at(text, whole.end())
            .map(|m| m.start())
            .unwrap_or(text.len());
        let note = &text[whole.end()..note_end];

        let snapshot = Snapshot {
            disk: disk.clone(),
            uuid: caps[1].to_string(),
            name: caps[2].trim().to_string(),
            xid: caps[3].to_string(),
            purgeable: caps[4].eq_ignore_ascii_case("yes"),
            space_reserving: note.to_lowercase().contains(SPACE_NOTE),
        };
        index.insert(index.len() + 1, snapshot);
    }
    index
}

/// Every `Mount Point:` value in `tmutil destinationinfo` output.
pub fn extract_mount_points(text: &str) -> Vec<String> {
    MOUNT_POINT_RE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect()
}
