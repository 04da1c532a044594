use crate::config::{Commands, Pauses};
use crate::error::SnapError;
use crate::runner::CommandRunner;
use crate::snapshot::{self, Snapshot, SnapshotIndex};
use anyhow::Result;
use log::{debug, info, warn};
use std::io::Write;
use std::path::Path;
use std::thread;

const SPACE_RESERVING_NOTE: &str = "
Your snapshot list contains a snapshot that limits the minimum size of the APFS Container.
In terms of recovering as much space as possible on your drive, this should be the first
snapshot that you delete.

Using the --purge-all option will do this for you automatically.
";

/// Lists and deletes APFS snapshots through `diskutil`, and asks `tmutil`
/// about Time Machine destinations. Every listing re-runs the tool.
pub struct SnapshotManager<R: CommandRunner> {
    runner: R,
    commands: Commands,
    pauses: Pauses,
}

impl<R: CommandRunner> SnapshotManager<R> {
    pub fn new(runner: R, commands: Commands, pauses: Pauses) -> Self {
        SnapshotManager {
            runner,
            commands,
            pauses,
        }
    }

    pub fn pauses(&self) -> Pauses {
        self.pauses
    }

    /// Snapshots currently on `volume`, numbered from 1 in listing order.
    /// A non-zero exit from the tool is still parsed.
    pub fn list_snapshots(&self, volume: &Path) -> Result<SnapshotIndex> {
        let args = vec![
            "apfs".to_string(),
            "listSnapshots".to_string(),
            volume.to_string_lossy().into_owned(),
        ];
        let output = self.runner.run(&self.commands.diskutil, &args)?;
        if !output.success() {
            debug!(
                "{} exited with {:?}: {}",
                output.command_line,
                output.code,
                output.stderr.trim()
            );
        }
        let index = snapshot::parse_snapshots(&output.stdout);
        debug!("Parsed {} snapshots for {}", index.len(), volume.display());
        Ok(index)
    }

    pub fn has_snapshots(&self, volume: &Path) -> Result<bool> {
        Ok(!self.list_snapshots(volume)?.is_empty())
    }

    /// True when `volume` is, verbatim, one of the Time Machine
    /// destination mount points.
    pub fn is_time_machine_volume(&self, volume: &Path) -> Result<bool> {
        let output = self
            .runner
            .run(&self.commands.tmutil, &["destinationinfo".to_string()])?;
        let volume = volume.to_string_lossy();
        let found = snapshot::extract_mount_points(&output.stdout)
            .iter()
            .any(|m| *m == volume);
        debug!("{} is a Time Machine destination: {}", volume, found);
        Ok(found)
    }

    /// Prints every snapshot on `volume`, fetched fresh.
    pub fn show_snapshot_list(&self, volume: &Path, out: &mut impl Write) -> Result<()> {
        let index = self.list_snapshots(volume)?;
        for s in index.values() {
            writeln!(out, "{}\n", s)?;
        }
        if index.values().any(|s| s.space_reserving) {
            writeln!(out, "{}", SPACE_RESERVING_NOTE)?;
        }
        Ok(())
    }

    /// Deletes one snapshot. Non-purgeable snapshots are refused without
    /// running anything. Only a failure to start `diskutil` is an error.
    pub fn purge(&self, snapshot: &Snapshot, out: &mut impl Write) -> Result<bool> {
        if !snapshot.purgeable {
            writeln!(out, "The snapshot:\n\t{}\nIs not purgeable", snapshot.name)?;
            out.flush()?;
            thread::sleep(self.pauses.not_purgeable);
            return Ok(false);
        }

        let args = vec![
            "apfs".to_string(),
            "deleteSnapshot".to_string(),
            snapshot.disk.clone(),
            "-xid".to_string(),
            snapshot.xid.clone(),
        ];
        let output = self.runner.run(&self.commands.diskutil, &args)?;
        writeln!(out, "Disk: {} ****", snapshot.disk)?;
        writeln!(out, "Ran:\n\t{}", output.command_line)?;
        if !output.success() {
            warn!(
                "Deleting snapshot {} (XID {}) failed with {:?}",
                snapshot.name, snapshot.xid, output.code
            );
            writeln!(out, "\nError deleting snapshot: {}\n", snapshot.name)?;
            writeln!(out, "{}", output.stderr)?;
            return Ok(false);
        }
        writeln!(out, "\n{}", output.stdout)?;
        writeln!(out, "SUCCESS!")?;
        Ok(true)
    }

    /// Deletes every snapshot on `volume`: the space-reserving one first,
    /// then the rest from the highest number down. Keeps going past
    /// individual failures; returns whether all of them went.
    pub fn purge_all_snapshots(&self, volume: &Path, out: &mut impl Write) -> Result<bool> {
        let working = self.list_snapshots(volume)?;
        info!(
            "Purging {} snapshots on {}",
            working.len(),
            volume.display()
        );
        self.purge_index(working, out)
    }

    fn purge_index(&self, mut working: SnapshotIndex, out: &mut impl Write) -> Result<bool> {
        let top = working.keys().next_back().copied().unwrap_or(0);
        let mut success = true;

        let mut purged_first = None;
        let reserving = working
            .iter()
            .find(|(_, s)| s.space_reserving)
            .map(|(idx, _)| *idx);
        if let Some(idx) = reserving {
            debug!("Snapshot #{} limits the container size, purging it first", idx);
            if self.purge(&working[&idx], out)? {
                working.remove(&idx);
                purged_first = Some(idx);
            } else {
                success = false;
            }
        }

        for idx in (1..=top).rev() {
            if purged_first == Some(idx) {
                continue;
            }
            let snapshot = working.get(&idx).ok_or(SnapError::InternalConsistency {
                index: idx,
                size: working.len(),
            })?;
            if !self.purge(snapshot, out)? {
                success = false;
            }
        }
        Ok(success)
    }
}
