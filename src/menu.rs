use crate::manager::SnapshotManager;
use crate::runner::CommandRunner;
use crate::snapshot::SnapshotIndex;
use crate::utils;
use anyhow::Result;
use color_print::cformat;
use log::{debug, info};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;

const TIME_MACHINE_CAUTION: &str = "
This volume is a Time Machine backup destination.

The snapshots on it are your backups. Purging a snapshot permanently deletes
the backed up versions of your files that only it holds, and for older backups
that may be the only copy left anywhere.

Only purge snapshots here when you are certain you no longer need those backups,
or when Time Machine itself can no longer use them. Time Machine will keep making
new backups afterwards, but anything purged cannot be restored.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    MainMenu,
    SingleSnapshotSubmenu,
    Terminated,
}

/// One interactive run against a volume. Reads answers line by line from
/// `input` and renders to `out`; the snapshot index is owned here and
/// shrinks as snapshots are purged.
pub struct Session<'m, R: CommandRunner, I: BufRead, W: Write> {
    manager: &'m SnapshotManager<R>,
    volume: PathBuf,
    volume_name: String,
    time_machine: bool,
    index: SnapshotIndex,
    state: MenuState,
    input: I,
    out: W,
}

impl<'m, R: CommandRunner, I: BufRead, W: Write> Session<'m, R, I, W> {
    pub fn new(manager: &'m SnapshotManager<R>, volume: &Path, input: I, out: W) -> Result<Self> {
        let index = manager.list_snapshots(volume)?;
        let time_machine = manager.is_time_machine_volume(volume)?;
        let state = if index.is_empty() {
            MenuState::Terminated
        } else {
            MenuState::MainMenu
        };
        Ok(Session {
            manager,
            volume: volume.to_path_buf(),
            volume_name: utils::volume_name(volume),
            time_machine,
            index,
            state,
            input,
            out,
        })
    }

    #[cfg(test)]
    pub fn state(&self) -> MenuState {
        self.state
    }

    #[cfg(test)]
    pub fn index(&self) -> &SnapshotIndex {
        &self.index
    }

    #[cfg(test)]
    pub fn is_time_machine(&self) -> bool {
        self.time_machine
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    /// Drives the menu until the user quits or nothing is left to purge.
    pub fn run(&mut self) -> Result<()> {
        while self.state != MenuState::Terminated {
            self.step()?;
        }
        Ok(())
    }

    /// Handles one line of input in the current state.
    pub fn step(&mut self) -> Result<MenuState> {
        let next = match self.state {
            MenuState::MainMenu => self.main_menu()?,
            MenuState::SingleSnapshotSubmenu => self.single_menu()?,
            MenuState::Terminated => MenuState::Terminated,
        };
        self.state = if self.index.is_empty() {
            MenuState::Terminated
        } else {
            next
        };
        debug!("Menu state: {:?}", self.state);
        Ok(self.state)
    }

    /// Confirms with the user, then purges every snapshot on the volume.
    /// Returns the process exit code: 0 when done or declined, 1 when any
    /// deletion failed.
    ///
    /// A Time Machine volume takes two answers of exactly `Y`; anything
    /// else declines. Any other volume proceeds unless the answer is
    /// `N` or `n`.
    pub fn purge_all(&mut self) -> Result<i32> {
        let count = self.index.len();
        if count == 0 {
            writeln!(self.out, "\n{} does not have any snapshots", self.volume.display())?;
            return Ok(0);
        }
        let confirmed = if self.time_machine {
            writeln!(
                self.out,
                "\n{} {}",
                cformat!("<red><bold>WARNING!</bold></red>"),
                cformat!("<bold>{} is a Time Machine backup volume.</bold>", self.volume_name)
            )?;
            write!(
                self.out,
                "\nThis will DELETE all {} snapshots on volume: {}\n\
                 These snapshots ARE your backups. Once purged they cannot be recovered.\n\
                 \nAre you sure you want to proceed (Y/N)? ",
                count,
                self.volume.display()
            )?;
            self.read_line()?.as_deref() == Some("Y") && {
                write!(self.out, "\nAre you 100% sure (Y/N)? ")?;
                self.read_line()?.as_deref() == Some("Y")
            }
        } else {
            write!(
                self.out,
                "\nWARNING: This will DELETE all {} snapshots on volume: {}\n\
                 \nAre you sure you want to proceed (Y/N)? ",
                count,
                self.volume.display()
            )?;
            match self.read_line()? {
                Some(answer) => !answer.eq_ignore_ascii_case("N"),
                None => false,
            }
        };

        if !confirmed {
            info!("Purge of all snapshots on {} declined", self.volume.display());
            writeln!(self.out, "\nNo snapshots were deleted\n")?;
            return Ok(0);
        }

        if self.manager.purge_all_snapshots(&self.volume, &mut self.out)? {
            writeln!(self.out, "\n\nAll snapshots were deleted!\n")?;
            Ok(0)
        } else {
            writeln!(
                self.out,
                "One or more snapshots failed to be deleted, re-check the volume and try again."
            )?;
            Ok(1)
        }
    }

    fn main_menu(&mut self) -> Result<MenuState> {
        self.show_main_menu()?;
        let Some(choice) = self.read_line()? else {
            return Ok(MenuState::Terminated);
        };
        let next = match choice.as_str() {
            "Q" | "q" => MenuState::Terminated,
            "1" => {
                self.manager.show_snapshot_list(&self.volume, &mut self.out)?;
                MenuState::MainMenu
            }
            "2" => MenuState::SingleSnapshotSubmenu,
            "3" => {
                // exit code only matters for the --purge-all mode
                self.purge_all()?;
                self.index = self.manager.list_snapshots(&self.volume)?;
                MenuState::MainMenu
            }
            "4" if self.time_machine => {
                writeln!(self.out, "{}", TIME_MACHINE_CAUTION)?;
                self.press_enter()?;
                MenuState::MainMenu
            }
            _ => {
                writeln!(self.out, "\nInvalid Choice\n")?;
                MenuState::MainMenu
            }
        };
        Ok(next)
    }

    fn single_menu(&mut self) -> Result<MenuState> {
        self.show_single_menu()?;
        let Some(line) = self.read_line()? else {
            return Ok(MenuState::MainMenu);
        };
        let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Ok(MenuState::MainMenu);
        }
        let choice = match digits.parse::<usize>() {
            Ok(0) => return Ok(MenuState::MainMenu),
            Ok(n) => self.index.get(&n).cloned().map(|s| (n, s)),
            Err(_) => None,
        };

        match choice {
            Some((n, snapshot)) => {
                if self.manager.purge(&snapshot, &mut self.out)? {
                    self.index.remove(&n);
                }
                self.press_enter()?;
            }
            None => {
                writeln!(self.out, "Invalid choice")?;
                self.out.flush()?;
                thread::sleep(self.manager.pauses().invalid_choice);
            }
        }
        Ok(MenuState::SingleSnapshotSubmenu)
    }

    fn show_main_menu(&mut self) -> Result<()> {
        write!(
            self.out,
            "\n There are {} snapshots on volume: {}\n\n",
            self.index.len(),
            self.volume_name
        )?;
        writeln!(self.out, " 1) List Snapshots")?;
        writeln!(self.out, " 2) Purge One Snapshot")?;
        writeln!(self.out, " 3) Purge All Snapshots")?;
        if self.time_machine {
            writeln!(self.out, " 4) Time Machine Warning")?;
        }
        write!(self.out, " Q) Quit\n\n Choice: ")?;
        Ok(())
    }

    fn show_single_menu(&mut self) -> Result<()> {
        writeln!(self.out)?;
        for (idx, s) in &self.index {
            writeln!(self.out, "{}) {}", idx, s.name)?;
        }
        write!(self.out, "\n0) Main Menu\n\nChoice: ")?;
        Ok(())
    }

    fn press_enter(&mut self) -> Result<()> {
        write!(self.out, "\n<Press Enter>")?;
        self.read_line()?;
        Ok(())
    }

    /// Next line without its terminator, or `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>> {
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Commands, Pauses};
    use crate::runner::MockCommandRunner;
    use crate::runner::fake::{FakeTools, listing};
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    const TM_DESTINATIONS: &str = "Name          : Backup\nKind          : Local\nMount Point   : /Volumes/Backup\n";

    fn manager(tools: FakeTools) -> (SnapshotManager<MockCommandRunner>, Arc<Mutex<Vec<String>>>) {
        let (runner, deleted) = tools.into_runner();
        (
            SnapshotManager::new(runner, Commands::default(), Pauses::none()),
            deleted,
        )
    }

    fn tools(blocks: &[(bool, bool)], time_machine: bool) -> FakeTools {
        FakeTools {
            listings: vec![listing(blocks)],
            destinations: if time_machine {
                TM_DESTINATIONS.to_string()
            } else {
                String::new()
            },
            ..Default::default()
        }
    }

    const THREE: &[(bool, bool)] = &[(true, false), (true, false), (true, false)];

    /// Runs a whole session over scripted input; returns the final state,
    /// the remaining snapshot numbers, and everything rendered.
    fn run_session(
        manager: &SnapshotManager<MockCommandRunner>,
        script: &str,
    ) -> (MenuState, Vec<usize>, String) {
        let input = Cursor::new(script.as_bytes().to_vec());
        let mut session =
            Session::new(manager, Path::new("/Volumes/Backup"), input, Vec::new()).unwrap();
        session.run().unwrap();
        let state = session.state();
        let remaining = session.index().keys().copied().collect();
        let out = String::from_utf8(session.into_output()).unwrap();
        (state, remaining, out)
    }

    #[test]
    fn quit_from_main_menu() {
        let (manager, deleted) = manager(tools(THREE, false));
        let (state, remaining, out) = run_session(&manager, "q\n");
        assert_eq!(state, MenuState::Terminated);
        assert_eq!(remaining, vec![1, 2, 3]);
        assert!(out.contains("There are 3 snapshots on volume: Backup"));
        assert!(!out.contains("4) Time Machine Warning"));
        assert!(deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn end_of_input_quits() {
        let (manager, _) = manager(tools(THREE, false));
        let (state, remaining, _) = run_session(&manager, "");
        assert_eq!(state, MenuState::Terminated);
        assert_eq!(remaining.len(), 3);
    }

    #[test]
    fn list_then_quit() {
        let (manager, _) = manager(tools(THREE, false));
        let (_, _, out) = run_session(&manager, "1\nQ\n");
        assert!(out.contains("Name: snap-1"));
        assert!(out.contains("Name: snap-3"));
    }

    #[rstest]
    #[case::unknown("x\nq\n")]
    #[case::blank("\nq\n")]
    #[case::hidden_option("4\nq\n")]
    fn invalid_main_choice(#[case] script: &str) {
        let (manager, _) = manager(tools(THREE, false));
        let (state, _, out) = run_session(&manager, script);
        assert_eq!(state, MenuState::Terminated);
        assert!(out.contains("Invalid Choice"));
    }

    #[test]
    fn transitions_step_by_step() {
        let (manager, _) = manager(tools(THREE, false));
        let input = Cursor::new(b"2\n0\nq\n".to_vec());
        let mut session =
            Session::new(&manager, Path::new("/Volumes/Backup"), input, Vec::new()).unwrap();
        assert_eq!(session.state(), MenuState::MainMenu);
        assert_eq!(session.step().unwrap(), MenuState::SingleSnapshotSubmenu);
        assert_eq!(session.step().unwrap(), MenuState::MainMenu);
        assert_eq!(session.step().unwrap(), MenuState::Terminated);
        assert_eq!(session.step().unwrap(), MenuState::Terminated);
    }

    #[test]
    fn purge_one_removes_it_from_the_menu() {
        let (manager, deleted) = manager(tools(THREE, false));
        let (_, remaining, out) = run_session(&manager, "2\n2\n\n0\nq\n");
        assert_eq!(*deleted.lock().unwrap(), vec!["20"]);
        assert_eq!(remaining, vec![1, 3]);
        assert!(out.contains("SUCCESS!"));
        assert!(out.contains("There are 2 snapshots on volume: Backup"));
    }

    #[test]
    fn submenu_input_keeps_only_digits() {
        let (manager, deleted) = manager(tools(THREE, false));
        let (_, remaining, _) = run_session(&manager, "2\n#3abc \n\n0\nq\n");
        assert_eq!(*deleted.lock().unwrap(), vec!["30"]);
        assert_eq!(remaining, vec![1, 2]);
    }

    #[rstest]
    #[case::zero("2\n0\nq\n")]
    #[case::empty("2\n\nq\n")]
    #[case::no_digits("2\nback\nq\n")]
    fn submenu_returns_to_main(#[case] script: &str) {
        let (manager, deleted) = manager(tools(THREE, false));
        let (state, remaining, out) = run_session(&manager, script);
        assert_eq!(state, MenuState::Terminated);
        assert_eq!(remaining, vec![1, 2, 3]);
        assert!(deleted.lock().unwrap().is_empty());
        assert_eq!(out.matches("There are 3 snapshots").count(), 2);
    }

    #[rstest]
    #[case::not_listed("2\n9\n0\nq\n")]
    #[case::overflow("2\n99999999999999999999999\n0\nq\n")]
    fn submenu_rejects_unknown_numbers(#[case] script: &str) {
        let (manager, deleted) = manager(tools(THREE, false));
        let (_, remaining, out) = run_session(&manager, script);
        assert!(out.contains("Invalid choice"));
        assert_eq!(remaining, vec![1, 2, 3]);
        assert!(deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_purge_keeps_the_entry() {
        let mut tools = tools(THREE, false);
        tools.failing_xids = vec!["10".to_string()];
        let (manager, deleted) = manager(tools);
        let (_, remaining, out) = run_session(&manager, "2\n1\n\n0\nq\n");
        assert_eq!(*deleted.lock().unwrap(), vec!["10"]);
        assert_eq!(remaining, vec![1, 2, 3]);
        assert!(out.contains("Error deleting snapshot: snap-1"));
    }

    #[test]
    fn non_purgeable_entry_stays() {
        let (manager, deleted) = manager(tools(&[(false, false), (true, false)], false));
        let (_, remaining, out) = run_session(&manager, "2\n1\n\n0\nq\n");
        assert!(deleted.lock().unwrap().is_empty());
        assert_eq!(remaining, vec![1, 2]);
        assert!(out.contains("Is not purgeable"));
    }

    #[test]
    fn purging_the_last_snapshot_ends_the_session() {
        let (manager, deleted) = manager(tools(&[(true, false)], false));
        let (state, remaining, _) = run_session(&manager, "2\n1\n\n");
        assert_eq!(state, MenuState::Terminated);
        assert!(remaining.is_empty());
        assert_eq!(*deleted.lock().unwrap(), vec!["10"]);
    }

    #[test]
    fn time_machine_caution_option() {
        let (manager, _) = manager(tools(THREE, true));
        let (_, _, out) = run_session(&manager, "4\n\nq\n");
        assert!(out.contains("4) Time Machine Warning"));
        assert!(out.contains("This volume is a Time Machine backup destination."));
        assert!(!out.contains("Invalid Choice"));
    }

    #[test]
    fn purge_all_from_menu_refreshes_and_ends() {
        let mut tools = tools(THREE, false);
        tools.listings = vec![listing(THREE), listing(THREE), String::new()];
        let (manager, deleted) = manager(tools);
        let (state, remaining, out) = run_session(&manager, "3\ny\n");
        assert_eq!(state, MenuState::Terminated);
        assert!(remaining.is_empty());
        assert_eq!(*deleted.lock().unwrap(), vec!["30", "20", "10"]);
        assert!(out.contains("All snapshots were deleted!"));
    }

    #[test]
    fn empty_listing_ends_before_the_menu() {
        let (manager, deleted) = manager(tools(&[], false));
        let (state, remaining, out) = run_session(&manager, "x\nq\n");
        assert_eq!(state, MenuState::Terminated);
        assert!(remaining.is_empty());
        assert!(!out.contains("There are 0 snapshots"));
        assert!(!out.contains("Invalid Choice"));
        assert!(deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn purge_all_with_nothing_listed_asks_nothing() {
        let (code, deleted, out) = purge_all_with(&[], false, &[], "y\n");
        assert_eq!(code, 0);
        assert!(deleted.is_empty());
        assert!(!out.contains("Are you sure"));
        assert!(out.contains("/Volumes/Backup does not have any snapshots"));
    }

    fn purge_all_with(
        blocks: &[(bool, bool)],
        time_machine: bool,
        failing: &[&str],
        script: &str,
    ) -> (i32, Vec<String>, String) {
        let mut tools = tools(blocks, time_machine);
        tools.failing_xids = failing.iter().map(|s| s.to_string()).collect();
        let (manager, deleted) = manager(tools);
        let input = Cursor::new(script.as_bytes().to_vec());
        let mut session =
            Session::new(&manager, Path::new("/Volumes/Backup"), input, Vec::new()).unwrap();
        assert_eq!(session.is_time_machine(), time_machine);
        let code = session.purge_all().unwrap();
        let out = String::from_utf8(session.into_output()).unwrap();
        let deleted = deleted.lock().unwrap().clone();
        (code, deleted, out)
    }

    // Plain volumes only decline on N/n: anything else, even "x", goes ahead.
    #[rstest]
    #[case::upper_n("N\n", false)]
    #[case::lower_n("n\n", false)]
    #[case::no_input("", false)]
    #[case::upper_y("Y\n", true)]
    #[case::lower_y("y\n", true)]
    #[case::other("x\n", true)]
    #[case::blank("\n", true)]
    #[case::word_no("no\n", true)]
    fn plain_volume_confirmation(#[case] script: &str, #[case] proceeds: bool) {
        let (code, deleted, out) = purge_all_with(THREE, false, &[], script);
        assert_eq!(code, 0);
        assert!(out.contains("This will DELETE all 3 snapshots on volume: /Volumes/Backup"));
        if proceeds {
            assert_eq!(deleted, vec!["30", "20", "10"]);
            assert!(out.contains("All snapshots were deleted!"));
        } else {
            assert!(deleted.is_empty());
            assert!(out.contains("No snapshots were deleted"));
        }
    }

    // Time Machine volumes need an exact "Y", twice; everything else declines.
    #[rstest]
    #[case::lower_y("y\n")]
    #[case::yes("yes\n")]
    #[case::blank("\n")]
    #[case::no_input("")]
    #[case::second_declined("Y\nn\n")]
    #[case::second_lower("Y\ny\n")]
    #[case::second_missing("Y\n")]
    fn time_machine_confirmation_declines(#[case] script: &str) {
        let (code, deleted, out) = purge_all_with(THREE, true, &[], script);
        assert_eq!(code, 0);
        assert!(deleted.is_empty());
        assert!(out.contains("This will DELETE all 3 snapshots on volume: /Volumes/Backup"));
        assert!(out.contains("No snapshots were deleted"));
    }

    #[test]
    fn time_machine_confirmation_twice_proceeds() {
        let (code, deleted, out) = purge_all_with(THREE, true, &[], "Y\nY\n");
        assert_eq!(code, 0);
        assert_eq!(deleted, vec!["30", "20", "10"]);
        assert!(out.contains("Are you 100% sure"));
        assert!(out.contains("All snapshots were deleted!"));
    }

    #[test]
    fn failed_deletion_gives_exit_code_one() {
        let (code, deleted, out) = purge_all_with(THREE, false, &["20"], "y\n");
        assert_eq!(code, 1);
        assert_eq!(deleted, vec!["30", "20", "10"]);
        assert!(out.contains("One or more snapshots failed to be deleted"));
    }
}
