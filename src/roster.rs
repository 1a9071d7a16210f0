//! The flat-record store: a directory of pretty-printed JSON files, each holding the full extent
//! of one collection.
//!
//! Two kinds of files live here:
//! - [`ROSTER_FILE`], the JSON student roster, rewritten in full on every registration.
//! - `attendance_<YYYY-MM-DD>.json`, one immutable [`AttendanceEntry`] snapshot per day.
//!
//! Registration reads the whole roster, appends, and writes it back without any locking, so two
//! overlapping registrations can lose one of the writes. Every file is first written to a
//! temporary file in the data directory and then moved into place, so readers never see a partial
//! file. Daily snapshots are moved with no-clobber semantics and therefore cannot be written twice
//! for the same date.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

/// File name of the JSON student roster inside the data directory.
pub const ROSTER_FILE: &str = "students.json";

type StudentId = String;

/// Name of the snapshot file for `date`.
pub fn attendance_file_name(date: NaiveDate) -> String {
    format!("attendance_{}.json", date.format("%Y-%m-%d"))
}

#[derive(Debug)]
pub enum RosterError {
    DuplicateStudent(StudentId),
    AlreadyTaken(NaiveDate),
    Io(io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for RosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterError::DuplicateStudent(id) => {
                write!(f, "Student {} is already on the JSON roster", id)
            }
            RosterError::AlreadyTaken(date) => {
                write!(f, "Attendance for {} has already been taken", date)
            }
            RosterError::Io(e) => write!(f, "Could not write data file: {}", e),
            RosterError::Serialize(e) => write!(f, "Could not serialize records: {}", e),
        }
    }
}

impl std::error::Error for RosterError {}

impl From<io::Error> for RosterError {
    fn from(e: io::Error) -> Self {
        RosterError::Io(e)
    }
}

impl From<serde_json::Error> for RosterError {
    fn from(e: serde_json::Error) -> Self {
        RosterError::Serialize(e)
    }
}

/// Timestamps in data files use `YYYY-MM-DD HH:MM:SS`.
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(de::Error::custom)
    }
}

/// A student on the JSON roster. Has no surrogate key; `student_id` is supplied by the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonStudent {
    pub student_id: StudentId,
    pub name: String,
    pub group: String,
    #[serde(rename = "added_at", alias = "created_at", with = "timestamp")]
    pub created_at: NaiveDateTime,
}

/// Attendance status recorded in a daily snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Present,
    #[default]
    Absent,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Present => "present",
            Presence::Absent => "absent",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Present => write!(f, "Present"),
            Presence::Absent => write!(f, "Absent"),
        }
    }
}

impl FromStr for Presence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Presence::Present),
            "absent" => Ok(Presence::Absent),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

/// One student's line in a daily snapshot. Name and group are copied from the roster at capture
/// time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceEntry {
    pub student_id: StudentId,
    pub name: String,
    pub group: String,
    pub status: Presence,
}

/// A file found in the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub name: String,
    pub size: u64,
}

impl DataFile {
    pub fn size_kb(&self) -> f64 {
        (self.size as f64 / 1024.0 * 100.0).round() / 100.0
    }
}

/// Reads and writes whole collections as JSON files in a single directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    data_dir: PathBuf,
}

impl JsonStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Creates the data directory if it does not exist yet.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Reads every record stored under `name`.
    ///
    /// A missing or unparsable file yields an empty collection.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
        let path = self.path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!("Could not read {}: {}", path.display(), e);
                }
                return Vec::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::debug!("Ignoring unparsable {}: {}", path.display(), e);
            Vec::new()
        })
    }

    /// Serializes `records` into a temporary file next to their final location.
    ///
    /// The temporary file is removed when dropped, so a failed write leaves nothing behind.
    fn stage<T: Serialize>(&self, records: &[T]) -> Result<NamedTempFile, RosterError> {
        let mut tmp = NamedTempFile::new_in(&self.data_dir)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    /// Replaces the contents of `name` with `records`.
    pub fn write<T: Serialize>(&self, name: &str, records: &[T]) -> Result<(), RosterError> {
        let tmp = self.stage(records)?;
        tmp.persist(self.path(name)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Writes `records` to `name` only if no such file exists yet.
    ///
    /// Fails with an [`io::ErrorKind::AlreadyExists`] error if it does; the existing file is kept.
    fn create<T: Serialize>(&self, name: &str, records: &[T]) -> Result<(), RosterError> {
        let tmp = self.stage(records)?;
        tmp.persist_noclobber(self.path(name)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Lists the `.json` files in the data directory, sorted by name.
    pub fn list_files(&self) -> Vec<DataFile> {
        let Ok(entries) = fs::read_dir(&self.data_dir) else {
            return Vec::new();
        };

        let mut files: Vec<DataFile> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                let name = entry.file_name().into_string().ok()?;
                Some(DataFile { name, size })
            })
            .collect();

        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// Retrieves all students on the JSON roster, in registration order.
    pub fn roster(&self) -> Vec<JsonStudent> {
        self.read(ROSTER_FILE)
    }

    /// Appends a student to the JSON roster, stamped with `now`.
    ///
    /// Fails with [`RosterError::DuplicateStudent`] and leaves the roster untouched if the
    /// `student_id` is already taken.
    pub fn register_student(
        &self,
        student_id: &str,
        name: &str,
        group: &str,
        now: NaiveDateTime,
    ) -> Result<JsonStudent, RosterError> {
        let mut roster = self.roster();

        if roster.iter().any(|s| s.student_id == student_id) {
            return Err(RosterError::DuplicateStudent(student_id.to_string()));
        }

        let student = JsonStudent {
            student_id: student_id.to_string(),
            name: name.to_string(),
            group: group.to_string(),
            created_at: now.with_nanosecond(0).unwrap_or(now),
        };
        roster.push(student.clone());
        self.write(ROSTER_FILE, &roster)?;

        Ok(student)
    }

    /// Whether a snapshot already exists for `date`.
    pub fn attendance_taken(&self, date: NaiveDate) -> bool {
        self.exists(&attendance_file_name(date))
    }

    /// The snapshot recorded for `date`, or an empty list if none was taken.
    pub fn snapshot(&self, date: NaiveDate) -> Vec<AttendanceEntry> {
        self.read(&attendance_file_name(date))
    }

    /// Records a snapshot for `date` covering every student currently on the roster.
    ///
    /// Students without an entry in `statuses` are marked [`Presence::Absent`]. Entries in
    /// `statuses` for students that are not on the roster are ignored.
    pub fn take_attendance(
        &self,
        date: NaiveDate,
        statuses: &HashMap<StudentId, Presence>,
    ) -> Result<Vec<AttendanceEntry>, RosterError> {
        if self.attendance_taken(date) {
            return Err(RosterError::AlreadyTaken(date));
        }

        let snapshot: Vec<AttendanceEntry> = self
            .roster()
            .into_iter()
            .map(|student| AttendanceEntry {
                status: statuses
                    .get(&student.student_id)
                    .copied()
                    .unwrap_or_default(),
                student_id: student.student_id,
                name: student.name,
                group: student.group,
            })
            .collect();

        match self.create(&attendance_file_name(date), &snapshot) {
            Err(RosterError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(RosterError::AlreadyTaken(date))
            }
            Err(e) => Err(e),
            Ok(()) => Ok(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use tempfile::tempdir;

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn missing_or_corrupt_files_read_as_empty() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        assert!(store.roster().is_empty());

        fs::write(dir.path().join(ROSTER_FILE), "{ not json").unwrap();
        assert!(store.roster().is_empty());
    }

    #[test]
    fn register_appends_and_preserves_existing_entries() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        let ann = store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();
        let before = fs::read_to_string(dir.path().join(ROSTER_FILE)).unwrap();

        let bob = store.register_student("S2", "Bob", "B", at(day(), 9, 5)).unwrap();
        let after = fs::read_to_string(dir.path().join(ROSTER_FILE)).unwrap();

        assert_eq!(store.roster(), vec![ann, bob]);
        let prefix = before.strip_suffix("\n]").unwrap();
        assert!(after.starts_with(prefix));
        assert!(after.contains("\"added_at\": \"2025-03-14 09:05:00\""));
    }

    #[test]
    fn duplicate_student_leaves_roster_untouched() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();
        let before = fs::read(dir.path().join(ROSTER_FILE)).unwrap();

        let result = store.register_student("S1", "Someone Else", "B", at(day(), 10, 0));
        assert!(matches!(result, Err(RosterError::DuplicateStudent(id)) if id == "S1"));

        let after = fs::read(dir.path().join(ROSTER_FILE)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn roster_preserves_unicode() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        store.register_student("S1", "Zoë Łukasik", "Groupe É", at(day(), 9, 0)).unwrap();

        let raw = fs::read_to_string(dir.path().join(ROSTER_FILE)).unwrap();
        assert!(raw.contains("Zoë Łukasik"));
        assert_eq!(store.roster()[0].group, "Groupe É");
    }

    #[test]
    fn accepts_created_at_key_on_read() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        fs::write(
            dir.path().join(ROSTER_FILE),
            r#"[{"student_id":"S9","name":"Kim","group":"C","created_at":"2024-09-01 08:30:00"}]"#,
        )
        .unwrap();

        let roster = store.roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].created_at, at(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(), 8, 30));
    }

    #[test]
    fn missing_status_defaults_to_absent() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();

        let snapshot = store.take_attendance(day(), &HashMap::new()).unwrap();

        assert_eq!(
            snapshot,
            vec![AttendanceEntry {
                student_id: "S1".to_string(),
                name: "Ann".to_string(),
                group: "A".to_string(),
                status: Presence::Absent,
            }]
        );
        assert_eq!(store.snapshot(day()), snapshot);
    }

    #[test]
    fn snapshot_covers_exactly_the_roster() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();
        store.register_student("S2", "Bob", "A", at(day(), 9, 1)).unwrap();
        store.register_student("S3", "Cy", "B", at(day(), 9, 2)).unwrap();

        let statuses = HashMap::from([
            ("S1".to_string(), Presence::Present),
            ("S3".to_string(), Presence::Absent),
            ("GHOST".to_string(), Presence::Present),
        ]);
        let snapshot = store.take_attendance(day(), &statuses).unwrap();

        let got: Vec<(&str, Presence)> = snapshot
            .iter()
            .map(|e| (e.student_id.as_str(), e.status))
            .collect();
        assert_eq!(
            got,
            vec![
                ("S1", Presence::Present),
                ("S2", Presence::Absent),
                ("S3", Presence::Absent),
            ]
        );
    }

    #[test]
    fn second_capture_for_same_day_is_rejected() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();

        let present = HashMap::from([("S1".to_string(), Presence::Present)]);
        store.take_attendance(day(), &present).unwrap();
        let path = dir.path().join(attendance_file_name(day()));
        let before = fs::read(&path).unwrap();

        let result = store.take_attendance(day(), &HashMap::new());
        assert!(matches!(result, Err(RosterError::AlreadyTaken(d)) if d == day()));
        assert_eq!(fs::read(&path).unwrap(), before);

        let next_day = day().succ_opt().unwrap();
        assert!(store.take_attendance(next_day, &HashMap::new()).is_ok());
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("does-not-exist"));

        let result = store.register_student("S1", "Ann", "A", at(day(), 9, 0));
        assert!(matches!(result, Err(RosterError::Io(_))));
    }

    /// A record that fails to serialize after part of the output has been written.
    enum Row {
        Entry(AttendanceEntry),
        Broken,
    }

    impl Serialize for Row {
        fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            match self {
                Row::Entry(entry) => entry.serialize(s),
                Row::Broken => Err(<S::Error as serde::ser::Error>::custom("unserializable record")),
            }
        }
    }

    #[test]
    fn failed_snapshot_write_leaves_the_day_open() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let name = attendance_file_name(day());

        let rows = vec![
            Row::Entry(AttendanceEntry {
                student_id: "S1".to_string(),
                name: "Ann".to_string(),
                group: "A".to_string(),
                status: Presence::Present,
            }),
            Row::Broken,
        ];
        let result = store.create(&name, &rows);
        assert!(matches!(result, Err(RosterError::Serialize(_))));

        assert!(!store.attendance_taken(day()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();
        let snapshot = store.take_attendance(day(), &HashMap::new()).unwrap();
        assert_eq!(store.snapshot(day()), snapshot);
    }

    #[test]
    fn failed_roster_write_keeps_previous_roster() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let ann = store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();
        let before = fs::read(dir.path().join(ROSTER_FILE)).unwrap();

        let result = store.write(ROSTER_FILE, &[Row::Broken]);
        assert!(matches!(result, Err(RosterError::Serialize(_))));

        assert_eq!(fs::read(dir.path().join(ROSTER_FILE)).unwrap(), before);
        assert_eq!(store.roster(), vec![ann]);
        assert_eq!(store.list_files().len(), 1);
    }

    #[test]
    fn lists_json_files_with_sizes() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store.register_student("S1", "Ann", "A", at(day(), 9, 0)).unwrap();
        store.take_attendance(day(), &HashMap::new()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let names: Vec<String> = store.list_files().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["attendance_2025-03-14.json", "students.json"]);

        let file = DataFile { name: "x.json".into(), size: 2048 };
        assert_eq!(file.size_kb(), 2.0);
    }
}
