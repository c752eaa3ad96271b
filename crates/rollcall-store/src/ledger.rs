//! Append-only attendance CSV with an exclusive advisory lock per write.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column header of the attendance file, in order.
pub const HEADER: [&str; 7] = [
    "Rollno",
    "PRN",
    "FirstName",
    "LastName",
    "Division",
    "Time",
    "Classroom",
];

/// `YYYY-MM-DD HH:MM:SS`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("attendance file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("attendance file {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("attendance file {path} has header '{found}', expected '{expected}'")]
    HeaderMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },
}

/// One attendance event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    #[serde(rename = "Rollno")]
    pub roll_number: String,
    #[serde(rename = "PRN")]
    pub prn: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "Division")]
    pub division: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Classroom")]
    pub classroom: String,
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Handle to the shared attendance CSV.
#[derive(Debug, Clone)]
pub struct AttendanceLog {
    path: PathBuf,
}

impl AttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self) -> impl Fn(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv(&self) -> impl Fn(csv::Error) -> StoreError + '_ {
        move |source| StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    /// Append one row, writing the header first if the file is new or empty.
    ///
    /// Holds an exclusive `flock` from open to close so concurrent monitors
    /// serialize instead of interleaving.
    pub fn append(&self, row: &AttendanceRow) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(self.io())?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(self.io())?;
        let _lock = FileLock::exclusive(&file).map_err(self.io())?;

        let is_empty = file.metadata().map_err(self.io())?.len() == 0;
        if !is_empty {
            self.check_header(&file)?;
            if !ends_with_newline(&file).map_err(self.io())? {
                (&file).write_all(b"\n").map_err(self.io())?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&file);
        if is_empty {
            writer.write_record(HEADER).map_err(self.csv())?;
        }
        writer.serialize(row).map_err(self.csv())?;
        writer.flush().map_err(self.io())?;
        drop(writer);

        file.sync_data().map_err(self.io())?;
        Ok(())
    }

    fn check_header(&self, file: &File) -> Result<(), StoreError> {
        let mut first = String::new();
        BufReader::new(file)
            .read_line(&mut first)
            .map_err(self.io())?;
        let found = first.trim_end_matches(&['\r', '\n'][..]);
        let expected = HEADER.join(",");
        if found != expected {
            return Err(StoreError::HeaderMismatch {
                path: self.path.clone(),
                found: found.to_string(),
                expected,
            });
        }
        Ok(())
    }

    /// Every row in the file. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<AttendanceRow>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(self.csv())?;
        reader
            .deserialize()
            .collect::<Result<Vec<AttendanceRow>, _>>()
            .map_err(self.csv())
    }
}

/// Whether the last byte of a non-empty file is `\n`.
fn ends_with_newline(mut file: &File) -> std::io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Exclusive advisory lock on an open file, released on drop.
struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    fn exclusive(file: &'a File) -> std::io::Result<Self> {
        // SAFETY: the fd is valid for the lifetime of `file`.
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        // SAFETY: as above; closing the fd would also release the lock.
        let ret = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if ret < 0 {
            tracing::warn!(error = %std::io::Error::last_os_error(), "failed to release attendance lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(roll: &str, first: &str) -> AttendanceRow {
        AttendanceRow {
            roll_number: roll.into(),
            prn: format!("PRN{roll}"),
            first_name: first.into(),
            last_name: "Rao".into(),
            division: "A".into(),
            time: "2024-03-05 09:15:00".into(),
            classroom: "A101".into(),
        }
    }

    #[test]
    fn test_format_timestamp() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        assert_eq!(format_timestamp(at), "2024-03-05 09:05:07");
    }

    #[test]
    fn test_timestamp_shape_for_now() {
        let s = format_timestamp(chrono::Local::now().naive_local());
        assert_eq!(s.len(), 19);
        assert!(NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).is_ok());
        let bytes = s.as_bytes();
        assert_eq!((bytes[4], bytes[7], bytes[10], bytes[13], bytes[16]), (b'-', b'-', b' ', b':', b':'));
    }

    #[test]
    fn test_append_n_rows_yields_n_plus_one_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(dir.path().join("attendance.csv"));

        let names = ["Asha", "Bela", "Chirag", "Dev"];
        for (i, name) in names.iter().enumerate() {
            log.append(&row(&format!("{:02}", i + 1), name)).unwrap();
        }

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), names.len() + 1);
        assert_eq!(lines[0], "Rollno,PRN,FirstName,LastName,Division,Time,Classroom");
        assert_eq!(lines[1], "01,PRN01,Asha,Rao,A,2024-03-05 09:15:00,A101");

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), names.len());
        assert_eq!(rows[3], row("04", "Dev"));
    }

    #[test]
    fn test_append_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(dir.path().join("public/data/attendance.csv"));
        log.append(&row("01", "Asha")).unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_append_to_existing_file_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(
            &path,
            "Rollno,PRN,FirstName,LastName,Division,Time,Classroom\n09,P9,Old,Entry,B,2024-01-01 08:00:00,B202\n",
        )
        .unwrap();

        let log = AttendanceLog::new(&path);
        log.append(&row("01", "Asha")).unwrap();

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].first_name, "Old");
        assert_eq!(rows[1].first_name, "Asha");
    }

    #[test]
    fn test_append_after_unterminated_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(
            &path,
            "Rollno,PRN,FirstName,LastName,Division,Time,Classroom\n09,P9,Old,Entry,B,2024-01-01 08:00:00,B202",
        )
        .unwrap();

        let log = AttendanceLog::new(&path);
        log.append(&row("01", "Asha")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].classroom, "B202");
        assert_eq!(rows[1], row("01", "Asha"));
    }

    #[test]
    fn test_append_after_header_without_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Rollno,PRN,FirstName,LastName,Division,Time,Classroom").unwrap();

        let log = AttendanceLog::new(&path);
        log.append(&row("01", "Asha")).unwrap();
        assert_eq!(log.read_all().unwrap(), vec![row("01", "Asha")]);
    }

    #[test]
    fn test_append_rejects_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "name,when\nx,y\n").unwrap();

        let err = AttendanceLog::new(&path).append(&row("01", "Asha")).unwrap_err();
        assert!(matches!(err, StoreError::HeaderMismatch { .. }));
        // Nothing was appended.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name,when\nx,y\n");
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(dir.path().join("attendance.csv"));
        let mut r = row("01", "Asha");
        r.classroom = "Lab 3, East".into();
        log.append(&r).unwrap();

        assert_eq!(log.read_all().unwrap()[0].classroom, "Lab 3, East");
    }

    #[test]
    fn test_read_all_missing_file() {
        let log = AttendanceLog::new("/nonexistent/attendance.csv");
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_appends_do_not_lose_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = AttendanceLog::new(&path);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        log.append(&row(&format!("{t}{i}"), "Asha")).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 41);
        assert_eq!(text.matches("Rollno").count(), 1);
    }
}
