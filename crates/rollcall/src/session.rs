use crate::display::{DisplayError, FrameDisplay, Overlay};
use chrono::{DateTime, Local};
use rollcall_core::{recognize_faces, EncodeError, FaceEncoder, Matcher, Recognition, ReferenceIdentity};
use rollcall_hw::{Backoff, Frame, FrameSource};
use rollcall_store::{format_timestamp, AttendanceLog, AttendanceRow, StoreError};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("recognition failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("recording attendance failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Quit key pressed or preview window closed.
    QuitRequested,
    /// The frame source failed in a way retrying cannot fix.
    SourceFailed(String),
    /// The configured frame budget was used up.
    FrameLimit,
}

/// One monitoring run: identity, start time, and who has been marked so far.
pub struct Session {
    id: Uuid,
    classroom: String,
    started_at: DateTime<Local>,
    started: Instant,
    seen: HashSet<usize>,
    marked: Vec<String>,
    frames_processed: u64,
    frames_skipped: u64,
}

/// What a finished session did.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: Uuid,
    pub classroom: String,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    /// Display names in the order they were marked.
    pub marked: Vec<String>,
    pub stop: StopReason,
}

impl Session {
    pub fn start(classroom: &str) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            classroom: classroom.to_string(),
            started_at: Local::now(),
            started: Instant::now(),
            seen: HashSet::new(),
            marked: Vec::new(),
            frames_processed: 0,
            frames_skipped: 0,
        };
        tracing::info!(session = %session.id, classroom, "session started");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_seen(&self, index: usize) -> bool {
        self.seen.contains(&index)
    }

    pub fn finish(self, stop: StopReason) -> SessionSummary {
        let summary = SessionSummary {
            id: self.id,
            classroom: self.classroom,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            marked: self.marked,
            stop,
        };
        tracing::info!(
            session = %summary.id,
            frames = summary.frames_processed,
            skipped = summary.frames_skipped,
            marked = summary.marked.len(),
            elapsed_secs = summary.elapsed.as_secs(),
            stop = ?summary.stop,
            "session finished"
        );
        summary
    }
}

/// Recognition knobs that stay fixed for a run.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub threshold: f32,
    pub frame_scale: f32,
    pub max_frames: Option<u64>,
}

/// Poll → recognize → record → display, until something stops it.
pub struct SessionLoop<'a> {
    pub source: &'a mut dyn FrameSource,
    pub encoder: &'a mut dyn FaceEncoder,
    pub matcher: &'a dyn Matcher,
    pub roster: &'a [ReferenceIdentity],
    pub ledger: &'a AttendanceLog,
    pub display: &'a mut dyn FrameDisplay,
    pub backoff: Backoff,
    pub settings: LoopSettings,
}

impl SessionLoop<'_> {
    /// Run until a stop condition. Recognition, persistence and display
    /// failures abort with an error.
    pub fn run(&mut self, session: &mut Session) -> Result<StopReason, SessionError> {
        tracing::info!(
            session = %session.id,
            source = %self.source.describe(),
            identities = self.roster.len(),
            "monitoring"
        );
        loop {
            if let Some(stop) = self.step(session)? {
                return Ok(stop);
            }
        }
    }

    /// One iteration. `Some` means stop.
    fn step(&mut self, session: &mut Session) -> Result<Option<StopReason>, SessionError> {
        if let Some(limit) = self.settings.max_frames {
            if session.frames_processed >= limit {
                return Ok(Some(StopReason::FrameLimit));
            }
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => {
                self.backoff.reset();
                frame
            }
            Err(err) if err.is_transient() => {
                session.frames_skipped += 1;
                let delay = self.backoff.next_delay();
                tracing::warn!(
                    error = %err,
                    attempt = self.backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "failed to fetch frame; retrying"
                );
                std::thread::sleep(delay);
                self.display.idle();
                return Ok(self.display.quit_requested().then_some(StopReason::QuitRequested));
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to capture frame; stopping");
                return Ok(Some(StopReason::SourceFailed(err.to_string())));
            }
        };

        let probe = frame.scaled(self.settings.frame_scale);
        let recognition = recognize_faces(
            self.encoder,
            self.matcher,
            &probe.data,
            probe.width,
            probe.height,
            self.roster,
            self.settings.threshold,
        )?;

        self.record_new(session, &recognition)?;
        session.frames_processed += 1;

        let overlays = overlays_for(&recognition, &frame, &probe);
        self.display.show(&frame, &overlays)?;

        if self.display.quit_requested() {
            return Ok(Some(StopReason::QuitRequested));
        }
        Ok(None)
    }

    /// Append a row for every recognized identity not yet in the session.
    fn record_new(&self, session: &mut Session, recognition: &Recognition) -> Result<(), SessionError> {
        for face in &recognition.recognized {
            if session.has_seen(face.index) {
                continue;
            }
            let identity = &self.roster[face.index];
            let row = AttendanceRow {
                roll_number: identity.roll_number.clone(),
                prn: identity.prn.clone(),
                first_name: identity.first_name.clone(),
                last_name: identity.last_name.clone(),
                division: identity.division.clone(),
                time: format_timestamp(Local::now().naive_local()),
                classroom: session.classroom.clone(),
            };
            self.ledger.append(&row)?;

            tracing::info!(
                session = %session.id,
                roll = %row.roll_number,
                prn = %row.prn,
                name = %face.name,
                division = %row.division,
                classroom = %row.classroom,
                time = %row.time,
                similarity = face.similarity,
                "attendance marked"
            );
            session.seen.insert(face.index);
            session.marked.push(face.name.clone());
        }
        Ok(())
    }
}

/// Face boxes mapped from the recognition frame back onto the displayed frame.
fn overlays_for(recognition: &Recognition, shown: &Frame, probe: &Frame) -> Vec<Overlay> {
    let factor = shown.width as f32 / probe.width.max(1) as f32;
    let matched = recognition.recognized.iter().map(|r| Overlay {
        bbox: r.bbox.scaled(factor),
        matched: true,
    });
    let unknown = recognition.unknown.iter().map(|b| Overlay {
        bbox: b.scaled(factor),
        matched: false,
    });
    matched.chain(unknown).collect()
}
