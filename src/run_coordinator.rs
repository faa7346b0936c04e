// src/run_coordinator.rs
//
// One processing run, end to end:
//
//   reset check → pick source → download → open video → load baseline
//   → frame loop (track, count, annotate, write) → transcode → upload
//   → insert record → cleanup
//
// All I/O stays at the run boundaries. The frame loop only reads and
// writes frames; a run either persists exactly one record or nothing.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::counting::{CountState, CountingLine, OccupancyCounter};
use crate::detection::SubjectTracker;
use crate::pipeline::{FrameContext, RunMetrics};
use crate::schedule::{self, ResetSchedule};
use crate::storage::{self, record::run_id_for, ObjectStorage, RunRecord, RunRecordStore};
use crate::transcode;
use crate::types::Config;
use crate::video_processor::{draw_overlay, AnnotatedWriter, VideoReader};

const DOWNLOADED_SOURCE: &str = "latest_video.mp4";
const UPLOAD_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every source is already referenced by a record. Not an error.
    NoNewSource,
    Completed(RunRecord),
}

/// Local files produced by one run.
#[derive(Debug, Clone)]
struct WorkFiles {
    source: PathBuf,
    annotated: PathBuf,
    transcoded: PathBuf,
}

impl WorkFiles {
    fn new(work_dir: &Path, run_id: &str, output_prefix: &str) -> Self {
        Self {
            source: work_dir.join(DOWNLOADED_SOURCE),
            annotated: work_dir.join(format!("{}.mp4", run_id)),
            transcoded: work_dir.join(format!("{}{}.mp4", output_prefix, run_id)),
        }
    }

    async fn remove_all(&self) {
        for path in [&self.source, &self.annotated, &self.transcoded] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
}

pub struct RunCoordinator<'a> {
    config: &'a Config,
    records: &'a dyn RunRecordStore,
    objects: &'a dyn ObjectStorage,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(config: &'a Config, records: &'a dyn RunRecordStore, objects: &'a dyn ObjectStorage) -> Self {
        Self {
            config,
            records,
            objects,
        }
    }

    /// `make_tracker` is only called once a source has been opened, so a
    /// run with nothing to do never loads the model.
    pub async fn run<T, F>(&self, make_tracker: F) -> Result<RunOutcome>
    where
        T: SubjectTracker,
        F: FnOnce() -> Result<T>,
    {
        let started_at = schedule::site_now(&self.config.schedule)?;
        self.run_at(started_at, make_tracker).await
    }

    pub async fn run_at<T, F>(&self, started_at: DateTime<FixedOffset>, make_tracker: F) -> Result<RunOutcome>
    where
        T: SubjectTracker,
        F: FnOnce() -> Result<T>,
    {
        if self.config.schedule.reset_on_run_start {
            schedule::run_scheduled_reset(
                self.records,
                ResetSchedule::from_config(&self.config.schedule),
                started_at,
            )
            .await?;
        }

        let video = &self.config.video;
        let source_name = storage::select_unprocessed_source(
            self.records,
            self.objects,
            &video.source_prefix,
            &video.source_extensions,
        )
        .await
        .context("Failed to look for an unprocessed video")?;

        let Some(source_name) = source_name else {
            info!("📭 No new video to process");
            return Ok(RunOutcome::NoNewSource);
        };
        info!("🎬 Selected source: {}", source_name);

        let run_id = run_id_for(&started_at);
        let work_dir = PathBuf::from(&video.work_dir);
        tokio::fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to create work dir {}", work_dir.display()))?;
        let files = WorkFiles::new(&work_dir, &run_id, &video.output_prefix);

        let result = self
            .process_source(&source_name, &run_id, &files, make_tracker)
            .await;
        files.remove_all().await;

        let record = result?;
        Ok(RunOutcome::Completed(record))
    }

    async fn process_source<T, F>(
        &self,
        source_name: &str,
        run_id: &str,
        files: &WorkFiles,
        make_tracker: F,
    ) -> Result<RunRecord>
    where
        T: SubjectTracker,
        F: FnOnce() -> Result<T>,
    {
        self.objects
            .download(source_name, &files.source)
            .await
            .with_context(|| format!("Failed to download {}", source_name))?;

        // Unopenable source aborts before any counting state exists
        let mut reader = VideoReader::open(&files.source)?;

        let baseline = self
            .records
            .most_recent_total()
            .await
            .context("Failed to load baseline total")?;

        let counting = &self.config.counting;
        let line = CountingLine::from_frame_edges(
            counting.line_start,
            counting.line_end,
            reader.width as u32,
            reader.height as u32,
        );
        info!(
            "📏 Counting line {:?} -> {:?} (reference y = {})",
            line.start,
            line.end,
            line.crossing_reference()
        );

        let mut counter = OccupancyCounter::new(line, counting.disappearance.clone());
        counter.load_baseline(baseline)?;
        counter.seed_initial_occupancy(counting.initial_occupancy)?;
        info!(
            "📥 Baseline total {} + initial occupancy {}",
            baseline, counting.initial_occupancy
        );

        let mut tracker = make_tracker().context("Failed to build subject tracker")?;
        let mut writer = AnnotatedWriter::create(&files.annotated, reader.width, reader.height, reader.fps)?;

        let metrics = RunMetrics::new();
        let counts = self.run_frame_loop(&mut reader, &mut writer, &mut tracker, &mut counter, &metrics)?;
        let written = writer.finish()?;
        info!("Wrote {} frame(s) to {}", written, files.annotated.display());

        transcode::transcode_to_h264(&self.config.transcode, &files.annotated, &files.transcoded)
            .await
            .context("Transcode failed; nothing will be published")?;

        let file_name = files
            .transcoded
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.mp4", run_id));
        let dest_name = format!("{}{}", self.config.video.upload_prefix, file_name);
        let video_url = self
            .objects
            .upload(&files.transcoded, &dest_name, UPLOAD_CONTENT_TYPE)
            .await
            .with_context(|| format!("Failed to upload {}", dest_name))?;

        let finished_at = schedule::site_now(&self.config.schedule)?;
        let record = RunRecord::new(run_id, finished_at, &counts, source_name, &video_url);
        self.records
            .insert_run_record(&record)
            .await
            .context("Failed to store run record")?;

        metrics.summary().log();
        info!(
            "🏁 Run {} done: In {} | Out {} | Total {}",
            run_id, counts.in_count, counts.out_count, counts.total_count
        );
        Ok(record)
    }

    /// Synchronous per-frame loop; no awaits in here.
    fn run_frame_loop<T: SubjectTracker>(
        &self,
        reader: &mut VideoReader,
        writer: &mut AnnotatedWriter,
        tracker: &mut T,
        counter: &mut OccupancyCounter,
        metrics: &RunMetrics,
    ) -> Result<CountState> {
        let stride = self.config.counting.process_every.max(1);
        let overlay = &self.config.video.overlay;

        while let Some(mut frame) = reader.read_frame()? {
            metrics.inc(&metrics.frames_read);
            let frame_index = reader.current_frame;

            if frame_index % stride != 0 {
                writer.write(&frame)?;
                continue;
            }

            let started = Instant::now();
            let detections = match tracker.track(&frame) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Frame {}: tracking failed, passing through uncounted: {:#}", frame_index, e);
                    Vec::new()
                }
            };
            metrics.add_timing(&metrics.tracking_time_us, started.elapsed());

            let outcome = counter.process_frame(frame_index, &detections);
            metrics.record_outcome(&outcome);

            let ctx = FrameContext::new(detections, outcome);
            if let Err(e) = draw_overlay(&mut frame, &ctx, counter.line(), overlay) {
                warn!("Frame {}: could not draw overlay: {}", frame_index, e);
            }
            writer.write(&frame)?;

            if frame_index % 300 == 0 {
                info!(
                    "Progress: {:.1}% | frame {} | total {} | active tracks {}",
                    reader.progress(),
                    frame_index,
                    ctx.counts.total_count,
                    counter.active_tracks()
                );
            }
        }

        Ok(counter.counts())
    }
}
