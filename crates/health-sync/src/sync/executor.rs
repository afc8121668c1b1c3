//! Per-chunk pipeline: check, read, transform, upload

use log::{debug, error, info, warn};

use super::SyncError;
use super::TransitionError;
use super::classify::{ErrorClass, ErrorClassifier};
use super::control::{ControlSignal, RunControl};
use super::state_machine::JobStateMachine;
use crate::health::transform::{build_batch, prepare_activities, prepare_metrics};
use crate::health::{ChunkError, HealthReader, UploadClient};
use crate::models::{JobStatus, MetricType, Stage};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped with failures; see the job's `failed_chunks` and `error_message`
    Failed,
    Paused,
    Cancelled,
}

enum ChunkOutcome {
    Done,
    Interrupted(ControlSignal),
    Failed(ChunkError),
}

/// Why the pipeline stopped before finishing a chunk
enum Halt {
    Signal(ControlSignal),
    Chunk(ChunkError),
    Engine(SyncError),
}

impl From<ChunkError> for Halt {
    fn from(err: ChunkError) -> Self {
        Halt::Chunk(err)
    }
}

impl From<SyncError> for Halt {
    fn from(err: SyncError) -> Self {
        Halt::Engine(err)
    }
}

/// Processes a queue of chunks sequentially against the collaborators
pub struct ChunkExecutor<'a> {
    reader: &'a dyn HealthReader,
    uploader: &'a dyn UploadClient,
    classifier: &'a dyn ErrorClassifier,
    control: &'a RunControl,
    metrics: Vec<MetricType>,
}

impl<'a> ChunkExecutor<'a> {
    pub fn new(
        reader: &'a dyn HealthReader,
        uploader: &'a dyn UploadClient,
        classifier: &'a dyn ErrorClassifier,
        control: &'a RunControl,
        metrics: &[MetricType],
    ) -> Self {
        Self {
            reader,
            uploader,
            classifier,
            control,
            metrics: MetricType::resolve(metrics),
        }
    }

    /// Run the chunks in `queue` in order
    ///
    /// Moves the job to `running` first. Pause and cancel requests are
    /// honoured at chunk and stage boundaries.
    pub fn run(
        &self,
        machine: &mut JobStateMachine<'_>,
        queue: &[usize],
    ) -> Result<RunOutcome, SyncError> {
        if machine.job().status != JobStatus::Running {
            machine.transition(JobStatus::Running)?;
        }
        info!(
            "Running job {}: {} chunk(s) queued",
            machine.job().id,
            queue.len()
        );

        for &index in queue {
            if let Some(outcome) = self.interrupt(machine, None)? {
                return Ok(outcome);
            }

            machine.begin_chunk(index)?;
            match self.process(machine, index)? {
                ChunkOutcome::Done => {}
                ChunkOutcome::Interrupted(signal) => {
                    return self.stop(machine, Some(index), signal);
                }
                ChunkOutcome::Failed(err) => match self.classifier.classify(&err) {
                    ErrorClass::Transient => {
                        warn!("Chunk {} of job {} failed: {}", index, machine.job().id, err);
                        machine.fail_chunk(index, &err.to_string())?;
                    }
                    ErrorClass::Fatal => {
                        error!("Job {} stopped on chunk {}: {}", machine.job().id, index, err);
                        machine.fail_job(Some(index), err.to_string())?;
                        return Ok(RunOutcome::Failed);
                    }
                },
            }
        }

        match machine.finish()? {
            JobStatus::Completed => Ok(RunOutcome::Completed),
            _ => Ok(RunOutcome::Failed),
        }
    }

    fn process(
        &self,
        machine: &mut JobStateMachine<'_>,
        index: usize,
    ) -> Result<ChunkOutcome, SyncError> {
        match self.pipeline(machine, index) {
            Ok(()) => Ok(ChunkOutcome::Done),
            Err(Halt::Signal(signal)) => Ok(ChunkOutcome::Interrupted(signal)),
            Err(Halt::Chunk(err)) => Ok(ChunkOutcome::Failed(err)),
            Err(Halt::Engine(err)) => Err(err),
        }
    }

    fn pipeline(&self, machine: &mut JobStateMachine<'_>, index: usize) -> Result<(), Halt> {
        let (job_id, device_id, range) = {
            let job = machine.job();
            let range = job
                .chunk(index)
                .map(|c| c.range())
                .ok_or(SyncError::from(TransitionError::UnknownChunk(index)))?;
            (job.id.clone(), job.device_id.clone(), range)
        };

        self.checkpoint(machine, Stage::Checking)?;
        if self.uploader.has_data(&device_id, &range)? {
            debug!("Server already holds {}, skipping", range);
            machine.enter_stage(Stage::Skipped)?;
            machine.complete_chunk(index)?;
            return Ok(());
        }

        self.checkpoint(machine, Stage::Starting)?;
        self.checkpoint(machine, Stage::FetchingHealth)?;
        let health = self.reader.read_health(&range, &self.metrics)?;

        self.checkpoint(machine, Stage::ProcessingHealth)?;
        let raw_health_count = health.len();
        let metrics = prepare_metrics(health);

        self.checkpoint(machine, Stage::FetchingActivities)?;
        let activities = self.reader.read_activities(&range)?;

        if raw_health_count == 0 && activities.is_empty() {
            debug!("No platform data for {}", range);
            machine.enter_stage(Stage::Complete)?;
            machine.complete_chunk(index)?;
            return Ok(());
        }

        self.checkpoint(machine, Stage::Uploading)?;
        let activities = prepare_activities(activities);
        let batch = build_batch(&job_id, index, &device_id, range, metrics, activities);
        if batch.is_empty() {
            debug!("Nothing left to upload for {} after cleaning", range);
        } else {
            debug!(
                "Uploading {} metrics and {} activities for {}",
                batch.metrics.len(),
                batch.activities.len(),
                range
            );
            self.uploader.upload(&batch)?;
        }

        machine.enter_stage(Stage::Complete)?;
        machine.complete_chunk(index)?;
        Ok(())
    }

    /// Enter `stage` unless a pause or cancel is pending
    fn checkpoint(&self, machine: &mut JobStateMachine<'_>, stage: Stage) -> Result<(), Halt> {
        match self.control.signal() {
            ControlSignal::Continue => {
                machine.enter_stage(stage)?;
                Ok(())
            }
            signal => Err(Halt::Signal(signal)),
        }
    }

    fn interrupt(
        &self,
        machine: &mut JobStateMachine<'_>,
        in_flight: Option<usize>,
    ) -> Result<Option<RunOutcome>, SyncError> {
        match self.control.signal() {
            ControlSignal::Continue => Ok(None),
            signal => self.stop(machine, in_flight, signal).map(Some),
        }
    }

    fn stop(
        &self,
        machine: &mut JobStateMachine<'_>,
        in_flight: Option<usize>,
        signal: ControlSignal,
    ) -> Result<RunOutcome, SyncError> {
        if let Some(index) = in_flight {
            machine.release_chunk(index)?;
        }
        let outcome = match signal {
            ControlSignal::Cancel => {
                machine.transition(JobStatus::Cancelled)?;
                RunOutcome::Cancelled
            }
            _ => {
                machine.transition(JobStatus::Paused)?;
                RunOutcome::Paused
            }
        };
        info!(
            "Job {} stopped at chunk {:?}: {:?}",
            machine.job().id,
            in_flight,
            outcome
        );
        Ok(outcome)
    }
}
