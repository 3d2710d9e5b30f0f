//! Measurement sequencer.
//!
//! Drives one voltage sweep through a fixed state machine:
//!
//! ```text
//! Idle → Connecting → Configuring → Sweeping → Finalizing → Completed | Aborted | Failed
//! ```
//!
//! The run executes on a single worker task which exclusively owns the two
//! instrument sessions and the result sink. The caller talks to it in one
//! direction only: a [`CancellationToken`] in, [`SequencerEvent`]s out.
//!
//! Cancellation is checked once per set-point, before the supply is moved, so
//! a point that has been commanded is always measured and recorded. Finalizing
//! runs on every exit path and never fails: the supply output is switched off
//! and each instrument is closed independently of the other.

pub mod events;
pub mod handle;

pub use events::{
    EventReceiver, EventSender, LogLine, ProgressUpdate, RunFault, RunOutcome, RunReport,
    SequencerEvent, SequencerState,
};
pub use handle::SweepHandle;

use crate::config::Settings;
use crate::error::{AppResult, SweepError};
use crate::hardware::{ResourceOpener, TransportOpener};
use crate::instrument::{
    parse_reading, CloseOutcome, ImpedanceMode, InstrumentRole, InstrumentSession, Multimeter,
    PowerSupply,
};
use crate::storage::{with_csv_extension, CsvSink, MeasurementRecord, ResultSink};
use crate::sweep::{estimate_duration, format_mmss, PaceEstimator, SweepConfig, SweepPlan};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

/// Where the two instruments live and how long a single call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchAddresses {
    pub psu: String,
    pub dmm: String,
    pub timeout: Duration,
}

impl BenchAddresses {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            psu: settings.instruments.psu_resource.clone(),
            dmm: settings.instruments.dmm_resource.clone(),
            timeout: settings.instruments.timeout(),
        }
    }
}

/// A fully described run, ready to execute once.
pub struct SweepSequencer {
    config: SweepConfig,
    bench: BenchAddresses,
    output_path: PathBuf,
    overhead_per_step_secs: f64,
    opener: Arc<dyn TransportOpener>,
}

impl SweepSequencer {
    /// `output_path` gains a `.csv` extension if it lacks one.
    pub fn new(config: SweepConfig, bench: BenchAddresses, output_path: impl AsRef<Path>) -> Self {
        Self {
            config,
            bench,
            output_path: with_csv_extension(output_path.as_ref()),
            overhead_per_step_secs: 0.9,
            opener: Arc::new(ResourceOpener),
        }
    }

    /// Use a different transport factory (e.g. a mock bench).
    pub fn with_opener(mut self, opener: Arc<dyn TransportOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Calibration constant used for the up-front time estimate.
    pub fn with_overhead_per_step(mut self, secs: f64) -> Self {
        self.overhead_per_step_secs = secs;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Start the run on its own worker task.
    ///
    /// Events arrive on the returned receiver; the last one is always
    /// [`SequencerEvent::Finished`].
    pub fn spawn(self) -> (SweepHandle, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(events, token).await });
        (SweepHandle::new(cancel, task), rx)
    }

    /// Execute the run on the current task and return its report.
    ///
    /// Never returns an error: every fault is folded into the report (and
    /// the `Finished` event) after teardown.
    pub async fn run(self, events: EventSender, cancel: CancellationToken) -> RunReport {
        let mut run = RunState::new(events);
        run.transition(SequencerState::Idle);

        let outcome = match self.execute(&mut run, &cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                run.log(Level::ERROR, format!("{}: {}", err.kind(), err));
                run.fault = Some(RunFault::from(&err));
                RunOutcome::Failed
            }
        };

        // Teardown covers whatever the connect phase managed to open.
        if run.state == SequencerState::Idle {
            run.close_sink();
        } else {
            run.finalize().await;
        }
        run.finish(outcome)
    }

    async fn execute(&self, run: &mut RunState, cancel: &CancellationToken) -> AppResult<RunOutcome> {
        let plan = self.config.plan()?;
        run.total_points = plan.len();
        let estimate = estimate_duration(
            plan.len(),
            self.config.settle_time_secs,
            self.overhead_per_step_secs,
        );
        run.log(
            Level::INFO,
            format!(
                "Sweep {} V to {} V in {} V steps: {} points, estimated {}",
                self.config.start_voltage,
                self.config.stop_voltage,
                self.config.step_voltage,
                plan.len(),
                format_mmss(estimate)
            ),
        );

        run.sink = Some(Box::new(CsvSink::create(&self.output_path)?));
        run.log(
            Level::INFO,
            format!("Saving to {}", self.output_path.display()),
        );

        self.connect(run).await?;
        self.configure(run, &plan).await?;
        self.sweep(run, &plan, cancel).await
    }

    async fn connect(&self, run: &mut RunState) -> AppResult<()> {
        run.transition(SequencerState::Connecting);
        let opener = self.opener.as_ref();

        let session = InstrumentSession::connect(
            opener,
            InstrumentRole::PowerSupply,
            &self.bench.psu,
            self.bench.timeout,
        )
        .await?;
        let psu = run.psu.insert(PowerSupply::new(session));
        let idn = psu.session_mut().identify().await?;
        run.log(Level::INFO, format!("Connected to PSU: {}", idn));

        let session = InstrumentSession::connect(
            opener,
            InstrumentRole::Multimeter,
            &self.bench.dmm,
            self.bench.timeout,
        )
        .await?;
        let dmm = run.dmm.insert(Multimeter::new(session));
        let idn = dmm.session_mut().identify().await?;
        run.log(Level::INFO, format!("Connected to DMM: {}", idn));
        Ok(())
    }

    async fn configure(&self, run: &mut RunState, plan: &SweepPlan) -> AppResult<()> {
        run.transition(SequencerState::Configuring);
        let channel = self.config.channel;

        run.psu_mut()?
            .configure(channel, plan.first(), self.config.current_limit)
            .await?;
        run.log(
            Level::INFO,
            format!(
                "PSU channel {} selected, current limit {} A",
                channel.label(),
                self.config.current_limit
            ),
        );

        let impedance = ImpedanceMode::from_high_impedance(self.config.high_impedance);
        run.dmm_mut()?.configure(impedance).await?;
        run.log(Level::INFO, impedance.to_string());

        run.log(
            Level::INFO,
            format!("Enabling Output on Channel {}", channel.number()),
        );
        run.psu_mut()?.enable_output().await
    }

    async fn sweep(
        &self,
        run: &mut RunState,
        plan: &SweepPlan,
        cancel: &CancellationToken,
    ) -> AppResult<RunOutcome> {
        run.transition(SequencerState::Sweeping);
        let sweep_start = Instant::now();

        let settle = self.config.settle_time();
        let pace = PaceEstimator::new(plan.len());

        for (index, set_voltage) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                run.log(
                    Level::INFO,
                    format!(
                        "Measurement stopped by user after {} of {} points",
                        index,
                        plan.len()
                    ),
                );
                return Ok(RunOutcome::Aborted);
            }

            run.psu_mut()?.set_voltage(set_voltage).await?;
            tokio::time::sleep(settle).await;

            let raw = run.dmm_mut()?.read_raw().await?;
            let measured = match parse_reading(&raw) {
                Ok(volts) => volts,
                Err(err) => {
                    run.log(
                        Level::WARN,
                        format!("{} at {:.3}V, recording NaN", err, set_voltage),
                    );
                    f64::NAN
                }
            };

            run.record(MeasurementRecord::now(set_voltage, measured))
                .await?;
            run.log(
                Level::INFO,
                format!("Set: {:.3}V | Meas: {:.6}V", set_voltage, measured),
            );

            let completed = index + 1;
            let p = pace.pace(completed, sweep_start.elapsed());
            run.emit(SequencerEvent::Progress(ProgressUpdate {
                completed,
                total: pace.total_points(),
                percent_complete: p.percent_complete,
                elapsed: p.elapsed,
                remaining: p.remaining,
                set_voltage,
                measured_voltage: measured,
            }));
        }

        run.log(
            Level::INFO,
            format!(
                "Measurement Complete. Total Duration: {}",
                format_mmss(sweep_start.elapsed())
            ),
        );
        Ok(RunOutcome::Completed)
    }
}

/// Everything one run owns. Lives on the worker; dropped when the run ends.
struct RunState {
    events: EventSender,
    state: SequencerState,
    started: Instant,
    psu: Option<PowerSupply>,
    dmm: Option<Multimeter>,
    sink: Option<Box<dyn ResultSink>>,
    total_points: usize,
    records_written: usize,
    fault: Option<RunFault>,
}

impl RunState {
    fn new(events: EventSender) -> Self {
        Self {
            events,
            state: SequencerState::Idle,
            started: Instant::now(),
            psu: None,
            dmm: None,
            sink: None,
            total_points: 0,
            records_written: 0,
            fault: None,
        }
    }

    fn emit(&self, event: SequencerEvent) {
        // A caller that stopped listening must not stop the run.
        let _ = self.events.send(event);
    }

    fn transition(&mut self, state: SequencerState) {
        debug!("Sequencer state {} -> {}", self.state, state);
        self.state = state;
        self.emit(SequencerEvent::State(state));
    }

    fn log(&self, level: Level, message: String) {
        match level {
            Level::ERROR => error!("{}", message),
            Level::WARN => warn!("{}", message),
            Level::INFO => info!("{}", message),
            _ => debug!("{}", message),
        }
        self.emit(SequencerEvent::Log(LogLine {
            at: Local::now(),
            level,
            message,
        }));
    }

    fn psu_mut(&mut self) -> AppResult<&mut PowerSupply> {
        self.psu
            .as_mut()
            .ok_or_else(|| SweepError::Instrument("PSU session is not open".to_string()))
    }

    fn dmm_mut(&mut self) -> AppResult<&mut Multimeter> {
        self.dmm
            .as_mut()
            .ok_or_else(|| SweepError::Instrument("DMM session is not open".to_string()))
    }

    /// Append on the blocking pool; the sink travels there and back.
    async fn record(&mut self, record: MeasurementRecord) -> AppResult<()> {
        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| SweepError::Storage("result sink is not open".to_string()))?;
        let (sink, appended) = tokio::task::spawn_blocking(move || {
            let appended = sink.append(&record);
            (sink, appended)
        })
        .await
        .map_err(|e| SweepError::Storage(format!("writer task failed: {}", e)))?;
        self.sink = Some(sink);
        appended
    }

    /// Teardown. Each step is attempted regardless of the others and
    /// nothing here can change the run outcome.
    async fn finalize(&mut self) {
        self.transition(SequencerState::Finalizing);

        if let Some(mut psu) = self.psu.take() {
            self.log(Level::INFO, "Turning off PSU Output...".to_string());
            if let Err(err) = psu.disable_output().await {
                self.log(Level::WARN, format!("Failed to disable PSU output: {}", err));
            }
            let closed = psu.close().await;
            self.report_close(InstrumentRole::PowerSupply, closed);
        }

        if let Some(mut dmm) = self.dmm.take() {
            let closed = dmm.close().await;
            self.report_close(InstrumentRole::Multimeter, closed);
        }

        self.close_sink();
    }

    fn report_close(&self, role: InstrumentRole, outcome: CloseOutcome) {
        match outcome {
            CloseOutcome::Closed => self.log(Level::INFO, format!("{} connection closed", role)),
            CloseOutcome::AlreadyClosed => {}
            CloseOutcome::Failed(reason) => {
                self.log(Level::WARN, format!("Error closing {}: {}", role, reason))
            }
        }
    }

    fn close_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            self.records_written = sink.records_written();
            if let Err(err) = sink.close() {
                self.log(Level::WARN, format!("Error closing output file: {}", err));
            }
        }
    }

    fn finish(mut self, outcome: RunOutcome) -> RunReport {
        self.transition(outcome.into());
        let report = RunReport {
            outcome,
            elapsed: self.started.elapsed(),
            records_written: self.records_written,
            error: self.fault,
        };
        info!(
            "Run {} with {}/{} points recorded",
            report.outcome, report.records_written, self.total_points
        );
        let _ = self.events.send(SequencerEvent::Finished(report.clone()));
        report
    }
}
